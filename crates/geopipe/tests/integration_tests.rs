//! Integration tests for the GeoJSON processing pipeline.
//!
//! These tests run whole job documents against a 15-feature fixture and
//! verify end-to-end behavior: operation chaining, error taxonomy and
//! positions, eager output validation, and artifacts actually landing on
//! disk.

use std::path::PathBuf;

use geopipe::{JobConfig, OperationSpec, OutputSpec, Pipeline, Processor};
use polars::prelude::*;
use pretty_assertions::assert_eq;

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_cities() -> Processor {
    Processor::load(&fixtures_path().join("cities.geojson")).expect("fixture should load")
}

fn operations(value: serde_json::Value) -> Vec<OperationSpec> {
    serde_json::from_value(value).expect("operation specs should deserialize")
}

fn outputs(value: serde_json::Value) -> Vec<OutputSpec> {
    serde_json::from_value(value).expect("output specs should deserialize")
}

fn column_f64(processor: &Processor, name: &str) -> Vec<f64> {
    processor
        .dataset()
        .column(name, "test")
        .unwrap()
        .cast(&DataType::Float64)
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .flatten()
        .collect()
}

fn column_str(processor: &Processor, name: &str) -> Vec<String> {
    processor
        .dataset()
        .column(name, "test")
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .map(|v| v.unwrap().to_string())
        .collect()
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_fixture_loads_with_inferred_types() {
    let processor = load_cities();
    let ds = processor.dataset();

    assert_eq!(ds.height(), 15);
    assert!(ds.has_geometry());
    assert_eq!(ds.crs(), Some("EPSG:4326"));

    let df = ds.df();
    assert_eq!(df.column("population").unwrap().dtype(), &DataType::Int64);
    assert_eq!(df.column("area").unwrap().dtype(), &DataType::Float64);
    assert_eq!(df.column("region").unwrap().dtype(), &DataType::String);
}

// ============================================================================
// Scenario A: filter -> groupby -> sort
// ============================================================================

#[test]
fn test_scenario_filter_groupby_sort() {
    let mut processor = load_cities();
    processor
        .process(&operations(serde_json::json!([
            {"type": "filter", "column": "population", "operator": ">", "value": 1000000},
            {"type": "groupby", "columns": ["region"], "aggregations": {"population": "sum"}},
            {"type": "sort", "columns": ["population"], "ascending": false}
        ])))
        .unwrap();

    // One output row per distinct region among the filtered rows
    assert_eq!(processor.dataset().height(), 4);
    assert_eq!(
        column_str(&processor, "region"),
        vec!["north", "south", "east", "west"]
    );
    assert_eq!(
        column_f64(&processor, "population"),
        vec![3_600_000.0, 3_400_000.0, 2_800_000.0, 1_500_000.0]
    );
}

// ============================================================================
// Scenario B: out-of-domain arithmetic does not abort
// ============================================================================

#[test]
fn test_scenario_density_with_zero_area() {
    let mut processor = load_cities();
    processor
        .process(&operations(serde_json::json!([
            {"type": "calculate", "new_column": "density", "expression": "population / area"}
        ])))
        .unwrap();

    let density = column_f64(&processor, "density");
    assert_eq!(density.len(), 15);
    // Theta has area == 0; its density is the infinite sentinel
    let infinite = density.iter().filter(|v| v.is_infinite()).count();
    assert_eq!(infinite, 1);
}

// ============================================================================
// Scenario C: bad aggregation aborts before any generator runs
// ============================================================================

#[test]
fn test_scenario_bogus_aggregation_blocks_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("report.xlsx");

    let config = JobConfig {
        operations: operations(serde_json::json!([
            {"type": "groupby", "columns": ["region"], "aggregations": {"population": "bogus"}}
        ])),
        outputs: outputs(serde_json::json!([
            {"type": "spreadsheet", "path": artifact}
        ])),
    };

    let err = load_cities().run(&config).unwrap_err();
    assert_eq!(err.error_code(), "UNKNOWN_AGGREGATION");
    let msg = err.to_string();
    assert!(msg.contains("bogus"));
    assert!(msg.contains("population"));
    assert!(!artifact.exists(), "no artifact may be written");
}

// ============================================================================
// Scenario D: output descriptors are validated eagerly
// ============================================================================

#[test]
fn test_unknown_output_type_fails_before_any_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let spreadsheet = dir.path().join("report.xlsx");
    let chart = dir.path().join("chart.png");

    let config = JobConfig {
        operations: Vec::new(),
        outputs: outputs(serde_json::json!([
            {"type": "hologram", "path": dir.path().join("out.holo")},
            {"type": "spreadsheet", "path": spreadsheet},
            {"type": "bar_chart", "path": chart, "x": "region", "grid": false}
        ])),
    };

    let err = load_cities().run(&config).unwrap_err();
    assert_eq!(err.error_code(), "UNKNOWN_OUTPUT");
    assert!(err.to_string().contains("output 0 (hologram)"));
    assert!(!spreadsheet.exists());
    assert!(!chart.exists());
}

// ============================================================================
// Artifacts
// ============================================================================

#[test]
fn test_spreadsheet_and_chart_artifacts_written() {
    let dir = tempfile::tempdir().unwrap();
    let spreadsheet = dir.path().join("report.xlsx");
    let chart = dir.path().join("chart.png");

    let config = JobConfig {
        operations: operations(serde_json::json!([
            {"type": "filter", "column": "population", "operator": ">=", "value": 500000}
        ])),
        outputs: outputs(serde_json::json!([
            {"type": "spreadsheet", "path": spreadsheet, "include_geometry": true},
            {"type": "bar_chart", "path": chart, "x": "region", "y": "population", "grid": false}
        ])),
    };

    let artifacts = load_cities().run(&config).unwrap();
    assert_eq!(artifacts, vec![spreadsheet.clone(), chart.clone()]);
    assert!(std::fs::metadata(&spreadsheet).unwrap().len() > 0);
    assert!(std::fs::metadata(&chart).unwrap().len() > 0);
}

#[test]
fn test_map_artifacts_written() {
    let dir = tempfile::tempdir().unwrap();
    let simple = dir.path().join("maps/simple.png");
    let choropleth = dir.path().join("maps/choropleth.png");

    let config = JobConfig {
        operations: Vec::new(),
        outputs: outputs(serde_json::json!([
            {"type": "simple_map", "path": simple, "axis_off": true},
            {
                "type": "choropleth_map",
                "path": choropleth,
                "column": "population",
                "scheme": "quantiles",
                "k": 4,
                "legend": false,
                "axis_off": true
            }
        ])),
    };

    let artifacts = load_cities().run(&config).unwrap();
    assert_eq!(artifacts.len(), 2);
    // Parent directories are created on demand
    assert!(simple.exists());
    assert!(choropleth.exists());
}

#[test]
fn test_partial_artifacts_left_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("report.xlsx");

    let config = JobConfig {
        operations: Vec::new(),
        outputs: outputs(serde_json::json!([
            {"type": "spreadsheet", "path": first},
            {"type": "bar_chart", "path": dir.path().join("chart.png"), "x": "no_such_column"}
        ])),
    };

    let err = load_cities().run(&config).unwrap_err();
    assert_eq!(err.error_code(), "MISSING_COLUMN");
    assert!(err.to_string().contains("output 1 (bar_chart)"));
    // Documented choice: artifacts written before the failure stay on disk
    assert!(first.exists());
}

// ============================================================================
// Pipeline semantics
// ============================================================================

#[test]
fn test_limit_clamps_to_available_rows() {
    let mut processor = load_cities();
    processor
        .process(&operations(serde_json::json!([
            {"type": "limit", "n": 500}
        ])))
        .unwrap();
    assert_eq!(processor.dataset().height(), 15);
}

#[test]
fn test_chained_calculate_then_filter() {
    let mut processor = load_cities();
    processor
        .process(&operations(serde_json::json!([
            {"type": "calculate", "calculations": [
                {"new_column": "density", "expression": "population / area"},
                {"new_column": "dense", "expression": "density > 9000"}
            ]},
            {"type": "filter", "column": "dense", "operator": "==", "value": 1}
        ])))
        .unwrap();

    // Alpha (10000), Theta (inf), Kappa (~9167), Mu (7500 is below)
    let names = column_str(&processor, "name");
    assert!(names.contains(&"Alpha".to_string()));
    assert!(names.contains(&"Kappa".to_string()));
    assert!(!names.contains(&"Mu".to_string()));
}

#[test]
fn test_unknown_operation_reported_with_position() {
    let err = Pipeline::from_specs(&operations(serde_json::json!([
        {"type": "limit", "n": 3},
        {"type": "pivot"}
    ])))
    .unwrap_err();
    assert_eq!(err.error_code(), "UNKNOWN_OPERATION");
    assert!(err.to_string().contains("operation 1 (pivot)"));
}

#[test]
fn test_groupby_keep_geometry_dissolves_regions() {
    let mut processor = load_cities();
    processor
        .process(&operations(serde_json::json!([
            {
                "type": "groupby",
                "columns": ["region"],
                "aggregations": {"population": "sum"},
                "keep_geometry": true
            }
        ])))
        .unwrap();

    let ds = processor.dataset();
    assert_eq!(ds.height(), 4);
    assert!(ds.has_geometry());
    let geoms = ds.geometries("test").unwrap();
    // Every region has adjacent unit squares, so each dissolves to one area
    assert!(geoms.iter().all(Option::is_some));
}

#[test]
fn test_job_config_round_trip_through_json() {
    let json = r#"{
        "operations": [
            {"type": "filter", "column": "region", "operator": "in", "value": ["north", "south"]},
            {"type": "sort", "columns": ["population"], "ascending": false},
            {"type": "limit", "n": 3}
        ],
        "outputs": []
    }"#;
    let config = JobConfig::from_json(json).unwrap();

    let mut processor = load_cities();
    processor.process(&config.operations).unwrap();
    assert_eq!(processor.dataset().height(), 3);
    assert_eq!(
        column_str(&processor, "name"),
        vec!["Alpha", "Kappa", "Gamma"]
    );
}
