//! GeoJSON ingestion.
//!
//! Reads a GeoJSON document into a [`Dataset`]: feature properties become
//! typed columns (integer, float, boolean or text, inferred from the values
//! actually present) and feature geometries are encoded as WKT in the
//! geometry column. Geometry parsing itself is delegated to the `geojson`
//! and `geo` collaborators.

use std::fs;
use std::path::Path;

use geojson::{Feature, GeoJson};
use polars::prelude::*;
use serde_json::Value;
use tracing::{debug, info};

use crate::dataset::{Dataset, GEOMETRY_COLUMN, geometry_to_wkt};
use crate::error::{ProcessingError, Result};

/// GeoJSON coordinates are always WGS84 (RFC 7946 §4).
const GEOJSON_CRS: &str = "EPSG:4326";

/// Load a GeoJSON file into a dataset.
pub fn read_dataset(path: &Path) -> Result<Dataset> {
    let text = fs::read_to_string(path)?;
    let geojson: GeoJson = text.parse().map_err(|e: geojson::Error| {
        ProcessingError::Collaborator(format!("failed to parse {}: {e}", path.display()))
    })?;

    let features = match geojson {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => vec![Feature {
            bbox: None,
            geometry: Some(geometry),
            id: None,
            properties: None,
            foreign_members: None,
        }],
    };

    info!("Loaded {} features from {}", features.len(), path.display());
    let dataset = dataset_from_features(&features)?;
    debug!(
        "Dataset shape: {} rows x {} columns",
        dataset.height(),
        dataset.width()
    );
    Ok(dataset)
}

/// Build a dataset from parsed features.
pub fn dataset_from_features(features: &[Feature]) -> Result<Dataset> {
    let keys = property_keys(features);

    let mut columns: Vec<Column> = Vec::with_capacity(keys.len() + 1);
    for key in &keys {
        let values: Vec<Option<&Value>> = features
            .iter()
            .map(|f| f.properties.as_ref().and_then(|p| p.get(key)))
            .collect();
        columns.push(build_column(key, &values).into());
    }
    columns.push(geometry_column(features)?.into());

    let df = DataFrame::new(columns)?;
    Ok(Dataset::with_crs(df, GEOJSON_CRS))
}

/// Property keys in first-appearance order across all features.
fn property_keys(features: &[Feature]) -> Vec<String> {
    let mut keys = Vec::new();
    for feature in features {
        if let Some(props) = &feature.properties {
            for key in props.keys() {
                if !keys.iter().any(|k| k == key) {
                    keys.push(key.clone());
                }
            }
        }
    }
    keys
}

/// Infer a column type from the JSON values present and build the Series.
///
/// All-integer columns stay `Int64`; any fractional value widens the column
/// to `Float64`; all-boolean columns become `Boolean`; anything else falls
/// back to text (with non-string scalars stringified).
fn build_column(name: &str, values: &[Option<&Value>]) -> Series {
    let non_null: Vec<&Value> = values.iter().flatten().copied().collect();

    let all_bool = !non_null.is_empty() && non_null.iter().all(|v| v.is_boolean());
    if all_bool {
        let data: Vec<Option<bool>> = values
            .iter()
            .map(|v| v.and_then(Value::as_bool))
            .collect();
        return Series::new(name.into(), data);
    }

    let all_number = !non_null.is_empty() && non_null.iter().all(|v| v.is_number());
    if all_number {
        if non_null.iter().all(|v| v.is_i64()) {
            let data: Vec<Option<i64>> = values.iter().map(|v| v.and_then(Value::as_i64)).collect();
            return Series::new(name.into(), data);
        }
        let data: Vec<Option<f64>> = values.iter().map(|v| v.and_then(Value::as_f64)).collect();
        return Series::new(name.into(), data);
    }

    let data: Vec<Option<String>> = values
        .iter()
        .map(|v| {
            v.map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        })
        .collect();
    Series::new(name.into(), data)
}

/// Encode feature geometries as a WKT string column.
fn geometry_column(features: &[Feature]) -> Result<Series> {
    let mut cells: Vec<Option<String>> = Vec::with_capacity(features.len());
    for feature in features {
        match &feature.geometry {
            Some(geometry) => {
                let geom = geo::Geometry::<f64>::try_from(geometry).map_err(|e| {
                    ProcessingError::Collaborator(format!("unsupported geometry: {e}"))
                })?;
                cells.push(Some(geometry_to_wkt(&geom)));
            }
            None => cells.push(None),
        }
    }
    Ok(Series::new(GEOMETRY_COLUMN.into(), cells))
}
