//! Processing facade.
//!
//! Ties the pieces together: load a GeoJSON file, run the operation pipeline,
//! then fan out to the requested output generators. Output descriptors are
//! validated eagerly: every descriptor is resolved against the registry and
//! its parameters parsed before any generator runs, so a typo in the last
//! descriptor fails the job before the first artifact is written. A runtime
//! failure in a later generator, on the other hand, leaves the artifacts
//! already written on disk; there is no rollback.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::{JobConfig, OperationSpec, OutputSpec};
use crate::dataset::Dataset;
use crate::error::{Result, ResultExt};
use crate::geojson;
use crate::output::build_generator;
use crate::pipeline::Pipeline;

/// Orchestrates one load → transform → generate run.
#[derive(Debug)]
pub struct Processor {
    dataset: Dataset,
}

impl Processor {
    /// Load the source dataset from a GeoJSON file.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self {
            dataset: geojson::read_dataset(path)?,
        })
    }

    /// Start from an already-loaded dataset.
    pub fn from_dataset(dataset: Dataset) -> Self {
        Self { dataset }
    }

    /// The current (possibly transformed) dataset.
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Build the pipeline from the operation descriptors and run it.
    pub fn process(&mut self, operations: &[OperationSpec]) -> Result<&mut Self> {
        if operations.is_empty() {
            info!("no operations configured, dataset passes through unchanged");
            return Ok(self);
        }
        let pipeline = Pipeline::from_specs(operations)?;
        info!("applying {} operation(s)", pipeline.len());
        self.dataset = pipeline.execute(self.dataset.clone())?;
        Ok(self)
    }

    /// Build every requested generator, then run them in order.
    ///
    /// Returns the artifact paths in descriptor order.
    pub fn generate_outputs(&self, outputs: &[OutputSpec]) -> Result<Vec<PathBuf>> {
        // Eager validation pass: any unknown tag or malformed descriptor
        // fails here, before a single generator runs.
        let generators = outputs
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                let generator =
                    build_generator(spec).context(format!("output {index} ({})", spec.kind))?;
                Ok((generator, spec.path.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut written = Vec::with_capacity(generators.len());
        for (index, (generator, path)) in generators.iter().enumerate() {
            info!("generating output {index} ({})", generator.name());
            let artifact = generator
                .generate(&self.dataset, path)
                .context(format!("output {index} ({})", generator.name()))?;
            written.push(artifact);
        }
        Ok(written)
    }

    /// Run a whole job document: operations, then outputs.
    pub fn run(&mut self, config: &JobConfig) -> Result<Vec<PathBuf>> {
        self.process(&config.operations)?;
        self.generate_outputs(&config.outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;
    use serde_json::json;

    fn processor() -> Processor {
        let df = df!(
            "region" => ["north", "south", "north"],
            "population" => [100i64, 200, 300],
        )
        .unwrap();
        Processor::from_dataset(Dataset::new(df))
    }

    #[test]
    fn test_process_transforms_dataset() {
        let mut processor = processor();
        let operations: Vec<OperationSpec> = serde_json::from_value(json!([
            {"type": "groupby", "columns": ["region"], "aggregations": {"population": "sum"}}
        ]))
        .unwrap();
        processor.process(&operations).unwrap();
        assert_eq!(processor.dataset().height(), 2);
    }

    #[test]
    fn test_unknown_output_fails_before_any_generator_runs() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("report.xlsx");
        let outputs: Vec<OutputSpec> = serde_json::from_value(json!([
            {"type": "spreadsheet", "path": good},
            {"type": "hologram", "path": dir.path().join("out.holo")}
        ]))
        .unwrap();

        let err = processor().generate_outputs(&outputs).unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_OUTPUT");
        assert!(err.to_string().contains("output 1 (hologram)"));
        // Eager validation: the valid spreadsheet was never written
        assert!(!good.exists());
    }

    #[test]
    fn test_generator_failure_keeps_earlier_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("report.xlsx");
        let outputs: Vec<OutputSpec> = serde_json::from_value(json!([
            {"type": "spreadsheet", "path": first},
            {"type": "bar_chart", "path": dir.path().join("chart.png"), "x": "missing_column"}
        ]))
        .unwrap();

        let err = processor().generate_outputs(&outputs).unwrap_err();
        assert_eq!(err.error_code(), "MISSING_COLUMN");
        // No rollback: the artifact written before the failure stays on disk
        assert!(first.exists());
    }
}
