//! Pipeline executor.
//!
//! An ordered chain of operators built once from configuration and applied
//! sequentially, threading the dataset through. There is no branching and no
//! recovery: the first failing step aborts the run, annotated with its
//! zero-based position and type tag so the offending configuration entry can
//! be pinpointed.

use tracing::info;

use crate::config::OperationSpec;
use crate::dataset::Dataset;
use crate::error::{Result, ResultExt};
use crate::ops::{Operator, build_operator};

/// Ordered, immutable-once-built chain of transform steps.
pub struct Pipeline {
    operators: Vec<Box<dyn Operator>>,
}

impl Pipeline {
    /// Construct every operator named by the descriptors, in order.
    ///
    /// Construction is eager: an unknown tag or malformed parameters fail
    /// here, before any data is touched.
    pub fn from_specs(specs: &[OperationSpec]) -> Result<Self> {
        let operators = specs
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                build_operator(spec).context(format!("operation {index} ({})", spec.kind))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { operators })
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Apply each operator in construction order.
    pub fn execute(&self, dataset: Dataset) -> Result<Dataset> {
        let mut current = dataset;
        for (index, operator) in self.operators.iter().enumerate() {
            current = operator
                .apply(&current)
                .context(format!("operation {index} ({})", operator.name()))?;
            info!(
                "operation {index} ({}) -> {} rows",
                operator.name(),
                current.height()
            );
        }
        Ok(current)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tags: Vec<&str> = self.operators.iter().map(|op| op.name()).collect();
        f.debug_struct("Pipeline").field("operators", &tags).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;
    use serde_json::json;

    fn dataset() -> Dataset {
        let df = df!(
            "region" => ["north", "south", "north", "south"],
            "population" => [100i64, 400, 300, 200],
        )
        .unwrap();
        Dataset::new(df)
    }

    fn specs(value: serde_json::Value) -> Vec<OperationSpec> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_operators_applied_in_order() {
        let pipeline = Pipeline::from_specs(&specs(json!([
            {"type": "filter", "column": "population", "operator": ">", "value": 150},
            {"type": "sort", "columns": ["population"], "ascending": true},
            {"type": "limit", "n": 2}
        ])))
        .unwrap();
        assert_eq!(pipeline.len(), 3);

        let out = pipeline.execute(dataset()).unwrap();
        let populations: Vec<i64> = out
            .column("population", "test")
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(populations, vec![200, 300]);
    }

    #[test]
    fn test_empty_pipeline_is_identity() {
        let pipeline = Pipeline::from_specs(&[]).unwrap();
        assert!(pipeline.is_empty());
        let out = pipeline.execute(dataset()).unwrap();
        assert_eq!(out.height(), 4);
    }

    #[test]
    fn test_unknown_tag_fails_at_build_with_position() {
        let err = Pipeline::from_specs(&specs(json!([
            {"type": "filter", "column": "population", "operator": ">", "value": 150},
            {"type": "explode"}
        ])))
        .unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_OPERATION");
        assert!(err.to_string().contains("operation 1 (explode)"));
    }

    #[test]
    fn test_failing_step_annotated_with_index_and_tag() {
        let pipeline = Pipeline::from_specs(&specs(json!([
            {"type": "limit", "n": 10},
            {"type": "filter", "column": "missing", "operator": ">", "value": 1}
        ])))
        .unwrap();
        let err = pipeline.execute(dataset()).unwrap_err();
        assert_eq!(err.error_code(), "MISSING_COLUMN");
        assert!(err.to_string().contains("operation 1 (filter)"));
    }
}
