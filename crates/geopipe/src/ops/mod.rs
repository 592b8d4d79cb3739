//! Transform operators and the operator registry.
//!
//! Every operator implements [`Operator`]: take a dataset by reference,
//! return a new owned dataset. Concrete operators are selected by the string
//! tag of their operation descriptor through a static registry; adding an
//! operator means adding one registry entry, nothing else changes.

mod calculate;
mod filter;
mod group;
mod limit;
mod sort;

pub use calculate::CalculateOp;
pub use filter::FilterOp;
pub use group::GroupByOp;
pub use limit::LimitOp;
pub use sort::SortOp;

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use crate::config::{OperationSpec, Params};
use crate::dataset::Dataset;
use crate::error::{ProcessingError, Result};

/// One data-reshaping step of the pipeline.
pub trait Operator: std::fmt::Debug + Send + Sync {
    /// Registry tag this operator was constructed under.
    fn name(&self) -> &'static str;

    /// Apply the transform, producing a new dataset.
    fn apply(&self, dataset: &Dataset) -> Result<Dataset>;
}

type Constructor = fn(&Params) -> Result<Box<dyn Operator>>;

/// Static tag → constructor mapping, established once at startup.
static REGISTRY: Lazy<BTreeMap<&'static str, Constructor>> = Lazy::new(|| {
    let mut map: BTreeMap<&'static str, Constructor> = BTreeMap::new();
    map.insert("filter", |p| Ok(Box::new(FilterOp::from_params(p)?)));
    map.insert("groupby", |p| Ok(Box::new(GroupByOp::from_params(p)?)));
    map.insert("calculate", |p| Ok(Box::new(CalculateOp::from_params(p)?)));
    map.insert("sort", |p| Ok(Box::new(SortOp::from_params(p)?)));
    map.insert("limit", |p| Ok(Box::new(LimitOp::from_params(p)?)));
    map
});

/// Tags accepted as operation `type` values, sorted.
pub fn valid_operation_tags() -> Vec<&'static str> {
    REGISTRY.keys().copied().collect()
}

/// Resolve a descriptor's tag and construct the operator it selects.
pub fn build_operator(spec: &OperationSpec) -> Result<Box<dyn Operator>> {
    match REGISTRY.get(spec.kind.as_str()) {
        Some(constructor) => constructor(&spec.params),
        None => Err(ProcessingError::UnknownOperation {
            tag: spec.kind.clone(),
            valid: valid_operation_tags(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(kind: &str, params: serde_json::Value) -> OperationSpec {
        let serde_json::Value::Object(params) = params else {
            panic!("params must be an object");
        };
        OperationSpec {
            kind: kind.to_string(),
            params,
        }
    }

    #[test]
    fn test_build_known_operator() {
        let op = build_operator(&spec(
            "filter",
            json!({"column": "population", "operator": ">", "value": 10}),
        ))
        .unwrap();
        assert_eq!(op.name(), "filter");
    }

    #[test]
    fn test_unknown_tag_lists_valid_tags() {
        let err = build_operator(&spec("explode", json!({}))).unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_OPERATION");
        let msg = err.to_string();
        assert!(msg.contains("explode"));
        for tag in ["calculate", "filter", "groupby", "limit", "sort"] {
            assert!(msg.contains(tag), "expected '{tag}' in: {msg}");
        }
    }

    #[test]
    fn test_registry_covers_all_documented_tags() {
        assert_eq!(
            valid_operation_tags(),
            vec!["calculate", "filter", "groupby", "limit", "sort"]
        );
    }
}
