//! Output generators and the generator registry.
//!
//! A generator consumes the final dataset and writes exactly one artifact at
//! the descriptor's path, returning the path it wrote. Generators treat the
//! dataset as read-only and are independent of each other. Like operators,
//! concrete generators are selected by string tag through a static registry.

mod charts;
mod figure;
mod maps;
mod spreadsheet;

pub use charts::{BarChartGenerator, LineChartGenerator, PieChartGenerator, ScatterChartGenerator};
pub use figure::{ClassScheme, Colormap, FigureConfig, class_breaks, class_index, parse_color};
pub use maps::{ChoroplethMapGenerator, HeatMapGenerator, SimpleMapGenerator};
pub use spreadsheet::SpreadsheetGenerator;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

use crate::config::{OutputSpec, Params};
use crate::dataset::Dataset;
use crate::error::{ProcessingError, Result};

/// One artifact producer bound to a single output descriptor.
pub trait Generator: std::fmt::Debug + Send + Sync {
    /// Registry tag this generator was constructed under.
    fn name(&self) -> &'static str;

    /// Render the dataset to `output_path` and return the path written.
    fn generate(&self, dataset: &Dataset, output_path: &Path) -> Result<PathBuf>;
}

type Constructor = fn(&Params) -> Result<Box<dyn Generator>>;

/// Static tag → constructor mapping, mirroring the operator registry.
static REGISTRY: Lazy<BTreeMap<&'static str, Constructor>> = Lazy::new(|| {
    let mut map: BTreeMap<&'static str, Constructor> = BTreeMap::new();
    map.insert("spreadsheet", |p| {
        Ok(Box::new(SpreadsheetGenerator::from_params(p)?))
    });
    map.insert("bar_chart", |p| Ok(Box::new(BarChartGenerator::from_params(p)?)));
    map.insert("pie_chart", |p| Ok(Box::new(PieChartGenerator::from_params(p)?)));
    map.insert("line_chart", |p| {
        Ok(Box::new(LineChartGenerator::from_params(p)?))
    });
    map.insert("scatter_chart", |p| {
        Ok(Box::new(ScatterChartGenerator::from_params(p)?))
    });
    map.insert("simple_map", |p| Ok(Box::new(SimpleMapGenerator::from_params(p)?)));
    map.insert("choropleth_map", |p| {
        Ok(Box::new(ChoroplethMapGenerator::from_params(p)?))
    });
    map.insert("heat_map", |p| Ok(Box::new(HeatMapGenerator::from_params(p)?)));
    map
});

/// Tags accepted as output `type` values, sorted.
pub fn valid_output_tags() -> Vec<&'static str> {
    REGISTRY.keys().copied().collect()
}

/// Resolve a descriptor's tag and construct the generator it selects.
pub fn build_generator(spec: &OutputSpec) -> Result<Box<dyn Generator>> {
    match REGISTRY.get(spec.kind.as_str()) {
        Some(constructor) => constructor(&spec.params),
        None => Err(ProcessingError::UnknownOutput {
            tag: spec.kind.clone(),
            valid: valid_output_tags(),
        }),
    }
}

/// Create the parent directories of an artifact path if absent.
pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(kind: &str, params: serde_json::Value) -> OutputSpec {
        let serde_json::Value::Object(params) = params else {
            panic!("params must be an object");
        };
        OutputSpec {
            kind: kind.to_string(),
            path: PathBuf::from("out.bin"),
            params,
        }
    }

    #[test]
    fn test_build_known_generator() {
        let generator = build_generator(&spec("spreadsheet", json!({}))).unwrap();
        assert_eq!(generator.name(), "spreadsheet");

        let generator = build_generator(&spec("bar_chart", json!({"x": "region"}))).unwrap();
        assert_eq!(generator.name(), "bar_chart");
    }

    #[test]
    fn test_unknown_tag_lists_valid_tags() {
        let err = build_generator(&spec("hologram", json!({}))).unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_OUTPUT");
        let msg = err.to_string();
        assert!(msg.contains("hologram"));
        assert!(msg.contains("spreadsheet"));
        assert!(msg.contains("choropleth_map"));
    }

    #[test]
    fn test_registry_covers_all_documented_tags() {
        assert_eq!(
            valid_output_tags(),
            vec![
                "bar_chart",
                "choropleth_map",
                "heat_map",
                "line_chart",
                "pie_chart",
                "scatter_chart",
                "simple_map",
                "spreadsheet",
            ]
        );
    }
}
