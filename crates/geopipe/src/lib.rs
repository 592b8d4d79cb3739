//! GeoJSON Processing Pipeline Library
//!
//! A configuration-driven pipeline that turns a GeoJSON dataset plus a
//! declarative list of operations into rendered artifacts: formatted Excel
//! spreadsheets, charts (bar, pie, line, scatter) and maps (simple,
//! choropleth, heat).
//!
//! # Overview
//!
//! A job document has two ordered lists:
//!
//! - **operations** reshape the dataset: `filter`, `groupby`, `calculate`,
//!   `sort`, `limit`
//! - **outputs** render the result: `spreadsheet`, `bar_chart`, `pie_chart`,
//!   `line_chart`, `scatter_chart`, `simple_map`, `choropleth_map`,
//!   `heat_map`
//!
//! Both lists dispatch on their `type` tag through static registries, so new
//! operators and generators are purely additive. Operators are applied as a
//! strict linear chain with value semantics: each takes the dataset by
//! reference and returns a new owned dataset. Tabular mechanics are
//! delegated to polars; geometry decoding to `geojson`/`geo`/`wkt`;
//! rendering to plotters and `rust_xlsxwriter`.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use geopipe::{JobConfig, Processor};
//! use std::path::Path;
//!
//! let config = JobConfig::from_path(Path::new("job.json"))?;
//! let artifacts = Processor::load(Path::new("cities.geojson"))?.run(&config)?;
//! for path in artifacts {
//!     println!("wrote {}", path.display());
//! }
//! ```
//!
//! # Error handling
//!
//! Every failure carries a stable [`error::ProcessingError::error_code`] and
//! is annotated with the position and type tag of the descriptor that caused
//! it (`operation 2 (groupby)`, `output 0 (spreadsheet)`). Nothing is
//! retried and nothing is swallowed; artifacts written before a failing
//! generator are left on disk.

pub mod config;
pub mod dataset;
pub mod error;
pub mod geojson;
pub mod ops;
pub mod output;
pub mod pipeline;
pub mod processor;
pub mod utils;

// Re-exports for convenient access
pub use config::{JobConfig, OperationSpec, OutputSpec};
pub use dataset::{Dataset, GEOMETRY_COLUMN};
pub use error::{ProcessingError, Result as ProcessingResult, ResultExt};
pub use ops::{
    CalculateOp, FilterOp, GroupByOp, LimitOp, Operator, SortOp, build_operator,
    valid_operation_tags,
};
pub use output::{
    BarChartGenerator, ChoroplethMapGenerator, Generator, HeatMapGenerator, LineChartGenerator,
    PieChartGenerator, ScatterChartGenerator, SimpleMapGenerator, SpreadsheetGenerator,
    build_generator, valid_output_tags,
};
pub use pipeline::Pipeline;
pub use processor::Processor;
