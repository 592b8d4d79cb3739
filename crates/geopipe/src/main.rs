//! CLI entry point for the GeoJSON processing pipeline.

use std::path::{Path, PathBuf};

use clap::Parser;
use geopipe::{JobConfig, OutputSpec, ProcessingError, Processor};
use serde_json::{Value, json};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Configuration-driven GeoJSON processing: filter, aggregate and render",
    long_about = "Turns a GeoJSON file plus a declarative job document into spreadsheets,\n\
                  charts and maps.\n\n\
                  MODES:\n  \
                  1. Job document: geopipe data.geojson --config job.json\n  \
                  2. Direct flags mapping to a minimal set of outputs\n\n\
                  EXAMPLES:\n  \
                  # Full job document with operations and outputs\n  \
                  geopipe districts.geojson --config job.json\n\n  \
                  # Just a spreadsheet\n  \
                  geopipe districts.geojson --spreadsheet report.xlsx\n\n  \
                  # Spreadsheet plus a bar chart of counts per category\n  \
                  geopipe districts.geojson --spreadsheet report.xlsx \\\n      \
                  --bar-chart chart.png --bar-column land_use\n\n  \
                  # Choropleth map colored by a column\n  \
                  geopipe districts.geojson --choropleth-map map.png --choropleth-column density"
)]
struct Args {
    /// Path to the GeoJSON file to process
    input: PathBuf,

    /// Path to a JSON job document with operations and outputs
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write an Excel spreadsheet to this path
    #[arg(long)]
    spreadsheet: Option<PathBuf>,

    /// Write a bar chart to this path (requires --bar-column)
    #[arg(long)]
    bar_chart: Option<PathBuf>,

    /// Category column for the bar chart
    #[arg(long)]
    bar_column: Option<String>,

    /// Value column summed per bar (row counts when absent)
    #[arg(long)]
    bar_value: Option<String>,

    /// Write a pie chart to this path (requires --pie-column)
    #[arg(long)]
    pie_chart: Option<PathBuf>,

    /// Category column for the pie chart
    #[arg(long)]
    pie_column: Option<String>,

    /// Write a simple map to this path
    #[arg(long)]
    simple_map: Option<PathBuf>,

    /// Write a choropleth map to this path (requires --choropleth-column)
    #[arg(long)]
    choropleth_map: Option<PathBuf>,

    /// Value column for the choropleth map
    #[arg(long)]
    choropleth_column: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show warnings and errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Initialize the tracing subscriber for logging.
fn init_logging(level: &str, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(&args.log_level, args.quiet);

    match run(&args) {
        Ok(artifacts) => {
            for path in &artifacts {
                println!("wrote {}", path.display());
            }
        }
        Err(e) => {
            eprintln!("error[{}]: {e}", e.error_code());
            std::process::exit(1);
        }
    }
}

fn run(args: &Args) -> geopipe::ProcessingResult<Vec<PathBuf>> {
    if !args.input.exists() {
        return Err(ProcessingError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("input file not found: {}", args.input.display()),
        )));
    }

    let job = match &args.config {
        Some(path) => JobConfig::from_path(path)?,
        None => job_from_flags(args)?,
    };

    info!(
        "running job: {} operation(s), {} output(s)",
        job.operations.len(),
        job.outputs.len()
    );
    Processor::load(&args.input)?.run(&job)
}

/// Build a job document from the direct output flags.
fn job_from_flags(args: &Args) -> geopipe::ProcessingResult<JobConfig> {
    let mut outputs = Vec::new();

    if let Some(path) = &args.spreadsheet {
        outputs.push(output_spec("spreadsheet", path, json!({})));
    }

    if let Some(path) = &args.bar_chart {
        let Some(column) = &args.bar_column else {
            return Err(ProcessingError::InvalidConfig(
                "--bar-column is required with --bar-chart".to_string(),
            ));
        };
        let mut params = json!({"x": column});
        if let Some(value) = &args.bar_value {
            params["y"] = Value::String(value.clone());
        }
        outputs.push(output_spec("bar_chart", path, params));
    }

    if let Some(path) = &args.pie_chart {
        let Some(column) = &args.pie_column else {
            return Err(ProcessingError::InvalidConfig(
                "--pie-column is required with --pie-chart".to_string(),
            ));
        };
        outputs.push(output_spec("pie_chart", path, json!({"column": column})));
    }

    if let Some(path) = &args.simple_map {
        outputs.push(output_spec("simple_map", path, json!({})));
    }

    if let Some(path) = &args.choropleth_map {
        let Some(column) = &args.choropleth_column else {
            return Err(ProcessingError::InvalidConfig(
                "--choropleth-column is required with --choropleth-map".to_string(),
            ));
        };
        outputs.push(output_spec(
            "choropleth_map",
            path,
            json!({"column": column}),
        ));
    }

    if outputs.is_empty() {
        return Err(ProcessingError::InvalidConfig(
            "no outputs requested; use --config or one of the output flags".to_string(),
        ));
    }

    Ok(JobConfig {
        operations: Vec::new(),
        outputs,
    })
}

fn output_spec(kind: &str, path: &Path, params: Value) -> OutputSpec {
    let Value::Object(params) = params else {
        unreachable!("output flag params are always JSON objects");
    };
    OutputSpec {
        kind: kind.to_string(),
        path: path.to_path_buf(),
        params,
    }
}
