//! Spreadsheet (XLSX) generator.
//!
//! Writes the dataset to one or more worksheets. Header freezing, column
//! auto-filter and width auto-sizing are formatting instructions passed to
//! the spreadsheet collaborator, not computed here. Geometry is excluded by
//! default; `include_geometry` exports it as a `geometry_wkt` text column.

use std::path::{Path, PathBuf};

use polars::prelude::*;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use serde::Deserialize;
use tracing::info;

use crate::config::{Params, parse_params};
use crate::dataset::{Dataset, GEOMETRY_COLUMN};
use crate::error::{ProcessingError, Result};
use crate::output::figure::default_true;
use crate::output::{Generator, ensure_parent_dir};
use crate::utils::{DtypeCategory, any_value_to_string, series_dtype_category};

/// Geometry column name used in exported sheets.
const GEOMETRY_WKT_COLUMN: &str = "geometry_wkt";

fn default_sheet_name() -> String {
    "Data".to_string()
}

/// One logical sheet: a name plus an optional column subset.
#[derive(Debug, Clone, Deserialize)]
struct SheetSpec {
    name: String,
    columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
struct SpreadsheetParams {
    #[serde(default = "default_sheet_name")]
    sheet_name: String,
    /// Multiple logical sheets; overrides `sheet_name`/`columns` when given.
    sheets: Option<Vec<SheetSpec>>,
    #[serde(default = "default_true")]
    freeze_panes: bool,
    #[serde(default = "default_true")]
    auto_filter: bool,
    #[serde(default = "default_true")]
    autofit: bool,
    /// Column subset for the single-sheet form.
    columns: Option<Vec<String>>,
    /// Export geometry as WKT text instead of dropping it.
    #[serde(default)]
    include_geometry: bool,
}

/// Writes the dataset to a formatted XLSX workbook.
#[derive(Debug, Clone)]
pub struct SpreadsheetGenerator {
    params: SpreadsheetParams,
}

impl SpreadsheetGenerator {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            params: parse_params("spreadsheet", params)?,
        })
    }
}

impl Generator for SpreadsheetGenerator {
    fn name(&self) -> &'static str {
        "spreadsheet"
    }

    fn generate(&self, dataset: &Dataset, output_path: &Path) -> Result<PathBuf> {
        let p = &self.params;
        let sheets: Vec<SheetSpec> = match &p.sheets {
            Some(sheets) => sheets.clone(),
            None => vec![SheetSpec {
                name: p.sheet_name.clone(),
                columns: p.columns.clone(),
            }],
        };

        // Validate every sheet before the workbook is opened.
        let frames = sheets
            .iter()
            .map(|sheet| {
                let frame = sheet_frame(dataset, sheet.columns.as_deref(), p.include_geometry)?;
                Ok((sheet.name.clone(), frame))
            })
            .collect::<Result<Vec<_>>>()?;

        ensure_parent_dir(output_path)?;
        let mut workbook = Workbook::new();
        for (name, frame) in &frames {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(name.as_str()).map_err(xlsx_err)?;
            write_frame(worksheet, frame, p)?;
        }
        workbook.save(output_path).map_err(xlsx_err)?;

        info!("spreadsheet written to {}", output_path.display());
        Ok(output_path.to_path_buf())
    }
}

/// Project the dataset into the frame a sheet should show.
fn sheet_frame(
    dataset: &Dataset,
    columns: Option<&[String]>,
    include_geometry: bool,
) -> Result<DataFrame> {
    let mut df = if dataset.has_geometry() {
        if include_geometry {
            let mut df = dataset.df().clone();
            df.rename(GEOMETRY_COLUMN, GEOMETRY_WKT_COLUMN.into())?;
            df
        } else {
            dataset.df().drop(GEOMETRY_COLUMN)?
        }
    } else {
        dataset.df().clone()
    };

    if let Some(columns) = columns {
        for column in columns {
            if !df.get_column_names().iter().any(|c| c.as_str() == column) {
                return Err(ProcessingError::MissingColumn {
                    column: column.clone(),
                    context: "spreadsheet".to_string(),
                });
            }
        }
        df = df.select(columns.iter().map(String::as_str))?;
    }
    Ok(df)
}

fn write_frame(
    worksheet: &mut Worksheet,
    frame: &DataFrame,
    params: &SpreadsheetParams,
) -> Result<()> {
    let header_format = Format::new().set_bold();

    for (col_index, column) in frame.get_columns().iter().enumerate() {
        let series = column.as_materialized_series();
        let col = col_index as u16;
        worksheet
            .write_string_with_format(0, col, series.name().as_str(), &header_format)
            .map_err(xlsx_err)?;
        write_series(worksheet, series, col)?;
    }

    let rows = frame.height() as u32;
    let cols = frame.width().saturating_sub(1) as u16;
    if params.freeze_panes {
        worksheet.set_freeze_panes(1, 0).map_err(xlsx_err)?;
    }
    if params.auto_filter && rows > 0 {
        worksheet.autofilter(0, 0, rows, cols).map_err(xlsx_err)?;
    }
    if params.autofit {
        worksheet.autofit();
    }
    Ok(())
}

/// Write one column of cells, starting below the header row. Null cells are
/// left blank.
fn write_series(worksheet: &mut Worksheet, series: &Series, col: u16) -> Result<()> {
    match series_dtype_category(series) {
        DtypeCategory::Numeric => {
            let ca = series.cast(&DataType::Float64)?;
            let ca = ca.f64()?;
            for (row, cell) in ca.into_iter().enumerate() {
                if let Some(value) = cell {
                    worksheet
                        .write_number(row as u32 + 1, col, value)
                        .map_err(xlsx_err)?;
                }
            }
        }
        DtypeCategory::Boolean => {
            let ca = series.bool()?;
            for (row, cell) in ca.into_iter().enumerate() {
                if let Some(value) = cell {
                    worksheet
                        .write_boolean(row as u32 + 1, col, value)
                        .map_err(xlsx_err)?;
                }
            }
        }
        DtypeCategory::String | DtypeCategory::Other => {
            for row in 0..series.len() {
                let value = series.get(row)?;
                if matches!(value, AnyValue::Null) {
                    continue;
                }
                worksheet
                    .write_string(row as u32 + 1, col, any_value_to_string(&value))
                    .map_err(xlsx_err)?;
            }
        }
    }
    Ok(())
}

fn xlsx_err(e: XlsxError) -> ProcessingError {
    ProcessingError::Collaborator(format!("spreadsheet encoding failed: {e}"))
}
