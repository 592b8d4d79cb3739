//! In-memory dataset threaded through the pipeline.
//!
//! A [`Dataset`] wraps a polars `DataFrame` in which each row may carry a
//! geometry, stored as a WKT string in the [`GEOMETRY_COLUMN`] column. Keeping
//! geometry inside the frame means row-subset operations (filter, sort, limit)
//! move geometries together with their attributes without any bookkeeping.
//!
//! Operators never mutate a dataset in place: they take `&Dataset` and return
//! a new owned one.

use geo::Geometry;
use polars::prelude::*;
use wkt::{ToWkt, TryFromWkt};

use crate::error::{ProcessingError, Result};

/// Name of the column holding per-row WKT geometries.
pub const GEOMETRY_COLUMN: &str = "geometry";

/// Tabular data with optional per-row geometry.
#[derive(Debug, Clone)]
pub struct Dataset {
    df: DataFrame,
    crs: Option<String>,
}

impl Dataset {
    /// Wrap an existing DataFrame. The geometry column, if present, must hold
    /// WKT strings.
    pub fn new(df: DataFrame) -> Self {
        Self { df, crs: None }
    }

    /// Wrap a DataFrame together with its coordinate reference system label.
    pub fn with_crs(df: DataFrame, crs: impl Into<String>) -> Self {
        Self {
            df,
            crs: Some(crs.into()),
        }
    }

    /// Produce a new dataset around `df`, carrying this dataset's CRS over.
    pub fn derive(&self, df: DataFrame) -> Self {
        Self {
            df,
            crs: self.crs.clone(),
        }
    }

    pub fn df(&self) -> &DataFrame {
        &self.df
    }

    pub fn into_df(self) -> DataFrame {
        self.df
    }

    /// CRS label of the source file, when known (GeoJSON input is WGS84).
    pub fn crs(&self) -> Option<&str> {
        self.crs.as_deref()
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn width(&self) -> usize {
        self.df.width()
    }

    /// Column names in frame order.
    pub fn column_names(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.df.get_column_names().iter().any(|c| c.as_str() == name)
    }

    /// Fetch a column or fail with a `MissingColumn` error naming the caller.
    pub fn column(&self, name: &str, context: &str) -> Result<&Series> {
        match self.df.column(name) {
            Ok(col) => Ok(col.as_materialized_series()),
            Err(_) => Err(ProcessingError::MissingColumn {
                column: name.to_string(),
                context: context.to_string(),
            }),
        }
    }

    pub fn has_geometry(&self) -> bool {
        self.has_column(GEOMETRY_COLUMN)
    }

    /// Decode the geometry column into `geo` geometries, one per row.
    ///
    /// Rows without geometry decode to `None`. Fails when the dataset has no
    /// geometry column at all, or when a cell holds malformed WKT.
    pub fn geometries(&self, context: &str) -> Result<Vec<Option<Geometry<f64>>>> {
        let series = self.column(GEOMETRY_COLUMN, context)?;
        let strings = series.str().map_err(|e| {
            ProcessingError::Collaborator(format!(
                "{context}: geometry column does not hold WKT text ({e})"
            ))
        })?;

        strings
            .into_iter()
            .map(|cell| cell.map(|w| parse_wkt(w)).transpose())
            .collect()
    }

    /// Copy of this dataset without the geometry column (no-op when absent).
    pub fn without_geometry(&self) -> Result<Dataset> {
        if self.has_geometry() {
            Ok(self.derive(self.df.drop(GEOMETRY_COLUMN)?))
        } else {
            Ok(self.clone())
        }
    }
}

/// Encode a geometry as WKT for storage in the geometry column.
pub fn geometry_to_wkt(geom: &Geometry<f64>) -> String {
    geom.wkt_string()
}

/// Decode one WKT cell.
pub fn parse_wkt(wkt_text: &str) -> Result<Geometry<f64>> {
    Geometry::try_from_wkt_str(wkt_text)
        .map_err(|e| ProcessingError::Collaborator(format!("invalid WKT geometry: {e}")))
}
