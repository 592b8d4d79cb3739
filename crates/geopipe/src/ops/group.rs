//! Grouping and aggregation.
//!
//! Partitions rows by the distinct combinations of the grouping columns and
//! applies one aggregation per target column. Output rows appear in
//! first-appearance order of their group key (stable group-by). Geometry is
//! either dropped or dissolved per group, controlled by `keep_geometry`.

use std::collections::BTreeMap;

use geo::{BooleanOps, Geometry, GeometryCollection, MultiLineString, MultiPoint, MultiPolygon};
use polars::prelude::*;
use serde::Deserialize;
use tracing::debug;

use crate::config::{Params, parse_params};
use crate::dataset::{Dataset, GEOMETRY_COLUMN, geometry_to_wkt, parse_wkt};
use crate::error::{ProcessingError, Result};
use crate::ops::Operator;

/// Aggregation function names accepted in group-by descriptors.
const VALID_AGGREGATIONS: [&str; 11] = [
    "sum", "mean", "median", "count", "min", "max", "std", "var", "first", "last", "nunique",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Agg {
    Sum,
    Mean,
    Median,
    Count,
    Min,
    Max,
    Std,
    Var,
    First,
    Last,
    NUnique,
}

impl Agg {
    fn parse(name: &str, column: &str) -> Result<Self> {
        Ok(match name {
            "sum" => Self::Sum,
            "mean" => Self::Mean,
            "median" => Self::Median,
            "count" => Self::Count,
            "min" => Self::Min,
            "max" => Self::Max,
            "std" => Self::Std,
            "var" => Self::Var,
            "first" => Self::First,
            "last" => Self::Last,
            "nunique" => Self::NUnique,
            other => {
                return Err(ProcessingError::UnknownAggregation {
                    function: other.to_string(),
                    column: column.to_string(),
                    valid: VALID_AGGREGATIONS.to_vec(),
                });
            }
        })
    }

    fn expr(self, column: &str) -> Expr {
        let base = col(column);
        match self {
            Self::Sum => base.sum(),
            Self::Mean => base.mean(),
            Self::Median => base.median(),
            // count and nunique consider non-null values only
            Self::Count => base.count(),
            Self::Min => base.min(),
            Self::Max => base.max(),
            Self::Std => base.std(1),
            Self::Var => base.var(1),
            Self::First => base.first(),
            Self::Last => base.last(),
            Self::NUnique => base.n_unique(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GroupByParams {
    columns: Vec<String>,
    aggregations: BTreeMap<String, String>,
    #[serde(default)]
    keep_geometry: bool,
}

/// Groups rows and aggregates target columns.
#[derive(Debug, Clone)]
pub struct GroupByOp {
    columns: Vec<String>,
    aggregations: Vec<(String, Agg)>,
    keep_geometry: bool,
}

impl GroupByOp {
    pub fn from_params(params: &Params) -> Result<Self> {
        let raw: GroupByParams = parse_params("groupby", params)?;
        if raw.columns.is_empty() {
            return Err(ProcessingError::InvalidConfig(
                "'groupby' descriptor requires at least one grouping column".to_string(),
            ));
        }

        let aggregations = raw
            .aggregations
            .iter()
            .map(|(column, function)| Ok((column.clone(), Agg::parse(function, column)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            columns: raw.columns,
            aggregations,
            keep_geometry: raw.keep_geometry,
        })
    }
}

impl Operator for GroupByOp {
    fn name(&self) -> &'static str {
        "groupby"
    }

    fn apply(&self, dataset: &Dataset) -> Result<Dataset> {
        for column in &self.columns {
            dataset.column(column, "groupby grouping column")?;
        }
        for (column, _) in &self.aggregations {
            dataset.column(column, "groupby aggregation target")?;
        }

        let keys: Vec<Expr> = self.columns.iter().map(|c| col(c.as_str())).collect();
        let mut aggs: Vec<Expr> = self
            .aggregations
            .iter()
            .map(|(column, agg)| agg.expr(column))
            .collect();

        let dissolve = self.keep_geometry && dataset.has_geometry();
        if dissolve {
            // Collect each group's WKT cells; the union happens below.
            aggs.push(col(GEOMETRY_COLUMN));
        }

        let frame = if dataset.has_geometry() && !dissolve {
            dataset.df().drop(GEOMETRY_COLUMN)?
        } else {
            dataset.df().clone()
        };

        let mut grouped = frame
            .lazy()
            .group_by_stable(keys)
            .agg(aggs)
            .collect()
            .map_err(ProcessingError::from)?;

        if dissolve {
            let dissolved = dissolve_geometry_lists(&grouped)?;
            grouped.replace(GEOMETRY_COLUMN, dissolved)?;
        }

        debug!(
            "groupby produced {} groups from {} rows",
            grouped.height(),
            dataset.height()
        );
        Ok(dataset.derive(grouped))
    }
}

/// Union each group's collected geometries into a single WKT cell.
fn dissolve_geometry_lists(grouped: &DataFrame) -> Result<Series> {
    let lists = grouped.column(GEOMETRY_COLUMN)?.as_materialized_series();
    let lists = lists.list()?;

    let mut cells: Vec<Option<String>> = Vec::with_capacity(grouped.height());
    for entry in lists {
        let Some(members) = entry else {
            cells.push(None);
            continue;
        };
        let strings = members.str()?.clone();
        let mut geometries = Vec::new();
        for wkt_cell in strings.into_iter().flatten() {
            geometries.push(parse_wkt(wkt_cell)?);
        }
        cells.push(union_geometries(geometries).map(|g| geometry_to_wkt(&g)));
    }

    Ok(Series::new(GEOMETRY_COLUMN.into(), cells))
}

/// Combine a group's geometries. Polygonal members are dissolved with boolean
/// union; homogeneous point/line groups merge into multi-geometries; anything
/// mixed falls back to a geometry collection.
fn union_geometries(geometries: Vec<Geometry<f64>>) -> Option<Geometry<f64>> {
    if geometries.is_empty() {
        return None;
    }

    let mut polygons = Vec::new();
    let mut points = Vec::new();
    let mut lines = Vec::new();
    let mut other = Vec::new();
    for geometry in geometries {
        match geometry {
            Geometry::Polygon(p) => polygons.push(p),
            Geometry::MultiPolygon(mp) => polygons.extend(mp.0),
            Geometry::Point(p) => points.push(p),
            Geometry::MultiPoint(mp) => points.extend(mp.0),
            Geometry::LineString(l) => lines.push(l),
            Geometry::MultiLineString(ml) => lines.extend(ml.0),
            g => other.push(g),
        }
    }

    match (
        polygons.is_empty(),
        points.is_empty(),
        lines.is_empty(),
        other.is_empty(),
    ) {
        (false, true, true, true) => {
            let mut acc = MultiPolygon::new(vec![polygons[0].clone()]);
            for polygon in &polygons[1..] {
                acc = acc.union(&MultiPolygon::new(vec![polygon.clone()]));
            }
            let mut dissolved = acc.0;
            if dissolved.len() == 1 {
                dissolved.pop().map(Geometry::Polygon)
            } else {
                Some(Geometry::MultiPolygon(MultiPolygon::new(dissolved)))
            }
        }
        (true, false, true, true) => {
            if points.len() == 1 {
                points.pop().map(Geometry::Point)
            } else {
                Some(Geometry::MultiPoint(MultiPoint::new(points)))
            }
        }
        (true, true, false, true) => {
            if lines.len() == 1 {
                lines.pop().map(Geometry::LineString)
            } else {
                Some(Geometry::MultiLineString(MultiLineString::new(lines)))
            }
        }
        _ => {
            let mut members: Vec<Geometry<f64>> = Vec::new();
            members.extend(polygons.into_iter().map(Geometry::Polygon));
            members.extend(points.into_iter().map(Geometry::Point));
            members.extend(lines.into_iter().map(Geometry::LineString));
            members.extend(other);
            Some(Geometry::GeometryCollection(GeometryCollection(members)))
        }
    }
}
