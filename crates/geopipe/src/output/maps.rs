//! Map generators (simple, choropleth, heat).
//!
//! Maps draw row geometries in lon/lat coordinates, framed by the union of
//! their bounding rectangles with a small padding. The simple map uses one
//! fixed style for every feature; the choropleth colors features by a value
//! column (continuously or through a classification scheme); the heat map
//! reduces each feature to a representative point and colors it by an
//! optional intensity column.

use std::iter;
use std::ops::Range;
use std::path::{Path, PathBuf};

use geo::{BoundingRect, Centroid, Geometry, Rect, coord};
use plotters::coord::Shift;
use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::element::Polygon as PolygonElement;
use plotters::prelude::*;
use serde::Deserialize;
use tracing::info;

use crate::config::{Params, parse_params};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::output::figure::{ClassScheme, Colormap, class_breaks, class_index, parse_color, render_err};
use crate::output::{Generator, ensure_parent_dir};
use crate::utils::to_f64_chunked;

type MapChart<'a, 'b> =
    ChartContext<'a, BitMapBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

/// Figure options shared by every map generator.
#[derive(Debug, Clone, Default, Deserialize)]
struct MapFigure {
    /// Figure size in pixels `[width, height]`.
    size: Option<[u32; 2]>,
    #[serde(default)]
    title: String,
    /// Suppress the coordinate axes entirely.
    #[serde(default)]
    axis_off: bool,
}

impl MapFigure {
    fn dimensions(&self) -> (u32, u32) {
        match self.size {
            Some([w, h]) => (w, h),
            None => (1200, 1200),
        }
    }
}

/// Union of all feature bounding rectangles.
fn map_bounds(geometries: &[Option<Geometry<f64>>]) -> Option<Rect<f64>> {
    let mut bounds: Option<Rect<f64>> = None;
    for geometry in geometries.iter().flatten() {
        if let Some(rect) = geometry.bounding_rect() {
            bounds = Some(match bounds {
                None => rect,
                Some(acc) => Rect::new(
                    coord! {
                        x: acc.min().x.min(rect.min().x),
                        y: acc.min().y.min(rect.min().y),
                    },
                    coord! {
                        x: acc.max().x.max(rect.max().x),
                        y: acc.max().y.max(rect.max().y),
                    },
                ),
            });
        }
    }
    bounds
}

/// Pad the frame by 5% per side; degenerate extents (a single point) get a
/// fixed margin so the axes stay well-formed.
fn padded_ranges(bounds: Rect<f64>) -> (Range<f64>, Range<f64>) {
    let pad_x = (bounds.width() * 0.05).max(0.01);
    let pad_y = (bounds.height() * 0.05).max(0.01);
    (
        (bounds.min().x - pad_x)..(bounds.max().x + pad_x),
        (bounds.min().y - pad_y)..(bounds.max().y + pad_y),
    )
}

fn build_map_chart<'a, 'b>(
    root: &'a DrawingArea<BitMapBackend<'b>, Shift>,
    figure: &MapFigure,
    bounds: Rect<f64>,
) -> Result<MapChart<'a, 'b>> {
    let (x_range, y_range) = padded_ranges(bounds);

    let mut builder = ChartBuilder::on(root);
    builder.margin(12);
    if !figure.axis_off {
        builder.x_label_area_size(40).y_label_area_size(60);
    }
    if !figure.title.is_empty() {
        builder.caption(&figure.title, ("sans-serif", 22));
    }
    let mut chart = builder
        .build_cartesian_2d(x_range, y_range)
        .map_err(render_err)?;

    if !figure.axis_off {
        chart
            .configure_mesh()
            .x_desc("Longitude")
            .y_desc("Latitude")
            .draw()
            .map_err(render_err)?;
    }
    Ok(chart)
}

/// Draw one geometry with the given fill, edge color and point radius.
fn draw_geometry(
    chart: &mut MapChart<'_, '_>,
    geometry: &Geometry<f64>,
    fill: RGBAColor,
    edge: RGBColor,
    marker_size: i32,
) -> Result<()> {
    match geometry {
        Geometry::Polygon(polygon) => draw_polygon(chart, polygon, fill, edge),
        Geometry::MultiPolygon(polygons) => {
            for polygon in &polygons.0 {
                draw_polygon(chart, polygon, fill, edge)?;
            }
            Ok(())
        }
        Geometry::Rect(rect) => draw_polygon(chart, &rect.to_polygon(), fill, edge),
        Geometry::Triangle(triangle) => draw_polygon(chart, &triangle.to_polygon(), fill, edge),
        Geometry::LineString(line) => draw_path(chart, line.coords().map(|c| (c.x, c.y)), fill),
        Geometry::MultiLineString(lines) => {
            for line in &lines.0 {
                draw_path(chart, line.coords().map(|c| (c.x, c.y)), fill)?;
            }
            Ok(())
        }
        Geometry::Line(line) => draw_path(
            chart,
            [(line.start.x, line.start.y), (line.end.x, line.end.y)].into_iter(),
            fill,
        ),
        Geometry::Point(point) => draw_point(chart, (point.x(), point.y()), fill, marker_size),
        Geometry::MultiPoint(points) => {
            for point in &points.0 {
                draw_point(chart, (point.x(), point.y()), fill, marker_size)?;
            }
            Ok(())
        }
        Geometry::GeometryCollection(collection) => {
            for member in &collection.0 {
                draw_geometry(chart, member, fill, edge, marker_size)?;
            }
            Ok(())
        }
    }
}

fn draw_polygon(
    chart: &mut MapChart<'_, '_>,
    polygon: &geo::Polygon<f64>,
    fill: RGBAColor,
    edge: RGBColor,
) -> Result<()> {
    let exterior: Vec<(f64, f64)> = polygon.exterior().coords().map(|c| (c.x, c.y)).collect();
    chart
        .draw_series(iter::once(PolygonElement::new(
            exterior.clone(),
            fill.filled(),
        )))
        .map_err(render_err)?;
    chart
        .draw_series(iter::once(PathElement::new(exterior, edge.stroke_width(1))))
        .map_err(render_err)?;
    Ok(())
}

fn draw_path(
    chart: &mut MapChart<'_, '_>,
    coords: impl Iterator<Item = (f64, f64)>,
    color: RGBAColor,
) -> Result<()> {
    chart
        .draw_series(iter::once(PathElement::new(
            coords.collect::<Vec<_>>(),
            color.stroke_width(2),
        )))
        .map_err(render_err)?;
    Ok(())
}

fn draw_point(
    chart: &mut MapChart<'_, '_>,
    coord: (f64, f64),
    color: RGBAColor,
    marker_size: i32,
) -> Result<()> {
    chart
        .draw_series(iter::once(Circle::new(coord, marker_size, color.filled())))
        .map_err(render_err)?;
    Ok(())
}

// =============================================================================
// Simple map
// =============================================================================

fn default_map_color() -> String {
    "blue".to_string()
}

fn default_edge_color() -> String {
    "black".to_string()
}

fn default_map_alpha() -> f64 {
    0.7
}

fn default_marker_size() -> i32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
struct SimpleMapParams {
    #[serde(default = "default_map_color")]
    color: String,
    #[serde(default = "default_edge_color")]
    edgecolor: String,
    #[serde(default = "default_map_alpha")]
    alpha: f64,
    #[serde(default = "default_marker_size")]
    markersize: i32,
    #[serde(flatten)]
    figure: MapFigure,
}

/// Every feature in one fixed style.
#[derive(Debug, Clone)]
pub struct SimpleMapGenerator {
    params: SimpleMapParams,
}

impl SimpleMapGenerator {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            params: parse_params("simple_map", params)?,
        })
    }
}

impl Generator for SimpleMapGenerator {
    fn name(&self) -> &'static str {
        "simple_map"
    }

    fn generate(&self, dataset: &Dataset, output_path: &Path) -> Result<PathBuf> {
        let p = &self.params;
        let geometries = dataset.geometries("simple_map")?;
        let fill = parse_color(&p.color)?.mix(p.alpha);
        let edge = parse_color(&p.edgecolor)?;

        ensure_parent_dir(output_path)?;
        let root =
            BitMapBackend::new(output_path, p.figure.dimensions()).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        if let Some(bounds) = map_bounds(&geometries) {
            let mut chart = build_map_chart(&root, &p.figure, bounds)?;
            for geometry in geometries.iter().flatten() {
                draw_geometry(&mut chart, geometry, fill, edge, p.markersize)?;
            }
        }

        root.present().map_err(render_err)?;
        info!("simple map written to {}", output_path.display());
        Ok(output_path.to_path_buf())
    }
}

// =============================================================================
// Choropleth map
// =============================================================================

fn default_choropleth_cmap() -> String {
    "ylorrd".to_string()
}

fn default_classes() -> usize {
    5
}

fn default_choropleth_alpha() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
struct ChoroplethParams {
    /// Value column driving the fill color.
    column: String,
    #[serde(default = "default_choropleth_cmap")]
    cmap: String,
    #[serde(default = "crate::output::figure::default_true")]
    legend: bool,
    /// Classification scheme; continuous normalization when absent.
    scheme: Option<ClassScheme>,
    /// Number of classes for a classification scheme.
    #[serde(default = "default_classes")]
    k: usize,
    #[serde(default = "default_edge_color")]
    edgecolor: String,
    #[serde(default = "default_choropleth_alpha")]
    alpha: f64,
    #[serde(default = "default_marker_size")]
    markersize: i32,
    #[serde(flatten)]
    figure: MapFigure,
}

/// Features colored by a value column.
#[derive(Debug, Clone)]
pub struct ChoroplethMapGenerator {
    params: ChoroplethParams,
}

impl ChoroplethMapGenerator {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            params: parse_params("choropleth_map", params)?,
        })
    }
}

impl Generator for ChoroplethMapGenerator {
    fn name(&self) -> &'static str {
        "choropleth_map"
    }

    fn generate(&self, dataset: &Dataset, output_path: &Path) -> Result<PathBuf> {
        let p = &self.params;
        let values = to_f64_chunked(
            dataset.column(&p.column, "choropleth_map")?,
            "choropleth_map",
        )?;
        let geometries = dataset.geometries("choropleth_map")?;
        let cmap = Colormap::by_name(&p.cmap)?;
        let edge = parse_color(&p.edgecolor)?;

        let finite: Vec<f64> = (&values).into_iter().flatten().filter(|v| v.is_finite()).collect();
        let breaks = p
            .scheme
            .map(|scheme| class_breaks(&finite, p.k, scheme))
            .filter(|b| !b.is_empty());
        let lo = finite.iter().copied().fold(f64::MAX, f64::min);
        let hi = finite.iter().copied().fold(f64::MIN, f64::max);

        let color_for = |value: f64| -> RGBColor {
            match &breaks {
                Some(breaks) => {
                    let index = class_index(breaks, value);
                    cmap.sample(index as f64 / (breaks.len() - 1).max(1) as f64)
                }
                None => {
                    let t = if hi > lo { (value - lo) / (hi - lo) } else { 0.5 };
                    cmap.sample(t)
                }
            }
        };

        ensure_parent_dir(output_path)?;
        let root =
            BitMapBackend::new(output_path, p.figure.dimensions()).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        if let Some(bounds) = map_bounds(&geometries) {
            let mut chart = build_map_chart(&root, &p.figure, bounds)?;

            for (row, geometry) in geometries.iter().enumerate() {
                let (Some(geometry), Some(value)) = (geometry, values.get(row)) else {
                    continue;
                };
                if !value.is_finite() {
                    continue;
                }
                let fill = color_for(value).mix(p.alpha);
                draw_geometry(&mut chart, geometry, fill, edge, p.markersize)?;
            }

            if p.legend && let Some(breaks) = &breaks {
                let mut lower = lo;
                for (index, upper) in breaks.iter().enumerate() {
                    let swatch = cmap.sample(index as f64 / (breaks.len() - 1).max(1) as f64);
                    let label = format!("{lower:.2} to {upper:.2}");
                    chart
                        .draw_series(iter::empty::<Rectangle<(f64, f64)>>())
                        .map_err(render_err)?
                        .label(label)
                        .legend(move |(x, y)| {
                            Rectangle::new([(x, y - 6), (x + 14, y + 6)], swatch.filled())
                        });
                    lower = *upper;
                }
                chart
                    .configure_series_labels()
                    .background_style(WHITE.mix(0.8))
                    .border_style(BLACK)
                    .draw()
                    .map_err(render_err)?;
            }
        }

        root.present().map_err(render_err)?;
        info!("choropleth map written to {}", output_path.display());
        Ok(output_path.to_path_buf())
    }
}

// =============================================================================
// Heat map
// =============================================================================

fn default_heat_cmap() -> String {
    "hot".to_string()
}

fn default_heat_marker() -> i32 {
    12
}

fn default_heat_alpha() -> f64 {
    0.5
}

#[derive(Debug, Clone, Deserialize)]
struct HeatMapParams {
    /// Intensity column; uniform red markers when absent.
    column: Option<String>,
    #[serde(default = "default_heat_marker")]
    markersize: i32,
    #[serde(default = "default_heat_alpha")]
    alpha: f64,
    #[serde(default = "default_heat_cmap")]
    cmap: String,
    #[serde(flatten)]
    figure: MapFigure,
}

/// Representative points, optionally colored by intensity.
#[derive(Debug, Clone)]
pub struct HeatMapGenerator {
    params: HeatMapParams,
}

impl HeatMapGenerator {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            params: parse_params("heat_map", params)?,
        })
    }
}

impl Generator for HeatMapGenerator {
    fn name(&self) -> &'static str {
        "heat_map"
    }

    fn generate(&self, dataset: &Dataset, output_path: &Path) -> Result<PathBuf> {
        let p = &self.params;
        let geometries = dataset.geometries("heat_map")?;
        let values = match &p.column {
            Some(name) => Some(to_f64_chunked(
                dataset.column(name, "heat_map")?,
                "heat_map",
            )?),
            None => None,
        };
        let cmap = Colormap::by_name(&p.cmap)?;

        let finite: Vec<f64> = values
            .iter()
            .flat_map(|ca| ca.into_iter().flatten())
            .filter(|v| v.is_finite())
            .collect();
        let lo = finite.iter().copied().fold(f64::MAX, f64::min);
        let hi = finite.iter().copied().fold(f64::MIN, f64::max);

        ensure_parent_dir(output_path)?;
        let root =
            BitMapBackend::new(output_path, p.figure.dimensions()).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        if let Some(bounds) = map_bounds(&geometries) {
            let mut chart = build_map_chart(&root, &p.figure, bounds)?;

            for (row, geometry) in geometries.iter().enumerate() {
                let Some(geometry) = geometry else { continue };
                let Some(center) = geometry.centroid() else {
                    continue;
                };
                let color = match &values {
                    Some(ca) => match ca.get(row) {
                        Some(v) if v.is_finite() => {
                            let t = if hi > lo { (v - lo) / (hi - lo) } else { 0.5 };
                            cmap.sample(t)
                        }
                        _ => continue,
                    },
                    None => RGBColor(214, 39, 40),
                };
                draw_point(
                    &mut chart,
                    (center.x(), center.y()),
                    color.mix(p.alpha),
                    p.markersize,
                )?;
            }
        }

        root.present().map_err(render_err)?;
        info!("heat map written to {}", output_path.display());
        Ok(output_path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::GEOMETRY_COLUMN;
    use polars::prelude::*;
    use serde_json::json;

    fn dataset() -> Dataset {
        let df = df!(
            "density" => [1.0f64, 5.0, 9.0],
            GEOMETRY_COLUMN => [
                "POLYGON((0 0,1 0,1 1,0 1,0 0))",
                "POLYGON((2 0,3 0,3 1,2 1,2 0))",
                "POINT(5 5)",
            ],
        )
        .unwrap();
        Dataset::new(df)
    }

    #[test]
    fn test_map_bounds_union() {
        let geometries = dataset().geometries("test").unwrap();
        let bounds = map_bounds(&geometries).unwrap();
        assert_eq!(bounds.min().x, 0.0);
        assert_eq!(bounds.max().x, 5.0);
        assert_eq!(bounds.max().y, 5.0);
    }

    #[test]
    fn test_padded_ranges_degenerate_extent() {
        let rect = Rect::new(coord! { x: 2.0, y: 3.0 }, coord! { x: 2.0, y: 3.0 });
        let (xs, ys) = padded_ranges(rect);
        assert!(xs.start < xs.end);
        assert!(ys.start < ys.end);
    }

    #[test]
    fn test_choropleth_missing_value_column() {
        let params = json!({"column": "altitude"});
        let serde_json::Value::Object(params) = params else {
            unreachable!()
        };
        let generator = ChoroplethMapGenerator::from_params(&params).unwrap();
        let err = generator
            .generate(&dataset(), Path::new("/nonexistent/map.png"))
            .unwrap_err();
        assert_eq!(err.error_code(), "MISSING_COLUMN");
    }

    #[test]
    fn test_simple_map_requires_geometry_column() {
        let plain = Dataset::new(df!("x" => [1i64, 2]).unwrap());
        let params = json!({});
        let serde_json::Value::Object(params) = params else {
            unreachable!()
        };
        let generator = SimpleMapGenerator::from_params(&params).unwrap();
        let err = generator
            .generate(&plain, Path::new("/nonexistent/map.png"))
            .unwrap_err();
        assert_eq!(err.error_code(), "MISSING_COLUMN");
    }
}
