//! Chart generators (bar, pie, line, scatter).
//!
//! Every chart shares the figure contract in [`super::figure`]: pixel size,
//! optional title and axis labels, optional mesh. Column validation happens
//! before the rendering collaborator is invoked, so a misconfigured chart
//! fails without touching the output file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use plotters::prelude::*;
use polars::prelude::AnyValue;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::{Params, parse_params};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::output::figure::{Colormap, FigureConfig, parse_color, render_err, series_color};
use crate::output::{Generator, ensure_parent_dir};
use crate::utils::{any_value_to_string, to_f64_chunked};

/// Aggregate rows into per-category totals in first-appearance order.
///
/// With a value column the totals are sums; without one they are row counts.
/// Null categories and null values are skipped.
fn category_totals(
    dataset: &Dataset,
    x: &str,
    y: Option<&str>,
    context: &str,
) -> Result<Vec<(String, f64)>> {
    let x_series = dataset.column(x, context)?;
    let y_values = match y {
        Some(name) => Some(to_f64_chunked(dataset.column(name, context)?, context)?),
        None => None,
    };

    let mut order: Vec<String> = Vec::new();
    let mut totals: HashMap<String, f64> = HashMap::new();
    for row in 0..dataset.height() {
        let key = x_series.get(row)?;
        if matches!(key, AnyValue::Null) {
            continue;
        }
        let key = any_value_to_string(&key);

        let increment = match &y_values {
            None => 1.0,
            Some(ca) => match ca.get(row) {
                Some(v) => v,
                None => continue,
            },
        };

        if !totals.contains_key(&key) {
            order.push(key.clone());
        }
        *totals.entry(key).or_insert(0.0) += increment;
    }

    Ok(order
        .into_iter()
        .map(|key| {
            let total = totals[&key];
            (key, total)
        })
        .collect())
}

fn padded_value_range(values: &[f64]) -> (f64, f64) {
    let max = values.iter().copied().fold(f64::MIN, f64::max).max(0.0);
    let min = values.iter().copied().fold(f64::MAX, f64::min).min(0.0);
    let span = (max - min).max(1e-9);
    (min, max + span * 0.05)
}

// =============================================================================
// Bar chart
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Orientation {
    #[default]
    Vertical,
    Horizontal,
}

fn default_bar_color() -> String {
    "skyblue".to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct BarChartParams {
    /// Category column.
    x: String,
    /// Value column to sum per category; counts rows when absent.
    y: Option<String>,
    #[serde(default)]
    orientation: Orientation,
    #[serde(default = "default_bar_color")]
    color: String,
    /// Order bars by descending value.
    #[serde(default)]
    sort: bool,
    /// Keep only the n largest categories.
    top_n: Option<usize>,
    #[serde(flatten)]
    figure: FigureConfig,
}

/// Bars per category, vertical or horizontal.
#[derive(Debug, Clone)]
pub struct BarChartGenerator {
    params: BarChartParams,
}

impl BarChartGenerator {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            params: parse_params("bar_chart", params)?,
        })
    }
}

impl Generator for BarChartGenerator {
    fn name(&self) -> &'static str {
        "bar_chart"
    }

    fn generate(&self, dataset: &Dataset, output_path: &Path) -> Result<PathBuf> {
        let p = &self.params;
        let mut data = category_totals(dataset, &p.x, p.y.as_deref(), "bar_chart")?;
        if p.sort {
            data.sort_by(|a, b| b.1.total_cmp(&a.1));
        }
        if let Some(n) = p.top_n {
            data.truncate(n);
        }
        let color = parse_color(&p.color)?;

        ensure_parent_dir(output_path)?;
        let (width, height) = p.figure.dimensions((1000, 640));
        let root = BitMapBackend::new(output_path, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        if !data.is_empty() {
            let n = data.len();
            let values: Vec<f64> = data.iter().map(|d| d.1).collect();
            let (lo, hi) = padded_value_range(&values);
            let category_range = -0.5f64..(n as f64 - 0.5);

            let mut builder = ChartBuilder::on(&root);
            builder.margin(12).x_label_area_size(46).y_label_area_size(60);
            if !p.figure.title.is_empty() {
                builder.caption(&p.figure.title, ("sans-serif", 22));
            }

            let label_for = |position: &f64| -> String {
                let nearest = position.round();
                if (position - nearest).abs() < 1e-6 && nearest >= 0.0 && (nearest as usize) < n {
                    data[nearest as usize].0.clone()
                } else {
                    String::new()
                }
            };
            let value_desc = if p.figure.ylabel.is_empty() {
                p.y.clone().unwrap_or_else(|| "count".to_string())
            } else {
                p.figure.ylabel.clone()
            };
            let category_desc = if p.figure.xlabel.is_empty() {
                p.x.clone()
            } else {
                p.figure.xlabel.clone()
            };

            match p.orientation {
                Orientation::Vertical => {
                    let mut chart = builder
                        .build_cartesian_2d(category_range, lo..hi)
                        .map_err(render_err)?;
                    if p.figure.grid {
                        chart
                            .configure_mesh()
                            .x_labels(n.min(30))
                            .x_label_formatter(&label_for)
                            .x_desc(category_desc)
                            .y_desc(value_desc)
                            .draw()
                            .map_err(render_err)?;
                    }
                    chart
                        .draw_series(data.iter().enumerate().map(|(i, (_, value))| {
                            Rectangle::new(
                                [(i as f64 - 0.4, 0.0), (i as f64 + 0.4, *value)],
                                color.filled(),
                            )
                        }))
                        .map_err(render_err)?;
                }
                Orientation::Horizontal => {
                    let mut chart = builder
                        .build_cartesian_2d(lo..hi, category_range)
                        .map_err(render_err)?;
                    if p.figure.grid {
                        chart
                            .configure_mesh()
                            .y_labels(n.min(30))
                            .y_label_formatter(&label_for)
                            .x_desc(value_desc)
                            .y_desc(category_desc)
                            .draw()
                            .map_err(render_err)?;
                    }
                    chart
                        .draw_series(data.iter().enumerate().map(|(i, (_, value))| {
                            Rectangle::new(
                                [(0.0, i as f64 - 0.4), (*value, i as f64 + 0.4)],
                                color.filled(),
                            )
                        }))
                        .map_err(render_err)?;
                }
            }
        }

        root.present().map_err(render_err)?;
        info!("bar chart written to {}", output_path.display());
        Ok(output_path.to_path_buf())
    }
}

// =============================================================================
// Pie chart
// =============================================================================

fn default_start_angle() -> f64 {
    90.0
}

#[derive(Debug, Clone, Deserialize)]
struct PieChartParams {
    /// Category column.
    column: String,
    /// Value column to sum per slice; counts rows when absent.
    values: Option<String>,
    /// Keep only the n largest slices.
    top_n: Option<usize>,
    #[serde(default = "default_start_angle")]
    start_angle: f64,
    #[serde(flatten)]
    figure: FigureConfig,
}

/// One slice per category, sized by count or by a value column.
#[derive(Debug, Clone)]
pub struct PieChartGenerator {
    params: PieChartParams,
}

impl PieChartGenerator {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            params: parse_params("pie_chart", params)?,
        })
    }
}

impl Generator for PieChartGenerator {
    fn name(&self) -> &'static str {
        "pie_chart"
    }

    fn generate(&self, dataset: &Dataset, output_path: &Path) -> Result<PathBuf> {
        let p = &self.params;
        let mut data = category_totals(dataset, &p.column, p.values.as_deref(), "pie_chart")?;

        let before = data.len();
        data.retain(|(_, value)| *value > 0.0);
        if data.len() < before {
            warn!(
                "pie_chart: dropped {} non-positive slices",
                before - data.len()
            );
        }
        data.sort_by(|a, b| b.1.total_cmp(&a.1));
        if let Some(n) = p.top_n {
            data.truncate(n);
        }

        ensure_parent_dir(output_path)?;
        let (width, height) = p.figure.dimensions((800, 800));
        let root = BitMapBackend::new(output_path, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        if !data.is_empty() {
            let sizes: Vec<f64> = data.iter().map(|d| d.1).collect();
            let labels: Vec<String> = data.iter().map(|d| d.0.clone()).collect();
            let colors: Vec<RGBColor> = (0..data.len()).map(series_color).collect();

            let center = ((width / 2) as i32, (height / 2) as i32);
            let radius = f64::from(width.min(height)) * 0.35;

            let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
            pie.start_angle(p.start_angle);
            pie.label_style(("sans-serif", 16).into_font());
            pie.percentages(("sans-serif", 13).into_font());
            root.draw(&pie).map_err(render_err)?;

            if !p.figure.title.is_empty() {
                root.draw(&Text::new(
                    p.figure.title.clone(),
                    (16, 12),
                    ("sans-serif", 22).into_font(),
                ))
                .map_err(render_err)?;
            }
        }

        root.present().map_err(render_err)?;
        info!("pie chart written to {}", output_path.display());
        Ok(output_path.to_path_buf())
    }
}

// =============================================================================
// Line chart
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum YColumns {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
struct LineChartParams {
    x: String,
    y: YColumns,
    #[serde(flatten)]
    figure: FigureConfig,
}

/// One line per y column over a shared numeric x axis.
#[derive(Debug, Clone)]
pub struct LineChartGenerator {
    params: LineChartParams,
}

impl LineChartGenerator {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            params: parse_params("line_chart", params)?,
        })
    }
}

impl Generator for LineChartGenerator {
    fn name(&self) -> &'static str {
        "line_chart"
    }

    fn generate(&self, dataset: &Dataset, output_path: &Path) -> Result<PathBuf> {
        let p = &self.params;
        let y_columns: Vec<String> = match &p.y {
            YColumns::One(name) => vec![name.clone()],
            YColumns::Many(names) => names.clone(),
        };

        let xs = to_f64_chunked(dataset.column(&p.x, "line_chart")?, "line_chart")?;
        let mut series: Vec<(String, Vec<(f64, f64)>)> = Vec::with_capacity(y_columns.len());
        for name in &y_columns {
            let ys = to_f64_chunked(dataset.column(name, "line_chart")?, "line_chart")?;
            let points: Vec<(f64, f64)> = (&xs)
                .into_iter()
                .zip((&ys).into_iter())
                .filter_map(|(x, y)| match (x, y) {
                    (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some((x, y)),
                    _ => None,
                })
                .collect();
            series.push((name.clone(), points));
        }

        ensure_parent_dir(output_path)?;
        let (width, height) = p.figure.dimensions((1000, 640));
        let root = BitMapBackend::new(output_path, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let all_points: Vec<(f64, f64)> = series.iter().flat_map(|s| s.1.iter().copied()).collect();
        if !all_points.is_empty() {
            let (x_lo, x_hi) = span_of(all_points.iter().map(|p| p.0));
            let (y_lo, y_hi) = span_of(all_points.iter().map(|p| p.1));

            let mut builder = ChartBuilder::on(&root);
            builder.margin(12).x_label_area_size(46).y_label_area_size(60);
            if !p.figure.title.is_empty() {
                builder.caption(&p.figure.title, ("sans-serif", 22));
            }
            let mut chart = builder
                .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)
                .map_err(render_err)?;

            if p.figure.grid {
                let x_desc = if p.figure.xlabel.is_empty() {
                    p.x.clone()
                } else {
                    p.figure.xlabel.clone()
                };
                chart
                    .configure_mesh()
                    .x_desc(x_desc)
                    .y_desc(p.figure.ylabel.clone())
                    .draw()
                    .map_err(render_err)?;
            }

            let multi = series.len() > 1;
            for (index, (name, points)) in series.iter().enumerate() {
                let color = series_color(index);
                let anno = chart
                    .draw_series(LineSeries::new(
                        points.iter().copied(),
                        color.stroke_width(2),
                    ))
                    .map_err(render_err)?;
                if multi {
                    anno.label(name.clone()).legend(move |(x, y)| {
                        PathElement::new(vec![(x, y), (x + 18, y)], color.stroke_width(2))
                    });
                }
            }

            if multi {
                chart
                    .configure_series_labels()
                    .background_style(WHITE.mix(0.8))
                    .border_style(BLACK)
                    .draw()
                    .map_err(render_err)?;
            }
        }

        root.present().map_err(render_err)?;
        info!("line chart written to {}", output_path.display());
        Ok(output_path.to_path_buf())
    }
}

fn span_of(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (mut lo, mut hi) = (f64::MAX, f64::MIN);
    for v in values {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    let pad = ((hi - lo).abs()).max(1e-9) * 0.05;
    (lo - pad, hi + pad)
}

// =============================================================================
// Scatter chart
// =============================================================================

fn default_alpha() -> f64 {
    0.6
}

fn default_cmap() -> String {
    "viridis".to_string()
}

fn default_point_color() -> String {
    "blue".to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct ScatterChartParams {
    x: String,
    y: String,
    /// Column scaling the point radius.
    size: Option<String>,
    /// Column mapped through the colormap.
    color: Option<String>,
    #[serde(default = "default_alpha")]
    alpha: f64,
    #[serde(default = "default_cmap")]
    cmap: String,
    #[serde(default = "default_point_color")]
    point_color: String,
    #[serde(flatten)]
    figure: FigureConfig,
}

/// Points at (x, y), optionally sized and colored by further columns.
#[derive(Debug, Clone)]
pub struct ScatterChartGenerator {
    params: ScatterChartParams,
}

impl ScatterChartGenerator {
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            params: parse_params("scatter_chart", params)?,
        })
    }
}

impl Generator for ScatterChartGenerator {
    fn name(&self) -> &'static str {
        "scatter_chart"
    }

    fn generate(&self, dataset: &Dataset, output_path: &Path) -> Result<PathBuf> {
        let p = &self.params;
        let context = "scatter_chart";
        let xs = to_f64_chunked(dataset.column(&p.x, context)?, context)?;
        let ys = to_f64_chunked(dataset.column(&p.y, context)?, context)?;
        let sizes = match &p.size {
            Some(name) => Some(to_f64_chunked(dataset.column(name, context)?, context)?),
            None => None,
        };
        let colors = match &p.color {
            Some(name) => Some(to_f64_chunked(dataset.column(name, context)?, context)?),
            None => None,
        };
        let cmap = Colormap::by_name(&p.cmap)?;
        let base_color = parse_color(&p.point_color)?;

        struct Dot {
            x: f64,
            y: f64,
            size: Option<f64>,
            color: Option<f64>,
        }
        let mut dots = Vec::new();
        for row in 0..dataset.height() {
            let (Some(x), Some(y)) = (xs.get(row), ys.get(row)) else {
                continue;
            };
            if !x.is_finite() || !y.is_finite() {
                continue;
            }
            dots.push(Dot {
                x,
                y,
                size: sizes.as_ref().and_then(|ca| ca.get(row)),
                color: colors.as_ref().and_then(|ca| ca.get(row)),
            });
        }

        let size_span = sizes.as_ref().map(|_| {
            span_exact(dots.iter().filter_map(|d| d.size))
        });
        let color_span = colors.as_ref().map(|_| {
            span_exact(dots.iter().filter_map(|d| d.color))
        });

        ensure_parent_dir(output_path)?;
        let (width, height) = p.figure.dimensions((1000, 640));
        let root = BitMapBackend::new(output_path, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        if !dots.is_empty() {
            let (x_lo, x_hi) = span_of(dots.iter().map(|d| d.x));
            let (y_lo, y_hi) = span_of(dots.iter().map(|d| d.y));

            let mut builder = ChartBuilder::on(&root);
            builder.margin(12).x_label_area_size(46).y_label_area_size(60);
            if !p.figure.title.is_empty() {
                builder.caption(&p.figure.title, ("sans-serif", 22));
            }
            let mut chart = builder
                .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)
                .map_err(render_err)?;

            if p.figure.grid {
                let x_desc = if p.figure.xlabel.is_empty() {
                    p.x.clone()
                } else {
                    p.figure.xlabel.clone()
                };
                let y_desc = if p.figure.ylabel.is_empty() {
                    p.y.clone()
                } else {
                    p.figure.ylabel.clone()
                };
                chart
                    .configure_mesh()
                    .x_desc(x_desc)
                    .y_desc(y_desc)
                    .draw()
                    .map_err(render_err)?;
            }

            chart
                .draw_series(dots.iter().map(|dot| {
                    let radius = match (dot.size, size_span) {
                        (Some(v), Some((lo, hi))) => 3.0 + normalize(v, lo, hi) * 11.0,
                        _ => 5.0,
                    };
                    let fill = match (dot.color, color_span) {
                        (Some(v), Some((lo, hi))) => cmap.sample(normalize(v, lo, hi)),
                        _ => base_color,
                    };
                    Circle::new((dot.x, dot.y), radius as i32, fill.mix(p.alpha).filled())
                }))
                .map_err(render_err)?;
        }

        root.present().map_err(render_err)?;
        info!("scatter chart written to {}", output_path.display());
        Ok(output_path.to_path_buf())
    }
}

fn span_exact(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (mut lo, mut hi) = (f64::MAX, f64::MIN);
    for v in values {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    (lo, hi)
}

fn normalize(value: f64, lo: f64, hi: f64) -> f64 {
    if hi > lo { (value - lo) / (hi - lo) } else { 0.5 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;
    use serde_json::json;

    fn dataset() -> Dataset {
        let df = df!(
            "kind" => ["park", "school", "park", "hospital", "park"],
            "area" => [10.0f64, 4.0, 6.0, 3.0, 2.0],
        )
        .unwrap();
        Dataset::new(df)
    }

    #[test]
    fn test_category_totals_counts_in_first_appearance_order() {
        let totals = category_totals(&dataset(), "kind", None, "test").unwrap();
        assert_eq!(
            totals,
            vec![
                ("park".to_string(), 3.0),
                ("school".to_string(), 1.0),
                ("hospital".to_string(), 1.0),
            ]
        );
    }

    #[test]
    fn test_category_totals_sums_value_column() {
        let totals = category_totals(&dataset(), "kind", Some("area"), "test").unwrap();
        assert_eq!(totals[0], ("park".to_string(), 18.0));
    }

    #[test]
    fn test_category_totals_missing_column() {
        let err = category_totals(&dataset(), "zone", None, "bar_chart").unwrap_err();
        assert_eq!(err.error_code(), "MISSING_COLUMN");
        assert!(err.to_string().contains("bar_chart"));
    }

    #[test]
    fn test_bar_chart_validates_before_rendering() {
        let params = json!({"x": "zone"});
        let serde_json::Value::Object(params) = params else {
            unreachable!()
        };
        let generator = BarChartGenerator::from_params(&params).unwrap();
        let err = generator
            .generate(&dataset(), Path::new("/nonexistent/never-written.png"))
            .unwrap_err();
        assert_eq!(err.error_code(), "MISSING_COLUMN");
        assert!(!Path::new("/nonexistent/never-written.png").exists());
    }

    #[test]
    fn test_padded_value_range_spans_zero() {
        let (lo, hi) = padded_value_range(&[3.0, 8.0]);
        assert_eq!(lo, 0.0);
        assert!(hi > 8.0);

        let (lo, _) = padded_value_range(&[-4.0, 8.0]);
        assert_eq!(lo, -4.0);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(5.0, 0.0, 10.0), 0.5);
        assert_eq!(normalize(3.0, 3.0, 3.0), 0.5);
    }
}
