//! Shared rendering vocabulary for chart and map generators.
//!
//! Figure-level options (size, title, axis labels), color parsing, named
//! colormaps and the value classification schemes used by the choropleth
//! generator all live here so every concrete generator shares one contract.

use plotters::style::RGBColor;
use serde::Deserialize;

use crate::error::{ProcessingError, Result};

/// Figure-level options common to every chart generator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FigureConfig {
    /// Figure size in pixels `[width, height]`.
    pub size: Option<[u32; 2]>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub xlabel: String,
    #[serde(default)]
    pub ylabel: String,
    /// Draw the axis mesh and tick labels.
    #[serde(default = "default_true")]
    pub grid: bool,
}

impl FigureConfig {
    /// Pixel dimensions, falling back to the generator's default.
    pub fn dimensions(&self, default: (u32, u32)) -> (u32, u32) {
        match self.size {
            Some([w, h]) => (w, h),
            None => default,
        }
    }
}

pub(crate) fn default_true() -> bool {
    true
}

/// Wrap a failure reported by the rendering collaborator.
pub(crate) fn render_err<E: std::fmt::Display>(e: E) -> ProcessingError {
    ProcessingError::Collaborator(format!("rendering failed: {e}"))
}

// =============================================================================
// Colors
// =============================================================================

/// Categorical palette for series colors (pie slices, multiple lines).
const SERIES_PALETTE: [(u8, u8, u8); 10] = [
    (66, 133, 244),
    (219, 68, 55),
    (244, 180, 0),
    (15, 157, 88),
    (171, 71, 188),
    (0, 172, 193),
    (255, 112, 67),
    (158, 157, 36),
    (92, 107, 192),
    (240, 98, 146),
];

/// Color for the i-th series, cycling through the palette.
pub(crate) fn series_color(index: usize) -> RGBColor {
    let (r, g, b) = SERIES_PALETTE[index % SERIES_PALETTE.len()];
    RGBColor(r, g, b)
}

/// Resolve a color name or `#rrggbb` literal.
pub fn parse_color(name: &str) -> Result<RGBColor> {
    if let Some(hex) = name.strip_prefix('#') {
        if hex.len() == 6
            && let Ok(value) = u32::from_str_radix(hex, 16)
        {
            return Ok(RGBColor(
                (value >> 16) as u8,
                (value >> 8) as u8,
                value as u8,
            ));
        }
        return Err(ProcessingError::Collaborator(format!(
            "invalid hex color '{name}'"
        )));
    }

    let rgb = match name.to_ascii_lowercase().as_str() {
        "black" => (0, 0, 0),
        "white" => (255, 255, 255),
        "red" => (214, 39, 40),
        "green" => (44, 160, 44),
        "blue" => (31, 119, 180),
        "skyblue" => (135, 206, 235),
        "steelblue" => (70, 130, 180),
        "navy" => (0, 0, 128),
        "orange" => (255, 127, 14),
        "yellow" => (230, 196, 0),
        "purple" => (148, 103, 189),
        "brown" => (140, 86, 75),
        "pink" => (227, 119, 194),
        "gray" | "grey" => (127, 127, 127),
        "teal" => (0, 128, 128),
        other => {
            return Err(ProcessingError::Collaborator(format!(
                "unsupported color name '{other}'"
            )));
        }
    };
    Ok(RGBColor(rgb.0, rgb.1, rgb.2))
}

// =============================================================================
// Colormaps
// =============================================================================

/// A named sequential colormap sampled by linear interpolation between stops.
#[derive(Debug, Clone)]
pub struct Colormap {
    stops: &'static [(u8, u8, u8)],
}

const VIRIDIS: &[(u8, u8, u8)] = &[
    (68, 1, 84),
    (59, 82, 139),
    (33, 145, 140),
    (94, 201, 98),
    (253, 231, 37),
];
const PLASMA: &[(u8, u8, u8)] = &[
    (13, 8, 135),
    (126, 3, 168),
    (204, 71, 120),
    (248, 149, 64),
    (240, 249, 33),
];
const YLORRD: &[(u8, u8, u8)] = &[
    (255, 255, 204),
    (254, 217, 118),
    (253, 141, 60),
    (227, 26, 28),
    (128, 0, 38),
];
const BLUES: &[(u8, u8, u8)] = &[
    (247, 251, 255),
    (158, 202, 225),
    (66, 146, 198),
    (8, 48, 107),
];
const HOT: &[(u8, u8, u8)] = &[
    (10, 0, 0),
    (178, 34, 34),
    (255, 165, 0),
    (255, 255, 224),
];

impl Colormap {
    /// Look up a colormap by name.
    pub fn by_name(name: &str) -> Result<Self> {
        let stops = match name.to_ascii_lowercase().as_str() {
            "viridis" => VIRIDIS,
            "plasma" => PLASMA,
            "ylorrd" => YLORRD,
            "blues" => BLUES,
            "hot" => HOT,
            other => {
                return Err(ProcessingError::Collaborator(format!(
                    "unsupported colormap '{other}' (available: viridis, plasma, ylorrd, blues, hot)"
                )));
            }
        };
        Ok(Self { stops })
    }

    /// Sample the map at `t` in `[0, 1]` (clamped).
    pub fn sample(&self, t: f64) -> RGBColor {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        let segments = (self.stops.len() - 1) as f64;
        let position = t * segments;
        let index = (position.floor() as usize).min(self.stops.len() - 2);
        let frac = position - index as f64;

        let (r0, g0, b0) = self.stops[index];
        let (r1, g1, b1) = self.stops[index + 1];
        let lerp = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * frac) as u8;
        RGBColor(lerp(r0, r1), lerp(g0, g1), lerp(b0, b1))
    }
}

// =============================================================================
// Classification schemes
// =============================================================================

/// How a choropleth partitions its value range into classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassScheme {
    Quantiles,
    EqualInterval,
    NaturalBreaks,
}

/// Compute the upper bound of each class. Returns at most `k` bounds, in
/// ascending order, the last one equal to the data maximum.
pub fn class_breaks(values: &[f64], k: usize, scheme: ClassScheme) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    if sorted.is_empty() || k == 0 {
        return Vec::new();
    }
    let k = k.min(sorted.len());
    let n = sorted.len();

    match scheme {
        ClassScheme::Quantiles => (1..=k)
            .map(|i| {
                let idx = (i * n).div_ceil(k).saturating_sub(1);
                sorted[idx.min(n - 1)]
            })
            .collect(),
        ClassScheme::EqualInterval => {
            let (lo, hi) = (sorted[0], sorted[n - 1]);
            let step = (hi - lo) / k as f64;
            (1..=k)
                .map(|i| if i == k { hi } else { lo + step * i as f64 })
                .collect()
        }
        ClassScheme::NaturalBreaks => natural_breaks(&sorted, k),
    }
}

/// Index of the class a value falls into, given ascending upper bounds.
pub fn class_index(breaks: &[f64], value: f64) -> usize {
    breaks
        .iter()
        .position(|upper| value <= *upper)
        .unwrap_or(breaks.len().saturating_sub(1))
}

/// Fisher-Jenks style optimal 1D classification (dynamic programming over
/// within-class variance). Input must be sorted ascending.
fn natural_breaks(sorted: &[f64], k: usize) -> Vec<f64> {
    let n = sorted.len();
    if k >= n {
        return sorted.to_vec();
    }

    let mut lower_limits = vec![vec![0usize; k + 1]; n + 1];
    let mut variance_combinations = vec![vec![0f64; k + 1]; n + 1];
    for j in 1..=k {
        lower_limits[1][j] = 1;
        for i in 2..=n {
            variance_combinations[i][j] = f64::INFINITY;
        }
    }

    for l in 2..=n {
        let mut sum = 0.0;
        let mut sum_squares = 0.0;
        let mut count = 0.0;
        let mut variance = 0.0;

        for m in 1..=l {
            let lower = l - m + 1;
            let value = sorted[lower - 1];
            count += 1.0;
            sum += value;
            sum_squares += value * value;
            variance = sum_squares - (sum * sum) / count;

            if lower != 1 {
                for j in 2..=k {
                    let candidate = variance + variance_combinations[lower - 1][j - 1];
                    if variance_combinations[l][j] >= candidate {
                        lower_limits[l][j] = lower;
                        variance_combinations[l][j] = candidate;
                    }
                }
            }
        }

        lower_limits[l][1] = 1;
        variance_combinations[l][1] = variance;
    }

    let mut breaks = vec![0.0; k];
    breaks[k - 1] = sorted[n - 1];
    let mut position = n;
    for j in (2..=k).rev() {
        let boundary = lower_limits[position][j] - 1;
        breaks[j - 2] = sorted[boundary - 1];
        position = boundary;
    }
    breaks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("skyblue").unwrap(), RGBColor(135, 206, 235));
        assert_eq!(parse_color("#ff0080").unwrap(), RGBColor(255, 0, 128));

        let err = parse_color("mauve-ish").unwrap_err();
        assert_eq!(err.error_code(), "COLLABORATOR_ERROR");
    }

    #[test]
    fn test_colormap_endpoints() {
        let cmap = Colormap::by_name("viridis").unwrap();
        assert_eq!(cmap.sample(0.0), RGBColor(68, 1, 84));
        assert_eq!(cmap.sample(1.0), RGBColor(253, 231, 37));
        // Out-of-range input clamps instead of panicking
        assert_eq!(cmap.sample(7.5), RGBColor(253, 231, 37));
    }

    #[test]
    fn test_unknown_colormap() {
        let err = Colormap::by_name("sunset").unwrap_err();
        assert_eq!(err.error_code(), "COLLABORATOR_ERROR");
        assert!(err.to_string().contains("sunset"));
    }

    #[test]
    fn test_quantile_breaks() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let breaks = class_breaks(&values, 3, ClassScheme::Quantiles);
        assert_eq!(breaks, vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_equal_interval_breaks() {
        let values = [0.0, 1.0, 5.0, 10.0];
        let breaks = class_breaks(&values, 2, ClassScheme::EqualInterval);
        assert_eq!(breaks, vec![5.0, 10.0]);
    }

    #[test]
    fn test_natural_breaks_find_clusters() {
        // Two obvious clusters around 1 and around 100
        let values = [1.0, 1.2, 0.8, 100.0, 101.0, 99.5];
        let breaks = class_breaks(&values, 2, ClassScheme::NaturalBreaks);
        assert_eq!(breaks.len(), 2);
        assert!(breaks[0] < 99.5, "first class should end below the second cluster");
        assert_eq!(breaks[1], 101.0);
    }

    #[test]
    fn test_class_index() {
        let breaks = [2.0, 4.0, 6.0];
        assert_eq!(class_index(&breaks, 1.0), 0);
        assert_eq!(class_index(&breaks, 2.0), 0);
        assert_eq!(class_index(&breaks, 5.0), 2);
        // Values above the last bound clamp into the last class
        assert_eq!(class_index(&breaks, 9.0), 2);
    }

    #[test]
    fn test_figure_dimensions_fallback() {
        let figure = FigureConfig::default();
        assert_eq!(figure.dimensions((1000, 640)), (1000, 640));

        let figure = FigureConfig {
            size: Some([300, 200]),
            ..Default::default()
        };
        assert_eq!(figure.dimensions((1000, 640)), (300, 200));
    }
}
