//! Shared utilities for the processing pipeline.
//!
//! Small helpers used across operators and generators to classify column
//! types and move between polars values and plain Rust ones.

use polars::prelude::*;

use crate::error::{ProcessingError, Result};

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Category of a data type for processing purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtypeCategory {
    /// Integer or floating point numbers
    Numeric,
    /// Boolean type
    Boolean,
    /// String/text type
    String,
    /// Other/unknown types
    Other,
}

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Get the category of a DataType.
pub fn get_dtype_category(dtype: &DataType) -> DtypeCategory {
    if is_numeric_dtype(dtype) {
        DtypeCategory::Numeric
    } else if matches!(dtype, DataType::Boolean) {
        DtypeCategory::Boolean
    } else if matches!(dtype, DataType::String | DataType::Categorical(_, _)) {
        DtypeCategory::String
    } else {
        DtypeCategory::Other
    }
}

/// Get the dtype category of a Series.
pub fn series_dtype_category(series: &Series) -> DtypeCategory {
    get_dtype_category(series.dtype())
}

// =============================================================================
// Series Conversion Utilities
// =============================================================================

/// Cast a numeric or boolean Series to `Float64` and return the chunked view.
///
/// Fails with the collaborator's cast error wrapped in `context` when the
/// column holds non-numeric data.
pub fn to_f64_chunked(series: &Series, context: &str) -> Result<Float64Chunked> {
    let cast = series.cast(&DataType::Float64).map_err(|e| {
        ProcessingError::Collaborator(format!(
            "{context}: column '{}' is not numeric ({e})",
            series.name()
        ))
    })?;
    Ok(cast.f64()?.clone())
}

/// Collect the non-null values of a numeric Series as `f64`.
pub fn numeric_values(series: &Series, context: &str) -> Result<Vec<f64>> {
    let ca = to_f64_chunked(series, context)?;
    Ok(ca.into_iter().flatten().collect())
}

/// Render a single cell for user-facing output (chart labels, spreadsheets).
///
/// Strings come back unquoted, unlike `AnyValue`'s `Display`.
pub fn any_value_to_string(value: &AnyValue<'_>) -> String {
    match value {
        AnyValue::Null => String::new(),
        AnyValue::String(s) => (*s).to_string(),
        AnyValue::StringOwned(s) => s.to_string(),
        AnyValue::Boolean(b) => b.to_string(),
        other => other.to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_numeric_dtype() {
        assert!(is_numeric_dtype(&DataType::Int64));
        assert!(is_numeric_dtype(&DataType::Float64));
        assert!(!is_numeric_dtype(&DataType::String));
        assert!(!is_numeric_dtype(&DataType::Boolean));
    }

    #[test]
    fn test_dtype_category() {
        assert_eq!(get_dtype_category(&DataType::Int64), DtypeCategory::Numeric);
        assert_eq!(
            get_dtype_category(&DataType::Boolean),
            DtypeCategory::Boolean
        );
        assert_eq!(get_dtype_category(&DataType::String), DtypeCategory::String);
    }

    #[test]
    fn test_to_f64_chunked_casts_integers() {
        let series = Series::new("population".into(), &[1i64, 2, 3]);
        let ca = to_f64_chunked(&series, "test").unwrap();
        assert_eq!(ca.get(2), Some(3.0));
    }

    #[test]
    fn test_to_f64_chunked_rejects_strings() {
        let series = Series::new("name".into(), &["a", "b"]);
        let err = to_f64_chunked(&series, "test").unwrap_err();
        assert_eq!(err.error_code(), "COLLABORATOR_ERROR");
    }

    #[test]
    fn test_numeric_values_skips_nulls() {
        let series = Series::new("x".into(), &[Some(1.0), None, Some(3.0)]);
        assert_eq!(numeric_values(&series, "test").unwrap(), vec![1.0, 3.0]);
    }

    #[test]
    fn test_any_value_to_string() {
        assert_eq!(any_value_to_string(&AnyValue::String("north")), "north");
        assert_eq!(any_value_to_string(&AnyValue::Null), "");
        assert_eq!(any_value_to_string(&AnyValue::Float64(2.5)), "2.5");
    }
}
