//! Row filtering.
//!
//! A filter descriptor is either a single condition
//! (`{column, operator, value}`) or a compound form
//! (`{filters: [...], logic: "and" | "or"}`) where one logic mode combines
//! every condition; per-pair logic is deliberately not supported. Each
//! condition builds a boolean mask over the rows, the masks are combined,
//! and the surviving row subset is returned as a new dataset.

use polars::prelude::*;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::{Params, parse_params};
use crate::dataset::Dataset;
use crate::error::{ProcessingError, Result};
use crate::ops::Operator;
use crate::utils::{DtypeCategory, series_dtype_category, to_f64_chunked};

/// Comparison symbols accepted in filter descriptors.
const VALID_OPERATORS: [&str; 13] = [
    "==", "!=", ">", "<", ">=", "<=", "in", "contains", "startswith", "endswith", "between",
    "isnull", "notnull",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    In,
    Contains,
    StartsWith,
    EndsWith,
    Between,
    IsNull,
    NotNull,
}

impl Cmp {
    fn parse(symbol: &str) -> Result<Self> {
        Ok(match symbol {
            "==" => Self::Eq,
            "!=" => Self::Ne,
            ">" => Self::Gt,
            "<" => Self::Lt,
            ">=" => Self::Ge,
            "<=" => Self::Le,
            "in" => Self::In,
            "contains" => Self::Contains,
            "startswith" => Self::StartsWith,
            "endswith" => Self::EndsWith,
            "between" => Self::Between,
            "isnull" => Self::IsNull,
            "notnull" => Self::NotNull,
            other => {
                return Err(ProcessingError::InvalidOperator {
                    symbol: other.to_string(),
                    valid: VALID_OPERATORS.to_vec(),
                });
            }
        })
    }
}

/// How compound conditions are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Logic {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, Deserialize)]
struct RawCondition {
    column: String,
    operator: String,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct FilterParams {
    column: Option<String>,
    operator: Option<String>,
    #[serde(default)]
    value: Value,
    filters: Option<Vec<RawCondition>>,
    #[serde(default)]
    logic: Logic,
}

#[derive(Debug, Clone)]
struct Condition {
    column: String,
    symbol: String,
    cmp: Cmp,
    value: Value,
}

/// Filters rows by one or more comparisons.
#[derive(Debug, Clone)]
pub struct FilterOp {
    conditions: Vec<Condition>,
    logic: Logic,
}

impl FilterOp {
    pub fn from_params(params: &Params) -> Result<Self> {
        let raw: FilterParams = parse_params("filter", params)?;

        let (raw_conditions, logic) = match raw.filters {
            Some(filters) => (filters, raw.logic),
            None => {
                let (Some(column), Some(operator)) = (raw.column, raw.operator) else {
                    return Err(ProcessingError::InvalidConfig(
                        "'filter' descriptor requires either 'filters' or 'column' + 'operator'"
                            .to_string(),
                    ));
                };
                (
                    vec![RawCondition {
                        column,
                        operator,
                        value: raw.value,
                    }],
                    Logic::And,
                )
            }
        };

        // Operator symbols are validated at construction time so a typo
        // fails before the pipeline touches any data.
        let conditions = raw_conditions
            .into_iter()
            .map(|c| {
                Ok(Condition {
                    cmp: Cmp::parse(&c.operator)?,
                    symbol: c.operator,
                    column: c.column,
                    value: c.value,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { conditions, logic })
    }
}

impl Operator for FilterOp {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn apply(&self, dataset: &Dataset) -> Result<Dataset> {
        let mut combined: Option<Vec<bool>> = None;
        for condition in &self.conditions {
            let mask = condition_mask(dataset, condition)?;
            combined = Some(match combined {
                None => mask,
                Some(acc) => acc
                    .into_iter()
                    .zip(mask)
                    .map(|(a, b)| match self.logic {
                        Logic::And => a && b,
                        Logic::Or => a || b,
                    })
                    .collect(),
            });
        }

        let mask = combined.unwrap_or_else(|| vec![true; dataset.height()]);
        let mask = BooleanChunked::from_slice("mask".into(), &mask);
        let filtered = dataset.df().filter(&mask)?;
        debug!(
            "filter kept {} of {} rows",
            filtered.height(),
            dataset.height()
        );
        Ok(dataset.derive(filtered))
    }
}

/// Build the row mask for one condition. Null cells never match, except for
/// the null-ness probes themselves.
fn condition_mask(dataset: &Dataset, condition: &Condition) -> Result<Vec<bool>> {
    let series = dataset.column(&condition.column, "filter")?;

    match condition.cmp {
        Cmp::IsNull => Ok(series.is_null().into_iter().map(|v| v == Some(true)).collect()),
        Cmp::NotNull => Ok(series
            .is_null()
            .into_iter()
            .map(|v| v == Some(false))
            .collect()),
        Cmp::Contains | Cmp::StartsWith | Cmp::EndsWith => {
            let needle = string_value(condition)?;
            let ca = string_column(series, condition)?;
            Ok(ca
                .into_iter()
                .map(|cell| {
                    cell.is_some_and(|s| match condition.cmp {
                        Cmp::Contains => s.contains(&needle),
                        Cmp::StartsWith => s.starts_with(&needle),
                        _ => s.ends_with(&needle),
                    })
                })
                .collect())
        }
        Cmp::In => membership_mask(series, condition),
        Cmp::Between => between_mask(series, condition),
        Cmp::Eq | Cmp::Ne | Cmp::Gt | Cmp::Lt | Cmp::Ge | Cmp::Le => {
            comparison_mask(series, condition)
        }
    }
}

fn comparison_mask(series: &Series, condition: &Condition) -> Result<Vec<bool>> {
    match (&condition.value, series_dtype_category(series)) {
        (Value::Number(n), DtypeCategory::Numeric | DtypeCategory::Boolean) => {
            let rhs = n.as_f64().unwrap_or(f64::NAN);
            let ca = to_f64_chunked(series, "filter")?;
            Ok(ca
                .into_iter()
                .map(|cell| cell.is_some_and(|lhs| compare_f64(condition.cmp, lhs, rhs)))
                .collect())
        }
        (Value::String(rhs), DtypeCategory::String) => {
            let ca = string_column(series, condition)?;
            Ok(ca
                .into_iter()
                .map(|cell| cell.is_some_and(|lhs| compare_str(condition.cmp, lhs, rhs)))
                .collect())
        }
        (Value::Bool(rhs), DtypeCategory::Boolean)
            if matches!(condition.cmp, Cmp::Eq | Cmp::Ne) =>
        {
            let ca = series.bool()?;
            Ok(ca
                .into_iter()
                .map(|cell| {
                    cell.is_some_and(|lhs| match condition.cmp {
                        Cmp::Eq => lhs == *rhs,
                        _ => lhs != *rhs,
                    })
                })
                .collect())
        }
        (value, category) => Err(comparison_type_error(
            condition,
            &format!(
                "cannot compare a {category:?} column against {}",
                value_kind(value)
            ),
        )),
    }
}

fn membership_mask(series: &Series, condition: &Condition) -> Result<Vec<bool>> {
    let Value::Array(items) = &condition.value else {
        // A scalar membership test degrades to equality.
        let mut scalar = condition.clone();
        scalar.cmp = Cmp::Eq;
        return comparison_mask(series, &scalar);
    };

    match series_dtype_category(series) {
        DtypeCategory::Numeric | DtypeCategory::Boolean => {
            let wanted = items
                .iter()
                .map(|v| {
                    v.as_f64().ok_or_else(|| {
                        comparison_type_error(condition, "membership list mixes in non-numbers")
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            let ca = to_f64_chunked(series, "filter")?;
            Ok(ca
                .into_iter()
                .map(|cell| cell.is_some_and(|lhs| wanted.iter().any(|w| *w == lhs)))
                .collect())
        }
        DtypeCategory::String => {
            let wanted = items
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or_else(|| {
                        comparison_type_error(condition, "membership list mixes in non-strings")
                    })
                })
                .collect::<Result<Vec<String>>>()?;
            let ca = string_column(series, condition)?;
            Ok(ca
                .into_iter()
                .map(|cell| cell.is_some_and(|lhs| wanted.iter().any(|w| w == lhs)))
                .collect())
        }
        other => Err(comparison_type_error(
            condition,
            &format!("membership test unsupported for {other:?} column"),
        )),
    }
}

fn between_mask(series: &Series, condition: &Condition) -> Result<Vec<bool>> {
    let bounds = match &condition.value {
        Value::Array(items) => items,
        _ => {
            return Err(ProcessingError::ArityMismatch {
                context: "filter 'between' bounds".to_string(),
                expected: 2,
                actual: 1,
            });
        }
    };
    if bounds.len() != 2 {
        return Err(ProcessingError::ArityMismatch {
            context: "filter 'between' bounds".to_string(),
            expected: 2,
            actual: bounds.len(),
        });
    }

    match (&bounds[0], &bounds[1], series_dtype_category(series)) {
        (Value::Number(lo), Value::Number(hi), DtypeCategory::Numeric | DtypeCategory::Boolean) => {
            let (lo, hi) = (
                lo.as_f64().unwrap_or(f64::NAN),
                hi.as_f64().unwrap_or(f64::NAN),
            );
            let ca = to_f64_chunked(series, "filter")?;
            Ok(ca
                .into_iter()
                .map(|cell| cell.is_some_and(|v| v >= lo && v <= hi))
                .collect())
        }
        (Value::String(lo), Value::String(hi), DtypeCategory::String) => {
            let ca = string_column(series, condition)?;
            Ok(ca
                .into_iter()
                .map(|cell| cell.is_some_and(|v| v >= lo.as_str() && v <= hi.as_str()))
                .collect())
        }
        _ => Err(comparison_type_error(
            condition,
            "between bounds must both match the column type",
        )),
    }
}

fn compare_f64(cmp: Cmp, lhs: f64, rhs: f64) -> bool {
    match cmp {
        Cmp::Eq => lhs == rhs,
        Cmp::Ne => lhs != rhs,
        Cmp::Gt => lhs > rhs,
        Cmp::Lt => lhs < rhs,
        Cmp::Ge => lhs >= rhs,
        Cmp::Le => lhs <= rhs,
        _ => unreachable!("non-ordering comparison routed to compare_f64"),
    }
}

fn compare_str(cmp: Cmp, lhs: &str, rhs: &str) -> bool {
    match cmp {
        Cmp::Eq => lhs == rhs,
        Cmp::Ne => lhs != rhs,
        // Ordering on text is lexicographic
        Cmp::Gt => lhs > rhs,
        Cmp::Lt => lhs < rhs,
        Cmp::Ge => lhs >= rhs,
        Cmp::Le => lhs <= rhs,
        _ => unreachable!("non-ordering comparison routed to compare_str"),
    }
}

fn string_column<'a>(series: &'a Series, condition: &Condition) -> Result<&'a StringChunked> {
    series
        .str()
        .map_err(|_| comparison_type_error(condition, "operator requires a text column"))
}

fn string_value(condition: &Condition) -> Result<String> {
    match &condition.value {
        Value::String(s) => Ok(s.clone()),
        _ => Err(comparison_type_error(
            condition,
            "operator requires a string value",
        )),
    }
}

fn comparison_type_error(condition: &Condition, reason: &str) -> ProcessingError {
    ProcessingError::ComparisonType {
        column: condition.column.clone(),
        operator: condition.symbol.clone(),
        reason: reason.to_string(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dataset() -> Dataset {
        let df = df!(
            "city" => ["Lisbon", "Porto", "Braga", "Faro"],
            "population" => [505_000i64, 238_000, 137_000, 61_000],
            "coastal" => [true, true, false, true],
            "region" => [Some("south"), Some("north"), Some("north"), None],
        )
        .unwrap();
        Dataset::new(df)
    }

    fn filter(params: serde_json::Value) -> Result<FilterOp> {
        let serde_json::Value::Object(params) = params else {
            panic!("params must be an object");
        };
        FilterOp::from_params(&params)
    }

    fn city_names(ds: &Dataset) -> Vec<String> {
        ds.column("city", "test")
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_numeric_greater_than() {
        let op = filter(json!({"column": "population", "operator": ">", "value": 200000})).unwrap();
        let out = op.apply(&dataset()).unwrap();
        assert_eq!(city_names(&out), vec!["Lisbon", "Porto"]);
    }

    #[test]
    fn test_string_contains() {
        let op = filter(json!({"column": "city", "operator": "contains", "value": "ra"})).unwrap();
        let out = op.apply(&dataset()).unwrap();
        assert_eq!(city_names(&out), vec!["Braga"]);
    }

    #[test]
    fn test_membership() {
        let op =
            filter(json!({"column": "city", "operator": "in", "value": ["Faro", "Porto"]})).unwrap();
        let out = op.apply(&dataset()).unwrap();
        assert_eq!(city_names(&out), vec!["Porto", "Faro"]);
    }

    #[test]
    fn test_membership_scalar_degrades_to_equality() {
        let op = filter(json!({"column": "city", "operator": "in", "value": "Faro"})).unwrap();
        let out = op.apply(&dataset()).unwrap();
        assert_eq!(city_names(&out), vec!["Faro"]);
    }

    #[test]
    fn test_between_inclusive() {
        let op = filter(
            json!({"column": "population", "operator": "between", "value": [137000, 238000]}),
        )
        .unwrap();
        let out = op.apply(&dataset()).unwrap();
        assert_eq!(city_names(&out), vec!["Porto", "Braga"]);
    }

    #[test]
    fn test_between_wrong_arity() {
        let op =
            filter(json!({"column": "population", "operator": "between", "value": [1, 2, 3]}))
                .unwrap();
        let err = op.apply(&dataset()).unwrap_err();
        assert_eq!(err.error_code(), "ARITY_MISMATCH");
    }

    #[test]
    fn test_isnull_ignores_value() {
        let op = filter(json!({"column": "region", "operator": "isnull", "value": 42})).unwrap();
        let out = op.apply(&dataset()).unwrap();
        assert_eq!(city_names(&out), vec!["Faro"]);

        let op = filter(json!({"column": "region", "operator": "notnull"})).unwrap();
        assert_eq!(op.apply(&dataset()).unwrap().height(), 3);
    }

    #[test]
    fn test_null_cells_never_match_equality() {
        let op = filter(json!({"column": "region", "operator": "!=", "value": "north"})).unwrap();
        let out = op.apply(&dataset()).unwrap();
        // Faro's region is null, so it is excluded even under !=
        assert_eq!(city_names(&out), vec!["Lisbon"]);
    }

    #[test]
    fn test_compound_and() {
        let op = filter(json!({
            "filters": [
                {"column": "coastal", "operator": "==", "value": true},
                {"column": "population", "operator": "<", "value": 300000}
            ],
            "logic": "and"
        }))
        .unwrap();
        let out = op.apply(&dataset()).unwrap();
        assert_eq!(city_names(&out), vec!["Porto", "Faro"]);
    }

    #[test]
    fn test_compound_or() {
        let op = filter(json!({
            "filters": [
                {"column": "city", "operator": "==", "value": "Braga"},
                {"column": "population", "operator": ">", "value": 400000}
            ],
            "logic": "or"
        }))
        .unwrap();
        let out = op.apply(&dataset()).unwrap();
        assert_eq!(city_names(&out), vec!["Lisbon", "Braga"]);
    }

    #[test]
    fn test_unknown_operator_symbol() {
        let err = filter(json!({"column": "city", "operator": "~=", "value": "x"})).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_OPERATOR");
        assert!(err.to_string().contains("~="));
    }

    #[test]
    fn test_numeric_operator_on_text_column() {
        let op = filter(json!({"column": "city", "operator": ">", "value": 10})).unwrap();
        let err = op.apply(&dataset()).unwrap_err();
        assert_eq!(err.error_code(), "COMPARISON_TYPE");
        let msg = err.to_string();
        assert!(msg.contains("city"));
        assert!(msg.contains('>'));
    }

    #[test]
    fn test_missing_column() {
        let op = filter(json!({"column": "altitude", "operator": ">", "value": 1})).unwrap();
        let err = op.apply(&dataset()).unwrap_err();
        assert_eq!(err.error_code(), "MISSING_COLUMN");
    }

    #[test]
    fn test_output_rows_subset_of_input() {
        let op = filter(json!({"column": "population", "operator": ">=", "value": 0})).unwrap();
        let ds = dataset();
        let out = op.apply(&ds).unwrap();
        assert!(out.height() <= ds.height());
        assert_eq!(out.height(), 4);
    }
}
