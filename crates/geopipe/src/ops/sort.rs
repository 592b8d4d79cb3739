//! Row ordering.
//!
//! Stable multi-key sort; the first column carries the highest priority.
//! `ascending` is either one flag for all keys or a per-column list of
//! matching length.

use polars::prelude::*;
use serde::Deserialize;

use crate::config::{Params, parse_params};
use crate::dataset::Dataset;
use crate::error::{ProcessingError, Result};
use crate::ops::Operator;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum AscendingSpec {
    All(bool),
    PerColumn(Vec<bool>),
}

#[derive(Debug, Clone, Deserialize)]
struct SortParams {
    columns: OneOrMany,
    ascending: Option<AscendingSpec>,
}

/// Sorts rows by one or more key columns.
#[derive(Debug, Clone)]
pub struct SortOp {
    columns: Vec<String>,
    descending: Vec<bool>,
}

impl SortOp {
    pub fn from_params(params: &Params) -> Result<Self> {
        let raw: SortParams = parse_params("sort", params)?;

        let columns = match raw.columns {
            OneOrMany::One(column) => vec![column],
            OneOrMany::Many(columns) => columns,
        };
        if columns.is_empty() {
            return Err(ProcessingError::InvalidConfig(
                "'sort' descriptor requires at least one column".to_string(),
            ));
        }

        let descending = match raw.ascending.unwrap_or(AscendingSpec::All(true)) {
            AscendingSpec::All(ascending) => vec![!ascending; columns.len()],
            AscendingSpec::PerColumn(flags) => {
                if flags.len() != columns.len() {
                    return Err(ProcessingError::ArityMismatch {
                        context: "'sort' ascending flags".to_string(),
                        expected: columns.len(),
                        actual: flags.len(),
                    });
                }
                flags.into_iter().map(|ascending| !ascending).collect()
            }
        };

        Ok(Self {
            columns,
            descending,
        })
    }
}

impl Operator for SortOp {
    fn name(&self) -> &'static str {
        "sort"
    }

    fn apply(&self, dataset: &Dataset) -> Result<Dataset> {
        for column in &self.columns {
            dataset.column(column, "sort")?;
        }

        let options = SortMultipleOptions::default()
            .with_order_descending_multi(self.descending.clone())
            .with_maintain_order(true);
        let sorted = dataset.df().sort(self.columns.clone(), options)?;
        Ok(dataset.derive(sorted))
    }
}
