//! Row limiting.
//!
//! Keeps the first n rows (`head`), the last n (`tail`) or a random n-row
//! subset without replacement (`sample`). An n larger than the dataset is
//! clamped to the available rows; a non-positive n is a configuration error.

use polars::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Deserialize;

use crate::config::{Params, parse_params};
use crate::dataset::Dataset;
use crate::error::{ProcessingError, Result};
use crate::ops::Operator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LimitMethod {
    #[default]
    Head,
    Tail,
    Sample,
}

#[derive(Debug, Clone, Deserialize)]
struct LimitParams {
    n: i64,
    #[serde(default)]
    method: LimitMethod,
    /// Pins the sample RNG; without it each run draws a fresh subset.
    seed: Option<u64>,
}

/// Limits the dataset to n rows.
#[derive(Debug, Clone)]
pub struct LimitOp {
    n: usize,
    method: LimitMethod,
    seed: Option<u64>,
}

impl LimitOp {
    pub fn from_params(params: &Params) -> Result<Self> {
        let raw: LimitParams = parse_params("limit", params)?;
        if raw.n <= 0 {
            return Err(ProcessingError::InvalidLimit(raw.n));
        }
        Ok(Self {
            n: raw.n as usize,
            method: raw.method,
            seed: raw.seed,
        })
    }
}

impl Operator for LimitOp {
    fn name(&self) -> &'static str {
        "limit"
    }

    fn apply(&self, dataset: &Dataset) -> Result<Dataset> {
        let n = self.n.min(dataset.height());
        let df = match self.method {
            LimitMethod::Head => dataset.df().head(Some(n)),
            LimitMethod::Tail => dataset.df().tail(Some(n)),
            LimitMethod::Sample => {
                let mut rng = match self.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                let indices: Vec<IdxSize> = rand::seq::index::sample(&mut rng, dataset.height(), n)
                    .into_iter()
                    .map(|i| i as IdxSize)
                    .collect();
                let indices = IdxCa::from_vec("idx".into(), indices);
                dataset.df().take(&indices)?
            }
        };
        Ok(dataset.derive(df))
    }
}
