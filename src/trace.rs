use std::{fmt, sync::Arc};

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, RecordBatch, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use itertools::Itertools;

use crate::error::{RegressionError, Stage};

/// The parameters of the linear model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Param {
    /// `a`, the intercept
    Intercept,
    /// `b`, the slope
    Slope,
    /// `s`, the standard deviation of the observation noise
    Noise,
}

impl Param {
    pub const ALL: [Param; 3] = [Param::Intercept, Param::Slope, Param::Noise];

    /// Column name used in tables and exported traces.
    pub fn name(&self) -> &'static str {
        match self {
            Param::Intercept => "a",
            Param::Slope => "b",
            Param::Noise => "s",
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One point in parameter space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Draw {
    pub a: f64,
    pub b: f64,
    pub s: f64,
}

impl Draw {
    pub fn new(a: f64, b: f64, s: f64) -> Self {
        Draw { a, b, s }
    }

    pub fn get(&self, param: Param) -> f64 {
        match param {
            Param::Intercept => self.a,
            Param::Slope => self.b,
            Param::Noise => self.s,
        }
    }

    pub(crate) fn get_mut(&mut self, param: Param) -> &mut f64 {
        match param {
            Param::Intercept => &mut self.a,
            Param::Slope => &mut self.b,
            Param::Noise => &mut self.s,
        }
    }

    /// The mean of the likelihood at covariate `x`.
    pub fn linear_predictor(&self, x: f64) -> f64 {
        self.a + self.b * x
    }
}

/// The draws of a single MCMC run, in iteration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    pub chain_id: u64,
    draws: Vec<Draw>,
}

impl Chain {
    pub fn new(chain_id: u64, draws: Vec<Draw>) -> Self {
        Chain { chain_id, draws }
    }

    /// Build a chain from one column per parameter.
    ///
    /// The columns have to be of equal length.
    pub fn from_columns(chain_id: u64, a: &[f64], b: &[f64], s: &[f64]) -> crate::Result<Self> {
        if a.len() != b.len() || a.len() != s.len() {
            return Err(RegressionError::invalid_input(
                Stage::Summarization,
                format!(
                    "parameter columns differ in length (a: {}, b: {}, s: {})",
                    a.len(),
                    b.len(),
                    s.len()
                ),
            ));
        }
        let draws = itertools::izip!(a, b, s)
            .map(|(&a, &b, &s)| Draw::new(a, b, s))
            .collect_vec();
        Ok(Chain { chain_id, draws })
    }

    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    pub fn draws(&self) -> &[Draw] {
        &self.draws
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Draw> {
        self.draws.iter()
    }

    /// All draws of one parameter, in iteration order.
    pub fn values(&self, param: Param) -> Vec<f64> {
        self.draws.iter().map(|draw| draw.get(param)).collect()
    }

    /// Check that every draw is finite and has a positive noise scale.
    ///
    /// Draws produced by [`crate::sample`] always pass; chains assembled
    /// from other sources should be checked before they are used for
    /// prediction.
    pub fn validate(&self) -> crate::Result<()> {
        for (idx, draw) in self.draws.iter().enumerate() {
            if !(draw.a.is_finite() && draw.b.is_finite() && draw.s.is_finite()) {
                return Err(RegressionError::invalid_input(
                    Stage::Prediction,
                    format!(
                        "chain {} has a non-finite draw at iteration {}: {:?}",
                        self.chain_id,
                        idx + 1,
                        draw
                    ),
                ));
            }
            if draw.s <= 0. {
                return Err(RegressionError::invalid_input(
                    Stage::Prediction,
                    format!(
                        "chain {} has non-positive noise scale s = {} at iteration {}",
                        self.chain_id,
                        draw.s,
                        idx + 1
                    ),
                ));
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Chain {
    type Item = &'a Draw;
    type IntoIter = std::slice::Iter<'a, Draw>;

    fn into_iter(self) -> Self::IntoIter {
        self.draws.iter()
    }
}

/// The chains returned by one sampling request.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub chains: Vec<Chain>,
}

impl Trace {
    pub fn num_chains(&self) -> usize {
        self.chains.len()
    }

    pub fn chain(&self, chain_id: u64) -> Option<&Chain> {
        self.chains.iter().find(|chain| chain.chain_id == chain_id)
    }

    /// All draws of all chains concatenated into one chain with id 0.
    ///
    /// Chains are exchangeable, so pooled summaries are valid once every
    /// chain has converged.
    pub fn pooled(&self) -> Chain {
        let draws = self
            .chains
            .iter()
            .flat_map(|chain| chain.draws.iter().copied())
            .collect_vec();
        Chain::new(0, draws)
    }

    pub fn to_table(&self) -> Vec<TableRow> {
        to_table(&self.chains)
    }

    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        to_record_batch(&self.chains)
    }
}

/// A single row of the flattened trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableRow {
    pub chain: u64,
    /// Iteration number within the chain, starting at 1.
    pub iteration: u64,
    pub a: f64,
    pub b: f64,
    pub s: f64,
}

/// Flatten chains into one row per iteration, tagged by chain id.
pub fn to_table(chains: &[Chain]) -> Vec<TableRow> {
    chains
        .iter()
        .flat_map(|chain| {
            chain
                .draws
                .iter()
                .enumerate()
                .map(move |(idx, draw)| TableRow {
                    chain: chain.chain_id,
                    iteration: idx as u64 + 1,
                    a: draw.a,
                    b: draw.b,
                    s: draw.s,
                })
        })
        .collect()
}

/// Columnar version of [`to_table`].
pub fn to_record_batch(chains: &[Chain]) -> Result<RecordBatch> {
    let rows = to_table(chains);

    let mut fields = vec![
        Field::new("chain", DataType::UInt64, false),
        Field::new("iteration", DataType::UInt64, false),
    ];
    fields.extend(
        Param::ALL
            .iter()
            .map(|param| Field::new(param.name(), DataType::Float64, false)),
    );
    let schema = Arc::new(Schema::new(fields));

    let chain: ArrayRef = Arc::new(UInt64Array::from_iter_values(rows.iter().map(|r| r.chain)));
    let iteration: ArrayRef = Arc::new(UInt64Array::from_iter_values(
        rows.iter().map(|r| r.iteration),
    ));
    let a: ArrayRef = Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.a)));
    let b: ArrayRef = Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.b)));
    let s: ArrayRef = Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.s)));

    RecordBatch::try_new(schema, vec![chain, iteration, a, b, s])
        .context("Could not assemble trace record batch")
}
