//! Bayesian linear regression of weight on height.
//!
//! The model `y[i] ~ Normal(a + b * x[i], s)` is fitted by a Gibbs sampler
//! that draws `a` and `b` from their normal full conditionals and `s` with a
//! slice update. Chains run in parallel and are reproducible from a seed.
//!
//! ```no_run
//! use bayes_linreg::{credible_interval, sample, LinearModel, Param, Priors, Settings};
//!
//! let model = LinearModel::new(vec![170., 190.], vec![70., 90.], Priors::default())?;
//! let trace = sample(&model, &Settings::default())?;
//! let (low, high) = credible_interval(&trace.chains[0], Param::Slope, 0.95)?;
//! # Ok::<(), bayes_linreg::RegressionError>(())
//! ```

pub mod config;
pub mod data;
mod error;
pub mod gibbs;
mod model;
mod predict;
mod prior;
pub mod report;
mod sampler;
pub mod slice;
pub mod summary;
mod trace;

pub use data::{DataSummary, Dataset, Observation};
pub use error::{RegressionError, Result, Stage};
pub use model::{LinearModel, SufficientStats};
pub use predict::{mean_response, predict, predictive_interval};
pub use prior::{sample_priors, Prior, Priors};
pub use sampler::{sample, sample_posterior, sample_sequentially, Settings};
pub use summary::{
    credible_interval, gelman_rubin, point_estimate, std_dev, summarize, ChainSummary,
    ParamSummary,
};
pub use trace::{to_record_batch, to_table, Chain, Draw, Param, TableRow, Trace};
