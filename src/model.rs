use std::fmt;

use crate::{
    data::Dataset,
    error::{RegressionError, Result, Stage},
    prior::{Prior, Priors},
    trace::Draw,
};

const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// Sums over the observations the likelihood depends on.
///
/// Second moments are centered, so residual sums of squares stay accurate
/// for covariates far from zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SufficientStats {
    pub n: usize,
    pub mean_x: f64,
    pub mean_y: f64,
    /// `Σ (x - mean_x)²`
    pub sxx: f64,
    /// `Σ (x - mean_x)(y - mean_y)`
    pub sxy: f64,
    /// `Σ (y - mean_y)²`
    pub syy: f64,
}

impl SufficientStats {
    fn new(x: &[f64], y: &[f64]) -> Self {
        let n = x.len();
        let mean_x = x.iter().sum::<f64>() / n as f64;
        let mean_y = y.iter().sum::<f64>() / n as f64;
        let (sxx, sxy, syy) = x
            .iter()
            .zip(y)
            .fold((0., 0., 0.), |(sxx, sxy, syy), (x, y)| {
                let dx = x - mean_x;
                let dy = y - mean_y;
                (sxx + dx * dx, sxy + dx * dy, syy + dy * dy)
            });
        SufficientStats {
            n,
            mean_x,
            mean_y,
            sxx,
            sxy,
            syy,
        }
    }

    /// `Σ (y - a - b x)²`
    pub fn residual_sum_of_squares(&self, a: f64, b: f64) -> f64 {
        let offset = self.mean_y - a - b * self.mean_x;
        let ssr = self.syy - 2. * b * self.sxy + b * b * self.sxx + self.n as f64 * offset * offset;
        ssr.max(0.)
    }

    /// `Σ x²`
    pub fn sum_x_squared(&self) -> f64 {
        self.sxx + self.n as f64 * self.mean_x * self.mean_x
    }

    /// `Σ x (y - a)`
    pub fn sum_x_residual(&self, a: f64) -> f64 {
        self.sxy + self.n as f64 * self.mean_x * (self.mean_y - a)
    }

    /// `Σ (y - b x)`
    pub fn sum_residual(&self, b: f64) -> f64 {
        self.n as f64 * (self.mean_y - b * self.mean_x)
    }
}

/// Linear regression with normal noise:
///
/// ```text
/// y[i] ~ Normal(a + b * x[i], s)
/// a ~ priors.intercept
/// b ~ priors.slope
/// s ~ priors.noise
/// ```
///
/// Constructing a model validates the data and priors, it does not sample.
#[derive(Debug, Clone)]
pub struct LinearModel {
    x: Vec<f64>,
    y: Vec<f64>,
    priors: Priors,
    stats: SufficientStats,
}

impl LinearModel {
    pub fn new(x: Vec<f64>, y: Vec<f64>, priors: Priors) -> Result<Self> {
        if x.len() != y.len() {
            return Err(RegressionError::invalid_input(
                Stage::ModelConstruction,
                format!("X has {} values but Y has {}", x.len(), y.len()),
            ));
        }
        if x.is_empty() {
            return Err(RegressionError::invalid_input(
                Stage::ModelConstruction,
                "X and Y are empty",
            ));
        }
        if let Some(value) = x.iter().chain(y.iter()).find(|v| !v.is_finite()) {
            return Err(RegressionError::invalid_input(
                Stage::ModelConstruction,
                format!("data contains the non-finite value {}", value),
            ));
        }
        priors.validate()?;
        let stats = SufficientStats::new(&x, &y);
        Ok(LinearModel {
            x,
            y,
            priors,
            stats,
        })
    }

    pub fn from_dataset(data: &Dataset, priors: Priors) -> Result<Self> {
        LinearModel::new(data.heights(), data.weights(), priors)
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn priors(&self) -> &Priors {
        &self.priors
    }

    pub fn stats(&self) -> &SufficientStats {
        &self.stats
    }

    pub fn ln_likelihood(&self, draw: &Draw) -> f64 {
        if !(draw.s > 0.) {
            return f64::NEG_INFINITY;
        }
        let n = self.stats.n as f64;
        let ssr = self.stats.residual_sum_of_squares(draw.a, draw.b);
        -n * (draw.s.ln() + LN_SQRT_2PI) - ssr / (2. * draw.s * draw.s)
    }

    /// Unnormalized log posterior density.
    pub fn ln_posterior(&self, draw: &Draw) -> f64 {
        let prior = self.priors.ln_density(draw);
        if prior == f64::NEG_INFINITY {
            return prior;
        }
        prior + self.ln_likelihood(draw)
    }
}

fn write_prior(f: &mut fmt::Formatter<'_>, name: &str, prior: &Prior) -> fmt::Result {
    match prior {
        Prior::Normal { mean, sd } => writeln!(f, "  {} ~ dnorm({}, {})", name, mean, sd),
        Prior::Uniform { low, high } => writeln!(f, "  {} ~ dunif({}, {})", name, low, high),
    }
}

/// BUGS-like rendering, with normal distributions given by their sd.
impl fmt::Display for LinearModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "model {{")?;
        writeln!(f, "  for (i in 1:{}) {{", self.len())?;
        writeln!(f, "    Y[i] ~ dnorm(a + b * X[i], s)")?;
        writeln!(f, "  }}")?;
        write_prior(f, "a", &self.priors.intercept)?;
        write_prior(f, "b", &self.priors.slope)?;
        write_prior(f, "s", &self.priors.noise)?;
        write!(f, "}}")
    }
}
