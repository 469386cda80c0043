use rand::Rng;
use rand_distr::{Distribution, Normal, Open01, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::{
    error::{RegressionError, Result, Stage},
    trace::{Draw, Param},
};

const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// A univariate prior distribution.
///
/// Normal priors are parameterised by their standard deviation, not their
/// precision. Uniform priors have the open support `(low, high)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dist", rename_all = "lowercase")]
pub enum Prior {
    Normal { mean: f64, sd: f64 },
    Uniform { low: f64, high: f64 },
}

impl Prior {
    pub fn validate(&self, param: Param) -> Result<()> {
        let problem = match *self {
            Prior::Normal { mean, sd } => {
                if !mean.is_finite() {
                    Some(format!("mean must be finite, got {}", mean))
                } else if !(sd.is_finite() && sd > 0.) {
                    Some(format!("sd must be positive and finite, got {}", sd))
                } else {
                    None
                }
            }
            Prior::Uniform { low, high } => {
                if !(low.is_finite() && high.is_finite()) {
                    Some(format!("bounds must be finite, got ({}, {})", low, high))
                } else if low >= high {
                    Some(format!("low must be below high, got ({}, {})", low, high))
                } else {
                    None
                }
            }
        };
        match problem {
            Some(message) => Err(RegressionError::invalid_input(
                Stage::ModelConstruction,
                format!("prior of {}: {}", param, message),
            )),
            None => Ok(()),
        }
    }

    /// Normalized log density at `x`. Outside the support this is `-inf`.
    pub fn ln_density(&self, x: f64) -> f64 {
        match *self {
            Prior::Normal { mean, sd } => {
                let z = (x - mean) / sd;
                -0.5 * z * z - sd.ln() - LN_SQRT_2PI
            }
            Prior::Uniform { low, high } => {
                if x > low && x < high {
                    -(high - low).ln()
                } else {
                    f64::NEG_INFINITY
                }
            }
        }
    }

    /// The interval outside of which the density is zero.
    pub fn support(&self) -> (f64, f64) {
        match *self {
            Prior::Normal { .. } => (f64::NEG_INFINITY, f64::INFINITY),
            Prior::Uniform { low, high } => (low, high),
        }
    }

    pub fn contains(&self, x: f64) -> bool {
        let (low, high) = self.support();
        x > low && x < high
    }

    /// Draw a single value. The prior must have been validated.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            Prior::Normal { mean, sd } => {
                let z: f64 = StandardNormal.sample(rng);
                mean + sd * z
            }
            Prior::Uniform { low, high } => {
                let u: f64 = Open01.sample(rng);
                low + (high - low) * u
            }
        }
    }

    pub(crate) fn as_normal(&self) -> Option<(f64, f64)> {
        match *self {
            Prior::Normal { mean, sd } => Some((mean, sd)),
            Prior::Uniform { .. } => None,
        }
    }
}

/// Priors of the intercept, the slope and the noise scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Priors {
    pub intercept: Prior,
    pub slope: Prior,
    /// Must be a uniform prior on a subset of the positive half line.
    pub noise: Prior,
}

impl Default for Priors {
    fn default() -> Self {
        Priors {
            intercept: Prior::Normal {
                mean: 0.,
                sd: 200.,
            },
            slope: Prior::Normal { mean: 1., sd: 0.5 },
            noise: Prior::Uniform {
                low: 0.,
                high: 20.,
            },
        }
    }
}

impl Priors {
    pub fn get(&self, param: Param) -> &Prior {
        match param {
            Param::Intercept => &self.intercept,
            Param::Slope => &self.slope,
            Param::Noise => &self.noise,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for param in Param::ALL {
            self.get(param).validate(param)?;
        }
        match self.noise {
            Prior::Uniform { low, .. } if low >= 0. => Ok(()),
            Prior::Uniform { low, .. } => Err(RegressionError::invalid_input(
                Stage::ModelConstruction,
                format!("prior of s must not extend below zero, got low = {}", low),
            )),
            other => Err(RegressionError::invalid_input(
                Stage::ModelConstruction,
                format!("prior of s must be uniform on positive values, got {:?}", other),
            )),
        }
    }

    /// Joint log prior density of a point.
    pub fn ln_density(&self, draw: &Draw) -> f64 {
        Param::ALL
            .iter()
            .map(|&param| self.get(param).ln_density(draw.get(param)))
            .sum()
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Draw {
        Draw::new(
            self.intercept.sample(rng),
            self.slope.sample(rng),
            self.noise.sample(rng),
        )
    }
}

/// Draw `num_draws` independent points from the priors, without any data.
pub fn sample_priors<R: Rng + ?Sized>(
    priors: &Priors,
    num_draws: usize,
    rng: &mut R,
) -> Result<Vec<Draw>> {
    priors.validate()?;
    let intercept = prior_distribution(&priors.intercept)?;
    let slope = prior_distribution(&priors.slope)?;
    let noise = prior_distribution(&priors.noise)?;
    Ok((0..num_draws)
        .map(|_| {
            Draw::new(
                intercept.sample(rng),
                slope.sample(rng),
                noise.sample(rng),
            )
        })
        .collect())
}

enum PriorDistribution {
    Normal(Normal<f64>),
    Uniform { low: f64, width: f64 },
}

impl Distribution<f64> for PriorDistribution {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            PriorDistribution::Normal(normal) => normal.sample(rng),
            PriorDistribution::Uniform { low, width } => {
                let u: f64 = Open01.sample(rng);
                low + width * u
            }
        }
    }
}

fn prior_distribution(prior: &Prior) -> Result<PriorDistribution> {
    match *prior {
        Prior::Normal { mean, sd } => Normal::new(mean, sd)
            .map(PriorDistribution::Normal)
            .map_err(|err| {
                RegressionError::invalid_input(
                    Stage::ModelConstruction,
                    format!("Normal({}, {}): {}", mean, sd, err),
                )
            }),
        Prior::Uniform { low, high } => Ok(PriorDistribution::Uniform {
            low,
            width: high - low,
        }),
    }
}
