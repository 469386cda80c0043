//! Posterior predictive draws at a fixed covariate value.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::{
    error::{RegressionError, Result, Stage},
    summary::{check_level, interval_of},
    trace::{Chain, Param},
};

fn check_covariate(x0: f64) -> Result<()> {
    if x0.is_finite() {
        Ok(())
    } else {
        Err(RegressionError::invalid_input(
            Stage::Prediction,
            format!("covariate must be finite, got {}", x0),
        ))
    }
}

/// Draw one new observation at `x0` for every draw of the chain.
///
/// Draw `t` of the result comes from `Normal(a_t + b_t * x0, s_t)`, so the
/// result has exactly as many values as the chain has draws. The chain is
/// validated first.
pub fn predict<R: Rng + ?Sized>(chain: &Chain, x0: f64, rng: &mut R) -> Result<Vec<f64>> {
    check_covariate(x0)?;
    chain.validate()?;
    Ok(chain
        .iter()
        .map(|draw| {
            let z: f64 = StandardNormal.sample(rng);
            draw.linear_predictor(x0) + draw.s * z
        })
        .collect())
}

/// The regression line `a_t + b_t * x0` evaluated for every draw.
pub fn mean_response(chain: &Chain, x0: f64) -> Result<Vec<f64>> {
    check_covariate(x0)?;
    Ok(chain.iter().map(|draw| draw.linear_predictor(x0)).collect())
}

/// Equal-tailed interval of new observations at `x0`.
pub fn predictive_interval<R: Rng + ?Sized>(
    chain: &Chain,
    x0: f64,
    level: f64,
    rng: &mut R,
) -> Result<(f64, f64)> {
    check_level(level)?;
    if chain.is_empty() {
        return Err(RegressionError::EmptyChain {
            stage: Stage::Prediction,
            param: Param::Noise,
        });
    }
    let draws = predict(chain, x0, rng)?;
    Ok(interval_of(&draws, level))
}
