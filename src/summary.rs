//! Posterior summaries computed from materialized chains.
//!
//! All quantiles use linear interpolation between order statistics
//! (Hyndman & Fan type 7, the default of R's `quantile`): for sorted
//! values `x[0..n]` and probability `p` the quantile is
//! `x[j] + (h - j) * (x[j + 1] - x[j])` with `h = (n - 1) * p`, `j = floor(h)`.

use itertools::Itertools;

use crate::{
    error::{RegressionError, Result, Stage},
    trace::{Chain, Param, Trace},
};

/// Probabilities reported in [`ParamSummary::quantiles`].
pub const QUANTILE_PROBS: [f64; 5] = [0.025, 0.25, 0.5, 0.75, 0.975];

/// Type 7 quantile of already sorted, non-empty values.
pub(crate) fn quantile_sorted(sorted: &[f64], prob: f64) -> f64 {
    assert!(!sorted.is_empty());
    let h = (sorted.len() - 1) as f64 * prob.clamp(0., 1.);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    let frac = h - lo as f64;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + frac * (sorted[hi] - sorted[lo])
    }
}

/// Type 7 quantile of unsorted values.
pub fn quantile(values: &[f64], prob: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sorted = sorted(values);
    Some(quantile_sorted(&sorted, prob))
}

fn sorted(values: &[f64]) -> Vec<f64> {
    values.iter().copied().sorted_by(f64::total_cmp).collect_vec()
}

/// Running mean and variance (Welford).
///
/// The mean of identical values is exactly that value.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RunningVariance {
    mean: f64,
    m2: f64,
    count: u64,
}

impl RunningVariance {
    pub(crate) fn add(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub(crate) fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance, NaN for fewer than two values.
    pub(crate) fn variance(&self) -> f64 {
        if self.count < 2 {
            return f64::NAN;
        }
        self.m2 / (self.count - 1) as f64
    }
}

impl FromIterator<f64> for RunningVariance {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut acc = RunningVariance::default();
        iter.into_iter().for_each(|value| acc.add(value));
        acc
    }
}

fn nonempty(chain: &Chain, param: Param) -> Result<()> {
    if chain.is_empty() {
        Err(RegressionError::EmptyChain {
            stage: Stage::Summarization,
            param,
        })
    } else {
        Ok(())
    }
}

/// Posterior mean of a parameter.
pub fn point_estimate(chain: &Chain, param: Param) -> Result<f64> {
    nonempty(chain, param)?;
    Ok(chain
        .iter()
        .map(|draw| draw.get(param))
        .collect::<RunningVariance>()
        .mean())
}

/// Posterior standard deviation of a parameter, NaN for a single draw.
pub fn std_dev(chain: &Chain, param: Param) -> Result<f64> {
    nonempty(chain, param)?;
    Ok(chain
        .iter()
        .map(|draw| draw.get(param))
        .collect::<RunningVariance>()
        .variance()
        .sqrt())
}

pub(crate) fn check_level(level: f64) -> Result<()> {
    if level > 0. && level < 1. {
        Ok(())
    } else {
        Err(RegressionError::InvalidLevel(level))
    }
}

/// Equal-tailed interval of values containing `level` of the mass.
pub(crate) fn interval_of(values: &[f64], level: f64) -> (f64, f64) {
    let tail = (1. - level) / 2.;
    let sorted = sorted(values);
    (
        quantile_sorted(&sorted, tail),
        quantile_sorted(&sorted, 1. - tail),
    )
}

/// Equal-tailed credible interval of a parameter.
///
/// `level = 0.95` gives the 2.5 % and 97.5 % quantiles.
pub fn credible_interval(chain: &Chain, param: Param, level: f64) -> Result<(f64, f64)> {
    check_level(level)?;
    nonempty(chain, param)?;
    Ok(interval_of(&chain.values(param), level))
}

/// Effective sample size from the autocorrelations of a chain.
///
/// Uses Geyer's initial positive sequence: lag pairs are summed while their
/// sum stays positive. Constant chains report their length.
pub fn effective_sample_size(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 4 {
        return n as f64;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let centered = values.iter().map(|v| v - mean).collect_vec();
    let autocov = |lag: usize| -> f64 {
        centered[..n - lag]
            .iter()
            .zip(&centered[lag..])
            .map(|(x, y)| x * y)
            .sum::<f64>()
            / n as f64
    };
    let var = autocov(0);
    if var <= 0. {
        return n as f64;
    }

    let mut sum = -1.;
    let mut lag = 0;
    while lag + 1 < n {
        let pair = (autocov(lag) + autocov(lag + 1)) / var;
        if pair <= 0. {
            break;
        }
        sum += 2. * pair;
        lag += 2;
    }
    let tau = sum.max(1. / n as f64);
    n as f64 / tau
}

/// Summary statistics of one parameter in one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSummary {
    pub param: Param,
    pub mean: f64,
    pub sd: f64,
    /// `sd / sqrt(n)`, ignoring autocorrelation.
    pub naive_se: f64,
    /// `sd / sqrt(ess)`.
    pub time_series_se: f64,
    pub ess: f64,
    /// Quantiles at [`QUANTILE_PROBS`].
    pub quantiles: [f64; 5],
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainSummary {
    pub chain_id: u64,
    pub num_draws: usize,
    pub params: Vec<ParamSummary>,
}

impl ChainSummary {
    pub fn get(&self, param: Param) -> Option<&ParamSummary> {
        self.params.iter().find(|summary| summary.param == param)
    }
}

pub fn summarize_param(chain: &Chain, param: Param) -> Result<ParamSummary> {
    nonempty(chain, param)?;
    let values = chain.values(param);
    let stats = values.iter().copied().collect::<RunningVariance>();
    let sd = stats.variance().sqrt();
    let ess = effective_sample_size(&values);
    let sorted = sorted(&values);
    Ok(ParamSummary {
        param,
        mean: stats.mean(),
        sd,
        naive_se: sd / (values.len() as f64).sqrt(),
        time_series_se: sd / ess.sqrt(),
        ess,
        quantiles: QUANTILE_PROBS.map(|prob| quantile_sorted(&sorted, prob)),
    })
}

pub fn summarize(chain: &Chain) -> Result<ChainSummary> {
    let params = Param::ALL
        .iter()
        .map(|&param| summarize_param(chain, param))
        .collect::<Result<Vec<_>>>()?;
    Ok(ChainSummary {
        chain_id: chain.chain_id,
        num_draws: chain.len(),
        params,
    })
}

/// Potential scale reduction factor of a parameter across chains.
///
/// Values close to 1 indicate the chains sample the same distribution.
pub fn gelman_rubin(trace: &Trace, param: Param) -> Result<f64> {
    if trace.num_chains() < 2 {
        return Err(RegressionError::invalid_input(
            Stage::Summarization,
            format!(
                "R-hat needs at least two chains, the trace has {}",
                trace.num_chains()
            ),
        ));
    }
    let lengths = trace.chains.iter().map(Chain::len).unique().collect_vec();
    let n = match lengths.as_slice() {
        [n] if *n >= 2 => *n as f64,
        _ => {
            return Err(RegressionError::invalid_input(
                Stage::Summarization,
                format!(
                    "R-hat needs chains of equal length of at least 2, got lengths {:?}",
                    lengths
                ),
            ))
        }
    };

    let per_chain = trace
        .chains
        .iter()
        .map(|chain| {
            chain
                .iter()
                .map(|draw| draw.get(param))
                .collect::<RunningVariance>()
        })
        .collect_vec();
    let within = per_chain.iter().map(|c| c.variance()).sum::<f64>() / per_chain.len() as f64;
    let between_over_n = per_chain
        .iter()
        .map(|c| c.mean())
        .collect::<RunningVariance>()
        .variance();

    if !(within > 0.) {
        return Err(RegressionError::invalid_input(
            Stage::Summarization,
            format!("within-chain variance of {} is {}", param, within),
        ));
    }
    let pooled = (n - 1.) / n * within + between_over_n;
    Ok((pooled / within).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::Draw;
    use approx::assert_abs_diff_eq;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn chain_of(values: &[f64]) -> Chain {
        Chain::new(0, values.iter().map(|&v| Draw::new(v, v, v.abs() + 1.)).collect())
    }

    #[test]
    fn interval_of_first_hundred_integers() {
        let values = (1..=100).map(|v| v as f64).collect_vec();
        let chain = chain_of(&values);
        let (lo, hi) = credible_interval(&chain, Param::Intercept, 0.95).unwrap();
        assert_abs_diff_eq!(lo, 3.475, epsilon = 1e-9);
        assert_abs_diff_eq!(hi, 97.525, epsilon = 1e-9);
    }

    #[test]
    fn type_seven_matches_reference() {
        let sorted = [1., 2., 3., 4.];
        assert_eq!(quantile_sorted(&sorted, 0.), 1.);
        assert_eq!(quantile_sorted(&sorted, 1.), 4.);
        assert_abs_diff_eq!(quantile_sorted(&sorted, 0.25), 1.75);
        assert_abs_diff_eq!(quantile_sorted(&sorted, 0.5), 2.5);
        assert_eq!(quantile(&[3., 1., 2.], 0.5), Some(2.));
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn empty_chain_errors() {
        let chain = Chain::new(0, vec![]);
        assert!(matches!(
            point_estimate(&chain, Param::Slope),
            Err(RegressionError::EmptyChain {
                stage: Stage::Summarization,
                param: Param::Slope
            })
        ));
        assert!(matches!(
            credible_interval(&chain, Param::Noise, 0.9),
            Err(RegressionError::EmptyChain { .. })
        ));
        assert!(summarize(&chain).is_err());
    }

    #[test]
    fn invalid_levels() {
        let chain = chain_of(&[1., 2., 3.]);
        for level in [0., 1., -0.5, 1.5, f64::NAN] {
            let err = credible_interval(&chain, Param::Intercept, level).unwrap_err();
            assert!(matches!(err, RegressionError::InvalidLevel(_)));
            assert_eq!(err.stage(), Stage::Summarization);
        }
    }

    #[test]
    fn single_draw_summary() {
        let chain = chain_of(&[2.5]);
        assert_eq!(point_estimate(&chain, Param::Intercept).unwrap(), 2.5);
        assert!(std_dev(&chain, Param::Intercept).unwrap().is_nan());
        assert_eq!(
            credible_interval(&chain, Param::Intercept, 0.5).unwrap(),
            (2.5, 2.5)
        );
    }

    #[test]
    fn summary_table_of_known_values() {
        let values = (1..=100).map(|v| v as f64).collect_vec();
        let summary = summarize(&chain_of(&values)).unwrap();
        assert_eq!(summary.num_draws, 100);
        let a = summary.get(Param::Intercept).unwrap();
        assert_abs_diff_eq!(a.mean, 50.5, epsilon = 1e-12);
        assert_abs_diff_eq!(a.sd, 29.011_491_975_882_016, epsilon = 1e-9);
        assert_abs_diff_eq!(a.quantiles[2], 50.5, epsilon = 1e-12);
        assert_abs_diff_eq!(a.naive_se, a.sd / 10., epsilon = 1e-12);
    }

    #[test]
    fn ess_of_independent_and_sticky_chains() {
        let alternating = (0..1000)
            .map(|i| if i % 2 == 0 { 1. } else { -1. })
            .collect_vec();
        assert!(effective_sample_size(&alternating) >= 1000.);

        let sticky = (0..1000).map(|i| (i / 100) as f64).collect_vec();
        assert!(effective_sample_size(&sticky) < 100.);

        assert_eq!(effective_sample_size(&[1.; 50]), 50.);
    }

    #[test]
    fn rhat_of_agreeing_and_disagreeing_chains() {
        let base = (0..200).map(|i| ((i * 37) % 101) as f64).collect_vec();
        let shifted = base.iter().map(|v| v + 0.5).collect_vec();
        let trace = Trace {
            chains: vec![chain_of(&base), chain_of(&shifted)],
        };
        let rhat = gelman_rubin(&trace, Param::Intercept).unwrap();
        assert!(rhat < 1.01, "{}", rhat);

        let far = base.iter().map(|v| v + 1000.).collect_vec();
        let trace = Trace {
            chains: vec![chain_of(&base), chain_of(&far)],
        };
        assert!(gelman_rubin(&trace, Param::Intercept).unwrap() > 2.);

        let trace = Trace {
            chains: vec![chain_of(&base)],
        };
        assert!(gelman_rubin(&trace, Param::Intercept).is_err());
    }

    proptest! {
        #[test]
        fn constant_chain_mean_is_exact(v in -1e6f64..1e6f64, n in 1usize..500) {
            let chain = chain_of(&vec![v; n]);
            prop_assert_eq!(point_estimate(&chain, Param::Slope).unwrap(), v);
        }

        #[test]
        fn interval_is_ordered_and_covers(
            values in proptest::collection::vec(-1e3f64..1e3f64, 1..300),
            level in 0.05f64..0.99f64,
        ) {
            let chain = chain_of(&values);
            let (lo, hi) = credible_interval(&chain, Param::Intercept, level).unwrap();
            prop_assert!(lo <= hi);
            let again = credible_interval(&chain, Param::Intercept, level).unwrap();
            prop_assert_eq!((lo, hi), again);
            let inside = values.iter().filter(|&&v| v >= lo && v <= hi).count();
            // Interpolated bounds can exclude at most one order statistic per tail.
            let n = values.len() as f64;
            prop_assert!(inside as f64 >= level * (n - 1.) - 2.);
        }
    }
}
