use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use tracing::debug;

use crate::{
    error::{RegressionError, Result, Stage},
    model::{LinearModel, SufficientStats},
    slice::{SliceOptions, SliceSampler},
    trace::{Draw, Param},
};

/// Information about a single sweep of the sampler.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Progress {
    pub draw: u64,
    pub chain: u64,
    pub tuning: bool,
    /// Log density evaluations spent in slice updates during the sweep.
    pub slice_evaluations: usize,
}

enum Update {
    /// Exact joint draw of `(a, b)` from their bivariate normal full
    /// conditional, used when both have normal priors.
    Coefficients {
        intercept: (f64, f64),
        slope: (f64, f64),
    },
    /// Exact draw from the normal full conditional of a parameter
    /// with a normal prior.
    Conjugate {
        param: Param,
        prior_mean: f64,
        prior_sd: f64,
    },
    Slice(Param, SliceSampler),
}

/// One Markov chain over `(a, b, s)`.
///
/// Every call to [`GibbsChain::draw`] updates `(a, b)` and then `s` from
/// their full conditionals. The coefficients are drawn jointly if both have
/// normal priors, one at a time otherwise. The first `num_tune` sweeps adapt the widths of
/// the slice updates.
pub struct GibbsChain<'model, R: Rng> {
    model: &'model LinearModel,
    rng: R,
    position: Draw,
    updates: Vec<Update>,
    chain: u64,
    draw_count: u64,
    num_tune: u64,
}

impl<'model, R: Rng> GibbsChain<'model, R> {
    /// Create a chain starting at a draw from the priors.
    pub fn new(
        model: &'model LinearModel,
        slice_options: SliceOptions,
        num_tune: u64,
        chain: u64,
        mut rng: R,
    ) -> Self {
        let priors = model.priors();
        let slice = |param: Param| {
            let (lower, upper) = priors.get(param).support();
            let mut slice = SliceSampler::new(slice_options, lower, upper);
            if num_tune == 0 {
                slice.stop_adaptation();
            }
            Update::Slice(param, slice)
        };
        let coefficient = |param: Param| match priors.get(param).as_normal() {
            Some((prior_mean, prior_sd)) => Update::Conjugate {
                param,
                prior_mean,
                prior_sd,
            },
            None => slice(param),
        };
        let mut updates = match (priors.intercept.as_normal(), priors.slope.as_normal()) {
            (Some(intercept), Some(slope)) => vec![Update::Coefficients { intercept, slope }],
            _ => vec![coefficient(Param::Intercept), coefficient(Param::Slope)],
        };
        updates.push(slice(Param::Noise));
        let position = priors.sample(&mut rng);
        GibbsChain {
            model,
            rng,
            position,
            updates,
            chain,
            draw_count: 0,
            num_tune,
        }
    }

    /// Move the chain to `position`.
    ///
    /// Fails if the posterior density is zero or undefined there.
    pub fn set_position(&mut self, position: Draw) -> Result<()> {
        let logp = self.model.ln_posterior(&position);
        if !logp.is_finite() {
            return Err(RegressionError::invalid_input(
                Stage::Sampling,
                format!(
                    "initial position {:?} of chain {} has log posterior density {}",
                    position, self.chain, logp
                ),
            ));
        }
        self.position = position;
        Ok(())
    }

    pub fn position(&self) -> Draw {
        self.position
    }

    pub fn chain(&self) -> u64 {
        self.chain
    }

    /// Current widths of all slice updated parameters.
    pub fn slice_widths(&self) -> Vec<(Param, f64)> {
        self.updates
            .iter()
            .filter_map(|update| match update {
                Update::Slice(param, slice) => Some((*param, slice.width())),
                _ => None,
            })
            .collect()
    }

    /// Perform one sweep and return the new position.
    pub fn draw(&mut self) -> Result<(Draw, Progress)> {
        let tuning = self.draw_count < self.num_tune;
        let stats = *self.model.stats();
        let mut slice_evaluations = 0;

        for update in self.updates.iter_mut() {
            let inv_var = (self.position.s * self.position.s).recip();
            let values = match update {
                Update::Coefficients { intercept, slope } => {
                    let (a, b) =
                        conjugate_coefficients(&mut self.rng, *intercept, *slope, &stats, inv_var);
                    vec![(Param::Intercept, a), (Param::Slope, b)]
                }
                Update::Conjugate {
                    param,
                    prior_mean,
                    prior_sd,
                } => {
                    let (data_precision, data_sum) = match param {
                        Param::Intercept => (
                            stats.n as f64 * inv_var,
                            stats.sum_residual(self.position.b) * inv_var,
                        ),
                        _ => (
                            stats.sum_x_squared() * inv_var,
                            stats.sum_x_residual(self.position.a) * inv_var,
                        ),
                    };
                    let value = conjugate_normal(
                        &mut self.rng,
                        *prior_mean,
                        *prior_sd,
                        data_precision,
                        data_sum,
                    );
                    vec![(*param, value)]
                }
                Update::Slice(param, slice) => {
                    let param = *param;
                    let model = self.model;
                    let mut point = self.position;
                    let result = slice.update(&mut self.rng, point.get(param), |value| {
                        *point.get_mut(param) = value;
                        model.ln_posterior(&point)
                    });
                    slice_evaluations += slice.last_evaluations();
                    let value = result.map_err(|err| {
                        sampling_error(self.chain, self.draw_count, param, err.to_string())
                    })?;
                    vec![(param, value)]
                }
            };
            for (param, value) in values {
                if !value.is_finite() {
                    return Err(sampling_error(
                        self.chain,
                        self.draw_count,
                        param,
                        format!("drew the non-finite value {}", value),
                    ));
                }
                *self.position.get_mut(param) = value;
            }
        }

        let progress = Progress {
            draw: self.draw_count,
            chain: self.chain,
            tuning,
            slice_evaluations,
        };

        self.draw_count += 1;
        if self.draw_count == self.num_tune {
            self.updates.iter_mut().for_each(|update| {
                if let Update::Slice(_, slice) = update {
                    slice.stop_adaptation();
                }
            });
            debug!(
                chain = self.chain,
                widths = ?self.slice_widths(),
                "Finished tuning"
            );
        }

        Ok((self.position, progress))
    }
}

fn sampling_error(chain: u64, draw: u64, param: Param, message: String) -> RegressionError {
    RegressionError::Sampling {
        chain,
        draw,
        param,
        message,
    }
}

/// Draw `(a, b)` given `1 / s²`, with independent normal priors given as
/// `(mean, sd)`.
///
/// The posterior precision matrix is factored as `L Lᵀ`, and the draw is
/// `L⁻ᵀ (L⁻¹ h + z)` for the precision weighted mean `h`.
fn conjugate_coefficients<R: Rng + ?Sized>(
    rng: &mut R,
    intercept: (f64, f64),
    slope: (f64, f64),
    stats: &SufficientStats,
    inv_var: f64,
) -> (f64, f64) {
    let n = stats.n as f64;
    let prec_a = (intercept.1 * intercept.1).recip();
    let prec_b = (slope.1 * slope.1).recip();

    // Precision matrix [[p11, p21], [p21, p22]] and h = [h1, h2]. The Schur
    // complement and the second component of L⁻¹ h are expanded in centered
    // sums, since x is typically far from zero.
    let p11 = prec_a + n * inv_var;
    let p21 = n * stats.mean_x * inv_var;
    let h1 = intercept.0 * prec_a + n * stats.mean_y * inv_var;
    let shrink = prec_a / p11;
    let schur = prec_b + inv_var * (stats.sxx + n * stats.mean_x * stats.mean_x * shrink);
    let h2_reduced = slope.0 * prec_b
        + inv_var * (stats.sxy + n * stats.mean_x * (stats.mean_y - intercept.0) * shrink);

    let l11 = p11.sqrt();
    let l21 = p21 / l11;
    let l22 = schur.sqrt();

    let z1: f64 = StandardNormal.sample(rng);
    let z2: f64 = StandardNormal.sample(rng);
    let w1 = h1 / l11 + z1;
    let w2 = h2_reduced / l22 + z2;
    let b = w2 / l22;
    let a = (w1 - l21 * b) / l11;
    (a, b)
}

/// Draw from the posterior of a normal mean with prior
/// `Normal(prior_mean, prior_sd)`, given the precision contributed by the
/// data and the precision weighted sum of the data.
fn conjugate_normal<R: Rng + ?Sized>(
    rng: &mut R,
    prior_mean: f64,
    prior_sd: f64,
    data_precision: f64,
    data_sum: f64,
) -> f64 {
    let prior_precision = (prior_sd * prior_sd).recip();
    let precision = prior_precision + data_precision;
    let mean = (prior_mean * prior_precision + data_sum) / precision;
    let z: f64 = StandardNormal.sample(rng);
    mean + z / precision.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prior::{Prior, Priors};
    use approx::assert_abs_diff_eq;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn model() -> LinearModel {
        let x = (0..50).map(|i| 150. + i as f64).collect::<Vec<_>>();
        let y = x
            .iter()
            .enumerate()
            .map(|(i, x)| -100. + x + if i % 2 == 0 { 3. } else { -3. })
            .collect();
        LinearModel::new(x, y, Priors::default()).unwrap()
    }

    #[test]
    fn deterministic() {
        let model = model();
        let mut first = GibbsChain::new(&model, SliceOptions::default(), 10, 0, StdRng::seed_from_u64(42));
        let mut second = GibbsChain::new(&model, SliceOptions::default(), 10, 0, StdRng::seed_from_u64(42));
        for _ in 0..20 {
            let (draw1, _) = first.draw().unwrap();
            let (draw2, _) = second.draw().unwrap();
            assert_eq!(draw1, draw2);
        }
    }

    #[test]
    fn progress_reports_tuning() {
        let model = model();
        let mut chain = GibbsChain::new(&model, SliceOptions::default(), 2, 3, StdRng::seed_from_u64(1));
        let (_, info) = chain.draw().unwrap();
        assert!(info.tuning);
        assert_eq!(info.chain, 3);
        assert_eq!(info.draw, 0);
        assert!(info.slice_evaluations > 0);
        chain.draw().unwrap();
        let (_, info) = chain.draw().unwrap();
        assert!(!info.tuning);
        assert_eq!(info.draw, 2);
    }

    #[test]
    fn set_position_checks_support() {
        let model = model();
        let mut chain = GibbsChain::new(&model, SliceOptions::default(), 0, 0, StdRng::seed_from_u64(1));
        assert!(chain.set_position(Draw::new(0., 1., -1.)).is_err());
        assert!(chain.set_position(Draw::new(0., 1., 30.)).is_err());
        chain.set_position(Draw::new(-100., 1., 3.)).unwrap();
        assert_eq!(chain.position(), Draw::new(-100., 1., 3.));
    }

    #[test]
    fn uniform_coefficient_priors_use_slice_updates() {
        let priors = Priors {
            intercept: Prior::Uniform {
                low: -300.,
                high: 300.,
            },
            ..Default::default()
        };
        let model = LinearModel::new(model().x().to_vec(), model().y().to_vec(), priors).unwrap();
        let mut chain = GibbsChain::new(&model, SliceOptions::default(), 100, 0, StdRng::seed_from_u64(5));
        let params = chain.slice_widths().into_iter().map(|(p, _)| p).collect::<Vec<_>>();
        assert_eq!(params, vec![Param::Intercept, Param::Noise]);
        for _ in 0..200 {
            let (draw, _) = chain.draw().unwrap();
            assert!(draw.a > -300. && draw.a < 300.);
            assert!(draw.s > 0. && draw.s < 20.);
        }
    }

    #[test]
    fn joint_coefficient_update_matches_closed_form() {
        let model = LinearModel::new(vec![170., 190.], vec![70., 90.], Priors::default()).unwrap();
        let inv_var = 1. / 25.;
        let (p11, p21, p22) = (
            1. / 200f64.powi(2) + 2. * inv_var,
            360. * inv_var,
            1. / 0.5f64.powi(2) + (170f64.powi(2) + 190f64.powi(2)) * inv_var,
        );
        let (h1, h2) = (160. * inv_var, 4. + (170. * 70. + 190. * 90.) * inv_var);
        let det = p11 * p22 - p21 * p21;
        let mean_a = (p22 * h1 - p21 * h2) / det;
        let mean_b = (p11 * h2 - p21 * h1) / det;
        let var_b = p11 / det;

        let mut rng = StdRng::seed_from_u64(8);
        let draws = (0..20_000)
            .map(|_| {
                conjugate_coefficients(&mut rng, (0., 200.), (1., 0.5), model.stats(), inv_var)
            })
            .collect::<Vec<_>>();
        let n = draws.len() as f64;
        let a = draws.iter().map(|d| d.0).sum::<f64>() / n;
        let b = draws.iter().map(|d| d.1).sum::<f64>() / n;
        let vb = draws.iter().map(|d| (d.1 - b).powi(2)).sum::<f64>() / n;
        assert_abs_diff_eq!(a, mean_a, epsilon = 2.);
        assert_abs_diff_eq!(b, mean_b, epsilon = 0.01);
        assert_abs_diff_eq!(vb, var_b, epsilon = 0.05 * var_b);
    }

    #[test]
    fn conjugate_update_matches_closed_form() {
        let mut rng = StdRng::seed_from_u64(3);
        let draws = (0..20_000)
            .map(|_| conjugate_normal(&mut rng, 1., 0.5, 12., 36.))
            .collect::<Vec<_>>();
        // precision 4 + 12 = 16, mean (4 * 1 + 36) / 16 = 2.5
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        let var = draws.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / draws.len() as f64;
        assert_abs_diff_eq!(mean, 2.5, epsilon = 0.01);
        assert_abs_diff_eq!(var, 1. / 16., epsilon = 0.005);
    }
}
