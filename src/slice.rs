//! Univariate slice sampling with stepping out and shrinkage (Neal, 2003).

use rand::Rng;
use rand_distr::{Distribution, Exp1};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SliceError {
    #[error("log density at the current value {value} is {logp}")]
    InvalidStart { value: f64, logp: f64 },
    #[error("no point accepted after {0} shrinkage steps")]
    ShrinkageExhausted(usize),
}

/// Settings for slice updates.
#[derive(Debug, Clone, Copy)]
pub struct SliceOptions {
    /// Initial width of the slice interval.
    pub initial_width: f64,
    /// Maximum number of intervals of size `width` the slice is
    /// stepped out to.
    pub max_steps_out: usize,
    /// Maximum number of rejected points before giving up.
    pub max_shrink: usize,
}

impl Default for SliceOptions {
    fn default() -> Self {
        SliceOptions {
            initial_width: 1.,
            max_steps_out: 10,
            max_shrink: 200,
        }
    }
}

/// A one dimensional slice sampler restricted to `(lower, upper)`.
///
/// While adapting, the width follows twice the running mean of the absolute
/// jumps.
#[derive(Debug, Clone)]
pub struct SliceSampler {
    width: f64,
    lower: f64,
    upper: f64,
    options: SliceOptions,
    adapting: bool,
    jump_sum: f64,
    jump_count: u64,
    last_evaluations: usize,
}

impl SliceSampler {
    pub fn new(options: SliceOptions, lower: f64, upper: f64) -> Self {
        let mut width = options.initial_width;
        if (upper - lower).is_finite() {
            width = width.min((upper - lower) / 2.);
        }
        SliceSampler {
            width,
            lower,
            upper,
            options,
            adapting: true,
            jump_sum: 0.,
            jump_count: 0,
            last_evaluations: 0,
        }
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn stop_adaptation(&mut self) {
        self.adapting = false;
    }

    /// Number of log density evaluations of the last update.
    pub fn last_evaluations(&self) -> usize {
        self.last_evaluations
    }

    fn inside(&self, x: f64) -> bool {
        x > self.lower && x < self.upper
    }

    /// Draw a new value from the slice through `current`.
    ///
    /// `logp` must be the log density up to a constant; points outside
    /// the bounds are never evaluated.
    pub fn update<R, F>(&mut self, rng: &mut R, current: f64, mut logp: F) -> Result<f64, SliceError>
    where
        R: Rng + ?Sized,
        F: FnMut(f64) -> f64,
    {
        let mut evaluations = 1;
        let logp_current = logp(current);
        if !(logp_current.is_finite() && self.inside(current)) {
            return Err(SliceError::InvalidStart {
                value: current,
                logp: logp_current,
            });
        }
        let exp: f64 = Exp1.sample(rng);
        let level = logp_current - exp;

        let (lower, upper) = (self.lower, self.upper);
        let mut above = |x: f64, evaluations: &mut usize| {
            if !(x > lower && x < upper) {
                return false;
            }
            *evaluations += 1;
            logp(x) > level
        };

        let width = self.width;
        let mut left = current - width * rng.random::<f64>();
        let mut right = left + width;
        let steps = self.options.max_steps_out;
        let mut steps_left = (steps as f64 * rng.random::<f64>()).floor() as usize;
        let mut steps_right = steps.saturating_sub(1).saturating_sub(steps_left);
        while steps_left > 0 && above(left, &mut evaluations) {
            left -= width;
            steps_left -= 1;
        }
        while steps_right > 0 && above(right, &mut evaluations) {
            right += width;
            steps_right -= 1;
        }
        left = left.max(self.lower);
        right = right.min(self.upper);

        for _ in 0..self.options.max_shrink {
            let proposal = left + (right - left) * rng.random::<f64>();
            if above(proposal, &mut evaluations) {
                self.last_evaluations = evaluations;
                if self.adapting {
                    self.record_jump((proposal - current).abs());
                }
                return Ok(proposal);
            }
            if proposal < current {
                left = proposal;
            } else {
                right = proposal;
            }
        }
        self.last_evaluations = evaluations;
        Err(SliceError::ShrinkageExhausted(self.options.max_shrink))
    }

    fn record_jump(&mut self, jump: f64) {
        self.jump_sum += jump;
        self.jump_count += 1;
        let adapted = 2. * self.jump_sum / self.jump_count as f64;
        if adapted.is_finite() && adapted > 0. {
            self.width = adapted;
        }
    }
}
