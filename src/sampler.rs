use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::{prelude::*, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::{RegressionError, Result, Stage},
    gibbs::{GibbsChain, Progress},
    model::LinearModel,
    slice::SliceOptions,
    trace::{Chain, Draw, Trace},
};

/// Draws reserved per chain before sampling starts, larger chains grow.
const MAX_PREALLOCATED_DRAWS: u64 = 1 << 20;

/// Settings for a sampling request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Number of initial sweeps per chain that adapt the sampler and are
    /// discarded.
    pub num_tune: u64,
    /// Number of draws kept per chain.
    pub num_draws: u64,
    pub num_chains: usize,
    pub seed: u64,
    /// Keep every `thin`-th sweep after tuning.
    pub thin: u64,
    /// Worker threads, one per chain if not set.
    pub num_cores: Option<usize>,
    /// Initial interval width of slice updates.
    pub slice_width: f64,
    /// Rejected slice proposals tolerated before a sweep fails.
    pub max_slice_shrink: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            num_tune: 1000,
            num_draws: 1000,
            num_chains: 1,
            seed: 0,
            thin: 1,
            num_cores: None,
            slice_width: 1.,
            max_slice_shrink: 200,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let problem = if self.num_draws == 0 {
            Some(format!("num_draws must be positive, got {}", self.num_draws))
        } else if self.num_chains == 0 {
            Some(format!("num_chains must be positive, got {}", self.num_chains))
        } else if self.thin == 0 {
            Some(format!("thin must be positive, got {}", self.thin))
        } else if self.num_cores == Some(0) {
            Some("num_cores must be positive".to_string())
        } else if !(self.slice_width.is_finite() && self.slice_width > 0.) {
            Some(format!("slice_width must be positive, got {}", self.slice_width))
        } else if self.max_slice_shrink == 0 {
            Some("max_slice_shrink must be positive".to_string())
        } else {
            None
        };
        match problem {
            Some(message) => Err(RegressionError::invalid_input(Stage::Sampling, message)),
            None => self.total_sweeps().map(|_| ()),
        }
    }

    /// Sweeps per chain, tuning included.
    pub fn total_sweeps(&self) -> Result<u64> {
        self.num_draws
            .checked_mul(self.thin)
            .and_then(|kept| kept.checked_add(self.num_tune))
            .ok_or_else(|| {
                RegressionError::invalid_input(
                    Stage::Sampling,
                    format!(
                        "{} tuning sweeps plus {} draws thinned by {} exceed the sweep counter",
                        self.num_tune, self.num_draws, self.thin
                    ),
                )
            })
    }

    fn slice_options(&self) -> SliceOptions {
        SliceOptions {
            initial_width: self.slice_width,
            max_shrink: self.max_slice_shrink,
            ..Default::default()
        }
    }

    /// The random number generator of a chain.
    ///
    /// All chains share the seed and use their id as stream, so results do
    /// not depend on how chains are scheduled.
    pub fn chain_rng(&self, chain: u64) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(chain);
        rng
    }

    pub fn new_chain<'model, R: Rng>(
        &self,
        chain: u64,
        model: &'model LinearModel,
        rng: R,
    ) -> GibbsChain<'model, R> {
        GibbsChain::new(model, self.slice_options(), self.num_tune, chain, rng)
    }
}

/// Lazily run a single chain, including tuning sweeps and thinned-out sweeps.
pub fn sample_sequentially<'model>(
    model: &'model LinearModel,
    settings: &Settings,
    chain: u64,
) -> Result<impl Iterator<Item = Result<(Draw, Progress)>> + 'model> {
    settings.validate()?;
    let mut sampler = settings.new_chain(chain, model, settings.chain_rng(chain));
    let total = settings.total_sweeps()?;
    Ok((0..total).map(move |_| sampler.draw()))
}

fn run_chain(model: &LinearModel, settings: &Settings, chain_id: u64) -> Result<Chain> {
    debug!(chain = chain_id, "Starting chain");
    let capacity = usize::try_from(settings.num_draws.min(MAX_PREALLOCATED_DRAWS)).unwrap_or(0);
    let mut draws = Vec::with_capacity(capacity);
    for (idx, item) in sample_sequentially(model, settings, chain_id)?.enumerate() {
        let (draw, progress) = item?;
        if progress.tuning {
            continue;
        }
        let after_tune = idx as u64 - settings.num_tune;
        if (after_tune + 1) % settings.thin == 0 {
            draws.push(draw);
        }
    }
    debug!(chain = chain_id, draws = draws.len(), "Finished chain");
    Ok(Chain::new(chain_id, draws))
}

/// Draw from the posterior of `model`.
///
/// Chains run in parallel. The first failing chain aborts the request.
pub fn sample(model: &LinearModel, settings: &Settings) -> Result<Trace> {
    settings.validate()?;
    info!(
        observations = model.len(),
        chains = settings.num_chains,
        tune = settings.num_tune,
        draws = settings.num_draws,
        thin = settings.thin,
        seed = settings.seed,
        "Sampling posterior"
    );

    let pool = ThreadPoolBuilder::new()
        .num_threads(settings.num_cores.unwrap_or(settings.num_chains))
        .thread_name(|i| format!("linreg-worker-{}", i))
        .build()
        .map_err(|err| {
            RegressionError::invalid_input(
                Stage::Sampling,
                format!("could not start worker threads: {}", err),
            )
        })?;

    let chains = pool.install(|| {
        (0..settings.num_chains)
            .into_par_iter()
            .map(|chain_id| run_chain(model, settings, chain_id as u64))
            .collect::<Result<Vec<_>>>()
    })?;
    Ok(Trace { chains })
}

/// Shorthand for [`sample`] with default tuning.
///
/// Without a seed, one is drawn from a generator seeded by the operating
/// system and logged, so the run can be repeated. No shared generator state
/// is touched.
pub fn sample_posterior(
    model: &LinearModel,
    num_draws: u64,
    num_chains: usize,
    seed: Option<u64>,
) -> Result<Trace> {
    let seed = seed.unwrap_or_else(|| {
        let seed = ChaCha8Rng::from_os_rng().random();
        info!(seed, "No seed given, chose one");
        seed
    });
    let settings = Settings {
        num_draws,
        num_chains,
        seed,
        ..Default::default()
    };
    sample(model, &settings)
}
