//! Fit weight against height and print the posterior.
//!
//! ```text
//! cargo run --example height_weight -- [config.toml]
//! ```
//!
//! Without a configuration, or without a data path in it, a small built-in
//! sample of heights (cm) and weights (kg) is used. Set `BAYES_LINREG_LOG`
//! to change the log level, for example `BAYES_LINREG_LOG=bayes_linreg=debug`.

use anyhow::{Context, Result};
use bayes_linreg::{
    config::ExperimentConfig, predict, predictive_interval, report, sample, sample_priors,
    Dataset, LinearModel, Settings,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const HEIGHTS: [f64; 20] = [
    174.0, 175.3, 193.5, 186.5, 187.2, 181.5, 184.0, 184.5, 175.0, 184.0, 180.0, 177.8, 192.0,
    176.0, 174.0, 184.0, 192.7, 171.5, 173.0, 176.0,
];
const WEIGHTS: [f64; 20] = [
    65.6, 71.8, 80.7, 72.6, 78.8, 74.8, 86.4, 78.4, 62.0, 81.6, 76.6, 83.6, 90.0, 74.6, 71.0,
    79.6, 93.8, 70.0, 72.4, 85.9,
];

fn init_tracing() {
    let filter = EnvFilter::try_from_env("BAYES_LINREG_LOG")
        .unwrap_or_else(|_| EnvFilter::new("bayes_linreg=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => ExperimentConfig::from_path(path)?,
        None => ExperimentConfig {
            predict_at: Some(180.),
            settings: Settings {
                num_chains: 4,
                seed: 42,
                ..Default::default()
            },
            ..Default::default()
        },
    };

    let data = match &config.data.path {
        Some(_) => config.data.load()?,
        None => Dataset::from_pairs(&HEIGHTS, &WEIGHTS)?,
    };

    let mut rng = ChaCha8Rng::seed_from_u64(config.settings.seed);
    let prior_draws = sample_priors(&config.priors, 10, &mut rng)?;
    println!("Lines drawn from the priors (a, b, s):");
    for draw in &prior_draws {
        println!("  {:>10.3} {:>8.4} {:>8.4}", draw.a, draw.b, draw.s);
    }

    println!("\n{}\n", data.describe());
    let (ols_a, ols_b) = data.ols()?;
    println!("Least squares line: weight = {:.3} + {:.4} * height\n", ols_a, ols_b);

    let model = LinearModel::from_dataset(&data, config.priors)?;
    println!("{}\n", model);

    let trace = sample(&model, &config.settings).context("Sampling failed")?;
    let posterior = report::PosteriorReport::new(&trace, config.level)?;
    println!("{}", posterior);

    if let Some(x0) = config.predict_at {
        let pooled = trace.pooled();
        let predictions = predict(&pooled, x0, &mut rng)?;
        let mean = predictions.iter().sum::<f64>() / predictions.len() as f64;
        let (low, high) = predictive_interval(&pooled, x0, config.level, &mut rng)?;
        println!(
            "Predicted weight at height {}: mean {:.2}, {:.1}% interval [{:.2}, {:.2}]",
            x0,
            mean,
            config.level * 100.,
            low,
            high
        );
    }

    if let Some(dir) = &config.output_dir {
        let paths = report::write_trace_csv(&trace, dir)?;
        println!("Wrote {} trace files to {:?}", paths.len(), dir);
    }
    Ok(())
}
