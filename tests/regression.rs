use std::io::Cursor;

use anyhow::Result;
use bayes_linreg::{
    credible_interval, gelman_rubin, point_estimate, predict, report::PosteriorReport, sample,
    sample_posterior, summarize, Dataset, LinearModel, Param, Priors, RegressionError, Settings,
    Stage,
};
use pretty_assertions::assert_eq;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn two_points() -> LinearModel {
    LinearModel::new(vec![170., 190.], vec![70., 90.], Priors::default()).unwrap()
}

fn body_dimensions() -> Result<Dataset> {
    let table = "\
\"wgt\",\"hgt\",\"sex\"
65.6,174.0,1
71.8,175.3,1
80.7,193.5,1
72.6,186.5,1
78.8,187.2,1
74.8,181.5,1
86.4,184.0,1
78.4,184.5,1
62.0,175.0,1
81.6,184.0,1
51.6,161.2,0
59.0,167.5,0
49.2,159.5,0
63.0,157.0,0
53.6,155.8,0
59.0,170.0,0
47.6,159.1,0
69.8,166.0,0
66.8,176.2,0
75.2,160.2,0
";
    Ok(Dataset::from_csv_reader(Cursor::new(table), "hgt", "wgt")?)
}

#[test]
fn two_point_fit() -> Result<()> {
    let model = two_points();
    let trace = sample_posterior(&model, 1000, 1, Some(42))?;
    assert_eq!(trace.num_chains(), 1);
    let chain = &trace.chains[0];
    assert_eq!(chain.len(), 1000);
    assert!(chain.iter().all(|draw| draw.s > 0. && draw.s < 20.));

    let slope = point_estimate(chain, Param::Slope)?;
    assert!((slope - 1.).abs() < 0.25, "posterior mean of b is {}", slope);

    let (low, high) = credible_interval(chain, Param::Slope, 0.95)?;
    assert!(low < slope && slope < high);
    Ok(())
}

#[test]
fn mismatched_data_fails_before_sampling() {
    let err = LinearModel::new(vec![170., 190., 180.], vec![70., 90.], Priors::default())
        .unwrap_err();
    assert_eq!(err.stage(), Stage::ModelConstruction);
    assert!(matches!(err, RegressionError::InvalidInput { .. }));
}

#[test]
fn fit_recovers_least_squares_line() -> Result<()> {
    let data = body_dimensions()?;
    assert_eq!(data.len(), 20);
    let (ols_a, ols_b) = data.ols()?;

    let model = LinearModel::from_dataset(&data, Priors::default())?;
    let settings = Settings {
        num_chains: 4,
        num_draws: 2000,
        seed: 7,
        ..Default::default()
    };
    let trace = sample(&model, &settings)?;
    let pooled = trace.pooled();
    assert_eq!(pooled.len(), 8000);

    let b = point_estimate(&pooled, Param::Slope)?;
    let a = point_estimate(&pooled, Param::Intercept)?;
    // The slope prior pulls towards 1 only slightly with 20 observations.
    assert!((b - ols_b).abs() < 0.15, "b = {}, least squares {}", b, ols_b);
    let mean_height = data.describe().height.mean;
    assert!(((a + b * mean_height) - (ols_a + ols_b * mean_height)).abs() < 2.);

    for param in Param::ALL {
        let rhat = gelman_rubin(&trace, param)?;
        assert!(rhat < 1.05, "R-hat of {} is {}", param, rhat);
    }
    Ok(())
}

#[test]
fn predictions_follow_the_chain() -> Result<()> {
    let data = body_dimensions()?;
    let model = LinearModel::from_dataset(&data, Priors::default())?;
    let trace = sample_posterior(&model, 500, 2, Some(3))?;

    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let predictions = predict(&trace.chains[1], 180., &mut rng)?;
    assert_eq!(predictions.len(), 500);
    let mean = predictions.iter().sum::<f64>() / 500.;
    assert!(mean > 60. && mean < 95., "mean prediction {}", mean);
    Ok(())
}

#[test]
fn summaries_are_reproducible() -> Result<()> {
    let data = body_dimensions()?;
    let model = LinearModel::from_dataset(&data, Priors::default())?;
    let settings = Settings {
        num_chains: 3,
        num_tune: 200,
        num_draws: 300,
        seed: 11,
        ..Default::default()
    };
    let first = sample(&model, &settings)?;
    let second = sample(&model, &settings)?;
    assert_eq!(first.to_table(), second.to_table());
    assert_eq!(summarize(&first.chains[2])?, summarize(&second.chains[2])?);
    assert_eq!(
        PosteriorReport::new(&first, 0.9)?.to_string(),
        PosteriorReport::new(&second, 0.9)?.to_string()
    );
    Ok(())
}
