use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use itertools::Itertools;
use tracing::debug;

use crate::{
    error::{RegressionError, Result, Stage},
    summary::quantile_sorted,
};

/// Column names of the body dimensions table the height/weight data is
/// usually read from.
pub const DEFAULT_HEIGHT_COLUMN: &str = "hgt";
pub const DEFAULT_WEIGHT_COLUMN: &str = "wgt";

/// Height and weight of one individual.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub height: f64,
    pub weight: f64,
}

/// An immutable collection of observations.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    observations: Vec<Observation>,
}

impl Dataset {
    pub fn new(observations: Vec<Observation>) -> Result<Self> {
        if observations.is_empty() {
            return Err(RegressionError::invalid_input(
                Stage::DataLoading,
                "dataset contains no observations",
            ));
        }
        if let Some((idx, obs)) = observations
            .iter()
            .find_position(|obs| !(obs.height.is_finite() && obs.weight.is_finite()))
        {
            return Err(RegressionError::invalid_input(
                Stage::DataLoading,
                format!("observation {} is not finite: {:?}", idx + 1, obs),
            ));
        }
        Ok(Dataset { observations })
    }

    pub fn from_pairs(heights: &[f64], weights: &[f64]) -> Result<Self> {
        if heights.len() != weights.len() {
            return Err(RegressionError::invalid_input(
                Stage::DataLoading,
                format!(
                    "got {} heights but {} weights",
                    heights.len(),
                    weights.len()
                ),
            ));
        }
        let observations = heights
            .iter()
            .zip(weights)
            .map(|(&height, &weight)| Observation { height, weight })
            .collect();
        Dataset::new(observations)
    }

    /// Read a comma separated table with a header row.
    ///
    /// Only the two named columns are parsed, all others are ignored. Quoted
    /// fields may contain commas, blank lines are skipped.
    pub fn from_csv_reader<R: Read>(
        reader: R,
        height_column: &str,
        weight_column: &str,
    ) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers().map_err(csv_error)?.clone();
        let find = |name: &str| {
            headers.iter().position(|col| col == name).ok_or_else(|| {
                RegressionError::invalid_input(
                    Stage::DataLoading,
                    format!(
                        "column {:?} not found in header {:?}",
                        name,
                        headers.iter().collect_vec()
                    ),
                )
            })
        };
        let height_idx = find(height_column)?;
        let weight_idx = find(weight_column)?;

        let mut observations = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            let line = record.position().map_or(0, |pos| pos.line());
            let cell = |idx: usize, name: &str| -> Result<f64> {
                let raw = record.get(idx).unwrap_or("");
                raw.parse::<f64>().map_err(|_| {
                    RegressionError::invalid_input(
                        Stage::DataLoading,
                        format!(
                            "line {}: column {:?} holds {:?}, not a number",
                            line, name, raw
                        ),
                    )
                })
            };
            observations.push(Observation {
                height: cell(height_idx, height_column)?,
                weight: cell(weight_idx, weight_column)?,
            });
        }

        debug!(rows = observations.len(), "Read dataset");
        Dataset::new(observations)
    }

    pub fn from_csv_path<P: AsRef<Path>>(
        path: P,
        height_column: &str,
        weight_column: &str,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| RegressionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Dataset::from_csv_reader(BufReader::new(file), height_column, weight_column)
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn heights(&self) -> Vec<f64> {
        self.observations.iter().map(|obs| obs.height).collect()
    }

    pub fn weights(&self) -> Vec<f64> {
        self.observations.iter().map(|obs| obs.weight).collect()
    }

    pub fn describe(&self) -> DataSummary {
        let heights = self.heights();
        let weights = self.weights();
        DataSummary {
            n: self.len(),
            height: ColumnSummary::new(&heights),
            weight: ColumnSummary::new(&weights),
            correlation: correlation(&heights, &weights),
        }
    }

    /// Ordinary least squares estimate of `(intercept, slope)`.
    pub fn ols(&self) -> Result<(f64, f64)> {
        let n = self.len() as f64;
        let mean_x = self.observations.iter().map(|o| o.height).sum::<f64>() / n;
        let mean_y = self.observations.iter().map(|o| o.weight).sum::<f64>() / n;
        let (sxy, sxx) = self
            .observations
            .iter()
            .fold((0f64, 0f64), |(sxy, sxx), obs| {
                let dx = obs.height - mean_x;
                (sxy + dx * (obs.weight - mean_y), sxx + dx * dx)
            });
        if sxx == 0. {
            return Err(RegressionError::invalid_input(
                Stage::Summarization,
                format!("all heights are equal to {}, the slope is not identified", mean_x),
            ));
        }
        let slope = sxy / sxx;
        Ok((mean_y - slope * mean_x, slope))
    }
}

fn csv_error(err: csv::Error) -> RegressionError {
    let message = match err.position() {
        Some(pos) => format!("line {}: {}", pos.line(), err),
        None => err.to_string(),
    };
    RegressionError::invalid_input(Stage::DataLoading, message)
}

/// Descriptive statistics of one column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnSummary {
    pub mean: f64,
    /// Sample standard deviation, zero for a single value.
    pub sd: f64,
    pub min: f64,
    pub first_quartile: f64,
    pub median: f64,
    pub third_quartile: f64,
    pub max: f64,
}

impl ColumnSummary {
    fn new(values: &[f64]) -> Self {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let sd = if values.len() > 1 {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.)).sqrt()
        } else {
            0.
        };
        let sorted = values.iter().copied().sorted_by(f64::total_cmp).collect_vec();
        ColumnSummary {
            mean,
            sd,
            min: sorted[0],
            first_quartile: quantile_sorted(&sorted, 0.25),
            median: quantile_sorted(&sorted, 0.5),
            third_quartile: quantile_sorted(&sorted, 0.75),
            max: sorted[sorted.len() - 1],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataSummary {
    pub n: usize,
    pub height: ColumnSummary,
    pub weight: ColumnSummary,
    /// Pearson correlation, NaN if either column is constant.
    pub correlation: f64,
}

fn correlation(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;
    let (sxy, sxx, syy) = x.iter().zip(y).fold((0., 0., 0.), |(sxy, sxx, syy), (x, y)| {
        let dx = x - mean_x;
        let dy = y - mean_y;
        (sxy + dx * dy, sxx + dx * dx, syy + dy * dy)
    });
    sxy / (sxx * syy).sqrt()
}
