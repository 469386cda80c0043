//! Run configuration read from TOML files.
//!
//! ```toml
//! level = 0.9
//! predict_at = 180.0
//!
//! [data]
//! path = "bdims.csv"
//!
//! [priors.slope]
//! dist = "normal"
//! mean = 1.0
//! sd = 0.5
//!
//! [settings]
//! num_chains = 4
//! seed = 42
//! ```
//!
//! Every table and key is optional.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    data::{Dataset, DEFAULT_HEIGHT_COLUMN, DEFAULT_WEIGHT_COLUMN},
    prior::Priors,
    sampler::Settings,
    summary::check_level,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSource {
    pub path: Option<PathBuf>,
    pub height_column: String,
    pub weight_column: String,
}

impl Default for DataSource {
    fn default() -> Self {
        DataSource {
            path: None,
            height_column: DEFAULT_HEIGHT_COLUMN.to_string(),
            weight_column: DEFAULT_WEIGHT_COLUMN.to_string(),
        }
    }
}

impl DataSource {
    pub fn load(&self) -> Result<Dataset> {
        let path = self
            .path
            .as_ref()
            .context("No data path configured")?;
        let data = Dataset::from_csv_path(path, &self.height_column, &self.weight_column)
            .with_context(|| format!("Failed to load dataset from {:?}", path))?;
        Ok(data)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentConfig {
    pub data: DataSource,
    pub priors: Priors,
    pub settings: Settings,
    /// Level of reported credible and predictive intervals.
    pub level: f64,
    /// Height at which to draw predicted weights.
    pub predict_at: Option<f64>,
    /// Directory for per-chain CSV traces.
    pub output_dir: Option<PathBuf>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        ExperimentConfig {
            data: DataSource::default(),
            priors: Priors::default(),
            settings: Settings::default(),
            level: 0.95,
            predict_at: None,
            output_dir: None,
        }
    }
}

impl ExperimentConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ExperimentConfig = toml::from_str(text).context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration file. A relative data path is resolved against
    /// the directory of the file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {:?}", path))?;
        let mut config = ExperimentConfig::from_toml_str(&text)
            .with_context(|| format!("Failed to parse configuration file {:?}", path))?;
        if let (Some(data_path), Some(dir)) = (config.data.path.as_mut(), path.parent()) {
            if data_path.is_relative() {
                *data_path = dir.join(&*data_path);
            }
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.priors.validate()?;
        self.settings.validate()?;
        check_level(self.level)?;
        if let Some(x0) = self.predict_at {
            anyhow::ensure!(x0.is_finite(), "predict_at must be finite, got {}", x0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prior::Prior;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn empty_config_is_default() -> Result<()> {
        assert_eq!(ExperimentConfig::from_toml_str("")?, ExperimentConfig::default());
        Ok(())
    }

    #[test]
    fn partial_tables() -> Result<()> {
        let config = ExperimentConfig::from_toml_str(
            r#"
            level = 0.9
            predict_at = 180.0

            [data]
            weight_column = "weight"

            [priors.intercept]
            dist = "uniform"
            low = -500.0
            high = 500.0

            [settings]
            num_chains = 4
            seed = 42
            "#,
        )?;
        assert_eq!(config.level, 0.9);
        assert_eq!(config.predict_at, Some(180.));
        assert_eq!(config.data.height_column, "hgt");
        assert_eq!(config.data.weight_column, "weight");
        assert_eq!(
            config.priors.intercept,
            Prior::Uniform {
                low: -500.,
                high: 500.
            }
        );
        assert_eq!(config.priors.slope, Priors::default().slope);
        assert_eq!(config.settings.num_chains, 4);
        assert_eq!(config.settings.num_draws, 1000);
        Ok(())
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(ExperimentConfig::from_toml_str("level = 1.5").is_err());
        assert!(ExperimentConfig::from_toml_str("[settings]\nnum_draws = 0").is_err());
        assert!(ExperimentConfig::from_toml_str("unknown = 1").is_err());
        assert!(ExperimentConfig::from_toml_str(
            "[settings]\nnum_draws = 9223372036854775807\nthin = 3"
        )
        .is_err());
        assert!(ExperimentConfig::from_toml_str(
            "[priors.noise]\ndist = \"normal\"\nmean = 0.0\nsd = 1.0"
        )
        .is_err());
    }

    #[test]
    fn loads_data_relative_to_config() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut csv = std::fs::File::create(dir.path().join("bdims.csv"))?;
        writeln!(csv, "wgt,hgt\n70,170\n90,190")?;

        let config_path = dir.path().join("run.toml");
        std::fs::write(&config_path, "[data]\npath = \"bdims.csv\"\n")?;

        let config = ExperimentConfig::from_path(&config_path)?;
        let data = config.data.load()?;
        assert_eq!(data.heights(), vec![170., 190.]);
        assert_eq!(data.weights(), vec![70., 90.]);

        assert!(DataSource::default().load().is_err());
        assert!(ExperimentConfig::from_path(dir.path().join("missing.toml")).is_err());
        Ok(())
    }
}
