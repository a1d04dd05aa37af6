//! Application configuration (TOML).
//!
//! Every section and field has a default, so a partial file or no file at
//! all is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{Error, Result};
use crate::fitting::FittingConfig;
use crate::logging::LoggingConfig;
use crate::model::HybridParams;
use crate::task::{ResponseModel, TaskConfig};

/// Synthetic cohort settings for `simulate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Participants per condition
    pub participants: usize,
    pub conditions: Vec<String>,
    pub seed: u64,
    /// Group parameters; each participant's `w` is drawn from `w_range`
    pub params: HybridParams,
    pub w_range: (f64, f64),
    pub responses: ResponseModel,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            participants: 20,
            conditions: vec!["control".to_string(), "treatment".to_string()],
            seed: 1,
            params: HybridParams::DAW_2011,
            w_range: (0.0, 1.0),
            responses: ResponseModel::default(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.conditions.is_empty() {
            return Err(Error::config("simulation.conditions is empty"));
        }
        let (lo, hi) = self.w_range;
        if !(0.0 <= lo && lo <= hi && hi <= 1.0) {
            return Err(Error::config(format!(
                "simulation.w_range ({lo}, {hi}) must lie within [0, 1]"
            )));
        }
        self.params.validate()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub task: TaskConfig,
    pub simulation: SimulationConfig,
    pub fitting: FittingConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        self.task.validate()?;
        self.simulation.validate()?;
        self.fitting.validate()
    }
}

/// Reads `path`, or returns defaults when the file does not exist.
/// A file that exists but does not parse is an error.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        info!(path = %path.display(), "no config file, using defaults");
        return Ok(AppConfig::default());
    }
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Writes the default configuration with a short header.
pub fn generate_sample_config(path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&AppConfig::default())?;
    let with_comments = format!(
        "# Two-stage task configuration\n\
         # See: two_stage --help\n\
         #\n\
         # [task] uses the game preset; set iti_file to shuffle inter-trial\n\
         # intervals into each block. Fitting bounds are [min, max] pairs.\n\n\
         {content}"
    );
    std::fs::write(path, with_comments)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("two_stage_no_such_config.toml");
        let _ = std::fs::remove_file(&path);
        let config = load_config(&path).unwrap();
        assert_eq!(config.task.trials_per_block, 50);
        assert_eq!(config.fitting.restarts, FittingConfig::default().restarts);
    }

    #[test]
    fn test_sample_config_parses_back() {
        let path = std::env::temp_dir().join("two_stage_sample_config.toml");
        generate_sample_config(&path).unwrap();
        let config = load_config(&path).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.simulation.params, HybridParams::DAW_2011);
        assert_eq!(config.task.final_state_colors, TaskConfig::game().final_state_colors);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_partial_file() {
        let config: AppConfig = toml::from_str(
            "[fitting]\nrestarts = 3\n\n[simulation]\nparticipants = 4\n\n[logging]\nformat = \"json\"\n",
        )
        .unwrap();
        assert_eq!(config.fitting.restarts, 3);
        assert_eq!(config.fitting.max_attempts, FittingConfig::default().max_attempts);
        assert_eq!(config.simulation.participants, 4);
        assert_eq!(config.logging.format, crate::logging::LogFormat::Json);
    }

    #[test]
    fn test_unparseable_file_is_an_error() {
        let path = std::env::temp_dir().join("two_stage_broken_config.toml");
        std::fs::write(&path, "[fitting\nrestarts = ").unwrap();
        assert!(matches!(load_config(&path), Err(Error::Toml(_))));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_bad_w_range_rejected() {
        let config = SimulationConfig {
            w_range: (0.8, 0.2),
            ..SimulationConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
