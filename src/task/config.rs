//! Task configuration: stimulus sets, block structure and transition policy.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::symbols::SymbolCode;
use crate::errors::{Error, Result};

/// Configuration consumed by the transition model and the trial generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Colors of the two final states
    pub final_state_colors: [String; 2],
    /// Codes of the two first-stage symbols
    pub initial_state_symbols: [SymbolCode; 2],
    /// Code pairs of the final-stage symbols, one pair per final state
    pub final_state_symbols: [[SymbolCode; 2]; 2],
    /// Trials in each block
    pub trials_per_block: usize,
    /// Number of blocks
    pub blocks: usize,
    /// Probability of a common transition once the forced prefix is exhausted
    pub common_prob: f64,
    /// Transition type imposed on the first trials (tutorial demonstrations)
    pub forced_common: Vec<bool>,
    /// Inter-trial interval file; zero ITIs when absent
    pub iti_file: Option<std::path::PathBuf>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self::game()
    }
}

impl TaskConfig {
    /// Main game played in the scanner.
    pub fn game() -> Self {
        Self {
            final_state_colors: ["pink".to_string(), "blue".to_string()],
            initial_state_symbols: [1, 2],
            final_state_symbols: [[3, 4], [5, 6]],
            trials_per_block: 50,
            blocks: 3,
            common_prob: 0.7,
            forced_common: Vec::new(),
            iti_file: None,
        }
    }

    /// Practice session. The first three trials demonstrate common, common,
    /// rare transitions.
    pub fn tutorial() -> Self {
        Self {
            final_state_colors: ["red".to_string(), "black".to_string()],
            initial_state_symbols: [7, 8],
            final_state_symbols: [[9, 10], [11, 12]],
            trials_per_block: 50,
            blocks: 1,
            common_prob: 0.7,
            forced_common: vec![true, true, false],
            iti_file: None,
        }
    }

    pub fn num_trials(&self) -> usize {
        self.blocks * self.trials_per_block
    }

    /// Whether trial `trial` (0-based) uses the common transition.
    pub fn get_common<R: Rng + ?Sized>(&self, trial: usize, rng: &mut R) -> bool {
        match self.forced_common.get(trial) {
            Some(&common) => common,
            None => rng.gen::<f64>() < self.common_prob,
        }
    }

    /// All final-stage symbol codes, in configuration order.
    pub fn final_symbol_codes(&self) -> impl Iterator<Item = SymbolCode> + '_ {
        self.final_state_symbols.iter().flatten().copied()
    }

    /// ITIs for one block: the first `trials_per_block` of `itis`, shuffled.
    /// Without an ITI file every interval is zero.
    pub fn block_itis<R: Rng + ?Sized>(&self, itis: &[f64], rng: &mut R) -> Result<Vec<f64>> {
        if self.iti_file.is_none() {
            return Ok(vec![0.0; self.trials_per_block]);
        }
        if itis.len() < self.trials_per_block {
            return Err(Error::config(format!(
                "{} ITIs available, {} needed per block",
                itis.len(),
                self.trials_per_block
            )));
        }
        let mut block = itis[..self.trials_per_block].to_vec();
        block.shuffle(rng);
        Ok(block)
    }

    pub fn validate(&self) -> Result<()> {
        if self.trials_per_block == 0 || self.blocks == 0 {
            return Err(Error::config("trials_per_block and blocks must be positive"));
        }
        if !(0.0..=1.0).contains(&self.common_prob) {
            return Err(Error::config(format!(
                "common_prob {} outside [0, 1]",
                self.common_prob
            )));
        }
        if self.final_state_colors[0] == self.final_state_colors[1] {
            return Err(Error::config("final state colors must differ"));
        }
        let mut codes: Vec<SymbolCode> = self.initial_state_symbols.to_vec();
        codes.extend(self.final_symbol_codes());
        let total = codes.len();
        codes.sort_unstable();
        codes.dedup();
        if codes.len() != total {
            return Err(Error::config("symbol codes must be unique"));
        }
        // Option numbers are derived from code parity
        let pairs = std::iter::once(self.initial_state_symbols).chain(self.final_state_symbols);
        for [a, b] in pairs {
            if a % 2 == b % 2 {
                return Err(Error::config(format!(
                    "symbols {a} and {b} share a state but have the same parity"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_presets_are_valid() {
        TaskConfig::game().validate().unwrap();
        TaskConfig::tutorial().validate().unwrap();
        assert_eq!(TaskConfig::game().num_trials(), 150);
        assert_eq!(TaskConfig::tutorial().num_trials(), 50);
    }

    #[test]
    fn test_tutorial_forced_prefix() {
        let config = TaskConfig::tutorial();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(config.get_common(0, &mut rng));
        assert!(config.get_common(1, &mut rng));
        assert!(!config.get_common(2, &mut rng));
    }

    #[test]
    fn test_common_rate_matches_probability() {
        let config = TaskConfig::game();
        let mut rng = StdRng::seed_from_u64(42);
        let n = 10_000;
        let common = (0..n).filter(|&t| config.get_common(t, &mut rng)).count();
        let rate = common as f64 / n as f64;
        assert!((rate - 0.7).abs() < 0.02, "rate {rate}");
    }

    #[test]
    fn test_duplicate_codes_rejected() {
        let mut config = TaskConfig::game();
        config.final_state_symbols = [[3, 4], [4, 6]];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_same_parity_pair_rejected() {
        let mut config = TaskConfig::game();
        config.final_state_symbols = [[3, 5], [4, 6]];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_block_itis() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut config = TaskConfig::game();
        config.trials_per_block = 3;
        assert_eq!(config.block_itis(&[], &mut rng).unwrap(), vec![0.0; 3]);

        config.iti_file = Some("iti.txt".into());
        assert!(config.block_itis(&[1.0, 2.0], &mut rng).is_err());
        let mut block = config.block_itis(&[1.0, 2.0, 3.0, 4.0], &mut rng).unwrap();
        block.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(block, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_toml_roundtrip_keeps_forced_prefix() {
        let config = TaskConfig::tutorial();
        let text = toml::to_string(&config).unwrap();
        let back: TaskConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
