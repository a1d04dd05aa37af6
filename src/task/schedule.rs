//! Block timing plan and payment.

use std::path::Path;

use crate::consts::{BLOCK_FINAL_INTERVAL_SECS, REWARD_PER_TRIAL, TRIAL_DURATION_SECS};
use crate::errors::{Error, Result};

/// Reads inter-trial intervals, one number per line. Blank lines and lines
/// starting with `#` are skipped.
pub fn read_itis(path: &Path) -> Result<Vec<f64>> {
    parse_itis(&std::fs::read_to_string(path)?)
}

pub fn parse_itis(text: &str) -> Result<Vec<f64>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && !line.starts_with('#'))
        .map(|(idx, line)| {
            line.trim()
                .parse::<f64>()
                .map_err(|_| Error::invalid_value(idx + 1, "iti", line.trim()))
        })
        .collect()
}

/// Planned timing of one block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSchedule {
    /// Trial duration plus the trial's ITI
    pub trial_durations: Vec<f64>,
    /// Offset of each trial from the block start
    pub start_times: Vec<f64>,
    /// Total block length including the final rest
    pub block_duration: f64,
}

impl BlockSchedule {
    pub fn new(itis: &[f64]) -> Self {
        let trial_durations: Vec<f64> = itis.iter().map(|iti| TRIAL_DURATION_SECS + iti).collect();
        let start_times = trial_durations
            .iter()
            .scan(0.0, |elapsed, duration| {
                let start = *elapsed;
                *elapsed += duration;
                Some(start)
            })
            .collect();
        let block_duration = TRIAL_DURATION_SECS * itis.len() as f64
            + itis.iter().sum::<f64>()
            + BLOCK_FINAL_INTERVAL_SECS;
        Self {
            trial_durations,
            start_times,
            block_duration,
        }
    }
}

/// Payment for `rewards` rewarded trials, rounded to 0.1 CHF.
pub fn money_reward(rewards: u32) -> f64 {
    (REWARD_PER_TRIAL * rewards as f64 * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_itis_skips_comments() {
        let itis = parse_itis("# jittered ITIs\n1.5\n\n2.0\n  3.25 \n").unwrap();
        assert_eq!(itis, vec![1.5, 2.0, 3.25]);
        assert!(parse_itis("1.0\nabc\n").is_err());
    }

    #[test]
    fn test_block_schedule() {
        let schedule = BlockSchedule::new(&[1.0, 2.0, 0.5]);
        assert_eq!(schedule.trial_durations, vec![13.5, 14.5, 13.0]);
        assert_eq!(schedule.start_times, vec![0.0, 13.5, 28.0]);
        assert!((schedule.block_duration - (37.5 + 3.5 + 10.0)).abs() < 1e-12);
    }

    #[test]
    fn test_money_reward_rounding() {
        assert!((money_reward(0) - 0.0).abs() < 1e-12);
        assert!((money_reward(1) - 0.6).abs() < 1e-12);
        assert!((money_reward(87) - 52.2).abs() < 1e-9);
    }
}
