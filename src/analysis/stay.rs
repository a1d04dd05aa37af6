//! One-trial-back stay analysis.
//!
//! For each pair of consecutive completed trials the outcome is whether the
//! first-stage choice was repeated, and the predictors code the earlier
//! trial's reward and transition as ±1:
//!
//! ```text
//! x = [1, r, c, r·c]     r = +1 rewarded / −1 not,  c = +1 common / −1 rare
//! y = 1 if choice1 repeats
//! ```
//!
//! Model-free learners stay after rewards regardless of transition (main
//! effect of `r`); model-based learners show the `r·c` interaction.

use serde::{Deserialize, Serialize};

use crate::dataset::{conditions, ParticipantData};

/// Regressors per row.
pub const NUM_PREDICTORS: usize = 4;

fn plus_minus(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        -1.0
    }
}

/// Design rows and outcomes of one participant.
#[derive(Debug, Clone, PartialEq)]
pub struct StayRows {
    pub x: Vec<[f64; NUM_PREDICTORS]>,
    pub y: Vec<u8>,
}

pub fn stay_rows(data: &ParticipantData) -> StayRows {
    let mut rows = StayRows {
        x: Vec::with_capacity(data.len().saturating_sub(1)),
        y: Vec::with_capacity(data.len().saturating_sub(1)),
    };
    for (i, pair) in data.trials.windows(2).enumerate() {
        let r = plus_minus(pair[0].reward);
        let c = plus_minus(data.common[i]);
        rows.x.push([1.0, r, c, r * c]);
        rows.y.push(u8::from(pair[0].choice1 == pair[1].choice1));
    }
    rows
}

/// Padded layout consumed by an external logistic-regression sampler.
///
/// Participants with fewer rows are filled with zero rows and `y = 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionData {
    /// Participants
    #[serde(rename = "M")]
    pub m: usize,
    /// Rows per participant after padding
    #[serde(rename = "N")]
    pub n: usize,
    /// Regressors per row
    #[serde(rename = "K")]
    pub k: usize,
    pub y: Vec<Vec<u8>>,
    pub x: Vec<Vec<[f64; NUM_PREDICTORS]>>,
    /// 1 for the last condition in sorted order, 0 otherwise
    pub condition: Vec<u8>,
}

impl RegressionData {
    pub fn from_participants(participants: &[ParticipantData]) -> Self {
        let last = conditions(participants).pop();
        let mut rows: Vec<StayRows> = participants.iter().map(stay_rows).collect();
        let n = rows.iter().map(|r| r.y.len()).max().unwrap_or(0);
        for r in &mut rows {
            r.x.resize(n, [0.0; NUM_PREDICTORS]);
            r.y.resize(n, 0);
        }
        let condition = participants
            .iter()
            .map(|p| u8::from(Some(&p.condition) == last.as_ref()))
            .collect();
        let (x, y) = rows.into_iter().map(|r| (r.x, r.y)).unzip();
        Self {
            m: participants.len(),
            n,
            k: NUM_PREDICTORS,
            y,
            x,
            condition,
        }
    }
}

/// Stay probability by previous outcome and transition.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StayTable {
    /// `[rewarded, unrewarded][common, rare]` stays
    pub stays: [[u32; 2]; 2],
    /// `[rewarded, unrewarded][common, rare]` trial pairs
    pub totals: [[u32; 2]; 2],
}

impl StayTable {
    pub fn add(&mut self, data: &ParticipantData) {
        for (i, pair) in data.trials.windows(2).enumerate() {
            let row = usize::from(!pair[0].reward);
            let col = usize::from(!data.common[i]);
            self.totals[row][col] += 1;
            self.stays[row][col] += u32::from(pair[0].choice1 == pair[1].choice1);
        }
    }

    pub fn from_participants<'a>(participants: impl IntoIterator<Item = &'a ParticipantData>) -> Self {
        let mut table = Self::default();
        for data in participants {
            table.add(data);
        }
        table
    }

    /// `None` for a cell without trial pairs.
    pub fn probability(&self, rewarded: bool, common: bool) -> Option<f64> {
        let row = usize::from(!rewarded);
        let col = usize::from(!common);
        let total = self.totals[row][col];
        (total > 0).then(|| f64::from(self.stays[row][col]) / f64::from(total))
    }

    /// Reward × transition contrast: positive for model-based control.
    pub fn interaction(&self) -> Option<f64> {
        Some(
            (self.probability(true, true)? - self.probability(true, false)?)
                - (self.probability(false, true)? - self.probability(false, false)?),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObservedTrial;

    fn participant(condition: &str, trials: &[(u8, u8, bool)]) -> ParticipantData {
        ParticipantData {
            participant: format!("p{}", trials.len()),
            condition: condition.to_string(),
            trial_numbers: (0..trials.len()).collect(),
            common: trials.iter().map(|t| t.2).collect(),
            trials: trials
                .iter()
                .map(|&(c1, r, _)| ObservedTrial::from_codes(c1, 1, 1, r).unwrap())
                .collect(),
        }
    }

    #[test]
    fn test_rows_code_previous_trial() {
        let data = participant("A", &[(1, 1, true), (1, 0, false), (2, 1, true)]);
        let rows = stay_rows(&data);
        assert_eq!(rows.x, vec![[1.0, 1.0, 1.0, 1.0], [1.0, -1.0, -1.0, 1.0]]);
        assert_eq!(rows.y, vec![1, 0]);
    }

    #[test]
    fn test_padding_and_condition_flag() {
        let long = participant("A", &[(1, 1, true), (1, 1, true), (1, 0, true), (2, 0, false)]);
        let short = participant("B", &[(2, 1, false), (2, 1, true)]);
        let data = RegressionData::from_participants(&[long, short]);
        assert_eq!((data.m, data.n, data.k), (2, 3, 4));
        assert_eq!(data.y[1], vec![1, 0, 0]);
        assert_eq!(data.x[1][2], [0.0; 4]);
        assert_eq!(data.condition, vec![0, 1]);

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["M"], 2);
        assert_eq!(json["x"][0][0], serde_json::json!([1.0, 1.0, 1.0, 1.0]));
    }

    #[test]
    fn test_stay_probabilities() {
        let data = participant(
            "A",
            &[(1, 1, true), (1, 1, true), (1, 0, false), (2, 1, false), (1, 0, true)],
        );
        let table = StayTable::from_participants([&data]);
        assert_eq!(table.probability(true, true), Some(1.0));
        assert_eq!(table.probability(false, false), Some(0.0));
        assert_eq!(table.probability(true, false), Some(0.0));
        assert_eq!(table.probability(false, true), None);
        assert_eq!(table.interaction(), None);
        assert_eq!(table.totals.iter().flatten().sum::<u32>(), 4);
    }

    #[test]
    fn test_single_trial_has_no_rows() {
        let data = participant("A", &[(1, 1, true)]);
        assert!(stay_rows(&data).y.is_empty());
    }
}
