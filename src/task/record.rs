//! Result rows recorded for every trial.

use std::io::Write;

use serde::{Deserialize, Serialize};

use super::symbols::{FinalState, FinalSymbol, Side, SymbolCode};
use super::trial::Trial;
use crate::consts::RESPONSE_WINDOW_SECS;
use crate::errors::Result;
use crate::table::{opt_field, TableWriter};

/// Column order of the per-session results file.
pub const CSV_COLUMNS: [&str; 17] = [
    "trial",
    "common",
    "reward.1.1",
    "reward.1.2",
    "reward.2.1",
    "reward.2.2",
    "isymbol_lft",
    "isymbol_rgt",
    "rt1",
    "choice1",
    "final_state",
    "fsymbol_lft",
    "fsymbol_rgt",
    "rt2",
    "choice2",
    "reward",
    "slow",
];

/// Maps a symbol code to option 1 or 2.
///
/// Odd codes are option 1. With `common == false` the mapping flips, which
/// turns an initial symbol into the final state it reaches on a rare trial.
pub fn code_to_bin(code: SymbolCode, common: bool) -> u8 {
    if common {
        2 - code % 2
    } else {
        code % 2 + 1
    }
}

/// Key press as reported by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Response {
    pub side: Side,
    /// Reaction time in seconds
    pub rt: f64,
}

impl Response {
    /// A response counts only when it arrived inside the response window.
    pub fn in_time(response: Option<Response>) -> Option<Response> {
        response.filter(|r| r.rt <= RESPONSE_WINDOW_SECS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial: usize,
    pub common: bool,
    /// `[final state][symbol]` reward probabilities, binarized codes minus one
    pub reward_probabilities: [[f64; 2]; 2],
    pub isymbol_lft: u8,
    pub isymbol_rgt: u8,
    pub rt1: Option<f64>,
    pub choice1: Option<u8>,
    pub final_state: Option<u8>,
    pub fsymbol_lft: Option<u8>,
    pub fsymbol_rgt: Option<u8>,
    pub rt2: Option<f64>,
    pub choice2: Option<u8>,
    pub reward: u8,
    pub slow: bool,
}

impl TrialRecord {
    /// Fills the fields known before any response.
    pub fn start(trial: &Trial) -> Self {
        let mut reward_probabilities = [[0.0; 2]; 2];
        for isymbol in &trial.initial_state.symbols {
            let state = code_to_bin(isymbol.code, trial.common) as usize - 1;
            for fsymbol in &isymbol.final_state.symbols {
                let symbol = code_to_bin(fsymbol.code, true) as usize - 1;
                reward_probabilities[state][symbol] = fsymbol.reward_probability.value();
            }
        }
        Self {
            trial: trial.number,
            common: trial.common,
            reward_probabilities,
            isymbol_lft: code_to_bin(trial.initial_state.symbol(Side::Left).code, true),
            isymbol_rgt: code_to_bin(trial.initial_state.symbol(Side::Right).code, true),
            rt1: None,
            choice1: None,
            final_state: None,
            fsymbol_lft: None,
            fsymbol_rgt: None,
            rt2: None,
            choice2: None,
            reward: 0,
            slow: false,
        }
    }

    /// Records the first-stage answer and returns the final state reached, or
    /// `None` when the answer was missing or too late.
    pub fn record_first_stage<'t>(
        &mut self,
        trial: &'t Trial,
        response: Option<Response>,
    ) -> Option<&'t FinalState> {
        let Some(response) = Response::in_time(response) else {
            self.mark_slow();
            return None;
        };
        let chosen = trial.initial_state.symbol(response.side);
        let final_state = &chosen.final_state;
        self.rt1 = Some(response.rt);
        self.choice1 = Some(code_to_bin(chosen.code, true));
        self.final_state = Some(code_to_bin(chosen.code, trial.common));
        self.fsymbol_lft = Some(code_to_bin(final_state.symbol(Side::Left).code, true));
        self.fsymbol_rgt = Some(code_to_bin(final_state.symbol(Side::Right).code, true));
        Some(final_state)
    }

    /// Records the second-stage answer and returns the chosen symbol, or
    /// `None` when the answer was missing or too late.
    pub fn record_second_stage<'s>(
        &mut self,
        final_state: &'s FinalState,
        response: Option<Response>,
    ) -> Option<&'s FinalSymbol> {
        let Some(response) = Response::in_time(response) else {
            self.mark_slow();
            return None;
        };
        let chosen = final_state.symbol(response.side);
        self.rt2 = Some(response.rt);
        self.choice2 = Some(code_to_bin(chosen.code, true));
        self.reward = chosen.reward;
        self.slow = false;
        Some(chosen)
    }

    /// Clears the fields of every stage not yet answered.
    pub fn mark_slow(&mut self) {
        if self.choice1.is_none() {
            self.rt1 = None;
            self.final_state = None;
            self.fsymbol_lft = None;
            self.fsymbol_rgt = None;
        }
        self.rt2 = None;
        self.choice2 = None;
        self.reward = 0;
        self.slow = true;
    }

    pub fn to_fields(&self) -> Vec<String> {
        let p = &self.reward_probabilities;
        vec![
            self.trial.to_string(),
            u8::from(self.common).to_string(),
            p[0][0].to_string(),
            p[0][1].to_string(),
            p[1][0].to_string(),
            p[1][1].to_string(),
            self.isymbol_lft.to_string(),
            self.isymbol_rgt.to_string(),
            opt_field(self.rt1),
            opt_field(self.choice1),
            opt_field(self.final_state),
            opt_field(self.fsymbol_lft),
            opt_field(self.fsymbol_rgt),
            opt_field(self.rt2),
            opt_field(self.choice2),
            self.reward.to_string(),
            u8::from(self.slow).to_string(),
        ]
    }
}

/// Writes result rows, optionally prefixed with participant and condition
/// columns for files merging several sessions.
pub struct RecordWriter<W: Write> {
    table: TableWriter<W>,
    merged: bool,
}

impl<W: Write> RecordWriter<W> {
    /// Single-session file with exactly [`CSV_COLUMNS`].
    pub fn session(inner: W) -> Result<Self> {
        Ok(Self {
            table: TableWriter::new(inner, &CSV_COLUMNS)?,
            merged: false,
        })
    }

    /// Multi-participant file: `participant, condition` then [`CSV_COLUMNS`].
    pub fn merged(inner: W) -> Result<Self> {
        let mut columns = vec!["participant", "condition"];
        columns.extend_from_slice(&CSV_COLUMNS);
        Ok(Self {
            table: TableWriter::new(inner, &columns)?,
            merged: true,
        })
    }

    pub fn write(&mut self, record: &TrialRecord) -> Result<()> {
        debug_assert!(!self.merged, "merged files need participant columns");
        self.table.write_row(&record.to_fields())
    }

    pub fn write_for(&mut self, participant: &str, condition: &str, record: &TrialRecord) -> Result<()> {
        debug_assert!(self.merged, "session files have no participant columns");
        let mut fields = vec![participant.to_string(), condition.to_string()];
        fields.extend(record.to_fields());
        self.table.write_row(&fields)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.table.flush()
    }

    pub fn into_inner(self) -> Result<W> {
        self.table.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskConfig, TransitionModel, TrialSequence};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn first_trial(seed: u64) -> Trial {
        let mut rng = StdRng::seed_from_u64(seed);
        let config = TaskConfig::game();
        let model = TransitionModel::create_random(&config, &mut rng);
        TrialSequence::new(config, model, rng).next_trial()
    }

    #[test]
    fn test_code_to_bin() {
        assert_eq!(code_to_bin(1, true), 1);
        assert_eq!(code_to_bin(2, true), 2);
        assert_eq!(code_to_bin(5, true), 1);
        assert_eq!(code_to_bin(1, false), 2);
        assert_eq!(code_to_bin(2, false), 1);
    }

    #[test]
    fn test_start_fills_every_probability() {
        let trial = first_trial(1);
        let record = TrialRecord::start(&trial);
        for row in record.reward_probabilities {
            for p in row {
                assert!((0.25..=0.75).contains(&p));
            }
        }
        assert_ne!(record.isymbol_lft, record.isymbol_rgt);
    }

    #[test]
    fn test_complete_trial() {
        let trial = first_trial(2);
        let mut record = TrialRecord::start(&trial);
        let final_state = record
            .record_first_stage(&trial, Some(Response { side: Side::Left, rt: 0.8 }))
            .unwrap();
        let chosen_code = trial.initial_state.symbol(Side::Left).code;
        assert_eq!(record.choice1, Some(code_to_bin(chosen_code, true)));
        assert_eq!(record.final_state, Some(code_to_bin(chosen_code, trial.common)));

        let symbol = record
            .record_second_stage(final_state, Some(Response { side: Side::Right, rt: 1.1 }))
            .unwrap();
        assert_eq!(record.reward, symbol.reward);
        assert!(!record.slow);
        assert_eq!(record.rt2, Some(1.1));
    }

    #[test]
    fn test_slow_first_stage_clears_choice_fields() {
        let trial = first_trial(3);
        let mut record = TrialRecord::start(&trial);
        let reached =
            record.record_first_stage(&trial, Some(Response { side: Side::Left, rt: 2.5 }));
        assert!(reached.is_none());
        assert!(record.slow);
        assert_eq!(record.reward, 0);
        let fields = record.to_fields();
        // rt1 through choice2 are empty
        assert!(fields[8..15].iter().all(|f| f.is_empty()));
        assert_eq!(fields[15], "0");
        assert_eq!(fields[16], "1");
    }

    #[test]
    fn test_slow_second_stage_keeps_first_stage() {
        let trial = first_trial(4);
        let mut record = TrialRecord::start(&trial);
        let final_state = record
            .record_first_stage(&trial, Some(Response { side: Side::Right, rt: 0.5 }))
            .unwrap();
        assert!(record.record_second_stage(final_state, None).is_none());
        assert!(record.slow);
        assert!(record.choice1.is_some());
        assert!(record.final_state.is_some());
        assert!(record.choice2.is_none());
        assert_eq!(record.reward, 0);
    }

    #[test]
    fn test_session_writer_header() {
        let trial = first_trial(5);
        let record = TrialRecord::start(&trial);
        let mut writer = RecordWriter::session(Vec::new()).unwrap();
        writer.write(&record).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "trial,common,reward.1.1,reward.1.2,reward.2.1,reward.2.2,isymbol_lft,isymbol_rgt,\
             rt1,choice1,final_state,fsymbol_lft,fsymbol_rgt,rt2,choice2,reward,slow"
        );
        assert_eq!(lines.next().unwrap().split(',').count(), 17);
    }
}
