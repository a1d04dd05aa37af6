//! Behavioural data shared by fitting and analysis.
//!
//! Input is the merged results table (`participant, condition` followed by
//! the per-trial columns). Rows are grouped by participant in order of first
//! appearance; slow trials never reach the model.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{Error, Result};
use crate::model::ObservedTrial;
use crate::table::{RowRef, Table};
use crate::task::TrialRecord;

/// One row of a merged results table.
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviorRow {
    pub participant: String,
    pub condition: String,
    pub trial: usize,
    pub common: bool,
    pub choice1: Option<u8>,
    pub choice2: Option<u8>,
    pub final_state: Option<u8>,
    pub reward: u8,
    pub slow: bool,
}

impl BehaviorRow {
    /// Tables already stripped of slow trials may omit the `slow` column.
    pub fn from_row(row: &RowRef<'_>, has_slow: bool) -> Result<Self> {
        let flag = |column: &str| -> Result<bool> {
            Ok(row.parse_code(column)?.unwrap_or(0) != 0)
        };
        let parsed = Self {
            participant: row.get("participant")?.to_string(),
            condition: row.get("condition")?.to_string(),
            trial: row.parse("trial")?,
            common: flag("common")?,
            choice1: row.parse_code("choice1")?,
            choice2: row.parse_code("choice2")?,
            final_state: row.parse_code("final_state")?,
            reward: row.parse_code("reward")?.unwrap_or(0),
            slow: has_slow && flag("slow")?,
        };
        if !parsed.slow && !parsed.is_complete() {
            return Err(Error::invalid_trial(format!(
                "line {}: participant {} trial {} is not slow but has an empty choice or state",
                row.line(),
                parsed.participant,
                parsed.trial
            )));
        }
        Ok(parsed)
    }

    fn is_complete(&self) -> bool {
        self.choice1.is_some() && self.choice2.is_some() && self.final_state.is_some()
    }

    /// The choices the model sees, or `None` for a slow trial.
    pub fn observed(&self) -> Result<Option<ObservedTrial>> {
        if self.slow {
            return Ok(None);
        }
        match (self.choice1, self.choice2, self.final_state) {
            (Some(c1), Some(c2), Some(s2)) => {
                ObservedTrial::from_codes(c1, c2, s2, self.reward).map(Some)
            }
            _ => Err(Error::invalid_trial(format!(
                "participant {} trial {} is not slow but has an empty choice or state",
                self.participant, self.trial
            ))),
        }
    }
}

pub fn read_behavior_table(table: &Table) -> Result<Vec<BehaviorRow>> {
    let has_slow = table.has_column("slow");
    table
        .rows()
        .map(|row| BehaviorRow::from_row(&row, has_slow))
        .collect()
}

pub fn read_behavior(path: &Path) -> Result<Vec<BehaviorRow>> {
    let rows = read_behavior_table(&Table::from_path(path)?)?;
    info!(path = %path.display(), rows = rows.len(), "behaviour loaded");
    Ok(rows)
}

/// Completed trials of one participant, in chronological order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantData {
    pub participant: String,
    pub condition: String,
    pub trial_numbers: Vec<usize>,
    /// Transition type of each trial
    pub common: Vec<bool>,
    pub trials: Vec<ObservedTrial>,
}

impl ParticipantData {
    fn empty(participant: &str, condition: &str) -> Self {
        Self {
            participant: participant.to_string(),
            condition: condition.to_string(),
            trial_numbers: Vec::new(),
            common: Vec::new(),
            trials: Vec::new(),
        }
    }

    /// Builds the modelling view of a simulated or recorded session.
    pub fn from_records(participant: &str, condition: &str, records: &[TrialRecord]) -> Result<Self> {
        let mut data = Self::empty(participant, condition);
        for record in records.iter().filter(|r| !r.slow) {
            let (Some(c1), Some(c2), Some(s2)) = (record.choice1, record.choice2, record.final_state)
            else {
                return Err(Error::invalid_trial(format!(
                    "participant {participant} trial {} is not slow but incomplete",
                    record.trial
                )));
            };
            data.push(record.trial, record.common, ObservedTrial::from_codes(c1, c2, s2, record.reward)?)?;
        }
        Ok(data)
    }

    fn push(&mut self, trial: usize, common: bool, observed: ObservedTrial) -> Result<()> {
        if let Some(&last) = self.trial_numbers.last() {
            if trial <= last {
                return Err(Error::alignment(format!(
                    "participant {}: trial {trial} follows trial {last}",
                    self.participant
                )));
            }
        }
        self.trial_numbers.push(trial);
        self.common.push(common);
        self.trials.push(observed);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }
}

/// Groups rows by participant (first-appearance order) and drops slow trials.
///
/// Fails when a participant changes condition or when trial numbers do not
/// strictly increase within a participant.
pub fn group_participants(rows: &[BehaviorRow]) -> Result<Vec<ParticipantData>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<ParticipantData> = Vec::new();
    let mut dropped = 0usize;

    for row in rows {
        let slot = *index.entry(row.participant.as_str()).or_insert_with(|| {
            groups.push(ParticipantData::empty(&row.participant, &row.condition));
            groups.len() - 1
        });
        let group = &mut groups[slot];
        if group.condition != row.condition {
            return Err(Error::alignment(format!(
                "participant {} appears in conditions {} and {}",
                row.participant, group.condition, row.condition
            )));
        }
        match row.observed()? {
            Some(observed) => group.push(row.trial, row.common, observed)?,
            None => dropped += 1,
        }
    }

    debug!(participants = groups.len(), dropped, "behaviour grouped");
    Ok(groups)
}

/// Distinct conditions in sorted order.
pub fn conditions(participants: &[ParticipantData]) -> Vec<String> {
    participants
        .iter()
        .map(|p| p.condition.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Grouped, padded layout consumed by external samplers.
///
/// Every per-trial array has `maxtrials` entries; positions past a
/// participant's `num_trials` hold `1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittingData {
    #[serde(rename = "N")]
    pub n: usize,
    pub maxtrials: usize,
    pub num_trials: Vec<usize>,
    pub action1: Vec<Vec<u8>>,
    pub action2: Vec<Vec<u8>>,
    pub s2: Vec<Vec<u8>>,
    pub reward: Vec<Vec<u8>>,
    /// Index of each participant's condition in the sorted condition list
    pub condition: Vec<usize>,
}

impl FittingData {
    const PAD: u8 = 1;

    /// Pads to the longest session, measured as the highest trial number
    /// plus one so that sessions that lost trials to slowness still align.
    pub fn from_participants(participants: &[ParticipantData]) -> Self {
        let names = conditions(participants);
        let maxtrials = participants
            .iter()
            .map(|p| p.trial_numbers.last().map_or(0, |t| t + 1).max(p.len()))
            .max()
            .unwrap_or(0);

        let mut data = Self {
            n: participants.len(),
            maxtrials,
            num_trials: Vec::with_capacity(participants.len()),
            action1: Vec::with_capacity(participants.len()),
            action2: Vec::with_capacity(participants.len()),
            s2: Vec::with_capacity(participants.len()),
            reward: Vec::with_capacity(participants.len()),
            condition: Vec::with_capacity(participants.len()),
        };

        let padded = |values: Vec<u8>| {
            let mut values = values;
            values.resize(maxtrials, Self::PAD);
            values
        };
        for p in participants {
            data.num_trials.push(p.len());
            data.action1.push(padded(p.trials.iter().map(|t| t.choice1.code()).collect()));
            data.action2.push(padded(p.trials.iter().map(|t| t.choice2.code()).collect()));
            data.s2.push(padded(p.trials.iter().map(|t| t.final_state.code()).collect()));
            data.reward.push(padded(p.trials.iter().map(|t| u8::from(t.reward)).collect()));
            data.condition
                .push(names.iter().position(|c| *c == p.condition).unwrap_or(0));
        }
        data
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}
