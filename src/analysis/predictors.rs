//! Trial-by-trial predictors from fitted parameters.
//!
//! Each participant's completed trials are replayed through a fresh
//! [`HybridModel`](crate::model::HybridModel) with that participant's
//! parameters. Participants are independent and run on the rayon pool.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::ParticipantData;
use crate::errors::{Error, Result};
use crate::model::{calculate_prediction_errors, HybridParams, TrialPredictors};
use crate::table::{Table, TableWriter};

/// Which parameters feed the replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamSource {
    /// Each participant's own fitted values
    AsFitted,
    /// Condition means for everything except the participant's own `w`
    ConditionMean,
}

impl FromStr for ParamSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "as_fitted" | "as-fitted" | "fitted" => Ok(Self::AsFitted),
            "condition_mean" | "condition-mean" | "mean" => Ok(Self::ConditionMean),
            other => Err(Error::config(format!("unknown parameter source '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamEntry {
    pub participant: String,
    pub condition: String,
    pub params: HybridParams,
}

/// Fitted parameters keyed by participant, in file order.
#[derive(Debug, Clone, Default)]
pub struct ParamTable {
    entries: Vec<ParamEntry>,
    index: HashMap<String, usize>,
}

impl ParamTable {
    pub fn from_entries(entries: Vec<ParamEntry>) -> Result<Self> {
        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if index.insert(entry.participant.clone(), i).is_some() {
                return Err(Error::alignment(format!(
                    "participant {} listed twice in parameter table",
                    entry.participant
                )));
            }
        }
        Ok(Self { entries, index })
    }

    pub fn from_table(table: &Table) -> Result<Self> {
        let entries = table
            .rows()
            .map(|row| -> Result<ParamEntry> {
                Ok(ParamEntry {
                    participant: row.get("participant")?.to_string(),
                    condition: row.get("condition")?.to_string(),
                    params: HybridParams::from_row(&row)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_entries(entries)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let table = Self::from_table(&Table::from_path(path)?)?;
        info!(path = %path.display(), participants = table.len(), "parameters loaded");
        Ok(table)
    }

    pub fn get(&self, participant: &str) -> Option<&ParamEntry> {
        self.index.get(participant).map(|&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[ParamEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replaces every parameter except `w` by its mean over the condition.
    pub fn with_condition_means(&self) -> Self {
        let mut sums: BTreeMap<&str, ([f64; 7], usize)> = BTreeMap::new();
        for entry in &self.entries {
            let (sum, count) = sums.entry(entry.condition.as_str()).or_insert(([0.0; 7], 0));
            for (s, v) in sum.iter_mut().zip(entry.params.to_vec()) {
                *s += v;
            }
            *count += 1;
        }

        let entries = self
            .entries
            .iter()
            .map(|entry| {
                let (sum, count) = sums[entry.condition.as_str()];
                let mut values = sum.map(|s| s / count as f64);
                values[6] = entry.params.w;
                ParamEntry {
                    params: HybridParams::from_slice(&values),
                    ..entry.clone()
                }
            })
            .collect();
        Self {
            entries,
            index: self.index.clone(),
        }
    }
}

/// Predictors of one participant, aligned with `trial_numbers`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantPredictors {
    pub participant: String,
    pub condition: String,
    pub trial_numbers: Vec<usize>,
    pub predictors: Vec<TrialPredictors>,
}

/// Replays every participant; output order follows input order.
///
/// Fails with [`Error::MissingParameters`] when a participant has no row in
/// `params`.
pub fn compute_predictors(
    participants: &[ParticipantData],
    params: &ParamTable,
    source: ParamSource,
) -> Result<Vec<ParticipantPredictors>> {
    let averaged;
    let params = match source {
        ParamSource::AsFitted => params,
        ParamSource::ConditionMean => {
            averaged = params.with_condition_means();
            &averaged
        }
    };

    let results = participants
        .par_iter()
        .map(|data| -> Result<ParticipantPredictors> {
            let entry = params
                .get(&data.participant)
                .ok_or_else(|| Error::MissingParameters(data.participant.clone()))?;
            debug!(participant = %data.participant, trials = data.len(), "replaying");
            Ok(ParticipantPredictors {
                participant: data.participant.clone(),
                condition: data.condition.clone(),
                trial_numbers: data.trial_numbers.clone(),
                predictors: calculate_prediction_errors(&entry.params, &data.trials),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    info!(
        participants = results.len(),
        trials = results.iter().map(|r| r.predictors.len()).sum::<usize>(),
        source = ?source,
        "predictors computed"
    );
    Ok(results)
}

/// Writes `participant, condition, trial` followed by the seven predictors.
pub fn write_predictors<W: Write>(inner: W, results: &[ParticipantPredictors]) -> Result<W> {
    let mut columns = vec!["participant", "condition", "trial"];
    columns.extend_from_slice(&TrialPredictors::COLUMNS);
    let mut table = TableWriter::new(inner, &columns)?;
    for result in results {
        for (trial, predictors) in result.trial_numbers.iter().zip(&result.predictors) {
            let mut fields = vec![
                result.participant.clone(),
                result.condition.clone(),
                trial.to_string(),
            ];
            fields.extend(predictors.as_array().iter().map(f64::to_string));
            table.write_row(&fields)?;
        }
    }
    table.into_inner()
}

/// Appends predictor columns to an event table (onsets, durations, ...).
///
/// The event rows of each participant must list exactly the participant's
/// modelled trials, in the same order; any mismatch fails the whole run.
pub fn write_with_events<W: Write>(
    inner: W,
    events: &Table,
    results: &[ParticipantPredictors],
) -> Result<W> {
    let mut by_participant: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, row) in events.rows().enumerate() {
        by_participant.entry(row.get("participant")?).or_default().push(i);
    }
    let rows: Vec<_> = events.rows().collect();

    let mut columns: Vec<&str> = events.columns().iter().map(String::as_str).collect();
    columns.extend_from_slice(&TrialPredictors::COLUMNS);
    let mut table = TableWriter::new(inner, &columns)?;

    for result in results {
        let indices = by_participant
            .get(result.participant.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default();
        let trials = indices
            .iter()
            .map(|&i| rows[i].parse::<usize>("trial"))
            .collect::<Result<Vec<_>>>()?;
        if trials != result.trial_numbers {
            return Err(Error::alignment(format!(
                "participant {}: {} event rows for {} modelled trials, or trial numbers differ",
                result.participant,
                trials.len(),
                result.trial_numbers.len()
            )));
        }

        for (&i, predictors) in indices.iter().zip(&result.predictors) {
            let row = rows[i];
            let mut fields = events
                .columns()
                .iter()
                .map(|c| row.get(c).map(str::to_string))
                .collect::<Result<Vec<_>>>()?;
            fields.extend(predictors.as_array().iter().map(f64::to_string));
            table.write_row(&fields)?;
        }
    }
    table.into_inner()
}
