//! Maximum-likelihood fits of the hybrid model.
//!
//! Three variants share one restart loop:
//!
//! | variant  | free parameters                                   | unit            |
//! |----------|---------------------------------------------------|-----------------|
//! | `Single` | all seven                                         | participant     |
//! | `Mixed`  | six shared, plus one `w` per participant          | condition group |
//! | `WOnly`  | `w` only, the rest fixed at Daw et al. (2011)     | participant     |
//!
//! Every fit restarts the optimizer from fresh points and keeps the highest
//! log-likelihood among converged attempts.

use std::io::Write;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::cma_es::{Bound, CmaEs, Optimum};
use crate::dataset::{conditions, ParticipantData};
use crate::errors::{Error, Result};
use crate::model::{log_likelihood, HybridParams, ParamBounds, PARAM_NAMES};
use crate::table::TableWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitVariant {
    Single,
    Mixed,
    WOnly,
}

impl FitVariant {
    pub fn name(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Mixed => "mixed",
            Self::WOnly => "w_only",
        }
    }
}

impl std::str::FromStr for FitVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "single" => Ok(Self::Single),
            "mixed" => Ok(Self::Mixed),
            "w_only" | "w-only" | "original" => Ok(Self::WOnly),
            other => Err(Error::config(format!("unknown fit variant '{other}'"))),
        }
    }
}

/// Optimizer and restart settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FittingConfig {
    /// Converged attempts to collect per fit
    pub restarts: usize,
    /// Hard cap on attempts per fit, converged or not
    pub max_attempts: usize,
    pub max_generations: usize,
    /// Step size (and relative population spread) below which an attempt
    /// counts as converged
    pub convergence_sigma: f64,
    pub seed: u64,
    /// Fit participants on the rayon pool
    pub parallel: bool,
    pub bounds: ParamBounds,
}

impl Default for FittingConfig {
    fn default() -> Self {
        Self {
            restarts: 10,
            max_attempts: 40,
            max_generations: 2000,
            convergence_sigma: 1e-6,
            seed: 0,
            parallel: true,
            bounds: ParamBounds::default(),
        }
    }
}

impl FittingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.restarts == 0 {
            return Err(Error::config("fitting.restarts must be at least 1"));
        }
        if self.max_attempts < self.restarts {
            return Err(Error::config(format!(
                "fitting.max_attempts ({}) below fitting.restarts ({})",
                self.max_attempts, self.restarts
            )));
        }
        if !(self.convergence_sigma > 0.0) {
            return Err(Error::config("fitting.convergence_sigma must be positive"));
        }
        for (name, (min, max)) in PARAM_NAMES.iter().zip(self.bounds.as_array()) {
            if !(min < max) {
                return Err(Error::config(format!("empty bound [{min}, {max}] for {name}")));
            }
        }
        Ok(())
    }
}

/// Fitted parameters of one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub participant: String,
    pub condition: String,
    pub params: HybridParams,
    /// Log-likelihood of this participant's choices under `params`
    pub log_likelihood: f64,
}

/// Runs the restart loop on `objective` and returns the best converged
/// optimum.
fn best_of_restarts<F>(
    label: &str,
    bounds: &[Bound],
    start: &[f64],
    objective: F,
    config: &FittingConfig,
    seed: u64,
) -> Result<Optimum>
where
    F: Fn(&[f64]) -> f64,
{
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut best: Option<Optimum> = None;
    let mut converged = 0;

    for attempt in 0..config.max_attempts {
        if converged == config.restarts {
            break;
        }
        // First attempt from the given start, later ones anywhere in the box
        let from: Vec<f64> = if attempt == 0 {
            start.to_vec()
        } else {
            bounds.iter().map(|b| rng.gen_range(b.min..b.max)).collect()
        };
        let optimum = CmaEs::new(bounds.to_vec(), &from, rng.gen()).maximize(
            &objective,
            config.max_generations,
            config.convergence_sigma,
        );

        if !optimum.fitness.is_finite() {
            warn!(label, attempt, "attempt produced no finite log-likelihood, retrying");
            continue;
        }
        if !optimum.converged {
            warn!(
                label,
                attempt,
                generations = optimum.generations,
                "attempt did not converge, retrying"
            );
            continue;
        }

        converged += 1;
        debug!(label, attempt, log_likelihood = optimum.fitness, "attempt converged");
        if best.as_ref().map_or(true, |b| optimum.fitness > b.fitness) {
            best = Some(optimum);
        }
    }

    best.ok_or(Error::NotConverged {
        attempts: config.max_attempts,
    })
}

fn seed_for(base: u64, index: usize) -> u64 {
    base ^ (index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

fn fit_single(data: &ParticipantData, config: &FittingConfig, seed: u64) -> Result<FitResult> {
    let bounds: Vec<Bound> = config.bounds.as_array().into_iter().map(Bound::from).collect();
    let start = clamp_into(&HybridParams::DAW_2011.to_vec(), &bounds);
    let optimum = best_of_restarts(
        &data.participant,
        &bounds,
        &start,
        |x| log_likelihood(&HybridParams::from_slice(x), &data.trials),
        config,
        seed,
    )?;
    Ok(FitResult {
        participant: data.participant.clone(),
        condition: data.condition.clone(),
        params: HybridParams::from_slice(&optimum.params),
        log_likelihood: optimum.fitness,
    })
}

fn fit_w_only(data: &ParticipantData, config: &FittingConfig, seed: u64) -> Result<FitResult> {
    let bounds = [Bound::new(0.0, 1.0)];
    let fixed = HybridParams::DAW_2011;
    let optimum = best_of_restarts(
        &data.participant,
        &bounds,
        &[fixed.w],
        |x| log_likelihood(&fixed.with_w(x[0]), &data.trials),
        config,
        seed,
    )?;
    Ok(FitResult {
        participant: data.participant.clone(),
        condition: data.condition.clone(),
        params: fixed.with_w(optimum.params[0]),
        log_likelihood: optimum.fitness,
    })
}

/// Six shared parameters followed by one `w` per participant.
fn mixed_params(x: &[f64], participant: usize) -> HybridParams {
    let mut values = [0.0; 7];
    values[..6].copy_from_slice(&x[..6]);
    values[6] = x[6 + participant];
    HybridParams::from_slice(&values)
}

fn fit_mixed(group: &[&ParticipantData], config: &FittingConfig, seed: u64) -> Result<Vec<FitResult>> {
    let shared = config.bounds.as_array();
    let mut bounds: Vec<Bound> = shared[..6].iter().copied().map(Bound::from).collect();
    bounds.extend(group.iter().map(|_| Bound::from(shared[6])));

    let daw = HybridParams::DAW_2011.to_vec();
    let mut start = daw[..6].to_vec();
    start.extend(group.iter().map(|_| daw[6]));
    let start = clamp_into(&start, &bounds);

    let label = format!("{} participants of {}", group.len(), group[0].condition);
    let optimum = best_of_restarts(
        &label,
        &bounds,
        &start,
        |x| {
            group
                .iter()
                .enumerate()
                .map(|(i, data)| log_likelihood(&mixed_params(x, i), &data.trials))
                .sum()
        },
        config,
        seed,
    )?;

    Ok(group
        .iter()
        .enumerate()
        .map(|(i, data)| {
            let params = mixed_params(&optimum.params, i);
            FitResult {
                participant: data.participant.clone(),
                condition: data.condition.clone(),
                params,
                log_likelihood: log_likelihood(&params, &data.trials),
            }
        })
        .collect())
}

fn clamp_into(values: &[f64], bounds: &[Bound]) -> Vec<f64> {
    values
        .iter()
        .zip(bounds)
        .map(|(&v, b)| v.clamp(b.min, b.max))
        .collect()
}

/// Fits every participant with the chosen variant.
///
/// Results follow input order (grouped by condition for `Mixed`).
pub fn fit(
    participants: &[ParticipantData],
    variant: FitVariant,
    config: &FittingConfig,
) -> Result<Vec<FitResult>> {
    config.validate()?;
    if let Some(empty) = participants.iter().find(|p| p.is_empty()) {
        return Err(Error::invalid_trial(format!(
            "participant {} has no completed trials",
            empty.participant
        )));
    }
    info!(
        variant = variant.name(),
        participants = participants.len(),
        restarts = config.restarts,
        "fitting started"
    );

    let per_participant = |fit_one: fn(&ParticipantData, &FittingConfig, u64) -> Result<FitResult>| {
        let run = |(i, data): (usize, &ParticipantData)| -> Result<FitResult> {
            let result = fit_one(data, config, seed_for(config.seed, i))?;
            info!(
                participant = %result.participant,
                w = result.params.w,
                log_likelihood = result.log_likelihood,
                "participant fitted"
            );
            Ok(result)
        };
        if config.parallel {
            participants.par_iter().enumerate().map(run).collect::<Result<Vec<_>>>()
        } else {
            participants.iter().enumerate().map(run).collect::<Result<Vec<_>>>()
        }
    };

    let results = match variant {
        FitVariant::Single => per_participant(fit_single)?,
        FitVariant::WOnly => per_participant(fit_w_only)?,
        FitVariant::Mixed => {
            let mut results = Vec::with_capacity(participants.len());
            for (i, condition) in conditions(participants).iter().enumerate() {
                let group: Vec<&ParticipantData> = participants
                    .iter()
                    .filter(|p| &p.condition == condition)
                    .collect();
                let fitted = fit_mixed(&group, config, seed_for(config.seed, i))?;
                info!(
                    condition = %condition,
                    participants = fitted.len(),
                    "condition fitted"
                );
                results.extend(fitted);
            }
            results
        }
    };

    info!(variant = variant.name(), fitted = results.len(), "fitting finished");
    Ok(results)
}

/// Header of a parameter table.
pub fn param_table_columns() -> Vec<&'static str> {
    let mut columns = vec!["participant", "condition"];
    columns.extend_from_slice(&PARAM_NAMES);
    columns
}

/// Writes `participant, condition, alpha1 … w`.
pub fn write_fit_results<W: Write>(inner: W, results: &[FitResult]) -> Result<W> {
    let mut table = TableWriter::new(inner, &param_table_columns())?;
    for result in results {
        let mut fields = vec![result.participant.clone(), result.condition.clone()];
        fields.extend(result.params.to_fields());
        table.write_row(&fields)?;
    }
    table.into_inner()
}
