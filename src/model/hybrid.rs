//! Hybrid model-based/model-free learner (Daw et al., 2011).
//!
//! The model replays one participant's choices in order and exposes, for
//! each trial, the latent quantities used as fMRI predictors. Values at trial
//! `t` depend on every earlier trial, so trials must be fed chronologically.
//!
//! # Per-trial computation
//!
//! ```text
//! c = choice1, o = other option
//! qmbdiff = 0.4 · (max q2[c] − max q2[o])          (0.7 − 0.3 = 0.4)
//! qmfdiff = q1[c] − q1[o]
//! pers    = +p if c repeats, −p if it switches, 0 on the first trial
//! a1value = σ(β1 · (w·qmbdiff + (1 − w)·qmfdiff + pers))
//! a2value = q2[s2][choice2]
//! mfrpe   = a2value − q1[c]
//! mbrpe   = a2value − (0.7·max q2[c] + 0.3·max q2[o])
//! rpe2    = reward − a2value
//!
//! q1[c]          += α1 · (mfrpe + λ·rpe2)
//! q2[s2][choice2] += α2 · rpe2
//! ```
//!
//! The model-based RPE uses the task's fixed transition probabilities rather
//! than the fitted `w`.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::params::HybridParams;
use crate::consts::{COMMON_TRANSITION_WEIGHT, RARE_TRANSITION_WEIGHT};
use crate::errors::{Error, Result};

/// One of the two options at a stage (or one of the two final states).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Choice {
    One,
    Two,
}

impl Choice {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::One => 0,
            Self::Two => 1,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::One => Self::Two,
            Self::Two => Self::One,
        }
    }
}

impl TryFrom<u8> for Choice {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        Self::from_code(code)
            .ok_or_else(|| Error::invalid_trial(format!("option code {code} is not 1 or 2")))
    }
}

impl From<Choice> for u8 {
    fn from(choice: Choice) -> u8 {
        choice.code()
    }
}

/// Choices and outcome of one completed (non-slow) trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedTrial {
    pub choice1: Choice,
    pub choice2: Choice,
    pub final_state: Choice,
    pub reward: bool,
}

impl ObservedTrial {
    /// Validates raw codes: options in {1, 2}, reward in {0, 1}.
    pub fn from_codes(choice1: u8, choice2: u8, final_state: u8, reward: u8) -> Result<Self> {
        if reward > 1 {
            return Err(Error::invalid_trial(format!("reward {reward} is not 0 or 1")));
        }
        Ok(Self {
            choice1: Choice::try_from(choice1)?,
            choice2: Choice::try_from(choice2)?,
            final_state: Choice::try_from(final_state)?,
            reward: reward == 1,
        })
    }

    fn reward_value(&self) -> f64 {
        if self.reward {
            1.0
        } else {
            0.0
        }
    }
}

/// Latent quantities for one trial, computed before that trial's update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialPredictors {
    pub mfrpe: f64,
    pub mbrpe: f64,
    pub rpediff: f64,
    pub rpe2: f64,
    pub chosen_action1_value: f64,
    pub chosen_action1_value_deriv: f64,
    pub chosen_action2_value: f64,
}

impl TrialPredictors {
    pub const COLUMNS: [&'static str; 7] = [
        "mfrpe",
        "mbrpe",
        "rpediff",
        "rpe2",
        "chosen_action1_value",
        "chosen_action1_value_deriv",
        "chosen_action2_value",
    ];

    pub fn as_array(&self) -> [f64; 7] {
        [
            self.mfrpe,
            self.mbrpe,
            self.rpediff,
            self.rpe2,
            self.chosen_action1_value,
            self.chosen_action1_value_deriv,
            self.chosen_action2_value,
        ]
    }
}

/// Quantities shared by the predictor and likelihood paths.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StageOneTerms {
    /// Model-based value difference, chosen minus other
    pub qmbdiff: f64,
    /// Model-free value difference, chosen minus other
    pub qmfdiff: f64,
    /// Signed perseveration term
    pub pers: f64,
}

impl StageOneTerms {
    /// Net preference for the chosen option before the inverse temperature.
    pub fn net(&self, w: f64) -> f64 {
        w * self.qmbdiff + (1.0 - w) * self.qmfdiff + self.pers
    }
}

/// Value tables of one participant.
#[derive(Debug, Clone)]
pub struct HybridModel {
    params: HybridParams,
    q1: [f64; 2],
    q2: [[f64; 2]; 2],
    prev_choice1: Option<Choice>,
    trials_seen: usize,
}

impl HybridModel {
    /// Zeroed tables and no previous choice.
    pub fn new(params: HybridParams) -> Self {
        Self {
            params,
            q1: [0.0; 2],
            q2: [[0.0; 2]; 2],
            prev_choice1: None,
            trials_seen: 0,
        }
    }

    pub fn params(&self) -> &HybridParams {
        &self.params
    }

    pub fn q1(&self) -> [f64; 2] {
        self.q1
    }

    pub fn q2(&self) -> [[f64; 2]; 2] {
        self.q2
    }

    pub fn trials_seen(&self) -> usize {
        self.trials_seen
    }

    fn max_q2(&self, state: Choice) -> f64 {
        let row = self.q2[state.index()];
        row[0].max(row[1])
    }

    /// First-stage terms for choosing `choice1` given the tables so far.
    pub(crate) fn stage_one_terms(&self, choice1: Choice) -> StageOneTerms {
        let other = choice1.other();
        let qmbdiff = (COMMON_TRANSITION_WEIGHT - RARE_TRANSITION_WEIGHT)
            * (self.max_q2(choice1) - self.max_q2(other));
        let qmfdiff = self.q1[choice1.index()] - self.q1[other.index()];
        let pers = match self.prev_choice1 {
            None => 0.0,
            Some(prev) if prev == choice1 => self.params.p,
            Some(_) => -self.params.p,
        };
        StageOneTerms {
            qmbdiff,
            qmfdiff,
            pers,
        }
    }

    /// Second-stage value difference, `choice2` minus the other option.
    pub(crate) fn stage_two_diff(&self, final_state: Choice, choice2: Choice) -> f64 {
        let row = self.q2[final_state.index()];
        row[choice2.index()] - row[choice2.other().index()]
    }

    /// Computes the trial's predictors, then applies the learning update.
    pub fn observe(&mut self, trial: &ObservedTrial) -> TrialPredictors {
        let HybridParams {
            alpha1,
            alpha2,
            lambda,
            beta1,
            w,
            ..
        } = self.params;
        let c1 = trial.choice1;
        let terms = self.stage_one_terms(c1);

        let chosen_action1_value = sigmoid(beta1 * terms.net(w));
        let chosen_action1_value_deriv =
            action1_value_derivative(w, beta1, terms.qmbdiff, terms.qmfdiff, terms.pers);

        let a2value = self.q2[trial.final_state.index()][trial.choice2.index()];
        let mfrpe = a2value - self.q1[c1.index()];
        let mbrpe = a2value
            - (COMMON_TRANSITION_WEIGHT * self.max_q2(c1)
                + RARE_TRANSITION_WEIGHT * self.max_q2(c1.other()));
        let rpe2 = trial.reward_value() - a2value;

        self.q1[c1.index()] += alpha1 * (mfrpe + lambda * rpe2);
        self.q2[trial.final_state.index()][trial.choice2.index()] += alpha2 * rpe2;
        self.prev_choice1 = Some(c1);
        self.trials_seen += 1;

        trace!(
            trial = self.trials_seen,
            mfrpe,
            mbrpe,
            rpe2,
            q1 = ?self.q1,
            q2 = ?self.q2,
            "hybrid update"
        );

        TrialPredictors {
            mfrpe,
            mbrpe,
            rpediff: mbrpe - mfrpe,
            rpe2,
            chosen_action1_value,
            chosen_action1_value_deriv,
            chosen_action2_value: a2value,
        }
    }
}

/// Replays a participant's trials from zeroed tables.
pub fn calculate_prediction_errors(
    params: &HybridParams,
    trials: &[ObservedTrial],
) -> Vec<TrialPredictors> {
    let mut model = HybridModel::new(*params);
    trials.iter().map(|trial| model.observe(trial)).collect()
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// ∂/∂w of `σ(β1 · (pers + qmbdiff·w − qmfdiff·(w − 1)))`.
pub fn action1_value_derivative(w: f64, beta1: f64, qmbdiff: f64, qmfdiff: f64, pers: f64) -> f64 {
    let half = beta1 * (pers + qmbdiff * w - qmfdiff * (w - 1.0)) / 2.0;
    beta1 * (qmbdiff - qmfdiff) / (4.0 * half.cosh().powi(2))
}
