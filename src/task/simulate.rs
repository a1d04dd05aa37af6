//! Synthetic participant driven by the hybrid model.
//!
//! Stands in for a human at the keyboard: choices are sampled from the same
//! logistic rules the fitter assumes, response times from a log-normal, and
//! occasional lapses leave a stage unanswered. Useful for parameter recovery
//! and for exercising the full pipeline without a display.

use rand::Rng;
use rand_distr::{Distribution, LogNormal};
use serde::{Deserialize, Serialize};

use super::record::{code_to_bin, Response, TrialRecord};
use super::session::Participant;
use super::symbols::{FinalState, Side, SymbolCode};
use super::trial::Trial;
use crate::errors::{Error, Result};
use crate::model::{sigmoid, Choice, HybridModel, HybridParams, ObservedTrial};

/// Behavioural noise of a simulated participant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseModel {
    /// Probability of not answering at a stage
    pub lapse_prob: f64,
    /// Median reaction time (seconds)
    pub rt_median: f64,
    /// Log-scale spread of reaction times
    pub rt_sigma: f64,
}

impl Default for ResponseModel {
    fn default() -> Self {
        Self {
            lapse_prob: 0.01,
            rt_median: 0.8,
            rt_sigma: 0.35,
        }
    }
}

pub struct SimulatedParticipant<R: Rng> {
    model: HybridModel,
    rt: LogNormal<f64>,
    lapse_prob: f64,
    rng: R,
}

impl<R: Rng> SimulatedParticipant<R> {
    pub fn new(params: HybridParams, responses: ResponseModel, rng: R) -> Result<Self> {
        params.validate()?;
        if !(0.0..=1.0).contains(&responses.lapse_prob) {
            return Err(Error::config(format!(
                "lapse_prob {} outside [0, 1]",
                responses.lapse_prob
            )));
        }
        if responses.rt_median <= 0.0 {
            return Err(Error::config("rt_median must be positive"));
        }
        let rt = LogNormal::new(responses.rt_median.ln(), responses.rt_sigma)
            .map_err(|e| Error::config(format!("invalid reaction time model: {e}")))?;
        Ok(Self {
            model: HybridModel::new(params),
            rt,
            lapse_prob: responses.lapse_prob,
            rng,
        })
    }

    pub fn model(&self) -> &HybridModel {
        &self.model
    }

    fn respond(&mut self, codes: [SymbolCode; 2], choice: Choice) -> Option<Response> {
        if self.rng.gen::<f64>() < self.lapse_prob {
            return None;
        }
        let index = codes
            .iter()
            .position(|&code| code_to_bin(code, true) == choice.code())?;
        Some(Response {
            side: Side::from_index(index)?,
            rt: self.rt.sample(&mut self.rng),
        })
    }

    fn draw(&mut self, p_one: f64) -> Choice {
        if self.rng.gen::<f64>() < p_one {
            Choice::One
        } else {
            Choice::Two
        }
    }
}

impl<R: Rng> Participant for SimulatedParticipant<R> {
    fn respond_first_stage(&mut self, trial: &Trial) -> Option<Response> {
        let params = *self.model.params();
        let terms = self.model.stage_one_terms(Choice::One);
        let choice = self.draw(sigmoid(params.beta1 * terms.net(params.w)));
        let codes = trial.initial_state.symbols.each_ref().map(|s| s.code);
        self.respond(codes, choice)
    }

    fn respond_second_stage(
        &mut self,
        record: &TrialRecord,
        final_state: &FinalState,
    ) -> Option<Response> {
        let state = record.final_state.and_then(Choice::from_code)?;
        let beta2 = self.model.params().beta2;
        let diff = self.model.stage_two_diff(state, Choice::One);
        let choice = self.draw(sigmoid(beta2 * diff));
        let codes = final_state.symbols.each_ref().map(|s| s.code);
        self.respond(codes, choice)
    }

    fn observe(&mut self, record: &TrialRecord) {
        if record.slow {
            return;
        }
        if let (Some(c1), Some(c2), Some(s2)) = (record.choice1, record.choice2, record.final_state)
        {
            if let Ok(trial) = ObservedTrial::from_codes(c1, c2, s2, record.reward) {
                self.model.observe(&trial);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::session::run_session;
    use crate::task::{TaskConfig, TransitionModel, TrialSequence};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn simulate(seed: u64, params: HybridParams, responses: ResponseModel) -> Vec<TrialRecord> {
        let mut rng = StdRng::seed_from_u64(seed);
        let config = TaskConfig::game();
        let model = TransitionModel::create_random(&config, &mut rng);
        let mut sequence = TrialSequence::new(config, model, StdRng::seed_from_u64(seed + 1));
        let mut participant =
            SimulatedParticipant::new(params, responses, StdRng::seed_from_u64(seed + 2)).unwrap();
        run_session(&mut sequence, &mut participant, &[], &mut rng)
            .unwrap()
            .records
    }

    #[test]
    fn test_simulation_is_reproducible() {
        let a = simulate(10, HybridParams::DAW_2011, ResponseModel::default());
        let b = simulate(10, HybridParams::DAW_2011, ResponseModel::default());
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_lapses_no_slow_trials_when_fast() {
        let responses = ResponseModel {
            lapse_prob: 0.0,
            rt_median: 0.5,
            rt_sigma: 0.0,
        };
        let records = simulate(11, HybridParams::DAW_2011, responses);
        assert!(records.iter().all(|r| !r.slow));
        for record in &records {
            let rt1 = record.rt1.unwrap();
            assert!((rt1 - 0.5).abs() < 1e-12, "rt1={rt1}");
        }
    }

    #[test]
    fn test_always_lapsing_participant() {
        let responses = ResponseModel {
            lapse_prob: 1.0,
            ..ResponseModel::default()
        };
        let records = simulate(12, HybridParams::DAW_2011, responses);
        assert!(records.iter().all(|r| r.slow && r.choice1.is_none()));
    }

    #[test]
    fn test_learner_tracks_model_observations() {
        let mut rng = StdRng::seed_from_u64(13);
        let config = TaskConfig {
            trials_per_block: 20,
            blocks: 1,
            ..TaskConfig::game()
        };
        let model = TransitionModel::create_random(&config, &mut rng);
        let mut sequence = TrialSequence::new(config, model, StdRng::seed_from_u64(14));
        let mut participant = SimulatedParticipant::new(
            HybridParams::DAW_2011,
            ResponseModel::default(),
            StdRng::seed_from_u64(15),
        )
        .unwrap();
        let summary = run_session(&mut sequence, &mut participant, &[], &mut rng).unwrap();
        let completed = summary.records.iter().filter(|r| !r.slow).count();
        assert_eq!(participant.model().trials_seen(), completed);
    }

    #[test]
    fn test_invalid_response_model_rejected() {
        let bad = ResponseModel {
            lapse_prob: 1.5,
            ..ResponseModel::default()
        };
        let participant =
            SimulatedParticipant::new(HybridParams::DAW_2011, bad, StdRng::seed_from_u64(0));
        assert!(participant.is_err());
    }
}
