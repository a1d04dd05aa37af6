//! Choice likelihood of the hybrid model.
//!
//! Both stages use a logistic choice rule on value differences:
//!
//! ```text
//! P(choice1) = σ(β1 · (w·qmbdiff + (1 − w)·qmfdiff + pers))
//! P(choice2) = σ(β2 · (q2[s2][choice2] − q2[s2][other]))
//! ```
//!
//! The tables evolve exactly as in [`HybridModel::observe`], so the fitted
//! parameters are the ones that regenerate the predictors.

use super::hybrid::{HybridModel, ObservedTrial};
use super::params::HybridParams;

/// `ln σ(x)`, stable for large |x|.
pub fn log_sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        -(-x).exp().ln_1p()
    } else {
        x - x.exp().ln_1p()
    }
}

/// Log-probability of both choices of every trial.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChoiceLogLikelihood {
    pub stage1: f64,
    pub stage2: f64,
}

impl ChoiceLogLikelihood {
    pub fn total(&self) -> f64 {
        self.stage1 + self.stage2
    }
}

impl HybridModel {
    /// Log-probabilities of the trial's two choices under the current tables.
    /// Does not update the tables.
    pub fn choice_log_probabilities(&self, trial: &ObservedTrial) -> (f64, f64) {
        let params = self.params();
        let terms = self.stage_one_terms(trial.choice1);
        let ln_p1 = log_sigmoid(params.beta1 * terms.net(params.w));
        let ln_p2 = log_sigmoid(params.beta2 * self.stage_two_diff(trial.final_state, trial.choice2));
        (ln_p1, ln_p2)
    }
}

/// Log-likelihood of a participant's choices, split by stage.
pub fn choice_log_likelihood(params: &HybridParams, trials: &[ObservedTrial]) -> ChoiceLogLikelihood {
    let mut model = HybridModel::new(*params);
    let mut ll = ChoiceLogLikelihood::default();
    for trial in trials {
        let (ln_p1, ln_p2) = model.choice_log_probabilities(trial);
        ll.stage1 += ln_p1;
        ll.stage2 += ln_p2;
        model.observe(trial);
    }
    ll
}

/// Total log-likelihood of a participant's choices.
pub fn log_likelihood(params: &HybridParams, trials: &[ObservedTrial]) -> f64 {
    choice_log_likelihood(params, trials).total()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::hybrid::sigmoid;

    fn trial(c1: u8, c2: u8, s2: u8, r: u8) -> ObservedTrial {
        ObservedTrial::from_codes(c1, c2, s2, r).unwrap()
    }

    #[test]
    fn test_log_sigmoid_matches_naive() {
        for x in [-30.0, -5.0, -0.3, 0.0, 0.7, 4.0, 30.0] {
            let naive = sigmoid(x).ln();
            assert!((log_sigmoid(x) - naive).abs() < 1e-12, "x={x}");
        }
        assert!(log_sigmoid(-800.0).is_finite());
        assert!(log_sigmoid(800.0) <= 0.0);
    }

    #[test]
    fn test_first_trial_is_coin_flip() {
        let ll = choice_log_likelihood(&HybridParams::DAW_2011, &[trial(1, 2, 2, 1)]);
        assert!((ll.stage1 - 0.5f64.ln()).abs() < 1e-12);
        assert!((ll.stage2 - 0.5f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_probabilities_of_both_options_sum_to_one() {
        let params = HybridParams::DAW_2011.with_w(0.6);
        let mut model = HybridModel::new(params);
        for t in [trial(1, 1, 1, 1), trial(2, 2, 1, 0), trial(1, 2, 2, 1)] {
            model.observe(&t);
        }
        let (a1, a2) = model.choice_log_probabilities(&trial(1, 1, 2, 0));
        let (b1, b2) = model.choice_log_probabilities(&trial(2, 2, 2, 0));
        assert!((a1.exp() + b1.exp() - 1.0).abs() < 1e-12);
        assert!((a2.exp() + b2.exp() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_stage_one_probability_equals_action_value() {
        let params = HybridParams::DAW_2011;
        let trials = [trial(1, 1, 1, 1), trial(1, 2, 1, 0), trial(2, 1, 2, 1)];
        let mut model = HybridModel::new(params);
        for t in &trials {
            let (ln_p1, _) = model.choice_log_probabilities(t);
            let predictors = model.observe(t);
            assert!((ln_p1.exp() - predictors.chosen_action1_value).abs() < 1e-12);
        }
    }

    #[test]
    fn test_consistent_choices_favour_learning() {
        // Always pick the option that keeps paying off
        let trials: Vec<_> = (0..40).map(|_| trial(1, 1, 1, 1)).collect();
        let learner = log_likelihood(&HybridParams::DAW_2011, &trials);
        let indifferent = HybridParams {
            beta1: 0.0,
            beta2: 0.0,
            ..HybridParams::DAW_2011
        };
        let flat = log_likelihood(&indifferent, &trials);
        assert!((flat - 80.0 * 0.5f64.ln()).abs() < 1e-9);
        assert!(learner > flat);
    }
}
