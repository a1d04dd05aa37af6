//! Trial generation.
//!
//! [`TrialSequence`] owns the RNG and the reward probability of every final
//! symbol. Each call to [`TrialSequence::next_trial`] builds one trial from the
//! current probabilities; the walk then advances by one step for all symbols,
//! whether or not they appeared in that trial.

use std::collections::BTreeMap;

use rand::Rng;
use tracing::trace;

use super::config::TaskConfig;
use super::reward_probability::RewardProbability;
use super::symbols::{shuffle_pair, FinalState, FinalSymbol, InitialSymbol, State, SymbolCode};
use super::transition::{Path, TransitionModel};

/// One trial as handed to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    /// 0-based position in the session
    pub number: usize,
    pub initial_state: State,
    /// Whether initial symbols lead to their commonly linked final states
    pub common: bool,
}

/// Infinite, strictly ordered trial stream for one session.
///
/// Not restartable: the reward probabilities keep drifting across calls.
#[derive(Debug)]
pub struct TrialSequence<R: Rng> {
    config: TaskConfig,
    model: TransitionModel,
    rng: R,
    reward_probabilities: BTreeMap<SymbolCode, RewardProbability>,
    trials: usize,
    pending_diffusion: bool,
}

impl<R: Rng> TrialSequence<R> {
    /// Draws the initial reward probabilities from `rng`.
    pub fn new(config: TaskConfig, model: TransitionModel, mut rng: R) -> Self {
        let reward_probabilities = config
            .final_symbol_codes()
            .map(|code| (code, RewardProbability::create_random(&mut rng)))
            .collect();
        Self {
            config,
            model,
            rng,
            reward_probabilities,
            trials: 0,
            pending_diffusion: false,
        }
    }

    /// Builds the next trial.
    pub fn next_trial(&mut self) -> Trial {
        // The walk advances lazily so the emitted trial never sees the
        // probabilities of the following one.
        if self.pending_diffusion {
            self.diffuse_all();
        }

        let common = self.config.get_common(self.trials, &mut self.rng);
        let paths: Vec<Path<'_>> = self.model.get_paths(common).collect();
        let rewards = &mut self.reward_probabilities;
        let rng = &mut self.rng;
        let [first, second] = [paths[0], paths[1]].map(|path| {
            let [a, b] = path.fsymbols.map(|code| {
                // A symbol outside the configured set starts its own walk
                let prob = *rewards
                    .entry(code)
                    .or_insert_with(|| RewardProbability::create_random(&mut *rng));
                FinalSymbol::new(code, prob, rng)
            });
            InitialSymbol {
                code: path.isymbol,
                final_state: FinalState {
                    color: path.color.to_string(),
                    symbols: shuffle_pair(a, b, rng),
                },
            }
        });

        let trial = Trial {
            number: self.trials,
            initial_state: State {
                symbols: shuffle_pair(first, second, &mut self.rng),
            },
            common,
        };
        trace!(trial = trial.number, common, "trial generated");

        self.trials += 1;
        self.pending_diffusion = true;
        trial
    }

    /// Current probability of every final symbol, in code order.
    pub fn reward_probabilities(&self) -> &BTreeMap<SymbolCode, RewardProbability> {
        &self.reward_probabilities
    }

    /// Number of trials emitted so far.
    pub fn trials_emitted(&self) -> usize {
        self.trials
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn model(&self) -> &TransitionModel {
        &self.model
    }

    fn diffuse_all(&mut self) {
        for prob in self.reward_probabilities.values_mut() {
            *prob = prob.diffuse(&mut self.rng);
        }
    }
}

impl<R: Rng> Iterator for TrialSequence<R> {
    type Item = Trial;

    fn next(&mut self) -> Option<Trial> {
        Some(self.next_trial())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sequence(seed: u64) -> TrialSequence<StdRng> {
        let mut rng = StdRng::seed_from_u64(seed);
        let config = TaskConfig::game();
        let model = TransitionModel::create_random(&config, &mut rng);
        TrialSequence::new(config, model, rng)
    }

    #[test]
    fn test_same_seed_same_trials_and_walks() {
        let mut a = sequence(17);
        let mut b = sequence(17);
        for _ in 0..200 {
            assert_eq!(a.next_trial(), b.next_trial());
            assert_eq!(a.reward_probabilities(), b.reward_probabilities());
        }
    }

    #[test]
    fn test_different_seeds_diverge() {
        let a: Vec<Trial> = sequence(1).take(30).collect();
        let b: Vec<Trial> = sequence(2).take(30).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn test_trial_numbers_increase() {
        let trials: Vec<Trial> = sequence(5).take(10).collect();
        for (i, trial) in trials.iter().enumerate() {
            assert_eq!(trial.number, i);
        }
    }

    #[test]
    fn test_trial_structure_follows_model() {
        let mut seq = sequence(23);
        let model = seq.model().clone();
        for _ in 0..100 {
            let trial = seq.next_trial();
            for isymbol in &trial.initial_state.symbols {
                let path = model
                    .get_paths(trial.common)
                    .find(|p| p.isymbol == isymbol.code)
                    .unwrap();
                assert_eq!(isymbol.final_state.color, path.color);
                let mut codes: Vec<_> =
                    isymbol.final_state.symbols.iter().map(|s| s.code).collect();
                codes.sort_unstable();
                let mut expected = path.fsymbols.to_vec();
                expected.sort_unstable();
                assert_eq!(codes, expected);
            }
        }
    }

    #[test]
    fn test_trial_uses_probabilities_before_diffusion() {
        let mut seq = sequence(31);
        let before = seq.reward_probabilities().clone();
        let trial = seq.next_trial();
        for isymbol in &trial.initial_state.symbols {
            for fsymbol in &isymbol.final_state.symbols {
                assert_eq!(fsymbol.reward_probability, before[&fsymbol.code]);
            }
        }
        // The walk advances before the second trial is built
        let second = seq.next_trial();
        let after = seq.reward_probabilities().clone();
        assert_ne!(before, after);
        for isymbol in &second.initial_state.symbols {
            for fsymbol in &isymbol.final_state.symbols {
                assert_eq!(fsymbol.reward_probability, after[&fsymbol.code]);
            }
        }
    }

    #[test]
    fn test_all_four_probabilities_tracked_and_bounded() {
        let mut seq = sequence(99);
        for _ in 0..500 {
            seq.next_trial();
            let probs = seq.reward_probabilities();
            assert_eq!(probs.keys().copied().collect::<Vec<_>>(), vec![3, 4, 5, 6]);
            assert!(probs
                .values()
                .all(|p| (0.25..=0.75).contains(&p.value())));
        }
    }

    #[test]
    fn test_symbols_outside_config_get_their_own_walk() {
        let model = TransitionModel::new(
            [1, 2],
            ["pink".into(), "blue".into()],
            [[7, 8], [5, 6]],
        );
        let mut seq = TrialSequence::new(TaskConfig::game(), model, StdRng::seed_from_u64(6));
        for _ in 0..20 {
            seq.next_trial();
        }
        let probs = seq.reward_probabilities();
        assert!(probs.contains_key(&7));
        assert!(probs.contains_key(&8));
        assert!(probs.values().all(|p| (0.25..=0.75).contains(&p.value())));
    }

    #[test]
    fn test_tutorial_prefix_transitions() {
        let mut rng = StdRng::seed_from_u64(4);
        let config = TaskConfig::tutorial();
        let model = TransitionModel::create_random(&config, &mut rng);
        let trials: Vec<Trial> = TrialSequence::new(config, model, rng).take(3).collect();
        assert!(trials[0].common);
        assert!(trials[1].common);
        assert!(!trials[2].common);
    }
}
