//! Stimuli shown in a trial and the states that group them.

use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;

use super::reward_probability::RewardProbability;

/// Stimulus code as configured for the task (1-12 in the presets).
pub type SymbolCode = u8;

/// Left/right screen position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Index into a state's symbol pair.
    pub fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Left),
            1 => Some(Self::Right),
            _ => None,
        }
    }
}

/// Formats a code as the two-digit stimulus name (`7` → `07`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolName(pub SymbolCode);

impl fmt::Display for SymbolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// Final-stage symbol. The reward is drawn once, when the symbol is built.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalSymbol {
    pub code: SymbolCode,
    pub reward_probability: RewardProbability,
    pub reward: u8,
}

impl FinalSymbol {
    pub fn new<R: Rng + ?Sized>(
        code: SymbolCode,
        reward_probability: RewardProbability,
        rng: &mut R,
    ) -> Self {
        Self {
            code,
            reward_probability,
            reward: reward_probability.sample_reward(rng),
        }
    }

    pub fn name(&self) -> SymbolName {
        SymbolName(self.code)
    }
}

/// Final state: a color and two reward-bearing symbols in screen order.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalState {
    pub color: String,
    pub symbols: [FinalSymbol; 2],
}

impl FinalState {
    pub fn symbol(&self, side: Side) -> &FinalSymbol {
        &self.symbols[side.index()]
    }
}

/// First-stage symbol together with the final state it leads to this trial.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialSymbol {
    pub code: SymbolCode,
    pub final_state: FinalState,
}

impl InitialSymbol {
    pub fn name(&self) -> SymbolName {
        SymbolName(self.code)
    }
}

/// Initial state: two first-stage symbols in screen order.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub symbols: [InitialSymbol; 2],
}

impl State {
    pub fn symbol(&self, side: Side) -> &InitialSymbol {
        &self.symbols[side.index()]
    }
}

/// Puts a pair in random left/right order.
pub(crate) fn shuffle_pair<T, R: Rng + ?Sized>(a: T, b: T, rng: &mut R) -> [T; 2] {
    let mut pair = [a, b];
    pair.shuffle(rng);
    pair
}
