//! Transition model: which first-stage symbol leads to which final state.
//!
//! A model is drawn once per session and never changes afterwards. Under a
//! common transition each initial symbol leads to its own final state; under
//! a rare one the final states (color and symbol pair together) are swapped
//! while the initial symbols keep their order.

use std::collections::BTreeMap;
use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::config::TaskConfig;
use super::symbols::SymbolCode;
use crate::errors::{Error, Result};
use crate::table::{RowRef, Table};

/// One `(initial symbol, color, final symbol pair)` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Path<'a> {
    pub isymbol: SymbolCode,
    pub color: &'a str,
    pub fsymbols: [SymbolCode; 2],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionModel {
    isymbol_codes: [SymbolCode; 2],
    colors: [String; 2],
    fsymbol_codes: [[SymbolCode; 2]; 2],
}

impl TransitionModel {
    pub fn new(
        isymbol_codes: [SymbolCode; 2],
        colors: [String; 2],
        fsymbol_codes: [[SymbolCode; 2]; 2],
    ) -> Self {
        Self {
            isymbol_codes,
            colors,
            fsymbol_codes,
        }
    }

    /// Shuffles colors and final symbol pairs independently and pairs them
    /// with the initial symbols in configuration order.
    pub fn create_random<R: Rng + ?Sized>(config: &TaskConfig, rng: &mut R) -> Self {
        let mut colors = config.final_state_colors.clone();
        colors.shuffle(rng);
        let mut fsymbol_codes = config.final_state_symbols;
        fsymbol_codes.shuffle(rng);
        Self::new(config.initial_state_symbols, colors, fsymbol_codes)
    }

    /// Rebuilds a participant's counterbalanced model. No randomness.
    ///
    /// Colors come from `transition1`/`transition2`; each color's symbol pair
    /// is stored as a two-digit number (`34` → `(3, 4)`).
    pub fn load(config: &TaskConfig, participant: &ParticipantConfig) -> Result<Self> {
        let colors = [
            participant.transition1.clone(),
            participant.transition2.clone(),
        ];
        let mut fsymbol_codes = [[0; 2]; 2];
        for (slot, color) in fsymbol_codes.iter_mut().zip(colors.iter()) {
            let packed = participant.symbols.get(color).ok_or_else(|| {
                Error::config(format!(
                    "participant {} has no symbols for color '{color}'",
                    participant.participant
                ))
            })?;
            *slot = unpack_symbols(*packed)?;
        }
        for color in &colors {
            if !config.final_state_colors.contains(color) {
                return Err(Error::config(format!(
                    "color '{color}' is not a final state color of this task"
                )));
            }
        }
        check_symbol_pairs(config, &fsymbol_codes).map_err(|msg| {
            Error::config(format!("participant {}: {msg}", participant.participant))
        })?;
        Ok(Self::new(config.initial_state_symbols, colors, fsymbol_codes))
    }

    /// The two paths for this transition type. Cheap to call again; each call
    /// starts from the first path.
    pub fn get_paths(&self, common: bool) -> impl Iterator<Item = Path<'_>> + '_ {
        (0..2).map(move |i| {
            let j = if common { i } else { 1 - i };
            Path {
                isymbol: self.isymbol_codes[i],
                color: &self.colors[j],
                fsymbols: self.fsymbol_codes[j],
            }
        })
    }

    /// Color reached from each initial symbol under a common transition.
    pub fn common_colors(&self) -> BTreeMap<SymbolCode, &str> {
        self.get_paths(true).map(|p| (p.isymbol, p.color)).collect()
    }

    pub fn colors(&self) -> &[String; 2] {
        &self.colors
    }
}

impl fmt::Display for TransitionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Common transitions: ")?;
        for path in self.get_paths(true) {
            write!(
                f,
                "{} -> {} -> ({}, {}); ",
                path.isymbol, path.color, path.fsymbols[0], path.fsymbols[1]
            )?;
        }
        Ok(())
    }
}

/// The pairs must be the task's final symbol pairs, each used once, in any
/// order within a pair.
fn check_symbol_pairs(
    config: &TaskConfig,
    pairs: &[[SymbolCode; 2]; 2],
) -> std::result::Result<(), String> {
    let sorted = |[a, b]: [SymbolCode; 2]| if a <= b { [a, b] } else { [b, a] };
    let mut expected: Vec<_> = config.final_state_symbols.iter().map(|&p| sorted(p)).collect();
    for &pair in pairs {
        let pos = expected
            .iter()
            .position(|&e| e == sorted(pair))
            .ok_or_else(|| {
                format!(
                    "symbol pair ({}, {}) is not an unused final symbol pair of this task",
                    pair[0], pair[1]
                )
            })?;
        expected.swap_remove(pos);
    }
    Ok(())
}

fn unpack_symbols(packed: u32) -> Result<[SymbolCode; 2]> {
    if !(10..100).contains(&packed) {
        return Err(Error::config(format!(
            "symbol pair {packed} is not a two-digit code"
        )));
    }
    Ok([(packed / 10) as SymbolCode, (packed % 10) as SymbolCode])
}

/// One row of the counterbalancing sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantConfig {
    pub participant: String,
    pub condition: String,
    /// Color commonly reached from the first initial symbol
    pub transition1: String,
    /// Color commonly reached from the second initial symbol
    pub transition2: String,
    /// Two-digit symbol pair per color (`symbols_<color>` columns)
    pub symbols: BTreeMap<String, u32>,
}

impl ParticipantConfig {
    fn from_row(row: &RowRef<'_>, colors: &[String; 2]) -> Result<Self> {
        let mut symbols = BTreeMap::new();
        for color in colors {
            symbols.insert(color.clone(), row.parse(&format!("symbols_{color}"))?);
        }
        Ok(Self {
            participant: row.get("participant")?.to_string(),
            condition: row.get("condition")?.to_string(),
            transition1: row.get("transition1")?.to_string(),
            transition2: row.get("transition2")?.to_string(),
            symbols,
        })
    }

    /// Reads every row of a counterbalancing sheet.
    pub fn read_all(table: &Table, config: &TaskConfig) -> Result<Vec<Self>> {
        table
            .rows()
            .map(|row| Self::from_row(&row, &config.final_state_colors))
            .collect()
    }

    /// Row for one participant; unknown IDs are a configuration error.
    pub fn find(table: &Table, config: &TaskConfig, participant: &str) -> Result<Self> {
        Self::read_all(table, config)?
            .into_iter()
            .find(|p| p.participant == participant)
            .ok_or_else(|| Error::config(format!("invalid participant ID '{participant}'")))
    }
}
