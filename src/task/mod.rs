//! The two-stage task itself.
//!
//! Bottom-up: drifting [`RewardProbability`] values, the symbols and states
//! built from them, the [`TransitionModel`] wiring initial symbols to final
//! states, the [`TrialSequence`] generator, and finally the session runner
//! that turns responses into [`TrialRecord`] rows.

pub mod config;
pub mod record;
pub mod reward_probability;
pub mod schedule;
pub mod session;
pub mod simulate;
pub mod symbols;
pub mod transition;
pub mod trial;

pub use config::TaskConfig;
pub use record::{code_to_bin, RecordWriter, Response, TrialRecord, CSV_COLUMNS};
pub use reward_probability::RewardProbability;
pub use schedule::{money_reward, parse_itis, read_itis, BlockSchedule};
pub use session::{run_session, run_trial, Participant, SessionSummary};
pub use simulate::{ResponseModel, SimulatedParticipant};
pub use symbols::{FinalState, FinalSymbol, InitialSymbol, Side, State, SymbolCode, SymbolName};
pub use transition::{ParticipantConfig, Path, TransitionModel};
pub use trial::{Trial, TrialSequence};
