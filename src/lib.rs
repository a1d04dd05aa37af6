//! Two-stage decision task: trial generation, hybrid model-based/model-free
//! reinforcement learning, and maximum-likelihood fitting.

// Core modules
pub mod consts;
mod errors;
pub mod table;

// Task and model
pub mod model;
pub mod task;

// Data handling and estimation
pub mod analysis;
pub mod dataset;
pub mod fitting;

// Application surface
pub mod config;
pub mod logging;


// Re-exports
pub use errors::{Error, ParseError, Result};
pub use model::{calculate_prediction_errors, HybridModel, HybridParams, ObservedTrial, TrialPredictors};
pub use task::{RewardProbability, TaskConfig, TransitionModel, Trial, TrialSequence};
