//! Hybrid reinforcement-learning model of two-stage choices.
//!
//! - [`params`]: the seven free parameters and their fitting bounds
//! - [`hybrid`]: trial-by-trial value tables, RPEs and action values
//! - [`likelihood`]: choice log-likelihood used by the fitter

pub mod hybrid;
pub mod likelihood;
pub mod params;

pub use hybrid::{
    action1_value_derivative, calculate_prediction_errors, sigmoid, Choice, HybridModel,
    ObservedTrial, TrialPredictors,
};
pub use likelihood::{choice_log_likelihood, log_likelihood, log_sigmoid, ChoiceLogLikelihood};
pub use params::{HybridParams, ParamBounds, PARAM_NAMES};
