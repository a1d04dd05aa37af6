//! Post-fit analyses of behavioural data.

pub mod predictors;
pub mod stay;

pub use predictors::{
    compute_predictors, write_predictors, write_with_events, ParamEntry, ParamSource, ParamTable,
    ParticipantPredictors,
};
pub use stay::{stay_rows, RegressionData, StayRows, StayTable};
