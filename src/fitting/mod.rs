//! Parameter estimation for the hybrid model.

pub mod cma_es;
pub mod mle;

pub use cma_es::{Bound, CmaEs, Optimum};
pub use mle::{fit, param_table_columns, write_fit_results, FitResult, FitVariant, FittingConfig};
