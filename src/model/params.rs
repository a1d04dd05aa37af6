//! Parameters of the hybrid model.

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::table::RowRef;

/// Column names used in parameter tables, in vector order.
pub const PARAM_NAMES: [&str; 7] = ["alpha1", "alpha2", "lmbd", "beta1", "beta2", "p", "w"];

/// Free parameters of the hybrid model-based/model-free learner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridParams {
    /// First-stage learning rate
    pub alpha1: f64,
    /// Second-stage learning rate
    pub alpha2: f64,
    /// Eligibility trace passing the second-stage RPE back to stage one
    #[serde(alias = "lmbd")]
    pub lambda: f64,
    /// First-stage inverse temperature
    pub beta1: f64,
    /// Second-stage inverse temperature
    pub beta2: f64,
    /// Perseveration bias
    pub p: f64,
    /// Model-based weight, in [0, 1]
    pub w: f64,
}

impl HybridParams {
    /// Group estimates reported by Daw et al. (2011), with an even mixture.
    pub const DAW_2011: HybridParams = HybridParams {
        alpha1: 0.70,
        alpha2: 0.40,
        lambda: 0.63,
        beta1: 4.23,
        beta2: 2.95,
        p: 0.17,
        w: 0.5,
    };

    pub fn to_vec(&self) -> [f64; 7] {
        [
            self.alpha1,
            self.alpha2,
            self.lambda,
            self.beta1,
            self.beta2,
            self.p,
            self.w,
        ]
    }

    /// # Panics
    /// Panics if `values` does not hold exactly 7 entries.
    pub fn from_slice(values: &[f64]) -> Self {
        assert_eq!(values.len(), 7, "hybrid model has 7 parameters");
        Self {
            alpha1: values[0],
            alpha2: values[1],
            lambda: values[2],
            beta1: values[3],
            beta2: values[4],
            p: values[5],
            w: values[6],
        }
    }

    /// Same parameters with a different mixture weight.
    pub fn with_w(self, w: f64) -> Self {
        Self { w, ..self }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.to_vec().iter().all(|v| v.is_finite()) {
            return Err(Error::config(format!("non-finite parameter in {self:?}")));
        }
        if !(0.0..=1.0).contains(&self.w) {
            return Err(Error::OutOfRange {
                value: self.w,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(())
    }

    /// Reads the `alpha1 … w` columns of a parameter table row.
    pub fn from_row(row: &RowRef<'_>) -> Result<Self> {
        let mut values = [0.0; 7];
        for (value, name) in values.iter_mut().zip(PARAM_NAMES) {
            *value = row.parse(name)?;
        }
        let params = Self::from_slice(&values);
        params.validate()?;
        Ok(params)
    }

    pub fn to_fields(&self) -> Vec<String> {
        self.to_vec().iter().map(f64::to_string).collect()
    }
}

impl Default for HybridParams {
    fn default() -> Self {
        Self::DAW_2011
    }
}

/// Search interval of every parameter during fitting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamBounds {
    pub learning_rate: (f64, f64),
    pub inverse_temperature: (f64, f64),
    pub perseveration: (f64, f64),
}

impl Default for ParamBounds {
    fn default() -> Self {
        Self {
            learning_rate: (0.0, 1.0),
            inverse_temperature: (0.0, 20.0),
            perseveration: (-5.0, 5.0),
        }
    }
}

impl ParamBounds {
    /// Bounds in [`PARAM_NAMES`] order; `lambda` and `w` share the unit interval.
    pub fn as_array(&self) -> [(f64, f64); 7] {
        let unit = (0.0, 1.0);
        [
            self.learning_rate,
            self.learning_rate,
            unit,
            self.inverse_temperature,
            self.inverse_temperature,
            self.perseveration,
            unit,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;

    #[test]
    fn test_vec_roundtrip() {
        let params = HybridParams::DAW_2011.with_w(0.3);
        assert_eq!(HybridParams::from_slice(&params.to_vec()), params);
    }

    #[test]
    fn test_from_row_uses_lmbd_column() {
        let table = Table::parse(
            "participant,condition,alpha1,alpha2,lmbd,beta1,beta2,p,w\n\
             7,story,0.5,0.4,0.3,3.0,2.0,0.1,0.8\n",
        )
        .unwrap();
        let params = HybridParams::from_row(&table.rows().next().unwrap()).unwrap();
        assert_eq!(params.lambda, 0.3);
        assert_eq!(params.w, 0.8);
    }

    #[test]
    fn test_w_outside_unit_interval_rejected() {
        assert!(HybridParams::DAW_2011.with_w(1.2).validate().is_err());
        assert!(HybridParams::DAW_2011.with_w(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_json_accepts_lmbd_alias() {
        let json = r#"{"alpha1":0.7,"alpha2":0.4,"lmbd":0.63,"beta1":4.23,"beta2":2.95,"p":0.17,"w":0.5}"#;
        let params: HybridParams = serde_json::from_str(json).unwrap();
        assert_eq!(params, HybridParams::DAW_2011);
    }
}
