use thiserror::Error;

/// Row/field level parsing failures in tabular input
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("missing column '{0}'")]
    MissingColumn(String),
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("invalid value '{value}' for column '{column}'")]
    InvalidValue { column: String, value: String },
    #[error("empty input")]
    Empty,
}

/// Main crate error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration missing or inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed input row (1-based line number)
    #[error("Parse error at line {line}: {kind}")]
    Parse { line: usize, kind: ParseError },

    /// Trial record violating the model's input domain
    #[error("Invalid trial: {0}")]
    InvalidTrial(String),

    /// Merged data sources disagree about participants or trials
    #[error("Alignment error: {0}")]
    Alignment(String),

    /// No fitted parameters for a participant
    #[error("No parameters for participant {0}")]
    MissingParameters(String),

    /// Value outside its allowed interval
    #[error("Value {value} outside [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },

    /// Field that would split or break a row of an unquoted table
    #[error("Field '{0}' contains a comma, quote or line break")]
    UnwritableField(String),

    /// No optimizer attempt converged
    #[error("Optimization did not converge after {attempts} attempts")]
    NotConverged { attempts: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

// Convenience constructors for common error patterns
impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create an alignment error
    pub fn alignment(msg: impl Into<String>) -> Self {
        Error::Alignment(msg.into())
    }

    /// Create an invalid-trial error
    pub fn invalid_trial(msg: impl Into<String>) -> Self {
        Error::InvalidTrial(msg.into())
    }

    /// Create a parse error for a 1-based line
    pub fn parse(line: usize, kind: ParseError) -> Self {
        Error::Parse { line, kind }
    }

    /// Create a parse error for a field that failed to convert
    pub fn invalid_value(line: usize, column: &str, value: &str) -> Self {
        Error::Parse {
            line,
            kind: ParseError::InvalidValue {
                column: column.to_string(),
                value: value.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = Error::invalid_value(3, "choice1", "x");
        assert_eq!(
            err.to_string(),
            "Parse error at line 3: invalid value 'x' for column 'choice1'"
        );
    }

    #[test]
    fn test_out_of_range_display() {
        let err = Error::OutOfRange {
            value: 0.8,
            min: 0.25,
            max: 0.75,
        };
        assert_eq!(err.to_string(), "Value 0.8 outside [0.25, 0.75]");
    }
}
