//! Error types for GaMD reweighting.
//!
//! Every fatal condition of a run is reported through [`ReweightError`] before any
//! output is produced. Numeric degeneracies of an otherwise valid run are not
//! errors; see [`Degeneracy`](crate::stat_mech::reweight::Degeneracy).

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a reweighting run or the ingestion feeding it.
#[derive(Debug, Error)]
pub enum ReweightError {
    /// Rejected configuration (temperature, grid geometry, dimensionality).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Non-finite or missing values in an input column.
    #[error("malformed input in column `{column}` at row {row}: {detail}")]
    MalformedInput {
        /// Column holding the offending value.
        column: String,
        /// Zero-based row within the trajectory.
        row: usize,
        /// Description of the problem.
        detail: String,
    },

    /// Tables that cannot be combined because their columns differ.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A reweighted population that cannot be represented even in log space.
    #[error("numeric overflow in bin {bin:?}: {detail}")]
    NumericOverflow {
        /// Grid coordinates of the bin.
        bin: (usize, usize),
        /// Description of the problem.
        detail: String,
    },

    /// A requested column is not present in the table.
    #[error("column `{0}` not found")]
    MissingColumn(String),

    /// I/O failure while reading an input file.
    #[error("I/O error while reading `{}`: {source}", path.display())]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A log or CV file line that could not be parsed.
    #[error("invalid row in `{}` at line {line}: {detail}", path.display())]
    Parse {
        /// File being parsed.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// Description of the problem.
        detail: String,
    },

    /// Configuration file is not valid JSON for [`ReweightConfig`](crate::config::ReweightConfig).
    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReweightError {
    /// Creates an [`InvalidConfiguration`](ReweightError::InvalidConfiguration) error.
    pub fn invalid_config(detail: impl Into<String>) -> Self {
        Self::InvalidConfiguration(detail.into())
    }

    /// Creates a [`MalformedInput`](ReweightError::MalformedInput) error.
    pub fn malformed(column: impl Into<String>, row: usize, detail: impl Into<String>) -> Self {
        Self::MalformedInput {
            column: column.into(),
            row,
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReweightError>;
