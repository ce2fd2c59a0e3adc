//! Error taxonomy for the ingestion and query pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used across the library.
pub type Result<T> = std::result::Result<T, CovidError>;

#[derive(Debug, Error)]
pub enum CovidError {
    /// Remote fetch failed or returned a non-success status.
    #[error("source '{source_name}' is unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    /// A local-only reference file is absent and cannot be fetched.
    #[error("required reference file not found: {}", .0.display())]
    MissingReferenceFile(PathBuf),

    #[error("state '{0}' not found")]
    StateNotFound(String),

    #[error("state '{state}' has no data for period {period}")]
    PeriodNotFound { state: String, period: u8 },

    /// State code outside the fixed two-letter enumeration.
    #[error("unknown state code '{0}'")]
    UnknownState(String),

    #[error("no states loaded")]
    EmptyStore,

    #[error("invalid period {0}, expected a month number 1-12")]
    InvalidPeriod(u8),

    #[error("invalid sort key '{0}', expected one of population, median_age, state")]
    InvalidSortKey(String),

    #[error("invalid aggregation '{0}', expected one of total, max, all")]
    InvalidAggregation(String),

    #[error("{source_name}: missing column '{column}'")]
    MissingColumn { source_name: String, column: String },

    #[error("{source_name}: line {line}: malformed {column} value '{value}'")]
    MalformedValue {
        source_name: String,
        line: u64,
        column: String,
        value: String,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
