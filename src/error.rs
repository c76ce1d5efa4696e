//! Error types for holdings_rs
//!
//! Only a malformed dataset is fatal. Lookup misses resolve to fallback values
//! and logo failures resolve to a placeholder image, so neither is represented
//! as an error that reaches the caller.

use thiserror::Error;

/// A quarter label that is not of the form `YYYY Q1` .. `YYYY Q4`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid quarter label '{0}', expected \"YYYY Q1\" through \"YYYY Q4\"")]
pub struct InvalidQuarterError(pub String);

/// Errors raised while loading the raw rows and lookup tables.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in {what}: {source}")]
    Parse {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    InvalidQuarter(#[from] InvalidQuarterError),

    #[error("Row {index} ({ticker}): {field} is out of range, got {value}")]
    OutOfRange {
        index: usize,
        ticker: String,
        field: &'static str,
        value: f64,
    },
}

/// Validation errors for user input on the command line.
///
/// These errors are shown directly to users and should be clear and actionable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Unknown language '{0}', expected one of: en, zh")]
    UnknownLocale(String),

    #[error("Invalid date '{0}', expected YYYY-MM-DD or a quarter such as \"2019 Q4\"")]
    InvalidDate(String),

    #[error("Date range is inverted: {from} is after {to}")]
    InvertedDateRange { from: String, to: String },

    #[error("Unknown tab '{0}', expected one of: composition, stock, sectors, logos")]
    UnknownTab(String),
}

/// Failures while fetching a company logo. Never escapes the `logo` module.
#[derive(Debug, Error)]
pub enum LogoError {
    #[error("No logo domain is known for this ticker")]
    NoDomain,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Logo endpoint answered with status {0}")]
    Status(u16),

    #[error("Logo endpoint returned an empty body")]
    EmptyBody,

    #[error("Logo endpoint returned {0} instead of an image")]
    NotAnImage(String),
}
