//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for sigtrader.
#[derive(Debug, thiserror::Error)]
pub enum SigtraderError {
    #[error("invalid input {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("unknown signal: {name}")]
    UnknownSignal { name: String },

    #[error("no trading dates with price and signal coverage between {start} and {end}")]
    NoCommonRange { start: NaiveDate, end: NaiveDate },

    #[error("range too large: {dates} trading dates exceeds limit of {limit}")]
    RangeTooLarge { dates: usize, limit: usize },

    #[error("time budget exceeded after {elapsed_ms}ms (budget {budget_ms}ms)")]
    TimeBudgetExceeded { elapsed_ms: u128, budget_ms: u128 },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SigtraderError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        SigtraderError::InvalidInput {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&SigtraderError> for std::process::ExitCode {
    fn from(err: &SigtraderError) -> Self {
        let code: u8 = match err {
            SigtraderError::Io(_) | SigtraderError::Json(_) => 1,
            SigtraderError::ConfigParse { .. }
            | SigtraderError::ConfigMissing { .. }
            | SigtraderError::ConfigInvalid { .. }
            | SigtraderError::InvalidInput { .. }
            | SigtraderError::UnknownSignal { .. } => 2,
            SigtraderError::DataSource { .. }
            | SigtraderError::Database { .. }
            | SigtraderError::DatabaseQuery { .. } => 3,
            SigtraderError::NoCommonRange { .. } => 5,
            SigtraderError::RangeTooLarge { .. } | SigtraderError::TimeBudgetExceeded { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
