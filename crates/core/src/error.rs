use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

/// Caller-input errors. These are rejected before any storage is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid stream name '{name}': {reason}")]
    InvalidStreamName { name: String, reason: &'static str },

    #[error("unsupported date_trunc '{0}': must be one of: {allowed}", allowed = crate::query::DATE_TRUNC_VALUES.join(", "))]
    InvalidDateTrunc(String),

    #[error("invalid order_by '{0}': expected 'timestamp' or 'value', optionally followed by 'asc'/'desc' or prefixed with '-'")]
    InvalidOrderBy(String),

    #[error("invalid time range: from {from} is after to {to}")]
    InvalidRange { from: DateTime<Utc>, to: DateTime<Utc> },

    #[error("date {0} is outside the supported calendar range")]
    DateOutOfRange(NaiveDate),
}
