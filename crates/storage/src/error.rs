use chrono::{DateTime, Utc};
use thiserror::Error;

use metronome_core::CoreError;

/// PostgreSQL `check_violation`, raised when no partition accepts a row.
const PG_CHECK_VIOLATION: &str = "23514";
/// PostgreSQL `duplicate_table`.
const PG_DUPLICATE_TABLE: &str = "42P07";
/// PostgreSQL `undefined_table`.
const PG_UNDEFINED_TABLE: &str = "42P01";
/// PostgreSQL `unique_violation`.
const PG_UNIQUE_VIOLATION: &str = "23505";
/// PostgreSQL `lock_not_available`.
const PG_LOCK_NOT_AVAILABLE: &str = "55P03";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A write addressed a timestamp that no provisioned partition covers.
    #[error("no partition of stream '{stream}' covers {timestamp}")]
    NoPartition {
        stream: String,
        timestamp: DateTime<Utc>,
    },

    /// Registry and physical partitions disagree; the transaction was rolled back.
    #[error("partition integrity violation: {0}")]
    Integrity(String),

    #[error("unknown stream '{0}'")]
    UnknownStream(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    InvalidInput(#[from] CoreError),
}

impl StoreError {
    /// Errors worth retrying on the next scheduler tick.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
                    | sqlx::Error::Protocol(_)
            ) || pg_code(e).is_some_and(|code| {
                // Class 40 covers serialization failures and deadlocks.
                code.starts_with("40") || code == PG_LOCK_NOT_AVAILABLE
            }),
            Self::Unavailable(_) => true,
            _ => false,
        }
    }

    /// Caller mistakes, reported synchronously rather than logged as failures.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

fn pg_code(e: &sqlx::Error) -> Option<String> {
    match e {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}

/// Map a failed partition creation. A duplicate table or registry row means
/// the registry and the catalog have drifted apart.
pub(crate) fn map_create_error(e: sqlx::Error, stream: &str, partition: &str) -> StoreError {
    match pg_code(&e).as_deref() {
        Some(PG_DUPLICATE_TABLE) | Some(PG_UNIQUE_VIOLATION) => StoreError::Integrity(format!(
            "partition '{partition}' already exists but is not registered"
        )),
        Some(PG_UNDEFINED_TABLE) => StoreError::UnknownStream(stream.to_string()),
        _ => StoreError::Database(e),
    }
}

/// Map a failed partition drop. A missing table behind a registry row is an
/// integrity violation, not an unknown stream.
pub(crate) fn map_drop_error(e: sqlx::Error, stream: &str, partition: &str) -> StoreError {
    match pg_code(&e).as_deref() {
        Some(PG_UNDEFINED_TABLE) => StoreError::Integrity(format!(
            "partition '{partition}' is registered but missing from stream '{stream}'"
        )),
        _ => StoreError::Database(e),
    }
}

/// Whether an insert failed because no partition covers the row.
pub(crate) fn is_missing_partition(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some(PG_CHECK_VIOLATION)
                && db.message().contains("no partition of relation")
        }
        _ => false,
    }
}

/// Whether a statement failed because the stream's parent relation is missing.
pub(crate) fn is_undefined_table(e: &sqlx::Error) -> bool {
    pg_code(e).as_deref() == Some(PG_UNDEFINED_TABLE)
}
