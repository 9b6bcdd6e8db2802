//! # Error Handling
//!
//! Internal error types shared by the repositories, scheduler, and sync engine.
//! Adapter and engine operations never surface these to callers directly; they
//! are converted into failed result values at the contract boundary.

use sea_orm::{DbErr, RuntimeErr};
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use crate::adapters::RegistryError;
use crate::crypto::CryptoError;

/// Errors raised while reading or writing sync state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{context}: {source}")]
    Database {
        context: &'static str,
        #[source]
        source: DbErr,
    },
    #[error("integration {id} not found")]
    IntegrationNotFound { id: Uuid },
    #[error("failed to decrypt integration configuration: {0}")]
    Credentials(#[from] CryptoError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl StoreError {
    /// True when the error means the row simply does not exist (deletion race).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::IntegrationNotFound { .. }
                | StoreError::Database {
                    source: DbErr::RecordNotFound(_) | DbErr::RecordNotUpdated,
                    ..
                }
        )
    }
}

/// Log a database failure with context and wrap it.
pub fn map_db_err(context: &'static str, err: DbErr) -> StoreError {
    error!(error = ?err, context, "Database operation failed");
    StoreError::Database {
        context,
        source: err,
    }
}

/// Detect unique constraint violations across Postgres and SQLite.
pub fn is_unique_violation(err: &DbErr) -> bool {
    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match err {
        DbErr::Exec(runtime) | DbErr::Query(runtime) => runtime,
        _ => return false,
    };

    match runtime_err {
        RuntimeErr::SqlxError(sea_orm::SqlxError::Database(db_err)) => {
            matches!(db_err.code().as_deref(), Some(code) if code == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code))
        }
        _ => false,
    }
}
