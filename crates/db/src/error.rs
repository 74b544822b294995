//! Typed error type for the db crate.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("stage state record {0} not found")]
    NotFound(Uuid),

    /// The record already carries an end timestamp.
    #[error("stage state record {0} is already finalized")]
    AlreadyFinalized(Uuid),

    #[error("variable snapshot could not be (de)serialised: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing store cannot be reached right now.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
