//! Domain-specific error types using `thiserror`.
//!
//! This module defines the main error enums for the two domains of the
//! player core: the music library (database, import, collections) and
//! playback (queue control and the external player backend).

use std::{io::Error as IoError, result::Result as StdResult};

use {anyhow::Error, sqlx::Error as SqlxError, thiserror::Error};

use crate::library::{importer::MetadataError, schema::SchemaError};

/// Library-related errors.
#[derive(Error, Debug)]
pub enum LibraryError {
    /// Database connection or query error.
    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),
    /// Schema initialization error.
    #[error("Schema error: {0}")]
    SchemaError(#[from] SchemaError),
    /// Tag extraction error.
    #[error("Metadata error: {0}")]
    MetadataError(#[from] MetadataError),
    /// Filesystem error while importing or writing artwork.
    #[error("IO error: {0}")]
    IoError(#[from] IoError),
    /// Invalid file path or metadata.
    #[error("Invalid data: {reason}")]
    InvalidData { reason: String },
    /// Record not found.
    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: i64 },
    /// The collection is protected against edits.
    #[error("Collection {id} is protected")]
    ProtectedCollection { id: i64 },
    /// The operation does not apply to the target.
    #[error("Invalid operation: {reason}")]
    InvalidOperation { reason: String },
}

impl LibraryError {
    /// Shorthand for a missing record.
    pub fn not_found(entity: &str, id: i64) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id,
        }
    }

    /// Returns `true` if the database rejected a write for a dangling reference.
    #[must_use]
    pub fn is_foreign_key_violation(&self) -> bool {
        match self {
            Self::DatabaseError(e) => e
                .as_database_error()
                .is_some_and(|db| db.is_foreign_key_violation()),
            _ => false,
        }
    }

    /// Returns `true` if the database rejected a write for a duplicate key.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::DatabaseError(e) => e
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation()),
            _ => false,
        }
    }
}

/// Playback-related errors.
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// The external player could not be started or stopped.
    #[error("Player process error: {0}")]
    ProcessError(#[from] IoError),
    /// No player command is configured.
    #[error("No player command configured")]
    NoPlayerCommand,
    /// The queue has nothing to play.
    #[error("Queue is empty")]
    EmptyQueue,
    /// Queue position out of range.
    #[error("Queue position {position} out of range (len {len})")]
    OutOfRange { position: usize, len: usize },
    /// The queue manager is gone.
    #[error("Queue manager stopped")]
    Disconnected,
    /// The player gave up on a track.
    #[error("Player exited with {status}")]
    PlayerFailed { status: String },
}

/// Operational error context propagation with `anyhow`.
///
/// This type is used for operational errors that need rich context
/// but don't require specific handling logic.
pub type Result<T> = StdResult<T, Error>;
