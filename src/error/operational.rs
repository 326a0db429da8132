//! Operational error context propagation with `anyhow`.
//!
//! The CLI works in `anyhow::Result` and uses [`ResultExt`] to attach the
//! command being run. [`ErrorReporter`] turns the final error chain into a
//! log record and a short line for the terminal.

use std::{error::Error as StdError, fmt::Display};

use {
    anyhow::{Context, Error, Result as AnyhowResult},
    tracing::{error, warn},
};

use crate::{
    downloader::DownloadError,
    error::domain::{LibraryError, PlaybackError},
};

/// Extension trait for enhanced error context.
pub trait ResultExt<T, E> {
    /// Adds context to an error with a static string.
    fn add_context(self, context: &'static str) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static;

    /// Adds context to an error with a formatted string.
    fn add_contextf(self, format: impl Display) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static;
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
    fn add_context(self, context: &'static str) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static,
    {
        self.context(context)
    }

    fn add_contextf(self, format: impl Display) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static,
    {
        self.context(format.to_string())
    }
}

/// Centralized error reporting for the command-line front end.
pub struct ErrorReporter;

impl ErrorReporter {
    /// Logs a recoverable problem, e.g. one file of an import batch.
    pub fn warn(error: &Error, context: &str) {
        warn!(context = context, error = %error, "Recoverable error");
    }

    /// Logs a failure that aborts the current command.
    pub fn error(error: &Error, context: &str) {
        error!(context = context, error = ?error, "Command failed");
    }

    /// Converts an error chain to a one-line message for the terminal.
    ///
    /// Known domain errors anywhere in the chain get a tailored message,
    /// everything else falls back to the outermost context.
    pub fn to_user_message(error: &Error) -> String {
        for cause in error.chain() {
            if let Some(library_error) = cause.downcast_ref::<LibraryError>() {
                match library_error {
                    LibraryError::ProtectedCollection { .. } => {
                        return "This collection is built in and cannot be changed.".to_string();
                    }
                    LibraryError::NotFound { entity, id } => {
                        return format!("No {entity} with id {id}.");
                    }
                    e if e.is_foreign_key_violation() => {
                        return "The referenced album, artist or track does not exist."
                            .to_string();
                    }
                    _ => {}
                }
            }
            if let Some(PlaybackError::NoPlayerCommand) = cause.downcast_ref::<PlaybackError>() {
                return "Set `player_command` in the settings file to enable playback."
                    .to_string();
            }
            if let Some(DownloadError::CommandFailed { stderr, .. }) =
                cause.downcast_ref::<DownloadError>()
            {
                return format!("The download failed: {stderr}");
            }
        }
        error.to_string()
    }
}
