//! Configuration for library imports.

use std::path::{Path, PathBuf};

use crate::config::settings::UserSettings;

/// Audio file extensions the importer picks up when walking directories.
pub const SUPPORTED_AUDIO_EXTENSIONS: &[&str] = &[
    "flac", "mp3", "m4a", "aac", "opus", "ogg", "wav", "aiff", "aif", "mpc", "wv", "ape",
];

/// Configuration for import behavior.
#[derive(Debug, Clone)]
pub struct ImporterConfig {
    /// Extensions (lowercase, no dot) treated as audio files.
    pub extensions: Vec<String>,
    /// Root directory for extracted covers. Album covers go to `albums/`.
    pub artwork_directory: PathBuf,
}

impl ImporterConfig {
    /// Builds a configuration from the user's settings.
    #[must_use]
    pub fn from_settings(settings: &UserSettings) -> Self {
        Self {
            artwork_directory: settings.artwork_directory(),
            ..Self::default()
        }
    }

    /// Returns `true` if `path` has one of the configured extensions.
    #[must_use]
    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| {
                self.extensions
                    .iter()
                    .any(|supported| supported.eq_ignore_ascii_case(extension))
            })
    }
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            extensions: SUPPORTED_AUDIO_EXTENSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
            artwork_directory: UserSettings::default().artwork_directory(),
        }
    }
}
