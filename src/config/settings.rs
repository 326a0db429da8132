//! User preference management with XDG Base Directory compliance.
//!
//! Settings live in a JSON file under the XDG config home. Besides the
//! paths and external commands the player needs, the file persists the
//! last session view: how the collection tree and the library table were
//! sorted and which collection was open.

use std::{
    env::var,
    fs::{create_dir_all, read_to_string, write},
    io::Error as StdError,
    path::PathBuf,
};

use {
    parking_lot::{RwLock, RwLockReadGuard},
    serde::{Deserialize, Serialize},
    serde_json::{Error as SerdeJsonError, from_str, to_string_pretty},
    thiserror::Error,
    tracing::debug,
};

use crate::library::{LibraryColumn, SortOrder, TreeSortRole};

const APP_DIR: &str = "tunedeck";

/// Error type for settings operations.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Failed to read or write settings file.
    #[error("IO error: {0}")]
    IoError(#[from] StdError),
    /// Failed to serialize or deserialize settings.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] SerdeJsonError),
    /// Invalid settings value.
    #[error("Invalid settings value: {reason}")]
    InvalidValue { reason: String },
}

/// Serializable user settings structure with default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    /// Directories scanned by `import` and `reset`.
    pub library_directories: Vec<String>,
    /// Database file (defaults to the XDG data dir).
    pub database_path: Option<String>,
    /// Root for album covers (defaults to the XDG data dir).
    pub artwork_directory: Option<String>,
    /// Where the ripper writes downloads.
    pub download_directory: Option<String>,
    /// External player invoked as `<command...> <file>`.
    pub player_command: Vec<String>,
    /// External ripper invoked as `<command...> <url>`.
    pub ripper_command: Vec<String>,
    /// Sort role of the collection tree.
    pub tree_sort_role: TreeSortRole,
    /// Sort order of the collection tree.
    pub tree_sort_order: SortOrder,
    /// Collection shown in the library table (`None` = whole library).
    pub library_collection_id: Option<i64>,
    /// Sorted column of the library table (`None` = insertion order).
    pub library_sort_column: Option<LibraryColumn>,
    /// Sort order of the library table.
    pub library_sort_order: SortOrder,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            library_directories: vec![],
            database_path: None,
            artwork_directory: None,
            download_directory: None,
            player_command: vec![
                "mpv".to_string(),
                "--no-video".to_string(),
                "--really-quiet".to_string(),
            ],
            ripper_command: vec!["rip".to_string(), "url".to_string()],
            tree_sort_role: TreeSortRole::Alphabetical,
            tree_sort_order: SortOrder::Ascending,
            library_collection_id: None,
            library_sort_column: None,
            library_sort_order: SortOrder::Ascending,
        }
    }
}

impl UserSettings {
    /// Checks values that would only fail much later at use time.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidValue` for blank library directories,
    /// an empty player command, or a player or ripper command without a
    /// program.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.library_directories.iter().any(|d| d.trim().is_empty()) {
            return Err(SettingsError::InvalidValue {
                reason: "library directory must not be blank".to_string(),
            });
        }
        if self.player_command.first().is_none_or(|p| p.trim().is_empty()) {
            return Err(SettingsError::InvalidValue {
                reason: "player command must start with a program".to_string(),
            });
        }
        if self.ripper_command.first().is_some_and(|p| p.trim().is_empty()) {
            return Err(SettingsError::InvalidValue {
                reason: "ripper command must start with a program".to_string(),
            });
        }
        Ok(())
    }

    /// Resolved database file path.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| get_data_dir().join("library.db"))
    }

    /// Resolved artwork root; covers go to `<root>/albums/`.
    #[must_use]
    pub fn artwork_directory(&self) -> PathBuf {
        self.artwork_directory
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| get_data_dir().join("artwork"))
    }

    /// Resolved download directory.
    #[must_use]
    pub fn download_directory(&self) -> PathBuf {
        self.download_directory
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| get_data_dir().join("downloads"))
    }
}

/// Handles loading, saving, and validation of user preferences.
#[derive(Debug)]
pub struct SettingsManager {
    /// Thread-safe user settings storage.
    settings: RwLock<UserSettings>,
    /// Path to the configuration file on disk.
    config_path: PathBuf,
}

impl SettingsManager {
    /// Creates a new settings manager with default config path.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if settings cannot be loaded from disk.
    pub fn new() -> Result<Self, SettingsError> {
        Self::with_config_path(get_config_path())
    }

    /// Creates a new settings manager with a custom config path.
    ///
    /// # Arguments
    ///
    /// * `config_path` - Custom path for the settings file
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if settings cannot be loaded from disk.
    pub fn with_config_path(config_path: PathBuf) -> Result<Self, SettingsError> {
        if let Some(parent) = config_path.parent() {
            create_dir_all(parent)?;
        }

        let settings = if config_path.exists() {
            debug!("Loading settings from existing file: {:?}", config_path);
            let contents = read_to_string(&config_path)?;
            from_str(&contents)?
        } else {
            debug!("No settings file at {:?}, using defaults", config_path);
            UserSettings::default()
        };

        Ok(SettingsManager {
            settings: RwLock::new(settings),
            config_path,
        })
    }

    /// Gets the current settings.
    pub fn get_settings(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.settings.read()
    }

    /// Gets the configuration file path.
    pub fn get_config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Validates, applies and saves new settings.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the settings are invalid or cannot be saved.
    pub fn update_settings(&self, new_settings: UserSettings) -> Result<(), SettingsError> {
        new_settings.validate()?;
        *self.settings.write() = new_settings;
        self.save_settings()
    }

    /// Applies an in-place edit and saves the result.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the edited settings are invalid or cannot be saved.
    pub fn update_with<F>(&self, edit: F) -> Result<(), SettingsError>
    where
        F: FnOnce(&mut UserSettings),
    {
        let mut updated = self.settings.read().clone();
        edit(&mut updated);
        self.update_settings(updated)
    }

    fn save_settings(&self) -> Result<(), SettingsError> {
        debug!("Saving settings to file: {:?}", self.config_path);
        let contents = to_string_pretty(&*self.settings.read())?;
        write(&self.config_path, contents)?;
        Ok(())
    }
}

/// Path of the settings file under the XDG config home.
#[must_use]
pub fn get_config_path() -> PathBuf {
    let mut config_dir = xdg_home("XDG_CONFIG_HOME", ".config");
    config_dir.push(APP_DIR);
    config_dir.push("settings.json");
    config_dir
}

/// Application data directory under the XDG data home.
#[must_use]
pub fn get_data_dir() -> PathBuf {
    let mut data_dir = xdg_home("XDG_DATA_HOME", ".local/share");
    data_dir.push(APP_DIR);
    data_dir
}

/// Resolves an XDG base directory: the variable if set and non-empty,
/// otherwise `$HOME/<fallback>`.
fn xdg_home(variable: &str, fallback: &str) -> PathBuf {
    if let Ok(dir) = var(variable)
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }

    if let Ok(home) = var("HOME") {
        return PathBuf::from(home).join(fallback);
    }

    PathBuf::from(".")
}
