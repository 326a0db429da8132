//! Library import coordinator.
//!
//! Walks source directories, reads tags from every supported audio file,
//! inserts new tracks, stores album covers, then refreshes the search
//! views and the Downloaded Songs playlist.

use std::{
    fmt,
    fs::read_dir,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::{
    error::domain::LibraryError,
    library::{
        database::LibraryDatabase,
        importer::handlers::{read_track, write_album_cover},
    },
};

mod config;
pub mod handlers;

pub use {
    config::{ImporterConfig, SUPPORTED_AUDIO_EXTENSIONS},
    handlers::{MetadataError, parse_release_date},
};

/// Outcome of an import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportReport {
    /// Tracks added to the library.
    pub imported: usize,
    /// Files whose path was already in the library.
    pub skipped: usize,
    /// Files that could not be read or inserted.
    pub failed: usize,
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} imported, {} already present, {} failed",
            self.imported, self.skipped, self.failed
        )
    }
}

/// Imports audio files into a [`LibraryDatabase`].
#[derive(Debug, Clone, Default)]
pub struct MusicImporter {
    config: ImporterConfig,
}

impl MusicImporter {
    /// Creates an importer with the given configuration.
    #[must_use]
    pub fn new(config: ImporterConfig) -> Self {
        Self { config }
    }

    /// Gets the importer configuration.
    #[must_use]
    pub fn config(&self) -> &ImporterConfig {
        &self.config
    }

    /// Imports every supported file under `paths`.
    ///
    /// Each entry may be a directory (walked recursively) or a single file.
    /// Files already in the library are skipped. Files that fail to parse
    /// or insert are logged and counted, the rest of the batch continues.
    ///
    /// # Arguments
    ///
    /// * `database` - Library to import into.
    /// * `paths` - Source files and directories.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` only if the final view refresh or the
    /// playlist sync fails.
    pub async fn import_paths(
        &self,
        database: &LibraryDatabase,
        paths: &[PathBuf],
    ) -> Result<ImportReport, LibraryError> {
        let mut report = ImportReport::default();
        let mut files = Vec::new();
        for path in paths {
            if path.is_dir() {
                files.extend(self.collect_audio_files(path));
            } else if path.is_file() {
                files.push(path.clone());
            } else {
                warn!("Import source {:?} does not exist", path);
                report.failed += 1;
            }
        }
        files.sort();
        files.dedup();

        info!("Importing {} files", files.len());
        for file in &files {
            match self.import_file(database, file).await {
                Ok(true) => report.imported += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    warn!("Failed to import {:?}: {}", file, e);
                    report.failed += 1;
                }
            }
        }

        database.refresh_views().await?;
        database.ensure_downloaded_playlist().await?;

        info!("Import finished: {}", report);
        Ok(report)
    }

    /// Imports one file. Returns `false` if its path was already known.
    async fn import_file(&self, database: &LibraryDatabase, path: &Path) -> Result<bool, LibraryError> {
        if database.contains_path(path).await? {
            debug!("Skipping known file {:?}", path);
            return Ok(false);
        }

        let music = read_track(path)?;
        let inserted = database.insert_music(&music).await?;

        if inserted.album_created
            && let Some(cover) = &music.cover
        {
            // The track is committed by now; a cover problem only costs the cover.
            match write_album_cover(&self.config.artwork_directory, inserted.album_id, cover) {
                Ok(img_path) => {
                    if let Err(e) = database.set_album_img_path(inserted.album_id, &img_path).await {
                        warn!(
                            album_id = inserted.album_id,
                            "Failed to record album cover {}: {}", img_path, e
                        );
                    }
                }
                Err(e) => warn!(
                    album_id = inserted.album_id,
                    "Failed to write album cover: {}", e
                ),
            }
        }
        Ok(true)
    }

    /// Recursively collects supported audio files under `dir_path`.
    ///
    /// Unreadable directories are logged and skipped.
    pub fn collect_audio_files(&self, dir_path: &Path) -> Vec<PathBuf> {
        let mut audio_files = Vec::new();

        let entries = match read_dir(dir_path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read directory {:?}: {}", dir_path, e);
                return audio_files;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                audio_files.extend(self.collect_audio_files(&path));
            } else if path.is_file() && self.config.is_supported(&path) {
                audio_files.push(path);
            }
        }

        audio_files
    }
}
