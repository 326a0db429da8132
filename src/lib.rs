//! tunedeck - a music library and player core.
//!
//! Audio files are imported into a SQLite library with albums, artists,
//! timed lyrics and a trigram search index. Tracks are organised into a
//! tree of folders and playlists and played through an external player
//! command, driven by a queue with shuffle and repeat.

pub mod cli;
pub mod config;
pub mod downloader;
pub mod error;
pub mod library;
pub mod playback;
pub mod state;

// Re-export key types for convenience
pub use {
    config::{SettingsManager, UserSettings},
    downloader::{DownloadError, Downloader},
    error::{LibraryError, PlaybackError},
    library::{
        Album, Artist, Collection, CollectionKind, LibraryDatabase, LibraryMusic, MusicImporter,
        SearchResults,
    },
    playback::{CommandBackend, PlayQueue, QueueEntry, QueueManager, RepeatState},
    state::{AppState, AppStateEvent, LibraryState, PlaybackState},
};
