//! Music library management system.
//!
//! This module provides the foundation for managing a music library,
//! including database operations, data models, schema management,
//! collections (folders and playlists), and importing files from disk.

pub mod collection_tree;
pub mod collections;
pub mod database;
pub mod importer;
pub mod lyrics;
pub mod models;
pub mod schema;
pub mod summary;


pub use {
    collection_tree::{CollectionTree, TreeSortRole, TreeView},
    collections::DOWNLOADED_SONGS_PLAYLIST,
    database::{InsertedMusic, LibraryDatabase},
    importer::{ImportReport, ImporterConfig, MusicImporter},
    lyrics::{LyricLine, Lyrics},
    models::{
        Album, Artist, Collection, CollectionEntry, CollectionKind, CoverArt, LibraryColumn,
        LibraryMusic, LibrarySort, Music, MusicCredit, NewMusic, SearchResults, SortOrder,
    },
    schema::{CURRENT_SCHEMA_VERSION, SchemaError, SchemaManager, create_connection_pool},
};
