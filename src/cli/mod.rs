//! Command-line front end.
//!
//! Argument definitions live here. Each subcommand is handled in
//! [`commands`], playback in [`player`].

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::library::{CollectionKind, LibraryColumn, SortOrder, TreeSortRole};

pub mod commands;
pub mod player;

pub use commands::run;

/// A music library and player.
#[derive(Parser, Debug)]
#[command(name = "tunedeck", version, about)]
pub struct Cli {
    /// Settings file to use instead of the default one.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Library database to use instead of the configured one.
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import audio files, skipping ones already in the library.
    Import {
        /// Files or directories. Defaults to the configured library directories.
        paths: Vec<PathBuf>,
    },
    /// Clear the library and import everything again.
    Reset {
        /// Files or directories. Defaults to the configured library directories.
        paths: Vec<PathBuf>,
    },
    /// Rebuild the library views and the search index.
    Refresh,
    /// Search tracks, albums and artists.
    Search {
        query: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// List tracks of the library or of a collection.
    Library(LibraryArgs),
    /// List albums.
    Albums {
        /// Only albums whose name contains this text.
        #[arg(long)]
        filter: Option<String>,
    },
    /// List artists.
    Artists {
        /// Only artists whose name contains this text.
        #[arg(long)]
        filter: Option<String>,
    },
    /// Manage folders and playlists.
    #[command(subcommand)]
    Collections(CollectionsCommand),
    /// Play tracks with the configured player.
    Play(PlayArgs),
    /// Download with the configured ripper, then import the result.
    Download {
        url: String,
        /// Leave the downloaded files alone.
        #[arg(long)]
        no_import: bool,
    },
    /// Show or change settings.
    Settings {
        #[command(subcommand)]
        action: Option<SettingsCommand>,
    },
}

#[derive(Args, Debug)]
pub struct LibraryArgs {
    /// Show this collection and remember it for next time.
    #[arg(long, conflicts_with = "all")]
    pub collection: Option<i64>,
    /// Show the whole library and forget the remembered collection.
    #[arg(long)]
    pub all: bool,
    /// Sort by this column and remember it.
    #[arg(long, value_enum)]
    pub sort: Option<ColumnArg>,
    /// Sort direction, remembered with the column.
    #[arg(long, value_enum)]
    pub order: Option<OrderArg>,
    /// Keep the collection or library order and forget the sort column.
    #[arg(long, conflicts_with = "sort")]
    pub unsorted: bool,
}

#[derive(Subcommand, Debug)]
pub enum CollectionsCommand {
    /// Print the collection tree.
    Tree {
        /// Sort by this role. Picking the current role again flips the order.
        #[arg(long, value_enum)]
        sort: Option<TreeSortArg>,
        /// Only collections with a word starting with this text, flattened.
        #[arg(long)]
        filter: Option<String>,
    },
    /// Create a folder or playlist.
    Create {
        #[arg(value_enum)]
        kind: KindArg,
        name: String,
        /// Parent folder.
        #[arg(long)]
        parent: Option<i64>,
    },
    /// Rename a collection.
    Rename { id: i64, name: String },
    /// Move a collection into a folder, or to the top level without `--parent`.
    Move {
        id: i64,
        #[arg(long)]
        parent: Option<i64>,
    },
    /// Delete a collection and everything inside it.
    Delete { id: i64 },
    /// Add tracks to a playlist.
    Add {
        id: i64,
        #[arg(required = true)]
        music_ids: Vec<i64>,
        /// Insert at this position instead of appending.
        #[arg(long)]
        at: Option<usize>,
    },
    /// Remove tracks from a playlist.
    Remove {
        id: i64,
        #[arg(required = true)]
        music_ids: Vec<i64>,
    },
    /// Show a collection with its contents.
    Show { id: i64 },
}

#[derive(Args, Debug)]
pub struct PlayArgs {
    /// Play a collection (a folder plays everything below it).
    #[arg(long, group = "source")]
    pub collection: Option<i64>,
    /// Play an album.
    #[arg(long, group = "source")]
    pub album: Option<i64>,
    /// Play everything by an artist.
    #[arg(long, group = "source")]
    pub artist: Option<i64>,
    /// Play these tracks. With no source at all, plays the whole library.
    #[arg(group = "source")]
    pub music_ids: Vec<i64>,
    /// Position of the first track to play.
    #[arg(long, default_value_t = 0)]
    pub start: usize,
    /// Start with shuffle on.
    #[arg(long)]
    pub shuffle: bool,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Print the settings.
    Show,
    /// Add a library directory.
    AddLibrary { directory: PathBuf },
    /// Remove a library directory.
    RemoveLibrary { directory: PathBuf },
    /// Set the player command. The track path is appended.
    Player {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Set the ripper command. The URL is appended.
    Ripper {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnArg {
    Title,
    Album,
    Artists,
    Duration,
    Added,
    Released,
}

impl From<ColumnArg> for LibraryColumn {
    fn from(value: ColumnArg) -> Self {
        match value {
            ColumnArg::Title => Self::Title,
            ColumnArg::Album => Self::Album,
            ColumnArg::Artists => Self::Artists,
            ColumnArg::Duration => Self::Duration,
            ColumnArg::Added => Self::DateAdded,
            ColumnArg::Released => Self::ReleaseDate,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderArg {
    Asc,
    Desc,
}

impl From<OrderArg> for SortOrder {
    fn from(value: OrderArg) -> Self {
        match value {
            OrderArg::Asc => Self::Ascending,
            OrderArg::Desc => Self::Descending,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeSortArg {
    Updated,
    Played,
    Alphabetical,
}

impl From<TreeSortArg> for TreeSortRole {
    fn from(value: TreeSortArg) -> Self {
        match value {
            TreeSortArg::Updated => Self::Updated,
            TreeSortArg::Played => Self::Played,
            TreeSortArg::Alphabetical => Self::Alphabetical,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindArg {
    Folder,
    Playlist,
}

impl From<KindArg> for CollectionKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Folder => Self::Folder,
            KindArg::Playlist => Self::Playlist,
        }
    }
}
