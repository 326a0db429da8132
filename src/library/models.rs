//! Data models for the music library database.
//!
//! Row types map one-to-one onto the tables and view tables of
//! [`schema`](crate::library::schema). JSON columns (lyrics, artist arrays)
//! are decoded with `#[sqlx(json)]`.

use std::{fmt, path::PathBuf, str::FromStr};

use {
    chrono::{DateTime, NaiveDate, Utc},
    serde::{Deserialize, Serialize},
    sqlx::FromRow,
};

use crate::{error::domain::LibraryError, library::lyrics::Lyrics};

/// Represents a musical artist in the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, Default)]
pub struct Artist {
    /// Unique database ID.
    pub artist_id: i64,
    /// Artist name.
    pub artist_name: String,
    /// Artist picture, if one was ever stored.
    #[serde(skip)]
    pub artist_img: Option<Vec<u8>>,
}

/// Represents a musical album in the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Album {
    /// Unique database ID.
    pub album_id: i64,
    /// Album title.
    pub album_name: String,
    /// Release date of the first imported track.
    pub release_date: NaiveDate,
    /// Cover path relative to the artwork directory (`albums/<id>.<ext>`).
    pub img_path: Option<String>,
}

/// A row of the `music` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Music {
    /// Unique database ID.
    pub music_id: i64,
    /// Track title.
    pub music_name: String,
    /// Owning album.
    pub album_id: i64,
    /// Timed lyrics.
    #[sqlx(json)]
    pub lyrics_by_timestamp: Lyrics,
    /// Release date.
    pub release_date: NaiveDate,
    /// Duration in seconds.
    pub duration: f64,
    /// International Standard Recording Code (may be empty).
    pub isrc: String,
    /// Absolute path of the audio file.
    pub file_path: String,
    /// When the file landed on disk.
    pub downloaded_on: DateTime<Utc>,
}

/// A row of `library_music_view`: one per track, with album and ordered
/// artist credits folded in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LibraryMusic {
    pub music_id: i64,
    pub music_name: String,
    pub album_id: i64,
    #[sqlx(json)]
    pub lyrics_by_timestamp: Lyrics,
    pub release_date: NaiveDate,
    pub duration: f64,
    pub isrc: String,
    pub file_path: String,
    pub downloaded_on: DateTime<Utc>,
    pub album_name: String,
    pub img_path: Option<String>,
    /// Artist IDs in credit order.
    #[sqlx(json)]
    pub artist_ids: Vec<i64>,
    /// Artist names in credit order.
    #[sqlx(json)]
    pub artist_names: Vec<String>,
    /// `music_name` and `album_name` joined by the unit separator.
    pub search_vector: String,
}

impl LibraryMusic {
    /// Artist names joined for display.
    #[must_use]
    pub fn artists_display(&self) -> String {
        self.artist_names.join(", ")
    }

    /// The audio file as a path.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.file_path)
    }
}

/// A row of `music_view`: one per (track, credited artist).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MusicCredit {
    pub music_id: i64,
    pub music_name: String,
    pub album_name: String,
    pub artist_id: i64,
    pub artist_name: String,
    /// 1-based position of the artist in the credit list.
    pub artist_order: i64,
}

/// The two node kinds of the collection forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    /// Holds other collections, never tracks.
    Folder,
    /// Holds an ordered list of tracks.
    Playlist,
}

impl CollectionKind {
    /// Value stored in `collections.type`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::Playlist => "playlist",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionKind {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "folder" => Ok(Self::Folder),
            "playlist" => Ok(Self::Playlist),
            other => Err(LibraryError::InvalidData {
                reason: format!("unknown collection type '{other}'"),
            }),
        }
    }
}

impl TryFrom<String> for CollectionKind {
    type Error = LibraryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A folder or playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Collection {
    pub collection_id: i64,
    #[sqlx(rename = "type", try_from = "String")]
    pub kind: CollectionKind,
    /// Parent folder, `None` for roots.
    pub parent_collection_id: Option<i64>,
    pub name: String,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub last_played: Option<DateTime<Utc>>,
    /// Custom thumbnail image bytes.
    #[serde(skip)]
    pub thumbnail: Option<Vec<u8>>,
    /// Built-in collections cannot be renamed, moved or deleted.
    pub protected: bool,
}

impl Collection {
    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.kind == CollectionKind::Folder
    }
}

/// A track's membership in a playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CollectionEntry {
    pub collection_id: i64,
    pub music_id: i64,
    pub added_on: DateTime<Utc>,
    pub sort_order: i64,
}

/// Embedded cover art extracted from a file.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverArt {
    pub data: Vec<u8>,
    /// File extension without the dot, e.g. `jpeg`.
    pub extension: String,
}

/// Everything needed to insert one imported track.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMusic {
    pub title: String,
    /// Credited artists in tag order.
    pub artists: Vec<String>,
    pub album: String,
    pub release_date: NaiveDate,
    pub duration: f64,
    pub isrc: String,
    pub file_path: PathBuf,
    pub downloaded_on: DateTime<Utc>,
    pub lyrics: Lyrics,
    pub cover: Option<CoverArt>,
}

/// Search results across tracks, albums and artists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SearchResults {
    /// Matching tracks from the trigram index.
    pub music: Vec<LibraryMusic>,
    /// Matching albums.
    pub albums: Vec<Album>,
    /// Matching artists.
    pub artists: Vec<Artist>,
}

impl SearchResults {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.music.is_empty() && self.albums.is_empty() && self.artists.is_empty()
    }
}

/// Direction of a sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    #[must_use]
    pub const fn reversed(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }

    pub(crate) const fn sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// Sortable columns of the library table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryColumn {
    Title,
    Album,
    Artists,
    Duration,
    DateAdded,
    ReleaseDate,
}

impl LibraryColumn {
    pub(crate) const fn sql(self) -> &'static str {
        match self {
            Self::Title => "music_name COLLATE NOCASE",
            Self::Album => "album_name COLLATE NOCASE",
            Self::Artists => "artist_names COLLATE NOCASE",
            Self::Duration => "duration",
            Self::DateAdded => "downloaded_on",
            Self::ReleaseDate => "release_date",
        }
    }
}

/// How to order `list_library`. No column keeps insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LibrarySort {
    pub column: Option<LibraryColumn>,
    pub order: SortOrder,
}

impl LibrarySort {
    /// `ORDER BY` clause over `library_music_view` columns.
    ///
    /// `fallback` is the insertion-order expression, used alone when no
    /// column is set and as the tie breaker otherwise.
    pub(crate) fn order_by(&self, fallback: &str) -> String {
        let order = self.order.sql();
        match self.column {
            Some(column) => format!("ORDER BY {} {order}, {fallback} {order}", column.sql()),
            None => format!("ORDER BY {fallback} {order}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::library::models::{CollectionKind, LibraryColumn, LibrarySort, SortOrder};

    #[test]
    fn test_collection_kind_round_trip_through_text() {
        assert_eq!("folder".parse::<CollectionKind>().unwrap(), CollectionKind::Folder);
        assert_eq!(
            CollectionKind::try_from("playlist".to_string()).unwrap(),
            CollectionKind::Playlist
        );
        assert!("album".parse::<CollectionKind>().is_err());
        assert_eq!(CollectionKind::Folder.to_string(), "folder");
    }

    #[test]
    fn test_sort_order_reversed() {
        assert_eq!(SortOrder::Ascending.reversed(), SortOrder::Descending);
        assert_eq!(SortOrder::Descending.reversed(), SortOrder::Ascending);
    }

    #[test]
    fn test_library_sort_order_by() {
        assert_eq!(LibrarySort::default().order_by("music_id"), "ORDER BY music_id ASC");

        let sort = LibrarySort {
            column: Some(LibraryColumn::Duration),
            order: SortOrder::Descending,
        };
        assert_eq!(
            sort.order_by("j.key"),
            "ORDER BY duration DESC, j.key DESC"
        );
    }
}
