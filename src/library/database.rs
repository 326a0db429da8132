//! Library database interface using sqlx with SQLite.
//!
//! This module provides the main `LibraryDatabase` struct that handles
//! catalog writes (albums, artists, tracks and their credits), the view
//! refresh, and all read queries used by the library table and search.
//! Collection operations live in [`collections`](crate::library::collections).

use std::path::{Path, PathBuf};

use {
    chrono::NaiveDate,
    serde_json::to_string,
    sqlx::{SqliteConnection, SqlitePool},
    tracing::{debug, info},
};

use crate::{
    error::domain::LibraryError,
    library::{
        importer::{ImportReport, MusicImporter},
        models::{Album, Artist, LibraryMusic, LibrarySort, Music, MusicCredit, NewMusic, SearchResults},
        schema::{
            ALL_TABLES, REFRESH_VIEWS, SchemaManager, create_connection_pool, get_database_path,
        },
    },
};

/// Queries shorter than this many characters cannot use the trigram index.
pub const TRIGRAM_MIN_QUERY_LEN: usize = 3;

/// Outcome of inserting a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertedMusic {
    pub music_id: i64,
    pub album_id: i64,
    /// The album row was created by this insert.
    pub album_created: bool,
}

/// Main library database interface.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Debug, Clone)]
pub struct LibraryDatabase {
    pool: SqlitePool,
}

impl LibraryDatabase {
    /// Opens the library at the default location.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if database initialization fails.
    pub async fn new() -> Result<Self, LibraryError> {
        Self::open(&get_database_path()).await
    }

    /// Opens (or creates) the library database at `path` and makes sure
    /// the schema is in place.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the pool cannot be created or the schema
    /// cannot be initialized.
    pub async fn open(path: &Path) -> Result<Self, LibraryError> {
        debug!("Opening library database at {:?}", path);
        let pool = create_connection_pool(path).await?;
        SchemaManager::new(pool.clone()).initialize_schema().await?;
        Ok(Self { pool })
    }

    /// Gets the database connection pool for advanced operations.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Inserts an album and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the insert fails.
    pub async fn insert_album(&self, name: &str, release_date: NaiveDate) -> Result<i64, LibraryError> {
        let mut conn = self.pool.acquire().await?;
        insert_album(&mut conn, name, release_date).await
    }

    /// Inserts an artist and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the insert fails.
    pub async fn insert_artist(&self, name: &str, image: Option<&[u8]>) -> Result<i64, LibraryError> {
        let mut conn = self.pool.acquire().await?;
        insert_artist(&mut conn, name, image).await
    }

    /// Looks an album up by name, creating it when missing.
    ///
    /// Returns the album ID and whether it was created.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if a query fails.
    pub async fn get_or_create_album(
        &self,
        name: &str,
        release_date: NaiveDate,
    ) -> Result<(i64, bool), LibraryError> {
        let mut conn = self.pool.acquire().await?;
        get_or_create_album(&mut conn, name, release_date).await
    }

    /// Looks an artist up by name, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if a query fails.
    pub async fn get_or_create_artist(&self, name: &str) -> Result<i64, LibraryError> {
        let mut conn = self.pool.acquire().await?;
        get_or_create_artist(&mut conn, name).await
    }

    /// Inserts a track with its album and artist credits.
    ///
    /// Album and artists are resolved by name and created when missing.
    /// Credits get sort orders `1..=n` in the order of `music.artists`.
    /// Everything happens in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::InvalidData` if the same artist is credited
    /// twice, or a database error (e.g. a duplicate file path).
    pub async fn insert_music(&self, music: &NewMusic) -> Result<InsertedMusic, LibraryError> {
        let mut tx = self.pool.begin().await?;

        let (album_id, album_created) =
            get_or_create_album(&mut *tx, &music.album, music.release_date).await?;

        let music_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO music
                (music_name, album_id, lyrics_by_timestamp, release_date, duration, isrc, file_path, downloaded_on)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING music_id
            "#,
        )
        .bind(&music.title)
        .bind(album_id)
        .bind(to_string(&music.lyrics).map_err(|e| LibraryError::InvalidData {
            reason: format!("cannot encode lyrics: {e}"),
        })?)
        .bind(music.release_date)
        .bind(music.duration)
        .bind(&music.isrc)
        .bind(music.file_path.to_string_lossy().into_owned())
        .bind(music.downloaded_on)
        .fetch_one(&mut *tx)
        .await?;

        let mut artist_ids: Vec<i64> = Vec::with_capacity(music.artists.len());
        for name in &music.artists {
            let artist_id = get_or_create_artist(&mut *tx, name).await?;
            if artist_ids.contains(&artist_id) {
                return Err(LibraryError::InvalidData {
                    reason: format!("artist '{name}' credited twice on {:?}", music.file_path),
                });
            }
            artist_ids.push(artist_id);
        }
        insert_credits(&mut *tx, music_id, &artist_ids).await?;

        tx.commit().await?;
        debug!(music_id, album_id, "Inserted track {:?}", music.file_path);

        Ok(InsertedMusic {
            music_id,
            album_id,
            album_created,
        })
    }

    /// Inserts credit rows for a track, numbered from 1 in slice order.
    ///
    /// # Errors
    ///
    /// Returns a database error for unknown IDs or a repeated
    /// `(music_id, artist_id)` pair.
    pub async fn add_credits(&self, music_id: i64, artist_ids: &[i64]) -> Result<(), LibraryError> {
        let mut conn = self.pool.acquire().await?;
        insert_credits(&mut conn, music_id, artist_ids).await
    }

    /// Records where an album's cover was written.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the update fails.
    pub async fn set_album_img_path(&self, album_id: i64, img_path: &str) -> Result<(), LibraryError> {
        sqlx::query("UPDATE albums SET img_path = ? WHERE album_id = ?")
            .bind(img_path)
            .bind(album_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Returns `true` if a track with this file path is already imported.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn contains_path(&self, path: &Path) -> Result<bool, LibraryError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM music WHERE file_path = ?")
            .bind(path.to_string_lossy().into_owned())
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// Rebuilds `library_music_view`, `music_view` and the search index.
    ///
    /// Runs in one transaction, so concurrent readers keep seeing the old
    /// contents until the commit.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if any statement fails; nothing is changed then.
    pub async fn refresh_views(&self) -> Result<(), LibraryError> {
        let mut tx = self.pool.begin().await?;
        for statement in REFRESH_VIEWS {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        info!("Refreshed library views");
        Ok(())
    }

    /// Gets a raw track row.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::NotFound` if there is no such track.
    pub async fn get_music(&self, music_id: i64) -> Result<Music, LibraryError> {
        sqlx::query_as::<_, Music>("SELECT * FROM music WHERE music_id = ?")
            .bind(music_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| LibraryError::not_found("music", music_id))
    }

    /// Gets a track's row from `library_music_view`.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::NotFound` if the track is missing from the
    /// view (unknown, or imported after the last refresh).
    pub async fn get_library_music(&self, music_id: i64) -> Result<LibraryMusic, LibraryError> {
        sqlx::query_as::<_, LibraryMusic>("SELECT * FROM library_music_view WHERE music_id = ?")
            .bind(music_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| LibraryError::not_found("music", music_id))
    }

    /// Lists the whole library in the requested order.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn list_library(&self, sort: LibrarySort) -> Result<Vec<LibraryMusic>, LibraryError> {
        let sql = format!("SELECT * FROM library_music_view {}", sort.order_by("music_id"));
        Ok(sqlx::query_as::<_, LibraryMusic>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Gets view rows for the given IDs.
    ///
    /// Without a sort column the rows follow the order of `music_ids`.
    /// IDs missing from the view are skipped.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn list_library_music(
        &self,
        music_ids: &[i64],
        sort: LibrarySort,
    ) -> Result<Vec<LibraryMusic>, LibraryError> {
        if music_ids.is_empty() {
            return Ok(vec![]);
        }

        let sql = format!(
            r#"
            SELECT lmv.* FROM json_each(?) AS j
            JOIN library_music_view AS lmv ON lmv.music_id = j.value
            {}
            "#,
            sort.order_by("j.key")
        );
        Ok(sqlx::query_as::<_, LibraryMusic>(&sql)
            .bind(id_array(music_ids)?)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Track IDs of an album in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::NotFound` if the album doesn't exist.
    pub async fn music_ids_for_album(&self, album_id: i64) -> Result<Vec<i64>, LibraryError> {
        self.get_album(album_id).await?;

        Ok(
            sqlx::query_scalar("SELECT music_id FROM music WHERE album_id = ? ORDER BY music_id")
                .bind(album_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    /// Track IDs credited to an artist, ordered by the artist's position
    /// in each credit list.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::NotFound` if the artist doesn't exist.
    pub async fn music_ids_for_artist(&self, artist_id: i64) -> Result<Vec<i64>, LibraryError> {
        self.get_artist(artist_id).await?;

        Ok(sqlx::query_scalar(
            "SELECT music_id FROM music_artists WHERE artist_id = ? ORDER BY sort_order, music_id",
        )
        .bind(artist_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Gets an album.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::NotFound` if there is no such album.
    pub async fn get_album(&self, album_id: i64) -> Result<Album, LibraryError> {
        sqlx::query_as::<_, Album>("SELECT * FROM albums WHERE album_id = ?")
            .bind(album_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| LibraryError::not_found("album", album_id))
    }

    /// Gets an artist.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::NotFound` if there is no such artist.
    pub async fn get_artist(&self, artist_id: i64) -> Result<Artist, LibraryError> {
        sqlx::query_as::<_, Artist>("SELECT * FROM artists WHERE artist_id = ?")
            .bind(artist_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| LibraryError::not_found("artist", artist_id))
    }

    /// Gets all albums in the library.
    ///
    /// # Arguments
    ///
    /// * `filter` - Optional substring to match against album names.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn get_albums(&self, filter: Option<&str>) -> Result<Vec<Album>, LibraryError> {
        let albums = sqlx::query_as::<_, Album>(
            r#"
            SELECT * FROM albums
            WHERE ?1 IS NULL OR album_name LIKE ?1 ESCAPE '\'
            ORDER BY album_name COLLATE NOCASE, album_id
            "#,
        )
        .bind(filter.map(like_pattern))
        .fetch_all(&self.pool)
        .await?;
        Ok(albums)
    }

    /// Gets all artists in the library.
    ///
    /// # Arguments
    ///
    /// * `filter` - Optional substring to match against artist names.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn get_artists(&self, filter: Option<&str>) -> Result<Vec<Artist>, LibraryError> {
        let artists = sqlx::query_as::<_, Artist>(
            r#"
            SELECT * FROM artists
            WHERE ?1 IS NULL OR artist_name LIKE ?1 ESCAPE '\'
            ORDER BY artist_name COLLATE NOCASE, artist_id
            "#,
        )
        .bind(filter.map(like_pattern))
        .fetch_all(&self.pool)
        .await?;
        Ok(artists)
    }

    /// Per-artist credit rows of a track from `music_view`, in credit order.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn music_credits(&self, music_id: i64) -> Result<Vec<MusicCredit>, LibraryError> {
        Ok(sqlx::query_as::<_, MusicCredit>(
            r#"
            SELECT music_id, music_name, album_name, artist_id, artist_name, artist_order
            FROM music_view
            WHERE music_id = ?
            ORDER BY artist_order
            "#,
        )
        .bind(music_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Searches tracks, albums and artists.
    ///
    /// Tracks are matched against `search_vector` (track and album name).
    /// Queries of at least [`TRIGRAM_MIN_QUERY_LEN`] characters go through
    /// the trigram index; shorter ones fall back to a substring scan.
    /// Albums and artists are matched by substring on their names.
    ///
    /// # Arguments
    ///
    /// * `query` - Search text, matched case-insensitively.
    /// * `limit` - Maximum rows per result kind.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the queries fail.
    pub async fn search_library(&self, query: &str, limit: u32) -> Result<SearchResults, LibraryError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchResults::default());
        }

        let music = if query.chars().count() >= TRIGRAM_MIN_QUERY_LEN {
            sqlx::query_as::<_, LibraryMusic>(
                r#"
                SELECT lmv.* FROM library_search
                JOIN library_music_view AS lmv
                    ON lmv.music_id = CAST(library_search.music_id AS INTEGER)
                WHERE library_search MATCH ?
                ORDER BY library_search.rank, lmv.music_id
                LIMIT ?
                "#,
            )
            .bind(fts_phrase(query))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, LibraryMusic>(
                r#"
                SELECT * FROM library_music_view
                WHERE search_vector LIKE ? ESCAPE '\'
                ORDER BY music_id
                LIMIT ?
                "#,
            )
            .bind(like_pattern(query))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };

        let pattern = like_pattern(query);
        let albums = sqlx::query_as::<_, Album>(
            r#"
            SELECT * FROM albums WHERE album_name LIKE ? ESCAPE '\'
            ORDER BY album_name COLLATE NOCASE LIMIT ?
            "#,
        )
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let artists = sqlx::query_as::<_, Artist>(
            r#"
            SELECT * FROM artists WHERE artist_name LIKE ? ESCAPE '\'
            ORDER BY artist_name COLLATE NOCASE LIMIT ?
            "#,
        )
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        debug!(
            query,
            music = music.len(),
            albums = albums.len(),
            artists = artists.len(),
            "Library search"
        );
        Ok(SearchResults {
            music,
            albums,
            artists,
        })
    }

    /// Empties every table and view and restarts ID numbering.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the reset fails; nothing is changed then.
    pub async fn truncate_all(&self) -> Result<(), LibraryError> {
        let mut tx = self.pool.begin().await?;
        for table in ALL_TABLES {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM sqlite_sequence")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("Cleared library database");
        Ok(())
    }

    /// Clears the library and rebuilds it from `sources`.
    ///
    /// Collections are cleared too; the Downloaded Songs playlist is
    /// recreated by the import.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if clearing or the final refresh fails.
    /// Individual unreadable files only show up in the report.
    pub async fn reset_and_populate(
        &self,
        importer: &MusicImporter,
        sources: &[PathBuf],
    ) -> Result<ImportReport, LibraryError> {
        self.truncate_all().await?;
        importer.import_paths(self, sources).await
    }

    /// Number of tracks in the `music` table.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn music_count(&self) -> Result<i64, LibraryError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM music")
            .fetch_one(&self.pool)
            .await?)
    }
}

async fn insert_album(
    conn: &mut SqliteConnection,
    name: &str,
    release_date: NaiveDate,
) -> Result<i64, LibraryError> {
    Ok(sqlx::query_scalar(
        "INSERT INTO albums (album_name, release_date) VALUES (?, ?) RETURNING album_id",
    )
    .bind(name)
    .bind(release_date)
    .fetch_one(conn)
    .await?)
}

async fn insert_artist(
    conn: &mut SqliteConnection,
    name: &str,
    image: Option<&[u8]>,
) -> Result<i64, LibraryError> {
    Ok(sqlx::query_scalar(
        "INSERT INTO artists (artist_name, artist_img) VALUES (?, ?) RETURNING artist_id",
    )
    .bind(name)
    .bind(image)
    .fetch_one(conn)
    .await?)
}

async fn get_or_create_album(
    conn: &mut SqliteConnection,
    name: &str,
    release_date: NaiveDate,
) -> Result<(i64, bool), LibraryError> {
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT album_id FROM albums WHERE album_name = ? ORDER BY album_id LIMIT 1")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;

    match existing {
        Some(album_id) => Ok((album_id, false)),
        None => Ok((insert_album(conn, name, release_date).await?, true)),
    }
}

async fn get_or_create_artist(conn: &mut SqliteConnection, name: &str) -> Result<i64, LibraryError> {
    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT artist_id FROM artists WHERE artist_name = ? ORDER BY artist_id LIMIT 1",
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    match existing {
        Some(artist_id) => Ok(artist_id),
        None => insert_artist(conn, name, None).await,
    }
}

async fn insert_credits(
    conn: &mut SqliteConnection,
    music_id: i64,
    artist_ids: &[i64],
) -> Result<(), LibraryError> {
    for (sort_order, artist_id) in (1_i64..).zip(artist_ids) {
        sqlx::query("INSERT INTO music_artists (music_id, artist_id, sort_order) VALUES (?, ?, ?)")
            .bind(music_id)
            .bind(*artist_id)
            .bind(sort_order)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Encodes IDs as a JSON array for `json_each(?)`.
pub(crate) fn id_array(ids: &[i64]) -> Result<String, LibraryError> {
    to_string(ids).map_err(|e| LibraryError::InvalidData {
        reason: format!("cannot encode ids: {e}"),
    })
}

/// `%text%` with LIKE wildcards in `text` escaped by backslash.
fn like_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Quotes `text` as a single FTS5 phrase.
fn fts_phrase(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}
