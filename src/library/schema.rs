//! Database schema definition and versioning for the music library.
//!
//! This module defines the SQLite schema: the catalog tables, the
//! collection hierarchy, and the two denormalized view tables plus the
//! trigram search index that are rebuilt by
//! [`LibraryDatabase::refresh_views`](crate::library::LibraryDatabase::refresh_views).
//! SQLite has no materialized views, so `library_music_view` and
//! `music_view` are plain tables whose contents are replaced in a single
//! transaction.

use std::{
    fs::create_dir_all,
    path::{Path, PathBuf},
    time::Duration,
};

use {
    sqlx::{
        Error as SqlxError, SqlitePool,
        sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    },
    thiserror::Error,
    tracing::{debug, info},
};

use crate::config::get_data_dir;

/// Error type for schema operations.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// Database connection error.
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] SqlxError),
    /// Schema migration error.
    #[error("Schema migration error: {reason}")]
    MigrationError { reason: String },
    /// The database directory could not be created.
    #[error("Cannot create database directory: {0}")]
    DirectoryError(#[from] std::io::Error),
}

/// Current schema version.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Separator placed between track and album name in `search_vector`.
pub const SEARCH_VECTOR_SEPARATOR: char = '\u{1f}';

/// Catalog tables, in dependency order.
const CREATE_TABLES: &[&str] = &[
    r#"
    CREATE TABLE albums (
        album_id INTEGER PRIMARY KEY AUTOINCREMENT,
        album_name TEXT NOT NULL,
        release_date DATE NOT NULL,
        img_path TEXT
    )
    "#,
    r#"
    CREATE TABLE artists (
        artist_id INTEGER PRIMARY KEY AUTOINCREMENT,
        artist_name TEXT NOT NULL,
        artist_img BLOB
    )
    "#,
    r#"
    CREATE TABLE music (
        music_id INTEGER PRIMARY KEY AUTOINCREMENT,
        music_name TEXT NOT NULL,
        album_id INTEGER NOT NULL,
        lyrics_by_timestamp TEXT NOT NULL DEFAULT '[]',
        release_date DATE NOT NULL,
        duration REAL NOT NULL,
        isrc TEXT NOT NULL,
        file_path TEXT NOT NULL UNIQUE,
        downloaded_on TIMESTAMP NOT NULL,
        FOREIGN KEY (album_id) REFERENCES albums (album_id)
    )
    "#,
    r#"
    CREATE TABLE music_artists (
        music_id INTEGER NOT NULL,
        artist_id INTEGER NOT NULL,
        sort_order INTEGER NOT NULL,
        PRIMARY KEY (music_id, artist_id),
        FOREIGN KEY (music_id) REFERENCES music (music_id),
        FOREIGN KEY (artist_id) REFERENCES artists (artist_id)
    )
    "#,
    r#"
    CREATE TABLE collections (
        collection_id INTEGER PRIMARY KEY AUTOINCREMENT,
        type TEXT NOT NULL CHECK (type IN ('folder', 'playlist')),
        parent_collection_id INTEGER,
        name TEXT NOT NULL,
        created TIMESTAMP NOT NULL,
        last_updated TIMESTAMP NOT NULL,
        last_played TIMESTAMP,
        thumbnail BLOB,
        protected BOOLEAN NOT NULL DEFAULT FALSE,
        FOREIGN KEY (parent_collection_id) REFERENCES collections (collection_id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE collection_children (
        collection_id INTEGER NOT NULL,
        music_id INTEGER NOT NULL,
        added_on TIMESTAMP NOT NULL,
        sort_order INTEGER NOT NULL,
        PRIMARY KEY (collection_id, music_id),
        FOREIGN KEY (collection_id) REFERENCES collections (collection_id) ON DELETE CASCADE,
        FOREIGN KEY (music_id) REFERENCES music (music_id)
    )
    "#,
];

/// Denormalized view tables and the search index over them.
const CREATE_VIEWS: &[&str] = &[
    r#"
    CREATE TABLE library_music_view (
        music_id INTEGER PRIMARY KEY,
        music_name TEXT NOT NULL,
        album_id INTEGER NOT NULL,
        lyrics_by_timestamp TEXT NOT NULL,
        release_date DATE NOT NULL,
        duration REAL NOT NULL,
        isrc TEXT NOT NULL,
        file_path TEXT NOT NULL,
        downloaded_on TIMESTAMP NOT NULL,
        album_name TEXT,
        img_path TEXT,
        artist_ids TEXT NOT NULL,
        artist_names TEXT NOT NULL,
        search_vector TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE music_view (
        music_id INTEGER NOT NULL,
        music_name TEXT NOT NULL,
        album_id INTEGER NOT NULL,
        lyrics_by_timestamp TEXT NOT NULL,
        release_date DATE NOT NULL,
        duration REAL NOT NULL,
        isrc TEXT NOT NULL,
        file_path TEXT NOT NULL,
        downloaded_on TIMESTAMP NOT NULL,
        album_name TEXT,
        img_path TEXT,
        artist_ids TEXT NOT NULL,
        artist_names TEXT NOT NULL,
        search_vector TEXT NOT NULL,
        artist_id INTEGER NOT NULL,
        artist_name TEXT NOT NULL,
        artist_order INTEGER NOT NULL,
        PRIMARY KEY (music_id, artist_id)
    )
    "#,
    r#"
    CREATE VIRTUAL TABLE library_search USING fts5(
        search_vector,
        music_id UNINDEXED,
        tokenize = 'trigram'
    )
    "#,
];

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX idx_albums_name ON albums (album_name)",
    "CREATE INDEX idx_artists_name ON artists (artist_name)",
    "CREATE INDEX idx_music_album_id ON music (album_id)",
    "CREATE INDEX idx_music_artists_artist_id ON music_artists (artist_id, sort_order)",
    "CREATE INDEX idx_collections_parent_id ON collections (parent_collection_id)",
    "CREATE INDEX idx_collection_children_order ON collection_children (collection_id, sort_order)",
    "CREATE INDEX idx_music_view_artist_id ON music_view (artist_id)",
];

/// Rebuild statements for the view tables, run in this order inside one
/// transaction.
pub(crate) const REFRESH_VIEWS: &[&str] = &[
    "DELETE FROM library_search",
    "DELETE FROM music_view",
    "DELETE FROM library_music_view",
    r#"
    INSERT INTO library_music_view
    SELECT
        m.music_id,
        m.music_name,
        m.album_id,
        m.lyrics_by_timestamp,
        m.release_date,
        m.duration,
        m.isrc,
        m.file_path,
        m.downloaded_on,
        al.album_name,
        al.img_path,
        (SELECT json_group_array(artist_id) FROM (
            SELECT ma.artist_id FROM music_artists AS ma
            WHERE ma.music_id = m.music_id ORDER BY ma.sort_order
        )),
        (SELECT json_group_array(artist_name) FROM (
            SELECT ar.artist_name FROM music_artists AS ma
            JOIN artists AS ar USING (artist_id)
            WHERE ma.music_id = m.music_id ORDER BY ma.sort_order
        )),
        COALESCE(m.music_name, '') || CHAR(31) || COALESCE(al.album_name, '')
    FROM music AS m
    LEFT JOIN albums AS al USING (album_id)
    "#,
    r#"
    INSERT INTO music_view
    SELECT lmv.*, a.artist_id, a.artist_name, ma.sort_order
    FROM library_music_view AS lmv
    JOIN music_artists AS ma USING (music_id)
    JOIN artists AS a USING (artist_id)
    "#,
    "INSERT INTO library_search (search_vector, music_id) SELECT search_vector, music_id FROM library_music_view",
];

/// Every table cleared by a library reset, children first.
pub(crate) const ALL_TABLES: &[&str] = &[
    "library_search",
    "music_view",
    "library_music_view",
    "collection_children",
    "collections",
    "music_artists",
    "music",
    "artists",
    "albums",
];

/// Database schema definition.
pub struct SchemaManager {
    pool: SqlitePool,
}

impl SchemaManager {
    /// Creates a new schema manager.
    ///
    /// # Arguments
    ///
    /// * `pool` - The SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initializes the database schema.
    ///
    /// Creates all tables, view tables and indexes on a fresh database and
    /// records the schema version. An up-to-date database is left alone.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` if initialization fails or the stored version
    /// is unknown.
    pub async fn initialize_schema(&self) -> Result<(), SchemaError> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let current_version: Option<i32> =
            sqlx::query_scalar("SELECT version FROM schema_version LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;

        match current_version {
            None => {
                info!("Creating library schema version {}", CURRENT_SCHEMA_VERSION);
                self.create_tables().await?;
            }
            Some(version) if version == CURRENT_SCHEMA_VERSION => {
                debug!("Library schema is up to date");
            }
            Some(version) => {
                return Err(SchemaError::MigrationError {
                    reason: format!("Schema migration from version {version} not implemented"),
                });
            }
        }

        Ok(())
    }

    /// Creates all tables, view tables and indexes, then stamps the version.
    async fn create_tables(&self) -> Result<(), SchemaError> {
        let mut tx = self.pool.begin().await?;

        for statement in CREATE_TABLES.iter().chain(CREATE_VIEWS).chain(CREATE_INDEXES) {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(CURRENT_SCHEMA_VERSION)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Gets the current schema version, or 0 if not initialized.
    pub async fn get_current_version(&self) -> Result<i32, SchemaError> {
        let version: Option<i32> = sqlx::query_scalar("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;

        Ok(version.unwrap_or(0))
    }
}

/// Gets the default database location under the XDG data directory.
#[must_use]
pub fn get_database_path() -> PathBuf {
    get_data_dir().join("library.db")
}

/// Creates a database connection pool.
///
/// The database file and its parent directories are created when missing.
/// Connections run in WAL mode with foreign keys enforced.
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file.
///
/// # Errors
///
/// Returns `SchemaError` if the directory or the pool cannot be created.
pub async fn create_connection_pool(path: &Path) -> Result<SqlitePool, SchemaError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5))
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::library::schema::{
        CURRENT_SCHEMA_VERSION, SchemaError, SchemaManager, create_connection_pool,
    };

    #[test]
    fn test_schema_version_constant() {
        assert_eq!(CURRENT_SCHEMA_VERSION, 1);
    }

    #[test]
    fn test_schema_error_display() {
        let migration_error = SchemaError::MigrationError {
            reason: "test error".to_string(),
        };
        assert_eq!(
            migration_error.to_string(),
            "Schema migration error: test error"
        );
    }

    #[tokio::test]
    async fn test_initialize_schema_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let pool = create_connection_pool(&temp_dir.path().join("db").join("library.db"))
            .await
            .unwrap();
        let manager = SchemaManager::new(pool.clone());

        manager.initialize_schema().await.unwrap();
        manager.initialize_schema().await.unwrap();
        assert_eq!(manager.get_current_version().await.unwrap(), CURRENT_SCHEMA_VERSION);

        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        for expected in [
            "albums",
            "artists",
            "collection_children",
            "collections",
            "library_music_view",
            "library_search",
            "music",
            "music_artists",
            "music_view",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
    }

    #[tokio::test]
    async fn test_unknown_schema_version_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let pool = create_connection_pool(&temp_dir.path().join("library.db"))
            .await
            .unwrap();
        sqlx::query("CREATE TABLE schema_version (version INTEGER NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO schema_version (version) VALUES (99)")
            .execute(&pool)
            .await
            .unwrap();

        let result = SchemaManager::new(pool).initialize_schema().await;
        assert!(matches!(result, Err(SchemaError::MigrationError { .. })));
    }

    #[tokio::test]
    async fn test_collection_type_is_checked() {
        let temp_dir = TempDir::new().unwrap();
        let pool = create_connection_pool(&temp_dir.path().join("library.db"))
            .await
            .unwrap();
        SchemaManager::new(pool.clone())
            .initialize_schema()
            .await
            .unwrap();

        let result = sqlx::query(
            "INSERT INTO collections (type, name, created, last_updated) VALUES ('album', 'x', '2024-01-01', '2024-01-01')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }
}
