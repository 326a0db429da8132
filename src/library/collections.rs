//! Folder and playlist operations on the library database.
//!
//! Collections form a forest. Folders hold other collections, playlists
//! hold an ordered list of tracks. Track order inside a playlist comes from
//! `collection_children.sort_order`, which is assigned from one counter
//! shared by all playlists so that it only ever grows.

use {
    chrono::Utc,
    sqlx::SqliteConnection,
    tracing::{debug, info},
};

use crate::{
    error::domain::LibraryError,
    library::{
        collection_tree::CollectionTree,
        database::{LibraryDatabase, id_array},
        models::{Collection, CollectionEntry, CollectionKind},
    },
};

/// Name of the built-in playlist holding every imported track.
pub const DOWNLOADED_SONGS_PLAYLIST: &str = "Downloaded Songs";

/// Number of albums composing a default playlist thumbnail.
pub const PLAYLIST_COVER_ALBUMS: i64 = 4;

impl LibraryDatabase {
    /// Creates a folder or playlist.
    ///
    /// # Arguments
    ///
    /// * `kind` - Folder or playlist.
    /// * `name` - Display name, must not be blank.
    /// * `parent` - Parent folder, `None` for a root collection.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::NotFound` for an unknown parent and
    /// `LibraryError::InvalidOperation` if the parent is not a folder.
    pub async fn create_collection(
        &self,
        kind: CollectionKind,
        name: &str,
        parent: Option<i64>,
    ) -> Result<Collection, LibraryError> {
        let name = validated_name(name)?;
        if let Some(parent_id) = parent {
            self.require_folder(parent_id).await?;
        }

        let collection = self.insert_collection(kind, name, parent, false).await?;
        info!(
            collection_id = collection.collection_id,
            "Created {} '{}'", kind, collection.name
        );
        Ok(collection)
    }

    /// Gets a collection.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::NotFound` if there is no such collection.
    pub async fn get_collection(&self, collection_id: i64) -> Result<Collection, LibraryError> {
        sqlx::query_as::<_, Collection>("SELECT * FROM collections WHERE collection_id = ?")
            .bind(collection_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| LibraryError::not_found("collection", collection_id))
    }

    /// Lists every collection by ID.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn list_collections(&self) -> Result<Vec<Collection>, LibraryError> {
        Ok(
            sqlx::query_as::<_, Collection>("SELECT * FROM collections ORDER BY collection_id")
                .fetch_all(self.pool())
                .await?,
        )
    }

    /// Lists the direct children of a folder, or the roots for `None`.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn children_of(&self, parent: Option<i64>) -> Result<Vec<Collection>, LibraryError> {
        Ok(sqlx::query_as::<_, Collection>(
            "SELECT * FROM collections WHERE parent_collection_id IS ? ORDER BY collection_id",
        )
        .bind(parent)
        .fetch_all(self.pool())
        .await?)
    }

    /// Renames a collection.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::ProtectedCollection` for built-in collections
    /// and `LibraryError::InvalidData` for a blank name.
    pub async fn rename_collection(&self, collection_id: i64, name: &str) -> Result<(), LibraryError> {
        let name = validated_name(name)?;
        self.require_unprotected(collection_id).await?;

        sqlx::query("UPDATE collections SET name = ?, last_updated = ? WHERE collection_id = ?")
            .bind(name)
            .bind(Utc::now())
            .bind(collection_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Moves a collection under another folder, or to the root for `None`.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::ProtectedCollection` if either side is
    /// protected, and `LibraryError::InvalidOperation` if the target is not
    /// a folder or lies inside the moved collection.
    pub async fn move_collection(
        &self,
        collection_id: i64,
        new_parent: Option<i64>,
    ) -> Result<(), LibraryError> {
        self.require_unprotected(collection_id).await?;

        if let Some(parent_id) = new_parent {
            let parent = self.require_folder(parent_id).await?;
            if parent.protected {
                return Err(LibraryError::ProtectedCollection { id: parent_id });
            }
            if parent_id == collection_id
                || self.descendant_ids(collection_id).await?.contains(&parent_id)
            {
                return Err(LibraryError::InvalidOperation {
                    reason: format!(
                        "cannot move collection {collection_id} into itself or its descendant {parent_id}"
                    ),
                });
            }
        }

        sqlx::query(
            "UPDATE collections SET parent_collection_id = ?, last_updated = ? WHERE collection_id = ?",
        )
        .bind(new_parent)
        .bind(Utc::now())
        .bind(collection_id)
        .execute(self.pool())
        .await?;

        debug!(collection_id, ?new_parent, "Moved collection");
        Ok(())
    }

    /// Deletes a collection with its nested collections and memberships.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::ProtectedCollection` if the collection or
    /// anything below it is protected.
    pub async fn delete_collection(&self, collection_id: i64) -> Result<(), LibraryError> {
        self.require_unprotected(collection_id).await?;

        let protected_below: Option<i64> = sqlx::query_scalar(&format!(
            "{DESCENDANTS_CTE} SELECT c.collection_id FROM collections AS c \
             JOIN descendants AS d ON d.id = c.collection_id WHERE c.protected LIMIT 1"
        ))
        .bind(collection_id)
        .fetch_optional(self.pool())
        .await?;
        if let Some(id) = protected_below {
            return Err(LibraryError::ProtectedCollection { id });
        }

        sqlx::query("DELETE FROM collections WHERE collection_id = ?")
            .bind(collection_id)
            .execute(self.pool())
            .await?;

        info!(collection_id, "Deleted collection");
        Ok(())
    }

    /// Appends tracks to a playlist.
    ///
    /// Tracks already in the playlist are skipped. Returns the number of
    /// tracks added.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::ProtectedCollection` for a built-in playlist,
    /// `LibraryError::InvalidOperation` for a folder, or a foreign-key
    /// error for unknown tracks (nothing is added then).
    pub async fn add_music_ids(&self, collection_id: i64, music_ids: &[i64]) -> Result<u64, LibraryError> {
        self.require_editable_playlist(collection_id).await?;

        let mut tx = self.pool().begin().await?;
        let added = append_entries(&mut *tx, collection_id, music_ids).await?;
        touch(&mut *tx, collection_id, "last_updated").await?;
        tx.commit().await?;

        debug!(collection_id, added, "Added tracks to playlist");
        Ok(added)
    }

    /// Inserts tracks into a playlist before position `index`.
    ///
    /// Tracks already in the playlist are moved to the new position. An
    /// index past the end appends. The playlist is renumbered afterwards.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::ProtectedCollection` for a built-in playlist,
    /// `LibraryError::InvalidOperation` for a folder, or a foreign-key
    /// error for unknown tracks.
    pub async fn insert_music_ids_at(
        &self,
        collection_id: i64,
        music_ids: &[i64],
        index: usize,
    ) -> Result<(), LibraryError> {
        self.require_editable_playlist(collection_id).await?;

        let mut tx = self.pool().begin().await?;
        let mut order = entry_ids(&mut *tx, collection_id).await?;

        let mut inserted: Vec<i64> = Vec::with_capacity(music_ids.len());
        for id in music_ids {
            if !inserted.contains(id) {
                inserted.push(*id);
            }
        }

        let position = order
            .iter()
            .take(index)
            .filter(|id| !inserted.contains(id))
            .count();
        order.retain(|id| !inserted.contains(id));
        order.splice(position..position, inserted.iter().copied());

        append_entries(&mut *tx, collection_id, &inserted).await?;
        renumber(&mut *tx, collection_id, &order).await?;
        touch(&mut *tx, collection_id, "last_updated").await?;
        tx.commit().await?;
        Ok(())
    }

    /// Removes tracks from a playlist and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::ProtectedCollection` for a built-in playlist
    /// and `LibraryError::InvalidOperation` for a folder.
    pub async fn remove_music_ids(
        &self,
        collection_id: i64,
        music_ids: &[i64],
    ) -> Result<u64, LibraryError> {
        self.require_editable_playlist(collection_id).await?;

        let mut tx = self.pool().begin().await?;
        let removed = sqlx::query(
            "DELETE FROM collection_children WHERE collection_id = ? AND music_id IN (SELECT value FROM json_each(?))",
        )
        .bind(collection_id)
        .bind(id_array(music_ids)?)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        touch(&mut *tx, collection_id, "last_updated").await?;
        tx.commit().await?;

        Ok(removed)
    }

    /// Membership rows of a playlist in play order.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn collection_entries(&self, collection_id: i64) -> Result<Vec<CollectionEntry>, LibraryError> {
        Ok(sqlx::query_as::<_, CollectionEntry>(
            "SELECT * FROM collection_children WHERE collection_id = ? ORDER BY sort_order",
        )
        .bind(collection_id)
        .fetch_all(self.pool())
        .await?)
    }

    /// Tracks of a collection in play order.
    ///
    /// A playlist yields its own entries. A folder yields the entries of
    /// every playlist below it, depth first, siblings by ID. A track that
    /// sits in several playlists appears once per playlist.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::NotFound` if there is no such collection.
    pub async fn collection_music_ids(&self, collection_id: i64) -> Result<Vec<i64>, LibraryError> {
        let collection = self.get_collection(collection_id).await?;
        if !collection.is_folder() {
            return self.playlist_music_ids(collection_id).await;
        }

        let tree = CollectionTree::build(self.list_collections().await?);
        let mut music_ids = Vec::new();
        for descendant in tree.descendants(collection_id) {
            if !descendant.is_folder() {
                music_ids.extend(self.playlist_music_ids(descendant.collection_id).await?);
            }
        }
        Ok(music_ids)
    }

    /// Sets `last_played` to now.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::NotFound` if there is no such collection.
    pub async fn mark_as_played(&self, collection_id: i64) -> Result<(), LibraryError> {
        let mut conn = self.pool().acquire().await?;
        touch(&mut conn, collection_id, "last_played").await
    }

    /// Sets `last_updated` to now.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::NotFound` if there is no such collection.
    pub async fn mark_as_updated(&self, collection_id: i64) -> Result<(), LibraryError> {
        let mut conn = self.pool().acquire().await?;
        touch(&mut conn, collection_id, "last_updated").await
    }

    /// Stores or clears a custom playlist thumbnail.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::NotFound` if there is no such collection.
    pub async fn set_thumbnail(&self, collection_id: i64, image: Option<&[u8]>) -> Result<(), LibraryError> {
        let updated = sqlx::query("UPDATE collections SET thumbnail = ? WHERE collection_id = ?")
            .bind(image)
            .bind(collection_id)
            .execute(self.pool())
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(LibraryError::not_found("collection", collection_id));
        }
        Ok(())
    }

    /// Creates the protected Downloaded Songs playlist if needed and syncs
    /// it with the whole library, ordered by `downloaded_on`.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if a query fails.
    pub async fn ensure_downloaded_playlist(&self) -> Result<Collection, LibraryError> {
        let existing = sqlx::query_as::<_, Collection>(
            "SELECT * FROM collections WHERE protected AND type = 'playlist' AND name = ? LIMIT 1",
        )
        .bind(DOWNLOADED_SONGS_PLAYLIST)
        .fetch_optional(self.pool())
        .await?;

        let playlist = match existing {
            Some(playlist) => playlist,
            None => {
                info!("Creating '{}' playlist", DOWNLOADED_SONGS_PLAYLIST);
                self.insert_collection(CollectionKind::Playlist, DOWNLOADED_SONGS_PLAYLIST, None, true)
                    .await?
            }
        };
        let playlist_id = playlist.collection_id;

        let mut tx = self.pool().begin().await?;
        let by_download: Vec<i64> =
            sqlx::query_scalar("SELECT music_id FROM music ORDER BY downloaded_on, music_id")
                .fetch_all(&mut *tx)
                .await?;
        let added = append_entries(&mut *tx, playlist_id, &by_download).await?;
        if added > 0 {
            renumber(&mut *tx, playlist_id, &by_download).await?;
            touch(&mut *tx, playlist_id, "last_updated").await?;
        }
        tx.commit().await?;

        debug!(added, "Synced '{}' playlist", DOWNLOADED_SONGS_PLAYLIST);
        self.get_collection(playlist_id).await
    }

    /// Up to four album IDs that appear most often in a playlist, ties
    /// broken by first appearance. Used to tile a default thumbnail.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn playlist_cover_album_ids(&self, collection_id: i64) -> Result<Vec<i64>, LibraryError> {
        Ok(sqlx::query_scalar(
            r#"
            SELECT m.album_id
            FROM collection_children AS cc
            JOIN music AS m USING (music_id)
            WHERE cc.collection_id = ?
            GROUP BY m.album_id
            ORDER BY COUNT(*) DESC, MIN(cc.sort_order)
            LIMIT ?
            "#,
        )
        .bind(collection_id)
        .bind(PLAYLIST_COVER_ALBUMS)
        .fetch_all(self.pool())
        .await?)
    }

    async fn playlist_music_ids(&self, collection_id: i64) -> Result<Vec<i64>, LibraryError> {
        let mut conn = self.pool().acquire().await?;
        entry_ids(&mut conn, collection_id).await
    }

    async fn insert_collection(
        &self,
        kind: CollectionKind,
        name: &str,
        parent: Option<i64>,
        protected: bool,
    ) -> Result<Collection, LibraryError> {
        let now = Utc::now();
        Ok(sqlx::query_as::<_, Collection>(
            r#"
            INSERT INTO collections (type, parent_collection_id, name, created, last_updated, protected)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(kind.as_str())
        .bind(parent)
        .bind(name)
        .bind(now)
        .bind(now)
        .bind(protected)
        .fetch_one(self.pool())
        .await?)
    }

    async fn descendant_ids(&self, collection_id: i64) -> Result<Vec<i64>, LibraryError> {
        Ok(
            sqlx::query_scalar(&format!("{DESCENDANTS_CTE} SELECT id FROM descendants"))
                .bind(collection_id)
                .fetch_all(self.pool())
                .await?,
        )
    }

    async fn require_unprotected(&self, collection_id: i64) -> Result<Collection, LibraryError> {
        let collection = self.get_collection(collection_id).await?;
        if collection.protected {
            return Err(LibraryError::ProtectedCollection { id: collection_id });
        }
        Ok(collection)
    }

    async fn require_folder(&self, collection_id: i64) -> Result<Collection, LibraryError> {
        let collection = self.get_collection(collection_id).await?;
        if !collection.is_folder() {
            return Err(LibraryError::InvalidOperation {
                reason: format!("collection {collection_id} is not a folder"),
            });
        }
        Ok(collection)
    }

    /// A playlist whose track list users may edit.
    async fn require_editable_playlist(&self, collection_id: i64) -> Result<Collection, LibraryError> {
        let collection = self.require_unprotected(collection_id).await?;
        if collection.is_folder() {
            return Err(LibraryError::InvalidOperation {
                reason: format!("collection {collection_id} is a folder and holds no tracks"),
            });
        }
        Ok(collection)
    }
}

/// Recursive CTE `descendants(id)` over the collections below `?`.
const DESCENDANTS_CTE: &str = r#"
    WITH RECURSIVE descendants(id) AS (
        SELECT collection_id FROM collections WHERE parent_collection_id = ?
        UNION ALL
        SELECT c.collection_id FROM collections AS c
        JOIN descendants AS d ON c.parent_collection_id = d.id
    )
"#;

fn validated_name(name: &str) -> Result<&str, LibraryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LibraryError::InvalidData {
            reason: "collection name must not be blank".to_string(),
        });
    }
    Ok(name)
}

async fn entry_ids(conn: &mut SqliteConnection, collection_id: i64) -> Result<Vec<i64>, LibraryError> {
    Ok(sqlx::query_scalar(
        "SELECT music_id FROM collection_children WHERE collection_id = ? ORDER BY sort_order",
    )
    .bind(collection_id)
    .fetch_all(conn)
    .await?)
}

/// Next free value of the shared sort counter.
async fn next_sort_order(conn: &mut SqliteConnection) -> Result<i64, LibraryError> {
    let max: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(sort_order), 0) FROM collection_children")
        .fetch_one(conn)
        .await?;
    Ok(max + 1)
}

/// Appends tracks that are not yet in the playlist. Returns how many were added.
async fn append_entries(
    conn: &mut SqliteConnection,
    collection_id: i64,
    music_ids: &[i64],
) -> Result<u64, LibraryError> {
    let now = Utc::now();
    let mut sort_order = next_sort_order(conn).await?;
    let mut added = 0;

    for music_id in music_ids {
        let inserted = sqlx::query(
            r#"
            INSERT INTO collection_children (collection_id, music_id, added_on, sort_order)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (collection_id, music_id) DO NOTHING
            "#,
        )
        .bind(collection_id)
        .bind(*music_id)
        .bind(now)
        .bind(sort_order)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if inserted > 0 {
            sort_order += 1;
            added += inserted;
        }
    }
    Ok(added)
}

/// Rewrites the sort keys of a playlist to follow `order`, using fresh
/// values from the shared counter.
async fn renumber(conn: &mut SqliteConnection, collection_id: i64, order: &[i64]) -> Result<(), LibraryError> {
    let base = next_sort_order(conn).await?;
    for (sort_order, music_id) in (base..).zip(order) {
        sqlx::query(
            "UPDATE collection_children SET sort_order = ? WHERE collection_id = ? AND music_id = ?",
        )
        .bind(sort_order)
        .bind(collection_id)
        .bind(*music_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Sets a timestamp column of a collection to now.
async fn touch(conn: &mut SqliteConnection, collection_id: i64, column: &str) -> Result<(), LibraryError> {
    let updated = sqlx::query(&format!(
        "UPDATE collections SET {column} = ? WHERE collection_id = ?"
    ))
    .bind(Utc::now())
    .bind(collection_id)
    .execute(conn)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(LibraryError::not_found("collection", collection_id));
    }
    Ok(())
}
