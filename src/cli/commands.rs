//! Subcommand handlers.
//!
//! Every handler works on one [`Session`]: the loaded settings plus the
//! opened library database. Output goes to stdout, diagnostics to the
//! tracing subscriber installed by `main`.

use std::path::PathBuf;

use {
    anyhow::{Result as AnyhowResult, bail},
    serde_json::to_string_pretty,
    tracing::{debug, info},
};

use crate::{
    cli::{Cli, CollectionsCommand, Command, LibraryArgs, SettingsCommand, player},
    config::{SettingsManager, UserSettings},
    downloader::Downloader,
    error::{LibraryError, ResultExt},
    library::{
        CollectionTree, ImporterConfig, LibraryDatabase, LibraryMusic, LibrarySort,
        MusicImporter, TreeView,
        summary::{format_duration, meta_text},
    },
    state::{AppState, LibraryState},
};

/// Settings and database shared by the handlers.
pub struct Session {
    pub settings: SettingsManager,
    pub database: LibraryDatabase,
}

impl Session {
    /// Copy of the current settings, so no lock is held across awaits.
    #[must_use]
    pub fn settings(&self) -> UserSettings {
        self.settings.get_settings().clone()
    }

    fn importer(&self) -> MusicImporter {
        MusicImporter::new(ImporterConfig::from_settings(&self.settings()))
    }

    /// Explicit import sources, or the configured library directories.
    fn import_sources(&self, paths: Vec<PathBuf>) -> AnyhowResult<Vec<PathBuf>> {
        if !paths.is_empty() {
            return Ok(paths);
        }
        let directories: Vec<PathBuf> = self
            .settings()
            .library_directories
            .iter()
            .map(PathBuf::from)
            .collect();
        if directories.is_empty() {
            bail!("No paths given and no library directories configured");
        }
        Ok(directories)
    }
}

/// Runs one parsed command line.
///
/// # Errors
///
/// Returns the first error of the command, with context attached.
pub async fn run(cli: Cli) -> AnyhowResult<()> {
    let settings = match cli.config {
        Some(path) => SettingsManager::with_config_path(path),
        None => SettingsManager::new(),
    }
    .add_context("Failed to load settings")?;

    // Settings never need the database.
    if let Command::Settings { action } = cli.command {
        return settings_command(&settings, action);
    }

    let database_path = cli
        .database
        .unwrap_or_else(|| settings.get_settings().database_path());
    let database = LibraryDatabase::open(&database_path)
        .await
        .add_contextf(format!("Failed to open library at {}", database_path.display()))?;
    let session = Session { settings, database };

    match cli.command {
        Command::Import { paths } => import(&session, paths).await,
        Command::Reset { paths } => reset(&session, paths).await,
        Command::Refresh => refresh(&session).await,
        Command::Search { query, limit } => search(&session, &query, limit).await,
        Command::Library(args) => library(&session, args).await,
        Command::Albums { filter } => albums(&session, filter.as_deref()).await,
        Command::Artists { filter } => artists(&session, filter.as_deref()).await,
        Command::Collections(command) => collections(&session, command).await,
        Command::Play(args) => player::play(&session, args).await,
        Command::Download { url, no_import } => download(&session, &url, no_import).await,
        Command::Settings { .. } => Ok(()),
    }
}

async fn import(session: &Session, paths: Vec<PathBuf>) -> AnyhowResult<()> {
    let sources = session.import_sources(paths)?;
    let report = session
        .importer()
        .import_paths(&session.database, &sources)
        .await
        .add_context("Import failed")?;
    println!("{report}");
    Ok(())
}

async fn reset(session: &Session, paths: Vec<PathBuf>) -> AnyhowResult<()> {
    let sources = session.import_sources(paths)?;
    let report = session
        .database
        .reset_and_populate(&session.importer(), &sources)
        .await
        .add_context("Library reset failed")?;
    // IDs start over after a reset, so an old ID could name a new collection.
    session
        .settings
        .update_with(|settings| settings.library_collection_id = None)
        .add_context("Failed to save the library view")?;
    println!("{report}");
    Ok(())
}

async fn refresh(session: &Session) -> AnyhowResult<()> {
    session
        .database
        .refresh_views()
        .await
        .add_context("Failed to refresh library views")?;
    session
        .database
        .ensure_downloaded_playlist()
        .await
        .add_context("Failed to sync the downloaded songs playlist")?;
    let count = session.database.music_count().await.add_context("Failed to count tracks")?;
    println!("Library refreshed, {count} tracks");
    Ok(())
}

async fn search(session: &Session, query: &str, limit: u32) -> AnyhowResult<()> {
    let results = session
        .database
        .search_library(query, limit)
        .await
        .add_contextf(format!("Search for '{query}' failed"))?;
    if results.is_empty() {
        println!("No matches for \"{query}\"");
        return Ok(());
    }

    if !results.music.is_empty() {
        println!("Tracks:");
        print_tracks(&results.music);
    }
    if !results.albums.is_empty() {
        println!("Albums:");
        for album in &results.albums {
            println!("{:>6}  {} ({})", album.album_id, album.album_name, album.release_date);
        }
    }
    if !results.artists.is_empty() {
        println!("Artists:");
        for artist in &results.artists {
            println!("{:>6}  {}", artist.artist_id, artist.artist_name);
        }
    }
    Ok(())
}

async fn library(session: &Session, args: LibraryArgs) -> AnyhowResult<()> {
    let current = session.settings();
    let collection_id = if args.all {
        None
    } else {
        args.collection.or(current.library_collection_id)
    };
    let column = if args.unsorted {
        None
    } else {
        args.sort.map(Into::into).or(current.library_sort_column)
    };
    let order = args.order.map_or(current.library_sort_order, Into::into);
    let sort = LibrarySort { column, order };

    let collection = match collection_id {
        Some(id) => match session.database.get_collection(id).await {
            Ok(collection) => Some(collection),
            // Only the remembered collection may have vanished quietly.
            Err(LibraryError::NotFound { .. }) if args.collection.is_none() => {
                info!("Remembered collection {} is gone, showing the whole library", id);
                None
            }
            Err(e) => return Err(e).add_contextf(format!("Failed to open collection {id}")),
        },
        None => None,
    };

    // The view for this run; settings carry it over to the next one.
    let view = AppState::new(LibraryState::from_settings(&current));
    view.select_collection(collection.as_ref().map(|c| c.collection_id));
    view.update_library_state(LibraryState {
        library_sort: sort,
        ..view.get_library_state()
    });
    let state = view.get_library_state();

    let tracks = match &collection {
        Some(collection) => {
            println!("{}", collection.name);
            let music_ids = session
                .database
                .collection_music_ids(collection.collection_id)
                .await
                .add_contextf(format!("Failed to list collection {}", collection.collection_id))?;
            session.database.list_library_music(&music_ids, state.library_sort).await
        }
        None => session.database.list_library(state.library_sort).await,
    }
    .add_context("Failed to list tracks")?;

    session
        .settings
        .update_with(|settings| {
            settings.library_collection_id = state.selected_collection;
            settings.library_sort_column = state.library_sort.column;
            settings.library_sort_order = state.library_sort.order;
        })
        .add_context("Failed to save the library view")?;

    println!("{}", meta_text(&tracks));
    print_tracks(&tracks);
    Ok(())
}

/// Forgets the remembered library collection if it no longer exists.
async fn forget_missing_collection(session: &Session) -> AnyhowResult<()> {
    let Some(remembered) = session.settings().library_collection_id else {
        return Ok(());
    };
    match session.database.get_collection(remembered).await {
        Err(LibraryError::NotFound { .. }) => {
            debug!("Forgetting deleted collection {}", remembered);
            session
                .settings
                .update_with(|settings| settings.library_collection_id = None)
                .add_context("Failed to save the library view")
        }
        result => result.map(|_| ()).add_context("Failed to check the library view"),
    }
}

async fn albums(session: &Session, filter: Option<&str>) -> AnyhowResult<()> {
    let albums = session
        .database
        .get_albums(filter)
        .await
        .add_context("Failed to list albums")?;
    for album in &albums {
        println!(
            "{:>6}  {} ({}){}",
            album.album_id,
            album.album_name,
            album.release_date,
            if album.img_path.is_some() { "" } else { "  [no cover]" }
        );
    }
    Ok(())
}

async fn artists(session: &Session, filter: Option<&str>) -> AnyhowResult<()> {
    let artists = session
        .database
        .get_artists(filter)
        .await
        .add_context("Failed to list artists")?;
    for artist in &artists {
        println!("{:>6}  {}", artist.artist_id, artist.artist_name);
    }
    Ok(())
}

async fn collections(session: &Session, command: CollectionsCommand) -> AnyhowResult<()> {
    let database = &session.database;
    match command {
        CollectionsCommand::Tree { sort, filter } => {
            let current = session.settings();
            let mut tree = CollectionTree::build(
                database
                    .list_collections()
                    .await
                    .add_context("Failed to list collections")?,
            );
            tree.sort(current.tree_sort_role, current.tree_sort_order);

            if let Some(role) = sort {
                let (role, order) = tree.select_sort_role(role.into());
                debug!("Collection tree sorted by {:?} {:?}", role, order);
                session
                    .settings
                    .update_with(|settings| {
                        settings.tree_sort_role = role;
                        settings.tree_sort_order = order;
                    })
                    .add_context("Failed to save the tree sort")?;
            }

            let view = tree
                .filter(filter.as_deref().unwrap_or_default())
                .add_context("Invalid filter")?;
            if let TreeView::Flat(matches) = &view
                && matches.is_empty()
            {
                println!("No matching collections");
                return Ok(());
            }
            print!("{}", tree.render(&view));
        }
        CollectionsCommand::Create { kind, name, parent } => {
            let collection = database
                .create_collection(kind.into(), &name, parent)
                .await
                .add_contextf(format!("Failed to create '{name}'"))?;
            println!("Created {} {}", collection.kind, collection.collection_id);
        }
        CollectionsCommand::Rename { id, name } => {
            database
                .rename_collection(id, &name)
                .await
                .add_contextf(format!("Failed to rename collection {id}"))?;
        }
        CollectionsCommand::Move { id, parent } => {
            database
                .move_collection(id, parent)
                .await
                .add_contextf(format!("Failed to move collection {id}"))?;
        }
        CollectionsCommand::Delete { id } => {
            database
                .delete_collection(id)
                .await
                .add_contextf(format!("Failed to delete collection {id}"))?;
            forget_missing_collection(session).await?;
        }
        CollectionsCommand::Add { id, music_ids, at } => {
            let context = format!("Failed to add tracks to collection {id}");
            match at {
                Some(position) => {
                    database
                        .insert_music_ids_at(id, &music_ids, position)
                        .await
                        .add_contextf(context)?;
                    println!("Inserted {} tracks at {position}", music_ids.len());
                }
                None => {
                    let added = database.add_music_ids(id, &music_ids).await.add_contextf(context)?;
                    println!("Added {added} tracks");
                }
            }
        }
        CollectionsCommand::Remove { id, music_ids } => {
            database
                .remove_music_ids(id, &music_ids)
                .await
                .add_contextf(format!("Failed to remove tracks from collection {id}"))?;
        }
        CollectionsCommand::Show { id } => show_collection(session, id).await?,
    }
    Ok(())
}

async fn show_collection(session: &Session, id: i64) -> AnyhowResult<()> {
    let database = &session.database;
    let collection = database
        .get_collection(id)
        .await
        .add_contextf(format!("Failed to open collection {id}"))?;

    println!("{} ({} {})", collection.name, collection.kind, collection.collection_id);
    println!("Created:  {}", collection.created.format("%Y-%m-%d %H:%M"));
    println!("Updated:  {}", collection.last_updated.format("%Y-%m-%d %H:%M"));
    match collection.last_played {
        Some(played) => println!("Played:   {}", played.format("%Y-%m-%d %H:%M")),
        None => println!("Played:   never"),
    }
    if collection.protected {
        println!("Built in");
    }

    if collection.is_folder() {
        let children = database
            .children_of(Some(id))
            .await
            .add_context("Failed to list folder contents")?;
        for child in &children {
            println!("{:>6}  {} [{}]", child.collection_id, child.name, child.kind);
        }
        return Ok(());
    }

    let cover_albums = database
        .playlist_cover_album_ids(id)
        .await
        .add_context("Failed to pick cover albums")?;
    if collection.thumbnail.is_none() && !cover_albums.is_empty() {
        let ids: Vec<String> = cover_albums.iter().map(ToString::to_string).collect();
        println!("Cover:    albums {}", ids.join(", "));
    }

    let music_ids = database
        .collection_music_ids(id)
        .await
        .add_context("Failed to list playlist tracks")?;
    let tracks = database
        .list_library_music(&music_ids, LibrarySort::default())
        .await
        .add_context("Failed to load playlist tracks")?;
    println!("{}", meta_text(&tracks));
    print_tracks(&tracks);
    Ok(())
}

async fn download(session: &Session, url: &str, no_import: bool) -> AnyhowResult<()> {
    let downloader =
        Downloader::from_settings(&session.settings()).add_context("Cannot download")?;
    let directory = downloader
        .fetch(url)
        .await
        .add_contextf(format!("Failed to download {url}"))?;
    info!("Downloaded {} into {:?}", url, directory);

    if no_import {
        println!("Downloaded into {}", directory.display());
        return Ok(());
    }
    let report = session
        .importer()
        .import_paths(&session.database, &[directory])
        .await
        .add_context("Failed to import the download")?;
    println!("{report}");
    Ok(())
}

fn settings_command(settings: &SettingsManager, action: Option<SettingsCommand>) -> AnyhowResult<()> {
    let saved = match action.unwrap_or(SettingsCommand::Show) {
        SettingsCommand::Show => {
            println!("# {}", settings.get_config_path().display());
            let json = to_string_pretty(&*settings.get_settings())
                .add_context("Failed to serialize settings")?;
            println!("{json}");
            return Ok(());
        }
        SettingsCommand::AddLibrary { directory } => {
            let directory = directory.to_string_lossy().into_owned();
            settings.update_with(|s| {
                if !s.library_directories.contains(&directory) {
                    s.library_directories.push(directory);
                }
            })
        }
        SettingsCommand::RemoveLibrary { directory } => {
            let directory = directory.to_string_lossy();
            settings.update_with(|s| s.library_directories.retain(|d| *d != directory))
        }
        SettingsCommand::Player { command } => settings.update_with(|s| s.player_command = command),
        SettingsCommand::Ripper { command } => settings.update_with(|s| s.ripper_command = command),
    };
    saved.add_context("Failed to save settings")
}

/// Prints one line per track: ID, title, artists, album, duration.
fn print_tracks(tracks: &[LibraryMusic]) {
    for track in tracks {
        println!(
            "{:>6}  {}  {}  {}  {}",
            track.music_id,
            track.music_name,
            track.artists_display(),
            track.album_name,
            format_duration(track.duration)
        );
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs::{create_dir_all, read_to_string},
        path::Path,
    };

    use {clap::Parser, tempfile::TempDir};

    use crate::{
        cli::{Cli, run},
        config::SettingsManager,
        library::{CollectionKind, LibraryColumn, LibraryDatabase, SortOrder, TreeSortRole},
    };

    async fn run_args(dir: &Path, args: &[&str]) -> anyhow::Result<()> {
        let config = dir.join("settings.json");
        let database = dir.join("library.db");
        let mut argv = vec![
            "tunedeck".to_string(),
            "--config".to_string(),
            config.to_string_lossy().into_owned(),
            "--database".to_string(),
            database.to_string_lossy().into_owned(),
        ];
        argv.extend(args.iter().map(ToString::to_string));
        run(Cli::parse_from(argv)).await
    }

    fn settings(dir: &Path) -> SettingsManager {
        SettingsManager::with_config_path(dir.join("settings.json")).unwrap()
    }

    #[tokio::test]
    async fn test_settings_commands_edit_the_file() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();

        run_args(dir, &["settings", "add-library", "/music"]).await.unwrap();
        run_args(dir, &["settings", "add-library", "/music"]).await.unwrap();
        run_args(dir, &["settings", "player", "vlc", "--intf", "dummy"]).await.unwrap();

        let manager = settings(dir);
        let saved = manager.get_settings();
        assert_eq!(saved.library_directories, vec!["/music".to_string()]);
        assert_eq!(saved.player_command, vec!["vlc", "--intf", "dummy"]);
        assert!(read_to_string(dir.join("settings.json")).unwrap().contains("/music"));
        assert!(!dir.join("library.db").exists(), "settings never open the database");
    }

    #[tokio::test]
    async fn test_import_without_sources_fails() {
        let temp_dir = TempDir::new().unwrap();
        let error = run_args(temp_dir.path(), &["import"]).await.unwrap_err();
        assert!(error.to_string().contains("No paths given"));
    }

    #[tokio::test]
    async fn test_import_of_empty_directory_syncs_downloaded_playlist() {
        let temp_dir = TempDir::new().unwrap();
        let music = temp_dir.path().join("music");
        create_dir_all(&music).unwrap();

        run_args(temp_dir.path(), &["import", music.to_str().unwrap()])
            .await
            .unwrap();

        let db = LibraryDatabase::open(&temp_dir.path().join("library.db"))
            .await
            .unwrap();
        let collections = db.list_collections().await.unwrap();
        assert_eq!(collections.len(), 1);
        assert!(collections[0].protected);
    }

    #[tokio::test]
    async fn test_collection_commands_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();

        run_args(dir, &["collections", "create", "folder", "Jazz"]).await.unwrap();
        let db = LibraryDatabase::open(&dir.join("library.db")).await.unwrap();
        let folder = db.list_collections().await.unwrap().remove(0);
        let folder_id = folder.collection_id.to_string();

        run_args(dir, &["collections", "create", "playlist", "Bebop", "--parent", &folder_id])
            .await
            .unwrap();
        run_args(dir, &["collections", "rename", &folder_id, "Jazz Classics"])
            .await
            .unwrap();
        run_args(dir, &["collections", "tree", "--sort", "alphabetical"])
            .await
            .unwrap();

        let children = db.children_of(Some(folder.collection_id)).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].kind, CollectionKind::Playlist);
        assert_eq!(
            db.get_collection(folder.collection_id).await.unwrap().name,
            "Jazz Classics"
        );

        // Alphabetical was already active, so picking it flipped the order.
        let saved = settings(dir).get_settings().clone();
        assert_eq!(saved.tree_sort_role, TreeSortRole::Alphabetical);
        assert_eq!(saved.tree_sort_order, SortOrder::Descending);

        run_args(dir, &["collections", "delete", &folder_id]).await.unwrap();
        assert!(db.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_library_remembers_view() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();

        run_args(dir, &["library", "--sort", "duration", "--order", "desc"])
            .await
            .unwrap();
        let saved = settings(dir).get_settings().clone();
        assert_eq!(saved.library_sort_column, Some(LibraryColumn::Duration));
        assert_eq!(saved.library_sort_order, SortOrder::Descending);

        run_args(dir, &["library", "--unsorted"]).await.unwrap();
        let saved = settings(dir).get_settings().clone();
        assert_eq!(saved.library_sort_column, None);
        assert_eq!(saved.library_sort_order, SortOrder::Descending);
    }

    #[tokio::test]
    async fn test_library_unknown_collection_fails() {
        let temp_dir = TempDir::new().unwrap();
        assert!(
            run_args(temp_dir.path(), &["library", "--collection", "42"])
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_library_forgets_collection_deleted_with_its_folder() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();

        run_args(dir, &["collections", "create", "folder", "F"]).await.unwrap();
        let db = LibraryDatabase::open(&dir.join("library.db")).await.unwrap();
        let folder_id = db.list_collections().await.unwrap()[0].collection_id.to_string();
        run_args(dir, &["collections", "create", "playlist", "P", "--parent", &folder_id])
            .await
            .unwrap();
        let playlist_id = db.children_of(Some(folder_id.parse().unwrap())).await.unwrap()[0]
            .collection_id;

        run_args(dir, &["library", "--collection", &playlist_id.to_string()])
            .await
            .unwrap();
        assert_eq!(settings(dir).get_settings().library_collection_id, Some(playlist_id));

        run_args(dir, &["collections", "delete", &folder_id]).await.unwrap();
        assert_eq!(settings(dir).get_settings().library_collection_id, None);
        run_args(dir, &["library"]).await.unwrap();
    }

    #[tokio::test]
    async fn test_library_falls_back_when_remembered_collection_is_gone() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();

        settings(dir)
            .update_with(|settings| settings.library_collection_id = Some(42))
            .unwrap();

        run_args(dir, &["library"]).await.unwrap();
        assert_eq!(settings(dir).get_settings().library_collection_id, None);
    }

    #[tokio::test]
    async fn test_reset_clears_remembered_collection() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        let music = dir.join("music");
        create_dir_all(&music).unwrap();

        run_args(dir, &["collections", "create", "playlist", "Mix"]).await.unwrap();
        let db = LibraryDatabase::open(&dir.join("library.db")).await.unwrap();
        let mix_id = db.list_collections().await.unwrap()[0].collection_id.to_string();
        run_args(dir, &["library", "--collection", &mix_id]).await.unwrap();

        run_args(dir, &["reset", music.to_str().unwrap()]).await.unwrap();
        assert_eq!(settings(dir).get_settings().library_collection_id, None);
    }
}
