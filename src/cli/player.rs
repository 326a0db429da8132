//! Interactive playback for the `play` command.
//!
//! Tracks are played through the configured external player. Single-line
//! commands on stdin control the queue while it runs:
//!
//! | Input   | Action                            |
//! |---------|-----------------------------------|
//! | `n`     | next track                        |
//! | `p`     | previous track, or restart        |
//! | `s`     | toggle shuffle                    |
//! | `r`     | cycle repeat mode                 |
//! | `j N`   | jump to queue position `N`        |
//! | `a ID`  | play track `ID` after this one    |
//! | `d N`   | drop queue position `N`           |
//! | `l`     | list the queue                    |
//! | `q`     | stop and quit                     |

use std::{
    io::{BufRead, stdin},
    sync::Arc,
    thread,
};

use {
    anyhow::{Result as AnyhowResult, bail},
    async_channel::{Receiver, unbounded},
    tokio::{select, sync::broadcast::error::RecvError},
    tracing::{debug, warn},
};

use crate::{
    cli::{PlayArgs, commands::Session},
    error::{ErrorReporter, ResultExt},
    library::{LibraryDatabase, LibrarySort},
    playback::{CommandBackend, PlaybackBackend, QueueEntry, QueueManager, RepeatState},
    state::{AppState, AppStateEvent, LibraryState, PlaybackQueue, PlaybackState},
};

/// One parsed line of player input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayerInput {
    Next,
    Previous,
    Shuffle,
    Repeat,
    Jump(usize),
    AddNext(i64),
    Remove(usize),
    List,
    Quit,
}

impl PlayerInput {
    fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let input = match (words.next()?, words.next()) {
            ("n", None) => Self::Next,
            ("p", None) => Self::Previous,
            ("s", None) => Self::Shuffle,
            ("r", None) => Self::Repeat,
            ("l", None) => Self::List,
            ("q", None) => Self::Quit,
            ("j", Some(position)) => Self::Jump(position.parse().ok()?),
            ("a", Some(music_id)) => Self::AddNext(music_id.parse().ok()?),
            ("d", Some(position)) => Self::Remove(position.parse().ok()?),
            _ => return None,
        };
        words.next().is_none().then_some(input)
    }
}

/// Plays the tracks selected by `args` until the queue runs out or the
/// user quits.
///
/// # Errors
///
/// Returns an error if the tracks cannot be loaded, nothing matches, or
/// no player command is configured.
pub async fn play(session: &Session, args: PlayArgs) -> AnyhowResult<()> {
    let entries = queue_entries(&session.database, &args).await?;
    if entries.is_empty() {
        bail!("Nothing to play");
    }

    let settings = session.settings();
    let backend = Arc::new(
        CommandBackend::new(settings.player_command.clone()).add_context("Cannot start playback")?,
    );
    let app_state = Arc::new(AppState::new(LibraryState::from_settings(&settings)));
    let mut events = app_state.subscribe();
    let manager = QueueManager::new(
        backend.clone(),
        app_state.clone(),
        Some(session.database.clone()),
    );

    if args.shuffle {
        manager.toggle_shuffle().add_context("Failed to turn on shuffle")?;
    }
    manager
        .set_queue(entries, args.start, args.collection)
        .add_context("Failed to start playback")?;

    let input = spawn_input_reader();
    let mut input_open = true;
    let mut started = false;

    loop {
        select! {
            event = events.recv() => match event {
                Ok(AppStateEvent::CurrentTrackChanged(Some(track))) => {
                    println!("Now playing: {} - {}", track.artists, track.title);
                }
                Ok(AppStateEvent::PlaybackStateChanged(PlaybackState::Playing)) => started = true,
                Ok(AppStateEvent::PlaybackStateChanged(PlaybackState::Stopped)) => {
                    if started {
                        break;
                    }
                    bail!("The player could not start the first track");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => debug!("Player missed {skipped} state events"),
                Err(RecvError::Closed) => break,
            },
            line = input.recv(), if input_open => match line {
                Ok(line) => match PlayerInput::parse(&line) {
                    Some(PlayerInput::Quit) => break,
                    Some(command) => {
                        if let Err(e) = handle_input(session, &manager, command).await {
                            ErrorReporter::warn(&e, "player input");
                            println!("{}", ErrorReporter::to_user_message(&e));
                        }
                    }
                    None => println!("Unknown command: {}", line.trim()),
                },
                // Stdin closed: keep playing to the end of the queue.
                Err(_) => input_open = false,
            },
        }
    }

    if let Err(e) = backend.stop() {
        warn!("Failed to stop the player: {e}");
    }
    Ok(())
}

async fn handle_input(
    session: &Session,
    manager: &QueueManager,
    input: PlayerInput,
) -> AnyhowResult<()> {
    match input {
        PlayerInput::Next => manager.next_track().add_context("Failed to skip")?,
        PlayerInput::Previous => manager.previous_track().add_context("Failed to go back")?,
        PlayerInput::Shuffle => manager.toggle_shuffle().add_context("Failed to toggle shuffle")?,
        PlayerInput::Repeat => manager.cycle_repeat().add_context("Failed to change repeat")?,
        PlayerInput::Jump(position) => manager.jump(position).add_context("Failed to jump")?,
        PlayerInput::Remove(position) => manager.remove(position).add_context("Failed to remove")?,
        PlayerInput::AddNext(music_id) => {
            let music = session
                .database
                .get_library_music(music_id)
                .await
                .add_contextf(format!("Failed to load track {music_id}"))?;
            manager
                .add_next(vec![QueueEntry::from_music(&music)])
                .add_context("Failed to queue the track")?;
        }
        PlayerInput::List => print!("{}", describe_queue(&manager.get_queue())),
        PlayerInput::Quit => {}
    }
    Ok(())
}

/// Resolves the play source of `args` to queue entries.
///
/// A collection, album or artist plays in its own order, explicit track
/// IDs in the order given, and no source at all plays the library in its
/// insertion order.
async fn queue_entries(
    database: &LibraryDatabase,
    args: &PlayArgs,
) -> AnyhowResult<Vec<QueueEntry>> {
    let music = if let Some(collection_id) = args.collection {
        let music_ids = database
            .collection_music_ids(collection_id)
            .await
            .add_contextf(format!("Failed to load collection {collection_id}"))?;
        database.list_library_music(&music_ids, LibrarySort::default()).await
    } else if let Some(album_id) = args.album {
        let music_ids = database
            .music_ids_for_album(album_id)
            .await
            .add_contextf(format!("Failed to load album {album_id}"))?;
        database.list_library_music(&music_ids, LibrarySort::default()).await
    } else if let Some(artist_id) = args.artist {
        let music_ids = database
            .music_ids_for_artist(artist_id)
            .await
            .add_contextf(format!("Failed to load artist {artist_id}"))?;
        database.list_library_music(&music_ids, LibrarySort::default()).await
    } else if !args.music_ids.is_empty() {
        database
            .list_library_music(&args.music_ids, LibrarySort::default())
            .await
    } else {
        database.list_library(LibrarySort::default()).await
    }
    .add_context("Failed to load tracks")?;

    Ok(music.iter().map(QueueEntry::from_music).collect())
}

/// Reads stdin lines on a plain thread; the channel closes at EOF.
fn spawn_input_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        for line in stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send_blocking(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// One line per queued track, the current one marked with `>`.
fn describe_queue(queue: &PlaybackQueue) -> String {
    let repeat = match queue.repeat {
        RepeatState::NoRepeat => "off",
        RepeatState::RepeatQueue => "queue",
        RepeatState::RepeatOne => "one",
    };
    let mut out = format!(
        "Shuffle {}, repeat {repeat}\n",
        if queue.shuffle { "on" } else { "off" }
    );
    for (position, track) in queue.tracks.iter().enumerate() {
        let marker = if queue.current_index == Some(position) { '>' } else { ' ' };
        let added = if track.manually_added { " (added)" } else { "" };
        out.push_str(&format!(
            "{marker}{position:>4}  {} - {}{added}\n",
            track.artists, track.title
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::{
        cli::player::{PlayerInput, describe_queue},
        playback::{QueueEntry, RepeatState},
        state::PlaybackQueue,
    };

    #[test]
    fn test_parse_player_input() {
        assert_eq!(PlayerInput::parse("n"), Some(PlayerInput::Next));
        assert_eq!(PlayerInput::parse("  q \n"), Some(PlayerInput::Quit));
        assert_eq!(PlayerInput::parse("j 4"), Some(PlayerInput::Jump(4)));
        assert_eq!(PlayerInput::parse("a 17"), Some(PlayerInput::AddNext(17)));
        assert_eq!(PlayerInput::parse("d 0"), Some(PlayerInput::Remove(0)));
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert_eq!(PlayerInput::parse(""), None);
        assert_eq!(PlayerInput::parse("j"), None);
        assert_eq!(PlayerInput::parse("j -1"), None);
        assert_eq!(PlayerInput::parse("n 2"), None);
        assert_eq!(PlayerInput::parse("j 1 2"), None);
        assert_eq!(PlayerInput::parse("play"), None);
    }

    #[test]
    fn test_describe_queue_marks_current_track() {
        let entry = |id: i64, manually_added| QueueEntry {
            music_id: id,
            title: format!("Song {id}"),
            artists: "Band".to_string(),
            path: PathBuf::from(format!("/music/{id}.flac")),
            manually_added,
        };
        let queue = PlaybackQueue {
            tracks: vec![entry(1, false), entry(2, true)],
            current_index: Some(1),
            shuffle: true,
            repeat: RepeatState::RepeatOne,
        };

        let text = describe_queue(&queue);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Shuffle on, repeat one");
        assert_eq!(lines[1], "    0  Band - Song 1");
        assert_eq!(lines[2], ">   1  Band - Song 2 (added)");
    }
}
