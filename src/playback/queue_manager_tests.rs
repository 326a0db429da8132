//! Integration tests for queue management functionality.
//!
//! This module contains integration tests that verify queue manager behavior
//! including auto-advance, state synchronization, and navigation.

#[cfg(test)]
mod queue_manager_tests {
    use std::{
        path::{Path, PathBuf},
        sync::Arc,
        time::Duration,
    };

    use {
        async_channel::{Receiver, Sender, unbounded},
        parking_lot::Mutex,
        tempfile::TempDir,
        tokio::{sync::broadcast, time::timeout},
    };

    use crate::{
        error::domain::PlaybackError,
        library::{CollectionKind, LibraryDatabase},
        playback::{
            backend::{CommandBackend, PlaybackBackend},
            queue::{QueueEntry, RepeatState},
            queue_manager::QueueManager,
        },
        state::{AppState, AppStateEvent, PlaybackQueue, PlaybackState},
    };

    // Default timeout in milliseconds for test async operations
    const TEST_TIMEOUT_MS: u64 = 1000;

    /// Records what it was asked to play; tests trigger track ends by hand.
    struct FakeBackend {
        played: Mutex<Vec<PathBuf>>,
        stops: Mutex<usize>,
        elapsed: Mutex<Duration>,
        finished_tx: Sender<Result<(), PlaybackError>>,
        finished_rx: Receiver<Result<(), PlaybackError>>,
    }

    impl FakeBackend {
        fn new() -> Arc<Self> {
            let (finished_tx, finished_rx) = unbounded();
            Arc::new(Self {
                played: Mutex::new(Vec::new()),
                stops: Mutex::new(0),
                elapsed: Mutex::new(Duration::ZERO),
                finished_tx,
                finished_rx,
            })
        }

        fn played_ids(&self) -> Vec<String> {
            self.played
                .lock()
                .iter()
                .map(|p| p.file_stem().unwrap().to_string_lossy().into_owned())
                .collect()
        }

        async fn finish_track(&self) {
            self.finished_tx.send(Ok(())).await.unwrap();
        }

        async fn fail_track(&self) {
            self.finished_tx
                .send(Err(PlaybackError::PlayerFailed {
                    status: "exit status: 2".to_string(),
                }))
                .await
                .unwrap();
        }
    }

    impl PlaybackBackend for FakeBackend {
        fn play(&self, path: &Path) -> Result<(), PlaybackError> {
            self.played.lock().push(path.to_path_buf());
            Ok(())
        }

        fn stop(&self) -> Result<(), PlaybackError> {
            *self.stops.lock() += 1;
            Ok(())
        }

        fn elapsed(&self) -> Duration {
            *self.elapsed.lock()
        }

        fn finished(&self) -> Receiver<Result<(), PlaybackError>> {
            self.finished_rx.clone()
        }
    }

    fn create_test_entries(count: i64) -> Vec<QueueEntry> {
        (1..=count)
            .map(|i| QueueEntry {
                music_id: i,
                title: format!("Track {i}"),
                artists: "Test Artist".to_string(),
                path: PathBuf::from(format!("/music/{i}.flac")),
                manually_added: false,
            })
            .collect()
    }

    fn setup(database: Option<LibraryDatabase>) -> (Arc<FakeBackend>, Arc<AppState>, QueueManager) {
        let backend = FakeBackend::new();
        let app_state = Arc::new(AppState::default());
        let manager = QueueManager::new(backend.clone(), app_state.clone(), database);
        (backend, app_state, manager)
    }

    /// Waits for the next queue snapshot broadcast.
    async fn next_queue_change(receiver: &mut broadcast::Receiver<AppStateEvent>) -> PlaybackQueue {
        timeout(Duration::from_millis(TEST_TIMEOUT_MS), async {
            loop {
                if let AppStateEvent::QueueChanged(queue) = receiver.recv().await.unwrap() {
                    return queue;
                }
            }
        })
        .await
        .expect("no queue change broadcast")
    }

    #[tokio::test]
    async fn test_set_queue_plays_start_track() {
        let (backend, app_state, manager) = setup(None);
        let mut events = app_state.subscribe();

        manager.set_queue(create_test_entries(3), 1, None).unwrap();
        let queue = next_queue_change(&mut events).await;

        assert_eq!(queue.current_index, Some(1));
        assert_eq!(queue.tracks.len(), 3);
        assert_eq!(backend.played_ids(), vec!["2"]);
        assert_eq!(app_state.get_playback_state(), PlaybackState::Playing);
        assert_eq!(app_state.get_current_track().unwrap().music_id, 2);
    }

    #[tokio::test]
    async fn test_auto_advance_on_track_completion() {
        let (backend, app_state, manager) = setup(None);
        let mut events = app_state.subscribe();

        manager.set_queue(create_test_entries(2), 0, None).unwrap();
        next_queue_change(&mut events).await;

        backend.finish_track().await;
        let queue = next_queue_change(&mut events).await;
        assert_eq!(queue.current_index, Some(1));
        assert_eq!(backend.played_ids(), vec!["1", "2"]);

        backend.finish_track().await;
        let queue = next_queue_change(&mut events).await;
        assert_eq!(queue.current_index, Some(1), "no advance past the last track");
        assert_eq!(app_state.get_playback_state(), PlaybackState::Stopped);
        assert_eq!(*backend.stops.lock(), 1);
    }

    #[tokio::test]
    async fn test_repeat_one_replays_on_completion() {
        let (backend, app_state, manager) = setup(None);
        let mut events = app_state.subscribe();

        manager.set_queue(create_test_entries(2), 0, None).unwrap();
        next_queue_change(&mut events).await;
        manager.cycle_repeat().unwrap();
        manager.cycle_repeat().unwrap();
        next_queue_change(&mut events).await;
        let queue = next_queue_change(&mut events).await;
        assert_eq!(queue.repeat, RepeatState::RepeatOne);

        backend.finish_track().await;
        next_queue_change(&mut events).await;
        assert_eq!(backend.played_ids(), vec!["1", "1"]);
    }

    #[tokio::test]
    async fn test_previous_restarts_late_in_track() {
        let (backend, app_state, manager) = setup(None);
        let mut events = app_state.subscribe();

        manager.set_queue(create_test_entries(3), 2, None).unwrap();
        next_queue_change(&mut events).await;

        *backend.elapsed.lock() = Duration::from_secs(30);
        manager.previous_track().unwrap();
        assert_eq!(next_queue_change(&mut events).await.current_index, Some(2));

        *backend.elapsed.lock() = Duration::from_secs(1);
        manager.previous_track().unwrap();
        assert_eq!(next_queue_change(&mut events).await.current_index, Some(1));

        assert_eq!(backend.played_ids(), vec!["3", "3", "2"]);
    }

    #[tokio::test]
    async fn test_add_next_remove_and_jump() {
        let (backend, app_state, manager) = setup(None);
        let mut events = app_state.subscribe();

        manager.set_queue(create_test_entries(3), 0, None).unwrap();
        next_queue_change(&mut events).await;

        let mut extra = create_test_entries(9);
        extra.drain(..8);
        manager.add_next(extra).unwrap();
        let queue = next_queue_change(&mut events).await;
        let ids: Vec<i64> = queue.tracks.iter().map(|t| t.music_id).collect();
        assert_eq!(ids, vec![1, 9, 2, 3]);
        assert!(queue.tracks[1].manually_added);

        // Removing the playing track moves playback on.
        manager.remove(0).unwrap();
        let queue = next_queue_change(&mut events).await;
        assert_eq!(queue.current_index, Some(0));
        assert_eq!(app_state.get_current_track().unwrap().music_id, 9);

        manager.jump(2).unwrap();
        next_queue_change(&mut events).await;
        assert_eq!(backend.played_ids(), vec!["1", "9", "3"]);

        manager.jump(10).unwrap();
        manager.stop().unwrap();
        next_queue_change(&mut events).await;
        assert_eq!(app_state.get_playback_state(), PlaybackState::Stopped);
    }

    #[tokio::test]
    async fn test_toggle_shuffle_keeps_current_track() {
        let (_backend, app_state, manager) = setup(None);
        let mut events = app_state.subscribe();

        manager.set_queue(create_test_entries(10), 3, None).unwrap();
        next_queue_change(&mut events).await;

        manager.toggle_shuffle().unwrap();
        let queue = next_queue_change(&mut events).await;
        assert!(queue.shuffle);
        assert_eq!(queue.current_index, Some(3));
        assert_eq!(queue.tracks[3].music_id, 4);

        manager.toggle_shuffle().unwrap();
        let queue = next_queue_change(&mut events).await;
        assert!(!queue.shuffle);
        let ids: Vec<i64> = queue.tracks.iter().map(|t| t.music_id).collect();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
        assert_eq!(manager.get_queue(), queue);
    }

    #[tokio::test]
    async fn test_playing_collection_marks_it_played() {
        let temp_dir = TempDir::new().unwrap();
        let db = LibraryDatabase::open(&temp_dir.path().join("library.db"))
            .await
            .unwrap();
        let playlist = db
            .create_collection(CollectionKind::Playlist, "Road Trip", None)
            .await
            .unwrap();
        assert!(playlist.last_played.is_none());

        let (_backend, app_state, manager) = setup(Some(db.clone()));
        let mut events = app_state.subscribe();

        manager
            .set_queue(create_test_entries(1), 0, Some(playlist.collection_id))
            .unwrap();
        next_queue_change(&mut events).await;

        // Marking happens right after playback starts.
        let marked = timeout(Duration::from_millis(TEST_TIMEOUT_MS), async {
            loop {
                let collection = db.get_collection(playlist.collection_id).await.unwrap();
                if collection.last_played.is_some() {
                    return collection;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("collection never marked as played");
        assert!(marked.last_played.is_some());
    }

    #[tokio::test]
    async fn test_empty_queue_is_ignored() {
        let (backend, app_state, manager) = setup(None);
        let mut events = app_state.subscribe();

        manager.set_queue(Vec::new(), 0, None).unwrap();
        manager.next_track().unwrap();
        next_queue_change(&mut events).await;

        assert!(backend.played_ids().is_empty());
        assert_eq!(app_state.get_playback_state(), PlaybackState::Stopped);
    }

    #[tokio::test]
    async fn test_failed_track_is_skipped_even_with_repeat_one() {
        let (backend, app_state, manager) = setup(None);
        let mut events = app_state.subscribe();

        manager.cycle_repeat().unwrap();
        manager.cycle_repeat().unwrap();
        manager.set_queue(create_test_entries(3), 0, None).unwrap();
        next_queue_change(&mut events).await;
        next_queue_change(&mut events).await;
        let queue = next_queue_change(&mut events).await;
        assert_eq!(queue.repeat, RepeatState::RepeatOne);

        backend.fail_track().await;
        assert_eq!(next_queue_change(&mut events).await.current_index, Some(1));
        assert_eq!(backend.played_ids(), vec!["1", "2"]);

        // A clean finish resets the failure count and repeat applies again.
        backend.finish_track().await;
        next_queue_change(&mut events).await;
        assert_eq!(backend.played_ids(), vec!["1", "2", "2"]);
    }

    #[tokio::test]
    async fn test_stops_when_every_track_fails() {
        let (backend, app_state, manager) = setup(None);
        let mut events = app_state.subscribe();

        manager.cycle_repeat().unwrap();
        manager.set_queue(create_test_entries(3), 0, None).unwrap();
        next_queue_change(&mut events).await;
        let queue = next_queue_change(&mut events).await;
        assert_eq!(queue.repeat, RepeatState::RepeatQueue);

        for _ in 0..3 {
            backend.fail_track().await;
            next_queue_change(&mut events).await;
        }

        assert_eq!(backend.played_ids(), vec!["1", "2", "3"]);
        assert_eq!(app_state.get_playback_state(), PlaybackState::Stopped);
        assert_eq!(*backend.stops.lock(), 1);
    }

    #[tokio::test]
    async fn test_failing_player_does_not_respawn_forever() {
        let backend = Arc::new(CommandBackend::new(vec!["false".to_string()]).unwrap());
        let app_state = Arc::new(AppState::default());
        let mut events = app_state.subscribe();
        let manager = QueueManager::new(backend, app_state.clone(), None);

        manager.cycle_repeat().unwrap();
        manager.cycle_repeat().unwrap();
        manager.set_queue(create_test_entries(1), 0, None).unwrap();

        let mut plays = 0;
        let window = tokio::time::sleep(Duration::from_millis(500));
        tokio::pin!(window);
        loop {
            tokio::select! {
                event = events.recv() => {
                    if let Ok(AppStateEvent::CurrentTrackChanged(Some(_))) = event {
                        plays += 1;
                    }
                }
                () = &mut window => break,
            }
        }

        assert!(plays < 5, "player started {plays} times");
        assert_eq!(app_state.get_playback_state(), PlaybackState::Stopped);
    }
}
