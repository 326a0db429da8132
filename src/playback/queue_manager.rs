//! Playback queue manager with auto-advance support.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use {
    async_channel::{Receiver, Sender, unbounded},
    parking_lot::RwLock,
    tokio::spawn,
    tracing::{debug, warn},
};

use crate::{
    error::domain::PlaybackError,
    library::LibraryDatabase,
    playback::{
        backend::PlaybackBackend,
        queue::{PlayQueue, QueueEntry},
    },
    state::{AppState, PlaybackQueue, PlaybackState},
};

/// Internal queue control messages.
#[derive(Debug)]
enum QueueControlMessage {
    /// Replace the queue and start playing.
    SetQueue {
        entries: Vec<QueueEntry>,
        start_index: usize,
        collection_id: Option<i64>,
    },
    /// Skip to the next track.
    Next,
    /// Go back, or restart the current track.
    Previous,
    /// Play the track at a queue position.
    Jump(usize),
    /// Queue tracks after the current one.
    AddNext(Vec<QueueEntry>),
    /// Drop the track at a queue position.
    Remove(usize),
    ToggleShuffle,
    CycleRepeat,
    Stop,
}

/// Everything the control and auto-advance tasks share.
#[derive(Clone)]
struct QueueContext {
    queue: Arc<RwLock<PlayQueue>>,
    backend: Arc<dyn PlaybackBackend>,
    app_state: Arc<AppState>,
    database: Option<LibraryDatabase>,
    /// Player failures since the last track that played through or the
    /// last user command.
    failures_in_row: Arc<AtomicUsize>,
}

/// Playback queue manager with auto-advance support.
///
/// The `QueueManager` owns the [`PlayQueue`], drives the playback backend
/// and advances to the next track whenever the backend reports one
/// finished. Every change is published through [`AppState`].
pub struct QueueManager {
    /// Current playback queue state.
    queue: Arc<RwLock<PlayQueue>>,
    /// Sender for internal control messages.
    control_tx: Sender<QueueControlMessage>,
}

impl QueueManager {
    /// Creates a new queue manager and starts its tasks.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `backend` - Plays the tracks and reports when they finish.
    /// * `app_state` - Application state for broadcasting changes.
    /// * `database` - Used to mark collections as played, if given.
    #[must_use]
    pub fn new(
        backend: Arc<dyn PlaybackBackend>,
        app_state: Arc<AppState>,
        database: Option<LibraryDatabase>,
    ) -> Self {
        let (control_tx, control_rx) = unbounded();
        let queue = Arc::new(RwLock::new(PlayQueue::new()));
        let context = QueueContext {
            queue: queue.clone(),
            backend,
            app_state,
            database,
            failures_in_row: Arc::new(AtomicUsize::new(0)),
        };

        Self::start_auto_advance(context.clone());
        Self::start_control_loop(context, control_rx);

        Self { queue, control_tx }
    }

    /// Replaces the queue with `entries` and plays `start_index`.
    ///
    /// Pass the collection the tracks came from so it gets marked as
    /// played. The current shuffle setting is kept.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::Disconnected` if the manager has stopped.
    pub fn set_queue(
        &self,
        entries: Vec<QueueEntry>,
        start_index: usize,
        collection_id: Option<i64>,
    ) -> Result<(), PlaybackError> {
        self.send(QueueControlMessage::SetQueue {
            entries,
            start_index,
            collection_id,
        })
    }

    /// Skips to the next track.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::Disconnected` if the manager has stopped.
    pub fn next_track(&self) -> Result<(), PlaybackError> {
        self.send(QueueControlMessage::Next)
    }

    /// Goes to the previous track, or restarts the current one.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::Disconnected` if the manager has stopped.
    pub fn previous_track(&self) -> Result<(), PlaybackError> {
        self.send(QueueControlMessage::Previous)
    }

    /// Plays the track at `position` in the queue.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::Disconnected` if the manager has stopped.
    pub fn jump(&self, position: usize) -> Result<(), PlaybackError> {
        self.send(QueueControlMessage::Jump(position))
    }

    /// Queues tracks right after the current one.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::Disconnected` if the manager has stopped.
    pub fn add_next(&self, entries: Vec<QueueEntry>) -> Result<(), PlaybackError> {
        self.send(QueueControlMessage::AddNext(entries))
    }

    /// Removes the track at `position` from the queue.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::Disconnected` if the manager has stopped.
    pub fn remove(&self, position: usize) -> Result<(), PlaybackError> {
        self.send(QueueControlMessage::Remove(position))
    }

    /// Turns shuffle on or off.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::Disconnected` if the manager has stopped.
    pub fn toggle_shuffle(&self) -> Result<(), PlaybackError> {
        self.send(QueueControlMessage::ToggleShuffle)
    }

    /// Steps to the next repeat mode.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::Disconnected` if the manager has stopped.
    pub fn cycle_repeat(&self) -> Result<(), PlaybackError> {
        self.send(QueueControlMessage::CycleRepeat)
    }

    /// Stops playback and keeps the queue.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::Disconnected` if the manager has stopped.
    pub fn stop(&self) -> Result<(), PlaybackError> {
        self.send(QueueControlMessage::Stop)
    }

    /// Gets the current queue state.
    #[must_use]
    pub fn get_queue(&self) -> PlaybackQueue {
        PlaybackQueue::from(&*self.queue.read())
    }

    fn send(&self, message: QueueControlMessage) -> Result<(), PlaybackError> {
        self.control_tx.try_send(message).map_err(|e| {
            debug!("QueueManager: Failed to send {:?}", e.into_inner());
            PlaybackError::Disconnected
        })
    }

    /// Starts the control loop processing queue commands.
    ///
    /// The loop ends when the manager is dropped.
    fn start_control_loop(context: QueueContext, control_rx: Receiver<QueueControlMessage>) {
        spawn(async move {
            while let Ok(message) = control_rx.recv().await {
                context.handle_message(message).await;
            }
            debug!("QueueManager: Control loop stopped");
            if let Err(e) = context.backend.stop() {
                warn!("QueueManager: Failed to stop playback: {e}");
            }
        });
    }

    /// Starts the auto-advance listener for track completion.
    ///
    /// A failed track is skipped without honouring `RepeatOne`. Playback
    /// stops once the player has failed on as many tracks in a row as the
    /// queue holds.
    fn start_auto_advance(context: QueueContext) {
        let track_finished_rx = context.backend.finished();
        debug!("QueueManager: Set up track finished receiver for auto-advance");

        spawn(async move {
            while let Ok(end) = track_finished_rx.recv().await {
                let next = match end {
                    Ok(()) => {
                        debug!("QueueManager: Track finished event received, auto-advancing");
                        context.failures_in_row.store(0, Ordering::Relaxed);
                        context.queue.write().advance().cloned()
                    }
                    Err(e) => {
                        let failures = context.failures_in_row.fetch_add(1, Ordering::Relaxed) + 1;
                        let mut queue = context.queue.write();
                        if failures >= queue.len() {
                            warn!("QueueManager: Player failed on {failures} tracks in a row, stopping: {e}");
                            None
                        } else {
                            warn!("QueueManager: Player failed, skipping track: {e}");
                            queue.skip_failed().cloned()
                        }
                    }
                };
                context.play(next);
            }
        });
    }
}

impl QueueContext {
    async fn handle_message(&self, message: QueueControlMessage) {
        self.failures_in_row.store(0, Ordering::Relaxed);
        match message {
            QueueControlMessage::SetQueue {
                entries,
                start_index,
                collection_id,
            } => {
                debug!(
                    "QueueManager: Setting new queue with {} tracks",
                    entries.len()
                );
                let loaded = {
                    let mut queue = self.queue.write();
                    let shuffle = queue.shuffle();
                    queue.load(entries, start_index, shuffle).cloned()
                };
                match loaded {
                    Ok(entry) => {
                        self.play(Some(entry));
                        self.mark_as_played(collection_id).await;
                    }
                    Err(e) => warn!("QueueManager: Cannot load queue: {e}"),
                }
            }
            QueueControlMessage::Next => {
                let next = self.queue.write().next().cloned();
                if next.is_none() {
                    debug!("QueueManager: At end of queue, no next track");
                }
                self.play(next);
            }
            QueueControlMessage::Previous => {
                let elapsed = self.backend.elapsed();
                let previous = self.queue.write().previous(elapsed).cloned();
                self.play(previous);
            }
            QueueControlMessage::Jump(position) => {
                let target = self.queue.write().jump(position).cloned();
                match target {
                    Ok(entry) => self.play(Some(entry)),
                    Err(e) => warn!("QueueManager: Cannot jump: {e}"),
                }
            }
            QueueControlMessage::AddNext(entries) => {
                let (was_idle, current) = {
                    let mut queue = self.queue.write();
                    let was_idle = queue.current().is_none();
                    queue.add_next(entries);
                    (was_idle, queue.current().cloned())
                };
                if was_idle {
                    self.play(current);
                } else {
                    self.broadcast_queue_change();
                }
            }
            QueueControlMessage::Remove(position) => {
                let (removed, current) = {
                    let mut queue = self.queue.write();
                    let before = queue.position();
                    let removed = queue.remove(position);
                    (removed.map(|_| before == Some(position)), queue.current().cloned())
                };
                match removed {
                    Ok(true) => self.play(current),
                    Ok(false) => self.broadcast_queue_change(),
                    Err(e) => warn!("QueueManager: Cannot remove: {e}"),
                }
            }
            QueueControlMessage::ToggleShuffle => {
                {
                    let mut queue = self.queue.write();
                    let shuffle = !queue.shuffle();
                    queue.set_shuffle(shuffle);
                }
                self.broadcast_queue_change();
            }
            QueueControlMessage::CycleRepeat => {
                let repeat = self.queue.write().cycle_repeat();
                debug!("QueueManager: Repeat is now {:?}", repeat);
                self.broadcast_queue_change();
            }
            QueueControlMessage::Stop => self.play(None),
        }
    }

    /// Plays `entry`, or stops when there is none, then publishes the new
    /// state.
    fn play(&self, entry: Option<QueueEntry>) {
        let playing = match &entry {
            Some(track) => match self.backend.play(&track.path) {
                Ok(()) => true,
                Err(e) => {
                    warn!("QueueManager: Failed to play {:?}: {e}", track.path);
                    false
                }
            },
            None => {
                if let Err(e) = self.backend.stop() {
                    warn!("QueueManager: Failed to stop playback: {e}");
                }
                false
            }
        };

        if playing {
            self.app_state.update_current_track(entry);
            self.app_state.update_playback_state(PlaybackState::Playing);
        } else {
            self.app_state.update_playback_state(PlaybackState::Stopped);
        }
        self.broadcast_queue_change();
    }

    async fn mark_as_played(&self, collection_id: Option<i64>) {
        let (Some(database), Some(collection_id)) = (&self.database, collection_id) else {
            return;
        };
        if let Err(e) = database.mark_as_played(collection_id).await {
            warn!("QueueManager: Failed to mark collection {collection_id} as played: {e}");
        }
    }

    /// Broadcasts queue state changes to subscribers.
    fn broadcast_queue_change(&self) {
        let snapshot = PlaybackQueue::from(&*self.queue.read());
        self.app_state.update_queue(snapshot);
    }
}
