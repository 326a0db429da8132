//! Global application state with reactive update mechanisms.
//!
//! This module provides the central `AppState` container that manages
//! shared state across the application with thread-safe access and
//! broadcast notifications for every change.

use std::sync::Arc;

use {
    parking_lot::RwLock,
    serde::{Deserialize, Serialize},
    tokio::sync::broadcast::{Receiver, Sender, channel},
};

use crate::{
    config::settings::UserSettings,
    library::{LibrarySort, SortOrder, TreeSortRole},
    playback::queue::{PlayQueue, QueueEntry, RepeatState},
};

/// Whether a track is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
}

/// Snapshot of the play queue for observers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaybackQueue {
    /// Tracks in play order.
    pub tracks: Vec<QueueEntry>,
    /// Current position in `tracks`.
    pub current_index: Option<usize>,
    pub shuffle: bool,
    pub repeat: RepeatState,
}

impl From<&PlayQueue> for PlaybackQueue {
    fn from(queue: &PlayQueue) -> Self {
        Self {
            tracks: queue.iter().cloned().collect(),
            current_index: queue.position(),
            shuffle: queue.shuffle(),
            repeat: queue.repeat(),
        }
    }
}

/// Central state container with thread-safe access.
///
/// The `AppState` holds all global application state and provides
/// reactive update mechanisms for front ends to subscribe to changes.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Current playback state.
    pub playback: Arc<RwLock<PlaybackState>>,
    /// Currently playing track.
    pub current_track: Arc<RwLock<Option<QueueEntry>>>,
    /// Latest queue snapshot.
    pub queue: Arc<RwLock<PlaybackQueue>>,
    /// Current library view state.
    pub library: Arc<RwLock<LibraryState>>,
    /// Broadcast channel for state change notifications.
    state_tx: Sender<AppStateEvent>,
}

/// Current library view state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LibraryState {
    /// Collection shown in the library table, `None` for the whole library.
    pub selected_collection: Option<i64>,
    /// Collection tree sort.
    pub tree_sort_role: TreeSortRole,
    pub tree_sort_order: SortOrder,
    /// Library table sort.
    pub library_sort: LibrarySort,
}

impl LibraryState {
    /// Restores the view saved in the user's settings.
    #[must_use]
    pub fn from_settings(settings: &UserSettings) -> Self {
        Self {
            selected_collection: settings.library_collection_id,
            tree_sort_role: settings.tree_sort_role,
            tree_sort_order: settings.tree_sort_order,
            library_sort: LibrarySort {
                column: settings.library_sort_column,
                order: settings.library_sort_order,
            },
        }
    }
}

/// Application state change events.
#[derive(Debug, Clone, PartialEq)]
pub enum AppStateEvent {
    /// Playback state changed.
    PlaybackStateChanged(PlaybackState),
    /// Current track changed.
    CurrentTrackChanged(Option<QueueEntry>),
    /// Queue contents, position, shuffle or repeat changed.
    QueueChanged(PlaybackQueue),
    /// Library state changed.
    LibraryStateChanged(LibraryState),
    /// A different collection was selected.
    CollectionSelected(Option<i64>),
}

impl AppState {
    /// Creates a new application state instance.
    ///
    /// # Arguments
    ///
    /// * `library` - Initial library view state.
    #[must_use]
    pub fn new(library: LibraryState) -> Self {
        let (state_tx, _) = channel(64);

        Self {
            playback: Arc::new(RwLock::new(PlaybackState::Stopped)),
            current_track: Arc::new(RwLock::new(None)),
            queue: Arc::new(RwLock::new(PlaybackQueue::default())),
            library: Arc::new(RwLock::new(library)),
            state_tx,
        }
    }

    /// Updates the playback state and notifies subscribers.
    pub fn update_playback_state(&self, state: PlaybackState) {
        *self.playback.write() = state;
        let _ = self
            .state_tx
            .send(AppStateEvent::PlaybackStateChanged(state));
    }

    /// Updates the current track and notifies subscribers.
    pub fn update_current_track(&self, track: Option<QueueEntry>) {
        *self.current_track.write() = track.clone();
        let _ = self
            .state_tx
            .send(AppStateEvent::CurrentTrackChanged(track));
    }

    /// Stores a new queue snapshot and notifies subscribers.
    pub fn update_queue(&self, queue: PlaybackQueue) {
        *self.queue.write() = queue.clone();
        let _ = self.state_tx.send(AppStateEvent::QueueChanged(queue));
    }

    /// Updates the library state and notifies subscribers.
    pub fn update_library_state(&self, library_state: LibraryState) {
        *self.library.write() = library_state.clone();
        let _ = self
            .state_tx
            .send(AppStateEvent::LibraryStateChanged(library_state));
    }

    /// Selects the collection shown in the library table.
    pub fn select_collection(&self, collection_id: Option<i64>) {
        self.library.write().selected_collection = collection_id;
        let _ = self
            .state_tx
            .send(AppStateEvent::CollectionSelected(collection_id));
    }

    /// Subscribes to application state changes.
    pub fn subscribe(&self) -> Receiver<AppStateEvent> {
        self.state_tx.subscribe()
    }

    pub fn get_playback_state(&self) -> PlaybackState {
        *self.playback.read()
    }

    pub fn get_current_track(&self) -> Option<QueueEntry> {
        self.current_track.read().clone()
    }

    pub fn get_queue(&self) -> PlaybackQueue {
        self.queue.read().clone()
    }

    pub fn get_library_state(&self) -> LibraryState {
        self.library.read().clone()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(LibraryState::default())
    }
}
