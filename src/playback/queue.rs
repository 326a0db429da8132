//! Play queue ordering: shuffle, repeat and manually queued tracks.
//!
//! The queue keeps the loaded tracks in `entries` and a separate play order
//! (`list_indices`) pointing into them, so shuffling only permutes indices
//! and turning shuffle off can restore the original order.

use std::{path::PathBuf, time::Duration};

use {
    rand::{Rng, rng, seq::SliceRandom},
    serde::{Deserialize, Serialize},
};

use crate::{error::domain::PlaybackError, library::LibraryMusic};

/// Going back within this much of a track's start steps to the previous
/// track. Past it, the current track restarts instead.
pub const SKIP_BACK_SECOND_THRESHOLD: Duration = Duration::from_secs(5);

/// Repeat modes, in the order `cycle_repeat` visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RepeatState {
    #[default]
    NoRepeat,
    RepeatQueue,
    RepeatOne,
}

impl RepeatState {
    /// The mode after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::NoRepeat => Self::RepeatQueue,
            Self::RepeatQueue => Self::RepeatOne,
            Self::RepeatOne => Self::NoRepeat,
        }
    }
}

/// One track in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub music_id: i64,
    pub title: String,
    pub artists: String,
    pub path: PathBuf,
    /// Queued by hand with "play next" rather than loaded from a collection.
    pub manually_added: bool,
}

impl QueueEntry {
    /// Builds an entry from a library row.
    #[must_use]
    pub fn from_music(music: &LibraryMusic) -> Self {
        Self {
            music_id: music.music_id,
            title: music.music_name.clone(),
            artists: music.artists_display(),
            path: music.path(),
            manually_added: false,
        }
    }
}

/// The play queue.
#[derive(Debug, Clone, Default)]
pub struct PlayQueue {
    /// Loaded tracks. Collection tracks first, then manual additions.
    entries: Vec<QueueEntry>,
    /// Play order, as indices into `entries`.
    list_indices: Vec<usize>,
    /// Current index into `list_indices`.
    position: Option<usize>,
    /// Number of collection tracks at the front of `entries`.
    source_len: usize,
    shuffle: bool,
    repeat: RepeatState,
}

impl PlayQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the queue with `entries` and makes `start_index` current.
    ///
    /// With `shuffle` on, the whole order is shuffled and the chosen track
    /// is swapped to the front, so it plays first and everything else
    /// follows in random order.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::EmptyQueue` for no entries and
    /// `PlaybackError::OutOfRange` for a bad `start_index`.
    pub fn load(
        &mut self,
        entries: Vec<QueueEntry>,
        start_index: usize,
        shuffle: bool,
    ) -> Result<&QueueEntry, PlaybackError> {
        self.load_with(entries, start_index, shuffle, &mut rng())
    }

    pub(crate) fn load_with<R: Rng + ?Sized>(
        &mut self,
        mut entries: Vec<QueueEntry>,
        start_index: usize,
        shuffle: bool,
        rng: &mut R,
    ) -> Result<&QueueEntry, PlaybackError> {
        if entries.is_empty() {
            return Err(PlaybackError::EmptyQueue);
        }
        if start_index >= entries.len() {
            return Err(PlaybackError::OutOfRange {
                position: start_index,
                len: entries.len(),
            });
        }

        for entry in &mut entries {
            entry.manually_added = false;
        }
        self.source_len = entries.len();
        self.list_indices = (0..entries.len()).collect();
        self.entries = entries;
        self.shuffle = shuffle;

        if shuffle {
            self.list_indices.shuffle(rng);
            if let Some(chosen) = self.list_indices.iter().position(|&i| i == start_index) {
                self.list_indices.swap(0, chosen);
            }
            self.position = Some(0);
        } else {
            self.position = Some(start_index);
        }

        self.current().ok_or(PlaybackError::EmptyQueue)
    }

    /// The track at the current position.
    #[must_use]
    pub fn current(&self) -> Option<&QueueEntry> {
        self.position.and_then(|position| self.entry_at(position))
    }

    /// Current position in play order.
    #[must_use]
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.list_indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list_indices.is_empty()
    }

    #[must_use]
    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    #[must_use]
    pub fn repeat(&self) -> RepeatState {
        self.repeat
    }

    /// Entries in play order.
    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.list_indices.iter().filter_map(|&i| self.entries.get(i))
    }

    fn entry_at(&self, position: usize) -> Option<&QueueEntry> {
        self.list_indices
            .get(position)
            .and_then(|&i| self.entries.get(i))
    }

    /// Moves to the following track on a user skip.
    ///
    /// Wraps around under `RepeatQueue`. At the end of the queue otherwise,
    /// returns `None` and keeps the position.
    pub fn next(&mut self) -> Option<&QueueEntry> {
        let position = self.position?;
        let next = if position + 1 < self.len() {
            position + 1
        } else if self.repeat == RepeatState::RepeatQueue && !self.is_empty() {
            0
        } else {
            return None;
        };
        self.position = Some(next);
        self.current()
    }

    /// Moves on after the current track finished playing.
    ///
    /// Same as [`next`](Self::next), except `RepeatOne` stays on the
    /// current track.
    pub fn advance(&mut self) -> Option<&QueueEntry> {
        if self.repeat == RepeatState::RepeatOne {
            return self.current();
        }
        self.next()
    }

    /// Moves on after the player failed on the current track.
    ///
    /// Ignores `RepeatOne`, and returns `None` instead of landing on the
    /// same position again.
    pub fn skip_failed(&mut self) -> Option<&QueueEntry> {
        let position = self.position?;
        self.next()?;
        if self.position == Some(position) {
            return None;
        }
        self.current()
    }

    /// Goes back, or restarts the current track once it has played for
    /// more than [`SKIP_BACK_SECOND_THRESHOLD`]. The position never goes
    /// below the first track.
    pub fn previous(&mut self, elapsed: Duration) -> Option<&QueueEntry> {
        let position = self.position?;
        if elapsed <= SKIP_BACK_SECOND_THRESHOLD {
            self.position = Some(position.saturating_sub(1));
        }
        self.current()
    }

    /// Makes `position` current.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::OutOfRange` past the end of the queue.
    pub fn jump(&mut self, position: usize) -> Result<&QueueEntry, PlaybackError> {
        if position >= self.len() {
            return Err(PlaybackError::OutOfRange {
                position,
                len: self.len(),
            });
        }
        self.position = Some(position);
        self.current().ok_or(PlaybackError::EmptyQueue)
    }

    /// Queues tracks to play right after the current one, in the given
    /// order. On an idle queue they become the queue, starting at the first.
    pub fn add_next(&mut self, entries: Vec<QueueEntry>) {
        if entries.is_empty() {
            return;
        }
        let insert_at = self.position.map_or(self.len(), |position| position + 1);
        let first_new = self.entries.len();

        self.entries.extend(entries.into_iter().map(|mut entry| {
            entry.manually_added = true;
            entry
        }));
        let new_indices = first_new..self.entries.len();
        self.list_indices.splice(insert_at..insert_at, new_indices);

        if self.position.is_none() {
            self.position = Some(insert_at);
        }
    }

    /// Removes the track at `position` from the play order.
    ///
    /// Removing the current track makes the following one current, or the
    /// new last one when the current was last.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::OutOfRange` past the end of the queue.
    pub fn remove(&mut self, position: usize) -> Result<QueueEntry, PlaybackError> {
        if position >= self.len() {
            return Err(PlaybackError::OutOfRange {
                position,
                len: self.len(),
            });
        }
        let removed = self.list_indices.remove(position);

        self.position = match self.position {
            _ if self.list_indices.is_empty() => None,
            Some(current) if position < current => Some(current - 1),
            Some(current) => Some(current.min(self.len() - 1)),
            None => None,
        };

        self.entries
            .get(removed)
            .cloned()
            .ok_or(PlaybackError::OutOfRange {
                position: removed,
                len: self.entries.len(),
            })
    }

    /// Turns shuffle on or off.
    ///
    /// On: shuffles everything after the current position. Off: restores the
    /// collection order, drops manually queued tracks and resumes from the
    /// most recently reached collection track.
    pub fn set_shuffle(&mut self, shuffle: bool) {
        self.set_shuffle_with(shuffle, &mut rng());
    }

    pub(crate) fn set_shuffle_with<R: Rng + ?Sized>(&mut self, shuffle: bool, rng: &mut R) {
        self.shuffle = shuffle;
        if shuffle {
            let split = self.position.map_or(0, |position| position + 1);
            if split < self.list_indices.len() {
                self.list_indices[split..].shuffle(rng);
            }
            return;
        }

        let resume = self.position.and_then(|position| {
            self.list_indices[..=position.min(self.len().saturating_sub(1))]
                .iter()
                .rev()
                .copied()
                .find(|&i| self.entries.get(i).is_some_and(|e| !e.manually_added))
        });

        self.entries.truncate(self.source_len);
        self.list_indices = (0..self.source_len).collect();
        self.position = match resume {
            Some(index) => Some(index),
            None if self.source_len > 0 && self.position.is_some() => Some(0),
            None => None,
        };
    }

    /// Steps to the next repeat mode and returns it.
    pub fn cycle_repeat(&mut self) -> RepeatState {
        self.repeat = self.repeat.next();
        self.repeat
    }

    /// Drops every track.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.list_indices.clear();
        self.position = None;
        self.source_len = 0;
    }
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, time::Duration};

    use rand::{SeedableRng, rngs::StdRng};

    use crate::{
        error::domain::PlaybackError,
        playback::queue::{PlayQueue, QueueEntry, RepeatState},
    };

    fn entries(ids: &[i64]) -> Vec<QueueEntry> {
        ids.iter()
            .map(|&id| QueueEntry {
                music_id: id,
                title: format!("Track {id}"),
                artists: "Artist".to_string(),
                path: PathBuf::from(format!("/music/{id}.flac")),
                manually_added: false,
            })
            .collect()
    }

    fn order(queue: &PlayQueue) -> Vec<i64> {
        queue.iter().map(|e| e.music_id).collect()
    }

    fn current_id(queue: &PlayQueue) -> Option<i64> {
        queue.current().map(|e| e.music_id)
    }

    #[test]
    fn test_load_in_order() {
        let mut queue = PlayQueue::new();
        let current = queue.load(entries(&[1, 2, 3]), 1, false).unwrap();
        assert_eq!(current.music_id, 2);
        assert_eq!(order(&queue), vec![1, 2, 3]);
        assert_eq!(queue.position(), Some(1));
    }

    #[test]
    fn test_load_rejects_bad_input() {
        let mut queue = PlayQueue::new();
        assert!(matches!(
            queue.load(Vec::new(), 0, false),
            Err(PlaybackError::EmptyQueue)
        ));
        assert!(matches!(
            queue.load(entries(&[1]), 3, false),
            Err(PlaybackError::OutOfRange { position: 3, len: 1 })
        ));
    }

    #[test]
    fn test_load_shuffled_plays_chosen_track_first() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut queue = PlayQueue::new();
        queue
            .load_with(entries(&[1, 2, 3, 4, 5, 6]), 4, true, &mut rng)
            .unwrap();

        assert_eq!(queue.position(), Some(0));
        assert_eq!(current_id(&queue), Some(5));
        let mut sorted = order(&queue);
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_next_stops_at_end_without_repeat() {
        let mut queue = PlayQueue::new();
        queue.load(entries(&[1, 2]), 0, false).unwrap();

        assert_eq!(queue.next().map(|e| e.music_id), Some(2));
        assert!(queue.next().is_none());
        assert_eq!(queue.position(), Some(1));
    }

    #[test]
    fn test_repeat_modes() {
        let mut queue = PlayQueue::new();
        queue.load(entries(&[1, 2]), 1, false).unwrap();

        assert_eq!(queue.cycle_repeat(), RepeatState::RepeatQueue);
        assert_eq!(queue.next().map(|e| e.music_id), Some(1));

        assert_eq!(queue.cycle_repeat(), RepeatState::RepeatOne);
        assert_eq!(queue.advance().map(|e| e.music_id), Some(1));
        // A manual skip still moves on.
        assert_eq!(queue.next().map(|e| e.music_id), Some(2));

        assert_eq!(queue.cycle_repeat(), RepeatState::NoRepeat);
    }

    #[test]
    fn test_skip_failed_never_lands_on_the_same_track() {
        let mut queue = PlayQueue::new();
        queue.load(entries(&[1]), 0, false).unwrap();
        queue.cycle_repeat();
        queue.cycle_repeat();
        assert_eq!(queue.repeat(), RepeatState::RepeatOne);
        assert!(queue.skip_failed().is_none());

        queue.cycle_repeat();
        queue.cycle_repeat();
        assert_eq!(queue.repeat(), RepeatState::RepeatQueue);
        assert!(queue.skip_failed().is_none());

        queue.load(entries(&[1, 2]), 1, false).unwrap();
        assert_eq!(queue.skip_failed().map(|e| e.music_id), Some(1));
    }

    #[test]
    fn test_previous_restarts_after_threshold() {
        let mut queue = PlayQueue::new();
        queue.load(entries(&[1, 2, 3]), 2, false).unwrap();

        assert_eq!(queue.previous(Duration::from_secs(12)).map(|e| e.music_id), Some(3));
        assert_eq!(queue.previous(Duration::from_secs(2)).map(|e| e.music_id), Some(2));
        assert_eq!(queue.previous(Duration::from_secs(5)).map(|e| e.music_id), Some(1));
        assert_eq!(queue.previous(Duration::ZERO).map(|e| e.music_id), Some(1));
    }

    #[test]
    fn test_add_next_inserts_after_current() {
        let mut queue = PlayQueue::new();
        queue.load(entries(&[1, 2, 3]), 0, false).unwrap();

        queue.add_next(entries(&[8, 9]));

        assert_eq!(order(&queue), vec![1, 8, 9, 2, 3]);
        assert!(queue.iter().nth(1).unwrap().manually_added);
        assert_eq!(queue.next().map(|e| e.music_id), Some(8));
    }

    #[test]
    fn test_add_next_on_idle_queue() {
        let mut queue = PlayQueue::new();
        queue.add_next(entries(&[4]));
        assert_eq!(current_id(&queue), Some(4));
    }

    #[test]
    fn test_remove_adjusts_position() {
        let mut queue = PlayQueue::new();
        queue.load(entries(&[1, 2, 3, 4]), 2, false).unwrap();

        assert_eq!(queue.remove(0).unwrap().music_id, 1);
        assert_eq!(current_id(&queue), Some(3));

        assert_eq!(queue.remove(1).unwrap().music_id, 3);
        assert_eq!(current_id(&queue), Some(4));

        assert_eq!(queue.remove(1).unwrap().music_id, 4);
        assert_eq!(current_id(&queue), Some(2));

        assert!(queue.remove(5).is_err());
        queue.remove(0).unwrap();
        assert!(queue.current().is_none());
    }

    #[test]
    fn test_jump() {
        let mut queue = PlayQueue::new();
        queue.load(entries(&[1, 2, 3]), 0, false).unwrap();
        assert_eq!(queue.jump(2).unwrap().music_id, 3);
        assert!(queue.jump(3).is_err());
    }

    #[test]
    fn test_shuffle_on_keeps_history() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut queue = PlayQueue::new();
        queue.load(entries(&[1, 2, 3, 4, 5, 6, 7, 8]), 2, false).unwrap();

        queue.set_shuffle_with(true, &mut rng);

        let shuffled = order(&queue);
        assert_eq!(&shuffled[..3], &[1, 2, 3]);
        let mut rest = shuffled[3..].to_vec();
        rest.sort_unstable();
        assert_eq!(rest, vec![4, 5, 6, 7, 8]);
        assert_eq!(current_id(&queue), Some(3));
    }

    #[test]
    fn test_shuffle_off_restores_order_and_drops_manual_tracks() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut queue = PlayQueue::new();
        queue
            .load_with(entries(&[1, 2, 3, 4, 5]), 0, true, &mut rng)
            .unwrap();
        queue.next();
        let reached = current_id(&queue).unwrap();
        queue.add_next(entries(&[42]));
        queue.next();
        assert_eq!(current_id(&queue), Some(42));

        queue.set_shuffle(false);

        assert!(!queue.shuffle());
        assert_eq!(order(&queue), vec![1, 2, 3, 4, 5]);
        assert_eq!(current_id(&queue), Some(reached));
    }
}
