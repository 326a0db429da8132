//! Playback control: the play queue, the player backend and the manager
//! tying them to application state.

pub mod backend;
pub mod queue;
pub mod queue_manager;

#[cfg(test)]
mod queue_manager_tests;

pub use {
    backend::{CommandBackend, PlaybackBackend},
    queue::{PlayQueue, QueueEntry, RepeatState, SKIP_BACK_SECOND_THRESHOLD},
    queue_manager::QueueManager,
};
