//! Centralized state management with broadcast updates to front ends.
//!
//! This module provides the foundation for managing global application state
//! with thread-safe access and reactive update mechanisms.

pub mod app_state;

pub use app_state::{AppState, AppStateEvent, LibraryState, PlaybackQueue, PlaybackState};
