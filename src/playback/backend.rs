//! Audio output through an external player process.
//!
//! Decoding and output are left to a command-line player such as `mpv`.
//! The backend starts one process per track, kills it on stop or skip,
//! and reports the end of a track when the process exits on its own:
//! `Ok(())` for a clean exit, an error when the player failed.

use std::{
    path::Path,
    process::Stdio,
    time::{Duration, Instant},
};

use {
    async_channel::{Receiver, Sender, unbounded},
    parking_lot::Mutex,
    tokio::{
        process::Command,
        spawn,
        sync::oneshot::{self, error::TryRecvError},
    },
    tracing::{debug, warn},
};

use crate::error::domain::PlaybackError;

/// Something that can play one track at a time.
pub trait PlaybackBackend: Send + Sync {
    /// Starts playing `path`, replacing whatever is playing.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError` if playback cannot start.
    fn play(&self, path: &Path) -> Result<(), PlaybackError>;

    /// Stops playback. Stopping does not count as finishing a track.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError` if the player cannot be stopped.
    fn stop(&self) -> Result<(), PlaybackError>;

    /// Time since the current track started, zero when idle.
    fn elapsed(&self) -> Duration;

    /// Receives one item per track that ended without a stop request.
    ///
    /// `Ok(())` means the track played to its end. An error means the
    /// player gave up on it (unreadable file, unsupported format).
    fn finished(&self) -> Receiver<Result<(), PlaybackError>>;
}

struct RunningTrack {
    started: Instant,
    kill_tx: oneshot::Sender<()>,
}

/// Plays tracks by spawning an external player command.
pub struct CommandBackend {
    /// Program followed by its arguments. The track path is appended.
    command: Vec<String>,
    running: Mutex<Option<RunningTrack>>,
    finished_tx: Sender<Result<(), PlaybackError>>,
    finished_rx: Receiver<Result<(), PlaybackError>>,
}

impl CommandBackend {
    /// Creates a backend for `command`, e.g. `["mpv", "--no-video"]`.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::NoPlayerCommand` for an empty command.
    pub fn new(command: Vec<String>) -> Result<Self, PlaybackError> {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(PlaybackError::NoPlayerCommand);
        }
        let (finished_tx, finished_rx) = unbounded();
        Ok(Self {
            command,
            running: Mutex::new(None),
            finished_tx,
            finished_rx,
        })
    }

    /// Returns `true` while a player process is alive.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|track| !track.kill_tx.is_closed())
    }
}

impl PlaybackBackend for CommandBackend {
    fn play(&self, path: &Path) -> Result<(), PlaybackError> {
        self.stop()?;

        let (program, args) = self
            .command
            .split_first()
            .ok_or(PlaybackError::NoPlayerCommand)?;
        let mut child = Command::new(program)
            .args(args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        debug!(pid = child.id(), "Playing {:?}", path);

        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        let finished_tx = self.finished_tx.clone();
        let track = path.to_path_buf();

        spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    // Lost the race against a kill request: not a natural end.
                    if !matches!(kill_rx.try_recv(), Err(TryRecvError::Empty)) {
                        return;
                    }
                    let end = match status {
                        Ok(status) if !status.success() => {
                            warn!("Player exited with {} on {:?}", status, track);
                            Err(PlaybackError::PlayerFailed {
                                status: status.to_string(),
                            })
                        }
                        Ok(_) => {
                            debug!("Finished {:?}", track);
                            Ok(())
                        }
                        Err(e) => {
                            warn!("Failed to wait for player: {}", e);
                            Err(PlaybackError::ProcessError(e))
                        }
                    };
                    if finished_tx.send(end).await.is_err() {
                        debug!("No listener for finished tracks");
                    }
                }
                _ = &mut kill_rx => {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill player: {}", e);
                    }
                }
            }
        });

        *self.running.lock() = Some(RunningTrack {
            started: Instant::now(),
            kill_tx,
        });
        Ok(())
    }

    fn stop(&self) -> Result<(), PlaybackError> {
        if let Some(track) = self.running.lock().take() {
            // The task is gone once the process has exited.
            let _ = track.kill_tx.send(());
        }
        Ok(())
    }

    fn elapsed(&self) -> Duration {
        self.running
            .lock()
            .as_ref()
            .map_or(Duration::ZERO, |track| track.started.elapsed())
    }

    fn finished(&self) -> Receiver<Result<(), PlaybackError>> {
        self.finished_rx.clone()
    }
}

impl Drop for CommandBackend {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::{path::Path, time::Duration};

    use tokio::time::timeout;

    use crate::{
        error::domain::PlaybackError,
        playback::backend::{CommandBackend, PlaybackBackend},
    };

    #[test]
    fn test_empty_command_is_rejected() {
        assert!(matches!(
            CommandBackend::new(Vec::new()),
            Err(PlaybackError::NoPlayerCommand)
        ));
        assert!(matches!(
            CommandBackend::new(vec![" ".to_string()]),
            Err(PlaybackError::NoPlayerCommand)
        ));
    }

    #[tokio::test]
    async fn test_natural_exit_reports_finished() {
        let backend = CommandBackend::new(vec!["true".to_string()]).unwrap();
        let finished = backend.finished();

        backend.play(Path::new("/music/track.flac")).unwrap();

        timeout(Duration::from_secs(5), finished.recv())
            .await
            .expect("finished event")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_failing_player_reports_failure() {
        let backend = CommandBackend::new(vec!["false".to_string()]).unwrap();
        let finished = backend.finished();

        backend.play(Path::new("/music/missing.flac")).unwrap();

        let end = timeout(Duration::from_secs(5), finished.recv())
            .await
            .expect("finished event")
            .unwrap();
        assert!(matches!(end, Err(PlaybackError::PlayerFailed { .. })));
    }

    #[tokio::test]
    async fn test_stop_does_not_report_finished() {
        let backend = CommandBackend::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "sleep 30".to_string(),
        ])
        .unwrap();
        let finished = backend.finished();

        backend.play(Path::new("/music/track.flac")).unwrap();
        assert!(backend.is_playing());
        assert!(backend.elapsed() < Duration::from_secs(30));
        backend.stop().unwrap();

        assert!(timeout(Duration::from_millis(300), finished.recv()).await.is_err());
        assert_eq!(backend.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_play() {
        let backend =
            CommandBackend::new(vec!["/nonexistent/tunedeck-player".to_string()]).unwrap();
        assert!(matches!(
            backend.play(Path::new("/music/track.flac")),
            Err(PlaybackError::ProcessError(_))
        ));
    }
}
