//! Fetching new music with an external ripper command.
//!
//! The ripper (by default `rip url <url>`) runs inside the download
//! directory. Importing the downloaded files is left to the caller.

use std::{
    fs::create_dir_all,
    io::Error as IoError,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};

use {
    thiserror::Error,
    tokio::process::Command,
    tracing::{debug, info},
};

use crate::config::settings::UserSettings;

/// Error type for download operations.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// No ripper command is configured.
    #[error("No ripper command configured")]
    NoRipperCommand,
    /// The URL is blank.
    #[error("Invalid download URL: '{url}'")]
    InvalidUrl { url: String },
    /// The ripper could not be started or the directory not created.
    #[error("IO error: {0}")]
    IoError(#[from] IoError),
    /// The ripper ran and failed.
    #[error("Ripper exited with {status}: {stderr}")]
    CommandFailed { status: ExitStatus, stderr: String },
}

/// Runs the configured ripper.
#[derive(Debug, Clone)]
pub struct Downloader {
    command: Vec<String>,
    directory: PathBuf,
}

impl Downloader {
    /// Creates a downloader running `command` in `directory`.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::NoRipperCommand` for an empty command.
    pub fn new(command: Vec<String>, directory: PathBuf) -> Result<Self, DownloadError> {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(DownloadError::NoRipperCommand);
        }
        Ok(Self { command, directory })
    }

    /// Creates a downloader from the user's settings.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::NoRipperCommand` for an empty ripper command.
    pub fn from_settings(settings: &UserSettings) -> Result<Self, DownloadError> {
        Self::new(settings.ripper_command.clone(), settings.download_directory())
    }

    /// Where downloads land.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Downloads `url` into the download directory.
    ///
    /// # Returns
    ///
    /// The download directory, ready to be imported.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::CommandFailed` with the ripper's stderr if it
    /// exits unsuccessfully, or an I/O error if it cannot be started.
    pub async fn fetch(&self, url: &str) -> Result<PathBuf, DownloadError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(DownloadError::InvalidUrl {
                url: url.to_string(),
            });
        }
        let (program, args) = self
            .command
            .split_first()
            .ok_or(DownloadError::NoRipperCommand)?;

        create_dir_all(&self.directory)?;
        info!("Downloading {} into {:?}", url, self.directory);

        let output = Command::new(program)
            .args(args)
            .arg(url)
            .current_dir(&self.directory)
            .stdin(Stdio::null())
            .output()
            .await?;

        debug!(
            "Ripper output: {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );
        if !output.status.success() {
            return Err(DownloadError::CommandFailed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(self.directory.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;

    use tempfile::TempDir;

    use crate::downloader::{DownloadError, Downloader};

    fn shell(script: &str, dir: &TempDir) -> Downloader {
        Downloader::new(
            vec!["sh".to_string(), "-c".to_string(), script.to_string(), "rip".to_string()],
            dir.path().join("downloads"),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let result = Downloader::new(Vec::new(), "/tmp".into());
        assert!(matches!(result, Err(DownloadError::NoRipperCommand)));
    }

    #[tokio::test]
    async fn test_fetch_runs_in_download_directory() {
        let temp_dir = TempDir::new().unwrap();
        let downloader = shell("echo \"$1\" > url.txt", &temp_dir);

        let directory = downloader.fetch(" https://example.com/album/1 ").await.unwrap();

        assert_eq!(directory, temp_dir.path().join("downloads"));
        assert_eq!(
            read_to_string(directory.join("url.txt")).unwrap().trim(),
            "https://example.com/album/1"
        );
    }

    #[tokio::test]
    async fn test_fetch_reports_failure() {
        let temp_dir = TempDir::new().unwrap();
        let downloader = shell("echo 'no such track' >&2; exit 3", &temp_dir);

        match downloader.fetch("https://example.com/track/2").await {
            Err(DownloadError::CommandFailed { status, stderr }) => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "no such track");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_rejects_blank_url() {
        let temp_dir = TempDir::new().unwrap();
        let downloader = shell("true", &temp_dir);
        assert!(matches!(
            downloader.fetch("  ").await,
            Err(DownloadError::InvalidUrl { .. })
        ));
    }
}
