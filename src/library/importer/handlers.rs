//! Per-file import steps: tag extraction and cover storage.

use std::{
    fs::{create_dir_all, metadata, write},
    io::Error as IoError,
    path::Path,
};

use {
    chrono::{DateTime, NaiveDate, NaiveDateTime, Utc},
    lofty::{
        error::LoftyError,
        picture::PictureType::CoverFront,
        prelude::{
            AudioFile,
            ItemKey::{AlbumArtist, Isrc, Lyrics as LyricsKey, RecordingDate, ReleaseDate, Year},
            TaggedFileExt,
        },
        probe::Probe,
        tag::{Accessor, Tag},
    },
    thiserror::Error,
};

use crate::library::{
    lyrics::Lyrics,
    models::{CoverArt, NewMusic},
};

/// Error type for metadata extraction operations.
#[derive(Error, Debug)]
pub enum MetadataError {
    /// Failed to read or parse the audio file.
    #[error("Failed to read audio file: {0}")]
    ReadError(#[from] LoftyError),
    /// Failed to read file system metadata.
    #[error("Failed to stat audio file: {0}")]
    IoError(#[from] IoError),
    /// The file format is not supported.
    #[error("Unsupported file format")]
    UnsupportedFormat,
    /// Missing required metadata fields.
    #[error("Missing required metadata field: {field}")]
    MissingField { field: String },
    /// The release date tag could not be understood.
    #[error("Unrecognized release date: {value}")]
    InvalidDate { value: String },
}

impl MetadataError {
    fn missing(field: &str) -> Self {
        Self::MissingField {
            field: field.to_string(),
        }
    }
}

/// Reads everything needed to import one audio file.
///
/// Title, artist, album and release date are required. The ISRC, lyrics
/// and cover are optional. `downloaded_on` is the file's creation time,
/// or its modification time where the file system does not record one.
///
/// # Errors
///
/// Returns `MetadataError` if the file cannot be parsed, has no tags, or
/// lacks a required field.
pub fn read_track(path: &Path) -> Result<NewMusic, MetadataError> {
    let file_metadata = metadata(path)?;
    let downloaded_on: DateTime<Utc> = file_metadata
        .created()
        .or_else(|_| file_metadata.modified())?
        .into();

    let tagged_file = Probe::open(path)?.read()?;
    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
        .ok_or(MetadataError::UnsupportedFormat)?;

    let title = tag
        .title()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| MetadataError::missing("title"))?;

    // Fall back to the album artist for tracks without a track artist.
    let artist_field = tag
        .artist()
        .map(|s| s.to_string())
        .or_else(|| tag.get_string(AlbumArtist).map(ToString::to_string))
        .unwrap_or_default();
    let artists = split_artists(&artist_field);
    if artists.is_empty() {
        return Err(MetadataError::missing("artist"));
    }

    let album = tag
        .album()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| MetadataError::missing("album"))?;

    let date_field = date_tag(tag).ok_or_else(|| MetadataError::missing("date"))?;
    let release_date =
        parse_release_date(&date_field).ok_or_else(|| MetadataError::InvalidDate {
            value: date_field.clone(),
        })?;

    let isrc = tag
        .get_string(Isrc)
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    let lyrics = tag
        .get_string(LyricsKey)
        .map(Lyrics::parse)
        .unwrap_or_default();

    let cover = tag
        .get_picture_type(CoverFront)
        .or_else(|| tag.pictures().first())
        .map(|picture| CoverArt {
            data: picture.data().to_vec(),
            extension: cover_extension(picture.data()).to_string(),
        });

    Ok(NewMusic {
        title,
        artists,
        album,
        release_date,
        duration: tagged_file.properties().duration().as_secs_f64(),
        isrc,
        file_path: path.to_path_buf(),
        downloaded_on,
        lyrics,
        cover,
    })
}

fn date_tag(tag: &Tag) -> Option<String> {
    [RecordingDate, ReleaseDate, Year]
        .iter()
        .find_map(|key| tag.get_string(key.clone()))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Splits an artist tag on commas, trimming names and dropping blanks.
#[must_use]
pub fn split_artists(field: &str) -> Vec<String> {
    field
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Parses a release date tag.
///
/// Accepts `YYYY`, `YYYY-MM`, `YYYY-MM-DD` and full timestamps
/// (RFC 3339 or `YYYY-MM-DDTHH:MM:SS[.f]` with or without an offset).
/// Partial dates fill in the first month or day.
#[must_use]
pub fn parse_release_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
        return Some(timestamp.date_naive());
    }
    if let Ok(timestamp) = DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(timestamp.date_naive());
    }
    if let Ok(timestamp) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(timestamp.date());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }

    let mut parts = text.splitn(2, '-');
    let year = parts.next().filter(|y| y.len() == 4)?.parse::<i32>().ok()?;
    let month = match parts.next() {
        Some(month) => month.parse::<u32>().ok()?,
        None => 1,
    };
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// File extension for embedded image bytes, from their magic number.
#[must_use]
pub fn cover_extension(data: &[u8]) -> &'static str {
    match data {
        [0xFF, 0xD8, 0xFF, ..] => "jpg",
        [0x89, b'P', b'N', b'G', ..] => "png",
        [b'G', b'I', b'F', ..] => "gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "webp",
        [b'B', b'M', ..] => "bmp",
        _ => "img",
    }
}

/// Writes an album cover to `<artwork_dir>/albums/<album_id>.<ext>`.
///
/// # Returns
///
/// The path relative to `artwork_dir`, as stored in `albums.img_path`.
///
/// # Errors
///
/// Returns an I/O error if the directory or file cannot be written.
pub fn write_album_cover(
    artwork_dir: &Path,
    album_id: i64,
    cover: &CoverArt,
) -> Result<String, IoError> {
    let relative = format!("albums/{album_id}.{}", cover.extension);
    let target = artwork_dir.join(&relative);
    if let Some(parent) = target.parent() {
        create_dir_all(parent)?;
    }
    write(&target, &cover.data)?;
    Ok(relative)
}
