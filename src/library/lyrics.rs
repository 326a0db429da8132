//! Timed lyrics in LRC form.
//!
//! Lyrics arrive from tags as text with one `[mm:ss.ff] words` line per
//! cue. They are stored as a JSON array in `music.lyrics_by_timestamp`.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

/// One lyric line; untimed lines carry no timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricLine {
    /// Offset from the start of the track in milliseconds.
    pub timestamp_ms: Option<u64>,
    pub text: String,
}

impl LyricLine {
    #[must_use]
    pub fn timestamp(&self) -> Option<Duration> {
        self.timestamp_ms.map(Duration::from_millis)
    }
}

/// The lyrics of one track, in source order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Lyrics {
    lines: Vec<LyricLine>,
}

impl Lyrics {
    /// Parses LRC-style text.
    ///
    /// A line starting with a bracketed `mm:ss.ff` timestamp is timed.
    /// Anything else, including lines with a malformed timestamp, is kept
    /// as an untimed line. Blank lines are dropped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let lines = text
            .lines()
            .filter_map(|raw| {
                let line = raw.trim();
                if line.is_empty() {
                    return None;
                }
                if let Some(rest) = line.strip_prefix('[')
                    && let Some((stamp, words)) = rest.split_once(']')
                    && let Some(timestamp_ms) = parse_timestamp(stamp)
                {
                    return Some(LyricLine {
                        timestamp_ms: Some(timestamp_ms),
                        text: words.trim().to_string(),
                    });
                }
                Some(LyricLine {
                    timestamp_ms: None,
                    text: line.to_string(),
                })
            })
            .collect();

        Self { lines }
    }

    #[must_use]
    pub fn lines(&self) -> &[LyricLine] {
        &self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns `true` if at least one line has a timestamp.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.lines.iter().any(|l| l.timestamp_ms.is_some())
    }

    /// The timed line being sung at `position`, if any.
    #[must_use]
    pub fn line_at(&self, position: Duration) -> Option<&LyricLine> {
        let position_ms = u64::try_from(position.as_millis()).unwrap_or(u64::MAX);
        self.lines
            .iter()
            .filter(|l| l.timestamp_ms.is_some_and(|ts| ts <= position_ms))
            .max_by_key(|l| l.timestamp_ms)
    }
}

impl fmt::Display for Lyrics {
    /// Renders back to LRC text.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            match line.timestamp_ms {
                Some(ms) => writeln!(
                    f,
                    "[{:02}:{:02}.{:02}] {}",
                    ms / 60_000,
                    (ms / 1000) % 60,
                    (ms % 1000) / 10,
                    line.text
                )?,
                None => writeln!(f, "{}", line.text)?,
            }
        }
        Ok(())
    }
}

/// Parses `mm:ss` with an optional fractional second part.
fn parse_timestamp(stamp: &str) -> Option<u64> {
    let (minutes, seconds) = stamp.trim().split_once(':')?;
    let minutes: u64 = minutes.parse().ok()?;
    let (whole, fraction) = seconds.split_once('.').unwrap_or((seconds, ""));
    let whole: u64 = whole.parse().ok()?;
    if whole >= 60 {
        return None;
    }

    let fraction_ms = if fraction.is_empty() {
        0
    } else {
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        // Scale to exactly three digits: ".5" is 500 ms, ".05" is 50 ms.
        let digits: String = fraction.chars().chain("000".chars()).take(3).collect();
        digits.parse::<u64>().ok()?
    };

    Some(minutes * 60_000 + whole * 1000 + fraction_ms)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::library::lyrics::{Lyrics, parse_timestamp};

    #[test]
    fn test_parse_timed_and_untimed_lines() {
        let lyrics = Lyrics::parse("[00:12.50] First line\nno stamp here\n\n[01:02.03]Second");
        let lines = lyrics.lines();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].timestamp_ms, Some(12_500));
        assert_eq!(lines[0].text, "First line");
        assert_eq!(lines[1].timestamp_ms, None);
        assert_eq!(lines[1].text, "no stamp here");
        assert_eq!(lines[2].timestamp_ms, Some(62_030));
        assert!(lyrics.is_synced());
    }

    #[test]
    fn test_malformed_timestamp_kept_as_text() {
        let lyrics = Lyrics::parse("[chorus] la la");
        assert_eq!(lyrics.lines()[0].timestamp_ms, None);
        assert_eq!(lyrics.lines()[0].text, "[chorus] la la");
        assert!(!lyrics.is_synced());
    }

    #[test]
    fn test_parse_timestamp_fractions() {
        assert_eq!(parse_timestamp("00:01"), Some(1000));
        assert_eq!(parse_timestamp("00:01.5"), Some(1500));
        assert_eq!(parse_timestamp("00:01.123"), Some(1123));
        assert_eq!(parse_timestamp("00:61.00"), None);
        assert_eq!(parse_timestamp("ab:01.00"), None);
    }

    #[test]
    fn test_line_at_position() {
        let lyrics = Lyrics::parse("[00:01.00] a\n[00:05.00] b\n[00:09.00] c");
        assert_eq!(lyrics.line_at(Duration::from_millis(500)), None);
        assert_eq!(lyrics.line_at(Duration::from_secs(6)).unwrap().text, "b");
        assert_eq!(lyrics.line_at(Duration::from_secs(60)).unwrap().text, "c");
    }

    #[test]
    fn test_json_shape_and_display() {
        let lyrics = Lyrics::parse("[00:01.00] a\nplain");
        let json = serde_json::to_string(&lyrics).unwrap();
        assert_eq!(
            json,
            r#"[{"timestamp_ms":1000,"text":"a"},{"timestamp_ms":null,"text":"plain"}]"#
        );
        assert_eq!(lyrics.to_string(), "[00:01.00] a\nplain\n");
    }
}
