//! Header text for a list of tracks: count and total running time.

use crate::library::models::LibraryMusic;

const UNITS: [(&str, u64); 4] = [("second", 60), ("minute", 60), ("hour", 24), ("day", u64::MAX)];

/// Formats a running time in words, largest unit first.
///
/// Zero-valued units are left out, so 3605 seconds reads
/// "1 hour 5 seconds". A total of zero reads "0 seconds".
#[must_use]
pub fn total_length_string(total_seconds: f64) -> String {
    let mut remaining = if total_seconds.is_finite() && total_seconds > 0.0 {
        total_seconds.round() as u64
    } else {
        0
    };
    if remaining == 0 {
        return "0 seconds".to_string();
    }

    let mut components = Vec::new();
    for (unit, size) in UNITS {
        let amount = remaining % size;
        if amount > 0 {
            components.push(plural(amount, unit));
        }
        remaining /= size;
        if remaining == 0 {
            break;
        }
    }
    components.reverse();
    components.join(" ")
}

/// "N Track(s), <length>" for a list of tracks.
#[must_use]
pub fn meta_text(tracks: &[LibraryMusic]) -> String {
    let total: f64 = tracks.iter().map(|t| t.duration).sum();
    format!(
        "{}, {}",
        plural(tracks.len() as u64, "Track"),
        total_length_string(total)
    )
}

/// Track duration as `m:ss`, or `h:mm:ss` from one hour up.
#[must_use]
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.round() as u64
    } else {
        0
    };
    let (hours, minutes, secs) = (total / 3600, (total / 60) % 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

fn plural(amount: u64, unit: &str) -> String {
    if amount == 1 {
        format!("{amount} {unit}")
    } else {
        format!("{amount} {unit}s")
    }
}

#[cfg(test)]
mod tests {
    use crate::library::summary::{format_duration, total_length_string};

    #[test]
    fn test_total_length_string() {
        assert_eq!(total_length_string(0.0), "0 seconds");
        assert_eq!(total_length_string(1.0), "1 second");
        assert_eq!(total_length_string(59.6), "1 minute");
        assert_eq!(total_length_string(3725.0), "1 hour 2 minutes 5 seconds");
        assert_eq!(total_length_string(3605.0), "1 hour 5 seconds");
        assert_eq!(total_length_string(90_000.0), "1 day 1 hour");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "0:00");
        assert_eq!(format_duration(185.4), "3:05");
        assert_eq!(format_duration(3661.0), "1:01:01");
        assert_eq!(format_duration(f64::NAN), "0:00");
    }
}
