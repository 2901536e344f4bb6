//! Time-range option tokens such as `30s`, `20m30s`, `10s-30s` or `1m-`.
//!
//! A token is a duration, optionally followed or preceded by `-`. A bare
//! duration is an end bound with an implicit start of zero. Durations are one
//! or more `<number><unit>` groups with units `h`, `m`, `s` and `ms`.

use std::fmt;
use std::time::Duration;

use crate::error::Result;
use crate::Error;

/// A trim window applied to the source media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub start: Option<Duration>,
    pub end: Option<Duration>,
}

impl TimeRange {
    /// Whether `token` has the shape of a time-range token, i.e. whether it
    /// should be parsed with [`TimeRange::parse`] instead of being treated as
    /// a format or codec name.
    pub fn looks_like(token: &str) -> bool {
        let starts_ok = token
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit() || c == '-');
        starts_ok
            && token
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'h' | 'm' | 's' | '-'))
    }

    /// Parse a time-range token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOption`] when a bound is not a valid duration,
    /// when neither bound is given, or when `start >= end`.
    pub fn parse(token: &str) -> Result<Self> {
        let range = match token.split_once('-') {
            None => Self {
                start: None,
                end: Some(parse_duration(token)?),
            },
            Some((start, end)) => Self {
                start: optional_duration(start)?,
                end: optional_duration(end)?,
            },
        };

        if range.start.is_none() && range.end.is_none() {
            return Err(Error::invalid_option(format!(
                "time range {token:?} has no bounds"
            )));
        }

        if let (Some(start), Some(end)) = (range.start, range.end) {
            if start >= end {
                return Err(Error::invalid_option(format!(
                    "time range {token:?} starts at or after its end"
                )));
            }
        }

        Ok(range)
    }

    /// Effective start offset (zero when unbounded).
    pub fn start_or_zero(&self) -> Duration {
        self.start.unwrap_or(Duration::ZERO)
    }

    /// Length of the window when the end is bounded.
    pub fn duration(&self) -> Option<Duration> {
        self.end.map(|end| end.saturating_sub(self.start_or_zero()))
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start, self.end) {
            (None, Some(end)) => write!(f, "{}", format_duration(end)),
            (Some(start), Some(end)) => {
                write!(f, "{}-{}", format_duration(start), format_duration(end))
            }
            (Some(start), None) => write!(f, "{}-", format_duration(start)),
            (None, None) => Ok(()),
        }
    }
}

fn optional_duration(s: &str) -> Result<Option<Duration>> {
    if s.is_empty() {
        Ok(None)
    } else {
        parse_duration(s).map(Some)
    }
}

/// Parse `1h20m30s`, `90s`, `1.5s`, `250ms` and similar.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let invalid = || Error::invalid_option(format!("invalid duration {s:?}"));

    let mut total = 0f64;
    let mut rest = s;
    if rest.is_empty() {
        return Err(invalid());
    }

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let (scale, unit_len) = if rest.starts_with("ms") {
            (0.001, 2)
        } else if rest.starts_with('h') {
            (3600.0, 1)
        } else if rest.starts_with('m') {
            (60.0, 1)
        } else if rest.starts_with('s') {
            (1.0, 1)
        } else {
            return Err(invalid());
        };
        total += value * scale;
        rest = &rest[unit_len..];
    }

    Duration::try_from_secs_f64(total).map_err(|_| invalid())
}

/// Inverse of [`parse_duration`] for whole-millisecond durations.
pub fn format_duration(d: Duration) -> String {
    let total_ms = d.as_millis();
    if total_ms == 0 {
        return "0s".into();
    }

    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if seconds > 0 {
        out.push_str(&format!("{seconds}s"));
    }
    if millis > 0 {
        out.push_str(&format!("{millis}ms"));
    }
    out
}
