//! Partial UTC timestamps and relative query windows
//!
//! Query bounds are given as any left-aligned prefix of
//! `YYYY-MM-DDTHH:MM:SS.ffffffZ`. Missing month and day become `01`, every
//! other missing field becomes zero.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::TimestampError;

static ZULU_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<year>\d{4})-?(?P<month>\d{0,2})-?(?P<day>\d{0,2})T?(?P<hour>\d{0,2}):?(?P<minute>\d{0,2}):?(?P<second>\d{0,2})\.?(?P<fraction>\d{0,6})Z?$",
    )
    .expect("zulu timestamp pattern is valid")
});

/// A fully specified UTC time broken into fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZuluTimestamp {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub microsecond: u32,
}

impl ZuluTimestamp {
    /// Parse a partial timestamp, filling in what is missing
    pub fn parse_partial(partial: &str) -> Result<Self, TimestampError> {
        let caps = ZULU_TIMESTAMP
            .captures(partial.trim())
            .ok_or_else(|| TimestampError::Invalid(partial.to_string()))?;

        let field = |name: &str| -> u32 {
            caps.name(name)
                .map(|m| m.as_str())
                .filter(|s| !s.is_empty())
                .and_then(|s| s.parse().ok())
                .unwrap_or(0)
        };

        // Fractions are digits after the point: ".5" is half a second
        let microsecond = caps
            .name("fraction")
            .map(|m| m.as_str())
            .filter(|s| !s.is_empty())
            .and_then(|s| format!("{s:0<6}").parse().ok())
            .unwrap_or(0);

        Ok(Self {
            year: field("year") as i32,
            month: field("month").max(1),
            day: field("day").max(1),
            hour: field("hour"),
            minute: field("minute"),
            second: field("second"),
            microsecond,
        })
    }

    /// Seconds since the epoch
    pub fn epoch_seconds(&self) -> Result<f64, TimestampError> {
        let datetime = NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .and_then(|date| {
                date.and_hms_micro_opt(self.hour, self.minute, self.second, self.microsecond)
            })
            .ok_or_else(|| TimestampError::OutOfRange(self.to_string()))?;

        Ok(datetime.and_utc().timestamp_micros() as f64 / 1_000_000.0)
    }
}

impl std::fmt::Display for ZuluTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:06}Z",
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.microsecond
        )
    }
}

/// Fill out a partial zulu timestamp
///
/// `"1998-10"` becomes `"1998-10-01T00:00:00.000000Z"`.
pub fn complete_zulu_timestamp(partial: &str) -> Result<String, TimestampError> {
    Ok(ZuluTimestamp::parse_partial(partial)?.to_string())
}

/// Seconds since the epoch of a partial zulu timestamp
pub fn parse_zulu_timestamp(partial: &str) -> Result<f64, TimestampError> {
    ZuluTimestamp::parse_partial(partial)?.epoch_seconds()
}

/// Resolved bounds of a query, in seconds since the epoch
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QueryWindow {
    pub begin: Option<f64>,
    pub end: Option<f64>,
}

impl QueryWindow {
    /// Combine explicit bounds with a relative `past` window
    ///
    /// Explicit bounds win. Otherwise a positive `past` means the last
    /// `past` seconds (`begin = now - past`), and a negative one means
    /// everything up to `|past|` seconds ago (`end = now + past`).
    pub fn resolve(
        begin: Option<&str>,
        end: Option<&str>,
        past: i64,
        now: f64,
    ) -> Result<Self, TimestampError> {
        let begin = match begin {
            Some(text) => Some(parse_zulu_timestamp(text)?),
            None if past > 0 => Some(now - past as f64),
            None => None,
        };
        let end = match end {
            Some(text) => Some(parse_zulu_timestamp(text)?),
            None if past < 0 => Some(now + past as f64),
            None => None,
        };
        Ok(Self { begin, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_month_prefix() {
        assert_eq!(
            complete_zulu_timestamp("1998-10").unwrap(),
            "1998-10-01T00:00:00.000000Z"
        );
    }

    #[test]
    fn test_complete_various_depths() {
        let cases = [
            ("2014", "2014-01-01T00:00:00.000000Z"),
            ("2014-03-15", "2014-03-15T00:00:00.000000Z"),
            ("2014-03-15T08", "2014-03-15T08:00:00.000000Z"),
            ("2014-03-15T08:30", "2014-03-15T08:30:00.000000Z"),
            ("2014-03-15T08:30:05", "2014-03-15T08:30:05.000000Z"),
            ("2014-03-15T08:30:05.25", "2014-03-15T08:30:05.250000Z"),
            ("2014-03-15T08:30:05.123456Z", "2014-03-15T08:30:05.123456Z"),
            ("20140315", "2014-03-15T00:00:00.000000Z"),
        ];
        for (partial, full) in cases {
            assert_eq!(complete_zulu_timestamp(partial).unwrap(), full, "{partial}");
        }
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(complete_zulu_timestamp("").is_err());
        assert!(complete_zulu_timestamp("yesterday").is_err());
        assert!(complete_zulu_timestamp("98-10").is_err());
    }

    #[test]
    fn test_epoch_seconds() {
        assert_eq!(parse_zulu_timestamp("1970").unwrap(), 0.0);
        assert_eq!(parse_zulu_timestamp("1970-01-01T00:00:01.5").unwrap(), 1.5);
        assert_eq!(parse_zulu_timestamp("2001-09-09T01:46:40").unwrap(), 1e9);
        assert!(matches!(
            parse_zulu_timestamp("2014-13"),
            Err(TimestampError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_window_from_past() {
        let now = 10_000.0;
        assert_eq!(
            QueryWindow::resolve(None, None, 60, now).unwrap(),
            QueryWindow {
                begin: Some(9_940.0),
                end: None
            }
        );
        assert_eq!(
            QueryWindow::resolve(None, None, -60, now).unwrap(),
            QueryWindow {
                begin: None,
                end: Some(9_940.0)
            }
        );
        assert_eq!(
            QueryWindow::resolve(None, None, 0, now).unwrap(),
            QueryWindow::default()
        );
    }

    #[test]
    fn test_explicit_bounds_win() {
        let window = QueryWindow::resolve(Some("1970-01-01T00:01"), Some("1970-01-01T00:02"), 60, 1e9)
            .unwrap();
        assert_eq!(window.begin, Some(60.0));
        assert_eq!(window.end, Some(120.0));
    }
}
