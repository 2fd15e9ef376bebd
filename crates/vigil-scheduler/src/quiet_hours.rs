//! Quiet-hours window — no proactive contact while the user sleeps.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use vigil_core::config::{QuietHoursConfig, parse_hhmm};
use vigil_core::error::Result;

/// A daily window in local minutes-of-day.
///
/// Start is inclusive, end exclusive. When start is later than end the window
/// wraps past midnight (e.g. 22:00–08:00). Equal start and end means no quiet
/// time at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    start: u16,
    end: u16,
}

impl QuietHours {
    /// Parse from `HH:MM` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Ok(Self {
            start: parse_hhmm(start)?,
            end: parse_hhmm(end)?,
        })
    }

    pub fn from_config(config: &QuietHoursConfig) -> Result<Self> {
        Self::parse(&config.start, &config.end)
    }

    /// Is `minute` (0..1440) inside the window?
    pub fn contains_minute(&self, minute: u16) -> bool {
        if self.start <= self.end {
            minute >= self.start && minute < self.end
        } else {
            minute >= self.start || minute < self.end
        }
    }

    /// Is `now` quiet for a user living in `tz`?
    pub fn is_quiet_at(&self, now: DateTime<Utc>, tz: Tz) -> bool {
        let local = now.with_timezone(&tz);
        let minute = (local.hour() * 60 + local.minute()) as u16;
        self.contains_minute(minute)
    }
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| vigil_core::error::VigilError::Config(format!("Unknown timezone '{name}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, h, m, 0).unwrap()
    }

    #[test]
    fn test_wrapping_window_boundaries() {
        let quiet = QuietHours::parse("22:00", "08:00").unwrap();
        assert!(quiet.is_quiet_at(utc(22, 0), Tz::UTC));
        assert!(!quiet.is_quiet_at(utc(8, 0), Tz::UTC));
        assert!(quiet.is_quiet_at(utc(3, 0), Tz::UTC));
        assert!(quiet.is_quiet_at(utc(7, 59), Tz::UTC));
        assert!(!quiet.is_quiet_at(utc(21, 59), Tz::UTC));
        assert!(!quiet.is_quiet_at(utc(12, 0), Tz::UTC));
    }

    #[test]
    fn test_same_day_window() {
        let quiet = QuietHours::parse("13:00", "14:30").unwrap();
        assert!(quiet.is_quiet_at(utc(13, 0), Tz::UTC));
        assert!(quiet.is_quiet_at(utc(14, 29), Tz::UTC));
        assert!(!quiet.is_quiet_at(utc(14, 30), Tz::UTC));
        assert!(!quiet.is_quiet_at(utc(12, 59), Tz::UTC));
    }

    #[test]
    fn test_equal_bounds_never_quiet() {
        let quiet = QuietHours::parse("09:00", "09:00").unwrap();
        for m in [0u16, 540, 541, 1439] {
            assert!(!quiet.contains_minute(m));
        }
    }

    #[test]
    fn test_uses_local_time() {
        let quiet = QuietHours::parse("22:00", "08:00").unwrap();
        let tz = parse_timezone("Asia/Tokyo").unwrap();
        // 14:00 UTC is 23:00 in Tokyo.
        assert!(quiet.is_quiet_at(utc(14, 0), tz));
        // 03:00 UTC is 12:00 in Tokyo.
        assert!(!quiet.is_quiet_at(utc(3, 0), tz));
    }

    #[test]
    fn test_bad_inputs() {
        assert!(QuietHours::parse("22", "08:00").is_err());
        assert!(parse_timezone("Mars/Olympus").is_err());
    }
}
