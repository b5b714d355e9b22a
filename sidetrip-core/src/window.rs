//! Time windows expressed as minute-of-day, with midnight wrap.

use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};

static HHMM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([01]?\d|2[0-3]):([0-5]\d)$").unwrap());

/// Planning clamp bounds for the usable window (minutes).
pub const MIN_SAFE_MINUTES: i64 = 30;
pub const MAX_SAFE_MINUTES: i64 = 600;

/// A free-time window in minute-of-day form. `end < start` means the window
/// wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_minute: u16,
    pub end_minute: u16,
}

/// Minutes from `start` to `end`, wrapping past midnight when `end < start`.
pub fn minutes_between(start_minute: u16, end_minute: u16) -> i64 {
    let start = start_minute as i64;
    let end = end_minute as i64;
    if end >= start { end - start } else { end + 1440 - start }
}

/// Parse "HH:mm" to minute-of-day.
pub fn parse_hhmm(s: &str) -> Result<u16> {
    let caps = HHMM
        .captures(s.trim())
        .ok_or_else(|| anyhow::anyhow!("invalid time '{s}', expected HH:mm"))?;
    let h: u16 = caps[1].parse()?;
    let m: u16 = caps[2].parse()?;
    Ok(h * 60 + m)
}

impl TimeWindow {
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Ok(Self {
            start_minute: parse_hhmm(start)?,
            end_minute: parse_hhmm(end)?,
        })
    }

    /// Raw window length in minutes (wrapping).
    pub fn available_minutes(&self) -> i64 {
        minutes_between(self.start_minute, self.end_minute)
    }

    /// Window length clamped to [30, 600] for planning. Bounds the search
    /// radius downstream; never changes what is shown to the user.
    pub fn safe_minutes(&self) -> i64 {
        self.available_minutes().clamp(MIN_SAFE_MINUTES, MAX_SAFE_MINUTES)
    }

    pub fn crosses_midnight(&self) -> bool {
        self.end_minute < self.start_minute
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("09:00").unwrap(), 540);
        assert_eq!(parse_hhmm("23:59").unwrap(), 1439);
        assert_eq!(parse_hhmm("0:05").unwrap(), 5);
        assert!(parse_hhmm("24:00").is_err());
        assert!(parse_hhmm("9:5").is_err());
        assert!(parse_hhmm("").is_err());
        assert!(parse_hhmm("noon").is_err());
    }

    #[test]
    fn test_minutes_between_wraps() {
        assert_eq!(minutes_between(540, 720), 180);
        assert_eq!(minutes_between(1380, 60), 120); // 23:00 -> 01:00
        assert_eq!(minutes_between(0, 0), 0);
    }

    #[test]
    fn test_safe_minutes_clamp() {
        let short = TimeWindow::parse("10:00", "10:10").unwrap();
        assert_eq!(short.available_minutes(), 10);
        assert_eq!(short.safe_minutes(), 30);

        let long = TimeWindow::parse("06:00", "23:00").unwrap();
        assert_eq!(long.available_minutes(), 1020);
        assert_eq!(long.safe_minutes(), 600);

        let normal = TimeWindow::parse("09:00", "12:00").unwrap();
        assert_eq!(normal.safe_minutes(), 180);
    }

    #[test]
    fn test_crosses_midnight() {
        assert!(TimeWindow::parse("23:00", "01:00").unwrap().crosses_midnight());
        assert!(!TimeWindow::parse("09:00", "11:00").unwrap().crosses_midnight());
    }
}
