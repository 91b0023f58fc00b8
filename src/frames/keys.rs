//! Core key types for radar frame timelines.
//!
//! - `UnixMillis`: timestamp in milliseconds since the Unix epoch
//! - `Provider`: which upstream radar source produced a frame
//!
//! Upstream sources disagree on units (RainViewer reports seconds, NOAA
//! time stops are milliseconds), so every raw timestamp goes through
//! [`UnixMillis::from_raw`] before frames are compared.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw values above this are already milliseconds (any seconds value this
/// large would be tens of thousands of years out).
const MILLIS_THRESHOLD: f64 = 1e12;

/// Unix timestamp in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnixMillis(pub i64);

impl UnixMillis {
    pub fn now() -> Self {
        #[cfg(target_arch = "wasm32")]
        {
            Self(js_sys::Date::now() as i64)
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            use std::time::{SystemTime, UNIX_EPOCH};
            let duration = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default();
            Self(duration.as_millis() as i64)
        }
    }

    /// Normalizes a provider timestamp that may be seconds or milliseconds.
    pub fn from_raw(raw: f64) -> Self {
        if raw > MILLIS_THRESHOLD {
            Self(raw.round() as i64)
        } else {
            Self((raw * 1000.0).round() as i64)
        }
    }

    pub fn from_secs(secs: i64) -> Self {
        Self(secs * 1000)
    }

    pub fn as_secs(&self) -> i64 {
        self.0 / 1000
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Formats as a short clock label (`3:05 PM`) in the given offset.
    pub fn format_clock(&self, offset: &FixedOffset) -> String {
        match DateTime::from_timestamp_millis(self.0) {
            Some(utc) => utc.with_timezone(offset).format("%-I:%M %p").to_string(),
            None => format!("{}", self.0),
        }
    }
}

impl fmt::Display for UnixMillis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upstream radar imagery source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// NOAA nowCOAST NEXRAD mosaic.
    Noaa,
    /// RainViewer public radar tiles.
    RainViewer,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Noaa => "noaa",
            Provider::RainViewer => "rainviewer",
        }
    }

    /// Attribution label for map overlays.
    pub fn attribution(&self) -> &'static str {
        match self {
            Provider::Noaa => "NOAA",
            Provider::RainViewer => "RainViewer",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_normalizes_seconds() {
        assert_eq!(
            UnixMillis::from_raw(1_700_000_000.0),
            UnixMillis(1_700_000_000_000)
        );
        assert_eq!(
            UnixMillis::from_raw(1_700_000_000_123.0),
            UnixMillis(1_700_000_000_123)
        );
    }

    #[test]
    fn test_secs_conversion() {
        let t = UnixMillis::from_secs(1_700_000_000);
        assert_eq!(t.as_secs(), 1_700_000_000);
        assert_eq!(t.as_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_format_clock() {
        // 2023-11-14 22:13:20 UTC
        let t = UnixMillis(1_700_000_000_000);
        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(t.format_clock(&utc), "10:13 PM");

        let eastern = FixedOffset::west_opt(5 * 3600).unwrap();
        assert_eq!(t.format_clock(&eastern), "5:13 PM");
    }

    #[test]
    fn test_provider_labels() {
        assert_eq!(Provider::RainViewer.to_string(), "rainviewer");
        assert_eq!(Provider::RainViewer.attribution(), "RainViewer");
        assert_eq!(Provider::Noaa.attribution(), "NOAA");
    }
}
