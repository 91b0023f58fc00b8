//! Error types for the radar engine.
//!
//! Timeline errors (`RadarError`) propagate to callers of `initialize` and
//! `refresh`. Per-frame layer failures (`LayerFailure`) never do; they are
//! reported through the load-state callback while playback continues.

use std::fmt;

/// Errors that can occur while loading or refreshing the radar timeline.
#[derive(Debug, Clone, PartialEq)]
pub enum RadarError {
    /// The metadata provider was unreachable, answered with a failure
    /// status, or returned metadata in a format we could not read.
    Upstream(String),
    /// Fewer than two distinct frames survived normalization.
    InsufficientData { found: usize },
    /// No provider has been configured yet (`initialize` was never called).
    NotInitialized,
}

impl RadarError {
    /// Message shown to the user when radar is entirely unavailable.
    pub fn user_message(&self) -> String {
        format!("Radar unavailable: {}", self)
    }
}

impl fmt::Display for RadarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadarError::Upstream(msg) => write!(f, "upstream error: {}", msg),
            RadarError::InsufficientData { found } => {
                write!(f, "insufficient radar frames available ({} found)", found)
            }
            RadarError::NotInitialized => write!(f, "radar engine not initialized"),
        }
    }
}

impl std::error::Error for RadarError {}

/// Why a single frame's layer could not be displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerFailure {
    /// The layer did not signal readiness within the bounded wait.
    Timeout,
    /// Too many tiles failed before the layer became ready.
    TileErrors(u32),
    /// The index is outside the current timeline.
    NoFrame(usize),
}

impl LayerFailure {
    /// Message delivered through the load-state callback.
    pub fn user_message(&self) -> &'static str {
        match self {
            LayerFailure::Timeout => "Radar frame timeout; skipping.",
            LayerFailure::TileErrors(_) | LayerFailure::NoFrame(_) => {
                "Radar frame failed to load; skipping."
            }
        }
    }
}

impl fmt::Display for LayerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerFailure::Timeout => write!(f, "layer readiness timed out"),
            LayerFailure::TileErrors(n) => write!(f, "{} tile loads failed", n),
            LayerFailure::NoFrame(index) => write!(f, "no radar frame at index {}", index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_prefix() {
        let err = RadarError::InsufficientData { found: 1 };
        assert_eq!(
            err.user_message(),
            "Radar unavailable: insufficient radar frames available (1 found)"
        );
    }
}
