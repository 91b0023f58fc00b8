//! Playback of the radar timeline.

mod controller;
mod state;

pub use controller::PlaybackController;
pub use state::{PlaybackSpeed, PlaybackState};
