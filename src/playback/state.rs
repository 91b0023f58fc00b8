//! Playback state and speed presets.

/// Playback speed multiplier options.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub enum PlaybackSpeed {
    Quarter,
    Half,
    #[default]
    Normal,
    Double,
    Quadruple,
}

impl PlaybackSpeed {
    pub fn label(&self) -> &'static str {
        match self {
            PlaybackSpeed::Quarter => "0.25x",
            PlaybackSpeed::Half => "0.5x",
            PlaybackSpeed::Normal => "1x",
            PlaybackSpeed::Double => "2x",
            PlaybackSpeed::Quadruple => "4x",
        }
    }

    pub fn all() -> &'static [PlaybackSpeed] {
        &[
            PlaybackSpeed::Quarter,
            PlaybackSpeed::Half,
            PlaybackSpeed::Normal,
            PlaybackSpeed::Double,
            PlaybackSpeed::Quadruple,
        ]
    }

    pub fn multiplier(&self) -> f32 {
        match self {
            PlaybackSpeed::Quarter => 0.25,
            PlaybackSpeed::Half => 0.5,
            PlaybackSpeed::Normal => 1.0,
            PlaybackSpeed::Double => 2.0,
            PlaybackSpeed::Quadruple => 4.0,
        }
    }

    /// Preset matching `multiplier` exactly, if any.
    pub fn from_multiplier(multiplier: f32) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|speed| speed.multiplier() == multiplier)
    }
}

/// State for playback of one radar view.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    /// Requested frame index in the timeline
    pub current_index: usize,

    /// Whether playback is currently active
    pub playing: bool,

    /// Speed multiplier applied to the base cadence
    pub speed_multiplier: f32,

    /// Frames per second at multiplier 1
    pub base_frames_per_second: f32,
}

impl PlaybackState {
    pub fn new(base_frames_per_second: f32) -> Self {
        Self {
            current_index: 0,
            playing: false,
            speed_multiplier: PlaybackSpeed::Normal.multiplier(),
            base_frames_per_second,
        }
    }

    /// Milliseconds between advances at the current speed.
    pub fn frame_interval_ms(&self) -> f64 {
        1000.0 / (f64::from(self.base_frames_per_second) * f64::from(self.speed_multiplier))
    }

    /// One-based position label, e.g. `3 / 12`.
    pub fn frame_label(&self, frame_count: usize) -> String {
        if frame_count == 0 {
            return "0 / 0".to_string();
        }
        format!("{} / {}", self.current_index + 1, frame_count)
    }
}
