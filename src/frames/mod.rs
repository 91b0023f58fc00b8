//! Radar frame timelines: descriptors, provider normalization and the
//! cached frame source.

mod keys;
mod normalize;
mod source;
mod types;

pub use keys::{Provider, UnixMillis};
pub use normalize::{extract_frames, synthesize_timeline};
pub use source::{FrameSource, FrameSourceSettings, MetadataClient};
pub use types::{Frame, FrameSet};

use chrono::FixedOffset;

/// Formats a frame's time as `h:mm AM/PM` for the scrubber label.
pub fn format_frame_time(frame: &Frame, offset: &FixedOffset) -> String {
    frame.time_label(offset)
}
