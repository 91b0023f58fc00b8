//! Frame descriptors and the ordered timeline they form.

use super::keys::{Provider, UnixMillis};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Immutable descriptor of one radar snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Snapshot time, normalized to milliseconds.
    pub time: UnixMillis,
    /// Upstream source of the imagery.
    pub provider: Provider,
    /// Tile URL with `{z}`, `{x}`, `{y}` placeholders.
    pub tile_url_template: String,
    /// True when the frame was synthesized by the fallback policy rather
    /// than discovered in upstream metadata.
    #[serde(default)]
    pub synthetic: bool,
}

impl Frame {
    pub fn new(time: UnixMillis, provider: Provider, tile_url_template: impl Into<String>) -> Self {
        Self {
            time,
            provider,
            tile_url_template: tile_url_template.into(),
            synthetic: false,
        }
    }

    /// Identity used for deduplication: two frames with the same template
    /// show the same imagery.
    pub fn identity_key(&self) -> &str {
        &self.tile_url_template
    }

    /// Short clock label for timestamps next to the scrubber.
    pub fn time_label(&self, offset: &FixedOffset) -> String {
        self.time.format_clock(offset)
    }
}

/// Ordered, deduplicated, length-capped timeline of frames.
///
/// Frames are strictly ascending by time and unique by template. The
/// invariant is established by construction (and re-established when a
/// cached set is deserialized), so indices into a `FrameSet` are stable for
/// its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Frame>", into = "Vec<Frame>")]
pub struct FrameSet {
    frames: Vec<Frame>,
}

impl FrameSet {
    /// Normalizes `frames`: sorts by time, drops duplicate templates and
    /// duplicate instants, and keeps only the newest `max_frames`.
    pub fn from_frames(mut frames: Vec<Frame>, max_frames: usize) -> Self {
        frames.sort_by_key(|f| f.time);

        let mut seen: HashSet<String> = HashSet::with_capacity(frames.len());
        let mut kept: Vec<Frame> = Vec::with_capacity(frames.len());
        for frame in frames {
            if kept.last().is_some_and(|last| last.time == frame.time) {
                continue;
            }
            if !seen.insert(frame.identity_key().to_string()) {
                continue;
            }
            kept.push(frame);
        }

        if kept.len() > max_frames {
            kept.drain(..kept.len() - max_frames);
        }

        Self { frames: kept }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Frame> {
        self.frames.iter()
    }

    /// Index of the newest frame.
    pub fn latest_index(&self) -> Option<usize> {
        self.frames.len().checked_sub(1)
    }

    /// Index of the frame taken at exactly `time`.
    pub fn index_of_time(&self, time: UnixMillis) -> Option<usize> {
        self.frames.binary_search_by_key(&time, |f| f.time).ok()
    }

    /// Whether any instant appears in both sets.
    pub fn shares_time_with(&self, other: &FrameSet) -> bool {
        self.frames
            .iter()
            .any(|f| other.index_of_time(f.time).is_some())
    }

    /// True when every frame came from the fallback timeline.
    pub fn is_synthetic(&self) -> bool {
        !self.frames.is_empty() && self.frames.iter().all(|f| f.synthetic)
    }
}

impl From<Vec<Frame>> for FrameSet {
    fn from(frames: Vec<Frame>) -> Self {
        Self::from_frames(frames, usize::MAX)
    }
}

impl From<FrameSet> for Vec<Frame> {
    fn from(set: FrameSet) -> Self {
        set.frames
    }
}

impl<'a> IntoIterator for &'a FrameSet {
    type Item = &'a Frame;
    type IntoIter = std::slice::Iter<'a, Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(time: i64, template: &str) -> Frame {
        Frame::new(UnixMillis(time), Provider::Noaa, template)
    }

    #[test]
    fn test_from_frames_sorts_and_dedupes() {
        let set = FrameSet::from_frames(
            vec![
                frame(300, "c"),
                frame(100, "a"),
                frame(200, "b"),
                frame(250, "b"),
                frame(100, "a2"),
            ],
            10,
        );

        let times: Vec<i64> = set.iter().map(|f| f.time.0).collect();
        assert_eq!(times, vec![100, 200, 300]);
        for pair in set.frames().windows(2) {
            assert!(pair[0].time < pair[1].time);
        }
    }

    #[test]
    fn test_from_frames_keeps_newest() {
        let frames = (0..20).map(|i| frame(i * 10, &format!("t{}", i))).collect();
        let set = FrameSet::from_frames(frames, 12);

        assert_eq!(set.len(), 12);
        assert_eq!(set.get(0).unwrap().time, UnixMillis(80));
        assert_eq!(set.get(11).unwrap().time, UnixMillis(190));
        assert_eq!(set.latest_index(), Some(11));
    }

    #[test]
    fn test_index_of_time_and_overlap() {
        let a = FrameSet::from_frames(vec![frame(100, "a"), frame(200, "b")], 12);
        let b = FrameSet::from_frames(vec![frame(200, "b"), frame(300, "c")], 12);
        let c = FrameSet::from_frames(vec![frame(400, "d"), frame(500, "e")], 12);

        assert_eq!(b.index_of_time(UnixMillis(200)), Some(0));
        assert_eq!(b.index_of_time(UnixMillis(100)), None);
        assert!(a.shares_time_with(&b));
        assert!(!a.shares_time_with(&c));
    }

    #[test]
    fn test_deserialize_restores_invariant() {
        let json = r#"[
            {"time": 300, "provider": "noaa", "tile_url_template": "c"},
            {"time": 100, "provider": "noaa", "tile_url_template": "a"},
            {"time": 100, "provider": "noaa", "tile_url_template": "a"}
        ]"#;
        let set: FrameSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(0).unwrap().time, UnixMillis(100));
        assert!(!set.is_synthetic());
    }

    #[test]
    fn test_empty_set() {
        let set = FrameSet::default();
        assert!(set.is_empty());
        assert_eq!(set.latest_index(), None);
    }
}
