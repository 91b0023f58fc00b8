#![warn(clippy::all)]

//! Radar animation engine.
//!
//! Fetches a bounded timeline of weather-radar frames, caches a drawable
//! layer per frame and plays them back as a smooth, speed-controllable loop
//! with crossfades. Rendering is left to the host through
//! [`LayerFactory`]; time, display ticks and task spawning come from a
//! [`Clock`] and a [`Spawner`].

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod frames;
pub mod layer;
pub mod platform;
pub mod playback;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use config::{EngineConfig, FallbackPolicy, ProviderConfig};
pub use engine::{EngineHost, RadarEngine, RefreshOptions, WeakRadarEngine};
pub use error::{LayerFailure, RadarError};
pub use events::{EngineCallbacks, LoadState, StateChange};
pub use frames::{format_frame_time, Frame, FrameSet, MetadataClient, Provider, UnixMillis};
pub use layer::{AdvanceOptions, DrawableLayer, LayerFactory, LayerSignals, LayerStatus};
pub use platform::{Clock, ManualClock, Spawner};
pub use playback::{PlaybackController, PlaybackSpeed, PlaybackState};
pub use storage::{KeyValueStore, MemoryStore, StorageError, TtlCache};
