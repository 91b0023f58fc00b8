//! Drawable radar layers: caching, crossfades and the advance entry point.

mod cache;
mod handle;
mod manager;
mod transition;

pub use cache::{LayerCache, LayerCacheSettings};
pub use handle::{DrawableLayer, LayerFactory, LayerSignals, LayerStatus};
pub use manager::{AdvanceOptions, RadarLayerManager};
pub use transition::{ease_out, TransitionEngine};
