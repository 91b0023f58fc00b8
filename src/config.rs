//! Engine and provider configuration.
//!
//! Settings can be persisted through a [`KeyValueStore`] so they survive
//! page reloads.

use crate::error::RadarError;
use crate::frames::{Provider, UnixMillis};
use crate::storage::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Policy for degrading gracefully when upstream metadata is unusable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackPolicy {
    /// Synthesize an evenly spaced timeline ending at "now" instead of
    /// failing when metadata is unrecognized or has too few frames.
    pub enabled: bool,
    /// Number of synthetic frames (at least 2 are always produced).
    pub frame_count: usize,
    /// Minutes between synthetic frames.
    pub spacing_minutes: u32,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            frame_count: 12,
            spacing_minutes: 10,
        }
    }
}

/// Tunables for the frame source, layer cache, transitions and playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum frames kept in a timeline (oldest dropped first).
    pub max_frames: usize,
    /// Opacity of the displayed radar layer.
    pub display_opacity: f32,
    /// Playback cadence at speed multiplier 1.
    pub base_frames_per_second: f32,
    /// Frames warmed ahead of the displayed one after each advance.
    pub prefetch_ahead: usize,
    /// Layer cache capacity before LRU eviction kicks in.
    pub max_cached_frames: usize,
    /// How long a fetched timeline is served from cache.
    pub radar_ttl_ms: u64,
    /// Period of the background timeline refresh.
    pub refresh_interval_ms: u64,
    /// Bounded wait for a layer to signal readiness.
    pub ready_timeout_ms: u64,
    /// Crossfade duration between consecutive frames.
    pub crossfade_ms: u64,
    /// Tile failures that mark a loading layer as failed.
    pub tile_error_threshold: u32,
    pub fallback: FallbackPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_frames: 12,
            display_opacity: 0.72,
            base_frames_per_second: 1.6,
            prefetch_ahead: 3,
            max_cached_frames: 12,
            radar_ttl_ms: 4 * 60 * 1000,
            refresh_interval_ms: 3 * 60 * 1000,
            ready_timeout_ms: 1200,
            crossfade_ms: 240,
            tile_error_threshold: 3,
            fallback: FallbackPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Storage key for persisting settings.
    const STORAGE_KEY: &'static str = "radar_loop_engine_config";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn radar_ttl(&self) -> Duration {
        Duration::from_millis(self.radar_ttl_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn crossfade(&self) -> Duration {
        Duration::from_millis(self.crossfade_ms)
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, RadarError> {
        serde_json::from_str(json)
            .map_err(|e| RadarError::Upstream(format!("invalid engine config: {}", e)))
    }

    /// Load settings from the store, falling back to defaults.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let json = match store.get_item(Self::STORAGE_KEY) {
            Ok(Some(s)) => s,
            Ok(None) => return Self::default(),
            Err(e) => {
                log::warn!("Failed to read engine config: {}", e);
                return Self::default();
            }
        };

        match serde_json::from_str(&json) {
            Ok(config) => {
                log::info!("Loaded engine config from storage");
                config
            }
            Err(e) => {
                log::warn!("Failed to parse engine config: {}", e);
                Self::default()
            }
        }
    }

    /// Save settings to the store.
    pub fn save(&self, store: &dyn KeyValueStore) {
        let json = match serde_json::to_string(self) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Failed to serialize engine config: {}", e);
                return;
            }
        };

        if let Err(e) = store.set_item(Self::STORAGE_KEY, &json) {
            log::warn!("Failed to save engine config: {}", e);
        } else {
            log::info!("Saved engine config to storage");
        }
    }
}

/// Which radar metadata service to read and how to build tile URLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// NOAA nowCOAST NEXRAD mosaic time stops.
    Noaa {
        /// Layer-info endpoint answering `request=timestops` queries.
        time_stops_url: String,
        /// Tile service root; tiles are addressed `/{z}/{y}/{x}`.
        tiles_url: String,
    },
    /// RainViewer `weather-maps.json`.
    RainViewer {
        metadata_url: String,
        /// Color scheme id.
        color: u32,
        /// `<smooth>_<snow>` rendering flags.
        options: String,
        tile_size: u32,
    },
}

impl ProviderConfig {
    pub fn noaa() -> Self {
        ProviderConfig::Noaa {
            time_stops_url: "https://nowcoast.noaa.gov/layerinfo".to_string(),
            tiles_url: "https://nowcoast.noaa.gov/arcgis/rest/services/nowcoast/radar_meteo_imagery_nexrad_time/MapServer/tile".to_string(),
        }
    }

    pub fn rainviewer() -> Self {
        ProviderConfig::RainViewer {
            metadata_url: "https://api.rainviewer.com/public/weather-maps.json".to_string(),
            color: 2,
            options: "1_1".to_string(),
            tile_size: 256,
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            ProviderConfig::Noaa { .. } => Provider::Noaa,
            ProviderConfig::RainViewer { .. } => Provider::RainViewer,
        }
    }

    /// Full metadata request URL.
    pub fn metadata_url(&self) -> String {
        match self {
            ProviderConfig::Noaa { time_stops_url, .. } => format!(
                "{}?request=timestops&service=radar_meteo_imagery_nexrad_time&layers=3&format=json",
                time_stops_url
            ),
            ProviderConfig::RainViewer { metadata_url, .. } => metadata_url.clone(),
        }
    }

    /// Cache key for this provider's timeline within the radar namespace.
    pub fn cache_key(&self) -> String {
        format!("frames:{}", self.provider())
    }

    /// Tile template for a NOAA frame at `time`.
    pub(crate) fn noaa_template(tiles_url: &str, time: UnixMillis) -> String {
        format!(
            "{}/{{z}}/{{y}}/{{x}}?blankTile=false&time={}",
            tiles_url, time.0
        )
    }

    /// Tile template for a RainViewer frame served from `host` + `path`.
    pub(crate) fn rainviewer_template(
        host: &str,
        path: &str,
        tile_size: u32,
        color: u32,
        options: &str,
    ) -> String {
        format!(
            "{}{}/{}/{{z}}/{{x}}/{{y}}/{}/{}.png",
            host, path, tile_size, color, options
        )
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::noaa()
    }
}
