//! Frame source: fetches provider metadata, normalizes it into a
//! [`FrameSet`] and serves it from a TTL cache.

use super::normalize::{extract_frames, synthesize_timeline};
use super::types::FrameSet;
use crate::config::{EngineConfig, FallbackPolicy, ProviderConfig};
use crate::error::RadarError;
use crate::platform::Clock;
use crate::storage::TtlCache;
use futures_util::future::LocalBoxFuture;
use std::rc::Rc;
use std::time::Duration;

/// Cache namespace for radar timelines.
const CACHE_NAMESPACE: &str = "radar";

/// Retrieves raw metadata documents.
///
/// Implemented by the browser `fetch` host and by file/scripted clients.
pub trait MetadataClient {
    fn fetch_json<'a>(
        &'a self,
        url: &'a str,
    ) -> LocalBoxFuture<'a, Result<serde_json::Value, RadarError>>;
}

/// The subset of [`EngineConfig`] the frame source needs.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSourceSettings {
    pub max_frames: usize,
    pub ttl: Duration,
    pub fallback: FallbackPolicy,
}

impl From<&EngineConfig> for FrameSourceSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_frames: config.max_frames,
            ttl: config.radar_ttl(),
            fallback: config.fallback.clone(),
        }
    }
}

/// Source of radar timelines for one provider.
pub struct FrameSource {
    provider: ProviderConfig,
    client: Rc<dyn MetadataClient>,
    cache: TtlCache,
    clock: Rc<dyn Clock>,
    settings: FrameSourceSettings,
}

impl FrameSource {
    pub fn new(
        provider: ProviderConfig,
        client: Rc<dyn MetadataClient>,
        cache: TtlCache,
        clock: Rc<dyn Clock>,
        settings: FrameSourceSettings,
    ) -> Self {
        Self {
            provider,
            client,
            cache,
            clock,
            settings,
        }
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    /// Returns the provider's timeline, from cache unless `force_refresh`.
    ///
    /// Fails with [`RadarError::Upstream`] when the request fails or the
    /// document is unreadable, and with [`RadarError::InsufficientData`]
    /// when fewer than two frames survive normalization. With the fallback
    /// policy enabled both format failures are replaced by a synthetic
    /// timeline; network failures still propagate.
    pub async fn fetch_frames(&self, force_refresh: bool) -> Result<FrameSet, RadarError> {
        let key = self.provider.cache_key();

        if !force_refresh {
            if let Some(cached) =
                self.cache
                    .get::<FrameSet>(CACHE_NAMESPACE, &key, self.settings.ttl)
            {
                log::debug!("Serving {} radar frames from cache", cached.len());
                return Ok(cached);
            }
        }

        let url = self.provider.metadata_url();
        let data = self.client.fetch_json(&url).await?;

        let frames = match extract_frames(&self.provider, &data) {
            Ok(frames) => FrameSet::from_frames(frames, self.settings.max_frames),
            Err(reason) => {
                if let Some(synthetic) = self.fallback(&reason) {
                    return Ok(synthetic);
                }
                return Err(RadarError::Upstream(format!(
                    "unrecognized metadata: {}",
                    reason
                )));
            }
        };

        if frames.len() < 2 {
            if let Some(synthetic) = self.fallback("too few frames") {
                return Ok(synthetic);
            }
            return Err(RadarError::InsufficientData {
                found: frames.len(),
            });
        }

        if let Err(e) = self.cache.set(CACHE_NAMESPACE, &key, &frames) {
            log::warn!("Failed to cache radar frames: {}", e);
        }

        log::info!(
            "Loaded {} {} radar frames",
            frames.len(),
            self.provider.provider()
        );
        Ok(frames)
    }

    /// Synthetic timeline, if the policy allows one. Never cached so the
    /// next fetch retries upstream.
    fn fallback(&self, reason: &str) -> Option<FrameSet> {
        if !self.settings.fallback.enabled {
            return None;
        }
        log::warn!("Using synthetic radar timeline: {}", reason);
        let frames = synthesize_timeline(
            &self.provider,
            &self.settings.fallback,
            self.clock.wall_clock(),
        );
        Some(FrameSet::from_frames(frames, self.settings.max_frames))
    }
}
