//! Provider-specific metadata parsing and the synthetic fallback timeline.

use super::keys::{Provider, UnixMillis};
use super::types::Frame;
use crate::config::{FallbackPolicy, ProviderConfig};
use serde_json::Value;

/// Extracts time-stamped frames from a provider's metadata document.
///
/// Returns `Err` with a short reason when the document does not have the
/// shape the provider is known to produce. Individual malformed entries are
/// skipped rather than failing the whole document.
pub fn extract_frames(provider: &ProviderConfig, data: &Value) -> Result<Vec<Frame>, String> {
    match provider {
        ProviderConfig::Noaa { tiles_url, .. } => extract_noaa(tiles_url, data),
        ProviderConfig::RainViewer {
            color,
            options,
            tile_size,
            ..
        } => extract_rainviewer(*tile_size, *color, options, data),
    }
}

/// `{"layers": [{"timeStops": [1700000000000, ...]}]}`
fn extract_noaa(tiles_url: &str, data: &Value) -> Result<Vec<Frame>, String> {
    let stops = data
        .pointer("/layers/0/timeStops")
        .and_then(Value::as_array)
        .ok_or_else(|| "missing layers[0].timeStops".to_string())?;

    Ok(stops
        .iter()
        .filter_map(Value::as_f64)
        .map(UnixMillis::from_raw)
        .map(|time| {
            Frame::new(
                time,
                Provider::Noaa,
                ProviderConfig::noaa_template(tiles_url, time),
            )
        })
        .collect())
}

/// `{"host": "https://...", "radar": {"past": [{"time": 1700000000, "path": "/v2/radar/..."}]}}`
fn extract_rainviewer(
    tile_size: u32,
    color: u32,
    options: &str,
    data: &Value,
) -> Result<Vec<Frame>, String> {
    let host = data
        .get("host")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing host".to_string())?;
    let past = data
        .pointer("/radar/past")
        .and_then(Value::as_array)
        .ok_or_else(|| "missing radar.past".to_string())?;

    Ok(past
        .iter()
        .filter_map(|entry| {
            let time = entry.get("time").and_then(Value::as_f64)?;
            let path = entry.get("path").and_then(Value::as_str)?;
            Some(Frame::new(
                UnixMillis::from_raw(time),
                Provider::RainViewer,
                ProviderConfig::rainviewer_template(host, path, tile_size, color, options),
            ))
        })
        .collect())
}

/// Builds an evenly spaced timeline ending at `now` (rounded down to the
/// spacing), flagged as synthetic.
pub fn synthesize_timeline(
    provider: &ProviderConfig,
    policy: &FallbackPolicy,
    now: UnixMillis,
) -> Vec<Frame> {
    let spacing_ms = i64::from(policy.spacing_minutes.max(1)) * 60 * 1000;
    let count = policy.frame_count.max(2) as i64;
    let end = now.0 - now.0.rem_euclid(spacing_ms);

    (0..count)
        .map(|i| {
            let time = UnixMillis(end - (count - 1 - i) * spacing_ms);
            let template = match provider {
                ProviderConfig::Noaa { tiles_url, .. } => {
                    ProviderConfig::noaa_template(tiles_url, time)
                }
                ProviderConfig::RainViewer {
                    metadata_url,
                    color,
                    options,
                    tile_size,
                } => {
                    let host = origin_of(metadata_url);
                    let path = format!("/v2/radar/{}", time.as_secs());
                    ProviderConfig::rainviewer_template(host, &path, *tile_size, *color, options)
                }
            };
            Frame {
                synthetic: true,
                ..Frame::new(time, provider.provider(), template)
            }
        })
        .collect()
}

/// `https://host/some/path` -> `https://host`
fn origin_of(url: &str) -> &str {
    let after_scheme = url.find("://").map(|i| i + 3).unwrap_or(0);
    match url[after_scheme..].find('/') {
        Some(slash) => &url[..after_scheme + slash],
        None => url,
    }
}
