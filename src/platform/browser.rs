//! Browser host: `requestAnimationFrame`, `setTimeout`, `fetch` and
//! `spawn_local`.

use super::Clock;
use crate::error::RadarError;
use crate::frames::{MetadataClient, UnixMillis};
use futures_channel::oneshot;
use futures_util::future::{FutureExt, LocalBoxFuture, LocalFutureObj};
use futures_util::task::{LocalSpawn, SpawnError};
use std::time::Duration;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

fn performance_now() -> f64 {
    web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
        .unwrap_or_else(js_sys::Date::now)
}

/// Clock backed by the browser's performance timer and animation frames.
#[derive(Clone, Default)]
pub struct BrowserClock;

impl BrowserClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for BrowserClock {
    fn now_ms(&self) -> f64 {
        performance_now()
    }

    fn wall_clock(&self) -> UnixMillis {
        UnixMillis(js_sys::Date::now() as i64)
    }

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        let (tx, rx) = oneshot::channel::<()>();
        let callback = Closure::once_into_js(move || {
            let _ = tx.send(());
        });
        if let Some(window) = web_sys::window() {
            let millis = duration.as_millis().min(i32::MAX as u128) as i32;
            if let Err(e) = window.set_timeout_with_callback_and_timeout_and_arguments_0(
                callback.unchecked_ref(),
                millis,
            ) {
                log::warn!("setTimeout failed: {:?}", e);
            }
        }
        async move {
            let _ = rx.await;
        }
        .boxed_local()
    }

    fn next_frame(&self) -> LocalBoxFuture<'static, f64> {
        let (tx, rx) = oneshot::channel::<f64>();
        let callback = Closure::once_into_js(move |timestamp: f64| {
            let _ = tx.send(timestamp);
        });
        if let Some(window) = web_sys::window() {
            if let Err(e) = window.request_animation_frame(callback.unchecked_ref()) {
                log::warn!("requestAnimationFrame failed: {:?}", e);
            }
        }
        async move { rx.await.unwrap_or_else(|_| performance_now()) }.boxed_local()
    }
}

/// Spawner that hands tasks to `wasm_bindgen_futures::spawn_local`.
#[derive(Clone, Default)]
pub struct BrowserSpawner;

impl LocalSpawn for BrowserSpawner {
    fn spawn_local_obj(&self, future: LocalFutureObj<'static, ()>) -> Result<(), SpawnError> {
        wasm_bindgen_futures::spawn_local(future);
        Ok(())
    }
}

/// Metadata client using the browser `fetch` API.
#[derive(Clone, Default)]
pub struct BrowserFetch;

impl BrowserFetch {
    async fn fetch(url: String) -> Result<serde_json::Value, RadarError> {
        let window =
            web_sys::window().ok_or_else(|| RadarError::Upstream("no window".to_string()))?;

        let response = JsFuture::from(window.fetch_with_str(&url))
            .await
            .map_err(|e| RadarError::Upstream(format!("{:?}", e)))?;
        let response: web_sys::Response = response
            .dyn_into()
            .map_err(|_| RadarError::Upstream("fetch did not return a Response".to_string()))?;

        if !response.ok() {
            return Err(RadarError::Upstream(format!(
                "Request failed ({}) for {}",
                response.status(),
                url
            )));
        }

        let json = response
            .json()
            .map_err(|e| RadarError::Upstream(format!("{:?}", e)))?;
        let json = JsFuture::from(json)
            .await
            .map_err(|e| RadarError::Upstream(format!("invalid JSON: {:?}", e)))?;

        serde_wasm_bindgen::from_value(json).map_err(|e| RadarError::Upstream(e.to_string()))
    }
}

impl MetadataClient for BrowserFetch {
    fn fetch_json<'a>(
        &'a self,
        url: &'a str,
    ) -> LocalBoxFuture<'a, Result<serde_json::Value, RadarError>> {
        Self::fetch(url.to_string()).boxed_local()
    }
}
