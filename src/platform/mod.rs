//! Host platform abstraction: time, display ticks and task spawning.
//!
//! The engine never talks to timers or the executor directly. A host hands
//! it a [`Clock`] and a [`Spawner`]:
//! - `ManualClock` drives virtual time (tests, headless simulation)
//! - `SystemClock` uses real time on native targets
//! - `BrowserClock`/`BrowserSpawner` use `requestAnimationFrame`,
//!   `setTimeout` and `spawn_local` on WASM

#[cfg(target_arch = "wasm32")]
mod browser;
mod manual;
#[cfg(not(target_arch = "wasm32"))]
mod system;

#[cfg(target_arch = "wasm32")]
pub use browser::{BrowserClock, BrowserFetch, BrowserSpawner};
pub use manual::ManualClock;
#[cfg(not(target_arch = "wasm32"))]
pub use system::SystemClock;

use crate::frames::UnixMillis;
use futures_util::future::LocalBoxFuture;
use futures_util::task::{LocalSpawn, LocalSpawnExt};
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

/// Executor handle used to run background work (playback loop, crossfades,
/// prefetch, periodic refresh) on the single logical thread.
pub type Spawner = Rc<dyn LocalSpawn>;

/// Source of time and display-refresh ticks.
pub trait Clock {
    /// Monotonic time in milliseconds. Only differences are meaningful.
    fn now_ms(&self) -> f64;

    /// Wall-clock time, used for cache expiry and synthetic timelines.
    fn wall_clock(&self) -> UnixMillis;

    /// Resolves once `duration` has elapsed.
    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()>;

    /// Resolves on the next display refresh with that tick's monotonic
    /// timestamp (the `requestAnimationFrame` contract).
    fn next_frame(&self) -> LocalBoxFuture<'static, f64>;
}

/// Spawns `future`, logging instead of failing when the executor refuses.
///
/// Returns whether the task was accepted.
pub(crate) fn spawn_logged<F>(spawner: &Spawner, what: &str, future: F) -> bool
where
    F: Future<Output = ()> + 'static,
{
    match spawner.spawn_local(future) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Failed to spawn {}: {}", what, e);
            false
        }
    }
}
