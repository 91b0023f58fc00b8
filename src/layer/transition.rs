//! Crossfades between the previously shown layer and the next one.

use super::handle::DrawableLayer;
use crate::platform::Clock;
use std::rc::Rc;
use std::time::Duration;

/// Ease-out quadratic: fast start, gentle landing.
pub fn ease_out(progress: f32) -> f32 {
    let p = progress.clamp(0.0, 1.0);
    p * (2.0 - p)
}

/// Shows layers, crossfading over a fixed duration sampled on display
/// refresh ticks.
///
/// A running fade is never interrupted here; callers serialize `show`.
#[derive(Clone)]
pub struct TransitionEngine {
    clock: Rc<dyn Clock>,
    duration: Duration,
}

impl TransitionEngine {
    pub fn new(clock: Rc<dyn Clock>, duration: Duration) -> Self {
        Self { clock, duration }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Brings `next` to `opacity` and discards `previous`.
    pub async fn show(
        &self,
        next: Rc<dyn DrawableLayer>,
        previous: Option<Rc<dyn DrawableLayer>>,
        animate: bool,
        opacity: f32,
    ) {
        if !next.in_view() {
            next.add_to_view();
        }

        let previous = match previous {
            Some(prev) if !Rc::ptr_eq(&prev, &next) => prev,
            _ => {
                next.set_opacity(opacity);
                return;
            }
        };

        if !animate || self.duration.is_zero() {
            next.set_opacity(opacity);
            previous.remove_from_view();
            return;
        }

        let duration_ms = self.duration.as_secs_f64() * 1000.0;
        let start = self.clock.now_ms();
        next.set_opacity(0.0);
        previous.set_opacity(opacity);

        loop {
            let now = self.clock.next_frame().await;
            let progress = ((now - start) / duration_ms).min(1.0) as f32;
            let eased = ease_out(progress);
            next.set_opacity(opacity * eased);
            previous.set_opacity(opacity * (1.0 - eased));
            if progress >= 1.0 {
                break;
            }
        }

        // Another transition may have reclaimed it meanwhile.
        if previous.in_view() {
            previous.remove_from_view();
        }
        log::debug!("Crossfade finished after {:.0} ms", self.clock.now_ms() - start);
    }
}
