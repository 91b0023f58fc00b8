//! Drawable layer contract and per-layer readiness signalling.
//!
//! The engine never rasterizes tiles. A host supplies a [`LayerFactory`]
//! whose layers report progress through the [`LayerSignals`] handed to
//! them at creation. Readiness is modelled as a single shared future per
//! layer so that every waiter joins the same outcome.

use futures_channel::oneshot;
use futures_util::future::{FutureExt, LocalBoxFuture, Shared};
use std::cell::RefCell;
use std::rc::Rc;

/// One frame's imagery on the map.
///
/// Methods take `&self`; implementations use interior mutability the same
/// way the host's view objects do.
pub trait DrawableLayer {
    /// Opacity in `0.0..=1.0`.
    fn set_opacity(&self, opacity: f32);
    fn add_to_view(&self);
    fn remove_from_view(&self);
    fn in_view(&self) -> bool;
}

/// Creates layers for tile URL templates.
pub trait LayerFactory {
    /// Builds a layer for `tile_url_template`. The layer must call
    /// [`LayerSignals::ready`] once its tiles are loaded and
    /// [`LayerSignals::tile_error`] for every failed tile.
    fn create_layer(&self, tile_url_template: &str, signals: LayerSignals)
        -> Rc<dyn DrawableLayer>;
}

/// Load status of a cached layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerStatus {
    Loading,
    Ready,
    Error,
}

/// Future resolving to whether the layer became ready (`false` on error).
pub(crate) type Readiness = Shared<LocalBoxFuture<'static, bool>>;

struct SignalState {
    status: LayerStatus,
    tile_errors: u32,
    threshold: u32,
    resolve: Option<oneshot::Sender<bool>>,
}

impl SignalState {
    fn settle(&mut self, ready: bool) {
        if let Some(tx) = self.resolve.take() {
            let _ = tx.send(ready);
        }
    }
}

/// Callback side of a layer's readiness future plus its tile-error counter.
#[derive(Clone)]
pub struct LayerSignals {
    state: Rc<RefCell<SignalState>>,
}

impl LayerSignals {
    /// Creates signals that fail the layer after `threshold` tile errors.
    pub(crate) fn new(threshold: u32) -> (Self, Readiness) {
        let (tx, rx) = oneshot::channel();
        let signals = Self {
            state: Rc::new(RefCell::new(SignalState {
                status: LayerStatus::Loading,
                tile_errors: 0,
                threshold: threshold.max(1),
                resolve: Some(tx),
            })),
        };
        let readiness = async move { rx.await.unwrap_or(false) }
            .boxed_local()
            .shared();
        (signals, readiness)
    }

    /// The layer finished loading.
    ///
    /// A late ready after an error still flips the status, so the entry is
    /// reused instead of recreated on the next visit.
    pub fn ready(&self) {
        let mut state = self.state.borrow_mut();
        state.status = LayerStatus::Ready;
        state.settle(true);
    }

    /// One tile failed to load.
    pub fn tile_error(&self) {
        let mut state = self.state.borrow_mut();
        state.tile_errors += 1;
        if state.status == LayerStatus::Loading && state.tile_errors >= state.threshold {
            state.status = LayerStatus::Error;
            state.settle(false);
        }
    }

    pub fn status(&self) -> LayerStatus {
        self.state.borrow().status
    }

    pub fn tile_error_count(&self) -> u32 {
        self.state.borrow().tile_errors
    }

    /// Marks a still-loading layer as failed (readiness timed out).
    pub(crate) fn force_error(&self) {
        let mut state = self.state.borrow_mut();
        if state.status == LayerStatus::Loading {
            state.status = LayerStatus::Error;
            state.settle(false);
        }
    }
}
