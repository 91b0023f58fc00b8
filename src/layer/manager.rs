//! Radar layer manager: the single `advance_to` entry point that readies a
//! frame's layer, crossfades it in and schedules prefetch and eviction.

use super::cache::LayerCache;
use super::handle::DrawableLayer;
use super::transition::TransitionEngine;
use crate::events::{EngineCallbacks, LoadState};
use crate::frames::{Frame, FrameSet};
use crate::platform::{spawn_logged, Spawner};
use futures_util::future::join_all;
use futures_util::lock::Mutex;
use std::cell::RefCell;
use std::rc::Rc;

/// Options for [`RadarLayerManager::advance_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceOptions {
    /// Crossfade from the previously shown layer.
    pub animate: bool,
}

impl Default for AdvanceOptions {
    fn default() -> Self {
        Self { animate: true }
    }
}

impl AdvanceOptions {
    pub fn immediate() -> Self {
        Self { animate: false }
    }
}

struct ViewState {
    active_layer: Option<Rc<dyn DrawableLayer>>,
    visible: bool,
    opacity: f32,
}

/// Shows cached radar layers on the view.
#[derive(Clone)]
pub struct RadarLayerManager {
    cache: LayerCache,
    transitions: TransitionEngine,
    view: Rc<RefCell<ViewState>>,
    /// Held for the whole of an advance so transitions never overlap.
    advance_lock: Rc<Mutex<()>>,
    spawner: Spawner,
    prefetch_ahead: usize,
    callbacks: EngineCallbacks,
}

impl RadarLayerManager {
    pub fn new(
        cache: LayerCache,
        transitions: TransitionEngine,
        spawner: Spawner,
        opacity: f32,
        prefetch_ahead: usize,
        callbacks: EngineCallbacks,
    ) -> Self {
        Self {
            cache,
            transitions,
            view: Rc::new(RefCell::new(ViewState {
                active_layer: None,
                visible: true,
                opacity: opacity.clamp(0.0, 1.0),
            })),
            advance_lock: Rc::new(Mutex::new(())),
            spawner,
            prefetch_ahead,
            callbacks,
        }
    }

    pub fn cache(&self) -> &LayerCache {
        &self.cache
    }

    /// Replaces the timeline; every cached layer is released.
    pub fn set_frames(&self, frames: FrameSet) {
        self.view.borrow_mut().active_layer = None;
        self.cache.set_frames(frames);
    }

    /// Releases every layer and forgets the timeline.
    pub fn clear(&self) {
        self.view.borrow_mut().active_layer = None;
        self.cache.clear();
    }

    pub fn frames(&self) -> FrameSet {
        self.cache.frames()
    }

    pub fn frame(&self, index: usize) -> Option<Frame> {
        self.cache.frame(index)
    }

    pub fn frame_count(&self) -> usize {
        self.cache.frame_count()
    }

    pub fn current_index(&self) -> usize {
        self.cache.current_index()
    }

    /// Index of the frame actually on screen. Differs from
    /// [`current_index`](Self::current_index) after a frame fails to load.
    pub fn displayed_index(&self) -> Option<usize> {
        self.cache.displayed_index()
    }

    pub fn is_visible(&self) -> bool {
        self.view.borrow().visible
    }

    pub fn opacity(&self) -> f32 {
        self.view.borrow().opacity
    }

    /// Makes `index` (clamped to the timeline) the current frame and shows
    /// it once its layer is ready.
    ///
    /// Returns the current index. A frame that fails to load leaves the
    /// previous layer on screen and is reported through the load-state
    /// callback; the current index still moves.
    pub async fn advance_to(&self, index: usize, options: AdvanceOptions) -> usize {
        let count = self.cache.frame_count();
        if count == 0 {
            return self.cache.current_index();
        }
        let index = index.min(count - 1);
        let generation = self.cache.generation();
        self.cache.set_current_index(index);

        if !self.is_visible() {
            return index;
        }

        let _guard = self.advance_lock.lock().await;
        if self.cache.generation() != generation {
            return self.cache.current_index();
        }

        self.callbacks.load_state_changed(LoadState::loading());
        let outcome = self.cache.ensure_ready(index).await;
        if self.cache.generation() != generation {
            // Superseded by a new timeline while loading.
            self.callbacks.load_state_changed(LoadState::loaded());
            return self.cache.current_index();
        }
        if let Err(failure) = outcome {
            log::warn!("Skipping radar frame {}: {}", index, failure);
            self.callbacks
                .load_state_changed(LoadState::failed(failure.user_message()));
            return index;
        }

        let Some(next) = self.cache.layer(index) else {
            return index;
        };
        let (previous, opacity) = {
            let mut view = self.view.borrow_mut();
            (view.active_layer.replace(next.clone()), view.opacity)
        };
        let outgoing = self.cache.displayed_index().filter(|&shown| shown != index);
        self.cache.mark_displayed(Some(index));
        self.transitions
            .show(next, previous, options.animate, opacity)
            .await;

        let manager = self.clone();
        let ahead = self.prefetch_ahead;
        spawn_logged(&self.spawner, "radar prefetch", async move {
            manager.prefetch_window(index, ahead, outgoing).await;
        });
        self.cache.evict_old_entries();
        self.callbacks.load_state_changed(LoadState::loaded());
        index
    }

    /// Warms the `count` frames after `start` (wrapping) without showing
    /// them. Returns how many became ready.
    pub async fn prefetch_from(&self, start: usize, count: usize) -> usize {
        self.prefetch_window(start, count, None).await
    }

    /// Like [`prefetch_from`](Self::prefetch_from), leaving `skip` alone.
    /// The layer just faded out must stay off the view.
    async fn prefetch_window(&self, start: usize, count: usize, skip: Option<usize>) -> usize {
        let len = self.cache.frame_count();
        if len == 0 || !self.is_visible() {
            return 0;
        }
        let jobs = (1..=count)
            .map(|i| (start + i) % len)
            .filter(|&index| Some(index) != skip)
            .map(|index| self.cache.ensure_ready(index));
        join_all(jobs).await.iter().filter(|r| r.is_ok()).count()
    }

    /// Warms a window of `min(frames, capacity)` frames starting at the
    /// current one, then evicts. Returns how many became ready.
    pub async fn prefetch_all(&self) -> usize {
        let len = self.cache.frame_count();
        if len == 0 || !self.is_visible() {
            return 0;
        }
        let window = len.min(self.cache.settings().max_cached_frames);
        let start = self.cache.current_index();
        let jobs = (0..window).map(|i| self.cache.ensure_ready((start + i) % len));
        let ready = join_all(jobs).await.iter().filter(|r| r.is_ok()).count();
        self.cache.evict_old_entries();
        log::debug!("Prefetched {}/{} radar frames", ready, window);
        ready
    }

    /// Shows the newest frame.
    pub async fn jump_to_latest(&self) -> usize {
        let latest = self.frame_count().saturating_sub(1);
        self.advance_to(latest, AdvanceOptions::default()).await
    }

    /// Hides every layer, or redisplays the current frame without
    /// animation.
    pub fn set_visible(&self, visible: bool) {
        self.view.borrow_mut().visible = visible;
        if !visible {
            self.cache.mark_displayed(None);
            for layer in self.cache.layers() {
                layer.remove_from_view();
            }
            return;
        }

        let manager = self.clone();
        let index = self.cache.current_index();
        spawn_logged(&self.spawner, "radar redisplay", async move {
            manager.advance_to(index, AdvanceOptions::immediate()).await;
        });
    }

    /// Applies immediately to the shown layer and to future transitions.
    pub fn set_opacity(&self, opacity: f32) {
        let active = {
            let mut view = self.view.borrow_mut();
            view.opacity = opacity.clamp(0.0, 1.0);
            if view.visible {
                view.active_layer.clone().map(|layer| (layer, view.opacity))
            } else {
                None
            }
        };
        if let Some((layer, opacity)) = active {
            layer.set_opacity(opacity);
        }
    }
}
