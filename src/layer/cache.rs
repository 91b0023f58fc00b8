//! Layer cache: lazily created drawable layers keyed by frame index.
//!
//! Entries are positional, so a new timeline invalidates every entry.
//! Eviction is least-recently-touched first and never removes the current
//! index, the displayed index, or a layer that is still loading.

use super::handle::{DrawableLayer, LayerFactory, LayerSignals, LayerStatus, Readiness};
use crate::config::EngineConfig;
use crate::error::LayerFailure;
use crate::frames::{Frame, FrameSet};
use crate::platform::Clock;
use futures_util::future::{self, Either};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

/// The subset of [`EngineConfig`] the layer cache needs.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerCacheSettings {
    pub max_cached_frames: usize,
    pub ready_timeout: Duration,
    pub tile_error_threshold: u32,
}

impl From<&EngineConfig> for LayerCacheSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_cached_frames: config.max_cached_frames,
            ready_timeout: config.ready_timeout(),
            tile_error_threshold: config.tile_error_threshold,
        }
    }
}

struct LayerEntry {
    /// Distinguishes a recreated entry from the one a waiter started on.
    id: u64,
    layer: Rc<dyn DrawableLayer>,
    signals: LayerSignals,
    ready: Readiness,
    last_touched_ms: f64,
    /// Tie-break for touches within the same millisecond.
    touch_seq: u64,
}

#[derive(Default)]
struct CacheState {
    frames: FrameSet,
    entries: HashMap<usize, LayerEntry>,
    current_index: usize,
    displayed_index: Option<usize>,
    /// Bumped on every timeline replacement.
    generation: u64,
    next_entry_id: u64,
    touch_seq: u64,
}

impl CacheState {
    fn touch(&mut self, index: usize, now: f64) {
        self.touch_seq += 1;
        let seq = self.touch_seq;
        if let Some(entry) = self.entries.get_mut(&index) {
            entry.last_touched_ms = now;
            entry.touch_seq = seq;
        }
    }
}

/// Cache of drawable layers for the current timeline.
#[derive(Clone)]
pub struct LayerCache {
    state: Rc<RefCell<CacheState>>,
    factory: Rc<dyn LayerFactory>,
    clock: Rc<dyn Clock>,
    settings: LayerCacheSettings,
}

impl LayerCache {
    pub fn new(
        factory: Rc<dyn LayerFactory>,
        clock: Rc<dyn Clock>,
        settings: LayerCacheSettings,
    ) -> Self {
        Self {
            state: Rc::new(RefCell::new(CacheState::default())),
            factory,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &LayerCacheSettings {
        &self.settings
    }

    /// Replaces the timeline, discarding every cached layer, and points the
    /// current index at the newest frame.
    pub fn set_frames(&self, frames: FrameSet) {
        let discarded = {
            let mut state = self.state.borrow_mut();
            state.current_index = frames.len().saturating_sub(1);
            state.frames = frames;
            state.displayed_index = None;
            state.generation += 1;
            std::mem::take(&mut state.entries)
        };
        Self::discard(discarded.into_values());
    }

    /// Releases every cached layer and forgets the timeline.
    pub fn clear(&self) {
        self.set_frames(FrameSet::default());
    }

    fn discard(entries: impl Iterator<Item = LayerEntry>) {
        for entry in entries {
            // Wake anyone still waiting on this layer.
            entry.signals.force_error();
            entry.layer.remove_from_view();
        }
    }

    pub fn frames(&self) -> FrameSet {
        self.state.borrow().frames.clone()
    }

    pub fn frame(&self, index: usize) -> Option<Frame> {
        self.state.borrow().frames.get(index).cloned()
    }

    pub fn frame_count(&self) -> usize {
        self.state.borrow().frames.len()
    }

    pub fn current_index(&self) -> usize {
        self.state.borrow().current_index
    }

    pub fn set_current_index(&self, index: usize) {
        self.state.borrow_mut().current_index = index;
    }

    /// Index whose layer is currently shown, if any.
    pub fn displayed_index(&self) -> Option<usize> {
        self.state.borrow().displayed_index
    }

    pub(crate) fn mark_displayed(&self, index: Option<usize>) {
        self.state.borrow_mut().displayed_index = index;
    }

    pub fn generation(&self) -> u64 {
        self.state.borrow().generation
    }

    /// Cached layer for `index`; counts as a touch.
    pub fn layer(&self, index: usize) -> Option<Rc<dyn DrawableLayer>> {
        let now = self.clock.now_ms();
        let mut state = self.state.borrow_mut();
        state.touch(index, now);
        state.entries.get(&index).map(|entry| entry.layer.clone())
    }

    /// Every cached layer, for bulk view operations.
    pub(crate) fn layers(&self) -> Vec<Rc<dyn DrawableLayer>> {
        self.state
            .borrow()
            .entries
            .values()
            .map(|entry| entry.layer.clone())
            .collect()
    }

    pub fn status(&self, index: usize) -> Option<LayerStatus> {
        self.state
            .borrow()
            .entries
            .get(&index)
            .map(|entry| entry.signals.status())
    }

    pub fn contains(&self, index: usize) -> bool {
        self.state.borrow().entries.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached indices in ascending order.
    pub fn cached_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.state.borrow().entries.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    /// Returns the live entry for `index`, creating (or recreating a failed)
    /// one when needed. Touches the entry.
    fn get_or_create(&self, index: usize) -> Option<(u64, Rc<dyn DrawableLayer>, Readiness)> {
        let now = self.clock.now_ms();
        let template = {
            let mut state = self.state.borrow_mut();
            let live = state
                .entries
                .get(&index)
                .filter(|entry| entry.signals.status() != LayerStatus::Error)
                .map(|entry| (entry.id, entry.layer.clone(), entry.ready.clone()));
            if let Some(found) = live {
                state.touch(index, now);
                return Some(found);
            }
            state.frames.get(index)?.tile_url_template.clone()
        };

        let failed = self.state.borrow_mut().entries.remove(&index);
        if let Some(failed) = failed {
            log::debug!("Recreating failed radar layer {}", index);
            failed.layer.remove_from_view();
        }

        let (signals, ready) = LayerSignals::new(self.settings.tile_error_threshold);
        let layer = self.factory.create_layer(&template, signals.clone());
        log::debug!("Created radar layer {} ({})", index, template);

        let mut state = self.state.borrow_mut();
        state.next_entry_id += 1;
        let id = state.next_entry_id;
        state.entries.insert(
            index,
            LayerEntry {
                id,
                layer: layer.clone(),
                signals,
                ready: ready.clone(),
                last_touched_ms: now,
                touch_seq: 0,
            },
        );
        state.touch(index, now);
        Some((id, layer, ready))
    }

    /// Waits until the layer for `index` is ready, creating it if needed.
    ///
    /// Concurrent calls for one index share a single layer and readiness
    /// future. A layer still loading after the configured timeout is marked
    /// failed so the next call recreates it.
    pub async fn ensure_ready(&self, index: usize) -> Result<(), LayerFailure> {
        let (id, layer, ready) = self
            .get_or_create(index)
            .ok_or(LayerFailure::NoFrame(index))?;

        // Layers load tiles only while attached; keep warm ones invisible.
        if !layer.in_view() {
            layer.set_opacity(0.0);
            layer.add_to_view();
        }

        if self.status(index) == Some(LayerStatus::Ready) {
            return Ok(());
        }

        let timeout = self.clock.sleep(self.settings.ready_timeout);
        let timed_out = matches!(
            future::select(ready, timeout).await,
            Either::Right(_)
        );

        let signals = {
            let state = self.state.borrow();
            match state.entries.get(&index) {
                Some(entry) if entry.id == id => entry.signals.clone(),
                // Replaced or discarded while we waited.
                _ => return Err(LayerFailure::Timeout),
            }
        };

        match signals.status() {
            LayerStatus::Ready => Ok(()),
            LayerStatus::Error if signals.tile_error_count() >= self.settings.tile_error_threshold => {
                log::warn!("Radar layer {} failed: {} tile errors", index, signals.tile_error_count());
                Err(LayerFailure::TileErrors(signals.tile_error_count()))
            }
            LayerStatus::Error => Err(LayerFailure::Timeout),
            LayerStatus::Loading => {
                if timed_out {
                    log::warn!(
                        "Radar layer {} not ready after {:?}",
                        index,
                        self.settings.ready_timeout
                    );
                }
                signals.force_error();
                Err(LayerFailure::Timeout)
            }
        }
    }

    /// Evicts least-recently-touched entries until the cache is within
    /// capacity. Returns how many were evicted.
    pub fn evict_old_entries(&self) -> usize {
        let evicted: Vec<(usize, LayerEntry)> = {
            let mut state = self.state.borrow_mut();
            let max = self.settings.max_cached_frames;
            if state.entries.len() <= max {
                return 0;
            }

            let current = state.current_index;
            let displayed = state.displayed_index;
            let mut candidates: Vec<(usize, f64, u64)> = state
                .entries
                .iter()
                .filter(|(index, entry)| {
                    **index != current
                        && Some(**index) != displayed
                        && entry.signals.status() != LayerStatus::Loading
                })
                .map(|(index, entry)| (*index, entry.last_touched_ms, entry.touch_seq))
                .collect();
            candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.2.cmp(&b.2)));

            let excess = state.entries.len() - max;
            candidates
                .into_iter()
                .take(excess)
                .filter_map(|(index, _, _)| state.entries.remove(&index).map(|e| (index, e)))
                .collect()
        };

        for (index, entry) in &evicted {
            log::debug!("Evicted radar layer {}", index);
            entry.layer.remove_from_view();
        }
        evicted.len()
    }
}
