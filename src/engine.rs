//! The radar engine: one instance per map view, owning the frame source,
//! layer manager and playback controller.
//!
//! ```text
//! FrameSource ──FrameSet──▶ RadarLayerManager ◀──advance_to── PlaybackController
//!                             (LayerCache + TransitionEngine)
//! ```

use crate::config::{EngineConfig, ProviderConfig};
use crate::error::RadarError;
use crate::events::{EngineCallbacks, LoadState};
use crate::frames::{Frame, FrameSet, FrameSource, FrameSourceSettings, MetadataClient};
use crate::layer::{
    AdvanceOptions, LayerCache, LayerCacheSettings, LayerFactory, RadarLayerManager,
    TransitionEngine,
};
use crate::platform::{spawn_logged, Clock, Spawner};
use crate::playback::PlaybackController;
use crate::storage::{KeyValueStore, TtlCache};
use futures_channel::oneshot;
use futures_util::future::{self, Either};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Host services the engine runs on.
#[derive(Clone)]
pub struct EngineHost {
    pub clock: Rc<dyn Clock>,
    pub spawner: Spawner,
    pub client: Rc<dyn MetadataClient>,
    pub layers: Rc<dyn LayerFactory>,
    /// Persistent tier for the timeline cache; memory-only when `None`.
    pub store: Option<Rc<dyn KeyValueStore>>,
}

/// Options for [`RadarEngine::refresh`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshOptions {
    /// Keep showing the same instant if the new timeline contains it.
    pub preserve_current_instant: bool,
}

struct EngineInner {
    config: EngineConfig,
    clock: Rc<dyn Clock>,
    spawner: Spawner,
    client: Rc<dyn MetadataClient>,
    cache: TtlCache,
    manager: RadarLayerManager,
    controller: PlaybackController,
    callbacks: EngineCallbacks,
    source: RefCell<Option<Rc<FrameSource>>>,
    refresh_cancel: RefCell<Option<oneshot::Sender<()>>>,
    destroyed: Cell<bool>,
}

impl EngineInner {
    fn teardown(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        self.controller.pause();
        self.refresh_cancel.borrow_mut().take();
        self.source.borrow_mut().take();
        self.manager.clear();
        log::info!("Radar engine destroyed");
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Radar animation engine for one map view.
#[derive(Clone)]
pub struct RadarEngine {
    inner: Rc<EngineInner>,
}

/// Non-owning engine handle, for callbacks and background tasks that must
/// not keep the engine alive.
#[derive(Clone, Default)]
pub struct WeakRadarEngine {
    inner: Weak<EngineInner>,
}

impl WeakRadarEngine {
    pub fn upgrade(&self) -> Option<RadarEngine> {
        self.inner.upgrade().map(|inner| RadarEngine { inner })
    }
}

impl RadarEngine {
    pub fn new(mut config: EngineConfig, host: EngineHost, callbacks: EngineCallbacks) -> Self {
        let fps = config.base_frames_per_second;
        if !fps.is_finite() || fps <= 0.0 {
            log::warn!("Invalid base frame rate {}; using default", fps);
            config.base_frames_per_second = EngineConfig::default().base_frames_per_second;
        }

        let cache = match &host.store {
            Some(store) => TtlCache::with_store(host.clock.clone(), store.clone()),
            None => TtlCache::new(host.clock.clone()),
        };
        let layer_cache = LayerCache::new(
            host.layers.clone(),
            host.clock.clone(),
            LayerCacheSettings::from(&config),
        );
        let manager = RadarLayerManager::new(
            layer_cache,
            TransitionEngine::new(host.clock.clone(), config.crossfade()),
            host.spawner.clone(),
            config.display_opacity,
            config.prefetch_ahead,
            callbacks.clone(),
        );
        let controller = PlaybackController::new(
            manager.clone(),
            host.clock.clone(),
            host.spawner.clone(),
            config.base_frames_per_second,
            callbacks.clone(),
        );

        Self {
            inner: Rc::new(EngineInner {
                config,
                clock: host.clock,
                spawner: host.spawner,
                client: host.client,
                cache,
                manager,
                controller,
                callbacks,
                source: RefCell::new(None),
                refresh_cancel: RefCell::new(None),
                destroyed: Cell::new(false),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakRadarEngine {
        WeakRadarEngine {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.inner.controller
    }

    pub fn layers(&self) -> &RadarLayerManager {
        &self.inner.manager
    }

    pub fn frames(&self) -> FrameSet {
        self.inner.manager.frames()
    }

    /// Frame at the controller's current index.
    pub fn current_frame(&self) -> Option<Frame> {
        self.inner
            .manager
            .frame(self.inner.controller.current_index())
    }

    /// First load: fetches the timeline, shows the newest frame and starts
    /// the periodic background refresh.
    pub async fn initialize(&self, provider: ProviderConfig) -> Result<FrameSet, RadarError> {
        let inner = &self.inner;
        inner.destroyed.set(false);
        inner.refresh_cancel.borrow_mut().take();

        let source = Rc::new(FrameSource::new(
            provider,
            inner.client.clone(),
            inner.cache.clone(),
            inner.clock.clone(),
            FrameSourceSettings::from(&inner.config),
        ));
        *inner.source.borrow_mut() = Some(source.clone());

        inner.callbacks.load_state_changed(LoadState::loading());
        let frames = match source.fetch_frames(false).await {
            Ok(frames) => frames,
            Err(e) => {
                log::warn!("Radar initialization failed: {}", e);
                inner
                    .callbacks
                    .load_state_changed(LoadState::failed(e.user_message()));
                return Err(e);
            }
        };

        inner.manager.set_frames(frames.clone());
        let latest = frames.len().saturating_sub(1);
        let shown = inner
            .manager
            .advance_to(latest, AdvanceOptions::immediate())
            .await;
        inner.controller.reset_timeline(shown);
        inner.callbacks.tick(shown);

        log::info!(
            "Radar engine initialized with {} {} frames",
            frames.len(),
            source.provider().provider()
        );
        self.start_periodic_refresh();
        Ok(frames)
    }

    /// Refetches the timeline and swaps it in.
    ///
    /// With `preserve_current_instant` the frame whose time matches the one
    /// on screen stays displayed; otherwise (or without a match) the newest
    /// frame is shown. A timeline sharing no instant with the previous one
    /// restarts playback timing.
    pub async fn refresh(&self, options: RefreshOptions) -> Result<FrameSet, RadarError> {
        let inner = &self.inner;
        let source = inner
            .source
            .borrow()
            .clone()
            .ok_or(RadarError::NotInitialized)?;

        let previous = inner.manager.frames();
        let shown_index = inner
            .manager
            .displayed_index()
            .unwrap_or_else(|| inner.controller.current_index());
        let previous_time = previous.get(shown_index).map(|frame| frame.time);

        let frames = match source.fetch_frames(true).await {
            Ok(frames) => frames,
            Err(e) => {
                inner
                    .callbacks
                    .load_state_changed(LoadState::failed(e.user_message()));
                return Err(e);
            }
        };

        let latest = frames.len().saturating_sub(1);
        let target = if options.preserve_current_instant {
            previous_time
                .and_then(|time| frames.index_of_time(time))
                .unwrap_or(latest)
        } else {
            latest
        };
        let overlaps = frames.shares_time_with(&previous);

        inner.manager.set_frames(frames.clone());
        let shown = inner
            .manager
            .advance_to(target, AdvanceOptions::immediate())
            .await;
        if overlaps {
            inner.controller.sync_index(shown);
        } else {
            log::debug!("Refreshed timeline shares no frames; restarting playback timing");
            inner.controller.reset_timeline(shown);
        }
        inner.callbacks.tick(shown);

        log::info!("Radar timeline refreshed ({} frames)", frames.len());
        Ok(frames)
    }

    fn start_periodic_refresh(&self) {
        let interval = self.inner.config.refresh_interval();
        if interval.is_zero() {
            return;
        }

        let (tx, mut cancel) = oneshot::channel::<()>();
        *self.inner.refresh_cancel.borrow_mut() = Some(tx);

        let weak = self.downgrade();
        let clock = self.inner.clock.clone();
        spawn_logged(&self.inner.spawner, "periodic radar refresh", async move {
            loop {
                if let Either::Right(_) = future::select(clock.sleep(interval), &mut cancel).await {
                    break;
                }
                let Some(engine) = weak.upgrade() else {
                    break;
                };
                let options = RefreshOptions {
                    preserve_current_instant: true,
                };
                if let Err(e) = engine.refresh(options).await {
                    log::warn!("Periodic refresh failed: {}", e);
                }
            }
        });
    }

    /// Stops playback and background refresh and releases every layer.
    /// Also runs when the last handle is dropped.
    pub fn destroy(&self) {
        self.inner.teardown();
    }

    pub fn play(&self) {
        self.inner.controller.play();
    }

    pub fn pause(&self) {
        self.inner.controller.pause();
    }

    pub fn toggle(&self) {
        self.inner.controller.toggle();
    }

    pub async fn step(&self, delta: i64) -> usize {
        self.inner.controller.step(delta).await
    }

    pub async fn set_index(&self, index: usize, animate: bool) -> usize {
        self.inner.controller.set_index(index, animate).await
    }

    pub async fn latest(&self) -> usize {
        self.inner.controller.latest().await
    }

    pub fn set_speed(&self, multiplier: f32) {
        self.inner.controller.set_speed(multiplier);
    }

    pub fn set_visible(&self, visible: bool) {
        self.inner.manager.set_visible(visible);
    }

    pub fn set_opacity(&self, opacity: f32) {
        self.inner.manager.set_opacity(opacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::UnixMillis;
    use crate::test_support::{
        noaa_metadata, Harness, LoadMode, RecordingFactory, ScriptedClient, T0,
    };

    const MIN: i64 = 60_000;

    struct Fixture {
        h: Harness,
        client: Rc<ScriptedClient>,
        factory: Rc<RecordingFactory>,
        engine: RadarEngine,
        ticks: Rc<RefCell<Vec<usize>>>,
        load_states: Rc<RefCell<Vec<LoadState>>>,
    }

    fn fixture(config: EngineConfig) -> Fixture {
        let h = Harness::new();
        let client = Rc::new(ScriptedClient::new());
        let factory = RecordingFactory::new(LoadMode::Immediate);
        let ticks = Rc::new(RefCell::new(Vec::new()));
        let load_states = Rc::new(RefCell::new(Vec::new()));

        let tick_sink = ticks.clone();
        let load_sink = load_states.clone();
        let callbacks = EngineCallbacks::new()
            .on_tick(move |i| tick_sink.borrow_mut().push(i))
            .on_load_state_change(move |s| load_sink.borrow_mut().push(s.clone()));

        let engine = RadarEngine::new(
            config,
            EngineHost {
                clock: h.clock(),
                spawner: h.spawner.clone(),
                client: client.clone(),
                layers: factory.clone(),
                store: None,
            },
            callbacks,
        );
        Fixture {
            h,
            client,
            factory,
            engine,
            ticks,
            load_states,
        }
    }

    /// Minutes relative to T0.
    fn times(minutes: &[i64]) -> Vec<i64> {
        minutes.iter().map(|m| T0 + m * MIN).collect()
    }

    fn initialize(fx: &mut Fixture) -> Result<FrameSet, RadarError> {
        let engine = fx.engine.clone();
        let result = fx
            .h
            .spawn(async move { engine.initialize(ProviderConfig::noaa()).await });
        let value = result.borrow_mut().take();
        value.expect("initialize finished")
    }

    fn refresh(fx: &mut Fixture, preserve: bool) -> Result<FrameSet, RadarError> {
        let engine = fx.engine.clone();
        let options = RefreshOptions {
            preserve_current_instant: preserve,
        };
        let result = fx.h.spawn(async move { engine.refresh(options).await });
        let value = result.borrow_mut().take();
        value.expect("refresh finished")
    }

    fn displayed_time(fx: &Fixture) -> Option<UnixMillis> {
        let index = fx.engine.layers().displayed_index()?;
        fx.engine.frames().get(index).map(|frame| frame.time)
    }

    #[test]
    fn test_initialize_shows_latest() {
        let mut fx = fixture(EngineConfig::default());
        fx.client.push_ok(noaa_metadata(&times(&[0, 10, 20])));

        let frames = initialize(&mut fx).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(fx.engine.controller().current_index(), 2);
        assert_eq!(displayed_time(&fx), Some(UnixMillis(T0 + 20 * MIN)));
        assert_eq!(*fx.ticks.borrow(), vec![2]);
        assert_eq!(fx.load_states.borrow().last().cloned(), Some(LoadState::loaded()));
        assert_eq!(
            fx.engine.current_frame().map(|f| f.time),
            Some(UnixMillis(T0 + 20 * MIN))
        );
    }

    #[test]
    fn test_initialize_failure_propagates() {
        let mut fx = fixture(EngineConfig::default());
        fx.client.push_ok(noaa_metadata(&times(&[0])));

        let err = initialize(&mut fx).unwrap_err();
        assert_eq!(err, RadarError::InsufficientData { found: 1 });
        assert_eq!(
            fx.load_states.borrow().last().cloned(),
            Some(LoadState::failed(
                "Radar unavailable: insufficient radar frames available (1 found)"
            ))
        );
        assert_eq!(fx.factory.created_count(), 0);
    }

    #[test]
    fn test_refresh_before_initialize() {
        let mut fx = fixture(EngineConfig::default());
        assert_eq!(refresh(&mut fx, true), Err(RadarError::NotInitialized));
    }

    #[test]
    fn test_refresh_preserves_displayed_instant() {
        let mut fx = fixture(EngineConfig::default());
        fx.client.push_ok(noaa_metadata(&times(&[0, 10, 20])));
        initialize(&mut fx).unwrap();

        let engine = fx.engine.clone();
        fx.h.spawn(async move { engine.set_index(1, false).await });
        assert_eq!(displayed_time(&fx), Some(UnixMillis(T0 + 10 * MIN)));

        fx.client.push_ok(noaa_metadata(&times(&[10, 20, 30])));
        refresh(&mut fx, true).unwrap();

        assert_eq!(displayed_time(&fx), Some(UnixMillis(T0 + 10 * MIN)));
        assert_eq!(fx.engine.controller().current_index(), 0);
        assert_eq!(fx.ticks.borrow().last(), Some(&0));
    }

    #[test]
    fn test_refresh_falls_back_to_latest() {
        let mut fx = fixture(EngineConfig::default());
        fx.client.push_ok(noaa_metadata(&times(&[0, 10, 20])));
        initialize(&mut fx).unwrap();

        let engine = fx.engine.clone();
        fx.h.spawn(async move { engine.set_index(0, false).await });

        fx.client.push_ok(noaa_metadata(&times(&[10, 20, 30])));
        refresh(&mut fx, true).unwrap();
        assert_eq!(displayed_time(&fx), Some(UnixMillis(T0 + 30 * MIN)));

        // Without preservation the newest frame is shown even on a match.
        let engine = fx.engine.clone();
        fx.h.spawn(async move { engine.set_index(1, false).await });
        fx.client.push_ok(noaa_metadata(&times(&[10, 20, 30])));
        refresh(&mut fx, false).unwrap();
        assert_eq!(fx.engine.controller().current_index(), 2);
    }

    #[test]
    fn test_disjoint_refresh_keeps_playing() {
        let mut fx = fixture(EngineConfig::default());
        fx.client.push_ok(noaa_metadata(&times(&[0, 10, 20])));
        initialize(&mut fx).unwrap();
        fx.engine.play();
        fx.h.tick(16.0);

        fx.client.push_ok(noaa_metadata(&times(&[100, 110, 120, 130])));
        refresh(&mut fx, true).unwrap();

        assert!(fx.engine.controller().is_playing());
        assert_eq!(fx.engine.controller().current_index(), 3);
        assert_eq!(displayed_time(&fx), Some(UnixMillis(T0 + 130 * MIN)));
        fx.engine.pause();
    }

    #[test]
    fn test_refresh_failure_keeps_timeline() {
        let mut fx = fixture(EngineConfig::default());
        fx.client.push_ok(noaa_metadata(&times(&[0, 10, 20])));
        initialize(&mut fx).unwrap();

        fx.client
            .push_err(RadarError::Upstream("Request failed (502)".to_string()));
        let err = refresh(&mut fx, true).unwrap_err();

        assert!(matches!(err, RadarError::Upstream(_)));
        assert_eq!(fx.engine.frames().len(), 3);
        assert_eq!(displayed_time(&fx), Some(UnixMillis(T0 + 20 * MIN)));
    }

    #[test]
    fn test_periodic_refresh_runs_until_destroyed() {
        let config = EngineConfig {
            refresh_interval_ms: 1000,
            ..Default::default()
        };
        let mut fx = fixture(config);
        fx.client.push_ok(noaa_metadata(&times(&[0, 10])));
        fx.client.push_ok(noaa_metadata(&times(&[10, 20])));
        initialize(&mut fx).unwrap();
        assert_eq!(fx.client.calls(), 1);

        fx.h.clock.advance_ms(1000.0);
        fx.h.run();
        assert_eq!(fx.client.calls(), 2);
        assert_eq!(displayed_time(&fx), Some(UnixMillis(T0 + 10 * MIN)));

        // The next one fails (nothing scripted) and is only logged.
        fx.h.clock.advance_ms(1000.0);
        fx.h.run();
        assert_eq!(fx.client.calls(), 3);
        assert_eq!(fx.engine.frames().len(), 2);

        fx.engine.destroy();
        fx.h.clock.advance_ms(5000.0);
        fx.h.run();
        assert_eq!(fx.client.calls(), 3);
        assert_eq!(fx.engine.frames().len(), 0);
        assert!(fx.factory.visible_templates().is_empty());
    }

    #[test]
    fn test_destroy_stops_playback() {
        let mut fx = fixture(EngineConfig::default());
        fx.client.push_ok(noaa_metadata(&times(&[0, 10, 20])));
        initialize(&mut fx).unwrap();
        fx.engine.play();
        fx.h.tick(16.0);

        fx.engine.destroy();
        fx.engine.destroy();
        assert!(!fx.engine.controller().is_playing());

        let before = fx.ticks.borrow().len();
        fx.h.run_for(2000.0, 20.0);
        assert_eq!(fx.ticks.borrow().len(), before);
        assert_eq!(fx.engine.frames().len(), 0);
    }

    #[test]
    fn test_weak_handle_reads_refreshed_timeline() {
        let mut h = Harness::new();
        let client = Rc::new(ScriptedClient::new());
        let handle: Rc<RefCell<WeakRadarEngine>> = Rc::default();
        let labels = Rc::new(RefCell::new(Vec::new()));

        let tick_handle = handle.clone();
        let sink = labels.clone();
        let callbacks = EngineCallbacks::new().on_tick(move |i| {
            if let Some(engine) = tick_handle.borrow().upgrade() {
                sink.borrow_mut().push(engine.frames().get(i).map(|f| f.time));
            }
        });
        let engine = RadarEngine::new(
            EngineConfig::default(),
            EngineHost {
                clock: h.clock(),
                spawner: h.spawner.clone(),
                client: client.clone(),
                layers: RecordingFactory::new(LoadMode::Immediate),
                store: None,
            },
            callbacks,
        );
        *handle.borrow_mut() = engine.downgrade();

        client.push_ok(noaa_metadata(&times(&[0, 10])));
        let e = engine.clone();
        h.spawn(async move { e.initialize(ProviderConfig::noaa()).await });
        client.push_ok(noaa_metadata(&times(&[20, 30, 40])));
        let e = engine.clone();
        h.spawn(async move { e.refresh(RefreshOptions::default()).await });

        assert_eq!(
            *labels.borrow(),
            vec![
                Some(UnixMillis(T0 + 10 * MIN)),
                Some(UnixMillis(T0 + 40 * MIN))
            ]
        );

        // The handle never keeps the engine alive.
        engine.destroy();
        drop(engine);
        h.run();
        assert!(handle.borrow().upgrade().is_none());
    }

    #[test]
    fn test_invalid_frame_rate_falls_back() {
        let config = EngineConfig {
            base_frames_per_second: 0.0,
            ..Default::default()
        };
        let fx = fixture(config);
        assert_eq!(fx.engine.config().base_frames_per_second, 1.6);
    }
}
