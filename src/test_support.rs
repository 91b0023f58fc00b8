//! Shared fakes for engine tests: a recording layer factory, a scripted
//! metadata client and a virtual-time executor harness.

use crate::error::RadarError;
use crate::frames::{Frame, FrameSet, MetadataClient, Provider, UnixMillis};
use crate::layer::{DrawableLayer, LayerFactory, LayerSignals};
use crate::platform::{Clock, ManualClock, Spawner};
use futures_executor::LocalPool;
use futures_util::future::{self, FutureExt, LocalBoxFuture};
use futures_util::task::LocalSpawnExt;
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::rc::Rc;

/// Wall-clock origin used across tests (2023-11-14 22:13:20 UTC).
pub(crate) const T0: i64 = 1_700_000_000_000;

pub(crate) struct RecordingLayer {
    pub template: String,
    opacity: Cell<f32>,
    in_view: Cell<bool>,
    removals: Cell<usize>,
    opacity_history: RefCell<Vec<f32>>,
}

impl RecordingLayer {
    pub fn opacity(&self) -> f32 {
        self.opacity.get()
    }

    pub fn removals(&self) -> usize {
        self.removals.get()
    }

    pub fn opacity_history(&self) -> Vec<f32> {
        self.opacity_history.borrow().clone()
    }
}

impl DrawableLayer for RecordingLayer {
    fn set_opacity(&self, opacity: f32) {
        self.opacity.set(opacity);
        self.opacity_history.borrow_mut().push(opacity);
    }

    fn add_to_view(&self) {
        self.in_view.set(true);
    }

    fn remove_from_view(&self) {
        if self.in_view.replace(false) {
            self.removals.set(self.removals.get() + 1);
        }
    }

    fn in_view(&self) -> bool {
        self.in_view.get()
    }
}

/// How layers created by [`RecordingFactory`] behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadMode {
    /// Signal ready during creation.
    Immediate,
    /// Stay loading until the test signals.
    Manual,
    /// Report enough tile errors to fail during creation.
    FailTiles,
}

pub(crate) struct RecordingFactory {
    mode: Cell<LoadMode>,
    threshold: u32,
    created: RefCell<Vec<(Rc<RecordingLayer>, LayerSignals)>>,
}

impl RecordingFactory {
    pub fn new(mode: LoadMode) -> Rc<Self> {
        Rc::new(Self {
            mode: Cell::new(mode),
            threshold: 3,
            created: RefCell::new(Vec::new()),
        })
    }

    pub fn set_mode(&self, mode: LoadMode) {
        self.mode.set(mode);
    }

    pub fn created_count(&self) -> usize {
        self.created.borrow().len()
    }

    pub fn layer(&self, n: usize) -> Rc<RecordingLayer> {
        self.created.borrow()[n].0.clone()
    }

    pub fn signals(&self, n: usize) -> LayerSignals {
        self.created.borrow()[n].1.clone()
    }

    /// Most recently created layer for `template`.
    pub fn latest_for(&self, template: &str) -> Option<Rc<RecordingLayer>> {
        self.created
            .borrow()
            .iter()
            .rev()
            .find(|(layer, _)| layer.template == template)
            .map(|(layer, _)| layer.clone())
    }

    /// Templates of every layer currently in view.
    pub fn visible_templates(&self) -> Vec<String> {
        self.created
            .borrow()
            .iter()
            .filter(|(layer, _)| layer.in_view())
            .map(|(layer, _)| layer.template.clone())
            .collect()
    }
}

impl LayerFactory for RecordingFactory {
    fn create_layer(
        &self,
        tile_url_template: &str,
        signals: LayerSignals,
    ) -> Rc<dyn DrawableLayer> {
        let layer = Rc::new(RecordingLayer {
            template: tile_url_template.to_string(),
            opacity: Cell::new(1.0),
            in_view: Cell::new(false),
            removals: Cell::new(0),
            opacity_history: RefCell::new(Vec::new()),
        });
        match self.mode.get() {
            LoadMode::Immediate => signals.ready(),
            LoadMode::FailTiles => {
                for _ in 0..self.threshold {
                    signals.tile_error();
                }
            }
            LoadMode::Manual => {}
        }
        self.created.borrow_mut().push((layer.clone(), signals));
        layer
    }
}

/// Metadata client answering from a queue of canned responses.
pub(crate) struct ScriptedClient {
    responses: RefCell<VecDeque<Result<Value, RadarError>>>,
    calls: Cell<usize>,
    urls: RefCell<Vec<String>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            responses: RefCell::new(VecDeque::new()),
            calls: Cell::new(0),
            urls: RefCell::new(Vec::new()),
        }
    }

    pub fn push_ok(&self, value: Value) {
        self.responses.borrow_mut().push_back(Ok(value));
    }

    pub fn push_err(&self, err: RadarError) {
        self.responses.borrow_mut().push_back(Err(err));
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.borrow().clone()
    }
}

impl MetadataClient for ScriptedClient {
    fn fetch_json<'a>(&'a self, url: &'a str) -> LocalBoxFuture<'a, Result<Value, RadarError>> {
        self.calls.set(self.calls.get() + 1);
        self.urls.borrow_mut().push(url.to_string());
        let next = self
            .responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(RadarError::Upstream("no scripted response".to_string())));
        future::ready(next).boxed_local()
    }
}

/// NOAA time-stop document for the given millisecond instants.
pub(crate) fn noaa_metadata(times: &[i64]) -> Value {
    json!({"layers": [{"timeStops": times}]})
}

/// Template used by [`frame_set`] for the frame at `time`.
pub(crate) fn template_for(time: i64) -> String {
    format!("tile/{}", time)
}

pub(crate) fn frame_set(times: &[i64]) -> FrameSet {
    let frames = times
        .iter()
        .map(|&t| Frame::new(UnixMillis(t), Provider::Noaa, template_for(t)))
        .collect();
    FrameSet::from_frames(frames, usize::MAX)
}

/// Single-threaded executor on virtual time.
pub(crate) struct Harness {
    pub pool: LocalPool,
    pub clock: ManualClock,
    pub spawner: Spawner,
}

impl Harness {
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let spawner: Spawner = Rc::new(pool.spawner());
        Self {
            pool,
            clock: ManualClock::new(UnixMillis(T0)),
            spawner,
        }
    }

    pub fn clock(&self) -> Rc<dyn Clock> {
        Rc::new(self.clock.clone())
    }

    /// Polls every task until none can make progress.
    pub fn run(&mut self) {
        self.pool.run_until_stalled();
    }

    /// Advances time by `ms`, fires one display refresh and settles.
    pub fn tick(&mut self, ms: f64) {
        self.clock.advance_ms(ms);
        self.clock.fire_frame();
        self.run();
    }

    /// Ticks in `step_ms` increments until `total_ms` has elapsed.
    pub fn run_for(&mut self, total_ms: f64, step_ms: f64) {
        let steps = (total_ms / step_ms).round() as usize;
        for _ in 0..steps {
            self.tick(step_ms);
        }
    }

    /// Spawns `fut` and returns a slot that holds its output once done.
    pub fn spawn<T: 'static>(
        &mut self,
        fut: impl Future<Output = T> + 'static,
    ) -> Rc<RefCell<Option<T>>> {
        let slot = Rc::new(RefCell::new(None));
        let out = slot.clone();
        self.spawner
            .spawn_local(async move {
                let value = fut.await;
                *out.borrow_mut() = Some(value);
            })
            .expect("spawn test task");
        self.run();
        slot
    }
}
