//! Playback controller: the display-tick loop plus play, pause, step and
//! seek.
//!
//! The loop accumulates elapsed time on every display refresh and advances
//! one frame each time a full frame interval has built up, carrying the
//! remainder forward. An advance is awaited inside the loop, so at most one
//! is ever in flight; `pause` cancels the loop synchronously.

use super::state::{PlaybackSpeed, PlaybackState};
use crate::events::{EngineCallbacks, StateChange};
use crate::layer::{AdvanceOptions, RadarLayerManager};
use crate::platform::{spawn_logged, Clock, Spawner};
use futures_channel::oneshot;
use futures_util::future::{self, Either};
use std::cell::RefCell;
use std::rc::Rc;

struct ControllerState {
    playback: PlaybackState,
    last_time_ms: f64,
    accumulator_ms: f64,
    in_flight: bool,
    /// Identifies the running loop; bumped on every `play`.
    loop_generation: u64,
    /// Dropping the sender stops the loop.
    cancel: Option<oneshot::Sender<()>>,
}

/// Clears the in-flight flag even if the advancing task is dropped.
struct InFlight(Rc<RefCell<ControllerState>>);

impl InFlight {
    fn begin(state: &Rc<RefCell<ControllerState>>) -> Self {
        state.borrow_mut().in_flight = true;
        Self(state.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.borrow_mut().in_flight = false;
    }
}

/// Drives frame advances for one radar view.
#[derive(Clone)]
pub struct PlaybackController {
    state: Rc<RefCell<ControllerState>>,
    manager: RadarLayerManager,
    clock: Rc<dyn Clock>,
    spawner: Spawner,
    callbacks: EngineCallbacks,
}

impl PlaybackController {
    pub fn new(
        manager: RadarLayerManager,
        clock: Rc<dyn Clock>,
        spawner: Spawner,
        base_frames_per_second: f32,
        callbacks: EngineCallbacks,
    ) -> Self {
        let mut playback = PlaybackState::new(base_frames_per_second);
        playback.current_index = manager.current_index();
        Self {
            state: Rc::new(RefCell::new(ControllerState {
                playback,
                last_time_ms: 0.0,
                accumulator_ms: 0.0,
                in_flight: false,
                loop_generation: 0,
                cancel: None,
            })),
            manager,
            clock,
            spawner,
            callbacks,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state.borrow().playback.playing
    }

    pub fn current_index(&self) -> usize {
        self.state.borrow().playback.current_index
    }

    pub fn speed(&self) -> f32 {
        self.state.borrow().playback.speed_multiplier
    }

    /// Whether a loop-issued advance has not resolved yet.
    pub fn is_advancing(&self) -> bool {
        self.state.borrow().in_flight
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.state.borrow().playback.clone()
    }

    pub fn frame_label(&self) -> String {
        let count = self.manager.frame_count();
        self.state.borrow().playback.frame_label(count)
    }

    /// Starts the playback loop. No-op when already playing or when fewer
    /// than two frames exist.
    pub fn play(&self) {
        let count = self.manager.frame_count();
        let (generation, cancel) = {
            let mut state = self.state.borrow_mut();
            if state.playback.playing || count < 2 {
                return;
            }
            state.playback.playing = true;
            state.last_time_ms = self.clock.now_ms();
            state.accumulator_ms = 0.0;
            state.loop_generation += 1;
            let (tx, rx) = oneshot::channel();
            state.cancel = Some(tx);
            (state.loop_generation, rx)
        };

        let controller = self.clone();
        if !spawn_logged(
            &self.spawner,
            "playback loop",
            controller.run_loop(generation, cancel),
        ) {
            let mut state = self.state.borrow_mut();
            state.playback.playing = false;
            state.cancel = None;
            return;
        }

        log::info!("Radar playback started at {}x", self.speed());
        self.callbacks.state_changed(StateChange {
            playing: Some(true),
            ..Default::default()
        });

        let manager = self.manager.clone();
        spawn_logged(&self.spawner, "radar warm-up", async move {
            manager.prefetch_all().await;
        });
    }

    /// Stops the loop. Idempotent; an advance already in flight settles
    /// but reports no tick.
    pub fn pause(&self) {
        let was_playing = {
            let mut state = self.state.borrow_mut();
            state.cancel = None;
            std::mem::replace(&mut state.playback.playing, false)
        };
        if was_playing {
            log::info!("Radar playback paused");
            self.callbacks.state_changed(StateChange {
                playing: Some(false),
                ..Default::default()
            });
        }
    }

    pub fn toggle(&self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Pauses, then moves `delta` frames (wrapping) with a crossfade.
    pub async fn step(&self, delta: i64) -> usize {
        self.pause();
        let count = self.manager.frame_count();
        if count == 0 {
            return 0;
        }
        let index = (self.current_index() as i64 + delta).rem_euclid(count as i64) as usize;
        self.set_index(index, true).await
    }

    /// Seeks to `index` (clamped). Does not change the playing state.
    pub async fn set_index(&self, index: usize, animate: bool) -> usize {
        let count = self.manager.frame_count();
        if count == 0 {
            return 0;
        }
        let index = index.min(count - 1);
        self.state.borrow_mut().playback.current_index = index;

        let current = self
            .manager
            .advance_to(index, AdvanceOptions { animate })
            .await;
        {
            let mut state = self.state.borrow_mut();
            // Only adopt the result if nothing else seeked meanwhile.
            if state.playback.current_index == index {
                state.playback.current_index = current;
            }
        }
        self.callbacks.tick(current);
        current
    }

    /// Seeks to the newest frame without animation.
    pub async fn latest(&self) -> usize {
        let count = self.manager.frame_count();
        if count == 0 {
            return 0;
        }
        self.set_index(count - 1, false).await
    }

    /// Sets the speed multiplier; applies from the next display tick.
    pub fn set_speed(&self, multiplier: f32) {
        if !multiplier.is_finite() || multiplier <= 0.0 {
            log::warn!("Ignoring invalid playback speed {}", multiplier);
            return;
        }
        self.state.borrow_mut().playback.speed_multiplier = multiplier;
        self.callbacks.state_changed(StateChange {
            speed: Some(multiplier),
            ..Default::default()
        });
    }

    pub fn set_speed_preset(&self, speed: PlaybackSpeed) {
        self.set_speed(speed.multiplier());
    }

    /// Adopts `index` without advancing (the view already shows it).
    pub fn sync_index(&self, index: usize) {
        self.state.borrow_mut().playback.current_index = index;
    }

    /// Restarts timing for a timeline that shares nothing with the
    /// previous one. Playing state and speed are kept.
    pub fn reset_timeline(&self, index: usize) {
        let now = self.clock.now_ms();
        let mut state = self.state.borrow_mut();
        state.playback.current_index = index;
        state.accumulator_ms = 0.0;
        state.last_time_ms = now;
    }

    fn is_current_loop(&self, generation: u64) -> bool {
        let state = self.state.borrow();
        state.playback.playing && state.loop_generation == generation
    }

    /// Adds the time since the last tick and returns the next index once a
    /// full frame interval has accumulated.
    fn accumulate(&self, now: f64) -> Option<usize> {
        let count = self.manager.frame_count();
        let mut state = self.state.borrow_mut();
        let delta = (now - state.last_time_ms).max(0.0);
        state.last_time_ms = now;
        state.accumulator_ms += delta;

        let frame_time = state.playback.frame_interval_ms();
        if count == 0 || state.in_flight || state.accumulator_ms < frame_time {
            return None;
        }
        state.accumulator_ms %= frame_time;
        Some((state.playback.current_index + 1) % count)
    }

    async fn run_loop(self, generation: u64, mut cancel: oneshot::Receiver<()>) {
        loop {
            let now = match future::select(self.clock.next_frame(), &mut cancel).await {
                Either::Left((now, _)) => now,
                Either::Right(_) => break,
            };
            if !self.is_current_loop(generation) {
                break;
            }
            let Some(next) = self.accumulate(now) else {
                continue;
            };

            let shown = {
                let _in_flight = InFlight::begin(&self.state);
                self.state.borrow_mut().playback.current_index = next;
                self.manager
                    .advance_to(next, AdvanceOptions::default())
                    .await
            };
            if self.is_current_loop(generation) {
                self.callbacks.tick(shown);
            }
        }
        log::debug!("Playback loop {} stopped", generation);
    }
}
