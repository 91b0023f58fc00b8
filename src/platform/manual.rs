//! Virtual clock for deterministic simulation.
//!
//! Time only moves when the owner calls [`ManualClock::advance`], and display
//! ticks only fire on [`ManualClock::fire_frame`]. Paired with a
//! `futures_executor::LocalPool`, this lets a host (or a test) replay an
//! exact sequence of display refreshes.

use super::Clock;
use crate::frames::UnixMillis;
use futures_channel::oneshot;
use futures_util::future::{FutureExt, LocalBoxFuture};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

struct ManualState {
    now_ms: f64,
    wall_origin: UnixMillis,
    sleepers: Vec<(f64, oneshot::Sender<()>)>,
    frame_waiters: Vec<oneshot::Sender<f64>>,
}

/// Clock whose time is advanced explicitly.
#[derive(Clone)]
pub struct ManualClock {
    state: Rc<RefCell<ManualState>>,
}

impl ManualClock {
    /// Creates a clock at monotonic time zero whose wall clock reads
    /// `wall_origin`.
    pub fn new(wall_origin: UnixMillis) -> Self {
        Self {
            state: Rc::new(RefCell::new(ManualState {
                now_ms: 0.0,
                wall_origin,
                sleepers: Vec::new(),
                frame_waiters: Vec::new(),
            })),
        }
    }

    /// Moves time forward and wakes every sleeper whose deadline passed.
    pub fn advance(&self, duration: Duration) {
        self.advance_ms(duration.as_secs_f64() * 1000.0);
    }

    /// Millisecond form of [`advance`](Self::advance).
    pub fn advance_ms(&self, ms: f64) {
        let due = {
            let mut state = self.state.borrow_mut();
            state.now_ms += ms;
            let now = state.now_ms;
            let (due, pending): (Vec<_>, Vec<_>) = state
                .sleepers
                .drain(..)
                .partition(|(deadline, _)| *deadline <= now);
            state.sleepers = pending;
            due
        };
        for (_, tx) in due {
            let _ = tx.send(());
        }
    }

    /// Fires one display refresh, resolving every pending
    /// [`next_frame`](Clock::next_frame) with the current time.
    ///
    /// Returns the number of waiters woken.
    pub fn fire_frame(&self) -> usize {
        let (now, waiters) = {
            let mut state = self.state.borrow_mut();
            (state.now_ms, std::mem::take(&mut state.frame_waiters))
        };
        let count = waiters.len();
        for tx in waiters {
            let _ = tx.send(now);
        }
        count
    }

    /// Number of outstanding sleeps.
    pub fn pending_sleepers(&self) -> usize {
        self.state.borrow().sleepers.len()
    }

    /// Number of tasks waiting for a display refresh.
    pub fn pending_frame_waiters(&self) -> usize {
        self.state.borrow().frame_waiters.len()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.state.borrow().now_ms
    }

    fn wall_clock(&self) -> UnixMillis {
        let state = self.state.borrow();
        UnixMillis(state.wall_origin.0 + state.now_ms as i64)
    }

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state.borrow_mut();
            let deadline = state.now_ms + duration.as_secs_f64() * 1000.0;
            state.sleepers.push((deadline, tx));
        }
        async move {
            let _ = rx.await;
        }
        .boxed_local()
    }

    fn next_frame(&self) -> LocalBoxFuture<'static, f64> {
        let (tx, rx) = oneshot::channel();
        let fallback = {
            let mut state = self.state.borrow_mut();
            state.frame_waiters.push(tx);
            state.now_ms
        };
        async move { rx.await.unwrap_or(fallback) }.boxed_local()
    }
}
