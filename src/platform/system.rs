//! Real-time clock for native hosts.
//!
//! Sleeps are serviced by one background timer thread; completion is
//! signalled back over `futures_channel::oneshot` so the waiting task runs
//! on whatever local executor polls it.

use super::Clock;
use crate::frames::UnixMillis;
use futures_channel::oneshot;
use futures_util::future::{FutureExt, LocalBoxFuture};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::time::Duration;
use web_time::Instant;

/// Display refresh interval used when no real display drives the ticks.
const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

struct TimerRequest {
    deadline: Instant,
    seq: u64,
    done: oneshot::Sender<()>,
}

impl PartialEq for TimerRequest {
    fn eq(&self, other: &Self) -> bool {
        (self.deadline, self.seq) == (other.deadline, other.seq)
    }
}

impl Eq for TimerRequest {}

impl PartialOrd for TimerRequest {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerRequest {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

/// Clock backed by `web_time::Instant` and a timer thread.
#[derive(Clone)]
pub struct SystemClock {
    origin: Instant,
    frame_interval: Duration,
    timer: Sender<TimerRequest>,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self::with_frame_interval(DEFAULT_FRAME_INTERVAL)
    }

    /// Creates a clock whose display ticks fire every `frame_interval`.
    pub fn with_frame_interval(frame_interval: Duration) -> Self {
        let (timer, requests) = channel::<TimerRequest>();

        std::thread::spawn(move || {
            let mut pending: BinaryHeap<Reverse<TimerRequest>> = BinaryHeap::new();
            loop {
                let now = Instant::now();
                while pending
                    .peek()
                    .is_some_and(|Reverse(next)| next.deadline <= now)
                {
                    if let Some(Reverse(due)) = pending.pop() {
                        let _ = due.done.send(());
                    }
                }

                let received = match pending.peek() {
                    Some(Reverse(next)) => {
                        requests.recv_timeout(next.deadline.saturating_duration_since(now))
                    }
                    None => requests
                        .recv()
                        .map_err(|_| RecvTimeoutError::Disconnected),
                };

                match received {
                    Ok(request) => pending.push(Reverse(request)),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        if pending.is_empty() {
                            break;
                        }
                        if let Some(Reverse(next)) = pending.peek() {
                            std::thread::sleep(next.deadline.saturating_duration_since(now));
                        }
                    }
                }
            }
            log::debug!("Timer thread exiting");
        });

        Self {
            origin: Instant::now(),
            frame_interval,
            timer,
        }
    }

    fn schedule(&self, duration: Duration) -> oneshot::Receiver<()> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static SEQ: AtomicU64 = AtomicU64::new(0);

        let (done, rx) = oneshot::channel();
        let request = TimerRequest {
            deadline: Instant::now() + duration,
            seq: SEQ.fetch_add(1, Ordering::Relaxed),
            done,
        };
        if self.timer.send(request).is_err() {
            log::warn!("Timer thread is gone; sleep resolves immediately");
        }
        rx
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn wall_clock(&self) -> UnixMillis {
        UnixMillis::now()
    }

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        let rx = self.schedule(duration);
        async move {
            let _ = rx.await;
        }
        .boxed_local()
    }

    fn next_frame(&self) -> LocalBoxFuture<'static, f64> {
        let rx = self.schedule(self.frame_interval);
        let origin = self.origin;
        async move {
            let _ = rx.await;
            origin.elapsed().as_secs_f64() * 1000.0
        }
        .boxed_local()
    }
}
