//! Tick sources for the control loop.
//!
//! A [`Clock`] hands out a fresh, lazy sequence of UTC timestamps on every
//! call to [`Clock::ticks`]. Replay and wall-clock time share the trait so the
//! controller never knows which one is driving it.

use crate::shutdown::StopHandle;
use chrono::{DateTime, Duration, Utc};
use std::thread;
use std::time::{Duration as StdDuration, Instant};
use thiserror::Error;

/// Upper bound on a single sleep while waiting for the next real-time tick.
const SLEEP_SLICE: StdDuration = StdDuration::from_millis(250);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClockError {
    #[error("clock interval must be positive, got {millis}ms")]
    InvalidInterval { millis: i64 },

    #[error("clock stop {stop} must be after start {start}")]
    InvalidBounds {
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    },
}

pub type Ticks<'a> = Box<dyn Iterator<Item = DateTime<Utc>> + Send + 'a>;

pub trait Clock: Send {
    /// A new tick sequence. Every call starts from the beginning.
    fn ticks(&self) -> Ticks<'_>;
}

/// Replays `[start, stop)` in fixed steps without sleeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedClock {
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
    interval: Duration,
}

impl SimulatedClock {
    pub fn new(
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
        interval: Duration,
    ) -> Result<Self, ClockError> {
        if interval <= Duration::zero() {
            return Err(ClockError::InvalidInterval {
                millis: interval.num_milliseconds(),
            });
        }
        if stop <= start {
            return Err(ClockError::InvalidBounds { start, stop });
        }
        Ok(Self {
            start,
            stop,
            interval,
        })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn stop(&self) -> DateTime<Utc> {
        self.stop
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of ticks one full iteration yields: `ceil((stop - start) / interval)`.
    pub fn len(&self) -> usize {
        let span = nanos(self.stop - self.start);
        let step = nanos(self.interval).max(1);
        let count = span / step + i64::from(span % step != 0);
        usize::try_from(count).unwrap_or(usize::MAX)
    }

    /// Always false: construction rejects empty ranges.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn nanos(duration: Duration) -> i64 {
    duration.num_nanoseconds().unwrap_or(i64::MAX)
}

impl Clock for SimulatedClock {
    fn ticks(&self) -> Ticks<'_> {
        Box::new(SimulatedTicks {
            next: Some(self.start),
            stop: self.stop,
            interval: self.interval,
        })
    }
}

struct SimulatedTicks {
    next: Option<DateTime<Utc>>,
    stop: DateTime<Utc>,
    interval: Duration,
}

impl Iterator for SimulatedTicks {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.filter(|t| *t < self.stop)?;
        self.next = current.checked_add_signed(self.interval);
        Some(current)
    }
}

/// Wall-clock ticks: one immediately, then one per interval.
///
/// Unbounded unless a stop handle is attached with [`RealTimeClock::cancel_on`].
#[derive(Debug, Clone)]
pub struct RealTimeClock {
    interval: StdDuration,
    stop: Option<StopHandle>,
}

impl RealTimeClock {
    pub fn new(interval: StdDuration) -> Self {
        Self {
            interval,
            stop: None,
        }
    }

    /// End the sequence as soon as `handle` is signalled, even mid-sleep.
    pub fn cancel_on(mut self, handle: StopHandle) -> Self {
        self.stop = Some(handle);
        self
    }

    pub fn interval(&self) -> StdDuration {
        self.interval
    }
}

impl Clock for RealTimeClock {
    fn ticks(&self) -> Ticks<'_> {
        Box::new(RealTimeTicks {
            interval: self.interval,
            stop: self.stop.clone(),
            first: true,
        })
    }
}

struct RealTimeTicks {
    interval: StdDuration,
    stop: Option<StopHandle>,
    first: bool,
}

impl RealTimeTicks {
    fn cancelled(&self) -> bool {
        self.stop.as_ref().is_some_and(StopHandle::is_stop_requested)
    }

    /// Sleep one interval in slices. Returns false if cancelled meanwhile.
    fn wait(&self) -> bool {
        let deadline = Instant::now() + self.interval;
        loop {
            if self.cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

impl Iterator for RealTimeTicks {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.first {
            self.first = false;
        } else if !self.wait() {
            return None;
        }
        if self.cancelled() {
            return None;
        }
        Some(Utc::now())
    }
}
