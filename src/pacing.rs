use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_PAUSE_SECS: u64 = 5;

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Shared stop signal for a download run: an explicit flag plus an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// A limit too large to represent as an instant leaves the run unbounded.
    pub fn with_time_limit(limit: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(limit),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Delay applied between consecutive upstream requests.
pub trait Pacer {
    fn pause(&self, control: &RunControl);
}

/// Blocks for a fixed interval, waking early if the run is cancelled.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    interval: Duration,
}

impl FixedDelay {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_PAUSE_SECS))
    }
}

impl Pacer for FixedDelay {
    fn pause(&self, control: &RunControl) {
        let until = Instant::now().checked_add(self.interval);
        loop {
            if control.is_cancelled() {
                return;
            }
            let remaining = match until {
                Some(until) => until.saturating_duration_since(Instant::now()),
                None => SLEEP_SLICE,
            };
            if remaining.is_zero() {
                return;
            }
            thread::sleep(SLEEP_SLICE.min(remaining));
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoPause;

impl Pacer for NoPause {
    fn pause(&self, _control: &RunControl) {}
}
