//! Hashrate metering

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window rate meter. Workers mark batches of attempts; `rate`
/// reports attempts per second over the last minute.
#[derive(Default)]
pub struct Meter {
    samples: Mutex<VecDeque<(Instant, u64)>>,
}

impl Meter {
    /// Create an empty meter
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `count` events at the current time
    pub fn mark(&self, count: u64) {
        let now = Instant::now();
        let mut samples = self.samples.lock();
        samples.push_back((now, count));
        while let Some((t, _)) = samples.front() {
            if now.duration_since(*t) > WINDOW {
                samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Events per second over the sliding window
    pub fn rate(&self) -> f64 {
        let now = Instant::now();
        let samples = self.samples.lock();
        let total: u64 = samples
            .iter()
            .filter(|(t, _)| now.duration_since(*t) <= WINDOW)
            .map(|(_, n)| n)
            .sum();
        total as f64 / WINDOW.as_secs_f64()
    }
}
