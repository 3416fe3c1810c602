//! Wall-clock sources for elapsed-time computations

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current Unix time in fractional seconds.
    fn unix_seconds(&self) -> f64 {
        self.now().timestamp_micros() as f64 / 1_000_000.0
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock anchored to tokio's `Instant`, so it follows paused and advanced
/// runtime time.
#[derive(Debug, Clone)]
pub struct TokioClock {
    anchor_time: DateTime<Utc>,
    anchor: tokio::time::Instant,
}

impl TokioClock {
    pub fn starting_at(anchor_time: DateTime<Utc>) -> Self {
        Self {
            anchor_time,
            anchor: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.anchor.elapsed()).unwrap_or_default();
        self.anchor_time + elapsed
    }
}
