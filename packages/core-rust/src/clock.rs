//! Abstraction over the system clock for dependency injection.
//!
//! All freshness decisions read time through [`ClockSource`] so that tests
//! can drive a [`VirtualClock`] without sleeping. Time is carried as
//! milliseconds since the Unix epoch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of current time in epoch milliseconds.
///
/// The default implementation ([`SystemClock`]) delegates to
/// `std::time::SystemTime`; deterministic tests inject a [`VirtualClock`].
pub trait ClockSource: Send + Sync {
    /// Returns the current time as milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

/// Default clock source that reads the real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    #[allow(clippy::cast_possible_truncation)]
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Manually driven clock for tests and virtual stores.
///
/// Starts at an arbitrary instant and only moves when told to.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now_ms: AtomicU64,
}

impl VirtualClock {
    /// Creates a virtual clock positioned at `start_ms`.
    #[must_use]
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    /// Advances the clock by `delta`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn advance(&self, delta: Duration) {
        self.now_ms
            .fetch_add(delta.as_millis() as u64, Ordering::SeqCst);
    }

    /// Moves the clock to an absolute instant.
    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl ClockSource for VirtualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
