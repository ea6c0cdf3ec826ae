// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source of time for the engine.
///
/// Production code uses [`SystemClock`]; tests use [`FakeClock`] to drive
/// scheduling deterministically.
pub trait Clock: Send + Sync {
    /// Monotonic instant, for durations and deadlines.
    fn now(&self) -> Instant;

    /// Wall-clock time as epoch seconds (fractional).
    fn epoch(&self) -> f64;

    /// Wall-clock time as epoch milliseconds.
    fn epoch_ms(&self) -> u64 {
        (self.epoch() * 1000.0) as u64
    }
}

/// Real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }
}

/// Manually advanced clock for tests.
#[derive(Debug, Clone)]
pub struct FakeClock {
    start: Instant,
    offset: Arc<Mutex<Duration>>,
    epoch_base: f64,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
            epoch_base: 1_700_000_000.0,
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, d: Duration) {
        *self.offset.lock() += d;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock()
    }

    fn epoch(&self) -> f64 {
        self.epoch_base + self.offset.lock().as_secs_f64()
    }
}
