//! Process-wide request counters.
//!
//! Each counter is an independent atomic. A snapshot reads them one by one,
//! so it is not a consistent cut across all three; consumers use it for
//! approximate rates.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct RequestCounters {
    total: AtomicU64,
    success: AtomicU64,
    error: AtomicU64,
}

/// Point-in-time read of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub total: u64,
    pub success: u64,
    pub errors: u64,
}

impl CounterSnapshot {
    /// Share of successful requests, in percent.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.success as f64 / self.total as f64 * 100.0
    }
}

impl RequestCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an inbound proxied request. Returns the new total.
    pub fn record_request(&self) -> u64 {
        self.total.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Count a request the backend answered. Returns the new success count.
    pub fn record_success(&self) -> u64 {
        self.success.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Count a request that failed before a backend answered. Returns the
    /// new error count.
    pub fn record_error(&self) -> u64 {
        self.error.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            total: self.total.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            errors: self.error.load(Ordering::Relaxed),
        }
    }
}
