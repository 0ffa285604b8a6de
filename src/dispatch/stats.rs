//! Dispatch counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct DispatchStats {
    received: AtomicU64,
    completed: AtomicU64,
    rejected: AtomicU64,
    callback_errors: AtomicU64,
    panics: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStatsSnapshot {
    /// Every call that reached the dispatcher
    pub received: u64,
    /// Callbacks that returned a status
    pub completed: u64,
    /// Calls refused before any callback ran
    pub rejected: u64,
    pub callback_errors: u64,
    pub panics: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            callback_errors: self.callback_errors.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_callback_error(&self) {
        self.callback_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_panic(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
    }
}

/// Logs callback duration on drop
#[must_use]
pub(crate) struct CallbackTimer<'a> {
    path: &'a str,
    start: Instant,
    slow: Duration,
    track: bool,
}

impl<'a> CallbackTimer<'a> {
    pub(crate) fn start(path: &'a str, slow: Duration, track: bool) -> Self {
        Self {
            path,
            start: Instant::now(),
            slow,
            track,
        }
    }
}

impl Drop for CallbackTimer<'_> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        if elapsed > self.slow {
            warn!(
                event = "slow_callback",
                path = %self.path,
                duration_us = elapsed.as_micros() as u64,
                threshold_ms = self.slow.as_millis() as u64,
                "Control callback exceeded threshold"
            );
        } else if self.track {
            debug!(
                event = "callback_timing",
                path = %self.path,
                duration_us = elapsed.as_micros() as u64
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let stats = DispatchStats::default();
        stats.record_received();
        stats.record_received();
        stats.record_completed();
        stats.record_rejected();

        let snap = stats.snapshot();
        assert_eq!(snap.received, 2);
        assert_eq!(snap.completed, 1);
        assert_eq!(snap.rejected, 1);
        assert_eq!(snap.panics, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(DispatchStatsSnapshot::default()).unwrap();
        assert_eq!(json["received"], 0);
        assert_eq!(json["callback_errors"], 0);
    }
}
