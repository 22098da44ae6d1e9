//! # Fibonacci Backoff
//!
//! Progressive retry delays that grow more slowly than exponential backoff.
//! Each machine gets its own sequence so one failing instance does not slow
//! down the rest of the fleet.
//!
//! Default sequence: 30s, 30s, 60s, 90s, 150s, 240s, 300s (max).

use crate::reconciler::MachineKey;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Shortest retry delay in seconds
pub const MIN_BACKOFF_SECONDS: u64 = 30;
/// Longest retry delay in seconds
pub const MAX_BACKOFF_SECONDS: u64 = 300;

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, capped at the maximum.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    prev_seconds: u64,
    current_seconds: u64,
    max_seconds: u64,
}

impl FibonacciBackoff {
    #[must_use]
    pub fn new(min_seconds: u64, max_seconds: u64) -> Self {
        Self {
            prev_seconds: 0,
            current_seconds: min_seconds,
            max_seconds,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current_seconds;

        let next = self.prev_seconds + self.current_seconds;
        self.prev_seconds = self.current_seconds;
        self.current_seconds = std::cmp::min(next, self.max_seconds);

        Duration::from_secs(result)
    }
}

impl Default for FibonacciBackoff {
    fn default() -> Self {
        Self::new(MIN_BACKOFF_SECONDS, MAX_BACKOFF_SECONDS)
    }
}

/// Per-machine backoff state shared between reconcile and error policy
#[derive(Debug, Default)]
pub struct BackoffTracker {
    entries: Mutex<HashMap<MachineKey, FibonacciBackoff>>,
}

impl BackoffTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next retry delay for `key`
    pub fn next_delay(&self, key: &MachineKey) -> Duration {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.entry(key.clone()).or_default().next_backoff()
    }

    /// Forget the sequence for `key` after a completed reconcile
    pub fn reset(&self, key: &MachineKey) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
    }
}
