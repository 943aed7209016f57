//! Per-client admission control over fixed one-minute windows.
//!
//! Each client owns a `(window_id, count)` record where `window_id = unix_seconds / 60`. A
//! request in a new window resets the record; a request in the current window is admitted while
//! `count` is below the quota. Windows are fixed, so a client may spend a full quota at the end
//! of one window and another full quota at the start of the next.
//!
//! Records live in a sharded concurrent map. The check-and-increment for a key runs while its
//! shard is write-locked, so two simultaneous requests from one client can never both take the
//! last slot, and clients hashed to different shards never contend.
//!
//! The client cap is soft: at most one sweep of past-window records runs per window, so a burst
//! of distinct clients within one window can grow the map past the cap until the next window.

use dashmap::{DashMap, mapref::entry::Entry};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;

/// Length of a rate-limit window.
pub const WINDOW_SECONDS: u64 = 60;

/// Default number of requests admitted per client per window.
pub const MAX_PER_MINUTE: u32 = 30;

/// Source of the current Unix time.
pub trait Clock: Send + Sync {
    /// Seconds elapsed since the Unix epoch.
    fn unix_seconds(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_seconds(&self) -> u64 {
        OffsetDateTime::now_utc().unix_timestamp().max(0) as u64
    }
}

/// Clock driven by the caller; useful for replaying window boundaries.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Start the clock at `unix_seconds`.
    pub fn new(unix_seconds: u64) -> Self {
        Self {
            now: AtomicU64::new(unix_seconds),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, unix_seconds: u64) {
        self.now.store(unix_seconds, Ordering::SeqCst);
    }

    /// Move the clock forward.
    pub fn advance(&self, seconds: u64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn unix_seconds(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Request count recorded for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    /// Window the count belongs to.
    pub window_id: u64,
    /// Requests admitted in that window.
    pub count: u32,
}

/// Fixed-window rate limiter keyed by client identifier.
pub struct RateLimiter {
    max_per_window: u32,
    max_clients: usize,
    records: DashMap<String, RateLimitRecord>,
    clock: Arc<dyn Clock>,
    last_sweep: AtomicU64,
    sweeps: AtomicU64,
}

const NEVER_SWEPT: u64 = u64::MAX;

impl RateLimiter {
    /// Build a limiter admitting `max_per_window` requests per client per minute.
    ///
    /// Once `max_clients` records are tracked, records from past windows are swept, at most once
    /// per window.
    pub fn new(max_per_window: u32, max_clients: usize) -> Self {
        Self::with_clock(max_per_window, max_clients, Arc::new(SystemClock))
    }

    /// Build a limiter reading time from `clock`.
    pub fn with_clock(max_per_window: u32, max_clients: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_per_window,
            max_clients: max_clients.max(1),
            records: DashMap::new(),
            clock,
            last_sweep: AtomicU64::new(NEVER_SWEPT),
            sweeps: AtomicU64::new(0),
        }
    }

    /// Admit or reject one request from `client_id`, updating its counter.
    pub fn allow(&self, client_id: &str) -> bool {
        let window_id = self.clock.unix_seconds() / WINDOW_SECONDS;
        if self.records.len() >= self.max_clients {
            self.sweep_once(window_id);
        }

        match self.records.entry(client_id.to_owned()) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                if record.window_id != window_id {
                    *record = RateLimitRecord {
                        window_id,
                        count: 1,
                    };
                    true
                } else if record.count < self.max_per_window {
                    record.count += 1;
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(RateLimitRecord {
                    window_id,
                    count: 1,
                });
                true
            }
        }
    }

    /// Current record for `client_id`, if one is tracked.
    pub fn record(&self, client_id: &str) -> Option<RateLimitRecord> {
        self.records.get(client_id).map(|record| *record)
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.records.len()
    }

    /// Number of sweeps run since construction.
    pub fn sweep_count(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    /// Sweep unless another caller already swept during `window_id`.
    fn sweep_once(&self, window_id: u64) {
        let previous = self.last_sweep.load(Ordering::Acquire);
        if previous == window_id {
            return;
        }
        if self
            .last_sweep
            .compare_exchange(previous, window_id, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.sweep(window_id);
        }
    }

    /// Drop records whose window has passed; they would be reset on next use anyway.
    fn sweep(&self, window_id: u64) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        let before = self.records.len();
        self.records.retain(|_, record| record.window_id == window_id);
        tracing::debug!(
            before,
            after = self.records.len(),
            "Swept stale rate-limit records"
        );
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(MAX_PER_MINUTE, 10_000)
    }
}
