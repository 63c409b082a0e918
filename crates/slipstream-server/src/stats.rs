//! Connection and traffic accounting.
//!
//! Two layers: process-wide counters (`ServerStats`, lock-free atomics) and
//! per-stream counters (`StreamTraffic`, owned by each client entry and
//! mutated under the clients lock). Rates are derived once a minute by a
//! background task.

use std::{
    sync::atomic::{AtomicU32, AtomicU64, Ordering},
    time::{Duration, Instant},
};

/// Per-stream byte counters with once-a-minute rate snapshots.
#[derive(Debug, Default, Clone, Copy)]
pub struct StreamTraffic {
    /// Total bytes received on this stream.
    pub bytes_in: u64,
    /// `bytes_in` at the last minute boundary.
    pub bytes_in_last_minute: u64,
    /// Inbound bytes/second over the last minute.
    pub rate_in: f64,
    /// Total bytes sent on this stream.
    pub bytes_out: u64,
    /// `bytes_out` at the last minute boundary.
    pub bytes_out_last_minute: u64,
    /// Outbound bytes/second over the last minute.
    pub rate_out: f64,
    /// Frames discarded because the destination queue was full.
    pub dropped_frames: u64,
}

impl StreamTraffic {
    /// Roll the minute window: derive rates and move the totals into the
    /// last-minute snapshots.
    pub fn update_minute(&mut self) {
        self.rate_in = (self.bytes_in - self.bytes_in_last_minute) as f64 / 60.0;
        self.bytes_in_last_minute = self.bytes_in;
        self.rate_out = (self.bytes_out - self.bytes_out_last_minute) as f64 / 60.0;
        self.bytes_out_last_minute = self.bytes_out;
    }
}

/// Process-wide counters, safe to bump from any task.
#[derive(Debug)]
pub struct ServerStats {
    conn_count: AtomicU32,
    conn_crash: AtomicU32,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    dropped_frames: AtomicU64,
    started: Instant,
}

impl ServerStats {
    /// Fresh counters; uptime starts now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            conn_count: AtomicU32::new(0),
            conn_crash: AtomicU32::new(0),
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
            dropped_frames: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Count one completed disconnect. Every disconnect bumps the total
    /// exactly once regardless of cause.
    pub fn record_disconnect(&self, crashed: bool) {
        self.conn_count.fetch_add(1, Ordering::Relaxed);
        if crashed {
            self.conn_crash.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Add inbound bytes to the process total.
    pub fn add_in(&self, bytes: u64) {
        self.bytes_in.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Add outbound bytes to the process total.
    pub fn add_out(&self, bytes: u64) {
        self.bytes_out.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Count one frame discarded at a full destination queue.
    pub fn add_drop(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Completed disconnects since startup.
    #[must_use]
    pub fn conn_count(&self) -> u32 {
        self.conn_count.load(Ordering::Relaxed)
    }

    /// Disconnects that were crashes.
    #[must_use]
    pub fn conn_crash(&self) -> u32 {
        self.conn_crash.load(Ordering::Relaxed)
    }

    /// Total inbound bytes.
    #[must_use]
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in.load(Ordering::Relaxed)
    }

    /// Total outbound bytes.
    #[must_use]
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out.load(Ordering::Relaxed)
    }

    /// Total frames dropped at full queues.
    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Time since startup.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}
