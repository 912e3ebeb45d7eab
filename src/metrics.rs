use std::cell::Cell;
use std::fmt;
use std::sync::atomic::AtomicU64;

use crate::counter::Counter;

/// Traffic counters.
///
/// Window counters (`packets`, `bytes`, `errors`, `truncated`) cover the time since the last
/// report and are cleared by `take_window` or `reset_window`. The `total_*` counters only ever grow.
#[derive(Debug, Default)]
pub struct Metrics<C: Counter> {
    packets: C,
    bytes: C,
    total_packets: C,
    total_bytes: C,
    truncated: C,
    errors: C,
}

/// Counters owned by a single thread.
pub type LocalMetrics = Metrics<Cell<u64>>;

/// Counters updated by several ring workers and read by the reporting thread.
pub type SharedMetrics = Metrics<AtomicU64>;

impl<C: Counter> Metrics<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one received packet carrying `len` payload bytes.
    #[inline]
    pub fn add_packet(&self, len: usize, truncated: bool) {
        let len = len as u64;
        self.packets.add(1);
        self.total_packets.add(1);
        self.bytes.add(len);
        self.total_bytes.add(len);
        if truncated {
            self.truncated.add(1);
        }
    }

    #[inline]
    pub fn add_error(&self) {
        self.errors.add(1);
    }

    /// Adds every counter of `other` into `self`.
    ///
    /// With atomic counters this is safe to call from several threads at once.
    pub fn merge<D: Counter>(&self, other: &Metrics<D>) {
        self.packets.add(other.packets.load());
        self.bytes.add(other.bytes.load());
        self.total_packets.add(other.total_packets.load());
        self.total_bytes.add(other.total_bytes.load());
        self.truncated.add(other.truncated.load());
        self.errors.add(other.errors.load());
    }

    /// Clears the window counters, leaving the totals untouched.
    pub fn reset_window(&self) {
        self.packets.reset();
        self.bytes.reset();
        self.errors.reset();
        self.truncated.reset();
    }

    /// Ends the current window: returns its counts and starts a new one.
    ///
    /// Each window counter is read and zeroed in one step, so counts merged concurrently land in
    /// either this window or the next, never in neither.
    pub fn take_window(&self, elapsed: f64) -> Report {
        Report {
            packets: self.packets.take(),
            bytes: self.bytes.take(),
            errors: self.errors.take(),
            truncated: self.truncated.take(),
            total_packets: self.total_packets.load(),
            total_bytes: self.total_bytes.load(),
            elapsed,
        }
    }

    /// Snapshots the counters for a window lasting `elapsed` seconds.
    pub fn report(&self, elapsed: f64) -> Report {
        Report {
            total_packets: self.total_packets.load(),
            total_bytes: self.total_bytes.load(),
            packets: self.packets.load(),
            bytes: self.bytes.load(),
            errors: self.errors.load(),
            truncated: self.truncated.load(),
            elapsed,
        }
    }

    pub fn packets(&self) -> u64 {
        self.packets.load()
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load()
    }

    pub fn total_packets(&self) -> u64 {
        self.total_packets.load()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load()
    }

    pub fn truncated(&self) -> u64 {
        self.truncated.load()
    }

    pub fn errors(&self) -> u64 {
        self.errors.load()
    }
}

/// A point-in-time view of the counters, rendered as the periodic status line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report {
    pub total_packets: u64,
    pub total_bytes: u64,
    pub packets: u64,
    pub bytes: u64,
    pub errors: u64,
    pub truncated: u64,
    pub elapsed: f64,
}

impl Report {
    /// Window packets per second. Zero when no time has elapsed.
    pub fn packet_rate(&self) -> f64 {
        if self.elapsed > 0.0 {
            self.packets as f64 / self.elapsed
        } else {
            0.0
        }
    }

    /// Window throughput in Gb/s.
    pub fn gigabits_per_second(&self) -> f64 {
        if self.elapsed > 0.0 {
            self.bytes as f64 * 8.0 / 1e9 / self.elapsed
        } else {
            0.0
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) packets\t{} bytes ({} Gb/s)\t{} errors\t{} trunc",
            self.total_packets,
            self.packet_rate(),
            self.total_bytes,
            self.gigabits_per_second(),
            self.errors,
            self.truncated
        )
    }
}
