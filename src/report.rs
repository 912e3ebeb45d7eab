use std::time::{Duration, Instant};

use crate::counter::Counter;
use crate::metrics::{Metrics, Report};

pub const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Absolute report deadlines, one interval apart.
///
/// Each deadline is derived from the previous one rather than from the time the tick was
/// handled, so slow ticks do not push later reports back.
#[derive(Debug, Clone, Copy)]
pub struct ReportSchedule {
    next: Instant,
    interval: Duration,
}

impl ReportSchedule {
    /// First deadline is one interval after `start`.
    pub fn starting_at(start: Instant) -> ReportSchedule {
        ReportSchedule::with_interval(start, REPORT_INTERVAL)
    }

    pub fn with_interval(start: Instant, interval: Duration) -> ReportSchedule {
        ReportSchedule {
            next: start + interval,
            interval,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.next
    }

    /// Returns the current deadline and moves on to the following one.
    pub fn advance(&mut self) -> Instant {
        let due = self.next;
        self.next += self.interval;
        due
    }
}

/// Prints the status line and starts a new counting window.
#[derive(Debug)]
pub struct Reporter {
    last_report: Instant,
}

impl Reporter {
    pub fn new(start: Instant) -> Reporter {
        Reporter { last_report: start }
    }

    pub fn last_report(&self) -> Instant {
        self.last_report
    }

    /// Drains the window counters into a `Report` covering `last_report..now`.
    pub fn snapshot<C: Counter>(&mut self, metrics: &Metrics<C>, now: Instant) -> Report {
        let elapsed = now.saturating_duration_since(self.last_report).as_secs_f64();
        let report = metrics.take_window(elapsed);
        self.last_report = now;
        report
    }

    pub fn tick<C: Counter>(&mut self, metrics: &Metrics<C>, now: Instant) {
        let report = self.snapshot(metrics, now);
        println!("{}", report);
    }
}
