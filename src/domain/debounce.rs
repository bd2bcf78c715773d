//! Debounced boolean signal
//!
//! A raw transition is only trusted once the raw level has stayed at the new
//! value for the whole debounce window. Returning to the confirmed level
//! inside the window cancels the pending change.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Debounce {
    window: Duration,
    confirmed: bool,
    raw: bool,
    pending_since: Option<Instant>,
}

impl Debounce {
    pub fn new(window: Duration) -> Self {
        Self { window, confirmed: false, raw: false, pending_since: None }
    }

    /// Feed one raw sample; returns the confirmed value after the sample
    pub fn update(&mut self, raw: bool, now: Instant) -> bool {
        self.raw = raw;

        if raw == self.confirmed {
            self.pending_since = None;
            return self.confirmed;
        }

        let since = *self.pending_since.get_or_insert(now);
        if now.saturating_duration_since(since) >= self.window {
            self.confirmed = raw;
            self.pending_since = None;
        }
        self.confirmed
    }

    #[inline]
    pub fn confirmed(&self) -> bool {
        self.confirmed
    }

    /// Last raw sample, confirmed or not
    #[inline]
    pub fn raw(&self) -> bool {
        self.raw
    }

    /// True while a raw change is waiting out the window
    pub fn is_pending(&self) -> bool {
        self.pending_since.is_some()
    }
}

/// Counts raw edges inside a sliding window to spot a failing sensor
#[derive(Debug, Clone)]
pub struct FlickerMonitor {
    threshold: u32,
    window: Duration,
    last_raw: Option<bool>,
    window_start: Option<Instant>,
    edges: u32,
    alerted: bool,
}

impl FlickerMonitor {
    pub fn new(threshold: u32, window: Duration) -> Self {
        Self { threshold, window, last_raw: None, window_start: None, edges: 0, alerted: false }
    }

    /// Record a raw sample. Returns the edge count the first time the
    /// threshold is exceeded within one window.
    pub fn record(&mut self, raw: bool, now: Instant) -> Option<u32> {
        let previous = self.last_raw.replace(raw);

        if let Some(start) = self.window_start {
            if now.saturating_duration_since(start) > self.window {
                self.window_start = None;
                self.edges = 0;
                self.alerted = false;
            }
        }

        if previous.is_some_and(|p| p != raw) {
            self.window_start.get_or_insert(now);
            self.edges += 1;
            if self.edges > self.threshold && !self.alerted {
                self.alerted = true;
                return Some(self.edges);
            }
        }
        None
    }
}
