//! Lock-free metrics collection and periodic reporting
//!
//! Counters and gauges are plain atomics so the prometheus endpoint and the
//! reporter task can read them while the control loop writes.
//!
//! NOTE: All atomics use Relaxed ordering. They are statistical counters
//! only; do NOT use them for coordination or logic decisions.

use crate::domain::protocol::ProtocolCommand;
use crate::domain::types::{LaneId, LaneState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Lock-free metrics collector
pub struct Metrics {
    cards_scanned: AtomicU64,
    checkouts: AtomicU64,
    opens: AtomicU64,
    opens_ignored: AtomicU64,
    rejects: AtomicU64,
    timeouts: AtomicU64,
    closes: AtomicU64,
    lines_received: AtomicU64,
    lines_unknown: AtomicU64,
    lines_malformed: AtomicU64,
    lines_sent: AtomicU64,
    sends_dropped: AtomicU64,
    connect_attempts: AtomicU64,
    connects: AtomicU64,
    disconnects: AtomicU64,
    display_refreshes: AtomicU64,
    display_suppressed: AtomicU64,
    presence_flickers: AtomicU64,
    link_connected: AtomicU64,
    lane_state: [AtomicU64; 2],
    car_slots: AtomicU64,
    motor_slots: AtomicU64,
    /// Ticks since last report (reset on report)
    ticks_since_report: AtomicU64,
    /// Max tick duration in microseconds (reset on report)
    tick_max_us: AtomicU64,
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            cards_scanned: AtomicU64::new(0),
            checkouts: AtomicU64::new(0),
            opens: AtomicU64::new(0),
            opens_ignored: AtomicU64::new(0),
            rejects: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            closes: AtomicU64::new(0),
            lines_received: AtomicU64::new(0),
            lines_unknown: AtomicU64::new(0),
            lines_malformed: AtomicU64::new(0),
            lines_sent: AtomicU64::new(0),
            sends_dropped: AtomicU64::new(0),
            connect_attempts: AtomicU64::new(0),
            connects: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            display_refreshes: AtomicU64::new(0),
            display_suppressed: AtomicU64::new(0),
            presence_flickers: AtomicU64::new(0),
            link_connected: AtomicU64::new(0),
            lane_state: [AtomicU64::new(0), AtomicU64::new(0)],
            car_slots: AtomicU64::new(0),
            motor_slots: AtomicU64::new(0),
            ticks_since_report: AtomicU64::new(0),
            tick_max_us: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_card_scanned(&self) {
        self.cards_scanned.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_checkout(&self) {
        self.checkouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_open(&self) {
        self.opens.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_open_ignored(&self) {
        self.opens_ignored.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reject(&self) {
        self.rejects.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_close(&self) {
        self.closes.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an inbound line by its parsed kind
    #[inline]
    pub fn record_line_received(&self, cmd: &ProtocolCommand) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
        if matches!(cmd, ProtocolCommand::Unknown(_)) {
            self.lines_unknown.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count an inbound line dropped for a bad payload
    #[inline]
    pub fn record_line_malformed(&self) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
        self.lines_malformed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_line_sent(&self) {
        self.lines_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_send_dropped(&self) {
        self.sends_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_connected(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
        self.link_connected.store(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_disconnected(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
        self.link_connected.store(0, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_display(&self, refreshed: bool) {
        if refreshed {
            self.display_refreshes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.display_suppressed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_presence_flicker(&self) {
        self.presence_flickers.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_lane_state(&self, lane: LaneId, state: LaneState) {
        self.lane_state[lane.index()].store(state.as_gauge(), Ordering::Relaxed);
    }

    #[inline]
    pub fn set_slots(&self, car: u32, motor: u32) {
        self.car_slots.store(car as u64, Ordering::Relaxed);
        self.motor_slots.store(motor as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_tick(&self, duration_us: u64) {
        self.ticks_since_report.fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.tick_max_us, duration_us);
    }

    pub fn link_connected(&self) -> bool {
        self.link_connected.load(Ordering::Relaxed) == 1
    }

    /// Free (car, motor) slots as last reported by the backend
    pub fn slots(&self) -> (u64, u64) {
        (self.car_slots.load(Ordering::Relaxed), self.motor_slots.load(Ordering::Relaxed))
    }

    /// Snapshot all counters, resetting the per-report tick statistics
    pub fn report(&self) -> MetricsSummary {
        let elapsed_secs = {
            let mut last = self.last_report_time.lock();
            let secs = last.elapsed().as_secs_f64();
            *last = Instant::now();
            secs
        };
        let ticks = self.ticks_since_report.swap(0, Ordering::Relaxed);
        let tick_max_us = self.tick_max_us.swap(0, Ordering::Relaxed);

        MetricsSummary {
            cards_scanned: self.cards_scanned.load(Ordering::Relaxed),
            checkouts: self.checkouts.load(Ordering::Relaxed),
            opens: self.opens.load(Ordering::Relaxed),
            opens_ignored: self.opens_ignored.load(Ordering::Relaxed),
            rejects: self.rejects.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            closes: self.closes.load(Ordering::Relaxed),
            lines_received: self.lines_received.load(Ordering::Relaxed),
            lines_unknown: self.lines_unknown.load(Ordering::Relaxed),
            lines_malformed: self.lines_malformed.load(Ordering::Relaxed),
            lines_sent: self.lines_sent.load(Ordering::Relaxed),
            sends_dropped: self.sends_dropped.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            display_refreshes: self.display_refreshes.load(Ordering::Relaxed),
            display_suppressed: self.display_suppressed.load(Ordering::Relaxed),
            presence_flickers: self.presence_flickers.load(Ordering::Relaxed),
            link_connected: self.link_connected(),
            entry_state: self.lane_state[0].load(Ordering::Relaxed),
            exit_state: self.lane_state[1].load(Ordering::Relaxed),
            car_slots: self.car_slots.load(Ordering::Relaxed),
            motor_slots: self.motor_slots.load(Ordering::Relaxed),
            ticks_per_sec: if elapsed_secs > 0.0 { ticks as f64 / elapsed_secs } else { 0.0 },
            tick_max_us,
        }
    }
}

/// Point-in-time copy of all metrics
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub cards_scanned: u64,
    pub checkouts: u64,
    pub opens: u64,
    pub opens_ignored: u64,
    pub rejects: u64,
    pub timeouts: u64,
    pub closes: u64,
    pub lines_received: u64,
    pub lines_unknown: u64,
    pub lines_malformed: u64,
    pub lines_sent: u64,
    pub sends_dropped: u64,
    pub connect_attempts: u64,
    pub connects: u64,
    pub disconnects: u64,
    pub display_refreshes: u64,
    pub display_suppressed: u64,
    pub presence_flickers: u64,
    pub link_connected: bool,
    pub entry_state: u64,
    pub exit_state: u64,
    pub car_slots: u64,
    pub motor_slots: u64,
    pub ticks_per_sec: f64,
    pub tick_max_us: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            cards = %self.cards_scanned,
            checkouts = %self.checkouts,
            opens = %self.opens,
            rejects = %self.rejects,
            timeouts = %self.timeouts,
            closes = %self.closes,
            lines_rx = %self.lines_received,
            lines_unknown = %self.lines_unknown,
            lines_malformed = %self.lines_malformed,
            lines_tx = %self.lines_sent,
            sends_dropped = %self.sends_dropped,
            link_connected = %self.link_connected,
            reconnects = %self.connects,
            entry_state = %self.entry_state,
            exit_state = %self.exit_state,
            ticks_per_sec = %format!("{:.1}", self.ticks_per_sec),
            tick_max_us = %self.tick_max_us,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_card_scanned();
        metrics.record_card_scanned();
        metrics.record_open();
        metrics.record_line_received(&ProtocolCommand::Ack);
        metrics.record_line_received(&ProtocolCommand::Unknown("X".to_string()));
        metrics.record_line_malformed();

        let summary = metrics.report();
        assert_eq!(summary.cards_scanned, 2);
        assert_eq!(summary.opens, 1);
        assert_eq!(summary.lines_received, 3);
        assert_eq!(summary.lines_unknown, 1);
        assert_eq!(summary.lines_malformed, 1);
    }

    #[test]
    fn test_link_gauge_follows_connect_state() {
        let metrics = Metrics::new();
        assert!(!metrics.link_connected());
        metrics.record_connected();
        assert!(metrics.link_connected());
        metrics.record_disconnected();
        assert!(!metrics.link_connected());
        assert_eq!(metrics.report().disconnects, 1);
    }

    #[test]
    fn test_tick_max_resets_on_report() {
        let metrics = Metrics::new();
        metrics.record_tick(120);
        metrics.record_tick(80);
        assert_eq!(metrics.report().tick_max_us, 120);
        assert_eq!(metrics.report().tick_max_us, 0);
    }

    #[test]
    fn test_lane_state_gauge() {
        let metrics = Metrics::new();
        metrics.set_lane_state(LaneId::Exit, LaneState::Closing);
        let summary = metrics.report();
        assert_eq!(summary.entry_state, 0);
        assert_eq!(summary.exit_state, 3);
    }
}
