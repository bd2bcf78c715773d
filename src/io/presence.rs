//! Presence sensing: one break-beam input per lane
//!
//! Raw readings are debounced before the lanes see them. A raw input that
//! toggles too often inside the flicker window raises a warning. An input
//! that cannot be read counts as "not blocked".

use crate::domain::debounce::{Debounce, FlickerMonitor};
use crate::domain::types::LaneId;
use crate::infra::config::Config;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Raw break-beam inputs
pub trait PresenceInput: Send {
    /// Raw level, `None` when the input is unavailable
    fn is_blocked(&mut self, lane: LaneId) -> Option<bool>;
}

struct Channel {
    debounce: Debounce,
    flicker: FlickerMonitor,
}

pub struct PresenceSensor<P: PresenceInput> {
    input: P,
    channels: [Channel; 2],
    flicker_alerts: u64,
}

impl<P: PresenceInput> PresenceSensor<P> {
    pub fn new(input: P, debounce: Duration, flicker_threshold: u32, flicker_window: Duration) -> Self {
        let channel = || Channel {
            debounce: Debounce::new(debounce),
            flicker: FlickerMonitor::new(flicker_threshold, flicker_window),
        };
        Self { input, channels: [channel(), channel()], flicker_alerts: 0 }
    }

    pub fn from_config(input: P, config: &Config) -> Self {
        Self::new(input, config.debounce(), config.flicker_threshold(), config.flicker_window())
    }

    /// Debounced presence for the lane after taking one raw sample
    pub fn sample(&mut self, lane: LaneId, now: Instant) -> bool {
        let raw = self.input.is_blocked(lane).unwrap_or(false);
        let channel = &mut self.channels[lane.index()];

        if let Some(edges) = channel.flicker.record(raw, now) {
            self.flicker_alerts += 1;
            warn!(lane = %lane, edges = %edges, "presence_flicker_detected");
        }

        let before = channel.debounce.confirmed();
        let confirmed = channel.debounce.update(raw, now);
        if confirmed != before {
            debug!(lane = %lane, present = confirmed, "presence_changed");
        }
        confirmed
    }

    /// Confirmed value without sampling
    pub fn present(&self, lane: LaneId) -> bool {
        self.channels[lane.index()].debounce.confirmed()
    }

    /// Flicker alerts raised since start; the station diffs this for metrics
    pub fn flicker_alerts(&self) -> u64 {
        self.flicker_alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted {
        levels: [Option<bool>; 2],
    }

    impl PresenceInput for Scripted {
        fn is_blocked(&mut self, lane: LaneId) -> Option<bool> {
            self.levels[lane.index()]
        }
    }

    fn sensor(levels: [Option<bool>; 2]) -> PresenceSensor<Scripted> {
        PresenceSensor::new(Scripted { levels }, Duration::from_millis(500), 5, Duration::from_secs(2))
    }

    #[test]
    fn test_lanes_are_independent() {
        let t0 = Instant::now();
        let mut s = sensor([Some(true), Some(false)]);
        s.sample(LaneId::Entry, t0);
        s.sample(LaneId::Exit, t0);

        let later = t0 + Duration::from_millis(500);
        assert!(s.sample(LaneId::Entry, later));
        assert!(!s.sample(LaneId::Exit, later));
        assert!(s.present(LaneId::Entry));
    }

    #[test]
    fn test_missing_input_reads_not_present() {
        let t0 = Instant::now();
        let mut s = sensor([None, None]);
        for ms in [0u64, 600, 1200] {
            assert!(!s.sample(LaneId::Entry, t0 + Duration::from_millis(ms)));
        }
    }

    #[test]
    fn test_flicker_raises_one_alert() {
        let t0 = Instant::now();
        let mut s = sensor([Some(false), Some(false)]);
        for step in 0..12u64 {
            s.input.levels[0] = Some(step % 2 == 1);
            assert!(!s.sample(LaneId::Entry, t0 + Duration::from_millis(step * 100)));
        }
        assert_eq!(s.flicker_alerts(), 1);
    }
}
