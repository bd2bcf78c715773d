//! Device sink: barrier, buzzer and display outputs
//!
//! `Actuators` is the hardware seam. `DeviceSink` sits in front of it, owns
//! the last commanded output state and makes every primitive idempotent.

use crate::domain::types::LaneId;
use std::time::Duration;
use tracing::{debug, info};

/// Raw physical outputs
pub trait Actuators: Send {
    fn drive_barrier(&mut self, lane: LaneId, open: bool);
    fn sound(&mut self, lane: LaneId, duration: Duration);
    fn render(&mut self, line1: &str, line2: &str);
}

pub struct DeviceSink<A: Actuators> {
    actuators: A,
    barrier_open: [Option<bool>; 2],
    last_message: Option<(String, String)>,
    refreshes: u64,
}

impl<A: Actuators> DeviceSink<A> {
    pub fn new(actuators: A) -> Self {
        Self { actuators, barrier_open: [None; 2], last_message: None, refreshes: 0 }
    }

    pub fn open_barrier(&mut self, lane: LaneId) {
        self.set_barrier(lane, true);
    }

    pub fn close_barrier(&mut self, lane: LaneId) {
        self.set_barrier(lane, false);
    }

    fn set_barrier(&mut self, lane: LaneId, open: bool) {
        let slot = &mut self.barrier_open[lane.index()];
        if *slot == Some(open) {
            debug!(lane = %lane, open = open, "barrier_already_in_position");
            return;
        }
        *slot = Some(open);
        self.actuators.drive_barrier(lane, open);
    }

    pub fn beep(&mut self, lane: LaneId, duration: Duration) {
        self.actuators.sound(lane, duration);
    }

    /// Render two lines; returns false when suppressed as unchanged
    pub fn show_message(&mut self, line1: &str, line2: &str) -> bool {
        if let Some((l1, l2)) = &self.last_message {
            if l1 == line1 && l2 == line2 {
                return false;
            }
        }
        self.actuators.render(line1, line2);
        self.last_message = Some((line1.to_string(), line2.to_string()));
        self.refreshes += 1;
        true
    }

    /// `None` until the barrier has been commanded once
    pub fn barrier_open(&self, lane: LaneId) -> Option<bool> {
        self.barrier_open[lane.index()]
    }

    pub fn refresh_count(&self) -> u64 {
        self.refreshes
    }

    pub fn last_message(&self) -> Option<(&str, &str)> {
        self.last_message.as_ref().map(|(a, b)| (a.as_str(), b.as_str()))
    }

    pub fn actuators(&self) -> &A {
        &self.actuators
    }
}

/// Host stand-in that renders every output as a log event
#[derive(Debug, Default)]
pub struct LogActuators;

impl Actuators for LogActuators {
    fn drive_barrier(&mut self, lane: LaneId, open: bool) {
        info!(lane = %lane, position = if open { "open" } else { "closed" }, "barrier_driven");
    }

    fn sound(&mut self, lane: LaneId, duration: Duration) {
        info!(lane = %lane, duration_ms = %duration.as_millis(), "buzzer_sounded");
    }

    fn render(&mut self, line1: &str, line2: &str) {
        info!(line1 = %line1, line2 = %line2, "display_rendered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counting {
        barrier: Vec<(LaneId, bool)>,
        beeps: usize,
        renders: Vec<(String, String)>,
    }

    impl Actuators for Counting {
        fn drive_barrier(&mut self, lane: LaneId, open: bool) {
            self.barrier.push((lane, open));
        }
        fn sound(&mut self, _lane: LaneId, _duration: Duration) {
            self.beeps += 1;
        }
        fn render(&mut self, line1: &str, line2: &str) {
            self.renders.push((line1.to_string(), line2.to_string()));
        }
    }

    #[test]
    fn test_identical_message_refreshes_once() {
        let mut sink = DeviceSink::new(Counting::default());
        assert!(sink.show_message("WELCOME", "AB12CD34"));
        assert!(!sink.show_message("WELCOME", "AB12CD34"));
        assert_eq!(sink.refresh_count(), 1);
        assert_eq!(sink.actuators().renders.len(), 1);

        assert!(sink.show_message("WELCOME", "OTHER"));
        assert_eq!(sink.refresh_count(), 2);
        assert_eq!(sink.last_message(), Some(("WELCOME", "OTHER")));
    }

    #[test]
    fn test_barrier_commands_are_idempotent() {
        let mut sink = DeviceSink::new(Counting::default());
        assert_eq!(sink.barrier_open(LaneId::Entry), None);

        sink.close_barrier(LaneId::Entry);
        sink.close_barrier(LaneId::Entry);
        sink.open_barrier(LaneId::Entry);
        sink.open_barrier(LaneId::Exit);

        assert_eq!(
            sink.actuators().barrier,
            vec![(LaneId::Entry, false), (LaneId::Entry, true), (LaneId::Exit, true)]
        );
        assert_eq!(sink.barrier_open(LaneId::Entry), Some(true));
    }

    #[test]
    fn test_every_beep_sounds() {
        let mut sink = DeviceSink::new(Counting::default());
        sink.beep(LaneId::Exit, Duration::from_millis(100));
        sink.beep(LaneId::Exit, Duration::from_millis(100));
        assert_eq!(sink.actuators().beeps, 2);
    }
}
