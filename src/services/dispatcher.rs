//! Command dispatcher: routes parsed backend lines
//!
//! `OPEN_n` and `REJECT_n` go to lane n. Bare `REJECT` goes to the entry
//! lane only; older backends send it for entry rejections and never for the
//! exit lane. `MSG`, `SLOTS`, `INFO` and `FEE` update shared display and
//! status and never touch lane state.

use crate::domain::protocol::ProtocolCommand;
use crate::domain::types::{LaneId, VehicleInfo};
use crate::infra::metrics::Metrics;
use crate::services::lane::{Actions, Lane};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared status pushed by the backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationStatus {
    pub car_slots: Option<u32>,
    pub motor_slots: Option<u32>,
    pub last_vehicle: Option<VehicleInfo>,
    pub last_fee: Option<u64>,
    pub backend_acked: bool,
}

/// What the station has to do after a command
#[derive(Debug)]
pub enum Routed {
    /// Effects of a lane transition
    Lane(LaneId, Actions),
    /// Shared display update
    Show(String, String),
    /// Logged or recorded only
    Nothing,
}

pub struct Dispatcher {
    status: StationStatus,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { status: StationStatus::default(), metrics }
    }

    pub fn status(&self) -> &StationStatus {
        &self.status
    }

    /// Parse one inbound line and route it. Malformed payloads are dropped
    /// with a diagnostic and change nothing.
    pub fn handle_line(&mut self, line: &str, lanes: &mut [Lane; 2]) -> Routed {
        match ProtocolCommand::parse(line) {
            Ok(cmd) => {
                self.metrics.record_line_received(&cmd);
                self.dispatch(cmd, lanes)
            }
            Err(e) => {
                self.metrics.record_line_malformed();
                warn!(line = %line, error = %e, "protocol_line_malformed");
                Routed::Nothing
            }
        }
    }

    pub fn dispatch(&mut self, cmd: ProtocolCommand, lanes: &mut [Lane; 2]) -> Routed {
        debug!(command = %cmd.as_str(), "protocol_command_received");

        match cmd {
            ProtocolCommand::Open(lane) => match lanes[lane.index()].open() {
                Some(actions) => {
                    self.metrics.record_open();
                    Routed::Lane(lane, actions)
                }
                None => {
                    self.metrics.record_open_ignored();
                    Routed::Nothing
                }
            },
            ProtocolCommand::Reject(target) => {
                let lane = target.unwrap_or(LaneId::Entry);
                match lanes[lane.index()].reject() {
                    Some(actions) => {
                        self.metrics.record_reject();
                        Routed::Lane(lane, actions)
                    }
                    None => Routed::Nothing,
                }
            }
            ProtocolCommand::Message { line1, line2 } => Routed::Show(line1, line2),
            ProtocolCommand::SlotCount { car, motor } => {
                info!(car = %car, motor = %motor, "slots_updated");
                self.status.car_slots = Some(car);
                self.status.motor_slots = Some(motor);
                self.metrics.set_slots(car, motor);
                Routed::Nothing
            }
            ProtocolCommand::VehicleInfo(vehicle) => {
                info!(
                    plate = %vehicle.plate,
                    vehicle_type = %vehicle.vehicle_type,
                    slot = %vehicle.slot,
                    owner = %vehicle.owner,
                    "vehicle_info_received"
                );
                let (line1, line2) = vehicle.display_lines();
                self.status.last_vehicle = Some(vehicle);
                Routed::Show(line1, line2)
            }
            ProtocolCommand::Fee(amount) => {
                info!(amount = %amount, "fee_received");
                self.status.last_fee = Some(amount);
                Routed::Show(format!("FEE: {}k VND", amount / 1000), "PLEASE PAY".to_string())
            }
            ProtocolCommand::Ack => {
                info!("backend_handshake_acknowledged");
                self.status.backend_acked = true;
                Routed::Nothing
            }
            ProtocolCommand::Unknown(raw) => {
                warn!(line = %raw, "protocol_command_unknown");
                Routed::Nothing
            }
        }
    }

    /// Forget per-connection status after the link drops
    pub fn link_lost(&mut self) {
        self.status.backend_acked = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{LaneState, Uid};
    use crate::services::lane::LaneTimings;
    use std::time::Instant;

    fn lanes() -> [Lane; 2] {
        [Lane::new(LaneId::Entry, LaneTimings::default()), Lane::new(LaneId::Exit, LaneTimings::default())]
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(Metrics::new()))
    }

    fn waiting_lanes() -> [Lane; 2] {
        let mut lanes = lanes();
        let now = Instant::now();
        for lane in lanes.iter_mut() {
            lane.advance(now, Uid::parse("AB12CD34"), false);
        }
        lanes
    }

    #[test]
    fn test_open_routes_to_named_lane() {
        let mut d = dispatcher();
        let mut lanes = waiting_lanes();

        let routed = d.handle_line("OPEN_2", &mut lanes);
        assert!(matches!(routed, Routed::Lane(LaneId::Exit, _)));
        assert_eq!(lanes[0].state(), LaneState::WaitingServer);
        assert_eq!(lanes[1].state(), LaneState::Opened);
    }

    #[test]
    fn test_bare_reject_targets_entry_lane_only() {
        let mut d = dispatcher();
        let mut lanes = waiting_lanes();

        let routed = d.handle_line("REJECT", &mut lanes);
        assert!(matches!(routed, Routed::Lane(LaneId::Entry, _)));
        assert_eq!(lanes[0].state(), LaneState::Idle);
        assert_eq!(lanes[1].state(), LaneState::WaitingServer);

        d.handle_line("REJECT_2", &mut lanes);
        assert_eq!(lanes[1].state(), LaneState::Idle);
    }

    #[test]
    fn test_shared_commands_never_touch_lanes() {
        let mut d = dispatcher();
        let mut lanes = waiting_lanes();

        assert!(matches!(
            d.handle_line("MSG:HELLO|WORLD", &mut lanes),
            Routed::Show(ref l1, ref l2) if l1 == "HELLO" && l2 == "WORLD"
        ));
        d.handle_line("SLOTS:3:7", &mut lanes);
        d.handle_line("INFO:29A-12345|CAR|A-05|", &mut lanes);
        d.handle_line("ACK", &mut lanes);

        assert!(lanes.iter().all(|l| l.state() == LaneState::WaitingServer));
        assert_eq!(d.status().car_slots, Some(3));
        assert_eq!(d.status().motor_slots, Some(7));
        assert!(d.status().backend_acked);
        assert_eq!(d.status().last_vehicle.as_ref().map(|v| v.plate.as_str()), Some("29A-12345"));
    }

    #[test]
    fn test_malformed_slots_changes_nothing() {
        let metrics = Arc::new(Metrics::new());
        let mut d = Dispatcher::new(metrics.clone());
        let mut lanes = lanes();
        d.handle_line("SLOTS:3:7", &mut lanes);

        assert!(matches!(d.handle_line("SLOTS:badinput", &mut lanes), Routed::Nothing));
        assert!(matches!(d.handle_line("SLOTS:9:x", &mut lanes), Routed::Nothing));
        assert_eq!(d.status().car_slots, Some(3));
        assert_eq!(d.status().motor_slots, Some(7));
        assert_eq!(metrics.report().lines_malformed, 2);
    }

    #[test]
    fn test_fee_display() {
        let mut d = dispatcher();
        let mut lanes = lanes();
        match d.handle_line("FEE:25000", &mut lanes) {
            Routed::Show(l1, l2) => {
                assert_eq!(l1, "FEE: 25k VND");
                assert_eq!(l2, "PLEASE PAY");
            }
            other => panic!("expected display update, got {other:?}"),
        }
        assert_eq!(d.status().last_fee, Some(25000));
    }

    #[test]
    fn test_open_in_busy_lane_is_counted_as_ignored() {
        let metrics = Arc::new(Metrics::new());
        let mut d = Dispatcher::new(metrics.clone());
        let mut lanes = lanes();

        d.handle_line("OPEN_1", &mut lanes);
        assert!(matches!(d.handle_line("OPEN_1", &mut lanes), Routed::Nothing));
        let summary = metrics.report();
        assert_eq!(summary.opens, 1);
        assert_eq!(summary.opens_ignored, 1);
    }

    #[test]
    fn test_unknown_line_is_only_logged() {
        let metrics = Arc::new(Metrics::new());
        let mut d = Dispatcher::new(metrics.clone());
        let mut lanes = waiting_lanes();
        assert!(matches!(d.handle_line("PING", &mut lanes), Routed::Nothing));
        assert!(lanes.iter().all(|l| l.state() == LaneState::WaitingServer));
        assert_eq!(metrics.report().lines_unknown, 1);
    }
}
