//! Lane controller: the per-lane access state machine
//!
//! A `Lane` never touches hardware. Each call returns the side effects the
//! station must execute, in order. The barrier is only commanded closed on
//! the `Closing` → `Idle` transition, and a lane only leaves
//! `WaitingServer` through a backend command or the server timeout.

use crate::domain::cycle::{CycleOutcome, CycleTrigger, LaneCycle};
use crate::domain::protocol::Outbound;
use crate::domain::types::{LaneId, LaneState, Uid};
use crate::infra::config::Config;
use smallvec::SmallVec;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const SCAN_BEEP: Duration = Duration::from_millis(200);
const ERROR_BEEP: Duration = Duration::from_millis(500);
const REJECT_BEEP: Duration = Duration::from_millis(1000);
const OPEN_BEEP: Duration = Duration::from_millis(100);
const OPEN_BEEP_GAP: Duration = Duration::from_millis(100);

/// Side effect requested by a lane
#[derive(Debug, Clone)]
pub enum Action {
    OpenBarrier,
    CloseBarrier,
    Beep(Duration),
    Show(String, String),
    Send(Outbound),
    /// Pause the control loop before the next action
    Settle(Duration),
    /// Finished cycle for the journal
    Record(LaneCycle),
}

pub type Actions = SmallVec<[Action; 6]>;

#[derive(Debug, Clone, Copy)]
pub struct LaneTimings {
    pub server_timeout: Duration,
    pub clearance_delay: Duration,
}

impl LaneTimings {
    pub fn from_config(config: &Config) -> Self {
        Self { server_timeout: config.server_timeout(), clearance_delay: config.clearance_delay() }
    }
}

impl Default for LaneTimings {
    fn default() -> Self {
        Self { server_timeout: Duration::from_secs(10), clearance_delay: Duration::from_millis(500) }
    }
}

/// Outstanding backend request, only while `WaitingServer`
#[derive(Debug, Clone, Copy)]
pub struct PendingRequest {
    pub lane: LaneId,
    pub sent_at: Instant,
}

impl PendingRequest {
    fn expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.sent_at) > timeout
    }
}

struct Prompts {
    scan_title: &'static str,
    /// Shown after the scan prompt while the backend decides
    waiting: Option<(&'static str, &'static str)>,
    checkout: (&'static str, &'static str),
    timeout: (&'static str, &'static str),
    open: (&'static str, &'static str),
    reject: (&'static str, &'static str),
    passing: (&'static str, &'static str),
}

const ENTRY_PROMPTS: Prompts = Prompts {
    scan_title: "WELCOME",
    waiting: Some(("PROCESSING...", "PLEASE WAIT")),
    checkout: ("WELCOME", "PLEASE WAIT"),
    timeout: ("CONNECTION ERROR", "TRY AGAIN LATER"),
    open: ("PLEASE ENTER", "HAVE A NICE DAY"),
    reject: ("INVALID CARD", "PLEASE RETRY"),
    passing: ("VEHICLE ENTERING", "DRIVE SLOWLY"),
};

const EXIT_PROMPTS: Prompts = Prompts {
    scan_title: "CHECKING",
    waiting: None,
    checkout: ("WELCOME", "PLEASE WAIT"),
    timeout: ("CONNECTION ERROR", "CONTACT STAFF"),
    open: ("THANK YOU", "SEE YOU AGAIN"),
    reject: ("REJECTED", "CONTACT STAFF"),
    passing: ("VEHICLE EXITING", "SEE YOU AGAIN"),
};

fn show((line1, line2): (&str, &str)) -> Action {
    Action::Show(line1.to_string(), line2.to_string())
}

pub struct Lane {
    id: LaneId,
    state: LaneState,
    timings: LaneTimings,
    pending: Option<PendingRequest>,
    last_scan: Option<Instant>,
    present: bool,
    cycle: Option<LaneCycle>,
}

impl Lane {
    pub fn new(id: LaneId, timings: LaneTimings) -> Self {
        Self {
            id,
            state: LaneState::Idle,
            timings,
            pending: None,
            last_scan: None,
            present: false,
            cycle: None,
        }
    }

    pub fn id(&self) -> LaneId {
        self.id
    }

    pub fn state(&self) -> LaneState {
        self.state
    }

    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    pub fn last_scan(&self) -> Option<Instant> {
        self.last_scan
    }

    /// Last presence value seen by `advance`
    pub fn present(&self) -> bool {
        self.present
    }

    fn prompts(&self) -> &'static Prompts {
        match self.id {
            LaneId::Entry => &ENTRY_PROMPTS,
            LaneId::Exit => &EXIT_PROMPTS,
        }
    }

    fn set_state(&mut self, next: LaneState) {
        if self.state != next {
            debug!(lane = %self.id, from = %self.state.as_str(), to = %next.as_str(), "lane_state_changed");
            self.state = next;
        }
    }

    fn finish_cycle(&mut self, outcome: CycleOutcome, actions: &mut Actions) {
        if let Some(cycle) = self.cycle.take() {
            actions.push(Action::Record(cycle.finish(outcome)));
        }
    }

    fn start_request(&mut self, now: Instant, trigger: CycleTrigger) {
        self.last_scan = Some(now);
        self.pending = Some(PendingRequest { lane: self.id, sent_at: now });
        self.cycle = Some(LaneCycle::begin(self.id, trigger));
        self.set_state(LaneState::WaitingServer);
    }

    /// Run one control step with this tick's inputs. `uid` is only
    /// consulted in `Idle`; `present` is the debounced presence value.
    pub fn advance(&mut self, now: Instant, uid: Option<Uid>, present: bool) -> Actions {
        let mut actions = Actions::new();
        self.present = present;
        let prompts = self.prompts();

        match self.state {
            LaneState::Idle => {
                if let Some(uid) = uid {
                    info!(lane = %self.id, uid = %uid, "lane_card_scanned");
                    actions.push(Action::Beep(SCAN_BEEP));
                    actions.push(Action::Show(prompts.scan_title.to_string(), uid.to_string()));
                    actions.push(Action::Send(Outbound::Card { uid: uid.clone(), lane: self.id }));
                    if let Some(waiting) = prompts.waiting {
                        actions.push(show(waiting));
                    }
                    self.start_request(now, CycleTrigger::Card(uid));
                } else if self.id == LaneId::Exit && present {
                    info!(lane = %self.id, "lane_checkout_requested");
                    actions.push(show(prompts.checkout));
                    actions.push(Action::Send(Outbound::Checkout(self.id)));
                    self.start_request(now, CycleTrigger::Checkout);
                }
            }
            LaneState::WaitingServer => {
                let expired = self
                    .pending
                    .is_some_and(|p| p.expired(now, self.timings.server_timeout));
                if expired {
                    warn!(
                        lane = %self.id,
                        timeout_ms = %self.timings.server_timeout.as_millis(),
                        "lane_server_timeout"
                    );
                    actions.push(show(prompts.timeout));
                    actions.push(Action::Beep(ERROR_BEEP));
                    self.pending = None;
                    self.finish_cycle(CycleOutcome::TimedOut, &mut actions);
                    self.set_state(LaneState::Idle);
                }
            }
            LaneState::Opened => {
                if present {
                    info!(lane = %self.id, "lane_vehicle_passing");
                    actions.push(show(prompts.passing));
                    if let Some(cycle) = self.cycle.as_mut() {
                        cycle.mark_passed();
                    }
                    self.set_state(LaneState::Closing);
                }
            }
            LaneState::Closing => {
                if !present {
                    info!(lane = %self.id, "lane_vehicle_cleared");
                    actions.push(Action::Settle(self.timings.clearance_delay));
                    actions.push(Action::CloseBarrier);
                    actions.push(Action::Send(Outbound::Closed(self.id)));
                    self.finish_cycle(CycleOutcome::Completed, &mut actions);
                    self.set_state(LaneState::Idle);
                }
            }
        }

        actions
    }

    /// Backend `OPEN` for this lane. `None` when the lane is busy and the
    /// command is ignored.
    pub fn open(&mut self) -> Option<Actions> {
        match self.state {
            LaneState::WaitingServer | LaneState::Idle => {}
            LaneState::Opened | LaneState::Closing => {
                warn!(lane = %self.id, state = %self.state.as_str(), "lane_open_ignored");
                return None;
            }
        }

        if self.state == LaneState::Idle {
            // Late reply after a timeout, or a manual open from the backend
            info!(lane = %self.id, "lane_opened_from_idle");
            self.cycle = Some(LaneCycle::begin(self.id, CycleTrigger::Remote));
        } else {
            info!(lane = %self.id, "lane_opened");
        }
        if let Some(cycle) = self.cycle.as_mut() {
            cycle.mark_opened();
        }
        self.pending = None;

        let mut actions = Actions::new();
        actions.push(Action::OpenBarrier);
        actions.push(show(self.prompts().open));
        actions.push(Action::Beep(OPEN_BEEP));
        actions.push(Action::Settle(OPEN_BEEP_GAP));
        actions.push(Action::Beep(OPEN_BEEP));
        self.set_state(LaneState::Opened);
        Some(actions)
    }

    /// Backend `REJECT` for this lane. `None` unless the lane is waiting.
    pub fn reject(&mut self) -> Option<Actions> {
        if self.state != LaneState::WaitingServer {
            info!(lane = %self.id, state = %self.state.as_str(), "lane_reject_ignored");
            return None;
        }

        info!(lane = %self.id, "lane_rejected");
        let mut actions = Actions::new();
        actions.push(show(self.prompts().reject));
        actions.push(Action::Beep(REJECT_BEEP));
        self.pending = None;
        self.finish_cycle(CycleOutcome::Rejected, &mut actions);
        self.set_state(LaneState::Idle);
        Some(actions)
    }
}
