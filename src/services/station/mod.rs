//! Station control loop
//!
//! The Station owns both lanes and every collaborator. One tick:
//! 1. services the transport link (reconnect when due)
//! 2. dispatches at most one inbound line
//! 3. advances the entry lane, then the exit lane
//!
//! Lanes and the dispatcher return actions; the station executes them
//! against the device sink, the link and the journal.


use crate::domain::cycle::CycleOutcome;
use crate::domain::protocol::Outbound;
use crate::domain::types::{LaneId, LaneState};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::device::{Actuators, DeviceSink};
use crate::io::journal::Journal;
use crate::io::link::Transport;
use crate::io::presence::{PresenceInput, PresenceSensor};
use crate::io::reader::CredentialReader;
use crate::services::dispatcher::{Dispatcher, Routed};
use crate::services::lane::{Action, Actions, Lane, LaneTimings};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

pub const IDLE_BANNER: (&str, &str) = ("SMART PARKING", "SCAN YOUR CARD");
pub const OFFLINE_NOTICE: (&str, &str) = ("OFFLINE", "RECONNECTING...");

pub struct Station<T, R, P, A>
where
    T: Transport,
    R: CredentialReader,
    P: PresenceInput,
    A: Actuators,
{
    pub(crate) lanes: [Lane; 2],
    pub(crate) dispatcher: Dispatcher,
    pub(crate) link: T,
    pub(crate) reader: R,
    pub(crate) presence: PresenceSensor<P>,
    pub(crate) devices: DeviceSink<A>,
    pub(crate) journal: Option<Journal>,
    pub(crate) metrics: Arc<Metrics>,
    /// Link status as last announced on the display; `None` before the first tick
    link_up: Option<bool>,
    flicker_alerts_seen: u64,
    tick_interval: Duration,
    status_log_interval: Option<Duration>,
    last_status_log: Option<Instant>,
}

impl<T, R, P, A> Station<T, R, P, A>
where
    T: Transport,
    R: CredentialReader,
    P: PresenceInput,
    A: Actuators,
{
    pub fn new(
        config: &Config,
        link: T,
        reader: R,
        presence: P,
        actuators: A,
        metrics: Arc<Metrics>,
    ) -> Self {
        let timings = LaneTimings::from_config(config);
        let status_log_secs = config.status_log_secs();

        Self {
            lanes: [Lane::new(LaneId::Entry, timings), Lane::new(LaneId::Exit, timings)],
            dispatcher: Dispatcher::new(metrics.clone()),
            link,
            reader,
            presence: PresenceSensor::from_config(presence, config),
            devices: DeviceSink::new(actuators),
            journal: config.journal_file().map(Journal::new),
            metrics,
            link_up: None,
            flicker_alerts_seen: 0,
            tick_interval: config.tick_interval(),
            status_log_interval: (status_log_secs > 0).then(|| Duration::from_secs(status_log_secs)),
            last_status_log: None,
        }
    }

    pub fn lane_state(&self, lane: LaneId) -> LaneState {
        self.lanes[lane.index()].state()
    }

    /// Put outputs into a known state: both barriers closed, idle banner
    pub fn startup(&mut self) {
        for lane in LaneId::ALL {
            self.devices.close_barrier(lane);
            self.metrics.set_lane_state(lane, LaneState::Idle);
        }
        self.show(IDLE_BANNER.0, IDLE_BANNER.1);
        info!("station_started");
    }

    /// One control step
    pub async fn tick(&mut self, now: Instant) {
        self.link.tick(now).await;
        self.sync_link_status();

        let line = self.link.try_receive_line();
        self.sync_link_status();
        if let Some(line) = line {
            debug!(line = %line, "backend_line_received");
            match self.dispatcher.handle_line(&line, &mut self.lanes) {
                Routed::Lane(lane, actions) => {
                    self.execute(lane, actions).await;
                    self.metrics.set_lane_state(lane, self.lane_state(lane));
                }
                Routed::Show(line1, line2) => self.show(&line1, &line2),
                Routed::Nothing => {}
            }
        }

        for lane in LaneId::ALL {
            let present = self.presence.sample(lane, now);
            let idx = lane.index();
            let uid = if self.lanes[idx].state() == LaneState::Idle {
                self.reader.poll(lane)
            } else {
                None
            };

            let actions = self.lanes[idx].advance(now, uid, present);
            if !actions.is_empty() {
                self.execute(lane, actions).await;
            }
            self.metrics.set_lane_state(lane, self.lanes[idx].state());
        }

        let alerts = self.presence.flicker_alerts();
        while self.flicker_alerts_seen < alerts {
            self.flicker_alerts_seen += 1;
            self.metrics.record_presence_flicker();
        }

        self.log_status(now);
    }

    /// Drive the control loop at the configured tick until shutdown
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        self.startup();

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(tick_ms = %self.tick_interval.as_millis(), "station_loop_started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let started = Instant::now();
                    self.tick(tokio::time::Instant::now().into_std()).await;
                    self.metrics.record_tick(started.elapsed().as_micros() as u64);
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("station_shutdown");
                        return;
                    }
                }
            }
        }
    }

    async fn execute(&mut self, lane: LaneId, actions: Actions) {
        for action in actions {
            match action {
                Action::OpenBarrier => self.devices.open_barrier(lane),
                Action::CloseBarrier => {
                    self.devices.close_barrier(lane);
                    self.metrics.record_close();
                }
                Action::Beep(duration) => self.devices.beep(lane, duration),
                Action::Show(line1, line2) => self.show(&line1, &line2),
                Action::Send(msg) => {
                    match &msg {
                        Outbound::Card { .. } => self.metrics.record_card_scanned(),
                        Outbound::Checkout(_) => self.metrics.record_checkout(),
                        Outbound::Hello(_) | Outbound::Closed(_) => {}
                    }
                    self.link.send_line(&msg.to_string()).await;
                }
                Action::Settle(duration) => tokio::time::sleep(duration).await,
                Action::Record(cycle) => {
                    if cycle.outcome == Some(CycleOutcome::TimedOut) {
                        self.metrics.record_timeout();
                    }
                    if let Some(journal) = &self.journal {
                        journal.record(&cycle);
                    }
                }
            }
        }
    }

    fn show(&mut self, line1: &str, line2: &str) {
        let refreshed = self.devices.show_message(line1, line2);
        self.metrics.record_display(refreshed);
    }

    fn sync_link_status(&mut self) {
        let up = self.link.is_connected();
        if self.link_up == Some(up) {
            return;
        }
        self.link_up = Some(up);

        if up {
            self.show(IDLE_BANNER.0, IDLE_BANNER.1);
        } else {
            info!("backend_offline_notice");
            self.dispatcher.link_lost();
            self.show(OFFLINE_NOTICE.0, OFFLINE_NOTICE.1);
        }
    }

    fn log_status(&mut self, now: Instant) {
        let Some(every) = self.status_log_interval else {
            return;
        };
        let due = self
            .last_status_log
            .map_or(true, |last| now.saturating_duration_since(last) >= every);
        if !due {
            return;
        }
        self.last_status_log = Some(now);

        let status = self.dispatcher.status();
        debug!(
            entry = %self.lanes[0].state().as_str(),
            exit = %self.lanes[1].state().as_str(),
            link_connected = self.link.is_connected(),
            car_slots = ?status.car_slots,
            motor_slots = ?status.motor_slots,
            "station_status"
        );
    }
}
