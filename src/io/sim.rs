//! Simulated reader and presence inputs driven from a stdin console
//!
//! Console commands:
//!   card <lane> <uid>     present a tag at lane 1 or 2
//!   car <lane> on|off     block or clear the lane's beam
//!   status                log the simulated inputs

use crate::domain::types::{LaneId, Uid};
use crate::io::presence::PresenceInput;
use crate::io::reader::CredentialReader;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct SimState {
    cards: [Option<Uid>; 2],
    blocked: [bool; 2],
}

/// Shared simulated inputs; clones see the same state
#[derive(Clone, Default)]
pub struct SimBench {
    state: Arc<Mutex<SimState>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Card { lane: LaneId, uid: Uid },
    Car { lane: LaneId, present: bool },
    Status,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or_else(|| "empty command".to_string())?;

        let lane = |word: Option<&str>| {
            word.and_then(|w| w.parse::<u8>().ok())
                .and_then(LaneId::from_number)
                .ok_or_else(|| "lane must be 1 or 2".to_string())
        };

        match verb {
            "card" => {
                let lane = lane(words.next())?;
                let text: String = words.collect::<Vec<_>>().join("");
                let uid = Uid::parse(&text).ok_or_else(|| format!("invalid uid {text:?}"))?;
                Ok(ConsoleCommand::Card { lane, uid })
            }
            "car" => {
                let lane = lane(words.next())?;
                let present = match words.next() {
                    Some("on") => true,
                    Some("off") => false,
                    _ => return Err("expected on or off".to_string()),
                };
                Ok(ConsoleCommand::Car { lane, present })
            }
            "status" => Ok(ConsoleCommand::Status),
            other => Err(format!("unknown command {other:?}")),
        }
    }
}

impl SimBench {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn present_card(&self, lane: LaneId, uid: Uid) {
        self.state.lock().cards[lane.index()] = Some(uid);
    }

    pub fn set_blocked(&self, lane: LaneId, blocked: bool) {
        self.state.lock().blocked[lane.index()] = blocked;
    }

    pub fn apply(&self, cmd: ConsoleCommand) {
        match cmd {
            ConsoleCommand::Card { lane, uid } => {
                info!(lane = %lane, uid = %uid, "sim_card_presented");
                self.present_card(lane, uid);
            }
            ConsoleCommand::Car { lane, present } => {
                info!(lane = %lane, present = present, "sim_beam_set");
                self.set_blocked(lane, present);
            }
            ConsoleCommand::Status => {
                let state = self.state.lock();
                for lane in LaneId::ALL {
                    info!(
                        lane = %lane,
                        pending_card = ?state.cards[lane.index()].as_ref().map(|u| u.as_str()),
                        beam_blocked = state.blocked[lane.index()],
                        "sim_status"
                    );
                }
            }
        }
    }

    /// Read console commands from stdin until EOF or shutdown
    pub async fn run_console(self, mut shutdown: watch::Receiver<bool>) {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        info!("sim_console_started");

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) if line.trim().is_empty() => {}
                        Ok(Some(line)) => match ConsoleCommand::parse(&line) {
                            Ok(cmd) => self.apply(cmd),
                            Err(e) => warn!(line = %line, error = %e, "sim_command_invalid"),
                        },
                        Ok(None) => {
                            info!("sim_console_eof");
                            return;
                        }
                        Err(e) => {
                            warn!(error = %e, "sim_console_read_error");
                            return;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

impl CredentialReader for SimBench {
    fn poll(&mut self, lane: LaneId) -> Option<Uid> {
        self.state.lock().cards[lane.index()].take()
    }
}

impl PresenceInput for SimBench {
    fn is_blocked(&mut self, lane: LaneId) -> Option<bool> {
        Some(self.state.lock().blocked[lane.index()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_console_commands() {
        assert_eq!(
            ConsoleCommand::parse("card 1 ab 12 cd 34"),
            Ok(ConsoleCommand::Card { lane: LaneId::Entry, uid: Uid::parse("AB12CD34").unwrap() })
        );
        assert_eq!(
            ConsoleCommand::parse("car 2 on"),
            Ok(ConsoleCommand::Car { lane: LaneId::Exit, present: true })
        );
        assert_eq!(ConsoleCommand::parse("status"), Ok(ConsoleCommand::Status));
        assert!(ConsoleCommand::parse("car 3 on").is_err());
        assert!(ConsoleCommand::parse("car 1 maybe").is_err());
        assert!(ConsoleCommand::parse("card 1").is_err());
        assert!(ConsoleCommand::parse("jump").is_err());
    }

    #[test]
    fn test_card_is_consumed_by_poll() {
        let bench = SimBench::new();
        let mut reader = bench.clone();
        bench.apply(ConsoleCommand::parse("card 2 DEADBEEF").unwrap());

        assert_eq!(reader.poll(LaneId::Entry), None);
        assert_eq!(reader.poll(LaneId::Exit).map(|u| u.to_string()), Some("DEADBEEF".to_string()));
        assert_eq!(reader.poll(LaneId::Exit), None);
    }

    #[test]
    fn test_beam_state_is_shared() {
        let bench = SimBench::new();
        let mut presence = bench.clone();
        assert_eq!(presence.is_blocked(LaneId::Entry), Some(false));
        bench.set_blocked(LaneId::Entry, true);
        assert_eq!(presence.is_blocked(LaneId::Entry), Some(true));
    }
}
