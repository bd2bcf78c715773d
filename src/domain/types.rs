//! Shared types for the barrier station

use serde::{Deserialize, Serialize};

/// One of the two physical vehicle paths through the station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneId {
    Entry,
    Exit,
}

impl LaneId {
    /// Both lanes in control-loop order (entry before exit)
    pub const ALL: [LaneId; 2] = [LaneId::Entry, LaneId::Exit];

    /// Wire number used by the backend protocol (1 = entry, 2 = exit)
    #[inline]
    pub fn number(self) -> u8 {
        match self {
            LaneId::Entry => 1,
            LaneId::Exit => 2,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(LaneId::Entry),
            2 => Some(LaneId::Exit),
            _ => None,
        }
    }

    /// Array slot for per-lane storage
    #[inline]
    pub fn index(self) -> usize {
        match self {
            LaneId::Entry => 0,
            LaneId::Exit => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LaneId::Entry => "entry",
            LaneId::Exit => "exit",
        }
    }
}

impl std::fmt::Display for LaneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Normalized credential identifier: uppercase hex of the tag UID bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode_upper(bytes))
    }

    /// Parse a textual UID as printed by readers ("ab 12 cd 34", "AB:12:CD:34", "ab12cd34").
    ///
    /// Returns `None` for empty input, non-hex characters or an odd digit count.
    pub fn parse(text: &str) -> Option<Self> {
        let digits: String = text
            .chars()
            .filter(|c| !matches!(c, ' ' | ':' | '-' | '\t'))
            .collect();
        if digits.is_empty() {
            return None;
        }
        let bytes = hex::decode(&digits).ok()?;
        Some(Self::from_bytes(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-lane access state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneState {
    Idle,
    WaitingServer,
    Opened,
    Closing,
}

impl LaneState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaneState::Idle => "idle",
            LaneState::WaitingServer => "waiting_server",
            LaneState::Opened => "opened",
            LaneState::Closing => "closing",
        }
    }

    /// Numeric encoding for gauges (0=idle .. 3=closing)
    pub fn as_gauge(&self) -> u64 {
        match self {
            LaneState::Idle => 0,
            LaneState::WaitingServer => 1,
            LaneState::Opened => 2,
            LaneState::Closing => 3,
        }
    }
}

/// Vehicle details pushed by the backend for display
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct VehicleInfo {
    pub plate: String,
    pub vehicle_type: String,
    pub slot: String,
    pub owner: String,
}

impl VehicleInfo {
    /// Two display lines: "<plate> <type>" and "<slot> <owner>"
    pub fn display_lines(&self) -> (String, String) {
        let line1 = format!("{} {}", self.plate, self.vehicle_type);
        let line2 = if self.owner.is_empty() {
            self.slot.clone()
        } else {
            format!("{} {}", self.slot, self.owner)
        };
        (line1, line2)
    }
}
