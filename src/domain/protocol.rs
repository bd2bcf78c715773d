//! Backend line protocol
//!
//! One ASCII message per newline-terminated line. `:` separates a command
//! from its payload, `|` separates payload fields.
//!
//! Station → backend: `HELLO`, `CARD:<uid>:<lane>`, `CHECKOUT:<lane>`, `CLOSED:<lane>`
//! Backend → station: `OPEN_1`, `OPEN_2`, `REJECT`, `REJECT_1`, `REJECT_2`,
//! `MSG:<l1>|<l2>`, `SLOTS:<car>:<motor>`, `INFO:<plate>|<type>|<slot>|<owner>`,
//! `FEE:<amount>`, `ACK`

use crate::domain::types::{LaneId, Uid, VehicleInfo};

/// Parsed inbound command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolCommand {
    Open(LaneId),
    /// `None` is the bare legacy `REJECT`
    Reject(Option<LaneId>),
    Message { line1: String, line2: String },
    SlotCount { car: u32, motor: u32 },
    VehicleInfo(VehicleInfo),
    Fee(u64),
    Ack,
    Unknown(String),
}

/// Reason a recognised command was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    MissingDelimiter { command: &'static str, delimiter: char },
    EmptyField { command: &'static str, field: &'static str },
    BadInteger { command: &'static str, value: String },
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::MissingDelimiter { command, delimiter } => {
                write!(f, "{command} payload missing '{delimiter}'")
            }
            ProtocolError::EmptyField { command, field } => {
                write!(f, "{command} payload has empty {field}")
            }
            ProtocolError::BadInteger { command, value } => {
                write!(f, "{command} payload has invalid integer {value:?}")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

impl ProtocolCommand {
    /// Strict parse. Unrecognised prefixes are `Ok(Unknown)`; a recognised
    /// prefix with a bad payload is an error.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();

        match line {
            "OPEN_1" => return Ok(ProtocolCommand::Open(LaneId::Entry)),
            "OPEN_2" => return Ok(ProtocolCommand::Open(LaneId::Exit)),
            "REJECT" => return Ok(ProtocolCommand::Reject(None)),
            "REJECT_1" => return Ok(ProtocolCommand::Reject(Some(LaneId::Entry))),
            "REJECT_2" => return Ok(ProtocolCommand::Reject(Some(LaneId::Exit))),
            "ACK" => return Ok(ProtocolCommand::Ack),
            _ => {}
        }

        if let Some(payload) = line.strip_prefix("MSG:") {
            return parse_message(payload);
        }
        if let Some(payload) = line.strip_prefix("SLOTS:") {
            return parse_slots(payload);
        }
        if let Some(payload) = line.strip_prefix("INFO:") {
            return parse_info(payload);
        }
        if let Some(payload) = line.strip_prefix("FEE:") {
            return parse_integer("FEE", payload).map(ProtocolCommand::Fee);
        }

        Ok(ProtocolCommand::Unknown(line.to_string()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolCommand::Open(_) => "open",
            ProtocolCommand::Reject(_) => "reject",
            ProtocolCommand::Message { .. } => "message",
            ProtocolCommand::SlotCount { .. } => "slot_count",
            ProtocolCommand::VehicleInfo(_) => "vehicle_info",
            ProtocolCommand::Fee(_) => "fee",
            ProtocolCommand::Ack => "ack",
            ProtocolCommand::Unknown(_) => "unknown",
        }
    }
}

fn parse_message(payload: &str) -> Result<ProtocolCommand, ProtocolError> {
    let (line1, line2) = payload
        .split_once('|')
        .ok_or(ProtocolError::MissingDelimiter { command: "MSG", delimiter: '|' })?;
    if line1.is_empty() {
        return Err(ProtocolError::EmptyField { command: "MSG", field: "line1" });
    }
    Ok(ProtocolCommand::Message { line1: line1.to_string(), line2: line2.to_string() })
}

fn parse_slots(payload: &str) -> Result<ProtocolCommand, ProtocolError> {
    let (car, motor) = payload
        .split_once(':')
        .ok_or(ProtocolError::MissingDelimiter { command: "SLOTS", delimiter: ':' })?;
    let car = parse_integer("SLOTS", car)?;
    let motor = parse_integer("SLOTS", motor)?;
    Ok(ProtocolCommand::SlotCount { car, motor })
}

/// `<plate>|<type>|<slot>|<owner>`. Fields after the plate are positional and
/// lenient: `29A-1|CAR|A-05` keeps the slot even though its closing `|` and
/// the owner are missing.
fn parse_info(payload: &str) -> Result<ProtocolCommand, ProtocolError> {
    let (plate, rest) = payload
        .split_once('|')
        .ok_or(ProtocolError::MissingDelimiter { command: "INFO", delimiter: '|' })?;
    if plate.is_empty() {
        return Err(ProtocolError::EmptyField { command: "INFO", field: "plate" });
    }

    // Only the plate delimiter is required; trailing fields default to empty
    let mut fields = rest.splitn(3, '|');
    let vehicle_type = fields.next().unwrap_or_default().to_string();
    let slot = fields.next().unwrap_or_default().to_string();
    let owner = fields.next().unwrap_or_default().to_string();

    Ok(ProtocolCommand::VehicleInfo(VehicleInfo {
        plate: plate.to_string(),
        vehicle_type,
        slot,
        owner,
    }))
}

fn parse_integer<T: std::str::FromStr>(command: &'static str, value: &str) -> Result<T, ProtocolError> {
    // FromStr for unsigned ints accepts a leading '+', the wire format does not
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::BadInteger { command, value: value.to_string() });
    }
    value
        .parse::<T>()
        .map_err(|_| ProtocolError::BadInteger { command, value: value.to_string() })
}

/// Station → backend message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Hello(String),
    Card { uid: Uid, lane: LaneId },
    Checkout(LaneId),
    Closed(LaneId),
}

impl Outbound {
    /// Parse a station line (backend side of the link)
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let mut parts = line.split(':');
        let head = parts.next()?;
        let lane_of = |s: Option<&str>| s.and_then(|n| n.parse::<u8>().ok()).and_then(LaneId::from_number);

        match head {
            "CARD" => {
                let uid = Uid::parse(parts.next()?)?;
                let lane = lane_of(parts.next())?;
                Some(Outbound::Card { uid, lane })
            }
            "CHECKOUT" => lane_of(parts.next()).map(Outbound::Checkout),
            "CLOSED" => lane_of(parts.next()).map(Outbound::Closed),
            _ if head.starts_with("HELLO") => Some(Outbound::Hello(line.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outbound::Hello(_) => "hello",
            Outbound::Card { .. } => "card",
            Outbound::Checkout(_) => "checkout",
            Outbound::Closed(_) => "closed",
        }
    }
}

impl std::fmt::Display for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outbound::Hello(greeting) => f.write_str(greeting),
            Outbound::Card { uid, lane } => write!(f, "CARD:{uid}:{lane}"),
            Outbound::Checkout(lane) => write!(f, "CHECKOUT:{lane}"),
            Outbound::Closed(lane) => write!(f, "CLOSED:{lane}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lane_commands() {
        assert_eq!(ProtocolCommand::parse("OPEN_1"), Ok(ProtocolCommand::Open(LaneId::Entry)));
        assert_eq!(ProtocolCommand::parse("OPEN_2"), Ok(ProtocolCommand::Open(LaneId::Exit)));
        assert_eq!(ProtocolCommand::parse("REJECT"), Ok(ProtocolCommand::Reject(None)));
        assert_eq!(
            ProtocolCommand::parse("REJECT_2"),
            Ok(ProtocolCommand::Reject(Some(LaneId::Exit)))
        );
        assert_eq!(ProtocolCommand::parse("ACK\r"), Ok(ProtocolCommand::Ack));
    }

    #[test]
    fn test_lane_commands_match_exactly() {
        assert_eq!(
            ProtocolCommand::parse("OPEN_3"),
            Ok(ProtocolCommand::Unknown("OPEN_3".to_string()))
        );
        assert_eq!(
            ProtocolCommand::parse("OPEN_12"),
            Ok(ProtocolCommand::Unknown("OPEN_12".to_string()))
        );
    }

    #[test]
    fn test_parse_message() {
        assert_eq!(
            ProtocolCommand::parse("MSG:HELLO|WORLD"),
            Ok(ProtocolCommand::Message { line1: "HELLO".to_string(), line2: "WORLD".to_string() })
        );
        // second line may itself contain '|'
        assert_eq!(
            ProtocolCommand::parse("MSG:A|B|C"),
            Ok(ProtocolCommand::Message { line1: "A".to_string(), line2: "B|C".to_string() })
        );
        assert_eq!(
            ProtocolCommand::parse("MSG:NOPIPE"),
            Err(ProtocolError::MissingDelimiter { command: "MSG", delimiter: '|' })
        );
        assert!(matches!(
            ProtocolCommand::parse("MSG:|x"),
            Err(ProtocolError::EmptyField { command: "MSG", .. })
        ));
    }

    #[test]
    fn test_parse_slots() {
        assert_eq!(ProtocolCommand::parse("SLOTS:3:7"), Ok(ProtocolCommand::SlotCount { car: 3, motor: 7 }));
        assert_eq!(
            ProtocolCommand::parse("SLOTS:badinput"),
            Err(ProtocolError::MissingDelimiter { command: "SLOTS", delimiter: ':' })
        );
        assert!(matches!(
            ProtocolCommand::parse("SLOTS:3:x"),
            Err(ProtocolError::BadInteger { command: "SLOTS", .. })
        ));
        assert!(ProtocolCommand::parse("SLOTS:-1:2").is_err());
        assert!(ProtocolCommand::parse("SLOTS:+1:2").is_err());
    }

    #[test]
    fn test_parse_info() {
        let cmd = ProtocolCommand::parse("INFO:29A-12345|CAR|A-05|NGUYEN VAN A");
        assert_eq!(
            cmd,
            Ok(ProtocolCommand::VehicleInfo(VehicleInfo {
                plate: "29A-12345".to_string(),
                vehicle_type: "CAR".to_string(),
                slot: "A-05".to_string(),
                owner: "NGUYEN VAN A".to_string(),
            }))
        );

        let partial = ProtocolCommand::parse("INFO:29A-12345|MOTO");
        match partial {
            Ok(ProtocolCommand::VehicleInfo(info)) => {
                assert_eq!(info.vehicle_type, "MOTO");
                assert!(info.slot.is_empty());
                assert!(info.owner.is_empty());
            }
            other => panic!("expected vehicle info, got {other:?}"),
        }

        let no_owner = ProtocolCommand::parse("INFO:29A-12345|CAR|A-05");
        match no_owner {
            Ok(ProtocolCommand::VehicleInfo(info)) => {
                assert_eq!(info.vehicle_type, "CAR");
                assert_eq!(info.slot, "A-05");
                assert!(info.owner.is_empty());
            }
            other => panic!("expected vehicle info, got {other:?}"),
        }

        assert!(ProtocolCommand::parse("INFO:29A-12345").is_err());
        assert!(ProtocolCommand::parse("INFO:|CAR").is_err());
    }

    #[test]
    fn test_parse_fee() {
        assert_eq!(ProtocolCommand::parse("FEE:50000"), Ok(ProtocolCommand::Fee(50000)));
        assert!(ProtocolCommand::parse("FEE:lots").is_err());
        assert!(ProtocolCommand::parse("FEE:").is_err());
    }

    #[test]
    fn test_unknown_line() {
        assert_eq!(ProtocolCommand::parse("PING"), Ok(ProtocolCommand::Unknown("PING".to_string())));
    }

    #[test]
    fn test_outbound_format() {
        let uid = Uid::parse("AB12CD34").unwrap();
        assert_eq!(Outbound::Card { uid, lane: LaneId::Entry }.to_string(), "CARD:AB12CD34:1");
        assert_eq!(Outbound::Checkout(LaneId::Exit).to_string(), "CHECKOUT:2");
        assert_eq!(Outbound::Closed(LaneId::Entry).to_string(), "CLOSED:1");
        assert_eq!(Outbound::Hello("HELLO".to_string()).to_string(), "HELLO");
    }

    #[test]
    fn test_outbound_parse() {
        assert_eq!(
            Outbound::parse("CARD:AB12CD34:2"),
            Some(Outbound::Card { uid: Uid::parse("AB12CD34").unwrap(), lane: LaneId::Exit })
        );
        assert_eq!(Outbound::parse("CLOSED:1"), Some(Outbound::Closed(LaneId::Entry)));
        assert_eq!(Outbound::parse("CHECKOUT:3"), None);
        assert!(matches!(Outbound::parse("HELLO_FROM_ESP32"), Some(Outbound::Hello(_))));
        assert_eq!(Outbound::parse("BOGUS"), None);
    }
}
