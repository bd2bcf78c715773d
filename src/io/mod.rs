//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `link` - TCP transport to the authorization backend
//! - `line_codec` - Newline framing for byte streams
//! - `device` - Barrier, buzzer and display outputs
//! - `presence` - Debounced break-beam inputs
//! - `reader` - Credential readers (serial RFID modules)
//! - `sim` - Simulated reader and presence inputs with a stdin console
//! - `journal` - Lane cycle output to file (JSONL format)
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod device;
pub mod journal;
pub mod line_codec;
pub mod link;
pub mod presence;
pub mod prometheus;
pub mod reader;
pub mod sim;

// Re-export commonly used types
pub use device::{Actuators, DeviceSink, LogActuators};
pub use link::{LinkSettings, TcpLink, Transport};
pub use presence::{PresenceInput, PresenceSensor};
pub use reader::{CredentialReader, SerialReader};
pub use sim::SimBench;
