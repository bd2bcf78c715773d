//! Services - station control logic
//!
//! This module contains the core control services:
//! - `lane` - Per-lane access state machine
//! - `dispatcher` - Routes backend commands to lanes and shared status
//! - `station` - Control loop owning lanes, link, sensors and outputs

pub mod dispatcher;
pub mod lane;
pub mod station;

// Re-export commonly used types
pub use dispatcher::{Dispatcher, StationStatus};
pub use lane::{Action, Lane, LaneTimings};
pub use station::Station;
