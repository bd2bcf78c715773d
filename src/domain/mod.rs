//! Domain models - core station types and the backend protocol
//!
//! This module contains the canonical data types used throughout the system:
//! - `types` - lane identity, lane state, credential UID, vehicle info
//! - `protocol` - inbound command parsing and outbound line formatting
//! - `debounce` - debounced presence signal and flicker monitor
//! - `cycle` - journal record for one barrier transaction

pub mod cycle;
pub mod debounce;
pub mod protocol;
pub mod types;
