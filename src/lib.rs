//! LACT soft-PLC control core.
//!
//! The deterministic control engine for a Lease Automatic Custody Transfer
//! skid: a fixed-cadence scan executive, a typed tag-addressed process
//! image, a debounced safety-interlock monitor, the top-level operating
//! state machine, and the process modules (flow totalization with
//! temperature correction, BS&W divert, flow-proportional sampling, pump
//! protection, meter proving).
//!
//! The operator console, setpoint persistence, report storage and the
//! physical field transport are external collaborators behind the port
//! traits in [`ports`]; nothing in the core depends on a concrete one.

#![deny(unused_must_use)]

pub mod alarms;
pub mod commands;
pub mod controller;
pub mod events;
pub mod fsm;
pub mod ports;
pub mod process;
pub mod safety;
pub mod setpoints;
pub mod tags;

mod error;

pub use error::{CommandError, Error, IoError, Result, SetpointError, TagError};
