//! Inbound operator commands.
//!
//! These represent actions requested by the console (or a supervising
//! process) that the scan executive dequeues and interprets at its defined
//! point in the cycle. The console never runs control logic on its own
//! thread; it only enqueues.

use crate::error::NAME_CAP;

/// Commands accepted by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Begin the startup sequence (Idle only).
    Start,
    /// Stop: Running/Divert shut down; Proving aborts back to Running.
    Stop,
    /// From Running: begin a prove. While Proving: the operator signal
    /// that the prover's certified volume has been displaced for the
    /// current run.
    Prove,
    /// Clear E-Stop (once the field condition is gone) and latched alarms.
    Reset,
    /// Validate and install one setpoint.
    Set {
        name: heapless::String<NAME_CAP>,
        value: f64,
    },
    /// Close the batch: freeze and emit the batch report, zero totals.
    CloseBatch,
    /// Report one tag (or the whole image) through the event sink.
    Query(Option<heapless::String<NAME_CAP>>),
    /// Report the active alarm list through the event sink.
    DumpAlarms,
}

impl Command {
    /// Short name used in logs and illegal-command alarms.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Stop => "STOP",
            Self::Prove => "PROVE",
            Self::Reset => "RESET",
            Self::Set { .. } => "SET",
            Self::CloseBatch => "CLOSE_BATCH",
            Self::Query(_) => "QUERY",
            Self::DumpAlarms => "DUMP",
        }
    }

    /// Build a SET command, truncating an oversized name (it will then fail
    /// lookup with a typed error rather than panic).
    pub fn set(name: &str, value: f64) -> Self {
        let mut n = heapless::String::new();
        let _ = n.push_str(&name[..name.len().min(NAME_CAP)]);
        Self::Set { name: n, value }
    }

    pub fn query(tag: Option<&str>) -> Self {
        Self::Query(tag.map(|t| {
            let mut n = heapless::String::new();
            let _ = n.push_str(&t[..t.len().min(NAME_CAP)]);
            n
        }))
    }
}
