//! Shared context threaded through every state handler.
//!
//! `ScanCtx` is rebuilt by the executive each scan from the pieces the
//! handlers are allowed to touch: the tag store (desired outputs are tag
//! writes), the setpoint snapshot resolved at scan entry, the annunciator,
//! and this scan's safety request flags. `FsmVars` is the persistent slice
//! of state-machine memory that survives between scans (startup sequencing,
//! prove-abort request).

use crate::alarms::{Annunciator, SafetyRequests};
use crate::setpoints::Setpoints;
use crate::tags::TagStore;

// ---------------------------------------------------------------------------
// Persistent state-machine variables
// ---------------------------------------------------------------------------

/// Where the scan-paced startup sequence currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartupPhase {
    /// Command the divert valve to DIVERT.
    #[default]
    CommandDivert,
    /// Wait for DIVERT position confirmation.
    AwaitDivert,
    /// Request the pump.
    StartPump,
    /// Wait for the pump-running contact.
    AwaitPump,
    /// Let the BS&W rolling mean settle on recirculated product.
    Stabilize,
    /// Command the divert valve to SALES.
    CommandSales,
    /// Wait for SALES position confirmation.
    AwaitSales,
}

/// State-machine memory that persists across scans.
#[derive(Debug, Default)]
pub struct FsmVars {
    pub startup: StartupPhase,
    /// Scans spent in the current startup phase.
    pub phase_ticks: u64,
    /// STOP was received while proving; abort at the next update.
    pub prove_abort: bool,
}

impl FsmVars {
    pub fn enter_startup(&mut self) {
        self.startup = StartupPhase::CommandDivert;
        self.phase_ticks = 0;
    }

    pub fn advance_phase(&mut self, next: StartupPhase) {
        self.startup = next;
        self.phase_ticks = 0;
    }
}

// ---------------------------------------------------------------------------
// ScanCtx
// ---------------------------------------------------------------------------

/// Everything a state handler may read or write during one scan.
pub struct ScanCtx<'a> {
    pub store: &'a TagStore,
    pub sp: &'a Setpoints,
    pub alarms: &'a mut Annunciator,
    /// This scan's safety demand, already reduced to the dominant request.
    pub req: SafetyRequests,
    pub vars: &'a mut FsmVars,
    /// Scans elapsed since the current state was entered (set by the
    /// engine before each update).
    pub ticks_in_state: u64,
}

impl ScanCtx<'_> {
    /// Seconds expressed in scans at the snapshot's period.
    pub fn scans(&self, secs: f32) -> u64 {
        self.sp.scans_for_secs(secs)
    }
}
