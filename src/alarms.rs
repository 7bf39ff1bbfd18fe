//! Alarm annunciator.
//!
//! Owns the alarm table and the horn/beacon annunciation predicates.
//! Raising is edge-triggered and idempotent: the first `raise` of an
//! inactive alarm logs and records the edge; repeat raises only refresh
//! `last_seen`. Critical alarms whose action is Shutdown or EStop latch —
//! `clear` marks the condition gone but the alarm stays active until an
//! explicit operator RESET.
//!
//! Raising a Critical alarm with a non-None action also sets the matching
//! request flag for the scan in progress; the state machine consumes those
//! flags in the same scan and they are cleared again at the next scan's
//! `begin_scan`.

use log::{error, info, warn};

// ---------------------------------------------------------------------------
// Identity, severity, action
// ---------------------------------------------------------------------------

/// Enumeration of every alarm the core can annunciate.
/// Must stay in sync with [`AlarmId::COUNT`] and [`AlarmId::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AlarmId {
    EStop = 0,
    PumpOverload,
    InletValveNotOpen,
    OutletValveNotOpen,
    InletPressLow,
    LoopPressHigh,
    StrainerDpHigh,
    BswProbeFault,
    BswHigh,
    DivertTravelFault,
    SamplePotFull,
    MeterTempRange,
    OutletPressRange,
    PumpStartLimit,
    PumpLockout,
    ProvingFailed,
    StartupFault,
    IllegalCommand,
}

impl AlarmId {
    pub const COUNT: usize = 18;

    pub const ALL: [AlarmId; AlarmId::COUNT] = [
        AlarmId::EStop,
        AlarmId::PumpOverload,
        AlarmId::InletValveNotOpen,
        AlarmId::OutletValveNotOpen,
        AlarmId::InletPressLow,
        AlarmId::LoopPressHigh,
        AlarmId::StrainerDpHigh,
        AlarmId::BswProbeFault,
        AlarmId::BswHigh,
        AlarmId::DivertTravelFault,
        AlarmId::SamplePotFull,
        AlarmId::MeterTempRange,
        AlarmId::OutletPressRange,
        AlarmId::PumpStartLimit,
        AlarmId::PumpLockout,
        AlarmId::ProvingFailed,
        AlarmId::StartupFault,
        AlarmId::IllegalCommand,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::EStop => "ESTOP",
            Self::PumpOverload => "PUMP_OVERLOAD",
            Self::InletValveNotOpen => "INLET_VLV_NOT_OPEN",
            Self::OutletValveNotOpen => "OUTLET_VLV_NOT_OPEN",
            Self::InletPressLow => "INLET_PRESS_LO",
            Self::LoopPressHigh => "LOOP_PRESS_HI",
            Self::StrainerDpHigh => "STRAINER_DP_HI",
            Self::BswProbeFault => "BSW_PROBE_FAULT",
            Self::BswHigh => "BSW_HIGH",
            Self::DivertTravelFault => "DIVERT_TRAVEL_FAULT",
            Self::SamplePotFull => "SAMPLE_POT_FULL",
            Self::MeterTempRange => "METER_TEMP_RANGE",
            Self::OutletPressRange => "OUTLET_PRESS_RANGE",
            Self::PumpStartLimit => "PUMP_START_LIMIT",
            Self::PumpLockout => "PUMP_LOCKOUT",
            Self::ProvingFailed => "PROVING_FAILED",
            Self::StartupFault => "STARTUP_FAULT",
            Self::IllegalCommand => "ILLEGAL_COMMAND",
        }
    }

    /// Transient annunciations auto-clear at the next scan instead of
    /// waiting for a condition edge (they have no persistent condition).
    pub const fn transient(self) -> bool {
        matches!(
            self,
            Self::IllegalCommand | Self::ProvingFailed | Self::StartupFault
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warn,
    Critical,
}

/// State-machine request attached to an alarm. Only Critical alarms with a
/// non-None action set request flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SafetyAction {
    #[default]
    None,
    RequestDivert,
    RequestShutdown,
    RequestEStop,
}

// ---------------------------------------------------------------------------
// Alarm record
// ---------------------------------------------------------------------------

/// One row of the alarm table.
#[derive(Debug, Clone, Copy)]
pub struct Alarm {
    pub id: AlarmId,
    pub severity: Severity,
    pub action: SafetyAction,
    pub active: bool,
    pub acked: bool,
    /// Condition has cleared but the alarm is latched awaiting RESET.
    pub latched: bool,
    pub first_seen_tick: u64,
    pub last_seen_tick: u64,
}

impl Alarm {
    const fn empty(id: AlarmId) -> Self {
        Self {
            id,
            severity: Severity::Info,
            action: SafetyAction::None,
            active: false,
            acked: false,
            latched: false,
            first_seen_tick: 0,
            last_seen_tick: 0,
        }
    }

    /// Latching rule: Critical with a Shutdown or EStop action holds until
    /// explicit reset.
    const fn latches(&self) -> bool {
        matches!(self.severity, Severity::Critical)
            && matches!(
                self.action,
                SafetyAction::RequestShutdown | SafetyAction::RequestEStop
            )
    }
}

// ---------------------------------------------------------------------------
// Safety request flags
// ---------------------------------------------------------------------------

/// The explicit request triple handed from the safety pass to the state
/// machine, cleared at the start of every scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SafetyRequests {
    pub estop: bool,
    pub shutdown: bool,
    pub divert: bool,
}

impl SafetyRequests {
    /// Reduce to the single highest-severity request:
    /// EStop dominates Shutdown dominates Divert.
    pub fn dominant(self) -> Self {
        if self.estop {
            Self { estop: true, shutdown: false, divert: false }
        } else if self.shutdown {
            Self { estop: false, shutdown: true, divert: false }
        } else {
            self
        }
    }

    pub fn any(self) -> bool {
        self.estop || self.shutdown || self.divert
    }
}

// ---------------------------------------------------------------------------
// Annunciator
// ---------------------------------------------------------------------------

/// Alarm raise/clear edge recorded during the current scan, reported to the
/// event sink by the executive.
#[derive(Debug, Clone, Copy)]
pub enum AlarmEdge {
    Raised(Alarm),
    Cleared(AlarmId),
}

pub struct Annunciator {
    table: [Alarm; AlarmId::COUNT],
    requests: SafetyRequests,
    edges: Vec<AlarmEdge>,
    tick: u64,
}

impl Annunciator {
    pub fn new() -> Self {
        let mut table = [Alarm::empty(AlarmId::EStop); AlarmId::COUNT];
        for id in AlarmId::ALL {
            table[id as usize] = Alarm::empty(id);
        }
        Self {
            table,
            requests: SafetyRequests::default(),
            edges: Vec::new(),
            tick: 0,
        }
    }

    /// Start-of-scan housekeeping: clear request flags and pending edges,
    /// expire transient annunciations.
    pub fn begin_scan(&mut self, tick: u64) {
        self.tick = tick;
        self.requests = SafetyRequests::default();
        self.edges.clear();
        for id in AlarmId::ALL {
            if id.transient() && self.table[id as usize].active {
                self.deactivate(id);
            }
        }
    }

    /// Raise (or refresh) an alarm. Idempotent on repeat raises; the
    /// request flag is asserted on every raise of an active Critical alarm
    /// so the state machine keeps seeing a standing demand.
    pub fn raise(&mut self, id: AlarmId, severity: Severity, action: SafetyAction) {
        let entry = &mut self.table[id as usize];
        entry.severity = severity;
        entry.action = action;
        entry.latched = false;
        entry.last_seen_tick = self.tick;

        if !entry.active {
            entry.active = true;
            entry.acked = false;
            entry.first_seen_tick = self.tick;
            let snapshot = *entry;
            self.edges.push(AlarmEdge::Raised(snapshot));
            match severity {
                Severity::Critical => error!("ALARM {}: raised", id.name()),
                Severity::Warn => warn!("ALARM {}: raised", id.name()),
                Severity::Info => info!("ALARM {}: raised", id.name()),
            }
        }

        if severity == Severity::Critical {
            match action {
                SafetyAction::RequestEStop => self.requests.estop = true,
                SafetyAction::RequestShutdown => self.requests.shutdown = true,
                SafetyAction::RequestDivert => self.requests.divert = true,
                SafetyAction::None => {}
            }
        }
    }

    /// Condition cleared. Latched alarms stay active (condition-gone noted)
    /// until RESET; everything else deactivates.
    pub fn clear(&mut self, id: AlarmId) {
        let entry = &mut self.table[id as usize];
        if !entry.active {
            return;
        }
        if entry.latches() {
            entry.latched = true;
            return;
        }
        self.deactivate(id);
    }

    /// Acknowledge one alarm (silences the horn for it).
    pub fn ack(&mut self, id: AlarmId) {
        self.table[id as usize].acked = true;
    }

    pub fn ack_all(&mut self) {
        for entry in &mut self.table {
            entry.acked = true;
        }
    }

    /// Operator RESET: release latched alarms whose condition is gone and
    /// acknowledge the rest.
    pub fn reset(&mut self) {
        info!("alarm reset requested");
        for id in AlarmId::ALL {
            let entry = self.table[id as usize];
            if entry.active && entry.latched {
                self.deactivate(id);
            } else if entry.active {
                self.table[id as usize].acked = true;
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn is_active(&self, id: AlarmId) -> bool {
        self.table[id as usize].active
    }

    pub fn list_active(&self) -> Vec<Alarm> {
        self.table.iter().filter(|a| a.active).copied().collect()
    }

    pub fn any_active(&self) -> bool {
        self.table.iter().any(|a| a.active)
    }

    /// Beacon runs while any unacknowledged alarm exists.
    pub fn beacon_demand(&self) -> bool {
        self.table.iter().any(|a| a.active && !a.acked)
    }

    /// Horn runs while any unacknowledged Critical alarm exists.
    pub fn horn_demand(&self) -> bool {
        self.table
            .iter()
            .any(|a| a.active && !a.acked && a.severity == Severity::Critical)
    }

    /// Request flags accumulated this scan.
    pub fn requests(&self) -> SafetyRequests {
        self.requests
    }

    /// Edges recorded this scan, for event emission.
    pub fn edges(&self) -> &[AlarmEdge] {
        &self.edges
    }

    // ── Internal ──────────────────────────────────────────────

    fn deactivate(&mut self, id: AlarmId) {
        let entry = &mut self.table[id as usize];
        entry.active = false;
        entry.latched = false;
        entry.last_seen_tick = self.tick;
        self.edges.push(AlarmEdge::Cleared(id));
        info!("ALARM {}: cleared", id.name());
    }
}

impl Default for Annunciator {
    fn default() -> Self {
        Self::new()
    }
}
