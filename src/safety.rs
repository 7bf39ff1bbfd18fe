//! Safety interlock monitor.
//!
//! Runs **every scan before the state machine** and evaluates a fixed,
//! ordered list of interlock checks against the tag store and the setpoint
//! snapshot. Each check carries its own scan-count debounce: the predicate
//! must hold continuously for the configured number of scans before its
//! alarm raises, and hold continuously false for the fall time before it
//! clears.
//!
//! The monitor demands at most one of {EStop, Shutdown, Divert} per scan —
//! the highest severity currently asserted; E-Stop dominates Shutdown
//! dominates Divert. The state machine consumes the request flags in the
//! same scan.
//!
//! Meter-temperature and outlet-pressure band supervision live with the
//! pressure/temperature process modules, which apply hysteresis on top of
//! the debounce; everything here is hard interlocking.

use log::warn;

use crate::alarms::{AlarmId, Annunciator, SafetyAction, Severity};
use crate::fsm::OpState;
use crate::setpoints::Setpoints;
use crate::tags::{Quality, TagId, TagStore};

// ---------------------------------------------------------------------------
// Debounce
// ---------------------------------------------------------------------------

/// Symmetric-or-asymmetric scan-count debounce. `update` returns the
/// debounced state; a rise/fall time of 0 or 1 acts on the first scan.
#[derive(Debug, Default, Clone, Copy)]
pub struct Debounce {
    rise_streak: u64,
    fall_streak: u64,
    active: bool,
}

impl Debounce {
    pub fn update(&mut self, cond: bool, rise_scans: u64, fall_scans: u64) -> bool {
        if cond {
            self.fall_streak = 0;
            if !self.active {
                self.rise_streak += 1;
                if self.rise_streak >= rise_scans.max(1) {
                    self.active = true;
                    self.rise_streak = 0;
                }
            }
        } else {
            self.rise_streak = 0;
            if self.active {
                self.fall_streak += 1;
                if self.fall_streak >= fall_scans.max(1) {
                    self.active = false;
                    self.fall_streak = 0;
                }
            }
        }
        self.active
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

// ---------------------------------------------------------------------------
// Safety monitor
// ---------------------------------------------------------------------------

pub struct SafetyMonitor {
    estop: Debounce,
    pump_overload: Debounce,
    inlet_valve: Debounce,
    outlet_valve: Debounce,
    inlet_press: Debounce,
    loop_press: Debounce,
    strainer: Debounce,
    bsw_probe: Debounce,
    bsw_high: Debounce,
    divert_travel: Debounce,
    pot_full: Debounce,
}

impl SafetyMonitor {
    pub fn new() -> Self {
        Self {
            estop: Debounce::default(),
            pump_overload: Debounce::default(),
            inlet_valve: Debounce::default(),
            outlet_valve: Debounce::default(),
            inlet_press: Debounce::default(),
            loop_press: Debounce::default(),
            strainer: Debounce::default(),
            bsw_probe: Debounce::default(),
            bsw_high: Debounce::default(),
            divert_travel: Debounce::default(),
            pot_full: Debounce::default(),
        }
    }

    /// Evaluate every interlock in order, raising or clearing alarms
    /// through the annunciator (which accumulates the request flags).
    pub fn evaluate(
        &mut self,
        store: &TagStore,
        sp: &Setpoints,
        state: OpState,
        ann: &mut Annunciator,
    ) {
        let in_flow_states = matches!(state, OpState::Startup | OpState::Running);

        // ── E-Stop ────────────────────────────────────────────
        // NC wiring: a de-energized (false) input is an asserted E-Stop,
        // so a broken wire trips exactly like the mushroom button.
        let estop_asserted = !store.bool(TagId::DiEstop);
        Self::apply(
            ann,
            self.estop.update(estop_asserted, 1, 1),
            AlarmId::EStop,
            Severity::Critical,
            SafetyAction::RequestEStop,
        );

        // ── Pump overload ─────────────────────────────────────
        Self::apply(
            ann,
            self.pump_overload.update(store.bool(TagId::DiPumpOverload), 1, 1),
            AlarmId::PumpOverload,
            Severity::Critical,
            SafetyAction::RequestShutdown,
        );

        // ── Block valves must be open while flowing ───────────
        Self::apply(
            ann,
            self.inlet_valve
                .update(in_flow_states && !store.bool(TagId::DiInletVlvOpen), 2, 2),
            AlarmId::InletValveNotOpen,
            Severity::Critical,
            SafetyAction::RequestShutdown,
        );
        Self::apply(
            ann,
            self.outlet_valve
                .update(in_flow_states && !store.bool(TagId::DiOutletVlvOpen), 2, 2),
            AlarmId::OutletValveNotOpen,
            Severity::Critical,
            SafetyAction::RequestShutdown,
        );

        // ── Pressures ─────────────────────────────────────────
        // Inlet head exists only while the unit is flowing; this check
        // carries the same Startup/Running qualifier as the valve rows.
        let inlet_low = in_flow_states
            && store.f32(TagId::AiInletPress) < sp.inlet_press_lo_psi;
        Self::apply(
            ann,
            self.inlet_press.update(inlet_low, 10, 10),
            AlarmId::InletPressLow,
            Severity::Critical,
            SafetyAction::RequestShutdown,
        );

        let loop_high = store.f32(TagId::AiLoopHiPress) > sp.loop_press_hi_psi;
        Self::apply(
            ann,
            self.loop_press.update(loop_high, 5, 5),
            AlarmId::LoopPressHigh,
            Severity::Critical,
            SafetyAction::RequestShutdown,
        );

        // ── Strainer differential ─────────────────────────────
        let strainer_hi = store.f32(TagId::AiStrainerDp) > sp.strainer_dp_hi_psi
            || store.bool(TagId::DiStrainerHiDp);
        Self::apply(
            ann,
            self.strainer.update(strainer_hi, 5, 5),
            AlarmId::StrainerDpHigh,
            Severity::Warn,
            SafetyAction::None,
        );

        // ── BS&W probe health ─────────────────────────────────
        // Out-of-range writes clamp with quality Uncertain, so any
        // non-Good quality means the probe cannot be trusted for custody
        // measurement: divert rather than ship bad oil.
        let probe_bad = store.read(TagId::AiBswProbe).quality != Quality::Good;
        Self::apply(
            ann,
            self.bsw_probe.update(probe_bad, 3, 3),
            AlarmId::BswProbeFault,
            Severity::Critical,
            SafetyAction::RequestDivert,
        );

        // ── BS&W content ──────────────────────────────────────
        let bsw_scans = sp.scans_for_secs(sp.bsw_debounce_sec);
        let bsw_over = store.f32(TagId::VBswPct) > sp.bsw_divert_pct;
        Self::apply(
            ann,
            self.bsw_high.update(bsw_over, bsw_scans, bsw_scans),
            AlarmId::BswHigh,
            Severity::Critical,
            SafetyAction::RequestDivert,
        );

        // ── Divert valve travel ───────────────────────────────
        let travel_scans = sp.scans_for_secs(sp.divert_travel_timeout_sec);
        let cmd_divert = store.bool(TagId::DoDivertCmd);
        let confirm = if cmd_divert {
            store.read(TagId::DiDivertDivert)
        } else {
            store.read(TagId::DiDivertSales)
        };
        // Before the first field scan there is no position feedback to
        // judge against.
        let mismatch = confirm.quality != Quality::NotConnected && !confirm.value.as_bool();
        if self.divert_travel.update(mismatch, travel_scans, 1) && !ann.is_active(AlarmId::DivertTravelFault) {
            warn!(
                "divert valve travel not confirmed within {}s (commanded {})",
                sp.divert_travel_timeout_sec,
                if cmd_divert { "DIVERT" } else { "SALES" }
            );
        }
        Self::apply(
            ann,
            self.divert_travel.is_active(),
            AlarmId::DivertTravelFault,
            Severity::Critical,
            SafetyAction::RequestShutdown,
        );

        // ── Sample pot level ──────────────────────────────────
        Self::apply(
            ann,
            self.pot_full.update(store.bool(TagId::DiSamplePotHi), 1, 1),
            AlarmId::SamplePotFull,
            Severity::Warn,
            SafetyAction::None,
        );
    }

    fn apply(
        ann: &mut Annunciator,
        active: bool,
        id: AlarmId,
        severity: Severity,
        action: SafetyAction,
    ) {
        if active {
            ann.raise(id, severity, action);
        } else {
            ann.clear(id);
        }
    }
}

impl Default for SafetyMonitor {
    fn default() -> Self {
        Self::new()
    }
}
