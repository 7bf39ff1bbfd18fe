//! Scripted field simulator and recording event sink.
//!
//! `MockIo` plays the part of the skid: actuators follow the commanded
//! outputs after a configurable travel delay, the meter accrues pulses
//! while the pump runs, and every test can bend the process (BS&W creep,
//! overload, E-Stop) by poking the public fields between scans.

use lactplc::controller::Controller;
use lactplc::events::ControlEvent;
use lactplc::ports::{EventSink, IoPort};
use lactplc::tags::{TagId, TagStore, Value};
use lactplc::{IoError, Result};

// ── Output frame (what the field saw) ─────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OutputFrame {
    pub pump_start: bool,
    pub divert_cmd: bool,
    pub sample_sol: bool,
    pub sample_mix: bool,
    pub prover_vlv: bool,
    pub beacon: bool,
    pub horn: bool,
    pub status_green: bool,
}

// ── MockIo ────────────────────────────────────────────────────

pub struct MockIo {
    // Process conditions a test can script.
    pub estop_healthy: bool,
    pub inlet_open: bool,
    pub outlet_open: bool,
    pub pump_overload: bool,
    pub pot_hi: bool,
    pub bsw_pct: f32,
    pub meter_temp_f: f32,
    pub inlet_psi: f32,
    pub loop_psi: f32,
    pub strainer_dp: f32,
    pub outlet_psi: f32,
    /// Meter pulses accrued per scan while the pump runs.
    pub pulses_per_scan: u64,
    /// Fail the next input scans with an I/O error.
    pub fail_reads: bool,

    // Field state.
    pulse_count: u64,
    pending_pulses: u64,
    pump_running: bool,
    divert_at_divert: bool,
    prover_open: bool,

    // Last commanded outputs (applied with a one-scan travel delay).
    cmd: OutputFrame,
    pub frames: Vec<OutputFrame>,
}

impl MockIo {
    pub fn new() -> Self {
        Self {
            estop_healthy: true,
            inlet_open: true,
            outlet_open: true,
            pump_overload: false,
            pot_hi: false,
            bsw_pct: 0.3,
            meter_temp_f: 60.0,
            inlet_psi: 40.0,
            loop_psi: 60.0,
            strainer_dp: 2.0,
            outlet_psi: 55.0,
            pulses_per_scan: 0,
            fail_reads: false,
            pulse_count: 0,
            pending_pulses: 0,
            pump_running: false,
            divert_at_divert: true,
            prover_open: false,
            cmd: OutputFrame::default(),
            frames: Vec::new(),
        }
    }

    /// Add meter pulses to be seen on the next input scan.
    pub fn inject_pulses(&mut self, n: u64) {
        self.pending_pulses += n;
    }

    pub fn last_frame(&self) -> OutputFrame {
        self.frames.last().copied().unwrap_or_default()
    }
}

impl Default for MockIo {
    fn default() -> Self {
        Self::new()
    }
}

impl IoPort for MockIo {
    fn read_inputs(&mut self, store: &TagStore) -> Result<()> {
        if self.fail_reads {
            return Err(IoError::ReadFailed("sim scripted fault").into());
        }

        // Actuators follow last scan's commands.
        self.pump_running = self.cmd.pump_start && !self.pump_overload;
        self.divert_at_divert = self.cmd.divert_cmd;
        self.prover_open = self.cmd.prover_vlv;

        // Meter turns while the pump runs; injected pulses land once.
        if self.pump_running {
            self.pulse_count = self.pulse_count.wrapping_add(self.pulses_per_scan);
        }
        self.pulse_count = self.pulse_count.wrapping_add(self.pending_pulses);
        self.pending_pulses = 0;

        store.set_bool(TagId::DiEstop, self.estop_healthy);
        store.set_bool(TagId::DiInletVlvOpen, self.inlet_open);
        store.set_bool(TagId::DiInletVlvClosed, !self.inlet_open);
        store.set_bool(TagId::DiOutletVlvOpen, self.outlet_open);
        store.set_bool(TagId::DiPumpRunning, self.pump_running);
        store.set_bool(TagId::DiPumpOverload, self.pump_overload);
        store.set_bool(TagId::DiDivertDivert, self.divert_at_divert);
        store.set_bool(TagId::DiDivertSales, !self.divert_at_divert);
        store.set_bool(TagId::DiSamplePotHi, self.pot_hi);
        store.set_bool(TagId::DiSamplePotLo, !self.pot_hi);
        store.set_bool(TagId::DiProverVlvOpen, self.prover_open);
        store.set_bool(TagId::DiAirElimFloat, true);
        store.set_bool(TagId::DiStrainerHiDp, false);

        store.write(TagId::AiBswProbe, Value::F32(self.bsw_pct))?;
        store.write(TagId::AiMeterTemp, Value::F32(self.meter_temp_f))?;
        store.write(TagId::AiTestThermo, Value::F32(self.meter_temp_f))?;
        store.write(TagId::AiInletPress, Value::F32(self.inlet_psi))?;
        store.write(TagId::AiLoopHiPress, Value::F32(self.loop_psi))?;
        store.write(TagId::AiStrainerDp, Value::F32(self.strainer_dp))?;
        store.write(TagId::AiOutletPress, Value::F32(self.outlet_psi))?;

        store.set_u64(TagId::PiMeterPulse, self.pulse_count);
        Ok(())
    }

    fn write_outputs(&mut self, store: &TagStore) -> Result<()> {
        self.cmd = OutputFrame {
            pump_start: store.bool(TagId::DoPumpStart),
            divert_cmd: store.bool(TagId::DoDivertCmd),
            sample_sol: store.bool(TagId::DoSampleSol),
            sample_mix: store.bool(TagId::DoSampleMixPump),
            prover_vlv: store.bool(TagId::DoProverVlvCmd),
            beacon: store.bool(TagId::DoAlarmBeacon),
            horn: store.bool(TagId::DoAlarmHorn),
            status_green: store.bool(TagId::DoStatusGreen),
        };
        self.frames.push(self.cmd);
        Ok(())
    }
}

// ── Recording event sink ──────────────────────────────────────

pub struct RecordingSink {
    pub events: Vec<ControlEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn alarm_raised(&self, id: lactplc::alarms::AlarmId) -> bool {
        self.events.iter().any(|e| {
            matches!(e, ControlEvent::AlarmRaised(a) if a.id == id)
        })
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &ControlEvent) {
        self.events.push(event.clone());
    }
}

// ── Drivers ───────────────────────────────────────────────────

pub fn scan_n(ctrl: &mut Controller, io: &mut MockIo, sink: &mut RecordingSink, n: usize) {
    for _ in 0..n {
        ctrl.scan(io, sink);
    }
}

/// Scan until the predicate holds, up to `limit` scans.
pub fn scan_until(
    ctrl: &mut Controller,
    io: &mut MockIo,
    sink: &mut RecordingSink,
    limit: usize,
    mut done: impl FnMut(&Controller) -> bool,
) -> bool {
    for _ in 0..limit {
        ctrl.scan(io, sink);
        if done(ctrl) {
            return true;
        }
    }
    false
}

/// Build a controller and walk it into Running on a healthy skid.
pub fn running_unit() -> (Controller, MockIo, RecordingSink) {
    let mut ctrl = Controller::new(lactplc::setpoints::Setpoints::default()).unwrap();
    let mut io = MockIo::new();
    let mut sink = RecordingSink::new();

    ctrl.handle().start().unwrap();
    let ok = scan_until(&mut ctrl, &mut io, &mut sink, 120, |c| {
        c.state() == lactplc::fsm::OpState::Running
    });
    assert!(ok, "unit failed to reach Running, state {:?}", ctrl.state());
    (ctrl, io, sink)
}
