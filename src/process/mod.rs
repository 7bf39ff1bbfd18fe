//! Process-logic modules and their fixed execution order.
//!
//! Each module owns its persistent record and manipulates the process image
//! only through the tag store. The executive runs them once per scan, after
//! the state machine, in the declared order: BS&W monitor, flow
//! totalization, pressure, temperature, sampler, pump control, proving.
//!
//! A panicking module is caught here, attributed, and skipped for the scan
//! (its tags keep their previous values, exactly as a failed field read
//! would leave them); the rest of the scan continues.

pub mod bsw;
pub mod flow;
pub mod pressure;
pub mod proving;
pub mod pump;
pub mod sampler;
pub mod temperature;

use log::error;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::alarms::Annunciator;
use crate::fsm::OpState;
use crate::setpoints::Setpoints;
use crate::tags::TagStore;

use bsw::BswMonitor;
use flow::FlowTotalizer;
use pressure::PressureMonitor;
use proving::{ProveOutcome, ProvingSequencer};
use pump::PumpControl;
use sampler::Sampler;
use temperature::TemperatureMonitor;

// ---------------------------------------------------------------------------
// Hysteresis
// ---------------------------------------------------------------------------

/// Deadband latch for analog limit alarms: trips at the limit, releases
/// only once the value has retreated past the limit by the band.
#[derive(Debug, Default, Clone, Copy)]
pub struct Hysteresis {
    active: bool,
}

impl Hysteresis {
    /// High-limit compare: active while `value` has exceeded `limit` and
    /// not yet dropped below `limit - band`.
    pub fn update_above(&mut self, value: f32, limit: f32, band: f32) -> bool {
        if self.active {
            if value < limit - band {
                self.active = false;
            }
        } else if value > limit {
            self.active = true;
        }
        self.active
    }

    /// Low-limit compare: active while `value` has dropped under `limit`
    /// and not yet recovered above `limit + band`.
    pub fn update_below(&mut self, value: f32, limit: f32, band: f32) -> bool {
        if self.active {
            if value > limit + band {
                self.active = false;
            }
        } else if value < limit {
            self.active = true;
        }
        self.active
    }
}

// ---------------------------------------------------------------------------
// Module set
// ---------------------------------------------------------------------------

pub struct ProcessModules {
    pub bsw: BswMonitor,
    pub flow: FlowTotalizer,
    pub pressure: PressureMonitor,
    pub temperature: TemperatureMonitor,
    pub sampler: Sampler,
    pub pump: PumpControl,
    pub proving: ProvingSequencer,
}

impl ProcessModules {
    pub fn new() -> Self {
        Self {
            bsw: BswMonitor::new(),
            flow: FlowTotalizer::new(),
            pressure: PressureMonitor::new(),
            temperature: TemperatureMonitor::new(),
            sampler: Sampler::new(),
            pump: PumpControl::new(),
            proving: ProvingSequencer::new(),
        }
    }

    /// Run every module once, in the declared order.
    pub fn execute(
        &mut self,
        store: &TagStore,
        sp: &Setpoints,
        state: OpState,
        ann: &mut Annunciator,
        tick: u64,
    ) -> Option<ProveOutcome> {
        guarded("bsw", || self.bsw.scan(store));
        guarded("flow", || self.flow.scan(store, sp, state));
        guarded("pressure", || self.pressure.scan(store, sp, ann));
        guarded("temperature", || self.temperature.scan(store, sp, ann));
        let net_delta = self.flow.last_net_delta();
        guarded("sampler", || self.sampler.scan(store, sp, state, net_delta, tick));
        guarded("pump", || self.pump.scan(store, sp, state, ann, tick));
        guarded("proving", || self.proving.scan(store, sp, state, ann)).flatten()
    }
}

impl Default for ProcessModules {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one module, containing any panic to that module's scan.
fn guarded<T>(module: &'static str, f: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(v) => Some(v),
        Err(_) => {
            error!("process module '{module}' failed; skipped for this scan");
            None
        }
    }
}
