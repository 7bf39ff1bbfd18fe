//! Pressure monitoring and backpressure setpoint output.
//!
//! Reads the pressure AI tags each scan, drives the two backpressure
//! regulator setpoint outputs from the live setpoint snapshot, and keeps an
//! out-of-band warning on the outlet pressure against its own
//! `outlet_press_lo_psi`/`outlet_press_hi_psi` band, with a hysteresis
//! deadband of 2 % of span so a value riding a limit does not chatter the
//! alarm.
//!
//! The hard pressure interlocks (inlet low, loop high) belong to the safety
//! monitor and have their own setpoints; this module is operator
//! annunciation only.

use super::Hysteresis;
use crate::alarms::{AlarmId, Annunciator, SafetyAction, Severity};
use crate::safety::Debounce;
use crate::setpoints::Setpoints;
use crate::tags::{TagId, TagStore};

/// Outlet transmitter span (0–300 PSI) and its 2 % deadband.
const OUTLET_SPAN_PSI: f32 = 300.0;
const BAND_FRACTION: f32 = 0.02;

pub struct PressureMonitor {
    outlet_hi: Hysteresis,
    outlet_lo: Hysteresis,
    deb: Debounce,
}

impl PressureMonitor {
    pub fn new() -> Self {
        Self {
            outlet_hi: Hysteresis::default(),
            outlet_lo: Hysteresis::default(),
            deb: Debounce::default(),
        }
    }

    pub fn scan(&mut self, store: &TagStore, sp: &Setpoints, ann: &mut Annunciator) {
        // Backpressure regulator setpoints track the snapshot every scan so
        // a SET takes effect on the next output flush.
        store.set_f32(TagId::AoBpSalesSp, sp.backpressure_sales_psi);
        store.set_f32(TagId::AoBpDivertSp, sp.backpressure_divert_psi);

        let band = OUTLET_SPAN_PSI * BAND_FRACTION;
        let outlet = store.f32(TagId::AiOutletPress);
        let hi = self.outlet_hi.update_above(outlet, sp.outlet_press_hi_psi, band);
        let lo = self.outlet_lo.update_below(outlet, sp.outlet_press_lo_psi, band);

        if self.deb.update(hi || lo, 5, 5) {
            ann.raise(AlarmId::OutletPressRange, Severity::Warn, SafetyAction::None);
        } else {
            ann.clear(AlarmId::OutletPressRange);
        }
    }
}

impl Default for PressureMonitor {
    fn default() -> Self {
        Self::new()
    }
}
