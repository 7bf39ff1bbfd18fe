//! Meter temperature supervision.
//!
//! The meter RTD is read directly by the flow totalizer for CTL; this
//! module owns the operating-band warning: outside [temp_lo, temp_hi] for
//! ten consecutive scans raises the alarm, and each side releases through a
//! hysteresis deadband of 2 % of the transmitter span.

use super::Hysteresis;
use crate::alarms::{AlarmId, Annunciator, SafetyAction, Severity};
use crate::safety::Debounce;
use crate::setpoints::Setpoints;
use crate::tags::{TagId, TagStore};

/// RTD span (−20–200 °F) and its 2 % deadband.
const TEMP_SPAN_DEG_F: f32 = 220.0;
const BAND_FRACTION: f32 = 0.02;

pub struct TemperatureMonitor {
    hi: Hysteresis,
    lo: Hysteresis,
    deb: Debounce,
}

impl TemperatureMonitor {
    pub fn new() -> Self {
        Self {
            hi: Hysteresis::default(),
            lo: Hysteresis::default(),
            deb: Debounce::default(),
        }
    }

    pub fn scan(&mut self, store: &TagStore, sp: &Setpoints, ann: &mut Annunciator) {
        let band = TEMP_SPAN_DEG_F * BAND_FRACTION;
        let t = store.f32(TagId::AiMeterTemp);
        let out_hi = self.hi.update_above(t, sp.temp_hi_deg_f, band);
        let out_lo = self.lo.update_below(t, sp.temp_lo_deg_f, band);

        if self.deb.update(out_hi || out_lo, 10, 10) {
            ann.raise(AlarmId::MeterTempRange, Severity::Warn, SafetyAction::None);
        } else {
            ann.clear(AlarmId::MeterTempRange);
        }
    }
}

impl Default for TemperatureMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_alarm_raises_after_ten_scans_and_releases_past_deadband() {
        let store = TagStore::new();
        let sp = Setpoints::default(); // band 20..120 F
        let mut mon = TemperatureMonitor::new();
        let mut ann = Annunciator::new();

        store.set_f32(TagId::AiMeterTemp, 125.0);
        for tick in 1..=9 {
            ann.begin_scan(tick);
            mon.scan(&store, &sp, &mut ann);
        }
        assert!(!ann.is_active(AlarmId::MeterTempRange));
        ann.begin_scan(10);
        mon.scan(&store, &sp, &mut ann);
        assert!(ann.is_active(AlarmId::MeterTempRange));

        // 118 F is under the limit but inside the 4.4 F deadband.
        store.set_f32(TagId::AiMeterTemp, 118.0);
        for tick in 11..=40 {
            ann.begin_scan(tick);
            mon.scan(&store, &sp, &mut ann);
        }
        assert!(ann.is_active(AlarmId::MeterTempRange));

        store.set_f32(TagId::AiMeterTemp, 100.0);
        for tick in 41..=60 {
            ann.begin_scan(tick);
            mon.scan(&store, &sp, &mut ann);
        }
        assert!(!ann.is_active(AlarmId::MeterTempRange));
    }

    #[test]
    fn cold_side_trips_too() {
        let store = TagStore::new();
        let sp = Setpoints::default();
        let mut mon = TemperatureMonitor::new();
        let mut ann = Annunciator::new();

        store.set_f32(TagId::AiMeterTemp, 10.0);
        for tick in 1..=10 {
            ann.begin_scan(tick);
            mon.scan(&store, &sp, &mut ann);
        }
        assert!(ann.is_active(AlarmId::MeterTempRange));
    }
}
