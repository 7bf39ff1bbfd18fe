//! Operating setpoints.
//!
//! All tunable parameters for the LACT unit. The live copy is an immutable
//! snapshot behind [`SetpointBank`]: modules resolve `current()` once per
//! scan at scan entry, and the console's `apply()` validates and installs a
//! whole new snapshot, so a mid-scan view can never tear.
//!
//! Values can be overridden from the persisted setpoint file or the console
//! SET command; validation rejects (never clamps) out-of-domain values.

use std::sync::{Arc, RwLock};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SetpointError};

/// Core setpoint record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setpoints {
    // --- BS&W ---
    /// Rolling-mean BS&W (%) above which flow diverts to tank.
    pub bsw_divert_pct: f32,
    /// Seconds the rolling mean must hold above/below the threshold.
    pub bsw_debounce_sec: f32,
    /// Settling time after pump start before the BS&W gate is judged.
    pub bsw_stabilize_sec: f32,

    // --- Metering ---
    /// Meter calibration constant, pulses per barrel.
    pub meter_k_factor: f32,
    /// Multiplicative meter correction from the last accepted prove.
    pub meter_factor: f32,
    /// Thermal expansion coefficient per degF, set by crude API gravity.
    pub api_thermal_expansion_alpha: f32,
    /// CTL reference temperature (degF).
    pub temp_base_deg_f: f32,

    // --- Temperature band ---
    pub temp_lo_deg_f: f32,
    pub temp_hi_deg_f: f32,

    // --- Pressure limits ---
    /// Shutdown interlock: minimum inlet head while flowing.
    pub inlet_press_lo_psi: f32,
    /// Shutdown interlock: maximum loop pressure.
    pub loop_press_hi_psi: f32,
    /// Strainer differential warning threshold.
    pub strainer_dp_hi_psi: f32,
    /// Outlet-pressure annunciation band (warning only, no interlock).
    pub outlet_press_lo_psi: f32,
    pub outlet_press_hi_psi: f32,
    pub backpressure_sales_psi: f32,
    pub backpressure_divert_psi: f32,

    // --- Sampler ---
    /// Time-based grab interval, used when `sample_barrels_per_grab` is 0.
    pub sample_rate_sec: f32,
    /// Net barrels between grabs; 0 selects time-based sampling.
    pub sample_barrels_per_grab: f32,
    pub grab_duration_ms: u32,
    pub grab_volume_ml: f32,

    // --- Pump protection ---
    pub pump_max_starts_per_hour: u32,
    pub pump_lockout_sec: f32,
    pub pump_start_timeout_sec: f32,

    // --- Valves ---
    pub divert_travel_timeout_sec: f32,

    // --- Scan ---
    pub scan_period_ms: u32,

    // --- Proving ---
    pub prove_runs: u32,
    pub repeatability_tolerance: f32,
    pub prove_certified_barrels: f32,
}

impl Default for Setpoints {
    fn default() -> Self {
        Self {
            // BS&W
            bsw_divert_pct: 1.0,
            bsw_debounce_sec: 5.0,
            bsw_stabilize_sec: 2.0,

            // Metering
            meter_k_factor: 1000.0,
            meter_factor: 1.0,
            api_thermal_expansion_alpha: 0.00045,
            temp_base_deg_f: 60.0,

            // Temperature band
            temp_lo_deg_f: 20.0,
            temp_hi_deg_f: 120.0,

            // Pressure
            inlet_press_lo_psi: 5.0,
            loop_press_hi_psi: 285.0,
            strainer_dp_hi_psi: 15.0,
            outlet_press_lo_psi: 5.0,
            outlet_press_hi_psi: 285.0,
            backpressure_sales_psi: 50.0,
            backpressure_divert_psi: 50.0,

            // Sampler
            sample_rate_sec: 15.0,
            sample_barrels_per_grab: 0.0,
            grab_duration_ms: 500,
            grab_volume_ml: 1.5,

            // Pump
            pump_max_starts_per_hour: 6,
            pump_lockout_sec: 60.0,
            pump_start_timeout_sec: 10.0,

            // Valves
            divert_travel_timeout_sec: 5.0,

            // Scan
            scan_period_ms: 100,

            // Proving
            prove_runs: 5,
            repeatability_tolerance: 0.0005,
            prove_certified_barrels: 5.0,
        }
    }
}

/// Declared domain of one field, used by both whole-record validation and
/// single-field apply.
struct Domain {
    name: &'static str,
    lo: f64,
    hi: f64,
}

const DOMAINS: &[Domain] = &[
    Domain { name: "bsw_divert_pct", lo: 0.1, hi: 5.0 },
    Domain { name: "bsw_debounce_sec", lo: 0.0, hi: 60.0 },
    Domain { name: "bsw_stabilize_sec", lo: 0.0, hi: 300.0 },
    Domain { name: "meter_k_factor", lo: 1.0, hi: 10_000.0 },
    Domain { name: "meter_factor", lo: 0.98, hi: 1.02 },
    Domain { name: "api_thermal_expansion_alpha", lo: 0.0003, hi: 0.0006 },
    Domain { name: "temp_base_deg_f", lo: 50.0, hi: 70.0 },
    Domain { name: "temp_lo_deg_f", lo: -20.0, hi: 200.0 },
    Domain { name: "temp_hi_deg_f", lo: -20.0, hi: 200.0 },
    Domain { name: "inlet_press_lo_psi", lo: 0.0, hi: 300.0 },
    Domain { name: "loop_press_hi_psi", lo: 0.0, hi: 300.0 },
    Domain { name: "strainer_dp_hi_psi", lo: 0.0, hi: 50.0 },
    Domain { name: "outlet_press_lo_psi", lo: 0.0, hi: 300.0 },
    Domain { name: "outlet_press_hi_psi", lo: 0.0, hi: 300.0 },
    Domain { name: "backpressure_sales_psi", lo: 0.0, hi: 150.0 },
    Domain { name: "backpressure_divert_psi", lo: 0.0, hi: 150.0 },
    Domain { name: "sample_rate_sec", lo: 1.0, hi: 3600.0 },
    Domain { name: "sample_barrels_per_grab", lo: 0.0, hi: 1000.0 },
    Domain { name: "grab_duration_ms", lo: 50.0, hi: 5000.0 },
    Domain { name: "grab_volume_ml", lo: 0.1, hi: 100.0 },
    Domain { name: "pump_max_starts_per_hour", lo: 1.0, hi: 12.0 },
    Domain { name: "pump_lockout_sec", lo: 0.0, hi: 3600.0 },
    Domain { name: "pump_start_timeout_sec", lo: 1.0, hi: 120.0 },
    Domain { name: "divert_travel_timeout_sec", lo: 1.0, hi: 60.0 },
    Domain { name: "scan_period_ms", lo: 10.0, hi: 1000.0 },
    Domain { name: "prove_runs", lo: 1.0, hi: 10.0 },
    Domain { name: "repeatability_tolerance", lo: 0.0001, hi: 0.01 },
    Domain { name: "prove_certified_barrels", lo: 0.1, hi: 100.0 },
];

impl Setpoints {
    /// Current value of a field as f64 (integer fields widen).
    fn get(&self, name: &str) -> Option<f64> {
        let v = match name {
            "bsw_divert_pct" => f64::from(self.bsw_divert_pct),
            "bsw_debounce_sec" => f64::from(self.bsw_debounce_sec),
            "bsw_stabilize_sec" => f64::from(self.bsw_stabilize_sec),
            "meter_k_factor" => f64::from(self.meter_k_factor),
            "meter_factor" => f64::from(self.meter_factor),
            "api_thermal_expansion_alpha" => f64::from(self.api_thermal_expansion_alpha),
            "temp_base_deg_f" => f64::from(self.temp_base_deg_f),
            "temp_lo_deg_f" => f64::from(self.temp_lo_deg_f),
            "temp_hi_deg_f" => f64::from(self.temp_hi_deg_f),
            "inlet_press_lo_psi" => f64::from(self.inlet_press_lo_psi),
            "loop_press_hi_psi" => f64::from(self.loop_press_hi_psi),
            "strainer_dp_hi_psi" => f64::from(self.strainer_dp_hi_psi),
            "outlet_press_lo_psi" => f64::from(self.outlet_press_lo_psi),
            "outlet_press_hi_psi" => f64::from(self.outlet_press_hi_psi),
            "backpressure_sales_psi" => f64::from(self.backpressure_sales_psi),
            "backpressure_divert_psi" => f64::from(self.backpressure_divert_psi),
            "sample_rate_sec" => f64::from(self.sample_rate_sec),
            "sample_barrels_per_grab" => f64::from(self.sample_barrels_per_grab),
            "grab_duration_ms" => f64::from(self.grab_duration_ms),
            "grab_volume_ml" => f64::from(self.grab_volume_ml),
            "pump_max_starts_per_hour" => f64::from(self.pump_max_starts_per_hour),
            "pump_lockout_sec" => f64::from(self.pump_lockout_sec),
            "pump_start_timeout_sec" => f64::from(self.pump_start_timeout_sec),
            "divert_travel_timeout_sec" => f64::from(self.divert_travel_timeout_sec),
            "scan_period_ms" => f64::from(self.scan_period_ms),
            "prove_runs" => f64::from(self.prove_runs),
            "repeatability_tolerance" => f64::from(self.repeatability_tolerance),
            "prove_certified_barrels" => f64::from(self.prove_certified_barrels),
            _ => return None,
        };
        Some(v)
    }

    /// Set one field from an f64. Caller has already domain-checked.
    fn set(&mut self, name: &str, v: f64) {
        match name {
            "bsw_divert_pct" => self.bsw_divert_pct = v as f32,
            "bsw_debounce_sec" => self.bsw_debounce_sec = v as f32,
            "bsw_stabilize_sec" => self.bsw_stabilize_sec = v as f32,
            "meter_k_factor" => self.meter_k_factor = v as f32,
            "meter_factor" => self.meter_factor = v as f32,
            "api_thermal_expansion_alpha" => self.api_thermal_expansion_alpha = v as f32,
            "temp_base_deg_f" => self.temp_base_deg_f = v as f32,
            "temp_lo_deg_f" => self.temp_lo_deg_f = v as f32,
            "temp_hi_deg_f" => self.temp_hi_deg_f = v as f32,
            "inlet_press_lo_psi" => self.inlet_press_lo_psi = v as f32,
            "loop_press_hi_psi" => self.loop_press_hi_psi = v as f32,
            "strainer_dp_hi_psi" => self.strainer_dp_hi_psi = v as f32,
            "outlet_press_lo_psi" => self.outlet_press_lo_psi = v as f32,
            "outlet_press_hi_psi" => self.outlet_press_hi_psi = v as f32,
            "backpressure_sales_psi" => self.backpressure_sales_psi = v as f32,
            "backpressure_divert_psi" => self.backpressure_divert_psi = v as f32,
            "sample_rate_sec" => self.sample_rate_sec = v as f32,
            "sample_barrels_per_grab" => self.sample_barrels_per_grab = v as f32,
            "grab_duration_ms" => self.grab_duration_ms = v as u32,
            "grab_volume_ml" => self.grab_volume_ml = v as f32,
            "pump_max_starts_per_hour" => self.pump_max_starts_per_hour = v as u32,
            "pump_lockout_sec" => self.pump_lockout_sec = v as f32,
            "pump_start_timeout_sec" => self.pump_start_timeout_sec = v as f32,
            "divert_travel_timeout_sec" => self.divert_travel_timeout_sec = v as f32,
            "scan_period_ms" => self.scan_period_ms = v as u32,
            "prove_runs" => self.prove_runs = v as u32,
            "repeatability_tolerance" => self.repeatability_tolerance = v as f32,
            "prove_certified_barrels" => self.prove_certified_barrels = v as f32,
            _ => {}
        }
    }

    /// Check every field against its declared domain.
    pub fn validate(&self) -> Result<()> {
        for d in DOMAINS {
            let v = self.get(d.name).unwrap_or(f64::NAN);
            if !(d.lo..=d.hi).contains(&v) {
                return Err(SetpointError::OutOfDomain { field: d.name }.into());
            }
        }
        if self.temp_lo_deg_f >= self.temp_hi_deg_f {
            return Err(SetpointError::OutOfDomain { field: "temp_lo_deg_f" }.into());
        }
        if self.outlet_press_lo_psi >= self.outlet_press_hi_psi {
            return Err(SetpointError::OutOfDomain { field: "outlet_press_lo_psi" }.into());
        }
        Ok(())
    }

    /// Return a copy with `name` set to `value`, validated. The original is
    /// untouched on error.
    pub fn with_field(&self, name: &str, value: f64) -> Result<Setpoints> {
        let domain = DOMAINS
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| SetpointError::unknown(name))?;
        if !(domain.lo..=domain.hi).contains(&value) || !value.is_finite() {
            return Err(SetpointError::OutOfDomain { field: domain.name }.into());
        }
        let mut next = self.clone();
        next.set(name, value);
        next.validate()?;
        Ok(next)
    }

    // ── Scan-count conversions ────────────────────────────────

    /// Seconds expressed in whole scans at the configured period, at least
    /// one scan for any positive duration.
    pub fn scans_for_secs(&self, secs: f32) -> u64 {
        if secs <= 0.0 {
            return 0;
        }
        let scans = (secs * 1000.0 / self.scan_period_ms as f32).round() as u64;
        scans.max(1)
    }

    /// Milliseconds expressed in whole scans, at least one.
    pub fn scans_for_ms(&self, ms: u32) -> u64 {
        (u64::from(ms) / u64::from(self.scan_period_ms)).max(1)
    }
}

// ---------------------------------------------------------------------------
// Setpoint bank
// ---------------------------------------------------------------------------

/// Holder of the live snapshot. `current()` is cheap (Arc clone); `apply`
/// swaps in a fully validated replacement so readers always see a
/// consistent record.
pub struct SetpointBank {
    live: RwLock<Arc<Setpoints>>,
}

impl SetpointBank {
    /// Install an initial snapshot. Fails (startup aborts) on an invalid
    /// record, e.g. from a hand-edited setpoint file.
    pub fn new(initial: Setpoints) -> Result<Self> {
        initial.validate()?;
        Ok(Self {
            live: RwLock::new(Arc::new(initial)),
        })
    }

    /// The current immutable snapshot.
    pub fn current(&self) -> Arc<Setpoints> {
        Arc::clone(&self.live.read().expect("setpoint bank poisoned"))
    }

    /// Validate one field change and atomically install the new snapshot.
    pub fn apply(&self, name: &str, value: f64) -> Result<()> {
        let next = self.current().with_field(name, value)?;
        info!("setpoint {name} set to {value}");
        *self.live.write().expect("setpoint bank poisoned") = Arc::new(next);
        Ok(())
    }

    /// Replace the whole snapshot (accepted prove installs the new meter
    /// factor through this path).
    pub fn install(&self, next: Setpoints) -> Result<()> {
        next.validate()?;
        *self.live.write().expect("setpoint bank poisoned") = Arc::new(next);
        Ok(())
    }
}
