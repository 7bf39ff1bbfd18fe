//! Flow measurement and batch totalization.
//!
//! Each scan: read the free-running meter pulse counter, take the delta by
//! unsigned modular subtraction (counter wrap is ordinary arithmetic, never
//! a negative delta), convert to gross barrels through the meter K-factor,
//! and apply meter factor and CTL for net barrels.
//!
//! CTL uses the linear field approximation referenced to the configured
//! base temperature, clamped to [0.90, 1.10]; a clamped interval publishes
//! with quality Uncertain so the audit trail shows the correction was
//! pegged.
//!
//! Totals accumulate only while the unit is in a flowing state with the
//! pump proven running. Diverted flow goes to its own ledger — tank returns
//! are not custody product.

use serde::Serialize;

use crate::fsm::OpState;
use crate::setpoints::Setpoints;
use crate::tags::{Quality, TagId, TagStore, Value};

/// CTL clamp band. Outside this the correction is pegged and flagged.
const CTL_MIN: f64 = 0.90;
const CTL_MAX: f64 = 1.10;

// ---------------------------------------------------------------------------
// Batch records
// ---------------------------------------------------------------------------

/// Running totals for the open batch.
#[derive(Debug, Clone, Default)]
pub struct BatchTotals {
    pub start_tick: u64,
    pub gross_bbl: f64,
    pub net_bbl: f64,
    pub diverted_gross_bbl: f64,
    pub diverted_net_bbl: f64,
    /// Gross-weighted temperature sum for the batch average.
    temp_weighted_sum: f64,
    temp_weight: f64,
}

impl BatchTotals {
    fn avg_temp_deg_f(&self, fallback: f32) -> f32 {
        if self.temp_weight > 0.0 {
            (self.temp_weighted_sum / self.temp_weight) as f32
        } else {
            fallback
        }
    }
}

/// Frozen batch summary emitted on CLOSE_BATCH, consumed by the external
/// persistence collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub start_tick: u64,
    pub end_tick: u64,
    pub gross_bbl: f64,
    pub net_bbl: f64,
    pub diverted_gross_bbl: f64,
    pub diverted_net_bbl: f64,
    pub meter_factor: f32,
    pub avg_temp_deg_f: f32,
    pub sample_volume_ml: f32,
    pub sample_grabs: u64,
}

// ---------------------------------------------------------------------------
// Totalizer
// ---------------------------------------------------------------------------

pub struct FlowTotalizer {
    /// Pulse count at the previous scan; None until the first scan seeds it.
    last_pulses: Option<u64>,
    totals: BatchTotals,
    /// Net barrels added to the sales ledger this scan (sampler input).
    last_net_delta: f64,
}

impl FlowTotalizer {
    pub fn new() -> Self {
        Self {
            last_pulses: None,
            totals: BatchTotals::default(),
            last_net_delta: 0.0,
        }
    }

    pub fn scan(&mut self, store: &TagStore, sp: &Setpoints, state: OpState) {
        let raw = store.u64(TagId::PiMeterPulse);
        let delta = match self.last_pulses {
            Some(prev) => raw.wrapping_sub(prev),
            None => 0,
        };
        self.last_pulses = Some(raw);
        self.last_net_delta = 0.0;

        let gross = delta as f64 / f64::from(sp.meter_k_factor);

        // CTL referenced to the base temperature.
        let t_obs = f64::from(store.f32(TagId::AiMeterTemp));
        let mut ctl = 1.0
            - f64::from(sp.api_thermal_expansion_alpha) * (t_obs - f64::from(sp.temp_base_deg_f));
        let clamped = !(CTL_MIN..=CTL_MAX).contains(&ctl);
        if clamped {
            ctl = ctl.clamp(CTL_MIN, CTL_MAX);
        }
        let ctl_quality = if clamped { Quality::Uncertain } else { Quality::Good };
        let _ = store.write_with_quality(TagId::VCtl, Value::F32(ctl as f32), ctl_quality);

        let net = gross * f64::from(sp.meter_factor) * ctl;

        let flowing = matches!(state, OpState::Running | OpState::Divert | OpState::Proving)
            && store.bool(TagId::DiPumpRunning);
        if flowing && delta > 0 {
            if state == OpState::Divert {
                self.totals.diverted_gross_bbl += gross;
                self.totals.diverted_net_bbl += net;
            } else {
                self.totals.gross_bbl += gross;
                self.totals.net_bbl += net;
                self.last_net_delta = net;
            }
            self.totals.temp_weighted_sum += t_obs * gross;
            self.totals.temp_weight += gross;
        }

        // Publish rate and ledgers for the console and other modules.
        let bph = gross * 3_600_000.0 / f64::from(sp.scan_period_ms);
        store.set_f32(TagId::VFlowBph, bph as f32);
        store.set_f64(TagId::VGrossBbl, self.totals.gross_bbl);
        store.set_f64(TagId::VNetBbl, self.totals.net_bbl);
        store.set_f64(TagId::VDivertedGrossBbl, self.totals.diverted_gross_bbl);
        store.set_f64(TagId::VDivertedNetBbl, self.totals.diverted_net_bbl);
        store.set_f32(
            TagId::VAvgTempF,
            self.totals.avg_temp_deg_f(sp.temp_base_deg_f),
        );
    }

    /// Net barrels booked to the sales ledger on the most recent scan.
    pub fn last_net_delta(&self) -> f64 {
        self.last_net_delta
    }

    pub fn totals(&self) -> &BatchTotals {
        &self.totals
    }

    /// Freeze the open batch into a report and zero the ledgers. Called
    /// only from the operator CLOSE_BATCH path.
    pub fn close_batch(
        &mut self,
        store: &TagStore,
        sp: &Setpoints,
        tick: u64,
        sample_volume_ml: f32,
        sample_grabs: u64,
    ) -> BatchReport {
        let report = BatchReport {
            start_tick: self.totals.start_tick,
            end_tick: tick,
            gross_bbl: self.totals.gross_bbl,
            net_bbl: self.totals.net_bbl,
            diverted_gross_bbl: self.totals.diverted_gross_bbl,
            diverted_net_bbl: self.totals.diverted_net_bbl,
            meter_factor: sp.meter_factor,
            avg_temp_deg_f: self.totals.avg_temp_deg_f(sp.temp_base_deg_f),
            sample_volume_ml,
            sample_grabs,
        };
        self.totals = BatchTotals {
            start_tick: tick,
            ..BatchTotals::default()
        };
        store.set_f64(TagId::VGrossBbl, 0.0);
        store.set_f64(TagId::VNetBbl, 0.0);
        store.set_f64(TagId::VDivertedGrossBbl, 0.0);
        store.set_f64(TagId::VDivertedNetBbl, 0.0);
        report
    }
}

impl Default for FlowTotalizer {
    fn default() -> Self {
        Self::new()
    }
}
