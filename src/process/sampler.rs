//! Flow-proportional grab sampler.
//!
//! Accumulates net sales barrels since the last grab; when the accumulator
//! crosses the configured barrels-per-grab (or, with barrels-per-grab set
//! to zero, when the time interval elapses) the solenoid is energized for
//! the grab duration and the pot bookkeeping advances.
//!
//! Grabs happen only while the unit is Running with the sample pot not
//! full; proving and diverted flow are never sampled. The mixing pump runs
//! whenever the unit is Running so the pot contents stay representative.

use log::info;

use crate::fsm::OpState;
use crate::setpoints::Setpoints;
use crate::tags::{TagId, TagStore};

pub struct Sampler {
    /// Net sales barrels since the last grab.
    accum_bbl: f64,
    /// Scans remaining on the energized solenoid.
    grab_ticks_left: u64,
    /// Tick of the last grab (time-based mode); 0 = not yet armed.
    last_grab_tick: u64,
    grabs: u64,
    volume_ml: f32,
}

impl Sampler {
    pub fn new() -> Self {
        Self {
            accum_bbl: 0.0,
            grab_ticks_left: 0,
            last_grab_tick: 0,
            grabs: 0,
            volume_ml: 0.0,
        }
    }

    pub fn scan(
        &mut self,
        store: &TagStore,
        sp: &Setpoints,
        state: OpState,
        net_delta_bbl: f64,
        tick: u64,
    ) {
        let running = state == OpState::Running;
        let pot_full = store.bool(TagId::DiSamplePotHi);

        // Mixing pump tracks the Running state, nothing else.
        store.set_bool(TagId::DoSampleMixPump, running);

        if !running {
            self.grab_ticks_left = 0;
            self.last_grab_tick = 0;
            store.set_bool(TagId::DoSampleSol, false);
            return;
        }

        self.accum_bbl += net_delta_bbl;
        if self.last_grab_tick == 0 {
            // Arm the time-based interval from the first Running scan.
            self.last_grab_tick = tick;
        }

        let due = if sp.sample_barrels_per_grab > 0.0 {
            self.accum_bbl >= f64::from(sp.sample_barrels_per_grab)
        } else {
            tick.saturating_sub(self.last_grab_tick) >= sp.scans_for_secs(sp.sample_rate_sec)
        };

        if due && !pot_full && self.grab_ticks_left == 0 {
            self.grab_ticks_left = sp.scans_for_ms(sp.grab_duration_ms);
            self.grabs += 1;
            self.volume_ml += sp.grab_volume_ml;
            self.accum_bbl = 0.0;
            self.last_grab_tick = tick;
            store.set_u64(TagId::VSampleGrabs, self.grabs);
            store.set_f32(TagId::VSampleVolMl, self.volume_ml);
            info!("sampler: grab {} fired ({} mL total)", self.grabs, self.volume_ml);
        }

        let energize = self.grab_ticks_left > 0 && !pot_full;
        if energize {
            self.grab_ticks_left -= 1;
        }
        store.set_bool(TagId::DoSampleSol, energize);
    }

    /// Zero the pot bookkeeping on CLOSE_BATCH.
    pub fn reset_batch(&mut self, store: &TagStore) {
        self.accum_bbl = 0.0;
        self.grabs = 0;
        self.volume_ml = 0.0;
        self.last_grab_tick = 0;
        store.set_u64(TagId::VSampleGrabs, 0);
        store.set_f32(TagId::VSampleVolMl, 0.0);
    }

    pub fn grab_count(&self) -> u64 {
        self.grabs
    }

    pub fn volume_ml(&self) -> f32 {
        self.volume_ml
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}
