//! Charge pump control and motor protection.
//!
//! The state machine only expresses a demand; this module owns
//! DO_PUMP_START. Protection on top of the demand:
//!
//! - **Overload**: force off immediately and hold a lockout for the
//!   configured time; starts are denied during the lockout even if the
//!   operator asks.
//! - **Start-rate limit**: rising edges are counted in a sliding one-hour
//!   window; a start that would exceed the hourly budget is denied with an
//!   alarm so the motor gets its cooling time.

use heapless::Deque;
use log::warn;

use crate::alarms::{AlarmId, Annunciator, SafetyAction, Severity};
use crate::fsm::OpState;
use crate::setpoints::Setpoints;
use crate::tags::{TagId, TagStore};

/// Sliding start window length.
const START_WINDOW_SEC: f32 = 3600.0;
/// Capacity above the largest permitted starts-per-hour setting.
const START_LOG_CAP: usize = 16;

pub struct PumpControl {
    /// Ticks of recent rising edges, oldest first.
    starts: Deque<u64, START_LOG_CAP>,
    /// Tick at which an overload lockout expires; 0 = no lockout.
    lockout_until: u64,
    was_on: bool,
}

impl PumpControl {
    pub fn new() -> Self {
        Self {
            starts: Deque::new(),
            lockout_until: 0,
            was_on: false,
        }
    }

    pub fn scan(
        &mut self,
        store: &TagStore,
        sp: &Setpoints,
        state: OpState,
        ann: &mut Annunciator,
        tick: u64,
    ) {
        let overload = store.bool(TagId::DiPumpOverload);
        let demand = store.bool(TagId::VPumpDemand)
            && matches!(
                state,
                OpState::Startup | OpState::Running | OpState::Divert | OpState::Proving
            );

        if overload {
            // Lockout runs from the last scan the overload was present.
            self.lockout_until = tick + sp.scans_for_secs(sp.pump_lockout_sec);
            if self.was_on {
                warn!("pump overload: forced off, lockout {} s", sp.pump_lockout_sec);
            }
        }

        let locked_out = tick < self.lockout_until;
        if !locked_out {
            ann.clear(AlarmId::PumpLockout);
        }

        // Expire window entries older than one hour.
        let window = sp.scans_for_secs(START_WINDOW_SEC);
        while let Some(&oldest) = self.starts.front() {
            if tick.saturating_sub(oldest) >= window {
                let _ = self.starts.pop_front();
            } else {
                break;
            }
        }

        let mut run = false;
        let mut rate_denied = false;
        if demand && !overload && !locked_out {
            if self.was_on {
                run = true;
            } else if self.starts.len() >= sp.pump_max_starts_per_hour as usize {
                rate_denied = true;
            } else {
                let _ = self.starts.push_back(tick);
                run = true;
            }
        } else if demand && locked_out {
            ann.raise(AlarmId::PumpLockout, Severity::Info, SafetyAction::None);
        }

        if rate_denied {
            ann.raise(AlarmId::PumpStartLimit, Severity::Warn, SafetyAction::None);
        } else {
            ann.clear(AlarmId::PumpStartLimit);
        }

        store.set_bool(TagId::DoPumpStart, run);
        self.was_on = run;
    }

    pub fn starts_in_window(&self) -> usize {
        self.starts.len()
    }
}

impl Default for PumpControl {
    fn default() -> Self {
        Self::new()
    }
}
