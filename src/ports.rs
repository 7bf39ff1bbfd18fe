//! Port traits — the boundary between the control core and the outside
//! world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Controller (domain)
//! ```
//!
//! Driven adapters (fieldbus client, hardware simulator, console event
//! consumers) implement these traits. The [`Controller`](crate::controller::Controller)
//! consumes them via generics, so the core never touches a transport
//! directly and no adapter appears in any of its invariants.

use crate::error::Result;
use crate::events::ControlEvent;
use crate::tags::TagStore;

/// Raw analog full-scale count (12-bit converters on both sides of the
/// register map).
pub const RAW_FULL_SCALE: u16 = 4095;

// ───────────────────────────────────────────────────────────────
// I/O port (field boundary)
// ───────────────────────────────────────────────────────────────

/// Field I/O boundary. Two collaborators satisfy this: a Modbus fieldbus
/// client and a hardware simulator. Implementations must bound each call
/// with their own per-call timeout; the scan thread does no other blocking.
pub trait IoPort {
    /// Populate every DI, AI and PI tag with current field values and
    /// quality.
    fn read_inputs(&mut self, store: &TagStore) -> Result<()>;

    /// Push every DO and AO tag to the field.
    fn write_outputs(&mut self, store: &TagStore) -> Result<()>;

    /// Deterministic linear scaling from raw converter counts to an
    /// engineering value.
    fn scale_analog(raw: u16, lo: f32, hi: f32) -> f32
    where
        Self: Sized,
    {
        let raw = raw.min(RAW_FULL_SCALE);
        lo + (hi - lo) * f32::from(raw) / f32::from(RAW_FULL_SCALE)
    }
}

// ───────────────────────────────────────────────────────────────
// Event sink port (domain → console / journal)
// ───────────────────────────────────────────────────────────────

/// The controller emits structured [`ControlEvent`]s through this port.
/// Adapters decide where they go (console, alarm journal, batch-report
/// writer).
pub trait EventSink {
    fn emit(&mut self, event: &ControlEvent);
}

/// Sink that drops everything. Useful for tests exercising only tag-level
/// behaviour.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: &ControlEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe;
    impl IoPort for Probe {
        fn read_inputs(&mut self, _store: &TagStore) -> Result<()> {
            Ok(())
        }
        fn write_outputs(&mut self, _store: &TagStore) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn analog_scaling_endpoints_and_midpoint() {
        assert_eq!(Probe::scale_analog(0, 0.0, 300.0), 0.0);
        assert_eq!(Probe::scale_analog(4095, 0.0, 300.0), 300.0);
        let mid = Probe::scale_analog(2048, 0.0, 300.0);
        assert!((mid - 150.0).abs() < 0.1);
    }

    #[test]
    fn analog_scaling_clamps_overrange_counts() {
        assert_eq!(Probe::scale_analog(u16::MAX, 0.0, 50.0), 50.0);
    }
}
