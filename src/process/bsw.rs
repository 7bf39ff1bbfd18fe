//! BS&W monitor.
//!
//! Maintains a fixed-size ring of probe samples and publishes the rolling
//! mean as the effective BS&W. Raw samples outside the probe's 0–5 % range
//! (or carrying degraded quality) are rejected and the published quality
//! reflects it; the safety monitor's threshold check consumes the mean.

use crate::tags::{Quality, TagId, TagStore, Value};

/// Rolling window length. At the 100 ms default scan period this is six
/// seconds of probe history.
const BSW_WINDOW: usize = 60;

pub struct BswMonitor {
    ring: [f32; BSW_WINDOW],
    head: usize,
    count: usize,
}

impl BswMonitor {
    pub fn new() -> Self {
        Self {
            ring: [0.0; BSW_WINDOW],
            head: 0,
            count: 0,
        }
    }

    pub fn scan(&mut self, store: &TagStore) {
        let sample = store.read(TagId::AiBswProbe);
        let raw = sample.value.as_f32();
        let valid = sample.quality == Quality::Good && (0.0..=5.0).contains(&raw);

        if valid {
            self.ring[self.head] = raw;
            self.head = (self.head + 1) % BSW_WINDOW;
            if self.count < BSW_WINDOW {
                self.count += 1;
            }
        }

        let quality = if valid {
            Quality::Good
        } else if self.count > 0 {
            // Mean still usable, but built on stale history.
            Quality::Uncertain
        } else {
            Quality::Bad
        };
        let _ = store.write_with_quality(TagId::VBswPct, Value::F32(self.mean()), quality);
    }

    pub fn mean(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        let sum: f32 = self.ring[..self.count].iter().sum();
        sum / self.count as f32
    }
}

impl Default for BswMonitor {
    fn default() -> Self {
        Self::new()
    }
}
