//! Tag store — the typed, named process image.
//!
//! One fixed-size slot array indexed by [`TagId`], shared between the scan
//! thread and the console thread behind a single `RwLock`. Per-tag reads and
//! writes are atomic (a read never observes a partially written value), and
//! `snapshot()` returns a consistent view of the whole image for
//! diagnostics.
//!
//! Timestamps are scan ticks, not wall-clock instants: stamping from the
//! executive's tick counter keeps replayed scan sequences bit-identical.

pub mod id;

pub use id::{TagDescriptor, TagId, TagKind};

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, TagError};

// ---------------------------------------------------------------------------
// Value and quality
// ---------------------------------------------------------------------------

/// Tagged value union. Discrete tags are `Bool`, analog tags `F32`, pulse
/// counters `U64`; `F64` is reserved for virtual accumulator tags where f32
/// would lose barrels over a long batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    F32(f32),
    U64(u64),
    F64(f64),
}

impl Value {
    /// True when `other` is the same variant.
    pub const fn same_kind(self, other: Value) -> bool {
        matches!(
            (self, other),
            (Value::Bool(_), Value::Bool(_))
                | (Value::F32(_), Value::F32(_))
                | (Value::U64(_), Value::U64(_))
                | (Value::F64(_), Value::F64(_))
        )
    }

    /// Extract a bool; falls back to `false` on a foreign variant.
    /// Kind-checked writes make the fallback unreachable for declared tags.
    pub fn as_bool(self) -> bool {
        match self {
            Value::Bool(b) => b,
            _ => {
                debug_assert!(false, "bool read on non-bool value");
                false
            }
        }
    }

    pub fn as_f32(self) -> f32 {
        match self {
            Value::F32(v) => v,
            _ => {
                debug_assert!(false, "f32 read on non-f32 value");
                0.0
            }
        }
    }

    pub fn as_u64(self) -> u64 {
        match self {
            Value::U64(v) => v,
            _ => {
                debug_assert!(false, "u64 read on non-u64 value");
                0
            }
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Value::F64(v) => v,
            _ => {
                debug_assert!(false, "f64 read on non-f64 value");
                0.0
            }
        }
    }
}

/// Data quality attached to every tag value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    #[default]
    Good,
    /// Value is usable but degraded (clamped write, stale source).
    Uncertain,
    /// Value must not be trusted (failed read, probe fault).
    Bad,
    /// No field scan has populated this tag yet.
    NotConnected,
}

/// One tag observation: value, quality, and the scan tick of last update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TagSample {
    pub value: Value,
    pub quality: Quality,
    pub tick: u64,
}

// ---------------------------------------------------------------------------
// Tag store
// ---------------------------------------------------------------------------

/// The process image. Declared in full at construction; every read or write
/// of an unknown name is a typed error, never a silent default.
pub struct TagStore {
    slots: RwLock<[TagSample; TagId::COUNT]>,
    /// Current scan tick, set by the executive at scan entry and used to
    /// stamp every write in that scan.
    now: AtomicU64,
}

impl TagStore {
    /// Build the store with every tag declared at its initial value.
    pub fn new() -> Self {
        let mut slots = [TagSample {
            value: Value::Bool(false),
            quality: Quality::NotConnected,
            tick: 0,
        }; TagId::COUNT];
        for tag in TagId::ALL {
            slots[tag.index()] = TagSample {
                value: tag.descriptor().init,
                quality: tag.initial_quality(),
                tick: 0,
            };
        }
        Self {
            slots: RwLock::new(slots),
            now: AtomicU64::new(0),
        }
    }

    /// Advance the stamp used for subsequent writes. Called once per scan.
    pub fn set_tick(&self, tick: u64) {
        self.now.store(tick, Ordering::Release);
    }

    pub fn tick(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }

    // ── Typed scan-path API ───────────────────────────────────

    /// Read one tag. Infallible for the static API: every `TagId` is
    /// declared by construction.
    pub fn read(&self, tag: TagId) -> TagSample {
        self.slots.read().expect("tag store poisoned")[tag.index()]
    }

    /// Write a value with quality Good.
    pub fn write(&self, tag: TagId, value: Value) -> Result<()> {
        self.write_with_quality(tag, value, Quality::Good)
    }

    /// Write a value with an explicit quality. Kind-checked against the
    /// declared slot; analog values outside the declared engineering range
    /// clamp and degrade the quality to Uncertain.
    pub fn write_with_quality(&self, tag: TagId, value: Value, quality: Quality) -> Result<()> {
        let desc = tag.descriptor();
        if !desc.init.same_kind(value) {
            return Err(TagError::KindMismatch { tag: desc.name }.into());
        }

        let (value, quality) = match (value, desc.span) {
            (Value::F32(v), Some((lo, hi))) if v < lo || v > hi => {
                (Value::F32(v.clamp(lo, hi)), Quality::Uncertain)
            }
            _ => (value, quality),
        };

        let tick = self.tick();
        let mut slots = self.slots.write().expect("tag store poisoned");
        slots[tag.index()] = TagSample { value, quality, tick };
        Ok(())
    }

    /// Degrade a tag's quality without touching its value (field faults).
    pub fn set_quality(&self, tag: TagId, quality: Quality) {
        let tick = self.tick();
        let mut slots = self.slots.write().expect("tag store poisoned");
        let slot = &mut slots[tag.index()];
        slot.quality = quality;
        slot.tick = tick;
    }

    /// Mark every tag of `kind` with the given quality. Used by the
    /// executive when an input or output scan fails wholesale.
    pub fn set_kind_quality(&self, kind: TagKind, quality: Quality) {
        let tick = self.tick();
        let mut slots = self.slots.write().expect("tag store poisoned");
        for tag in TagId::ALL {
            if tag.kind() == kind {
                let slot = &mut slots[tag.index()];
                slot.quality = quality;
                slot.tick = tick;
            }
        }
    }

    // ── Typed value shortcuts ─────────────────────────────────

    pub fn bool(&self, tag: TagId) -> bool {
        self.read(tag).value.as_bool()
    }

    pub fn f32(&self, tag: TagId) -> f32 {
        self.read(tag).value.as_f32()
    }

    pub fn u64(&self, tag: TagId) -> u64 {
        self.read(tag).value.as_u64()
    }

    pub fn f64(&self, tag: TagId) -> f64 {
        self.read(tag).value.as_f64()
    }

    pub fn set_bool(&self, tag: TagId, v: bool) {
        // Kind is static for discrete tags; the error path is unreachable.
        let _ = self.write(tag, Value::Bool(v));
    }

    pub fn set_f32(&self, tag: TagId, v: f32) {
        let _ = self.write(tag, Value::F32(v));
    }

    pub fn set_u64(&self, tag: TagId, v: u64) {
        let _ = self.write(tag, Value::U64(v));
    }

    pub fn set_f64(&self, tag: TagId, v: f64) {
        let _ = self.write(tag, Value::F64(v));
    }

    // ── Console/debug surface ─────────────────────────────────

    /// Read by string name. Console only; the scan path never resolves
    /// names.
    pub fn read_by_name(&self, name: &str) -> Result<TagSample> {
        let tag = TagId::from_name(name).ok_or_else(|| TagError::unknown(name))?;
        Ok(self.read(tag))
    }

    /// Write by string name, with the same kind/range contract as the
    /// typed API.
    pub fn write_by_name(&self, name: &str, value: Value) -> Result<()> {
        let tag = TagId::from_name(name).ok_or_else(|| TagError::unknown(name))?;
        self.write(tag, value)
    }

    /// Consistent copy of the whole image.
    pub fn snapshot(&self) -> [TagSample; TagId::COUNT] {
        *self.slots.read().expect("tag store poisoned")
    }

    /// All tags of one kind, with their current samples.
    pub fn iter(&self, kind: TagKind) -> Vec<(TagId, TagSample)> {
        let snap = self.snapshot();
        TagId::ALL
            .into_iter()
            .filter(|t| t.kind() == kind)
            .map(|t| (t, snap[t.index()]))
            .collect()
    }
}

impl Default for TagStore {
    fn default() -> Self {
        Self::new()
    }
}
