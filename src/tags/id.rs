//! Static tag identity and descriptor table.
//!
//! Every tag in the process image is compiled into [`TagId`]; the string
//! names exist only for the console/debug surface. Modules address tags by
//! enum variant, so an unknown tag is unrepresentable inside the scan path —
//! the string lookup ([`TagId::from_name`]) is the one place a lookup can
//! fail.

use super::{Quality, Value};

// ---------------------------------------------------------------------------
// Tag kind
// ---------------------------------------------------------------------------

/// Semantic kind of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// Discrete (digital) input from the field.
    Di,
    /// Discrete (digital) output to the field.
    Do,
    /// Analog input, engineering units.
    Ai,
    /// Analog output, engineering units.
    Ao,
    /// Pulse counter input (free-running, may wrap).
    Pi,
    /// Controller-internal published value.
    Virtual,
}

// ---------------------------------------------------------------------------
// Tag identity
// ---------------------------------------------------------------------------

/// Enumeration of every tag in the process image.
/// Must stay in sync with [`TagId::descriptor`] and [`TagId::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TagId {
    // ── Discrete inputs ───────────────────────────────────────
    DiInletVlvOpen = 0,
    DiInletVlvClosed,
    DiStrainerHiDp,
    DiPumpRunning,
    DiPumpOverload,
    DiDivertSales,
    DiDivertDivert,
    DiSamplePotHi,
    DiSamplePotLo,
    DiProverVlvOpen,
    DiAirElimFloat,
    DiOutletVlvOpen,
    DiEstop,

    // ── Discrete outputs ──────────────────────────────────────
    DoPumpStart,
    /// false = SALES, true = DIVERT.
    DoDivertCmd,
    DoSampleSol,
    DoSampleMixPump,
    DoProverVlvCmd,
    DoAlarmBeacon,
    DoAlarmHorn,
    DoStatusGreen,

    // ── Analog inputs ─────────────────────────────────────────
    AiInletPress,
    AiLoopHiPress,
    AiStrainerDp,
    AiBswProbe,
    AiMeterTemp,
    AiTestThermo,
    AiOutletPress,

    // ── Pulse inputs ──────────────────────────────────────────
    PiMeterPulse,

    // ── Analog outputs ────────────────────────────────────────
    AoBpSalesSp,
    AoBpDivertSp,

    // ── Virtual (controller-published) ────────────────────────
    /// Current operating state as a numeric code.
    VState,
    /// Rolling-mean BS&W, percent.
    VBswPct,
    /// Instantaneous gross flow rate, bbl/h.
    VFlowBph,
    /// Last computed CTL factor.
    VCtl,
    VGrossBbl,
    VNetBbl,
    VDivertedGrossBbl,
    VDivertedNetBbl,
    /// Flow-weighted average observed temperature for the open batch.
    VAvgTempF,
    VSampleVolMl,
    VSampleGrabs,
    /// State machine's pump run request, consumed by pump control.
    VPumpDemand,
    /// Prove sequencer is mid-sequence.
    VProveActive,
    /// 1-based index of the prove run in progress.
    VProveRun,
}

/// Static attributes of one tag.
pub struct TagDescriptor {
    pub name: &'static str,
    pub kind: TagKind,
    /// Initial value (also fixes the slot's value variant).
    pub init: Value,
    /// Engineering range for analog tags; writes outside it clamp and
    /// degrade quality to Uncertain.
    pub span: Option<(f32, f32)>,
}

impl TagId {
    /// Total number of declared tags — used to size the store's slot array.
    pub const COUNT: usize = 45;

    /// Every declared tag, in declaration order.
    pub const ALL: [TagId; TagId::COUNT] = [
        TagId::DiInletVlvOpen,
        TagId::DiInletVlvClosed,
        TagId::DiStrainerHiDp,
        TagId::DiPumpRunning,
        TagId::DiPumpOverload,
        TagId::DiDivertSales,
        TagId::DiDivertDivert,
        TagId::DiSamplePotHi,
        TagId::DiSamplePotLo,
        TagId::DiProverVlvOpen,
        TagId::DiAirElimFloat,
        TagId::DiOutletVlvOpen,
        TagId::DiEstop,
        TagId::DoPumpStart,
        TagId::DoDivertCmd,
        TagId::DoSampleSol,
        TagId::DoSampleMixPump,
        TagId::DoProverVlvCmd,
        TagId::DoAlarmBeacon,
        TagId::DoAlarmHorn,
        TagId::DoStatusGreen,
        TagId::AiInletPress,
        TagId::AiLoopHiPress,
        TagId::AiStrainerDp,
        TagId::AiBswProbe,
        TagId::AiMeterTemp,
        TagId::AiTestThermo,
        TagId::AiOutletPress,
        TagId::PiMeterPulse,
        TagId::AoBpSalesSp,
        TagId::AoBpDivertSp,
        TagId::VState,
        TagId::VBswPct,
        TagId::VFlowBph,
        TagId::VCtl,
        TagId::VGrossBbl,
        TagId::VNetBbl,
        TagId::VDivertedGrossBbl,
        TagId::VDivertedNetBbl,
        TagId::VAvgTempF,
        TagId::VSampleVolMl,
        TagId::VSampleGrabs,
        TagId::VPumpDemand,
        TagId::VProveActive,
        TagId::VProveRun,
    ];

    /// Slot index backing this tag in the store.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Stable string name, console/debug surface only.
    pub const fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub const fn kind(self) -> TagKind {
        self.descriptor().kind
    }

    /// Resolve a console-supplied name. Linear scan — this path is never
    /// inside the scan cycle.
    pub fn from_name(name: &str) -> Option<TagId> {
        TagId::ALL.into_iter().find(|id| id.name() == name)
    }

    /// Static descriptor for this tag.
    pub const fn descriptor(self) -> TagDescriptor {
        use TagKind::{Do, Pi, Virtual};
        match self {
            Self::DiInletVlvOpen => di("DI_INLET_VLV_OPEN"),
            Self::DiInletVlvClosed => di("DI_INLET_VLV_CLOSED"),
            Self::DiStrainerHiDp => di("DI_STRAINER_HI_DP"),
            Self::DiPumpRunning => di("DI_PUMP_RUNNING"),
            Self::DiPumpOverload => di("DI_PUMP_OVERLOAD"),
            Self::DiDivertSales => di("DI_DIVERT_SALES"),
            Self::DiDivertDivert => di("DI_DIVERT_DIVERT"),
            Self::DiSamplePotHi => di("DI_SAMPLE_POT_HI"),
            Self::DiSamplePotLo => di("DI_SAMPLE_POT_LO"),
            Self::DiProverVlvOpen => di("DI_PROVER_VLV_OPEN"),
            Self::DiAirElimFloat => di("DI_AIR_ELIM_FLOAT"),
            Self::DiOutletVlvOpen => di("DI_OUTLET_VLV_OPEN"),
            Self::DiEstop => di("DI_ESTOP"),

            Self::DoPumpStart => disc("DO_PUMP_START", Do),
            Self::DoDivertCmd => disc("DO_DIVERT_CMD", Do),
            Self::DoSampleSol => disc("DO_SAMPLE_SOL", Do),
            Self::DoSampleMixPump => disc("DO_SAMPLE_MIX_PUMP", Do),
            Self::DoProverVlvCmd => disc("DO_PROVER_VLV_CMD", Do),
            Self::DoAlarmBeacon => disc("DO_ALARM_BEACON", Do),
            Self::DoAlarmHorn => disc("DO_ALARM_HORN", Do),
            Self::DoStatusGreen => disc("DO_STATUS_GREEN", Do),

            Self::AiInletPress => ai("AI_INLET_PRESS", 0.0, 300.0),
            Self::AiLoopHiPress => ai("AI_LOOP_HI_PRESS", 0.0, 300.0),
            Self::AiStrainerDp => ai("AI_STRAINER_DP", 0.0, 50.0),
            Self::AiBswProbe => ai("AI_BSW_PROBE", 0.0, 5.0),
            Self::AiMeterTemp => ai("AI_METER_TEMP", -20.0, 200.0),
            Self::AiTestThermo => ai("AI_TEST_THERMO", -20.0, 200.0),
            Self::AiOutletPress => ai("AI_OUTLET_PRESS", 0.0, 300.0),

            Self::PiMeterPulse => TagDescriptor {
                name: "PI_METER_PULSE",
                kind: Pi,
                init: Value::U64(0),
                span: None,
            },

            Self::AoBpSalesSp => ana_out("AO_BP_SALES_SP", 0.0, 150.0),
            Self::AoBpDivertSp => ana_out("AO_BP_DIVERT_SP", 0.0, 150.0),

            Self::VState => virt_u64("V_STATE"),
            Self::VBswPct => virt_f32("V_BSW_PCT"),
            Self::VFlowBph => virt_f32("V_FLOW_BPH"),
            Self::VCtl => TagDescriptor {
                name: "V_CTL",
                kind: Virtual,
                init: Value::F32(1.0),
                span: None,
            },
            Self::VGrossBbl => virt_f64("V_GROSS_BBL"),
            Self::VNetBbl => virt_f64("V_NET_BBL"),
            Self::VDivertedGrossBbl => virt_f64("V_DIVERTED_GROSS_BBL"),
            Self::VDivertedNetBbl => virt_f64("V_DIVERTED_NET_BBL"),
            Self::VAvgTempF => virt_f32("V_AVG_TEMP_F"),
            Self::VSampleVolMl => virt_f32("V_SAMPLE_VOL_ML"),
            Self::VSampleGrabs => virt_u64("V_SAMPLE_GRABS"),
            Self::VPumpDemand => TagDescriptor {
                name: "V_PUMP_DEMAND",
                kind: Virtual,
                init: Value::Bool(false),
                span: None,
            },
            Self::VProveActive => TagDescriptor {
                name: "V_PROVE_ACTIVE",
                kind: Virtual,
                init: Value::Bool(false),
                span: None,
            },
            Self::VProveRun => virt_u64("V_PROVE_RUN"),
        }
    }

    /// Initial quality for a tag of this kind. Field tags start
    /// NotConnected until the first input scan; internal tags start Good.
    pub const fn initial_quality(self) -> Quality {
        match self.kind() {
            TagKind::Di | TagKind::Ai | TagKind::Pi => Quality::NotConnected,
            TagKind::Do | TagKind::Ao | TagKind::Virtual => Quality::Good,
        }
    }
}

// ── Descriptor constructors ───────────────────────────────────

const fn di(name: &'static str) -> TagDescriptor {
    disc(name, TagKind::Di)
}

const fn disc(name: &'static str, kind: TagKind) -> TagDescriptor {
    TagDescriptor {
        name,
        kind,
        init: Value::Bool(false),
        span: None,
    }
}

const fn ai(name: &'static str, lo: f32, hi: f32) -> TagDescriptor {
    TagDescriptor {
        name,
        kind: TagKind::Ai,
        init: Value::F32(lo),
        span: Some((lo, hi)),
    }
}

const fn ana_out(name: &'static str, lo: f32, hi: f32) -> TagDescriptor {
    TagDescriptor {
        name,
        kind: TagKind::Ao,
        init: Value::F32(lo),
        span: Some((lo, hi)),
    }
}

const fn virt_f32(name: &'static str) -> TagDescriptor {
    TagDescriptor {
        name,
        kind: TagKind::Virtual,
        init: Value::F32(0.0),
        span: None,
    }
}

const fn virt_f64(name: &'static str) -> TagDescriptor {
    TagDescriptor {
        name,
        kind: TagKind::Virtual,
        init: Value::F64(0.0),
        span: None,
    }
}

const fn virt_u64(name: &'static str) -> TagDescriptor {
    TagDescriptor {
        name,
        kind: TagKind::Virtual,
        init: Value::U64(0),
        span: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_table_matches_count_and_indices() {
        assert_eq!(TagId::ALL.len(), TagId::COUNT);
        for (i, id) in TagId::ALL.into_iter().enumerate() {
            assert_eq!(id.index(), i, "{} out of order", id.name());
        }
    }

    #[test]
    fn names_are_unique() {
        for a in TagId::ALL {
            let hits = TagId::ALL.iter().filter(|b| b.name() == a.name()).count();
            assert_eq!(hits, 1, "duplicate name {}", a.name());
        }
    }

    #[test]
    fn from_name_round_trips() {
        for id in TagId::ALL {
            assert_eq!(TagId::from_name(id.name()), Some(id));
        }
        assert_eq!(TagId::from_name("NO_SUCH_TAG"), None);
    }

    #[test]
    fn analog_tags_declare_spans() {
        for id in TagId::ALL {
            let d = id.descriptor();
            match d.kind {
                TagKind::Ai | TagKind::Ao => assert!(d.span.is_some(), "{}", d.name),
                _ => {}
            }
        }
    }
}
