//! Outbound controller events.
//!
//! The scan executive emits these through the [`EventSink`](crate::ports::EventSink)
//! port. Adapters on the other side decide what to do with them — print to
//! the console, append to the alarm journal, hand the batch report to the
//! persistence collaborator.

use crate::alarms::{Alarm, AlarmId};
use crate::commands::Command;
use crate::fsm::OpState;
use crate::process::flow::BatchReport;
use crate::process::proving::ProvingReport;
use crate::tags::{TagId, TagSample};

/// Structured events emitted by the control core.
#[derive(Debug, Clone)]
pub enum ControlEvent {
    /// The operating state machine transitioned.
    StateChanged { from: OpState, to: OpState },

    /// An alarm became active.
    AlarmRaised(Alarm),

    /// An alarm returned to inactive.
    AlarmCleared(AlarmId),

    /// A command was rejected (illegal in state, bad setpoint, unknown tag).
    CommandRejected { cmd: Command, reason: crate::error::Error },

    /// A scan exceeded the configured period.
    ScanOverrun { scan: u64, elapsed_ms: u64 },

    /// CLOSE_BATCH finalized the open batch.
    BatchClosed(BatchReport),

    /// A prove sequence finished (passed or failed; see the report).
    ProveFinished(ProvingReport),

    /// Answer to QUERY for a single tag.
    TagValue { tag: TagId, sample: TagSample },

    /// Answer to QUERY for the whole image.
    TagDump(Vec<(TagId, TagSample)>),

    /// Answer to DUMP: the active alarm list.
    AlarmDump(Vec<Alarm>),
}
