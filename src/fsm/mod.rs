//! Function-pointer finite state machine for the top-level operating mode.
//!
//! Classic embedded FSM pattern: a fixed table of state descriptors, each
//! with optional `on_enter`/`on_exit` actions and a per-scan `on_update`
//! that may return the next state. All handlers receive `&mut ScanCtx`,
//! which carries the tag store, the setpoint snapshot, the annunciator,
//! this scan's safety requests, and the persistent state-machine variables.
//!
//! ```text
//!  IDLE ──START──▶ STARTUP ──gates──▶ RUNNING ◀──────▶ DIVERT
//!    ▲                │                 │  ▲               │
//!    │             [abort]           PROVE  └─[done/abort] │
//!    │                │                 ▼                  │
//!    │                │              PROVING               │
//!    │                ▼                 │                  │
//!    └────────── SHUTDOWN ◀────STOP/interlock─────────────┘
//!
//!  Any state ──E-Stop──▶ ESTOP ──estop clear + RESET──▶ IDLE
//! ```
//!
//! Unlike an open transition function, every transition — commanded or
//! safety-driven — is filtered through [`transition_allowed`]; an attempted
//! transition outside the table is rejected and the state is unchanged.

pub mod context;
pub mod states;

use context::ScanCtx;
use log::info;

use crate::commands::Command;
use crate::error::CommandError;
use crate::tags::TagId;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Top-level operating states.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpState {
    Idle = 0,
    Startup = 1,
    Running = 2,
    Divert = 3,
    Proving = 4,
    Shutdown = 5,
    EStop = 6,
}

impl OpState {
    /// Total number of states — used to size the table array.
    pub const COUNT: usize = 7;

    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Startup => "Startup",
            Self::Running => "Running",
            Self::Divert => "Divert",
            Self::Proving => "Proving",
            Self::Shutdown => "Shutdown",
            Self::EStop => "EStop",
        }
    }

    /// Convert a `u8` index back to `OpState`. Returns `EStop` on an
    /// out-of-range index in release builds (safe fallback).
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Idle,
            1 => Self::Startup,
            2 => Self::Running,
            3 => Self::Divert,
            4 => Self::Proving,
            5 => Self::Shutdown,
            6 => Self::EStop,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::EStop
            }
        }
    }
}

/// The legal transition relation. Everything not listed is rejected.
pub const fn transition_allowed(from: OpState, to: OpState) -> bool {
    use OpState::{Divert, EStop, Idle, Proving, Running, Shutdown, Startup};
    matches!(
        (from, to),
        (Idle, Startup)
            | (Startup, Running)
            | (Startup, Divert)
            | (Startup, Idle)
            | (Running, Divert)
            | (Divert, Running)
            | (Running, Proving)
            | (Proving, Running)
            | (Running, Shutdown)
            | (Divert, Shutdown)
            | (Shutdown, Idle)
            | (_, EStop)
            | (EStop, Idle)
    ) && (from as u8) != (to as u8)
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn = fn(&mut ScanCtx<'_>);

/// Signature for the per-scan update handler.
/// Returns `Some(next)` to request a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut ScanCtx<'_>) -> Option<OpState>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single state. Stored in a fixed-size array — no
/// heap, no `dyn`.
pub struct StateDescriptor {
    pub id: OpState,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    /// Fixed-size table indexed by `OpState as usize`.
    table: [StateDescriptor; OpState::COUNT],
    current: usize,
    tick_count: u64,
    state_entry_tick: u64,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; OpState::COUNT], initial: OpState) -> Self {
        Self {
            table,
            current: initial as usize,
            tick_count: 0,
            state_entry_tick: 0,
        }
    }

    /// Run the initial `on_enter` for the starting state. Call once before
    /// the first `tick()`.
    pub fn start(&mut self, ctx: &mut ScanCtx<'_>) {
        info!("state machine starting in {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
        self.publish_state(ctx);
    }

    /// Advance by one scan: run the current state's `on_update` and apply
    /// any legal transition it requests.
    pub fn tick(&mut self, ctx: &mut ScanCtx<'_>) {
        self.tick_count += 1;
        ctx.ticks_in_state = self.tick_count - self.state_entry_tick;

        if let Some(next) = (self.table[self.current].on_update)(ctx) {
            self.transition(next, ctx);
        }
    }

    /// Apply an operator command. Illegal commands leave the state
    /// unchanged and surface a typed error for the executive to annunciate.
    pub fn apply_command(
        &mut self,
        cmd: &Command,
        ctx: &mut ScanCtx<'_>,
    ) -> Result<(), CommandError> {
        let state = self.current_state();
        let target = match (cmd, state) {
            (Command::Start, OpState::Idle) => OpState::Startup,
            (Command::Stop, OpState::Running | OpState::Divert) => OpState::Shutdown,
            // STOP mid-startup is the operator abort path.
            (Command::Stop, OpState::Startup) => OpState::Idle,
            // STOP mid-prove aborts the prove; the unit keeps running.
            (Command::Stop, OpState::Proving) => {
                ctx.vars.prove_abort = true;
                return Ok(());
            }
            (Command::Prove, OpState::Running) if !ctx.req.divert => OpState::Proving,
            (Command::Reset, OpState::EStop) => {
                if ctx.req.estop {
                    // Field circuit is still tripped; reset is premature.
                    return Err(CommandError::IllegalInState {
                        cmd: cmd.name(),
                        state: state.name(),
                    });
                }
                OpState::Idle
            }
            // RESET outside EStop only services latched alarms; legal no-op.
            (Command::Reset, _) => return Ok(()),
            _ => {
                return Err(CommandError::IllegalInState {
                    cmd: cmd.name(),
                    state: state.name(),
                });
            }
        };
        if !transition_allowed(state, target) {
            return Err(CommandError::IllegalInState {
                cmd: cmd.name(),
                state: state.name(),
            });
        }
        self.transition(target, ctx);
        Ok(())
    }

    pub fn current_state(&self) -> OpState {
        OpState::from_index(self.current)
    }

    pub fn ticks_in_current_state(&self) -> u64 {
        self.tick_count - self.state_entry_tick
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: OpState, ctx: &mut ScanCtx<'_>) {
        let from = self.current_state();
        if !transition_allowed(from, next_id) {
            // Handlers only return table transitions; rejecting here keeps
            // the relation authoritative even if one regresses.
            log::error!(
                "rejected illegal transition {} -> {}",
                from.name(),
                next_id.name()
            );
            return;
        }

        let next_idx = next_id as usize;
        info!(
            "state transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        self.state_entry_tick = self.tick_count;
        ctx.ticks_in_state = 0;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
        self.publish_state(ctx);
    }

    fn publish_state(&self, ctx: &mut ScanCtx<'_>) {
        ctx.store.set_u64(TagId::VState, self.current as u64);
    }
}
