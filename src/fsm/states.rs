//! Concrete state handlers and table builder.
//!
//! Each state is three plain `fn` pointers — no closures, no dynamic
//! dispatch, no heap. Handlers express desired outputs as tag writes; the
//! pump module, sampler and prove sequencer refine those demands later in
//! the same scan.
//!
//! Every update handler checks this scan's safety requests first, so a
//! request raised by the safety pass is honoured in the same scan it was
//! demanded.

use log::{info, warn};

use super::context::{ScanCtx, StartupPhase};
use super::{OpState, StateDescriptor};
use crate::alarms::{AlarmId, SafetyAction, Severity};
use crate::tags::TagId;

/// DO_DIVERT_CMD encoding: false routes to SALES, true back to tank.
pub const DIVERT: bool = true;
pub const SALES: bool = false;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table. Called once at startup.
pub fn build_state_table() -> [StateDescriptor; OpState::COUNT] {
    [
        // Index 0 — Idle
        StateDescriptor {
            id: OpState::Idle,
            name: "Idle",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_update: idle_update,
        },
        // Index 1 — Startup
        StateDescriptor {
            id: OpState::Startup,
            name: "Startup",
            on_enter: Some(startup_enter),
            on_exit: None,
            on_update: startup_update,
        },
        // Index 2 — Running
        StateDescriptor {
            id: OpState::Running,
            name: "Running",
            on_enter: Some(running_enter),
            on_exit: Some(running_exit),
            on_update: running_update,
        },
        // Index 3 — Divert
        StateDescriptor {
            id: OpState::Divert,
            name: "Divert",
            on_enter: Some(divert_enter),
            on_exit: None,
            on_update: divert_update,
        },
        // Index 4 — Proving
        StateDescriptor {
            id: OpState::Proving,
            name: "Proving",
            on_enter: Some(proving_enter),
            on_exit: Some(proving_exit),
            on_update: proving_update,
        },
        // Index 5 — Shutdown
        StateDescriptor {
            id: OpState::Shutdown,
            name: "Shutdown",
            on_enter: Some(shutdown_enter),
            on_exit: None,
            on_update: shutdown_update,
        },
        // Index 6 — EStop
        StateDescriptor {
            id: OpState::EStop,
            name: "EStop",
            on_enter: Some(estop_enter),
            on_exit: None,
            on_update: estop_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE state
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut ScanCtx<'_>) {
    safe_outputs(ctx);
    info!("IDLE: unit quiescent, divert to tank");
}

fn idle_update(ctx: &mut ScanCtx<'_>) -> Option<OpState> {
    if ctx.req.estop {
        return Some(OpState::EStop);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  STARTUP state — scan-paced sequence, never blocking
// ═══════════════════════════════════════════════════════════════════════════

fn startup_enter(ctx: &mut ScanCtx<'_>) {
    ctx.vars.enter_startup();
    ctx.store.set_bool(TagId::DoDivertCmd, DIVERT);
    ctx.store.set_bool(TagId::VPumpDemand, false);
    info!("STARTUP: sequence begun, commanding divert to tank");
}

fn startup_update(ctx: &mut ScanCtx<'_>) -> Option<OpState> {
    if ctx.req.estop {
        return Some(OpState::EStop);
    }
    if ctx.req.shutdown {
        return Some(startup_fail(ctx, "interlock tripped during startup"));
    }

    ctx.vars.phase_ticks += 1;
    let travel_scans = ctx.scans(ctx.sp.divert_travel_timeout_sec);

    match ctx.vars.startup {
        StartupPhase::CommandDivert => {
            ctx.store.set_bool(TagId::DoDivertCmd, DIVERT);
            ctx.vars.advance_phase(StartupPhase::AwaitDivert);
            None
        }
        StartupPhase::AwaitDivert => {
            if ctx.store.bool(TagId::DiDivertDivert) {
                ctx.vars.advance_phase(StartupPhase::StartPump);
                None
            } else if ctx.vars.phase_ticks > travel_scans {
                Some(startup_fail(ctx, "divert valve did not reach tank position"))
            } else {
                None
            }
        }
        StartupPhase::StartPump => {
            ctx.store.set_bool(TagId::VPumpDemand, true);
            ctx.vars.advance_phase(StartupPhase::AwaitPump);
            None
        }
        StartupPhase::AwaitPump => {
            if ctx.store.bool(TagId::DiPumpRunning) {
                info!("STARTUP: pump confirmed, stabilizing BS&W");
                ctx.vars.advance_phase(StartupPhase::Stabilize);
                None
            } else if ctx.vars.phase_ticks > ctx.scans(ctx.sp.pump_start_timeout_sec) {
                Some(startup_fail(ctx, "pump-running not confirmed"))
            } else {
                None
            }
        }
        StartupPhase::Stabilize => {
            if ctx.vars.phase_ticks < ctx.scans(ctx.sp.bsw_stabilize_sec) {
                None
            } else if ctx.store.f32(TagId::VBswPct) < ctx.sp.bsw_divert_pct {
                ctx.vars.advance_phase(StartupPhase::CommandSales);
                None
            } else {
                info!("STARTUP: BS&W above divert threshold, entering Divert");
                Some(OpState::Divert)
            }
        }
        StartupPhase::CommandSales => {
            ctx.store.set_bool(TagId::DoDivertCmd, SALES);
            ctx.vars.advance_phase(StartupPhase::AwaitSales);
            None
        }
        StartupPhase::AwaitSales => {
            if ctx.store.bool(TagId::DiDivertSales) {
                Some(OpState::Running)
            } else if ctx.vars.phase_ticks > travel_scans {
                Some(startup_fail(ctx, "divert valve did not reach sales position"))
            } else {
                None
            }
        }
    }
}

fn startup_fail(ctx: &mut ScanCtx<'_>, reason: &str) -> OpState {
    warn!("STARTUP: aborted — {reason}");
    ctx.alarms
        .raise(AlarmId::StartupFault, Severity::Warn, SafetyAction::None);
    OpState::Idle
}

// ═══════════════════════════════════════════════════════════════════════════
//  RUNNING state — custody transfer to the pipeline
// ═══════════════════════════════════════════════════════════════════════════

fn running_enter(ctx: &mut ScanCtx<'_>) {
    ctx.store.set_bool(TagId::DoDivertCmd, SALES);
    ctx.store.set_bool(TagId::VPumpDemand, true);
    ctx.store.set_bool(TagId::DoSampleMixPump, true);
    info!("RUNNING: delivering to sales");
}

fn running_exit(ctx: &mut ScanCtx<'_>) {
    ctx.store.set_bool(TagId::DoSampleMixPump, false);
}

fn running_update(ctx: &mut ScanCtx<'_>) -> Option<OpState> {
    if ctx.req.estop {
        return Some(OpState::EStop);
    }
    if ctx.req.shutdown {
        return Some(OpState::Shutdown);
    }
    if ctx.req.divert {
        return Some(OpState::Divert);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  DIVERT state — flow routed back to tank, pump stays up
// ═══════════════════════════════════════════════════════════════════════════

fn divert_enter(ctx: &mut ScanCtx<'_>) {
    ctx.store.set_bool(TagId::DoDivertCmd, DIVERT);
    info!("DIVERT: flow returned to tank");
}

fn divert_update(ctx: &mut ScanCtx<'_>) -> Option<OpState> {
    if ctx.req.estop {
        return Some(OpState::EStop);
    }
    if ctx.req.shutdown {
        return Some(OpState::Shutdown);
    }
    if !ctx.req.divert {
        info!("DIVERT: request cleared, resuming sales");
        return Some(OpState::Running);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  PROVING state — meter factor determination in progress
// ═══════════════════════════════════════════════════════════════════════════

fn proving_enter(ctx: &mut ScanCtx<'_>) {
    // The sequencer (a process module) keys off this flag and drives the
    // prover valve and run bookkeeping.
    ctx.store.set_bool(TagId::VProveActive, true);
    info!("PROVING: sequence requested");
}

fn proving_exit(ctx: &mut ScanCtx<'_>) {
    ctx.vars.prove_abort = false;
}

fn proving_update(ctx: &mut ScanCtx<'_>) -> Option<OpState> {
    if ctx.req.estop {
        return Some(OpState::EStop);
    }
    if ctx.vars.prove_abort {
        warn!("PROVING: aborted by operator");
        return Some(OpState::Running);
    }
    if ctx.req.shutdown {
        // Abort back to Running; the standing request shuts the unit down
        // on the next scan.
        warn!("PROVING: aborted by interlock");
        return Some(OpState::Running);
    }
    if !ctx.store.bool(TagId::VProveActive) {
        return Some(OpState::Running);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  SHUTDOWN state — controlled stop, wait for pump-stopped proof
// ═══════════════════════════════════════════════════════════════════════════

fn shutdown_enter(ctx: &mut ScanCtx<'_>) {
    safe_outputs(ctx);
    info!("SHUTDOWN: pump off, divert to tank, waiting for pump-stopped");
}

fn shutdown_update(ctx: &mut ScanCtx<'_>) -> Option<OpState> {
    if ctx.req.estop {
        return Some(OpState::EStop);
    }
    if !ctx.store.bool(TagId::DiPumpRunning) {
        return Some(OpState::Idle);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  ESTOP state — everything de-energized, divert to tank, annunciate
// ═══════════════════════════════════════════════════════════════════════════

fn estop_enter(ctx: &mut ScanCtx<'_>) {
    ctx.store.set_bool(TagId::DoPumpStart, false);
    ctx.store.set_bool(TagId::VPumpDemand, false);
    ctx.store.set_bool(TagId::DoSampleSol, false);
    ctx.store.set_bool(TagId::DoSampleMixPump, false);
    ctx.store.set_bool(TagId::DoProverVlvCmd, false);
    ctx.store.set_bool(TagId::DoDivertCmd, DIVERT);
    ctx.store.set_bool(TagId::DoAlarmBeacon, true);
    ctx.store.set_bool(TagId::DoAlarmHorn, true);
    warn!("ESTOP: all outputs de-energized");
}

fn estop_update(_ctx: &mut ScanCtx<'_>) -> Option<OpState> {
    // Exit only through an operator RESET once the field circuit is
    // re-energized; see Fsm::apply_command.
    None
}

// ── Shared ────────────────────────────────────────────────────

/// The quiescent output image used by Idle and Shutdown.
fn safe_outputs(ctx: &mut ScanCtx<'_>) {
    ctx.store.set_bool(TagId::VPumpDemand, false);
    ctx.store.set_bool(TagId::DoDivertCmd, DIVERT);
    ctx.store.set_bool(TagId::DoSampleSol, false);
    ctx.store.set_bool(TagId::DoSampleMixPump, false);
    ctx.store.set_bool(TagId::DoProverVlvCmd, false);
}
