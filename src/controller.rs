//! Scan executive.
//!
//! Owns the deterministic scan cycle. One scan, in fixed order:
//!
//! 1. advance the tick and resolve the setpoint snapshot
//! 2. drain the bounded command queue (at most [`COMMANDS_PER_SCAN`])
//! 3. `read_inputs` through the I/O port
//! 4. safety evaluation (raises alarms, accumulates request flags)
//! 5. state machine: pending commands, then this scan's safety requests
//! 6. process modules in declared order
//! 7. annunciation outputs (beacon, horn, status lamp)
//! 8. `write_outputs` through the I/O port
//! 9. (in [`Controller::run`]) sleep to the period deadline; an overrun
//!    skips the sleep and is reported, never compounded
//!
//! The console thread talks to the executive only through
//! [`ControllerHandle`]: a bounded channel for commands plus shared
//! read access to the tag store and setpoints. No control logic ever runs
//! on the calling thread.
//!
//! The scan body is the last line of defense: a panicking process module is
//! contained by the module layer; a panic in the safety monitor or state
//! machine drives the de-energized output image, flushes it, and halts the
//! loop.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{error, info, warn};

use crate::alarms::{AlarmEdge, AlarmId, Annunciator, SafetyAction, Severity};
use crate::commands::Command;
use crate::error::{CommandError, Error, Result};
use crate::events::ControlEvent;
use crate::fsm::context::{FsmVars, ScanCtx};
use crate::fsm::states::{DIVERT, build_state_table};
use crate::fsm::{Fsm, OpState};
use crate::ports::{EventSink, IoPort};
use crate::process::ProcessModules;
use crate::process::proving::ProveOutcome;
use crate::setpoints::{SetpointBank, Setpoints};
use crate::tags::{Quality, TagId, TagKind, TagStore};

/// Commands drained per scan; the rest stay queued for the next cycle.
pub const COMMANDS_PER_SCAN: usize = 8;
/// Bounded command queue depth shared by all handles.
pub const COMMAND_QUEUE_DEPTH: usize = 16;

type CommandQueue = Channel<CriticalSectionRawMutex, Command, COMMAND_QUEUE_DEPTH>;

// ---------------------------------------------------------------------------
// Scan statistics
// ---------------------------------------------------------------------------

/// O(1) per-scan timing statistics for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct ScanStats {
    pub scans: u64,
    pub last_us: u64,
    pub min_us: u64,
    pub max_us: u64,
    pub overruns: u64,
}

impl ScanStats {
    const fn new() -> Self {
        Self {
            scans: 0,
            last_us: 0,
            min_us: u64::MAX,
            max_us: 0,
            overruns: 0,
        }
    }

    fn record(&mut self, elapsed: Duration, overrun: bool) {
        let us = elapsed.as_micros() as u64;
        self.scans += 1;
        self.last_us = us;
        self.min_us = self.min_us.min(us);
        self.max_us = self.max_us.max(us);
        if overrun {
            self.overruns += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct Controller {
    store: Arc<TagStore>,
    bank: Arc<SetpointBank>,
    queue: Arc<CommandQueue>,
    ann: Annunciator,
    safety: crate::safety::SafetyMonitor,
    fsm: Fsm,
    vars: FsmVars,
    modules: ProcessModules,
    tick: u64,
    stats: ScanStats,
    halted: bool,
}

impl Controller {
    /// Build the executive. Fails (startup aborts) on an invalid initial
    /// setpoint record.
    pub fn new(initial: Setpoints) -> Result<Self> {
        let bank = Arc::new(SetpointBank::new(initial)?);
        let store = Arc::new(TagStore::new());
        let mut ann = Annunciator::new();
        let mut vars = FsmVars::default();
        let mut fsm = Fsm::new(build_state_table(), OpState::Idle);

        // Run the initial entry action so the output image is safe before
        // the first field write.
        let sp = bank.current();
        let mut ctx = ScanCtx {
            store: &store,
            sp: &sp,
            alarms: &mut ann,
            req: Default::default(),
            vars: &mut vars,
            ticks_in_state: 0,
        };
        fsm.start(&mut ctx);

        Ok(Self {
            store,
            bank,
            queue: Arc::new(Channel::new()),
            ann,
            safety: crate::safety::SafetyMonitor::new(),
            fsm,
            vars,
            modules: ProcessModules::new(),
            tick: 0,
            stats: ScanStats::new(),
            halted: false,
        })
    }

    /// Console-side handle. Cheap to clone; all handles feed the same
    /// bounded queue.
    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            queue: Arc::clone(&self.queue),
            store: Arc::clone(&self.store),
            bank: Arc::clone(&self.bank),
        }
    }

    pub fn state(&self) -> OpState {
        self.fsm.current_state()
    }

    pub fn scan_count(&self) -> u64 {
        self.tick
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// True once a fatal fault has stopped the executive.
    pub fn halted(&self) -> bool {
        self.halted
    }

    // ── One scan ──────────────────────────────────────────────

    /// Execute one full scan cycle. Deterministic: with identical inputs,
    /// commands and tick sequence, the resulting tag image is identical.
    pub fn scan(&mut self, io: &mut impl IoPort, sink: &mut impl EventSink) {
        if self.halted {
            return;
        }

        // 1. New tick, consistent setpoint snapshot for the whole scan.
        self.tick += 1;
        self.store.set_tick(self.tick);
        let sp = self.bank.current();

        // 2. Bounded command drain.
        let mut cmds: heapless::Vec<Command, COMMANDS_PER_SCAN> = heapless::Vec::new();
        while cmds.len() < COMMANDS_PER_SCAN {
            match self.queue.try_receive() {
                Ok(cmd) => {
                    let _ = cmds.push(cmd);
                }
                Err(_) => break,
            }
        }

        // 3. Field inputs. A failed input scan degrades every field input
        // to Bad and the cycle continues; the probe-health interlocks take
        // it from there.
        if let Err(e) = io.read_inputs(&self.store) {
            error!("input scan failed: {e}");
            self.store.set_kind_quality(TagKind::Di, Quality::Bad);
            self.store.set_kind_quality(TagKind::Ai, Quality::Bad);
            self.store.set_kind_quality(TagKind::Pi, Quality::Bad);
        }

        // 4..7. The compute section. A panic here (safety or state
        // machine) is unrecoverable: de-energize, flush, halt.
        let body = catch_unwind(AssertUnwindSafe(|| self.compute(&sp, &cmds, sink)));
        if body.is_err() {
            error!("scan compute failed; forcing E-Stop outputs and halting");
            self.force_safe_outputs();
            let _ = io.write_outputs(&self.store);
            self.halted = true;
            return;
        }

        // 8. Field outputs.
        if let Err(e) = io.write_outputs(&self.store) {
            error!("output flush failed: {e}");
        }
    }

    /// Steps 4–7 of the cycle (see module doc).
    fn compute(&mut self, sp: &Setpoints, cmds: &[Command], sink: &mut impl EventSink) {
        let prev_state = self.fsm.current_state();

        // 4. Safety pass.
        self.ann.begin_scan(self.tick);
        self.safety.evaluate(&self.store, sp, prev_state, &mut self.ann);
        let req = self.ann.requests().dominant();

        {
            let mut ctx = ScanCtx {
                store: &self.store,
                sp,
                alarms: &mut self.ann,
                req,
                vars: &mut self.vars,
                ticks_in_state: self.fsm.ticks_in_current_state(),
            };

            // 5a. Operator commands, in arrival order. Safety requests are
            // applied after, so they win within the same scan.
            for cmd in cmds {
                match cmd {
                    Command::Prove if self.fsm.current_state() == OpState::Proving => {
                        self.modules.proving.signal_run_complete();
                    }
                    Command::Start | Command::Stop | Command::Prove | Command::Reset => {
                        if matches!(cmd, Command::Reset) {
                            ctx.alarms.reset();
                        }
                        if let Err(e) = self.fsm.apply_command(cmd, &mut ctx) {
                            warn!("command rejected: {e}");
                            ctx.alarms.raise(
                                AlarmId::IllegalCommand,
                                Severity::Info,
                                SafetyAction::None,
                            );
                            sink.emit(&ControlEvent::CommandRejected {
                                cmd: cmd.clone(),
                                reason: Error::Command(e),
                            });
                        }
                    }
                    Command::Set { name, value } => {
                        if let Err(e) = self.bank.apply(name, *value) {
                            warn!("SET rejected: {e}");
                            sink.emit(&ControlEvent::CommandRejected {
                                cmd: cmd.clone(),
                                reason: e,
                            });
                        }
                    }
                    Command::CloseBatch => {
                        let report = self.modules.flow.close_batch(
                            &self.store,
                            sp,
                            self.tick,
                            self.modules.sampler.volume_ml(),
                            self.modules.sampler.grab_count(),
                        );
                        self.modules.sampler.reset_batch(&self.store);
                        info!(
                            "batch closed: {:.3} bbl gross / {:.3} bbl net",
                            report.gross_bbl, report.net_bbl
                        );
                        sink.emit(&ControlEvent::BatchClosed(report));
                    }
                    Command::Query(which) => match which {
                        Some(name) => match self.store.read_by_name(name) {
                            Ok(sample) => {
                                // from_name succeeded inside read_by_name.
                                if let Some(tag) = TagId::from_name(name) {
                                    sink.emit(&ControlEvent::TagValue { tag, sample });
                                }
                            }
                            Err(e) => sink.emit(&ControlEvent::CommandRejected {
                                cmd: cmd.clone(),
                                reason: e,
                            }),
                        },
                        None => {
                            let snap = self.store.snapshot();
                            let dump = TagId::ALL
                                .into_iter()
                                .map(|t| (t, snap[t.index()]))
                                .collect();
                            sink.emit(&ControlEvent::TagDump(dump));
                        }
                    },
                    Command::DumpAlarms => {
                        sink.emit(&ControlEvent::AlarmDump(ctx.alarms.list_active()));
                    }
                }
            }

            // 5b. Per-scan state action plus any safety-demanded
            // transition.
            self.fsm.tick(&mut ctx);
        }

        // 6. Process modules, declared order.
        let state = self.fsm.current_state();
        let outcome = self
            .modules
            .execute(&self.store, sp, state, &mut self.ann, self.tick);
        if let Some(outcome) = outcome {
            self.finish_prove(outcome, sink);
        }

        // 7. Annunciation outputs.
        self.store
            .set_bool(TagId::DoAlarmBeacon, self.ann.beacon_demand());
        self.store.set_bool(TagId::DoAlarmHorn, self.ann.horn_demand());
        self.store.set_bool(
            TagId::DoStatusGreen,
            state == OpState::Running && !self.ann.any_active(),
        );

        // Event reporting.
        for edge in self.ann.edges() {
            match edge {
                AlarmEdge::Raised(alarm) => sink.emit(&ControlEvent::AlarmRaised(*alarm)),
                AlarmEdge::Cleared(id) => sink.emit(&ControlEvent::AlarmCleared(*id)),
            }
        }
        let new_state = self.fsm.current_state();
        if new_state != prev_state {
            sink.emit(&ControlEvent::StateChanged {
                from: prev_state,
                to: new_state,
            });
        }
    }

    fn finish_prove(&mut self, outcome: ProveOutcome, sink: &mut impl EventSink) {
        match outcome {
            ProveOutcome::Passed(report) => {
                if let Some(mf) = report.meter_factor {
                    match self.bank.apply("meter_factor", mf) {
                        Ok(()) => info!("meter factor {mf:.5} installed"),
                        Err(e) => {
                            // Factor outside the custody domain: treat as a
                            // failed prove rather than install it.
                            warn!("prove factor rejected: {e}");
                            self.ann.raise(
                                AlarmId::ProvingFailed,
                                Severity::Warn,
                                SafetyAction::None,
                            );
                        }
                    }
                }
                sink.emit(&ControlEvent::ProveFinished(report));
            }
            ProveOutcome::Failed(report) => {
                sink.emit(&ControlEvent::ProveFinished(report));
            }
        }
    }

    /// The de-energized output image used when the compute section is no
    /// longer trustworthy.
    fn force_safe_outputs(&self) {
        self.store.set_bool(TagId::DoPumpStart, false);
        self.store.set_bool(TagId::VPumpDemand, false);
        self.store.set_bool(TagId::DoSampleSol, false);
        self.store.set_bool(TagId::DoSampleMixPump, false);
        self.store.set_bool(TagId::DoProverVlvCmd, false);
        self.store.set_bool(TagId::DoDivertCmd, DIVERT);
        self.store.set_bool(TagId::DoAlarmBeacon, true);
        self.store.set_bool(TagId::DoAlarmHorn, true);
        self.store.set_u64(TagId::VState, OpState::EStop as u64);
    }

    // ── Scan loop ─────────────────────────────────────────────

    /// Run scans at the configured cadence until `shutdown` is set or a
    /// fatal fault halts the executive. On shutdown the in-flight scan
    /// finishes, the quiescent output image is driven and flushed once,
    /// and the loop exits.
    pub fn run(
        &mut self,
        io: &mut impl IoPort,
        sink: &mut impl EventSink,
        shutdown: &AtomicBool,
    ) {
        info!("scan loop starting ({} ms period)", self.bank.current().scan_period_ms);
        while !self.halted {
            let period = Duration::from_millis(u64::from(self.bank.current().scan_period_ms));
            let t0 = Instant::now();

            self.scan(io, sink);

            if shutdown.load(Ordering::Acquire) {
                info!("shutdown requested: driving quiescent outputs and exiting");
                self.force_safe_outputs();
                self.store.set_u64(TagId::VState, OpState::Idle as u64);
                self.store.set_bool(TagId::DoAlarmBeacon, false);
                self.store.set_bool(TagId::DoAlarmHorn, false);
                let _ = io.write_outputs(&self.store);
                break;
            }

            let elapsed = t0.elapsed();
            let overrun = elapsed > period;
            self.stats.record(elapsed, overrun);
            if overrun {
                warn!(
                    "scan {} overran: {} us over a {} ms period",
                    self.tick,
                    elapsed.as_micros(),
                    period.as_millis()
                );
                sink.emit(&ControlEvent::ScanOverrun {
                    scan: self.tick,
                    elapsed_ms: elapsed.as_millis() as u64,
                });
                // Skip the sleep and carry on; never try to catch up.
            } else {
                thread::sleep(period - elapsed);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Console handle
// ---------------------------------------------------------------------------

/// The console thread's view of the controller: enqueue commands, read the
/// process image and setpoints. Cloneable; never blocks the scan thread.
#[derive(Clone)]
pub struct ControllerHandle {
    queue: Arc<CommandQueue>,
    store: Arc<TagStore>,
    bank: Arc<SetpointBank>,
}

impl ControllerHandle {
    /// Enqueue a command; fails fast when the bounded queue is full.
    pub fn send(&self, cmd: Command) -> Result<()> {
        self.queue
            .try_send(cmd)
            .map_err(|_| CommandError::QueueFull.into())
    }

    pub fn start(&self) -> Result<()> {
        self.send(Command::Start)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    pub fn prove(&self) -> Result<()> {
        self.send(Command::Prove)
    }

    pub fn reset(&self) -> Result<()> {
        self.send(Command::Reset)
    }

    pub fn close_batch(&self) -> Result<()> {
        self.send(Command::CloseBatch)
    }

    pub fn set(&self, name: &str, value: f64) -> Result<()> {
        self.send(Command::set(name, value))
    }

    pub fn query(&self, tag: Option<&str>) -> Result<()> {
        self.send(Command::query(tag))
    }

    pub fn dump_alarms(&self) -> Result<()> {
        self.send(Command::DumpAlarms)
    }

    /// Shared process image (read-side; writes go through commands).
    pub fn store(&self) -> &TagStore {
        &self.store
    }

    /// Current setpoint snapshot.
    pub fn setpoints(&self) -> Arc<Setpoints> {
        self.bank.current()
    }
}
