//! Meter proving sequencer.
//!
//! Orchestrates N proving runs against the prover's certified volume. Each
//! run brackets the meter pulse counter between run boundaries; the
//! boundary signal is operator-driven (a PROVE command while already
//! proving marks the current run displaced). After the last run the
//! repeatability across raw factors decides whether the mean becomes the
//! candidate meter factor.
//!
//! The sequencer never blocks: valve travel is a scan-counted deadline and
//! every scan advances at most one phase. Leaving the Proving state for any
//! reason (abort, interlock, E-Stop) drops the sequence and closes the
//! prover valve on the next scan.

use log::{info, warn};
use serde::Serialize;

use crate::alarms::{AlarmId, Annunciator, SafetyAction, Severity};
use crate::fsm::OpState;
use crate::setpoints::Setpoints;
use crate::tags::{TagId, TagStore};

/// Upper bound on configurable runs per prove (`prove_runs` domain).
pub const MAX_RUNS: usize = 10;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RunRecord {
    /// 1-based run number.
    pub run: u32,
    /// Meter pulses counted across the certified volume.
    pub pulses: u64,
    pub raw_factor: f64,
}

/// Result of a completed (or abandoned) prove sequence.
#[derive(Debug, Clone, Serialize)]
pub struct ProvingReport {
    pub runs: Vec<RunRecord>,
    pub certified_bbl: f32,
    /// (max − min) / min across raw factors.
    pub repeatability: f64,
    pub passed: bool,
    /// Candidate meter factor (mean of raw factors) when passed.
    pub meter_factor: Option<f64>,
}

/// Outcome handed back to the executive.
#[derive(Debug, Clone)]
pub enum ProveOutcome {
    Passed(ProvingReport),
    Failed(ProvingReport),
}

// ---------------------------------------------------------------------------
// Sequencer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Idle,
    /// Valve commanded open, waiting for the open proof.
    OpenValve,
    /// A run is in progress; waiting for the displaced-volume signal.
    Run,
}

pub struct ProvingSequencer {
    phase: Phase,
    phase_ticks: u64,
    start_pulses: u64,
    runs: heapless::Vec<RunRecord, MAX_RUNS>,
    run_signal: bool,
}

impl ProvingSequencer {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            phase_ticks: 0,
            start_pulses: 0,
            runs: heapless::Vec::new(),
            run_signal: false,
        }
    }

    /// Operator signal: the certified volume has been displaced for the
    /// run in progress.
    pub fn signal_run_complete(&mut self) {
        self.run_signal = true;
    }

    pub fn in_progress(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn scan(
        &mut self,
        store: &TagStore,
        sp: &Setpoints,
        state: OpState,
        ann: &mut Annunciator,
    ) -> Option<ProveOutcome> {
        if state != OpState::Proving {
            if self.phase != Phase::Idle {
                warn!("prove sequence dropped (state left Proving)");
                self.teardown(store);
            }
            self.run_signal = false;
            return None;
        }

        self.phase_ticks += 1;
        match self.phase {
            Phase::Idle => {
                self.runs.clear();
                self.run_signal = false;
                self.phase = Phase::OpenValve;
                self.phase_ticks = 0;
                store.set_bool(TagId::DoProverVlvCmd, true);
                store.set_u64(TagId::VProveRun, 0);
                info!("prove: opening prover DBB valve");
                None
            }
            Phase::OpenValve => {
                if store.bool(TagId::DiProverVlvOpen) {
                    self.start_pulses = store.u64(TagId::PiMeterPulse);
                    self.phase = Phase::Run;
                    self.phase_ticks = 0;
                    store.set_u64(TagId::VProveRun, 1);
                    info!("prove: valve open, run 1 started");
                    None
                } else if self.phase_ticks > sp.scans_for_secs(sp.divert_travel_timeout_sec) {
                    warn!("prove: prover valve did not confirm open");
                    Some(self.fail(store, sp, ann))
                } else {
                    None
                }
            }
            Phase::Run => {
                if !self.run_signal {
                    return None;
                }
                self.run_signal = false;

                let end = store.u64(TagId::PiMeterPulse);
                let pulses = end.wrapping_sub(self.start_pulses);
                if pulses == 0 {
                    warn!("prove: run closed with no meter pulses");
                    return Some(self.fail(store, sp, ann));
                }

                let meter_bbl = pulses as f64 / f64::from(sp.meter_k_factor);
                let raw_factor = f64::from(sp.prove_certified_barrels) / meter_bbl;
                let run = self.runs.len() as u32 + 1;
                // Capacity matches the prove_runs domain; push cannot fail.
                let _ = self.runs.push(RunRecord { run, pulses, raw_factor });
                info!("prove: run {run} factor {raw_factor:.5}");

                if self.runs.len() >= sp.prove_runs as usize {
                    Some(self.finalize(store, sp, ann))
                } else {
                    self.start_pulses = end;
                    store.set_u64(TagId::VProveRun, u64::from(run) + 1);
                    None
                }
            }
        }
    }

    // ── Internal ──────────────────────────────────────────────

    fn finalize(&mut self, store: &TagStore, sp: &Setpoints, ann: &mut Annunciator) -> ProveOutcome {
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        let mut sum = 0.0;
        for r in &self.runs {
            min = min.min(r.raw_factor);
            max = max.max(r.raw_factor);
            sum += r.raw_factor;
        }
        let repeatability = (max - min) / min;
        let mean = sum / self.runs.len() as f64;
        let passed = repeatability <= f64::from(sp.repeatability_tolerance);

        let report = ProvingReport {
            runs: self.runs.iter().copied().collect(),
            certified_bbl: sp.prove_certified_barrels,
            repeatability,
            passed,
            meter_factor: passed.then_some(mean),
        };
        self.teardown(store);

        if passed {
            info!("prove passed: repeatability {repeatability:.6}, factor {mean:.5}");
            ProveOutcome::Passed(report)
        } else {
            warn!("prove failed: repeatability {repeatability:.6} over tolerance");
            ann.raise(AlarmId::ProvingFailed, Severity::Warn, SafetyAction::None);
            ProveOutcome::Failed(report)
        }
    }

    fn fail(&mut self, store: &TagStore, sp: &Setpoints, ann: &mut Annunciator) -> ProveOutcome {
        let report = ProvingReport {
            runs: self.runs.iter().copied().collect(),
            certified_bbl: sp.prove_certified_barrels,
            repeatability: 0.0,
            passed: false,
            meter_factor: None,
        };
        self.teardown(store);
        ann.raise(AlarmId::ProvingFailed, Severity::Warn, SafetyAction::None);
        ProveOutcome::Failed(report)
    }

    fn teardown(&mut self, store: &TagStore) {
        self.phase = Phase::Idle;
        self.phase_ticks = 0;
        self.run_signal = false;
        store.set_bool(TagId::DoProverVlvCmd, false);
        store.set_bool(TagId::VProveActive, false);
        store.set_u64(TagId::VProveRun, 0);
    }
}

impl Default for ProvingSequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prove_sp() -> Setpoints {
        let mut sp = Setpoints::default();
        sp.meter_k_factor = 10_000.0;
        sp.prove_certified_barrels = 1.0;
        sp
    }

    /// Drive one run: inject pulses, signal displacement, scan.
    fn run_once(
        seq: &mut ProvingSequencer,
        store: &TagStore,
        sp: &Setpoints,
        ann: &mut Annunciator,
        pulses: u64,
    ) -> Option<ProveOutcome> {
        store.set_u64(TagId::PiMeterPulse, store.u64(TagId::PiMeterPulse) + pulses);
        seq.signal_run_complete();
        seq.scan(store, sp, OpState::Proving, ann)
    }

    #[test]
    fn five_tight_runs_pass_and_average() {
        let store = TagStore::new();
        let sp = prove_sp();
        let mut seq = ProvingSequencer::new();
        let mut ann = Annunciator::new();

        // Kick off; valve opens next scan.
        assert!(seq.scan(&store, &sp, OpState::Proving, &mut ann).is_none());
        assert!(store.bool(TagId::DoProverVlvCmd));
        store.set_bool(TagId::DiProverVlvOpen, true);
        assert!(seq.scan(&store, &sp, OpState::Proving, &mut ann).is_none());
        assert_eq!(store.u64(TagId::VProveRun), 1);

        // Pulse counts near K * certified: factors cluster around 1.001.
        let counts = [9_988_u64, 9_991, 9_989, 9_990, 9_987];
        let mut outcome = None;
        for c in counts {
            outcome = run_once(&mut seq, &store, &sp, &mut ann, c);
        }
        let report = match outcome {
            Some(ProveOutcome::Passed(r)) => r,
            other => panic!("expected a passed prove, got {other:?}"),
        };

        assert_eq!(report.runs.len(), 5);
        let expected_mean = report.runs.iter().map(|r| r.raw_factor).sum::<f64>() / 5.0;
        assert_eq!(report.meter_factor, Some(expected_mean));
        assert!(report.repeatability < 0.0005);
        assert!(!store.bool(TagId::DoProverVlvCmd), "valve closed after prove");
        assert!(!store.bool(TagId::VProveActive));
    }

    #[test]
    fn scattered_runs_fail_and_keep_the_old_factor() {
        let store = TagStore::new();
        let sp = prove_sp();
        let mut seq = ProvingSequencer::new();
        let mut ann = Annunciator::new();

        ann.begin_scan(1);
        seq.scan(&store, &sp, OpState::Proving, &mut ann);
        store.set_bool(TagId::DiProverVlvOpen, true);
        seq.scan(&store, &sp, OpState::Proving, &mut ann);

        let counts = [9_900_u64, 10_100, 9_950, 10_050, 10_000];
        let mut outcome = None;
        for c in counts {
            outcome = run_once(&mut seq, &store, &sp, &mut ann, c);
        }
        let report = match outcome {
            Some(ProveOutcome::Failed(r)) => r,
            other => panic!("expected a failed prove, got {other:?}"),
        };
        assert!(report.repeatability > 0.0005);
        assert_eq!(report.meter_factor, None);
        assert!(ann.is_active(AlarmId::ProvingFailed));
    }

    #[test]
    fn valve_timeout_fails_the_prove() {
        let store = TagStore::new();
        let sp = prove_sp(); // 5 s travel = 50 scans
        let mut seq = ProvingSequencer::new();
        let mut ann = Annunciator::new();

        seq.scan(&store, &sp, OpState::Proving, &mut ann);
        let mut outcome = None;
        for _ in 0..60 {
            outcome = seq.scan(&store, &sp, OpState::Proving, &mut ann);
            if outcome.is_some() {
                break;
            }
        }
        assert!(matches!(outcome, Some(ProveOutcome::Failed(_))));
    }

    #[test]
    fn proving_report_serializes_for_the_journal() {
        let report = ProvingReport {
            runs: vec![RunRecord { run: 1, pulses: 9_990, raw_factor: 1.001 }],
            certified_bbl: 1.0,
            repeatability: 0.0002,
            passed: true,
            meter_factor: Some(1.001),
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"repeatability\""));
        assert!(json.contains("\"raw_factor\""));
    }

    #[test]
    fn leaving_proving_tears_the_sequence_down() {
        let store = TagStore::new();
        let sp = prove_sp();
        let mut seq = ProvingSequencer::new();
        let mut ann = Annunciator::new();

        seq.scan(&store, &sp, OpState::Proving, &mut ann);
        assert!(seq.in_progress());
        seq.scan(&store, &sp, OpState::Running, &mut ann);
        assert!(!seq.in_progress());
        assert!(!store.bool(TagId::DoProverVlvCmd));
    }
}
