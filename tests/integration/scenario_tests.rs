//! End-to-end operating scenarios: command the unit the way an operator
//! would and assert on state plus the output image the field saw.

use crate::mock_io::{MockIo, RecordingSink, running_unit, scan_n, scan_until};
use lactplc::alarms::AlarmId;
use lactplc::controller::Controller;
use lactplc::events::ControlEvent;
use lactplc::fsm::OpState;
use lactplc::setpoints::Setpoints;
use lactplc::tags::TagId;

// ── Normal start ──────────────────────────────────────────────

#[test]
fn normal_start_reaches_running_on_sales() {
    let mut ctrl = Controller::new(Setpoints::default()).unwrap();
    let mut io = MockIo::new();
    let mut sink = RecordingSink::new();
    io.bsw_pct = 0.3;

    ctrl.handle().start().unwrap();
    let ok = scan_until(&mut ctrl, &mut io, &mut sink, 60, |c| {
        c.state() == OpState::Running
    });

    assert!(ok, "not Running within 60 scans");
    let store = ctrl.handle();
    assert!(store.store().bool(TagId::DoPumpStart));
    assert!(store.store().bool(TagId::DiPumpRunning));
    assert!(!store.store().bool(TagId::DoDivertCmd), "divert commanded to SALES");
    assert!(sink.events.iter().any(|e| {
        matches!(e, ControlEvent::StateChanged { to: OpState::Running, .. })
    }));
}

// ── BS&W divert and recovery ──────────────────────────────────

#[test]
fn high_bsw_diverts_and_clean_oil_recovers() {
    let (mut ctrl, mut io, mut sink) = running_unit();

    io.bsw_pct = 1.5;
    let diverted = scan_until(&mut ctrl, &mut io, &mut sink, 200, |c| {
        c.state() == OpState::Divert
    });
    assert!(diverted, "high BS&W never diverted");
    assert!(ctrl.handle().store().bool(TagId::DoDivertCmd));
    assert!(ctrl.handle().store().bool(TagId::DoPumpStart), "pump keeps running");

    io.bsw_pct = 0.4;
    let recovered = scan_until(&mut ctrl, &mut io, &mut sink, 200, |c| {
        c.state() == OpState::Running
    });
    assert!(recovered, "clean oil never recovered to Running");
    assert!(!ctrl.handle().store().bool(TagId::DoDivertCmd));
}

// ── Totalization ──────────────────────────────────────────────

#[test]
fn ten_thousand_pulses_book_one_hundred_barrels() {
    let mut ctrl = Controller::new(Setpoints::default()).unwrap();
    let mut io = MockIo::new();
    let mut sink = RecordingSink::new();
    ctrl.handle().set("meter_k_factor", 100.0).unwrap();
    ctrl.handle().start().unwrap();
    assert!(scan_until(&mut ctrl, &mut io, &mut sink, 120, |c| {
        c.state() == OpState::Running
    }));

    let store = ctrl.handle();
    let gross0 = store.store().f64(TagId::VGrossBbl);
    let net0 = store.store().f64(TagId::VNetBbl);

    io.inject_pulses(10_000);
    scan_n(&mut ctrl, &mut io, &mut sink, 1);

    assert!((store.store().f64(TagId::VGrossBbl) - gross0 - 100.0).abs() < 1e-6);
    assert!((store.store().f64(TagId::VNetBbl) - net0 - 100.0).abs() < 1e-6);
}

#[test]
fn elevated_temperature_applies_ctl_to_net_only() {
    let mut ctrl = Controller::new(Setpoints::default()).unwrap();
    let mut io = MockIo::new();
    let mut sink = RecordingSink::new();
    ctrl.handle().set("meter_k_factor", 100.0).unwrap();
    io.meter_temp_f = 120.0;
    ctrl.handle().start().unwrap();
    assert!(scan_until(&mut ctrl, &mut io, &mut sink, 120, |c| {
        c.state() == OpState::Running
    }));

    let store = ctrl.handle();
    let gross0 = store.store().f64(TagId::VGrossBbl);
    let net0 = store.store().f64(TagId::VNetBbl);

    io.inject_pulses(10_000);
    scan_n(&mut ctrl, &mut io, &mut sink, 1);

    // CTL = 1 − 0.00045 × 60 = 0.973
    assert!((store.store().f64(TagId::VGrossBbl) - gross0 - 100.0).abs() < 1e-6);
    assert!((store.store().f64(TagId::VNetBbl) - net0 - 97.3).abs() < 1e-6);
}

// ── E-Stop supremacy ──────────────────────────────────────────

#[test]
fn estop_from_proving_deenergizes_in_one_scan() {
    let (mut ctrl, mut io, mut sink) = running_unit();
    ctrl.handle().prove().unwrap();
    assert!(scan_until(&mut ctrl, &mut io, &mut sink, 10, |c| {
        c.state() == OpState::Proving
    }));

    io.estop_healthy = false;
    scan_n(&mut ctrl, &mut io, &mut sink, 1);
    assert_eq!(ctrl.state(), OpState::EStop);

    let frame = io.last_frame();
    assert!(!frame.pump_start);
    assert!(!frame.sample_sol);
    assert!(!frame.sample_mix);
    assert!(!frame.prover_vlv);
    assert!(frame.divert_cmd, "divert fails safe to tank");
    assert!(frame.beacon);
    assert!(frame.horn);

    // Release the field circuit and reset.
    io.estop_healthy = true;
    scan_n(&mut ctrl, &mut io, &mut sink, 2);
    ctrl.handle().reset().unwrap();
    assert!(scan_until(&mut ctrl, &mut io, &mut sink, 5, |c| {
        c.state() == OpState::Idle
    }));
}

// ── Proving ───────────────────────────────────────────────────

#[test]
fn five_run_prove_installs_the_mean_factor() {
    let mut ctrl = Controller::new(Setpoints::default()).unwrap();
    let mut io = MockIo::new();
    let mut sink = RecordingSink::new();
    ctrl.handle().set("meter_k_factor", 10_000.0).unwrap();
    ctrl.handle().set("prove_certified_barrels", 1.0).unwrap();
    ctrl.handle().start().unwrap();
    assert!(scan_until(&mut ctrl, &mut io, &mut sink, 120, |c| {
        c.state() == OpState::Running
    }));

    ctrl.handle().prove().unwrap();
    // Prover valve confirms through the simulator's travel model.
    assert!(scan_until(&mut ctrl, &mut io, &mut sink, 10, |c| {
        c.handle().store().u64(TagId::VProveRun) == 1
    }));

    // Pulse counts near K × certified volume: factors cluster ≈ 1.001.
    let mut expected = Vec::new();
    for pulses in [9_988_u64, 9_991, 9_989, 9_990, 9_987] {
        expected.push(10_000.0 / pulses as f64);
        io.inject_pulses(pulses);
        ctrl.handle().prove().unwrap();
        scan_n(&mut ctrl, &mut io, &mut sink, 1);
    }

    assert!(scan_until(&mut ctrl, &mut io, &mut sink, 10, |c| {
        c.state() == OpState::Running
    }));
    let mean = expected.iter().sum::<f64>() / expected.len() as f64;
    let installed = f64::from(ctrl.handle().setpoints().meter_factor);
    assert!(
        (installed - mean).abs() < 1e-4,
        "installed {installed}, expected ≈ {mean}"
    );
    let report = sink.events.iter().find_map(|e| match e {
        ControlEvent::ProveFinished(r) => Some(r.clone()),
        _ => None,
    });
    let report = report.expect("prove report emitted");
    assert!(report.passed);
    assert_eq!(report.runs.len(), 5);
    assert!(report.repeatability < 0.0005);
}

// ── Pump overload lockout ─────────────────────────────────────

#[test]
fn overload_shuts_down_and_lockout_denies_restart() {
    let (mut ctrl, mut io, mut sink) = running_unit();

    io.pump_overload = true;
    scan_n(&mut ctrl, &mut io, &mut sink, 1);
    assert_eq!(ctrl.state(), OpState::Shutdown);
    assert!(!ctrl.handle().store().bool(TagId::DoPumpStart));

    io.pump_overload = false;
    assert!(scan_until(&mut ctrl, &mut io, &mut sink, 10, |c| {
        c.state() == OpState::Idle
    }));

    // Immediate restart attempt: denied by the lockout, startup times out.
    ctrl.handle().start().unwrap();
    scan_n(&mut ctrl, &mut io, &mut sink, 20);
    assert!(!ctrl.handle().store().bool(TagId::DoPumpStart));
    assert!(sink.alarm_raised(AlarmId::PumpLockout));
    assert!(scan_until(&mut ctrl, &mut io, &mut sink, 200, |c| {
        c.state() == OpState::Idle
    }));

    // Wait out the lockout (60 s at 100 ms = 600 scans) and start again.
    scan_n(&mut ctrl, &mut io, &mut sink, 650);
    ctrl.handle().start().unwrap();
    assert!(scan_until(&mut ctrl, &mut io, &mut sink, 120, |c| {
        c.state() == OpState::Running
    }));
}

// ── Scan determinism ──────────────────────────────────────────

#[test]
fn identical_runs_produce_identical_process_images() {
    let run = || {
        let mut ctrl = Controller::new(Setpoints::default()).unwrap();
        let mut io = MockIo::new();
        let mut sink = RecordingSink::new();
        io.pulses_per_scan = 37;
        ctrl.handle().start().unwrap();
        scan_n(&mut ctrl, &mut io, &mut sink, 40);
        io.bsw_pct = 1.4;
        scan_n(&mut ctrl, &mut io, &mut sink, 80);
        ctrl.handle().stop().unwrap();
        scan_n(&mut ctrl, &mut io, &mut sink, 40);
        ctrl.handle().store().snapshot()
    };

    let a = run();
    let b = run();
    assert_eq!(a.as_slice(), b.as_slice());
}
