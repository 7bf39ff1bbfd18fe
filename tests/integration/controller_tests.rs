//! Executive-level behaviour: command queue, rejection paths, I/O fault
//! degradation, reports and queries.

use crate::mock_io::{MockIo, RecordingSink, running_unit, scan_n, scan_until};
use lactplc::alarms::AlarmId;
use lactplc::commands::Command;
use lactplc::controller::{COMMAND_QUEUE_DEPTH, Controller};
use lactplc::events::ControlEvent;
use lactplc::fsm::OpState;
use lactplc::setpoints::Setpoints;
use lactplc::tags::{Quality, TagId};
use lactplc::{CommandError, Error};

#[test]
fn command_queue_is_bounded_and_fails_fast() {
    let ctrl = Controller::new(Setpoints::default()).unwrap();
    let handle = ctrl.handle();

    for _ in 0..COMMAND_QUEUE_DEPTH {
        handle.send(Command::DumpAlarms).unwrap();
    }
    let err = handle.send(Command::DumpAlarms).unwrap_err();
    assert!(matches!(err, Error::Command(CommandError::QueueFull)));
}

#[test]
fn illegal_command_raises_info_alarm_and_keeps_state() {
    let mut ctrl = Controller::new(Setpoints::default()).unwrap();
    let mut io = MockIo::new();
    let mut sink = RecordingSink::new();

    ctrl.handle().prove().unwrap(); // PROVE from Idle is not legal
    scan_n(&mut ctrl, &mut io, &mut sink, 1);

    assert_eq!(ctrl.state(), OpState::Idle);
    assert!(sink.alarm_raised(AlarmId::IllegalCommand));
    assert!(sink.events.iter().any(|e| {
        matches!(
            e,
            ControlEvent::CommandRejected {
                reason: Error::Command(CommandError::IllegalInState { .. }),
                ..
            }
        )
    }));
}

#[test]
fn invalid_setpoint_is_rejected_without_install() {
    let mut ctrl = Controller::new(Setpoints::default()).unwrap();
    let mut io = MockIo::new();
    let mut sink = RecordingSink::new();

    ctrl.handle().set("bsw_divert_pct", 99.0).unwrap();
    scan_n(&mut ctrl, &mut io, &mut sink, 1);

    assert_eq!(ctrl.handle().setpoints().bsw_divert_pct, 1.0);
    assert!(sink.events.iter().any(|e| {
        matches!(e, ControlEvent::CommandRejected { reason: Error::Setpoint(_), .. })
    }));
}

#[test]
fn failed_input_scan_degrades_quality_and_diverts() {
    let (mut ctrl, mut io, mut sink) = running_unit();

    io.fail_reads = true;
    scan_n(&mut ctrl, &mut io, &mut sink, 1);
    assert_eq!(
        ctrl.handle().store().read(TagId::AiBswProbe).quality,
        Quality::Bad
    );

    // Sustained Bad probe quality becomes a divert demand (3-scan debounce)
    // even though the scan loop itself keeps turning.
    let diverted = scan_until(&mut ctrl, &mut io, &mut sink, 10, |c| {
        c.state() == OpState::Divert
    });
    assert!(diverted);
    assert!(!ctrl.halted());
}

#[test]
fn close_batch_emits_a_report_and_zeroes_ledgers() {
    let mut ctrl = Controller::new(Setpoints::default()).unwrap();
    let mut io = MockIo::new();
    let mut sink = RecordingSink::new();
    ctrl.handle().set("meter_k_factor", 100.0).unwrap();
    ctrl.handle().start().unwrap();
    assert!(scan_until(&mut ctrl, &mut io, &mut sink, 120, |c| {
        c.state() == OpState::Running
    }));

    io.inject_pulses(5_000);
    scan_n(&mut ctrl, &mut io, &mut sink, 1);
    ctrl.handle().close_batch().unwrap();
    scan_n(&mut ctrl, &mut io, &mut sink, 1);

    let report = sink
        .events
        .iter()
        .find_map(|e| match e {
            ControlEvent::BatchClosed(r) => Some(r.clone()),
            _ => None,
        })
        .expect("batch report emitted");
    assert!((report.gross_bbl - 50.0).abs() < 1e-6);
    assert_eq!(report.meter_factor, 1.0);
    assert_eq!(ctrl.handle().store().f64(TagId::VGrossBbl), 0.0);
}

#[test]
fn query_answers_through_the_event_sink() {
    let mut ctrl = Controller::new(Setpoints::default()).unwrap();
    let mut io = MockIo::new();
    let mut sink = RecordingSink::new();

    ctrl.handle().query(Some("DI_ESTOP")).unwrap();
    ctrl.handle().query(None).unwrap();
    ctrl.handle().query(Some("DI_BOGUS")).unwrap();
    scan_n(&mut ctrl, &mut io, &mut sink, 1);

    assert!(sink.events.iter().any(|e| {
        matches!(e, ControlEvent::TagValue { tag: TagId::DiEstop, .. })
    }));
    assert!(sink.events.iter().any(|e| {
        matches!(e, ControlEvent::TagDump(d) if d.len() == TagId::COUNT)
    }));
    assert!(sink.events.iter().any(|e| {
        matches!(e, ControlEvent::CommandRejected { reason: Error::Tag(_), .. })
    }));
}

#[test]
fn dump_alarms_lists_active_alarms() {
    let mut ctrl = Controller::new(Setpoints::default()).unwrap();
    let mut io = MockIo::new();
    let mut sink = RecordingSink::new();
    io.estop_healthy = false;
    scan_n(&mut ctrl, &mut io, &mut sink, 1);

    ctrl.handle().dump_alarms().unwrap();
    scan_n(&mut ctrl, &mut io, &mut sink, 1);

    let dump = sink
        .events
        .iter()
        .find_map(|e| match e {
            ControlEvent::AlarmDump(list) => Some(list.clone()),
            _ => None,
        })
        .expect("alarm dump emitted");
    assert!(dump.iter().any(|a| a.id == AlarmId::EStop));
}

#[test]
fn status_lamp_means_running_and_clean() {
    let (mut ctrl, mut io, mut sink) = running_unit();
    scan_n(&mut ctrl, &mut io, &mut sink, 1);
    assert!(ctrl.handle().store().bool(TagId::DoStatusGreen));

    io.pot_hi = true; // Warn alarm, no state change
    scan_n(&mut ctrl, &mut io, &mut sink, 2);
    assert_eq!(ctrl.state(), OpState::Running);
    assert!(!ctrl.handle().store().bool(TagId::DoStatusGreen));
}

#[test]
fn estop_wins_over_a_simultaneous_start() {
    let mut ctrl = Controller::new(Setpoints::default()).unwrap();
    let mut io = MockIo::new();
    let mut sink = RecordingSink::new();
    io.estop_healthy = false;

    ctrl.handle().start().unwrap();
    scan_n(&mut ctrl, &mut io, &mut sink, 1);

    // The command moved Idle -> Startup, but the same scan's safety pass
    // demanded E-Stop and safety wins within the scan.
    assert_eq!(ctrl.state(), OpState::EStop);
    assert!(!io.last_frame().pump_start);
}
