//! End-to-end runs of the curve follower against scripted collaborators
//! and a deterministic clock.

use std::cell::Cell;
use std::sync::Arc;

use vcmd_config::{ControlCfg, SafetyCfg};
use vcmd_core::curve::{Curve, CurveHeader, ThrustPoint, encode};
use vcmd_core::follower::{CurveFollower, RunState};
use vcmd_core::mocks::{
    MockSync, MockSyncHandle, MockValve, MockValveHandle, ScriptedSensor, SharedSink,
    SharedSinkHandle,
};
use vcmd_core::safety::{KillReason, ValveId};
use vcmd_core::sensors::{SensorSuite, SignalId};
use vcmd_core::{CURVE_SCHEMA_VERSION, CoreError};
use vcmd_traits::{HwResult, Sensor, TestClock};

/// Sensor that reads a nominal value until the n-th read, then a bad one.
struct BreachAfter {
    reads: usize,
    trip_at: usize,
    good: f32,
    bad: f32,
    offset: f32,
}

impl BreachAfter {
    fn new(trip_at: usize, good: f32, bad: f32) -> Self {
        Self {
            reads: 0,
            trip_at,
            good,
            bad,
            offset: 0.0,
        }
    }
}

impl Sensor for BreachAfter {
    fn read(&mut self) -> HwResult<f32> {
        self.reads += 1;
        let raw = if self.reads >= self.trip_at {
            self.bad
        } else {
            self.good
        };
        Ok(raw + self.offset)
    }

    fn set_offset(&mut self, offset: f32) {
        self.offset = offset;
    }

    fn offset(&self) -> f32 {
        self.offset
    }
}

fn thrust_ramp_bytes() -> Vec<u8> {
    let header = CurveHeader {
        version: CURVE_SCHEMA_VERSION,
        label: "ramp".to_string(),
        is_thrust: true,
        num_points: 3,
    };
    let curve = Curve::Thrust(vec![
        ThrustPoint {
            time: 0.0,
            thrust: 0.0,
        },
        ThrustPoint {
            time: 1.0,
            thrust: 300.0,
        },
        ThrustPoint {
            time: 2.0,
            thrust: 300.0,
        },
    ]);
    encode(&header, &curve).unwrap()
}

fn nominal_sensors(chamber: Box<dyn Sensor>) -> SensorSuite {
    SensorSuite {
        lox_tank: Box::new(ScriptedSensor::fixed(0.0)),
        lox_venturi_upstream: Box::new(ScriptedSensor::fixed(0.0)),
        lox_venturi_throat: Box::new(ScriptedSensor::fixed(0.0)),
        lox_valve_temperature: Box::new(ScriptedSensor::fixed(90.0)),
        lox_venturi_temperature: Box::new(ScriptedSensor::fixed(90.0)),
        ipa_tank: Box::new(ScriptedSensor::fixed(0.0)),
        ipa_venturi_upstream: Box::new(ScriptedSensor::fixed(0.0)),
        ipa_venturi_throat: Box::new(ScriptedSensor::fixed(0.0)),
        chamber,
    }
}

struct Rig {
    follower: CurveFollower,
    lox: MockValveHandle,
    ipa: MockValveHandle,
    sync: MockSyncHandle,
    sink: SharedSinkHandle,
}

fn rig_with(
    safety: SafetyCfg,
    chamber: Box<dyn Sensor>,
    abort_check: Option<Box<dyn Fn() -> bool>>,
) -> Rig {
    let (lox_valve, lox) = MockValve::new();
    let (ipa_valve, ipa) = MockValve::new();
    let (sync_dev, sync) = MockSync::go_after(3);
    let (sink_dev, sink) = SharedSink::new();
    let clock = TestClock::new();

    let control = ControlCfg {
        settle_ms: 10,
        ..ControlCfg::default()
    };

    let mut builder = CurveFollower::builder()
        .lox_valve(Box::new(lox_valve))
        .ipa_valve(Box::new(ipa_valve))
        .sensors(nominal_sensors(chamber))
        .sync(Box::new(sync_dev))
        .sink(Box::new(sink_dev))
        .clock(Arc::new(clock))
        .control(control)
        .safety(safety);
    if let Some(f) = abort_check {
        builder = builder.abort_check(f);
    }

    Rig {
        follower: builder.try_build().unwrap(),
        lox,
        ipa,
        sync,
        sink,
    }
}

fn rig() -> Rig {
    rig_with(
        SafetyCfg::default(),
        Box::new(ScriptedSensor::fixed(0.0)),
        None,
    )
}

#[test]
fn thrust_ramp_runs_to_completion() {
    let mut r = rig();
    r.follower.load_curve_bytes(&thrust_ramp_bytes()).unwrap();
    r.follower.capture_zero().unwrap();

    r.follower.arm().unwrap();
    r.follower.confirm_start().unwrap();
    let end = r.follower.run().unwrap();

    assert_eq!(end, RunState::Completed);
    assert_eq!(r.follower.state(), RunState::Completed);
    assert!(r.follower.last_kill().is_none());

    // Commands ramp with the thrust over [0,1)s, then hold over [1,2)s.
    let commands = r.lox.commands();
    assert!(commands.len() > 2000);
    for pair in commands.windows(2) {
        assert!(pair[1] >= pair[0] - 1e-5, "command sequence decreased");
    }
    let last = commands[commands.len() - 1];
    for c in &commands[commands.len() - 500..] {
        assert!((c - last).abs() < 1e-5, "hold segment not constant");
    }
    // Both valves idled at completion, sync-out back to idle.
    assert!(r.lox.idle_calls() >= 1);
    assert!(r.ipa.idle_calls() >= 1);
    assert!(!r.sync.sync_out());
    assert!(!r.sync.fault_out());

    // One record per log interval: 2000 ms / 5 ms.
    assert_eq!(r.sink.len(), 400);
    assert!(r.sink.finished());
    let records = r.sink.records();
    assert!(records.iter().all(|rec| rec.thrust_cmd_lbf >= 0.0));
    assert!(records.windows(2).all(|w| w[1].elapsed_s > w[0].elapsed_s));
}

#[test]
fn comparator_breach_aborts_and_idles_both_valves() {
    // Chamber transducer goes out the top of its window mid-run.
    let chamber = BreachAfter::new(500, 0.0, 700.0);
    let mut r = rig_with(SafetyCfg::default(), Box::new(chamber), None);
    r.follower.load_curve_bytes(&thrust_ramp_bytes()).unwrap();
    r.follower.capture_zero().unwrap();
    r.follower.arm().unwrap();
    r.follower.confirm_start().unwrap();

    let end = r.follower.run().unwrap();
    assert_eq!(end, RunState::Aborted);

    match r.follower.last_kill() {
        Some(KillReason::SensorOutOfBounds(rec)) => {
            assert_eq!(rec.cause, SignalId::ChamberPressure);
        }
        other => panic!("expected a comparator kill, got {other:?}"),
    }
    // Safe state: both valves idled, fault reported outward, run cut short.
    assert!(r.lox.idle_calls() >= 1);
    assert!(r.ipa.idle_calls() >= 1);
    assert!(r.sync.fault_out());
    assert!(!r.sync.sync_out());
    assert!(r.lox.commands().len() < 2000);
    assert!(r.sink.finished());
}

#[test]
fn operator_abort_kills_mid_run() {
    let polls = Cell::new(0usize);
    let abort = Box::new(move || {
        polls.set(polls.get() + 1);
        polls.get() > 50
    });
    let mut r = rig_with(
        SafetyCfg::default(),
        Box::new(ScriptedSensor::fixed(0.0)),
        Some(abort),
    );
    r.follower.load_curve_bytes(&thrust_ramp_bytes()).unwrap();
    r.follower.capture_zero().unwrap();
    r.follower.arm().unwrap();
    r.follower.confirm_start().unwrap();

    let end = r.follower.run().unwrap();
    assert_eq!(end, RunState::Aborted);
    assert!(matches!(
        r.follower.last_kill(),
        Some(KillReason::OperatorAbort)
    ));
    assert!(r.sync.fault_out());
}

#[test]
fn position_deviation_kills_after_grace() {
    let safety = SafetyCfg {
        deviation_grace_s: 0.1,
        ..SafetyCfg::default()
    };
    let mut r = rig_with(safety, Box::new(ScriptedSensor::fixed(0.0)), None);
    r.follower.load_curve_bytes(&thrust_ramp_bytes()).unwrap();
    r.follower.capture_zero().unwrap();
    r.follower.arm().unwrap();
    // 18 degrees of tracking error, over the 10 degree threshold.
    r.lox.set_live_skew(0.2);
    r.follower.confirm_start().unwrap();

    let end = r.follower.run().unwrap();
    assert_eq!(end, RunState::Aborted);
    assert!(matches!(
        r.follower.last_kill(),
        Some(KillReason::PositionDeviation(ValveId::Lox))
    ));
}

#[test]
fn facility_fault_while_waiting_stands_down() {
    let mut r = rig();
    r.follower.load_curve_bytes(&thrust_ramp_bytes()).unwrap();
    r.follower.capture_zero().unwrap();
    r.follower.arm().unwrap();
    r.sync.set_fault_in(true);
    r.follower.confirm_start().unwrap();

    let end = r.follower.run().unwrap();
    assert_eq!(end, RunState::Idle);
    assert_eq!(r.follower.state(), RunState::Idle);
    assert!(!r.sync.sync_out());
    assert!(r.sink.is_empty());
    assert!(r.lox.idle_calls() >= 1);
}

#[test]
fn arming_without_curve_is_rejected_untouched() {
    let mut r = rig();
    r.follower.capture_zero().unwrap();

    let err = r.follower.arm().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CoreError>(),
        Some(CoreError::CurveNotLoaded)
    ));
    assert_eq!(r.follower.state(), RunState::Idle);
    assert_eq!(r.lox.enable_calls(), 0);
    assert!(r.lox.commands().is_empty());
    assert!(r.ipa.commands().is_empty());
}

#[test]
fn arming_without_calibration_is_rejected_untouched() {
    let mut r = rig();
    r.follower.load_curve_bytes(&thrust_ramp_bytes()).unwrap();

    let err = r.follower.arm().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CoreError>(),
        Some(CoreError::NotCalibrated)
    ));
    assert_eq!(r.follower.state(), RunState::Idle);
    assert_eq!(r.lox.enable_calls(), 0);
    assert!(r.lox.commands().is_empty());
}

#[test]
fn decline_start_returns_to_idle_with_valves_idle() {
    let mut r = rig();
    r.follower.load_curve_bytes(&thrust_ramp_bytes()).unwrap();
    r.follower.capture_zero().unwrap();
    r.follower.arm().unwrap();
    assert!(r.lox.enable_calls() >= 1);

    r.follower.decline_start().unwrap();
    assert_eq!(r.follower.state(), RunState::Idle);
    assert!(r.lox.idle_calls() >= 1);
    assert!(r.ipa.idle_calls() >= 1);
}

#[test]
fn rearm_after_abort_requires_reset() {
    let polls = Cell::new(0usize);
    let abort = Box::new(move || {
        polls.set(polls.get() + 1);
        polls.get() > 20
    });
    let mut r = rig_with(
        SafetyCfg::default(),
        Box::new(ScriptedSensor::fixed(0.0)),
        Some(abort),
    );
    r.follower.load_curve_bytes(&thrust_ramp_bytes()).unwrap();
    r.follower.capture_zero().unwrap();
    r.follower.arm().unwrap();
    r.follower.confirm_start().unwrap();
    assert_eq!(r.follower.run().unwrap(), RunState::Aborted);

    assert!(r.follower.arm().is_err());
    r.follower.reset_to_idle();
    assert_eq!(r.follower.state(), RunState::Idle);
}
