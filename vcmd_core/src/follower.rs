//! The curve follower: the run state machine and the real-time tick loop
//! that commands both valves along the loaded curve.
//!
//! Everything the loop touches is owned here; there are no statics. The
//! loop is the single writer of the fault latch and the commanded
//! positions. The tick order is fixed: sample, safety checks, command
//! computation, command emission, facility telemetry, cadenced log
//! record, kill evaluation, bounded sleep.

use std::sync::Arc;
use std::time::Duration;

use vcmd_config::{BoundsCfg, ControlCfg, DefaultConditionsCfg, SafetyCfg};
use vcmd_traits::clock::{Clock, MonotonicClock};
use vcmd_traits::{FacilitySync, ValveActuator};

use crate::calibration::ZeroCalibration;
use crate::curve::CurveStore;
use crate::error::{BuildError, CoreError, Result};
use crate::physics::{self, DefaultConditions, ModelState, ValveAngles};
use crate::pi::{ClosedLoopBank, PiTelemetry};
use crate::safety::{
    ComparatorBank, FaultLatch, KillInputs, KillReason, SafetyChecks, ValveObservation,
    check_for_kill, kill_response,
};
use crate::sensors::{SensorSnapshot, SensorSuite};
use crate::telemetry::{TelemetryRecord, TelemetrySink};
use crate::watchdog::Watchdog;

/// Run state machine. The only way out of `Completed` or `Aborted` is
/// `reset_to_idle()` followed by a full re-arm cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Arming,
    WaitingForGo,
    Running,
    Completed,
    Aborted,
}

/// Valve command for one tick, in normalized units plus the telemetry
/// that came out of computing it.
struct TickCommand {
    segment: usize,
    thrust_lbf: f32,
    lox: f32,
    ipa: f32,
    model: ModelState,
}

pub struct CurveFollower {
    curve: CurveStore,
    latch: FaultLatch,
    comparators: ComparatorBank,
    pi: ClosedLoopBank,
    lox_valve: Box<dyn ValveActuator>,
    ipa_valve: Box<dyn ValveActuator>,
    sensors: SensorSuite,
    sync: Box<dyn FacilitySync>,
    sink: Box<dyn TelemetrySink>,
    clock: Arc<dyn Clock + Send + Sync>,
    control: ControlCfg,
    checks: SafetyChecks,
    defaults: DefaultConditions,
    abort_check: Option<Box<dyn Fn() -> bool>>,
    watchdog: Option<Watchdog>,
    state: RunState,
    calibrated: bool,
    abort_requested: bool,
    last_kill: Option<KillReason>,
}

impl std::fmt::Debug for CurveFollower {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurveFollower")
            .field("state", &self.state)
            .field("curve_loaded", &self.curve.is_loaded())
            .field("calibrated", &self.calibrated)
            .finish_non_exhaustive()
    }
}

impl CurveFollower {
    pub fn builder() -> FollowerBuilder {
        FollowerBuilder::default()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn curve(&self) -> &CurveStore {
        &self.curve
    }

    /// Why the last run was killed, if it was.
    pub fn last_kill(&self) -> Option<KillReason> {
        self.last_kill
    }

    /// Decode and install a curve file image. Allowed only in `Idle`.
    pub fn load_curve_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.state != RunState::Idle {
            return Err(eyre::Report::new(CoreError::InvalidState {
                op: "load_curve",
                state: "not idle",
            }));
        }
        self.curve.load_bytes(bytes)?;
        Ok(())
    }

    /// Capture a fresh sensor zero; satisfies the arming precondition.
    pub fn capture_zero(&mut self) -> Result<ZeroCalibration> {
        let cal = self.sensors.capture_zero()?;
        self.calibrated = true;
        Ok(cal)
    }

    /// Restore a persisted zero-calibration record.
    pub fn apply_calibration(&mut self, cal: &ZeroCalibration) {
        self.sensors.apply_calibration(cal);
        self.calibrated = true;
    }

    /// Request an operator abort; honored at the next poll point.
    pub fn abort(&mut self) {
        self.abort_requested = true;
    }

    pub fn reset_to_idle(&mut self) {
        if matches!(self.state, RunState::Completed | RunState::Aborted) {
            self.state = RunState::Idle;
        }
    }

    fn abort_requested(&self) -> bool {
        self.abort_requested || self.abort_check.as_ref().is_some_and(|f| f())
    }

    /// Arm for a run. Preconditions are checked once, synchronously:
    /// a curve must be loaded and a zero calibration performed since
    /// boot. On rejection the state stays `Idle` and no actuator is
    /// touched. On success both valves are enabled and the starting
    /// command is held for the settling window; the follower is then in
    /// `Arming`, waiting on `confirm_start` or `decline_start`.
    pub fn arm(&mut self) -> Result<()> {
        if self.state != RunState::Idle {
            return Err(eyre::Report::new(CoreError::InvalidState {
                op: "arm",
                state: "not idle",
            }));
        }
        if !self.curve.is_loaded() {
            return Err(eyre::Report::new(CoreError::CurveNotLoaded));
        }
        if !self.calibrated {
            return Err(eyre::Report::new(CoreError::NotCalibrated));
        }

        self.latch.reset();
        self.pi.reset();
        self.abort_requested = false;
        self.last_kill = None;

        self.lox_valve.clear_faults().map_err(hw)?;
        self.ipa_valve.clear_faults().map_err(hw)?;
        self.lox_valve.enable().map_err(hw)?;
        self.ipa_valve.enable().map_err(hw)?;

        let cmd = self.compute_command(0.0)?;
        tracing::info!(
            lox = cmd.lox,
            ipa = cmd.ipa,
            settle_ms = self.control.settle_ms,
            "armed, holding start command"
        );

        // Hold the start command through the settling window so both
        // valves are on position before the operator is asked.
        let interval = Duration::from_millis(self.control.command_interval_ms);
        let settle_until = self.clock.now() + Duration::from_millis(self.control.settle_ms);
        loop {
            self.lox_valve.set_position(cmd.lox).map_err(hw)?;
            self.ipa_valve.set_position(cmd.ipa).map_err(hw)?;
            self.sync.send_valve_positions(cmd.lox, cmd.ipa).map_err(hw)?;
            if self.clock.now() >= settle_until {
                break;
            }
            self.clock.sleep(interval);
        }

        self.state = RunState::Arming;
        Ok(())
    }

    /// Operator confirmed the held start position.
    pub fn confirm_start(&mut self) -> Result<()> {
        if self.state != RunState::Arming {
            return Err(eyre::Report::new(CoreError::InvalidState {
                op: "confirm_start",
                state: "not arming",
            }));
        }
        self.state = RunState::WaitingForGo;
        Ok(())
    }

    /// Operator declined; valves drop to idle and the follower returns
    /// to `Idle`.
    pub fn decline_start(&mut self) -> Result<()> {
        if self.state != RunState::Arming {
            return Err(eyre::Report::new(CoreError::InvalidState {
                op: "decline_start",
                state: "not arming",
            }));
        }
        self.lox_valve.set_idle().map_err(hw)?;
        self.ipa_valve.set_idle().map_err(hw)?;
        self.state = RunState::Idle;
        Ok(())
    }

    /// Wait for the facility's go signal, then follow the curve to the
    /// final waypoint. Returns the terminal state (`Completed`,
    /// `Aborted`, or `Idle` if the wait was called off).
    pub fn run(&mut self) -> Result<RunState> {
        if self.state != RunState::WaitingForGo {
            return Err(eyre::Report::new(CoreError::InvalidState {
                op: "run",
                state: "not waiting for go",
            }));
        }

        // Ready/running is advertised on sync-out from here until the
        // run ends; it idles again on every exit path.
        self.sync.set_sync_out(true).map_err(hw)?;
        let interval = Duration::from_millis(self.control.command_interval_ms);

        loop {
            if self.abort_requested() {
                tracing::info!("wait for go called off by operator");
                return self.stand_down();
            }
            if self.sync.fault_in().map_err(hw)? {
                tracing::warn!("facility fault while waiting for go");
                return self.stand_down();
            }
            if self.sync.go_in().map_err(hw)? {
                break;
            }
            if let Some(wd) = &self.watchdog {
                wd.beat();
            }
            self.clock.sleep(interval);
        }

        self.state = RunState::Running;
        tracing::info!("go received, run started");
        let outcome = self.run_loop();
        // Sync-out idles no matter how the loop ended.
        self.sync.set_sync_out(false).map_err(hw)?;
        self.sink.finish()?;
        outcome
    }

    fn run_loop(&mut self) -> Result<RunState> {
        let epoch = self.clock.now();
        let end_time = self.curve.end_time()?;
        let interval = Duration::from_millis(self.control.command_interval_ms);
        let mut last_log_ms: Option<u64> = None;

        loop {
            let tick_start = self.clock.now();
            let elapsed_ms = self.clock.ms_since(epoch);
            let elapsed_s = elapsed_ms as f32 / 1000.0;

            if elapsed_s >= end_time {
                self.lox_valve.set_idle().map_err(hw)?;
                self.ipa_valve.set_idle().map_err(hw)?;
                self.state = RunState::Completed;
                tracing::info!(elapsed_s, "final waypoint reached, run complete");
                return Ok(RunState::Completed);
            }

            if let Some(wd) = &self.watchdog {
                wd.beat();
                if wd.is_stalled() {
                    tracing::warn!("watchdog reported a stalled heartbeat");
                }
            }

            // 1. Sample. A sensor failure mid-run is not a kill reason;
            // it is a hardware fault that still collapses to safe state.
            let sd = match self.sensors.snapshot(self.defaults.ipa_temperature) {
                Ok(sd) => sd,
                Err(e) => {
                    self.safe_state()?;
                    self.state = RunState::Aborted;
                    return Err(eyre::Report::new(e));
                }
            };

            // 2. Safety checks, every signal, every tick.
            self.comparators.check_all(&mut self.latch, &sd);

            // 3. Command computation.
            let cmd = self.compute_command_with(elapsed_s, Some(&sd))?;

            // 4. Command emission.
            self.lox_valve.set_position(cmd.lox).map_err(hw)?;
            self.ipa_valve.set_position(cmd.ipa).map_err(hw)?;

            // 5. Facility telemetry.
            self.sync.send_valve_positions(cmd.lox, cmd.ipa).map_err(hw)?;

            // 6. Log record, on the slower cadence.
            let due = match last_log_ms {
                None => true,
                Some(t) => elapsed_ms.saturating_sub(t) >= self.control.log_interval_ms,
            };
            if due {
                last_log_ms = Some(elapsed_ms);
                let record = self.build_record(elapsed_s, &sd, &cmd)?;
                self.sink.append(&record)?;
            }

            // 7. Kill evaluation, last before looping. The command just
            // emitted stands; a positive here only stops the next tick.
            if let Some(reason) = self.evaluate_kill(elapsed_s)? {
                kill_response(
                    &reason,
                    self.lox_valve.as_mut(),
                    self.ipa_valve.as_mut(),
                    self.sync.as_mut(),
                )?;
                self.last_kill = Some(reason);
                self.state = RunState::Aborted;
                return Ok(RunState::Aborted);
            }

            // 8. Bounded sleep: remaining tick budget, zero if overrun.
            let spent = self.clock.now().saturating_duration_since(tick_start);
            self.clock.sleep(interval.saturating_sub(spent));
        }
    }

    fn evaluate_kill(&mut self, elapsed_s: f32) -> Result<Option<KillReason>> {
        let inputs = KillInputs {
            elapsed_s,
            facility_fault: self.sync.fault_in().map_err(hw)?,
            operator_abort: self.abort_requested(),
            lox: observe(self.lox_valve.as_mut())?,
            ipa: observe(self.ipa_valve.as_mut())?,
        };
        Ok(check_for_kill(&self.checks, &inputs, &self.latch))
    }

    /// Valves idle and fault-out asserted, outside the kill path (used
    /// for hardware faults rather than safety kills).
    fn safe_state(&mut self) -> Result<()> {
        self.lox_valve.set_idle().map_err(hw)?;
        self.ipa_valve.set_idle().map_err(hw)?;
        self.sync.set_fault_out(true).map_err(hw)?;
        Ok(())
    }

    /// Abort out of the go-wait: valves idle, sync idle, back to `Idle`.
    fn stand_down(&mut self) -> Result<RunState> {
        self.lox_valve.set_idle().map_err(hw)?;
        self.ipa_valve.set_idle().map_err(hw)?;
        self.sync.set_sync_out(false).map_err(hw)?;
        self.state = RunState::Idle;
        Ok(RunState::Idle)
    }

    /// Starting command for arming (no snapshot yet).
    fn compute_command(&mut self, t: f32) -> Result<TickCommand> {
        if self.curve.is_thrust()? && self.control.use_live_conditions {
            let sd = self.sensors.snapshot(self.defaults.ipa_temperature)?;
            self.compute_command_with(t, Some(&sd))
        } else {
            self.compute_command_with(t, None)
        }
    }

    fn compute_command_with(&mut self, t: f32, sd: Option<&SensorSnapshot>) -> Result<TickCommand> {
        if self.curve.is_thrust()? {
            let thrust = self.curve.thrust_at(t)?;
            let (angles, model): (ValveAngles, ModelState) =
                match (self.control.use_live_conditions, sd) {
                    (true, Some(sd)) => physics::open_loop_thrust_control(thrust.thrust, sd),
                    _ => physics::open_loop_thrust_control_defaults(thrust.thrust, &self.defaults),
                };
            Ok(TickCommand {
                segment: thrust.segment,
                thrust_lbf: thrust.thrust,
                lox: angles.lox / 90.0,
                ipa: angles.ipa / 90.0,
                model,
            })
        } else {
            let cmd = self.curve.angles_at(t)?;
            Ok(TickCommand {
                segment: cmd.segment,
                thrust_lbf: -1.0,
                lox: cmd.lox_angle / 90.0,
                ipa: cmd.ipa_angle / 90.0,
                model: ModelState::default(),
            })
        }
    }

    fn build_record(
        &mut self,
        elapsed_s: f32,
        sd: &SensorSnapshot,
        cmd: &TickCommand,
    ) -> Result<TelemetryRecord> {
        Ok(TelemetryRecord {
            elapsed_s,
            segment: cmd.segment,
            thrust_cmd_lbf: cmd.thrust_lbf,
            lox_cmd: cmd.lox,
            ipa_cmd: cmd.ipa,
            lox_live: self.lox_valve.live_position().map_err(hw)?,
            ipa_live: self.ipa_valve.live_position().map_err(hw)?,
            sensors: *sd,
            pi: self.pi_telemetry(),
            model: cmd.model,
        })
    }

    fn pi_telemetry(&self) -> PiTelemetry {
        self.pi.telemetry()
    }
}

fn hw(e: Box<dyn std::error::Error + Send + Sync>) -> eyre::Report {
    eyre::Report::new(CoreError::Hardware(e.to_string()))
}

fn observe(valve: &mut dyn ValveActuator) -> Result<ValveObservation> {
    Ok(ValveObservation {
        live_position: valve.live_position().map_err(hw)?,
        last_commanded: valve.last_commanded_position(),
        control_state: valve.control_state().map_err(hw)?,
    })
}

/// Builder for `CurveFollower`. Collaborators are required; config
/// sections fall back to their defaults. All validation happens in
/// `try_build`.
#[derive(Default)]
pub struct FollowerBuilder {
    lox_valve: Option<Box<dyn ValveActuator>>,
    ipa_valve: Option<Box<dyn ValveActuator>>,
    sensors: Option<SensorSuite>,
    sync: Option<Box<dyn FacilitySync>>,
    sink: Option<Box<dyn TelemetrySink>>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    control: Option<ControlCfg>,
    safety: Option<SafetyCfg>,
    bounds: Option<BoundsCfg>,
    defaults: Option<DefaultConditionsCfg>,
    abort_check: Option<Box<dyn Fn() -> bool>>,
    watchdog: Option<Watchdog>,
}

impl FollowerBuilder {
    pub fn lox_valve(mut self, v: Box<dyn ValveActuator>) -> Self {
        self.lox_valve = Some(v);
        self
    }

    pub fn ipa_valve(mut self, v: Box<dyn ValveActuator>) -> Self {
        self.ipa_valve = Some(v);
        self
    }

    pub fn sensors(mut self, s: SensorSuite) -> Self {
        self.sensors = Some(s);
        self
    }

    pub fn sync(mut self, s: Box<dyn FacilitySync>) -> Self {
        self.sync = Some(s);
        self
    }

    pub fn sink(mut self, s: Box<dyn TelemetrySink>) -> Self {
        self.sink = Some(s);
        self
    }

    pub fn clock(mut self, c: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(c);
        self
    }

    pub fn control(mut self, c: ControlCfg) -> Self {
        self.control = Some(c);
        self
    }

    pub fn safety(mut self, s: SafetyCfg) -> Self {
        self.safety = Some(s);
        self
    }

    pub fn bounds(mut self, b: BoundsCfg) -> Self {
        self.bounds = Some(b);
        self
    }

    pub fn defaults(mut self, d: DefaultConditionsCfg) -> Self {
        self.defaults = Some(d);
        self
    }

    /// Operator-abort poll, typically wired to SIGINT.
    pub fn abort_check(mut self, f: Box<dyn Fn() -> bool>) -> Self {
        self.abort_check = Some(f);
        self
    }

    pub fn watchdog(mut self, wd: Watchdog) -> Self {
        self.watchdog = Some(wd);
        self
    }

    pub fn try_build(self) -> Result<CurveFollower> {
        let lox_valve = self
            .lox_valve
            .ok_or_else(|| eyre::Report::new(BuildError::Missing("lox valve")))?;
        let ipa_valve = self
            .ipa_valve
            .ok_or_else(|| eyre::Report::new(BuildError::Missing("ipa valve")))?;
        let sensors = self
            .sensors
            .ok_or_else(|| eyre::Report::new(BuildError::Missing("sensor suite")))?;
        let sync = self
            .sync
            .ok_or_else(|| eyre::Report::new(BuildError::Missing("facility sync")))?;
        let sink = self
            .sink
            .ok_or_else(|| eyre::Report::new(BuildError::Missing("telemetry sink")))?;

        let control = self.control.unwrap_or_default();
        let safety = self.safety.unwrap_or_default();
        let bounds = self.bounds.unwrap_or_default();
        let defaults = self.defaults.unwrap_or_default();

        if control.command_interval_ms == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "command_interval_ms must be >= 1",
            )));
        }
        if control.log_interval_ms < control.command_interval_ms {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "log_interval_ms must be >= command_interval_ms",
            )));
        }
        if safety.deviation_threshold_deg <= 0.0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "deviation_threshold_deg must be > 0",
            )));
        }

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));

        Ok(CurveFollower {
            curve: CurveStore::new(),
            latch: FaultLatch::new(),
            comparators: ComparatorBank::from_bounds(&bounds),
            pi: ClosedLoopBank::default(),
            lox_valve,
            ipa_valve,
            sensors,
            sync,
            sink,
            clock,
            control,
            checks: SafetyChecks::from(&safety),
            defaults: DefaultConditions::from(defaults),
            abort_check: self.abort_check,
            watchdog: self.watchdog,
            state: RunState::Idle,
            calibrated: false,
            abort_requested: false,
            last_kill: None,
        })
    }
}
