//! Latched safety interlocks: per-signal window comparators, the shared
//! fault latch, and the kill decision with its fixed precedence order.

use crate::error::CoreError;
use crate::sensors::{SensorSnapshot, SignalId};
use vcmd_config::{BoundsCfg, SafetyCfg};
use vcmd_traits::{FacilitySync, ValveActuator, ValveControlState};

/// Which bound a latched fault breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultDirection {
    Underflow,
    Overflow,
}

/// Details of a latched comparator fault.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultRecord {
    pub cause: SignalId,
    pub direction: FaultDirection,
    pub observed: f32,
    pub bound: f32,
}

/// The single shared fault latch. Monotonic: the first breach since the
/// last `reset()` is retained, its fields fixed, no matter what later
/// samples do. Reset happens only at the start of a new run.
#[derive(Debug, Default)]
pub struct FaultLatch {
    record: Option<FaultRecord>,
}

impl FaultLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_error(&self) -> bool {
        self.record.is_some()
    }

    pub fn record(&self) -> Option<FaultRecord> {
        self.record
    }

    pub fn reset(&mut self) {
        self.record = None;
    }

    fn latch(&mut self, record: FaultRecord) {
        if self.record.is_some() {
            return;
        }
        tracing::warn!(
            signal = record.cause.name(),
            direction = ?record.direction,
            observed = record.observed,
            bound = record.bound,
            "window comparator latched"
        );
        self.record = Some(record);
    }
}

/// Min/max bound checker for one monitored signal.
#[derive(Debug, Clone, Copy)]
pub struct WindowComparator {
    pub id: SignalId,
    pub min: f32,
    pub max: f32,
}

impl WindowComparator {
    pub fn new(id: SignalId, min: f32, max: f32) -> Self {
        Self { id, min, max }
    }

    /// Latch an underflow/overflow into the shared latch. In-bound values
    /// never touch the latch; `reset()` is the only way to clear it.
    pub fn check(&self, latch: &mut FaultLatch, value: f32) {
        if value < self.min {
            latch.latch(FaultRecord {
                cause: self.id,
                direction: FaultDirection::Underflow,
                observed: value,
                bound: self.min,
            });
        }
        if value > self.max {
            latch.latch(FaultRecord {
                cause: self.id,
                direction: FaultDirection::Overflow,
                observed: value,
                bound: self.max,
            });
        }
    }
}

/// One comparator per monitored signal; every signal is checked every
/// tick regardless of curve type.
#[derive(Debug, Clone)]
pub struct ComparatorBank {
    comparators: [WindowComparator; crate::sensors::SIGNAL_COUNT],
}

impl ComparatorBank {
    pub fn from_bounds(bounds: &BoundsCfg) -> Self {
        let b = |id: SignalId, bound: vcmd_config::Bound| WindowComparator::new(id, bound.min, bound.max);
        Self {
            comparators: [
                b(SignalId::LoxTankPressure, bounds.lox_tank_pressure),
                b(
                    SignalId::LoxVenturiUpstreamPressure,
                    bounds.lox_venturi_upstream_pressure,
                ),
                b(
                    SignalId::LoxVenturiThroatPressure,
                    bounds.lox_venturi_throat_pressure,
                ),
                b(SignalId::LoxValveTemperature, bounds.lox_valve_temperature),
                b(
                    SignalId::LoxVenturiTemperature,
                    bounds.lox_venturi_temperature,
                ),
                b(SignalId::IpaTankPressure, bounds.ipa_tank_pressure),
                b(
                    SignalId::IpaVenturiUpstreamPressure,
                    bounds.ipa_venturi_upstream_pressure,
                ),
                b(
                    SignalId::IpaVenturiThroatPressure,
                    bounds.ipa_venturi_throat_pressure,
                ),
                b(SignalId::ChamberPressure, bounds.chamber_pressure),
            ],
        }
    }

    /// Check one snapshot against all nine windows.
    pub fn check_all(&self, latch: &mut FaultLatch, sd: &SensorSnapshot) {
        for c in &self.comparators {
            let value = match c.id {
                SignalId::LoxTankPressure => sd.lox.tank_pressure,
                SignalId::LoxVenturiUpstreamPressure => sd.lox.venturi_upstream_pressure,
                SignalId::LoxVenturiThroatPressure => sd.lox.venturi_throat_pressure,
                SignalId::LoxValveTemperature => sd.lox.valve_temperature,
                SignalId::LoxVenturiTemperature => sd.lox.venturi_temperature,
                SignalId::IpaTankPressure => sd.ipa.tank_pressure,
                SignalId::IpaVenturiUpstreamPressure => sd.ipa.venturi_upstream_pressure,
                SignalId::IpaVenturiThroatPressure => sd.ipa.venturi_throat_pressure,
                SignalId::ChamberPressure => sd.chamber_pressure,
            };
            c.check(latch, value);
        }
    }
}

/// Which valve a kill reason names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValveId {
    Lox,
    Ipa,
}

impl std::fmt::Display for ValveId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValveId::Lox => write!(f, "lox"),
            ValveId::Ipa => write!(f, "ipa"),
        }
    }
}

/// Kill causes in their fixed precedence order (highest first). When
/// several conditions are true in the same tick, `check_for_kill` reports
/// the highest-precedence one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KillReason {
    FacilityFault,
    OperatorAbort,
    PositionDeviation(ValveId),
    ActuatorFault(ValveId),
    SensorOutOfBounds(FaultRecord),
}

impl std::fmt::Display for KillReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KillReason::FacilityFault => write!(f, "facility abort line asserted"),
            KillReason::OperatorAbort => write!(f, "operator abort requested"),
            KillReason::PositionDeviation(v) => {
                write!(f, "{v} valve live angle not tracking commanded angle")
            }
            KillReason::ActuatorFault(v) => {
                write!(f, "{v} valve actuator left closed-loop control")
            }
            KillReason::SensorOutOfBounds(r) => {
                let (dir, rel) = match r.direction {
                    FaultDirection::Underflow => ("underflow", "<"),
                    FaultDirection::Overflow => ("overflow", ">"),
                };
                write!(
                    f,
                    "window comparator {} {dir}: {} {rel} {}",
                    r.cause.name(),
                    r.observed,
                    r.bound
                )
            }
        }
    }
}

/// Runtime toggles for the kill checks, plus the deviation parameters.
/// All checks default to enabled.
#[derive(Debug, Clone, Copy)]
pub struct SafetyChecks {
    pub facility_fault: bool,
    pub operator_abort: bool,
    pub position_deviation: bool,
    pub actuator_state: bool,
    pub window_comparators: bool,
    /// Normalized deviation (fraction of 90 degrees) that trips a kill.
    pub deviation_threshold: f32,
    /// Deviation checks only start this long into the run.
    pub deviation_grace_s: f32,
}

impl From<&SafetyCfg> for SafetyChecks {
    fn from(c: &SafetyCfg) -> Self {
        Self {
            facility_fault: c.facility_fault,
            operator_abort: c.operator_abort,
            position_deviation: c.position_deviation,
            actuator_state: c.actuator_state,
            window_comparators: c.window_comparators,
            deviation_threshold: c.deviation_threshold_deg / 90.0,
            deviation_grace_s: c.deviation_grace_s,
        }
    }
}

impl Default for SafetyChecks {
    fn default() -> Self {
        Self::from(&SafetyCfg::default())
    }
}

/// What the tick loop observed about one valve this tick.
#[derive(Debug, Clone, Copy)]
pub struct ValveObservation {
    pub live_position: f32,
    pub last_commanded: f32,
    pub control_state: ValveControlState,
}

/// Everything the kill decision needs, gathered once per tick.
#[derive(Debug, Clone, Copy)]
pub struct KillInputs {
    pub elapsed_s: f32,
    pub facility_fault: bool,
    pub operator_abort: bool,
    pub lox: ValveObservation,
    pub ipa: ValveObservation,
}

/// Evaluate the enabled kill checks in precedence order and return the
/// first positive, or `None` when the run may continue.
pub fn check_for_kill(
    checks: &SafetyChecks,
    inputs: &KillInputs,
    latch: &FaultLatch,
) -> Option<KillReason> {
    if checks.facility_fault && inputs.facility_fault {
        return Some(KillReason::FacilityFault);
    }

    if checks.operator_abort && inputs.operator_abort {
        return Some(KillReason::OperatorAbort);
    }

    if checks.position_deviation && inputs.elapsed_s > checks.deviation_grace_s {
        if (inputs.lox.live_position - inputs.lox.last_commanded).abs()
            > checks.deviation_threshold
        {
            return Some(KillReason::PositionDeviation(ValveId::Lox));
        }
        if (inputs.ipa.live_position - inputs.ipa.last_commanded).abs()
            > checks.deviation_threshold
        {
            return Some(KillReason::PositionDeviation(ValveId::Ipa));
        }
    }

    if checks.actuator_state {
        if inputs.lox.control_state != ValveControlState::ClosedLoop {
            return Some(KillReason::ActuatorFault(ValveId::Lox));
        }
        if inputs.ipa.control_state != ValveControlState::ClosedLoop {
            return Some(KillReason::ActuatorFault(ValveId::Ipa));
        }
    }

    if checks.window_comparators
        && let Some(record) = latch.record()
    {
        return Some(KillReason::SensorOutOfBounds(record));
    }

    None
}

/// Drive everything to the safe state: both valves idle, fault line
/// asserted toward the facility, cause logged. Always mutates actuator
/// and output state; there is no side-effect-free path through here.
pub fn kill_response(
    reason: &KillReason,
    lox: &mut dyn ValveActuator,
    ipa: &mut dyn ValveActuator,
    sync: &mut dyn FacilitySync,
) -> Result<(), CoreError> {
    let hw = |e: Box<dyn std::error::Error + Send + Sync>| CoreError::Hardware(e.to_string());
    lox.set_idle().map_err(hw)?;
    ipa.set_idle().map_err(hw)?;
    sync.set_fault_out(true).map_err(hw)?;
    tracing::error!(cause = %reason, "kill: valves idled, fault asserted to facility");
    Ok(())
}
