pub mod clock;

pub use clock::{Clock, MonotonicClock, TestClock};

pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// A single calibrated sensor channel (pressure in psi, temperature in K
/// unless documented otherwise per signal).
pub trait Sensor {
    /// Latest reading in physical units, with the zero offset applied.
    fn read(&mut self) -> HwResult<f32>;

    /// Additive zero offset applied to every subsequent read.
    fn set_offset(&mut self, offset: f32);
    fn offset(&self) -> f32;
}

/// Reported control state of a valve actuator. `ClosedLoop` is the only
/// nominal state while a curve is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValveControlState {
    Idle,
    ClosedLoop,
    Fault,
}

/// One propellant valve actuator. Positions are normalized: 0.0 is fully
/// closed, 1.0 is 90 degrees open.
pub trait ValveActuator {
    fn set_position(&mut self, normalized: f32) -> HwResult<()>;

    /// The last position this controller commanded (not the live encoder).
    fn last_commanded_position(&self) -> f32;

    /// Live position reported by the actuator.
    fn live_position(&mut self) -> HwResult<f32>;

    fn control_state(&mut self) -> HwResult<ValveControlState>;

    /// Put the actuator into position-tracking mode.
    fn enable(&mut self) -> HwResult<()>;

    /// Drop to the safe idle state (no torque, commands ignored).
    fn set_idle(&mut self) -> HwResult<()>;

    fn clear_faults(&mut self) -> HwResult<()>;
}

/// Digital handshake with the external test-stand facility.
///
/// Polarity is canonical across this workspace: logical `true` is always
/// the asserted meaning of the line. `fault_in() == true` means the
/// facility is faulted, `go_in() == true` means the facility released the
/// run, `set_sync_out(true)` advertises that a curve is running and
/// `set_fault_out(true)` reports our own fault. Hardware implementations
/// with inverted physical lines translate internally.
pub trait FacilitySync {
    fn fault_in(&mut self) -> HwResult<bool>;
    fn go_in(&mut self) -> HwResult<bool>;
    fn set_fault_out(&mut self, asserted: bool) -> HwResult<()>;
    fn set_sync_out(&mut self, running: bool) -> HwResult<()>;

    /// Analog valve-position telemetry mirrored out to the facility.
    fn send_valve_positions(&mut self, lox: f32, ipa: f32) -> HwResult<()>;
}
