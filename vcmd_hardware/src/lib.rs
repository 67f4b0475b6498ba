#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Hardware implementations of the `vcmd_traits` seams.
//!
//! The default build carries only the simulated collaborators used by the
//! dry-run front end and the integration tests. Real DAQ and actuator
//! drivers build behind the `hardware` feature.

pub mod error;

use std::cell::Cell;
use std::rc::Rc;

use vcmd_traits::{FacilitySync, HwResult, Sensor, ValveActuator, ValveControlState};

use crate::error::HwError;

/// Simulated transducer: reads a steerable value plus the zero offset.
pub struct SimulatedSensor {
    value: Rc<Cell<f32>>,
    offset: f32,
}

impl SimulatedSensor {
    pub fn new(initial: f32) -> Self {
        Self {
            value: Rc::new(Cell::new(initial)),
            offset: 0.0,
        }
    }

    /// Handle for steering the raw value from outside (the simulation
    /// driver updates sensors between ticks).
    pub fn value_handle(&self) -> Rc<Cell<f32>> {
        Rc::clone(&self.value)
    }
}

impl Sensor for SimulatedSensor {
    fn read(&mut self) -> HwResult<f32> {
        Ok(self.value.get() + self.offset)
    }

    fn set_offset(&mut self, offset: f32) {
        self.offset = offset;
    }

    fn offset(&self) -> f32 {
        self.offset
    }
}

/// Simulated valve: the live position slews toward the last command at a
/// fixed per-read rate, like the real actuator's position loop.
pub struct SimulatedValve {
    name: &'static str,
    commanded: f32,
    live: f32,
    /// Max normalized position change applied per `live_position` read.
    slew_per_read: f32,
    state: ValveControlState,
    fault_line: Rc<Cell<bool>>,
}

impl SimulatedValve {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            commanded: 0.0,
            live: 0.0,
            slew_per_read: 0.05,
            state: ValveControlState::Idle,
            fault_line: Rc::new(Cell::new(false)),
        }
    }

    pub fn with_slew(mut self, slew_per_read: f32) -> Self {
        self.slew_per_read = slew_per_read;
        self
    }

    /// Handle for injecting an actuator fault from the simulation driver.
    pub fn fault_handle(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.fault_line)
    }

    fn step_live(&mut self) {
        let delta = self.commanded - self.live;
        self.live += delta.clamp(-self.slew_per_read, self.slew_per_read);
    }
}

impl ValveActuator for SimulatedValve {
    fn set_position(&mut self, normalized: f32) -> HwResult<()> {
        if self.state != ValveControlState::ClosedLoop {
            return Err(Box::new(HwError::Actuator(format!(
                "{} valve commanded while not in closed-loop",
                self.name
            ))));
        }
        self.commanded = normalized.clamp(0.0, 1.0);
        Ok(())
    }

    fn last_commanded_position(&self) -> f32 {
        self.commanded
    }

    fn live_position(&mut self) -> HwResult<f32> {
        self.step_live();
        Ok(self.live)
    }

    fn control_state(&mut self) -> HwResult<ValveControlState> {
        if self.fault_line.get() {
            self.state = ValveControlState::Fault;
        }
        Ok(self.state)
    }

    fn enable(&mut self) -> HwResult<()> {
        if self.fault_line.get() {
            return Err(Box::new(HwError::Actuator(format!(
                "{} valve faulted, clear before enabling",
                self.name
            ))));
        }
        tracing::debug!(valve = self.name, "valve enabled (simulated)");
        self.state = ValveControlState::ClosedLoop;
        Ok(())
    }

    fn set_idle(&mut self) -> HwResult<()> {
        tracing::debug!(valve = self.name, "valve idled (simulated)");
        self.state = ValveControlState::Idle;
        Ok(())
    }

    fn clear_faults(&mut self) -> HwResult<()> {
        self.fault_line.set(false);
        if self.state == ValveControlState::Fault {
            self.state = ValveControlState::Idle;
        }
        Ok(())
    }
}

/// Simulated facility handshake: the go line releases after a fixed
/// number of polls, the fault-in line is steerable.
pub struct SimulatedFacilitySync {
    go_after_polls: usize,
    polls: usize,
    fault_in: Rc<Cell<bool>>,
    sync_out: bool,
    fault_out: bool,
}

impl SimulatedFacilitySync {
    pub fn new(go_after_polls: usize) -> Self {
        Self {
            go_after_polls,
            polls: 0,
            fault_in: Rc::new(Cell::new(false)),
            sync_out: false,
            fault_out: false,
        }
    }

    pub fn fault_in_handle(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.fault_in)
    }
}

impl FacilitySync for SimulatedFacilitySync {
    fn fault_in(&mut self) -> HwResult<bool> {
        Ok(self.fault_in.get())
    }

    fn go_in(&mut self) -> HwResult<bool> {
        self.polls += 1;
        Ok(self.polls > self.go_after_polls)
    }

    fn set_fault_out(&mut self, asserted: bool) -> HwResult<()> {
        if asserted && !self.fault_out {
            tracing::warn!("fault line asserted toward facility (simulated)");
        }
        self.fault_out = asserted;
        Ok(())
    }

    fn set_sync_out(&mut self, running: bool) -> HwResult<()> {
        tracing::debug!(running, "sync line (simulated)");
        self.sync_out = running;
        Ok(())
    }

    fn send_valve_positions(&mut self, _lox: f32, _ipa: f32) -> HwResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn sensor_applies_offset_to_steered_value() {
        let mut s = SimulatedSensor::new(100.0);
        let handle = s.value_handle();
        s.set_offset(-100.0);
        assert_eq!(s.read().unwrap(), 0.0);
        handle.set(130.0);
        assert_eq!(s.read().unwrap(), 30.0);
    }

    #[test]
    fn valve_rejects_commands_until_enabled() {
        let mut v = SimulatedValve::new("lox");
        assert!(v.set_position(0.5).is_err());
        v.enable().unwrap();
        v.set_position(0.5).unwrap();
        assert_eq!(v.last_commanded_position(), 0.5);
    }

    #[rstest]
    #[case(0.5, 0.05, 10)]
    #[case(1.0, 0.25, 4)]
    fn valve_live_position_slews_to_command(
        #[case] target: f32,
        #[case] slew: f32,
        #[case] reads: usize,
    ) {
        let mut v = SimulatedValve::new("ipa").with_slew(slew);
        v.enable().unwrap();
        v.set_position(target).unwrap();
        let mut live = 0.0;
        for _ in 0..reads {
            live = v.live_position().unwrap();
        }
        assert!((live - target).abs() < 1e-5);
    }

    #[test]
    fn valve_fault_line_shows_up_in_control_state() {
        let mut v = SimulatedValve::new("lox");
        v.enable().unwrap();
        v.fault_handle().set(true);
        assert_eq!(v.control_state().unwrap(), ValveControlState::Fault);
        v.clear_faults().unwrap();
        assert_eq!(v.control_state().unwrap(), ValveControlState::Idle);
    }

    #[test]
    fn sync_releases_go_after_configured_polls() {
        let mut sync = SimulatedFacilitySync::new(2);
        assert!(!sync.go_in().unwrap());
        assert!(!sync.go_in().unwrap());
        assert!(sync.go_in().unwrap());
    }
}
