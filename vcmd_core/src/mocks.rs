//! Scripted test doubles for the follower's collaborators.
//!
//! Each double exposes a cloneable handle backed by shared state, so a
//! test can keep steering (and inspecting) a collaborator after the
//! follower has taken ownership of the boxed trait object.

use std::sync::{Arc, Mutex};

use vcmd_traits::{FacilitySync, HwResult, Sensor, ValveActuator, ValveControlState};

use crate::error::CoreError;
use crate::telemetry::{TelemetryRecord, TelemetrySink};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Shared f32 cell for steering a sensor mid-run.
#[derive(Debug, Clone, Default)]
pub struct SharedValue(Arc<Mutex<f32>>);

impl SharedValue {
    pub fn new(v: f32) -> Self {
        Self(Arc::new(Mutex::new(v)))
    }

    pub fn set(&self, v: f32) {
        *lock(&self.0) = v;
    }

    pub fn get(&self) -> f32 {
        *lock(&self.0)
    }
}

/// Sensor whose reading follows a `SharedValue`.
#[derive(Debug)]
pub struct ScriptedSensor {
    value: SharedValue,
    offset: f32,
}

impl ScriptedSensor {
    pub fn new(value: SharedValue) -> Self {
        Self { value, offset: 0.0 }
    }

    pub fn fixed(v: f32) -> Self {
        Self::new(SharedValue::new(v))
    }
}

impl Sensor for ScriptedSensor {
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

/// Sensor that always fails, for the hardware-fault paths.
#[derive(Debug, Default)]
pub struct FailingSensor;

impl Sensor for FailingSensor {
    fn read(&mut self) -> HwResult<f32> {
        Err(Box::new(std::io::Error::other("sensor offline")))
    }

    fn set_offset(&mut self, _offset: f32) {}

    fn offset(&self) -> f32 {
        0.0
    }
}

#[derive(Debug)]
struct ValveState {
    commands: Vec<f32>,
    last_cmd: f32,
    /// Added to the commanded position to fake a tracking error.
    live_skew: f32,
    control: ValveControlState,
    idle_calls: usize,
    enable_calls: usize,
    clear_calls: usize,
}

impl Default for ValveState {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            last_cmd: 0.0,
            live_skew: 0.0,
            control: ValveControlState::Idle,
            idle_calls: 0,
            enable_calls: 0,
            clear_calls: 0,
        }
    }
}

/// Inspection/steering handle for a `MockValve`.
#[derive(Debug, Clone, Default)]
pub struct MockValveHandle(Arc<Mutex<ValveState>>);

impl MockValveHandle {
    pub fn commands(&self) -> Vec<f32> {
        lock(&self.0).commands.clone()
    }

    pub fn last_command(&self) -> f32 {
        lock(&self.0).last_cmd
    }

    pub fn control_state(&self) -> ValveControlState {
        lock(&self.0).control
    }

    pub fn set_control_state(&self, s: ValveControlState) {
        lock(&self.0).control = s;
    }

    pub fn set_live_skew(&self, skew: f32) {
        lock(&self.0).live_skew = skew;
    }

    pub fn idle_calls(&self) -> usize {
        lock(&self.0).idle_calls
    }

    pub fn enable_calls(&self) -> usize {
        lock(&self.0).enable_calls
    }

    pub fn clear_calls(&self) -> usize {
        lock(&self.0).clear_calls
    }
}

/// Valve actuator that tracks commands perfectly unless skewed.
#[derive(Debug, Default)]
pub struct MockValve(Arc<Mutex<ValveState>>);

impl MockValve {
    pub fn new() -> (Self, MockValveHandle) {
        let state = Arc::new(Mutex::new(ValveState::default()));
        (Self(Arc::clone(&state)), MockValveHandle(state))
    }
}

impl ValveActuator for MockValve {
    fn set_position(&mut self, normalized: f32) -> HwResult<()> {
        let mut s = lock(&self.0);
        s.last_cmd = normalized;
        s.commands.push(normalized);
        Ok(())
    }

    fn last_commanded_position(&self) -> f32 {
        lock(&self.0).last_cmd
    }

    fn live_position(&mut self) -> HwResult<f32> {
        let s = lock(&self.0);
        Ok(s.last_cmd + s.live_skew)
    }

    fn control_state(&mut self) -> HwResult<ValveControlState> {
        Ok(lock(&self.0).control)
    }

    fn enable(&mut self) -> HwResult<()> {
        let mut s = lock(&self.0);
        s.enable_calls += 1;
        s.control = ValveControlState::ClosedLoop;
        Ok(())
    }

    fn set_idle(&mut self) -> HwResult<()> {
        let mut s = lock(&self.0);
        s.idle_calls += 1;
        s.control = ValveControlState::Idle;
        Ok(())
    }

    fn clear_faults(&mut self) -> HwResult<()> {
        let mut s = lock(&self.0);
        s.clear_calls += 1;
        if s.control == ValveControlState::Fault {
            s.control = ValveControlState::Idle;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SyncState {
    go_after_polls: usize,
    polls: usize,
    fault_in: bool,
    sync_out: bool,
    fault_out: bool,
    sent: Vec<(f32, f32)>,
}

/// Inspection/steering handle for a `MockSync`.
#[derive(Debug, Clone, Default)]
pub struct MockSyncHandle(Arc<Mutex<SyncState>>);

impl MockSyncHandle {
    pub fn set_fault_in(&self, v: bool) {
        lock(&self.0).fault_in = v;
    }

    pub fn sync_out(&self) -> bool {
        lock(&self.0).sync_out
    }

    pub fn fault_out(&self) -> bool {
        lock(&self.0).fault_out
    }

    pub fn sent_positions(&self) -> Vec<(f32, f32)> {
        lock(&self.0).sent.clone()
    }
}

/// Facility sync that releases the go line after a fixed number of polls.
#[derive(Debug, Default)]
pub struct MockSync(Arc<Mutex<SyncState>>);

impl MockSync {
    pub fn go_after(polls: usize) -> (Self, MockSyncHandle) {
        let state = Arc::new(Mutex::new(SyncState {
            go_after_polls: polls,
            ..SyncState::default()
        }));
        (Self(Arc::clone(&state)), MockSyncHandle(state))
    }
}

impl FacilitySync for MockSync {
    fn fault_in(&mut self) -> HwResult<bool> {
        Ok(lock(&self.0).fault_in)
    }

    fn go_in(&mut self) -> HwResult<bool> {
        let mut s = lock(&self.0);
        s.polls += 1;
        Ok(s.polls > s.go_after_polls)
    }

    fn set_fault_out(&mut self, asserted: bool) -> HwResult<()> {
        lock(&self.0).fault_out = asserted;
        Ok(())
    }

    fn set_sync_out(&mut self, running: bool) -> HwResult<()> {
        lock(&self.0).sync_out = running;
        Ok(())
    }

    fn send_valve_positions(&mut self, lox: f32, ipa: f32) -> HwResult<()> {
        lock(&self.0).sent.push((lox, ipa));
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SinkState {
    records: Vec<TelemetryRecord>,
    finished: bool,
}

/// Inspection handle for a `SharedSink`.
#[derive(Debug, Clone, Default)]
pub struct SharedSinkHandle(Arc<Mutex<SinkState>>);

impl SharedSinkHandle {
    pub fn records(&self) -> Vec<TelemetryRecord> {
        lock(&self.0).records.clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.0).records.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.0).records.is_empty()
    }

    pub fn finished(&self) -> bool {
        lock(&self.0).finished
    }
}

/// Telemetry sink a test can keep reading after handing it over.
#[derive(Debug, Default)]
pub struct SharedSink(Arc<Mutex<SinkState>>);

impl SharedSink {
    pub fn new() -> (Self, SharedSinkHandle) {
        let state = Arc::new(Mutex::new(SinkState::default()));
        (Self(Arc::clone(&state)), SharedSinkHandle(state))
    }
}

impl TelemetrySink for SharedSink {
    fn append(&mut self, record: &TelemetryRecord) -> Result<(), CoreError> {
        lock(&self.0).records.push(*record);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), CoreError> {
        lock(&self.0).finished = true;
        Ok(())
    }
}
