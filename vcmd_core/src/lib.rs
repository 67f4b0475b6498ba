#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Valve-commanding core for the engine test stand (hardware-agnostic).
//!
//! Drives the two propellant valves along a pre-loaded curve while
//! checking every monitored signal against its safety window each tick.
//! All hardware goes through the `vcmd_traits` seams.
//!
//! ## Layout
//!
//! - **interp**: linear interpolation and static lookup tables
//! - **curve**: versioned curve store, wire codec, per-tick lookup
//! - **physics**: thrust → valve-angle open-loop model
//! - **pi**: PI controllers for the dormant closed-loop path
//! - **safety**: window comparators, fault latch, kill precedence
//! - **follower**: the run state machine and real-time tick loop
//! - **watchdog**: loop-liveness monitor task
//! - **telemetry**: per-tick record and sink seam

pub mod calibration;
pub mod curve;
pub mod error;
pub mod follower;
pub mod interp;
pub mod mocks;
pub mod physics;
pub mod pi;
pub mod safety;
pub mod sensors;
pub mod telemetry;
pub mod watchdog;

pub use calibration::{ZERO_CAL_VERSION, ZeroCalibration};
pub use curve::{
    AngleCommand, AnglePoint, CURVE_SCHEMA_VERSION, Curve, CurveHeader, CurveStore, ThrustCommand,
    ThrustPoint,
};
pub use error::{BuildError, CoreError, Result};
pub use follower::{CurveFollower, FollowerBuilder, RunState};
pub use pi::{ClosedLoopBank, PiController, PiTelemetry};
pub use safety::{
    ComparatorBank, FaultDirection, FaultLatch, FaultRecord, KillReason, SafetyChecks, ValveId,
    WindowComparator,
};
pub use sensors::{FluidLine, SIGNAL_COUNT, SensorSnapshot, SensorSuite, SignalId};
pub use telemetry::{FIELD_COUNT, FIELD_NAMES, TelemetryRecord, TelemetrySink, VecSink};
pub use watchdog::Watchdog;
