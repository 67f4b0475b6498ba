//! Per-tick telemetry record and the sink seam the run loop writes to.
//!
//! The record's field order is fixed; `FIELD_NAMES` and `values()` stay in
//! lockstep so file writers can emit a header once and rows thereafter.

use crate::error::CoreError;
use crate::physics::ModelState;
use crate::pi::PiTelemetry;
use crate::sensors::SensorSnapshot;

/// Number of numeric fields in one record.
pub const FIELD_COUNT: usize = 28;

/// Column names, in record order.
pub const FIELD_NAMES: [&str; FIELD_COUNT] = [
    "elapsed_s",
    "segment",
    "thrust_cmd_lbf",
    "lox_cmd",
    "ipa_cmd",
    "lox_live",
    "ipa_live",
    "lox_tank_pressure",
    "lox_venturi_upstream_pressure",
    "lox_venturi_throat_pressure",
    "lox_valve_temperature",
    "lox_venturi_temperature",
    "ipa_tank_pressure",
    "ipa_venturi_upstream_pressure",
    "ipa_venturi_throat_pressure",
    "chamber_pressure",
    "chamber_pressure_p",
    "chamber_pressure_i",
    "lox_angle_p",
    "lox_angle_i",
    "ipa_angle_p",
    "ipa_angle_i",
    "ol_lox_mdot",
    "ol_ipa_mdot",
    "measured_lox_mdot",
    "measured_ipa_mdot",
    "ol_lox_angle",
    "ol_ipa_angle",
];

/// One append-only telemetry row, captured on the log cadence.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetryRecord {
    /// Seconds since the run signal.
    pub elapsed_s: f32,
    /// Index of the curve segment the command came from.
    pub segment: usize,
    /// Commanded thrust, lbf; -1.0 for angle-form curves.
    pub thrust_cmd_lbf: f32,
    /// Normalized valve commands issued this tick.
    pub lox_cmd: f32,
    pub ipa_cmd: f32,
    /// Normalized live positions reported by the actuators.
    pub lox_live: f32,
    pub ipa_live: f32,
    pub sensors: SensorSnapshot,
    pub pi: PiTelemetry,
    pub model: ModelState,
}

impl TelemetryRecord {
    /// Flatten to numeric fields in `FIELD_NAMES` order.
    pub fn values(&self) -> [f32; FIELD_COUNT] {
        let s = &self.sensors;
        let p = &self.pi;
        let m = &self.model;
        [
            self.elapsed_s,
            self.segment as f32,
            self.thrust_cmd_lbf,
            self.lox_cmd,
            self.ipa_cmd,
            self.lox_live,
            self.ipa_live,
            s.lox.tank_pressure,
            s.lox.venturi_upstream_pressure,
            s.lox.venturi_throat_pressure,
            s.lox.valve_temperature,
            s.lox.venturi_temperature,
            s.ipa.tank_pressure,
            s.ipa.venturi_upstream_pressure,
            s.ipa.venturi_throat_pressure,
            s.chamber_pressure,
            p.chamber_pressure_p,
            p.chamber_pressure_i,
            p.lox_angle_p,
            p.lox_angle_i,
            p.ipa_angle_p,
            p.ipa_angle_i,
            m.ol_lox_mdot,
            m.ol_ipa_mdot,
            m.measured_lox_mdot,
            m.measured_ipa_mdot,
            m.ol_lox_angle,
            m.ol_ipa_angle,
        ]
    }
}

/// Where records go: a CSV file in the operator front end, a `Vec` in
/// tests. `finish` flushes and closes the per-run output.
pub trait TelemetrySink {
    fn append(&mut self, record: &TelemetryRecord) -> Result<(), CoreError>;
    fn finish(&mut self) -> Result<(), CoreError>;
}

/// In-memory sink for tests and dry runs.
#[derive(Debug, Default)]
pub struct VecSink {
    pub records: Vec<TelemetryRecord>,
    pub finished: bool,
}

impl TelemetrySink for VecSink {
    fn append(&mut self, record: &TelemetryRecord) -> Result<(), CoreError> {
        self.records.push(*record);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), CoreError> {
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_values_stay_in_lockstep() {
        let mut rec = TelemetryRecord::default();
        rec.elapsed_s = 1.25;
        rec.segment = 3;
        rec.thrust_cmd_lbf = -1.0;
        rec.model.ol_ipa_angle = 42.0;
        let values = rec.values();
        assert_eq!(values.len(), FIELD_NAMES.len());
        assert_eq!(values[0], 1.25);
        assert_eq!(values[1], 3.0);
        assert_eq!(values[2], -1.0);
        assert_eq!(values[FIELD_COUNT - 1], 42.0);
    }

    #[test]
    fn vec_sink_collects_and_finishes() {
        let mut sink = VecSink::default();
        sink.append(&TelemetryRecord::default()).unwrap();
        sink.append(&TelemetryRecord::default()).unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.records.len(), 2);
        assert!(sink.finished);
    }
}
