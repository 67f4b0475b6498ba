//! Sensor suite: the nine monitored channels, atomic per-tick snapshots,
//! and zero-calibration plumbing.

use crate::calibration::ZeroCalibration;
use crate::error::CoreError;
use vcmd_traits::Sensor;

/// Identity of each monitored signal; also the comparator id reported in
/// fault diagnostics and the field order of the zero-calibration blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum SignalId {
    LoxTankPressure = 0,
    LoxVenturiUpstreamPressure,
    LoxVenturiThroatPressure,
    LoxValveTemperature,
    LoxVenturiTemperature,
    IpaTankPressure,
    IpaVenturiUpstreamPressure,
    IpaVenturiThroatPressure,
    ChamberPressure,
}

pub const SIGNAL_COUNT: usize = 9;

impl SignalId {
    pub const ALL: [SignalId; SIGNAL_COUNT] = [
        SignalId::LoxTankPressure,
        SignalId::LoxVenturiUpstreamPressure,
        SignalId::LoxVenturiThroatPressure,
        SignalId::LoxValveTemperature,
        SignalId::LoxVenturiTemperature,
        SignalId::IpaTankPressure,
        SignalId::IpaVenturiUpstreamPressure,
        SignalId::IpaVenturiThroatPressure,
        SignalId::ChamberPressure,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SignalId::LoxTankPressure => "lox_tank_pressure",
            SignalId::LoxVenturiUpstreamPressure => "lox_venturi_upstream_pressure",
            SignalId::LoxVenturiThroatPressure => "lox_venturi_throat_pressure",
            SignalId::LoxValveTemperature => "lox_valve_temperature",
            SignalId::LoxVenturiTemperature => "lox_venturi_temperature",
            SignalId::IpaTankPressure => "ipa_tank_pressure",
            SignalId::IpaVenturiUpstreamPressure => "ipa_venturi_upstream_pressure",
            SignalId::IpaVenturiThroatPressure => "ipa_venturi_throat_pressure",
            SignalId::ChamberPressure => "chamber_pressure",
        }
    }

    /// Pressure channels get a new offset during zero calibration;
    /// temperature channels keep theirs.
    pub fn is_pressure(self) -> bool {
        !matches!(
            self,
            SignalId::LoxValveTemperature | SignalId::LoxVenturiTemperature
        )
    }
}

/// Readings along one propellant feed line. Pressures in psi,
/// temperatures in K.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FluidLine {
    pub tank_pressure: f32,
    pub venturi_upstream_pressure: f32,
    pub venturi_throat_pressure: f32,
    pub valve_temperature: f32,
    pub venturi_temperature: f32,
}

impl FluidLine {
    /// Differential pressure across the venturi, psi.
    pub fn venturi_differential_pressure(&self) -> f32 {
        self.venturi_upstream_pressure - self.venturi_throat_pressure
    }

    /// Pressure upstream of the valve; the tank transducer is the closest
    /// measurement on this feed system.
    pub fn valve_upstream_pressure(&self) -> f32 {
        self.tank_pressure
    }
}

/// One atomic set of readings taken at the start of a tick; immutable for
/// the duration of that tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorSnapshot {
    pub lox: FluidLine,
    pub ipa: FluidLine,
    pub chamber_pressure: f32,
}

/// The physical sensor set. There is no IPA-side thermocouple on the
/// stand; the IPA line temperature in each snapshot is the configured
/// ambient value passed to `snapshot`.
pub struct SensorSuite {
    pub lox_tank: Box<dyn Sensor>,
    pub lox_venturi_upstream: Box<dyn Sensor>,
    pub lox_venturi_throat: Box<dyn Sensor>,
    pub lox_valve_temperature: Box<dyn Sensor>,
    pub lox_venturi_temperature: Box<dyn Sensor>,
    pub ipa_tank: Box<dyn Sensor>,
    pub ipa_venturi_upstream: Box<dyn Sensor>,
    pub ipa_venturi_throat: Box<dyn Sensor>,
    pub chamber: Box<dyn Sensor>,
}

impl std::fmt::Debug for SensorSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorSuite").finish_non_exhaustive()
    }
}

impl SensorSuite {
    fn get_mut(&mut self, id: SignalId) -> &mut Box<dyn Sensor> {
        match id {
            SignalId::LoxTankPressure => &mut self.lox_tank,
            SignalId::LoxVenturiUpstreamPressure => &mut self.lox_venturi_upstream,
            SignalId::LoxVenturiThroatPressure => &mut self.lox_venturi_throat,
            SignalId::LoxValveTemperature => &mut self.lox_valve_temperature,
            SignalId::LoxVenturiTemperature => &mut self.lox_venturi_temperature,
            SignalId::IpaTankPressure => &mut self.ipa_tank,
            SignalId::IpaVenturiUpstreamPressure => &mut self.ipa_venturi_upstream,
            SignalId::IpaVenturiThroatPressure => &mut self.ipa_venturi_throat,
            SignalId::ChamberPressure => &mut self.chamber,
        }
    }

    fn read(&mut self, id: SignalId) -> Result<f32, CoreError> {
        self.get_mut(id)
            .read()
            .map_err(|e| CoreError::Hardware(format!("{}: {e}", id.name())))
    }

    /// Sample every channel once, at the start of a tick.
    pub fn snapshot(&mut self, ipa_temperature: f32) -> Result<SensorSnapshot, CoreError> {
        Ok(SensorSnapshot {
            lox: FluidLine {
                tank_pressure: self.read(SignalId::LoxTankPressure)?,
                venturi_upstream_pressure: self.read(SignalId::LoxVenturiUpstreamPressure)?,
                venturi_throat_pressure: self.read(SignalId::LoxVenturiThroatPressure)?,
                valve_temperature: self.read(SignalId::LoxValveTemperature)?,
                venturi_temperature: self.read(SignalId::LoxVenturiTemperature)?,
            },
            ipa: FluidLine {
                tank_pressure: self.read(SignalId::IpaTankPressure)?,
                venturi_upstream_pressure: self.read(SignalId::IpaVenturiUpstreamPressure)?,
                venturi_throat_pressure: self.read(SignalId::IpaVenturiThroatPressure)?,
                valve_temperature: ipa_temperature,
                venturi_temperature: ipa_temperature,
            },
            chamber_pressure: self.read(SignalId::ChamberPressure)?,
        })
    }

    /// Capture a fresh zero: pressure channels get an offset that nulls
    /// their current reading, temperature channels keep their offsets.
    pub fn capture_zero(&mut self) -> Result<ZeroCalibration, CoreError> {
        let mut offsets = [0.0f32; SIGNAL_COUNT];
        for id in SignalId::ALL {
            let sensor = self.get_mut(id);
            let current_offset = sensor.offset();
            let new_offset = if id.is_pressure() {
                let value = self.read(id)?;
                let sensor = self.get_mut(id);
                let off = sensor.offset() - value;
                sensor.set_offset(off);
                off
            } else {
                current_offset
            };
            offsets[id as usize] = new_offset;
        }
        tracing::info!("sensor zero captured");
        Ok(ZeroCalibration::new(offsets))
    }

    /// Push a restored zero-calibration record into the sensors.
    pub fn apply_calibration(&mut self, cal: &ZeroCalibration) {
        for id in SignalId::ALL {
            self.get_mut(id).set_offset(cal.offset(id));
        }
    }
}
