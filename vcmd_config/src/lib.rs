#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas for the valve-commanding controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Safety-check toggles are runtime values, each independently
//!   switchable, defaulting to all-enabled.

use serde::Deserialize;

/// Control-loop cadence and thrust-curve options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlCfg {
    /// Command tick period in milliseconds.
    pub command_interval_ms: u64,
    /// Telemetry record period in milliseconds; must be >= command period.
    pub log_interval_ms: u64,
    /// How long the starting command is held during arming before the
    /// operator is asked to confirm.
    pub settle_ms: u64,
    /// Thrust curves: feed the physics model live sensor conditions
    /// instead of the configured defaults.
    pub use_live_conditions: bool,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            command_interval_ms: 1,
            log_interval_ms: 5,
            settle_ms: 2000,
            use_live_conditions: false,
        }
    }
}

/// Per-check kill toggles. The historic build used compile-time switches;
/// these are the runtime replacements and default to all-enabled.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SafetyCfg {
    pub facility_fault: bool,
    pub operator_abort: bool,
    pub position_deviation: bool,
    pub actuator_state: bool,
    pub window_comparators: bool,
    /// Kill if a valve's live angle differs from its last command by more
    /// than this many degrees.
    pub deviation_threshold_deg: f32,
    /// Position-deviation checks only start this long into the run, so
    /// the actuators have time to catch the initial command.
    pub deviation_grace_s: f32,
}

impl Default for SafetyCfg {
    fn default() -> Self {
        Self {
            facility_fault: true,
            operator_abort: true,
            position_deviation: true,
            actuator_state: true,
            window_comparators: true,
            deviation_threshold_deg: 10.0,
            deviation_grace_s: 3.0,
        }
    }
}

/// One window-comparator bound pair.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Bound {
    pub min: f32,
    pub max: f32,
}

impl Bound {
    const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }
}

/// Per-signal comparator windows. Pressures in psi, temperatures in K.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BoundsCfg {
    pub lox_tank_pressure: Bound,
    pub lox_venturi_upstream_pressure: Bound,
    pub lox_venturi_throat_pressure: Bound,
    pub lox_valve_temperature: Bound,
    pub lox_venturi_temperature: Bound,
    pub ipa_tank_pressure: Bound,
    pub ipa_venturi_upstream_pressure: Bound,
    pub ipa_venturi_throat_pressure: Bound,
    pub chamber_pressure: Bound,
}

impl Default for BoundsCfg {
    fn default() -> Self {
        Self {
            lox_tank_pressure: Bound::new(0.0, 1000.0),
            lox_venturi_upstream_pressure: Bound::new(0.0, 1000.0),
            lox_venturi_throat_pressure: Bound::new(0.0, 1000.0),
            lox_valve_temperature: Bound::new(55.0, 300.0),
            lox_venturi_temperature: Bound::new(55.0, 300.0),
            ipa_tank_pressure: Bound::new(0.0, 1000.0),
            ipa_venturi_upstream_pressure: Bound::new(0.0, 1000.0),
            ipa_venturi_throat_pressure: Bound::new(0.0, 1000.0),
            chamber_pressure: Bound::new(-15.0, 650.0),
        }
    }
}

/// Fluid conditions assumed by the physics model when live readings are
/// not used (thrust curves with `use_live_conditions = false`).
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct DefaultConditionsCfg {
    /// psi upstream of the LOX valve.
    pub lox_upstream_pressure: f32,
    /// psi upstream of the IPA valve.
    pub ipa_upstream_pressure: f32,
    /// LOX temperature at the valve, K.
    pub lox_temperature: f32,
    /// IPA temperature, K (ambient).
    pub ipa_temperature: f32,
}

impl Default for DefaultConditionsCfg {
    fn default() -> Self {
        Self {
            lox_upstream_pressure: 820.0,
            ipa_upstream_pressure: 820.0,
            lox_temperature: 90.0,
            ipa_temperature: 294.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingCfg {
    /// Path for the tracing log file (JSON lines); stderr when absent.
    pub file: Option<String>,
    /// "info", "debug", ...
    pub level: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WatchdogCfg {
    pub enabled: bool,
    /// Heartbeat period in milliseconds.
    pub period_ms: u64,
}

impl Default for WatchdogCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            period_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub control: ControlCfg,
    pub safety: SafetyCfg,
    pub bounds: BoundsCfg,
    pub defaults: DefaultConditionsCfg,
    pub logging: LoggingCfg,
    pub watchdog: WatchdogCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        if self.control.command_interval_ms == 0 {
            eyre::bail!("control.command_interval_ms must be >= 1");
        }
        if self.control.log_interval_ms < self.control.command_interval_ms {
            eyre::bail!("control.log_interval_ms must be >= control.command_interval_ms");
        }
        if self.control.settle_ms > 60_000 {
            eyre::bail!("control.settle_ms is unreasonably large (>60s)");
        }

        if !self.safety.deviation_threshold_deg.is_finite()
            || self.safety.deviation_threshold_deg <= 0.0
        {
            eyre::bail!("safety.deviation_threshold_deg must be a positive number");
        }
        if !self.safety.deviation_grace_s.is_finite() || self.safety.deviation_grace_s < 0.0 {
            eyre::bail!("safety.deviation_grace_s must be >= 0");
        }

        for (name, b) in self.bounds.iter() {
            if !b.min.is_finite() || !b.max.is_finite() {
                eyre::bail!("bounds.{name}: min/max must be finite");
            }
            if b.min >= b.max {
                eyre::bail!("bounds.{name}: min must be < max");
            }
        }

        if self.defaults.lox_upstream_pressure <= 0.0 || self.defaults.ipa_upstream_pressure <= 0.0
        {
            eyre::bail!("defaults: upstream pressures must be > 0");
        }
        if self.defaults.lox_temperature <= 0.0 || self.defaults.ipa_temperature <= 0.0 {
            eyre::bail!("defaults: temperatures must be > 0 K");
        }

        if self.watchdog.period_ms == 0 {
            eyre::bail!("watchdog.period_ms must be >= 1");
        }

        Ok(())
    }
}

impl BoundsCfg {
    /// Bounds with their config key names, in telemetry order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Bound)> {
        [
            ("lox_tank_pressure", self.lox_tank_pressure),
            (
                "lox_venturi_upstream_pressure",
                self.lox_venturi_upstream_pressure,
            ),
            (
                "lox_venturi_throat_pressure",
                self.lox_venturi_throat_pressure,
            ),
            ("lox_valve_temperature", self.lox_valve_temperature),
            ("lox_venturi_temperature", self.lox_venturi_temperature),
            ("ipa_tank_pressure", self.ipa_tank_pressure),
            (
                "ipa_venturi_upstream_pressure",
                self.ipa_venturi_upstream_pressure,
            ),
            (
                "ipa_venturi_throat_pressure",
                self.ipa_venturi_throat_pressure,
            ),
            ("chamber_pressure", self.chamber_pressure),
        ]
        .into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_validate() {
        let cfg = Config::default();
        cfg.validate().unwrap();
    }

    #[test]
    fn empty_toml_is_all_defaults() {
        let cfg = load_toml("").unwrap();
        assert!(cfg.safety.window_comparators);
        assert_eq!(cfg.control.command_interval_ms, 1);
        assert_eq!(cfg.control.log_interval_ms, 5);
    }

    #[test]
    fn partial_toml_overrides() {
        let cfg = load_toml(
            r#"
            [control]
            log_interval_ms = 10

            [safety]
            operator_abort = false

            [bounds.chamber_pressure]
            min = 0.0
            max = 500.0
        "#,
        )
        .unwrap();
        assert_eq!(cfg.control.log_interval_ms, 10);
        assert!(!cfg.safety.operator_abort);
        assert!(cfg.safety.facility_fault);
        assert_eq!(cfg.bounds.chamber_pressure.max, 500.0);
        cfg.validate().unwrap();
    }

    #[rstest]
    #[case("[control]\ncommand_interval_ms = 0")]
    #[case("[control]\ncommand_interval_ms = 5\nlog_interval_ms = 1")]
    #[case("[safety]\ndeviation_threshold_deg = -1.0")]
    #[case("[bounds.lox_tank_pressure]\nmin = 10.0\nmax = 10.0")]
    #[case("[watchdog]\nperiod_ms = 0")]
    fn bad_configs_rejected(#[case] toml: &str) {
        let cfg = load_toml(toml).unwrap();
        assert!(cfg.validate().is_err());
    }
}
