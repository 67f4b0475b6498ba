//! Assembles the simulated stand and drives one arm/confirm/run cycle.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eyre::WrapErr;
use vcmd_config::Config;
use vcmd_core::calibration::ZeroCalibration;
use vcmd_core::follower::{CurveFollower, RunState};
use vcmd_core::safety::KillReason;
use vcmd_core::sensors::SensorSuite;
use vcmd_core::watchdog::Watchdog;
use vcmd_hardware::{SimulatedFacilitySync, SimulatedSensor, SimulatedValve};
use vcmd_traits::clock::{Clock, MonotonicClock, TestClock};

use crate::sink::CsvSink;

pub struct RunArgs {
    pub curve: PathBuf,
    pub out: PathBuf,
    pub yes: bool,
    pub zero: Option<PathBuf>,
    pub zero_out: Option<PathBuf>,
    pub fast: bool,
    pub go_after_ms: u64,
}

/// Sensor suite with nominal pre-pressurization readings. The zero
/// capture nulls the pressure channels before the run.
fn simulated_sensors() -> SensorSuite {
    SensorSuite {
        lox_tank: Box::new(SimulatedSensor::new(2.1)),
        lox_venturi_upstream: Box::new(SimulatedSensor::new(1.4)),
        lox_venturi_throat: Box::new(SimulatedSensor::new(0.8)),
        lox_valve_temperature: Box::new(SimulatedSensor::new(90.0)),
        lox_venturi_temperature: Box::new(SimulatedSensor::new(90.0)),
        ipa_tank: Box::new(SimulatedSensor::new(1.7)),
        ipa_venturi_upstream: Box::new(SimulatedSensor::new(1.1)),
        ipa_venturi_throat: Box::new(SimulatedSensor::new(0.6)),
        chamber: Box::new(SimulatedSensor::new(0.3)),
    }
}

fn confirm_from_operator(follower: &CurveFollower) -> eyre::Result<bool> {
    let curve = follower.curve();
    let label = curve
        .header()
        .map(|h| h.label.clone())
        .unwrap_or_default();
    print!(
        "Curve \"{label}\" armed, start position held. Proceed? [y/N] "
    );
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

pub fn run_curve(cfg: &Config, args: &RunArgs) -> eyre::Result<()> {
    let bytes = std::fs::read(&args.curve)
        .wrap_err_with(|| format!("reading curve file {}", args.curve.display()))?;

    let clock: Arc<dyn Clock + Send + Sync> = if args.fast {
        Arc::new(TestClock::new())
    } else {
        Arc::new(MonotonicClock::new())
    };

    let go_after_polls = (args.go_after_ms / cfg.control.command_interval_ms.max(1)) as usize;
    let sink = CsvSink::create(&args.out)?;

    // SIGINT maps to the operator-abort token.
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .wrap_err("installing SIGINT handler")?;
    let abort_flag = Arc::clone(&interrupted);

    let mut builder = CurveFollower::builder()
        .lox_valve(Box::new(SimulatedValve::new("lox")))
        .ipa_valve(Box::new(SimulatedValve::new("ipa")))
        .sensors(simulated_sensors())
        .sync(Box::new(SimulatedFacilitySync::new(go_after_polls)))
        .sink(Box::new(sink))
        .clock(clock)
        .control(cfg.control.clone())
        .safety(cfg.safety.clone())
        .bounds(cfg.bounds.clone())
        .defaults(cfg.defaults)
        .abort_check(Box::new(move || abort_flag.load(Ordering::SeqCst)));

    if cfg.watchdog.enabled {
        let period = Duration::from_millis(cfg.watchdog.period_ms);
        builder = builder.watchdog(Watchdog::spawn(period, period * 2));
    }

    let mut follower = builder.try_build()?;
    follower.load_curve_bytes(&bytes)?;

    match &args.zero {
        Some(path) => {
            let blob = std::fs::read(path)
                .wrap_err_with(|| format!("reading zero calibration {}", path.display()))?;
            let cal = ZeroCalibration::decode(&blob)?;
            follower.apply_calibration(&cal);
            tracing::info!(file = %path.display(), "zero calibration restored");
        }
        None => {
            let cal = follower.capture_zero()?;
            if let Some(path) = &args.zero_out {
                std::fs::write(path, cal.encode())
                    .wrap_err_with(|| format!("writing zero calibration {}", path.display()))?;
                tracing::info!(file = %path.display(), "zero calibration saved");
            }
        }
    }

    follower.arm()?;
    if args.yes || confirm_from_operator(&follower)? {
        follower.confirm_start()?;
    } else {
        follower.decline_start()?;
        println!("Start declined; valves idled.");
        return Ok(());
    }

    println!("Waiting for facility go signal (Ctrl-C aborts)...");
    let end = follower.run()?;
    report_outcome(&follower, end, &args.out);
    Ok(())
}

fn report_outcome(follower: &CurveFollower, end: RunState, out: &Path) {
    match end {
        RunState::Completed => {
            println!("Run complete. Telemetry written to {}.", out.display());
        }
        RunState::Aborted => match follower.last_kill() {
            Some(reason) => println!("Run aborted: {reason}."),
            None => println!("Run aborted."),
        },
        RunState::Idle => println!("Run called off before the go signal."),
        other => println!("Run ended in unexpected state {other:?}."),
    }
    if matches!(end, RunState::Aborted)
        && let Some(KillReason::SensorOutOfBounds(rec)) = follower.last_kill()
    {
        println!(
            "  comparator: {} observed {} against bound {}",
            rec.cause.name(),
            rec.observed,
            rec.bound
        );
    }
}
