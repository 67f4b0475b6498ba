#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Operator front end for the valve commander.

mod cli;
mod run;
mod sink;

use std::path::Path;

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::EnvFilter;

use vcmd_config::Config;
use vcmd_core::curve::{AnglePoint, CURVE_SCHEMA_VERSION, Curve, CurveHeader, ThrustPoint, decode, encode};

use crate::cli::{Cli, Commands};

fn init_tracing(level: &str, json: bool, cfg: &Config) -> eyre::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err("invalid log level")?;

    match &cfg.logging.file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .wrap_err_with(|| format!("opening log file {path}"))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let _ = cli::FILE_GUARD.set(guard);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_writer(writer)
                .init();
        }
        None if json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_writer(std::io::stderr)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> eyre::Result<Config> {
    let cfg = match path {
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .wrap_err_with(|| format!("reading config {}", p.display()))?;
            vcmd_config::load_toml(&text).wrap_err("parsing config TOML")?
        }
        None => Config::default(),
    };
    cfg.validate()?;
    Ok(cfg)
}

fn check_curve(file: &Path) -> eyre::Result<()> {
    let bytes = std::fs::read(file)
        .wrap_err_with(|| format!("reading curve file {}", file.display()))?;
    let (header, curve) = decode(&bytes)?;
    let end = match &curve {
        Curve::Angle(p) => p.last().map(|w| w.time),
        Curve::Thrust(p) => p.last().map(|w| w.time),
    };
    println!("label:    {}", header.label);
    println!(
        "form:     {}",
        if header.is_thrust { "thrust" } else { "angle" }
    );
    println!("points:   {}", header.num_points);
    if let Some(end) = end {
        println!("duration: {end} s");
    }
    Ok(())
}

fn write_demo_curve(out: &Path, thrust: bool) -> eyre::Result<()> {
    let (header, curve) = if thrust {
        (
            CurveHeader {
                version: CURVE_SCHEMA_VERSION,
                label: "demo thrust trapezoid".to_string(),
                is_thrust: true,
                num_points: 4,
            },
            Curve::Thrust(vec![
                ThrustPoint {
                    time: 0.0,
                    thrust: 0.0,
                },
                ThrustPoint {
                    time: 1.0,
                    thrust: 300.0,
                },
                ThrustPoint {
                    time: 2.5,
                    thrust: 300.0,
                },
                ThrustPoint {
                    time: 3.0,
                    thrust: 0.0,
                },
            ]),
        )
    } else {
        (
            CurveHeader {
                version: CURVE_SCHEMA_VERSION,
                label: "demo angle sweep".to_string(),
                is_thrust: false,
                num_points: 3,
            },
            Curve::Angle(vec![
                AnglePoint {
                    time: 0.0,
                    lox_angle: 10.0,
                    ipa_angle: 10.0,
                },
                AnglePoint {
                    time: 1.5,
                    lox_angle: 45.0,
                    ipa_angle: 40.0,
                },
                AnglePoint {
                    time: 3.0,
                    lox_angle: 10.0,
                    ipa_angle: 10.0,
                },
            ]),
        )
    };
    let bytes = encode(&header, &curve)?;
    std::fs::write(out, bytes)
        .wrap_err_with(|| format!("writing curve file {}", out.display()))?;
    println!("Wrote {} ({} points).", out.display(), header.num_points);
    Ok(())
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();
    let cfg = load_config(args.config.as_deref())?;
    init_tracing(&args.log_level, args.json, &cfg)?;

    match args.cmd {
        Commands::CheckCurve { file } => check_curve(&file),
        Commands::WriteDemoCurve { out, thrust } => write_demo_curve(&out, thrust),
        Commands::Run {
            curve,
            out,
            yes,
            zero,
            zero_out,
            fast,
            go_after_ms,
        } => run::run_curve(
            &cfg,
            &run::RunArgs {
                curve,
                out,
                yes,
                zero,
                zero_out,
                fast,
                go_after_ms,
            },
        ),
    }
}
