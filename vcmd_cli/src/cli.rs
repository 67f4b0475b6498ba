//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "vcmd", version, about = "Engine test-stand valve commander")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a curve file and print its header
    CheckCurve {
        /// Curve file to inspect
        file: PathBuf,
    },
    /// Write a small demonstration curve file
    WriteDemoCurve {
        /// Output path
        out: PathBuf,
        /// Write a thrust-form curve instead of an angle-form one
        #[arg(long, action = ArgAction::SetTrue)]
        thrust: bool,
    },
    /// Follow a curve against the simulated stand
    Run {
        /// Curve file to follow
        curve: PathBuf,
        /// Telemetry CSV output path (one file per run)
        #[arg(long, value_name = "FILE", default_value = "run_telemetry.csv")]
        out: PathBuf,
        /// Skip the operator start confirmation
        #[arg(long, action = ArgAction::SetTrue)]
        yes: bool,
        /// Restore a saved zero-calibration blob instead of capturing one
        #[arg(long, value_name = "FILE")]
        zero: Option<PathBuf>,
        /// Save the captured zero-calibration blob here
        #[arg(long, value_name = "FILE")]
        zero_out: Option<PathBuf>,
        /// Run on the simulated clock (no real-time sleeps)
        #[arg(long, action = ArgAction::SetTrue)]
        fast: bool,
        /// How long the simulated facility waits before releasing go, ms
        #[arg(long, value_name = "MS", default_value_t = 250)]
        go_after_ms: u64,
    },
}
