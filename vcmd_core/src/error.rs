use thiserror::Error;

/// Synchronous rejections: load/config errors refuse the requested
/// transition without mutating any state.
#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("incompatible curve version: file has {found}, this build expects {expected}")]
    IncompatibleVersion { found: i32, expected: i32 },
    #[error("no curve loaded")]
    CurveNotLoaded,
    #[error("sensors have not been zero-calibrated since boot")]
    NotCalibrated,
    #[error("curve data truncated: needed {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },
    #[error("malformed curve: {0}")]
    MalformedCurve(&'static str),
    #[error("invalid state for {op}: {state}")]
    InvalidState { op: &'static str, state: &'static str },
    #[error("hardware error: {0}")]
    Hardware(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing {0} collaborator")]
    Missing(&'static str),
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("invalid lookup table: {0}")]
    InvalidTable(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
