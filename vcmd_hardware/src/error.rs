use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("daq error: {0}")]
    Daq(String),
    #[error("actuator error: {0}")]
    Actuator(String),
    #[error("sensor timeout")]
    Timeout,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
