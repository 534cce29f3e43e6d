use thiserror::Error;

#[derive(Error, Debug)]
pub enum KioskError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    ConfigParseError(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Payment error: {0}")]
    PaymentError(String),
    #[error("Capture error: {0}")]
    CaptureError(String),
    #[error("Print error: {0}")]
    PrintError(String),
    #[error("Print job {job} timed out waiting to be {phase}")]
    PrintTimeout { job: String, phase: &'static str },
    #[error("Print job {job} entered state {state}")]
    PrintJobState { job: String, state: String },
    #[error("Command `{command}` failed: {detail}")]
    CommandError { command: String, detail: String },
}

pub type Result<T> = std::result::Result<T, KioskError>;
