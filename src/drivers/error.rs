use thiserror::Error;

/// Errors raised while talking to the bench instruments.
#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("instrument i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("unparseable reply to {command:?}: {response:?}")]
    Parse { command: String, response: String },
    #[error("sensitivity already at {limit}; leaving range unchanged")]
    SensitivityAtLimit { limit: &'static str },
    #[error("instrument reported error {code}: {message}")]
    Device { code: String, message: String },
}
