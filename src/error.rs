use thiserror::Error;

use crate::drivers::InstrumentError;

#[derive(Debug, Error)]
pub enum FmrError {
    #[error("read repetitions must be at least 1")]
    InvalidReadReps,
    #[error("sweep axis is empty")]
    EmptyAxis,
    #[error("parallel sequences differ in length: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },
    #[error("need at least {needed} points, got {got}")]
    TooFewPoints { needed: usize, got: usize },
    #[error("invalid channel selector {0:?}; expected \"X\", \"Y\" or \"both\"")]
    InvalidChannel(String),
    #[error("a 2-D matrix needs a single channel; pick X or Y")]
    AmbiguousChannel,
    #[error("invalid primary axis {0:?}; expected \"frequency\" or \"field\"")]
    InvalidPrimary(String),
    #[error(transparent)]
    Instrument(#[from] InstrumentError),
    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
    #[error("failed to render plot: {0}")]
    Plot(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for FmrError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        FmrError::Plot(format!("{value:?}"))
    }
}

impl From<image::ImageError> for FmrError {
    fn from(value: image::ImageError) -> Self {
        FmrError::Plot(value.to_string())
    }
}
