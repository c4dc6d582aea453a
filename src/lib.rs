//! Automation for a ferromagnetic-resonance (FMR) bench: a Kepco supply
//! drives the electromagnet, an HP 8673G supplies the RF excitation, and an
//! SRS SR830 lock-in reads the response. The crate sweeps field and/or
//! frequency, averages detector reads with saturation protection, and records
//! the result as CSV plus plots.

pub mod analysis;
pub mod config;
pub mod drivers;
pub mod error;
pub mod plot;
pub mod recorder;
pub mod sampler;
pub mod sweep;

pub use config::ExperimentConfig;
pub use error::FmrError;
pub use sampler::{sample, Averaging, Reading, SamplerSettings};
pub use sweep::{
    AxisKind, Channel, NullMonitor, Primary, SweepEngine, SweepMonitor, SweepPhase, SweepResult,
    SweepSettings,
};
