// src/drivers/mod.rs
pub mod bop50;
pub mod error;
pub mod hp8673;
pub mod rig;
pub mod scpi;
pub mod sim;
pub mod sr830;

pub use bop50::{Bop50, OperatingMode, SupplyCmd};
pub use error::InstrumentError;
pub use hp8673::{Hp8673, SourceCmd};
pub use rig::{FmrRig, ManualRig, Rig};
pub use scpi::ScpiPort;
pub use sim::SimRig;
pub use sr830::{FilterSlope, InputSource, LockInCmd, Sr830, SENSITIVITY_VOLTS, TIME_CONSTANTS};
