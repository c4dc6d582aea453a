//! The experiment's view of the bench.
//!
//! Sweep and sampling code never talks to an instrument directly; it goes
//! through [`Rig`], which narrows three drivers down to the handful of
//! operations the experiment actually performs.

use std::collections::VecDeque;

use crate::drivers::bop50::Bop50;
use crate::drivers::error::InstrumentError;
use crate::drivers::hp8673::Hp8673;
use crate::drivers::sr830::{nearest_index, Sr830, SENSITIVITY_VOLTS};

/// Facade over the field supply, RF source and lock-in detector.
pub trait Rig {
    /// Program the coil current in amperes.
    fn set_current(&mut self, amps: f64) -> Result<(), InstrumentError>;
    /// Program the RF excitation frequency in GHz.
    fn set_frequency(&mut self, ghz: f64) -> Result<(), InstrumentError>;
    /// Snapshot the detector's X and Y channels in volts.
    fn read_xy(&mut self) -> Result<(f64, f64), InstrumentError>;
    /// Current full-scale sensitivity of the detector in volts.
    fn sensitivity(&mut self) -> Result<f64, InstrumentError>;
    /// Program the detector sensitivity, rounded to a hardware range.
    fn set_sensitivity(&mut self, volts: f64) -> Result<(), InstrumentError>;
    /// Widen the detector range by one hardware step.
    fn decrease_sensitivity(&mut self) -> Result<(), InstrumentError>;
    /// Narrow the detector range by one hardware step. Manual use only;
    /// nothing in the acquisition path calls this.
    fn increase_sensitivity(&mut self) -> Result<(), InstrumentError>;
}

/// The physical bench: Kepco supply, HP generator, SRS lock-in.
pub struct FmrRig {
    pub supply: Bop50,
    pub source: Hp8673,
    pub lock_in: Sr830,
}

impl FmrRig {
    /// Wire up the three drivers and bring the bench to a safe rest state:
    /// constant-current mode, protection voltage applied, zero current,
    /// RF output on at the requested level.
    pub fn connect(
        mut supply: Bop50,
        mut source: Hp8673,
        lock_in: Sr830,
        protection_volts: f64,
        rf_level_db: f64,
    ) -> Result<Self, InstrumentError> {
        supply.current_mode()?;
        supply.set_voltage(protection_volts)?;
        supply.set_current(0.0)?;
        source.set_level_db(rf_level_db)?;
        source.set_rf_output(true)?;
        Ok(Self { supply, source, lock_in })
    }
}

impl Rig for FmrRig {
    fn set_current(&mut self, amps: f64) -> Result<(), InstrumentError> {
        self.supply.set_current(amps)
    }

    fn set_frequency(&mut self, ghz: f64) -> Result<(), InstrumentError> {
        self.source.set_frequency_ghz(ghz)
    }

    fn read_xy(&mut self) -> Result<(f64, f64), InstrumentError> {
        self.lock_in.read_xy()
    }

    fn sensitivity(&mut self) -> Result<f64, InstrumentError> {
        self.lock_in.sensitivity()
    }

    fn set_sensitivity(&mut self, volts: f64) -> Result<(), InstrumentError> {
        self.lock_in.set_sensitivity(volts).map(|_| ())
    }

    fn decrease_sensitivity(&mut self) -> Result<(), InstrumentError> {
        self.lock_in.decrease_sensitivity()
    }

    fn increase_sensitivity(&mut self) -> Result<(), InstrumentError> {
        self.lock_in.increase_sensitivity()
    }
}

impl Drop for FmrRig {
    fn drop(&mut self) {
        // Return the bench to rest even on an unclean exit.
        self.supply.set_current(0.0).ok();
        self.source.set_rf_output(false).ok();
    }
}

/// In-memory rig useful for tests and deterministic playback.
///
/// Readings are served from a scripted queue; running past the end of the
/// script behaves like a dropped connection. Every setter is recorded so a
/// test can assert on the exact command sequence.
pub struct ManualRig {
    readings: VecDeque<(f64, f64)>,
    sensitivity_index: usize,
    pub currents: Vec<f64>,
    pub frequencies: Vec<f64>,
    pub range_decreases: usize,
}

impl ManualRig {
    pub fn new(readings: impl IntoIterator<Item = (f64, f64)>) -> Self {
        Self {
            readings: readings.into_iter().collect(),
            sensitivity_index: nearest_index(&SENSITIVITY_VOLTS, 2e-4),
            currents: Vec::new(),
            frequencies: Vec::new(),
            range_decreases: 0,
        }
    }
}

impl Rig for ManualRig {
    fn set_current(&mut self, amps: f64) -> Result<(), InstrumentError> {
        self.currents.push(amps);
        Ok(())
    }

    fn set_frequency(&mut self, ghz: f64) -> Result<(), InstrumentError> {
        self.frequencies.push(ghz);
        Ok(())
    }

    fn read_xy(&mut self) -> Result<(f64, f64), InstrumentError> {
        self.readings.pop_front().ok_or_else(|| {
            InstrumentError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "reading script exhausted",
            ))
        })
    }

    fn sensitivity(&mut self) -> Result<f64, InstrumentError> {
        Ok(SENSITIVITY_VOLTS[self.sensitivity_index])
    }

    fn set_sensitivity(&mut self, volts: f64) -> Result<(), InstrumentError> {
        self.sensitivity_index = nearest_index(&SENSITIVITY_VOLTS, volts);
        Ok(())
    }

    fn decrease_sensitivity(&mut self) -> Result<(), InstrumentError> {
        if self.sensitivity_index + 1 == SENSITIVITY_VOLTS.len() {
            return Err(InstrumentError::SensitivityAtLimit { limit: "its widest range" });
        }
        self.sensitivity_index += 1;
        self.range_decreases += 1;
        Ok(())
    }

    fn increase_sensitivity(&mut self) -> Result<(), InstrumentError> {
        if self.sensitivity_index == 0 {
            return Err(InstrumentError::SensitivityAtLimit { limit: "its narrowest range" });
        }
        self.sensitivity_index -= 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_rig_plays_back_script_then_disconnects() {
        let mut rig = ManualRig::new([(1.0, 2.0)]);
        assert_eq!(rig.read_xy().unwrap(), (1.0, 2.0));
        assert!(matches!(rig.read_xy(), Err(InstrumentError::Io(_))));
    }

    #[test]
    fn manual_rig_steps_ranges_like_hardware() {
        let mut rig = ManualRig::new([]);
        rig.set_sensitivity(1.0).unwrap();
        assert_eq!(rig.sensitivity().unwrap(), 1.0);
        assert!(matches!(
            rig.decrease_sensitivity(),
            Err(InstrumentError::SensitivityAtLimit { .. })
        ));
        rig.increase_sensitivity().unwrap();
        assert_eq!(rig.sensitivity().unwrap(), 0.5);
    }
}
