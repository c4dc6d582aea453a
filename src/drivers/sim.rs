//! Simulated bench producing a synthetic resonance line.
//!
//! Lets the whole acquisition path run without hardware attached. The X
//! channel carries the antisymmetric (dispersive) component and Y the
//! symmetric (absorptive) one, both riding on a little noise, so plots and
//! midpoint extraction behave like a real measurement.

use rand::Rng;

use crate::drivers::error::InstrumentError;
use crate::drivers::rig::Rig;
use crate::drivers::sr830::{nearest_index, SENSITIVITY_VOLTS};

/// Kittel-like gyromagnetic slope, GHz per Oe.
const GHZ_PER_OE: f64 = 2.8e-3;

pub struct SimRig {
    current_amps: f64,
    frequency_ghz: f64,
    sensitivity_index: usize,
    /// Coil calibration used to turn the programmed current into a field.
    pub field_per_amp: f64,
    /// Half-width of the simulated line in Oe.
    pub linewidth_oe: f64,
    /// Peak signal amplitude in volts.
    pub amplitude: f64,
    /// Peak-to-peak noise in volts.
    pub noise: f64,
}

impl SimRig {
    pub fn new(field_per_amp: f64) -> Self {
        Self {
            current_amps: 0.0,
            frequency_ghz: 9.4,
            sensitivity_index: nearest_index(&SENSITIVITY_VOLTS, 2e-4),
            field_per_amp,
            linewidth_oe: 60.0,
            amplitude: 1e-4,
            noise: 2e-6,
        }
    }
}

impl Rig for SimRig {
    fn set_current(&mut self, amps: f64) -> Result<(), InstrumentError> {
        self.current_amps = amps;
        Ok(())
    }

    fn set_frequency(&mut self, ghz: f64) -> Result<(), InstrumentError> {
        self.frequency_ghz = ghz;
        Ok(())
    }

    fn read_xy(&mut self) -> Result<(f64, f64), InstrumentError> {
        let field_oe = self.current_amps * self.field_per_amp;
        let resonance_oe = self.frequency_ghz / GHZ_PER_OE;
        let d = (field_oe - resonance_oe) / self.linewidth_oe;
        let lorentz = 1.0 / (1.0 + d * d);
        let mut rng = rand::thread_rng();
        let x = self.amplitude * d * lorentz * lorentz + self.noise * rng.gen_range(-0.5..0.5);
        let y = self.amplitude * lorentz + self.noise * rng.gen_range(-0.5..0.5);
        Ok((x, y))
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
    fn line_peaks_at_resonance() {
        let mut rig = SimRig::new(669.0);
        rig.noise = 0.0;
        rig.set_frequency(9.4).unwrap();
        let resonance_oe = 9.4 / GHZ_PER_OE;
        rig.set_current(resonance_oe / 669.0).unwrap();
        let (x_on, y_on) = rig.read_xy().unwrap();
        rig.set_current((resonance_oe + 500.0) / 669.0).unwrap();
        let (_, y_off) = rig.read_xy().unwrap();
        assert!(x_on.abs() < 1e-12); // dispersive component crosses zero on resonance
        assert!(y_on > 10.0 * y_off);
    }
}
