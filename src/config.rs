//! Experiment configuration.
//!
//! Every empirically chosen constant of the rig lives here instead of being
//! hard-coded: the from-zero settle, the 80% auto-range margin, the coil
//! calibration. Values can be overridden from a JSON file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FmrError;
use crate::sampler::{Averaging, SamplerSettings};
use crate::sweep::SweepSettings;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Detector full scale programmed at sweep start (V).
    pub sensitivity_volts: f64,
    /// Settle after an auto-range step (s).
    pub sensitivity_settle_s: f64,
    /// Fraction of full scale that triggers an auto-range step.
    pub sensitivity_margin: f64,
    /// Raw reads per set-point.
    pub read_reps: usize,
    /// Pause between raw reads (s).
    pub rep_delay_s: f64,
    /// Settle between programming a set-point and sampling (s).
    pub read_delay_s: f64,
    /// Extra settle after leaving the rest state (s).
    pub from_zero_delay_s: f64,
    pub averaging: Averaging,
    /// Coil calibration (Oe per ampere).
    pub field_per_amp: f64,
    /// Supply protection voltage (V).
    pub protection_volts: f64,
    /// RF output level (dB).
    pub rf_level_db: f64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            sensitivity_volts: 2e-4,
            sensitivity_settle_s: 3.0,
            sensitivity_margin: 0.8,
            read_reps: 1,
            rep_delay_s: 0.0,
            read_delay_s: 0.5,
            from_zero_delay_s: 5.0,
            averaging: Averaging::Mid50,
            field_per_amp: 669.0,
            protection_volts: 40.0,
            rf_level_db: 0.0,
        }
    }
}

impl ExperimentConfig {
    pub fn load(path: &Path) -> Result<Self, FmrError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn sampler_settings(&self) -> SamplerSettings {
        SamplerSettings {
            read_reps: self.read_reps,
            rep_delay: Duration::from_secs_f64(self.rep_delay_s),
            averaging: self.averaging,
            sensitivity_margin: self.sensitivity_margin,
            sensitivity_settle: Duration::from_secs_f64(self.sensitivity_settle_s),
        }
    }

    pub fn sweep_settings(&self) -> SweepSettings {
        SweepSettings {
            read_delay: Duration::from_secs_f64(self.read_delay_s),
            from_zero_delay: Duration::from_secs_f64(self.from_zero_delay_s),
            field_per_amp: self.field_per_amp,
            sensitivity: self.sensitivity_volts,
            sampler: self.sampler_settings(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_bench() {
        let cfg = ExperimentConfig::default();
        assert_eq!(cfg.sensitivity_volts, 2e-4);
        assert_eq!(cfg.sensitivity_margin, 0.8);
        assert_eq!(cfg.field_per_amp, 669.0);
        assert_eq!(cfg.averaging, Averaging::Mid50);
        assert_eq!(cfg.sweep_settings().from_zero_delay, Duration::from_secs(5));
    }

    #[test]
    fn partial_json_overrides_defaults() {
        let cfg: ExperimentConfig =
            serde_json::from_str(r#"{"read_reps": 30, "averaging": "mean"}"#).unwrap();
        assert_eq!(cfg.read_reps, 30);
        assert_eq!(cfg.averaging, Averaging::Mean);
        assert_eq!(cfg.field_per_amp, 669.0);
    }
}
