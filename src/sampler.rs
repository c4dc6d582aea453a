//! Averaged detector reads with saturation protection.
//!
//! One call to [`sample`] turns a burst of raw lock-in reads into a single
//! robust (X, Y) pair and, when the signal gets close to full scale, widens
//! the detector range by one step so the *next* point is not clipped. The
//! pair already taken is returned as-is; protection lags the signal by one
//! set-point.

use std::thread;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::drivers::{InstrumentError, Rig};
use crate::error::FmrError;

/// Reduction applied to a burst of raw reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Averaging {
    Mean,
    /// Mean over the interquartile band only; discards outliers.
    #[default]
    Mid50,
}

impl Averaging {
    pub fn apply(&self, samples: &[f64]) -> f64 {
        match self {
            Averaging::Mean => mean(samples),
            Averaging::Mid50 => {
                let lo = percentile(samples, 25.0);
                let hi = percentile(samples, 75.0);
                let kept: Vec<f64> = samples
                    .iter()
                    .copied()
                    .filter(|v| *v >= lo && *v <= hi)
                    .collect();
                if kept.is_empty() {
                    // Two spread-out samples can both fall outside the
                    // interquartile band; there is nothing to trim then.
                    mean(samples)
                } else {
                    mean(&kept)
                }
            }
        }
    }
}

fn mean(samples: &[f64]) -> f64 {
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Linearly interpolated percentile over an unsorted slice.
fn percentile(samples: &[f64], q: f64) -> f64 {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let frac = rank - lo as f64;
    if lo + 1 < sorted.len() {
        sorted[lo] + frac * (sorted[lo + 1] - sorted[lo])
    } else {
        sorted[lo]
    }
}

/// One averaged detector reading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reading {
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct SamplerSettings {
    /// Raw reads per set-point.
    pub read_reps: usize,
    /// Pause between raw reads.
    pub rep_delay: Duration,
    pub averaging: Averaging,
    /// Fraction of full scale above which the range is widened.
    pub sensitivity_margin: f64,
    /// Settle time after a range change.
    pub sensitivity_settle: Duration,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            read_reps: 1,
            rep_delay: Duration::ZERO,
            averaging: Averaging::default(),
            sensitivity_margin: 0.8,
            sensitivity_settle: Duration::from_secs(3),
        }
    }
}

impl SamplerSettings {
    pub fn validate(&self) -> Result<(), FmrError> {
        if self.read_reps == 0 {
            return Err(FmrError::InvalidReadReps);
        }
        Ok(())
    }
}

/// Take `read_reps` raw reads, average each channel, and widen the detector
/// range when the result crowds full scale.
pub fn sample(rig: &mut dyn Rig, settings: &SamplerSettings) -> Result<Reading, FmrError> {
    settings.validate()?;
    let mut xs = Vec::with_capacity(settings.read_reps);
    let mut ys = Vec::with_capacity(settings.read_reps);
    for rep in 0..settings.read_reps {
        let (x, y) = rig.read_xy()?;
        xs.push(x);
        ys.push(y);
        if rep + 1 < settings.read_reps {
            thread::sleep(settings.rep_delay);
        }
    }
    let reading = Reading {
        x: settings.averaging.apply(&xs),
        y: settings.averaging.apply(&ys),
    };

    let ratio = reading.x.abs().max(reading.y.abs()) / rig.sensitivity()?;
    if ratio > settings.sensitivity_margin {
        match rig.decrease_sensitivity() {
            Ok(()) => {}
            Err(InstrumentError::SensitivityAtLimit { limit }) => {
                warn!("signal at {:.0}% of full scale but detector is at {limit}", ratio * 100.0);
            }
            Err(e) => return Err(e.into()),
        }
        thread::sleep(settings.sensitivity_settle);
    }
    Ok(reading)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::ManualRig;

    fn fast(read_reps: usize, averaging: Averaging) -> SamplerSettings {
        SamplerSettings {
            read_reps,
            rep_delay: Duration::ZERO,
            averaging,
            sensitivity_margin: 0.8,
            sensitivity_settle: Duration::ZERO,
        }
    }

    #[test]
    fn mean_of_five_reps() {
        let mut rig = ManualRig::new((1..=5).map(|v| (v as f64 * 1e-6, 0.0)));
        let reading = sample(&mut rig, &fast(5, Averaging::Mean)).unwrap();
        assert!((reading.x - 3e-6).abs() < 1e-18);
        assert_eq!(reading.y, 0.0);
    }

    #[test]
    fn trimmed_mean_stays_within_input_range() {
        let inputs = [
            vec![1.0],
            vec![1.0, 100.0],
            vec![-5.0, 0.0, 0.1, 0.2, 90.0],
            vec![3.0, 3.0, 3.0],
        ];
        for arr in inputs {
            let v = Averaging::Mid50.apply(&arr);
            let min = arr.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = arr.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            assert!(v >= min && v <= max, "{v} outside [{min}, {max}]");
        }
    }

    #[test]
    fn trimmed_mean_discards_outliers() {
        // Interquartile band of [0,0,0,0,1000] keeps only the zeros.
        let v = Averaging::Mid50.apply(&[0.0, 0.0, 0.0, 0.0, 1000.0]);
        assert_eq!(v, 0.0);
    }

    #[test]
    fn single_rep_trimmed_mean_is_identity() {
        assert_eq!(Averaging::Mid50.apply(&[7.5]), 7.5);
    }

    #[test]
    fn zero_reps_fails_before_touching_hardware() {
        let mut rig = ManualRig::new([(1.0, 1.0)]);
        assert!(matches!(
            sample(&mut rig, &fast(0, Averaging::Mean)),
            Err(FmrError::InvalidReadReps)
        ));
    }

    #[test]
    fn range_widens_only_above_margin() {
        // ManualRig starts at 200 uV full scale.
        let mut rig = ManualRig::new([(1.5e-4, 0.0)]);
        sample(&mut rig, &fast(1, Averaging::Mean)).unwrap();
        assert_eq!(rig.range_decreases, 0); // 75% of full scale

        let mut rig = ManualRig::new([(1.7e-4, 0.0)]);
        sample(&mut rig, &fast(1, Averaging::Mean)).unwrap();
        assert_eq!(rig.range_decreases, 1); // 85% of full scale
    }

    #[test]
    fn range_check_uses_larger_channel_magnitude() {
        let mut rig = ManualRig::new([(0.0, -1.9e-4)]);
        sample(&mut rig, &fast(1, Averaging::Mean)).unwrap();
        assert_eq!(rig.range_decreases, 1);
    }

    #[test]
    fn at_limit_is_nonfatal_and_leaves_range_unchanged() {
        let mut rig = ManualRig::new([(0.9, 0.0)]);
        rig.set_sensitivity(1.0).unwrap();
        let reading = sample(&mut rig, &fast(1, Averaging::Mean)).unwrap();
        assert_eq!(reading.x, 0.9);
        assert_eq!(rig.sensitivity().unwrap(), 1.0);
    }

    #[test]
    fn returned_pair_is_not_rescaled_after_range_change() {
        let mut rig = ManualRig::new([(1.9e-4, 0.0)]);
        let reading = sample(&mut rig, &fast(1, Averaging::Mean)).unwrap();
        assert_eq!(reading.x, 1.9e-4);
        assert_eq!(rig.range_decreases, 1);
    }
}
