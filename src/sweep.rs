//! Sweep orchestration.
//!
//! A sweep walks one instrument parameter through an ordered axis while the
//! other is held fixed, sampling the detector at each step. Results are
//! append-only in set-point order. An instrument failure mid-sweep does not
//! throw the data away: the partial result is returned marked `Faulted`.

use std::str::FromStr;
use std::thread;
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::drivers::{InstrumentError, Rig};
use crate::error::FmrError;
use crate::sampler::{sample, SamplerSettings};

/// Detector channel selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    X,
    Y,
    Both,
}

impl FromStr for Channel {
    type Err = FmrError;

    fn from_str(s: &str) -> Result<Self, FmrError> {
        match s.to_ascii_lowercase().as_str() {
            "x" => Ok(Channel::X),
            "y" => Ok(Channel::Y),
            "both" => Ok(Channel::Both),
            _ => Err(FmrError::InvalidChannel(s.to_owned())),
        }
    }
}

/// Which parameter the outer loop of a 2-D sweep walks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primary {
    Frequency,
    Field,
}

impl FromStr for Primary {
    type Err = FmrError;

    fn from_str(s: &str) -> Result<Self, FmrError> {
        match s.to_ascii_lowercase().as_str() {
            "frequency" => Ok(Primary::Frequency),
            "field" => Ok(Primary::Field),
            _ => Err(FmrError::InvalidPrimary(s.to_owned())),
        }
    }
}

/// The swept quantity, also used for column naming on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AxisKind {
    FieldOe,
    FrequencyGhz,
}

/// Lifecycle of one sweep invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SweepPhase {
    Idle,
    SettingInitial,
    Stepping,
    Done,
    Faulted,
}

/// Accumulated sweep data. Parallel vectors, one entry per completed
/// set-point; never reordered, never mutated after completion.
#[derive(Debug)]
pub struct SweepResult {
    pub axis: AxisKind,
    /// The held secondary value: frequency (GHz) for a field sweep, field
    /// (Oe) for a frequency sweep.
    pub fixed: f64,
    pub setpoints: Vec<f64>,
    /// Programmed coil currents (A), present for field sweeps.
    pub currents: Option<Vec<f64>>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub phase: SweepPhase,
    pub fault: Option<InstrumentError>,
}

impl SweepResult {
    fn new(axis: AxisKind, fixed: f64, with_currents: bool) -> Self {
        Self {
            axis,
            fixed,
            setpoints: Vec::new(),
            currents: with_currents.then(Vec::new),
            x: Vec::new(),
            y: Vec::new(),
            phase: SweepPhase::Idle,
            fault: None,
        }
    }

    pub fn len(&self) -> usize {
        self.setpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.setpoints.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.phase == SweepPhase::Done
    }

    /// One detector channel of the result.
    pub fn channel(&self, channel: Channel) -> Result<&[f64], FmrError> {
        match channel {
            Channel::X => Ok(&self.x),
            Channel::Y => Ok(&self.y),
            Channel::Both => Err(FmrError::AmbiguousChannel),
        }
    }
}

/// Live-update hook, called synchronously after every appended point with the
/// partial result. Rendering cost lands on the acquisition thread.
pub trait SweepMonitor {
    fn update(&mut self, partial: &SweepResult);
}

/// Monitor that does nothing.
pub struct NullMonitor;

impl SweepMonitor for NullMonitor {
    fn update(&mut self, _partial: &SweepResult) {}
}

#[derive(Clone, Copy, Debug)]
pub struct SweepSettings {
    /// Settle time between programming a set-point and sampling.
    pub read_delay: Duration,
    /// Extra settle after the first set-point; the supply slews out of its
    /// rest state slower than between neighbouring points. Empirical.
    pub from_zero_delay: Duration,
    /// Coil calibration, Oe per ampere.
    pub field_per_amp: f64,
    /// Detector full scale programmed at sweep start (V).
    pub sensitivity: f64,
    pub sampler: SamplerSettings,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            read_delay: Duration::from_millis(500),
            from_zero_delay: Duration::from_secs(5),
            field_per_amp: 669.0,
            sensitivity: 2e-4,
            sampler: SamplerSettings::default(),
        }
    }
}

pub struct SweepEngine {
    pub settings: SweepSettings,
}

impl SweepEngine {
    pub fn new(settings: SweepSettings) -> Self {
        Self { settings }
    }

    pub fn field_to_current(&self, field_oe: f64) -> f64 {
        field_oe / self.settings.field_per_amp
    }

    pub fn current_to_field(&self, amps: f64) -> f64 {
        amps * self.settings.field_per_amp
    }

    /// Sweep the magnetic field at a fixed RF frequency.
    pub fn sweep_field(
        &self,
        rig: &mut dyn Rig,
        frequency_ghz: f64,
        fields_oe: &[f64],
        monitor: &mut dyn SweepMonitor,
    ) -> Result<SweepResult, FmrError> {
        self.preflight(fields_oe)?;
        let currents: Vec<f64> = fields_oe.iter().map(|f| self.field_to_current(*f)).collect();
        info!(
            "field sweep: {} points, {:.4}-{:.4} Oe at {:.4} GHz",
            fields_oe.len(),
            fields_oe.iter().cloned().fold(f64::INFINITY, f64::min),
            fields_oe.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            frequency_ghz
        );

        let mut result = SweepResult::new(AxisKind::FieldOe, frequency_ghz, true);
        result.phase = SweepPhase::SettingInitial;
        rig.set_sensitivity(self.settings.sensitivity)?;
        rig.set_frequency(frequency_ghz)?;
        rig.set_current(currents[0])?;
        thread::sleep(self.settings.from_zero_delay);

        self.step(rig, &mut result, fields_oe, &currents, monitor, |rig, _, amps| {
            rig.set_current(amps)
        });
        Ok(result)
    }

    /// Sweep the RF frequency at a fixed magnetic field.
    pub fn sweep_frequency(
        &self,
        rig: &mut dyn Rig,
        field_oe: f64,
        frequencies_ghz: &[f64],
        monitor: &mut dyn SweepMonitor,
    ) -> Result<SweepResult, FmrError> {
        self.preflight(frequencies_ghz)?;
        let amps = self.field_to_current(field_oe);
        info!(
            "frequency sweep: {} points, {:.4}-{:.4} GHz at {:.4} Oe",
            frequencies_ghz.len(),
            frequencies_ghz.iter().cloned().fold(f64::INFINITY, f64::min),
            frequencies_ghz.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            field_oe
        );

        let mut result = SweepResult::new(AxisKind::FrequencyGhz, field_oe, false);
        result.phase = SweepPhase::SettingInitial;
        rig.set_sensitivity(self.settings.sensitivity)?;
        rig.set_frequency(frequencies_ghz[0])?;
        rig.set_current(amps)?;
        thread::sleep(self.settings.from_zero_delay);

        self.step(rig, &mut result, frequencies_ghz, frequencies_ghz, monitor, |rig, ghz, _| {
            rig.set_frequency(ghz)
        });
        Ok(result)
    }

    /// Nested 2-D sweep: one fully completed inner sweep per outer set-point,
    /// strictly outer-then-inner, no interleaving. A faulted inner sweep ends
    /// the grid early; everything gathered so far is returned.
    pub fn sweep_2d(
        &self,
        rig: &mut dyn Rig,
        frequencies_ghz: &[f64],
        fields_oe: &[f64],
        primary: Primary,
        monitor: &mut dyn SweepMonitor,
    ) -> Result<Vec<SweepResult>, FmrError> {
        self.preflight(frequencies_ghz)?;
        self.preflight(fields_oe)?;
        let mut sweeps = Vec::new();
        match primary {
            Primary::Frequency => {
                for &ghz in frequencies_ghz {
                    match self.sweep_field(rig, ghz, fields_oe, monitor) {
                        Ok(sweep) => {
                            let faulted = !sweep.is_complete();
                            sweeps.push(sweep);
                            if faulted {
                                warn!("2-D sweep stopped early after {} of {} rows", sweeps.len(), frequencies_ghz.len());
                                break;
                            }
                        }
                        // A row that fails before its first point still must
                        // not cost us the rows already gathered.
                        Err(FmrError::Instrument(e)) => {
                            warn!("row at {ghz:.4} GHz failed to start: {e}; keeping {} rows", sweeps.len());
                            break;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
            Primary::Field => {
                for &oe in fields_oe {
                    match self.sweep_frequency(rig, oe, frequencies_ghz, monitor) {
                        Ok(sweep) => {
                            let faulted = !sweep.is_complete();
                            sweeps.push(sweep);
                            if faulted {
                                warn!("2-D sweep stopped early after {} of {} columns", sweeps.len(), fields_oe.len());
                                break;
                            }
                        }
                        Err(FmrError::Instrument(e)) => {
                            warn!("column at {oe:.4} Oe failed to start: {e}; keeping {} columns", sweeps.len());
                            break;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
        Ok(sweeps)
    }

    /// Run one inner sweep per outer value with a per-value inner axis
    /// (zip semantics), e.g. a narrow field window tracking each frequency.
    pub fn multi_sweep(
        &self,
        rig: &mut dyn Rig,
        primary: Primary,
        outer: &[f64],
        inner_axes: &[Vec<f64>],
        monitor: &mut dyn SweepMonitor,
    ) -> Result<Vec<SweepResult>, FmrError> {
        if outer.len() != inner_axes.len() {
            return Err(FmrError::LengthMismatch {
                left: outer.len(),
                right: inner_axes.len(),
            });
        }
        let mut sweeps = Vec::new();
        for (&value, axis) in outer.iter().zip(inner_axes) {
            let sweep = match primary {
                Primary::Frequency => self.sweep_field(rig, value, axis, monitor),
                Primary::Field => self.sweep_frequency(rig, value, axis, monitor),
            };
            match sweep {
                Ok(sweep) => {
                    let faulted = !sweep.is_complete();
                    sweeps.push(sweep);
                    if faulted {
                        break;
                    }
                }
                Err(FmrError::Instrument(e)) => {
                    warn!("inner sweep at {value:.4} failed to start: {e}; keeping {} sweeps", sweeps.len());
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(sweeps)
    }

    fn preflight(&self, axis: &[f64]) -> Result<(), FmrError> {
        self.settings.sampler.validate()?;
        if axis.is_empty() {
            return Err(FmrError::EmptyAxis);
        }
        Ok(())
    }

    /// The stepping loop shared by both sweep directions. `setpoints` are the
    /// recorded axis values; `programmed` are what the setter receives
    /// (currents for a field sweep). A facade error faults the sweep and
    /// keeps the points gathered so far.
    fn step(
        &self,
        rig: &mut dyn Rig,
        result: &mut SweepResult,
        setpoints: &[f64],
        programmed: &[f64],
        monitor: &mut dyn SweepMonitor,
        mut set: impl FnMut(&mut dyn Rig, f64, f64) -> Result<(), InstrumentError>,
    ) {
        result.phase = SweepPhase::Stepping;
        for (&point, &value) in setpoints.iter().zip(programmed) {
            let mut step = || -> Result<crate::sampler::Reading, FmrError> {
                set(&mut *rig, point, value)?;
                thread::sleep(self.settings.read_delay);
                sample(&mut *rig, &self.settings.sampler)
            };
            match step() {
                Ok(reading) => {
                    result.setpoints.push(point);
                    if let Some(currents) = result.currents.as_mut() {
                        currents.push(value);
                    }
                    result.x.push(reading.x);
                    result.y.push(reading.y);
                    monitor.update(result);
                }
                Err(FmrError::Instrument(e)) => {
                    warn!("sweep faulted at set-point {point}: {e}; keeping {} points", result.len());
                    result.phase = SweepPhase::Faulted;
                    result.fault = Some(e);
                    // Still try to bring the coil back to rest.
                    rig.set_current(0.0).ok();
                    return;
                }
                // Only configuration errors reach here and preflight rules
                // them out, but don't swallow them if that ever changes.
                Err(e) => {
                    warn!("sweep aborted at set-point {point}: {e}");
                    result.phase = SweepPhase::Faulted;
                    rig.set_current(0.0).ok();
                    return;
                }
            }
        }
        // Return-to-rest is part of finishing cleanly.
        match rig.set_current(0.0) {
            Ok(()) => result.phase = SweepPhase::Done,
            Err(e) => {
                warn!("failed to return coil current to zero: {e}");
                result.phase = SweepPhase::Faulted;
                result.fault = Some(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{ManualRig, Rig};
    use crate::sampler::Averaging;

    /// Delegates to a [`ManualRig`] but drops the link on the n-th
    /// frequency set, i.e. while a row is still being programmed.
    struct FlakySourceRig {
        inner: ManualRig,
        frequency_sets: usize,
        fail_on: usize,
    }

    impl FlakySourceRig {
        fn new(inner: ManualRig, fail_on: usize) -> Self {
            Self { inner, frequency_sets: 0, fail_on }
        }
    }

    impl Rig for FlakySourceRig {
        fn set_current(&mut self, amps: f64) -> Result<(), InstrumentError> {
            self.inner.set_current(amps)
        }

        fn set_frequency(&mut self, ghz: f64) -> Result<(), InstrumentError> {
            self.frequency_sets += 1;
            if self.frequency_sets == self.fail_on {
                return Err(InstrumentError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "link dropped",
                )));
            }
            self.inner.set_frequency(ghz)
        }

        fn read_xy(&mut self) -> Result<(f64, f64), InstrumentError> {
            self.inner.read_xy()
        }

        fn sensitivity(&mut self) -> Result<f64, InstrumentError> {
            self.inner.sensitivity()
        }

        fn set_sensitivity(&mut self, volts: f64) -> Result<(), InstrumentError> {
            self.inner.set_sensitivity(volts)
        }

        fn decrease_sensitivity(&mut self) -> Result<(), InstrumentError> {
            self.inner.decrease_sensitivity()
        }

        fn increase_sensitivity(&mut self) -> Result<(), InstrumentError> {
            self.inner.increase_sensitivity()
        }
    }

    fn fast_engine() -> SweepEngine {
        SweepEngine::new(SweepSettings {
            read_delay: Duration::ZERO,
            from_zero_delay: Duration::ZERO,
            field_per_amp: 669.0,
            sensitivity: 2e-4,
            sampler: SamplerSettings {
                read_reps: 1,
                rep_delay: Duration::ZERO,
                averaging: Averaging::Mean,
                sensitivity_margin: 0.8,
                sensitivity_settle: Duration::ZERO,
            },
        })
    }

    #[test]
    fn field_sweep_keeps_vectors_parallel_and_rests_at_zero() {
        let readings: Vec<(f64, f64)> = (0..3).map(|i| (i as f64 * 1e-6, -1e-6)).collect();
        let mut rig = ManualRig::new(readings);
        let engine = fast_engine();
        let fields = [0.0, 669.0, 1338.0];
        let result = engine
            .sweep_field(&mut rig, 9.4, &fields, &mut NullMonitor)
            .unwrap();

        assert!(result.is_complete());
        assert_eq!(result.len(), 3);
        assert_eq!(result.x.len(), result.y.len());
        assert_eq!(result.x.len(), result.setpoints.len());
        assert_eq!(result.setpoints, fields.to_vec());
        assert_eq!(result.currents.as_deref(), Some(&[0.0, 1.0, 2.0][..]));
        assert_eq!(rig.frequencies, vec![9.4]);
        // Warm-up set, three stepped sets, then return to rest.
        assert_eq!(rig.currents, vec![0.0, 0.0, 1.0, 2.0, 0.0]);
    }

    #[test]
    fn fault_mid_sweep_preserves_partial_result() {
        // Script only one reading; the second step's read drops the link.
        let mut rig = ManualRig::new([(1e-6, 2e-6)]);
        let engine = fast_engine();
        let result = engine
            .sweep_field(&mut rig, 9.4, &[0.0, 10.0, 20.0], &mut NullMonitor)
            .unwrap();

        assert_eq!(result.phase, SweepPhase::Faulted);
        assert_eq!(result.len(), 1);
        assert_eq!(result.x, vec![1e-6]);
        assert!(result.fault.is_some());
        // Best-effort return to rest still happened.
        assert_eq!(rig.currents.last(), Some(&0.0));
    }

    #[test]
    fn frequency_sweep_steps_frequency_and_holds_field() {
        let mut rig = ManualRig::new(vec![(0.0, 0.0); 4]);
        let engine = fast_engine();
        let freqs = [4.0, 6.0, 8.0, 10.0];
        let result = engine
            .sweep_frequency(&mut rig, 1338.0, &freqs, &mut NullMonitor)
            .unwrap();

        assert!(result.is_complete());
        assert!(result.currents.is_none());
        assert_eq!(result.setpoints, freqs.to_vec());
        // Warm-up to the first frequency, then each step.
        assert_eq!(rig.frequencies, vec![4.0, 4.0, 6.0, 8.0, 10.0]);
        // Fixed field set once, returned to zero at the end.
        assert_eq!(rig.currents, vec![2.0, 0.0]);
    }

    #[test]
    fn empty_axis_fails_fast() {
        let mut rig = ManualRig::new([]);
        let engine = fast_engine();
        let err = engine
            .sweep_field(&mut rig, 9.4, &[], &mut NullMonitor)
            .unwrap_err();
        assert!(matches!(err, FmrError::EmptyAxis));
        assert!(rig.currents.is_empty()); // nothing was programmed
    }

    #[test]
    fn two_d_sweep_is_strictly_outer_then_inner() {
        let mut rig = ManualRig::new(vec![(0.0, 0.0); 6]);
        let engine = fast_engine();
        let sweeps = engine
            .sweep_2d(&mut rig, &[4.0, 8.0], &[0.0, 669.0, 1338.0], Primary::Frequency, &mut NullMonitor)
            .unwrap();

        assert_eq!(sweeps.len(), 2);
        assert!(sweeps.iter().all(|s| s.is_complete() && s.len() == 3));
        // One frequency per row, programmed before its whole inner sweep.
        assert_eq!(rig.frequencies, vec![4.0, 8.0]);
        assert_eq!(
            rig.currents,
            vec![0.0, 0.0, 1.0, 2.0, 0.0, 0.0, 0.0, 1.0, 2.0, 0.0]
        );
    }

    #[test]
    fn two_d_sweep_stops_after_faulted_row() {
        // Enough readings for the first row plus one point of the second.
        let mut rig = ManualRig::new(vec![(0.0, 0.0); 4]);
        let engine = fast_engine();
        let sweeps = engine
            .sweep_2d(&mut rig, &[4.0, 8.0, 12.0], &[0.0, 669.0, 1338.0], Primary::Frequency, &mut NullMonitor)
            .unwrap();

        assert_eq!(sweeps.len(), 2);
        assert!(sweeps[0].is_complete());
        assert_eq!(sweeps[1].phase, SweepPhase::Faulted);
        assert_eq!(sweeps[1].len(), 1);
    }

    #[test]
    fn two_d_sweep_keeps_completed_rows_when_next_row_fails_to_start() {
        // Second frequency set dies while row two is still being programmed;
        // the completed first row must survive.
        let mut rig = FlakySourceRig::new(ManualRig::new(vec![(0.0, 0.0); 4]), 2);
        let engine = fast_engine();
        let sweeps = engine
            .sweep_2d(&mut rig, &[4.0, 8.0], &[0.0, 669.0], Primary::Frequency, &mut NullMonitor)
            .unwrap();

        assert_eq!(sweeps.len(), 1);
        assert!(sweeps[0].is_complete());
        assert_eq!(sweeps[0].len(), 2);
        assert_eq!(sweeps[0].fixed, 4.0);
    }

    #[test]
    fn multi_sweep_keeps_completed_sweeps_when_next_fails_to_start() {
        let mut rig = FlakySourceRig::new(ManualRig::new(vec![(0.0, 0.0); 2]), 2);
        let engine = fast_engine();
        let inners = vec![vec![0.0], vec![669.0]];
        let sweeps = engine
            .multi_sweep(&mut rig, Primary::Frequency, &[4.0, 8.0], &inners, &mut NullMonitor)
            .unwrap();

        assert_eq!(sweeps.len(), 1);
        assert!(sweeps[0].is_complete());
    }

    #[test]
    fn multi_sweep_zips_outer_values_with_their_axes() {
        let mut rig = ManualRig::new(vec![(0.0, 0.0); 3]);
        let engine = fast_engine();
        let inners = vec![vec![0.0, 669.0], vec![1338.0]];
        let sweeps = engine
            .multi_sweep(&mut rig, Primary::Frequency, &[4.0, 8.0], &inners, &mut NullMonitor)
            .unwrap();
        assert_eq!(sweeps.len(), 2);
        assert_eq!(sweeps[0].len(), 2);
        assert_eq!(sweeps[1].len(), 1);

        let err = engine
            .multi_sweep(&mut rig, Primary::Frequency, &[4.0], &inners, &mut NullMonitor)
            .unwrap_err();
        assert!(matches!(err, FmrError::LengthMismatch { .. }));
    }

    #[test]
    fn monitor_sees_every_partial_with_parallel_lengths() {
        struct CountingMonitor {
            updates: Vec<usize>,
        }
        impl SweepMonitor for CountingMonitor {
            fn update(&mut self, partial: &SweepResult) {
                assert_eq!(partial.x.len(), partial.y.len());
                assert_eq!(partial.x.len(), partial.setpoints.len());
                self.updates.push(partial.len());
            }
        }
        let mut rig = ManualRig::new(vec![(0.0, 0.0); 3]);
        let mut monitor = CountingMonitor { updates: Vec::new() };
        fast_engine()
            .sweep_field(&mut rig, 9.4, &[0.0, 10.0, 20.0], &mut monitor)
            .unwrap();
        assert_eq!(monitor.updates, vec![1, 2, 3]);
    }

    #[test]
    fn channel_selector_parses_and_rejects() {
        assert_eq!("X".parse::<Channel>().unwrap(), Channel::X);
        assert_eq!("BOTH".parse::<Channel>().unwrap(), Channel::Both);
        assert!(matches!(
            "Z".parse::<Channel>(),
            Err(FmrError::InvalidChannel(_))
        ));
        // Both selectors ignore case.
        assert_eq!("FIELD".parse::<Primary>().unwrap(), Primary::Field);
        assert_eq!("Frequency".parse::<Primary>().unwrap(), Primary::Frequency);
        assert!(matches!(
            "voltage".parse::<Primary>(),
            Err(FmrError::InvalidPrimary(_))
        ));
    }
}
