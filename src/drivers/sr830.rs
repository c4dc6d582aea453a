//! Stanford Research Systems SR830 lock-in amplifier.
//!
//! Range and filter settings are coded register indices on the instrument;
//! the tables below map them to physical values. Voltage-input mode is
//! assumed throughout, so sensitivities are in volts full scale.

use log::warn;

use crate::drivers::error::InstrumentError;
use crate::drivers::scpi::ScpiPort;

/// Full-scale sensitivities (V) indexed by the instrument's SENS code.
pub const SENSITIVITY_VOLTS: [f64; 27] = [
    2e-9, 5e-9, 10e-9, 20e-9, 50e-9, 100e-9, 200e-9, 500e-9, 1e-6, 2e-6, 5e-6, 10e-6, 20e-6,
    50e-6, 100e-6, 200e-6, 500e-6, 1e-3, 2e-3, 5e-3, 10e-3, 20e-3, 50e-3, 100e-3, 200e-3, 500e-3,
    1.0,
];

/// Filter time constants (s) indexed by the instrument's OFLT code.
pub const TIME_CONSTANTS: [f64; 20] = [
    10e-6, 30e-6, 100e-6, 300e-6, 1e-3, 3e-3, 10e-3, 30e-3, 100e-3, 300e-3, 1.0, 3.0, 10.0, 30.0,
    100.0, 300.0, 1e3, 3e3, 10e3, 30e3,
];

/// Index of the table entry closest to `value`.
pub fn nearest_index(table: &[f64], value: f64) -> usize {
    let value = value.abs();
    let mut best = 0;
    for (i, &bin) in table.iter().enumerate() {
        if (bin - value).abs() < (table[best] - value).abs() {
            best = i;
        }
    }
    best
}

/// Output filter slope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterSlope {
    Db6,
    Db12,
    Db18,
    Db24,
}

impl FilterSlope {
    fn code(self) -> u8 {
        match self {
            FilterSlope::Db6 => 0,
            FilterSlope::Db12 => 1,
            FilterSlope::Db18 => 2,
            FilterSlope::Db24 => 3,
        }
    }
}

/// Signal input selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputSource {
    VoltageA,
    VoltageAMinusB,
    Current1MOhm,
    Current100MOhm,
}

impl InputSource {
    fn code(self) -> u8 {
        match self {
            InputSource::VoltageA => 0,
            InputSource::VoltageAMinusB => 1,
            InputSource::Current1MOhm => 2,
            InputSource::Current100MOhm => 3,
        }
    }
}

/// Commands understood by the SR830, encoded on demand.
#[derive(Clone, Debug, PartialEq)]
pub enum LockInCmd {
    /// Route responses to the remote interface (`OUTX`).
    OutputInterface { gpib: bool },
    /// Lock or release the front panel (`OVRM`).
    RemoteOnly(bool),
    Sensitivity(usize),
    QuerySensitivity,
    TimeConstant(usize),
    QueryTimeConstant,
    FilterSlope(FilterSlope),
    InputSource(InputSource),
    SyncFilter(bool),
    OscillatorFreq(f64),
    OscillatorAmp(f64),
    RefPhase(f64),
    /// Simultaneous X/Y snapshot (`SNAP? 1,2`).
    SnapXy,
}

impl LockInCmd {
    pub fn encode(&self) -> String {
        match self {
            LockInCmd::OutputInterface { gpib } => format!("OUTX {}", u8::from(*gpib)),
            LockInCmd::RemoteOnly(on) => format!("OVRM {}", u8::from(!*on)),
            LockInCmd::Sensitivity(i) => format!("SENS {i}"),
            LockInCmd::QuerySensitivity => "SENS?".to_owned(),
            LockInCmd::TimeConstant(i) => format!("OFLT {i}"),
            LockInCmd::QueryTimeConstant => "OFLT?".to_owned(),
            LockInCmd::FilterSlope(sl) => format!("OFSL {}", sl.code()),
            LockInCmd::InputSource(src) => format!("ISRC {}", src.code()),
            LockInCmd::SyncFilter(on) => format!("SYNC {}", u8::from(*on)),
            LockInCmd::OscillatorFreq(hz) => format!("FREQ {hz:.6}"),
            LockInCmd::OscillatorAmp(v) => format!("SLVL {v:.6}"),
            LockInCmd::RefPhase(deg) => format!("PHAS {deg:.6}"),
            LockInCmd::SnapXy => "SNAP?1,2".to_owned(),
        }
    }
}

pub struct Sr830 {
    port: ScpiPort,
}

impl Sr830 {
    /// Take ownership of an opened port and put the instrument in remote mode.
    pub fn open(mut port: ScpiPort) -> Result<Self, InstrumentError> {
        port.write_line(&LockInCmd::OutputInterface { gpib: true }.encode())?;
        port.write_line(&LockInCmd::RemoteOnly(false).encode())?;
        Ok(Self { port })
    }

    fn sensitivity_index(&mut self) -> Result<usize, InstrumentError> {
        let i = self.port.query_int(&LockInCmd::QuerySensitivity.encode())?;
        if (0..SENSITIVITY_VOLTS.len() as i64).contains(&i) {
            Ok(i as usize)
        } else {
            Err(InstrumentError::Parse {
                command: LockInCmd::QuerySensitivity.encode(),
                response: i.to_string(),
            })
        }
    }

    /// Current full-scale sensitivity in volts.
    pub fn sensitivity(&mut self) -> Result<f64, InstrumentError> {
        Ok(SENSITIVITY_VOLTS[self.sensitivity_index()?])
    }

    /// Set the sensitivity, rounded to the nearest hardware range.
    /// Returns the value actually programmed.
    pub fn set_sensitivity(&mut self, volts: f64) -> Result<f64, InstrumentError> {
        let i = nearest_index(&SENSITIVITY_VOLTS, volts);
        self.port.write_line(&LockInCmd::Sensitivity(i).encode())?;
        Ok(SENSITIVITY_VOLTS[i])
    }

    /// Step one range wider (larger full scale). At the widest range this is
    /// reported as `SensitivityAtLimit` and nothing is changed.
    pub fn decrease_sensitivity(&mut self) -> Result<(), InstrumentError> {
        let i = self.sensitivity_index()?;
        if i + 1 == SENSITIVITY_VOLTS.len() {
            return Err(InstrumentError::SensitivityAtLimit { limit: "its widest range" });
        }
        self.port.write_line(&LockInCmd::Sensitivity(i + 1).encode())
    }

    /// Step one range narrower (smaller full scale). Never invoked
    /// automatically; saturation protection only ever widens the range.
    pub fn increase_sensitivity(&mut self) -> Result<(), InstrumentError> {
        let i = self.sensitivity_index()?;
        if i == 0 {
            return Err(InstrumentError::SensitivityAtLimit { limit: "its narrowest range" });
        }
        self.port.write_line(&LockInCmd::Sensitivity(i - 1).encode())
    }

    /// Current filter time constant in seconds.
    pub fn time_constant(&mut self) -> Result<f64, InstrumentError> {
        let i = self.port.query_int(&LockInCmd::QueryTimeConstant.encode())?;
        TIME_CONSTANTS
            .get(i.max(0) as usize)
            .copied()
            .ok_or_else(|| InstrumentError::Parse {
                command: LockInCmd::QueryTimeConstant.encode(),
                response: i.to_string(),
            })
    }

    /// Set the time constant, rounded to the nearest hardware value.
    pub fn set_time_constant(&mut self, seconds: f64) -> Result<f64, InstrumentError> {
        let i = nearest_index(&TIME_CONSTANTS, seconds);
        self.port.write_line(&LockInCmd::TimeConstant(i).encode())?;
        Ok(TIME_CONSTANTS[i])
    }

    pub fn set_filter_slope(&mut self, slope: FilterSlope) -> Result<(), InstrumentError> {
        self.port.write_line(&LockInCmd::FilterSlope(slope).encode())
    }

    pub fn set_input_source(&mut self, source: InputSource) -> Result<(), InstrumentError> {
        if !matches!(source, InputSource::VoltageA | InputSource::VoltageAMinusB) {
            warn!("{}: current-input mode selected; sensitivity table assumes volts", self.port.name());
        }
        self.port.write_line(&LockInCmd::InputSource(source).encode())
    }

    pub fn set_sync_filter(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.port.write_line(&LockInCmd::SyncFilter(on).encode())
    }

    pub fn set_oscillator_freq(&mut self, hz: f64) -> Result<(), InstrumentError> {
        self.port.write_line(&LockInCmd::OscillatorFreq(hz).encode())
    }

    pub fn set_oscillator_amp(&mut self, volts: f64) -> Result<(), InstrumentError> {
        self.port.write_line(&LockInCmd::OscillatorAmp(volts).encode())
    }

    pub fn set_ref_phase(&mut self, degrees: f64) -> Result<(), InstrumentError> {
        self.port.write_line(&LockInCmd::RefPhase(degrees).encode())
    }

    /// Snapshot both output channels in one exchange.
    pub fn read_xy(&mut self) -> Result<(f64, f64), InstrumentError> {
        let command = LockInCmd::SnapXy.encode();
        let response = self.port.query(&command)?;
        let parse = |s: &str| s.trim().parse::<f64>().ok();
        let mut parts = response.split(',');
        match (parts.next().and_then(parse), parts.next().and_then(parse), parts.next()) {
            (Some(x), Some(y), None) => Ok((x, y)),
            _ => Err(InstrumentError::Parse { command, response }),
        }
    }
}
