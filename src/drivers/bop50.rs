//! Kepco BOP 50-8D bipolar power supply.
//!
//! Drives the electromagnet coil. The supply runs in constant-current mode
//! with the voltage setting acting as a protection limit.

use crate::drivers::error::InstrumentError;
use crate::drivers::scpi::ScpiPort;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperatingMode {
    ConstantVoltage,
    ConstantCurrent,
}

/// Commands understood by the BOP, encoded on demand.
#[derive(Clone, Debug, PartialEq)]
pub enum SupplyCmd {
    ClearStatus,
    Reset,
    Output(bool),
    CurrentMode,
    VoltageMode,
    QueryMode,
    SetVoltage(f64),
    QueryVoltage,
    SetCurrent(f64),
    QueryCurrent,
    MeasureVoltage,
    MeasureCurrent,
}

impl SupplyCmd {
    pub fn encode(&self) -> String {
        match self {
            SupplyCmd::ClearStatus => "*CLS".to_owned(),
            SupplyCmd::Reset => "*RST".to_owned(),
            SupplyCmd::Output(true) => "OUTPUT ON".to_owned(),
            SupplyCmd::Output(false) => "OUTPUT OFF".to_owned(),
            SupplyCmd::CurrentMode => "FUNC:MODE CURR".to_owned(),
            SupplyCmd::VoltageMode => "FUNC:MODE VOLT".to_owned(),
            SupplyCmd::QueryMode => "FUNC:MODE?".to_owned(),
            SupplyCmd::SetVoltage(v) => format!("VOLT {v:.4}"),
            SupplyCmd::QueryVoltage => "VOLT?".to_owned(),
            SupplyCmd::SetCurrent(a) => format!("CURR {a:.4}"),
            SupplyCmd::QueryCurrent => "CURR?".to_owned(),
            SupplyCmd::MeasureVoltage => "MEAS:VOLT?".to_owned(),
            SupplyCmd::MeasureCurrent => "MEAS:CURR?".to_owned(),
        }
    }
}

pub struct Bop50 {
    port: ScpiPort,
}

impl Bop50 {
    /// Take ownership of an opened port, reset the supply and enable output.
    pub fn open(mut port: ScpiPort) -> Result<Self, InstrumentError> {
        port.write_line(&SupplyCmd::ClearStatus.encode())?;
        port.write_line(&SupplyCmd::Reset.encode())?;
        port.write_line(&SupplyCmd::Output(true).encode())?;
        Ok(Self { port })
    }

    pub fn set_output(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.port.write_line(&SupplyCmd::Output(on).encode())
    }

    pub fn current_mode(&mut self) -> Result<(), InstrumentError> {
        self.port.write_line(&SupplyCmd::CurrentMode.encode())
    }

    pub fn voltage_mode(&mut self) -> Result<(), InstrumentError> {
        self.port.write_line(&SupplyCmd::VoltageMode.encode())
    }

    pub fn operating_mode(&mut self) -> Result<OperatingMode, InstrumentError> {
        let command = SupplyCmd::QueryMode.encode();
        match self.port.query_int(&command)? {
            0 => Ok(OperatingMode::ConstantVoltage),
            1 => Ok(OperatingMode::ConstantCurrent),
            other => Err(InstrumentError::Parse {
                command,
                response: other.to_string(),
            }),
        }
    }

    /// Output voltage in voltage mode, protection voltage in current mode.
    pub fn set_voltage(&mut self, volts: f64) -> Result<(), InstrumentError> {
        self.port.write_line(&SupplyCmd::SetVoltage(volts).encode())
    }

    pub fn voltage(&mut self) -> Result<f64, InstrumentError> {
        self.port.query_float(&SupplyCmd::QueryVoltage.encode())
    }

    /// Output current in current mode, protection current in voltage mode.
    pub fn set_current(&mut self, amps: f64) -> Result<(), InstrumentError> {
        self.port.write_line(&SupplyCmd::SetCurrent(amps).encode())
    }

    pub fn current(&mut self) -> Result<f64, InstrumentError> {
        self.port.query_float(&SupplyCmd::QueryCurrent.encode())
    }

    /// Measured terminal voltage, as opposed to the programmed setting.
    pub fn measured_voltage(&mut self) -> Result<f64, InstrumentError> {
        self.port.query_float(&SupplyCmd::MeasureVoltage.encode())
    }

    /// Measured output current, as opposed to the programmed setting.
    pub fn measured_current(&mut self) -> Result<f64, InstrumentError> {
        self.port.query_float(&SupplyCmd::MeasureCurrent.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_encode_documented_strings() {
        assert_eq!(SupplyCmd::ClearStatus.encode(), "*CLS");
        assert_eq!(SupplyCmd::Output(true).encode(), "OUTPUT ON");
        assert_eq!(SupplyCmd::Output(false).encode(), "OUTPUT OFF");
        assert_eq!(SupplyCmd::CurrentMode.encode(), "FUNC:MODE CURR");
        assert_eq!(SupplyCmd::SetCurrent(1.5).encode(), "CURR 1.5000");
        assert_eq!(SupplyCmd::SetVoltage(40.0).encode(), "VOLT 40.0000");
        assert_eq!(SupplyCmd::MeasureCurrent.encode(), "MEAS:CURR?");
    }
}
