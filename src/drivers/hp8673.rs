//! HP 8673G synthesized CW signal generator.
//!
//! Speaks the instrument's pre-SCPI mnemonic language: two-letter prefixes
//! with unit suffixes, and replies framed by the echoed prefix. After every
//! setting the message register is polled so a rejected entry surfaces as an
//! error instead of silently leaving the output unchanged.

use crate::drivers::error::InstrumentError;
use crate::drivers::scpi::ScpiPort;

/// Commands understood by the 8673G, encoded on demand.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceCmd {
    Frequency(f64),
    QueryFrequency,
    RfOutput(bool),
    Level(f64),
    QueryLevel,
    QueryMessage,
}

impl SourceCmd {
    pub fn encode(&self) -> String {
        match self {
            SourceCmd::Frequency(ghz) => format!("FR {ghz:.9} GZ"),
            SourceCmd::QueryFrequency => "OK".to_owned(),
            SourceCmd::RfOutput(true) => "R1".to_owned(),
            SourceCmd::RfOutput(false) => "R0".to_owned(),
            SourceCmd::Level(db) => format!("LE {db:.1} DB"),
            SourceCmd::QueryLevel => "LE OA".to_owned(),
            SourceCmd::QueryMessage => "MG".to_owned(),
        }
    }
}

fn message_text(code: &str) -> &'static str {
    match code {
        "00" => "NO ERROR",
        "01" => "FREQUENCY OUT OF RANGE",
        "02" => "FREQUENCY INCR OUT OF RANGE",
        "05" => "STEP SIZE OUT OF RANGE",
        "08" => "DWELL OUT OF RANGE",
        "10" => "START FREQ=STOP FREQ, NO SWEEP",
        "20" => "INVALID HP-IB CODE",
        "21" => "HP-IB DATA WITHOUT VALID PREFIX",
        "24" => "OUTPUT LEVEL OUT OF RANGE",
        "90" => "AUTO PEAK MALFUNCTION",
        "95" => "LOSS OF DATA ON POWER UP",
        _ => "UNRECOGNIZED MESSAGE CODE",
    }
}

pub struct Hp8673 {
    port: ScpiPort,
}

impl Hp8673 {
    pub fn open(port: ScpiPort) -> Result<Self, InstrumentError> {
        Ok(Self { port })
    }

    /// Poll the message register; anything but 00 is an error.
    fn check_message(&mut self) -> Result<(), InstrumentError> {
        let code = self.port.query(&SourceCmd::QueryMessage.encode())?;
        let code = code.trim().to_owned();
        if code == "00" || code.is_empty() {
            Ok(())
        } else {
            Err(InstrumentError::Device {
                message: message_text(&code).to_owned(),
                code,
            })
        }
    }

    /// Replies look like `FR 9.400000000GZ`; strip the prefix and the unit,
    /// parse the middle as Hz.
    fn parse_frequency_hz(&self, command: String, response: String) -> Result<f64, InstrumentError> {
        let trimmed = response.trim();
        trimmed
            .get(2..trimmed.len().saturating_sub(2))
            .and_then(|s| s.trim().parse().ok())
            .ok_or(InstrumentError::Parse { command, response })
    }

    pub fn set_frequency_ghz(&mut self, ghz: f64) -> Result<(), InstrumentError> {
        self.port.write_line(&SourceCmd::Frequency(ghz).encode())?;
        self.check_message()
    }

    pub fn frequency_ghz(&mut self) -> Result<f64, InstrumentError> {
        let command = SourceCmd::QueryFrequency.encode();
        let response = self.port.query(&command)?;
        Ok(self.parse_frequency_hz(command, response)? / 1e9)
    }

    pub fn set_rf_output(&mut self, on: bool) -> Result<(), InstrumentError> {
        self.port.write_line(&SourceCmd::RfOutput(on).encode())
    }

    pub fn set_level_db(&mut self, db: f64) -> Result<(), InstrumentError> {
        self.port.write_line(&SourceCmd::Level(db).encode())?;
        self.check_message()
    }

    pub fn level_db(&mut self) -> Result<f64, InstrumentError> {
        let command = SourceCmd::QueryLevel.encode();
        let response = self.port.query(&command)?;
        let trimmed = response.trim();
        trimmed
            .get(2..trimmed.len().saturating_sub(2))
            .and_then(|s| s.trim().parse().ok())
            .ok_or(InstrumentError::Parse { command, response })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_encode_documented_strings() {
        assert_eq!(SourceCmd::Frequency(9.4).encode(), "FR 9.400000000 GZ");
        assert_eq!(SourceCmd::QueryFrequency.encode(), "OK");
        assert_eq!(SourceCmd::RfOutput(true).encode(), "R1");
        assert_eq!(SourceCmd::RfOutput(false).encode(), "R0");
        assert_eq!(SourceCmd::Level(-3.0).encode(), "LE -3.0 DB");
        assert_eq!(SourceCmd::QueryMessage.encode(), "MG");
    }

    #[test]
    fn message_codes_map_to_text() {
        assert_eq!(message_text("24"), "OUTPUT LEVEL OUT OF RANGE");
        assert_eq!(message_text("77"), "UNRECOGNIZED MESSAGE CODE");
    }
}
