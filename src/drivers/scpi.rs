//! Line-oriented SCPI transport over a serial link.
//!
//! The lock-in talks RS-232 directly; the supply and the generator sit behind a
//! Prologix-style GPIB bridge on their own serial adapters, addressed with
//! `++addr` before use. Every exchange is logged at trace level so a session
//! can be reconstructed from the log alone.

use std::io::{Read, Write};
use std::time::Duration;

use log::trace;
use serialport::SerialPort;

use crate::drivers::error::InstrumentError;

pub struct ScpiPort {
    port: Box<dyn SerialPort>,
    name: String,
}

impl ScpiPort {
    pub fn open(name: &str, path: &str, baud: u32, timeout: Duration) -> Result<Self, InstrumentError> {
        let port = serialport::new(path, baud).timeout(timeout).open()?;
        Ok(Self {
            port,
            name: name.to_owned(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Point a Prologix-style bridge at the given GPIB address.
    pub fn select(&mut self, gpib_addr: u8) -> Result<(), InstrumentError> {
        self.write_line(&format!("++addr {gpib_addr}"))
    }

    pub fn write_line(&mut self, line: &str) -> Result<(), InstrumentError> {
        trace!("{} -> {}", self.name, line);
        self.port.write_all(line.as_bytes())?;
        self.port.write_all(b"\n")?;
        self.port.flush()?;
        Ok(())
    }

    /// Read one LF-terminated reply, without the terminator.
    pub fn read_line(&mut self) -> Result<String, InstrumentError> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = self.port.read(&mut byte)?;
            if n == 0 {
                return Err(InstrumentError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("{}: connection closed mid-reply", self.name),
                )));
            }
            match byte[0] {
                b'\n' => break,
                b'\r' => {}
                b => line.push(b),
            }
        }
        let line = String::from_utf8_lossy(&line).into_owned();
        trace!("{} <- {}", self.name, line);
        Ok(line)
    }

    pub fn query(&mut self, line: &str) -> Result<String, InstrumentError> {
        self.write_line(line)?;
        self.read_line()
    }

    pub fn query_float(&mut self, line: &str) -> Result<f64, InstrumentError> {
        let response = self.query(line)?;
        response
            .trim()
            .parse()
            .map_err(|_| InstrumentError::Parse {
                command: line.to_owned(),
                response,
            })
    }

    pub fn query_int(&mut self, line: &str) -> Result<i64, InstrumentError> {
        let response = self.query(line)?;
        response
            .trim()
            .parse()
            .map_err(|_| InstrumentError::Parse {
                command: line.to_owned(),
                response,
            })
    }
}
