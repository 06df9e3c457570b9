use log::{error, info, warn};
use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

use crate::utils::error::ModbusError;

/// Byte pipe the exchange engine talks through.
///
/// `read` blocks for at most the configured timeout and returns the number
/// of bytes placed at the start of `buffer`; on expiry it returns `Ok(0)` or
/// an error of kind `TimedOut`.
pub trait Transport: Send {
    fn open(&mut self) -> Result<(), ModbusError>;
    fn close(&mut self);
    fn is_open(&self) -> bool;
    fn write(&mut self, data: &[u8]) -> io::Result<()>;
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize>;

    /// Drops whatever is still waiting in the receive buffer.
    fn discard_input(&mut self) {}

    fn name(&self) -> String {
        "transport".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub timeout: Duration,
}

pub struct SerialTransport {
    settings: SerialSettings,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            settings,
            port: None,
        }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    /// Applies new line settings; an open port is closed first.
    pub fn reconfigure(&mut self, settings: SerialSettings) {
        if self.is_open() {
            self.close();
        }
        self.settings = settings;
    }

    fn port_mut(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port is not open"))
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<(), ModbusError> {
        let s = &self.settings;
        info!("🔌 Connecting to Modbus RTU port: {}", s.port_name);
        info!(
            "⚙️  Configuration: {} baud, {:?} data bits, {:?} parity, {:?} stop bits, {:?} timeout",
            s.baud_rate, s.data_bits, s.parity, s.stop_bits, s.timeout
        );

        let port = serialport::new(&s.port_name, s.baud_rate)
            .timeout(s.timeout)
            .data_bits(s.data_bits)
            .stop_bits(s.stop_bits)
            .parity(s.parity)
            .open()
            .map_err(|e| {
                error!("❌ Failed to open serial port {}: {}", s.port_name, e);
                ModbusError::ConnectionError(format!("Failed to open port: {}", e))
            })?;

        // Drop anything a previous session left on the line
        port.clear(ClearBuffer::All)?;

        info!("✅ Modbus RTU connection established successfully");
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!("🔌 Serial port {} closed", self.settings.port_name);
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let port = self.port_mut()?;
        port.write_all(data)?;
        port.flush()
    }

    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        self.port_mut()?.read(buffer)
    }

    fn discard_input(&mut self) {
        if let Some(port) = self.port.as_mut() {
            if let Err(e) = port.clear(ClearBuffer::Input) {
                warn!("⚠️ Could not clear input of {}: {}", self.settings.port_name, e);
            }
        }
    }

    fn name(&self) -> String {
        self.settings.port_name.clone()
    }
}

/// Names of the serial ports present on this machine.
pub fn available_ports() -> Result<Vec<String>, ModbusError> {
    let ports = serialport::available_ports()?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
