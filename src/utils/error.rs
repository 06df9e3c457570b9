use thiserror::Error;

use crate::modbus::protocol::{
    exception_description, EXC_CONNECTION_LOST, EXC_NOT_CONNECTED, EXC_OFFSET, EXC_SEND_FAILURE,
    EXC_TIMEOUT,
};

#[derive(Error, Debug)]
pub enum ModbusError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("Send failed: {0}")]
    SendError(String),

    #[error("CRC checksum mismatch")]
    CrcError,

    #[error("Unexpected function code 0x{received:02X} (expected 0x{expected:02X})")]
    UnexpectedFunction { expected: u8, received: u8 },

    #[error("Slave exception {code}: {}", describe(.code))]
    Exception { code: u8 },

    #[error("Not connected")]
    NotConnected,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Address offset out of range: {0}")]
    OffsetError(String),

    #[error("Address is read-only: {0}")]
    ReadOnly(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Lock acquisition failed")]
    LockError,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

fn describe(code: &u8) -> &'static str {
    exception_description(*code)
}

impl ModbusError {
    /// Status code from the Modbus exception table. Slave exceptions keep
    /// their own code, local faults use the reserved 100/128/253-255 range.
    pub fn code(&self) -> u8 {
        match self {
            ModbusError::Exception { code } => *code,
            ModbusError::NotConnected => EXC_NOT_CONNECTED,
            ModbusError::Timeout => EXC_TIMEOUT,
            ModbusError::SendError(_) => EXC_SEND_FAILURE,
            ModbusError::InvalidAddress(_) | ModbusError::OffsetError(_) => EXC_OFFSET,
            _ => EXC_CONNECTION_LOST,
        }
    }

    /// Whether the fault goes out on the error-notification channel.
    ///
    /// Integrity faults (CRC mismatch, unexpected function code) stay silent
    /// and only show up as a Bad quality on the result.
    pub fn is_notified(&self) -> bool {
        matches!(
            self,
            ModbusError::Exception { .. }
                | ModbusError::Timeout
                | ModbusError::NotConnected
                | ModbusError::ConnectionError(_)
                | ModbusError::CommunicationError(_)
                | ModbusError::SendError(_)
        )
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::TimedOut {
            ModbusError::Timeout
        } else {
            ModbusError::CommunicationError(format!("IO error: {}", err))
        }
    }
}

impl From<serialport::Error> for ModbusError {
    fn from(err: serialport::Error) -> Self {
        ModbusError::ConnectionError(format!("Serial port error: {}", err))
    }
}

impl From<toml::de::Error> for ModbusError {
    fn from(err: toml::de::Error) -> Self {
        ModbusError::ConfigError(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for ModbusError {
    fn from(err: toml::ser::Error) -> Self {
        ModbusError::SerializationError(format!("TOML error: {}", err))
    }
}

impl From<serde_json::Error> for ModbusError {
    fn from(err: serde_json::Error) -> Self {
        ModbusError::SerializationError(format!("JSON error: {}", err))
    }
}
