//! Modbus RTU master
//!
//! Reads and writes typed values on slaves reached over an RS-485 serial
//! line. Tags are addressed symbolically (`40001`, `2:30005.3`, `000017`),
//! every exchange is CRC-16 checked, and faults surface as Bad-quality items,
//! status codes and out-of-band error notifications.

pub mod cli;
pub mod config;
pub mod driver;
pub mod modbus;
pub mod output;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use driver::{DataType, ItemData, Quality, RtuDriver, Value};
pub use modbus::{ErrorNotification, ErrorSink, ModbusClient, ProtocolAddress, Transport};
pub use utils::error::ModbusError;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
