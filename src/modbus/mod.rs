pub mod address;
pub mod client;
pub mod crc;
pub mod frame;
pub mod notify;
pub mod protocol;
pub mod transport;

pub use address::ProtocolAddress;
pub use client::ModbusClient;
pub use crc::crc16_modbus;
pub use notify::{ErrorNotification, ErrorSink, LogSink, NullSink};
pub use protocol::{ByteOrder, FunctionFamily};
pub use transport::{SerialSettings, SerialTransport, Transport};
