//! Typed read/write facade over the exchange engine.

pub mod item;
pub mod rtu;
pub mod value;

pub use item::{ItemData, Quality};
pub use rtu::RtuDriver;
pub use value::{DataType, Value};
