//! Symbolic tag addresses.
//!
//! Grammar: `[<slaveId>:]<family-digit><digits>[.<bit>]`
//!
//! | digit | area              | read FC | write FC |
//! |-------|-------------------|---------|----------|
//! | `0`   | coil              | 1       | 5, 15    |
//! | `1`   | discrete input    | 2       | -        |
//! | `3`   | input register    | 4       | -        |
//! | `4`   | holding register  | 3       | 6, 16    |
//!
//! Indices in the symbolic form are 1-based and are converted to 0-based
//! protocol indices here. Bit-area numbers are split into a 16-bit aligned
//! word (`start`) and a bit inside it (`bit`).

use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::protocol::{ByteOrder, FunctionFamily};
use crate::utils::error::ModbusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolAddress {
    pub slave_id: u8,
    /// `None` marks the empty address produced for unparseable input.
    pub family: Option<FunctionFamily>,
    pub start: i32,
    /// `-1` addresses the whole register.
    pub bit: i32,
    pub byte_order: ByteOrder,
}

impl ProtocolAddress {
    pub fn empty(slave_id: u8) -> Self {
        Self {
            slave_id,
            family: None,
            start: 0,
            bit: 0,
            byte_order: ByteOrder::Little,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.family.is_none()
    }

    /// Parses a symbolic address. Never fails: unusable input gives the
    /// empty address and malformed numbers count as zero.
    pub fn parse(address: &str, default_slave: u8) -> Self {
        let mut slave_id = default_slave;
        let mut rest = address.trim();

        if let Some(idx) = rest.find(':') {
            if idx > 0 {
                let prefix = rest[..idx].trim();
                match prefix.parse::<u8>() {
                    Ok(id) => slave_id = id,
                    Err(_) => warn!(
                        "⚠️ Slave prefix '{}' in '{}' is not a valid id, using {}",
                        prefix, address, default_slave
                    ),
                }
                rest = &rest[idx + 1..];
            }
        }

        let family = match rest.chars().next() {
            Some('0') => FunctionFamily::Coil,
            Some('1') => FunctionFamily::DiscreteInput,
            Some('3') => FunctionFamily::InputRegister,
            Some('4') => FunctionFamily::HoldingRegister,
            _ => return Self::empty(slave_id),
        };
        let body = &rest[1..];

        if family.is_bit_addressed() {
            let value = parse_number(body);
            return Self {
                slave_id,
                family: Some(family),
                start: value / 16,
                bit: value % 16 - 1,
                byte_order: ByteOrder::Little,
            };
        }

        let (number, bit) = match body.find('.') {
            Some(idx) => (parse_number(&body[..idx]), parse_number(&body[idx + 1..])),
            None => (parse_number(body), 0),
        };

        Self {
            slave_id,
            family: Some(family),
            start: number.saturating_sub(1),
            bit: bit.saturating_sub(1),
            byte_order: ByteOrder::Big,
        }
    }

    /// 0-based coil / discrete input number for bit areas.
    pub fn coil_index(&self) -> i32 {
        self.start.saturating_mul(16).saturating_add(self.bit)
    }

    pub fn family(&self) -> Result<FunctionFamily, ModbusError> {
        self.family
            .ok_or_else(|| ModbusError::InvalidAddress("empty address".to_string()))
    }

    pub fn with_slave(mut self, slave_id: u8) -> Self {
        self.slave_id = slave_id;
        self
    }
}

impl fmt::Display for ProtocolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let family = match self.family {
            Some(family) => family,
            None => return write!(f, "{}:<empty>", self.slave_id),
        };
        if family.is_bit_addressed() {
            write!(f, "{}:{}{:05}", self.slave_id, family.prefix(), self.coil_index().saturating_add(1))
        } else if self.bit >= 0 {
            write!(
                f,
                "{}:{}{:04}.{}",
                self.slave_id,
                family.prefix(),
                self.start.saturating_add(1),
                self.bit.saturating_add(1)
            )
        } else {
            write!(f, "{}:{}{:04}", self.slave_id, family.prefix(), self.start.saturating_add(1))
        }
    }
}

/// Converts a protocol index to the 16-bit wire field.
pub fn to_wire_u16(value: i64, what: &str) -> Result<u16, ModbusError> {
    u16::try_from(value)
        .map_err(|_| ModbusError::OffsetError(format!("{} {} outside 0..=65535", what, value)))
}

fn parse_number(s: &str) -> i32 {
    s.trim().parse::<i32>().unwrap_or(0)
}
