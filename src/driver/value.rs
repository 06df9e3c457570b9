//! Typed values and their register byte images.
//!
//! `ByteOrder::Big` is the usual Modbus layout: high byte first inside a
//! register, high word first across registers. `ByteOrder::Little` is the
//! plain little-endian image of the native value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::modbus::address::ProtocolAddress;
use crate::modbus::protocol::ByteOrder;
use crate::utils::error::ModbusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float,
    Byte,
    Bit,
    String,
}

impl DataType {
    /// Registers to transfer; `len` is the character count for strings.
    pub fn register_count(&self, len: u16) -> u16 {
        match self {
            DataType::Int16 | DataType::UInt16 | DataType::Byte | DataType::Bit => 1,
            DataType::Int32 | DataType::UInt32 | DataType::Float => 2,
            DataType::String => ((len as u32 + 1) / 2).max(1) as u16,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Int16 => "int16",
            DataType::UInt16 => "uint16",
            DataType::Int32 => "int32",
            DataType::UInt32 => "uint32",
            DataType::Float => "float",
            DataType::Byte => "byte",
            DataType::Bit => "bit",
            DataType::String => "string",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for DataType {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "int16" | "i16" | "short" => Ok(DataType::Int16),
            "uint16" | "u16" | "ushort" | "word" => Ok(DataType::UInt16),
            "int32" | "i32" | "int" => Ok(DataType::Int32),
            "uint32" | "u32" | "uint" | "dword" => Ok(DataType::UInt32),
            "float" | "f32" | "real" => Ok(DataType::Float),
            "byte" | "u8" => Ok(DataType::Byte),
            "bit" | "bool" => Ok(DataType::Bit),
            "string" | "str" => Ok(DataType::String),
            other => Err(ModbusError::InvalidData(format!("unknown data type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Float(f32),
    Byte(u8),
    Bit(bool),
    String(String),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int16(_) => DataType::Int16,
            Value::UInt16(_) => DataType::UInt16,
            Value::Int32(_) => DataType::Int32,
            Value::UInt32(_) => DataType::UInt32,
            Value::Float(_) => DataType::Float,
            Value::Byte(_) => DataType::Byte,
            Value::Bit(_) => DataType::Bit,
            Value::String(_) => DataType::String,
        }
    }

    /// Zero value of a type, used for Bad-quality results.
    pub fn zero(data_type: DataType) -> Self {
        match data_type {
            DataType::Int16 => Value::Int16(0),
            DataType::UInt16 => Value::UInt16(0),
            DataType::Int32 => Value::Int32(0),
            DataType::UInt32 => Value::UInt32(0),
            DataType::Float => Value::Float(0.0),
            DataType::Byte => Value::Byte(0),
            DataType::Bit => Value::Bit(false),
            DataType::String => Value::String(String::new()),
        }
    }

    /// Parses user text (CLI input) as a value of `data_type`.
    pub fn parse(data_type: DataType, text: &str) -> Result<Self, ModbusError> {
        let text = text.trim();
        let bad = |e: &dyn fmt::Display| {
            ModbusError::InvalidData(format!("'{}' is not a valid {}: {}", text, data_type, e))
        };
        Ok(match data_type {
            DataType::Int16 => Value::Int16(text.parse().map_err(|e| bad(&e))?),
            DataType::UInt16 => Value::UInt16(text.parse().map_err(|e| bad(&e))?),
            DataType::Int32 => Value::Int32(text.parse().map_err(|e| bad(&e))?),
            DataType::UInt32 => Value::UInt32(text.parse().map_err(|e| bad(&e))?),
            DataType::Float => Value::Float(text.parse().map_err(|e| bad(&e))?),
            DataType::Byte => Value::Byte(text.parse().map_err(|e| bad(&e))?),
            DataType::Bit => match text.to_ascii_lowercase().as_str() {
                "1" | "true" | "on" => Value::Bit(true),
                "0" | "false" | "off" => Value::Bit(false),
                _ => return Err(bad(&"expected 1/0, true/false or on/off")),
            },
            DataType::String => Value::String(text.to_string()),
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int16(v) => write!(f, "{}", v),
            Value::UInt16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::UInt32(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Byte(v) => write!(f, "{}", v),
            Value::Bit(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
        }
    }
}

macro_rules! impl_try_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl TryFrom<Value> for $ty {
                type Error = ModbusError;

                fn try_from(value: Value) -> Result<Self, Self::Error> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(ModbusError::InvalidData(format!(
                            "expected {}, got {}",
                            DataType::$variant,
                            other.data_type()
                        ))),
                    }
                }
            }
        )*
    };
}

impl_try_from_value!(
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    f32 => Float,
    u8 => Byte,
    bool => Bit,
    String => String,
);

fn take<const N: usize>(payload: &[u8]) -> Result<[u8; N], ModbusError> {
    payload
        .get(..N)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| {
            ModbusError::InvalidData(format!("need {} bytes, got {}", N, payload.len()))
        })
}

pub fn decode_u16(payload: &[u8], order: ByteOrder) -> Result<u16, ModbusError> {
    let bytes = take::<2>(payload)?;
    Ok(match order {
        ByteOrder::Big => u16::from_be_bytes(bytes),
        ByteOrder::Little => u16::from_le_bytes(bytes),
    })
}

pub fn decode_u32(payload: &[u8], order: ByteOrder) -> Result<u32, ModbusError> {
    let bytes = take::<4>(payload)?;
    Ok(match order {
        ByteOrder::Big => u32::from_be_bytes(bytes),
        ByteOrder::Little => u32::from_le_bytes(bytes),
    })
}

pub fn encode_u16(value: u16, order: ByteOrder) -> [u8; 2] {
    match order {
        ByteOrder::Big => value.to_be_bytes(),
        ByteOrder::Little => value.to_le_bytes(),
    }
}

pub fn encode_u32(value: u32, order: ByteOrder) -> [u8; 4] {
    match order {
        ByteOrder::Big => value.to_be_bytes(),
        ByteOrder::Little => value.to_le_bytes(),
    }
}

/// ASCII text; other bytes become `?` and trailing NULs are dropped.
pub fn decode_string(payload: &[u8]) -> String {
    let text: String = payload
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect();
    text.trim_end_matches('\0').to_string()
}

pub fn encode_string(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect()
}

/// Decodes a register payload. Bits go through [`decode_bit`].
pub fn decode(data_type: DataType, payload: &[u8], order: ByteOrder) -> Result<Value, ModbusError> {
    Ok(match data_type {
        DataType::Int16 => Value::Int16(decode_u16(payload, order)? as i16),
        DataType::UInt16 => Value::UInt16(decode_u16(payload, order)?),
        DataType::Int32 => Value::Int32(decode_u32(payload, order)? as i32),
        DataType::UInt32 => Value::UInt32(decode_u32(payload, order)?),
        DataType::Float => Value::Float(f32::from_bits(decode_u32(payload, order)?)),
        DataType::Byte => Value::Byte(take::<1>(payload)?[0]),
        DataType::String => Value::String(decode_string(payload)),
        DataType::Bit => {
            return Err(ModbusError::UnsupportedOperation(
                "bit values need their address to decode".to_string(),
            ))
        }
    })
}

/// Register bytes for a value in wire order. Bits have no register image.
pub fn encode(value: &Value, order: ByteOrder) -> Result<Vec<u8>, ModbusError> {
    Ok(match value {
        Value::Int16(v) => encode_u16(*v as u16, order).to_vec(),
        Value::UInt16(v) => encode_u16(*v, order).to_vec(),
        Value::Byte(v) => encode_u16(*v as u16, order).to_vec(),
        Value::Int32(v) => encode_u32(*v as u32, order).to_vec(),
        Value::UInt32(v) => encode_u32(*v, order).to_vec(),
        Value::Float(v) => encode_u32(v.to_bits(), order).to_vec(),
        Value::String(s) => encode_string(s),
        Value::Bit(_) => {
            return Err(ModbusError::UnsupportedOperation(
                "bit values are written as coils or register bits".to_string(),
            ))
        }
    })
}

/// Re-anchors a bit-area address on the 16-bit word that holds its coil,
/// so `bit` falls in `0..16`.
pub fn bit_block(address: &ProtocolAddress) -> ProtocolAddress {
    let index = address.coil_index();
    ProtocolAddress {
        start: index.div_euclid(16),
        bit: index.rem_euclid(16),
        ..*address
    }
}

/// Extracts the addressed bit from a one-register payload.
///
/// Bit `n` is bit `n % 8` of payload byte `n / 8`, so bits 0..8 come from
/// the first byte on the wire. For bit areas that is the coil order; for
/// registers it is the high byte of the register.
pub fn decode_bit(payload: &[u8], address: &ProtocolAddress) -> Result<bool, ModbusError> {
    address.family()?;
    let (index, shift) = bit_position(payload, address)?;
    Ok(payload[index] >> shift & 1 == 1)
}

/// Sets or clears the addressed bit in place, mirroring [`decode_bit`].
pub fn set_bit(payload: &mut [u8], address: &ProtocolAddress, on: bool) -> Result<(), ModbusError> {
    let (index, shift) = bit_position(payload, address)?;
    if on {
        payload[index] |= 1 << shift;
    } else {
        payload[index] &= !(1 << shift);
    }
    Ok(())
}

fn bit_position(payload: &[u8], address: &ProtocolAddress) -> Result<(usize, u8), ModbusError> {
    check_bit_offset(address)?;
    let bit = address.bit as usize;
    if bit / 8 >= payload.len() {
        return Err(ModbusError::InvalidData(format!("no data byte for bit {}", bit)));
    }
    Ok((bit / 8, (bit % 8) as u8))
}

pub fn check_bit_offset(address: &ProtocolAddress) -> Result<(), ModbusError> {
    if !(0..16).contains(&address.bit) {
        return Err(ModbusError::OffsetError(format!(
            "bit {} of {} is outside 0..16",
            address.bit, address
        )));
    }
    Ok(())
}
