use serde::{Deserialize, Serialize};
use std::fmt;

pub const FC_READ_COILS: u8 = 0x01;
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;
pub const FC_READ_WRITE_MULTIPLE_REGISTERS: u8 = 0x17;

/// High bit set on the echoed function code marks an exception response.
pub const EXCEPTION_FLAG: u8 = 0x80;

pub const EXC_ILLEGAL_FUNCTION: u8 = 1;
pub const EXC_ILLEGAL_DATA_ADDRESS: u8 = 2;
pub const EXC_ILLEGAL_DATA_VALUE: u8 = 3;
pub const EXC_SLAVE_DEVICE_FAILURE: u8 = 4;
pub const EXC_ACKNOWLEDGE: u8 = 5;
pub const EXC_SLAVE_BUSY: u8 = 6;
pub const EXC_GATEWAY_PATH_UNAVAILABLE: u8 = 10;
// Local codes, never sent by a slave
pub const EXC_SEND_FAILURE: u8 = 100;
pub const EXC_OFFSET: u8 = 128;
pub const EXC_NOT_CONNECTED: u8 = 253;
pub const EXC_CONNECTION_LOST: u8 = 254;
pub const EXC_TIMEOUT: u8 = 255;

/// Largest PDU on a serial line: 256-byte ADU minus address and CRC.
pub const MAX_PDU_SIZE: usize = 253;

/// fc + byte count + 2 * N <= 253
pub const MAX_READ_REGISTERS: u16 = 125;

/// Fixed description for an exception code.
pub fn exception_description(code: u8) -> &'static str {
    match code {
        EXC_ILLEGAL_FUNCTION => "illegal function",
        EXC_ILLEGAL_DATA_ADDRESS => "illegal data address",
        EXC_ILLEGAL_DATA_VALUE => "illegal data value",
        EXC_SLAVE_DEVICE_FAILURE => "slave device failure",
        EXC_ACKNOWLEDGE => "acknowledge",
        EXC_SLAVE_BUSY => "slave is busy/booting up",
        EXC_GATEWAY_PATH_UNAVAILABLE => "gateway path unavailable",
        EXC_SEND_FAILURE => "send failure",
        EXC_OFFSET => "wrong offset",
        EXC_NOT_CONNECTED => "not connected",
        EXC_CONNECTION_LOST => "connection lost",
        EXC_TIMEOUT => "response timeout",
        _ => "unknown exception code",
    }
}

/// Data area addressed by a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionFamily {
    Coil,
    DiscreteInput,
    HoldingRegister,
    InputRegister,
}

impl FunctionFamily {
    pub fn read_function(&self) -> u8 {
        match self {
            FunctionFamily::Coil => FC_READ_COILS,
            FunctionFamily::DiscreteInput => FC_READ_DISCRETE_INPUTS,
            FunctionFamily::HoldingRegister => FC_READ_HOLDING_REGISTERS,
            FunctionFamily::InputRegister => FC_READ_INPUT_REGISTERS,
        }
    }

    /// Coils and discrete inputs are addressed in bits, registers in words.
    pub fn is_bit_addressed(&self) -> bool {
        matches!(self, FunctionFamily::Coil | FunctionFamily::DiscreteInput)
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, FunctionFamily::Coil | FunctionFamily::HoldingRegister)
    }

    /// Leading digit of the symbolic address.
    pub fn prefix(&self) -> char {
        match self {
            FunctionFamily::Coil => '0',
            FunctionFamily::DiscreteInput => '1',
            FunctionFamily::InputRegister => '3',
            FunctionFamily::HoldingRegister => '4',
        }
    }
}

impl fmt::Display for FunctionFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FunctionFamily::Coil => "coil",
            FunctionFamily::DiscreteInput => "discrete input",
            FunctionFamily::HoldingRegister => "holding register",
            FunctionFamily::InputRegister => "input register",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}
