//! Request frame builders and response frame checks for Modbus RTU.
//!
//! Request layout:
//! `[slave][fc][addrHi][addrLo][countOrValueHi][countOrValueLo] [payload] [crcLo][crcHi]`

use super::address::to_wire_u16;
use super::crc::{append_crc, validate};
use super::protocol::{
    EXCEPTION_FLAG, FC_WRITE_MULTIPLE_COILS, FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL,
    FC_WRITE_SINGLE_REGISTER, MAX_PDU_SIZE,
};
use crate::utils::error::ModbusError;

/// Slave id + function code + byte count (or exception code).
pub const RESPONSE_HEADER_LEN: usize = 3;
pub const CRC_LEN: usize = 2;
/// Slave id, function | 0x80, exception code, CRC.
pub const EXCEPTION_FRAME_LEN: usize = 5;
/// Write responses echo address and quantity/value.
pub const WRITE_RESPONSE_LEN: usize = 8;

const COIL_ON: [u8; 2] = [0xFF, 0x00];
const COIL_OFF: [u8; 2] = [0x00, 0x00];

/// Shape of a response, decided from its first two bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Normal,
    Exception,
    Unexpected(u8),
}

pub fn classify(head: &[u8], function: u8) -> ResponseKind {
    match head.get(1) {
        Some(&code) if code == function => ResponseKind::Normal,
        Some(&code) if code == function | EXCEPTION_FLAG => ResponseKind::Exception,
        Some(&code) => ResponseKind::Unexpected(code),
        None => ResponseKind::Unexpected(0),
    }
}

fn header(slave_id: u8, function: u8, address: u16, value: [u8; 2]) -> Vec<u8> {
    let addr = address.to_be_bytes();
    vec![slave_id, function, addr[0], addr[1], value[0], value[1]]
}

/// Read request for FC 1-4. Bit areas pass bit units, registers word units.
pub fn read_request(
    slave_id: u8,
    start_address: i64,
    length: i64,
    function: u8,
) -> Result<Vec<u8>, ModbusError> {
    let start = to_wire_u16(start_address, "start address")?;
    let count = to_wire_u16(length, "length")?;

    let mut frame = header(slave_id, function, start, count.to_be_bytes());
    append_crc(&mut frame);
    Ok(frame)
}

pub fn write_single_coil(slave_id: u8, coil: i64, on: bool) -> Result<Vec<u8>, ModbusError> {
    let coil = to_wire_u16(coil, "coil")?;
    let value = if on { COIL_ON } else { COIL_OFF };

    let mut frame = header(slave_id, FC_WRITE_SINGLE_COIL, coil, value);
    append_crc(&mut frame);
    Ok(frame)
}

pub fn write_multiple_coils(
    slave_id: u8,
    start: i64,
    bits: &[bool],
) -> Result<Vec<u8>, ModbusError> {
    if bits.is_empty() {
        return Err(ModbusError::InvalidData("no coils to write".to_string()));
    }
    let packed = pack_bits(bits);
    check_payload(packed.len())?;
    let start = to_wire_u16(start, "coil")?;
    let quantity = to_wire_u16(bits.len() as i64, "coil count")?;

    let mut frame = header(slave_id, FC_WRITE_MULTIPLE_COILS, start, quantity.to_be_bytes());
    frame.push(packed.len() as u8);
    frame.extend_from_slice(&packed);
    append_crc(&mut frame);
    Ok(frame)
}

/// `value` is the register in wire order.
pub fn write_single_register(
    slave_id: u8,
    address: i64,
    value: [u8; 2],
) -> Result<Vec<u8>, ModbusError> {
    let address = to_wire_u16(address, "register")?;

    let mut frame = header(slave_id, FC_WRITE_SINGLE_REGISTER, address, value);
    append_crc(&mut frame);
    Ok(frame)
}

/// Odd-length payloads are padded with one zero byte.
pub fn write_multiple_registers(
    slave_id: u8,
    address: i64,
    values: &[u8],
) -> Result<Vec<u8>, ModbusError> {
    if values.is_empty() {
        return Err(ModbusError::InvalidData("no registers to write".to_string()));
    }
    let mut payload = values.to_vec();
    if payload.len() % 2 > 0 {
        payload.push(0);
    }
    check_payload(payload.len())?;
    let address = to_wire_u16(address, "register")?;
    let quantity = (payload.len() / 2) as u16;

    let mut frame = header(
        slave_id,
        FC_WRITE_MULTIPLE_REGISTERS,
        address,
        quantity.to_be_bytes(),
    );
    frame.push(payload.len() as u8);
    frame.extend_from_slice(&payload);
    append_crc(&mut frame);
    Ok(frame)
}

/// Full response length for a read of `size` registers. A bit-area read of
/// `size * 16` bits returns the same `size * 2` data bytes.
pub fn expected_read_len(size: u16) -> usize {
    size as usize * 2 + RESPONSE_HEADER_LEN + CRC_LEN
}

/// Data bytes of a validated read response.
pub fn payload(frame: &[u8]) -> &[u8] {
    if frame.len() < RESPONSE_HEADER_LEN + CRC_LEN {
        return &[];
    }
    &frame[RESPONSE_HEADER_LEN..frame.len() - CRC_LEN]
}

/// Checks CRC and function code of a complete normal response.
pub fn check_response(frame: &[u8], function: u8) -> Result<(), ModbusError> {
    match classify(frame, function) {
        ResponseKind::Normal => {}
        ResponseKind::Exception => {
            return Err(ModbusError::Exception {
                code: frame.get(2).copied().unwrap_or(0),
            })
        }
        ResponseKind::Unexpected(received) => {
            return Err(ModbusError::UnexpectedFunction {
                expected: function,
                received,
            })
        }
    }
    if !validate(frame) {
        return Err(ModbusError::CrcError);
    }
    Ok(())
}

/// LSB-first within each byte, as FC 1, 2 and 15 carry coils.
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut packed = vec![0u8; (bits.len() + 7) / 8];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            packed[i / 8] |= 1 << (i % 8);
        }
    }
    packed
}

fn check_payload(len: usize) -> Result<(), ModbusError> {
    // fc + address + quantity + byte count
    if len + 6 > MAX_PDU_SIZE {
        return Err(ModbusError::InvalidData(format!(
            "payload of {} bytes exceeds the {}-byte PDU",
            len, MAX_PDU_SIZE
        )));
    }
    Ok(())
}
