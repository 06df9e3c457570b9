#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use modbus_rtu_master::config::Config;
use modbus_rtu_master::driver::RtuDriver;
use modbus_rtu_master::modbus::crc::{append_crc, validate};
use modbus_rtu_master::modbus::notify::ErrorNotification;
use modbus_rtu_master::modbus::transport::Transport;
use modbus_rtu_master::ModbusError;
use tokio::sync::mpsc::{self, UnboundedReceiver};

pub const REGISTERS: usize = 512;
pub const BITS: usize = 4096;

/// How the simulated slave misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    /// Never answers.
    Silent,
    /// Answers with the last CRC byte flipped.
    CorruptCrc,
    /// Answers every request with this exception code.
    Exception(u8),
    /// Answers with this function code instead of the requested one.
    WrongFunction(u8),
}

pub struct Memory {
    pub coils: Vec<bool>,
    pub discrete_inputs: Vec<bool>,
    pub holding: Vec<u16>,
    pub input: Vec<u16>,
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            coils: vec![false; BITS],
            discrete_inputs: vec![false; BITS],
            holding: vec![0; REGISTERS],
            input: vec![0; REGISTERS],
        }
    }
}

/// Shared view of the slave, kept by the test after the transport is moved
/// into the driver.
#[derive(Clone)]
pub struct SlaveHandle {
    pub memory: Arc<Mutex<Memory>>,
    pub fault: Arc<Mutex<Fault>>,
    pub requests: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl SlaveHandle {
    pub fn set_fault(&self, fault: Fault) {
        *self.fault.lock().unwrap() = fault;
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<Vec<u8>> {
        self.requests.lock().unwrap().last().cloned()
    }
}

/// In-memory Modbus RTU slave answering FC 1-6, 15 and 16.
pub struct SimulatedSlave {
    slave_id: u8,
    open: bool,
    pending: VecDeque<u8>,
    handle: SlaveHandle,
}

impl SimulatedSlave {
    pub fn new(slave_id: u8) -> (Self, SlaveHandle) {
        let handle = SlaveHandle {
            memory: Arc::new(Mutex::new(Memory::default())),
            fault: Arc::new(Mutex::new(Fault::None)),
            requests: Arc::new(Mutex::new(Vec::new())),
        };
        let slave = Self {
            slave_id,
            open: false,
            pending: VecDeque::new(),
            handle: handle.clone(),
        };
        (slave, handle)
    }

    fn respond(&self, request: &[u8]) -> Option<Vec<u8>> {
        if request.len() < 4 || !validate(request) || request[0] != self.slave_id {
            return None;
        }
        let function = request[1];

        let mut response = match *self.handle.fault.lock().unwrap() {
            Fault::Silent => return None,
            Fault::Exception(code) => vec![self.slave_id, function | 0x80, code],
            Fault::WrongFunction(other) => vec![self.slave_id, other, 0x02, 0x00, 0x00],
            Fault::None | Fault::CorruptCrc => match self.execute(request) {
                Ok(pdu) => pdu,
                Err(code) => vec![self.slave_id, function | 0x80, code],
            },
        };
        append_crc(&mut response);

        if *self.handle.fault.lock().unwrap() == Fault::CorruptCrc {
            if let Some(last) = response.last_mut() {
                *last ^= 0xFF;
            }
        }
        Some(response)
    }

    fn execute(&self, request: &[u8]) -> Result<Vec<u8>, u8> {
        let function = request[1];
        let field = |at: usize| -> Result<usize, u8> {
            request
                .get(at..at + 2)
                .map(|b| u16::from_be_bytes([b[0], b[1]]) as usize)
                .ok_or(3)
        };
        let mut memory = self.handle.memory.lock().unwrap();
        let echo = || request[..6].to_vec();

        match function {
            0x01 | 0x02 => {
                let (start, count) = (field(2)?, field(4)?);
                let bits = if function == 0x01 { &memory.coils } else { &memory.discrete_inputs };
                let slice = bits.get(start..start + count).ok_or(2)?;
                let mut data = vec![0u8; (count + 7) / 8];
                for (i, &on) in slice.iter().enumerate() {
                    if on {
                        data[i / 8] |= 1 << (i % 8);
                    }
                }
                let mut pdu = vec![self.slave_id, function, data.len() as u8];
                pdu.extend(data);
                Ok(pdu)
            }
            0x03 | 0x04 => {
                let (start, count) = (field(2)?, field(4)?);
                let registers = if function == 0x03 { &memory.holding } else { &memory.input };
                let slice = registers.get(start..start + count).ok_or(2)?;
                let mut pdu = vec![self.slave_id, function, (count * 2) as u8];
                for register in slice {
                    pdu.extend(register.to_be_bytes());
                }
                Ok(pdu)
            }
            0x05 => {
                let (coil, value) = (field(2)?, field(4)?);
                let on = match value {
                    0xFF00 => true,
                    0x0000 => false,
                    _ => return Err(3),
                };
                *memory.coils.get_mut(coil).ok_or(2)? = on;
                Ok(echo())
            }
            0x06 => {
                let (address, value) = (field(2)?, field(4)?);
                *memory.holding.get_mut(address).ok_or(2)? = value as u16;
                Ok(echo())
            }
            0x0F => {
                let (start, count) = (field(2)?, field(4)?);
                let data = request.get(7..7 + request[6] as usize).ok_or(3)?;
                let coils = memory.coils.get_mut(start..start + count).ok_or(2)?;
                for (i, coil) in coils.iter_mut().enumerate() {
                    *coil = data[i / 8] >> (i % 8) & 1 == 1;
                }
                Ok(echo())
            }
            0x10 => {
                let (start, count) = (field(2)?, field(4)?);
                let data = request.get(7..7 + count * 2).ok_or(3)?;
                let registers = memory.holding.get_mut(start..start + count).ok_or(2)?;
                for (i, register) in registers.iter_mut().enumerate() {
                    *register = u16::from_be_bytes([data[i * 2], data[i * 2 + 1]]);
                }
                Ok(echo())
            }
            _ => Err(1),
        }
    }
}

impl Transport for SimulatedSlave {
    fn open(&mut self) -> Result<(), ModbusError> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
        self.pending.clear();
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.handle.requests.lock().unwrap().push(data.to_vec());
        self.pending.clear();
        if let Some(response) = self.respond(data) {
            self.pending.extend(response);
        }
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no response"));
        }
        // Hand out at most three bytes at a time, like a slow UART
        let n = buffer.len().min(self.pending.len()).min(3);
        for slot in buffer.iter_mut().take(n) {
            *slot = self.pending.pop_front().unwrap_or_default();
        }
        Ok(n)
    }

    fn discard_input(&mut self) {
        self.pending.clear();
    }

    fn name(&self) -> String {
        format!("simulated slave {}", self.slave_id)
    }
}

pub fn test_config() -> Config {
    Config {
        port_name: "sim".to_string(),
        timeout_ms: 100,
        inter_frame_delay_ms: 0,
        ..Config::default()
    }
}

/// Connected driver on a fresh simulated slave 1, with a notification channel.
pub fn connected_driver() -> (RtuDriver, SlaveHandle, UnboundedReceiver<ErrorNotification>) {
    let (driver, handle, rx) = driver();
    driver.connect().unwrap();
    (driver, handle, rx)
}

pub fn driver() -> (RtuDriver, SlaveHandle, UnboundedReceiver<ErrorNotification>) {
    let (slave, handle) = SimulatedSlave::new(1);
    let (tx, rx) = mpsc::unbounded_channel();
    let driver = RtuDriver::new(test_config(), Box::new(slave), Arc::new(tx));
    (driver, handle, rx)
}

pub fn drain(rx: &mut UnboundedReceiver<ErrorNotification>) -> Vec<ErrorNotification> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}
