use log::info;
use std::sync::Arc;

use super::item::ItemData;
use super::value::{self, DataType, Value};
use crate::config::Config;
use crate::modbus::address::ProtocolAddress;
use crate::modbus::client::ModbusClient;
use crate::modbus::notify::{ErrorNotification, ErrorSink, LogSink};
use crate::modbus::protocol::{FunctionFamily, MAX_PDU_SIZE};
use crate::modbus::transport::{SerialTransport, Transport};
use crate::utils::error::ModbusError;

/// Modbus RTU master for one serial line.
///
/// Reads never fail outright: they return an [`ItemData`] whose quality is
/// Bad when no payload came back. Writes return the error, whose
/// [`ModbusError::code`] is the status code. Faults worth an operator's
/// attention also go to the [`ErrorSink`].
pub struct RtuDriver {
    config: Config,
    client: ModbusClient,
}

impl RtuDriver {
    pub fn new(config: Config, transport: Box<dyn Transport>, sink: Arc<dyn ErrorSink>) -> Self {
        let client = ModbusClient::new(transport, config.effective_timeout(), sink)
            .with_inter_frame_delay(config.inter_frame_delay());
        Self { config, client }
    }

    /// Driver on the configured serial port, reporting faults to the log.
    pub fn serial(config: Config) -> Result<Self, ModbusError> {
        let transport = SerialTransport::new(config.serial_settings()?);
        Ok(Self::new(config, Box::new(transport), Arc::new(LogSink)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn connect(&self) -> Result<(), ModbusError> {
        self.client
            .set_timing(self.config.effective_timeout(), self.config.inter_frame_delay())?;
        self.client.open().map_err(|e| {
            self.client
                .sink()
                .notify(ErrorNotification::from_error(&e, self.config.port_name.clone()));
            e
        })
    }

    pub fn disconnect(&self) {
        self.client.close();
        info!("🔌 Driver for {} disconnected", self.config.port_name);
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_open()
    }

    /// Largest PDU the line carries.
    pub fn pdu_size(&self) -> usize {
        MAX_PDU_SIZE
    }

    pub fn get_address(&self, address: &str) -> ProtocolAddress {
        ProtocolAddress::parse(address, self.config.slave_id)
    }

    // ---- reads ----

    pub fn read_bytes(&self, address: &ProtocolAddress, size: u16) -> ItemData<Vec<u8>> {
        self.client.read_bytes(address, size).into()
    }

    pub fn read_int16(&self, address: &ProtocolAddress) -> ItemData<i16> {
        self.read_as(address, DataType::Int16, 0)
    }

    pub fn read_uint16(&self, address: &ProtocolAddress) -> ItemData<u16> {
        self.read_as(address, DataType::UInt16, 0)
    }

    pub fn read_int32(&self, address: &ProtocolAddress) -> ItemData<i32> {
        self.read_as(address, DataType::Int32, 0)
    }

    pub fn read_uint32(&self, address: &ProtocolAddress) -> ItemData<u32> {
        self.read_as(address, DataType::UInt32, 0)
    }

    pub fn read_float(&self, address: &ProtocolAddress) -> ItemData<f32> {
        self.read_as(address, DataType::Float, 0)
    }

    pub fn read_byte(&self, address: &ProtocolAddress) -> ItemData<u8> {
        self.read_as(address, DataType::Byte, 0)
    }

    pub fn read_bit(&self, address: &ProtocolAddress) -> ItemData<bool> {
        self.read_as(address, DataType::Bit, 0)
    }

    /// Reads `len` ASCII characters.
    pub fn read_string(&self, address: &ProtocolAddress, len: u16) -> ItemData<String> {
        self.read_as(address, DataType::String, len)
    }

    pub fn read_value(&self, address: &ProtocolAddress, data_type: DataType, len: u16) -> ItemData<Value> {
        match self.fetch(address, data_type, len) {
            Ok(value) => ItemData::good(value),
            Err(_) => ItemData::bad_with(Value::zero(data_type)),
        }
    }

    fn read_as<T>(&self, address: &ProtocolAddress, data_type: DataType, len: u16) -> ItemData<T>
    where
        T: TryFrom<Value, Error = ModbusError> + Default,
    {
        self.fetch(address, data_type, len).and_then(T::try_from).into()
    }

    fn fetch(&self, address: &ProtocolAddress, data_type: DataType, len: u16) -> Result<Value, ModbusError> {
        if data_type == DataType::Bit {
            let family = address.family()?;
            let target = if family.is_bit_addressed() {
                value::bit_block(address)
            } else {
                value::check_bit_offset(address)?;
                *address
            };
            let payload = self.client.read_bytes(&target, 1)?;
            return value::decode_bit(&payload, &target).map(Value::Bit);
        }

        let mut payload = self.client.read_bytes(address, data_type.register_count(len))?;
        if data_type == DataType::String {
            payload.truncate(len as usize);
        }
        value::decode(data_type, &payload, address.byte_order)
    }

    // ---- writes ----

    pub fn write_int16(&self, address: &ProtocolAddress, value: i16) -> Result<(), ModbusError> {
        self.write_value(address, &Value::Int16(value))
    }

    pub fn write_uint16(&self, address: &ProtocolAddress, value: u16) -> Result<(), ModbusError> {
        self.write_value(address, &Value::UInt16(value))
    }

    pub fn write_int32(&self, address: &ProtocolAddress, value: i32) -> Result<(), ModbusError> {
        self.write_value(address, &Value::Int32(value))
    }

    pub fn write_uint32(&self, address: &ProtocolAddress, value: u32) -> Result<(), ModbusError> {
        self.write_value(address, &Value::UInt32(value))
    }

    pub fn write_float(&self, address: &ProtocolAddress, value: f32) -> Result<(), ModbusError> {
        self.write_value(address, &Value::Float(value))
    }

    pub fn write_string(&self, address: &ProtocolAddress, value: &str) -> Result<(), ModbusError> {
        self.write_value(address, &Value::String(value.to_string()))
    }

    /// Raw register bytes in wire order, written with FC16.
    pub fn write_bytes(&self, address: &ProtocolAddress, bytes: &[u8]) -> Result<(), ModbusError> {
        self.register_target(address, DataType::UInt16)?;
        self.client
            .write_multiple_registers(address.slave_id, address.start as i64, bytes)
    }

    pub fn write_value(&self, address: &ProtocolAddress, value: &Value) -> Result<(), ModbusError> {
        if let Value::Bit(on) = value {
            return self.write_bit(address, *on);
        }
        self.register_target(address, value.data_type())?;

        let bytes = value::encode(value, address.byte_order)?;
        let slave = address.slave_id;
        let start = address.start as i64;
        match value {
            Value::Int16(_) | Value::UInt16(_) | Value::Byte(_) => {
                self.client.write_single_register(slave, start, [bytes[0], bytes[1]])
            }
            _ => self.client.write_multiple_registers(slave, start, &bytes),
        }
    }

    /// Sets one coil (FC5), or one bit of a holding register by reading the
    /// register and writing it back (FC3 then FC6). Register bits are
    /// numbered the way [`value::decode_bit`] reads them.
    ///
    /// The register update spans two exchanges and is not atomic against
    /// other masters on the line.
    pub fn write_bit(&self, address: &ProtocolAddress, on: bool) -> Result<(), ModbusError> {
        match self.writable_family(address)? {
            FunctionFamily::Coil => {
                self.client
                    .write_single_coil(address.slave_id, address.coil_index() as i64, on)
            }
            _ => {
                value::check_bit_offset(address)?;
                let mut payload = self.client.read_bytes(address, 1)?;
                value::set_bit(&mut payload, address, on)?;
                let register = match payload[..] {
                    [high, low, ..] => [high, low],
                    _ => {
                        return Err(ModbusError::InvalidData(format!(
                            "register read returned {} bytes",
                            payload.len()
                        )))
                    }
                };
                self.client
                    .write_single_register(address.slave_id, address.start as i64, register)
            }
        }
    }

    /// Writes consecutive coils (FC15) starting at the address's coil.
    pub fn write_bits(&self, address: &ProtocolAddress, bits: &[bool]) -> Result<(), ModbusError> {
        match self.writable_family(address)? {
            FunctionFamily::Coil => {
                self.client
                    .write_multiple_coils(address.slave_id, address.coil_index() as i64, bits)
            }
            family => Err(ModbusError::UnsupportedOperation(format!(
                "bit arrays cannot be written to a {} ({})",
                family, address
            ))),
        }
    }

    fn writable_family(&self, address: &ProtocolAddress) -> Result<FunctionFamily, ModbusError> {
        let family = address.family()?;
        if !family.is_writable() {
            return Err(ModbusError::ReadOnly(format!("{} is a {}", address, family)));
        }
        Ok(family)
    }

    fn register_target(&self, address: &ProtocolAddress, data_type: DataType) -> Result<(), ModbusError> {
        match self.writable_family(address)? {
            FunctionFamily::HoldingRegister => Ok(()),
            family => Err(ModbusError::UnsupportedOperation(format!(
                "{} values cannot be written to a {} ({})",
                data_type, family, address
            ))),
        }
    }
}
