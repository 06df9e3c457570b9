use log::{debug, warn};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use super::address::ProtocolAddress;
use super::crc::validate;
use super::frame::{self, classify, ResponseKind, EXCEPTION_FRAME_LEN, WRITE_RESPONSE_LEN};
use super::notify::{ErrorNotification, ErrorSink};
use super::protocol::{
    exception_description, FC_WRITE_MULTIPLE_COILS, FC_WRITE_MULTIPLE_REGISTERS,
    FC_WRITE_SINGLE_COIL, FC_WRITE_SINGLE_REGISTER, MAX_READ_REGISTERS,
};
use super::transport::Transport;
use crate::utils::error::ModbusError;

/// Pause after each exchange so the next request respects inter-frame spacing.
pub const DEFAULT_INTER_FRAME_DELAY: Duration = Duration::from_millis(10);

struct Link {
    transport: Box<dyn Transport>,
    timeout: Duration,
    inter_frame_delay: Duration,
}

/// Request/response engine for one serial line.
///
/// The line carries one outstanding request at a time, so every exchange
/// holds the link mutex from the write of the request until the pacing
/// delay after the response has elapsed. Nothing is retried.
pub struct ModbusClient {
    link: Mutex<Link>,
    sink: Arc<dyn ErrorSink>,
}

impl ModbusClient {
    pub fn new(transport: Box<dyn Transport>, timeout: Duration, sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            link: Mutex::new(Link {
                transport,
                timeout,
                inter_frame_delay: DEFAULT_INTER_FRAME_DELAY,
            }),
            sink,
        }
    }

    pub fn with_inter_frame_delay(self, delay: Duration) -> Self {
        if let Ok(mut link) = self.link.lock() {
            link.inter_frame_delay = delay;
        }
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Link>, ModbusError> {
        self.link.lock().map_err(|_| ModbusError::LockError)
    }

    pub fn set_timing(&self, timeout: Duration, inter_frame_delay: Duration) -> Result<(), ModbusError> {
        let mut link = self.lock()?;
        link.timeout = timeout;
        link.inter_frame_delay = inter_frame_delay;
        Ok(())
    }

    pub fn open(&self) -> Result<(), ModbusError> {
        let mut link = self.lock()?;
        if link.transport.is_open() {
            return Ok(());
        }
        link.transport.open()
    }

    pub fn close(&self) {
        if let Ok(mut link) = self.link.lock() {
            link.transport.close();
        }
    }

    pub fn is_open(&self) -> bool {
        self.link
            .lock()
            .map(|link| link.transport.is_open())
            .unwrap_or(false)
    }

    pub fn sink(&self) -> &Arc<dyn ErrorSink> {
        &self.sink
    }

    /// Reads `size` registers (or `size * 16` bits for bit areas) starting at
    /// the address's word and returns the data bytes of the response.
    pub fn read_bytes(&self, address: &ProtocolAddress, size: u16) -> Result<Vec<u8>, ModbusError> {
        let result = self.read_bytes_inner(address, size);
        self.report(result, &address.to_string())
    }

    fn read_bytes_inner(&self, address: &ProtocolAddress, size: u16) -> Result<Vec<u8>, ModbusError> {
        let family = address.family()?;
        if size == 0 || size > MAX_READ_REGISTERS {
            return Err(ModbusError::InvalidData(format!(
                "cannot read {} registers (1..={})",
                size, MAX_READ_REGISTERS
            )));
        }

        let function = family.read_function();
        let request = if family.is_bit_addressed() {
            frame::read_request(
                address.slave_id,
                address.start as i64 * 16,
                size as i64 * 16,
                function,
            )?
        } else {
            frame::read_request(address.slave_id, address.start as i64, size as i64, function)?
        };

        let response = self.exchange(&request, function, frame::expected_read_len(size))?;
        Ok(frame::payload(&response).to_vec())
    }

    pub fn write_single_coil(&self, slave_id: u8, coil: i64, on: bool) -> Result<(), ModbusError> {
        let result = frame::write_single_coil(slave_id, coil, on)
            .and_then(|request| self.exchange(&request, FC_WRITE_SINGLE_COIL, WRITE_RESPONSE_LEN));
        self.report(result, &format!("{}:coil {}", slave_id, coil))
            .map(|_| ())
    }

    pub fn write_multiple_coils(&self, slave_id: u8, start: i64, bits: &[bool]) -> Result<(), ModbusError> {
        let result = frame::write_multiple_coils(slave_id, start, bits).and_then(|request| {
            self.exchange(&request, FC_WRITE_MULTIPLE_COILS, WRITE_RESPONSE_LEN)
        });
        self.report(result, &format!("{}:coils {}+{}", slave_id, start, bits.len()))
            .map(|_| ())
    }

    /// `value` holds the register in wire order.
    pub fn write_single_register(&self, slave_id: u8, address: i64, value: [u8; 2]) -> Result<(), ModbusError> {
        let result = frame::write_single_register(slave_id, address, value).and_then(|request| {
            self.exchange(&request, FC_WRITE_SINGLE_REGISTER, WRITE_RESPONSE_LEN)
        });
        self.report(result, &format!("{}:register {}", slave_id, address))
            .map(|_| ())
    }

    pub fn write_multiple_registers(&self, slave_id: u8, address: i64, values: &[u8]) -> Result<(), ModbusError> {
        let result = frame::write_multiple_registers(slave_id, address, values).and_then(|request| {
            self.exchange(&request, FC_WRITE_MULTIPLE_REGISTERS, WRITE_RESPONSE_LEN)
        });
        self.report(result, &format!("{}:registers {}", slave_id, address))
            .map(|_| ())
    }

    fn report<T>(&self, result: Result<T, ModbusError>, source: &str) -> Result<T, ModbusError> {
        if let Err(ref e) = result {
            warn!("⚠️ Modbus request {} failed: {}", source, e);
            if e.is_notified() {
                self.sink.notify(ErrorNotification::from_error(e, source));
            }
        }
        result
    }

    /// One request/response cycle. Returns the complete response frame.
    fn exchange(&self, request: &[u8], function: u8, expected_len: usize) -> Result<Vec<u8>, ModbusError> {
        let mut link = self.lock()?;
        if !link.transport.is_open() {
            return Err(ModbusError::NotConnected);
        }

        debug!("📤 TX [{}]: {}", link.transport.name(), hex::encode(request));
        let result = transact(&mut link, request, function, expected_len);

        let delay = link.inter_frame_delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        result
    }
}

fn transact(
    link: &mut Link,
    request: &[u8],
    function: u8,
    expected_len: usize,
) -> Result<Vec<u8>, ModbusError> {
    let transport = link.transport.as_mut();
    transport.write(request).map_err(|e| match e.kind() {
        io::ErrorKind::TimedOut => ModbusError::Timeout,
        _ => ModbusError::SendError(format!("Write failed: {}", e)),
    })?;

    let deadline = Instant::now() + link.timeout;
    let mut response = vec![0u8; expected_len.max(EXCEPTION_FRAME_LEN)];

    // Slave id and function code decide the shape of the rest
    read_until(transport, &mut response, 0, 2, deadline)?;

    match classify(&response[..2], function) {
        ResponseKind::Normal => {
            read_until(transport, &mut response, 2, expected_len, deadline)?;
            response.truncate(expected_len);
            debug!("📥 RX: {}", hex::encode(&response));

            frame::check_response(&response, function)?;
            Ok(response)
        }
        ResponseKind::Exception => {
            read_until(transport, &mut response, 2, EXCEPTION_FRAME_LEN, deadline)?;
            response.truncate(EXCEPTION_FRAME_LEN);
            debug!("📥 RX exception: {}", hex::encode(&response));

            if !validate(&response) {
                return Err(ModbusError::CrcError);
            }
            let code = response[2];
            debug!("Slave exception {}: {}", code, exception_description(code));
            Err(ModbusError::Exception { code })
        }
        ResponseKind::Unexpected(received) => {
            // Consume what would be the rest of a short frame, then drop any
            // longer tail so it does not leak into the next exchange
            let _ = read_until(transport, &mut response, 2, EXCEPTION_FRAME_LEN, deadline);
            transport.discard_input();
            Err(ModbusError::UnexpectedFunction {
                expected: function,
                received,
            })
        }
    }
}

/// Accumulates bytes into `buffer[filled..target]` until full or the
/// deadline passes.
fn read_until(
    transport: &mut dyn Transport,
    buffer: &mut [u8],
    mut filled: usize,
    target: usize,
    deadline: Instant,
) -> Result<usize, ModbusError> {
    while filled < target {
        if Instant::now() >= deadline {
            return Err(ModbusError::Timeout);
        }
        match transport.read(&mut buffer[filled..target]) {
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => return Err(ModbusError::Timeout),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ModbusError::CommunicationError(format!("Read failed: {}", e))),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::crc::append_crc;
    use crate::modbus::notify::NullSink;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc;

    /// Replays canned reads and records writes.
    struct Scripted {
        open: bool,
        reads: VecDeque<Vec<u8>>,
        written: Arc<StdMutex<Vec<Vec<u8>>>>,
        discarded: Arc<AtomicUsize>,
    }

    impl Transport for Scripted {
        fn open(&mut self) -> Result<(), ModbusError> {
            self.open = true;
            Ok(())
        }
        fn close(&mut self) {
            self.open = false;
        }
        fn is_open(&self) -> bool {
            self.open
        }
        fn write(&mut self, data: &[u8]) -> io::Result<()> {
            self.written.lock().unwrap().push(data.to_vec());
            Ok(())
        }
        fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(chunk) => {
                    let n = chunk.len().min(buffer.len());
                    buffer[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.reads.push_front(chunk[n..].to_vec());
                    }
                    Ok(n)
                }
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "no data")),
            }
        }
        fn discard_input(&mut self) {
            let dropped: usize = self.reads.drain(..).map(|chunk| chunk.len()).sum();
            self.discarded.fetch_add(dropped, Ordering::SeqCst);
        }
    }

    /// Open line that never delivers a byte: every read returns `Ok(0)`.
    struct Idle {
        writes: Arc<AtomicUsize>,
    }

    impl Transport for Idle {
        fn open(&mut self) -> Result<(), ModbusError> {
            Ok(())
        }
        fn close(&mut self) {}
        fn is_open(&self) -> bool {
            true
        }
        fn write(&mut self, _data: &[u8]) -> io::Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn read(&mut self, _buffer: &mut [u8]) -> io::Result<usize> {
            thread::sleep(Duration::from_millis(1));
            Ok(0)
        }
    }

    fn client(reads: Vec<Vec<u8>>) -> (ModbusClient, Arc<StdMutex<Vec<Vec<u8>>>>) {
        let written = Arc::new(StdMutex::new(Vec::new()));
        let transport = Scripted {
            open: true,
            reads: reads.into(),
            written: written.clone(),
            discarded: Arc::new(AtomicUsize::new(0)),
        };
        let client = ModbusClient::new(
            Box::new(transport),
            Duration::from_millis(200),
            Arc::new(NullSink),
        )
        .with_inter_frame_delay(Duration::ZERO);
        (client, written)
    }

    fn with_crc(mut frame: Vec<u8>) -> Vec<u8> {
        append_crc(&mut frame);
        frame
    }

    #[test]
    fn test_read_holding_register_in_fragments() {
        let response = with_crc(vec![0x01, 0x03, 0x02, 0x12, 0x34]);
        let (client, written) = client(vec![
            response[..1].to_vec(),
            response[1..4].to_vec(),
            response[4..].to_vec(),
        ]);

        let addr = ProtocolAddress::parse("40001", 1);
        let data = client.read_bytes(&addr, 1).unwrap();
        assert_eq!(data, vec![0x12, 0x34]);
        assert_eq!(
            written.lock().unwrap()[0],
            vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A]
        );
    }

    #[test]
    fn test_coil_read_expands_to_sixteen_bits() {
        let response = with_crc(vec![0x01, 0x01, 0x02, 0x01, 0x00]);
        let (client, written) = client(vec![response]);

        let addr = ProtocolAddress::parse("000017", 1);
        client.read_bytes(&addr, 1).unwrap();
        assert_eq!(&written.lock().unwrap()[0][..6], &[0x01, 0x01, 0x00, 0x10, 0x00, 0x10]);
    }

    #[test]
    fn test_exception_response() {
        let response = with_crc(vec![0x01, 0x83, 0x02]);
        let (client, _) = client(vec![response]);

        let addr = ProtocolAddress::parse("40001", 1);
        let err = client.read_bytes(&addr, 1).unwrap_err();
        assert!(matches!(err, ModbusError::Exception { code: 2 }));
    }

    #[test]
    fn test_crc_mismatch() {
        let mut response = with_crc(vec![0x01, 0x03, 0x02, 0x12, 0x34]);
        response[6] ^= 0xFF;
        let (client, _) = client(vec![response]);

        let addr = ProtocolAddress::parse("40001", 1);
        assert!(matches!(client.read_bytes(&addr, 1), Err(ModbusError::CrcError)));
    }

    #[test]
    fn test_unexpected_function() {
        let (client, _) = client(vec![vec![0x01, 0x04, 0x00, 0x00, 0x00]]);
        let addr = ProtocolAddress::parse("40001", 1);
        assert!(matches!(
            client.read_bytes(&addr, 1),
            Err(ModbusError::UnexpectedFunction { expected: 3, received: 4 })
        ));
    }

    #[test]
    fn test_unexpected_function_discards_long_tail() {
        let response = with_crc(vec![0x01, 0x04, 0x08, 1, 2, 3, 4, 5, 6, 7, 8]);
        let discarded = Arc::new(AtomicUsize::new(0));
        let transport = Scripted {
            open: true,
            reads: vec![response].into(),
            written: Arc::new(StdMutex::new(Vec::new())),
            discarded: discarded.clone(),
        };
        let client = ModbusClient::new(Box::new(transport), Duration::from_millis(200), Arc::new(NullSink))
            .with_inter_frame_delay(Duration::ZERO);

        let addr = ProtocolAddress::parse("40001", 1);
        assert!(matches!(
            client.read_bytes(&addr, 1),
            Err(ModbusError::UnexpectedFunction { expected: 3, received: 4 })
        ));
        // 13 bytes on the line, 5 read, the rest dropped
        assert_eq!(discarded.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_corrupt_exception_is_crc_error_without_notification() {
        let mut response = with_crc(vec![0x01, 0x83, 0x02]);
        response[4] ^= 0xFF;
        let transport = Scripted {
            open: true,
            reads: vec![response].into(),
            written: Arc::new(StdMutex::new(Vec::new())),
            discarded: Arc::new(AtomicUsize::new(0)),
        };
        let (tx, mut rx) = mpsc::unbounded_channel::<ErrorNotification>();
        let client = ModbusClient::new(Box::new(transport), Duration::from_millis(200), Arc::new(tx))
            .with_inter_frame_delay(Duration::ZERO);

        let addr = ProtocolAddress::parse("40001", 1);
        assert!(matches!(client.read_bytes(&addr, 1), Err(ModbusError::CrcError)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_deadline_ends_zero_byte_reads() {
        let writes = Arc::new(AtomicUsize::new(0));
        let transport = Idle { writes: writes.clone() };
        let timeout = Duration::from_millis(150);
        let client = ModbusClient::new(Box::new(transport), timeout, Arc::new(NullSink))
            .with_inter_frame_delay(Duration::ZERO);

        let addr = ProtocolAddress::parse("40001", 1);
        let started = Instant::now();
        assert!(matches!(client.read_bytes(&addr, 1), Err(ModbusError::Timeout)));
        let elapsed = started.elapsed();
        assert!(elapsed >= timeout, "returned after {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(2), "returned after {:?}", elapsed);
        assert_eq!(writes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_timeout_when_silent() {
        let (client, written) = client(vec![]);
        let addr = ProtocolAddress::parse("40001", 1);
        assert!(matches!(client.read_bytes(&addr, 1), Err(ModbusError::Timeout)));
        assert_eq!(written.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_not_connected_skips_the_wire() {
        let (client, written) = client(vec![]);
        client.close();
        let addr = ProtocolAddress::parse("40001", 1);
        assert!(matches!(client.read_bytes(&addr, 1), Err(ModbusError::NotConnected)));
        assert!(written.lock().unwrap().is_empty());
    }

    #[test]
    fn test_empty_address_and_bad_size() {
        let (client, written) = client(vec![]);
        let empty = ProtocolAddress::parse("", 1);
        assert!(matches!(client.read_bytes(&empty, 1), Err(ModbusError::InvalidAddress(_))));

        let addr = ProtocolAddress::parse("40001", 1);
        assert!(matches!(client.read_bytes(&addr, 0), Err(ModbusError::InvalidData(_))));
        assert!(matches!(client.read_bytes(&addr, 126), Err(ModbusError::InvalidData(_))));
        assert!(written.lock().unwrap().is_empty());
    }

    #[test]
    fn test_write_single_register_echo() {
        let echo = with_crc(vec![0x01, 0x06, 0x00, 0x01, 0x00, 0x03]);
        let (client, written) = client(vec![echo.clone()]);

        client.write_single_register(1, 1, [0x00, 0x03]).unwrap();
        assert_eq!(written.lock().unwrap()[0], echo);
    }

    #[test]
    fn test_write_exception() {
        let (client, _) = client(vec![with_crc(vec![0x01, 0x90, 0x04])]);
        let err = client.write_multiple_registers(1, 0, &[0, 1]).unwrap_err();
        assert!(matches!(err, ModbusError::Exception { code: 4 }));
    }
}
