pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    let poly: u16 = 0xA001;

    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ poly;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// CRC in wire order: low byte first.
pub fn crc16_bytes(data: &[u8]) -> [u8; 2] {
    crc16_modbus(data).to_le_bytes()
}

pub fn append_crc(frame: &mut Vec<u8>) {
    let crc = crc16_bytes(frame);
    frame.extend_from_slice(&crc);
}

/// Checks the trailing two bytes of `frame` against the CRC of the rest.
pub fn validate(frame: &[u8]) -> bool {
    if frame.len() < 2 {
        return false;
    }
    let data_len = frame.len() - 2;
    crc16_bytes(&frame[..data_len]) == [frame[data_len], frame[data_len + 1]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_modbus() {
        let data = vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(crc16_modbus(&data), 0x0A84);
        assert_eq!(crc16_bytes(&data), [0x84, 0x0A]);
    }

    #[test]
    fn test_crc_of_empty_is_seed() {
        assert_eq!(crc16_modbus(&[]), 0xFFFF);
    }

    #[test]
    fn test_validate() {
        let mut frame = vec![0x01, 0x03, 0x02, 0x12, 0x34];
        append_crc(&mut frame);
        assert!(validate(&frame));

        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(!validate(&frame));
    }

    #[test]
    fn test_validate_swapped_crc_bytes_fails() {
        let mut frame = vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x0A, 0x84];
        assert!(!validate(&frame));
        frame.swap(6, 7);
        assert!(validate(&frame));
    }

    #[test]
    fn test_validate_short_frame() {
        assert!(!validate(&[]));
        assert!(!validate(&[0x84]));
        // Empty body: the CRC is the bare seed
        assert!(validate(&[0xFF, 0xFF]));
    }
}
