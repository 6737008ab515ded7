/// Reflected CRC-16 (polynomial 0xA001), one byte at a time.
pub(crate) fn crc16_update(crc: u16, data: u8) -> u16 {
    let mut crc = crc ^ data as u16;
    for _ in 0..8 {
        crc = if crc & 1 != 0 {
            (crc >> 1) ^ 0xa001
        } else {
            crc >> 1
        };
    }
    crc
}

pub(crate) fn crc16_slice(crc: u16, data: &[u8]) -> u16 {
    data.iter().fold(crc, |crc, b| crc16_update(crc, *b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_known_value() {
        // CRC-16/ARC check value
        assert_eq!(crc16_slice(0, b"123456789"), 0xbb3d);
    }

    #[test]
    fn test_crc16_is_order_sensitive() {
        assert_ne!(crc16_slice(0, &[0x01, 0x02]), crc16_slice(0, &[0x02, 0x01]));
    }
}
