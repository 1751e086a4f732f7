use crate::constants::frame::CRC_LENGTH;

static CRC: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_MODBUS);

/// Modbus CRC16 over `data`
pub fn crc16(data: &[u8]) -> u16 {
    CRC.checksum(data)
}

/// append the CRC16 of `frame` to itself, low byte first
pub fn append_crc(frame: &mut Vec<u8>) {
    let crc = crc16(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}

/// split a frame into its body and the CRC carried in its two trailing bytes
///
/// returns `None` if the frame is too short to carry a CRC
pub fn split_crc(frame: &[u8]) -> Option<(&[u8], u16)> {
    let body_length = frame.len().checked_sub(CRC_LENGTH)?;
    let (body, crc) = frame.split_at(body_length);
    Some((body, u16::from_le_bytes([crc[0], crc[1]])))
}

/// true if the two trailing bytes are the CRC16 of the preceding bytes
pub fn check_crc(frame: &[u8]) -> bool {
    match split_crc(frame) {
        Some((body, received)) => crc16(body) == received,
        None => false,
    }
}

/// two's complement of the byte sum
pub fn lrc(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |acc, x| acc.wrapping_add(*x))
        .wrapping_neg()
}
