use super::ByteOrder;

/// decode a `u8` from one byte
pub fn decode_u8(byte: u8) -> u8 {
    byte
}

/// decode an `i8` from one byte
pub fn decode_i8(byte: u8) -> i8 {
    i8::from_be_bytes([byte])
}

/// decode a `u16` from one register
pub fn decode_u16(bytes: [u8; 2], order: ByteOrder) -> u16 {
    match order {
        ByteOrder::Natural => u16::from_be_bytes(bytes),
        ByteOrder::Swapped => u16::from_le_bytes(bytes),
    }
}

/// decode an `i16` from one register
pub fn decode_i16(bytes: [u8; 2], order: ByteOrder) -> i16 {
    decode_u16(bytes, order) as i16
}

/// decode a `u32` from two registers
pub fn decode_u32(bytes: [u8; 4], order: ByteOrder) -> u32 {
    match order {
        ByteOrder::Natural => u32::from_be_bytes(bytes),
        ByteOrder::Swapped => u32::from_be_bytes([bytes[1], bytes[0], bytes[3], bytes[2]]),
    }
}

/// decode an `i32` from two registers
pub fn decode_i32(bytes: [u8; 4], order: ByteOrder) -> i32 {
    decode_u32(bytes, order) as i32
}

/// decode an IEEE-754 `f32` from two registers
pub fn decode_f32(bytes: [u8; 4], order: ByteOrder) -> f32 {
    f32::from_bits(decode_u32(bytes, order))
}

/// encode a `u16` into one register
pub fn encode_u16(value: u16, order: ByteOrder) -> [u8; 2] {
    match order {
        ByteOrder::Natural => value.to_be_bytes(),
        ByteOrder::Swapped => value.to_le_bytes(),
    }
}

/// encode an `i16` into one register
pub fn encode_i16(value: i16, order: ByteOrder) -> [u8; 2] {
    encode_u16(value as u16, order)
}

/// encode a `u32` into two registers
pub fn encode_u32(value: u32, order: ByteOrder) -> [u8; 4] {
    let [a, b, c, d] = value.to_be_bytes();
    match order {
        ByteOrder::Natural => [a, b, c, d],
        ByteOrder::Swapped => [b, a, d, c],
    }
}

/// encode an `i32` into two registers
pub fn encode_i32(value: i32, order: ByteOrder) -> [u8; 4] {
    encode_u32(value as u32, order)
}

/// encode an IEEE-754 `f32` into two registers
pub fn encode_f32(value: f32, order: ByteOrder) -> [u8; 4] {
    encode_u32(value.to_bits(), order)
}
