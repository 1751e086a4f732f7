use crate::error::FrameParseError;

const DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// encode bytes as upper-case hex characters
pub fn hex_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2);
    for byte in data {
        out.push(DIGITS[(byte >> 4) as usize]);
        out.push(DIGITS[(byte & 0x0F) as usize]);
    }
    out
}

/// decode pairs of hex characters, either case
pub fn hex_decode(ascii: &[u8]) -> Result<Vec<u8>, FrameParseError> {
    if ascii.len() % 2 != 0 {
        return Err(FrameParseError::OddHexLength);
    }

    ascii
        .chunks_exact(2)
        .map(|pair| Ok((nibble(pair[0])? << 4) | nibble(pair[1])?))
        .collect()
}

fn nibble(c: u8) -> Result<u8, FrameParseError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        _ => Err(FrameParseError::InvalidHexCharacter(c)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_upper_case() {
        assert_eq!(hex_encode(&[0x01, 0xAB, 0xF0]), b"01ABF0".to_vec());
    }

    #[test]
    fn decodes_either_case() {
        assert_eq!(hex_decode(b"01abF0").unwrap(), vec![0x01, 0xAB, 0xF0]);
    }

    #[test]
    fn round_trip_is_exact() {
        let data: Vec<u8> = (0..=255).collect();
        assert_eq!(hex_decode(&hex_encode(&data)).unwrap(), data);
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(hex_decode(b"0"), Err(FrameParseError::OddHexLength));
        assert_eq!(
            hex_decode(b"0G"),
            Err(FrameParseError::InvalidHexCharacter(b'G'))
        );
    }
}
