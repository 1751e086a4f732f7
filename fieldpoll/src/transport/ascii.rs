use tokio::time::Instant;

use crate::codec::{hex_decode, hex_encode, lrc};
use crate::constants::frame::{EXCEPTION_MASK, MAX_ADU_LENGTH};
use crate::decode::{DecodeLevel, FrameDecodeLevel};
use crate::error::{FrameParseError, RequestError};
use crate::phys::{format_bytes, PhysLayer};
use crate::transport::read_before;

const START: u8 = b':';
const END: &[u8] = b"\r\n";
// start marker, two hex characters per byte including the LRC, CRLF
const MAX_LINE_LENGTH: usize = 1 + 2 * (MAX_ADU_LENGTH + 1) + 2;

/// send an ASCII request and read the matching response
pub(crate) async fn transact(
    phys: &mut PhysLayer,
    request: &[u8],
    deadline: Instant,
    decode: DecodeLevel,
) -> Result<Vec<u8>, RequestError> {
    send(phys, request, decode).await?;

    let mut line: Vec<u8> = Vec::new();
    let mut buffer = [0u8; MAX_LINE_LENGTH];
    loop {
        let length = read_before(phys, &mut buffer, deadline, decode.physical).await?;
        line.extend_from_slice(&buffer[..length]);

        if let Some(end) = line.iter().position(|x| *x == b'\n') {
            if end + 1 < line.len() {
                tracing::warn!("ASCII discarded {} bytes after line end", line.len() - end - 1);
            }
            let adu = parse_line(&line[..end], request[0], request[1])?;
            if decode.frame.enabled() {
                tracing::info!("ASCII RX - {}", AsciiDisplay::new(decode.frame, &adu));
            }
            return Ok(adu);
        }

        if line.len() > MAX_LINE_LENGTH {
            return Err(FrameParseError::FrameTooLarge(line.len()).into());
        }
    }
}

/// send an ASCII request without waiting for a response
pub(crate) async fn send(
    phys: &mut PhysLayer,
    request: &[u8],
    decode: DecodeLevel,
) -> Result<(), RequestError> {
    if decode.frame.enabled() {
        tracing::info!("ASCII TX - {}", AsciiDisplay::new(decode.frame, request));
    }
    phys.write(&encode(request), decode.physical).await?;
    Ok(())
}

pub(crate) fn encode(adu: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(2 * adu.len() + 5);
    frame.push(START);
    frame.extend(hex_encode(adu));
    frame.extend(hex_encode(&[lrc(adu)]));
    frame.extend_from_slice(END);
    frame
}

/// decode one line without its trailing LF
fn parse_line(line: &[u8], unit: u8, function: u8) -> Result<Vec<u8>, FrameParseError> {
    // anything before the last start marker is noise
    let start = line
        .iter()
        .rposition(|x| *x == START)
        .ok_or(FrameParseError::MissingStartMarker)?;
    let body = &line[start + 1..];
    let body = body.strip_suffix(b"\r").unwrap_or(body);

    let bytes = hex_decode(body)?;
    let (received, adu) = match bytes.split_last() {
        Some((lrc, adu)) if adu.len() >= 2 => (*lrc, adu),
        _ => return Err(FrameParseError::FrameTooShort(bytes.len())),
    };

    let expected = lrc(adu);
    if received != expected {
        return Err(FrameParseError::LrcMismatch { received, expected });
    }
    if adu[0] != unit {
        return Err(FrameParseError::UnitIdMismatch {
            expected: unit,
            received: adu[0],
        });
    }
    if adu[1] != function && adu[1] != function | EXCEPTION_MASK {
        return Err(FrameParseError::FunctionCodeMismatch {
            expected: function,
            received: adu[1],
        });
    }
    Ok(adu.to_vec())
}

struct AsciiDisplay<'a> {
    level: FrameDecodeLevel,
    adu: &'a [u8],
}

impl<'a> AsciiDisplay<'a> {
    fn new(level: FrameDecodeLevel, adu: &'a [u8]) -> Self {
        Self { level, adu }
    }
}

impl std::fmt::Display for AsciiDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if let [unit, function, data @ ..] = self.adu {
            write!(
                f,
                "unit: {unit:#04X} fc: {function:#04X} len: {} lrc: {:#04X}",
                data.len(),
                lrc(self.adu)
            )?;
            if self.level.payload_enabled() {
                format_bytes(f, data)?;
            }
        }
        Ok(())
    }
}
