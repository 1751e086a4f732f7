use scursor::{ReadCursor, WriteCursor};
use tokio::time::Instant;

use crate::constants::frame::{BRIDGE_HEADER_LENGTH, EXCEPTION_MASK, MAX_ADU_LENGTH};
use crate::decode::{DecodeLevel, FrameDecodeLevel};
use crate::error::{FrameParseError, RequestError};
use crate::phys::{format_bytes, PhysLayer};
use crate::transport::length::{response_length, Length};
use crate::transport::{read_before, TxId};

/// send a bridge-framed request and read the response with the same transaction id
pub(crate) async fn transact(
    phys: &mut PhysLayer,
    tx_id: TxId,
    request: &[u8],
    deadline: Instant,
    decode: DecodeLevel,
) -> Result<Vec<u8>, RequestError> {
    send(phys, tx_id, request, decode).await?;

    loop {
        let (header, adu) = read_frame(phys, deadline, decode).await?;
        if header.tx_id != tx_id {
            tracing::warn!(
                "bridge skipping stale response, tx id: {} expected: {}",
                header.tx_id,
                tx_id
            );
            continue;
        }
        if decode.frame.enabled() {
            tracing::info!("BRIDGE RX - {}", BridgeDisplay::new(decode.frame, header, &adu));
        }
        check_unit_and_function(&adu, request[0], request[1])?;
        return Ok(adu);
    }
}

/// send a bridge-framed request without waiting for a response
pub(crate) async fn send(
    phys: &mut PhysLayer,
    tx_id: TxId,
    request: &[u8],
    decode: DecodeLevel,
) -> Result<(), RequestError> {
    let mut buffer = [0u8; BRIDGE_HEADER_LENGTH + MAX_ADU_LENGTH];
    let length = {
        let mut cursor = WriteCursor::new(&mut buffer);
        cursor.write_u16_be(tx_id.to_u16())?;
        cursor.write_u16_be(0)?;
        cursor.write_u16_be(request.len() as u16)?;
        cursor.write_bytes(request)?;
        cursor.position()
    };

    if decode.frame.enabled() {
        let header = BridgeHeader {
            tx_id,
            length: request.len(),
        };
        tracing::info!("BRIDGE TX - {}", BridgeDisplay::new(decode.frame, header, request));
    }

    phys.write(&buffer[..length], decode.physical).await?;
    Ok(())
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct BridgeHeader {
    tx_id: TxId,
    length: usize,
}

impl BridgeHeader {
    fn parse(bytes: &[u8]) -> Result<Self, RequestError> {
        let mut cursor = ReadCursor::new(bytes);
        let tx_id = TxId::new(cursor.read_u16_be()?);
        let protocol_id = cursor.read_u16_be()?;
        let length = cursor.read_u16_be()? as usize;
        cursor.expect_empty()?;
        if protocol_id != 0 {
            return Err(FrameParseError::UnknownProtocolId(protocol_id).into());
        }
        Ok(Self { tx_id, length })
    }
}

/// read one header and body, growing the expected body length as it is learned
async fn read_frame(
    phys: &mut PhysLayer,
    deadline: Instant,
    decode: DecodeLevel,
) -> Result<(BridgeHeader, Vec<u8>), RequestError> {
    let mut rx: Vec<u8> = Vec::with_capacity(BRIDGE_HEADER_LENGTH + MAX_ADU_LENGTH);
    let mut buffer = [0u8; BRIDGE_HEADER_LENGTH + MAX_ADU_LENGTH];

    loop {
        let target = if rx.len() < BRIDGE_HEADER_LENGTH {
            BRIDGE_HEADER_LENGTH + 2
        } else {
            match response_length(&rx[BRIDGE_HEADER_LENGTH..])? {
                Length::AtLeast(x) => BRIDGE_HEADER_LENGTH + x,
                Length::Exact(x) => {
                    let total = BRIDGE_HEADER_LENGTH + x;
                    if rx.len() >= total {
                        let header = BridgeHeader::parse(&rx[..BRIDGE_HEADER_LENGTH])?;
                        let body = rx[BRIDGE_HEADER_LENGTH..total].to_vec();
                        if header.length != body.len() {
                            return Err(FrameParseError::LengthMismatch {
                                header: header.length,
                                body: body.len(),
                            }
                            .into());
                        }
                        return Ok((header, body));
                    }
                    total
                }
            }
        };

        let count = target.saturating_sub(rx.len()).clamp(1, buffer.len());
        let length = read_before(phys, &mut buffer[..count], deadline, decode.physical).await?;
        rx.extend_from_slice(&buffer[..length]);
    }
}

fn check_unit_and_function(adu: &[u8], unit: u8, function: u8) -> Result<(), FrameParseError> {
    match adu {
        [u, f, ..] => {
            if *u != unit {
                return Err(FrameParseError::UnitIdMismatch {
                    expected: unit,
                    received: *u,
                });
            }
            if *f != function && *f != function | EXCEPTION_MASK {
                return Err(FrameParseError::FunctionCodeMismatch {
                    expected: function,
                    received: *f,
                });
            }
            Ok(())
        }
        _ => Err(FrameParseError::FrameTooShort(adu.len())),
    }
}

struct BridgeDisplay<'a> {
    level: FrameDecodeLevel,
    header: BridgeHeader,
    adu: &'a [u8],
}

impl<'a> BridgeDisplay<'a> {
    fn new(level: FrameDecodeLevel, header: BridgeHeader, adu: &'a [u8]) -> Self {
        Self { level, header, adu }
    }
}

impl std::fmt::Display for BridgeDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "tx_id: {} len: {}", self.header.tx_id, self.header.length)?;
        if let [unit, function, data @ ..] = self.adu {
            write!(f, " unit: {unit:#04X} fc: {function:#04X}")?;
            if self.level.payload_enabled() {
                format_bytes(f, data)?;
            }
        }
        Ok(())
    }
}
