use tokio::time::Instant;

use crate::codec::{append_crc, crc16, split_crc};
use crate::constants::frame::{CRC_LENGTH, EXCEPTION_MASK, MAX_RESYNC_ITERATIONS, MAX_RTU_FRAME_LENGTH};
use crate::decode::{DecodeLevel, FrameDecodeLevel};
use crate::error::{FrameParseError, RequestError};
use crate::phys::{format_bytes, PhysLayer};
use crate::transport::length::{response_length, Length};
use crate::transport::read_before;

/// send an RTU request and read the matching response
pub(crate) async fn transact(
    phys: &mut PhysLayer,
    request: &[u8],
    deadline: Instant,
    decode: DecodeLevel,
) -> Result<Vec<u8>, RequestError> {
    send(phys, request, decode).await?;

    let mut parser = RtuParser::new(request[0], request[1]);
    let mut buffer = [0u8; MAX_RTU_FRAME_LENGTH];
    loop {
        match parser.parse()? {
            ParseStep::Complete(adu) => {
                if decode.frame.enabled() {
                    tracing::info!("RTU RX - {}", RtuDisplay::new(decode.frame, &adu));
                }
                return Ok(adu);
            }
            ParseStep::Need(count) => {
                let count = count.min(buffer.len());
                let length =
                    read_before(phys, &mut buffer[..count], deadline, decode.physical).await?;
                parser.push(&buffer[..length]);
            }
        }
    }
}

/// send an RTU request without waiting for a response
pub(crate) async fn send(
    phys: &mut PhysLayer,
    request: &[u8],
    decode: DecodeLevel,
) -> Result<(), RequestError> {
    let mut frame = request.to_vec();
    append_crc(&mut frame);
    if decode.frame.enabled() {
        tracing::info!("RTU TX - {}", RtuDisplay::new(decode.frame, request));
    }
    phys.write(&frame, decode.physical).await?;
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum ParseStep {
    Complete(Vec<u8>),
    Need(usize),
}

/// Accumulates response bytes and hunts for a frame matching the request
///
/// a candidate failing validation costs one leading byte
struct RtuParser {
    unit: u8,
    function: u8,
    rx: Vec<u8>,
    dropped: usize,
}

impl RtuParser {
    fn new(unit: u8, function: u8) -> Self {
        Self {
            unit,
            function,
            rx: Vec::new(),
            dropped: 0,
        }
    }

    fn push(&mut self, data: &[u8]) {
        self.rx.extend_from_slice(data);
    }

    fn parse(&mut self) -> Result<ParseStep, RequestError> {
        loop {
            if let Err(err) = self.check_header() {
                self.resync(err)?;
                continue;
            }

            let target = match response_length(&self.rx) {
                Ok(Length::AtLeast(x)) => {
                    return Ok(ParseStep::Need(x.saturating_sub(self.rx.len()).max(1)))
                }
                Ok(Length::Exact(x)) => x + CRC_LENGTH,
                Err(err) => {
                    self.resync(err)?;
                    continue;
                }
            };

            if self.rx.len() < target {
                return Ok(ParseStep::Need(target - self.rx.len()));
            }

            match self.validate(target) {
                Ok(adu) => return Ok(ParseStep::Complete(adu)),
                Err(err) => self.resync(err)?,
            }
        }
    }

    fn check_header(&self) -> Result<(), FrameParseError> {
        if let Some(unit) = self.rx.first() {
            if *unit != self.unit {
                return Err(FrameParseError::UnitIdMismatch {
                    expected: self.unit,
                    received: *unit,
                });
            }
        }
        if let Some(function) = self.rx.get(1) {
            if *function != self.function && *function != self.function | EXCEPTION_MASK {
                return Err(FrameParseError::FunctionCodeMismatch {
                    expected: self.function,
                    received: *function,
                });
            }
        }
        Ok(())
    }

    fn validate(&self, target: usize) -> Result<Vec<u8>, FrameParseError> {
        let frame = &self.rx[..target];
        let (adu, received) = split_crc(frame).ok_or(FrameParseError::FrameTooShort(target))?;
        let expected = crc16(adu);
        if received != expected {
            return Err(FrameParseError::CrcMismatch { received, expected });
        }
        Ok(adu.to_vec())
    }

    fn resync(&mut self, err: FrameParseError) -> Result<(), RequestError> {
        if self.dropped >= MAX_RESYNC_ITERATIONS {
            tracing::warn!("RTU resync limit reached: {}", err);
            return Err(FrameParseError::ResyncLimitReached.into());
        }
        tracing::debug!("RTU resync: {}", err);
        if !self.rx.is_empty() {
            self.rx.remove(0);
        }
        self.dropped += 1;
        Ok(())
    }
}

pub(crate) struct RtuDisplay<'a> {
    level: FrameDecodeLevel,
    adu: &'a [u8],
}

impl<'a> RtuDisplay<'a> {
    pub(crate) fn new(level: FrameDecodeLevel, adu: &'a [u8]) -> Self {
        RtuDisplay { level, adu }
    }
}

impl std::fmt::Display for RtuDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if let [unit, function, data @ ..] = self.adu {
            write!(
                f,
                "unit: {unit:#04X} fc: {function:#04X} len: {} crc: {:#06X}",
                data.len(),
                crc16(self.adu)
            )?;
            if self.level.payload_enabled() {
                format_bytes(f, data)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::mock;
    use std::time::Duration;

    const REQUEST: &[u8] = &[0x01, 0x03, 0x00, 0x10, 0x00, 0x02];
    const RESPONSE: &[u8] = &[0x01, 0x03, 0x04, 0x00, 0x2A, 0x00, 0x00];

    fn with_crc(adu: &[u8]) -> Vec<u8> {
        let mut frame = adu.to_vec();
        append_crc(&mut frame);
        frame
    }

    fn parse_all(data: &[u8]) -> Result<ParseStep, RequestError> {
        let mut parser = RtuParser::new(0x01, 0x03);
        parser.push(data);
        parser.parse()
    }

    #[test]
    fn asks_for_header_then_exact_length() {
        assert_eq!(parse_all(&[]), Ok(ParseStep::Need(2)));
        assert_eq!(parse_all(&[0x01, 0x03]), Ok(ParseStep::Need(1)));
        assert_eq!(parse_all(&[0x01, 0x03, 0x04]), Ok(ParseStep::Need(6)));
    }

    #[test]
    fn completes_valid_frame() {
        assert_eq!(
            parse_all(&with_crc(RESPONSE)),
            Ok(ParseStep::Complete(RESPONSE.to_vec()))
        );
    }

    #[test]
    fn skips_leading_garbage() {
        let mut data = vec![0xFF, 0x00];
        data.extend(with_crc(RESPONSE));
        assert_eq!(parse_all(&data), Ok(ParseStep::Complete(RESPONSE.to_vec())));
    }

    #[test]
    fn corrupted_frame_is_dropped_and_the_next_one_accepted() {
        let mut corrupted = with_crc(RESPONSE);
        corrupted[4] ^= 0xFF;
        let mut data = corrupted;
        data.extend(with_crc(RESPONSE));
        assert_eq!(parse_all(&data), Ok(ParseStep::Complete(RESPONSE.to_vec())));
    }

    #[test]
    fn frames_are_limited_to_256_bytes_with_the_crc() {
        let mut largest = vec![0x01, 0x03, 0xFB];
        largest.resize(254, 0x00);
        let frame = with_crc(&largest);
        assert_eq!(frame.len(), MAX_RTU_FRAME_LENGTH);
        assert_eq!(parse_all(&frame), Ok(ParseStep::Complete(largest)));

        let mut oversize = vec![0x01, 0x03, 0xFC];
        oversize.resize(255, 0x00);
        assert!(!matches!(
            parse_all(&with_crc(&oversize)),
            Ok(ParseStep::Complete(_))
        ));
    }

    #[test]
    fn accepts_exception_response() {
        let frame = with_crc(&[0x01, 0x83, 0x02]);
        assert_eq!(
            parse_all(&frame),
            Ok(ParseStep::Complete(vec![0x01, 0x83, 0x02]))
        );
    }

    #[test]
    fn gives_up_after_resync_limit() {
        let garbage = vec![0x55; MAX_RESYNC_ITERATIONS + 1];
        assert_eq!(
            parse_all(&garbage),
            Err(RequestError::TransactionFailure(
                FrameParseError::ResyncLimitReached
            ))
        );
    }

    #[tokio::test]
    async fn transacts_over_physical_layer() {
        let (mock, mut handle) = mock();
        let mut phys = PhysLayer::new_mock(mock);
        handle.expect_write(&with_crc(REQUEST));
        handle.read(&with_crc(RESPONSE));

        let deadline = Instant::now() + Duration::from_secs(1);
        let adu = transact(&mut phys, REQUEST, deadline, DecodeLevel::nothing())
            .await
            .unwrap();
        assert_eq!(adu, RESPONSE);
    }

    #[tokio::test]
    async fn times_out_without_response() {
        let (mock, mut handle) = mock();
        let mut phys = PhysLayer::new_mock(mock);
        handle.expect_write(&with_crc(REQUEST));
        // only part of the response arrives
        handle.read(&with_crc(RESPONSE)[..4]);

        let deadline = Instant::now() + Duration::from_millis(50);
        let result = transact(&mut phys, REQUEST, deadline, DecodeLevel::nothing()).await;
        assert_eq!(result, Err(RequestError::ResponseTimeout));
    }
}
