use crate::constants::frame::{EXCEPTION_MASK, MAX_ADU_LENGTH};
use crate::error::FrameParseError;
use crate::function::code::FunctionCode;

/// Length of a response ADU (unit id, function code and data, no checksum or header)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Length {
    /// at least this many bytes are needed before the length can be refined
    ///
    /// only returned when fewer bytes than this have been received
    AtLeast(usize),
    /// the complete length
    Exact(usize),
}

/// estimate the length of a response from the bytes received so far
///
/// the estimate is refined as the unit id, function code and byte count arrive
pub(crate) fn response_length(adu: &[u8]) -> Result<Length, FrameParseError> {
    let function = match adu.get(1) {
        Some(x) => *x,
        None => return Ok(Length::AtLeast(2)),
    };

    if function & EXCEPTION_MASK != 0 {
        // unit, function, exception code
        return Ok(Length::Exact(3));
    }

    let code = FunctionCode::from_wire(function)
        .ok_or(FrameParseError::UnknownFunctionCode(function))?;

    let length = match code {
        FunctionCode::ReadCoils
        | FunctionCode::ReadDiscreteInputs
        | FunctionCode::ReadHoldingRegisters
        | FunctionCode::ReadInputRegisters
        | FunctionCode::GetCommEventLog
        | FunctionCode::ReportServerId
        | FunctionCode::ReadFromIndex => match adu.get(2) {
            Some(count) => Length::Exact(3 + *count as usize),
            None => Length::AtLeast(3),
        },
        FunctionCode::ReadExceptionStatus => Length::Exact(3),
        FunctionCode::WriteSingleCoil
        | FunctionCode::WriteSingleRegister
        | FunctionCode::WriteMultipleCoils
        | FunctionCode::WriteMultipleRegisters
        | FunctionCode::GetCommEventCounter
        | FunctionCode::EnumerationQuery => Length::Exact(6),
        FunctionCode::WriteToIndex
        | FunctionCode::WriteMaskedToIndex
        | FunctionCode::AssignLogicalAddress => Length::Exact(7),
        FunctionCode::ReadDeviceIdentification => device_identification_length(adu),
        FunctionCode::EnumerationReset => return Err(FrameParseError::UnknownFunctionCode(function)),
    };

    match length {
        Length::Exact(x) | Length::AtLeast(x) if x > MAX_ADU_LENGTH => {
            Err(FrameParseError::FrameTooLarge(x))
        }
        _ => Ok(length),
    }
}

/// walk the object list of a read device identification response
fn device_identification_length(adu: &[u8]) -> Length {
    // unit, function, mei type, read code, conformity, more follows, next id, count
    const HEADER: usize = 8;

    let count = match adu.get(HEADER - 1) {
        Some(x) => *x,
        None => return Length::AtLeast(HEADER),
    };

    let mut position = HEADER;
    for _ in 0..count {
        // object id, object length
        match adu.get(position + 1) {
            Some(length) => position += 2 + *length as usize,
            None => return Length::AtLeast(position + 2),
        }
        if position > MAX_ADU_LENGTH {
            break;
        }
    }
    Length::Exact(position)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refines_length_of_byte_count_responses() {
        assert_eq!(response_length(&[]), Ok(Length::AtLeast(2)));
        assert_eq!(response_length(&[0x01]), Ok(Length::AtLeast(2)));
        assert_eq!(response_length(&[0x01, 0x03]), Ok(Length::AtLeast(3)));
        assert_eq!(response_length(&[0x01, 0x03, 0x04]), Ok(Length::Exact(7)));
        assert_eq!(response_length(&[0x01, 0x42, 0x02]), Ok(Length::Exact(5)));
    }

    #[test]
    fn byte_counts_past_the_frame_limit_are_rejected() {
        assert_eq!(response_length(&[0x01, 0x03, 0xFB]), Ok(Length::Exact(254)));
        assert_eq!(
            response_length(&[0x01, 0x03, 0xFC]),
            Err(FrameParseError::FrameTooLarge(255))
        );
        assert_eq!(
            response_length(&[0x01, 0x03, 0xFF]),
            Err(FrameParseError::FrameTooLarge(258))
        );
    }

    #[test]
    fn fixed_length_responses() {
        assert_eq!(response_length(&[0x01, 0x05]), Ok(Length::Exact(6)));
        assert_eq!(response_length(&[0x01, 0x07]), Ok(Length::Exact(3)));
        assert_eq!(response_length(&[0x01, 0x44]), Ok(Length::Exact(7)));
        assert_eq!(response_length(&[0x01, 0x46]), Ok(Length::Exact(6)));
    }

    #[test]
    fn exception_responses_have_three_bytes() {
        assert_eq!(response_length(&[0x01, 0x83]), Ok(Length::Exact(3)));
        assert_eq!(response_length(&[0x01, 0xC4]), Ok(Length::Exact(3)));
    }

    #[test]
    fn unknown_function_is_an_error() {
        assert_eq!(
            response_length(&[0x01, 0x08]),
            Err(FrameParseError::UnknownFunctionCode(0x08))
        );
    }

    #[test]
    fn walks_device_identification_objects() {
        let header = [0x01, 0x2B, 0x0E, 0x04, 0x81, 0x00, 0x00, 0x01];
        assert_eq!(response_length(&header[..5]), Ok(Length::AtLeast(8)));
        assert_eq!(response_length(&header), Ok(Length::AtLeast(10)));

        let mut full = header.to_vec();
        full.extend_from_slice(&[0x00, 0x03, b'A', b'B', b'C']);
        assert_eq!(response_length(&full), Ok(Length::Exact(13)));
    }
}
