use scursor::{ReadCursor, WriteCursor};

use crate::constants::frame::MAX_ADU_LENGTH;
use crate::error::RequestError;
use crate::function::code::FunctionCode;
use crate::types::UnitId;

/// serialize `[unit][function][data]`
pub(crate) fn build<F>(unit: UnitId, code: FunctionCode, write: F) -> Result<Vec<u8>, RequestError>
where
    F: FnOnce(&mut WriteCursor) -> Result<(), scursor::WriteError>,
{
    let mut buffer = [0u8; MAX_ADU_LENGTH];
    let length = {
        let mut cursor = WriteCursor::new(&mut buffer);
        cursor.write_u8(unit.value)?;
        cursor.write_u8(code.wire_value())?;
        write(&mut cursor)?;
        cursor.position()
    };
    Ok(buffer[..length].to_vec())
}

/// the data after the unit id and function code
pub(crate) fn data(response: &[u8]) -> &[u8] {
    response.get(2..).unwrap_or(&[])
}

/// the response must repeat the first `length` bytes of the request
pub(crate) fn check_echo(
    request: &[u8],
    response: &[u8],
    length: usize,
) -> Result<(), RequestError> {
    let expected = request.get(..length).unwrap_or(request);
    if response.len() != expected.len() {
        return Err(RequestError::InvalidDataLength {
            expected: expected.len(),
            actual: response.len(),
        });
    }
    if response != expected {
        tracing::warn!(
            "echo mismatch, request: {:02X?} response: {:02X?}",
            expected,
            response
        );
        return Err(RequestError::InvalidDataAddress);
    }
    Ok(())
}

/// parse `[byte count][data]` where the byte count must equal `expected`
pub(crate) fn byte_count_data(response: &[u8], expected: usize) -> Result<&[u8], RequestError> {
    let mut cursor = ReadCursor::new(data(response));
    let count = cursor.read_u8()? as usize;
    if count != expected {
        return Err(RequestError::InvalidDataLength {
            expected,
            actual: count,
        });
    }
    let bytes = cursor.read_bytes(count)?;
    cursor.expect_empty()?;
    Ok(bytes)
}
