use crate::exception::ExceptionCode;

/// The task processing requests has terminated
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shutdown;

impl std::fmt::Display for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("the processing task has shut down")
    }
}

impl std::error::Error for Shutdown {}

/// Top-level error type for transactions and engine operations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestError {
    /// The transceiver is not connected
    NotConnected,
    /// An I/O error occurred on the physical layer
    ConnectionFailure(std::io::ErrorKind),
    /// No complete response arrived before the response timeout elapsed
    ResponseTimeout,
    /// A response frame could not be delimited or validated
    TransactionFailure(FrameParseError),
    /// The echoed address or count of a write response does not match the request
    InvalidDataAddress,
    /// The response body is malformed or too short
    InvalidDataType(AduParseError),
    /// The byte count in a response does not match the count that was requested
    InvalidDataLength {
        /// number of bytes that were expected
        expected: usize,
        /// number of bytes that were received
        actual: usize,
    },
    /// The request or the engine configuration is invalid
    InvalidConfiguration(ConfigError),
    /// The operation is not supported by the selected protocol or link combination
    MethodNotSupported,
    /// The serial port is already opened by another process or access is denied
    SerialPortInUse,
    /// The serial port does not support the requested parameters
    SerialPortUnsupported,
    /// The serial port does not exist
    SerialPortUnavailable,
    /// The device answered with an exception response
    Exception(ExceptionCode),
    /// The engine has been stopped
    Shutdown,
}

impl std::error::Error for RequestError {}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RequestError::NotConnected => f.write_str("the transceiver is not connected"),
            RequestError::ConnectionFailure(kind) => write!(f, "i/o error: {kind}"),
            RequestError::ResponseTimeout => f.write_str("response timeout"),
            RequestError::TransactionFailure(err) => write!(f, "invalid frame: {err}"),
            RequestError::InvalidDataAddress => {
                f.write_str("echoed address or count does not match the request")
            }
            RequestError::InvalidDataType(err) => write!(f, "malformed response: {err}"),
            RequestError::InvalidDataLength { expected, actual } => write!(
                f,
                "response byte count mismatch: expected {expected}, received {actual}"
            ),
            RequestError::InvalidConfiguration(err) => write!(f, "invalid configuration: {err}"),
            RequestError::MethodNotSupported => {
                f.write_str("operation not supported by this protocol or link")
            }
            RequestError::SerialPortInUse => f.write_str("serial port is in use"),
            RequestError::SerialPortUnsupported => {
                f.write_str("serial port does not support the requested settings")
            }
            RequestError::SerialPortUnavailable => f.write_str("serial port is not available"),
            RequestError::Exception(ex) => write!(f, "exception response: {ex}"),
            RequestError::Shutdown => std::fmt::Display::fmt(&Shutdown, f),
        }
    }
}

impl From<std::io::Error> for RequestError {
    fn from(err: std::io::Error) -> Self {
        RequestError::ConnectionFailure(err.kind())
    }
}

impl From<Shutdown> for RequestError {
    fn from(_: Shutdown) -> Self {
        RequestError::Shutdown
    }
}

impl From<ExceptionCode> for RequestError {
    fn from(ex: ExceptionCode) -> Self {
        RequestError::Exception(ex)
    }
}

impl From<FrameParseError> for RequestError {
    fn from(err: FrameParseError) -> Self {
        RequestError::TransactionFailure(err)
    }
}

impl From<AduParseError> for RequestError {
    fn from(err: AduParseError) -> Self {
        RequestError::InvalidDataType(err)
    }
}

impl From<ConfigError> for RequestError {
    fn from(err: ConfigError) -> Self {
        RequestError::InvalidConfiguration(err)
    }
}

impl From<scursor::ReadError> for RequestError {
    fn from(_: scursor::ReadError) -> Self {
        RequestError::InvalidDataType(AduParseError::InsufficientBytes)
    }
}

impl From<scursor::TrailingBytes> for RequestError {
    fn from(_: scursor::TrailingBytes) -> Self {
        RequestError::InvalidDataType(AduParseError::TrailingBytes)
    }
}

impl From<scursor::WriteError> for RequestError {
    fn from(_: scursor::WriteError) -> Self {
        RequestError::InvalidConfiguration(ConfigError::FrameTooLarge)
    }
}

impl From<BitsError> for RequestError {
    fn from(err: BitsError) -> Self {
        RequestError::InvalidConfiguration(err.into())
    }
}

impl From<BitsError> for ConfigError {
    fn from(_: BitsError) -> Self {
        ConfigError::ValueOutOfRange
    }
}

#[cfg(feature = "serial")]
impl From<tokio_serial::Error> for RequestError {
    fn from(err: tokio_serial::Error) -> Self {
        match err.kind() {
            tokio_serial::ErrorKind::NoDevice => RequestError::SerialPortUnavailable,
            tokio_serial::ErrorKind::InvalidInput => RequestError::SerialPortUnsupported,
            tokio_serial::ErrorKind::Io(kind) => match kind {
                std::io::ErrorKind::NotFound => RequestError::SerialPortUnavailable,
                std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::AddrInUse => {
                    RequestError::SerialPortInUse
                }
                std::io::ErrorKind::InvalidInput => RequestError::SerialPortUnsupported,
                other => RequestError::ConnectionFailure(other),
            },
            _ => RequestError::ConnectionFailure(std::io::ErrorKind::Other),
        }
    }
}

/// Errors that occur while delimiting or validating a frame at the transport layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameParseError {
    /// Received CRC does not match the computed CRC
    CrcMismatch {
        /// CRC carried by the frame
        received: u16,
        /// CRC computed over the frame
        expected: u16,
    },
    /// Received LRC does not match the computed LRC
    LrcMismatch {
        /// LRC carried by the frame
        received: u8,
        /// LRC computed over the frame
        expected: u8,
    },
    /// An ASCII frame contained a character that is not a hex digit
    InvalidHexCharacter(u8),
    /// An ASCII frame contained an odd number of hex digits
    OddHexLength,
    /// An ASCII line did not contain the `:` start marker
    MissingStartMarker,
    /// The frame exceeds the maximum frame size
    FrameTooLarge(usize),
    /// The frame is shorter than unit id, function code and checksum
    FrameTooShort(usize),
    /// Resynchronization dropped the maximum number of bytes without finding a valid frame
    ResyncLimitReached,
    /// The response carries a different unit id than the request
    UnitIdMismatch {
        /// unit id of the request
        expected: u8,
        /// unit id of the response
        received: u8,
    },
    /// The response carries a different function code than the request
    FunctionCodeMismatch {
        /// function code of the request
        expected: u8,
        /// function code of the response
        received: u8,
    },
    /// The response function code is not one the engine knows how to delimit
    UnknownFunctionCode(u8),
    /// The bridge header carries a non-zero protocol id
    UnknownProtocolId(u16),
    /// The bridge header length does not match the length of the body
    LengthMismatch {
        /// length field of the header
        header: usize,
        /// length of the delimited body
        body: usize,
    },
}

impl std::fmt::Display for FrameParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FrameParseError::CrcMismatch { received, expected } => write!(
                f,
                "received crc {received:#06X} does not match calculated crc {expected:#06X}"
            ),
            FrameParseError::LrcMismatch { received, expected } => write!(
                f,
                "received lrc {received:#04X} does not match calculated lrc {expected:#04X}"
            ),
            FrameParseError::InvalidHexCharacter(x) => {
                write!(f, "invalid hex character: {x:#04X}")
            }
            FrameParseError::OddHexLength => f.write_str("odd number of hex characters"),
            FrameParseError::MissingStartMarker => f.write_str("missing ':' start marker"),
            FrameParseError::FrameTooLarge(size) => {
                write!(f, "frame length of {size} exceeds the maximum")
            }
            FrameParseError::FrameTooShort(size) => {
                write!(f, "frame length of {size} is below the minimum")
            }
            FrameParseError::ResyncLimitReached => {
                f.write_str("no valid frame found after maximum resynchronization attempts")
            }
            FrameParseError::UnitIdMismatch { expected, received } => write!(
                f,
                "expected unit id {expected:#04X}, received {received:#04X}"
            ),
            FrameParseError::FunctionCodeMismatch { expected, received } => write!(
                f,
                "expected function code {expected:#04X}, received {received:#04X}"
            ),
            FrameParseError::UnknownFunctionCode(x) => {
                write!(f, "unknown function code: {x:#04X}")
            }
            FrameParseError::UnknownProtocolId(x) => write!(f, "unknown protocol id: {x:#06X}"),
            FrameParseError::LengthMismatch { header, body } => write!(
                f,
                "header length of {header} does not match body length of {body}"
            ),
        }
    }
}

/// Errors that occur while parsing the body of a response
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AduParseError {
    /// Response is too short to be valid
    InsufficientBytes,
    /// Response contains extra trailing bytes
    TrailingBytes,
    /// A single coil echo contained a value other than ON or OFF
    UnknownCoilState(u16),
    /// A structured response field has an unexpected value
    UnexpectedField(u8),
}

impl std::fmt::Display for AduParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            AduParseError::InsufficientBytes => f.write_str("response is too short"),
            AduParseError::TrailingBytes => f.write_str("response contains trailing bytes"),
            AduParseError::UnknownCoilState(x) => {
                write!(f, "received coil state with unspecified value: {x:#06X}")
            }
            AduParseError::UnexpectedField(x) => write!(f, "unexpected field value: {x:#04X}"),
        }
    }
}

/// Errors in requests, registrations and values supplied by the caller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The node has not been registered with the controller
    UnknownNode,
    /// The dataset id is not registered
    UnknownDataset,
    /// The channel id is not registered
    UnknownChannel,
    /// A name could not be parsed into a configuration value
    UnknownName,
    /// The message class does not support the requested action
    UnsupportedClass,
    /// The value class cannot be written
    ReadOnlyValue,
    /// The value does not match the channel's value class
    ValueMismatch,
    /// The value does not fit the channel's footprint
    ValueOutOfRange,
    /// A request count of zero
    CountOfZero,
    /// A request count above the protocol maximum
    CountTooLarge {
        /// requested count
        count: u16,
        /// protocol maximum
        max: u16,
    },
    /// The address plus count overflows the 16-bit address space
    AddressOverflow,
    /// The encoded request does not fit in a frame
    FrameTooLarge,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ConfigError::UnknownNode => f.write_str("unknown node"),
            ConfigError::UnknownDataset => f.write_str("unknown dataset"),
            ConfigError::UnknownChannel => f.write_str("unknown channel"),
            ConfigError::UnknownName => f.write_str("unknown configuration name"),
            ConfigError::UnsupportedClass => {
                f.write_str("message class does not support this action")
            }
            ConfigError::ReadOnlyValue => f.write_str("value class is read-only"),
            ConfigError::ValueMismatch => f.write_str("value does not match the value class"),
            ConfigError::ValueOutOfRange => f.write_str("value is out of range"),
            ConfigError::CountOfZero => f.write_str("count of zero"),
            ConfigError::CountTooLarge { count, max } => {
                write!(f, "count of {count} exceeds the maximum of {max}")
            }
            ConfigError::AddressOverflow => f.write_str("address range overflows u16"),
            ConfigError::FrameTooLarge => f.write_str("request does not fit in a frame"),
        }
    }
}

/// Errors returned by bit vector operations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitsError {
    /// Index beyond the declared size
    IndexOutOfRange {
        /// requested index
        index: usize,
        /// declared size
        size: usize,
    },
    /// Requested size exceeds the capacity of the byte backing
    InvalidSize {
        /// requested size in bits
        size: usize,
        /// capacity in bits
        capacity: usize,
    },
    /// A bit string contained a character other than `0`, `1` or whitespace
    InvalidCharacter(char),
}

impl std::fmt::Display for BitsError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            BitsError::IndexOutOfRange { index, size } => {
                write!(f, "bit index {index} out of range for size {size}")
            }
            BitsError::InvalidSize { size, capacity } => {
                write!(f, "size {size} exceeds capacity of {capacity} bits")
            }
            BitsError::InvalidCharacter(c) => write!(f, "invalid bit string character: {c:?}"),
        }
    }
}

impl std::error::Error for BitsError {}
impl std::error::Error for FrameParseError {}
impl std::error::Error for AduParseError {}
impl std::error::Error for ConfigError {}
