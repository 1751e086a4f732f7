//! The transceiver owns the link and performs one request/response exchange at a time

mod ascii;
mod bridge;
pub(crate) mod length;
mod rtu;
mod settings;

pub use settings::*;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::time::Instant;
use tracing::Instrument;

use crate::constants::frame::{EXCEPTION_MASK, MAX_ADU_LENGTH};
use crate::counters::Counters;
use crate::decode::{DecodeLevel, PhysDecodeLevel};
use crate::error::{ConfigError, FrameParseError, RequestError};
use crate::exception::ExceptionCode;
use crate::phys::PhysLayer;

/// Connection state of a [`Transceiver`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// no link is open
    Disconnected = 0,
    /// the link is being opened
    Connecting = 1,
    /// the link is open
    Connected = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
        }
    }
}

/// Transaction id of the bridge framing, wraps after 0xFFFF
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub(crate) struct TxId {
    value: u16,
}

impl TxId {
    pub(crate) fn new(value: u16) -> Self {
        TxId { value }
    }

    pub(crate) fn to_u16(self) -> u16 {
        self.value
    }

    pub(crate) fn next(&mut self) -> TxId {
        let ret = *self;
        self.value = self.value.wrapping_add(1);
        ret
    }
}

impl Default for TxId {
    fn default() -> Self {
        TxId::new(1)
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06X}", self.value)
    }
}

struct Io {
    phys: Option<PhysLayer>,
    tx_id: TxId,
    last_exchange: Option<Instant>,
}

/// Owns the physical link and exchanges framed requests and responses over it
///
/// A request is the unit id, the wire function code and the data. The transceiver adds
/// the framing (CRC, ASCII encoding or bridge header) and strips it from the response.
/// Exchanges are serialized by an exclusive lock held for the whole transaction.
pub struct Transceiver {
    settings: TransportSettings,
    decode: DecodeLevel,
    state: AtomicU8,
    io: tokio::sync::Mutex<Io>,
    counters: Arc<Counters>,
}

impl Transceiver {
    /// create a disconnected transceiver
    pub fn new(settings: TransportSettings, decode: DecodeLevel) -> Self {
        Self::with_phys(settings, decode, None)
    }

    #[cfg(test)]
    pub(crate) fn new_mock(
        settings: TransportSettings,
        decode: DecodeLevel,
        mock: crate::mock::Mock,
    ) -> Self {
        Self::with_phys(settings, decode, Some(PhysLayer::new_mock(mock)))
    }

    fn with_phys(settings: TransportSettings, decode: DecodeLevel, phys: Option<PhysLayer>) -> Self {
        let state = if phys.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        Self {
            settings,
            decode,
            state: AtomicU8::new(state as u8),
            io: tokio::sync::Mutex::new(Io {
                phys,
                tx_id: TxId::default(),
                last_exchange: None,
            }),
            counters: Arc::new(Counters::default()),
        }
    }

    /// settings the transceiver was created with
    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    /// counters shared with the controller
    pub fn counters(&self) -> Arc<Counters> {
        self.counters.clone()
    }

    /// current state of the state machine
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// true if the state machine is `Connected`
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = ConnectionState::from_u8(self.state.swap(state as u8, Ordering::AcqRel));
        if previous != state {
            tracing::debug!("transceiver {} -> {}", previous, state);
        }
    }

    /// open the link, closing any link that is already open
    pub async fn connect(&self) -> Result<(), RequestError> {
        if !self.settings.is_supported() {
            tracing::warn!(
                "{:?} framing is not supported on {:?}",
                self.settings.framing,
                self.settings.link
            );
            return Err(RequestError::MethodNotSupported);
        }

        let mut io = self.io.lock().await;
        io.phys = None;
        self.set_state(ConnectionState::Connecting);

        match open(&self.settings.link).await {
            Ok(phys) => {
                tracing::info!("connected: {}", LinkDisplay(&self.settings.link));
                io.phys = Some(phys);
                io.last_exchange = None;
                self.set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(err) => {
                tracing::warn!("unable to connect to {}: {}", LinkDisplay(&self.settings.link), err);
                self.set_state(ConnectionState::Disconnected);
                Err(err)
            }
        }
    }

    /// close the link, unconditionally
    pub async fn disconnect(&self) {
        let mut io = self.io.lock().await;
        if io.phys.take().is_some() {
            tracing::info!("disconnected: {}", LinkDisplay(&self.settings.link));
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// send a request and return the validated response (unit id, function code, data)
    ///
    /// exception responses are returned as [`RequestError::Exception`]
    pub async fn transact(&self, request: &[u8]) -> Result<Vec<u8>, RequestError> {
        check_request(request)?;
        let mut io = self.io.lock().await;
        let tx_id = io.tx_id.next();
        let span = tracing::info_span!("Transaction", tx_id = %tx_id, unit = request[0], fc = request[1]);
        self.exchange(&mut io, tx_id, request, true)
            .instrument(span)
            .await
            .map(|x| x.unwrap_or_default())
    }

    /// send a request that produces no response, such as a broadcast
    pub async fn send(&self, request: &[u8]) -> Result<(), RequestError> {
        check_request(request)?;
        let mut io = self.io.lock().await;
        let tx_id = io.tx_id.next();
        let span = tracing::info_span!("Send", tx_id = %tx_id, unit = request[0], fc = request[1]);
        self.exchange(&mut io, tx_id, request, false)
            .instrument(span)
            .await
            .map(|_| ())
    }

    async fn exchange(
        &self,
        io: &mut Io,
        tx_id: TxId,
        request: &[u8],
        wait: bool,
    ) -> Result<Option<Vec<u8>>, RequestError> {
        let Io {
            phys,
            last_exchange,
            ..
        } = io;

        let link = match phys.as_mut() {
            Some(x) => x,
            None => return Err(RequestError::NotConnected),
        };

        let pacing = self.settings.pacing_delay();
        if let Some(last) = last_exchange {
            tokio::time::sleep_until(*last + pacing).await;
        }

        self.counters.increment_messages();
        let result = if wait {
            let deadline = Instant::now() + self.settings.response_timeout;
            let response = match self.settings.framing {
                Framing::Rtu => rtu::transact(link, request, deadline, self.decode).await,
                Framing::Ascii => ascii::transact(link, request, deadline, self.decode).await,
                Framing::Bridge => {
                    bridge::transact(link, tx_id, request, deadline, self.decode).await
                }
            };
            response.and_then(check_exception).map(Some)
        } else {
            let sent = match self.settings.framing {
                Framing::Rtu => rtu::send(link, request, self.decode).await,
                Framing::Ascii => ascii::send(link, request, self.decode).await,
                Framing::Bridge => bridge::send(link, tx_id, request, self.decode).await,
            };
            sent.map(|_| None)
        };
        *last_exchange = Some(Instant::now());

        match &result {
            Err(RequestError::ResponseTimeout) => {
                self.counters.increment_timeouts();
                tracing::warn!("response timeout");
            }
            Err(RequestError::ConnectionFailure(kind)) => {
                tracing::warn!("i/o error, closing link: {}", kind);
                *phys = None;
                self.set_state(ConnectionState::Disconnected);
            }
            _ => {}
        }

        result
    }
}

fn check_request(request: &[u8]) -> Result<(), RequestError> {
    if request.len() < 2 {
        return Err(FrameParseError::FrameTooShort(request.len()).into());
    }
    if request.len() > MAX_ADU_LENGTH {
        return Err(ConfigError::FrameTooLarge.into());
    }
    Ok(())
}

fn check_exception(adu: Vec<u8>) -> Result<Vec<u8>, RequestError> {
    match adu.as_slice() {
        [_, function, code, ..] if function & EXCEPTION_MASK != 0 => {
            Err(RequestError::Exception(ExceptionCode::from(*code)))
        }
        _ => Ok(adu),
    }
}

/// read into `buffer`, failing with `ResponseTimeout` once `deadline` passes
pub(crate) async fn read_before(
    phys: &mut PhysLayer,
    buffer: &mut [u8],
    deadline: Instant,
    level: PhysDecodeLevel,
) -> Result<usize, RequestError> {
    match tokio::time::timeout_at(deadline, phys.read(buffer, level)).await {
        Ok(Ok(x)) => Ok(x),
        Ok(Err(err)) => Err(err.into()),
        Err(_) => Err(RequestError::ResponseTimeout),
    }
}

async fn open(link: &Link) -> Result<PhysLayer, RequestError> {
    match link {
        Link::Tcp { host, port } => {
            let socket = tokio::net::TcpStream::connect((host.as_str(), *port)).await?;
            // dropping the socket closes it if configuration fails
            socket.set_nodelay(true)?;
            Ok(PhysLayer::new_tcp(socket))
        }
        #[cfg(feature = "serial")]
        Link::Serial { path, settings } => open_serial(path, settings),
        #[cfg(not(feature = "serial"))]
        Link::Serial { .. } => Err(RequestError::MethodNotSupported),
    }
}

#[cfg(feature = "serial")]
fn open_serial(path: &str, settings: &SerialSettings) -> Result<PhysLayer, RequestError> {
    use tokio_serial::{SerialPort, SerialPortBuilderExt};

    let stream = tokio_serial::new(path, settings.baud_rate)
        .data_bits(settings.data_bits.into())
        .parity(settings.parity.into())
        .stop_bits(settings.stop_bits.into())
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()?;
    stream.clear(tokio_serial::ClearBuffer::All)?;
    Ok(PhysLayer::new_serial(stream))
}

struct LinkDisplay<'a>(&'a Link);

impl std::fmt::Display for LinkDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.0 {
            Link::Serial { path, settings } => {
                write!(f, "serial {} @ {} baud", path, settings.baud_rate)
            }
            Link::Tcp { host, port } => write!(f, "tcp {host}:{port}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::append_crc;
    use crate::mock::mock;
    use std::time::Duration;
    use tokio_test::block_on;

    fn rtu_settings() -> TransportSettings {
        let mut settings = TransportSettings::rtu("/dev/null", SerialSettings::default());
        settings.response_timeout = Duration::from_millis(50);
        settings.pacing = Some(Duration::ZERO);
        settings
    }

    fn with_crc(adu: &[u8]) -> Vec<u8> {
        let mut frame = adu.to_vec();
        append_crc(&mut frame);
        frame
    }

    #[test]
    fn tx_id_wraps() {
        let mut id = TxId::new(0xFFFF);
        assert_eq!(id.next(), TxId::new(0xFFFF));
        assert_eq!(id.next(), TxId::new(0x0000));
        assert_eq!(TxId::default().next(), TxId::new(1));
    }

    #[test]
    fn fails_without_io_when_not_connected() {
        let transceiver = Transceiver::new(rtu_settings(), DecodeLevel::nothing());
        assert!(!transceiver.is_connected());
        assert_eq!(
            block_on(transceiver.transact(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01])),
            Err(RequestError::NotConnected)
        );
        assert_eq!(transceiver.counters().snapshot().messages, 0);
    }

    #[test]
    fn requests_must_fit_an_rtu_frame() {
        assert_eq!(check_request(&[0x01; 254]), Ok(()));
        assert_eq!(
            check_request(&[0x01; 255]),
            Err(RequestError::InvalidConfiguration(ConfigError::FrameTooLarge))
        );
    }

    #[test]
    fn rejects_unsupported_framing_at_connect() {
        let mut settings = TransportSettings::bridge("127.0.0.1", 502);
        settings.framing = Framing::Ascii;
        let transceiver = Transceiver::new(settings, DecodeLevel::nothing());
        assert_eq!(
            block_on(transceiver.connect()),
            Err(RequestError::MethodNotSupported)
        );
        assert_eq!(transceiver.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn counts_messages_and_timeouts() {
        let request = [0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        let (mock, mut handle) = mock();
        handle.expect_write(&with_crc(&request));
        handle.read(&with_crc(&[0x01, 0x03, 0x02, 0x00, 0x07]));
        handle.expect_write(&with_crc(&request));

        let transceiver = Transceiver::new_mock(rtu_settings(), DecodeLevel::nothing(), mock);
        assert!(transceiver.is_connected());
        assert_eq!(
            transceiver.transact(&request).await,
            Ok(vec![0x01, 0x03, 0x02, 0x00, 0x07])
        );
        assert_eq!(
            transceiver.transact(&request).await,
            Err(RequestError::ResponseTimeout)
        );

        let counters = transceiver.counters().snapshot();
        assert_eq!(counters.messages, 2);
        assert_eq!(counters.timeouts, 1);
        // a timeout does not close the link
        assert!(transceiver.is_connected());
    }

    #[tokio::test]
    async fn ascii_transaction_over_serial() {
        let mut settings = rtu_settings();
        settings.framing = Framing::Ascii;

        let (mock, mut handle) = mock();
        handle.expect_write(b":010300000001FB\r\n");
        // the response line may arrive in pieces
        handle.read(b":01030200");
        handle.read(b"07F3\r\n");
        handle.expect_write(b":010300000001FB\r\n");
        // wrong LRC
        handle.read(b":0103020007F4\r\n");

        let transceiver = Transceiver::new_mock(settings, DecodeLevel::nothing(), mock);
        let request = [0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(
            transceiver.transact(&request).await,
            Ok(vec![0x01, 0x03, 0x02, 0x00, 0x07])
        );
        assert_eq!(
            transceiver.transact(&request).await,
            Err(RequestError::TransactionFailure(FrameParseError::LrcMismatch {
                received: 0xF4,
                expected: 0xF3
            }))
        );
        assert_eq!(transceiver.counters().snapshot().messages, 2);
    }

    #[tokio::test]
    async fn surfaces_exception_responses() {
        let request = [0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        let (mock, mut handle) = mock();
        handle.expect_write(&with_crc(&request));
        handle.read(&with_crc(&[0x01, 0x83, 0x02]));

        let transceiver = Transceiver::new_mock(rtu_settings(), DecodeLevel::nothing(), mock);
        assert_eq!(
            transceiver.transact(&request).await,
            Err(RequestError::Exception(ExceptionCode::IllegalDataAddress))
        );
    }

    #[tokio::test]
    async fn io_error_disconnects() {
        let request = [0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        let (mock, mut handle) = mock();
        handle.write_error(std::io::ErrorKind::BrokenPipe);

        let transceiver = Transceiver::new_mock(rtu_settings(), DecodeLevel::nothing(), mock);
        assert_eq!(
            transceiver.transact(&request).await,
            Err(RequestError::ConnectionFailure(std::io::ErrorKind::BrokenPipe))
        );
        assert_eq!(transceiver.state(), ConnectionState::Disconnected);
        assert_eq!(
            transceiver.transact(&request).await,
            Err(RequestError::NotConnected)
        );
    }

    #[tokio::test]
    async fn read_error_disconnects() {
        let request = [0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        let (mock, mut handle) = mock();
        handle.expect_write(&with_crc(&request));
        handle.read_error(std::io::ErrorKind::ConnectionReset);

        let transceiver = Transceiver::new_mock(rtu_settings(), DecodeLevel::nothing(), mock);
        assert_eq!(
            transceiver.transact(&request).await,
            Err(RequestError::ConnectionFailure(std::io::ErrorKind::ConnectionReset))
        );
        assert!(!transceiver.is_connected());
    }

    #[tokio::test]
    async fn broadcast_does_not_wait() {
        let request = [0x00, 0x45];
        let (mock, mut handle) = mock();
        handle.expect_write(&with_crc(&request));

        let transceiver = Transceiver::new_mock(rtu_settings(), DecodeLevel::nothing(), mock);
        assert_eq!(transceiver.send(&request).await, Ok(()));
    }

    #[tokio::test]
    async fn disconnect_is_unconditional() {
        let (mock, _handle) = mock();
        let transceiver = Transceiver::new_mock(rtu_settings(), DecodeLevel::nothing(), mock);
        transceiver.disconnect().await;
        transceiver.disconnect().await;
        assert_eq!(transceiver.state(), ConnectionState::Disconnected);
    }
}
