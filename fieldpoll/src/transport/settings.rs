use std::time::Duration;

use crate::error::ConfigError;

/// How requests are framed on the link
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum Framing {
    /// binary frames with a trailing CRC16, over serial or raw TCP
    #[default]
    Rtu,
    /// `:`-delimited hex frames with a trailing LRC, serial only
    Ascii,
    /// RTU-over-TCP: a 6-byte header and no CRC, TCP only
    Bridge,
}

/// Number of data bits per character
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum DataBits {
    /// 5 bits per character
    Five,
    /// 6 bits per character
    Six,
    /// 7 bits per character
    Seven,
    /// 8 bits per character
    #[default]
    Eight,
}

/// Parity checking mode
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum Parity {
    /// no parity bit
    #[default]
    None,
    /// parity bit sets odd number of 1 bits
    Odd,
    /// parity bit sets even number of 1 bits
    Even,
}

/// Number of stop bits
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum StopBits {
    /// one stop bit
    #[default]
    One,
    /// two stop bits
    Two,
}

/// Serial port parameters
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct SerialSettings {
    /// baud rate of the port
    pub baud_rate: u32,
    /// number of bits used to represent a character sent on the line
    pub data_bits: DataBits,
    /// type of parity to use for error checking
    pub parity: Parity,
    /// number of bits to use to signal the end of a character
    pub stop_bits: StopBits,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

/// Where the transceiver connects
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum Link {
    /// a serial port path such as `/dev/ttyUSB0` or `COM3`
    Serial {
        /// path of the port
        path: String,
        /// line parameters
        settings: SerialSettings,
    },
    /// a TCP endpoint
    Tcp {
        /// host name or IP address
        host: String,
        /// TCP port
        port: u16,
    },
}

/// Settings of a [`Transceiver`](crate::Transceiver)
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct TransportSettings {
    /// the link to open
    pub link: Link,
    /// framing of requests and responses
    pub framing: Framing,
    /// hard deadline for a complete response, measured from the end of the request
    pub response_timeout: Duration,
    /// minimum idle time between two transactions, derived from the link when `None`
    pub pacing: Option<Duration>,
}

impl TransportSettings {
    /// RTU framing over a serial port
    pub fn rtu(path: &str, settings: SerialSettings) -> Self {
        Self::new(
            Link::Serial {
                path: path.to_string(),
                settings,
            },
            Framing::Rtu,
        )
    }

    /// bridge framing over a TCP connection
    pub fn bridge(host: &str, port: u16) -> Self {
        Self::new(
            Link::Tcp {
                host: host.to_string(),
                port,
            },
            Framing::Bridge,
        )
    }

    /// settings with the default response timeout and pacing
    pub fn new(link: Link, framing: Framing) -> Self {
        Self {
            link,
            framing,
            response_timeout: Duration::from_secs(1),
            pacing: None,
        }
    }

    /// true if the framing can be used on the link
    pub fn is_supported(&self) -> bool {
        match (&self.link, self.framing) {
            (Link::Serial { .. }, Framing::Bridge) => false,
            (Link::Tcp { .. }, Framing::Ascii) => false,
            _ => true,
        }
    }

    /// idle time enforced before each request
    pub fn pacing_delay(&self) -> Duration {
        if let Some(x) = self.pacing {
            return x;
        }
        match &self.link {
            Link::Serial { settings, .. } => inter_frame_delay(settings.baud_rate),
            Link::Tcp { .. } => Duration::ZERO,
        }
    }
}

/// 3.5 character times, fixed at 1.75 ms above 19200 baud
pub(crate) fn inter_frame_delay(baud_rate: u32) -> Duration {
    // 1 start, 8 data, 1 parity or stop, 1 stop
    const NUM_BITS_IN_CHAR: u64 = 11;
    const MAX_BAUD_RATE: u32 = 19200;
    const MIN_DELAY: Duration = Duration::from_micros(1750);

    if baud_rate == 0 || baud_rate > MAX_BAUD_RATE {
        return MIN_DELAY;
    }
    let character_time = Duration::from_secs(NUM_BITS_IN_CHAR) / baud_rate;
    35 * character_time / 10
}

impl std::str::FromStr for Framing {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rtu" => Ok(Framing::Rtu),
            "ascii" => Ok(Framing::Ascii),
            "bridge" | "rtu-over-tcp" => Ok(Framing::Bridge),
            _ => Err(ConfigError::UnknownName),
        }
    }
}

impl std::str::FromStr for Parity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Parity::None),
            "odd" => Ok(Parity::Odd),
            "even" => Ok(Parity::Even),
            _ => Err(ConfigError::UnknownName),
        }
    }
}

impl TryFrom<u8> for DataBits {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            _ => Err(ConfigError::ValueOutOfRange),
        }
    }
}

impl TryFrom<u8> for StopBits {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(StopBits::One),
            2 => Ok(StopBits::Two),
            _ => Err(ConfigError::ValueOutOfRange),
        }
    }
}

#[cfg(feature = "serial")]
impl From<DataBits> for tokio_serial::DataBits {
    fn from(value: DataBits) -> Self {
        match value {
            DataBits::Five => tokio_serial::DataBits::Five,
            DataBits::Six => tokio_serial::DataBits::Six,
            DataBits::Seven => tokio_serial::DataBits::Seven,
            DataBits::Eight => tokio_serial::DataBits::Eight,
        }
    }
}

#[cfg(feature = "serial")]
impl From<Parity> for tokio_serial::Parity {
    fn from(value: Parity) -> Self {
        match value {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

#[cfg(feature = "serial")]
impl From<StopBits> for tokio_serial::StopBits {
    fn from(value: StopBits) -> Self {
        match value {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}
