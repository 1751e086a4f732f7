//! Datasets, channels, actions and messages, and the registry that ties them together

mod action;
mod channel;
mod dataset;
mod registry;
mod value;

pub use action::*;
pub use channel::*;
pub use dataset::*;
pub use registry::*;
pub use value::*;

use crate::error::ConfigError;

/// Identifies one device on the bus, assigned by the host
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u32);

/// Stable numeric id of a registered dataset
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct DatasetId(pub u32);

/// Host supplied name of a channel
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelId(pub String);

impl ChannelId {
    /// create from anything string-like
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "node {}", self.0)
    }
}

impl std::fmt::Display for DatasetId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "dataset {}", self.0)
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of data a dataset exchanges with the device
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageClass {
    /// read/write coils
    Coil,
    /// read-only discrete inputs
    DiscreteInput,
    /// read/write holding registers
    HoldingRegister,
    /// read-only input registers
    InputRegister,
    /// read exception status
    ExceptionStatus,
    /// get comm event counter
    CommEventCounter,
    /// get comm event log
    CommEventLog,
    /// run vendor enumeration, assigning logical addresses
    SetLogicalAddress,
}

impl MessageClass {
    /// true for classes whose payload is a bit vector
    pub fn is_bits(self) -> bool {
        matches!(self, MessageClass::Coil | MessageClass::DiscreteInput)
    }

    /// true for classes whose payload is register bytes
    pub fn is_registers(self) -> bool {
        matches!(
            self,
            MessageClass::HoldingRegister | MessageClass::InputRegister
        )
    }

    /// true for the diagnostic queries
    pub fn is_status(self) -> bool {
        matches!(
            self,
            MessageClass::ExceptionStatus
                | MessageClass::CommEventCounter
                | MessageClass::CommEventLog
        )
    }

    /// true if values of this class may be written
    pub fn is_writable(self) -> bool {
        matches!(
            self,
            MessageClass::Coil | MessageClass::HoldingRegister | MessageClass::SetLogicalAddress
        )
    }
}

impl std::str::FromStr for MessageClass {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coil" => Ok(MessageClass::Coil),
            "discrete" | "discrete-input" => Ok(MessageClass::DiscreteInput),
            "holding" | "holding-register" => Ok(MessageClass::HoldingRegister),
            "input" | "input-register" => Ok(MessageClass::InputRegister),
            "exception-status" => Ok(MessageClass::ExceptionStatus),
            "comm-event-counter" => Ok(MessageClass::CommEventCounter),
            "comm-event-log" => Ok(MessageClass::CommEventLog),
            "set-logical-address" => Ok(MessageClass::SetLogicalAddress),
            _ => Err(ConfigError::UnknownName),
        }
    }
}

/// What an action does on the wire
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum ActionClass {
    /// read a dataset
    Read,
    /// write a payload
    Write,
    /// diagnostic query, result is logged
    Status,
}

/// When a dataset update fans out to its channels
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum ReportPolicy {
    /// on every update
    Always,
    /// only when the payload differs from the cached one
    #[default]
    Change,
    /// never, the cache is still refreshed
    Never,
}

impl std::str::FromStr for ReportPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(ReportPolicy::Always),
            "change" => Ok(ReportPolicy::Change),
            "never" => Ok(ReportPolicy::Never),
            _ => Err(ConfigError::UnknownName),
        }
    }
}

/// How often an action is dispatched
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum RepeatPolicy {
    /// exactly once, as soon as it is submitted
    #[default]
    Once,
    /// on every slow tick
    Slow,
    /// on every fast tick
    Fast,
}

impl std::str::FromStr for RepeatPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "once" => Ok(RepeatPolicy::Once),
            "slow" => Ok(RepeatPolicy::Slow),
            "fast" => Ok(RepeatPolicy::Fast),
            _ => Err(ConfigError::UnknownName),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_strings() {
        assert_eq!("holding".parse(), Ok(MessageClass::HoldingRegister));
        assert_eq!("set-logical-address".parse(), Ok(MessageClass::SetLogicalAddress));
        assert_eq!("never".parse(), Ok(ReportPolicy::Never));
        assert_eq!("fast".parse(), Ok(RepeatPolicy::Fast));
        assert_eq!("hourly".parse::<RepeatPolicy>(), Err(ConfigError::UnknownName));
    }

    #[test]
    fn classifies_message_classes() {
        assert!(MessageClass::Coil.is_bits());
        assert!(MessageClass::InputRegister.is_registers());
        assert!(MessageClass::CommEventLog.is_status());
        assert!(!MessageClass::DiscreteInput.is_writable());
    }
}
