use crate::model::{
    ActionClass, ChannelId, Dataset, DatasetId, MessageClass, NodeId, Payload, RepeatPolicy, Value,
};
use crate::types::DataRange;

/// One unit of wire work scheduled through the feed
#[derive(Clone, Debug, PartialEq)]
pub struct Action {
    /// dataset the action reads or writes
    pub dataset: DatasetId,
    /// node the action is sent to
    pub node: NodeId,
    /// kind of data
    pub class: MessageClass,
    /// read, write or status query
    pub action: ActionClass,
    /// how often it is dispatched
    pub repeat: RepeatPolicy,
    /// start address
    pub address: u16,
    /// addressing offset
    pub offset: u16,
    /// number of bits or registers
    pub length: u16,
    /// data of a write
    pub payload: Option<Payload>,
    /// result feeds device discovery
    pub internal: bool,
    /// number of times the action has been retried
    pub retries: u8,
}

impl Action {
    /// the action that polls `dataset`: a status read for status classes, the
    /// logical address assignment for enumeration, otherwise a plain read
    pub fn new(id: DatasetId, dataset: &Dataset) -> Self {
        let action = if dataset.class.is_status() {
            ActionClass::Status
        } else if dataset.class == MessageClass::SetLogicalAddress {
            ActionClass::Write
        } else {
            ActionClass::Read
        };
        Self {
            dataset: id,
            node: dataset.node,
            class: dataset.class,
            action,
            repeat: dataset.repeat,
            address: dataset.address,
            offset: dataset.offset,
            length: dataset.length,
            payload: None,
            internal: dataset.internal,
            retries: 0,
        }
    }

    /// the same action scheduled once more
    pub fn retry(&self) -> Self {
        Self {
            repeat: RepeatPolicy::Once,
            retries: self.retries.saturating_add(1),
            ..self.clone()
        }
    }

    /// address, offset and count on the wire
    pub fn range(&self) -> DataRange {
        DataRange::new(self.address, self.offset, self.length)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{:?} {:?} {} {} ({})",
            self.action,
            self.class,
            self.node,
            self.dataset,
            self.range()
        )?;
        if self.retries > 0 {
            write!(f, " retry {}", self.retries)?;
        }
        Ok(())
    }
}

/// Result of a read, on its way to the dataset
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// dataset that was read
    pub dataset: DatasetId,
    /// data read
    pub payload: Payload,
    /// copied from the action
    pub internal: bool,
}

/// Typed value of one channel, reported to or written by the host
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct State {
    /// channel
    pub channel: ChannelId,
    /// value
    pub value: Value,
}

impl State {
    /// create a state
    pub fn new(channel: ChannelId, value: Value) -> Self {
        Self { channel, value }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} = {}", self.channel, self.value)
    }
}
