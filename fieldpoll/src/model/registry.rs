use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::ConfigError;
use crate::model::channel::byte_position;
use crate::model::{
    Action, ActionClass, Channel, ChannelId, Dataset, DatasetId, Field, Message, NodeId, Payload,
    ReportPolicy, RepeatPolicy, State, Value, ValueClass,
};

/// bits 0..=11 of a change bitmap name channel indices
const BITMAP_CHANNELS: u16 = 12;
/// bits 12..=14 name element indices, bit 15 names the unscoped datasets
const BITMAP_UNSCOPED: u16 = 15;

struct DatasetEntry {
    key: String,
    dataset: Dataset,
    cache: Option<Payload>,
}

struct ChannelEntry {
    channel: Channel,
    current: Option<Value>,
    previous: Option<Value>,
}

#[derive(Default)]
struct Inner {
    next_id: u32,
    keys: HashMap<String, DatasetId>,
    datasets: BTreeMap<DatasetId, DatasetEntry>,
    channels: BTreeMap<ChannelId, ChannelEntry>,
}

/// Result of applying one message to its dataset
#[derive(Clone, Debug, PartialEq)]
pub struct Update {
    /// dataset the message was applied to
    pub dataset: Dataset,
    /// the payload differs from the cached one
    pub changed: bool,
    /// channel values to report
    pub states: Vec<State>,
    /// reads requested by change bitmaps
    pub cascades: Vec<Action>,
}

/// Datasets and channels of every node, and the last payload read for each dataset
///
/// All access goes through one lock, so comparing a message with the cached payload,
/// fanning it out and replacing the cache happen atomically.
#[derive(Default)]
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    /// create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// register a dataset, returning the id already assigned to `key` if there is one
    pub fn add_dataset(&self, key: &str, dataset: Dataset) -> DatasetId {
        let mut inner = self.lock();
        if let Some(id) = inner.keys.get(key) {
            return *id;
        }

        inner.next_id += 1;
        let id = DatasetId(inner.next_id);
        tracing::debug!("{} registered as {} ({:?})", key, id, dataset.class);
        inner.keys.insert(key.to_string(), id);
        inner.datasets.insert(
            id,
            DatasetEntry {
                key: key.to_string(),
                dataset,
                cache: None,
            },
        );
        id
    }

    /// register a channel, rejecting it if it does not fit its dataset
    pub fn add_channel(&self, channel: Channel) -> bool {
        let mut inner = self.lock();
        let result = match inner.datasets.get(&channel.dataset) {
            Some(entry) => channel.check_footprint(&entry.dataset),
            None => Err(ConfigError::UnknownDataset),
        };
        if let Err(err) = result {
            tracing::warn!(
                "rejected channel {} ({:?} at index {}) of {}: {}",
                channel.id,
                channel.class,
                channel.index,
                channel.dataset,
                err
            );
            return false;
        }

        inner.channels.insert(
            channel.id.clone(),
            ChannelEntry {
                channel,
                current: None,
                previous: None,
            },
        );
        true
    }

    /// remove every channel bound to a dataset of `node`
    pub fn remove_channels(&self, node: NodeId) -> usize {
        let mut inner = self.lock();
        let Inner {
            datasets, channels, ..
        } = &mut *inner;
        let before = channels.len();
        channels.retain(|_, entry| {
            datasets
                .get(&entry.channel.dataset)
                .map(|x| x.dataset.node != node)
                .unwrap_or(false)
        });
        before - channels.len()
    }

    /// remove every dataset of `node` together with its channels
    pub fn remove_datasets(&self, node: NodeId) -> usize {
        let mut inner = self.lock();
        let Inner {
            keys,
            datasets,
            channels,
            ..
        } = &mut *inner;
        let before = datasets.len();
        datasets.retain(|_, entry| {
            let keep = entry.dataset.node != node;
            if !keep {
                keys.remove(&entry.key);
            }
            keep
        });
        channels.retain(|_, entry| datasets.contains_key(&entry.channel.dataset));
        before - datasets.len()
    }

    /// copy of a dataset definition
    pub fn dataset(&self, id: DatasetId) -> Option<Dataset> {
        self.lock().datasets.get(&id).map(|x| x.dataset.clone())
    }

    /// ids and definitions of every dataset of `node`
    pub fn datasets(&self, node: NodeId) -> Vec<(DatasetId, Dataset)> {
        self.lock()
            .datasets
            .iter()
            .filter(|(_, entry)| entry.dataset.node == node)
            .map(|(id, entry)| (*id, entry.dataset.clone()))
            .collect()
    }

    /// copy of a channel definition
    pub fn channel(&self, id: &ChannelId) -> Option<Channel> {
        self.lock().channels.get(id).map(|x| x.channel.clone())
    }

    /// last decoded value of a channel
    pub fn value(&self, id: &ChannelId) -> Option<Value> {
        self.lock().channels.get(id).and_then(|x| x.current.clone())
    }

    /// value of a channel before the last change
    pub fn previous(&self, id: &ChannelId) -> Option<Value> {
        self.lock().channels.get(id).and_then(|x| x.previous.clone())
    }

    /// the action that reads a dataset with its configured repeat policy
    pub fn read_action(&self, id: DatasetId) -> Result<Action, ConfigError> {
        let inner = self.lock();
        let entry = inner.datasets.get(&id).ok_or(ConfigError::UnknownDataset)?;
        Ok(Action::new(id, &entry.dataset))
    }

    /// compare a message with the cached payload, decode the channels and replace the cache
    pub fn apply(&self, message: &Message) -> Result<Update, ConfigError> {
        let mut inner = self.lock();
        let Inner {
            datasets, channels, ..
        } = &mut *inner;

        let entry = datasets
            .get_mut(&message.dataset)
            .ok_or(ConfigError::UnknownDataset)?;
        let changed = entry.cache.as_ref() != Some(&message.payload);
        let report = match entry.dataset.report {
            ReportPolicy::Always => true,
            ReportPolicy::Change => changed,
            ReportPolicy::Never => false,
        };
        entry.cache = Some(message.payload.clone());

        let dataset = entry.dataset.clone();
        let mut update = Update {
            dataset,
            changed,
            states: Vec::new(),
            cascades: Vec::new(),
        };
        // internal datasets feed discovery only
        if !report || update.dataset.internal {
            return Ok(update);
        }

        let mut bitmaps = Vec::new();
        for entry in channels
            .values_mut()
            .filter(|x| x.channel.dataset == message.dataset)
        {
            let channel = &entry.channel;
            let value = match channel
                .extract(&message.payload)
                .and_then(|field| channel.encoding.decode(channel.class, &field))
            {
                Ok(x) => x,
                Err(err) => {
                    tracing::warn!("unable to decode {}: {}", channel.id, err);
                    continue;
                }
            };

            if channel.class == ValueClass::ChangeBitmap {
                if let Value::Int(bitmap) = value {
                    bitmaps.push(bitmap as u16);
                }
                continue;
            }

            let emit = match channel.report.unwrap_or(update.dataset.report) {
                ReportPolicy::Always => true,
                ReportPolicy::Change => entry.current.as_ref() != Some(&value),
                ReportPolicy::Never => false,
            };
            if entry.current.as_ref() != Some(&value) {
                entry.previous = entry.current.replace(value.clone());
            }
            if emit {
                update.states.push(State::new(channel.id.clone(), value));
            }
        }

        for bitmap in bitmaps {
            for (id, other) in datasets.iter() {
                if *id != message.dataset
                    && other.dataset.node == update.dataset.node
                    && !other.dataset.internal
                    && (other.dataset.class.is_bits() || other.dataset.class.is_registers())
                    && selected(bitmap, &other.dataset)
                {
                    let mut action = Action::new(*id, &other.dataset);
                    action.repeat = RepeatPolicy::Once;
                    update.cascades.push(action);
                }
            }
        }

        Ok(update)
    }

    /// encode the value of `state` into a write of its channel
    pub fn build_write(&self, state: &State) -> Result<Action, ConfigError> {
        let inner = self.lock();
        let channel = &inner
            .channels
            .get(&state.channel)
            .ok_or(ConfigError::UnknownChannel)?
            .channel;
        let entry = inner
            .datasets
            .get(&channel.dataset)
            .ok_or(ConfigError::UnknownDataset)?;
        let dataset = &entry.dataset;
        if !dataset.class.is_writable() || !(dataset.class.is_bits() || dataset.class.is_registers())
        {
            return Err(ConfigError::ReadOnlyValue);
        }

        let field = channel.encoding.encode(channel.class, &state.value)?;
        let position = channel.bit_position();
        let register = u16::try_from(position / 16).map_err(|_| ConfigError::AddressOverflow)?;

        let mut action = Action::new(channel.dataset, dataset);
        action.action = ActionClass::Write;
        action.repeat = RepeatPolicy::Once;
        action.internal = false;

        match field {
            // whole registers of a register dataset
            Field::Bits(bits)
                if dataset.class.is_registers() && position % 16 == 0 && bits.len() % 16 == 0 =>
            {
                let registers = bits.to_registers();
                action.address = offset_address(dataset.address, register)?;
                action.length = (registers.len() / 2) as u16;
                action.payload = Some(Payload::Registers(registers));
            }
            Field::Bits(bits) => {
                action.offset = u16::try_from(position)
                    .ok()
                    .and_then(|x| dataset.offset.checked_add(x))
                    .ok_or(ConfigError::AddressOverflow)?;
                action.length = bits.len() as u16;
                action.payload = Some(Payload::Bits(bits));
            }
            Field::Bytes(bytes) if bytes.len() == 1 => {
                // the other byte of the register comes from the last read
                let mut word = match &entry.cache {
                    Some(Payload::Registers(x)) => {
                        let start = 2 * register as usize;
                        x.get(start..start + 2).map(|w| [w[0], w[1]]).unwrap_or([0, 0])
                    }
                    _ => [0, 0],
                };
                word[byte_position(position) - 2 * register as usize] = bytes[0];
                action.address = offset_address(dataset.address, register)?;
                action.length = 1;
                action.payload = Some(Payload::Registers(word.to_vec()));
            }
            Field::Bytes(bytes) => {
                action.address = offset_address(dataset.address, register)?;
                action.length = (bytes.len() / 2) as u16;
                action.payload = Some(Payload::Registers(bytes));
            }
        }

        Ok(action)
    }
}

fn offset_address(address: u16, registers: u16) -> Result<u16, ConfigError> {
    address
        .checked_add(registers)
        .ok_or(ConfigError::AddressOverflow)
}

/// true if any set bit of a change bitmap names this dataset
fn selected(bitmap: u16, dataset: &Dataset) -> bool {
    (0..16u16).filter(|bit| bitmap & (1 << bit) != 0).any(|bit| {
        match (bit, dataset.scope) {
            (bit, Some(scope)) if bit < BITMAP_CHANNELS => scope.channel as u16 == bit,
            (bit, Some(scope)) if bit < BITMAP_UNSCOPED => {
                scope.element as u16 == bit - BITMAP_CHANNELS
            }
            (BITMAP_UNSCOPED, None) => true,
            _ => false,
        }
    })
}
