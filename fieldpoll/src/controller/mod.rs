//! The pipeline: actions become transactions, messages update datasets, states become
//! writes and internal reads drive device discovery
//!
//! Each flow is a bounded queue with exactly one consumer task. The controller owns the
//! tasks; [`Controller::stop`] shuts them down before the transceiver is disconnected.

mod discovery;
mod dispatch;
mod tasks;

pub use discovery::{DeviceKind, DiscoveredDevice};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::channel::flow;
use crate::counters::{CounterSnapshot, Counters};
use crate::error::{ConfigError, RequestError, Shutdown};
use crate::feed::{ActionFeed, ActionSink};
use crate::function::{FunctionLayer, Protocol, StandardFunctions, VendorFunctions};
use crate::model::{Action, DatasetId, NodeId, Registry, State};
use crate::transport::Transceiver;
use crate::types::UnitId;

use discovery::DiscoveryTask;
use dispatch::ActionTask;
use tasks::{MessageTask, StateTask};

/// Settings of the pipeline
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct ControllerConfig {
    /// capacity of every flow and of the event queue
    pub queue_size: usize,
    /// retries of an action that timed out before it is abandoned
    pub max_retries: u8,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            queue_size: 64,
            max_retries: 3,
        }
    }
}

/// Output of the pipeline for the host
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// a channel value to report
    State(State),
    /// a device found by discovery or enumeration
    Discovered(DiscoveredDevice),
}

#[derive(Clone)]
pub(crate) struct Node {
    pub(crate) unit: UnitId,
    pub(crate) functions: Arc<dyn FunctionLayer>,
}

/// State shared by the controller and its tasks
pub(crate) struct Shared {
    pub(crate) transceiver: Arc<Transceiver>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) feed: ActionFeed,
    pub(crate) counters: Arc<Counters>,
    pub(crate) config: ControllerConfig,
    nodes: Mutex<HashMap<NodeId, Node>>,
}

impl Shared {
    fn nodes(&self) -> MutexGuard<'_, HashMap<NodeId, Node>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<Node> {
        self.nodes().get(&id).cloned()
    }
}

/// Feeds dispatched actions into the action flow without waiting
pub(crate) struct QueueSink {
    tx: mpsc::Sender<Action>,
    counters: Arc<Counters>,
}

impl ActionSink for QueueSink {
    fn submit(&self, action: Action) {
        match self.tx.try_send(action) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(action)) => {
                self.counters.increment_dropped();
                tracing::warn!("action queue full, dropping: {}", action);
            }
            Err(mpsc::error::TrySendError::Closed(action)) => {
                tracing::debug!("controller stopped, discarding: {}", action);
            }
        }
    }
}

/// Runs the pipeline over one transceiver
pub struct Controller {
    shared: Arc<Shared>,
    states: mpsc::Sender<State>,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl Controller {
    /// spawn the flow consumers, returning the controller and the host's event queue
    ///
    /// must be called from within a Tokio runtime
    pub fn start(
        transceiver: Arc<Transceiver>,
        registry: Arc<Registry>,
        config: ControllerConfig,
    ) -> (Self, mpsc::Receiver<Event>) {
        let (action_tx, action_rx) = flow("action", config.queue_size);
        let (message_tx, message_rx) = flow("message", config.queue_size);
        let (state_tx, state_rx) = flow("state", config.queue_size);
        let (discovery_tx, discovery_rx) = flow("discovery", config.queue_size);
        let (event_tx, event_rx) = mpsc::channel(config.queue_size.max(1));

        let counters = transceiver.counters();
        let sink = QueueSink {
            tx: action_tx,
            counters: counters.clone(),
        };
        let shared = Arc::new(Shared {
            transceiver,
            registry,
            feed: ActionFeed::new(Arc::new(sink)),
            counters,
            config,
            nodes: Mutex::new(HashMap::new()),
        });

        let mut action = ActionTask::new(shared.clone(), action_rx, message_tx, discovery_tx.clone());
        let mut message = MessageTask::new(shared.clone(), message_rx, event_tx.clone(), discovery_tx);
        let mut state = StateTask::new(shared.clone(), state_rx);
        let mut discovery = DiscoveryTask::new(discovery_rx, event_tx);

        let tasks = vec![
            (
                "action",
                tokio::spawn(
                    async move { action.run().await }.instrument(tracing::info_span!("Actions")),
                ),
            ),
            (
                "message",
                tokio::spawn(
                    async move { message.run().await }.instrument(tracing::info_span!("Messages")),
                ),
            ),
            (
                "state",
                tokio::spawn(
                    async move { state.run().await }.instrument(tracing::info_span!("States")),
                ),
            ),
            (
                "discovery",
                tokio::spawn(
                    async move { discovery.run().await }
                        .instrument(tracing::info_span!("Discovery")),
                ),
            ),
        ];

        let controller = Self {
            shared,
            states: state_tx,
            tasks: Mutex::new(tasks),
        };
        (controller, event_rx)
    }

    /// register a node, resolving its protocol to a function layer
    pub fn add_node(&self, node: NodeId, unit: UnitId, protocol: Protocol) -> Arc<dyn FunctionLayer> {
        let transceiver = self.shared.transceiver.clone();
        let functions: Arc<dyn FunctionLayer> = match protocol {
            Protocol::Standard => Arc::new(StandardFunctions::new(transceiver)),
            Protocol::Vendor => Arc::new(VendorFunctions::new(transceiver)),
        };
        tracing::info!("{} at unit {} speaks {:?}", node, unit, protocol);
        self.shared.nodes().insert(
            node,
            Node {
                unit,
                functions: functions.clone(),
            },
        );
        functions
    }

    /// forget a node together with its actions, datasets and channels
    pub fn remove_node(&self, node: NodeId) {
        self.shared.feed.remove_actions(node);
        let channels = self.shared.registry.remove_channels(node);
        let datasets = self.shared.registry.remove_datasets(node);
        self.shared.nodes().remove(&node);
        tracing::info!(
            "removed {} ({} dataset(s), {} channel(s))",
            node,
            datasets,
            channels
        );
    }

    /// schedule an action according to its repeat policy
    pub fn submit(&self, action: Action) {
        self.shared.feed.submit(action);
    }

    /// schedule the read of a dataset according to its repeat policy
    pub fn poll_dataset(&self, id: DatasetId) -> Result<(), RequestError> {
        let action = self.shared.registry.read_action(id)?;
        self.submit(action);
        Ok(())
    }

    /// schedule the read of every dataset of `node`, returning how many
    pub fn poll_node(&self, node: NodeId) -> Result<usize, RequestError> {
        if self.shared.node(node).is_none() {
            return Err(ConfigError::UnknownNode.into());
        }
        let datasets = self.shared.registry.datasets(node);
        for (id, dataset) in &datasets {
            self.submit(Action::new(*id, dataset));
        }
        Ok(datasets.len())
    }

    /// queue a write of a channel value
    pub async fn write(&self, state: State) -> Result<(), RequestError> {
        self.states.send(state).await.map_err(|_| Shutdown)?;
        Ok(())
    }

    /// dispatch the slow list
    pub fn exec_slow(&self) -> usize {
        self.shared.feed.exec_slow()
    }

    /// dispatch the fast list
    pub fn exec_fast(&self) -> usize {
        self.shared.feed.exec_fast()
    }

    /// current value of the shared counters
    pub fn counters(&self) -> CounterSnapshot {
        self.shared.counters.snapshot()
    }

    /// the registry the pipeline updates
    pub fn registry(&self) -> &Arc<Registry> {
        &self.shared.registry
    }

    /// the transceiver the pipeline drives
    pub fn transceiver(&self) -> &Arc<Transceiver> {
        &self.shared.transceiver
    }

    /// stop every flow consumer, then disconnect the transceiver
    ///
    /// calling this more than once is harmless
    pub async fn stop(&self) {
        let tasks = std::mem::take(&mut *self.tasks());
        for (name, task) in tasks {
            task.abort();
            // a cancelled task reports a JoinError, which is the expected outcome
            let _ = task.await;
            tracing::debug!("{} task stopped", name);
        }
        self.shared.transceiver.disconnect().await;
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<(&'static str, JoinHandle<()>)>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        for (_, task) in self.tasks().iter() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::append_crc;
    use crate::decode::DecodeLevel;
    use crate::function::VendorAddress;
    use crate::mock::{mock, Handle};
    use crate::model::{Channel, ChannelId, Dataset, MessageClass, ReportPolicy, Value, ValueClass};
    use crate::transport::{ConnectionState, SerialSettings, TransportSettings};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    fn with_crc(adu: &[u8]) -> Vec<u8> {
        let mut frame = adu.to_vec();
        append_crc(&mut frame);
        frame
    }

    fn start(timeout: Duration) -> (Controller, mpsc::Receiver<Event>, Handle) {
        let mut settings = TransportSettings::rtu("/dev/null", SerialSettings::default());
        settings.response_timeout = timeout;
        settings.pacing = Some(Duration::ZERO);
        let (mock, handle) = mock();
        let transceiver = Arc::new(Transceiver::new_mock(settings, DecodeLevel::nothing(), mock));
        let (controller, events) = Controller::start(
            transceiver,
            Arc::new(Registry::new()),
            ControllerConfig::default(),
        );
        (controller, events, handle)
    }

    async fn next_event(events: &mut mpsc::Receiver<Event>) -> Event {
        tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("no event before the deadline")
            .expect("event queue closed")
    }

    async fn wait_until<F: Fn(&CounterSnapshot) -> bool>(controller: &Controller, condition: F) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while !condition(&controller.counters()) {
            assert!(tokio::time::Instant::now() < deadline, "condition not reached");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn reads_and_reports_only_changes() {
        let (controller, mut events, mut handle) = start(Duration::from_millis(200));
        controller.add_node(NodeId(1), UnitId::new(1), Protocol::Standard);
        let id = controller.registry().add_dataset(
            "temp",
            Dataset::new(NodeId(1), MessageClass::HoldingRegister, 0, 2),
        );
        let temp = ChannelId::new("temp");
        assert!(controller
            .registry()
            .add_channel(Channel::new(temp.clone(), id, 0, ValueClass::UInt16)));

        let request = with_crc(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x02]);
        for value in [0x2A, 0x2A, 0x2B] {
            handle.expect_write(&request);
            handle.read(&with_crc(&[0x01, 0x03, 0x04, 0x00, value, 0x00, 0x00]));
        }
        for _ in 0..3 {
            controller.poll_dataset(id).unwrap();
        }

        assert_eq!(
            next_event(&mut events).await,
            Event::State(State::new(temp.clone(), Value::Int(42)))
        );
        // the identical second read produced nothing
        assert_eq!(
            next_event(&mut events).await,
            Event::State(State::new(temp.clone(), Value::Int(43)))
        );
        assert_eq!(controller.counters().messages, 3);
        controller.stop().await;
    }

    #[tokio::test]
    async fn abandons_action_after_retry_bound() {
        let (controller, _events, mut handle) = start(Duration::from_millis(20));
        controller.add_node(NodeId(1), UnitId::new(1), Protocol::Standard);
        let id = controller.registry().add_dataset(
            "coils",
            Dataset::new(NodeId(1), MessageClass::Coil, 0x10, 4),
        );

        let request = with_crc(&[0x01, 0x01, 0x00, 0x10, 0x00, 0x04]);
        for _ in 0..4 {
            handle.expect_write(&request);
        }
        controller.poll_dataset(id).unwrap();

        wait_until(&controller, |x| x.failures == 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let counters = controller.counters();
        assert_eq!(counters.messages, 4);
        assert_eq!(counters.timeouts, 4);
        assert_eq!(counters.failures, 1);
        controller.stop().await;
    }

    #[tokio::test]
    async fn writes_vendor_bit_with_masked_write() {
        let (controller, _events, mut handle) = start(Duration::from_millis(200));
        controller.add_node(NodeId(7), UnitId::new(2), Protocol::Vendor);
        let address = VendorAddress::new(1, 3, 4).unwrap();
        let id = controller.registry().add_dataset(
            "relay",
            Dataset::new(NodeId(7), MessageClass::HoldingRegister, address.to_u16(), 1),
        );
        let relay = ChannelId::new("relay");
        controller
            .registry()
            .add_channel(Channel::new(relay.clone(), id, 3, ValueClass::Bit));

        let request = [
            0x02, 0x44, 0x03, 0x04, 0x01, 0x00, 0x01, 0x04, 0x00, 0x08, 0xFF, 0xF7,
        ];
        handle.expect_write(&with_crc(&request));
        handle.read(&with_crc(&request[..7]));

        controller
            .write(State::new(relay, Value::Bool(true)))
            .await
            .unwrap();
        assert_eq!(handle.next_write().await, with_crc(&request));
        controller.stop().await;
    }

    #[tokio::test]
    async fn internal_reads_announce_devices_on_every_poll() {
        let (controller, mut events, mut handle) = start(Duration::from_millis(200));
        controller.add_node(NodeId(7), UnitId::new(2), Protocol::Vendor);
        let address = VendorAddress::new(2, 0, 0).unwrap();
        let id = controller.registry().add_dataset(
            "pairing",
            Dataset::new(NodeId(7), MessageClass::HoldingRegister, address.to_u16(), 2)
                .with_report(ReportPolicy::Always)
                .internal(),
        );
        assert!(controller.registry().add_channel(Channel::new(
            ChannelId::new("assigned"),
            id,
            0,
            ValueClass::UInt16
        )));

        // the same bitmap twice: discovery runs even though nothing changed
        for _ in 0..2 {
            handle.expect_write(&with_crc(&[0x02, 0x42, 0x00, 0x00, 0x02, 0x00, 0x02]));
            // bitmap 0x000A and a clear status, low byte first
            handle.read(&with_crc(&[0x02, 0x42, 0x04, 0x0A, 0x00, 0x00, 0x00]));
            controller.poll_dataset(id).unwrap();

            let mut found = Vec::new();
            for _ in 0..3 {
                match next_event(&mut events).await {
                    Event::Discovered(x) => found.push((x.kind, x.channel, x.element)),
                    other => panic!("unexpected event: {other:?}"),
                }
            }
            assert_eq!(
                found,
                vec![
                    (DeviceKind::Thermostat, 1, 2),
                    (DeviceKind::Actuator, 1, 2),
                    (DeviceKind::Actuator, 3, 2),
                ]
            );
        }

        assert!(events.try_recv().is_err());
        assert!(controller.registry().value(&ChannelId::new("assigned")).is_none());
        controller.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_disconnects() {
        let (controller, _events, _handle) = start(Duration::from_millis(200));
        controller.stop().await;
        controller.stop().await;
        assert_eq!(
            controller.transceiver().state(),
            ConnectionState::Disconnected
        );
        assert_eq!(
            controller
                .write(State::new(ChannelId::new("x"), Value::Int(1)))
                .await,
            Err(RequestError::Shutdown)
        );
    }

    #[tokio::test]
    async fn full_action_queue_drops_and_counts() {
        let counters = Arc::new(Counters::default());
        let (tx, _rx) = flow("action", 1);
        let sink = QueueSink {
            tx,
            counters: counters.clone(),
        };
        let dataset = Dataset::new(NodeId(1), MessageClass::Coil, 0, 1);
        sink.submit(Action::new(DatasetId(1), &dataset));
        sink.submit(Action::new(DatasetId(1), &dataset));
        assert_eq!(counters.snapshot().dropped, 1);
    }
}
