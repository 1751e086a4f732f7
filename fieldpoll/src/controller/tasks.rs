use std::sync::Arc;

use tokio::sync::mpsc;

use crate::channel::FlowReceiver;
use crate::controller::discovery::DiscoveryInput;
use crate::controller::{Event, Shared};
use crate::error::Shutdown;
use crate::model::{Message, State};

/// Consumer of the message flow: updates datasets and fans out to channels
pub(crate) struct MessageTask {
    shared: Arc<Shared>,
    rx: FlowReceiver<Message>,
    events: mpsc::Sender<Event>,
    discovery: mpsc::Sender<DiscoveryInput>,
}

impl MessageTask {
    pub(crate) fn new(
        shared: Arc<Shared>,
        rx: FlowReceiver<Message>,
        events: mpsc::Sender<Event>,
        discovery: mpsc::Sender<DiscoveryInput>,
    ) -> Self {
        Self {
            shared,
            rx,
            events,
            discovery,
        }
    }

    pub(crate) async fn run(&mut self) {
        let _ = self.run_inner().await;
    }

    async fn run_inner(&mut self) -> Result<(), Shutdown> {
        loop {
            let message = self.rx.recv().await?;
            self.process(message).await?;
        }
    }

    async fn process(&mut self, message: Message) -> Result<(), Shutdown> {
        let update = match self.shared.registry.apply(&message) {
            Ok(x) => x,
            Err(err) => {
                tracing::warn!("dropping message for {}: {}", message.dataset, err);
                return Ok(());
            }
        };

        for action in update.cascades {
            tracing::debug!("change bitmap requests {}", action);
            self.shared.feed.submit(action);
        }

        for state in update.states {
            tracing::debug!("{}", state);
            self.events
                .send(Event::State(state))
                .await
                .map_err(|_| Shutdown)?;
        }

        if update.dataset.internal {
            let node = update.dataset.node;
            match self.shared.node(node) {
                Some(x) => {
                    let input = DiscoveryInput::Bitmap {
                        node,
                        unit: x.unit,
                        address: update.dataset.address,
                        payload: message.payload,
                    };
                    self.discovery.send(input).await.map_err(|_| Shutdown)?;
                }
                None => tracing::warn!("internal message for unknown {}", node),
            }
        }

        Ok(())
    }
}

/// Consumer of the state flow: turns host writes into once actions
pub(crate) struct StateTask {
    shared: Arc<Shared>,
    rx: FlowReceiver<State>,
}

impl StateTask {
    pub(crate) fn new(shared: Arc<Shared>, rx: FlowReceiver<State>) -> Self {
        Self { shared, rx }
    }

    pub(crate) async fn run(&mut self) {
        let _ = self.run_inner().await;
    }

    async fn run_inner(&mut self) -> Result<(), Shutdown> {
        loop {
            let state = self.rx.recv().await?;
            match self.shared.registry.build_write(&state) {
                Ok(action) => {
                    tracing::debug!("write {} as {}", state, action);
                    self.shared.feed.submit(action);
                }
                Err(err) => tracing::warn!("unable to write {}: {}", state, err),
            }
        }
    }
}
