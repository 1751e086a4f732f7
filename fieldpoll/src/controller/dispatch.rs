use std::sync::Arc;

use tokio::sync::mpsc;

use crate::channel::FlowReceiver;
use crate::controller::discovery::DiscoveryInput;
use crate::controller::{Node, Shared};
use crate::error::{ConfigError, RequestError, Shutdown};
use crate::function::Protocol;
use crate::model::{Action, ActionClass, Message, MessageClass, Payload};
use crate::types::UnitId;

/// What the pipeline does with a failed action
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Disposition {
    /// submit it again through the once path
    Retry,
    /// give up and count a failure
    Abandon,
    /// the link is broken, disconnect
    Reset,
    /// log and move on
    Drop,
    /// the pipeline is going away
    Shutdown,
}

impl Disposition {
    fn classify(err: RequestError, action: &Action, max_retries: u8) -> Self {
        match err {
            RequestError::ResponseTimeout if action.retries < max_retries => Disposition::Retry,
            RequestError::ResponseTimeout => Disposition::Abandon,
            RequestError::ConnectionFailure(_) => Disposition::Reset,
            RequestError::Shutdown => Disposition::Shutdown,
            _ => Disposition::Drop,
        }
    }
}

/// Consumer of the action flow, the only caller of the function layers
pub(crate) struct ActionTask {
    shared: Arc<Shared>,
    rx: FlowReceiver<Action>,
    messages: mpsc::Sender<Message>,
    discovery: mpsc::Sender<DiscoveryInput>,
}

impl ActionTask {
    pub(crate) fn new(
        shared: Arc<Shared>,
        rx: FlowReceiver<Action>,
        messages: mpsc::Sender<Message>,
        discovery: mpsc::Sender<DiscoveryInput>,
    ) -> Self {
        Self {
            shared,
            rx,
            messages,
            discovery,
        }
    }

    pub(crate) async fn run(&mut self) {
        // Err(Shutdown) is the normal way out
        let _ = self.run_inner().await;
    }

    async fn run_inner(&mut self) -> Result<(), Shutdown> {
        loop {
            let action = self.rx.recv().await?;
            self.process(action).await?;
        }
    }

    async fn process(&mut self, action: Action) -> Result<(), Shutdown> {
        let err = match self.execute(&action).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        match Disposition::classify(err, &action, self.shared.config.max_retries) {
            Disposition::Retry => {
                tracing::debug!("{} timed out, retrying", action);
                self.shared.feed.submit(action.retry());
            }
            Disposition::Abandon => {
                self.shared.counters.increment_failures();
                tracing::warn!("{} abandoned after {} retries", action, action.retries);
            }
            Disposition::Reset => {
                tracing::warn!("{} failed: {}", action, err);
                self.shared.transceiver.disconnect().await;
            }
            Disposition::Drop => {
                tracing::warn!("{} failed: {}", action, err);
            }
            Disposition::Shutdown => return Err(Shutdown),
        }
        Ok(())
    }

    async fn execute(&mut self, action: &Action) -> Result<(), RequestError> {
        let node = self
            .shared
            .node(action.node)
            .ok_or(ConfigError::UnknownNode)?;

        match action.action {
            ActionClass::Read => self.read(&node, action).await,
            ActionClass::Write => self.write(&node, action).await,
            ActionClass::Status => self.status(&node, action).await,
        }
    }

    async fn read(&mut self, node: &Node, action: &Action) -> Result<(), RequestError> {
        let range = action.range();
        let functions = &node.functions;
        let payload = match action.class {
            MessageClass::Coil => Payload::Bits(functions.read_coils(node.unit, range).await?),
            MessageClass::DiscreteInput => {
                Payload::Bits(functions.read_discrete_inputs(node.unit, range).await?)
            }
            MessageClass::HoldingRegister => {
                Payload::Registers(functions.read_holding_registers(node.unit, range).await?)
            }
            MessageClass::InputRegister => {
                Payload::Registers(functions.read_input_registers(node.unit, range).await?)
            }
            _ => return Err(ConfigError::UnsupportedClass.into()),
        };

        let message = Message {
            dataset: action.dataset,
            payload,
            internal: action.internal,
        };
        self.messages.send(message).await.map_err(|_| Shutdown)?;
        Ok(())
    }

    async fn write(&mut self, node: &Node, action: &Action) -> Result<(), RequestError> {
        let range = action.range();
        let functions = &node.functions;
        match (action.class, &action.payload) {
            (MessageClass::SetLogicalAddress, _) => {
                let first = UnitId::new(action.address as u8);
                for assignment in functions.enumerate(first).await? {
                    let input = DiscoveryInput::Assigned {
                        node: action.node,
                        assignment,
                    };
                    self.discovery.send(input).await.map_err(|_| Shutdown)?;
                }
                Ok(())
            }
            (MessageClass::Coil, Some(Payload::Bits(bits))) if bits.len() <= 1 => {
                functions
                    .write_single_coil(node.unit, range, bits.get(0)?)
                    .await
            }
            (MessageClass::Coil, Some(Payload::Bits(bits))) => {
                functions.write_multiple_coils(node.unit, range, bits).await
            }
            (MessageClass::HoldingRegister, Some(Payload::Registers(data))) => {
                functions
                    .write_multiple_registers(node.unit, range, data)
                    .await
            }
            // bits inside registers need the masked write of the vendor extension
            (MessageClass::HoldingRegister, Some(Payload::Bits(bits))) => {
                if functions.protocol() != Protocol::Vendor {
                    return Err(RequestError::MethodNotSupported);
                }
                functions.write_multiple_coils(node.unit, range, bits).await
            }
            _ => Err(ConfigError::UnsupportedClass.into()),
        }
    }

    async fn status(&mut self, node: &Node, action: &Action) -> Result<(), RequestError> {
        let functions = &node.functions;
        match action.class {
            MessageClass::ExceptionStatus => {
                let status = functions.read_exception_status(node.unit).await?;
                tracing::info!("{} exception status: {:#04X}", action.node, status);
            }
            MessageClass::CommEventCounter => {
                let counter = functions.get_comm_event_counter(node.unit).await?;
                tracing::info!(
                    "{} comm event counter, status: {:#06X} events: {}",
                    action.node,
                    counter.status,
                    counter.event_count
                );
            }
            MessageClass::CommEventLog => {
                let log = functions.get_comm_event_log(node.unit).await?;
                tracing::info!(
                    "{} comm event log, status: {:#06X} events: {} messages: {} log: {:02X?}",
                    action.node,
                    log.status,
                    log.event_count,
                    log.message_count,
                    log.events
                );
            }
            _ => return Err(ConfigError::UnsupportedClass.into()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dataset, DatasetId, NodeId};

    #[test]
    fn classifies_errors() {
        let dataset = Dataset::new(NodeId(1), MessageClass::Coil, 0, 1);
        let action = Action::new(DatasetId(1), &dataset);
        let exhausted = action.retry().retry().retry();

        assert_eq!(
            Disposition::classify(RequestError::ResponseTimeout, &action, 3),
            Disposition::Retry
        );
        assert_eq!(
            Disposition::classify(RequestError::ResponseTimeout, &exhausted, 3),
            Disposition::Abandon
        );
        assert_eq!(
            Disposition::classify(
                RequestError::ConnectionFailure(std::io::ErrorKind::BrokenPipe),
                &action,
                3
            ),
            Disposition::Reset
        );
        assert_eq!(
            Disposition::classify(RequestError::InvalidDataAddress, &action, 3),
            Disposition::Drop
        );
        assert_eq!(
            Disposition::classify(RequestError::Shutdown, &action, 3),
            Disposition::Shutdown
        );
    }
}
