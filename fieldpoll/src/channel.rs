use crate::error::Shutdown;

/// Consumer end of one pipeline flow
///
/// `recv()` yields `Err(Shutdown)` once every sender is gone so that the consumer
/// loops can exit with `?`.
pub(crate) struct FlowReceiver<T> {
    flow: &'static str,
    inner: tokio::sync::mpsc::Receiver<T>,
}

/// create a bounded flow with a single consumer
pub(crate) fn flow<T>(
    flow: &'static str,
    capacity: usize,
) -> (tokio::sync::mpsc::Sender<T>, FlowReceiver<T>) {
    let (tx, inner) = tokio::sync::mpsc::channel(capacity.max(1));
    (tx, FlowReceiver { flow, inner })
}

impl<T> FlowReceiver<T> {
    pub(crate) async fn recv(&mut self) -> Result<T, Shutdown> {
        match self.inner.recv().await {
            Some(x) => Ok(x),
            None => {
                tracing::debug!("{} flow closed", self.flow);
                Err(Shutdown)
            }
        }
    }
}
