/*
[INPUT]:  A ChannelTransport plus consumer key changes
[OUTPUT]: Latest FeedView and ConnectionState via `watch` channels
[POS]:    Consumer layer - handle/worker pair running the subscription registry
[UPDATE]: When changing command handling, event-loop ordering or shutdown semantics
*/

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chainfeed_adapter::{ChannelTransport, SubscriptionKey, TransportEvent};

use crate::registry::{ConnectionState, FeedView, SendOutcome, SubscriptionRegistry};

#[derive(Debug)]
enum FeedCommand {
    SetKey(Option<SubscriptionKey>),
    Teardown,
}

/// Consumer handle for a live option-chain subscription.
///
/// All state lives in a worker task; this handle only forwards commands and
/// exposes the latest view. Commands sent after teardown are dropped.
#[derive(Debug)]
pub struct LiveChainFeed {
    cmd_tx: mpsc::UnboundedSender<FeedCommand>,
    view: watch::Receiver<FeedView>,
    connection_state: watch::Receiver<ConnectionState>,
    shutdown: CancellationToken,
    worker_handle: Option<tokio::task::JoinHandle<()>>,
}

impl LiveChainFeed {
    /// Start the worker for `transport`. Must be called inside a Tokio runtime;
    /// otherwise the feed stays inert.
    pub fn spawn<T: ChannelTransport>(transport: T, refresh_interval: Duration) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let mut registry = SubscriptionRegistry::new(transport, refresh_interval, outcome_tx);
        let events = registry.take_transport_events();
        let view = registry.subscribe_view();
        let connection_state = registry.subscribe_connection_state();

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let worker_handle = if tokio::runtime::Handle::try_current().is_err() {
            warn!("LiveChainFeed created without Tokio runtime; worker not started");
            None
        } else {
            let worker = FeedWorker {
                registry,
                cmd_rx,
                events,
                outcome_rx,
                shutdown: shutdown.clone(),
            };
            Some(tokio::spawn(worker.run()))
        };

        Self {
            cmd_tx,
            view,
            connection_state,
            shutdown,
            worker_handle,
        }
    }

    /// Select the key to stream, or `None` to stop streaming.
    pub fn set_key(&self, key: Option<SubscriptionKey>) {
        if self.cmd_tx.send(FeedCommand::SetKey(key)).is_err() {
            debug!("set_key on a torn-down feed ignored");
        }
    }

    /// Tear down without waiting for the worker.
    pub fn teardown(&self) {
        let _ = self.cmd_tx.send(FeedCommand::Teardown);
        self.shutdown.cancel();
    }

    /// Tear down and wait until the transport is closed.
    pub async fn teardown_and_wait(&mut self) {
        self.teardown();
        if let Some(handle) = self.worker_handle.take()
            && let Err(err) = handle.await
        {
            warn!(error = %err, "feed worker ended abnormally");
        }
    }

    pub fn current_view(&self) -> FeedView {
        self.view.borrow().clone()
    }

    pub fn subscribe_view(&self) -> watch::Receiver<FeedView> {
        self.view.clone()
    }

    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection_state.clone()
    }
}

impl Drop for LiveChainFeed {
    fn drop(&mut self) {
        self.teardown();
    }
}

struct FeedWorker<T: ChannelTransport> {
    registry: SubscriptionRegistry<T>,
    cmd_rx: mpsc::UnboundedReceiver<FeedCommand>,
    events: Option<mpsc::Receiver<TransportEvent>>,
    outcome_rx: mpsc::UnboundedReceiver<SendOutcome>,
    shutdown: CancellationToken,
}

impl<T: ChannelTransport> FeedWorker<T> {
    async fn run(mut self) {
        info!("chain feed worker started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.events = None;
                    self.registry.teardown().await;
                    break;
                }
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(FeedCommand::SetKey(key)) => self.registry.set_key(key).await,
                        Some(FeedCommand::Teardown) | None => {
                            self.events = None;
                            self.registry.teardown().await;
                            break;
                        }
                    }
                }
                event = next_event(&mut self.events) => {
                    match event {
                        Some(event) => self.registry.handle_transport_event(event),
                        None => {
                            warn!("transport event stream ended");
                            self.events = None;
                        }
                    }
                }
                Some(outcome) = self.outcome_rx.recv() => {
                    self.registry.handle_send_outcome(outcome);
                }
                _ = self.registry.next_refresh_tick() => {
                    self.registry.on_refresh_tick();
                }
            }
        }

        info!("chain feed worker stopped");
    }
}

async fn next_event(events: &mut Option<mpsc::Receiver<TransportEvent>>) -> Option<TransportEvent> {
    match events.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
