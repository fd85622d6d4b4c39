/*
[INPUT]:  Consumer key changes, transport events, send outcomes, refresh ticks
[OUTPUT]: Subscribe/unsubscribe/refresh calls and the consumer-facing FeedView
[POS]:    Subscription layer - single-key state machine (no I/O of its own)
[UPDATE]: When changing hand-off, staleness or retry semantics
*/

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use chainfeed_adapter::{
    ChainFeedError, ChannelTransport, ErrorEvent, HubMethod, InboundMessage, Snapshot,
    SubscriptionKey, TransportEvent,
};

use crate::refresh::RefreshScheduler;

/// Lifecycle of the registry. `Closed` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting(SubscriptionKey),
    Subscribed(SubscriptionKey),
    Reconnecting(SubscriptionKey),
    Closed,
}

impl ConnectionState {
    /// The active key, if any.
    pub fn key(&self) -> Option<&SubscriptionKey> {
        match self {
            ConnectionState::Connecting(key)
            | ConnectionState::Subscribed(key)
            | ConnectionState::Reconnecting(key) => Some(key),
            ConnectionState::Idle | ConnectionState::Closed => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting(_) => "connecting",
            ConnectionState::Subscribed(_) => "subscribed",
            ConnectionState::Reconnecting(_) => "reconnecting",
            ConnectionState::Closed => "closed",
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}

/// What the consumer renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedView {
    pub snapshot: Option<Snapshot>,
    pub error: Option<ErrorEvent>,
    pub is_connected: bool,
}

impl FeedView {
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|event| event.message.as_str())
    }
}

/// Result of a tracked hub call, fed back into the registry by its owner.
#[derive(Debug)]
pub struct SendOutcome {
    pub method: HubMethod,
    pub key: SubscriptionKey,
    pub result: Result<(), ChainFeedError>,
}

/// Transport connectivity, tracked apart from the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    NotOpened,
    Opening,
    Up,
    Down,
}

/// Owns the active key, the transport and the refresh timer.
///
/// Every method takes `&mut self`; the owner serializes consumer commands,
/// transport events, send outcomes and refresh ticks, so no locking happens here.
#[derive(Debug)]
pub struct SubscriptionRegistry<T: ChannelTransport> {
    transport: T,
    state: ConnectionState,
    link: Link,
    resubscribe_pending: bool,
    refresh: RefreshScheduler,
    view: watch::Sender<FeedView>,
    connection_state: watch::Sender<ConnectionState>,
    outcome_tx: mpsc::UnboundedSender<SendOutcome>,
}

impl<T: ChannelTransport> SubscriptionRegistry<T> {
    pub fn new(
        transport: T,
        refresh_interval: Duration,
        outcome_tx: mpsc::UnboundedSender<SendOutcome>,
    ) -> Self {
        let (view, _) = watch::channel(FeedView::default());
        let (connection_state, _) = watch::channel(ConnectionState::Idle);

        Self {
            transport,
            state: ConnectionState::Idle,
            link: Link::NotOpened,
            resubscribe_pending: false,
            refresh: RefreshScheduler::new(refresh_interval),
            view,
            connection_state,
            outcome_tx,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn active_key(&self) -> Option<&SubscriptionKey> {
        self.state.key()
    }

    pub fn refresh_is_live(&self) -> bool {
        self.refresh.is_live()
    }

    pub fn view(&self) -> FeedView {
        self.view.borrow().clone()
    }

    pub fn subscribe_view(&self) -> watch::Receiver<FeedView> {
        self.view.subscribe()
    }

    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection_state.subscribe()
    }

    pub fn take_transport_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.transport.take_events()
    }

    /// Change (or clear) the active key.
    pub async fn set_key(&mut self, key: Option<SubscriptionKey>) {
        if self.state.is_closed() {
            debug!("set_key after teardown ignored");
            return;
        }
        if self.active_key() == key.as_ref() {
            return;
        }

        if let ConnectionState::Subscribed(previous) = &self.state {
            let previous = previous.clone();
            self.refresh.stop();
            self.unsubscribe_best_effort(&previous);
        }
        self.resubscribe_pending = false;
        self.view.send_modify(|view| {
            view.snapshot = None;
            view.error = None;
        });

        let Some(key) = key else {
            info!("subscription cleared");
            self.transition(ConnectionState::Idle);
            return;
        };

        info!(key = %key, link = ?self.link, "subscription key selected");
        match self.link {
            Link::NotOpened => {
                self.link = Link::Opening;
                self.transition(ConnectionState::Connecting(key.clone()));
                if let Err(err) = self.transport.open().await {
                    warn!(key = %key, error = %err, "transport open failed");
                    self.link = Link::NotOpened;
                    self.transition(ConnectionState::Idle);
                    self.view.send_modify(|view| {
                        view.error = Some(ErrorEvent {
                            key,
                            message: err.to_string(),
                        });
                    });
                }
            }
            Link::Opening => self.transition(ConnectionState::Connecting(key)),
            Link::Up => self.enter_subscribed(key),
            Link::Down => self.transition(ConnectionState::Reconnecting(key)),
        }
    }

    /// Single entry point for everything the transport reports.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        if self.state.is_closed() {
            return;
        }

        match event {
            TransportEvent::Opened | TransportEvent::Reconnected => {
                self.link = Link::Up;
                self.set_connected(true);
                match &self.state {
                    ConnectionState::Connecting(key) | ConnectionState::Reconnecting(key) => {
                        let key = key.clone();
                        self.enter_subscribed(key);
                    }
                    _ => {}
                }
            }
            TransportEvent::Closed => {
                self.link = Link::Down;
                self.set_connected(false);
                match &self.state {
                    ConnectionState::Subscribed(key) | ConnectionState::Connecting(key) => {
                        let key = key.clone();
                        self.refresh.stop();
                        warn!(key = %key, "channel closed; waiting for reconnection");
                        self.transition(ConnectionState::Reconnecting(key));
                    }
                    _ => {}
                }
            }
            TransportEvent::Message(message) => self.handle_message(message),
        }
    }

    /// Apply the outcome of a tracked call, judged against the key active now.
    pub fn handle_send_outcome(&mut self, outcome: SendOutcome) {
        if self.state.is_closed() {
            return;
        }
        if self.active_key() != Some(&outcome.key) {
            debug!(
                method = %outcome.method,
                key = %outcome.key,
                "outcome for inactive key ignored"
            );
            return;
        }

        match (outcome.method, outcome.result) {
            (HubMethod::Subscribe, Ok(())) => {
                self.resubscribe_pending = false;
            }
            (HubMethod::Subscribe, Err(err)) => {
                warn!(key = %outcome.key, error = %err, "subscribe failed; retrying on next refresh tick");
                self.resubscribe_pending = true;
                let event = ErrorEvent {
                    key: outcome.key,
                    message: err.to_string(),
                };
                self.view.send_modify(|view| view.error = Some(event));
            }
            (HubMethod::Refresh, Err(err)) => {
                debug!(key = %outcome.key, error = %err, "refresh failed; ignored");
            }
            (HubMethod::Refresh, Ok(())) | (HubMethod::Unsubscribe, _) => {}
        }
    }

    /// Wait for the next refresh tick. Never resolves while no timer is live.
    pub async fn next_refresh_tick(&mut self) {
        self.refresh.tick().await;
    }

    pub fn on_refresh_tick(&mut self) {
        let ConnectionState::Subscribed(key) = &self.state else {
            self.refresh.stop();
            return;
        };
        let key = key.clone();

        if self.resubscribe_pending {
            info!(key = %key, "re-issuing failed subscribe");
            self.resubscribe_pending = false;
            self.send_tracked(HubMethod::Subscribe, &key);
        }
        self.send_tracked(HubMethod::Refresh, &key);
    }

    /// Release everything. Later calls on the registry are no-ops.
    pub async fn teardown(&mut self) {
        if self.state.is_closed() {
            return;
        }

        self.refresh.stop();
        if let ConnectionState::Subscribed(key) = &self.state {
            let key = key.clone();
            self.unsubscribe_best_effort(&key);
        }
        let opened = self.link != Link::NotOpened;
        self.link = Link::Down;
        self.set_connected(false);
        self.transition(ConnectionState::Closed);

        if opened {
            self.transport.close().await;
        }
        info!("subscription registry closed");
    }

    fn enter_subscribed(&mut self, key: SubscriptionKey) {
        self.resubscribe_pending = false;
        self.send_tracked(HubMethod::Subscribe, &key);
        self.refresh.start();
        self.send_tracked(HubMethod::Refresh, &key);
        self.transition(ConnectionState::Subscribed(key));
    }

    fn handle_message(&mut self, message: InboundMessage) {
        let ConnectionState::Subscribed(active) = &self.state else {
            debug!(name = message.name(), key = %message.key(), "message outside subscription discarded");
            return;
        };
        if message.key() != active {
            debug!(
                name = message.name(),
                key = %message.key(),
                active = %active,
                "stale message discarded"
            );
            return;
        }

        match message {
            InboundMessage::Update { key, payload } => {
                let snapshot = Snapshot::new(key, payload);
                self.view.send_modify(|view| {
                    view.snapshot = Some(snapshot);
                    view.error = None;
                });
            }
            InboundMessage::Error { key, message } => {
                warn!(key = %key, error = %message, "hub reported error");
                self.view
                    .send_modify(|view| view.error = Some(ErrorEvent { key, message }));
            }
        }
    }

    fn send_tracked(&self, method: HubMethod, key: &SubscriptionKey) {
        let pending = self.transport.send(method, key.to_args());
        let outcome_tx = self.outcome_tx.clone();
        let key = key.clone();
        tokio::spawn(async move {
            let result = pending.await;
            let _ = outcome_tx.send(SendOutcome {
                method,
                key,
                result,
            });
        });
    }

    fn unsubscribe_best_effort(&self, key: &SubscriptionKey) {
        if self.link != Link::Up {
            return;
        }

        let pending = self.transport.send(HubMethod::Unsubscribe, key.to_args());
        let key = key.clone();
        tokio::spawn(async move {
            if let Err(err) = pending.await {
                debug!(key = %key, error = %err, "unsubscribe failed; ignored");
            }
        });
    }

    fn set_connected(&self, connected: bool) {
        self.view.send_if_modified(|view| {
            let changed = view.is_connected != connected;
            view.is_connected = connected;
            changed
        });
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        debug!(from = self.state.name(), to = next.name(), "state transition");
        self.state = next.clone();
        self.connection_state.send_replace(next);
    }
}
