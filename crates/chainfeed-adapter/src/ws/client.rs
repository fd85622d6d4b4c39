/*
[INPUT]:  Hub WebSocket URL, reconnect schedule, invocation timeout
[OUTPUT]: ChannelTransport over tokio-tungstenite with automatic reconnection
[POS]:    WebSocket layer - connection supervision and call/response correlation
[UPDATE]: When changing the envelope, reconnect behaviour or call semantics
*/

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt, future};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::backoff::BackoffSchedule;
use crate::error::{ChainFeedError, Result};
use crate::types::HubMethod;
use crate::ws::message::{ClientFrame, ServerFrame};
use crate::ws::transport::{ChannelTransport, SendFuture, TransportEvent};

pub const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(10);
const EVENT_CHANNEL_CAPACITY: usize = 100;
const INVOCATION_LOG_LIMIT: usize = 10;
const OTHER_LOG_LIMIT: usize = 3;
const PARSE_FAIL_LOG_LIMIT: usize = 3;
const RAW_LOG_MAX_BYTES: usize = 1024;

static INVOCATION_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);
static OTHER_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);
static PARSE_FAIL_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);

type HubStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Debug)]
struct PendingInvocation {
    method: HubMethod,
    reply: oneshot::Sender<Result<()>>,
}

/// State shared between the transport handle and its supervisor task.
#[derive(Debug, Default)]
struct Link {
    outbound: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    pending: Mutex<HashMap<Uuid, PendingInvocation>>,
}

impl Link {
    fn attach(&self, sender: mpsc::UnboundedSender<WsMessage>) {
        *lock(&self.outbound) = Some(sender);
    }

    /// Drop the outbound sender and fail every call still waiting for a completion.
    fn detach(&self) {
        let mut outbound = lock(&self.outbound);
        *outbound = None;
        let drained: Vec<PendingInvocation> =
            lock(&self.pending).drain().map(|(_, pending)| pending).collect();
        drop(outbound);

        for pending in drained {
            let _ = pending.reply.send(Err(ChainFeedError::NotConnected));
        }
    }

    fn complete(&self, invocation_id: Uuid, error: Option<String>) {
        let Some(pending) = lock(&self.pending).remove(&invocation_id) else {
            debug!(%invocation_id, "completion for unknown invocation");
            return;
        };

        let result = match error {
            Some(message) => Err(ChainFeedError::rejected(pending.method.as_str(), message)),
            None => Ok(()),
        };
        let _ = pending.reply.send(result);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// WebSocket transport for the option-chain hub
#[derive(Debug)]
pub struct HubWebSocket {
    url: Url,
    backoff: BackoffSchedule,
    invocation_timeout: Duration,
    event_tx: mpsc::Sender<TransportEvent>,
    event_rx: Option<mpsc::Receiver<TransportEvent>>,
    link: Arc<Link>,
    shutdown: CancellationToken,
    supervisor: Option<JoinHandle<()>>,
}

impl HubWebSocket {
    /// Create a transport for a `ws://` or `wss://` URL. Nothing connects until `open`.
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ChainFeedError::Config(format!(
                "hub url must use ws:// or wss://, got {}://",
                url.scheme()
            )));
        }

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            url,
            backoff: BackoffSchedule::default(),
            invocation_timeout: DEFAULT_INVOCATION_TIMEOUT,
            event_tx,
            event_rx: Some(event_rx),
            link: Arc::new(Link::default()),
            shutdown: CancellationToken::new(),
            supervisor: None,
        })
    }

    pub fn with_backoff(mut self, backoff: BackoffSchedule) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = timeout;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether a connection is currently established
    pub fn is_connected(&self) -> bool {
        lock(&self.link.outbound).is_some()
    }
}

#[async_trait]
impl ChannelTransport for HubWebSocket {
    async fn open(&mut self) -> Result<()> {
        if self.supervisor.is_some() {
            return Err(ChainFeedError::AlreadyConnected);
        }

        self.shutdown = CancellationToken::new();
        let supervisor = Supervisor {
            url: self.url.to_string(),
            backoff: self.backoff.clone(),
            event_tx: self.event_tx.clone(),
            link: self.link.clone(),
            shutdown: self.shutdown.clone(),
        };

        info!(url = %self.url, "opening hub connection");
        self.supervisor = Some(tokio::spawn(supervisor.run()));
        Ok(())
    }

    async fn close(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.supervisor.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "hub supervisor task ended abnormally");
            }
            info!(url = %self.url, "hub connection closed");
        }
        self.link.detach();
    }

    fn send(&self, method: HubMethod, args: Vec<serde_json::Value>) -> SendFuture {
        let invocation_id = Uuid::new_v4();
        let frame = ClientFrame::Invocation {
            invocation_id,
            target: method,
            arguments: args,
        };
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(err) => return Box::pin(future::ready(Err(err.into()))),
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let outbound = lock(&self.link.outbound);
            let Some(sender) = outbound.as_ref() else {
                return Box::pin(future::ready(Err(ChainFeedError::NotConnected)));
            };

            lock(&self.link.pending).insert(
                invocation_id,
                PendingInvocation {
                    method,
                    reply: reply_tx,
                },
            );

            if sender.send(WsMessage::Text(text.into())).is_err() {
                lock(&self.link.pending).remove(&invocation_id);
                return Box::pin(future::ready(Err(ChainFeedError::NotConnected)));
            }
        }

        log_invocation_sent(&frame);

        let link = self.link.clone();
        let timeout = self.invocation_timeout;
        Box::pin(async move {
            match tokio::time::timeout(timeout, reply_rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(ChainFeedError::NotConnected),
                Err(_) => {
                    lock(&link.pending).remove(&invocation_id);
                    Err(ChainFeedError::Timeout {
                        duration: timeout.as_secs(),
                    })
                }
            }
        })
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.event_rx.take()
    }
}

impl Drop for HubWebSocket {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionExit {
    Dropped,
    Shutdown,
}

/// Owns the socket: connects, pumps frames, reconnects on the backoff schedule.
struct Supervisor {
    url: String,
    backoff: BackoffSchedule,
    event_tx: mpsc::Sender<TransportEvent>,
    link: Arc<Link>,
    shutdown: CancellationToken,
}

impl Supervisor {
    async fn run(self) {
        let mut attempt: u32 = 0;
        let mut has_connected = false;

        'run: loop {
            let delay = self.backoff.delay(attempt);
            if !delay.is_zero() {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break 'run,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let connected = tokio::select! {
                _ = self.shutdown.cancelled() => break 'run,
                result = self.connect() => result,
            };

            match connected {
                Ok(stream) => {
                    attempt = 0;
                    let event = if has_connected {
                        TransportEvent::Reconnected
                    } else {
                        TransportEvent::Opened
                    };
                    has_connected = true;

                    let exit = self.run_session(stream, event).await;
                    self.link.detach();

                    match exit {
                        SessionExit::Shutdown => break 'run,
                        SessionExit::Dropped => {
                            warn!(url = %self.url, "hub connection dropped; reconnecting");
                            if !self.emit(TransportEvent::Closed).await {
                                break 'run;
                            }
                        }
                    }
                }
                Err(err) => {
                    attempt = attempt.saturating_add(1);
                    warn!(
                        attempt,
                        backoff = ?self.backoff.delay(attempt),
                        error = %err,
                        "hub connect failed; retrying with backoff"
                    );
                }
            }
        }

        self.link.detach();
        debug!(url = %self.url, "hub supervisor stopped");
    }

    async fn connect(&self) -> Result<HubStream> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|err| ChainFeedError::WebSocket(err.to_string()))?;
        Ok(stream)
    }

    /// Deliver an event unless shutdown starts first. Returns `false` on shutdown.
    async fn emit(&self, event: TransportEvent) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = self.event_tx.send(event) => true,
        }
    }

    async fn run_session(&self, stream: HubStream, event: TransportEvent) -> SessionExit {
        let (mut write, mut read) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        self.link.attach(outbound_tx);

        info!(url = %self.url, ?event, "hub connection established");
        let mut stopping = !self.emit(event).await;

        loop {
            if stopping {
                // frames enqueued before close() still go out
                while let Ok(message) = outbound_rx.try_recv() {
                    if write.send(message).await.is_err() {
                        break;
                    }
                }
                let _ = write.send(WsMessage::Close(None)).await;
                return SessionExit::Shutdown;
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => stopping = true,
                outbound = outbound_rx.recv() => {
                    match outbound {
                        Some(message) => {
                            if let Err(err) = write.send(message).await {
                                debug!(error = %err, "hub write failed");
                                return SessionExit::Dropped;
                            }
                        }
                        None => return SessionExit::Dropped,
                    }
                }
                incoming = read.next() => {
                    match incoming {
                        Some(Ok(WsMessage::Close(_))) => {
                            let _ = write.send(WsMessage::Close(None)).await;
                            return SessionExit::Dropped;
                        }
                        Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => {}
                        Some(Ok(message)) => {
                            if let Some(frame) = parse_message(message) {
                                stopping = !self.dispatch(frame).await;
                            }
                        }
                        Some(Err(err)) => {
                            debug!(error = %err, "hub read failed");
                            return SessionExit::Dropped;
                        }
                        None => return SessionExit::Dropped,
                    }
                }
            }
        }
    }

    /// Returns `false` if shutdown started while the event queue was full.
    async fn dispatch(&self, frame: ServerFrame) -> bool {
        if let ServerFrame::Completion {
            invocation_id,
            error,
        } = frame
        {
            self.link.complete(invocation_id, error);
            return true;
        }

        match frame.into_inbound() {
            Some(inbound) => self.emit(TransportEvent::Message(inbound)).await,
            None => true,
        }
    }
}

fn parse_message(message: WsMessage) -> Option<ServerFrame> {
    let text: String = match message {
        WsMessage::Text(text) => text.to_string(),
        WsMessage::Binary(bytes) => String::from_utf8(bytes.to_vec()).ok()?,
        _ => return None,
    };

    match serde_json::from_str::<ServerFrame>(&text) {
        Ok(ServerFrame::Other) => {
            log_other_frame_once(&text);
            None
        }
        Ok(frame) => Some(frame),
        Err(err) => {
            log_parse_fail_once(&err, &text);
            None
        }
    }
}

fn log_invocation_sent(frame: &ClientFrame) {
    let count = INVOCATION_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count >= INVOCATION_LOG_LIMIT {
        return;
    }

    let ClientFrame::Invocation {
        invocation_id,
        target,
        arguments,
    } = frame;
    let instrument = arguments.first().and_then(|value| value.as_str());
    let expiry = arguments.get(1).and_then(|value| value.as_str());

    info!(
        sample_index = count + 1,
        sample_limit = INVOCATION_LOG_LIMIT,
        %invocation_id,
        method = %target,
        instrument,
        expiry,
        "hub invocation sent"
    );
}

fn log_other_frame_once(raw: &str) {
    let count = OTHER_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count < OTHER_LOG_LIMIT {
        info!(
            sample_index = count + 1,
            sample_limit = OTHER_LOG_LIMIT,
            bytes = raw.len(),
            "hub frame type unrecognized"
        );
        let preview = truncate_for_log(raw, RAW_LOG_MAX_BYTES);
        debug!(
            sample_index = count + 1,
            sample_limit = OTHER_LOG_LIMIT,
            message = %preview,
            "hub frame type unrecognized"
        );
    }
}

fn log_parse_fail_once(err: &serde_json::Error, raw: &str) {
    let count = PARSE_FAIL_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count < PARSE_FAIL_LOG_LIMIT {
        info!(
            sample_index = count + 1,
            sample_limit = PARSE_FAIL_LOG_LIMIT,
            error = %err,
            bytes = raw.len(),
            "hub frame parse failed"
        );
        let preview = truncate_for_log(raw, RAW_LOG_MAX_BYTES);
        debug!(
            sample_index = count + 1,
            sample_limit = PARSE_FAIL_LOG_LIMIT,
            error = %err,
            message = %preview,
            "hub frame parse failed"
        );
    }
}

fn truncate_for_log(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::with_capacity(end + 3);
    out.push_str(&value[..end]);
    out.push_str("...");
    out
}
