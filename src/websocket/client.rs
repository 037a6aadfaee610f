use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{sleep, sleep_until, timeout, timeout_at, Instant},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        handshake::client::Request,
        http::{HeaderName, HeaderValue},
        protocol::Message,
    },
};
use tokio_util::sync::CancellationToken;

use super::{
    config::WebSocketConfig,
    state::{ConnectionState, FailureAction, Lifecycle},
};
use crate::{ApiError, Result};

const OUTBOUND_CAPACITY: usize = 64;
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Events delivered to the single subscriber returned by
/// [`WebSocketClient::events`].
#[derive(Clone, Debug, PartialEq)]
pub enum WebSocketEvent {
    StateChanged(ConnectionState),
    Text(String),
    Binary(Vec<u8>),
    ReconnectScheduled { attempt: u32, delay: Duration },
    GaveUp { reason: String },
}

/// State shared between the client handle and its supervisor task.
struct Shared {
    config: WebSocketConfig,
    lifecycle: Mutex<Lifecycle>,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: mpsc::UnboundedSender<WebSocketEvent>,
}

impl Shared {
    /// Applies a lifecycle transition and publishes the resulting state.
    fn transition<T>(&self, apply: impl FnOnce(&mut Lifecycle) -> T) -> T {
        let mut lifecycle = self
            .lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = lifecycle.state().clone();
        let result = apply(&mut lifecycle);
        let after = lifecycle.state().clone();

        if before != after {
            #[cfg(feature = "tracing")]
            tracing::debug!(url = %self.config.url, from = %before, to = %after, "websocket state changed");
            self.state_tx.send_replace(after.clone());
            self.emit(WebSocketEvent::StateChanged(after));
        }
        result
    }

    fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    fn emit(&self, event: WebSocketEvent) {
        // A dropped subscriber is not an error.
        let _ = self.events_tx.send(event);
    }
}

struct Session {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    outbound: mpsc::Sender<Message>,
}

struct Inner {
    shared: Arc<Shared>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<WebSocketEvent>>>,
    session: Mutex<Option<Session>>,
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(session) = self.session().take() {
            session.cancel.cancel();
        }
    }
}

/// WebSocket client with liveness promotion and automatic reconnect.
///
/// ```no_run
/// use courier_http::{WebSocketClient, WebSocketConfig, WebSocketEvent};
///
/// # async fn demo() -> courier_http::Result<()> {
/// let client = WebSocketClient::new(WebSocketConfig::new("wss://stream.example.com/ws"))?;
/// let mut events = client.events().expect("first subscriber");
/// client.connect();
///
/// while let Some(event) = events.recv().await {
///     if let WebSocketEvent::Text(text) = event {
///         println!("{text}");
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct WebSocketClient {
    inner: Arc<Inner>,
}

impl fmt::Debug for WebSocketClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketClient")
            .field("url", &self.inner.shared.config.url)
            .field("state", &self.state())
            .finish()
    }
}

impl WebSocketClient {
    pub fn new(config: WebSocketConfig) -> Result<Self> {
        config.validate()?;
        let lifecycle = Lifecycle::new(config.reconnect_policy(), config.give_up_on_initial_failure);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            inner: Arc::new(Inner {
                shared: Arc::new(Shared {
                    config,
                    lifecycle: Mutex::new(lifecycle),
                    state_tx,
                    events_tx,
                }),
                events_rx: Mutex::new(Some(events_rx)),
                session: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &WebSocketConfig {
        &self.inner.shared.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.shared.state()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state_tx.subscribe()
    }

    /// Takes the event stream. Only the first call returns `Some`.
    pub fn events(&self) -> Option<mpsc::UnboundedReceiver<WebSocketEvent>> {
        self.inner
            .events_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// Opens the socket in the background.
    ///
    /// Only acts from `Disconnected`, `Failed` or `GaveUp`; a pending
    /// reconnect is superseded. Returns whether a new session was started.
    /// Must be called within a tokio runtime.
    pub fn connect(&self) -> bool {
        let shared = &self.inner.shared;
        let mut session = self.inner.session();
        let Some(epoch) = shared.transition(Lifecycle::begin_connect) else {
            return false;
        };
        if let Some(previous) = session.take() {
            previous.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let task = tokio::spawn(supervise(
            Arc::clone(shared),
            epoch,
            cancel.clone(),
            outbound_rx,
        ));
        *session = Some(Session {
            cancel,
            task,
            outbound,
        });
        true
    }

    /// Cancels pending reconnects, closes the socket and resets the reconnect
    /// budget. The client stays disconnected until [`connect`](Self::connect).
    pub async fn disconnect(&self) {
        let shared = &self.inner.shared;
        shared.transition(Lifecycle::begin_disconnect);

        let session = self.inner.session().take();
        if let Some(Session {
            cancel, mut task, ..
        }) = session
        {
            cancel.cancel();
            if timeout(CLOSE_GRACE * 2, &mut task).await.is_err() {
                task.abort();
            }
        }

        shared.transition(Lifecycle::finish_disconnect);
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Message::Text(text.into())).await
    }

    pub async fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.send(Message::Binary(data.into())).await
    }

    pub async fn send_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let text = serde_json::to_string(value)
            .map_err(|err| ApiError::Encode(format!("websocket payload serialization failed: {err}")))?;
        self.send_text(text).await
    }

    async fn send(&self, message: Message) -> Result<()> {
        if !self.state().is_connected() {
            return Err(ApiError::NotConnected);
        }
        let outbound = self
            .inner
            .session()
            .as_ref()
            .map(|session| session.outbound.clone())
            .ok_or(ApiError::NotConnected)?;
        outbound
            .send(message)
            .await
            .map_err(|_| ApiError::NotConnected)
    }
}

/// Runs sessions for one `connect()` call until give-up or cancellation.
async fn supervise(
    shared: Arc<Shared>,
    epoch: u64,
    cancel: CancellationToken,
    mut outbound: mpsc::Receiver<Message>,
) {
    loop {
        let Some(reason) = run_session(&shared, epoch, &cancel, &mut outbound).await else {
            return;
        };
        let discarded = discard_pending(&mut outbound);
        #[cfg(feature = "tracing")]
        {
            if discarded > 0 {
                tracing::debug!(url = %shared.config.url, discarded, "dropped unsent websocket messages");
            }
        }
        #[cfg(not(feature = "tracing"))]
        let _ = discarded;

        match shared.transition(|lifecycle| lifecycle.fail(epoch, reason.clone())) {
            FailureAction::Ignore => return,
            FailureAction::GiveUp => {
                if !shared.transition(|lifecycle| lifecycle.give_up(epoch)) {
                    return;
                }
                #[cfg(feature = "tracing")]
                tracing::warn!(url = %shared.config.url, %reason, "websocket gave up reconnecting");
                shared.emit(WebSocketEvent::GaveUp { reason });
                return;
            }
            FailureAction::Reconnect { attempt, delay } => {
                #[cfg(feature = "tracing")]
                tracing::info!(
                    url = %shared.config.url,
                    %reason,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "websocket reconnect scheduled"
                );
                shared.emit(WebSocketEvent::ReconnectScheduled { attempt, delay });

                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = sleep(delay) => {}
                }
                if !shared.transition(|lifecycle| lifecycle.begin_reconnect(epoch)) {
                    return;
                }
            }
        }
    }
}

/// One socket lifetime. Returns the failure reason, or `None` when the
/// session was cancelled or superseded.
async fn run_session(
    shared: &Shared,
    epoch: u64,
    cancel: &CancellationToken,
    outbound: &mut mpsc::Receiver<Message>,
) -> Option<String> {
    let config = &shared.config;
    let request = match handshake_request(config) {
        Ok(request) => request,
        Err(err) => return Some(err.to_string()),
    };

    // The handshake counts against the first-message deadline.
    let mut deadline = Instant::now() + config.first_message_timeout;
    let stream = tokio::select! {
        _ = cancel.cancelled() => return None,
        connected = timeout_at(deadline, connect_async(request)) => match connected {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(err)) => return Some(format!("connect failed: {err}")),
            Err(_) => return Some(first_message_timeout_reason(config)),
        },
    };
    let (mut sink, mut source) = stream.split();

    let mut promoted = false;
    let mut awaiting_pong: Option<Instant> = None;
    let mut next_ping = config.ping_interval.map(|interval| Instant::now() + interval);

    if config.promotion.accepts_pong() {
        if let Err(err) = sink.send(Message::Ping(Vec::new())).await {
            return Some(format!("ping failed: {err}"));
        }
        awaiting_pong = Some(Instant::now());
    }

    loop {
        let pong_deadline = awaiting_pong.map(|sent| sent + config.ping_timeout);

        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = timeout(CLOSE_GRACE, sink.send(Message::Close(None))).await;
                return None;
            }
            _ = sleep_until(deadline), if !promoted => {
                return Some(first_message_timeout_reason(config));
            }
            _ = sleep_until(pong_deadline.unwrap_or(deadline)), if promoted && pong_deadline.is_some() => {
                return Some("ping timed out".to_owned());
            }
            _ = sleep_until(next_ping.unwrap_or(deadline)), if next_ping.is_some() => {
                if let Err(err) = sink.send(Message::Ping(Vec::new())).await {
                    return Some(format!("ping failed: {err}"));
                }
                awaiting_pong.get_or_insert_with(Instant::now);
                next_ping = config.ping_interval.map(|interval| Instant::now() + interval);
            }
            message = outbound.recv() => {
                let Some(message) = message else {
                    return None;
                };
                if let Err(err) = sink.send(message).await {
                    return Some(format!("send failed: {err}"));
                }
            }
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if !promoted && config.promotion.accepts_message() {
                        if config.is_ignored(&text) {
                            deadline = Instant::now() + config.first_message_timeout;
                        } else if shared.transition(|lifecycle| lifecycle.promote(epoch)) {
                            promoted = true;
                        } else {
                            return None;
                        }
                    }
                    shared.emit(WebSocketEvent::Text(text));
                }
                Some(Ok(Message::Binary(data))) => {
                    if !promoted && config.promotion.accepts_message() {
                        if !shared.transition(|lifecycle| lifecycle.promote(epoch)) {
                            return None;
                        }
                        promoted = true;
                    }
                    shared.emit(WebSocketEvent::Binary(data));
                }
                Some(Ok(Message::Pong(_))) => {
                    awaiting_pong = None;
                    if !promoted && config.promotion.accepts_pong() {
                        if !shared.transition(|lifecycle| lifecycle.promote(epoch)) {
                            return None;
                        }
                        promoted = true;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    return Some(match frame {
                        Some(frame) => format!("closed by peer ({}): {}", frame.code, frame.reason),
                        None => "closed by peer".to_owned(),
                    });
                }
                // Pings are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(err)) => return Some(format!("receive failed: {err}")),
                None => return Some("connection closed".to_owned()),
            },
        }
    }
}

fn first_message_timeout_reason(config: &WebSocketConfig) -> String {
    format!(
        "no valid message within {} ms",
        config.first_message_timeout.as_millis()
    )
}

/// Drops messages queued for a session that has ended.
fn discard_pending(outbound: &mut mpsc::Receiver<Message>) -> usize {
    let mut discarded = 0;
    while outbound.try_recv().is_ok() {
        discarded += 1;
    }
    discarded
}

fn handshake_request(config: &WebSocketConfig) -> Result<Request> {
    let mut request = config.url.as_str().into_client_request().map_err(|err| {
        ApiError::WebSocket(format!("invalid websocket url '{}': {err}", config.url))
    })?;

    for (name, value) in config.headers.iter() {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| ApiError::Encode(format!("invalid header name '{name}': {err}")))?;
        let header_value = HeaderValue::from_str(value).map_err(|err| {
            ApiError::Encode(format!("invalid value for header '{name}': {err}"))
        })?;
        request.headers_mut().insert(header_name, header_value);
    }
    Ok(request)
}
