use std::time::Duration;

use serde_json::Value;

use crate::{ApiError, Headers, ReconnectPolicy};

/// Signal that promotes a fresh socket to [`Connected`](super::ConnectionState::Connected).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PromotionMode {
    /// First inbound text/binary message whose type is not ignored.
    #[default]
    FirstValidMessage,
    /// Pong answering the probe sent right after the handshake.
    Ping,
    /// Whichever of the two arrives first.
    Either,
}

impl PromotionMode {
    pub(crate) fn accepts_message(self) -> bool {
        matches!(self, Self::FirstValidMessage | Self::Either)
    }

    pub(crate) fn accepts_pong(self) -> bool {
        matches!(self, Self::Ping | Self::Either)
    }
}

/// Connection, liveness and reconnect settings for [`WebSocketClient`](super::WebSocketClient).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebSocketConfig {
    /// `ws://` or `wss://` endpoint.
    pub url: String,
    /// Extra handshake headers.
    pub headers: Headers,
    pub promotion: PromotionMode,
    /// How long a fresh socket may stay unpromoted.
    pub first_message_timeout: Duration,
    /// Keepalive ping period; `None` disables periodic pings.
    pub ping_interval: Option<Duration>,
    /// Maximum wait for a pong once connected.
    pub ping_timeout: Duration,
    /// Values of the JSON `"type"` field that never promote the connection.
    pub ignored_message_types: Vec<String>,
    /// Give up instead of reconnecting when the very first attempt fails.
    pub give_up_on_initial_failure: bool,
    pub max_retry_count: u32,
    pub initial_reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
}

impl WebSocketConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Headers::new(),
            promotion: PromotionMode::default(),
            first_message_timeout: Duration::from_secs(5),
            ping_interval: None,
            ping_timeout: Duration::from_secs(10),
            ignored_message_types: Vec::new(),
            give_up_on_initial_failure: false,
            max_retry_count: 5,
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_promotion(mut self, promotion: PromotionMode) -> Self {
        self.promotion = promotion;
        self
    }

    pub fn with_first_message_timeout(mut self, timeout: Duration) -> Self {
        self.first_message_timeout = timeout;
        self
    }

    pub fn with_ping(mut self, interval: Duration, timeout: Duration) -> Self {
        self.ping_interval = Some(interval);
        self.ping_timeout = timeout;
        self
    }

    pub fn with_ignored_message_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_message_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_give_up_on_initial_failure(mut self, give_up: bool) -> Self {
        self.give_up_on_initial_failure = give_up;
        self
    }

    pub fn with_reconnect(mut self, max_retry_count: u32, initial: Duration, max: Duration) -> Self {
        self.max_retry_count = max_retry_count;
        self.initial_reconnect_delay = initial;
        self.max_reconnect_delay = max;
        self
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.url.trim().is_empty() {
            return Err(ApiError::WebSocket("websocket url must not be empty".to_owned()));
        }
        if self.first_message_timeout.is_zero() {
            return Err(ApiError::WebSocket(
                "first message timeout must be > 0".to_owned(),
            ));
        }
        if self.initial_reconnect_delay.is_zero() {
            return Err(ApiError::WebSocket(
                "initial reconnect delay must be > 0".to_owned(),
            ));
        }
        if self.max_reconnect_delay < self.initial_reconnect_delay {
            return Err(ApiError::WebSocket(
                "max reconnect delay must be >= initial reconnect delay".to_owned(),
            ));
        }
        if self.ping_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(ApiError::WebSocket("ping interval must be > 0".to_owned()));
        }
        Ok(())
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            self.max_retry_count,
            self.initial_reconnect_delay,
            self.max_reconnect_delay,
        )
    }

    /// Whether a text frame carries an ignored `"type"`.
    pub(crate) fn is_ignored(&self, text: &str) -> bool {
        if self.ignored_message_types.is_empty() {
            return false;
        }
        let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) else {
            return false;
        };
        map.get("type")
            .and_then(Value::as_str)
            .is_some_and(|kind| self.ignored_message_types.iter().any(|ignored| ignored == kind))
    }
}
