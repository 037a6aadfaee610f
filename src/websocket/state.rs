use std::{fmt, time::Duration};

use crate::ReconnectPolicy;

/// Connection state of a [`WebSocketClient`](super::WebSocketClient).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Idle; `connect()` has not been called or `disconnect()` finished.
    Disconnected,
    /// `disconnect()` is tearing the socket down.
    Disconnecting,
    /// First attempt after `connect()`, not promoted yet.
    Connecting,
    /// Promoted by a liveness signal.
    Connected,
    /// Reconnect attempt in progress, not promoted yet.
    Reconnecting,
    /// Last attempt failed; a reconnect is pending.
    Failed(String),
    /// Reconnect budget exhausted. Only `connect()` leaves this state.
    GaveUp,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// States from which `connect()` starts a new session.
    pub fn can_connect(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed(_) | Self::GaveUp)
    }

    fn is_attempting(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Disconnecting => f.write_str("disconnecting"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Reconnecting => f.write_str("reconnecting"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::GaveUp => f.write_str("gave up"),
        }
    }
}

/// What the session supervisor does after a failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum FailureAction {
    /// The failure belongs to a superseded session.
    Ignore,
    GiveUp,
    Reconnect { attempt: u32, delay: Duration },
}

/// Transition rules of the connection state machine.
///
/// Every session started by `connect()` gets a new epoch; transitions carrying
/// an older epoch are ignored.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: ConnectionState,
    policy: ReconnectPolicy,
    epoch: u64,
    initial_attempt: bool,
    give_up_on_initial_failure: bool,
}

impl Lifecycle {
    pub(crate) fn new(policy: ReconnectPolicy, give_up_on_initial_failure: bool) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            policy,
            epoch: 0,
            initial_attempt: false,
            give_up_on_initial_failure,
        }
    }

    pub(crate) fn state(&self) -> &ConnectionState {
        &self.state
    }

    #[cfg(test)]
    pub(crate) fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Starts a new session; returns its epoch, or `None` when the current
    /// state does not allow connecting.
    pub(crate) fn begin_connect(&mut self) -> Option<u64> {
        if !self.state.can_connect() {
            return None;
        }
        self.epoch += 1;
        self.policy.reset();
        self.initial_attempt = true;
        self.state = ConnectionState::Connecting;
        Some(self.epoch)
    }

    pub(crate) fn begin_reconnect(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch || !matches!(self.state, ConnectionState::Failed(_)) {
            return false;
        }
        self.state = ConnectionState::Reconnecting;
        true
    }

    pub(crate) fn promote(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch || !self.state.is_attempting() {
            return false;
        }
        self.state = ConnectionState::Connected;
        self.policy.reset();
        self.initial_attempt = false;
        true
    }

    pub(crate) fn fail(&mut self, epoch: u64, reason: String) -> FailureAction {
        if epoch != self.epoch
            || !(self.state.is_attempting() || self.state == ConnectionState::Connected)
        {
            return FailureAction::Ignore;
        }

        let initial = std::mem::replace(&mut self.initial_attempt, false);
        self.state = ConnectionState::Failed(reason);
        if (initial && self.give_up_on_initial_failure) || !self.policy.can_retry() {
            return FailureAction::GiveUp;
        }

        let delay = self.policy.backoff();
        FailureAction::Reconnect {
            attempt: self.policy.retry_count(),
            delay,
        }
    }

    /// Follows a [`FailureAction::GiveUp`]; `GaveUp` is left only by
    /// `begin_connect`.
    pub(crate) fn give_up(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch || !matches!(self.state, ConnectionState::Failed(_)) {
            return false;
        }
        self.state = ConnectionState::GaveUp;
        true
    }

    /// Invalidates the running session.
    pub(crate) fn begin_disconnect(&mut self) {
        self.epoch += 1;
        self.state = ConnectionState::Disconnecting;
    }

    pub(crate) fn finish_disconnect(&mut self) {
        self.policy.reset();
        self.initial_attempt = false;
        self.state = ConnectionState::Disconnected;
    }
}
