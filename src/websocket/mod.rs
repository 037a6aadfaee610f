//! Reconnecting WebSocket client.
//!
//! A [`WebSocketClient`] moves through [`ConnectionState`]s: a fresh socket is
//! only `Connected` once a liveness signal arrives (see [`PromotionMode`]);
//! failures back off exponentially until the reconnect budget is spent, after
//! which the client stays in `GaveUp` until `connect()` is called again.

mod client;
mod config;
mod state;

pub use client::{WebSocketClient, WebSocketEvent};
pub use config::{PromotionMode, WebSocketConfig};
pub use state::ConnectionState;
