use bytes::Bytes;
use reqwest::{header::HeaderMap, StatusCode};

/// Response as received from the transport, before classification and decode.
#[derive(Clone, Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Download progress of a response body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    /// Bytes received so far.
    pub received: u64,
    /// Expected length, when the server announced one.
    pub total: Option<u64>,
}

impl Progress {
    /// Completed fraction in `0.0..=1.0`, if the total is known.
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.received as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}
