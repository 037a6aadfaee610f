use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Instant,
};

use reqwest::{Method, Url};
use uuid::Uuid;

/// A request currently on the wire.
#[derive(Clone, Debug)]
pub struct TrackedRequest {
    pub id: Uuid,
    pub method: Method,
    pub url: Url,
    pub started_at: Instant,
}

/// Shared list of in-flight requests.
#[derive(Clone, Debug, Default)]
pub(crate) struct InFlight {
    requests: Arc<Mutex<Vec<TrackedRequest>>>,
}

impl InFlight {
    /// Registers a request; the entry lives as long as the returned guard.
    pub(crate) fn track(&self, method: Method, url: Url) -> InFlightGuard {
        let request = TrackedRequest {
            id: Uuid::new_v4(),
            method,
            url,
            started_at: Instant::now(),
        };
        let id = request.id;
        self.lock().push(request);
        InFlightGuard {
            requests: self.clone(),
            id,
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<TrackedRequest> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TrackedRequest>> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Removes its entry from the in-flight list when dropped.
#[derive(Debug)]
pub(crate) struct InFlightGuard {
    requests: InFlight,
    id: Uuid,
}

impl InFlightGuard {
    #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
    pub(crate) fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.requests.lock().retain(|request| request.id != self.id);
    }
}

#[cfg(test)]
mod tests {
    use reqwest::{Method, Url};

    use super::InFlight;

    #[test]
    fn guard_removes_entry_on_drop() {
        let in_flight = InFlight::default();
        let url = Url::parse("https://api.example.com/users").expect("valid url");

        let first = in_flight.track(Method::GET, url.clone());
        let second = in_flight.track(Method::POST, url);
        assert_ne!(first.id(), second.id());
        assert_eq!(in_flight.snapshot().len(), 2);

        drop(first);
        let remaining = in_flight.snapshot();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, second.id());
        assert_eq!(remaining[0].method, Method::POST);

        drop(second);
        assert!(in_flight.snapshot().is_empty());
    }
}
