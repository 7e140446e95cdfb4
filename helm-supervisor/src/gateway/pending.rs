//! Outstanding request bookkeeping.

use std::collections::HashMap;

use helm_common::ResponseFrame;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::ClientError;

pub(crate) type Outcome = Result<Value, ClientError>;

/// A request waiting for its response.
pub(crate) struct PendingRequest {
    method: String,
    responder: oneshot::Sender<Outcome>,
    timer: JoinHandle<()>,
}

impl PendingRequest {
    pub fn new(method: String, responder: oneshot::Sender<Outcome>, timer: JoinHandle<()>) -> Self {
        Self {
            method,
            responder,
            timer,
        }
    }

    fn settle(self, outcome: Outcome) {
        self.timer.abort();
        // The caller may have stopped listening; that is fine.
        let _ = self.responder.send(outcome);
    }
}

/// Pending requests keyed by correlation id.
///
/// Every entry leaves the map exactly once: through a response, its timeout,
/// or a bulk rejection when the transport closes.
#[derive(Default)]
pub(crate) struct PendingRequests {
    entries: HashMap<String, PendingRequest>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh correlation id that is not currently pending.
    pub fn next_id(&self) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            if !self.entries.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn insert(&mut self, id: String, request: PendingRequest) {
        self.entries.insert(id, request);
    }

    /// Settle the request matching a response. Returns false for unknown ids.
    pub fn resolve(&mut self, response: ResponseFrame) -> bool {
        let Some(request) = self.entries.remove(&response.id) else {
            return false;
        };
        let outcome = if response.ok {
            Ok(response.payload.unwrap_or(Value::Null))
        } else {
            let message = response.error_message();
            Err(ClientError::Remote {
                code: response.error.map(|e| e.code).unwrap_or_default(),
                message,
            })
        };
        request.settle(outcome);
        true
    }

    /// Reject a request whose timer fired. Returns false if it already settled.
    pub fn expire(&mut self, id: &str) -> bool {
        let Some(request) = self.entries.remove(id) else {
            return false;
        };
        let method = request.method.clone();
        // Called from the timer task itself, so aborting it is harmless.
        request.settle(Err(ClientError::Timeout { method }));
        true
    }

    /// Reject every outstanding request with the same error.
    pub fn reject_all(&mut self, error: &ClientError) -> usize {
        let count = self.entries.len();
        for (_, request) in self.entries.drain() {
            request.settle(Err(error.clone()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }
}
