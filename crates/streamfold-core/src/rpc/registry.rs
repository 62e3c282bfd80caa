//! In-flight call bookkeeping
//!
//! Keeps every outstanding call reachable so it can be cancelled by id, or
//! all at once on shutdown. Entries remove themselves when their call
//! resolves.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use super::call::{join_outcome, StreamingCall};
use super::cancellation::CallCancellation;
use super::driver::{EventReceiver, StreamDriver};
use super::reader::CompletionResult;

/// Identifier of a registered call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(Uuid);

impl CallId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registry of outstanding calls
pub struct CallRegistry {
    calls: Arc<DashMap<CallId, CallCancellation>>,
    root: CallCancellation,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(DashMap::new()),
            root: CallCancellation::new(),
        }
    }

    /// Start a call and track it until it resolves
    pub fn issue<D>(
        &self,
        driver: D,
        events: EventReceiver,
        request: impl Into<Bytes>,
    ) -> RegisteredCall
    where
        D: StreamDriver + 'static,
    {
        let id = CallId::new();
        let cancellation = self.root.child();
        self.calls.insert(id, cancellation.clone());
        info!(call_id = %id, in_flight = self.calls.len(), "CallRegistry: call issued");

        let call = StreamingCall::spawn_with(driver, events, request, cancellation);
        let calls = Arc::clone(&self.calls);
        let (tx, outcome) = oneshot::channel();
        let watcher = tokio::spawn(async move {
            // Drop the entry even if the call task panicked
            let _entry = scopeguard::guard((calls, id), |(calls, id)| {
                calls.remove(&id);
                debug!(call_id = %id, "CallRegistry: call removed");
            });
            let result = call.outcome().await;
            let _ = tx.send(result);
        });

        RegisteredCall {
            id,
            outcome,
            watcher,
        }
    }

    /// Cancel one call. Returns false if it is no longer in flight.
    pub fn cancel(&self, id: CallId) -> bool {
        match self.calls.get(&id) {
            Some(entry) => {
                debug!(call_id = %id, "CallRegistry: cancelling call");
                entry.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending call. Calls issued afterwards start out cancelled.
    pub fn shutdown(&self) {
        info!(
            in_flight = self.calls.len(),
            "CallRegistry: shutting down, cancelling pending calls"
        );
        self.root.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Number of calls that have not resolved yet
    pub fn in_flight(&self) -> usize {
        self.calls.len()
    }
}

impl Default for CallRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A call owned by a `CallRegistry`
pub struct RegisteredCall {
    id: CallId,
    outcome: oneshot::Receiver<CompletionResult>,
    watcher: JoinHandle<()>,
}

impl RegisteredCall {
    pub fn id(&self) -> CallId {
        self.id
    }

    /// Wait for the call to resolve
    pub async fn outcome(self) -> CompletionResult {
        join_outcome(self.outcome, self.watcher).await
    }
}
