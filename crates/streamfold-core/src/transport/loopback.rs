//! In-process stream driver
//!
//! The driver half is handed to a reader; the peer half plays the server:
//! it receives the request, pushes responses, and ends the call.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::rpc::driver::{event_channel, EventReceiver, EventSender, StreamDriver, StreamEvent};
use crate::rpc::status::Status;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LoopbackError {
    #[error("call already finished")]
    Finished,
    #[error("driver dropped before sending a request")]
    NoRequest,
    #[error("request already received")]
    AlreadyReceived,
}

/// Event sender shared by both halves; `None` once the call has finished,
/// so nothing can be delivered after the finish event.
type SharedEvents = Arc<Mutex<Option<EventSender>>>;

/// Create a connected driver/peer pair plus the receiver for driver events
pub fn channel() -> (LoopbackDriver, EventReceiver, LoopbackPeer) {
    let (events_tx, events_rx) = event_channel();
    let (request_tx, request_rx) = oneshot::channel();
    let events: SharedEvents = Arc::new(Mutex::new(Some(events_tx)));

    let driver = LoopbackDriver {
        events: Arc::clone(&events),
        request: Some(request_tx),
    };
    let peer = LoopbackPeer {
        events,
        request: Some(request_rx),
    };
    (driver, events_rx, peer)
}

/// Client half, owned by the reader
pub struct LoopbackDriver {
    events: SharedEvents,
    request: Option<oneshot::Sender<Bytes>>,
}

impl StreamDriver for LoopbackDriver {
    fn start(&mut self) {
        if let Some(events) = self.events.lock().as_ref() {
            let _ = events.send(StreamEvent::Start);
        }
    }

    fn write_last(&mut self, message: Bytes) {
        match self.request.take() {
            Some(tx) => {
                debug!(bytes = message.len(), "LoopbackDriver: request handed to peer");
                let _ = tx.send(message);
            }
            None => warn!("LoopbackDriver: write_last called more than once"),
        }
    }

    fn terminate(&mut self) {
        if let Some(events) = self.events.lock().take() {
            debug!("LoopbackDriver: terminating call");
            let _ = events.send(StreamEvent::Finish(Status::cancelled(
                "call cancelled by client",
            )));
        }
    }
}

/// Server half
pub struct LoopbackPeer {
    events: SharedEvents,
    request: Option<oneshot::Receiver<Bytes>>,
}

impl LoopbackPeer {
    /// Wait for the client's request
    pub async fn recv_request(&mut self) -> Result<Bytes, LoopbackError> {
        let rx = self.request.take().ok_or(LoopbackError::AlreadyReceived)?;
        rx.await.map_err(|_| LoopbackError::NoRequest)
    }

    /// Push one response message
    pub fn send(&self, message: impl Into<Bytes>) -> Result<(), LoopbackError> {
        let guard = self.events.lock();
        let events = guard.as_ref().ok_or(LoopbackError::Finished)?;
        let _ = events.send(StreamEvent::Read(message.into()));
        Ok(())
    }

    /// End the call with `status`
    pub fn finish(&self, status: Status) -> Result<(), LoopbackError> {
        let events = self.events.lock().take().ok_or(LoopbackError::Finished)?;
        let _ = events.send(StreamEvent::Finish(status));
        Ok(())
    }

    /// Whether the call has ended, from either side
    pub fn is_finished(&self) -> bool {
        self.events.lock().is_none()
    }
}

impl Drop for LoopbackPeer {
    fn drop(&mut self) {
        // A peer that goes away mid-call still has to end it
        if let Some(events) = self.events.lock().take() {
            warn!("LoopbackPeer: dropped without finishing the call");
            let _ = events.send(StreamEvent::Finish(Status::unavailable(
                "peer dropped without finishing",
            )));
        }
    }
}
