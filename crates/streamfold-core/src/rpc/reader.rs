//! Streaming reader
//!
//! Sends a single request over a stream and folds every response message into
//! one result. The reader is driven entirely by its driver's events and must
//! only be touched from one serialized context (see `call::StreamingCall`).

use bytes::Bytes;
use tracing::{debug, error, info};

use super::driver::{StreamDriver, StreamObserver};
use super::status::Status;

/// Either every response message, in arrival order, or the failure status
pub type CompletionResult = Result<Vec<Bytes>, Status>;

/// Completion callback, invoked exactly once
pub type Callback = Box<dyn FnOnce(CompletionResult) + Send>;

/// Where a reader is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Constructed, `start` not called yet
    Created,
    /// Driver started, waiting for the stream to become ready
    Started,
    /// Request sent, collecting responses
    AwaitingResponses,
    /// Callback fired; terminal
    Finished,
}

/// Adapter from a bidirectional stream to a one-shot call.
///
/// Invariants:
/// - the callback fires at most once
/// - the request is written exactly once, when the stream reports it is ready
/// - responses are only buffered between the request write and the finish
///
/// Events that break these rules indicate a broken driver and panic.
pub struct StreamingReader<D: StreamDriver> {
    driver: D,
    request: Option<Bytes>,
    responses: Vec<Bytes>,
    callback: Option<Callback>,
    state: ReaderState,
}

impl<D: StreamDriver> StreamingReader<D> {
    /// Wrap a driver and the request it will carry. No I/O happens here.
    pub fn new(driver: D, request: impl Into<Bytes>) -> Self {
        Self {
            driver,
            request: Some(request.into()),
            responses: Vec::new(),
            callback: None,
            state: ReaderState::Created,
        }
    }

    /// Start the call. `callback` receives the result once the stream finishes.
    ///
    /// Panics if called more than once.
    pub fn start<F>(&mut self, callback: F)
    where
        F: FnOnce(CompletionResult) + Send + 'static,
    {
        if self.state != ReaderState::Created {
            contract_violation(self.state, "start called more than once");
        }

        debug!("StreamingReader: starting stream");
        self.callback = Some(Box::new(callback));
        self.state = ReaderState::Started;
        self.driver.start();
    }

    /// Ask the driver to end the stream early.
    ///
    /// The callback still fires through the driver's finish event, normally
    /// with a cancellation status. Repeated calls are forwarded as-is.
    pub fn cancel(&mut self) {
        debug!(state = ?self.state, "StreamingReader: cancel requested");
        self.driver.terminate();
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Number of response messages buffered so far
    pub fn buffered(&self) -> usize {
        self.responses.len()
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }
}

impl<D: StreamDriver> StreamObserver for StreamingReader<D> {
    fn on_stream_start(&mut self) {
        if self.state != ReaderState::Started {
            contract_violation(self.state, "stream start reported twice or before start()");
        }
        let Some(request) = self.request.take() else {
            contract_violation(self.state, "request already consumed");
        };

        // The peer cannot complete its response until it knows no further
        // writes are coming, so the request always goes out as the last write.
        debug!(bytes = request.len(), "StreamingReader: stream ready, sending request");
        self.driver.write_last(request);
        self.state = ReaderState::AwaitingResponses;
    }

    fn on_stream_read(&mut self, message: Bytes) {
        if self.state != ReaderState::AwaitingResponses {
            contract_violation(self.state, "message read outside of the response window");
        }
        debug!(
            bytes = message.len(),
            buffered = self.responses.len() + 1,
            "StreamingReader: response received"
        );
        self.responses.push(message);
    }

    fn on_stream_finish(&mut self, status: Status) {
        let Some(callback) = self.callback.take() else {
            contract_violation(
                self.state,
                "received an event from stream after callback was unset",
            );
        };
        self.state = ReaderState::Finished;
        self.request = None;
        let responses = std::mem::take(&mut self.responses);

        if status.is_ok() {
            info!(responses = responses.len(), "StreamingReader: call completed");
            callback(Ok(responses));
        } else {
            info!(
                code = %status.code(),
                message = status.message(),
                discarded = responses.len(),
                "StreamingReader: call failed"
            );
            callback(Err(status));
        }
    }
}

#[track_caller]
fn contract_violation(state: ReaderState, what: &str) -> ! {
    error!(state = ?state, "StreamingReader: contract violation: {}", what);
    panic!("stream contract violation ({state:?}): {what}");
}
