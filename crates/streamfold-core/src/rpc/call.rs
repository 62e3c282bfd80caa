//! Async front end for streaming reads
//!
//! Each call runs its reader on a dedicated tokio task. That task is the
//! serialized context: driver events and cancellation requests are handled
//! one at a time, so the reader itself needs no locking.

use bytes::Bytes;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::cancellation::CallCancellation;
use super::driver::{EventReceiver, StreamDriver, StreamObserver};
use super::reader::{CompletionResult, StreamingReader};
use super::status::Status;

/// Handle to a call running on its own task
pub struct StreamingCall {
    cancellation: CallCancellation,
    outcome: oneshot::Receiver<CompletionResult>,
    task: JoinHandle<()>,
}

impl StreamingCall {
    /// Start a call. `events` must be the receiving half of the channel the
    /// driver reports to.
    pub fn spawn<D>(driver: D, events: EventReceiver, request: impl Into<Bytes>) -> Self
    where
        D: StreamDriver + 'static,
    {
        Self::spawn_with(driver, events, request, CallCancellation::new())
    }

    /// Start a call that is also cancelled when `cancellation` is
    pub fn spawn_with<D>(
        driver: D,
        events: EventReceiver,
        request: impl Into<Bytes>,
        cancellation: CallCancellation,
    ) -> Self
    where
        D: StreamDriver + 'static,
    {
        let (tx, outcome) = oneshot::channel();
        let reader = StreamingReader::new(driver, request);
        let task = tokio::spawn(drive(reader, events, cancellation.clone(), tx));

        Self {
            cancellation,
            outcome,
            task,
        }
    }

    /// Request early termination; the outcome will normally be a
    /// cancellation status. Does nothing once the call has finished.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn cancellation(&self) -> &CallCancellation {
        &self.cancellation
    }

    /// Wait for the call to resolve.
    ///
    /// A contract violation inside the call task is re-raised here as a panic.
    pub async fn outcome(self) -> CompletionResult {
        join_outcome(self.outcome, self.task).await
    }
}

/// Wait for a result delivered by `task`, re-raising the task's panic if it
/// died before delivering one
pub(crate) async fn join_outcome(
    outcome: oneshot::Receiver<CompletionResult>,
    task: JoinHandle<()>,
) -> CompletionResult {
    if let Ok(result) = outcome.await {
        return result;
    }
    match task.await {
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        _ => Err(Status::internal("call task ended without a result")),
    }
}

async fn drive<D: StreamDriver>(
    mut reader: StreamingReader<D>,
    mut events: EventReceiver,
    cancellation: CallCancellation,
    tx: oneshot::Sender<CompletionResult>,
) {
    // The result is held back until the event queue has been drained, so a
    // driver that breaks the finish contract fails the call instead of
    // racing a result out to the caller.
    let (done_tx, mut done_rx) = oneshot::channel();
    reader.start(move |result| {
        let _ = done_tx.send(result);
    });

    let mut cancel_forwarded = false;
    loop {
        tokio::select! {
            biased;

            _ = cancellation.cancelled(), if !cancel_forwarded => {
                cancel_forwarded = true;
                reader.cancel();
            }
            event = events.recv() => match event {
                Some(event) => {
                    let finished = event.is_finish();
                    event.dispatch_to(&mut reader);
                    if finished {
                        break;
                    }
                }
                None => {
                    warn!("StreamingCall: driver went away without finishing the stream");
                    reader.on_stream_finish(Status::unavailable(
                        "stream closed without a final status",
                    ));
                    break;
                }
            }
        }
    }

    // Anything the driver queued after its finish event is a contract violation
    while let Ok(event) = events.try_recv() {
        event.dispatch_to(&mut reader);
    }
    if let Ok(result) = done_rx.try_recv() {
        // Receiver gone means the caller stopped waiting
        let _ = tx.send(result);
    }
    debug!("StreamingCall: call task done");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::driver::{event_channel, EventSender, StreamEvent};
    use crate::rpc::status::Code;
    use std::sync::{Arc, Mutex};

    /// Driver that answers from a script as soon as the request arrives
    struct ScriptedDriver {
        events: EventSender,
        responses: Vec<&'static str>,
        status: Status,
        requests: Arc<Mutex<Vec<Bytes>>>,
        finish_on_write: bool,
        finished: bool,
    }

    impl ScriptedDriver {
        fn new(events: EventSender, responses: Vec<&'static str>, status: Status) -> Self {
            Self {
                events,
                responses,
                status,
                requests: Arc::default(),
                finish_on_write: true,
                finished: false,
            }
        }
    }

    impl StreamDriver for ScriptedDriver {
        fn start(&mut self) {
            let _ = self.events.send(StreamEvent::Start);
        }

        fn write_last(&mut self, message: Bytes) {
            self.requests.lock().unwrap().push(message);
            if self.finished {
                return;
            }
            for response in &self.responses {
                let _ = self
                    .events
                    .send(StreamEvent::Read(Bytes::from_static(response.as_bytes())));
            }
            if self.finish_on_write {
                self.finished = true;
                let _ = self.events.send(StreamEvent::Finish(self.status.clone()));
            }
        }

        fn terminate(&mut self) {
            if !self.finished {
                self.finished = true;
                let _ = self
                    .events
                    .send(StreamEvent::Finish(Status::cancelled("terminated")));
            }
        }
    }

    #[tokio::test]
    async fn test_call_resolves_with_all_chunks() {
        let (tx, rx) = event_channel();
        let driver = ScriptedDriver::new(tx, vec!["A", "B"], Status::ok());
        let requests = driver.requests.clone();

        let result = StreamingCall::spawn(driver, rx, "Q").outcome().await;

        assert_eq!(
            result,
            Ok(vec![Bytes::from_static(b"A"), Bytes::from_static(b"B")])
        );
        assert_eq!(*requests.lock().unwrap(), vec![Bytes::from_static(b"Q")]);
    }

    #[tokio::test]
    async fn test_call_resolves_with_failure() {
        let (tx, rx) = event_channel();
        let driver = ScriptedDriver::new(tx, vec!["A"], Status::unavailable("unavailable"));

        let result = StreamingCall::spawn(driver, rx, "Q").outcome().await;

        assert_eq!(result, Err(Status::unavailable("unavailable")));
    }

    #[tokio::test]
    async fn test_cancel_resolves_with_cancelled_status() {
        let (tx, rx) = event_channel();
        let mut driver = ScriptedDriver::new(tx, vec!["A"], Status::ok());
        driver.finish_on_write = false;

        let call = StreamingCall::spawn(driver, rx, "Q");
        call.cancel();
        call.cancel();
        let result = call.outcome().await;

        assert_eq!(result.unwrap_err().code(), Code::Cancelled);
    }

    #[tokio::test]
    async fn test_shared_cancellation_parent() {
        let parent = CallCancellation::new();
        let (tx, rx) = event_channel();
        let mut driver = ScriptedDriver::new(tx, vec![], Status::ok());
        driver.finish_on_write = false;

        let call = StreamingCall::spawn_with(driver, rx, "Q", parent.child());
        parent.cancel();

        assert_eq!(call.outcome().await.unwrap_err().code(), Code::Cancelled);
    }

    #[tokio::test]
    async fn test_dropped_driver_resolves_unavailable() {
        struct SilentDriver;

        impl StreamDriver for SilentDriver {
            fn start(&mut self) {}
            fn write_last(&mut self, _message: Bytes) {}
            fn terminate(&mut self) {}
        }

        let (tx, rx) = event_channel();
        drop(tx);

        let result = StreamingCall::spawn(SilentDriver, rx, "Q").outcome().await;
        assert_eq!(result.unwrap_err().code(), Code::Unavailable);
    }

    #[tokio::test]
    #[should_panic(expected = "callback was unset")]
    async fn test_double_finish_panics_through_outcome() {
        struct DoubleFinishDriver {
            events: EventSender,
        }

        impl StreamDriver for DoubleFinishDriver {
            fn start(&mut self) {
                let _ = self.events.send(StreamEvent::Start);
            }

            fn write_last(&mut self, _message: Bytes) {
                let _ = self.events.send(StreamEvent::Finish(Status::ok()));
                let _ = self.events.send(StreamEvent::Finish(Status::ok()));
            }

            fn terminate(&mut self) {}
        }

        let (tx, rx) = event_channel();
        let call = StreamingCall::spawn(DoubleFinishDriver { events: tx }, rx, "Q");
        let _ = call.outcome().await;
    }
}
