//! Stream driver seam
//!
//! A driver owns the connection-level side of one bidirectional stream. Its
//! operations only request work; results come back later as `StreamEvent`s
//! pushed through the event channel the driver was built with.

use bytes::Bytes;
use tokio::sync::mpsc;

use super::status::Status;

/// Operations a reader needs from its transport
pub trait StreamDriver: Send {
    /// Begin the stream. Readiness is reported with `StreamEvent::Start`.
    fn start(&mut self);

    /// Send one message and half-close the client side of the stream
    fn write_last(&mut self, message: Bytes);

    /// Ask the stream to end early. The driver still reports exactly one
    /// `StreamEvent::Finish`, unless it has already done so.
    fn terminate(&mut self);
}

impl<D: StreamDriver + ?Sized> StreamDriver for Box<D> {
    fn start(&mut self) {
        (**self).start();
    }

    fn write_last(&mut self, message: Bytes) {
        (**self).write_last(message);
    }

    fn terminate(&mut self) {
        (**self).terminate();
    }
}

/// Events a driver delivers back to its reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Stream is ready to carry data
    Start,
    /// One inbound message
    Read(Bytes),
    /// Stream is over; delivered once per stream
    Finish(Status),
}

impl StreamEvent {
    /// Hand this event to the matching observer callback
    pub fn dispatch_to<O: StreamObserver + ?Sized>(self, observer: &mut O) {
        match self {
            StreamEvent::Start => observer.on_stream_start(),
            StreamEvent::Read(message) => observer.on_stream_read(message),
            StreamEvent::Finish(status) => observer.on_stream_finish(status),
        }
    }

    pub fn is_finish(&self) -> bool {
        matches!(self, StreamEvent::Finish(_))
    }
}

/// Callback surface driven by stream events
pub trait StreamObserver {
    fn on_stream_start(&mut self);
    fn on_stream_read(&mut self, message: Bytes);
    fn on_stream_finish(&mut self, status: Status);
}

pub type EventSender = mpsc::UnboundedSender<StreamEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<StreamEvent>;

/// Create the channel a driver uses to report events
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
