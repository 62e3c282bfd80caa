//! Streaming-response calls
//!
//! One request goes out once the stream is ready; every response chunk is
//! buffered until the stream finishes, then the caller gets exactly one
//! result: all chunks, or the failure status.

pub mod call;
pub mod cancellation;
pub mod driver;
pub mod reader;
pub mod registry;
pub mod status;

pub use call::StreamingCall;
pub use cancellation::CallCancellation;
pub use driver::{
    event_channel, EventReceiver, EventSender, StreamDriver, StreamEvent, StreamObserver,
};
pub use reader::{CompletionResult, StreamingReader};
pub use registry::{CallId, CallRegistry, RegisteredCall};
pub use status::{Code, Status};
