//! Core library for streamfold
//!
//! Adapts a bidirectional message stream into a single-request,
//! single-result call:
//! - `rpc`: status model, driver seam, the streaming reader, and the async
//!   call front end with its registry
//! - `transport`: concrete stream drivers (in-process loopback, framed I/O)

pub mod rpc;
pub mod transport;

pub use rpc::{
    CallCancellation, CallId, CallRegistry, Code, CompletionResult, RegisteredCall, Status,
    StreamDriver, StreamEvent, StreamObserver, StreamingCall, StreamingReader,
};
