//! Stream drivers
//!
//! - `loopback`: in-process driver paired with a scriptable peer
//! - `wire`: frame codec for byte streams
//! - `framed`: driver and server-side responder over any async byte stream

pub mod framed;
pub mod loopback;
pub mod wire;

pub use framed::{connect, FramedDriver, FramedResponder};
pub use loopback::{LoopbackDriver, LoopbackError, LoopbackPeer};
pub use wire::{Frame, WireError};
