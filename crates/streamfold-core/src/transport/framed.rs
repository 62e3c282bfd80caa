//! Framed stream driver over any async byte stream
//!
//! The client side writes its request as a `message` frame followed by an
//! `end` frame, then reads `message` frames until the peer's `status` frame.
//! `FramedResponder` is the matching server side.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, BufReader, ReadHalf, WriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::wire::{read_frame, write_frame, Frame, WireError};
use crate::rpc::driver::{event_channel, EventReceiver, EventSender, StreamDriver, StreamEvent};
use crate::rpc::status::Status;

/// Connect over TCP and build a driver for one call
pub async fn connect<A: ToSocketAddrs>(
    addr: A,
) -> std::io::Result<(FramedDriver<TcpStream>, EventReceiver)> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    let (events_tx, events_rx) = event_channel();
    Ok((FramedDriver::new(stream, events_tx), events_rx))
}

/// Client-side driver. All I/O runs on a task spawned by `start`.
pub struct FramedDriver<T> {
    io: Option<T>,
    events: EventSender,
    request: Option<oneshot::Sender<Bytes>>,
    token: CancellationToken,
}

impl<T> FramedDriver<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(io: T, events: EventSender) -> Self {
        Self {
            io: Some(io),
            events,
            request: None,
            token: CancellationToken::new(),
        }
    }
}

impl<T> StreamDriver for FramedDriver<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    fn start(&mut self) {
        let Some(io) = self.io.take() else {
            warn!("FramedDriver: start called more than once");
            return;
        };
        let (request_tx, request_rx) = oneshot::channel();
        self.request = Some(request_tx);
        tokio::spawn(run_stream(
            io,
            request_rx,
            self.events.clone(),
            self.token.clone(),
        ));
    }

    fn write_last(&mut self, message: Bytes) {
        match self.request.take() {
            Some(tx) => {
                let _ = tx.send(message);
            }
            None => warn!("FramedDriver: write_last without a running stream"),
        }
    }

    fn terminate(&mut self) {
        debug!("FramedDriver: terminate requested");
        self.token.cancel();
    }
}

impl<T> Drop for FramedDriver<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// The single task that owns the connection and is the only source of events
async fn run_stream<T>(
    io: T,
    request_rx: oneshot::Receiver<Bytes>,
    events: EventSender,
    token: CancellationToken,
) where
    T: AsyncRead + AsyncWrite + Send,
{
    let finish = |status: Status| {
        let _ = events.send(StreamEvent::Finish(status));
    };

    if token.is_cancelled() {
        finish(Status::cancelled("call cancelled by client"));
        return;
    }

    let (read_half, mut write_half) = tokio::io::split(io);
    let mut reader = BufReader::new(read_half);
    let _ = events.send(StreamEvent::Start);

    let request = tokio::select! {
        biased;
        _ = token.cancelled() => {
            finish(Status::cancelled("call cancelled by client"));
            return;
        }
        request = request_rx => match request {
            Ok(request) => request,
            Err(_) => {
                finish(Status::cancelled("driver dropped before sending the request"));
                return;
            }
        },
    };

    let sent = tokio::select! {
        biased;
        _ = token.cancelled() => {
            finish(Status::cancelled("call cancelled by client"));
            return;
        }
        sent = send_request(&mut write_half, request) => sent,
    };
    if let Err(e) = sent {
        warn!(error = %e, "FramedDriver: failed to send request");
        finish(Status::unavailable(format!("failed to send request: {e}")));
        return;
    }

    let mut received = 0usize;
    loop {
        let frame = tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!(received, "FramedDriver: call cancelled");
                finish(Status::cancelled("call cancelled by client"));
                return;
            }
            frame = read_frame(&mut reader) => frame,
        };

        match frame {
            Ok(Some(Frame::Message(message))) => {
                received += 1;
                let _ = events.send(StreamEvent::Read(message));
            }
            Ok(Some(Frame::End)) => {
                debug!("FramedDriver: peer half-closed, waiting for status");
            }
            Ok(Some(Frame::Status(status))) => {
                debug!(received, code = %status.code(), "FramedDriver: status received");
                finish(status);
                return;
            }
            Ok(None) => {
                warn!(received, "FramedDriver: connection closed before a status");
                finish(Status::unavailable("connection closed before a status"));
                return;
            }
            Err(e) => {
                warn!(received, error = %e, "FramedDriver: failed to read frame");
                finish(Status::internal(format!("failed to read frame: {e}")));
                return;
            }
        }
    }
}

async fn send_request<W>(writer: &mut W, request: Bytes) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    write_frame(writer, &Frame::Message(request)).await?;
    write_frame(writer, &Frame::End).await
}

/// Server side of a framed call
pub struct FramedResponder<T> {
    reader: BufReader<ReadHalf<T>>,
    writer: WriteHalf<T>,
}

impl<T> FramedResponder<T>
where
    T: AsyncRead + AsyncWrite,
{
    pub fn new(io: T) -> Self {
        let (read_half, write_half) = tokio::io::split(io);
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    /// Read the client's request and its half-close
    pub async fn read_request(&mut self) -> Result<Bytes, WireError> {
        let request = match read_frame(&mut self.reader).await? {
            Some(Frame::Message(request)) => request,
            Some(other) => return Err(WireError::UnexpectedFrame(other.kind())),
            None => return Err(WireError::Closed),
        };
        match read_frame(&mut self.reader).await? {
            Some(Frame::End) => Ok(request),
            Some(other) => Err(WireError::UnexpectedFrame(other.kind())),
            None => Err(WireError::Truncated),
        }
    }

    /// Send one response message
    pub async fn send(&mut self, message: impl Into<Bytes>) -> Result<(), WireError> {
        write_frame(&mut self.writer, &Frame::Message(message.into())).await
    }

    /// End the call with `status` and close the write side
    pub async fn finish(mut self, status: Status) -> Result<(), WireError> {
        use tokio::io::AsyncWriteExt;

        write_frame(&mut self.writer, &Frame::Status(status)).await?;
        self.writer.shutdown().await?;
        Ok(())
    }
}
