//! Frame codec - header-framed messages over a byte stream
//!
//! ```text
//! Frame-Type: message|end|status
//! Status-Code: 14          (status frames only)
//! Content-Length: 5
//!
//! <body>
//! ```
//!
//! A status frame carries the status message as its body.

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::rpc::status::{Code, Status};

const FRAME_TYPE: &str = "Frame-Type: ";
const STATUS_CODE: &str = "Status-Code: ";
const CONTENT_LENGTH: &str = "Content-Length: ";

/// Largest body accepted from the wire
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Longest header or noise line accepted, terminator included
pub const MAX_HEADER_LINE: usize = 8 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection closed in the middle of a frame")]
    Truncated,
    #[error("connection closed before a request was received")]
    Closed,
    #[error("unknown frame type: {0}")]
    UnknownFrameType(String),
    #[error("invalid header value: {0}")]
    InvalidHeader(String),
    #[error("frame header missing Content-Length")]
    MissingLength,
    #[error("status frame missing Status-Code")]
    MissingStatusCode,
    #[error("frame body of {0} bytes exceeds the frame size limit")]
    TooLarge(usize),
    #[error("header line exceeds the line length limit")]
    HeaderTooLong,
    #[error("status message is not valid UTF-8")]
    InvalidStatusMessage,
    #[error("unexpected {0} frame")]
    UnexpectedFrame(&'static str),
}

/// One unit on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Opaque payload
    Message(Bytes),
    /// Sender will write nothing further
    End,
    /// Final status of the call
    Status(Status),
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Message(_) => "message",
            Frame::End => "end",
            Frame::Status(_) => "status",
        }
    }
}

/// Write one frame and flush
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let body: &[u8] = match frame {
        Frame::Message(bytes) => bytes,
        Frame::End => &[],
        Frame::Status(status) => status.message().as_bytes(),
    };

    let mut header = format!("{}{}\r\n", FRAME_TYPE, frame.kind());
    if let Frame::Status(status) = frame {
        header.push_str(&format!("{}{}\r\n", STATUS_CODE, status.code().as_i32()));
    }
    header.push_str(&format!("{}{}\r\n\r\n", CONTENT_LENGTH, body.len()));

    writer.write_all(header.as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. Returns `None` on a clean end of stream between frames.
///
/// Lines before a `Frame-Type` header are skipped, so stray log output on a
/// shared pipe does not break the stream.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, WireError>
where
    R: AsyncBufRead + Unpin,
{
    let mut kind: Option<String> = None;
    let mut content_length: Option<usize> = None;
    let mut status_code: Option<i32> = None;

    loop {
        let mut raw = Vec::new();
        let bytes_read = read_header_line(reader, &mut raw).await?;
        if bytes_read == 0 {
            return if kind.is_none() {
                Ok(None)
            } else {
                Err(WireError::Truncated)
            };
        }

        let line = String::from_utf8_lossy(&raw);
        let line = line.trim();
        if line.is_empty() {
            if kind.is_some() {
                // End of headers
                break;
            }
            continue;
        }

        if let Some(value) = line.strip_prefix(FRAME_TYPE) {
            kind = Some(value.to_string());
        } else if kind.is_none() {
            // Not part of a frame yet
            continue;
        } else if let Some(value) = line.strip_prefix(CONTENT_LENGTH) {
            let length = value
                .parse()
                .map_err(|_| WireError::InvalidHeader(line.to_string()))?;
            content_length = Some(length);
        } else if let Some(value) = line.strip_prefix(STATUS_CODE) {
            let code = value
                .parse()
                .map_err(|_| WireError::InvalidHeader(line.to_string()))?;
            status_code = Some(code);
        }
    }

    let length = content_length.ok_or(WireError::MissingLength)?;
    if length > MAX_FRAME_LEN {
        return Err(WireError::TooLarge(length));
    }
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            WireError::Truncated
        } else {
            WireError::Io(e)
        }
    })?;

    let frame = match kind.as_deref().unwrap_or_default() {
        "message" => Frame::Message(Bytes::from(body)),
        "end" => Frame::End,
        "status" => {
            let code = status_code.ok_or(WireError::MissingStatusCode)?;
            let message = String::from_utf8(body).map_err(|_| WireError::InvalidStatusMessage)?;
            Frame::Status(Status::new(Code::from_i32(code), message))
        }
        other => return Err(WireError::UnknownFrameType(other.to_string())),
    };
    Ok(Some(frame))
}

/// Read up to and including the next newline, refusing to buffer more than
/// `MAX_HEADER_LINE` bytes
async fn read_header_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> Result<usize, WireError>
where
    R: AsyncBufRead + Unpin,
{
    let bytes_read = (&mut *reader)
        .take(MAX_HEADER_LINE as u64)
        .read_until(b'\n', buf)
        .await?;
    if bytes_read == MAX_HEADER_LINE && buf.last() != Some(&b'\n') {
        return Err(WireError::HeaderTooLong);
    }
    Ok(bytes_read)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    async fn decode(raw: &[u8]) -> Result<Option<Frame>, WireError> {
        let mut reader = BufReader::new(raw);
        read_frame(&mut reader).await
    }

    #[tokio::test]
    async fn test_status_frame_layout() {
        let mut out = Vec::new();
        write_frame(&mut out, &Frame::Status(Status::unavailable("down")))
            .await
            .unwrap();

        assert_eq!(
            String::from_utf8(out.clone()).unwrap(),
            "Frame-Type: status\r\nStatus-Code: 14\r\nContent-Length: 4\r\n\r\ndown"
        );
        assert_eq!(
            decode(&out).await.unwrap(),
            Some(Frame::Status(Status::unavailable("down")))
        );
    }

    #[tokio::test]
    async fn test_reads_consecutive_frames() {
        let mut out = Vec::new();
        write_frame(&mut out, &Frame::Message(Bytes::from_static(b"hello")))
            .await
            .unwrap();
        write_frame(&mut out, &Frame::End).await.unwrap();

        let mut reader = BufReader::new(out.as_slice());
        assert_eq!(
            read_frame(&mut reader).await.unwrap(),
            Some(Frame::Message(Bytes::from_static(b"hello")))
        );
        assert_eq!(read_frame(&mut reader).await.unwrap(), Some(Frame::End));
        assert_eq!(read_frame(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_skips_noise_before_frame() {
        let raw = b"starting up...\r\n\r\nFrame-Type: message\r\nContent-Length: 2\r\n\r\nok";
        assert_eq!(
            decode(raw).await.unwrap(),
            Some(Frame::Message(Bytes::from_static(b"ok")))
        );
    }

    #[tokio::test]
    async fn test_missing_content_length() {
        let raw = b"Frame-Type: message\r\n\r\n";
        assert!(matches!(decode(raw).await, Err(WireError::MissingLength)));
    }

    #[tokio::test]
    async fn test_truncated_body() {
        let raw = b"Frame-Type: message\r\nContent-Length: 10\r\n\r\nshort";
        assert!(matches!(decode(raw).await, Err(WireError::Truncated)));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let raw = format!("Frame-Type: message\r\nContent-Length: {}\r\n\r\n", MAX_FRAME_LEN + 1);
        assert!(matches!(
            decode(raw.as_bytes()).await,
            Err(WireError::TooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_frame_type() {
        let raw = b"Frame-Type: ping\r\nContent-Length: 0\r\n\r\n";
        assert!(matches!(
            decode(raw).await,
            Err(WireError::UnknownFrameType(kind)) if kind == "ping"
        ));
    }

    #[tokio::test]
    async fn test_overlong_header_line_rejected() {
        let mut raw = b"Frame-Type: message\r\nX-Pad: ".to_vec();
        raw.extend(std::iter::repeat(b'a').take(MAX_HEADER_LINE * 4));
        raw.extend_from_slice(b"\r\nContent-Length: 2\r\n\r\nok");
        assert!(matches!(decode(&raw).await, Err(WireError::HeaderTooLong)));
    }

    #[tokio::test]
    async fn test_overlong_noise_line_rejected() {
        let mut raw = vec![b'x'; MAX_HEADER_LINE + 1];
        raw.extend_from_slice(b"\nFrame-Type: end\r\nContent-Length: 0\r\n\r\n");
        assert!(matches!(decode(&raw).await, Err(WireError::HeaderTooLong)));
    }

    #[tokio::test]
    async fn test_long_header_within_limit_accepted() {
        let mut raw = b"starting up ".to_vec();
        raw.extend(std::iter::repeat(b'.').take(MAX_HEADER_LINE - 20));
        raw.extend_from_slice(b"\nFrame-Type: end\r\nContent-Length: 0\r\n\r\n");
        assert_eq!(decode(&raw).await.unwrap(), Some(Frame::End));
    }

    #[tokio::test]
    async fn test_invalid_content_length() {
        let raw = b"Frame-Type: message\r\nContent-Length: lots\r\n\r\n";
        assert!(matches!(
            decode(raw).await,
            Err(WireError::InvalidHeader(line)) if line == "Content-Length: lots"
        ));
    }

    #[tokio::test]
    async fn test_invalid_status_code() {
        let raw = b"Frame-Type: status\r\nStatus-Code: bad\r\nContent-Length: 0\r\n\r\n";
        assert!(matches!(
            decode(raw).await,
            Err(WireError::InvalidHeader(line)) if line == "Status-Code: bad"
        ));
    }

    #[tokio::test]
    async fn test_status_frame_requires_code() {
        let raw = b"Frame-Type: status\r\nContent-Length: 0\r\n\r\n";
        assert!(matches!(decode(raw).await, Err(WireError::MissingStatusCode)));
    }
}
