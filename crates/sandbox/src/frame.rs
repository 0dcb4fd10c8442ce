//! Multiplexed exec stream framing.
//!
//! A non-TTY exec stream interleaves stdout and stderr. Each frame carries an
//! 8 byte header followed by the payload:
//!
//! ```text
//! [stream: u8][0u8; 3][length: u32 big-endian][payload; length]
//! ```
//!
//! `FrameCodec` decodes raw streams of this shape. The Docker runtime receives
//! already-demultiplexed chunks from bollard and converts them with
//! `Frame::from(LogOutput)`, so both paths yield the same `Frame` values.

use std::pin::Pin;

use bollard::container::LogOutput;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{BytesCodec, Decoder, Encoder, FramedRead};

use shellpilot_core::{Error, Result};

/// Size of the frame header in bytes.
pub const HEADER_LEN: usize = 8;

/// Which stream a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
    /// Raw TTY output; not multiplexed.
    Console,
}

impl StreamKind {
    fn from_header(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Stdin),
            1 => Some(Self::Stdout),
            2 => Some(Self::Stderr),
            _ => None,
        }
    }

    fn header_byte(self) -> u8 {
        match self {
            Self::Stdin => 0,
            Self::Stdout | Self::Console => 1,
            Self::Stderr => 2,
        }
    }
}

/// One chunk of exec output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: StreamKind,
    pub payload: Bytes,
}

impl Frame {
    pub fn stdout(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: StreamKind::Stdout,
            payload: payload.into(),
        }
    }

    pub fn stderr(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: StreamKind::Stderr,
            payload: payload.into(),
        }
    }
}

impl From<LogOutput> for Frame {
    fn from(output: LogOutput) -> Self {
        match output {
            LogOutput::StdIn { message } => Self {
                kind: StreamKind::Stdin,
                payload: message,
            },
            LogOutput::StdOut { message } => Self::stdout(message),
            LogOutput::StdErr { message } => Self::stderr(message),
            LogOutput::Console { message } => Self {
                kind: StreamKind::Console,
                payload: message,
            },
        }
    }
}

/// Codec for the 8 byte header framing.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::io::Result<Option<Frame>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let kind = StreamKind::from_header(src[0]).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown stream id {}", src[0]),
            )
        })?;
        let len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(len).freeze();
        Ok(Some(Frame { kind, payload }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = std::io::Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> std::io::Result<()> {
        dst.reserve(HEADER_LEN + frame.payload.len());
        dst.put_u8(frame.kind.header_byte());
        dst.put_slice(&[0, 0, 0]);
        dst.put_u32(frame.payload.len() as u32);
        dst.put_slice(&frame.payload);
        Ok(())
    }
}

/// Output half of an attached exec.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame>> + Send>>;

/// Input half of an attached exec.
pub type ExecInput = Pin<Box<dyn AsyncWrite + Send>>;

/// A process inside the container with its stdin and output attached.
pub struct AttachedStream {
    pub exec_id: String,
    pub output: FrameStream,
    pub input: ExecInput,
}

impl AttachedStream {
    /// Wrap a raw multiplexed byte stream.
    pub fn from_multiplexed<R, W>(exec_id: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        let output = FramedRead::new(reader, FrameCodec).map(|item| {
            item.map_err(|e| Error::protocol_desync(format!("malformed exec frame: {}", e)))
        });
        Self {
            exec_id: exec_id.into(),
            output: Box::pin(output),
            input: Box::pin(writer),
        }
    }

    /// Wrap a raw TTY byte stream; every chunk becomes a `Console` frame.
    pub fn from_tty<R, W>(exec_id: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        let output = FramedRead::new(reader, BytesCodec::new()).map(|item| {
            item.map(|bytes| Frame {
                kind: StreamKind::Console,
                payload: bytes.freeze(),
            })
            .map_err(|e| Error::container(format!("terminal read failed: {}", e)))
        });
        Self {
            exec_id: exec_id.into(),
            output: Box::pin(output),
            input: Box::pin(writer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(kind: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![kind, 0, 0, 0];
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn test_decode_waits_for_full_frame() {
        let mut codec = FrameCodec;
        let bytes = raw(1, b"hello\n");

        let mut buf = BytesMut::from(&bytes[..5]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&bytes[5..10]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&bytes[10..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame, Frame::stdout(&b"hello\n"[..]));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_back_to_back_frames() {
        let mut codec = FrameCodec;
        let mut bytes = raw(1, b"out");
        bytes.extend(raw(2, b"err"));
        let mut buf = BytesMut::from(&bytes[..]);

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().kind, StreamKind::Stdout);
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.kind, StreamKind::Stderr);
        assert_eq!(&second.payload[..], b"err");
    }

    #[test]
    fn test_unknown_stream_id_is_rejected() {
        let mut buf = BytesMut::from(&raw(7, b"x")[..]);
        assert!(FrameCodec.decode(&mut buf).is_err());
    }

    #[test]
    fn test_encoder_writes_header() {
        let mut buf = BytesMut::new();
        FrameCodec.encode(Frame::stderr(&b"abc"[..]), &mut buf).unwrap();
        assert_eq!(&buf[..], &raw(2, b"abc")[..]);
    }

    #[test]
    fn test_log_output_conversion() {
        let frame = Frame::from(LogOutput::StdErr {
            message: Bytes::from_static(b"oops"),
        });
        assert_eq!(frame.kind, StreamKind::Stderr);
    }

    #[tokio::test]
    async fn test_from_multiplexed_over_duplex() {
        use tokio::io::AsyncWriteExt;

        let (mut remote, local) = tokio::io::duplex(64);
        let (_reader, writer) = tokio::io::split(tokio::io::duplex(8).0);
        let mut attached = AttachedStream::from_multiplexed("exec-1", local, writer);

        remote.write_all(&raw(1, b"a")).await.unwrap();
        remote.write_all(&raw(2, b"b")).await.unwrap();
        drop(remote);

        let first = attached.output.next().await.unwrap().unwrap();
        let second = attached.output.next().await.unwrap().unwrap();
        assert_eq!(first, Frame::stdout(&b"a"[..]));
        assert_eq!(second, Frame::stderr(&b"b"[..]));
        assert!(attached.output.next().await.is_none());
    }
}
