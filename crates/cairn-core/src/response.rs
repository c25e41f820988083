//! Typed tracker responses and their frame encoding.
//!
//! Responses are decoded from the frame kind, never by sniffing the text.
//! File contents travel as raw bytes inside `FileBlock` frames.

use bytes::{BufMut, Bytes, BytesMut};

use crate::peer::PeerIdentity;
use crate::wire::{ErrorKind, Frame, FrameKind, WireError};

/// A single response to a single command.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Human-readable text.
    Text(String),

    /// Tracker clock at the time the ping was served.
    Pong { epoch_secs: f64 },

    /// Peers holding a file, in registry order. Never empty.
    Peers(Vec<PeerIdentity>),

    /// Full contents of a file from the tracker's store.
    File { name: String, data: Bytes },

    /// The request failed; the session continues.
    Error { kind: ErrorKind, message: String },
}

impl Response {
    pub fn text(message: impl Into<String>) -> Self {
        Response::Text(message.into())
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Response::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }

    /// Encode a non-file response as one frame.
    ///
    /// File responses are streamed by [`crate::transport::send_response`]
    /// and have no single-frame form.
    pub fn to_frame(&self) -> Option<Frame> {
        let frame = match self {
            Response::Text(text) => Frame::new(FrameKind::Text, Bytes::copy_from_slice(text.as_bytes())),
            Response::Pong { epoch_secs } => {
                Frame::new(FrameKind::Pong, Bytes::copy_from_slice(&epoch_secs.to_le_bytes()))
            }
            Response::Peers(peers) => {
                let lines: Vec<String> = peers.iter().map(ToString::to_string).collect();
                Frame::new(FrameKind::Peers, lines.join("\n").into_bytes())
            }
            Response::Error { kind, message } => {
                let mut buf = BytesMut::with_capacity(1 + message.len());
                buf.put_u8((*kind).into());
                buf.put_slice(message.as_bytes());
                Frame::new(FrameKind::Error, buf.freeze())
            }
            Response::File { .. } => return None,
        };
        Some(frame)
    }

    /// Decode a single-frame response.
    pub fn from_frame(frame: &Frame) -> Result<Self, WireError> {
        match frame.kind {
            FrameKind::Text => Ok(Response::Text(utf8(frame.kind, &frame.payload)?)),
            FrameKind::Pong => {
                let bytes: [u8; 8] = frame.payload[..]
                    .try_into()
                    .map_err(|_| malformed(frame.kind, "expected 8 bytes"))?;
                Ok(Response::Pong {
                    epoch_secs: f64::from_le_bytes(bytes),
                })
            }
            FrameKind::Peers => {
                let text = utf8(frame.kind, &frame.payload)?;
                let peers = text
                    .lines()
                    .map(|line| {
                        line.parse::<PeerIdentity>()
                            .map_err(|e| malformed(frame.kind, &e.to_string()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Response::Peers(peers))
            }
            FrameKind::Error => {
                let (&code, message) = frame
                    .payload
                    .split_first()
                    .ok_or_else(|| malformed(frame.kind, "missing error kind"))?;
                Ok(Response::Error {
                    kind: ErrorKind::try_from(code)?,
                    message: utf8(frame.kind, message)?,
                })
            }
            other => Err(WireError::UnexpectedFrame(other)),
        }
    }
}

/// `FileBegin` payload: total length, then the file name.
pub fn encode_file_begin(name: &str, total_len: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(8 + name.len());
    buf.put_u64_le(total_len);
    buf.put_slice(name.as_bytes());
    buf.freeze()
}

pub fn decode_file_begin(payload: &[u8]) -> Result<(String, u64), WireError> {
    if payload.len() < 8 {
        return Err(malformed(FrameKind::FileBegin, "expected length prefix"));
    }
    let (len_bytes, name) = payload.split_at(8);
    let mut raw = [0u8; 8];
    raw.copy_from_slice(len_bytes);
    Ok((utf8(FrameKind::FileBegin, name)?, u64::from_le_bytes(raw)))
}

fn utf8(kind: FrameKind, bytes: &[u8]) -> Result<String, WireError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| malformed(kind, "invalid utf-8"))
}

fn malformed(kind: FrameKind, reason: &str) -> WireError {
    WireError::MalformedPayload {
        kind,
        reason: reason.to_string(),
    }
}
