//! Cairn wire format — on-wire types for tracker/peer communication.
//!
//! Every message on a Cairn connection is a frame: a fixed 8-byte header
//! followed by `length` payload bytes. The header is the only structure the
//! transport inspects; payload interpretation belongs to the frame kind.
//!
//! Integer fields are little-endian on the wire regardless of host order.
//! The header uses zerocopy derives for allocation-free (de)serialization.
//! There is no unsafe code in this module.

use bytes::Bytes;
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{LittleEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Frame Header ─────────────────────────────────────────────────────────────

/// Precedes every payload on a Cairn connection.
///
/// Wire size: 8 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct FrameHeader {
    /// Frame kind, see [`FrameKind`].
    pub kind: u8,

    /// Wire format version. Currently 0x01.
    /// A receiver seeing an unknown version drops the connection.
    pub version: u8,

    /// Reserved, must be zero.
    pub flags: U16<LittleEndian>,

    /// Length of the payload in bytes, not including this header.
    pub length: U32<LittleEndian>,
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(FrameHeader, [u8; 8]);

impl FrameHeader {
    pub fn new(kind: FrameKind, length: u32) -> Self {
        Self {
            kind: kind.into(),
            version: FRAME_VERSION,
            flags: U16::new(0),
            length: U32::new(length),
        }
    }

    /// Check version, flags and length. Returns the declared payload length.
    pub fn validate(&self) -> Result<usize, WireError> {
        if self.version != FRAME_VERSION {
            return Err(WireError::UnknownVersion(self.version));
        }
        let flags = self.flags.get();
        if flags != 0 {
            return Err(WireError::ReservedFlagsSet(flags));
        }
        let length = self.length.get() as usize;
        if length > MAX_FRAME_PAYLOAD {
            return Err(WireError::PayloadTooLarge(length));
        }
        Ok(length)
    }
}

// ── Frame Kind ───────────────────────────────────────────────────────────────

/// What a frame's payload carries.
///
/// `Command` flows client → tracker. Everything else is a response
/// (tracker → client). A file response is `FileBegin`, zero or more
/// `FileBlock`, then `FileEnd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// Integrity envelope wrapping a raw command line.
    Command = 0x01,

    /// Free-form UTF-8 text.
    Text = 0x10,

    /// 8-byte little-endian f64: tracker epoch seconds.
    Pong = 0x11,

    /// 8-byte little-endian total length, then the UTF-8 file name.
    FileBegin = 0x12,

    /// Raw file bytes.
    FileBlock = 0x13,

    /// Terminates a file response. Empty payload.
    FileEnd = 0x14,

    /// 1-byte [`ErrorKind`], then a UTF-8 message.
    Error = 0x15,

    /// Newline-separated `host:port` peer identities.
    Peers = 0x16,
}

impl TryFrom<u8> for FrameKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, WireError> {
        match value {
            0x01 => Ok(FrameKind::Command),
            0x10 => Ok(FrameKind::Text),
            0x11 => Ok(FrameKind::Pong),
            0x12 => Ok(FrameKind::FileBegin),
            0x13 => Ok(FrameKind::FileBlock),
            0x14 => Ok(FrameKind::FileEnd),
            0x15 => Ok(FrameKind::Error),
            0x16 => Ok(FrameKind::Peers),
            other => Err(WireError::UnknownFrameKind(other)),
        }
    }
}

impl From<FrameKind> for u8 {
    fn from(k: FrameKind) -> u8 {
        k as u8
    }
}

// ── Error Kind ───────────────────────────────────────────────────────────────

/// Class of a failed request, carried in `Error` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorKind {
    /// Envelope digest mismatch or malformed envelope. Request discarded.
    Protocol = 0x01,
    /// Unknown command or missing/invalid parameters.
    Usage = 0x02,
    /// File or peer absent.
    NotFound = 0x03,
    /// Re-registration of an already known file.
    Duplicate = 0x04,
    /// Filesystem failure while serving the request.
    Io = 0x05,
}

impl TryFrom<u8> for ErrorKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, WireError> {
        match value {
            0x01 => Ok(ErrorKind::Protocol),
            0x02 => Ok(ErrorKind::Usage),
            0x03 => Ok(ErrorKind::NotFound),
            0x04 => Ok(ErrorKind::Duplicate),
            0x05 => Ok(ErrorKind::Io),
            other => Err(WireError::UnknownErrorKind(other)),
        }
    }
}

impl From<ErrorKind> for u8 {
    fn from(k: ErrorKind) -> u8 {
        k as u8
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Protocol => "protocol",
            ErrorKind::Usage => "usage",
            ErrorKind::NotFound => "not found",
            ErrorKind::Duplicate => "duplicate",
            ErrorKind::Io => "io",
        };
        f.write_str(name)
    }
}

// ── Frame ────────────────────────────────────────────────────────────────────

/// A decoded frame: validated kind plus its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: FrameKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }
}

// ── Constants ────────────────────────────────────────────────────────────────

/// Current frame format version.
pub const FRAME_VERSION: u8 = 0x01;

/// Size of [`FrameHeader`] on the wire.
pub const FRAME_HEADER_LEN: usize = std::mem::size_of::<FrameHeader>();

/// Maximum payload of a single frame. File contents larger than this are
/// streamed as multiple `FileBlock` frames.
pub const MAX_FRAME_PAYLOAD: usize = 1024 * 1024;

/// Prefix that marks a command line as a tracker command.
pub const COMMAND_PREFIX: char = '/';

/// Raw payload that ends a session. Sent without the command prefix.
pub const EXIT_SENTINEL: &str = "exit";

// ── Errors ───────────────────────────────────────────────────────────────────

/// Errors that can arise when reading or interpreting wire-format data.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("unknown frame kind: 0x{0:02x}")]
    UnknownFrameKind(u8),

    #[error("unknown frame version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("unknown error kind: 0x{0:02x}")]
    UnknownErrorKind(u8),

    #[error("payload length {0} exceeds maximum {}", MAX_FRAME_PAYLOAD)]
    PayloadTooLarge(usize),

    #[error("reserved flags are non-zero: 0x{0:04x}")]
    ReservedFlagsSet(u16),

    #[error("malformed {kind:?} payload: {reason}")]
    MalformedPayload { kind: FrameKind, reason: String },

    #[error("unexpected {0:?} frame")]
    UnexpectedFrame(FrameKind),

    #[error("file transfer announced {expected} bytes, received {received}")]
    TransferLength { expected: u64, received: u64 },

    #[error("connection closed mid-message")]
    ConnectionClosed,

    #[error("transport i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_header_round_trip() {
        let original = FrameHeader::new(FrameKind::FileBlock, 0x0102_0304);

        let bytes = original.as_bytes();
        assert_eq!(bytes.len(), FRAME_HEADER_LEN);
        // Little-endian length regardless of host.
        assert_eq!(&bytes[4..8], &[0x04, 0x03, 0x02, 0x01]);

        let recovered = FrameHeader::read_from(bytes).unwrap();
        assert_eq!(recovered.kind, FrameKind::FileBlock as u8);
        assert_eq!(recovered.version, FRAME_VERSION);
        assert_eq!(recovered.length.get(), 0x0102_0304);
    }

    #[test]
    fn validate_rejects_unknown_version() {
        let mut header = FrameHeader::new(FrameKind::Text, 4);
        header.version = 0x07;
        assert!(matches!(header.validate(), Err(WireError::UnknownVersion(0x07))));
    }

    #[test]
    fn validate_rejects_reserved_flags() {
        let mut header = FrameHeader::new(FrameKind::Text, 4);
        header.flags = U16::new(0x8000);
        assert!(matches!(header.validate(), Err(WireError::ReservedFlagsSet(0x8000))));
    }

    #[test]
    fn validate_rejects_oversized_payload() {
        let header = FrameHeader::new(FrameKind::FileBlock, (MAX_FRAME_PAYLOAD + 1) as u32);
        assert!(matches!(header.validate(), Err(WireError::PayloadTooLarge(_))));
    }

    #[test]
    fn frame_kind_round_trip() {
        for kind in [
            FrameKind::Command,
            FrameKind::Text,
            FrameKind::Pong,
            FrameKind::FileBegin,
            FrameKind::FileBlock,
            FrameKind::FileEnd,
            FrameKind::Error,
            FrameKind::Peers,
        ] {
            assert_eq!(FrameKind::try_from(u8::from(kind)).unwrap(), kind);
        }
        assert!(FrameKind::try_from(0x00).is_err());
        assert!(FrameKind::try_from(0xff).is_err());
    }

    #[test]
    fn unknown_frame_kind_error_message() {
        let err = FrameKind::try_from(0xAB).unwrap_err();
        assert!(err.to_string().contains("0xab"));
    }

    #[test]
    fn error_kind_round_trip() {
        assert_eq!(ErrorKind::try_from(0x03).unwrap(), ErrorKind::NotFound);
        assert_eq!(u8::from(ErrorKind::Duplicate), 0x04);
        assert!(ErrorKind::try_from(0x00).is_err());
    }
}
