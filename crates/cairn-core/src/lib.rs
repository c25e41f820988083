//! cairn-core — wire format, integrity envelope, and shared types.
//! All other Cairn crates depend on this one.

pub mod config;
pub mod envelope;
pub mod peer;
pub mod response;
pub mod transport;
pub mod wire;

pub use peer::PeerIdentity;
pub use response::Response;
pub use wire::{ErrorKind, Frame, FrameKind, WireError};
