//! cairn-ctl — Cairn peer client.
//!
//! A peer connects to the tracker, keeps a workspace directory named after
//! its local port, and runs local chunk commands alongside tracker commands.

pub mod client;
pub mod shell;
pub mod workspace;

pub use client::TrackerClient;
pub use shell::Input;
pub use workspace::{PeerWorkspace, WorkspaceError};
