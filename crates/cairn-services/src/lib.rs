//! cairn-services — tracker state and the command handlers that act on it.

pub mod chunk_codec;
pub mod commands;
pub mod registry;
pub mod service;
pub mod store;

pub use chunk_codec::{build, chunk_name, split, ChunkError, ChunkInfo, ChunkSet};
pub use commands::{AddFileCommand, FetchFileCommand, FindFileCommand, HelpCommand, PingCommand};
pub use registry::{FileRegistry, RegistryError};
pub use service::{CommandContext, CommandError, CommandService};
pub use store::{FileStore, StoreError};
