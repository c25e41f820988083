//! Service trait for tracker commands.
//!
//! Every tracker command is a `CommandService`. This trait is the contract
//! between the daemon (which parses command lines and owns sessions) and
//! the command logic (which reads and mutates tracker state).

use cairn_core::{ErrorKind, PeerIdentity, Response};

/// Who is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandContext {
    pub peer: PeerIdentity,
}

/// A failed command. Always reported to the peer; never ends the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Duplicate(String),

    #[error("{0}")]
    Io(String),
}

impl CommandError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::Usage(_) => ErrorKind::Usage,
            CommandError::NotFound(_) => ErrorKind::NotFound,
            CommandError::Duplicate(_) => ErrorKind::Duplicate,
            CommandError::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<CommandError> for Response {
    fn from(e: CommandError) -> Self {
        Response::error(e.kind(), e.to_string())
    }
}

/// A named tracker command.
///
/// Handlers receive parameters verbatim and check their own arity: with
/// too few parameters they return [`CommandError::Usage`] carrying
/// [`CommandService::usage`].
pub trait CommandService: Send + Sync {
    /// Name as typed after the command prefix. Case-sensitive.
    fn name(&self) -> &'static str;

    /// Syntax line, e.g. `SYNTAX: /addfile [File Name]`.
    fn usage(&self) -> &'static str;

    /// Run the command for `ctx.peer`.
    fn handle(&self, ctx: &CommandContext, params: &[&str]) -> Result<Response, CommandError>;
}
