//! The tracker's built-in commands.

use std::time::{SystemTime, UNIX_EPOCH};

use cairn_core::wire::COMMAND_PREFIX;
use cairn_core::Response;

use crate::registry::{FileRegistry, RegistryError};
use crate::service::{CommandContext, CommandError, CommandService};
use crate::store::{FileStore, StoreError};

fn required<'a>(
    params: &[&'a str],
    service: &dyn CommandService,
) -> Result<&'a str, CommandError> {
    params
        .first()
        .copied()
        .ok_or_else(|| CommandError::Usage(service.usage().to_string()))
}

// ── ping ─────────────────────────────────────────────────────────────────────

/// Returns the tracker's clock so the client can measure round-trip time.
pub struct PingCommand;

impl CommandService for PingCommand {
    fn name(&self) -> &'static str {
        "ping"
    }

    fn usage(&self) -> &'static str {
        "SYNTAX: /ping"
    }

    fn handle(&self, _ctx: &CommandContext, _params: &[&str]) -> Result<Response, CommandError> {
        let epoch_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Ok(Response::Pong { epoch_secs })
    }
}

// ── addfile ──────────────────────────────────────────────────────────────────

pub struct AddFileCommand {
    registry: FileRegistry,
}

impl AddFileCommand {
    pub fn new(registry: FileRegistry) -> Self {
        Self { registry }
    }
}

impl CommandService for AddFileCommand {
    fn name(&self) -> &'static str {
        "addfile"
    }

    fn usage(&self) -> &'static str {
        "SYNTAX: /addfile [File Name]"
    }

    fn handle(&self, ctx: &CommandContext, params: &[&str]) -> Result<Response, CommandError> {
        let file = required(params, self)?;
        match self.registry.register(ctx.peer, file) {
            Ok(()) => Ok(Response::text(format!(
                "You have added the file '{file}' to the server tracker."
            ))),
            Err(RegistryError::Duplicate { peer, .. }) => {
                tracing::info!(%peer, file, "duplicate registration ignored");
                Err(CommandError::Duplicate(format!(
                    "You have already added the file '{file}' to the server tracker."
                )))
            }
        }
    }
}

// ── findfile ─────────────────────────────────────────────────────────────────

pub struct FindFileCommand {
    registry: FileRegistry,
}

impl FindFileCommand {
    pub fn new(registry: FileRegistry) -> Self {
        Self { registry }
    }
}

impl CommandService for FindFileCommand {
    fn name(&self) -> &'static str {
        "findfile"
    }

    fn usage(&self) -> &'static str {
        "SYNTAX: /findfile [File Name]"
    }

    fn handle(&self, _ctx: &CommandContext, params: &[&str]) -> Result<Response, CommandError> {
        let file = required(params, self)?;
        let peers = self.registry.find_peers_with_file(file);
        if peers.is_empty() {
            return Err(CommandError::NotFound(format!(
                "The file '{file}' is not held by any connected peer."
            )));
        }
        tracing::debug!(file, holders = peers.len(), "file located");
        Ok(Response::Peers(peers))
    }
}

// ── fetchfile ────────────────────────────────────────────────────────────────

pub struct FetchFileCommand {
    store: FileStore,
}

impl FetchFileCommand {
    pub fn new(store: FileStore) -> Self {
        Self { store }
    }
}

impl CommandService for FetchFileCommand {
    fn name(&self) -> &'static str {
        "fetchfile"
    }

    fn usage(&self) -> &'static str {
        "SYNTAX: /fetchfile [File Name]"
    }

    fn handle(&self, ctx: &CommandContext, params: &[&str]) -> Result<Response, CommandError> {
        let file = required(params, self)?;
        match self.store.get(file) {
            Ok(Some(data)) => {
                tracing::info!(peer = %ctx.peer, file, bytes = data.len(), "serving file");
                Ok(Response::File {
                    name: file.to_string(),
                    data,
                })
            }
            Ok(None) => Err(CommandError::NotFound(format!(
                "No file with the name '{file}' available on the server."
            ))),
            Err(StoreError::InvalidName(name)) => Err(CommandError::Usage(format!(
                "'{name}' is not a valid file name. {}",
                self.usage()
            ))),
            Err(e) => {
                tracing::warn!(peer = %ctx.peer, file, error = %e, "failed to read stored file");
                Err(CommandError::Io(format!("Could not read '{file}' on the server.")))
            }
        }
    }
}

// ── help ─────────────────────────────────────────────────────────────────────

/// Lists the registered commands. The list is fixed when the command is
/// built.
pub struct HelpCommand {
    listing: String,
}

impl HelpCommand {
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let names: Vec<String> = names
            .into_iter()
            .map(|n| format!("{COMMAND_PREFIX}{n}"))
            .collect();
        Self {
            listing: format!("Available Commands: {}", names.join(", ")),
        }
    }
}

impl CommandService for HelpCommand {
    fn name(&self) -> &'static str {
        "help"
    }

    fn usage(&self) -> &'static str {
        "SYNTAX: /help"
    }

    fn handle(&self, _ctx: &CommandContext, _params: &[&str]) -> Result<Response, CommandError> {
        Ok(Response::text(self.listing.clone()))
    }
}
