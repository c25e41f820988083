//! Routes command lines to the command service that handles them.

use std::collections::HashMap;
use std::sync::Arc;

use cairn_core::wire::COMMAND_PREFIX;
use cairn_core::Response;
use cairn_services::{
    AddFileCommand, CommandContext, CommandError, CommandService, FetchFileCommand,
    FileRegistry, FileStore, FindFileCommand, HelpCommand, PingCommand,
};

const INVALID_COMMAND: &str = "Invalid command specified.";

/// Maps command names to services and dispatches command lines.
pub struct CommandDispatcher {
    /// name -> service.
    commands: HashMap<&'static str, Arc<dyn CommandService>>,
    /// Registration order, for `help`.
    order: Vec<&'static str>,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// The tracker's standard command set: ping, addfile, findfile,
    /// fetchfile, help.
    pub fn standard(registry: FileRegistry, store: FileStore) -> Self {
        let mut d = Self::new();
        d.register(Arc::new(PingCommand));
        d.register(Arc::new(AddFileCommand::new(registry.clone())));
        d.register(Arc::new(FindFileCommand::new(registry)));
        d.register(Arc::new(FetchFileCommand::new(store)));
        d.register_help();
        d
    }

    /// Register a service. A later service with the same name replaces the
    /// earlier one but keeps its position in the help listing.
    pub fn register(&mut self, service: Arc<dyn CommandService>) {
        let name = service.name();
        if self.commands.insert(name, service).is_none() {
            self.order.push(name);
        }
    }

    /// Register `help` listing every command registered so far plus itself.
    pub fn register_help(&mut self) {
        let names: Vec<&str> = self
            .order
            .iter()
            .copied()
            .filter(|n| *n != "help")
            .chain(std::iter::once("help"))
            .collect();
        self.register(Arc::new(HelpCommand::new(names)));
    }

    /// Registered command names in registration order.
    pub fn names(&self) -> &[&'static str] {
        &self.order
    }

    /// Parse and run one command line (prefix included).
    ///
    /// The first whitespace-separated token names the command; the rest are
    /// passed to it verbatim. Arity is the handler's concern.
    pub fn dispatch(&self, ctx: &CommandContext, line: &str) -> Result<Response, CommandError> {
        let Some(body) = line.strip_prefix(COMMAND_PREFIX) else {
            return Err(CommandError::Usage(INVALID_COMMAND.to_string()));
        };

        let mut tokens = body.split_whitespace();
        let Some(name) = tokens.next() else {
            return Err(CommandError::Usage(INVALID_COMMAND.to_string()));
        };
        let params: Vec<&str> = tokens.collect();

        tracing::debug!(peer = %ctx.peer, command = name, ?params, "command received");

        match self.commands.get(name) {
            Some(service) => service.handle(ctx, &params),
            None => Err(CommandError::Usage(INVALID_COMMAND.to_string())),
        }
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
