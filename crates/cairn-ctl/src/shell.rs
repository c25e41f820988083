//! Prompt input parsing and response rendering.

use std::time::Duration;

use cairn_core::wire::{COMMAND_PREFIX, EXIT_SENTINEL};
use cairn_core::Response;

pub const LOCAL_HELP: &str = "Local Commands: /split [File Name], /build [File Name], exit";

/// One line typed at the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input<'a> {
    Empty,
    Exit,
    /// Split a workspace file into chunks.
    Split(&'a str),
    /// Rebuild a workspace file from its chunks.
    Build(&'a str),
    /// Local help, followed by the tracker's.
    Help,
    /// A local command typed without its argument.
    Usage(&'static str),
    /// Anything else goes to the tracker verbatim.
    Remote(&'a str),
}

pub fn parse(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if line == EXIT_SENTINEL {
        return Input::Exit;
    }

    let Some(body) = line.strip_prefix(COMMAND_PREFIX) else {
        return Input::Remote(line);
    };
    let mut tokens = body.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some("split"), Some(name)) => Input::Split(name),
        (Some("split"), None) => Input::Usage("SYNTAX: /split [File Name]"),
        (Some("build"), Some(name)) => Input::Build(name),
        (Some("build"), None) => Input::Usage("SYNTAX: /build [File Name]"),
        (Some("help"), _) => Input::Help,
        _ => Input::Remote(line),
    }
}

/// Text to print for a tracker response. `elapsed` is the measured round
/// trip of the request that produced it.
pub fn render(response: &Response, elapsed: Duration) -> String {
    match response {
        Response::Text(text) => text.clone(),
        Response::Pong { epoch_secs } => format!(
            "Pong from tracker (clock {epoch_secs:.3}), round trip {:.3} ms",
            elapsed.as_secs_f64() * 1000.0
        ),
        Response::Peers(peers) => {
            let mut out = format!("{} peer(s) hold this file:", peers.len());
            for peer in peers {
                out.push_str("\n  ");
                out.push_str(&peer.to_string());
            }
            out
        }
        Response::File { name, data } => format!("Received '{name}' ({} bytes)", data.len()),
        Response::Error { kind, message } => format!("Error ({kind}): {message}"),
    }
}
