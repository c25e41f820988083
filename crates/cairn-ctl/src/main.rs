//! cairn — Cairn peer client.

use std::io::Write;
use std::net::SocketAddr;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use cairn_core::config::CairnConfig;
use cairn_core::Response;

use cairn_ctl::shell::{self, Input, LOCAL_HELP};
use cairn_ctl::{PeerWorkspace, TrackerClient};

fn print_usage() {
    println!("Usage: cairn [--server <addr>] [--port <localPort>]");
    println!();
    println!("  --server <addr>     tracker address (default from config)");
    println!("  --port <localPort>  local port to connect from (default: random)");
    println!();
    println!("{LOCAL_HELP}");
    println!("Type /help once connected for the tracker's commands.");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = CairnConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        CairnConfig::default()
    });

    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse options
    let mut server: SocketAddr = config.network.listen_addr;
    let mut local_port: Option<u16> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--server" => {
                i += 1;
                server = args
                    .get(i)
                    .context("--server requires a value")?
                    .parse()
                    .context("--server must be an address like 127.0.0.1:10000")?;
            }
            "--port" => {
                i += 1;
                local_port = Some(
                    args.get(i)
                        .context("--port requires a value")?
                        .parse()
                        .context("--port must be a number")?,
                );
            }
            "help" | "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            other => {
                eprintln!("Unknown argument: {other}");
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let mut client = TrackerClient::connect(server, local_port)
        .await
        .with_context(|| format!("failed to connect to tracker at {server} (is cairnd running?)"))?;
    let local = client.local_addr();

    let workspace = PeerWorkspace::open(
        &config.storage.workspace_dir,
        local.port(),
        config.transfer.chunk_size,
    )?;
    println!("Connected to {server} as {local}.");
    println!("Workspace: {}", workspace.root().display());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        match shell::parse(&line) {
            Input::Empty => {}
            Input::Exit => break,
            Input::Usage(syntax) => println!("{syntax}"),
            Input::Split(name) => {
                let ws = workspace.clone();
                let name = name.to_string();
                match tokio::task::spawn_blocking(move || ws.split(&name)).await? {
                    Ok(set) => println!(
                        "Split '{}' into {} chunk(s) of up to {} bytes.",
                        set.file_name,
                        set.chunks.len(),
                        set.chunk_size
                    ),
                    Err(e) => println!("Split failed: {e}"),
                }
            }
            Input::Build(name) => {
                let ws = workspace.clone();
                let owned = name.to_string();
                match tokio::task::spawn_blocking(move || ws.build(&owned)).await? {
                    Ok(bytes) => println!("Built '{name}' ({bytes} bytes)."),
                    Err(e) => println!("Build failed: {e}"),
                }
            }
            Input::Help => {
                println!("{LOCAL_HELP}");
                request(&mut client, &workspace, "/help").await?;
            }
            Input::Remote(raw) => request(&mut client, &workspace, raw).await?,
        }
    }

    client.exit().await?;
    println!("Disconnected.");
    Ok(())
}

/// Send one command and print (or save) its response. Transport failures
/// end the client; error responses do not.
async fn request(client: &mut TrackerClient, workspace: &PeerWorkspace, raw: &str) -> Result<()> {
    let started = Instant::now();
    let response = client.request(raw).await?;
    let elapsed = started.elapsed();

    if let Response::File { name, data } = &response {
        match workspace.save(name, data) {
            Ok(path) => println!("{} -> {}", shell::render(&response, elapsed), path.display()),
            Err(e) => println!("Could not save '{name}': {e}"),
        }
        return Ok(());
    }
    println!("{}", shell::render(&response, elapsed));
    Ok(())
}
