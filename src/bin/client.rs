//! Interactive console client for the MCP demo server
//!
//! Spawns the server as a child process, performs the MCP handshake and
//! then runs a menu on stdin/stdout. Logs go to stderr.

use clap::Parser;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::info;

use mcp_demo::console::Console;
use mcp_demo::{ClientSession, ServerCommand, SessionOptions};

/// Name of the server binary built alongside this client
const SERVER_BINARY: &str = "mcp-demo-server";

/// Command line arguments for the console client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server executable to launch
    /// If not provided, uses the server binary next to this client
    #[arg(long)]
    server: Option<String>,

    /// Tool call timeout in seconds (0 waits forever)
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable verbose output (implies debug)
    #[arg(short, long)]
    verbose: bool,

    /// Arguments passed through to the server
    #[arg(last = true)]
    server_args: Vec<String>,
}

/// Locate the server binary, preferring the one built next to us
fn default_server_program() -> String {
    let sibling = std::env::current_exe().ok().map(|exe| {
        exe.with_file_name(format!("{}{}", SERVER_BINARY, std::env::consts::EXE_SUFFIX))
    });

    match sibling {
        Some(path) if path.exists() => path.display().to_string(),
        // Fall back to PATH lookup
        _ => SERVER_BINARY.to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_level = if args.verbose {
        "debug"
    } else if args.debug {
        "info"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!("mcp_demo={},mcp_demo_client={}", log_level, log_level))
        .with_writer(std::io::stderr) // stdout belongs to the menu
        .init();

    let command = ServerCommand {
        program: args.server.unwrap_or_else(default_server_program),
        args: args.server_args,
    };

    let options = SessionOptions {
        call_timeout: (args.timeout_secs > 0).then(|| Duration::from_secs(args.timeout_secs)),
        ..SessionOptions::default()
    };

    info!("Launching server: {} {:?}", command.program, command.args);
    let session = ClientSession::spawn(&command, options).await?;

    let result = Console::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .run(&session)
        .await;

    session.shutdown().await?;
    result?;

    Ok(())
}
