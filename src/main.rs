//! Main entry point for the MCP demo server
//!
//! This file sets up logging, parses command line arguments, and starts the
//! MCP server. The server listens for JSON-RPC requests over stdin/stdout,
//! so every log line goes to stderr.

use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use mcp_demo::ToolServer;

/// Command line arguments for the MCP demo server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory that relative file paths are resolved against
    /// If not provided, uses the current working directory
    #[arg(long)]
    root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable verbose output (implies debug)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Set up logging based on command line flags
    let log_level = if args.verbose {
        "debug"
    } else if args.debug {
        "info"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!("mcp_demo={}", log_level))
        .with_writer(std::io::stderr) // Send logs to stderr, not stdout
        .init();

    info!("Starting MCP demo server");

    // Relative roots are anchored at the working directory by the file tools
    let root = args.root.unwrap_or_else(|| PathBuf::from("."));

    let server = ToolServer::new(root)?;
    server.run().await?;

    info!("MCP demo server shutdown complete");
    Ok(())
}
