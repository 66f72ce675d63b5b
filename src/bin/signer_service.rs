// Signer Service Binary - standalone signer daemon backed by the
// in-memory software token.

use anyhow::Context;
use clap::Parser;
use colored::*;
use signer_proxy::{SignerServiceServer, SoftwareSigner};
use std::process;

const DEFAULT_SOCKET_PATH: &str = "/tmp/signer_service.sock";

#[derive(Parser, Debug)]
#[command(name = "signer_service")]
#[command(about = "Token, key and certificate signer service", version)]
struct Cli {
    /// Unix socket the service listens on
    #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
    socket: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!(
        "{}",
        "═══════════════════════════════════════".cyan().bold()
    );
    println!(
        "{}",
        "           SIGNER SERVICE              ".cyan().bold()
    );
    println!(
        "{}",
        "═══════════════════════════════════════".cyan().bold()
    );
    println!("{} Socket: {}", "→".cyan(), cli.socket.bright_white());
    println!();

    let server = SignerServiceServer::new(cli.socket.clone(), SoftwareSigner::new());

    // Ctrl+C handler for clean shutdown
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        println!("\n{} Shutting down signer service...", "→".yellow());
        process::exit(0);
    });

    server
        .run()
        .await
        .with_context(|| format!("signer service failed on {}", cli.socket))?;

    Ok(())
}
