//! Chain MCP Server - Entry point

use anyhow::{Context, Result};
use clap::Parser;
use rmcp::service::ServiceExt;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chain_mcp::{config::Config, ChainMcpHandler};

/// Chain MCP Server - Model Context Protocol server for EVM chains and a local knowledge base
#[derive(Parser, Debug)]
#[command(name = "chain-mcp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Knowledge base store directory (overrides config and CHAIN_MCP_KB_DIR)
    #[arg(long, value_name = "DIR")]
    kb_dir: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the MCP protocol, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();

    let mut config = match cli.config {
        Some(ref config_path) => Config::from_file(config_path)?,
        None => Config::load_default(),
    };
    config.apply_env_overrides();
    if let Some(dir) = cli.kb_dir {
        config.knowledge_base.root = Some(dir);
    }

    log_config_status(&config);

    let handler = ChainMcpHandler::new(config).context("Failed to initialize server")?;

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    tracing::info!("serving MCP over stdio");
    let service = handler.serve((stdin, stdout)).await?;
    service.waiting().await?;

    Ok(())
}

/// Log which restrictions and endpoints are active.
fn log_config_status(config: &Config) {
    if !config.forbidden_tools.is_empty() {
        tracing::info!(tools = ?config.forbidden_tools, "forbidden tools");
    }
    if config.allow_writes {
        tracing::warn!("write tools enabled; send_raw_transaction will broadcast");
    }
    if config.explorer.api_key.is_none() {
        tracing::warn!("no explorer API key set; explorer tools will be rate limited or fail");
    }
    tracing::info!(
        default_chain = %config.default_chain,
        kb_root = %config.kb_root().display(),
        "configuration loaded"
    );
}
