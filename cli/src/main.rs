//! BizSync CLI - operate a local BizSync node
//!
//! Usage:
//!   bizsync --data-dir ./shop-data seed-chart
//!   bizsync --config bizsync.json health
//!   bizsync trial-balance --as-of 2024-06-30
//!   bizsync export backup.json

use anyhow::{Context, Result};
use bizsync_core::{Node, NodeConfig, NodeId};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

mod commands;
mod ui;

use commands::CommandHandler;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file (node_id, data_dir, integrity_interval_secs, ...)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory (overrides the config file)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Node id (overrides the config file)
    #[arg(short, long)]
    node_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the standard chart of accounts
    SeedChart,

    /// Run every integrity check and print a health report
    Health {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print per-account debit and credit totals
    TrialBalance {
        /// Only include transactions dated on or before this day (YYYY-MM-DD)
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// Verify the audit hash chain from genesis
    VerifyAudit,

    /// Write every table to a JSON backup
    Export { file: PathBuf },

    /// Merge a JSON backup into this node
    Import { file: PathBuf },
}

fn load_config(args: &Args) -> Result<NodeConfig> {
    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => NodeConfig::default(),
    };

    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(id) = &args.node_id {
        config.node_id = Some(NodeId::new(id.as_str()));
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args = Args::parse();

    println!("{}", "=".repeat(60).bright_blue());
    println!("{}", format!("  {}", bizsync_core::version_string()).bright_cyan().bold());
    println!("{}", "  Local-first books that stay consistent".bright_white());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    let config = load_config(&args)?;
    info!("Opening node with config: {:?}", config);

    let node = Node::open(config.clone())
        .with_context(|| format!("opening data directory {}", config.data_dir.display()))?;

    println!("{} {}", "Node:".bright_green(), node.node_id());
    println!("{} {}", "Data:".bright_green(), config.data_dir.display());
    println!();

    let handler = CommandHandler::new(node);
    match args.command {
        Command::SeedChart => handler.cmd_seed_chart(),
        Command::Health { json } => handler.cmd_health(json),
        Command::TrialBalance { as_of } => handler.cmd_trial_balance(as_of),
        Command::VerifyAudit => handler.cmd_verify_audit(),
        Command::Export { file } => handler.cmd_export(&file),
        Command::Import { file } => handler.cmd_import(&file),
    }
}
