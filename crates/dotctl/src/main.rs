//! dotctl - command-line access to a file-backed dotcache

mod handler;

use anyhow::{Context, Result};
use clap::Parser;
use dotcache::{CacheConfig, DotCache, DEFAULT_INDEX_KEY};
use dotstore::FileStore;
use std::sync::Arc;
use tracing::{debug, Level};

use crate::handler::{Command, CommandHandler};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./data")]
    data: String,

    /// Reserved key the key index is stored under
    #[arg(long, default_value = DEFAULT_INDEX_KEY)]
    index_key: String,

    /// Log index and store activity to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let level = if args.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    debug!("dotctl v{}", env!("CARGO_PKG_VERSION"));
    debug!("Data directory: {}", args.data);

    let store = FileStore::open(&args.data)
        .with_context(|| format!("Failed to open store at {}", args.data))?;
    let config = CacheConfig::default().with_index_key(args.index_key);
    let cache = DotCache::with_config(Arc::new(store), config)
        .context("Failed to load key index")?;

    let handler = CommandHandler::new(cache);
    let output = handler.handle(args.command)?;
    println!("{}", output);

    Ok(())
}
