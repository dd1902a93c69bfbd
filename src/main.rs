//! echotrace - echo breakpoint trace recorder
//!
//! Entry point that handles CLI argument parsing, configuration and the
//! choice of trace store before handing over to the REPL.

use anyhow::Context;
use clap::Parser;
use echotrace::app::Workbench;
use echotrace::config::Config;
use echotrace::trace::{JsonTraceStore, MemoryTraceStore, TraceStore};
use echotrace::ui::cli::run_cli;
use std::path::PathBuf;
use std::sync::Arc;

/// echotrace: record echo breakpoint hits into trace lists
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file
    #[arg(short, long, default_value = "echotrace.toml")]
    config: PathBuf,

    /// Directory for trace files (traces stay in memory otherwise)
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Hits before an echo breakpoint removes itself
    #[arg(long)]
    max_hits: Option<u32>,

    /// Load address of the target module
    #[arg(long, value_parser = parse_base)]
    module_base: Option<u64>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_base(s: &str) -> Result<u64, String> {
    echotrace::app::parse_address(s).map_err(|e| e.to_string())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        },
    ))
    .init();

    let mut config = Config::load_from(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    if let Some(max_hits) = args.max_hits {
        config.max_hits = max_hits;
    }
    if let Some(base) = args.module_base {
        config.module.base = base;
    }
    if args.store.is_some() {
        config.store_dir = args.store;
    }
    config.validate()?;

    log::info!("echotrace initialized");
    log::debug!("Config: {:?}", config);

    let store: Arc<dyn TraceStore> = match &config.store_dir {
        Some(dir) => Arc::new(
            JsonTraceStore::open(dir)
                .with_context(|| format!("Failed to open trace store {}", dir.display()))?,
        ),
        None => Arc::new(MemoryTraceStore::new()),
    };

    println!("[*] echotrace v{}", env!("CARGO_PKG_VERSION"));
    let bench = Workbench::new(&config, store)?;
    run_cli(bench)
}
