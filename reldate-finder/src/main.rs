//! reldate-finder - release date lookup for game titles
//!
//! Reads titles from the command line (or stdin, one per line), looks each up
//! on several sources and streams one line per title as results arrive.
//! Ctrl-C cancels the batch; items still pending are reported as cancelled.

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::StreamExt;
use reldate_common::config::{load_config, TomlConfig};
use reldate_common::logging::init_logging;
use reldate_finder::probes::build_source_table;
use reldate_finder::{BatchOrchestrator, BatchSummary, EngineConfig, ProgressEvent, Verdict};
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "reldate-finder",
    version,
    about = "Find game release dates by cross-checking several sources"
)]
struct Cli {
    /// Game titles (read from stdin, one per line, when omitted)
    titles: Vec<String>,

    /// Configuration file (default: $RELDATE_CONFIG, then the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Aggregation mode: "consensus" or "first-hit"
    #[arg(short, long)]
    mode: Option<String>,

    /// Titles searched concurrently
    #[arg(short = 'g', long)]
    group_size: Option<usize>,

    /// Sources queried concurrently per title (consensus mode)
    #[arg(long)]
    source_concurrency: Option<usize>,

    /// Per-step timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Enabled sources in priority order (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    sources: Option<Vec<String>>,

    /// Emit progress events as JSON lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// Command-line values win over environment and file
    fn apply_overrides(&self, config: &mut TomlConfig) {
        if let Some(mode) = &self.mode {
            config.engine.mode = mode.clone();
        }
        if let Some(group_size) = self.group_size {
            config.engine.item_concurrency = group_size;
        }
        if let Some(source_concurrency) = self.source_concurrency {
            config.engine.source_concurrency = source_concurrency;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.engine.step_timeout_ms = timeout_ms;
        }
        if let Some(sources) = &self.sources {
            config.engine.sources = sources.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);

    init_logging(&config.logging).context("Failed to initialize logging")?;
    info!("Starting reldate-finder v{}", env!("CARGO_PKG_VERSION"));

    let titles = collect_titles(cli.titles.clone())?;
    if titles.is_empty() {
        bail!("Please enter at least one game title");
    }
    if titles.len() > config.engine.max_batch_size {
        bail!(
            "Please limit to {} games at a time",
            config.engine.max_batch_size
        );
    }

    let engine_config = EngineConfig::from_section(&config.engine)?;
    let table = build_source_table(&config.engine.sources, &config.http)?;
    let engine = Arc::new(BatchOrchestrator::new(table, engine_config)?);

    let mut handle = engine.submit_batch(titles);

    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling batch");
            cancel.cancel();
        }
    });

    {
        let events = handle.events();
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            if cli.json {
                println!("{}", serde_json::to_string(&event)?);
            } else {
                print_event(&event);
            }
        }
    }

    let report = handle.join().await?;
    if !cli.json {
        print_summary(&report.summary);
    }

    Ok(())
}

/// Titles from arguments, else from stdin; trimmed, blanks dropped
fn collect_titles(args: Vec<String>) -> Result<Vec<String>> {
    let raw = if !args.is_empty() {
        args
    } else if std::io::stdin().is_terminal() {
        Vec::new()
    } else {
        std::io::stdin()
            .lock()
            .lines()
            .collect::<std::io::Result<Vec<_>>>()
            .context("Failed to read titles from stdin")?
    };

    Ok(raw
        .into_iter()
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
        .collect())
}

fn print_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::ItemStarted { item, .. } => println!("⏳ {}: Searching...", item),
        ProgressEvent::ItemCompleted { item, verdict, .. } => match verdict {
            Verdict::NoResultFound => println!("❌ {}: {}", item, verdict),
            _ => println!("✅ {}: {}", item, verdict),
        },
        ProgressEvent::ItemFailed { item, reason, .. } => {
            println!("❌ {}: Error - {}", item, reason)
        }
        ProgressEvent::BatchCompleted { .. } => {}
    }
}

fn print_summary(summary: &BatchSummary) {
    println!(
        "\n{} searched: {} found, {} without a date, {} failed",
        summary.total, summary.found, summary.no_result, summary.failed
    );
}
