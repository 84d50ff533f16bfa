use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use pin_copier::checkpoint::CheckpointStore;
use pin_copier::config;
use pin_copier::inventory::InventoryManager;
use pin_copier::records::{latest_failure_file, load_failure_file, LogPaths};

/// Print where the next copy run would resume, without opening a browser.
#[derive(Parser, Debug)]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print every remaining pin instead of the first few
    #[arg(long)]
    all: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let paths = LogPaths::new(cfg.logs_dir());
    let target = cfg.boards.target_name.clone();

    let manager = InventoryManager::new(paths.clone(), target.clone());
    let report = manager.detect_duplicates()?;

    println!("Target board: {}", target);
    println!("Inventory:    {} pins", report.total);
    println!("Saved:        {}", report.already_saved);
    println!("Remaining:    {}", report.remaining.len());
    match report.remaining.first() {
        Some(first) => println!("Resume at:    #{} ({})", report.resume_index + 1, first),
        None => println!("Resume at:    nothing left to copy"),
    }

    let shown = if args.all { report.remaining.len() } else { 10 };
    for pin in report.remaining.iter().take(shown) {
        println!("  {}", pin);
    }
    if report.remaining.len() > shown {
        println!("  ... and {} more", report.remaining.len() - shown);
    }

    if let Some(dups) = &report.duplicates {
        let blocking = manager.unacknowledged(dups)?;
        println!(
            "Duplicates:   {} ({} not acknowledged), see {}",
            dups.len(),
            blocking.len(),
            paths.duplicates().display()
        );
    }

    if let Some(cp) = CheckpointStore::new(paths.checkpoint(), target).load() {
        println!("Checkpoint:   {} pins processed at {}", cp.count, cp.timestamp);
    }

    if let Some(path) = latest_failure_file(paths.dir())? {
        let failures = load_failure_file(&path)?;
        println!("Last failures: {} in {}", failures.count, path.display());
    }
    Ok(())
}
