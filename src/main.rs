use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use vaultscan::config::ScanConfig;
use vaultscan::engine::{Engine, ScanOutcome, ScanReport};
use vaultscan::validate::VerdictKind;

#[derive(Parser)]
#[command(name = "vaultscan")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Detect and validate encrypted containers in raw disk images")]
struct Cli {
    /// Raw disk image to scan
    image: PathBuf,

    /// Bytes per analysis block (multiple of 512)
    #[arg(long, default_value = "4096")]
    block_size: usize,

    /// Normalized entropy threshold for seeding candidate regions
    #[arg(long, default_value = "0.85")]
    entropy_threshold: f64,

    /// Low-entropy blocks tolerated inside a region before it closes
    #[arg(long, default_value = "4")]
    gap_tolerance: u32,

    /// Minimum classifier confidence for a known-format label
    #[arg(long, default_value = "0.45")]
    confidence_floor: f64,

    /// Worker cap for block analysis; 0 means one per core
    #[arg(short = 'j', long, default_value = "0")]
    workers: usize,

    /// Evidence identifier stamped into records instead of the image path
    #[arg(long)]
    source_id: Option<String>,

    /// Write the full JSON report to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the full report as JSON to stdout instead of a summary
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::Relaxed);
    })
    .context("failed to install interrupt handler")?;

    let config = ScanConfig {
        block_size: cli.block_size,
        entropy_threshold: cli.entropy_threshold,
        gap_tolerance: cli.gap_tolerance,
        confidence_floor: cli.confidence_floor,
        max_workers: cli.workers,
        ..Default::default()
    };

    let engine = Engine::new(config)?;
    let outcome = engine
        .scan(&cli.image, cli.source_id.as_deref(), &running)
        .with_context(|| format!("scan of {} failed", cli.image.display()))?;

    match outcome {
        ScanOutcome::Completed(report) => {
            if let Some(path) = &cli.output {
                let file = std::fs::File::create(path)
                    .with_context(|| format!("cannot create {}", path.display()))?;
                serde_json::to_writer_pretty(file, &report)?;
            }
            if cli.json {
                serde_json::to_writer_pretty(std::io::stdout().lock(), &report)?;
                println!();
            } else {
                print_summary(&report);
            }
            Ok(())
        }
        ScanOutcome::Cancelled => {
            eprintln!("scan cancelled; no findings emitted");
            std::process::exit(130);
        }
    }
}

fn print_summary(report: &ScanReport) {
    println!("image:    {}", report.source_image);
    println!("sha256:   {}", report.image_sha256);
    println!("blocks:   {}", report.blocks_scanned);
    println!("findings: {}", report.records.len());
    for record in &report.records {
        let marker = match record.verdict {
            VerdictKind::Confirmed => "+",
            VerdictKind::Rejected => "-",
            VerdictKind::Inconclusive => "?",
        };
        println!(
            "  [{}] {:>12}..{:<12} {} (confidence {:.2}, {:?})",
            marker, record.start, record.end, record.format, record.confidence, record.verdict
        );
        for check in &record.checks {
            println!(
                "        {:<24} {:?}: {}",
                check.name, check.status, check.detail
            );
        }
    }
}
