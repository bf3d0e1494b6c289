//! GUL stream analyser.
//!
//! Reads a stream written by `gulsample` and prints:
//!   Tier 1  — block invariants (PASS/FAIL per kind)
//!   Tier 2  — per-event table: items, TIV, analytical vs sampled mean, tail percentiles

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use clap::Parser;

use gulsample::analysis::{BlockViolation, event_mean_distribution, summarise_stream};
use gulsample::error::Result;
use gulsample::stream::GulStreamReader;

#[derive(Parser, Debug)]
#[command(name = "analyse")]
#[command(about = "Summarise a GUL sample stream")]
struct Cli {
    /// GUL stream file
    #[arg(default_value = "gul.bin")]
    stream: PathBuf,

    /// Print at most this many events in the per-event table
    #[arg(long, default_value = "20")]
    limit: usize,
}

fn main() -> Result<()> {
    gulsample::init_logging();
    let cli = Cli::parse();

    let reader = GulStreamReader::new(BufReader::new(File::open(&cli.stream)?))?;
    let summary = summarise_stream(reader)?;

    // ── Tier 1: block invariants ─────────────────────────────────────────────
    let has = |f: fn(&BlockViolation) -> bool| {
        if summary.violations.iter().any(f) { "FAIL" } else { "PASS" }
    };
    println!("=== Tier 1 — Block invariants ===");
    println!("  [1] 0 ≤ loss ≤ max loss:      {}", has(|v| matches!(v, BlockViolation::LossOutOfRange { .. })));
    println!("  [2] max loss ≤ TIV:           {}", has(|v| matches!(v, BlockViolation::MaxAboveTiv { .. })));
    println!("  [3] chance of loss in [0,1]:  {}", has(|v| matches!(v, BlockViolation::ChanceOfLossOutOfRange { .. })));
    println!("  [4] events contiguous:        {}", has(|v| matches!(v, BlockViolation::EventNotContiguous { .. })));
    if !summary.violations.is_empty() {
        println!("\n  {} violation(s):", summary.violations.len());
        for v in summary.violations.iter().take(cli.limit) {
            println!("    {v}");
        }
    }

    // ── Tier 2: per-event table ──────────────────────────────────────────────
    println!(
        "\n=== Tier 2 — Events ({} events, {} blocks, {} samples) ===",
        summary.events.len(),
        summary.blocks,
        summary.sample_size
    );
    println!(
        "  {:>8}  {:>6}  {:>14}  {:>12}  {:>12}  {:>8}  {:>12}  {:>12}",
        "event", "items", "tiv", "mean", "sampled", "err%", "p95", "max"
    );
    for e in summary.events.iter().take(cli.limit) {
        println!(
            "  {:>8}  {:>6}  {:>14.0}  {:>12.1}  {:>12.1}  {:>7.2}%  {:>12.1}  {:>12.1}",
            e.event_id.0,
            e.items,
            e.tiv,
            e.analytical_mean,
            e.sampled.mean,
            100.0 * e.mean_error(),
            e.sampled.p95,
            e.sampled.max,
        );
    }
    if summary.events.len() > cli.limit {
        println!("  … {} more", summary.events.len() - cli.limit);
    }

    if let Some(d) = event_mean_distribution(&summary) {
        println!("\n=== Event mean loss across events ===");
        println!(
            "  n={}  min={:.1}  p25={:.1}  p50={:.1}  p75={:.1}  p95={:.1}  max={:.1}  mean={:.1}  sd={:.1}",
            d.n, d.min, d.p25, d.p50, d.p75, d.p95, d.max, d.mean, d.std_dev
        );
    }
    Ok(())
}
