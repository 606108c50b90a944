//! Write a synthetic transaction file for sweeps and benches.
//!
//! Usage:
//!   gen-transactions --out data/basket.txt --transactions 100000 --items 500 --avg-len 8 --seed 42

use clap::Parser;
use fpgrowth_bench::datagen::{write_dataset, DataGen};
use fpgrowth_bench::BenchResult;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "gen-transactions", about = "Generate a Zipf-skewed transaction file")]
struct Args {
    /// Output file, one space-separated transaction per line.
    #[arg(long)]
    out: PathBuf,

    /// Number of transactions.
    #[arg(long, default_value = "10000")]
    transactions: usize,

    /// Number of distinct items to draw from.
    #[arg(long, default_value = "200")]
    items: usize,

    /// Mean transaction length.
    #[arg(long, default_value = "6.0")]
    avg_len: f64,

    /// RNG seed.
    #[arg(long, default_value = "42")]
    seed: u64,
}

fn main() -> BenchResult<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let start = Instant::now();
    let dataset = DataGen::new(args.seed).dataset(args.transactions, args.items, args.avg_len)?;
    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_dataset(&dataset, &args.out)?;

    tracing::info!(
        path = %args.out.display(),
        transactions = dataset.len(),
        distinct_items = dataset.distinct_items(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "transaction file written"
    );
    Ok(())
}
