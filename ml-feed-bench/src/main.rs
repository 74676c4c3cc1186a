//! Benchmark runner for the in-memory batch feeder
//!
//! Usage: `ml-feed-bench [descriptor.json]`

use anyhow::Context;
use ml_feed_bench::{bench_feed_cycle, BenchConfig};
use ml_feed_core::BatchDescriptor;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = BenchConfig::default();
    if let Some(path) = std::env::args().nth(1) {
        config.descriptor = BatchDescriptor::from_path(&path)
            .with_context(|| format!("failed to load batch descriptor from {path}"))?;
    }

    println!("=== Memory Feeder Benchmarks ===");
    println!("Descriptor: {:?}", config.descriptor);

    let result = bench_feed_cycle(&config).context("feed cycle benchmark failed")?;
    println!("\nBenchmark: {}", result.name);
    println!("  Total time:   {:?}", result.total_time);
    println!("  Average time: {:?}", result.avg_time);
    println!("  Min time:     {:?}", result.min_time);
    println!("  Max time:     {:?}", result.max_time);
    println!("  Throughput:   {:.2} samples/sec", result.throughput);

    // Larger injections per cycle exercise buffer growth
    println!("\n=== Injection Size Sweep ===");
    for batches_per_injection in [1, 4, 16, 64] {
        let config = BenchConfig {
            iterations: 3,
            warmup_iterations: 1,
            batches_per_injection,
            ..config.clone()
        };

        let result = bench_feed_cycle(&config)?;
        println!("\nBatches per injection: {batches_per_injection}");
        println!("  Average time: {:?}", result.avg_time);
        println!("  Throughput:   {:.2} samples/sec", result.throughput);
    }

    Ok(())
}
