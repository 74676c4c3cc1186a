//! Benchmarks for the in-memory batch feeder

use std::time::{Duration, Instant};

use ml_feed_core::error::Result;
use ml_feed_core::{BatchDescriptor, Datum, MemoryFeeder};

/// Benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Number of timed iterations
    pub iterations: usize,

    /// Warmup iterations
    pub warmup_iterations: usize,

    /// Batch geometry of the feeder under test
    pub descriptor: BatchDescriptor,

    /// Batches injected per feed cycle
    pub batches_per_injection: usize,

    /// Inject/drain cycles per iteration
    pub cycles: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            warmup_iterations: 3,
            descriptor: BatchDescriptor::new(64, 3, 32, 32),
            batches_per_injection: 8,
            cycles: 16,
        }
    }
}

impl BenchConfig {
    /// Samples pushed through the feeder per iteration
    pub fn samples_per_iteration(&self) -> usize {
        self.descriptor.batch_size * self.batches_per_injection * self.cycles
    }
}

/// Benchmark result
#[derive(Debug, Clone)]
pub struct BenchResult {
    /// Name of the benchmark
    pub name: String,

    /// Total time taken
    pub total_time: Duration,

    /// Average time per iteration
    pub avg_time: Duration,

    /// Min time per iteration
    pub min_time: Duration,

    /// Max time per iteration
    pub max_time: Duration,

    /// Throughput (samples/second)
    pub throughput: f64,
}

/// Run `func` for the configured warmup and timed iterations
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn run_benchmark<F>(name: &str, config: &BenchConfig, mut func: F) -> Result<BenchResult>
where
    F: FnMut() -> Result<()>,
{
    for _ in 0..config.warmup_iterations {
        func()?;
    }

    let iterations = config.iterations.max(1);
    let mut times = Vec::with_capacity(iterations);
    let start_total = Instant::now();

    for _ in 0..iterations {
        let start = Instant::now();
        func()?;
        times.push(start.elapsed());
    }

    let total_time = start_total.elapsed();
    let avg_time = times.iter().sum::<Duration>() / iterations as u32;
    let min_time = times.iter().min().copied().unwrap_or_default();
    let max_time = times.iter().max().copied().unwrap_or_default();

    let total_samples = iterations * config.samples_per_iteration();
    let throughput = total_samples as f64 / total_time.as_secs_f64().max(f64::EPSILON);

    Ok(BenchResult {
        name: name.to_string(),
        total_time,
        avg_time,
        min_time,
        max_time,
        throughput,
    })
}

/// Build `count` byte datums matching `descriptor`
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn synthetic_datums(descriptor: &BatchDescriptor, count: usize) -> Vec<Datum> {
    let size = descriptor.sample_size();
    (0..count)
        .map(|i| {
            let bytes = (0..size).map(|j| ((i + j) % 256) as u8).collect();
            Datum::from_bytes(
                descriptor.channels,
                descriptor.height,
                descriptor.width,
                bytes,
                (i % 10) as i32,
            )
        })
        .collect()
}

/// Repeatedly inject a multiple of the batch size and drain it
pub fn bench_feed_cycle(config: &BenchConfig) -> Result<BenchResult> {
    let mut feeder = MemoryFeeder::<f32>::new(config.descriptor)?;
    let count = config.descriptor.batch_size * config.batches_per_injection;
    let datums = synthetic_datums(&config.descriptor, count);

    run_benchmark("Inject/drain cycle", config, || {
        let mut checksum = 0.0f32;
        for _ in 0..config.cycles {
            feeder.add_datums(&datums)?;
            while feeder.has_pending_data() {
                let view = feeder.next_batch()?;
                checksum += view.labels.as_slice().iter().sum::<f32>();
            }
        }
        tracing::trace!(checksum, "Feed cycle finished");
        Ok(())
    })
}
