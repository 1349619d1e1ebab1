use std::time::{Duration, Instant};

use clap::Parser;
use hdrhistogram::Histogram;
use match_lob::{
    CancelOrder, ClientRequest, EngineConfig, EventLog, MatchingEngine, NewOrder, Side,
};

/// Per-request latency distribution of the engine's synchronous path.
#[derive(Parser, Debug)]
#[command(name = "latency-report")]
struct Cli {
    /// Requests to measure
    #[arg(long, default_value_t = 1_000_000)]
    iterations: u64,

    /// Resting orders kept on the book while measuring
    #[arg(long, default_value_t = 1_000)]
    book_size: u64,

    #[command(flatten)]
    engine: EngineConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    println!("Preparing Latency Benchmark...");

    let mut engine = MatchingEngine::new(cli.engine)?;
    engine.warm_up();

    let mut histogram = Histogram::<u64>::new_with_bounds(1, 100_000, 3)
        .map_err(|err| format!("histogram: {err:?}"))?;
    let mut log = EventLog::new();

    println!("Running {} iterations...", cli.iterations);

    let mut order_id = 0u64;
    let mut total_duration = Duration::ZERO;

    for _ in 0..cli.iterations {
        order_id += 1;

        // Alternate sides around one price: every other order trades
        let request = ClientRequest::New(NewOrder {
            client_id: 1,
            client_order_id: order_id,
            ticker_id: 0,
            side: if order_id % 2 == 0 { Side::Bid } else { Side::Ask },
            price: 10_000 + (order_id % 100),
            qty: 10,
        });

        log.clear();
        let start = Instant::now();
        engine.process(std::hint::black_box(request), &mut log)?;
        let elapsed = start.elapsed();
        std::hint::black_box(&log);

        // Outliers beyond the histogram bound are dropped
        histogram.record(elapsed.as_nanos() as u64).unwrap_or(());
        total_duration += elapsed;

        // Keep the resting population bounded
        if order_id > cli.book_size {
            log.clear();
            engine.process(
                ClientRequest::Cancel(CancelOrder {
                    client_id: 1,
                    client_order_id: order_id - cli.book_size,
                    ticker_id: 0,
                }),
                &mut log,
            )?;
        }
    }

    println!("\n=== Latency Report (ns) ===");
    println!("Total Ops:  {}", cli.iterations);
    println!("Throughput: {:.2} ops/sec", cli.iterations as f64 / total_duration.as_secs_f64());
    println!("---------------------------");
    println!("Min:    {:6} ns", histogram.min());
    println!("P50:    {:6} ns", histogram.value_at_quantile(0.50));
    println!("P90:    {:6} ns", histogram.value_at_quantile(0.90));
    println!("P99:    {:6} ns", histogram.value_at_quantile(0.99));
    println!("P99.9:  {:6} ns", histogram.value_at_quantile(0.999));
    println!("P99.99: {:6} ns", histogram.value_at_quantile(0.9999));
    println!("Max:    {:6} ns", histogram.max());
    println!("---------------------------");

    println!("\nDistribution:");
    for v in histogram.iter_log(100, 2.0) {
        let count = v.count_since_last_iteration();
        if count > 0 {
            println!("<= {:6} ns: {:10} count", v.value_iterated_to(), count);
        }
    }

    Ok(())
}
