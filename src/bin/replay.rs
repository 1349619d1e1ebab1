//! Replay a CSV file of client requests through the threaded engine.
//!
//! The feeder, the engine and the two outbound consumers each run on their
//! own thread, wired together with SPSC rings exactly as in production.

use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Instant;

use clap::Parser;
use match_lob::replay;
use match_lob::{
    ClientRequest, ClientResponse, EngineConfig, MarketUpdate, MatchingEngine, RunStats,
};
use rtrb::{Consumer, PushError, RingBuffer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "replay", about = "Replay client requests through the matching engine")]
struct Cli {
    /// Request file with columns action,client_id,client_order_id,ticker_id,side,price,qty
    input: PathBuf,

    /// Ticks per unit of price in the input file
    #[arg(long, default_value_t = 100)]
    price_scale: u64,

    /// Write the market-data stream to this CSV file
    #[arg(long)]
    updates_out: Option<PathBuf>,

    /// Print every non-empty book when done
    #[arg(long)]
    dump: bool,

    #[command(flatten)]
    engine: EngineConfig,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "replay failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let requests = replay::read_requests(BufReader::new(File::open(&cli.input)?), cli.price_scale)?;
    info!(requests = requests.len(), input = %cli.input.display(), "loaded requests");

    let mut engine = MatchingEngine::new(cli.engine.clone())?;
    let capacity = cli.engine.queue_capacity;
    let keep_updates = cli.updates_out.is_some();

    let (mut request_tx, mut request_rx) = RingBuffer::<ClientRequest>::new(capacity);
    let (mut response_tx, response_rx) = RingBuffer::<ClientResponse>::new(capacity);
    let (mut update_tx, update_rx) = RingBuffer::<MarketUpdate>::new(capacity);
    let shutdown = AtomicBool::new(false);

    let start = Instant::now();
    let (stats, responses, updates) = thread::scope(|s| {
        let engine = &mut engine;
        let shutdown = &shutdown;

        // Producers live inside the engine thread so the consumers see the
        // rings abandoned as soon as it exits.
        let engine_thread = s.spawn(move || {
            engine.run(&mut request_rx, &mut response_tx, &mut update_tx, shutdown)
        });

        let response_thread = s.spawn(move || {
            let mut counts = [0u64; 5];
            drain(response_rx, |response| counts[response.kind as usize] += 1);
            counts
        });

        let update_thread = s.spawn(move || {
            let mut counts = [0u64; 4];
            let mut kept = Vec::new();
            drain(update_rx, |update| {
                counts[update.kind as usize] += 1;
                if keep_updates {
                    kept.push(update);
                }
            });
            (counts, kept)
        });

        for request in requests {
            let mut pending = request;
            loop {
                match request_tx.push(pending) {
                    Ok(()) => break,
                    Err(PushError::Full(rejected)) => {
                        if request_tx.is_abandoned() {
                            break;
                        }
                        pending = rejected;
                        std::hint::spin_loop();
                    }
                }
            }
        }
        drop(request_tx);

        (
            engine_thread.join(),
            response_thread.join(),
            update_thread.join(),
        )
    });

    let elapsed = start.elapsed();
    let stats: RunStats = stats.map_err(|_| "engine thread panicked")??;
    // Counts are indexed by kind discriminant
    let responses = responses.map_err(|_| "response consumer panicked")?;
    let (updates, kept) = updates.map_err(|_| "update consumer panicked")?;

    info!(
        requests = stats.requests,
        elapsed_ms = elapsed.as_millis() as u64,
        stalls = stats.queue.stalls,
        dropped = stats.queue.dropped,
        "replay complete"
    );
    info!(
        accepted = responses[0],
        canceled = responses[1],
        filled = responses[2],
        cancel_rejected = responses[3],
        invalid = responses[4],
        "client responses"
    );
    info!(
        add = updates[0],
        modify = updates[1],
        cancel = updates[2],
        trade = updates[3],
        "market updates"
    );

    if let Some(path) = &cli.updates_out {
        replay::write_updates(File::create(path)?, kept)?;
        info!(output = %path.display(), "market updates written");
    }

    if cli.dump {
        for book in engine.books().iter().filter(|book| !book.is_empty()) {
            println!("{}", book.dump(false, true));
        }
    }

    Ok(())
}

/// Pop until the producer is gone and the ring is empty.
fn drain<T>(mut consumer: Consumer<T>, mut on_item: impl FnMut(T)) {
    loop {
        match consumer.pop() {
            Ok(item) => on_item(item),
            Err(_) if consumer.is_abandoned() && consumer.is_empty() => break,
            Err(_) => std::hint::spin_loop(),
        }
    }
}
