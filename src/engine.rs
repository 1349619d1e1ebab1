//! Engine - One book per instrument, request dispatch and the main loop.
//!
//! The engine thread is the only writer of every book. It busy-polls the
//! inbound ring, applies each request synchronously and forwards whatever
//! the book emits to the two outbound rings.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};

use rtrb::{Consumer, Producer};
use tracing::{debug, error, info, warn};

use crate::command::{
    ClientRequest, ClientResponse, ClientResponseKind, MarketUpdate, Price, Side, TickerId,
};
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::matching::cancel_rejected;
use crate::order_book::OrderBook;
use crate::sink::{EventLog, EventSink, QueueSink, QueueStats};

/// Counters returned when the run loop exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    /// Requests taken off the inbound ring
    pub requests: u64,
    pub queue: QueueStats,
}

/// The matching engine: owns every order book.
pub struct MatchingEngine {
    books: Vec<OrderBook>,
    config: EngineConfig,
}

impl MatchingEngine {
    /// Build one book per configured instrument.
    ///
    /// # Errors
    /// `InvalidConfig` if the limits cannot be provisioned.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: EngineConfig) -> Self {
        let books = (0..config.instruments)
            .map(|ticker_id| OrderBook::new(ticker_id, config.max_orders, config.max_price_levels))
            .collect();

        info!(
            instruments = config.instruments,
            max_orders = config.max_orders,
            max_price_levels = config.max_price_levels,
            "matching engine provisioned"
        );

        Self { books, config }
    }

    /// Apply one request, writing every resulting event to `sink`.
    ///
    /// Requests for an unknown instrument are answered (INVALID for new
    /// orders, CANCEL_REJECTED for cancels), never dropped.
    ///
    /// # Errors
    /// Fatal pool exhaustion from the target book.
    #[inline]
    pub fn process<S: EventSink>(&mut self, request: ClientRequest, sink: &mut S) -> EngineResult<()> {
        let ticker_id = request.ticker_id();

        match (request, self.books.get_mut(ticker_id as usize)) {
            (ClientRequest::New(order), Some(book)) => book.add(
                sink,
                order.client_id,
                order.client_order_id,
                order.side,
                order.price,
                order.qty,
            ),
            (ClientRequest::Cancel(cancel), Some(book)) => {
                book.cancel(sink, cancel.client_id, cancel.client_order_id);
                Ok(())
            }
            (ClientRequest::New(order), None) => {
                debug!(ticker_id, client_id = order.client_id, "new order for unknown instrument");
                sink.send_client_response(ClientResponse {
                    kind: ClientResponseKind::Invalid,
                    client_id: order.client_id,
                    ticker_id,
                    client_order_id: order.client_order_id,
                    exchange_order_id: None,
                    side: Some(order.side),
                    price: Some(order.price),
                    fill_qty: None,
                    leaves_qty: Some(order.qty),
                });
                Ok(())
            }
            (ClientRequest::Cancel(cancel), None) => {
                debug!(ticker_id, client_id = cancel.client_id, "cancel for unknown instrument");
                sink.send_client_response(cancel_rejected(
                    cancel.client_id,
                    ticker_id,
                    cancel.client_order_id,
                ));
                Ok(())
            }
        }
    }

    /// Process a single request and collect its events.
    ///
    /// Synchronous entry point for tests, tools and benchmarks.
    pub fn process_request(&mut self, request: ClientRequest) -> EngineResult<EventLog> {
        let mut log = EventLog::new();
        self.process(request, &mut log)?;
        Ok(log)
    }

    /// Run the engine event loop on the current thread.
    ///
    /// Busy-polls `input` without ever blocking or yielding. `shutdown`
    /// is checked once per iteration; a request already taken off the
    /// ring is always finished. The loop also ends once the producer is
    /// gone and the ring is drained.
    ///
    /// # Errors
    /// A fatal book fault stops the loop and is returned.
    pub fn run(
        &mut self,
        input: &mut Consumer<ClientRequest>,
        responses: &mut Producer<ClientResponse>,
        updates: &mut Producer<MarketUpdate>,
        shutdown: &AtomicBool,
    ) -> EngineResult<RunStats> {
        if self.config.pin_core && !self.pin_to_core() {
            warn!("could not pin matching engine to a core");
        }
        self.warm_up();

        info!(instruments = self.books.len(), "matching engine running");

        let mut sink = QueueSink::new(responses, updates);
        let mut requests = 0u64;

        loop {
            if shutdown.load(Ordering::Acquire) {
                break;
            }

            match input.pop() {
                Ok(request) => {
                    requests += 1;
                    if let Err(err) = self.process(request, &mut sink) {
                        error!(%err, requests, "fatal fault, stopping matching engine");
                        return Err(err);
                    }
                }
                Err(_) if input.is_abandoned() && input.is_empty() => break,
                Err(_) => std::hint::spin_loop(),
            }
        }

        let stats = RunStats {
            requests,
            queue: sink.stats(),
        };
        info!(
            requests = stats.requests,
            responses = stats.queue.responses,
            updates = stats.queue.updates,
            stalls = stats.queue.stalls,
            "matching engine stopped"
        );

        Ok(stats)
    }

    /// Pin the current thread to the last available CPU core.
    ///
    /// The last core is typically isolated from OS interrupts.
    pub fn pin_to_core(&self) -> bool {
        core_affinity::get_core_ids()
            .and_then(|ids| ids.last().copied())
            .map_or(false, core_affinity::set_for_current)
    }

    /// Warm up every book by pre-faulting memory pages.
    pub fn warm_up(&mut self) {
        for book in &mut self.books {
            book.warm_up();
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn book(&self, ticker_id: TickerId) -> Option<&OrderBook> {
        self.books.get(ticker_id as usize)
    }

    #[inline]
    pub fn books(&self) -> &[OrderBook] {
        &self.books
    }

    #[inline]
    pub fn best_bid(&self, ticker_id: TickerId) -> Option<Price> {
        self.book(ticker_id).and_then(OrderBook::best_bid)
    }

    #[inline]
    pub fn best_ask(&self, ticker_id: TickerId) -> Option<Price> {
        self.book(ticker_id).and_then(OrderBook::best_ask)
    }

    /// Resting orders across all books.
    pub fn order_count(&self) -> usize {
        self.books.iter().map(OrderBook::order_count).sum()
    }

    /// Compute a hash of the current state (for determinism testing)
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        for book in &self.books {
            book.ticker_id().hash(&mut hasher);
            book.last_exchange_order_id.hash(&mut hasher);
            book.order_count().hash(&mut hasher);
            book.depth(Side::Bid).hash(&mut hasher);
            book.depth(Side::Ask).hash(&mut hasher);
        }

        hasher.finish()
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::build(EngineConfig::default())
    }
}

impl std::fmt::Debug for MatchingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchingEngine")
            .field("config", &self.config)
            .field("books", &self.books)
            .finish()
    }
}
