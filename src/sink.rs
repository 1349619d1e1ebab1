//! Event sinks - where a book's output goes.
//!
//! The book never owns its output streams; every operation writes into an
//! [`EventSink`]. [`QueueSink`] feeds the SPSC rings on the engine thread,
//! [`EventLog`] collects into memory for tests, tools and benchmarks.

use rtrb::{Producer, PushError};
use tracing::{error, warn};

use crate::command::{ClientResponse, MarketUpdate};

/// Receiver of the two outbound streams.
///
/// Order within each stream must be preserved; the two streams are
/// independent of each other.
pub trait EventSink {
    fn send_client_response(&mut self, response: ClientResponse);
    fn send_market_update(&mut self, update: MarketUpdate);
}

/// In-memory event collector
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    pub responses: Vec<ClientResponse>,
    pub updates: Vec<MarketUpdate>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.responses.clear();
        self.updates.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty() && self.updates.is_empty()
    }

    /// Move everything from `other` onto the end of this log.
    pub fn append(&mut self, other: &mut EventLog) {
        self.responses.append(&mut other.responses);
        self.updates.append(&mut other.updates);
    }
}

impl EventSink for EventLog {
    #[inline]
    fn send_client_response(&mut self, response: ClientResponse) {
        self.responses.push(response);
    }

    #[inline]
    fn send_market_update(&mut self, update: MarketUpdate) {
        self.updates.push(update);
    }
}

/// Counters kept by [`QueueSink`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Records delivered to the response ring
    pub responses: u64,
    /// Records delivered to the market-data ring
    pub updates: u64,
    /// Times a push found its ring full and had to spin
    pub stalls: u64,
    /// Records discarded because the consumer was gone
    pub dropped: u64,
}

/// Writes events into the outbound SPSC rings.
///
/// A full ring blocks the caller by spinning until the consumer frees a
/// slot: downstream consumers are promised every record in order. A ring
/// whose consumer has been dropped can never drain, so records for it are
/// discarded instead.
pub struct QueueSink<'a> {
    responses: &'a mut Producer<ClientResponse>,
    updates: &'a mut Producer<MarketUpdate>,
    stats: QueueStats,
}

impl<'a> QueueSink<'a> {
    pub fn new(
        responses: &'a mut Producer<ClientResponse>,
        updates: &'a mut Producer<MarketUpdate>,
    ) -> Self {
        Self {
            responses,
            updates,
            stats: QueueStats::default(),
        }
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }
}

/// Push `value`, spinning while the ring is full. Returns `false` if the
/// record had to be dropped.
#[inline]
fn push_blocking<T>(
    producer: &mut Producer<T>,
    mut value: T,
    stats: &mut QueueStats,
    stream: &'static str,
) -> bool {
    let mut stalled = false;
    loop {
        match producer.push(value) {
            Ok(()) => return true,
            Err(PushError::Full(rejected)) => {
                if producer.is_abandoned() {
                    error!(stream, "consumer gone, dropping record");
                    stats.dropped += 1;
                    return false;
                }
                if !stalled {
                    warn!(stream, "outbound queue full, engine stalled");
                    stats.stalls += 1;
                    stalled = true;
                }
                value = rejected;
                std::hint::spin_loop();
            }
        }
    }
}

impl EventSink for QueueSink<'_> {
    #[inline]
    fn send_client_response(&mut self, response: ClientResponse) {
        if push_blocking(self.responses, response, &mut self.stats, "client_responses") {
            self.stats.responses += 1;
        }
    }

    #[inline]
    fn send_market_update(&mut self, update: MarketUpdate) {
        if push_blocking(self.updates, update, &mut self.stats, "market_updates") {
            self.stats.updates += 1;
        }
    }
}
