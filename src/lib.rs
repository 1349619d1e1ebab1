//! # Match-LOB
//!
//! The core of a trading venue: per-instrument limit order books with
//! continuous price-time-priority matching, driven by a single engine
//! thread over lock-free SPSC rings.
//!
//! ## Design Principles
//!
//! - **One writer**: the engine thread is the only code that touches a book
//! - **Constant-time paths**: resting at a known price, cancel and each fill
//! - **Fixed memory**: order and level pools sized at startup, `u32` links, one cache line per order
//!
//! ## Architecture
//!
//! ```text
//! [Order Gateway] --> [SPSC requests] --> [Engine Thread (Pinned)] --> [SPSC responses]   --> [Order Gateway]
//!                                                 |
//!                                          [OrderBook x N]          --> [SPSC market data] --> [Publisher]
//! ```

pub mod arena;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod matching;
pub mod order_book;
pub mod price_level;
pub mod replay;
pub mod sink;

pub use arena::{Arena, ArenaIndex, ArenaNode, OrderNode, NULL_INDEX};
pub use command::{
    CancelOrder, ClientId, ClientRequest, ClientResponse, ClientResponseKind, MarketUpdate,
    MarketUpdateKind, NewOrder, OrderId, Price, Priority, Qty, Side, TickerId,
};
pub use config::EngineConfig;
pub use engine::{MatchingEngine, RunStats};
pub use error::{EngineError, EngineResult};
pub use order_book::OrderBook;
pub use price_level::PriceLevel;
pub use sink::{EventLog, EventSink, QueueSink, QueueStats};
