//! Fatal engine faults.
//!
//! Rejections a client can cause (unknown order, bad quantity) are not
//! errors: they travel on the response stream like any other event.
//! The variants here stop the engine.

use thiserror::Error;

use crate::command::TickerId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// More concurrently live orders than the book was provisioned for
    #[error("order pool exhausted for ticker {ticker_id} (capacity {capacity})")]
    OrderPoolExhausted { ticker_id: TickerId, capacity: u32 },

    /// More concurrently live price levels than the book was provisioned for
    #[error("price level pool exhausted for ticker {ticker_id} (capacity {capacity})")]
    LevelPoolExhausted { ticker_id: TickerId, capacity: u32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
