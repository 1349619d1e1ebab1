//! Request and event records for the matching engine.
//!
//! Requests arrive from the order gateway side. Client responses go back
//! to the gateway, market updates go to the market-data publisher.

use serde::Serialize;

/// Client identifier, scoped per venue session
pub type ClientId = u32;
/// Order identifier (client-assigned or exchange-assigned)
pub type OrderId = u64;
/// Instrument identifier; indexes the engine's books
pub type TickerId = u32;
/// Fixed-point price in ticks
pub type Price = u64;
/// Order quantity
pub type Qty = u32;
/// Arrival rank of an order within its price level
pub type Priority = u64;

/// Order side (bid = buy, ask = sell)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    Bid = 0,
    /// Sell side (asks)
    Ask = 1,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    /// True if `price` is strictly better than `other` on this side:
    /// higher for bids, lower for asks.
    #[inline]
    pub const fn is_better(self, price: Price, other: Price) -> bool {
        match self {
            Side::Bid => price > other,
            Side::Ask => price < other,
        }
    }

    /// True if an aggressor on this side with limit `price` can trade
    /// against a resting order at `resting`.
    #[inline]
    pub const fn crosses(self, price: Price, resting: Price) -> bool {
        match self {
            // Buyer willing to pay >= lowest ask
            Side::Bid => price >= resting,
            // Seller willing to accept <= highest bid
            Side::Ask => price <= resting,
        }
    }
}

// ============================================================================
// Input Requests
// ============================================================================

/// Place a new limit order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NewOrder {
    pub client_id: ClientId,
    /// Client-assigned order ID
    pub client_order_id: OrderId,
    pub ticker_id: TickerId,
    pub side: Side,
    /// Fixed-point limit price
    pub price: Price,
    pub qty: Qty,
}

/// Cancel a live order by its client-assigned ID
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CancelOrder {
    pub client_id: ClientId,
    pub client_order_id: OrderId,
    pub ticker_id: TickerId,
}

/// Inbound request record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientRequest {
    New(NewOrder),
    Cancel(CancelOrder),
}

impl ClientRequest {
    #[inline]
    pub const fn ticker_id(&self) -> TickerId {
        match self {
            ClientRequest::New(order) => order.ticker_id,
            ClientRequest::Cancel(cancel) => cancel.ticker_id,
        }
    }
}

// ============================================================================
// Client Responses
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ClientResponseKind {
    Accepted = 0,
    Canceled = 1,
    Filled = 2,
    CancelRejected = 3,
    Invalid = 4,
}

/// Execution report sent back to the owning client.
///
/// Fields that do not apply to a given kind are `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClientResponse {
    pub kind: ClientResponseKind,
    pub client_id: ClientId,
    pub ticker_id: TickerId,
    pub client_order_id: OrderId,
    pub exchange_order_id: Option<OrderId>,
    pub side: Option<Side>,
    pub price: Option<Price>,
    /// Quantity executed by this fill
    pub fill_qty: Option<Qty>,
    /// Quantity still open after this event
    pub leaves_qty: Option<Qty>,
}

// ============================================================================
// Market Updates
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum MarketUpdateKind {
    Add = 0,
    Modify = 1,
    Cancel = 2,
    Trade = 3,
}

/// Order-by-order public market data.
///
/// Trades are anonymous: `exchange_order_id` and `priority` are `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct MarketUpdate {
    pub kind: MarketUpdateKind,
    pub exchange_order_id: Option<OrderId>,
    pub ticker_id: TickerId,
    pub side: Side,
    pub price: Price,
    pub qty: Qty,
    pub priority: Option<Priority>,
}
