//! Matching - the add / cross / rest / cancel algorithms.
//!
//! Implements continuous price-time priority:
//! 1. ACCEPT: Assign an exchange order id and acknowledge
//! 2. CROSSING: Match against the opposite side, best price first,
//!    oldest order first within a price
//! 3. RESTING: Post any remainder at the limit price

use tracing::{debug, error};

use crate::arena::{ArenaIndex, OrderNode, NULL_INDEX};
use crate::command::{
    ClientId, ClientResponse, ClientResponseKind, MarketUpdate, MarketUpdateKind, OrderId, Price,
    Qty, Side, TickerId,
};
use crate::error::{EngineError, EngineResult};
use crate::order_book::OrderBook;
use crate::sink::EventSink;

/// The aggressing side of a match.
#[derive(Clone, Copy, Debug)]
struct Taker {
    client_id: ClientId,
    client_order_id: OrderId,
    exchange_order_id: OrderId,
    side: Side,
}

impl OrderBook {
    /// Process a new limit order.
    ///
    /// Emits ACCEPTED before anything else, then fills, then an ADD if a
    /// remainder rests. Zero quantity or a client order id that is still
    /// live for this client is answered with INVALID and changes nothing.
    ///
    /// # Errors
    /// Pool exhaustion when the remainder must rest. Crossing already done
    /// in this call stays applied and the book remains consistent.
    pub fn add<S: EventSink>(
        &mut self,
        sink: &mut S,
        client_id: ClientId,
        client_order_id: OrderId,
        side: Side,
        price: Price,
        qty: Qty,
    ) -> EngineResult<()> {
        if qty == 0 || self.client_orders.contains_key(&(client_id, client_order_id)) {
            debug!(
                ticker_id = self.ticker_id,
                client_id, client_order_id, qty, "rejecting new order"
            );
            sink.send_client_response(ClientResponse {
                kind: ClientResponseKind::Invalid,
                client_id,
                ticker_id: self.ticker_id,
                client_order_id,
                exchange_order_id: None,
                side: Some(side),
                price: Some(price),
                fill_qty: None,
                leaves_qty: Some(qty),
            });
            return Ok(());
        }

        self.last_exchange_order_id += 1;
        let taker = Taker {
            client_id,
            client_order_id,
            exchange_order_id: self.last_exchange_order_id,
            side,
        };

        sink.send_client_response(ClientResponse {
            kind: ClientResponseKind::Accepted,
            client_id,
            ticker_id: self.ticker_id,
            client_order_id,
            exchange_order_id: Some(taker.exchange_order_id),
            side: Some(side),
            price: Some(price),
            fill_qty: Some(0),
            leaves_qty: Some(qty),
        });

        let leaves = self.cross(sink, &taker, price, qty);
        if leaves > 0 {
            self.rest(sink, &taker, price, leaves)?;
        }

        Ok(())
    }

    /// Cancel a live order by its client key.
    ///
    /// Unknown or already-dead orders get CANCEL_REJECTED and no market
    /// update.
    pub fn cancel<S: EventSink>(&mut self, sink: &mut S, client_id: ClientId, client_order_id: OrderId) {
        let Some(&index) = self.client_orders.get(&(client_id, client_order_id)) else {
            debug!(
                ticker_id = self.ticker_id,
                client_id, client_order_id, "cancel for unknown order"
            );
            sink.send_client_response(cancel_rejected(client_id, self.ticker_id, client_order_id));
            return;
        };

        let order = *self.orders.get(index);
        self.remove_order(index);

        sink.send_market_update(MarketUpdate {
            kind: MarketUpdateKind::Cancel,
            exchange_order_id: Some(order.exchange_order_id),
            ticker_id: self.ticker_id,
            side: order.side,
            price: order.price,
            qty: 0,
            priority: Some(order.priority),
        });
        sink.send_client_response(ClientResponse {
            kind: ClientResponseKind::Canceled,
            client_id,
            ticker_id: self.ticker_id,
            client_order_id,
            exchange_order_id: Some(order.exchange_order_id),
            side: Some(order.side),
            price: Some(order.price),
            fill_qty: None,
            leaves_qty: Some(order.qty),
        });
    }

    /// Cross an incoming order against the opposite side.
    ///
    /// # Returns
    /// Remaining quantity after matching
    fn cross<S: EventSink>(&mut self, sink: &mut S, taker: &Taker, price: Price, mut leaves: Qty) -> Qty {
        let maker_side = taker.side.opposite();

        while leaves > 0 {
            let top = self.top_level(maker_side);
            if top == NULL_INDEX {
                break;
            }

            let level = self.levels.get(top);
            if !taker.side.crosses(price, level.price) {
                break;
            }

            let maker = level.peek_head();
            leaves = self.fill(sink, taker, maker, leaves);
        }

        leaves
    }

    /// Execute one fill between the taker and the resting order at `maker`.
    ///
    /// # Returns
    /// Taker's remaining quantity
    fn fill<S: EventSink>(&mut self, sink: &mut S, taker: &Taker, maker: ArenaIndex, leaves: Qty) -> Qty {
        let resting: OrderNode = *self.orders.get(maker);
        let fill_qty = leaves.min(resting.qty);
        let leaves = leaves - fill_qty;
        let maker_leaves = resting.qty - fill_qty;

        sink.send_client_response(ClientResponse {
            kind: ClientResponseKind::Filled,
            client_id: taker.client_id,
            ticker_id: self.ticker_id,
            client_order_id: taker.client_order_id,
            exchange_order_id: Some(taker.exchange_order_id),
            side: Some(taker.side),
            price: Some(resting.price),
            fill_qty: Some(fill_qty),
            leaves_qty: Some(leaves),
        });
        sink.send_client_response(ClientResponse {
            kind: ClientResponseKind::Filled,
            client_id: resting.client_id,
            ticker_id: self.ticker_id,
            client_order_id: resting.client_order_id,
            exchange_order_id: Some(resting.exchange_order_id),
            side: Some(resting.side),
            price: Some(resting.price),
            fill_qty: Some(fill_qty),
            leaves_qty: Some(maker_leaves),
        });
        sink.send_market_update(MarketUpdate {
            kind: MarketUpdateKind::Trade,
            exchange_order_id: None,
            ticker_id: self.ticker_id,
            side: taker.side,
            price: resting.price,
            qty: fill_qty,
            priority: None,
        });

        if maker_leaves == 0 {
            sink.send_market_update(MarketUpdate {
                kind: MarketUpdateKind::Cancel,
                exchange_order_id: Some(resting.exchange_order_id),
                ticker_id: self.ticker_id,
                side: resting.side,
                price: resting.price,
                qty: resting.qty,
                priority: None,
            });
            self.remove_order(maker);
        } else {
            // Partial fill keeps the order at the head of its queue
            self.orders.get_mut(maker).qty = maker_leaves;
            self.levels.get_mut(resting.level).subtract_qty(fill_qty);

            sink.send_market_update(MarketUpdate {
                kind: MarketUpdateKind::Modify,
                exchange_order_id: Some(resting.exchange_order_id),
                ticker_id: self.ticker_id,
                side: resting.side,
                price: resting.price,
                qty: maker_leaves,
                priority: Some(resting.priority),
            });
        }

        leaves
    }

    /// Post the taker's remainder at its limit price.
    fn rest<S: EventSink>(&mut self, sink: &mut S, taker: &Taker, price: Price, qty: Qty) -> EngineResult<()> {
        // Check order capacity before a level can be created for it
        if self.orders.is_full() {
            let err = EngineError::OrderPoolExhausted {
                ticker_id: self.ticker_id,
                capacity: self.orders.capacity(),
            };
            error!(%err, exchange_order_id = taker.exchange_order_id, "cannot rest order");
            return Err(err);
        }

        let level = self.get_or_create_level(taker.side, price).inspect_err(|err| {
            error!(%err, exchange_order_id = taker.exchange_order_id, "cannot rest order");
        })?;

        let mut node = OrderNode::new(
            taker.exchange_order_id,
            taker.client_id,
            taker.client_order_id,
            taker.side,
            price,
            qty,
        );
        node.level = level;
        let index = self.orders.insert(node).ok_or(EngineError::OrderPoolExhausted {
            ticker_id: self.ticker_id,
            capacity: self.orders.capacity(),
        })?;

        let priority = self.levels.get_mut(level).push_back(&mut self.orders, index);
        self.client_orders.insert((taker.client_id, taker.client_order_id), index);

        sink.send_market_update(MarketUpdate {
            kind: MarketUpdateKind::Add,
            exchange_order_id: Some(taker.exchange_order_id),
            ticker_id: self.ticker_id,
            side: taker.side,
            price,
            qty,
            priority: Some(priority),
        });

        Ok(())
    }
}

/// Response for a cancel that matched no live order.
pub(crate) fn cancel_rejected(
    client_id: ClientId,
    ticker_id: TickerId,
    client_order_id: OrderId,
) -> ClientResponse {
    ClientResponse {
        kind: ClientResponseKind::CancelRejected,
        client_id,
        ticker_id,
        client_order_id,
        exchange_order_id: None,
        side: None,
        price: None,
        fill_qty: None,
        leaves_qty: None,
    }
}
