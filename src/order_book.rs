//! Order Book - The central limit order book for one instrument.
//!
//! Price levels on each side form a circular doubly-linked chain whose
//! head is the top of book (highest bid, lowest ask). Each level holds a
//! circular FIFO chain of orders. Two lookup tables give O(1) access:
//! price -> level for inserts, (client, client order id) -> order for cancels.
//!
//! All storage comes from two fixed-capacity arenas sized at construction.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::arena::{Arena, ArenaIndex, OrderNode, NULL_INDEX};
use crate::command::{ClientId, OrderId, Price, Side, TickerId};
use crate::error::{EngineError, EngineResult};
use crate::price_level::PriceLevel;

/// Lookup key for live orders: (client id, client order id)
pub type ClientOrderKey = (ClientId, OrderId);

/// Limit order book for a single instrument.
///
/// Owned by exactly one thread; nothing in here is synchronized.
pub struct OrderBook {
    pub(crate) ticker_id: TickerId,
    /// Storage for resting orders
    pub(crate) orders: Arena<OrderNode>,
    /// Storage for price levels
    pub(crate) levels: Arena<PriceLevel>,
    /// Top bid level, or `NULL_INDEX` when there are no bids
    pub(crate) best_bid: ArenaIndex,
    /// Top ask level, or `NULL_INDEX` when there are no asks
    pub(crate) best_ask: ArenaIndex,
    /// Live orders by client key
    pub(crate) client_orders: FxHashMap<ClientOrderKey, ArenaIndex>,
    /// Live levels by price. A price is never live on both sides at once,
    /// since the second order to arrive would have crossed the first.
    pub(crate) price_levels: FxHashMap<Price, ArenaIndex>,
    /// Last exchange order id handed out
    pub(crate) last_exchange_order_id: OrderId,
}

impl OrderBook {
    /// Create an empty book with room for `max_orders` resting orders
    /// spread over at most `max_levels` prices.
    pub fn new(ticker_id: TickerId, max_orders: u32, max_levels: u32) -> Self {
        Self {
            ticker_id,
            orders: Arena::new(max_orders),
            levels: Arena::new(max_levels),
            best_bid: NULL_INDEX,
            best_ask: NULL_INDEX,
            client_orders: FxHashMap::with_capacity_and_hasher(
                max_orders as usize,
                Default::default(),
            ),
            price_levels: FxHashMap::with_capacity_and_hasher(
                max_levels as usize,
                Default::default(),
            ),
            last_exchange_order_id: 0,
        }
    }

    #[inline]
    pub fn ticker_id(&self) -> TickerId {
        self.ticker_id
    }

    // ========================================================================
    // Best Price Access
    // ========================================================================

    /// Get the best bid price (highest buy price)
    #[inline]
    pub fn best_bid(&self) -> Option<Price> {
        self.best_price(Side::Bid)
    }

    /// Get the best ask price (lowest sell price)
    #[inline]
    pub fn best_ask(&self) -> Option<Price> {
        self.best_price(Side::Ask)
    }

    #[inline]
    pub fn best_price(&self, side: Side) -> Option<Price> {
        match self.top_level(side) {
            NULL_INDEX => None,
            idx => Some(self.levels.get(idx).price),
        }
    }

    /// Calculate spread (best_ask - best_bid)
    pub fn spread(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) if ask > bid => Some(ask - bid),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn top_level(&self, side: Side) -> ArenaIndex {
        match side {
            Side::Bid => self.best_bid,
            Side::Ask => self.best_ask,
        }
    }

    #[inline]
    fn set_top_level(&mut self, side: Side, index: ArenaIndex) {
        match side {
            Side::Bid => self.best_bid = index,
            Side::Ask => self.best_ask = index,
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Number of resting orders
    #[inline]
    pub fn order_count(&self) -> usize {
        self.client_orders.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.client_orders.is_empty()
    }

    /// Number of price levels on one side
    pub fn level_count(&self, side: Side) -> usize {
        self.level_chain(side).count()
    }

    /// Get depth at a price level: (total quantity, order count)
    pub fn depth_at(&self, side: Side, price: Price) -> (u64, u32) {
        self.price_levels
            .get(&price)
            .map(|&idx| self.levels.get(idx))
            .filter(|level| level.side == side)
            .map(|level| (level.total_qty, level.count))
            .unwrap_or((0, 0))
    }

    /// All levels on one side, best first: (price, total quantity, order count)
    pub fn depth(&self, side: Side) -> Vec<(Price, u64, u32)> {
        self.level_chain(side)
            .map(|idx| {
                let level = self.levels.get(idx);
                (level.price, level.total_qty, level.count)
            })
            .collect()
    }

    /// Look up a live order by its client key.
    #[inline]
    pub fn order(&self, client_id: ClientId, client_order_id: OrderId) -> Option<&OrderNode> {
        self.client_orders
            .get(&(client_id, client_order_id))
            .map(|&idx| self.orders.get(idx))
    }

    /// Resting orders at one price, oldest first.
    pub fn orders_at(&self, side: Side, price: Price) -> Vec<OrderNode> {
        match self.price_levels.get(&price) {
            Some(&idx) if self.levels.get(idx).side == side => {
                self.order_chain(idx).map(|o| *self.orders.get(o)).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Order slots currently taken
    #[inline]
    pub fn orders_allocated(&self) -> u32 {
        self.orders.allocated()
    }

    /// Level slots currently taken
    #[inline]
    pub fn levels_allocated(&self) -> u32 {
        self.levels.allocated()
    }

    /// Pre-fault both arenas.
    pub fn warm_up(&mut self) {
        self.orders.warm_up();
        self.levels.warm_up();
    }

    // ========================================================================
    // Chain Walking
    // ========================================================================

    /// Level indices on one side, from top of book outwards.
    pub(crate) fn level_chain(&self, side: Side) -> impl Iterator<Item = ArenaIndex> + '_ {
        let top = self.top_level(side);
        std::iter::successors((top != NULL_INDEX).then_some(top), move |&idx| {
            let next = self.levels.get(idx).next;
            (next != top).then_some(next)
        })
    }

    /// Order indices at one level, oldest first.
    pub(crate) fn order_chain(&self, level: ArenaIndex) -> impl Iterator<Item = ArenaIndex> + '_ {
        let head = self.levels.get(level).head;
        std::iter::successors((head != NULL_INDEX).then_some(head), move |&idx| {
            let next = self.orders.get(idx).next;
            (next != head).then_some(next)
        })
    }

    // ========================================================================
    // Level Management
    // ========================================================================

    /// Find the level at `price`, creating and linking it if absent.
    pub(crate) fn get_or_create_level(&mut self, side: Side, price: Price) -> EngineResult<ArenaIndex> {
        if let Some(&idx) = self.price_levels.get(&price) {
            debug_assert_eq!(self.levels.get(idx).side, side, "price live on both sides");
            return Ok(idx);
        }

        let idx = self
            .levels
            .insert(PriceLevel::new(side, price))
            .ok_or(EngineError::LevelPoolExhausted {
                ticker_id: self.ticker_id,
                capacity: self.levels.capacity(),
            })?;
        self.price_levels.insert(price, idx);
        self.link_level(idx);

        Ok(idx)
    }

    /// Splice a fresh level into its side's chain at the sorted position.
    fn link_level(&mut self, index: ArenaIndex) {
        let (side, price) = {
            let level = self.levels.get(index);
            (level.side, level.price)
        };

        let top = self.top_level(side);
        if top == NULL_INDEX {
            let level = self.levels.get_mut(index);
            level.prev = index;
            level.next = index;
            self.set_top_level(side, index);
            return;
        }

        // Stop at the first level the new price beats; wrapping back to
        // the top means it is the worst and goes at the tail.
        let mut cursor = top;
        loop {
            if side.is_better(price, self.levels.get(cursor).price) {
                break;
            }
            cursor = self.levels.get(cursor).next;
            if cursor == top {
                break;
            }
        }

        let prev = self.levels.get(cursor).prev;
        {
            let level = self.levels.get_mut(index);
            level.prev = prev;
            level.next = cursor;
        }
        self.levels.get_mut(prev).next = index;
        self.levels.get_mut(cursor).prev = index;

        if cursor == top && side.is_better(price, self.levels.get(top).price) {
            self.set_top_level(side, index);
        }
    }

    /// Unlink an empty level, advance top of book if needed, and free it.
    fn remove_level(&mut self, index: ArenaIndex) {
        let level = *self.levels.get(index);
        debug_assert!(level.is_empty());

        if level.next == index {
            self.set_top_level(level.side, NULL_INDEX);
        } else {
            self.levels.get_mut(level.prev).next = level.next;
            self.levels.get_mut(level.next).prev = level.prev;
            if self.top_level(level.side) == index {
                self.set_top_level(level.side, level.next);
            }
        }

        self.price_levels.remove(&level.price);
        self.levels.free(index);
    }

    // ========================================================================
    // Order Removal
    // ========================================================================

    /// Take a resting order out of the book entirely: FIFO chain, level
    /// (if it empties), client lookup and arena slot.
    pub(crate) fn remove_order(&mut self, index: ArenaIndex) {
        let node = *self.orders.get(index);

        if self.levels.get_mut(node.level).remove(&mut self.orders, index) {
            self.remove_level(node.level);
        }
        self.client_orders.remove(&(node.client_id, node.client_order_id));
        self.orders.free(index);
    }

    // ========================================================================
    // Diagnostics (not for the hot path)
    // ========================================================================

    /// Human-readable dump of both sides, asks above bids.
    ///
    /// With `validate`, panics if adjacent levels are out of price order.
    pub fn dump(&self, detailed: bool, validate: bool) -> String {
        BookDump { book: self, detailed, validate }.to_string()
    }

    /// Write the dump into any formatter or buffer.
    pub fn write_dump<W: fmt::Write>(&self, out: &mut W, detailed: bool, validate: bool) -> fmt::Result {
        writeln!(out, "Ticker:{}", self.ticker_id)?;
        self.write_side(out, Side::Ask, detailed, validate)?;
        writeln!(out, "\n                          X\n")?;
        self.write_side(out, Side::Bid, detailed, validate)
    }

    fn write_side<W: fmt::Write>(&self, out: &mut W, side: Side, detailed: bool, validate: bool) -> fmt::Result {
        let label = match side {
            Side::Bid => "BIDS",
            Side::Ask => "ASKS",
        };
        let mut last_price: Option<Price> = None;

        for (n, idx) in self.level_chain(side).enumerate() {
            let level = self.levels.get(idx);
            let prev_price = self.levels.get(level.prev).price;
            let next_price = self.levels.get(level.next).price;

            write!(
                out,
                "{label} L:{n} => <px:{:>3} prev:{:>3} next:{:>3}> {:<3} @ {:<5}({:<4})",
                level.price, prev_price, next_price, level.price, level.total_qty, level.count
            )?;
            if detailed {
                for o in self.order_chain(idx) {
                    let order = self.orders.get(o);
                    write!(
                        out,
                        " [oid:{} q:{} prio:{} prev:{} next:{}]",
                        order.exchange_order_id,
                        order.qty,
                        order.priority,
                        self.orders.get(order.prev).exchange_order_id,
                        self.orders.get(order.next).exchange_order_id,
                    )?;
                }
            }
            writeln!(out)?;

            if validate {
                if let Some(last) = last_price {
                    assert!(
                        side.is_better(last, level.price),
                        "{label} not sorted by price, last:{last} level:{level:?}"
                    );
                }
                last_price = Some(level.price);
            }
        }

        Ok(())
    }

    /// Full structural consistency check.
    ///
    /// # Panics
    /// On any broken invariant. A violation means the book itself is
    /// corrupt, so there is nothing to recover.
    pub fn validate(&self) {
        let mut orders_seen = 0usize;
        let mut levels_seen = 0usize;

        for side in [Side::Bid, Side::Ask] {
            let mut last_price: Option<Price> = None;

            for idx in self.level_chain(side) {
                let level = self.levels.get(idx);
                levels_seen += 1;

                assert_eq!(level.side, side, "level {idx} on wrong side chain");
                assert!(!level.is_empty(), "empty level at {}", level.price);
                assert_eq!(self.levels.get(level.next).prev, idx, "broken level links at {}", level.price);
                assert_eq!(
                    self.price_levels.get(&level.price),
                    Some(&idx),
                    "price table out of sync at {}",
                    level.price
                );
                if let Some(last) = last_price {
                    assert!(
                        side.is_better(last, level.price),
                        "{side:?} levels out of order: {last} then {}",
                        level.price
                    );
                }
                last_price = Some(level.price);

                let mut last_priority = None;
                let mut qty_sum = 0u64;
                let mut count = 0u32;
                for o in self.order_chain(idx) {
                    let order = self.orders.get(o);
                    orders_seen += 1;
                    count += 1;
                    qty_sum += order.qty as u64;

                    assert!(order.qty > 0, "zero-quantity order {}", order.exchange_order_id);
                    assert_eq!(order.level, idx, "order {} points at wrong level", order.exchange_order_id);
                    assert_eq!(order.side, side);
                    assert_eq!(order.price, level.price);
                    assert_eq!(self.orders.get(order.next).prev, o, "broken order links");
                    assert!(
                        last_priority.map_or(true, |p| p < order.priority),
                        "priorities not ascending at {}",
                        level.price
                    );
                    assert!(order.priority < level.next_priority);
                    last_priority = Some(order.priority);
                    assert_eq!(
                        self.client_orders.get(&(order.client_id, order.client_order_id)),
                        Some(&o),
                        "client table out of sync for order {}",
                        order.exchange_order_id
                    );
                }
                assert_eq!(count, level.count, "level count wrong at {}", level.price);
                assert_eq!(qty_sum, level.total_qty, "level quantity wrong at {}", level.price);
            }
        }

        assert_eq!(orders_seen, self.client_orders.len(), "orphaned client table entries");
        assert_eq!(orders_seen, self.orders.allocated() as usize, "leaked order slots");
        assert_eq!(levels_seen, self.price_levels.len(), "orphaned price table entries");
        assert_eq!(levels_seen, self.levels.allocated() as usize, "leaked level slots");

        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            assert!(bid < ask, "book crossed: bid {bid} >= ask {ask}");
        }
    }
}

/// Dump options bound to a book, so `dump` can go through `ToString`.
struct BookDump<'a> {
    book: &'a OrderBook,
    detailed: bool,
    validate: bool,
}

impl fmt::Display for BookDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.book.write_dump(f, self.detailed, self.validate)
    }
}

impl fmt::Display for OrderBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_dump(f, false, false)
    }
}

impl fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderBook")
            .field("ticker_id", &self.ticker_id)
            .field("best_bid", &self.best_bid())
            .field("best_ask", &self.best_ask())
            .field("levels", &self.price_levels.len())
            .field("order_count", &self.client_orders.len())
            .finish()
    }
}
