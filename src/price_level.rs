//! Price Level - A FIFO queue of orders at a single price point.
//!
//! Orders form a circular doubly-linked list through arena indices:
//! the head is the oldest order and `head.prev` is the newest, giving
//! O(1) append, O(1) removal from any position and O(1) tail access.
//! Levels themselves are chained the same way, per side, by the book.

use crate::arena::{Arena, ArenaIndex, ArenaNode, OrderNode, NULL_INDEX};
use crate::command::{Price, Priority, Qty, Side};

/// All resting orders at one price on one side.
#[derive(Clone, Copy, Debug)]
pub struct PriceLevel {
    pub side: Side,
    pub price: Price,
    /// Oldest order; the next maker to trade at this price
    pub head: ArenaIndex,
    /// Priority handed to the next order appended here
    pub next_priority: Priority,
    /// Sum of open qty, widened so many max-qty orders cannot overflow
    pub total_qty: u64,
    pub count: u32,
    /// Next better level on the same side; the top level's `prev` is the worst level
    pub prev: ArenaIndex,
    /// Next worse level on the same side; the worst level's `next` is the top level
    pub next: ArenaIndex,
}

impl PriceLevel {
    /// Empty level, not yet spliced into a side
    #[inline]
    pub const fn new(side: Side, price: Price) -> Self {
        Self {
            side,
            price,
            head: NULL_INDEX,
            next_priority: 1,
            total_qty: 0,
            count: 0,
            prev: NULL_INDEX,
            next: NULL_INDEX,
        }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Link `index` in as the newest order and stamp the level's next priority on it.
    #[inline]
    pub fn push_back(&mut self, orders: &mut Arena<OrderNode>, index: ArenaIndex) -> Priority {
        let priority = self.next_priority;
        self.next_priority += 1;

        if self.head == NULL_INDEX {
            let node = orders.get_mut(index);
            node.prev = index;
            node.next = index;
            self.head = index;
        } else {
            let head = self.head;
            let tail = orders.get(head).prev;
            let node = orders.get_mut(index);
            node.prev = tail;
            node.next = head;
            orders.get_mut(tail).next = index;
            orders.get_mut(head).prev = index;
        }

        let node = orders.get_mut(index);
        node.priority = priority;
        self.count += 1;
        self.total_qty += node.qty as u64;

        priority
    }

    /// Unlink `index` wherever it sits in the queue. Returns whether the level
    /// emptied. The slot stays allocated; releasing it is the book's job.
    #[inline]
    pub fn remove(&mut self, orders: &mut Arena<OrderNode>, index: ArenaIndex) -> bool {
        let node = orders.get(index);
        let prev_idx = node.prev;
        let next_idx = node.next;
        let qty = node.qty;

        if next_idx == index {
            // Sole order at this level
            debug_assert!(self.head == index && self.count == 1);
            self.head = NULL_INDEX;
        } else {
            orders.get_mut(prev_idx).next = next_idx;
            orders.get_mut(next_idx).prev = prev_idx;
            if self.head == index {
                self.head = next_idx;
            }
        }

        self.count -= 1;
        self.total_qty -= qty as u64;

        let node = orders.get_mut(index);
        node.prev = NULL_INDEX;
        node.next = NULL_INDEX;

        self.count == 0
    }

    #[inline]
    pub const fn peek_head(&self) -> ArenaIndex {
        self.head
    }

    /// Newest order, `NULL_INDEX` when empty
    #[inline]
    pub fn peek_tail(&self, orders: &Arena<OrderNode>) -> ArenaIndex {
        if self.head == NULL_INDEX {
            NULL_INDEX
        } else {
            orders.get(self.head).prev
        }
    }

    /// Keep `total_qty` in step with a maker that was partially filled in place.
    #[inline]
    pub fn subtract_qty(&mut self, qty: Qty) {
        debug_assert!(self.total_qty >= qty as u64);
        self.total_qty -= qty as u64;
    }
}

impl ArenaNode for PriceLevel {
    const EMPTY: Self = PriceLevel::new(Side::Bid, 0);

    #[inline]
    fn free_link(&self) -> ArenaIndex {
        self.next
    }

    #[inline]
    fn set_free_link(&mut self, index: ArenaIndex) {
        self.next = index;
    }
}
