//! Arena Allocator - O(1) pool with cache-line aligned nodes.
//!
//! The arena pre-allocates a contiguous block of nodes at startup,
//! eliminating heap allocation in the hot path. Free slots are chained
//! through each node's own link field, giving O(1) acquire and release.

use std::fmt;

use crate::command::{ClientId, OrderId, Price, Priority, Qty, Side};

/// Link value meaning "no slot": end of a free list, empty level, empty side
pub const NULL_INDEX: u32 = u32::MAX;

/// Slot number inside an [`Arena`]; stands in for a pointer in every link.
pub type ArenaIndex = u32;

/// A record that can be stored in an [`Arena`].
///
/// While a slot is free, the arena borrows its link field to chain
/// the free list, so no side table is needed.
pub trait ArenaNode: Copy {
    /// Contents of an unused slot.
    const EMPTY: Self;

    /// Link used to chain free slots.
    fn free_link(&self) -> ArenaIndex;

    fn set_free_link(&mut self, index: ArenaIndex);
}

/// A resting order - exactly 64 bytes (one cache line).
///
/// # Memory Layout
///
/// | Field             | Type     | Offset | Size |
/// |-------------------|----------|--------|------|
/// | price             | u64      | 0      | 8    |
/// | qty               | u32      | 8      | 4    |
/// | client_id         | u32      | 12     | 4    |
/// | exchange_order_id | u64      | 16     | 8    |
/// | client_order_id   | u64      | 24     | 8    |
/// | priority          | u64      | 32     | 8    |
/// | next              | u32      | 40     | 4    |
/// | prev              | u32      | 44     | 4    |
/// | level             | u32      | 48     | 4    |
/// | side              | u8       | 52     | 1    |
/// | _reserved         | [u8; 11] | 53     | 11   |
/// | **Total**         |          |        | 64   |
#[repr(C)]
#[repr(align(64))]
#[derive(Clone, Copy)]
pub struct OrderNode {
    // === Read on every fill ===

    /// Fixed-point limit price
    pub price: Price,

    /// Remaining (leaves) quantity
    pub qty: Qty,

    /// Owning client
    pub client_id: ClientId,

    /// Identifier assigned by the book on acceptance
    pub exchange_order_id: OrderId,

    /// Identifier assigned by the client, opaque to the book
    pub client_order_id: OrderId,

    /// Arrival rank within the price level
    pub priority: Priority,

    // === Linkage (circular FIFO chain within a PriceLevel) ===

    /// Next (younger) order at the same level; wraps to the head
    pub next: ArenaIndex,

    /// Previous (older) order; the head's `prev` is the tail
    pub prev: ArenaIndex,

    /// The level this order rests in
    pub level: ArenaIndex,

    pub side: Side,

    pub _reserved: [u8; 11],
}

// One node per cache line
const _: () = assert!(std::mem::size_of::<OrderNode>() == 64, "OrderNode grew past a cache line");
const _: () = assert!(std::mem::align_of::<OrderNode>() == 64, "OrderNode lost its cache-line alignment");

impl OrderNode {
    /// Create a new, unlinked order node
    #[inline]
    pub fn new(
        exchange_order_id: OrderId,
        client_id: ClientId,
        client_order_id: OrderId,
        side: Side,
        price: Price,
        qty: Qty,
    ) -> Self {
        Self {
            price,
            qty,
            client_id,
            exchange_order_id,
            client_order_id,
            side,
            ..Self::EMPTY
        }
    }
}

impl ArenaNode for OrderNode {
    const EMPTY: Self = Self {
        price: 0,
        qty: 0,
        client_id: 0,
        exchange_order_id: 0,
        client_order_id: 0,
        priority: 0,
        next: NULL_INDEX,
        prev: NULL_INDEX,
        level: NULL_INDEX,
        side: Side::Bid,
        _reserved: [0u8; 11],
    };

    #[inline]
    fn free_link(&self) -> ArenaIndex {
        self.next
    }

    #[inline]
    fn set_free_link(&mut self, index: ArenaIndex) {
        self.next = index;
    }
}

impl fmt::Debug for OrderNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderNode")
            .field("exchange_order_id", &self.exchange_order_id)
            .field("client_id", &self.client_id)
            .field("client_order_id", &self.client_order_id)
            .field("side", &self.side)
            .field("price", &self.price)
            .field("qty", &self.qty)
            .field("priority", &self.priority)
            .field("level", &self.level)
            .field("prev", &self.prev)
            .field("next", &self.next)
            .finish()
    }
}

/// Fixed-capacity slot pool. Acquire and release are O(1) and never
/// touch the allocator after construction.
///
/// Single-threaded: only the owning book may touch it.
pub struct Arena<T: ArenaNode> {
    slots: Vec<T>,
    /// First free slot, `NULL_INDEX` when exhausted
    free_head: ArenaIndex,
    in_use: u32,
    capacity: u32,
}

impl<T: ArenaNode> Arena<T> {
    /// Allocate all `capacity` slots up front, every one on the free list.
    ///
    /// # Panics
    /// If `capacity` reaches `NULL_INDEX`, which is reserved as the null link.
    pub fn new(capacity: u32) -> Self {
        assert!(capacity < NULL_INDEX, "arena capacity {capacity} collides with NULL_INDEX");

        let mut slots = vec![T::EMPTY; capacity as usize];
        for (i, slot) in slots.iter_mut().enumerate() {
            let next = i as u32 + 1;
            slot.set_free_link(if next < capacity { next } else { NULL_INDEX });
        }

        Self {
            slots,
            free_head: if capacity == 0 { NULL_INDEX } else { 0 },
            in_use: 0,
            capacity,
        }
    }

    /// Pop a slot off the free list, reset to `T::EMPTY`. `None` when full.
    #[inline]
    pub fn alloc(&mut self) -> Option<ArenaIndex> {
        let index = match self.free_head {
            NULL_INDEX => return None,
            head => head,
        };

        let slot = &mut self.slots[index as usize];
        self.free_head = slot.free_link();
        *slot = T::EMPTY;
        self.in_use += 1;

        Some(index)
    }

    /// Take a slot and move `node` into it.
    #[inline]
    pub fn insert(&mut self, node: T) -> Option<ArenaIndex> {
        let index = self.alloc()?;
        self.slots[index as usize] = node;
        Some(index)
    }

    /// Push a slot back on the free list.
    ///
    /// `index` must be live; a double free is only caught in debug builds.
    #[inline]
    pub fn free(&mut self, index: ArenaIndex) {
        debug_assert!(index < self.capacity, "slot {index} out of range");
        debug_assert!(self.in_use > 0, "free on an empty arena");

        let slot = &mut self.slots[index as usize];
        *slot = T::EMPTY;
        slot.set_free_link(self.free_head);
        self.free_head = index;
        self.in_use -= 1;
    }

    #[inline]
    pub fn get(&self, index: ArenaIndex) -> &T {
        debug_assert!(index < self.capacity, "slot {index} out of range");
        &self.slots[index as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, index: ArenaIndex) -> &mut T {
        debug_assert!(index < self.capacity, "slot {index} out of range");
        &mut self.slots[index as usize]
    }

    /// Slots currently handed out
    #[inline]
    pub fn allocated(&self) -> u32 {
        self.in_use
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.in_use == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.free_head == NULL_INDEX
    }

    /// Touch every slot so the OS maps the backing pages before the first
    /// request arrives. Contents are left as they were.
    pub fn warm_up(&mut self) {
        for slot in &mut self.slots {
            let ptr: *mut T = slot;
            // SAFETY: `ptr` is derived from a live exclusive reference.
            unsafe { ptr.write_volatile(ptr.read_volatile()) };
        }
    }
}

impl<T: ArenaNode> fmt::Debug for Arena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity)
            .field("in_use", &self.in_use)
            .field("free_head", &self.free_head)
            .finish()
    }
}
