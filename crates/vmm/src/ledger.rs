//! The residency ledger: resident page pool plus recency order.
//!
//! The ledger owns a fixed number of page-sized slots (the resident pool) and
//! tracks which pages occupy them, ordered by recency of access. The recency
//! order is an intrusive doubly-linked list whose nodes live in an arena
//! indexed by slot, so promoting a page to most-recent and identifying the
//! least-recent page are both O(1). No operation scans the pool.

use alloc::vec::Vec;

use crate::{
    address::PAGE_SIZE,
    numbers::{PageNumber, SlotIndex},
};

/// One slot of the resident pool: the page contents plus its recency links.
struct Slot {
    /// The page occupying this slot, if any.
    page: Option<PageNumber>,
    /// Page contents.
    data: Vec<u8>,
    /// Next more-recently-used slot.
    prev: Option<SlotIndex>,
    /// Next less-recently-used slot.
    next: Option<SlotIndex>,
}

impl Slot {
    fn new() -> Self {
        Self {
            page: None,
            data: alloc::vec![0u8; PAGE_SIZE],
            prev: None,
            next: None,
        }
    }
}

/// Bookkeeping for the resident page pool.
///
/// Invariants: at most `capacity` pages are resident, and every resident page
/// appears exactly once in the recency order.
pub struct ResidencyLedger {
    slots: Vec<Slot>,
    /// Unoccupied slots, kept so fresh allocation order is ascending and
    /// deterministic.
    free: Vec<SlotIndex>,
    /// Most recently used slot.
    head: Option<SlotIndex>,
    /// Least recently used slot.
    tail: Option<SlotIndex>,
    resident: usize,
}

impl ResidencyLedger {
    /// Creates a ledger with `capacity` resident slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "resident capacity must be at least one page");
        let slots = (0..capacity).map(|_| Slot::new()).collect();
        // Popped from the back, so slot 0 is handed out first.
        let free = (0..capacity).rev().map(SlotIndex::new).collect();
        Self {
            slots,
            free,
            head: None,
            tail: None,
            resident: 0,
        }
    }

    /// Returns the maximum number of simultaneously resident pages.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of currently resident pages.
    pub fn resident(&self) -> usize {
        self.resident
    }

    /// Allocates a fresh, unused slot, or `None` if the pool is full.
    pub fn allocate(&mut self) -> Option<SlotIndex> {
        self.free.pop()
    }

    /// Records `page` as occupying `slot` and promotes it to most recent.
    pub fn install(&mut self, slot: SlotIndex, page: PageNumber) {
        debug_assert!(self.slots[slot.as_usize()].page.is_none());
        self.slots[slot.as_usize()].page = Some(page);
        self.resident += 1;
        self.push_front(slot);
    }

    /// Promotes an occupied slot to most recent.
    pub fn touch(&mut self, slot: SlotIndex) {
        if self.head == Some(slot) {
            return;
        }
        self.unlink(slot);
        self.push_front(slot);
    }

    /// Returns the least recently used slot, if any page is resident.
    ///
    /// Pages never touched since installation keep their installation order,
    /// so selection among equally-recent pages is deterministic.
    pub fn least_recent(&self) -> Option<SlotIndex> {
        self.tail
    }

    /// Removes the page from `slot`, dropping it from the recency order.
    ///
    /// The slot itself is not returned to the free pool; the caller reuses it
    /// immediately.
    pub fn evict(&mut self, slot: SlotIndex) -> Option<PageNumber> {
        let page = self.slots[slot.as_usize()].page.take()?;
        self.unlink(slot);
        self.resident -= 1;
        Some(page)
    }

    /// Returns the page occupying `slot`, if any.
    pub fn occupant(&self, slot: SlotIndex) -> Option<PageNumber> {
        self.slots[slot.as_usize()].page
    }

    /// Returns an evicted slot to the free pool instead of reusing it.
    pub fn release(&mut self, slot: SlotIndex) {
        debug_assert!(self.slots[slot.as_usize()].page.is_none());
        self.free.push(slot);
    }

    /// Returns the contents of `slot`.
    pub fn data(&self, slot: SlotIndex) -> &[u8] {
        &self.slots[slot.as_usize()].data
    }

    /// Returns the contents of `slot` mutably.
    pub fn data_mut(&mut self, slot: SlotIndex) -> &mut [u8] {
        &mut self.slots[slot.as_usize()].data
    }

    /// Zero-fills the contents of `slot`.
    pub fn zero(&mut self, slot: SlotIndex) {
        self.slots[slot.as_usize()].data.fill(0);
    }

    /// Copies `bytes` into `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is not exactly one page long.
    pub fn load(&mut self, slot: SlotIndex, bytes: &[u8]) {
        self.slots[slot.as_usize()].data.copy_from_slice(bytes);
    }

    fn unlink(&mut self, slot: SlotIndex) {
        let (prev, next) = {
            let node = &mut self.slots[slot.as_usize()];
            (node.prev.take(), node.next.take())
        };
        match prev {
            Some(p) => self.slots[p.as_usize()].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n.as_usize()].prev = prev,
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, slot: SlotIndex) {
        let old_head = self.head;
        {
            let node = &mut self.slots[slot.as_usize()];
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(h) => self.slots[h.as_usize()].prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
    }
}
