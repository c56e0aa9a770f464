//! Address space management.
//!
//! An [`AddressSpace`] owns the region descriptors, the sparse mapping table
//! and the residency ledger for one logical process. Address spaces are fully
//! isolated from each other: no operation on one can observe or mutate
//! another's state.
//!
//! Locking discipline (outermost first): the fault lock serializes fault
//! resolutions and is the only lock held across backing store I/O; the mapping
//! lock covers regions and entries; the ledger lock covers the resident pool
//! and recency order. The mapping and ledger locks are held only across
//! metadata updates, so translations of already-resident pages are never
//! blocked by an in-flight fault resolution.

use core::sync::atomic::{AtomicU64, Ordering};

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use spin::{Mutex, RwLock};

use crate::{
    address::{PAGE_SIZE, PhysicalLocation, VirtualAddress},
    backing::{BackingStore, MemoryStore},
    entry::PageTableEntry,
    fault::Fault,
    human_size::HumanSize,
    ledger::ResidencyLedger,
    numbers::PageNumber,
    region::{AccessKind, GrowthDirection, LayoutError, Region, RegionDescriptor},
};

/// Configuration for a new address space.
#[derive(Debug, Clone, Copy)]
pub struct SpaceConfig {
    /// Maximum number of simultaneously resident pages (the size of this
    /// space's share of fast storage).
    pub resident_capacity: usize,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            resident_capacity: 64,
        }
    }
}

/// A point-in-time snapshot of an address space's residency and fault
/// counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceStats {
    /// Currently resident pages.
    pub resident: usize,
    /// Maximum simultaneously resident pages.
    pub capacity: usize,
    /// Pages committed across all regions: fixed reservations plus pages
    /// materialized by growth. Committed pages stay committed when evicted.
    pub committed: usize,
    /// Faults taken (recoverable faults that entered resolution).
    pub faults: u64,
    /// Pages materialized into the resident pool (page-ins and zero-fills).
    pub page_ins: u64,
    /// Pages evicted from the resident pool.
    pub evictions: u64,
    /// Dirty pages written to the backing store during eviction.
    pub write_backs: u64,
}

/// Regions and page table entries, guarded together by the mapping lock.
pub(crate) struct Mapping {
    pub(crate) regions: Vec<Region>,
    pub(crate) entries: BTreeMap<PageNumber, PageTableEntry>,
}

impl Mapping {
    /// Returns the index of the region whose reservation contains `page`.
    pub(crate) fn region_containing(&self, page: PageNumber) -> Option<usize> {
        self.regions.iter().position(|r| r.contains(page))
    }
}

#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) faults: AtomicU64,
    pub(crate) page_ins: AtomicU64,
    pub(crate) evictions: AtomicU64,
    pub(crate) write_backs: AtomicU64,
}

/// A demand-paged virtual address space for one logical process.
///
/// Created with a set of region descriptors supplied by the external loader;
/// destroyed by dropping, which releases all resident pages. Dirty pages are
/// not flushed at teardown: process teardown discards unsaved anonymous pages.
pub struct AddressSpace<S: BackingStore = MemoryStore> {
    pub(crate) mapping: RwLock<Mapping>,
    pub(crate) ledger: Mutex<ResidencyLedger>,
    /// Serializes fault resolutions. The only lock held across store I/O.
    pub(crate) fault_lock: Mutex<()>,
    pub(crate) store: S,
    pub(crate) counters: Counters,
    clock: AtomicU64,
}

impl<S: BackingStore> AddressSpace<S> {
    /// Creates an address space from the given region descriptors.
    ///
    /// Fixed (code and data) regions have entries created for their whole
    /// reservation immediately: pages covered by the descriptor's contents are
    /// seeded into the backing store and paged in on first access, the rest
    /// are demand-zero. Growable regions get entries lazily, on first touch.
    pub fn new(
        descriptors: Vec<RegionDescriptor>,
        store: S,
        config: SpaceConfig,
    ) -> Result<Self, LayoutError> {
        if config.resident_capacity == 0 {
            return Err(LayoutError::ZeroCapacity);
        }

        let mut regions = descriptors
            .iter()
            .map(Region::from_descriptor)
            .collect::<Result<Vec<_>, _>>()?;
        regions.sort_by_key(|r| r.start());
        for pair in regions.windows(2) {
            if pair[1].start() < pair[0].end() {
                return Err(LayoutError::Overlap(pair[1].start()));
            }
        }

        let mut entries = BTreeMap::new();
        for desc in &descriptors {
            if desc.kind.growth() != GrowthDirection::Fixed {
                continue;
            }
            let contents = desc.contents.as_deref().unwrap_or(&[]);
            if contents.len() > desc.pages * PAGE_SIZE {
                return Err(LayoutError::ContentsTooLarge(desc.start));
            }
            for index in 0..desc.pages {
                let lo = index * PAGE_SIZE;
                let entry = if lo < contents.len() {
                    let hi = usize::min(lo + PAGE_SIZE, contents.len());
                    let mut buf = alloc::vec![0u8; PAGE_SIZE];
                    buf[..hi - lo].copy_from_slice(&contents[lo..hi]);
                    let location = store.write(&buf).map_err(LayoutError::Store)?;
                    PageTableEntry::with_backing(desc.permissions, location)
                } else {
                    // Reserved but uninitialized (bss); demand-zero.
                    PageTableEntry::new(desc.permissions)
                };
                entries.insert(desc.start + index, entry);
            }
        }

        let reserved: usize = regions.iter().map(Region::pages).sum();
        log::debug!(
            "created address space: {} regions, {} reserved, {} resident capacity",
            regions.len(),
            HumanSize::new(reserved * PAGE_SIZE),
            HumanSize::new(config.resident_capacity * PAGE_SIZE),
        );

        Ok(Self {
            mapping: RwLock::new(Mapping { regions, entries }),
            ledger: Mutex::new(ResidencyLedger::new(config.resident_capacity)),
            fault_lock: Mutex::new(()),
            store,
            counters: Counters::default(),
            clock: AtomicU64::new(0),
        })
    }

    /// Resolves a virtual address to a physical location, taking and resolving
    /// recoverable faults along the way.
    ///
    /// Each successful fault resolution is followed by exactly one retry of
    /// the translation walk. Any error returned here is fatal for the
    /// requesting process.
    pub fn access(
        &self,
        addr: VirtualAddress,
        kind: AccessKind,
    ) -> Result<PhysicalLocation, Fault> {
        loop {
            match self.translate(addr, kind) {
                Ok(location) => return Ok(location),
                Err(fault) if fault.is_recoverable() => {
                    let _guard = self.fault_lock.lock();
                    self.counters.faults.fetch_add(1, Ordering::Relaxed);
                    self.resolve(addr.page_number(), fault)?;
                }
                Err(fatal) => return Err(fatal),
            }
        }
    }

    /// Reads `buf.len()` bytes starting at `addr`, faulting pages in as
    /// needed. May cross page boundaries.
    ///
    /// A resolved location is only trusted while the ledger lock is held: a
    /// concurrent fault may evict the page between the resolution and the
    /// copy, in which case the slot is re-resolved rather than read stale.
    pub fn read_bytes(&self, addr: VirtualAddress, buf: &mut [u8]) -> Result<(), Fault> {
        let mut cursor = addr;
        let mut done = 0;
        while done < buf.len() {
            let location = self.access(cursor, AccessKind::Read)?;
            let ledger = self.ledger.lock();
            if ledger.occupant(location.slot()) != Some(cursor.page_number()) {
                // Evicted since the resolution; the slot may hold another
                // page's contents now.
                continue;
            }
            let count = usize::min(PAGE_SIZE - location.offset(), buf.len() - done);
            buf[done..done + count].copy_from_slice(
                &ledger.data(location.slot())[location.offset()..location.offset() + count],
            );
            drop(ledger);
            done += count;
            cursor = cursor + count;
        }
        Ok(())
    }

    /// Writes `bytes` starting at `addr`, faulting pages in as needed. May
    /// cross page boundaries.
    ///
    /// Carries the same occupancy re-check as [`Self::read_bytes`]; a write
    /// must never land in a slot that was re-assigned to another page.
    pub fn write_bytes(&self, addr: VirtualAddress, bytes: &[u8]) -> Result<(), Fault> {
        let mut cursor = addr;
        let mut done = 0;
        while done < bytes.len() {
            let location = self.access(cursor, AccessKind::Write)?;
            let mut ledger = self.ledger.lock();
            if ledger.occupant(location.slot()) != Some(cursor.page_number()) {
                continue;
            }
            let count = usize::min(PAGE_SIZE - location.offset(), bytes.len() - done);
            ledger.data_mut(location.slot())[location.offset()..location.offset() + count]
                .copy_from_slice(&bytes[done..done + count]);
            drop(ledger);
            done += count;
            cursor = cursor + count;
        }
        Ok(())
    }

    /// Installs a guard entry at `page`. Any subsequent access to it faults
    /// fatally; guard pages are never paged in.
    pub fn guard_page(&self, page: PageNumber) -> Result<(), LayoutError> {
        let mut mapping = self.mapping.write();
        if mapping.entries.contains_key(&page) {
            return Err(LayoutError::AlreadyMapped(page));
        }
        mapping.entries.insert(page, PageTableEntry::guard());
        Ok(())
    }

    /// Returns a snapshot of this space's residency and fault counters.
    pub fn stats(&self) -> SpaceStats {
        let committed = self.mapping.read().regions.iter().map(Region::committed).sum();
        let ledger = self.ledger.lock();
        SpaceStats {
            resident: ledger.resident(),
            capacity: ledger.capacity(),
            committed,
            faults: self.counters.faults.load(Ordering::Relaxed),
            page_ins: self.counters.page_ins.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            write_backs: self.counters.write_backs.load(Ordering::Relaxed),
        }
    }

    /// Returns the next logical access timestamp.
    pub(crate) fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl<S: BackingStore> Drop for AddressSpace<S> {
    fn drop(&mut self) {
        // Resident pages are released with the pool. Dirty pages are
        // deliberately not flushed.
        log::trace!(
            "destroying address space: {} resident pages discarded",
            self.ledger.lock().resident()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        address::PhysicalLocation,
        backing::StoreError,
        region::{Permissions, RegionKind},
    };
    use std::sync::Arc;

    /// Heap region reserved at pages [16, 80).
    const HEAP_START: usize = 16;

    fn heap_addr(page: usize, offset: usize) -> VirtualAddress {
        VirtualAddress::new((HEAP_START + page) * PAGE_SIZE + offset)
    }

    fn heap_space(capacity: usize) -> AddressSpace<MemoryStore> {
        AddressSpace::new(
            alloc::vec![RegionDescriptor::heap(PageNumber::new(HEAP_START), 64, 64)],
            MemoryStore::new(),
            SpaceConfig {
                resident_capacity: capacity,
            },
        )
        .unwrap()
    }

    mod creation {
        use super::*;

        #[test]
        fn zero_capacity_rejected() {
            let result = AddressSpace::new(
                alloc::vec![RegionDescriptor::heap(PageNumber::new(0), 4, 4)],
                MemoryStore::new(),
                SpaceConfig {
                    resident_capacity: 0,
                },
            );
            assert!(matches!(result, Err(LayoutError::ZeroCapacity)));
        }

        #[test]
        fn overlapping_regions_rejected() {
            let result = AddressSpace::new(
                alloc::vec![
                    RegionDescriptor::heap(PageNumber::new(0), 8, 8),
                    RegionDescriptor::stack(PageNumber::new(4), 8, 8),
                ],
                MemoryStore::new(),
                SpaceConfig::default(),
            );
            assert_eq!(result.err(), Some(LayoutError::Overlap(PageNumber::new(4))));
        }

        #[test]
        fn oversized_contents_rejected() {
            let result = AddressSpace::new(
                alloc::vec![RegionDescriptor::code(
                    PageNumber::new(0),
                    1,
                    alloc::vec![0u8; PAGE_SIZE + 1],
                )],
                MemoryStore::new(),
                SpaceConfig::default(),
            );
            assert_eq!(
                result.err(),
                Some(LayoutError::ContentsTooLarge(PageNumber::new(0)))
            );
        }

        #[test]
        fn image_contents_are_paged_in_on_first_access() {
            let mut image = alloc::vec![0u8; PAGE_SIZE * 2];
            image[0] = 0x7F;
            image[PAGE_SIZE] = 0x45;
            let space = AddressSpace::new(
                alloc::vec![RegionDescriptor::code(PageNumber::new(4), 2, image)],
                MemoryStore::new(),
                SpaceConfig::default(),
            )
            .unwrap();

            let mut buf = [0u8; 1];
            space
                .read_bytes(VirtualAddress::new(4 * PAGE_SIZE), &mut buf)
                .unwrap();
            assert_eq!(buf[0], 0x7F);
            space
                .read_bytes(VirtualAddress::new(5 * PAGE_SIZE), &mut buf)
                .unwrap();
            assert_eq!(buf[0], 0x45);
        }

        #[test]
        fn uninitialized_fixed_pages_are_demand_zero() {
            let space = AddressSpace::new(
                alloc::vec![RegionDescriptor::data(
                    PageNumber::new(4),
                    2,
                    alloc::vec![0xEEu8; 8],
                )],
                MemoryStore::new(),
                SpaceConfig::default(),
            )
            .unwrap();

            let mut buf = [0xFFu8; 4];
            space
                .read_bytes(VirtualAddress::new(5 * PAGE_SIZE), &mut buf)
                .unwrap();
            assert_eq!(buf, [0, 0, 0, 0]);
        }
    }

    mod translation {
        use super::*;

        #[test]
        fn resolved_location_preserves_low_order_bits() {
            let space = heap_space(4);
            let addr = heap_addr(0, 0x123);
            let location = space.access(addr, AccessKind::Read).unwrap();
            assert_eq!(location.offset(), 0x123);
            assert_eq!(
                location.pool_offset() & (PAGE_SIZE - 1),
                addr.as_usize() & (PAGE_SIZE - 1)
            );
        }

        #[test]
        fn translate_surfaces_recoverable_faults() {
            let space = heap_space(4);
            let addr = heap_addr(0, 0);

            assert_eq!(
                space.translate(addr, AccessKind::Read),
                Err(Fault::Unmapped(addr.page_number()))
            );

            // access resolves the fault; translate then succeeds directly.
            space.access(addr, AccessKind::Read).unwrap();
            assert!(space.translate(addr, AccessKind::Read).is_ok());
        }

        #[test]
        fn unmapped_address_outside_regions_is_out_of_bounds() {
            let space = heap_space(4);
            let addr = VirtualAddress::new(0x1000);
            assert_eq!(
                space.access(addr, AccessKind::Read),
                Err(Fault::OutOfBounds(addr.page_number()))
            );
        }

        #[test]
        fn execute_denied_on_heap() {
            let space = heap_space(4);
            let addr = heap_addr(0, 0);
            space.access(addr, AccessKind::Read).unwrap();

            assert_eq!(
                space.access(addr, AccessKind::Execute),
                Err(Fault::PermissionDenied {
                    page: addr.page_number(),
                    kind: AccessKind::Execute
                })
            );
        }

        #[test]
        fn write_to_read_only_page_denied_without_side_effects() {
            let image = alloc::vec![0x42u8; PAGE_SIZE];
            let store = Arc::new(MemoryStore::new());
            let space = AddressSpace::new(
                alloc::vec![RegionDescriptor::code(PageNumber::new(4), 1, image)],
                Arc::clone(&store),
                SpaceConfig::default(),
            )
            .unwrap();

            let addr = VirtualAddress::new(4 * PAGE_SIZE);
            assert_eq!(
                space.write_bytes(addr, &[0u8; 4]),
                Err(Fault::PermissionDenied {
                    page: addr.page_number(),
                    kind: AccessKind::Write
                })
            );

            // Content is untouched and the page was never marked dirty.
            let mut buf = [0u8; 4];
            space.read_bytes(addr, &mut buf).unwrap();
            assert_eq!(buf, [0x42; 4]);
            assert_eq!(space.stats().write_backs, 0);
        }
    }

    mod guard_pages {
        use super::*;

        #[test]
        fn guard_access_is_fatal_and_idempotent() {
            let space = heap_space(4);
            let page = PageNumber::new(HEAP_START + 1);
            space.guard_page(page).unwrap();

            for _ in 0..3 {
                assert_eq!(
                    space.access(page.start(), AccessKind::Read),
                    Err(Fault::GuardViolation(page))
                );
            }
        }

        #[test]
        fn guard_on_mapped_page_rejected() {
            let space = heap_space(4);
            let addr = heap_addr(0, 0);
            space.access(addr, AccessKind::Read).unwrap();

            assert_eq!(
                space.guard_page(addr.page_number()),
                Err(LayoutError::AlreadyMapped(addr.page_number()))
            );
        }
    }

    mod growth {
        use super::*;

        /// Stack reserved at pages [96, 104), growth limited to 4 pages from
        /// the top (pages 100..104).
        fn stack_space() -> AddressSpace<MemoryStore> {
            AddressSpace::new(
                alloc::vec![RegionDescriptor::stack(PageNumber::new(96), 8, 4)],
                MemoryStore::new(),
                SpaceConfig::default(),
            )
            .unwrap()
        }

        #[test]
        fn stack_grows_downward_within_limit() {
            let space = stack_space();
            // Top of the stack first, then exactly at the growth limit.
            for page in [103usize, 100] {
                let addr = VirtualAddress::new(page * PAGE_SIZE);
                assert!(space.access(addr, AccessKind::Write).is_ok());
            }
        }

        #[test]
        fn stack_growth_one_page_past_limit_is_exhausted() {
            let space = stack_space();
            space
                .access(VirtualAddress::new(100 * PAGE_SIZE), AccessKind::Write)
                .unwrap();

            let addr = VirtualAddress::new(99 * PAGE_SIZE);
            assert_eq!(
                space.access(addr, AccessKind::Write),
                Err(Fault::StackExhausted(addr.page_number()))
            );
        }

        #[test]
        fn heap_growth_past_limit_is_out_of_bounds() {
            let space = AddressSpace::new(
                alloc::vec![RegionDescriptor::heap(PageNumber::new(16), 8, 2)],
                MemoryStore::new(),
                SpaceConfig::default(),
            )
            .unwrap();

            assert!(
                space
                    .access(VirtualAddress::new(17 * PAGE_SIZE), AccessKind::Write)
                    .is_ok()
            );
            let addr = VirtualAddress::new(18 * PAGE_SIZE);
            assert_eq!(
                space.access(addr, AccessKind::Write),
                Err(Fault::OutOfBounds(addr.page_number()))
            );
        }

        #[test]
        fn committed_pages_track_fixed_reservations_and_growth() {
            let space = AddressSpace::new(
                alloc::vec![
                    RegionDescriptor::data(PageNumber::new(4), 2, alloc::vec![0xEEu8; 8]),
                    RegionDescriptor::heap(PageNumber::new(16), 8, 8),
                ],
                MemoryStore::new(),
                SpaceConfig::default(),
            )
            .unwrap();

            // The fixed data region counts in full from creation.
            assert_eq!(space.stats().committed, 2);

            space
                .access(VirtualAddress::new(16 * PAGE_SIZE), AccessKind::Write)
                .unwrap();
            assert_eq!(space.stats().committed, 3);

            // Growth to page 18 commits the two pages below it as well.
            space
                .access(VirtualAddress::new(18 * PAGE_SIZE), AccessKind::Write)
                .unwrap();
            assert_eq!(space.stats().committed, 5);
        }

        #[test]
        fn grown_pages_are_zero_filled() {
            let space = heap_space(4);
            let mut buf = [0xFFu8; 8];
            space.read_bytes(heap_addr(2, 100), &mut buf).unwrap();
            assert_eq!(buf, [0; 8]);
        }
    }

    mod eviction {
        use super::*;

        #[test]
        fn resident_count_never_exceeds_capacity() {
            let space = heap_space(2);
            for page in 0..6 {
                space.access(heap_addr(page, 0), AccessKind::Read).unwrap();
                let stats = space.stats();
                assert!(stats.resident <= stats.capacity);
            }
            assert_eq!(space.stats().evictions, 4);
        }

        #[test]
        fn least_recently_touched_page_is_evicted_first() {
            let space = heap_space(2);
            let (p1, p2, p3) = (heap_addr(1, 0), heap_addr(2, 0), heap_addr(3, 0));

            // Three first touches in order; capacity two.
            space.access(p1, AccessKind::Read).unwrap();
            space.access(p2, AccessKind::Read).unwrap();
            space.access(p3, AccessKind::Read).unwrap();

            // P1 was least recently touched, so it went out; P2 and P3 stayed.
            assert_eq!(
                space.translate(p1, AccessKind::Read),
                Err(Fault::NotResident(p1.page_number()))
            );

            // Touching P1 again pages it back in and pushes out P2.
            space.access(p1, AccessKind::Read).unwrap();
            assert_eq!(
                space.translate(p2, AccessKind::Read),
                Err(Fault::NotResident(p2.page_number()))
            );
            assert!(space.translate(p3, AccessKind::Read).is_ok());
        }

        #[test]
        fn resolved_access_promotes_recency() {
            let space = heap_space(2);
            let (p1, p2, p3) = (heap_addr(1, 0), heap_addr(2, 0), heap_addr(3, 0));

            space.access(p1, AccessKind::Read).unwrap();
            space.access(p2, AccessKind::Read).unwrap();
            // Re-touch P1 so P2 becomes least recent.
            space.access(p1, AccessKind::Read).unwrap();

            space.access(p3, AccessKind::Read).unwrap();
            assert_eq!(
                space.translate(p2, AccessKind::Read),
                Err(Fault::NotResident(p2.page_number()))
            );
            assert!(space.translate(p1, AccessKind::Read).is_ok());
        }

        #[test]
        fn dirty_page_round_trips_through_the_store() {
            let space = heap_space(1);
            let pattern: Vec<u8> = (0..PAGE_SIZE).map(|i| (i % 251) as u8).collect();

            space.write_bytes(heap_addr(0, 0), &pattern).unwrap();
            // Touching a second page forces the dirty page out.
            space.access(heap_addr(1, 0), AccessKind::Read).unwrap();
            assert_eq!(space.stats().write_backs, 1);

            let mut buf = alloc::vec![0u8; PAGE_SIZE];
            space.read_bytes(heap_addr(0, 0), &mut buf).unwrap();
            assert_eq!(buf, pattern);
        }

        #[test]
        fn clean_page_evicts_without_write_back() {
            let space = heap_space(1);

            space.access(heap_addr(0, 0), AccessKind::Read).unwrap();
            space.access(heap_addr(1, 0), AccessKind::Read).unwrap();
            assert_eq!(space.stats().evictions, 1);
            assert_eq!(space.stats().write_backs, 0);

            // The clean page zero-fills when it comes back.
            let mut buf = [0xFFu8; 4];
            space.read_bytes(heap_addr(0, 0), &mut buf).unwrap();
            assert_eq!(buf, [0; 4]);
        }

        #[test]
        fn write_back_reuses_the_backing_location() {
            let store = Arc::new(MemoryStore::new());
            let space = AddressSpace::new(
                alloc::vec![RegionDescriptor::heap(PageNumber::new(HEAP_START), 8, 8)],
                Arc::clone(&store),
                SpaceConfig {
                    resident_capacity: 1,
                },
            )
            .unwrap();

            // Dirty the same page and evict it twice.
            for round in 0..2u8 {
                space.write_bytes(heap_addr(0, 0), &[round; 8]).unwrap();
                space.access(heap_addr(1, 0), AccessKind::Read).unwrap();
            }
            assert_eq!(space.stats().write_backs, 2);
            assert_eq!(store.len(), 1);
        }

        #[test]
        fn teardown_discards_dirty_pages() {
            let store = Arc::new(MemoryStore::new());
            let space = AddressSpace::new(
                alloc::vec![RegionDescriptor::heap(PageNumber::new(HEAP_START), 8, 8)],
                Arc::clone(&store),
                SpaceConfig::default(),
            )
            .unwrap();

            space.write_bytes(heap_addr(0, 0), &[0xAB; 16]).unwrap();
            drop(space);
            // Nothing was flushed at teardown.
            assert!(store.is_empty());
        }
    }

    mod byte_access {
        use super::*;

        #[test]
        fn writes_and_reads_across_page_boundaries() {
            let space = heap_space(4);
            let addr = heap_addr(0, PAGE_SIZE - 3);
            let bytes = [1u8, 2, 3, 4, 5, 6];

            space.write_bytes(addr, &bytes).unwrap();
            let mut buf = [0u8; 6];
            space.read_bytes(addr, &mut buf).unwrap();
            assert_eq!(buf, bytes);
        }

        #[test]
        fn stale_resolutions_are_detected_after_eviction() {
            let space = heap_space(1);
            let pattern = [0xC3u8; 16];
            space.write_bytes(heap_addr(0, 0), &pattern).unwrap();

            // Hold on to the resolved location, then force the page out. The
            // slot now belongs to another page, so the old resolution must
            // not be trusted for a copy.
            let stale = space.access(heap_addr(0, 0), AccessKind::Read).unwrap();
            space.access(heap_addr(1, 0), AccessKind::Read).unwrap();
            assert_eq!(
                space.ledger.lock().occupant(stale.slot()),
                Some(PageNumber::new(HEAP_START + 1))
            );

            // Both pages read back their own contents.
            let mut buf = [0u8; 16];
            space.read_bytes(heap_addr(0, 0), &mut buf).unwrap();
            assert_eq!(buf, pattern);
            space.read_bytes(heap_addr(1, 0), &mut buf).unwrap();
            assert_eq!(buf, [0; 16]);
        }

        #[test]
        fn counters_track_faults_and_page_ins() {
            let space = heap_space(4);
            space.access(heap_addr(0, 0), AccessKind::Read).unwrap();
            space.access(heap_addr(0, 8), AccessKind::Read).unwrap();

            let stats = space.stats();
            assert_eq!(stats.faults, 1);
            assert_eq!(stats.page_ins, 1);
            assert_eq!(stats.resident, 1);
        }
    }

    mod isolation {
        use super::*;

        #[test]
        fn spaces_do_not_share_residency_state() {
            let a = heap_space(1);
            let b = heap_space(1);

            a.write_bytes(heap_addr(0, 0), &[1; 4]).unwrap();
            b.write_bytes(heap_addr(0, 0), &[2; 4]).unwrap();

            let mut buf = [0u8; 4];
            a.read_bytes(heap_addr(0, 0), &mut buf).unwrap();
            assert_eq!(buf, [1; 4]);
            b.read_bytes(heap_addr(0, 0), &mut buf).unwrap();
            assert_eq!(buf, [2; 4]);
        }
    }

    mod concurrency {
        use super::*;
        use std::time::{Duration, Instant};

        /// A store whose writes stall, so an eviction's write-back holds the
        /// fault path open for a measurable window.
        struct SlowStore {
            inner: MemoryStore,
            delay: Duration,
        }

        impl BackingStore for SlowStore {
            fn read(
                &self,
                location: crate::numbers::BackingLocation,
                buf: &mut [u8],
            ) -> Result<(), StoreError> {
                std::thread::sleep(self.delay);
                self.inner.read(location, buf)
            }

            fn write(&self, buf: &[u8]) -> Result<crate::numbers::BackingLocation, StoreError> {
                std::thread::sleep(self.delay);
                self.inner.write(buf)
            }

            fn write_at(
                &self,
                location: crate::numbers::BackingLocation,
                buf: &[u8],
            ) -> Result<(), StoreError> {
                std::thread::sleep(self.delay);
                self.inner.write_at(location, buf)
            }
        }

        #[test]
        fn resident_accesses_proceed_during_fault_io() {
            let delay = Duration::from_millis(300);
            let space = AddressSpace::new(
                alloc::vec![RegionDescriptor::heap(PageNumber::new(HEAP_START), 16, 16)],
                SlowStore {
                    inner: MemoryStore::new(),
                    delay,
                },
                SpaceConfig {
                    resident_capacity: 2,
                },
            )
            .unwrap();

            // Dirty one page so its eviction needs a (slow) write-back, and
            // keep another page resident and hot.
            space.write_bytes(heap_addr(0, 0), &[0xAA; 8]).unwrap();
            space.access(heap_addr(1, 0), AccessKind::Read).unwrap();

            std::thread::scope(|scope| {
                let faulter = scope.spawn(|| {
                    // First touch of a third page: evicts the dirty page and
                    // stalls in the store for `delay`.
                    space.access(heap_addr(2, 0), AccessKind::Write).unwrap();
                    Instant::now()
                });

                let resident = scope.spawn(|| {
                    // Give the fault a moment to reach the store.
                    std::thread::sleep(Duration::from_millis(50));
                    for _ in 0..100 {
                        space.access(heap_addr(1, 0), AccessKind::Read).unwrap();
                    }
                    Instant::now()
                });

                let resident_done = resident.join().unwrap();
                let fault_done = faulter.join().unwrap();

                // Accesses to the already-resident page finished while the
                // fault was still waiting on the store.
                assert!(resident_done < fault_done);
            });
        }

        #[test]
        fn interleaved_byte_writes_land_on_their_own_pages() {
            // Capacity one forces an eviction on nearly every access, so the
            // two writers constantly pull each other's page out from under a
            // freshly resolved location.
            let space = heap_space(1);
            let space = &space;

            std::thread::scope(|scope| {
                for page in 0..2u8 {
                    scope.spawn(move || {
                        let fill = [page + 1; 32];
                        for _ in 0..200 {
                            space.write_bytes(heap_addr(page as usize, 0), &fill).unwrap();
                        }
                    });
                }
            });

            let mut buf = [0u8; 32];
            space.read_bytes(heap_addr(0, 0), &mut buf).unwrap();
            assert_eq!(buf, [1; 32]);
            space.read_bytes(heap_addr(1, 0), &mut buf).unwrap();
            assert_eq!(buf, [2; 32]);
        }

        #[test]
        fn concurrent_resident_accesses_from_multiple_threads() {
            let space = heap_space(4);
            for page in 0..4 {
                space.access(heap_addr(page, 0), AccessKind::Read).unwrap();
            }

            let space = &space;
            std::thread::scope(|scope| {
                for page in 0..4 {
                    scope.spawn(move || {
                        for _ in 0..500 {
                            space.access(heap_addr(page, 0), AccessKind::Read).unwrap();
                        }
                    });
                }
            });

            let stats = space.stats();
            assert_eq!(stats.resident, 4);
            assert_eq!(stats.evictions, 0);
        }
    }

    #[test]
    fn region_kinds_exposed_through_layout() {
        // RegionKind/PhysicalLocation are part of the public surface; exercise
        // the accessors the external collaborators rely on.
        let space = heap_space(2);
        let mapping = space.mapping.read();
        assert_eq!(mapping.regions.len(), 1);
        assert_eq!(mapping.regions[0].kind(), RegionKind::Heap);
        assert_eq!(mapping.regions[0].permissions(), Permissions::READ | Permissions::WRITE);
        drop(mapping);

        let location: PhysicalLocation = space
            .access(heap_addr(0, 0x10), AccessKind::Read)
            .unwrap();
        assert_eq!(location.offset(), 0x10);
    }
}
