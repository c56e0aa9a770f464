//! Fault resolution.
//!
//! The fault handler runs under the fault lock, one resolution at a time. It
//! classifies the faulting page, acquires a resident slot (evicting the least
//! recently used page if the pool is full), and materializes the page contents
//! either from the backing store or as a fresh zero-filled page.
//!
//! Backing store I/O happens with no metadata locks held. A concurrent
//! translation of an evicted page observes it as absent the moment its entry
//! is updated, and the resulting fault queues behind the fault lock until the
//! write-back completes.

use core::sync::atomic::Ordering;

use alloc::vec::Vec;

use crate::{
    address::PAGE_SIZE,
    address_space::AddressSpace,
    backing::BackingStore,
    entry::PageTableEntry,
    fault::Fault,
    numbers::{PageNumber, SlotIndex},
    region::RegionKind,
};

impl<S: BackingStore> AddressSpace<S> {
    /// Resolves a recoverable fault on `page`. Fatal faults pass through
    /// unchanged.
    ///
    /// Called with the fault lock held. The fault was classified by a walk
    /// that has since released its locks, so the page's state is re-examined
    /// here; a resolution raced by an earlier one simply succeeds.
    pub(crate) fn resolve(&self, page: PageNumber, fault: Fault) -> Result<(), Fault> {
        match fault {
            Fault::Unmapped(_) => self.resolve_unmapped(page),
            Fault::NotResident(_) => self.resolve_not_resident(page),
            fatal => Err(fatal),
        }
    }

    /// Resolves a fault on a page with no entry: legitimate region growth, or
    /// a genuinely invalid address.
    fn resolve_unmapped(&self, page: PageNumber) -> Result<(), Fault> {
        // An entry may have appeared since the failed walk.
        let entry_exists = {
            let mapping = self.mapping.read();
            match mapping.entries.get(&page) {
                Some(entry) if entry.is_guard() => return Err(Fault::GuardViolation(page)),
                Some(entry) if entry.is_present() => return Ok(()),
                Some(_) => true,
                None => false,
            }
        };
        if entry_exists {
            return self.resolve_not_resident(page);
        }

        let (region_index, extent, permissions) = {
            let mapping = self.mapping.read();
            let index = mapping
                .region_containing(page)
                .ok_or(Fault::OutOfBounds(page))?;
            let region = &mapping.regions[index];
            let extent = region
                .growth_extent(page)
                .ok_or(Fault::OutOfBounds(page))?;
            if !region.within_limit(extent) {
                return Err(match region.kind() {
                    RegionKind::Stack => Fault::StackExhausted(page),
                    _ => Fault::OutOfBounds(page),
                });
            }
            (index, extent, region.permissions())
        };

        let slot = self.acquire_slot()?;

        let mut mapping = self.mapping.write();
        let mut ledger = self.ledger.lock();
        ledger.zero(slot);
        ledger.install(slot, page);
        let mut entry = PageTableEntry::new(permissions);
        entry.set_resident(slot, self.tick());
        log::trace!("grew region to {}", entry.describe(page));
        mapping.entries.insert(page, entry);
        mapping.regions[region_index].commit(extent);
        self.counters.page_ins.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Resolves a fault on an existing entry whose contents are not resident,
    /// by paging in from the backing store or zero-filling a page that was
    /// never written out.
    fn resolve_not_resident(&self, page: PageNumber) -> Result<(), Fault> {
        let backing = {
            let mapping = self.mapping.read();
            match mapping.entries.get(&page) {
                None => None,
                Some(entry) if entry.is_guard() => return Err(Fault::GuardViolation(page)),
                Some(entry) if entry.is_present() => return Ok(()),
                Some(entry) => Some(entry.backing()),
            }
        };
        let Some(backing) = backing else {
            // The entry vanished between classification and resolution only if
            // it never existed; reclassify as a growth fault.
            return self.resolve_unmapped(page);
        };

        let slot = self.acquire_slot()?;

        // The read runs with no metadata locks held; the fault lock alone
        // serializes it against other resolutions.
        let mut buf = alloc::vec![0u8; PAGE_SIZE];
        if let Some(location) = backing {
            self.store.read(location, &mut buf)?;
        }

        let mut mapping = self.mapping.write();
        let mut ledger = self.ledger.lock();
        ledger.load(slot, &buf);
        ledger.install(slot, page);
        let entry = mapping
            .entries
            .get_mut(&page)
            .expect("entries are never removed once created");
        entry.set_resident(slot, self.tick());
        log::trace!("paged in {}", entry.describe(page));
        self.counters.page_ins.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Produces a free resident slot, evicting the least recently used page if
    /// the pool is full.
    ///
    /// The victim's metadata is updated under the mapping and ledger locks,
    /// then both are released before the dirty write-back touches the store.
    /// The write completes before the slot is handed back for reuse, so the
    /// eviction is fully ordered before the page-in that triggered it.
    fn acquire_slot(&self) -> Result<SlotIndex, Fault> {
        if let Some(slot) = self.ledger.lock().allocate() {
            return Ok(slot);
        }

        let (slot, victim, dirty_bytes, backing) = {
            let mut mapping = self.mapping.write();
            let mut ledger = self.ledger.lock();
            let slot = ledger
                .least_recent()
                .expect("a full pool always has a least recently used page");
            let victim = ledger
                .evict(slot)
                .expect("the least recently used slot is occupied");
            let entry = mapping
                .entries
                .get_mut(&victim)
                .expect("a resident page always has an entry");
            let dirty = entry.take_dirty();
            let backing = entry.backing();
            entry.set_absent();
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            let bytes = dirty.then(|| Vec::from(ledger.data(slot)));
            (slot, victim, bytes, backing)
        };

        if let Some(bytes) = dirty_bytes {
            let written = match backing {
                // Dirty pages with a prior location are rewritten in place.
                Some(location) => self.store.write_at(location, &bytes).map(|()| location),
                None => self.store.write(&bytes),
            };
            let location = match written {
                Ok(location) => location,
                Err(err) => {
                    // The fault is fatal, but the slot must not leak: it goes
                    // back to the free pool instead of to the caller.
                    self.ledger.lock().release(slot);
                    return Err(err.into());
                }
            };
            let mut mapping = self.mapping.write();
            mapping
                .entries
                .get_mut(&victim)
                .expect("an evicted page keeps its entry")
                .set_backing(location);
            self.counters.write_backs.fetch_add(1, Ordering::Relaxed);
            log::trace!("wrote back dirty page {victim} to backing location {location}");
        } else {
            log::trace!("evicted clean page {victim} from slot {slot}");
        }

        Ok(slot)
    }
}
