//! The translation walk.
//!
//! A single walk from virtual address to physical location. The walk takes the
//! mapping lock shared, so any number of translations of resident pages can
//! proceed concurrently; the ledger lock is taken only for the O(1) recency
//! promotion. The walk never resolves faults itself, it reports exactly one
//! per failed attempt. [`AddressSpace::access`] wraps it with resolution and
//! retry.

use crate::{
    address::{PhysicalLocation, VirtualAddress},
    address_space::AddressSpace,
    backing::BackingStore,
    fault::Fault,
    region::AccessKind,
};

impl<S: BackingStore> AddressSpace<S> {
    /// Translates `addr` for the given access kind, without resolving faults.
    ///
    /// On success the page is stamped as most recently used, and a write access
    /// marks it dirty. The returned location carries the in-page offset through
    /// unchanged.
    ///
    /// Fault precedence for a single walk: guard entries fault before residency
    /// is considered, and residency before permissions, so a non-resident page
    /// raises [`Fault::NotResident`] even if the access would later be denied.
    pub fn translate(
        &self,
        addr: VirtualAddress,
        kind: AccessKind,
    ) -> Result<PhysicalLocation, Fault> {
        let page = addr.page_number();
        let mapping = self.mapping.read();

        let entry = mapping.entries.get(&page).ok_or(Fault::Unmapped(page))?;
        if entry.is_guard() {
            return Err(Fault::GuardViolation(page));
        }
        let slot = entry.resident_slot().ok_or(Fault::NotResident(page))?;
        if !entry.permits(kind) {
            return Err(Fault::PermissionDenied { page, kind });
        }

        entry.touch(self.tick());
        if kind == AccessKind::Write {
            entry.mark_dirty();
        }
        self.ledger.lock().touch(slot);

        Ok(PhysicalLocation::new(slot, addr.page_offset()))
    }
}
