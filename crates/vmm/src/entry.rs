//! Page table entries.
//!
//! Entries are created lazily when a page is first referenced and describe the
//! page's residency state, permissions and backing location. The `dirty` flag
//! and `last_touched` timestamp are atomic so the resident translation path can
//! update them while holding only a shared reference to the mapping table.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::{
    numbers::{BackingLocation, PageNumber, SlotIndex},
    region::{AccessKind, Permissions},
};

/// Metadata for one virtual page.
///
/// Invariants: a present entry always has a resident slot, and a guard entry is
/// never present (guard pages are never paged in).
pub struct PageTableEntry {
    permissions: Permissions,
    /// Access always faults fatally, regardless of residency. Used for
    /// stack-overflow tripwires.
    guard: bool,
    /// Index into the resident pool, if the page contents are resident.
    resident_slot: Option<SlotIndex>,
    /// Location in the backing store, if the page has ever been written out or
    /// carries image contents.
    backing: Option<BackingLocation>,
    /// Set on a permitted write since the last write-back.
    dirty: AtomicBool,
    /// Logical timestamp of the last resolved access.
    last_touched: AtomicU64,
}

impl PageTableEntry {
    /// Creates a non-resident entry with the given permissions.
    pub fn new(permissions: Permissions) -> Self {
        Self {
            permissions,
            guard: false,
            resident_slot: None,
            backing: None,
            dirty: AtomicBool::new(false),
            last_touched: AtomicU64::new(0),
        }
    }

    /// Creates a non-resident entry carrying image contents at the given
    /// backing location.
    pub fn with_backing(permissions: Permissions, backing: BackingLocation) -> Self {
        let mut entry = Self::new(permissions);
        entry.backing = Some(backing);
        entry
    }

    /// Creates a guard entry. Any access to it faults fatally.
    pub fn guard() -> Self {
        Self {
            permissions: Permissions::empty(),
            guard: true,
            resident_slot: None,
            backing: None,
            dirty: AtomicBool::new(false),
            last_touched: AtomicU64::new(0),
        }
    }

    /// Returns true if this is a guard entry.
    pub fn is_guard(&self) -> bool {
        self.guard
    }

    /// Returns true if the page contents are resident.
    pub fn is_present(&self) -> bool {
        self.resident_slot.is_some()
    }

    /// Returns the resident pool slot, if present.
    pub fn resident_slot(&self) -> Option<SlotIndex> {
        self.resident_slot
    }

    /// Returns the backing store location, if the page has one.
    pub fn backing(&self) -> Option<BackingLocation> {
        self.backing
    }

    /// Records the backing store location for this page.
    pub fn set_backing(&mut self, location: BackingLocation) {
        self.backing = Some(location);
    }

    /// Returns the permissions checked on every access.
    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    /// Returns true if the given access kind is permitted.
    pub fn permits(&self, kind: AccessKind) -> bool {
        self.permissions.contains(kind.required())
    }

    /// Marks the page resident in `slot`, stamped with the given timestamp.
    ///
    /// # Panics
    ///
    /// Panics if this is a guard entry; guard pages are never paged in.
    pub fn set_resident(&mut self, slot: SlotIndex, now: u64) {
        assert!(!self.guard, "guard pages are never paged in");
        self.resident_slot = Some(slot);
        self.dirty.store(false, Ordering::Release);
        self.last_touched.store(now, Ordering::Release);
    }

    /// Marks the page absent, returning the slot it occupied.
    pub fn set_absent(&mut self) -> Option<SlotIndex> {
        self.resident_slot.take()
    }

    /// Returns true if the page has been written since the last write-back.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Marks the page dirty. Called on every permitted write access.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Clears the dirty flag, returning its previous value.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Returns the logical timestamp of the last resolved access.
    pub fn last_touched(&self) -> u64 {
        self.last_touched.load(Ordering::Acquire)
    }

    /// Stamps the entry with the given logical timestamp.
    pub fn touch(&self, now: u64) {
        self.last_touched.store(now, Ordering::Release);
    }

    /// Formats the entry's state for diagnostics.
    pub(crate) fn describe(&self, page: PageNumber) -> impl core::fmt::Display {
        DescribeEntry {
            page,
            present: self.is_present(),
            guard: self.guard,
            dirty: self.is_dirty(),
        }
    }
}

impl core::fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PageTableEntry")
            .field("permissions", &self.permissions)
            .field("guard", &self.guard)
            .field("resident_slot", &self.resident_slot)
            .field("backing", &self.backing)
            .field("dirty", &self.is_dirty())
            .field("last_touched", &self.last_touched())
            .finish()
    }
}

struct DescribeEntry {
    page: PageNumber,
    present: bool,
    guard: bool,
    dirty: bool,
}

impl core::fmt::Display for DescribeEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "page {} ({}{}{})",
            self.page,
            if self.guard { "guard" } else { "mapped" },
            if self.present { ", resident" } else { "" },
            if self.dirty { ", dirty" } else { "" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_is_absent_and_clean() {
        let entry = PageTableEntry::new(Permissions::READ | Permissions::WRITE);
        assert!(!entry.is_present());
        assert!(!entry.is_dirty());
        assert!(!entry.is_guard());
        assert_eq!(entry.resident_slot(), None);
        assert_eq!(entry.backing(), None);
    }

    #[test]
    fn residency_transitions() {
        let mut entry = PageTableEntry::new(Permissions::READ);
        entry.set_resident(SlotIndex::new(3), 7);

        assert!(entry.is_present());
        assert_eq!(entry.resident_slot(), Some(SlotIndex::new(3)));
        assert_eq!(entry.last_touched(), 7);

        assert_eq!(entry.set_absent(), Some(SlotIndex::new(3)));
        assert!(!entry.is_present());
    }

    #[test]
    fn set_resident_clears_dirty() {
        let mut entry = PageTableEntry::new(Permissions::WRITE);
        entry.mark_dirty();
        entry.set_resident(SlotIndex::new(0), 1);
        assert!(!entry.is_dirty());
    }

    #[test]
    fn take_dirty_returns_and_clears() {
        let entry = PageTableEntry::new(Permissions::WRITE);
        entry.mark_dirty();
        assert!(entry.take_dirty());
        assert!(!entry.take_dirty());
    }

    #[test]
    fn permission_checks() {
        let entry = PageTableEntry::new(Permissions::READ | Permissions::EXECUTE);
        assert!(entry.permits(AccessKind::Read));
        assert!(entry.permits(AccessKind::Execute));
        assert!(!entry.permits(AccessKind::Write));
    }

    #[test]
    fn guard_permits_nothing() {
        let entry = PageTableEntry::guard();
        assert!(entry.is_guard());
        assert!(!entry.is_present());
        assert!(!entry.permits(AccessKind::Read));
    }

    #[test]
    #[should_panic(expected = "guard pages are never paged in")]
    fn guard_cannot_become_resident() {
        let mut entry = PageTableEntry::guard();
        entry.set_resident(SlotIndex::new(0), 1);
    }
}
