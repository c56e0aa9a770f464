//! Virtual address and physical location types.
//!
//! This module provides the virtual address newtype and the resolved physical
//! location returned by a successful translation. Splitting an address into its
//! page number and in-page offset is a shift and a mask: because the page size
//! is a power of two, the offset and page index occupy disjoint bit ranges.

use core::fmt;
use core::ops::{Add, Sub};

use crate::numbers::{PageNumber, SlotIndex};

/// Number of low-order bits covered by the in-page offset.
pub const PAGE_SHIFT: usize = 12;

/// Page size in bytes (4 KiB = 2^12).
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

/// A virtual memory address.
///
/// This is a newtype wrapper around the raw representation of a virtual address.
/// It provides methods for extracting the page number and in-page offset.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtualAddress(usize);

impl VirtualAddress {
    /// Creates a new virtual address.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Returns the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Returns the in-page offset (the low `PAGE_SHIFT` bits).
    #[inline]
    pub const fn page_offset(self) -> usize {
        self.0 & (PAGE_SIZE - 1)
    }

    /// Returns the page number containing this address (the high bits).
    #[inline]
    pub const fn page_number(self) -> PageNumber {
        PageNumber::new(self.0 >> PAGE_SHIFT)
    }

    /// Checks if the address is aligned to the given alignment.
    ///
    /// # Panics
    ///
    /// Panics if `align` is not a power of two.
    #[inline]
    pub const fn is_aligned(self, align: usize) -> bool {
        assert!(align.is_power_of_two(), "alignment must be a power of two");
        self.0 & (align - 1) == 0
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualAddress({:#x})", self.0)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<usize> for VirtualAddress {
    #[inline]
    fn from(addr: usize) -> Self {
        Self::new(addr)
    }
}

impl Add<usize> for VirtualAddress {
    type Output = Self;

    #[inline]
    fn add(self, rhs: usize) -> Self::Output {
        Self::new(self.0 + rhs)
    }
}

impl Sub<usize> for VirtualAddress {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: usize) -> Self::Output {
        Self::new(self.0 - rhs)
    }
}

impl Sub<VirtualAddress> for VirtualAddress {
    type Output = usize;

    #[inline]
    fn sub(self, rhs: VirtualAddress) -> Self::Output {
        self.0 - rhs.0
    }
}

/// A resolved physical location: a resident pool slot plus the in-page offset.
///
/// This is the success result of a translation. The in-page offset is carried
/// through unchanged from the virtual address, so recombining the slot base with
/// the offset reproduces the original low-order bits exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalLocation {
    slot: SlotIndex,
    offset: usize,
}

impl PhysicalLocation {
    /// Creates a new physical location.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is not within a single page.
    #[inline]
    pub fn new(slot: SlotIndex, offset: usize) -> Self {
        assert!(offset < PAGE_SIZE, "offset must be within a single page");
        Self { slot, offset }
    }

    /// Returns the resident pool slot holding the page contents.
    #[inline]
    pub const fn slot(self) -> SlotIndex {
        self.slot
    }

    /// Returns the in-page offset.
    #[inline]
    pub const fn offset(self) -> usize {
        self.offset
    }

    /// Returns the byte offset into the resident pool (slot base combined with
    /// the in-page offset).
    #[inline]
    pub const fn pool_offset(self) -> usize {
        (self.slot.as_usize() << PAGE_SHIFT) | self.offset
    }
}

impl fmt::Display for PhysicalLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}+{:#x}", self.slot, self.offset)
    }
}
