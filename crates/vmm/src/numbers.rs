//! Index newtypes for the virtual memory subsystem.
//!
//! This module provides newtypes for virtual page numbers, resident slot indices,
//! and backing store locations, which are used throughout the memory manager.

use crate::address::{PAGE_SHIFT, VirtualAddress};
use core::{
    fmt,
    ops::{Add, Sub},
};

/// Macro to define common index type functionality.
///
/// This macro generates the basic structure and methods common to the page number,
/// slot index and backing location types, reducing code duplication.
macro_rules! impl_index_common {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Creates a new index.
            #[inline]
            pub const fn new(number: usize) -> Self {
                Self(number)
            }

            /// Returns the raw index value.
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Add<usize> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: usize) -> Self::Output {
                Self(self.0 + rhs)
            }
        }

        impl Sub<usize> for $name {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: usize) -> Self::Output {
                Self(self.0 - rhs)
            }
        }

        impl Sub<$name> for $name {
            type Output = usize;

            #[inline]
            fn sub(self, rhs: $name) -> Self::Output {
                self.0 - rhs.0
            }
        }
    };
}

impl_index_common!(
    PageNumber,
    "A virtual memory page number.\n\n\
     Represents a virtual memory page. Page numbers are zero-indexed and correspond to\n\
     PAGE_SIZE-aligned virtual addresses."
);

impl PageNumber {
    /// Returns the virtual address at the start of this page.
    #[inline]
    pub const fn start(self) -> VirtualAddress {
        VirtualAddress::new(self.0 << PAGE_SHIFT)
    }

    /// Returns the virtual address at the end of this page (start of next page).
    #[inline]
    pub const fn end(self) -> VirtualAddress {
        VirtualAddress::new((self.0 + 1) << PAGE_SHIFT)
    }
}

impl From<VirtualAddress> for PageNumber {
    #[inline]
    fn from(addr: VirtualAddress) -> Self {
        Self::new(addr.as_usize() >> PAGE_SHIFT)
    }
}

impl_index_common!(
    SlotIndex,
    "An index into the resident page pool.\n\n\
     Each slot holds the contents of one resident page. Slot indices are dense and\n\
     bounded by the residency ledger's capacity."
);

impl_index_common!(
    BackingLocation,
    "A page-granular location within the backing store.\n\n\
     Assigned by the store when a page is first written out, and reused for every\n\
     subsequent write-back of the same page."
);
