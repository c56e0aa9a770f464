//! # Virtual Memory Manager (VMM)
//!
//! A demand-paged virtual memory manager. Each [`AddressSpace`] presents a
//! logical process with a large virtual address range backed by a small pool
//! of resident page slots; pages are materialized on first touch, paged in
//! from a [`BackingStore`] when their contents exist there, and evicted in
//! strict least-recently-used order when the pool is full.
//!
//! The crate is `no_std` + `alloc` by default. The `software-emulation`
//! feature (implied by `test`) enables the `std`-dependent pieces, such as the
//! file-backed store.

#![cfg_attr(not(any(test, feature = "software-emulation")), no_std)]

extern crate alloc;

mod address;
mod address_space;
mod backing;
mod entry;
mod fault;
mod fault_handler;
mod human_size;
mod ledger;
mod numbers;
mod region;
mod translator;

pub use address::{PAGE_SHIFT, PAGE_SIZE, PhysicalLocation, VirtualAddress};
pub use address_space::{AddressSpace, SpaceConfig, SpaceStats};
#[cfg(any(test, feature = "software-emulation"))]
pub use backing::FileStore;
pub use backing::{BackingStore, MemoryStore, StoreError};
pub use entry::PageTableEntry;
pub use fault::Fault;
pub use human_size::HumanSize;
pub use ledger::ResidencyLedger;
pub use numbers::{BackingLocation, PageNumber, SlotIndex};
pub use region::{
    AccessKind, GrowthDirection, LayoutError, Permissions, Region, RegionDescriptor, RegionKind,
};
