//! Region descriptors and access permissions.
//!
//! An address space is laid out as an ordered, non-overlapping set of regions.
//! Code and data regions are fixed: every reserved page is valid from creation.
//! Heap and stack regions grow on demand, heap toward higher addresses and stack
//! toward lower addresses, each bounded by a configured growth limit.

use bitflags::bitflags;
use thiserror_no_std::Error;

use alloc::vec::Vec;

use crate::numbers::PageNumber;

bitflags! {
    /// Access permissions for a region or page table entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u8 {
        /// The page may be read.
        const READ = 1 << 0;
        /// The page may be written.
        const WRITE = 1 << 1;
        /// The page may be executed.
        const EXECUTE = 1 << 2;
    }
}

/// The kind of access being performed, checked against [`Permissions`] on every
/// resolved translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
    Execute,
}

impl AccessKind {
    /// Returns the permission bit this access requires.
    pub const fn required(self) -> Permissions {
        match self {
            AccessKind::Read => Permissions::READ,
            AccessKind::Write => Permissions::WRITE,
            AccessKind::Execute => Permissions::EXECUTE,
        }
    }
}

/// The kind of a region within an address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Executable image text. Fixed extent.
    Code,
    /// Image data. Fixed extent.
    Data,
    /// Dynamically grown allocation area; grows toward higher addresses.
    Heap,
    /// Call stack; grows toward lower addresses.
    Stack,
}

impl RegionKind {
    /// Returns the growth direction inherent to this region kind.
    pub const fn growth(self) -> GrowthDirection {
        match self {
            RegionKind::Code | RegionKind::Data => GrowthDirection::Fixed,
            RegionKind::Heap => GrowthDirection::Up,
            RegionKind::Stack => GrowthDirection::Down,
        }
    }
}

/// The direction in which a region commits new pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthDirection {
    /// The region does not grow; its full extent is valid from creation.
    Fixed,
    /// New pages commit toward higher addresses, from the region's start.
    Up,
    /// New pages commit toward lower addresses, from the region's end.
    Down,
}

/// Errors that can occur while laying out an address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// Two region descriptors overlap.
    #[error("region starting at page {0} overlaps the previous region")]
    Overlap(PageNumber),
    /// A region descriptor reserves zero pages.
    #[error("region starting at page {0} is empty")]
    Empty(PageNumber),
    /// A growth limit exceeds the region's reserved extent.
    #[error("growth limit of region starting at page {0} exceeds its reservation")]
    GrowthLimit(PageNumber),
    /// Initial contents supplied for a growable region.
    #[error("region starting at page {0} is growable and cannot carry initial contents")]
    GrowableContents(PageNumber),
    /// Initial contents do not fit the region's reservation.
    #[error("contents of region starting at page {0} exceed its reservation")]
    ContentsTooLarge(PageNumber),
    /// The resident capacity is zero.
    #[error("resident capacity must be at least one page")]
    ZeroCapacity,
    /// A guard page was requested for an already-mapped page.
    #[error("page {0} is already mapped")]
    AlreadyMapped(PageNumber),
    /// The backing store failed while seeding initial contents.
    #[error("backing store failure while seeding contents: {0}")]
    Store(crate::backing::StoreError),
}

/// A caller-supplied description of one region, consumed at address space
/// creation. Produced by the external loader from the image layout.
#[derive(Debug, Clone)]
pub struct RegionDescriptor {
    /// First reserved page of the region.
    pub start: PageNumber,
    /// Number of reserved pages.
    pub pages: usize,
    /// Kind of the region; determines the growth direction.
    pub kind: RegionKind,
    /// Permissions applied to every page of the region.
    pub permissions: Permissions,
    /// Maximum number of pages a growable region may commit, measured from its
    /// growth edge. `None` allows the whole reservation. Ignored for fixed
    /// regions.
    pub growth_limit: Option<usize>,
    /// Initial contents for fixed regions, seeded into the backing store at
    /// creation and paged in on first access.
    pub contents: Option<Vec<u8>>,
}

impl RegionDescriptor {
    /// Describes a code region with the given image contents.
    pub fn code(start: PageNumber, pages: usize, contents: Vec<u8>) -> Self {
        Self {
            start,
            pages,
            kind: RegionKind::Code,
            permissions: Permissions::READ | Permissions::EXECUTE,
            growth_limit: None,
            contents: Some(contents),
        }
    }

    /// Describes a data region with the given image contents.
    pub fn data(start: PageNumber, pages: usize, contents: Vec<u8>) -> Self {
        Self {
            start,
            pages,
            kind: RegionKind::Data,
            permissions: Permissions::READ | Permissions::WRITE,
            growth_limit: None,
            contents: Some(contents),
        }
    }

    /// Describes a heap region growing upward from `start`, committing at most
    /// `growth_limit` pages.
    pub fn heap(start: PageNumber, pages: usize, growth_limit: usize) -> Self {
        Self {
            start,
            pages,
            kind: RegionKind::Heap,
            permissions: Permissions::READ | Permissions::WRITE,
            growth_limit: Some(growth_limit),
            contents: None,
        }
    }

    /// Describes a stack region growing downward from the end of its
    /// reservation, committing at most `growth_limit` pages.
    pub fn stack(start: PageNumber, pages: usize, growth_limit: usize) -> Self {
        Self {
            start,
            pages,
            kind: RegionKind::Stack,
            permissions: Permissions::READ | Permissions::WRITE,
            growth_limit: Some(growth_limit),
            contents: None,
        }
    }
}

/// One region of an address space, with growth bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    start: PageNumber,
    /// One past the last reserved page.
    end: PageNumber,
    kind: RegionKind,
    growth: GrowthDirection,
    permissions: Permissions,
    /// Maximum pages this region may commit, measured from the growth edge.
    growth_limit: usize,
    /// Pages committed so far, measured from the growth edge.
    committed: usize,
}

impl Region {
    /// Builds a region from a validated descriptor.
    pub(crate) fn from_descriptor(desc: &RegionDescriptor) -> Result<Self, LayoutError> {
        if desc.pages == 0 {
            return Err(LayoutError::Empty(desc.start));
        }
        let growth = desc.kind.growth();
        let growth_limit = match growth {
            GrowthDirection::Fixed => desc.pages,
            GrowthDirection::Up | GrowthDirection::Down => {
                let limit = desc.growth_limit.unwrap_or(desc.pages);
                if limit > desc.pages {
                    return Err(LayoutError::GrowthLimit(desc.start));
                }
                limit
            }
        };
        if desc.contents.is_some() && growth != GrowthDirection::Fixed {
            return Err(LayoutError::GrowableContents(desc.start));
        }
        Ok(Self {
            start: desc.start,
            end: desc.start + desc.pages,
            kind: desc.kind,
            growth,
            permissions: desc.permissions,
            growth_limit,
            // Fixed regions are fully committed from creation; growable ones
            // commit page by page.
            committed: match growth {
                GrowthDirection::Fixed => desc.pages,
                GrowthDirection::Up | GrowthDirection::Down => 0,
            },
        })
    }

    /// Returns the first reserved page.
    pub fn start(&self) -> PageNumber {
        self.start
    }

    /// Returns one past the last reserved page.
    pub fn end(&self) -> PageNumber {
        self.end
    }

    /// Returns the number of reserved pages.
    pub fn pages(&self) -> usize {
        self.end - self.start
    }

    /// Returns the kind of this region.
    pub fn kind(&self) -> RegionKind {
        self.kind
    }

    /// Returns the permissions applied to pages of this region.
    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    /// Returns the number of pages committed so far.
    pub fn committed(&self) -> usize {
        self.committed
    }

    /// Returns true if `page` falls within this region's reservation.
    pub fn contains(&self, page: PageNumber) -> bool {
        self.start <= page && page < self.end
    }

    /// Returns the total committed page count this region would have if `page`
    /// joined it, measured from the growth edge. Returns `None` if `page` is
    /// outside the reservation.
    ///
    /// For a downward-growing stack the edge is the region's end; for an
    /// upward-growing heap (and fixed regions) the edge is the region's start.
    pub(crate) fn growth_extent(&self, page: PageNumber) -> Option<usize> {
        if !self.contains(page) {
            return None;
        }
        Some(match self.growth {
            GrowthDirection::Down => self.end - page,
            GrowthDirection::Up | GrowthDirection::Fixed => page - self.start + 1,
        })
    }

    /// Returns true if committing `extent` pages stays within the growth limit.
    pub(crate) fn within_limit(&self, extent: usize) -> bool {
        extent <= self.growth_limit
    }

    /// Records that the committed extent now covers at least `extent` pages.
    pub(crate) fn commit(&mut self, extent: usize) {
        debug_assert!(extent <= self.growth_limit);
        if extent > self.committed {
            self.committed = extent;
        }
    }
}
