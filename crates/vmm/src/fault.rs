//! The fault taxonomy.
//!
//! A translation either succeeds or raises exactly one of these faults.
//! `Unmapped` and `NotResident` are recoverable: the fault handler resolves
//! them and the translation is retried. Every other kind is fatal and
//! propagates unchanged to the caller, which terminates the requesting
//! process. The manager never substitutes a default value for a failed
//! translation.

use thiserror_no_std::Error;

use crate::{backing::StoreError, numbers::PageNumber, region::AccessKind};

/// A failed address translation, tagged with its specific kind for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Fault {
    /// No entry exists for the page. May resolve to legitimate stack or heap
    /// growth, or turn out to be a genuine invalid address.
    #[error("no mapping for page {0}")]
    Unmapped(PageNumber),
    /// The entry exists but its contents are not resident. Always resolves via
    /// page-in.
    #[error("page {0} is not resident")]
    NotResident(PageNumber),
    /// A guard page was touched. Always fatal, never retried.
    #[error("guard page {0} touched")]
    GuardViolation(PageNumber),
    /// The access kind is not permitted by the page's permissions. Always
    /// fatal.
    #[error("{kind:?} access to page {page} denied")]
    PermissionDenied {
        /// The faulting page.
        page: PageNumber,
        /// The denied access kind.
        kind: AccessKind,
    },
    /// The page falls within no region, or a growth request exceeds the
    /// region's limit. Always fatal.
    #[error("page {0} is outside every region's growth limits")]
    OutOfBounds(PageNumber),
    /// Stack growth past the configured maximum. Deterministically fatal,
    /// never silent truncation.
    #[error("stack growth to page {0} exceeds the configured maximum")]
    StackExhausted(PageNumber),
    /// The backing store failed during fault resolution. Always fatal.
    #[error("backing store failure: {0}")]
    Io(StoreError),
}

impl Fault {
    /// Returns true if the fault handler can resolve this fault, allowing the
    /// translation to be retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Fault::Unmapped(_) | Fault::NotResident(_))
    }

    /// Returns the faulting page, if the fault is tied to one.
    pub fn page(&self) -> Option<PageNumber> {
        match self {
            Fault::Unmapped(page)
            | Fault::NotResident(page)
            | Fault::GuardViolation(page)
            | Fault::PermissionDenied { page, .. }
            | Fault::OutOfBounds(page)
            | Fault::StackExhausted(page) => Some(*page),
            Fault::Io(_) => None,
        }
    }
}

impl From<StoreError> for Fault {
    fn from(err: StoreError) -> Self {
        Fault::Io(err)
    }
}
