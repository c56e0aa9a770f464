//! Backing store adapters.
//!
//! The backing store holds the contents of non-resident pages. It is a pure
//! I/O adapter with no policy: the fault handler decides what to read and
//! write, the store only moves page-sized buffers.
//!
//! [`MemoryStore`] is the default, allocation-backed implementation.
//! [`FileStore`] keeps pages in a real file and is available in test and
//! software-emulation builds, standing in for an actual swap device.

use thiserror_no_std::Error;

use alloc::vec::Vec;

use crate::{address::PAGE_SIZE, numbers::BackingLocation};

/// Errors raised by a backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The requested location was never written.
    #[error("backing location out of range")]
    OutOfRange,
    /// The underlying device failed.
    #[error("backing store i/o failed")]
    Io,
}

/// Abstraction over the secondary storage holding non-resident page contents.
///
/// All operations are page-granular: buffers are exactly one page long.
/// Implementations use interior mutability so the fault handler can drive them
/// through a shared reference while no metadata locks are held.
pub trait BackingStore {
    /// Reads the page at `location` into `buf`.
    fn read(&self, location: BackingLocation, buf: &mut [u8]) -> Result<(), StoreError>;

    /// Writes a page, returning the location assigned to it.
    fn write(&self, buf: &[u8]) -> Result<BackingLocation, StoreError>;

    /// Rewrites the page at an existing `location`.
    fn write_at(&self, location: BackingLocation, buf: &[u8]) -> Result<(), StoreError>;
}

// Allows a caller to retain a handle to the store it hands an address space.
impl<S: BackingStore> BackingStore for alloc::sync::Arc<S> {
    fn read(&self, location: BackingLocation, buf: &mut [u8]) -> Result<(), StoreError> {
        (**self).read(location, buf)
    }

    fn write(&self, buf: &[u8]) -> Result<BackingLocation, StoreError> {
        (**self).write(buf)
    }

    fn write_at(&self, location: BackingLocation, buf: &[u8]) -> Result<(), StoreError> {
        (**self).write_at(location, buf)
    }
}

/// An in-memory backing store.
///
/// Pages are appended to a growable vector; locations are indices into it.
pub struct MemoryStore {
    pages: spin::Mutex<Vec<Vec<u8>>>,
}

impl MemoryStore {
    /// Creates an empty in-memory store.
    pub const fn new() -> Self {
        Self {
            pages: spin::Mutex::new(Vec::new()),
        }
    }

    /// Returns the number of pages the store holds.
    pub fn len(&self) -> usize {
        self.pages.lock().len()
    }

    /// Returns true if the store holds no pages.
    pub fn is_empty(&self) -> bool {
        self.pages.lock().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BackingStore for MemoryStore {
    fn read(&self, location: BackingLocation, buf: &mut [u8]) -> Result<(), StoreError> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        let pages = self.pages.lock();
        let page = pages.get(location.as_usize()).ok_or(StoreError::OutOfRange)?;
        buf.copy_from_slice(page);
        Ok(())
    }

    fn write(&self, buf: &[u8]) -> Result<BackingLocation, StoreError> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        let mut pages = self.pages.lock();
        pages.push(buf.to_vec());
        Ok(BackingLocation::new(pages.len() - 1))
    }

    fn write_at(&self, location: BackingLocation, buf: &[u8]) -> Result<(), StoreError> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        let mut pages = self.pages.lock();
        let page = pages
            .get_mut(location.as_usize())
            .ok_or(StoreError::OutOfRange)?;
        page.copy_from_slice(buf);
        Ok(())
    }
}

/// A file-backed store for test and software-emulation builds.
///
/// Pages live at `location * PAGE_SIZE` within the file. Fresh locations are
/// handed out by a bump counter.
#[cfg(any(test, feature = "software-emulation"))]
pub struct FileStore {
    file: spin::Mutex<std::fs::File>,
    next: core::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "software-emulation"))]
impl FileStore {
    /// Creates (or truncates) the store file at `path`.
    pub fn create(path: &std::path::Path) -> Result<Self, StoreError> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|err| {
                log::warn!("failed to create backing file {}: {err}", path.display());
                StoreError::Io
            })?;
        Ok(Self {
            file: spin::Mutex::new(file),
            next: core::sync::atomic::AtomicUsize::new(0),
        })
    }

    fn io_at(
        &self,
        location: BackingLocation,
        op: impl FnOnce(&mut std::fs::File) -> std::io::Result<()>,
    ) -> Result<(), StoreError> {
        use std::io::Seek;

        let mut file = self.file.lock();
        file.seek(std::io::SeekFrom::Start(
            (location.as_usize() * PAGE_SIZE) as u64,
        ))
        .and_then(|_| op(&mut file))
        .map_err(|err| {
            log::warn!("backing file i/o failed at location {location}: {err}");
            StoreError::Io
        })
    }
}

#[cfg(any(test, feature = "software-emulation"))]
impl BackingStore for FileStore {
    fn read(&self, location: BackingLocation, buf: &mut [u8]) -> Result<(), StoreError> {
        use std::io::Read;

        debug_assert_eq!(buf.len(), PAGE_SIZE);
        if location.as_usize() >= self.next.load(core::sync::atomic::Ordering::Acquire) {
            return Err(StoreError::OutOfRange);
        }
        self.io_at(location, |file| file.read_exact(buf))
    }

    fn write(&self, buf: &[u8]) -> Result<BackingLocation, StoreError> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        let location = BackingLocation::new(
            self.next
                .fetch_add(1, core::sync::atomic::Ordering::AcqRel),
        );
        self.write_at(location, buf)?;
        Ok(location)
    }

    fn write_at(&self, location: BackingLocation, buf: &[u8]) -> Result<(), StoreError> {
        use std::io::Write;

        debug_assert_eq!(buf.len(), PAGE_SIZE);
        self.io_at(location, |file| file.write_all(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(fill: u8) -> Vec<u8> {
        alloc::vec![fill; PAGE_SIZE]
    }

    mod memory_store {
        use super::*;

        #[test]
        fn write_then_read_round_trip() {
            let store = MemoryStore::new();
            let loc = store.write(&page(0xAB)).unwrap();

            let mut buf = page(0);
            store.read(loc, &mut buf).unwrap();
            assert_eq!(buf, page(0xAB));
        }

        #[test]
        fn write_at_reuses_location() {
            let store = MemoryStore::new();
            let loc = store.write(&page(1)).unwrap();
            store.write_at(loc, &page(2)).unwrap();

            let mut buf = page(0);
            store.read(loc, &mut buf).unwrap();
            assert_eq!(buf, page(2));
            assert_eq!(store.len(), 1);
        }

        #[test]
        fn distinct_writes_get_distinct_locations() {
            let store = MemoryStore::new();
            let a = store.write(&page(1)).unwrap();
            let b = store.write(&page(2)).unwrap();
            assert_ne!(a, b);
        }

        #[test]
        fn read_out_of_range() {
            let store = MemoryStore::new();
            let mut buf = page(0);
            assert_eq!(
                store.read(BackingLocation::new(0), &mut buf),
                Err(StoreError::OutOfRange)
            );
        }
    }

    mod file_store {
        use super::*;

        fn temp_path(name: &str) -> std::path::PathBuf {
            let mut path = std::env::temp_dir();
            path.push(format!("vmm-store-{}-{name}", std::process::id()));
            path
        }

        #[test]
        fn write_then_read_round_trip() {
            let path = temp_path("round-trip");
            let store = FileStore::create(&path).unwrap();

            let loc = store.write(&page(0x5A)).unwrap();
            let mut buf = page(0);
            store.read(loc, &mut buf).unwrap();
            assert_eq!(buf, page(0x5A));

            drop(store);
            let _ = std::fs::remove_file(&path);
        }

        #[test]
        fn unwritten_location_is_out_of_range() {
            let path = temp_path("out-of-range");
            let store = FileStore::create(&path).unwrap();

            let mut buf = page(0);
            assert_eq!(
                store.read(BackingLocation::new(3), &mut buf),
                Err(StoreError::OutOfRange)
            );

            drop(store);
            let _ = std::fs::remove_file(&path);
        }
    }
}
