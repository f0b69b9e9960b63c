//! Buffer-allocation accounting.
//!
//! An instance carries an [`Allocator`] that is consulted before any
//! handle buffer is grown and told when one is released. The hook can
//! refuse an allocation, which surfaces as `ErrorKind::OutOfMemory` to the
//! caller that asked for the buffer. Byte storage itself always comes from
//! the global allocator; this is an accounting seam, not a malloc
//! replacement.

use crate::error::{ErrorKind, VfsError, VfsResult};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

pub trait Allocator: Send + Sync + fmt::Debug {
    /// Account for `len` bytes about to be allocated. Returning an error
    /// refuses the allocation.
    fn allocate(&self, len: usize, context: &'static str) -> VfsResult<()>;

    /// Account for `len` bytes released.
    fn release(&self, len: usize);

    /// Bytes currently accounted, if the allocator tracks them.
    fn in_use(&self) -> Option<usize> {
        None
    }
}

/// Default allocator: admits everything, tracks the running total.
#[derive(Debug, Default)]
pub struct SystemAllocator {
    used: AtomicUsize,
}

impl SystemAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Allocator for SystemAllocator {
    fn allocate(&self, len: usize, _context: &'static str) -> VfsResult<()> {
        self.used.fetch_add(len, Ordering::Relaxed);
        Ok(())
    }

    fn release(&self, len: usize) {
        self.used.fetch_sub(len, Ordering::Relaxed);
    }

    fn in_use(&self) -> Option<usize> {
        Some(self.used.load(Ordering::Relaxed))
    }
}

/// Allocator with a hard ceiling on outstanding bytes.
#[derive(Debug)]
pub struct CappedAllocator {
    cap: usize,
    used: AtomicUsize,
}

impl CappedAllocator {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            used: AtomicUsize::new(0),
        }
    }
}

impl Allocator for CappedAllocator {
    fn allocate(&self, len: usize, context: &'static str) -> VfsResult<()> {
        let mut current = self.used.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_add(len);
            if next > self.cap {
                return Err(VfsError::new(ErrorKind::OutOfMemory, context));
            }
            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(()),
                Err(observed) => current = observed,
            }
        }
    }

    fn release(&self, len: usize) {
        self.used.fetch_sub(len, Ordering::Relaxed);
    }

    fn in_use(&self) -> Option<usize> {
        Some(self.used.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_allocator_admits_and_tracks() {
        let alloc = SystemAllocator::new();
        alloc.allocate(128, "test").unwrap();
        alloc.allocate(64, "test").unwrap();
        assert_eq!(alloc.in_use(), Some(192));
        alloc.release(128);
        assert_eq!(alloc.in_use(), Some(64));
    }

    #[test]
    fn capped_allocator_refuses_past_cap() {
        let alloc = CappedAllocator::new(100);
        alloc.allocate(60, "test").unwrap();
        let err = alloc.allocate(60, "test").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfMemory);
        alloc.release(60);
        alloc.allocate(100, "test").unwrap();
    }
}
