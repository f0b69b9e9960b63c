//! Per-thread last-error registry.
//!
//! Each instance keeps one error slot per calling thread, so a failure on
//! one thread never shows up in another thread's `last_error_code()`. The
//! map is guarded by the instance's error lock; state-lock holders never
//! touch it, so the two locks do not nest.

use crate::error::ErrorKind;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::thread::ThreadId;

#[derive(Debug, Default)]
pub(crate) struct ErrorRegistry {
    slots: Mutex<HashMap<ThreadId, ErrorKind>>,
}

impl ErrorRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record `kind` in the calling thread's slot.
    pub(crate) fn set(&self, kind: ErrorKind) {
        let tid = std::thread::current().id();
        self.slots.lock().insert(tid, kind);
    }

    /// Read and clear the calling thread's slot.
    pub(crate) fn take(&self) -> Option<ErrorKind> {
        let tid = std::thread::current().id();
        self.slots.lock().remove(&tid)
    }

    /// Drop every slot. Used at instance teardown.
    pub(crate) fn clear(&self) {
        self.slots.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_clears_the_slot() {
        let reg = ErrorRegistry::new();
        assert_eq!(reg.take(), None);
        reg.set(ErrorKind::NotFound);
        reg.set(ErrorKind::Busy); // latest failure wins
        assert_eq!(reg.take(), Some(ErrorKind::Busy));
        assert_eq!(reg.take(), None);
    }

    #[test]
    fn slots_are_per_thread() {
        let reg = std::sync::Arc::new(ErrorRegistry::new());
        reg.set(ErrorKind::NoWriteDir);

        let reg2 = reg.clone();
        std::thread::spawn(move || {
            assert_eq!(reg2.take(), None);
            reg2.set(ErrorKind::Busy);
            assert_eq!(reg2.take(), Some(ErrorKind::Busy));
        })
        .join()
        .unwrap();

        assert_eq!(reg.take(), Some(ErrorKind::NoWriteDir));
    }
}
