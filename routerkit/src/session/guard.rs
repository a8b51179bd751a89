//! Non-blocking busy flag for sessions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Protocol, Result, SessionError};

/// Shared busy flag of one session.
///
/// Acquisition never waits: a second caller is rejected with
/// [`SessionError::Occupied`] while the flag is held. Clones share the flag,
/// so a coordinator holding a clone can mark the session busy from outside.
#[derive(Debug, Clone, Default)]
pub struct Occupancy {
    busy: Arc<AtomicBool>,
}

impl Occupancy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the session busy for as long as the returned guard lives.
    pub fn try_acquire(&self, protocol: Protocol, operation: &'static str) -> Result<OccupiedGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SessionError::Occupied {
                protocol,
                operation,
            })?;
        Ok(OccupiedGuard {
            busy: self.busy.clone(),
        })
    }

    pub fn is_occupied(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Clears the busy flag when dropped, including on early return or when
/// the owning future is cancelled.
#[derive(Debug)]
#[must_use = "the session is only marked busy while the guard is held"]
pub struct OccupiedGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for OccupiedGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
