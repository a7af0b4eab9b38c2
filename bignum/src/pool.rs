//! Per-worker window-table pool for modular exponentiation.
//!
//! Each worker owns one pre-allocated table of `1 << WINDOW_SIZE` MPI
//! slots, initialised at module start and reused across sessions so the
//! Montgomery loop never allocates a table. The pool must only be used by
//! its owning worker; the registry hands it out behind a lock to make the
//! ownership explicit.

use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::Mpi;

/// Maximum sliding-window size in bits used for modular exponentiation.
pub const WINDOW_SIZE: usize = 6;

/// Number of pre-allocated table slots.
pub const WINDOW_SLOTS: usize = 1 << WINDOW_SIZE;

/// Pre-allocated window table for one worker.
pub struct WindowPool {
    slots: Vec<Mpi>,
}

impl WindowPool {
    /// Allocate an empty table.
    pub fn new() -> Self {
        WindowPool {
            slots: (0..WINDOW_SLOTS).map(|_| Mpi::new()).collect(),
        }
    }

    /// Clear slot values, keeping their limb capacity for reuse.
    pub(crate) fn reset(&mut self) {
        for s in self.slots.iter_mut() {
            s.sign = 1;
            s.used = 0;
            for l in s.limbs.iter_mut() {
                *l = 0;
            }
        }
    }

    pub(crate) fn slots(&self) -> &[Mpi] {
        &self.slots
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [Mpi] {
        &mut self.slots
    }
}

impl Default for WindowPool {
    fn default() -> Self {
        Self::new()
    }
}

static REGISTRY: Mutex<Option<Arc<Vec<Mutex<WindowPool>>>>> = Mutex::new(None);

/// Pre-allocate one pool per worker. Idempotent.
pub fn init(nr_workers: usize) {
    let mut reg = REGISTRY.lock();
    if reg.is_none() {
        *reg = Some(Arc::new(
            (0..nr_workers.max(1))
                .map(|_| Mutex::new(WindowPool::new()))
                .collect(),
        ));
    }
}

/// Run `f` with exclusive access to the worker's pool. Returns `None` when
/// the registry was never initialised or the worker id is out of range.
pub fn with<R>(worker: usize, f: impl FnOnce(&mut WindowPool) -> R) -> Option<R> {
    let pools = { REGISTRY.lock().as_ref().cloned() }?;
    let pool = pools.get(worker)?;
    let mut guard = pool.lock();
    Some(f(&mut guard))
}

/// Release all worker pools.
pub fn teardown() {
    *REGISTRY.lock() = None;
}
