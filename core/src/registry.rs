//! A bounded table of the active threads in the target process. Slot
//! reuse prefers an inactive slot, then appends, then fails with `Full`.

use std::sync::Mutex;

use crate::config::MAX_THREADS;
use crate::io_sampler::IoSnapshot;
use crate::perf::PerfSession;

#[derive(Debug, PartialEq, Eq)]
pub struct Full;

/// One tracked thread. Lifecycle: created at interposition of
/// thread-create (or first sight in a `/proc` scan fallback), becomes
/// inactive on thread-exit or when its CPU can no longer be read;
/// inactive entries may be reused by a later `alloc`.
pub struct ThreadEntry {
    pub thread_id: libc::pid_t,
    pub active: bool,
    pub session: Option<PerfSession>,
    pub prev_io: Option<IoSnapshot>,
    pub observed_cpus: Vec<u32>,
}

impl ThreadEntry {
    fn new(thread_id: libc::pid_t) -> Self {
        ThreadEntry {
            thread_id,
            active: true,
            session: None,
            prev_io: None,
            observed_cpus: Vec::new(),
        }
    }
}

#[derive(Default)]
struct Inner {
    slots: Vec<ThreadEntry>,
}

/// Exclusively owns every [`ThreadEntry`]; callers never hold a `&mut
/// ThreadEntry` outside the registry's lock. A single coarse mutex
/// guards the whole table: sampling bursts are short and thread
/// creation/exit is comparatively rare, so a finer-grained or lock-free
/// scheme isn't worth the complexity.
pub struct ThreadRegistry {
    inner: Mutex<Inner>,
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        ThreadRegistry {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a slot for `thread_id`, reusing the lowest-index inactive
    /// slot if one exists, otherwise appending if under [`MAX_THREADS`].
    pub fn alloc(&self, thread_id: libc::pid_t) -> Result<usize, Full> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(idx) = inner.slots.iter().position(|e| !e.active) {
            inner.slots[idx] = ThreadEntry::new(thread_id);
            return Ok(idx);
        }
        if inner.slots.len() >= MAX_THREADS {
            return Err(Full);
        }
        inner.slots.push(ThreadEntry::new(thread_id));
        Ok(inner.slots.len() - 1)
    }

    pub fn find(&self, thread_id: libc::pid_t) -> Option<usize> {
        let inner = self.inner.lock().unwrap();
        inner
            .slots
            .iter()
            .position(|e| e.active && e.thread_id == thread_id)
    }

    pub fn deactivate(&self, idx: usize) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.slots.get_mut(idx) {
            if let Some(mut session) = entry.session.take() {
                session.close();
            }
            entry.active = false;
        }
    }

    /// Runs `f` against every active entry while holding the lock for the
    /// whole iteration.
    pub fn for_each_active<F: FnMut(&mut ThreadEntry)>(&self, mut f: F) {
        let mut inner = self.inner.lock().unwrap();
        for entry in inner.slots.iter_mut().filter(|e| e.active) {
            f(entry);
        }
    }

    pub fn active_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.slots.iter().filter(|e| e.active).count()
    }

    /// Runs `f` with mutable access to a single entry by index, if it's
    /// still active. Used by the interposer to fill in a freshly
    /// allocated slot without holding the lock across a perf_event_open
    /// syscall longer than necessary.
    pub fn with_entry<R>(&self, idx: usize, f: impl FnOnce(&mut ThreadEntry) -> R) -> Option<R> {
        let mut inner = self.inner.lock().unwrap();
        inner.slots.get_mut(idx).filter(|e| e.active).map(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_inactive_slot_before_appending() {
        let reg = ThreadRegistry::new();
        let a = reg.alloc(100).unwrap();
        let _b = reg.alloc(101).unwrap();
        reg.deactivate(a);
        let c = reg.alloc(102).unwrap();
        assert_eq!(c, a, "should reuse the deactivated slot, not append");
    }

    #[test]
    fn fails_full_past_max_threads() {
        let reg = ThreadRegistry::new();
        for i in 0..MAX_THREADS as libc::pid_t {
            reg.alloc(1000 + i).unwrap();
        }
        assert_eq!(reg.alloc(99999), Err(Full));
        assert_eq!(reg.active_count(), MAX_THREADS);
    }
}
