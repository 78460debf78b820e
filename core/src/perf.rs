//! Owns the kernel counter file descriptors for one thread on its current
//! core class: open, start, read deltas, close.

use std::fs::File;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};

use strum::IntoEnumIterator;

use crate::config::NUM_EVENTS;
use crate::error::{OpenError, Result};
use crate::events::LogicalEvent;
use crate::raw::{perf_event_attr, ReadFormat, PERF_EVENT_IOC_DISABLE, PERF_EVENT_IOC_ENABLE};
use crate::topology::CoreClass;

fn perf_event_open(attr: &perf_event_attr, pid: libc::pid_t, cpu: i32) -> Result<File> {
    // SAFETY: attr is a valid, fully-initialized perf_event_attr; the
    // kernel either returns a valid fd or -1 with errno set.
    let res = unsafe {
        libc::syscall(
            libc::SYS_perf_event_open,
            attr as *const perf_event_attr,
            pid,
            cpu,
            -1i32, // group_fd: each event is its own group
            0u64,
        )
    };
    if res == -1 {
        let errno = nix::errno::Errno::last();
        return Err(crate::error::Error::FdOpen {
            inner: OpenError::from(errno),
        });
    }
    // SAFETY: the kernel guarantees a valid fd when it doesn't return -1.
    Ok(unsafe { File::from_raw_fd(res as RawFd) })
}

fn ioctl_noarg(fd: RawFd, request: u64) -> Result<()> {
    // SAFETY: these are the documented zero-argument perf_event ioctls.
    let res = unsafe { libc::ioctl(fd, request as _, 0) };
    if res == -1 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

/// One kernel counter, present only if the logical event has an encoding
/// on the session's current class.
struct OpenCounter {
    event: LogicalEvent,
    file: File,
    previous: u64,
}

/// Per-thread performance-counter session. Reading is soft-degraded: a
/// failed read on one counter zeros that slot rather than failing the
/// whole session, matching `open_or_reopen_thread_perf`'s baseline-reset
/// behavior on read failure.
pub struct PerfSession {
    thread_id: libc::pid_t,
    class: CoreClass,
    counters: Vec<OpenCounter>,
}

impl PerfSession {
    /// Opens up to [`NUM_EVENTS`] counters for `thread_id` pinned to
    /// whichever CPU it happens to run on (`cpu = -1`), configured for
    /// `class`'s PMU. Events unsupported on this class are silently
    /// absent; the session is still usable as long as at least one
    /// counter opened.
    pub fn open(thread_id: libc::pid_t, class: CoreClass) -> Result<Self> {
        let pmu_type = class.pmu_type();
        let mut counters = Vec::with_capacity(NUM_EVENTS);
        for event in LogicalEvent::iter() {
            let Some(attr) = event.attr_for(class, pmu_type) else {
                continue;
            };
            match perf_event_open(&attr, thread_id, -1) {
                Ok(file) => counters.push(OpenCounter {
                    event,
                    file,
                    previous: 0,
                }),
                Err(e) => {
                    log::debug!(target: "monitor", "counter {event:?} unavailable on {class:?} for tid {thread_id}: {e}");
                }
            }
        }
        Ok(PerfSession {
            thread_id,
            class,
            counters,
        })
    }

    pub fn class(&self) -> CoreClass {
        self.class
    }

    pub fn thread_id(&self) -> libc::pid_t {
        self.thread_id
    }

    /// Resets and enables every present counter.
    pub fn start(&self) -> Result<()> {
        for counter in &self.counters {
            let fd = counter.file.as_raw_fd();
            ioctl_noarg(fd, crate::raw::PERF_EVENT_IOC_RESET)?;
            ioctl_noarg(fd, PERF_EVENT_IOC_ENABLE)?;
        }
        Ok(())
    }

    /// Atomically disables, reads, and re-enables every present counter,
    /// writing the per-event delta since the last read into `deltas`
    /// (indexed by [`LogicalEvent::index`]). Counters with no encoding on
    /// this class stay at zero. A counter whose read fails is zeroed for
    /// this tick rather than aborting the whole read.
    pub fn read_deltas(&mut self, deltas: &mut [i64; NUM_EVENTS]) {
        deltas.fill(0);
        for counter in &mut self.counters {
            let fd = counter.file.as_raw_fd();
            let _ = ioctl_noarg(fd, PERF_EVENT_IOC_DISABLE);
            let current = read_counter(&counter.file).unwrap_or(0);
            let _ = ioctl_noarg(fd, PERF_EVENT_IOC_ENABLE);

            let delta = current.saturating_sub(counter.previous);
            deltas[counter.event.index()] = delta as i64;
            counter.previous = current;
        }
    }

    /// Releases every descriptor. Idempotent: calling this on an
    /// already-closed session (no counters left) is a no-op.
    pub fn close(&mut self) {
        self.counters.clear();
    }
}

fn read_counter(file: &File) -> std::io::Result<u64> {
    use std::io::Read;
    let mut buf = [0u8; std::mem::size_of::<ReadFormat>()];
    let mut file = file.try_clone()?;
    file.read_exact(&mut buf)?;
    // SAFETY: ReadFormat is repr(C) plain data and buf is exactly its size.
    let fmt: ReadFormat = unsafe { std::ptr::read(buf.as_ptr() as *const ReadFormat) };
    Ok(fmt.value)
}

impl Drop for PerfSession {
    fn drop(&mut self) {
        self.close();
    }
}
