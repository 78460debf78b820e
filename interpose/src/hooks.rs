//! `#[no_mangle] extern "C"` overrides for `pthread_create`, `clone`, and
//! `pthread_exit`, plus the `thread_wrapper` trampoline `pthread_create`
//! routes every intercepted spawn through.

use std::ffi::c_void;
use std::os::raw::c_int;

use hybridsched_core::perf::PerfSession;
use hybridsched_core::procstat;
use hybridsched_core::topology::CoreClass;

use crate::state::{self, BYPASS};
use crate::symbols::{self, CLONE_THREAD};

/// What the trampoline needs to call the real start routine with the
/// real argument, once its own bookkeeping is done.
struct TrampolineArgs {
    real_fn: extern "C" fn(*mut c_void) -> *mut c_void,
    real_arg: *mut c_void,
}

// SAFETY: TrampolineArgs is handed across the pthread_create boundary
// exactly once, to exactly the thread that owns it; there is no shared
// mutable access.
unsafe impl Send for TrampolineArgs {}

extern "C" fn thread_wrapper(arg: *mut c_void) -> *mut c_void {
    // SAFETY: arg was produced by Box::into_raw in our pthread_create
    // override immediately before spawning this very thread.
    let boxed: Box<TrampolineArgs> = unsafe { Box::from_raw(arg as *mut TrampolineArgs) };
    let TrampolineArgs { real_fn, real_arg } = *boxed;

    state::set_bypassed(true);
    register_current_thread();
    state::set_bypassed(false);

    let result = real_fn(real_arg);

    // Normal-return cleanup only: a thread that calls pthread_exit
    // instead of returning never reaches this line, see the pthread_exit
    // override below.
    deactivate_current_thread();

    result
}

fn register_current_thread() {
    let Some(monitor_state) = state::get() else {
        return;
    };
    let tid = current_tid();
    let Ok(idx) = monitor_state.registry.alloc(tid) else {
        log::warn!(target: "monitor", "thread registry full, tid {tid} will not be sampled");
        return;
    };
    let class = procstat::current_cpu(std::process::id() as libc::pid_t, tid)
        .and_then(|cpu| monitor_state.topology.classify(cpu))
        .unwrap_or(CoreClass::P);
    let _ = monitor_state.registry.with_entry(idx, |entry| {
        if let Ok(session) = PerfSession::open(tid, class) {
            let _ = session.start();
            entry.session = Some(session);
        }
    });
}

fn deactivate_current_thread() {
    let Some(monitor_state) = state::get() else {
        return;
    };
    let tid = current_tid();
    if let Some(idx) = monitor_state.registry.find(tid) {
        monitor_state.registry.deactivate(idx);
    }
}

fn current_tid() -> libc::pid_t {
    // SAFETY: gettid(2) takes no arguments and cannot fail.
    unsafe { libc::syscall(libc::SYS_gettid) as libc::pid_t }
}

#[no_mangle]
pub extern "C" fn pthread_create(
    thread: *mut libc::pthread_t,
    attr: *const libc::pthread_attr_t,
    start_routine: extern "C" fn(*mut c_void) -> *mut c_void,
    arg: *mut c_void,
) -> c_int {
    if BYPASS.with(|b| b.get()) || state::get().is_none() {
        // SAFETY: forwarding verbatim to the real implementation with the
        // caller's own arguments.
        return unsafe { (symbols::real_pthread_create())(thread, attr, start_routine, arg) };
    }

    let boxed = Box::new(TrampolineArgs {
        real_fn: start_routine,
        real_arg: arg,
    });
    let raw = Box::into_raw(boxed) as *mut c_void;

    // SAFETY: thread_wrapper has the exact start-routine signature
    // pthread_create requires, and raw is a valid TrampolineArgs pointer
    // consumed exactly once inside it.
    unsafe { (symbols::real_pthread_create())(thread, attr, thread_wrapper, raw) }
}

/// Fixed 5-argument override: this platform funnels every real thread
/// spawn through `pthread_create` above, so this override exists only to
/// catch a raw `clone(2)` call made with `CLONE_THREAD` directly. It is a
/// best-effort catch, not a full `clone(2)` reimplementation: Rust has no
/// stable way to accept C variadics, so the `ctid`/`tls` arguments some
/// callers pass beyond these five are not forwarded.
#[no_mangle]
pub extern "C" fn clone(
    child_fn: extern "C" fn(*mut c_void) -> c_int,
    child_stack: *mut c_void,
    flags: c_int,
    arg: *mut c_void,
    ptid: *mut libc::pid_t,
) -> c_int {
    // SAFETY: forwarding the caller's own arguments verbatim.
    let child_tid = unsafe { (symbols::real_clone())(child_fn, child_stack, flags, arg, ptid) };

    if flags & CLONE_THREAD != 0 && child_tid > 0 {
        if let Some(monitor_state) = state::get() {
            if monitor_state.registry.alloc(child_tid).is_err() {
                log::warn!(target: "monitor", "thread registry full, clone()'d tid {child_tid} will not be sampled");
            }
        }
    }

    child_tid
}

#[no_mangle]
pub extern "C" fn pthread_exit(retval: *mut c_void) -> ! {
    // Deliberately does not deactivate the calling thread's registry slot.
    // A thread that exits via pthread_exit never returns through
    // thread_wrapper's normal-return path, so its slot stays marked active
    // until the next sampling tick fails to find /proc/.../stat for this
    // tid and deactivates it there instead.
    // SAFETY: forwarding the caller's own argument; this call never
    // returns, matching the real pthread_exit's contract.
    unsafe { (symbols::real_pthread_exit())(retval) }
}
