//! Cached lookups of the real libc symbols this crate shadows. Each is
//! resolved once via `dlsym(RTLD_NEXT, ...)` and memoized in a
//! `once_cell::sync::OnceCell`.

use std::ffi::c_void;
use std::os::raw::{c_char, c_int};

use once_cell::sync::OnceCell;

pub type PthreadCreateFn = unsafe extern "C" fn(
    *mut libc::pthread_t,
    *const libc::pthread_attr_t,
    extern "C" fn(*mut c_void) -> *mut c_void,
    *mut c_void,
) -> c_int;

pub type CloneFn = unsafe extern "C" fn(
    extern "C" fn(*mut c_void) -> c_int,
    *mut c_void,
    c_int,
    *mut c_void,
    *mut libc::pid_t,
) -> c_int;

pub type PthreadExitFn = unsafe extern "C" fn(*mut c_void) -> !;

static REAL_PTHREAD_CREATE: OnceCell<PthreadCreateFn> = OnceCell::new();
static REAL_CLONE: OnceCell<CloneFn> = OnceCell::new();
static REAL_PTHREAD_EXIT: OnceCell<PthreadExitFn> = OnceCell::new();

/// Resolves `name` via `dlsym(RTLD_NEXT, ...)`. Panics if the real symbol
/// can't be found: without it there is no correct fallback behavior, only
/// silent breakage of every thread the host process spawns.
fn resolve(name: &'static str) -> *mut c_void {
    let cname = std::ffi::CString::new(name).expect("symbol name has no interior NUL");
    // SAFETY: RTLD_NEXT + a NUL-terminated name is the documented dlsym
    // contract; the result is checked for null before use.
    let ptr = unsafe { libc::dlsym(libc::RTLD_NEXT, cname.as_ptr()) };
    if ptr.is_null() {
        panic!("hybridsched-monitor: dlsym(RTLD_NEXT, {name:?}) returned NULL");
    }
    ptr
}

pub fn real_pthread_create() -> PthreadCreateFn {
    *REAL_PTHREAD_CREATE.get_or_init(|| {
        // SAFETY: resolve() guarantees a non-null function pointer with
        // the libc-documented pthread_create signature.
        unsafe { std::mem::transmute(resolve("pthread_create")) }
    })
}

pub fn real_clone() -> CloneFn {
    *REAL_CLONE.get_or_init(|| {
        // SAFETY: see real_pthread_create; clone(2)'s glibc wrapper has a
        // fixed 5-argument prototype for the subset this crate uses.
        unsafe { std::mem::transmute(resolve("clone")) }
    })
}

pub fn real_pthread_exit() -> PthreadExitFn {
    *REAL_PTHREAD_EXIT.get_or_init(|| {
        // SAFETY: see real_pthread_create.
        unsafe { std::mem::transmute(resolve("pthread_exit")) }
    })
}

pub const CLONE_THREAD: c_int = 0x00010000;

#[allow(dead_code)]
pub type CCharPtr = *const c_char;
