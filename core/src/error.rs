use thiserror::Error;

use crate::coreset::CoresetError;
use crate::predictor::ModelError;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors an OpenError-producing perf_event_open call can surface. Mirrors
/// the documented errno cases for the syscall rather than a generic
/// "io error" bucket, so callers can decide per-variant whether to retry,
/// drop the event, or abort the whole session.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error(
        "perf_event_attr size is wrong: smaller than PERF_ATTR_SIZE_VER0, bigger than a page, \
         or the kernel doesn't recognize the extra bytes"
    )]
    AttrWrongSize,
    #[error(
        "the requested event needs CAP_SYS_ADMIN or a more permissive perf_event_paranoid setting"
    )]
    CapSysAdminRequired,
    #[error("group_fd is not a valid file descriptor")]
    InvalidFdOrPid,
    #[error("another event already has exclusive access to this PMU")]
    PmuBusy,
    #[error("the specified event is invalid for this PMU")]
    InvalidEvent,
    #[error("per-process open file descriptor limit reached")]
    TooManyOpenFiles,
    #[error("event requires a CPU feature this hardware does not have")]
    CpuFeatureUnsupported,
    #[error("attr.type is not a PMU type this kernel recognizes")]
    InvalidEventType,
    #[error("attempted to attach to a process that does not exist")]
    ProcessDoesNotExist,
    #[error("unexpected errno from perf_event_open: {0}")]
    Unknown(nix::errno::Errno),
}

impl From<nix::errno::Errno> for OpenError {
    fn from(errno: nix::errno::Errno) -> OpenError {
        use nix::errno::Errno;
        match errno {
            Errno::E2BIG => OpenError::AttrWrongSize,
            Errno::EACCES => OpenError::CapSysAdminRequired,
            Errno::EBADF => OpenError::InvalidFdOrPid,
            Errno::EBUSY => OpenError::PmuBusy,
            Errno::EINVAL => OpenError::InvalidEvent,
            Errno::EMFILE => OpenError::TooManyOpenFiles,
            Errno::ENODEV => OpenError::CpuFeatureUnsupported,
            Errno::ENOENT => OpenError::InvalidEventType,
            Errno::ESRCH => OpenError::ProcessDoesNotExist,
            other => OpenError::Unknown(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to open a perf_events file descriptor: {inner}")]
    FdOpen {
        #[from]
        inner: OpenError,
    },
    #[error("failed to enable a perf_events file descriptor: {inner}")]
    Enable { inner: nix::Error },
    #[error("failed to read from a perf_events file descriptor: {inner}")]
    Read { inner: std::io::Error },
    #[error("invalid coreset: {inner}")]
    Coreset {
        #[from]
        inner: CoresetError,
    },
    #[error("invalid placement model: {inner}")]
    Model {
        #[from]
        inner: ModelError,
    },
    #[error("i/o error: {inner}")]
    Io {
        #[from]
        inner: std::io::Error,
    },
}
