//! A hand-written mirror of the kernel's `struct perf_event_attr` and the
//! handful of `perf_event_open` constants this crate needs, matching the
//! public `perf_event.h` layout field-for-field.

use bitflags::bitflags;

pub const PERF_TYPE_HARDWARE: u32 = 0;
pub const PERF_TYPE_SOFTWARE: u32 = 1;

pub const PERF_FORMAT_TOTAL_TIME_ENABLED: u64 = 1 << 0;
pub const PERF_FORMAT_TOTAL_TIME_RUNNING: u64 = 1 << 1;

pub const PERF_EVENT_IOC_ENABLE: u64 = 0x2400;
pub const PERF_EVENT_IOC_DISABLE: u64 = 0x2401;
pub const PERF_EVENT_IOC_RESET: u64 = 0x2403;

bitflags! {
    /// The packed single-bit settings field of `perf_event_attr`. Only the
    /// bits this system actually sets are named; the rest default to 0.
    #[derive(Default)]
    pub struct AttrFlags: u64 {
        const DISABLED       = 1 << 0;
        const INHERIT        = 1 << 1;
        const PINNED         = 1 << 2;
        const EXCLUSIVE      = 1 << 3;
        const EXCLUDE_USER   = 1 << 4;
        const EXCLUDE_KERNEL = 1 << 5;
        const EXCLUDE_HV     = 1 << 6;
        const EXCLUDE_IDLE   = 1 << 7;
    }
}

/// Mirrors the kernel ABI layout field-for-field (unions collapsed to
/// their most-used member, which is sound as long as this crate never
/// reads the other member of a union it didn't write).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct perf_event_attr {
    pub type_: u32,
    pub size: u32,
    pub config: u64,
    pub sample_period: u64,
    pub sample_type: u64,
    pub read_format: u64,
    pub flags: AttrFlags,
    pub wakeup_events: u32,
    pub bp_type: u32,
    pub config1: u64,
    pub config2: u64,
    pub branch_sample_type: u64,
    pub sample_regs_user: u64,
    pub sample_stack_user: u32,
    pub clockid: i32,
    pub sample_regs_intr: u64,
    pub aux_watermark: u32,
    pub sample_max_stack: u16,
    pub __reserved_2: u16,
}

impl perf_event_attr {
    /// The fields every event this system opens shares: `disabled=1`,
    /// `exclude_kernel=0` (kernel samples are included, deliberately),
    /// `exclude_hv=1`, and both time-accounting read-format bits so
    /// multiplexed reads stay comparable across ticks.
    pub fn common() -> Self {
        let mut attr = perf_event_attr::zeroed();
        attr.size = std::mem::size_of::<perf_event_attr>() as u32;
        attr.flags = AttrFlags::DISABLED | AttrFlags::EXCLUDE_HV;
        attr.read_format = PERF_FORMAT_TOTAL_TIME_ENABLED | PERF_FORMAT_TOTAL_TIME_RUNNING;
        attr
    }

    fn zeroed() -> Self {
        // SAFETY: perf_event_attr is a plain-old-data repr(C) struct with
        // no invalid all-zero bit pattern for any of its fields.
        unsafe { std::mem::zeroed() }
    }
}

impl std::fmt::Debug for perf_event_attr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("perf_event_attr")
            .field("type_", &self.type_)
            .field("config", &format_args!("{:#x}", self.config))
            .field("flags", &self.flags)
            .field("read_format", &self.read_format)
            .finish()
    }
}

/// The six u64 fields `read(2)` yields when `read_format` requests both
/// time-enabled and time-running alongside the raw value.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadFormat {
    pub value: u64,
    pub time_enabled: u64,
    pub time_running: u64,
}
