//! The seven logical hardware events this system tracks, and their raw
//! `perf_event_attr` encodings on each PMU. The P-core (`cpu_core`) and
//! E-core (`cpu_atom`) PMUs use different `event|umask` pairs for the
//! same logical event, which is the whole reason a
//! [`crate::perf::PerfSession`] must be reopened whenever its thread
//! migrates between classes.

use strum_macros::{EnumCount, EnumIter};

use crate::raw::{perf_event_attr, PERF_TYPE_SOFTWARE};
use crate::topology::CoreClass;

pub const PERF_COUNT_SW_PAGE_FAULTS: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
#[repr(usize)]
pub enum LogicalEvent {
    InstructionsRetired = 0,
    CoreCycles = 1,
    MemoryInstructionsRetired = 2,
    CacheLoadMiss = 3,
    MemoryStallCycles = 4,
    PageFaults = 5,
    UopsRetired = 6,
}

impl LogicalEvent {
    pub fn index(self) -> usize {
        self as usize
    }

    /// Builds the raw attribute for this event on the given class's PMU.
    /// Returns `None` when the event has no encoding on that class
    /// (`UopsRetired` is E-only); the session simply leaves that slot
    /// absent rather than treating it as an error.
    pub fn attr_for(self, class: CoreClass, pmu_type: u32) -> Option<perf_event_attr> {
        let mut attr = perf_event_attr::common();

        if self == LogicalEvent::PageFaults {
            attr.type_ = PERF_TYPE_SOFTWARE;
            attr.config = PERF_COUNT_SW_PAGE_FAULTS;
            return Some(attr);
        }

        attr.type_ = pmu_type;
        attr.config = match (class, self) {
            (CoreClass::P, LogicalEvent::InstructionsRetired) => encode(0xC0, 0x00, None),
            (CoreClass::P, LogicalEvent::CoreCycles) => encode(0x3C, 0x00, None),
            (CoreClass::P, LogicalEvent::MemoryInstructionsRetired) => encode(0xD0, 0x81, None),
            (CoreClass::P, LogicalEvent::CacheLoadMiss) => encode(0xD1, 0x20, None),
            (CoreClass::P, LogicalEvent::MemoryStallCycles) => encode(0xA3, 0x10, Some(0x10)),
            (CoreClass::P, LogicalEvent::UopsRetired) => return None,

            (CoreClass::E, LogicalEvent::InstructionsRetired) => encode(0xC0, 0x00, None),
            (CoreClass::E, LogicalEvent::CoreCycles) => encode(0x3C, 0x00, None),
            (CoreClass::E, LogicalEvent::MemoryInstructionsRetired) => encode(0xD0, 0x81, None),
            (CoreClass::E, LogicalEvent::CacheLoadMiss) => encode(0xD1, 0x10, None),
            (CoreClass::E, LogicalEvent::MemoryStallCycles) => encode(0x34, 0x07, None),
            (CoreClass::E, LogicalEvent::UopsRetired) => encode(0xC2, 0x00, None),

            (_, LogicalEvent::PageFaults) => unreachable!("handled above"),
        };
        Some(attr)
    }

    /// The reference-cycles encoding used internally for `cycles_per_ms`.
    /// Not one of the seven logical events surfaced in [`WindowRecord`],
    /// but needed by the sampler to compute elapsed cycles independent of
    /// frequency scaling.
    pub fn reference_cycles_attr(class: CoreClass, pmu_type: u32) -> perf_event_attr {
        let mut attr = perf_event_attr::common();
        attr.type_ = pmu_type;
        attr.config = match class {
            CoreClass::P => encode(0x3C, 0x03, None),
            CoreClass::E => encode(0x3C, 0x01, None),
        };
        attr
    }

    /// The store-side counterpart of `MemoryInstructionsRetired`'s load
    /// encoding; accumulated together into the same logical slot for a
    /// combined loads+stores count.
    pub fn memory_stores_attr(pmu_type: u32) -> perf_event_attr {
        let mut attr = perf_event_attr::common();
        attr.type_ = pmu_type;
        attr.config = encode(0xD0, 0x82, None);
        attr
    }

    /// Also kept internally: the cache-load-*hit* counterpart of
    /// `CacheLoadMiss`, not surfaced as its own [`LogicalEvent`] since
    /// only a miss counter is exposed in the window record.
    pub fn cache_load_hit_attr(class: CoreClass, pmu_type: u32) -> perf_event_attr {
        let mut attr = perf_event_attr::common();
        attr.type_ = pmu_type;
        attr.config = match class {
            CoreClass::P => encode(0xD1, 0x04, None),
            CoreClass::E => encode(0xD1, 0x02, None),
        };
        attr
    }
}

const fn encode(event: u64, umask: u64, cmask: Option<u64>) -> u64 {
    let base = event | (umask << 8);
    match cmask {
        Some(c) => base | (c << 24),
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::EnumCount;

    #[test]
    fn seven_logical_events() {
        assert_eq!(LogicalEvent::COUNT, crate::config::NUM_EVENTS);
    }

    #[test]
    fn uops_retired_is_e_core_only() {
        assert!(LogicalEvent::UopsRetired.attr_for(CoreClass::P, 4).is_none());
        assert!(LogicalEvent::UopsRetired.attr_for(CoreClass::E, 10).is_some());
    }

    #[test]
    fn cache_load_miss_differs_by_class() {
        let p = LogicalEvent::CacheLoadMiss.attr_for(CoreClass::P, 4).unwrap();
        let e = LogicalEvent::CacheLoadMiss.attr_for(CoreClass::E, 10).unwrap();
        assert_ne!(p.config, e.config);
    }

    #[test]
    fn page_faults_is_software_type_on_both_classes() {
        let p = LogicalEvent::PageFaults.attr_for(CoreClass::P, 4).unwrap();
        let e = LogicalEvent::PageFaults.attr_for(CoreClass::E, 10).unwrap();
        assert_eq!(p.type_, PERF_TYPE_SOFTWARE);
        assert_eq!(p.type_, e.type_);
        assert_eq!(p.config, e.config);
    }
}
