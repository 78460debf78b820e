//! Derived per-window ratios, each guarded against division by zero
//! (result defined as `0.0`, never `NaN`/`Inf`).

use crate::config::NUM_EVENTS;
use crate::io_sampler::IoSnapshot;

/// Indices into a `[i64; NUM_EVENTS]` counter-delta array, matching
/// [`crate::events::LogicalEvent::index`].
pub mod idx {
    pub const INST_RETIRED: usize = 0;
    pub const CORE_CYCLES: usize = 1;
    pub const MEM_INST_RETIRED: usize = 2;
    pub const CACHE_LOAD_MISS: usize = 3;
    pub const MEM_STALL_CYCLES: usize = 4;
    pub const PAGE_FAULTS: usize = 5;
    pub const UOPS_RETIRED: usize = 6;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerformanceRatios {
    pub ipc: f64,
    pub cache_miss_ratio: f64,
    pub uop_per_cycle: f64,
    pub mem_stall_per_mem_inst: f64,
    pub mem_stall_per_inst: f64,
    pub fault_rate_per_mem_instr: f64,
    pub rchar_per_cycle: f64,
    pub wchar_per_cycle: f64,
    pub rbytes_per_cycle: f64,
    pub wbytes_per_cycle: f64,
}

/// Divides `num / den`, returning `0.0` when `den` is zero instead of
/// producing `NaN`/`Inf`.
fn guarded(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        let v = num / den;
        if v.is_finite() {
            v
        } else {
            0.0
        }
    }
}

impl PerformanceRatios {
    pub fn compute(counters: &[i64; NUM_EVENTS], io: &IoSnapshot) -> Self {
        let inst = counters[idx::INST_RETIRED] as f64;
        let cycles = counters[idx::CORE_CYCLES] as f64;
        let mem_inst = counters[idx::MEM_INST_RETIRED] as f64;
        let cache_miss = counters[idx::CACHE_LOAD_MISS] as f64;
        let mem_stall = counters[idx::MEM_STALL_CYCLES] as f64;
        let uops = counters[idx::UOPS_RETIRED] as f64;
        let faults = counters[idx::PAGE_FAULTS] as f64;

        PerformanceRatios {
            ipc: guarded(inst, cycles),
            cache_miss_ratio: guarded(cache_miss, mem_inst),
            uop_per_cycle: guarded(uops, cycles),
            mem_stall_per_mem_inst: guarded(mem_stall, mem_inst),
            mem_stall_per_inst: guarded(mem_stall, inst),
            fault_rate_per_mem_instr: guarded(faults, mem_inst),
            rchar_per_cycle: guarded(io.rchar as f64, cycles),
            wchar_per_cycle: guarded(io.wchar as f64, cycles),
            rbytes_per_cycle: guarded(io.read_bytes as f64, cycles),
            wbytes_per_cycle: guarded(io.write_bytes as f64, cycles),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_denominator_yields_zero_not_nan() {
        let counters = [0i64; NUM_EVENTS];
        let io = IoSnapshot::default();
        let ratios = PerformanceRatios::compute(&counters, &io);
        assert_eq!(ratios, PerformanceRatios::default());
        assert!(ratios.ipc.is_finite());
    }

    #[test]
    fn ipc_is_instructions_over_cycles() {
        let mut counters = [0i64; NUM_EVENTS];
        counters[idx::INST_RETIRED] = 200;
        counters[idx::CORE_CYCLES] = 100;
        let ratios = PerformanceRatios::compute(&counters, &IoSnapshot::default());
        assert_eq!(ratios.ipc, 2.0);
    }
}
