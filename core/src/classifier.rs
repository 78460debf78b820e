//! The secondary, pluggable Compute/IO/Memory category pathway: a
//! two-rule heuristic stands in for the heavier random-forest/ONNX
//! classifiers this pathway could otherwise use, feeding a proportional
//! coreset allocator with hardcoded single-core fallbacks. Opt-in via
//! `PLACEMENT_MODE=category`; it recomputes every daemon tick regardless
//! of which pathway is active.

use std::collections::HashMap;

use crate::config::{COMPUTE_FALLBACK, IO_FALLBACK, MEMORY_FALLBACK};
use crate::coreset::Coreset;
use crate::ratios::PerformanceRatios;
use crate::topology::CoreTopology;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Compute,
    Io,
    Memory,
}

/// The pluggable seam the full random-forest/ONNX classifiers would
/// implement; this crate ships only [`HeuristicClassifier`].
pub trait CategoryClassifier {
    fn classify(&self, ratios: &PerformanceRatios) -> Category;
}

/// The two-rule heuristic from `tree_prefers_P`, generalized to also pick
/// between Io and Memory when P is not preferred (the original only ever
/// distinguishes "prefers P" from "does not"; the three-way category
/// split layered on top here picks whichever of
/// `fault_rate_per_mem_instr` vs. the rchar/wchar-per-cycle sum dominates
/// for the non-P case).
pub struct HeuristicClassifier;

impl CategoryClassifier for HeuristicClassifier {
    fn classify(&self, ratios: &PerformanceRatios) -> Category {
        let prefers_p = (ratios.cache_miss_ratio > 0.20 && ratios.mem_stall_per_mem_inst > 0.30)
            || (ratios.ipc < 0.50 && ratios.mem_stall_per_mem_inst > 0.25);
        if prefers_p {
            return Category::Compute;
        }
        let io_pressure = ratios.rchar_per_cycle + ratios.wchar_per_cycle;
        if ratios.fault_rate_per_mem_instr > io_pressure {
            Category::Memory
        } else {
            Category::Io
        }
    }
}

/// Proportionally splits the admin coreset across the three categories by
/// active-thread-count weighting. Falls back to the literal hardcoded
/// single-CPU coresets when a category's computed share can't be
/// satisfied (its weight is zero, or the topology has too few cores to
/// give it even one). `Io`'s fallback, `"16"`, is deliberately out of
/// range for [`crate::config::MAX_CORES`], so it's parsed with
/// [`Coreset::parse_unchecked`].
pub fn compute_dynamic_coresets(
    topology: &CoreTopology,
    counts: &HashMap<Category, u32>,
) -> (Coreset, Coreset, Coreset) {
    let total: u32 = counts.values().sum();
    let all_cpus: Vec<u32> = topology
        .p_set()
        .cpus()
        .iter()
        .chain(topology.e_set().cpus().iter())
        .copied()
        .collect();

    if total == 0 || all_cpus.is_empty() {
        return fallback_coresets();
    }

    let mut sorted = all_cpus.clone();
    sorted.sort_unstable();

    let mut shares = HashMap::new();
    let mut used = 0usize;
    for cat in [Category::Compute, Category::Io, Category::Memory] {
        let weight = *counts.get(&cat).unwrap_or(&0);
        let share = ((weight as f64 / total as f64) * sorted.len() as f64).round() as usize;
        shares.insert(cat, share);
        used += share;
    }
    if used == 0 || used > sorted.len() {
        return fallback_coresets();
    }

    let mut offset = 0;
    let mut result = HashMap::new();
    for cat in [Category::Compute, Category::Io, Category::Memory] {
        let share = shares[&cat];
        if share == 0 {
            result.insert(cat, fallback_for(cat));
            continue;
        }
        let slice = &sorted[offset..offset + share];
        result.insert(cat, Coreset::from_cpus(slice.to_vec()));
        offset += share;
    }

    (
        result.remove(&Category::Compute).unwrap(),
        result.remove(&Category::Io).unwrap(),
        result.remove(&Category::Memory).unwrap(),
    )
}

fn fallback_for(cat: Category) -> Coreset {
    let s = match cat {
        Category::Compute => COMPUTE_FALLBACK,
        Category::Io => IO_FALLBACK,
        Category::Memory => MEMORY_FALLBACK,
    };
    Coreset::parse_unchecked(s).expect("fallback coreset strings are always well-formed")
}

fn fallback_coresets() -> (Coreset, Coreset, Coreset) {
    (
        fallback_for(Category::Compute),
        fallback_for(Category::Io),
        fallback_for(Category::Memory),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_when_no_threads_are_active() {
        let coreset = Coreset::parse_bounded("0-15").unwrap();
        let topo = CoreTopology::discover(&coreset);
        let (compute, io, memory) = compute_dynamic_coresets(&topo, &HashMap::new());
        assert_eq!(compute.to_canonical_string(), COMPUTE_FALLBACK);
        assert_eq!(io.cpus(), &[16]);
        assert_eq!(memory.to_canonical_string(), MEMORY_FALLBACK);
    }

    #[test]
    fn heuristic_prefers_compute_on_high_stall_low_ipc() {
        let ratios = PerformanceRatios {
            ipc: 0.3,
            mem_stall_per_mem_inst: 0.4,
            ..Default::default()
        };
        assert_eq!(HeuristicClassifier.classify(&ratios), Category::Compute);
    }
}
