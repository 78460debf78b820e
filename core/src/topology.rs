//! Classifies logical CPUs as P- or E-core via sysfs and exposes the two
//! disjoint sets restricted to the admin-configured coreset.

use std::fs;
use std::path::Path;

use crate::coreset::Coreset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreClass {
    P,
    E,
}

impl CoreClass {
    /// PMU type id for `/sys/devices/{cpu_core,cpu_atom}/type`, with
    /// hardcoded fallbacks for when the sysfs node is absent.
    pub fn pmu_type(self) -> u32 {
        let name = match self {
            CoreClass::P => "cpu_core",
            CoreClass::E => "cpu_atom",
        };
        let fallback = match self {
            CoreClass::P => 4,
            CoreClass::E => 10,
        };
        read_u32(&format!("/sys/devices/{name}/type")).unwrap_or(fallback)
    }
}

/// The CPU index below which CPUs are assumed P-core when no sysfs
/// classification is available at all.
const BOUNDARY_FALLBACK: u32 = 8;

pub struct CoreTopology {
    pset: Coreset,
    eset: Coreset,
}

impl CoreTopology {
    /// Builds a topology by classifying every CPU in `admin_coreset`.
    pub fn discover(admin_coreset: &Coreset) -> Self {
        let mut p = Vec::new();
        let mut e = Vec::new();
        for &cpu in admin_coreset.cpus() {
            match classify(cpu) {
                CoreClass::P => p.push(cpu),
                CoreClass::E => e.push(cpu),
            }
        }
        CoreTopology {
            pset: Coreset::from_cpus(p),
            eset: Coreset::from_cpus(e),
        }
    }

    pub fn p_set(&self) -> &Coreset {
        &self.pset
    }

    pub fn e_set(&self) -> &Coreset {
        &self.eset
    }

    pub fn classify(&self, cpu: u32) -> Option<CoreClass> {
        if self.pset.contains(cpu) {
            Some(CoreClass::P)
        } else if self.eset.contains(cpu) {
            Some(CoreClass::E)
        } else {
            None
        }
    }
}

/// Classifies a single logical CPU, trying each source in order:
/// `core_type`, then `thread_siblings_list` (a sibling pair means P, a
/// singleton means E), then `core_cpus_list`'s first-listed sibling
/// against [`BOUNDARY_FALLBACK`], and finally the raw index boundary if
/// no sysfs is readable at all.
pub fn classify(cpu: u32) -> CoreClass {
    let topo = format!("/sys/devices/system/cpu/cpu{cpu}/topology");

    if let Some(core_type) = read_trimmed(&format!("{topo}/core_type")) {
        return match core_type.as_str() {
            "1" => CoreClass::P,
            "2" => CoreClass::E,
            _ => classify_via_siblings(&topo, cpu),
        };
    }
    classify_via_siblings(&topo, cpu)
}

fn classify_via_siblings(topo: &str, cpu: u32) -> CoreClass {
    if let Some(siblings) = read_trimmed(&format!("{topo}/thread_siblings_list")) {
        return if siblings.contains(',') || siblings.contains('-') {
            CoreClass::P
        } else {
            CoreClass::E
        };
    }
    if let Some(core_cpus) = read_trimmed(&format!("{topo}/core_cpus_list")) {
        let first: u32 = core_cpus
            .split(|c: char| c == ',' || c == '-')
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        return if first < BOUNDARY_FALLBACK {
            CoreClass::P
        } else {
            CoreClass::E
        };
    }
    if cpu < BOUNDARY_FALLBACK {
        CoreClass::P
    } else {
        CoreClass::E
    }
}

fn read_trimmed(path: &str) -> Option<String> {
    if !Path::new(path).exists() {
        return None;
    }
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

fn read_u32(path: &str) -> Option<u32> {
    read_trimmed(path).and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_fallback_splits_at_eight() {
        // With no sysfs present in the test sandbox this degrades to the
        // raw index boundary, exercising the last fallback rung.
        assert_eq!(classify(0), CoreClass::P);
    }
}
