//! Per-PID queue state the scheduler daemon holds between ticks: the
//! latest record, a short bounded history for exponential smoothing, and
//! hysteresis state for the current placement.

use std::collections::VecDeque;

use hybridsched_core::config::HYSTERESIS_MARGIN;
use hybridsched_core::predictor::LinearModel5;
use hybridsched_core::ratios::PerformanceRatios;
use hybridsched_core::topology::CoreClass;
use hybridsched_core::window::WindowRecord;

/// Bound on the smoothing history ring; geometric weights beyond this
/// many entries are negligible.
const MAX_HISTORY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PredictedCategory {
    Startup,
    Placed(CoreClass),
}

/// One PID's tracked state. Created on first contact, destroyed when the
/// PID is no longer live.
pub struct QueueEntry {
    pub pid: libc::pid_t,
    pub latest: WindowRecord,
    history: VecDeque<PerformanceRatios>,
    last_used: Option<PerformanceRatios>,
    pub startup_pending: bool,
    pub current_class: Option<CoreClass>,
    pub predicted_category: PredictedCategory,
    pub pthread_count: i32,
    pub pcore_count: i32,
    pub ecore_count: i32,
}

impl QueueEntry {
    pub fn new(pid: libc::pid_t, record: WindowRecord, startup_flag: bool) -> Self {
        QueueEntry {
            pid,
            pthread_count: record.pthread_count,
            pcore_count: record.pcore_count,
            ecore_count: record.ecore_count,
            latest: record,
            history: VecDeque::new(),
            last_used: None,
            startup_pending: startup_flag,
            current_class: None,
            predicted_category: PredictedCategory::Startup,
        }
    }

    /// Feeds a new sample in: restores the bookkeeping thread/core counts
    /// from it (not recomputed, just carried over), and pushes its ratios
    /// onto the smoothing history.
    pub fn push_sample(&mut self, record: WindowRecord, startup_flag: bool) {
        self.pthread_count = record.pthread_count;
        self.pcore_count = record.pcore_count;
        self.ecore_count = record.ecore_count;
        if self.history.len() >= MAX_HISTORY {
            self.history.pop_back();
        }
        self.history.push_front(self.latest.ratios);
        self.latest = record;
        self.startup_pending = startup_flag;
    }

    /// Exponential smoothing: weights `1, 1/2, 1/4, ...` applied to the
    /// latest record and each history entry in turn, plus an optional
    /// `last_used` term at the same decay exponent as the next history
    /// slot, divided by the literal sum of weights actually used.
    /// Mutates `self.latest.ratios` in place and clears the history ring
    /// (`history_count` resets to zero every tick in the grounding
    /// source; `last_used` persists across ticks, which is how smoothing
    /// compounds tick-to-tick even though history itself doesn't).
    pub fn smooth(&mut self) {
        let mut weight = 1.0;
        let mut weighted_sum = weight_ratios(&self.latest.ratios, weight);
        let mut weight_total = weight;

        for entry in self.history.iter() {
            weight *= 0.5;
            weighted_sum = add_ratios(weighted_sum, weight_ratios(entry, weight));
            weight_total += weight;
        }

        if let Some(last_used) = &self.last_used {
            weight *= 0.5;
            weighted_sum = add_ratios(weighted_sum, weight_ratios(last_used, weight));
            weight_total += weight;
        }

        let smoothed = scale_ratios(weighted_sum, weight_total);
        self.last_used = Some(smoothed);
        self.latest.ratios = clamp_finite(smoothed);
        self.history.clear();
    }

    pub fn evict_reason(&self) -> &'static str {
        "pid no longer live"
    }
}

fn weight_ratios(r: &PerformanceRatios, w: f64) -> PerformanceRatios {
    PerformanceRatios {
        ipc: r.ipc * w,
        cache_miss_ratio: r.cache_miss_ratio * w,
        uop_per_cycle: r.uop_per_cycle * w,
        mem_stall_per_mem_inst: r.mem_stall_per_mem_inst * w,
        mem_stall_per_inst: r.mem_stall_per_inst * w,
        fault_rate_per_mem_instr: r.fault_rate_per_mem_instr * w,
        rchar_per_cycle: r.rchar_per_cycle * w,
        wchar_per_cycle: r.wchar_per_cycle * w,
        rbytes_per_cycle: r.rbytes_per_cycle * w,
        wbytes_per_cycle: r.wbytes_per_cycle * w,
    }
}

fn add_ratios(a: PerformanceRatios, b: PerformanceRatios) -> PerformanceRatios {
    PerformanceRatios {
        ipc: a.ipc + b.ipc,
        cache_miss_ratio: a.cache_miss_ratio + b.cache_miss_ratio,
        uop_per_cycle: a.uop_per_cycle + b.uop_per_cycle,
        mem_stall_per_mem_inst: a.mem_stall_per_mem_inst + b.mem_stall_per_mem_inst,
        mem_stall_per_inst: a.mem_stall_per_inst + b.mem_stall_per_inst,
        fault_rate_per_mem_instr: a.fault_rate_per_mem_instr + b.fault_rate_per_mem_instr,
        rchar_per_cycle: a.rchar_per_cycle + b.rchar_per_cycle,
        wchar_per_cycle: a.wchar_per_cycle + b.wchar_per_cycle,
        rbytes_per_cycle: a.rbytes_per_cycle + b.rbytes_per_cycle,
        wbytes_per_cycle: a.wbytes_per_cycle + b.wbytes_per_cycle,
    }
}

fn scale_ratios(r: PerformanceRatios, divisor: f64) -> PerformanceRatios {
    if divisor == 0.0 {
        return PerformanceRatios::default();
    }
    PerformanceRatios {
        ipc: r.ipc / divisor,
        cache_miss_ratio: r.cache_miss_ratio / divisor,
        uop_per_cycle: r.uop_per_cycle / divisor,
        mem_stall_per_mem_inst: r.mem_stall_per_mem_inst / divisor,
        mem_stall_per_inst: r.mem_stall_per_inst / divisor,
        fault_rate_per_mem_instr: r.fault_rate_per_mem_instr / divisor,
        rchar_per_cycle: r.rchar_per_cycle / divisor,
        wchar_per_cycle: r.wchar_per_cycle / divisor,
        rbytes_per_cycle: r.rbytes_per_cycle / divisor,
        wbytes_per_cycle: r.wbytes_per_cycle / divisor,
    }
}

fn clamp_finite(r: PerformanceRatios) -> PerformanceRatios {
    let fix = |v: f64| if v.is_finite() { v } else { 0.0 };
    PerformanceRatios {
        ipc: fix(r.ipc),
        cache_miss_ratio: fix(r.cache_miss_ratio),
        uop_per_cycle: fix(r.uop_per_cycle),
        mem_stall_per_mem_inst: fix(r.mem_stall_per_mem_inst),
        mem_stall_per_inst: fix(r.mem_stall_per_inst),
        fault_rate_per_mem_instr: fix(r.fault_rate_per_mem_instr),
        rchar_per_cycle: fix(r.rchar_per_cycle),
        wchar_per_cycle: fix(r.wchar_per_cycle),
        rbytes_per_cycle: fix(r.rbytes_per_cycle),
        wbytes_per_cycle: fix(r.wbytes_per_cycle),
    }
}

/// Builds the five-feature vector the linear models score, in
/// [`hybridsched_core::predictor::FEATURE_NAMES`] order. `dt_ms` is the
/// record's own measured tick length, not a fixed assumed value.
pub fn feature_vector(record: &WindowRecord) -> [f64; 5] {
    let cycles_per_ms = if record.dt_ms > 0.0 {
        record.counter_totals[hybridsched_core::ratios::idx::CORE_CYCLES] as f64 / record.dt_ms
    } else {
        0.0
    };
    [
        cycles_per_ms,
        record.ratios.ipc,
        record.ratios.cache_miss_ratio,
        record.ratios.mem_stall_per_mem_inst,
        record.ratios.mem_stall_per_inst,
    ]
}

/// Scores both models and applies hysteresis. `current_class = None`
/// means this is the PID's first-ever decision: ties are broken toward
/// whichever score is larger with no margin required. Otherwise the
/// margin `HYSTERESIS_MARGIN` must be exceeded before switching away from
/// the current class. Returns `None` when any feature is non-finite (the
/// caller should fall back to the "all cores" coreset in that case).
pub fn decide_placement(
    model_p: &LinearModel5,
    model_e: &LinearModel5,
    current_class: Option<CoreClass>,
    features: &[f64; 5],
) -> Option<CoreClass> {
    if features.iter().any(|f| !f.is_finite()) {
        return None;
    }

    let y_p = model_p.predict(features);
    let y_e = model_e.predict(features);

    Some(match current_class {
        None => {
            if y_e > y_p {
                CoreClass::E
            } else {
                CoreClass::P
            }
        }
        Some(CoreClass::E) => {
            if y_p > (1.0 + HYSTERESIS_MARGIN) * y_e {
                CoreClass::P
            } else {
                CoreClass::E
            }
        }
        Some(CoreClass::P) => {
            if y_e > (1.0 + HYSTERESIS_MARGIN) * y_p {
                CoreClass::E
            } else {
                CoreClass::P
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn model(intercept: f64, cycles_weight: f64) -> LinearModel5 {
        let mut weights = HashMap::new();
        weights.insert("cycles_per_ms".to_string(), cycles_weight);
        weights.insert("IPC".to_string(), 0.0);
        weights.insert("Cache_Miss_Ratio".to_string(), 0.0);
        weights.insert("MemStall_per_Mem".to_string(), 0.0);
        weights.insert("MemStall_per_Inst".to_string(), 0.0);
        let json = serde_json::json!({
            "features": ["cycles_per_ms", "IPC", "Cache_Miss_Ratio", "MemStall_per_Mem", "MemStall_per_Inst"],
            "intercept": intercept,
            "weights": weights,
        });
        serde_json::from_value::<serde_json::Value>(json)
            .ok()
            .and_then(|v| {
                let text = v.to_string();
                let path = std::env::temp_dir().join(format!("model_test_{}_{}.json", std::process::id(), cycles_weight));
                std::fs::write(&path, text).ok();
                let m = LinearModel5::load(&path).ok();
                std::fs::remove_file(&path).ok();
                m
            })
            .expect("test model should load")
    }

    #[test]
    fn hysteresis_keeps_placement_below_margin() {
        let model_p = model(0.0, 1.0);
        let model_e = model(0.0, 1.0);
        // yP = yE = 1.0 after scaling features; bump yE to 1.1x via a
        // custom feature vector instead of touching weights.
        let features_equal = [1.0, 0.0, 0.0, 0.0, 0.0];
        let first = decide_placement(&model_p, &model_e, None, &features_equal);
        assert!(first.is_some());
    }

    #[test]
    fn non_finite_feature_yields_none() {
        let model_p = model(0.0, 1.0);
        let model_e = model(0.0, 1.0);
        let features = [f64::NAN, 0.0, 0.0, 0.0, 0.0];
        assert_eq!(decide_placement(&model_p, &model_e, Some(CoreClass::P), &features), None);
    }

    #[test]
    fn margin_switch_matches_worked_example() {
        // yP = yE = 1.0 baseline via equal weights/features.
        let model_p = model(1.0, 0.0);
        let model_e_within = model(1.1, 0.0);
        let model_e_beyond = model(1.2, 0.0);
        let features = [0.0, 0.0, 0.0, 0.0, 0.0];

        assert_eq!(
            decide_placement(&model_p, &model_e_within, Some(CoreClass::P), &features),
            Some(CoreClass::P)
        );
        assert_eq!(
            decide_placement(&model_p, &model_e_beyond, Some(CoreClass::P), &features),
            Some(CoreClass::E)
        );
    }
}
