//! The periodic sampling loop: walks the registry, detects migrations,
//! reads per-thread counter and I/O deltas, aggregates them into a
//! per-window summary, and hands a record to [`crate::proto`].

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use crate::affinity;
use crate::config::{ForcedClass, MonitorConfig, MonitorMode, NUM_EVENTS};
use crate::coreset::Coreset;
use crate::io_sampler::{self, IoSnapshot};
use crate::perf::PerfSession;
use crate::procstat;
use crate::proto::{self, ClassifierProbs, WireRecord};
use crate::ratios::PerformanceRatios;
use crate::registry::ThreadRegistry;
use crate::topology::{CoreClass, CoreTopology};

/// One completed window's summary, ready to hand to [`crate::proto`] or a
/// training CSV. Carries both whole-process and P/E-only variants.
#[derive(Debug, Clone)]
pub struct WindowRecord {
    pub thread_count: i32,
    pub hw_thread_count: i32,
    pub pthread_count: i32,
    pub pcore_count: i32,
    pub ecore_count: i32,
    pub total_cores: i32,
    pub counter_totals: [i64; NUM_EVENTS],
    pub io_delta: IoSnapshot,
    pub ratios: PerformanceRatios,
    pub p_counter_totals: [i64; NUM_EVENTS],
    pub p_io_delta: IoSnapshot,
    pub p_ratios: PerformanceRatios,
    pub e_counter_totals: [i64; NUM_EVENTS],
    pub e_io_delta: IoSnapshot,
    pub e_ratios: PerformanceRatios,
    pub exec_time_ms: f64,
    pub dt_ms: f64,
}

impl WindowRecord {
    pub fn to_wire(&self) -> WireRecord {
        let mut wire = WireRecord::default();
        wire.thread_count = self.thread_count;
        wire.hw_thread_count = self.hw_thread_count;
        wire.pthread_count = self.pthread_count;
        wire.pcore_count = self.pcore_count;
        wire.ecore_count = self.ecore_count;
        wire.total_cores = self.total_cores;
        wire.counter_totals = self.counter_totals;
        wire.io_delta = [
            self.io_delta.rchar,
            self.io_delta.wchar,
            self.io_delta.syscr,
            self.io_delta.syscw,
            self.io_delta.read_bytes,
            self.io_delta.write_bytes,
        ];
        wire.set_ratios(&self.ratios);
        wire.exec_time_ms = self.exec_time_ms;
        wire.dt_ms = self.dt_ms;
        wire.classifier = ClassifierProbs::default();
        wire
    }
}

/// Drives one tick of sampling. Owned by the dedicated monitor thread
/// spawned with the interposer's bypass flag set, so the sampler itself
/// is never interposed.
pub struct WindowSampler {
    pid: libc::pid_t,
    registry: std::sync::Arc<ThreadRegistry>,
    topology: CoreTopology,
    socket_path: PathBuf,
    config: MonitorConfig,
    start: Instant,
    last_tick: Instant,
    prev_process_io: Option<IoSnapshot>,
    window_idx: u64,
    first_sample_sent: bool,
}

impl WindowSampler {
    pub fn new(
        pid: libc::pid_t,
        registry: std::sync::Arc<ThreadRegistry>,
        topology: CoreTopology,
        config: MonitorConfig,
    ) -> Self {
        let socket_path = config.socket_path.clone();
        let now = Instant::now();
        WindowSampler {
            pid,
            registry,
            topology,
            socket_path,
            config,
            start: now,
            last_tick: now,
            prev_process_io: None,
            window_idx: 0,
            first_sample_sent: false,
        }
    }

    /// Runs one tick: the per-thread scan, aggregation, ratio
    /// computation, and emission to the scheduler. Returns the record
    /// that was sent, for callers (tests, the training CSV writer) that
    /// want to inspect it. In [`MonitorMode::Main`], only the thread
    /// whose tid equals the monitored pid is scanned. When training with
    /// a forced class, the whole process is pinned to that class's
    /// coreset before the scan runs.
    pub fn tick(&mut self) -> WindowRecord {
        let now = Instant::now();
        let dt_ms = now.duration_since(self.last_tick).as_secs_f64() * 1000.0;
        self.last_tick = now;

        self.apply_training_override();

        let mut total = [0i64; NUM_EVENTS];
        let mut p_total = [0i64; NUM_EVENTS];
        let mut e_total = [0i64; NUM_EVENTS];
        let mut p_io = IoSnapshot::default();
        let mut e_io = IoSnapshot::default();
        let mut p_cores_used: HashSet<u32> = HashSet::new();
        let mut e_cores_used: HashSet<u32> = HashSet::new();
        let mut thread_count = 0i32;
        let mut pthread_count = 0i32;

        let mut to_deactivate = Vec::new();
        let mut scratch = [0i64; NUM_EVENTS];

        let main_only = self.config.mode == MonitorMode::Main;

        self.registry.for_each_active(|entry| {
            if main_only && entry.thread_id != self.pid {
                return;
            }
            thread_count += 1;

            let Some(cpu) = procstat::current_cpu(self.pid, entry.thread_id) else {
                to_deactivate.push(entry.thread_id);
                return;
            };
            let Some(class) = self.topology.classify(cpu) else {
                to_deactivate.push(entry.thread_id);
                return;
            };

            let migrated = entry
                .session
                .as_ref()
                .map(|s| s.class() != class)
                .unwrap_or(true);

            if migrated {
                if let Some(mut old) = entry.session.take() {
                    old.close();
                }
                match PerfSession::open(entry.thread_id, class) {
                    Ok(session) => {
                        let _ = session.start();
                        entry.session = Some(session);
                    }
                    Err(e) => {
                        log::debug!(target: "monitor", "failed to reopen perf session for tid {}: {e}", entry.thread_id);
                    }
                }
                entry.prev_io = None;
                // Baseline-only tick: no contribution from this thread.
                if class == CoreClass::P {
                    pthread_count += 1;
                    p_cores_used.insert(cpu);
                } else {
                    e_cores_used.insert(cpu);
                }
                return;
            }

            if let Some(session) = entry.session.as_mut() {
                session.read_deltas(&mut scratch);
                for i in 0..NUM_EVENTS {
                    total[i] += scratch[i];
                }
                match class {
                    CoreClass::P => {
                        for i in 0..NUM_EVENTS {
                            p_total[i] += scratch[i];
                        }
                    }
                    CoreClass::E => {
                        for i in 0..NUM_EVENTS {
                            e_total[i] += scratch[i];
                        }
                    }
                }
            }

            let io_now = io_sampler::thread_io(self.pid, entry.thread_id);
            match (io_now, entry.prev_io) {
                (Some(now_snap), Some(prev_snap)) => {
                    let delta = now_snap.delta_since(&prev_snap);
                    match class {
                        CoreClass::P => p_io = add_io(p_io, delta),
                        CoreClass::E => e_io = add_io(e_io, delta),
                    }
                    entry.prev_io = Some(now_snap);
                }
                (Some(now_snap), None) => {
                    entry.prev_io = Some(now_snap);
                }
                (None, _) => {
                    entry.prev_io = None;
                }
            }

            match class {
                CoreClass::P => {
                    pthread_count += 1;
                    p_cores_used.insert(cpu);
                }
                CoreClass::E => {
                    e_cores_used.insert(cpu);
                }
            }
        });

        for tid in to_deactivate {
            if let Some(idx) = self.registry.find(tid) {
                self.registry.deactivate(idx);
            }
        }

        let process_io_now = io_sampler::process_io(self.pid);
        let process_io_delta = match (process_io_now, self.prev_process_io) {
            (Some(now_snap), Some(prev_snap)) => now_snap.delta_since(&prev_snap),
            (Some(_), None) | (None, _) => IoSnapshot::zero_delta(),
        };
        self.prev_process_io = process_io_now;

        let ratios = PerformanceRatios::compute(&total, &process_io_delta);
        let p_ratios = PerformanceRatios::compute(&p_total, &p_io);
        let e_ratios = PerformanceRatios::compute(&e_total, &e_io);

        let record = WindowRecord {
            thread_count,
            hw_thread_count: num_cpus_online(),
            pthread_count,
            pcore_count: p_cores_used.len() as i32,
            ecore_count: e_cores_used.len() as i32,
            total_cores: (p_cores_used.len() + e_cores_used.len()) as i32,
            counter_totals: total,
            io_delta: process_io_delta,
            ratios,
            p_counter_totals: p_total,
            p_io_delta: p_io,
            p_ratios,
            e_counter_totals: e_total,
            e_io_delta: e_io,
            e_ratios,
            exec_time_ms: self.start.elapsed().as_secs_f64() * 1000.0,
            dt_ms,
        };

        let startup_flag = i32::from(!self.first_sample_sent);
        self.first_sample_sent = true;
        proto::send(&self.socket_path, self.pid, startup_flag, &record.to_wire());

        self.window_idx += 1;

        record
    }

    /// Whether `record` (the result of the most recent [`Self::tick`])
    /// should be appended to the training CSV: training mode is on and
    /// the configured warmup window count has elapsed. The sampler
    /// itself doesn't own the CSV writer (see [`crate::training`]); it
    /// only knows the gating rule.
    pub fn should_log_training_row(&self) -> bool {
        self.config.training_mode && self.window_idx > self.config.warmup_windows as u64
    }

    /// When training with a forced class, pins the whole process (and
    /// every one of its current threads) to that class's coreset on
    /// every tick, so the collected rows are actually labeled with the
    /// class the threads ran on rather than wherever the kernel happened
    /// to leave them.
    fn apply_training_override(&self) {
        if !self.config.training_mode {
            return;
        }
        let Some(forced) = self.config.force else {
            return;
        };
        let coreset = match forced {
            ForcedClass::P => self.topology.p_set(),
            ForcedClass::E => self.topology.e_set(),
        };
        affinity::apply_to_process_and_tasks(self.pid, coreset);
    }

    pub fn admin_coreset(&self) -> (&Coreset, &Coreset) {
        (self.topology.p_set(), self.topology.e_set())
    }
}

fn add_io(a: IoSnapshot, b: IoSnapshot) -> IoSnapshot {
    IoSnapshot {
        rchar: a.rchar + b.rchar,
        wchar: a.wchar + b.wchar,
        syscr: a.syscr + b.syscr,
        syscw: a.syscw + b.syscw,
        read_bytes: a.read_bytes + b.read_bytes,
        write_bytes: a.write_bytes + b.write_bytes,
    }
}

fn num_cpus_online() -> i32 {
    // SAFETY: sysconf with a well-known, non-pointer-taking name is safe.
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    n.max(0) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_detection_flags_class_change() {
        // PerfSession::open requires a live perf_event_open syscall, which
        // is exercised in integration rather than unit tests; here we
        // only check the pure classification/migration predicate logic
        // indirectly through CoreTopology, since WindowSampler::tick
        // needs a live registry + process to run meaningfully.
        let coreset = Coreset::parse_bounded("0-15").unwrap();
        let topo = CoreTopology::discover(&coreset);
        // Every classified cpu must land in exactly one of p_set/e_set.
        for cpu in coreset.cpus() {
            let class = topo.classify(*cpu);
            assert!(class.is_some());
        }
    }

    #[test]
    fn training_override_pins_process_to_forced_classes_coreset() {
        let coreset = Coreset::parse_bounded("0-15").unwrap();
        let topo = CoreTopology::discover(&coreset);
        let p_cpus: std::collections::HashSet<u32> = topo.p_set().cpus().iter().copied().collect();

        let mut config = MonitorConfig::default();
        config.training_mode = true;
        config.force = Some(ForcedClass::P);

        let pid = std::process::id() as libc::pid_t;
        let registry = std::sync::Arc::new(ThreadRegistry::new());
        let sampler = WindowSampler::new(pid, registry, topo, config);
        sampler.apply_training_override();

        let observed = affinity::verify(pid);
        let (_, own) = observed
            .into_iter()
            .find(|(tid, _)| *tid == pid)
            .expect("own pid must appear in the observed affinity list");
        let own = own.expect("sched_getaffinity must succeed for the calling process");
        assert!(own.cpus().iter().all(|c| p_cpus.contains(c)));
    }

    #[test]
    fn training_override_is_a_no_op_without_force() {
        let coreset = Coreset::parse_bounded("0-15").unwrap();
        let topo = CoreTopology::discover(&coreset);
        let config = MonitorConfig::default();
        assert!(!config.training_mode);
        assert!(config.force.is_none());

        let pid = std::process::id() as libc::pid_t;
        let registry = std::sync::Arc::new(ThreadRegistry::new());
        let sampler = WindowSampler::new(pid, registry, topo, config);
        let before = affinity::verify(pid);
        sampler.apply_training_override();
        let after = affinity::verify(pid);
        assert_eq!(before, after);
    }
}
