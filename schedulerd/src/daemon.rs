//! The scheduler daemon's per-tick orchestration: accepting monitor
//! connections, maintaining a [`crate::queue::QueueEntry`] per live PID,
//! scoring placement, and applying affinity.

use std::collections::HashMap;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;

use nix::sys::signal::kill;
use nix::unistd::Pid;

use hybridsched_core::affinity;
use hybridsched_core::classifier::{self, Category, CategoryClassifier, HeuristicClassifier};
use hybridsched_core::config::{DaemonConfig, PlacementMode};
use hybridsched_core::coreset::Coreset;
use hybridsched_core::predictor::LinearModel5;
use hybridsched_core::proto::{self, Message};
use hybridsched_core::topology::{CoreClass, CoreTopology};

use crate::queue::{self, QueueEntry};

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("failed to bind control socket at {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to load placement model: {0}")]
    Model(#[from] hybridsched_core::predictor::ModelError),
}

/// Whether the PID that just sent a sample is still alive, checked with
/// `kill(pid, 0)` before trusting its sample (a PID can be reused by the
/// OS between the monitor's last send and the daemon's processing of it).
fn pid_is_live(pid: libc::pid_t) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}

pub struct SchedulerDaemon {
    config: DaemonConfig,
    topology: CoreTopology,
    model_p: LinearModel5,
    model_e: LinearModel5,
    classifier: HeuristicClassifier,
    entries: HashMap<libc::pid_t, QueueEntry>,
}

impl SchedulerDaemon {
    /// Loads both placement models before binding the socket: a bad model
    /// file is fatal at startup rather than surfacing later as every
    /// connection failing to score.
    pub fn new(config: DaemonConfig, admin_coreset: &Coreset) -> Result<Self, DaemonError> {
        let model_p = LinearModel5::load(&config.model_dir.join("model_P.json"))?;
        let model_e = LinearModel5::load(&config.model_dir.join("model_E.json"))?;
        let topology = CoreTopology::discover(admin_coreset);
        Ok(SchedulerDaemon {
            config,
            topology,
            model_p,
            model_e,
            classifier: HeuristicClassifier,
            entries: HashMap::new(),
        })
    }

    pub fn bind(&self) -> Result<UnixListener, DaemonError> {
        let path = &self.config.socket_path;
        let _ = std::fs::remove_file(path);
        UnixListener::bind(path).map_err(|source| DaemonError::Bind {
            path: path.clone(),
            source,
        })
    }

    /// Drains every pending connection on `listener` without blocking,
    /// processing each message as it arrives. A shutdown sentinel on any
    /// connection ends the drain immediately, even if other connections
    /// are still queued.
    ///
    /// Returns `true` if a shutdown was requested.
    pub fn drain_once(&mut self, listener: &UnixListener) -> bool {
        listener.set_nonblocking(true).ok();
        loop {
            match listener.accept() {
                Ok((mut stream, _)) => {
                    if self.handle_connection(&mut stream) {
                        return true;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::warn!(target: "scheduler", "accept failed: {e}");
                    break;
                }
            }
        }
        false
    }

    /// Handles one accepted connection to completion. Returns `true` if
    /// it carried a shutdown request.
    fn handle_connection(&mut self, stream: &mut UnixStream) -> bool {
        match proto::recv(stream) {
            Some(Message::Shutdown) => true,
            Some(Message::Sample { pid, startup_flag, record }) => {
                self.process_sample(pid, startup_flag != 0, &record);
                false
            }
            None => false,
        }
    }

    fn process_sample(&mut self, pid: libc::pid_t, startup_flag: bool, record: &hybridsched_core::proto::WireRecord) {
        if !pid_is_live(pid) {
            self.entries.remove(&pid);
            return;
        }

        let window = hybridsched_core::window::WindowRecord {
            thread_count: record.thread_count,
            hw_thread_count: record.hw_thread_count,
            pthread_count: record.pthread_count,
            pcore_count: record.pcore_count,
            ecore_count: record.ecore_count,
            total_cores: record.total_cores,
            counter_totals: record.counter_totals,
            io_delta: record.io_as_snapshot(),
            ratios: record.ratios_as_struct(),
            p_counter_totals: record.counter_totals,
            p_io_delta: record.io_as_snapshot(),
            p_ratios: record.ratios_as_struct(),
            e_counter_totals: record.counter_totals,
            e_io_delta: record.io_as_snapshot(),
            e_ratios: record.ratios_as_struct(),
            exec_time_ms: record.exec_time_ms,
            dt_ms: record.dt_ms,
        };

        let entry = self
            .entries
            .entry(pid)
            .or_insert_with(|| QueueEntry::new(pid, window.clone(), startup_flag));
        entry.push_sample(window, startup_flag);

        if self.config.smoothing_enabled {
            entry.smooth();
        }

        // A freshly-started thread gets the full admin coreset with no
        // model evaluation: there isn't enough history yet to trust a
        // placement decision, matching `process_queue`'s startup-flag
        // short-circuit.
        if startup_flag {
            let all: Vec<u32> = self
                .topology
                .p_set()
                .cpus()
                .iter()
                .chain(self.topology.e_set().cpus().iter())
                .copied()
                .collect();
            let coreset = Coreset::from_cpus(all);
            affinity::apply_to_process_and_tasks(pid, &coreset);
            return;
        }

        let features = queue::feature_vector(&entry.latest);
        let current_class = entry.current_class;
        let decided = queue::decide_placement(&self.model_p, &self.model_e, current_class, &features);

        let coreset = match decided {
            Some(class) => {
                entry.current_class = Some(class);
                match class {
                    CoreClass::P => self.topology.p_set().clone(),
                    CoreClass::E => self.topology.e_set().clone(),
                }
            }
            None => {
                // Non-finite features: fall back to every core rather
                // than guessing.
                let all: Vec<u32> = self
                    .topology
                    .p_set()
                    .cpus()
                    .iter()
                    .chain(self.topology.e_set().cpus().iter())
                    .copied()
                    .collect();
                Coreset::from_cpus(all)
            }
        };

        // Affinity is (re)applied every tick regardless of whether the
        // class changed: a thread could have been moved by something
        // else between ticks, so re-asserting it is cheap insurance.
        affinity::apply_to_process_and_tasks(pid, &coreset);

        if self.config.placement_mode == PlacementMode::Category {
            self.apply_category_pathway();
        }
    }

    /// Recomputes the three category coresets from every tracked PID's
    /// most recent classification and applies them. Runs every tick the
    /// category pathway is enabled, independent of the linear-model
    /// pathway above.
    fn apply_category_pathway(&self) {
        let mut counts: HashMap<Category, u32> = HashMap::new();
        let mut by_pid: HashMap<libc::pid_t, Category> = HashMap::new();
        for (&pid, entry) in self.entries.iter() {
            let category = self.classifier.classify(&entry.latest.ratios);
            *counts.entry(category).or_insert(0) += 1;
            by_pid.insert(pid, category);
        }

        let (compute, io, memory) = classifier::compute_dynamic_coresets(&self.topology, &counts);
        for (&pid, category) in by_pid.iter() {
            let coreset = match category {
                Category::Compute => &compute,
                Category::Io => &io,
                Category::Memory => &memory,
            };
            affinity::apply_to_process_and_tasks(pid, coreset);
        }
    }

    pub fn tracked_pid_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_returns_false_on_empty_listener() {
        let dir = std::env::temp_dir().join(format!("daemon_test_{}.sock", std::process::id()));
        std::fs::remove_file(&dir).ok();
        let listener = UnixListener::bind(&dir).unwrap();

        let coreset = Coreset::parse_bounded("0-1").unwrap();
        let model_dir = std::env::temp_dir().join(format!("daemon_models_{}", std::process::id()));
        std::fs::create_dir_all(&model_dir).unwrap();
        let model_json = serde_json::json!({
            "features": hybridsched_core::predictor::FEATURE_NAMES,
            "intercept": 0.0,
            "weights": {
                "cycles_per_ms": 0.0, "IPC": 0.0, "Cache_Miss_Ratio": 0.0,
                "MemStall_per_Mem": 0.0, "MemStall_per_Inst": 0.0,
            },
        });
        std::fs::write(model_dir.join("model_P.json"), model_json.to_string()).unwrap();
        std::fs::write(model_dir.join("model_E.json"), model_json.to_string()).unwrap();

        let mut config = DaemonConfig::default();
        config.model_dir = model_dir.clone();
        let mut daemon = SchedulerDaemon::new(config, &coreset).unwrap();
        assert!(!daemon.drain_once(&listener));
        assert_eq!(daemon.tracked_pid_count(), 0);

        std::fs::remove_file(&dir).ok();
        std::fs::remove_dir_all(&model_dir).ok();
    }
}
