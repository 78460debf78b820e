//! Applies a coreset to a process and every one of its threads, and
//! verifies the result by re-reading the affinity back via
//! `sched_getaffinity(2)` rather than shelling out to `ps`.

use std::fs;

use nix::sched::{sched_getaffinity, sched_setaffinity, CpuSet};
use nix::unistd::Pid;

use crate::coreset::Coreset;

#[derive(Debug, thiserror::Error)]
pub enum AffinityError {
    #[error("failed to set affinity for pid {pid}: {source}")]
    SetAffinity { pid: i32, source: nix::Error },
}

fn to_cpu_set(coreset: &Coreset) -> CpuSet {
    let mut set = CpuSet::new();
    for &cpu in coreset.cpus() {
        if (cpu as usize) < CpuSet::count() {
            let _ = set.set(cpu as usize);
        } else {
            log::warn!(target: "scheduler", "cpu {cpu} is out of range for this host's CpuSet, skipping");
        }
    }
    set
}

/// Applies `coreset` to `pid` and every task currently listed under
/// `/proc/<pid>/task`. Errors for individual tasks are logged, not
/// propagated: a thread that exited between listing and `sched_setaffinity`
/// is expected, not exceptional.
pub fn apply_to_process_and_tasks(pid: libc::pid_t, coreset: &Coreset) {
    let cpu_set = to_cpu_set(coreset);

    if let Err(e) = sched_setaffinity(Pid::from_raw(pid), &cpu_set) {
        log::warn!(target: "scheduler", "failed to set affinity for pid {pid}: {e}");
    }

    for tid in list_tasks(pid) {
        if let Err(e) = sched_setaffinity(Pid::from_raw(tid), &cpu_set) {
            log::debug!(target: "scheduler", "failed to set affinity for tid {tid} of pid {pid}: {e}");
        }
    }
}

/// Re-reads the affinity actually applied to `pid` and every task, for
/// logging/diagnostics. Never panics on a vanished task.
pub fn verify(pid: libc::pid_t) -> Vec<(libc::pid_t, Option<Coreset>)> {
    let mut result = Vec::new();
    let mut tids = list_tasks(pid);
    tids.push(pid);
    for tid in tids {
        let observed = sched_getaffinity(Pid::from_raw(tid)).ok().map(|set| {
            let cpus: Vec<u32> = (0..CpuSet::count())
                .filter(|&i| set.is_set(i).unwrap_or(false))
                .map(|i| i as u32)
                .collect();
            Coreset::from_cpus(cpus)
        });
        result.push((tid, observed));
    }
    result
}

fn list_tasks(pid: libc::pid_t) -> Vec<libc::pid_t> {
    let dir = format!("/proc/{pid}/task");
    let Ok(entries) = fs::read_dir(&dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str()?.parse::<libc::pid_t>().ok())
        .filter(|&tid| tid != pid)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_and_verifies_own_process() {
        let coreset = Coreset::parse_bounded("0").unwrap();
        apply_to_process_and_tasks(std::process::id() as libc::pid_t, &coreset);
        let observed = verify(std::process::id() as libc::pid_t);
        assert!(!observed.is_empty());
    }
}
