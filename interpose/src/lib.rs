//! The `LD_PRELOAD`-loaded interposer: on load it discovers core topology
//! and spawns a background sampling thread; its `#[no_mangle]` overrides
//! (in [`hooks`]) catch every new application thread and register it with
//! the shared [`hybridsched_core::registry::ThreadRegistry`].

mod hooks;
mod state;
mod symbols;

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use ctor::{ctor, dtor};
use hybridsched_core::config::MonitorConfig;
use hybridsched_core::window::WindowSampler;

static SHUTTING_DOWN: AtomicBool = AtomicBool::new(false);

#[ctor]
fn init_monitor() {
    if env_logger::try_init().is_err() {
        // A host process may already have initialized a logger; that's
        // fine, just don't clobber it.
    }

    let config = MonitorConfig::from_env();
    let tick = config.tick;
    state::init(config.clone());

    let pid = std::process::id() as libc::pid_t;

    thread::Builder::new()
        .name("hybridsched-monitor".to_string())
        .spawn(move || {
            state::set_bypassed(true);
            run_sampling_loop(pid, config, tick);
        })
        .expect("failed to spawn the monitor sampling thread");
}

fn run_sampling_loop(pid: libc::pid_t, config: MonitorConfig, tick: Duration) {
    let Some(monitor_state) = state::get() else {
        log::error!(target: "monitor", "monitor state missing at sampling-loop start, exiting thread");
        return;
    };

    let mut sampler = WindowSampler::new(
        pid,
        monitor_state.registry.clone(),
        clone_topology_handle(),
        config.clone(),
    );

    let training_writer = config.dataset_csv.as_ref().and_then(|path| {
        hybridsched_core::training::TrainingWriter::open(
            path,
            config.run_id.as_deref(),
            config.workload_name.as_deref(),
            config.force.map(|f| format!("{f:?}")).as_deref(),
        )
        .map_err(|e| log::warn!(target: "monitor", "failed to open training CSV {}: {e}", path.display()))
        .ok()
    });
    let mut training_writer = training_writer;

    let mut window_idx = 0u64;
    while !SHUTTING_DOWN.load(Ordering::Relaxed) {
        let record = sampler.tick();
        if sampler.should_log_training_row() {
            if let Some(writer) = training_writer.as_mut() {
                if let Err(e) = writer.append(window_idx, &record) {
                    log::warn!(target: "monitor", "failed to append training row: {e}");
                }
            }
        }
        window_idx += 1;
        thread::sleep(tick);
    }
}

/// Rebuilds a topology handle for the sampler thread's own
/// `CoreTopology`, since the cached global one lives behind a shared
/// reference the sampler needs to own. Re-running discovery here is
/// cheap (a handful of sysfs reads) and keeps `WindowSampler` free of a
/// lifetime parameter.
fn clone_topology_handle() -> hybridsched_core::topology::CoreTopology {
    let monitor_state = state::get().expect("monitor state must be initialized before this runs");
    let admin_coreset = hybridsched_core::coreset::Coreset::from_cpus(
        monitor_state
            .topology
            .p_set()
            .cpus()
            .iter()
            .chain(monitor_state.topology.e_set().cpus().iter())
            .copied()
            .collect(),
    );
    hybridsched_core::topology::CoreTopology::discover(&admin_coreset)
}

#[dtor]
fn finish_monitor() {
    SHUTTING_DOWN.store(true, Ordering::Relaxed);
}
