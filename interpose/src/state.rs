//! The interposer's process-wide state: one registry, one topology, one
//! config, set up by the constructor hook and read by every override.

use std::sync::Arc;

use hybridsched_core::config::MonitorConfig;
use hybridsched_core::coreset::Coreset;
use hybridsched_core::registry::ThreadRegistry;
use hybridsched_core::topology::CoreTopology;
use once_cell::sync::OnceCell;

pub struct MonitorState {
    pub registry: Arc<ThreadRegistry>,
    pub topology: CoreTopology,
    pub config: MonitorConfig,
}

static STATE: OnceCell<MonitorState> = OnceCell::new();

/// Per-thread flag: set for the duration of the monitor's own sampling
/// thread and while inside a hook's own bookkeeping, so a call to
/// `pthread_create`/`clone` made by this crate's own code is never
/// mistaken for a monitored application thread.
thread_local! {
    pub static BYPASS: std::cell::Cell<bool> = std::cell::Cell::new(false);
}

pub fn is_bypassed() -> bool {
    BYPASS.with(|b| b.get())
}

pub fn set_bypassed(value: bool) {
    BYPASS.with(|b| b.set(value));
}

pub fn init(config: MonitorConfig) {
    let admin_coreset =
        Coreset::parse_bounded(&config.admin_coreset).unwrap_or_else(|e| {
            log::warn!(target: "monitor", "bad admin coreset {:?} ({e}), using default", config.admin_coreset);
            Coreset::parse_bounded("0-15").expect("default admin coreset is always well-formed")
        });
    let topology = CoreTopology::discover(&admin_coreset);
    let state = MonitorState {
        registry: Arc::new(ThreadRegistry::new()),
        topology,
        config,
    };
    if STATE.set(state).is_err() {
        log::warn!(target: "monitor", "monitor state initialized twice, ignoring second call");
    }
}

pub fn get() -> Option<&'static MonitorState> {
    STATE.get()
}
