//! Process-wide tunables, read once at startup into an owned [`Config`]
//! rather than consulted ad hoc from the environment on every tick.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use strum_macros::EnumString;

pub const NUM_EVENTS: usize = 7;
pub const MAX_THREADS: usize = 64;
pub const MAX_CPUS: usize = 256;
pub const MAX_CORES: usize = 16;

/// Hysteresis margin applied by the daemon before switching a PID's class.
pub const HYSTERESIS_MARGIN: f64 = 0.15;

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/scheduler_socket";
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);
pub const DEFAULT_SCHEDULER_TICK: Duration = Duration::from_millis(100);

/// The three quirky hardcoded fallback coresets the category pathway falls
/// back to when the proportional allocator can't satisfy a class's minimum.
/// `IO_FALLBACK` is deliberately out of range for [`MAX_CORES`].
pub const COMPUTE_FALLBACK: &str = "0";
pub const IO_FALLBACK: &str = "16";
pub const MEMORY_FALLBACK: &str = "1";

/// `Process` and `Split` both scan every registered thread each tick; the
/// split-by-class counters `WindowRecord` always carries make `Split` a
/// strict superset of `Process`'s whole-process view, so there's nothing
/// left for `Process` to do differently. `Main` is the one mode that
/// actually narrows what gets scanned: only the thread whose tid equals
/// the monitored pid is sampled, every other registered thread is
/// skipped for the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum MonitorMode {
    Process,
    Split,
    Main,
}

impl Default for MonitorMode {
    fn default() -> Self {
        MonitorMode::Process
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum PlacementMode {
    Linear,
    Category,
}

impl Default for PlacementMode {
    fn default() -> Self {
        PlacementMode::Linear
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
pub enum ForcedClass {
    P,
    E,
}

/// Configuration of the monitored process, read from its environment at
/// load time. Mirrors `init_monitor`'s env var parsing.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub mode: MonitorMode,
    pub training_mode: bool,
    pub force: Option<ForcedClass>,
    pub warmup_windows: u32,
    pub run_id: Option<String>,
    pub workload_name: Option<String>,
    pub dataset_csv: Option<PathBuf>,
    pub admin_coreset: String,
    pub socket_path: PathBuf,
    pub tick: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            mode: MonitorMode::default(),
            training_mode: false,
            force: None,
            warmup_windows: 0,
            run_id: None,
            workload_name: None,
            dataset_csv: None,
            admin_coreset: "0-15".to_string(),
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            tick: DEFAULT_TICK,
        }
    }
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        let mut cfg = MonitorConfig::default();

        if let Ok(mode) = env::var("MONITOR_MODE") {
            if let Ok(parsed) = mode.parse() {
                cfg.mode = parsed;
            } else {
                log::warn!(target: "monitor", "unrecognized MONITOR_MODE={mode:?}, keeping default");
            }
        }
        cfg.training_mode = env::var("TRAINING_MODE").as_deref() == Ok("1");
        cfg.force = env::var("MONITOR_FORCE").ok().and_then(|v| match v.as_str() {
            "P" => Some(ForcedClass::P),
            "E" => Some(ForcedClass::E),
            other => {
                log::warn!(target: "monitor", "unrecognized MONITOR_FORCE={other:?}");
                None
            }
        });
        if let Ok(w) = env::var("WARMUP_WINDOWS") {
            cfg.warmup_windows = w.parse().unwrap_or(0);
        }
        cfg.run_id = env::var("RUN_ID").ok();
        cfg.workload_name = env::var("WORKLOAD_NAME").ok();
        cfg.dataset_csv = env::var("DATASET_CSV").ok().map(PathBuf::from);
        if let Ok(path) = env::var("SCHEDULER_SOCKET_PATH") {
            cfg.socket_path = PathBuf::from(path);
        }
        cfg
    }
}

/// Configuration of the scheduler daemon process.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    pub model_dir: PathBuf,
    pub placement_mode: PlacementMode,
    pub tick: Duration,
    pub smoothing_enabled: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            model_dir: PathBuf::from("."),
            placement_mode: PlacementMode::default(),
            tick: DEFAULT_SCHEDULER_TICK,
            smoothing_enabled: true,
        }
    }
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        let mut cfg = DaemonConfig::default();
        if let Ok(path) = env::var("SCHEDULER_SOCKET_PATH") {
            cfg.socket_path = PathBuf::from(path);
        }
        if let Ok(dir) = env::var("MODEL_DIR") {
            cfg.model_dir = PathBuf::from(dir);
        }
        if let Ok(mode) = env::var("PLACEMENT_MODE") {
            if let Ok(parsed) = mode.parse() {
                cfg.placement_mode = parsed;
            } else {
                log::warn!(target: "scheduler", "unrecognized PLACEMENT_MODE={mode:?}, keeping default");
            }
        }
        cfg
    }
}
