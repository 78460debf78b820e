//! The scheduler daemon binary: pins itself to the admin coreset given
//! on the command line, loads both placement models, binds the control
//! socket, then loops draining connections until a shutdown sentinel
//! arrives.

use std::path::PathBuf;
use std::thread;

use clap::Parser;
use hybridsched_core::affinity;
use hybridsched_core::config::{DaemonConfig, PlacementMode};
use hybridsched_core::coreset::Coreset;
use hybridsched_schedulerd::daemon::SchedulerDaemon;

/// Hybrid P-core/E-core thread scheduler daemon.
#[derive(Parser, Debug)]
#[command(name = "schedulerd")]
struct Args {
    /// Coreset this daemon itself is pinned to, e.g. "0-15".
    coreset: String,

    /// Unix-domain socket path monitors connect to.
    #[arg(long)]
    socket_path: Option<PathBuf>,

    /// Directory containing model_P.json/model_E.json.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// "linear" (per-PID model scoring) or "category" (compute/io/memory
    /// proportional allocation).
    #[arg(long)]
    placement_mode: Option<String>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let admin_coreset = match Coreset::parse_bounded(&args.coreset) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("invalid coreset {:?}: {e}", args.coreset);
            std::process::exit(1);
        }
    };

    affinity::apply_to_process_and_tasks(std::process::id() as libc::pid_t, &admin_coreset);
    log::info!(target: "scheduler", "scheduler bound to coreset {}", admin_coreset);

    let mut config = DaemonConfig::from_env();
    if let Some(path) = args.socket_path {
        config.socket_path = path;
    }
    if let Some(dir) = args.model_dir {
        config.model_dir = dir;
    }
    if let Some(mode) = args.placement_mode {
        match mode.parse::<PlacementMode>() {
            Ok(parsed) => config.placement_mode = parsed,
            Err(_) => {
                eprintln!("invalid --placement-mode {mode:?}, expected \"linear\" or \"category\"");
                std::process::exit(1);
            }
        }
    }

    let mut daemon = match SchedulerDaemon::new(config.clone(), &admin_coreset) {
        Ok(d) => d,
        Err(e) => {
            log::error!(target: "scheduler", "failed to start: {e}");
            std::process::exit(1);
        }
    };

    let listener = match daemon.bind() {
        Ok(l) => l,
        Err(e) => {
            log::error!(target: "scheduler", "failed to bind control socket: {e}");
            std::process::exit(1);
        }
    };

    log::info!(target: "scheduler", "listening on {}", config.socket_path.display());

    loop {
        if daemon.drain_once(&listener) {
            log::info!(target: "scheduler", "shutdown requested, exiting");
            break;
        }
        thread::sleep(config.tick);
    }
}
