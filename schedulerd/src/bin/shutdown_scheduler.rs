//! Tiny CLI helper that sends the scheduler daemon its shutdown sentinel:
//! connect, write `pid_t = -1`, done.

use std::path::PathBuf;

use clap::Parser;
use hybridsched_core::proto;

#[derive(Parser, Debug)]
#[command(name = "shutdown-scheduler")]
struct Args {
    /// Unix-domain socket path the running scheduler is listening on.
    #[arg(long, default_value = "/tmp/scheduler_socket")]
    socket_path: PathBuf,
}

fn main() {
    let args = Args::parse();
    match proto::send_shutdown(&args.socket_path) {
        Ok(()) => println!("shutdown message sent to scheduler"),
        Err(e) => {
            eprintln!("failed to send shutdown message: {e}");
            std::process::exit(1);
        }
    }
}
