//! The wire protocol spoken over the unix-domain control socket.
//!
//! Framing is three sequential chunks, native byte order, no length
//! prefix beyond the payload's own fixed size: `pid_t` (4 bytes),
//! `startup_flag: i32` (4 bytes), then a fixed-size [`WireRecord`]. Both
//! ends agree on `size_of::<WireRecord>()` statically; a layout change
//! bumps [`WIRE_VERSION`] rather than being length-prefixed at runtime.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;

use crate::config::NUM_EVENTS;
use crate::io_sampler::IoSnapshot;
use crate::ratios::PerformanceRatios;

pub const WIRE_VERSION: u32 = 1;

/// Sentinel pid value that requests daemon shutdown.
pub const SHUTDOWN_PID: libc::pid_t = -1;

/// The twelve classifier-probability fields the wire struct carries.
/// Only the single-pass heuristic classifier is ever populated by this
/// implementation; the other three triples (two-step, ONNX, ONNX
/// two-step) stay zero, the same as a peer that never initialized those
/// classifiers.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClassifierProbs {
    pub compute_cjson: f64,
    pub io_cjson: f64,
    pub memory_cjson: f64,
    pub compute_cjson_2step: f64,
    pub io_cjson_2step: f64,
    pub memory_cjson_2step: f64,
    pub compute_onnx: f64,
    pub io_onnx: f64,
    pub memory_onnx: f64,
    pub compute_onnx_2step: f64,
    pub io_onnx_2step: f64,
    pub memory_onnx_2step: f64,
}

/// The fixed-size, packed payload sent after `pid` and `startup_flag`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WireRecord {
    pub thread_count: i32,
    pub hw_thread_count: i32,
    pub pthread_count: i32,
    pub pcore_count: i32,
    pub ecore_count: i32,
    pub total_cores: i32,
    pub counter_totals: [i64; NUM_EVENTS],
    pub io_delta: [u64; 6],
    pub ratios: [f64; 10],
    pub exec_time_ms: f64,
    pub dt_ms: f64,
    pub classifier: ClassifierProbs,
}

impl Default for WireRecord {
    fn default() -> Self {
        // SAFETY: every field of WireRecord (and ClassifierProbs) is a
        // plain integer or float; the all-zero bit pattern is a valid
        // value for each of them.
        unsafe { std::mem::zeroed() }
    }
}

impl WireRecord {
    pub fn io_as_snapshot(&self) -> IoSnapshot {
        IoSnapshot {
            rchar: self.io_delta[0],
            wchar: self.io_delta[1],
            syscr: self.io_delta[2],
            syscw: self.io_delta[3],
            read_bytes: self.io_delta[4],
            write_bytes: self.io_delta[5],
        }
    }

    pub fn ratios_as_struct(&self) -> PerformanceRatios {
        PerformanceRatios {
            ipc: self.ratios[0],
            cache_miss_ratio: self.ratios[1],
            uop_per_cycle: self.ratios[2],
            mem_stall_per_mem_inst: self.ratios[3],
            mem_stall_per_inst: self.ratios[4],
            fault_rate_per_mem_instr: self.ratios[5],
            rchar_per_cycle: self.ratios[6],
            wchar_per_cycle: self.ratios[7],
            rbytes_per_cycle: self.ratios[8],
            wbytes_per_cycle: self.ratios[9],
        }
    }

    pub fn set_ratios(&mut self, r: &PerformanceRatios) {
        self.ratios = [
            r.ipc,
            r.cache_miss_ratio,
            r.uop_per_cycle,
            r.mem_stall_per_mem_inst,
            r.mem_stall_per_inst,
            r.fault_rate_per_mem_instr,
            r.rchar_per_cycle,
            r.wchar_per_cycle,
            r.rbytes_per_cycle,
            r.wbytes_per_cycle,
        ];
    }

    fn as_bytes(&self) -> &[u8] {
        // SAFETY: WireRecord is repr(C), Copy, and contains no padding
        // bytes that matter for a same-process/same-build-target peer.
        unsafe {
            std::slice::from_raw_parts(
                (self as *const WireRecord) as *const u8,
                std::mem::size_of::<WireRecord>(),
            )
        }
    }

    fn from_bytes(buf: &[u8]) -> Self {
        debug_assert_eq!(buf.len(), std::mem::size_of::<WireRecord>());
        // SAFETY: buf is exactly sizeof(WireRecord) and WireRecord has no
        // invalid bit patterns.
        unsafe { std::ptr::read(buf.as_ptr() as *const WireRecord) }
    }
}

/// Connects to `socket_path` and writes the three framed chunks. Matches
/// `send_to_scheduler`: on any error the send is abandoned and logged,
/// never retried.
pub fn send(socket_path: &std::path::Path, pid: libc::pid_t, startup_flag: i32, record: &WireRecord) {
    let result = (|| -> std::io::Result<()> {
        let mut stream = UnixStream::connect(socket_path)?;
        stream.write_all(&pid.to_ne_bytes())?;
        stream.write_all(&startup_flag.to_ne_bytes())?;
        stream.write_all(record.as_bytes())?;
        Ok(())
    })();
    if let Err(e) = result {
        log::warn!(target: "monitor", "dropping sample, scheduler send failed: {e}");
    }
}

/// Sends the sentinel shutdown message: `pid = -1`, no further payload.
pub fn send_shutdown(socket_path: &std::path::Path) -> std::io::Result<()> {
    let mut stream = UnixStream::connect(socket_path)?;
    stream.write_all(&SHUTDOWN_PID.to_ne_bytes())?;
    Ok(())
}

/// Reads one complete `(pid, startup_flag, WireRecord)` message off an
/// accepted connection, or `None` if the peer disconnects (or sends a
/// short/malformed message) before a full frame arrives. A lone
/// `pid = -1` with no further bytes (the shutdown sentinel) is reported
/// back to the caller as `Message::Shutdown` rather than an error.
pub enum Message {
    Shutdown,
    Sample {
        pid: libc::pid_t,
        startup_flag: i32,
        record: Box<WireRecord>,
    },
}

pub fn recv(stream: &mut UnixStream) -> Option<Message> {
    let pid = read_exact_or_none(stream, 4).map(|b| i32::from_ne_bytes(b.try_into().unwrap()))?;
    if pid == SHUTDOWN_PID {
        return Some(Message::Shutdown);
    }
    let startup_flag =
        read_exact_or_none(stream, 4).map(|b| i32::from_ne_bytes(b.try_into().unwrap()))?;

    let expected = std::mem::size_of::<WireRecord>();
    let mut buf = vec![0u8; expected];
    let mut got = 0;
    while got < expected {
        match stream.read(&mut buf[got..]) {
            Ok(0) => break,
            Ok(n) => got += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    if got != expected {
        return None;
    }
    Some(Message::Sample {
        pid,
        startup_flag,
        record: Box::new(WireRecord::from_bytes(&buf)),
    })
}

fn read_exact_or_none(stream: &mut UnixStream, n: usize) -> Option<Vec<u8>> {
    let mut buf = vec![0u8; n];
    let mut got = 0;
    while got < n {
        match stream.read(&mut buf[got..]) {
            Ok(0) => return None,
            Ok(read) => got += read,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => return None,
        }
    }
    Some(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    #[test]
    fn round_trips_a_sample_over_a_real_socket() {
        let dir = std::env::temp_dir().join(format!("proto_test_{}.sock", std::process::id()));
        std::fs::remove_file(&dir).ok();
        let listener = UnixListener::bind(&dir).unwrap();

        let mut record = WireRecord::default();
        record.thread_count = 3;
        record.counter_totals[0] = 12345;

        send(&dir, 42, 0, &record);

        let (mut conn, _) = listener.accept().unwrap();
        match recv(&mut conn) {
            Some(Message::Sample { pid, startup_flag, record: got }) => {
                assert_eq!(pid, 42);
                assert_eq!(startup_flag, 0);
                assert_eq!(got.thread_count, 3);
                assert_eq!(got.counter_totals[0], 12345);
            }
            _ => panic!("expected a Sample message"),
        }
        std::fs::remove_file(&dir).ok();
    }

    #[test]
    fn shutdown_sentinel_is_recognized() {
        let dir = std::env::temp_dir().join(format!("proto_test_shutdown_{}.sock", std::process::id()));
        std::fs::remove_file(&dir).ok();
        let listener = UnixListener::bind(&dir).unwrap();

        send_shutdown(&dir).unwrap();

        let (mut conn, _) = listener.accept().unwrap();
        assert!(matches!(recv(&mut conn), Some(Message::Shutdown)));
        std::fs::remove_file(&dir).ok();
    }
}
