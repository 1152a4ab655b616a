//! Process liveness checks used by orphan reclamation.
//!
//! The probe is non-invasive: `kill(pid, 0)` delivers no signal. A permission
//! error proves the PID exists under another owner, so it is never reported
//! as dead. When a start time was recorded with the PID, a mismatch means the
//! PID was reused and the original process is gone.

use std::cell::RefCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Dead,
    /// The probe could not decide. Callers treat this as alive.
    Unknown,
}

impl Liveness {
    pub fn is_dead(self) -> bool {
        matches!(self, Liveness::Dead)
    }
}

/// Seam for the monitor so tests can script process state.
pub trait LivenessProbe {
    fn probe(&self, pid: u32, expected_start: Option<u64>) -> Liveness;
}

/// Probes real OS processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl LivenessProbe for SystemProbe {
    fn probe(&self, pid: u32, expected_start: Option<u64>) -> Liveness {
        match signal_probe(pid) {
            Liveness::Alive => {}
            other => return other,
        }

        let Some(expected) = expected_start else {
            return Liveness::Alive;
        };
        match process_start_time(pid) {
            // Allow ±2 seconds between the recorded and observed start time
            Some(actual) if actual.abs_diff(expected) <= 2 => Liveness::Alive,
            Some(actual) => {
                tracing::debug!(pid, expected, actual, "PID reused by another process");
                Liveness::Dead
            }
            None => Liveness::Alive,
        }
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn signal_probe(pid: u32) -> Liveness {
    if pid == 0 {
        return Liveness::Dead;
    }
    let Ok(raw) = i32::try_from(pid) else {
        return Liveness::Unknown;
    };

    // SAFETY: signal 0 performs only the existence and permission check; no
    // signal is delivered. `raw` is positive so it never targets a group.
    let rc = unsafe { libc::kill(raw, 0) };
    if rc == 0 {
        return Liveness::Alive;
    }
    match std::io::Error::last_os_error().raw_os_error() {
        Some(libc::ESRCH) => Liveness::Dead,
        Some(libc::EPERM) => Liveness::Alive,
        _ => Liveness::Unknown,
    }
}

#[cfg(not(unix))]
fn signal_probe(_pid: u32) -> Liveness {
    Liveness::Unknown
}

thread_local! {
    static SYSTEM_CACHE: RefCell<Option<sysinfo::System>> = const { RefCell::new(None) };
}

/// Start time of a process in unix seconds, or `None` if it can't be queried.
pub fn process_start_time(pid: u32) -> Option<u64> {
    use sysinfo::{Pid, ProcessRefreshKind, System};

    SYSTEM_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        let sys = cache.get_or_insert_with(System::new);

        // Refresh only this PID rather than scanning the process table
        let sysinfo_pid = Pid::from(pid as usize);
        sys.refresh_process_specifics(sysinfo_pid, ProcessRefreshKind::new());
        sys.process(sysinfo_pid).map(|process| process.start_time())
    })
}
