//! Process liveness and host identity for lock ownership.

use std::process::{Command, Stdio};

/// Answers "is process `pid` on this host still running?".
///
/// The lock manager only consults this for locks recorded on the same host;
/// a foreign host's process can never be checked and is assumed alive.
pub trait ProcessLiveness {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Asks the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeLiveness;

impl ProcessLiveness for NativeLiveness {
    fn is_alive(&self, pid: u32) -> bool {
        if pid == 0 {
            return false;
        }
        pid_running(pid)
    }
}

#[cfg(unix)]
fn pid_running(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: kill(2) with signal 0 delivers nothing; it only runs the
    // existence and permission checks. `pid` is a positive in-range pid_t,
    // so it never addresses a process group.
    let rc = unsafe { libc::kill(pid, 0) };
    if rc == 0 {
        return true;
    }
    // EPERM: the process exists but belongs to someone else.
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(windows)]
fn pid_running(pid: u32) -> bool {
    let filter = format!("PID eq {pid}");
    match Command::new("tasklist")
        .args(["/FI", &filter, "/NH", "/FO", "CSV"])
        .stdin(Stdio::null())
        .output()
    {
        Ok(out) => String::from_utf8_lossy(&out.stdout).contains(&format!("\"{pid}\"")),
        // Unknown means alive: never reclaim a lock we cannot judge.
        Err(_) => true,
    }
}

#[cfg(not(any(unix, windows)))]
fn pid_running(_pid: u32) -> bool {
    true
}

/// Fixed answer for every pid. Lets callers model a crashed or a running
/// lock owner without spawning processes.
#[derive(Debug, Clone, Copy)]
pub struct AssumeLiveness(pub bool);

impl ProcessLiveness for AssumeLiveness {
    fn is_alive(&self, _pid: u32) -> bool {
        self.0
    }
}

/// Best-effort host name recorded in lock files.
pub fn hostname() -> String {
    for var in ["HOSTNAME", "COMPUTERNAME"] {
        if let Ok(value) = std::env::var(var) {
            let value = value.trim();
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }
    if let Ok(contents) = std::fs::read_to_string("/etc/hostname") {
        let value = contents.trim();
        if !value.is_empty() {
            return value.to_string();
        }
    }
    Command::new("hostname")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown-host".to_string())
}
