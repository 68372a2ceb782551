//! Process liveness probing.
//!
//! The liveness monitor never inspects global process state directly; it
//! asks a [`ProcessProbe`] so tests can drive it without real processes.

/// Outcome of a liveness check against a PID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Liveness {
    /// The process exists and accepted the zero-effect signal.
    Alive,
    /// The process is gone; the container has exited.
    Exited,
    /// The process could not be checked at all.
    Error(String),
}

/// Checks whether a process is still alive.
pub trait ProcessProbe: Send + Sync {
    /// Probes the given PID without affecting the process.
    fn check(&self, pid: i32) -> Liveness;
}

/// Probe implementation using the null signal (`kill(pid, 0)`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalProbe;

#[cfg(unix)]
impl ProcessProbe for SignalProbe {
    fn check(&self, pid: i32) -> Liveness {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid), None) {
            Ok(()) => Liveness::Alive,
            // EPERM means the process exists but belongs to someone else.
            Err(Errno::EPERM) => Liveness::Alive,
            Err(Errno::ESRCH) => Liveness::Exited,
            Err(e) => Liveness::Error(e.to_string()),
        }
    }
}

#[cfg(not(unix))]
impl ProcessProbe for SignalProbe {
    fn check(&self, _pid: i32) -> Liveness {
        Liveness::Error("process probing requires a Unix platform".into())
    }
}
