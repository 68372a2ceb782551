//! Orchestrator-facing task inputs.
//!
//! These are the boundary structs the embedding agent fills in from its
//! scheduler state: what to run, where the task's directories live, and
//! which environment variables the task sees.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

/// Resources the scheduler granted this task.
#[derive(Debug, Clone, Copy)]
pub struct Resources {
    /// Memory ceiling in megabytes.
    pub memory_mb: u64,
    /// CPU shares, written verbatim as the cgroup share value.
    pub cpu_shares: u64,
}

/// One task as submitted by the orchestrator.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Task name within the allocation.
    pub name: String,
    /// Allocation ID of this scheduling attempt.
    pub alloc_id: String,
    /// Loosely-typed driver configuration map.
    pub config: serde_json::Map<String, Value>,
    /// Granted resources.
    pub resources: Resources,
    /// Requested kill timeout, clamped to the driver maximum at start.
    pub kill_timeout: Duration,
}

/// The task's private directory tree, provided by the orchestrator's
/// working-directory abstraction.
#[derive(Debug, Clone)]
pub struct TaskDirs {
    /// The task's private working directory.
    pub dir: PathBuf,
    /// Task-local scratch directory, bind-mounted to `local`.
    pub local_dir: PathBuf,
    /// Directory shared across the allocation, bind-mounted to `alloc`.
    pub shared_alloc_dir: PathBuf,
    /// Secrets directory, bind-mounted to `secrets`.
    pub secrets_dir: PathBuf,
}

/// Environment variables the orchestrator prepared for the task.
#[derive(Debug, Clone, Default)]
pub struct TaskEnv {
    vars: Vec<(String, String)>,
}

impl TaskEnv {
    /// Creates an environment from `(key, value)` pairs.
    #[must_use]
    pub fn new(vars: Vec<(String, String)>) -> Self {
        Self { vars }
    }

    /// Returns the variables in submission order.
    #[must_use]
    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }

    /// Substitutes `${VAR}` references in each argument with the
    /// corresponding environment value. Unknown references are left as-is.
    #[must_use]
    pub fn parse_and_replace(&self, args: &[String]) -> Vec<String> {
        args.iter()
            .map(|arg| {
                let mut out = arg.clone();
                for (key, value) in &self.vars {
                    out = out.replace(&format!("${{{key}}}"), value);
                }
                out
            })
            .collect()
    }
}
