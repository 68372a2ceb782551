//! # lxtask-driver
//!
//! Container lifecycle driver for a cluster orchestrator: provisions LXC
//! containers (from an image template or by cloning an LVM-backed base),
//! applies resource limits, supervises the running container with a
//! per-handle liveness monitor, and reports usage and termination back to
//! the orchestrator.
//!
//! The orchestrator-facing surface is [`driver::LxcDriver`] (`validate`,
//! `start`, `open`) and [`handle::TaskHandle`] (`kill`, `stats`,
//! `update_kill_timeout`, `identity`, `wait`).

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod driver;
pub mod handle;
pub mod limits;
pub mod monitor;
pub mod provision;
pub mod rollback;
pub mod stats;
pub mod task;
pub mod volumes;

#[cfg(test)]
pub(crate) mod testutil;

pub use driver::LxcDriver;
pub use handle::{PersistedIdentity, TaskHandle, TerminationResult};
pub use task::{Resources, TaskDirs, TaskEnv, TaskSpec};
