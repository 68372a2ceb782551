//! # lxtask-lxc
//!
//! Narrow capability interfaces over the external collaborators the driver
//! depends on (the LXC container runtime, the LVM tooling, and the process
//! liveness probe), plus the real command- and cgroupfs-backed
//! implementations.
//!
//! The driver crate programs against the traits defined here so its lifecycle
//! and rollback logic can be exercised with fakes.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod command;
pub mod container;
pub mod lvm;
pub mod probe;
pub mod runtime;
