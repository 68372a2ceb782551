//! Helper for running external tool commands with captured stderr.

use std::process::Command;

use lxtask_common::error::{DriverError, Result};

/// Runs a command to completion, mapping a non-zero exit into a
/// [`DriverError::Runtime`] that carries the captured stderr.
///
/// # Errors
///
/// Returns an error if the command cannot be spawned or exits non-zero.
pub fn run(program: &str, args: &[&str]) -> Result<String> {
    tracing::debug!(program, ?args, "running command");
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| DriverError::Runtime {
            command: program.to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(DriverError::Runtime {
            command: format!("{program} {}", args.join(" ")),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Runs a command, returning whether it exited successfully.
///
/// Used where the exit status itself is the answer (e.g. waiting on a
/// container state) and failure carries no diagnostic value.
#[must_use]
pub fn run_check(program: &str, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .output()
        .is_ok_and(|o| o.status.success())
}
