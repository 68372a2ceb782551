//! Rollback stack for multi-step provisioning.
//!
//! Each provisioning step that commits a side effect registers an undo
//! matching exactly that effect. On a later failure the stack unwinds in
//! reverse commit order before the error surfaces; on success the stack is
//! disarmed and the effects stay.

use lxtask_common::error::{DriverError, Result};

type UndoFn = Box<dyn FnOnce() -> Result<()> + Send>;

/// An ordered stack of labelled undo closures, executed strictly LIFO.
#[derive(Default)]
pub struct RollbackStack {
    steps: Vec<(&'static str, UndoFn)>,
}

impl RollbackStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an undo for a side effect that just committed.
    pub fn push(&mut self, label: &'static str, undo: impl FnOnce() -> Result<()> + Send + 'static) {
        self.steps.push((label, Box::new(undo)));
    }

    /// Drops all registered undos, keeping the committed effects.
    pub fn disarm(&mut self) {
        self.steps.clear();
    }

    /// Executes every registered undo in reverse commit order.
    ///
    /// A failing undo is logged and does not stop the unwind; later
    /// (earlier-committed) undos still run.
    pub fn unwind(&mut self) {
        while let Some((label, undo)) = self.steps.pop() {
            match undo() {
                Ok(()) => tracing::debug!(step = label, "rolled back"),
                Err(e) => tracing::error!(step = label, error = %e, "rollback step failed"),
            }
        }
    }

    /// Unwinds the stack and returns the given error.
    ///
    /// # Errors
    ///
    /// Always returns `err`, after the unwind completes.
    pub fn fail<T>(&mut self, err: DriverError) -> Result<T> {
        self.unwind();
        Err(err)
    }

    /// Returns the number of registered undo steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns whether no undo steps are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder(journal: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> impl FnOnce() -> Result<()> + Send + 'static {
        let journal = Arc::clone(journal);
        move || {
            journal.lock().expect("journal lock").push(label);
            Ok(())
        }
    }

    #[test]
    fn unwind_runs_in_reverse_commit_order() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut stack = RollbackStack::new();
        stack.push("first", recorder(&journal, "first"));
        stack.push("second", recorder(&journal, "second"));
        stack.push("third", recorder(&journal, "third"));
        stack.unwind();
        assert_eq!(*journal.lock().expect("journal lock"), vec!["third", "second", "first"]);
        assert!(stack.is_empty());
    }

    #[test]
    fn disarm_skips_all_undos() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut stack = RollbackStack::new();
        stack.push("only", recorder(&journal, "only"));
        stack.disarm();
        stack.unwind();
        assert!(journal.lock().expect("journal lock").is_empty());
    }

    #[test]
    fn failing_undo_does_not_stop_the_unwind() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut stack = RollbackStack::new();
        stack.push("first", recorder(&journal, "first"));
        stack.push("second", || {
            Err(DriverError::Provision {
                message: "undo failed".into(),
            })
        });
        stack.unwind();
        assert_eq!(*journal.lock().expect("journal lock"), vec!["first"]);
    }

    #[test]
    fn fail_unwinds_and_returns_the_error() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut stack = RollbackStack::new();
        stack.push("only", recorder(&journal, "only"));
        let result: Result<()> = stack.fail(DriverError::Provision {
            message: "boom".into(),
        });
        assert!(result.is_err());
        assert_eq!(*journal.lock().expect("journal lock"), vec!["only"]);
    }
}
