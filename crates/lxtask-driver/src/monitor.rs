//! Liveness monitor and teardown owner.
//!
//! Every running handle is paired with exactly one monitor task. The
//! monitor polls the container's init process on a fixed interval and
//! listens for the kill signal; whichever fires first, the monitor alone
//! performs teardown (wait for stop, destroy, release the backing
//! snapshot) and publishes the termination result exactly once.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use lxtask_common::constants::{MONITOR_INTERVAL, STOP_WAIT_TIMEOUT};
use lxtask_common::error::DriverError;
use lxtask_lxc::container::LxcContainer;
use lxtask_lxc::lvm::VolumeManager;
use lxtask_lxc::probe::{Liveness, ProcessProbe};

use crate::handle::TerminationResult;
use crate::provision::SnapshotRef;

pub(crate) struct Monitor {
    container: Arc<dyn LxcContainer>,
    init_pid: i32,
    probe: Arc<dyn ProcessProbe>,
    volumes: Arc<dyn VolumeManager>,
    /// Snapshot to release at teardown. `None` for template containers
    /// and for reattached handles, whose storage the original driver
    /// instance provisioned.
    snapshot: Option<SnapshotRef>,
    kill_rx: watch::Receiver<bool>,
    result_tx: mpsc::Sender<TerminationResult>,
}

impl Monitor {
    pub fn new(
        container: Arc<dyn LxcContainer>,
        init_pid: i32,
        probe: Arc<dyn ProcessProbe>,
        volumes: Arc<dyn VolumeManager>,
        snapshot: Option<SnapshotRef>,
        kill_rx: watch::Receiver<bool>,
        result_tx: mpsc::Sender<TerminationResult>,
    ) -> Self {
        Self {
            container,
            init_pid,
            probe,
            volumes,
            snapshot,
            kill_rx,
            result_tx,
        }
    }

    /// Supervises until the init process dies or a kill arrives, then
    /// tears the container down and publishes the outcome. Dropping the
    /// sender afterwards closes the termination channel, so waiters
    /// observe at most one result.
    pub async fn run(mut self) {
        let outcome = self.supervise().await;
        self.teardown().await;
        if self.result_tx.send(outcome).await.is_err() {
            tracing::debug!(name = %self.container.name(), "termination result dropped, no waiter");
        }
    }

    async fn supervise(&mut self) -> TerminationResult {
        let mut ticker = tokio::time::interval(MONITOR_INTERVAL);
        // The first tick completes immediately; consume it so the loop
        // probes on the steady cadence.
        let _ = ticker.tick().await;
        let mut kill_closed = false;
        loop {
            tokio::select! {
                _ = ticker.tick() => match self.probe.check(self.init_pid) {
                    Liveness::Alive => {}
                    Liveness::Exited => {
                        tracing::info!(name = %self.container.name(), pid = self.init_pid, "container process exited");
                        return Ok(());
                    }
                    Liveness::Error(message) => {
                        tracing::error!(name = %self.container.name(), pid = self.init_pid, %message, "liveness probe failed");
                        return Err(DriverError::Runtime {
                            command: "liveness probe".into(),
                            message,
                        });
                    }
                },
                changed = self.kill_rx.changed(), if !kill_closed => match changed {
                    Ok(()) => {
                        if *self.kill_rx.borrow() {
                            tracing::info!(name = %self.container.name(), "kill requested");
                            return Ok(());
                        }
                    }
                    // The handle dropped without killing; keep watching
                    // the process itself.
                    Err(_) => kill_closed = true,
                },
            }
        }
    }

    /// Destroys the container and releases its snapshot. Failures here are
    /// logged, never propagated: the process is already gone and the
    /// result must still be published.
    async fn teardown(&self) {
        let container = Arc::clone(&self.container);
        let volumes = Arc::clone(&self.volumes);
        let snapshot = self.snapshot.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let name = container.name().to_string();
            if !container.wait_stopped(STOP_WAIT_TIMEOUT) {
                tracing::warn!(%name, "timed out waiting for container to stop, destroying anyway");
            }
            if let Err(e) = container.destroy() {
                tracing::error!(%name, error = %e, "unable to destroy container");
            }
            if let Some(snapshot) = snapshot {
                if let Err(e) = volumes.remove(&snapshot.vg, &snapshot.lv) {
                    tracing::error!(%name, vg = %snapshot.vg, lv = %snapshot.lv, error = %e, "unable to remove snapshot volume");
                }
            }
        })
        .await;
        if joined.is_err() {
            tracing::error!(name = %self.container.name(), "teardown task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testutil::{journal_entries, new_journal, FakeContainer, FakeLvm, FakeProbe};

    struct Rig {
        container: Arc<FakeContainer>,
        lvm: Arc<FakeLvm>,
        probe: Arc<FakeProbe>,
        kill_tx: watch::Sender<bool>,
        result_rx: mpsc::Receiver<TerminationResult>,
    }

    fn spawn_monitor(probe: FakeProbe, snapshot: Option<SnapshotRef>) -> Rig {
        let journal = new_journal();
        let container = Arc::new(FakeContainer::with_journal("web-a1", Arc::clone(&journal)));
        let lvm = Arc::new(FakeLvm::with_journal(journal));
        let probe = Arc::new(probe);
        let (kill_tx, kill_rx) = watch::channel(false);
        let (result_tx, result_rx) = mpsc::channel(1);
        let monitor = Monitor::new(
            Arc::clone(&container) as Arc<dyn LxcContainer>,
            4242,
            Arc::clone(&probe) as Arc<dyn ProcessProbe>,
            Arc::clone(&lvm) as Arc<dyn VolumeManager>,
            snapshot,
            kill_rx,
            result_tx,
        );
        drop(tokio::spawn(monitor.run()));
        Rig {
            container,
            lvm,
            probe,
            kill_tx,
            result_rx,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn process_death_publishes_once_and_destroys() {
        let mut rig = spawn_monitor(FakeProbe::exited(), None);
        let result = rig.result_rx.recv().await.expect("termination result");
        assert!(result.is_ok());
        // Channel closes after the single publish.
        assert!(rig.result_rx.recv().await.is_none());

        let journal = journal_entries(&rig.container.journal);
        assert_eq!(
            journal.iter().filter(|op| *op == "destroy").count(),
            1,
            "destroy must run exactly once: {journal:?}"
        );
        assert!(journal.contains(&"wait_stopped".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn kill_signal_tears_down_without_waiting_for_death() {
        let mut rig = spawn_monitor(FakeProbe::alive(), None);
        rig.kill_tx.send(true).expect("monitor listening");
        let result = rig.result_rx.recv().await.expect("termination result");
        assert!(result.is_ok());
        assert!(rig.container.state.lock().expect("state lock").destroyed);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_error_surfaces_as_runtime_error() {
        let mut rig = spawn_monitor(FakeProbe::erroring("permission denied"), None);
        let result = rig.result_rx.recv().await.expect("termination result");
        assert!(matches!(result, Err(DriverError::Runtime { .. })));
        assert!(rig.container.state.lock().expect("state lock").destroyed);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_kill_sender_keeps_monitoring_until_death() {
        let mut rig = spawn_monitor(FakeProbe::alive(), None);
        drop(rig.kill_tx);
        tokio::time::sleep(MONITOR_INTERVAL * 3).await;
        rig.probe.set(Liveness::Exited);
        let result = rig.result_rx.recv().await.expect("termination result");
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_is_released_after_destroy() {
        let snapshot = SnapshotRef {
            vg: "vg0".to_string(),
            lv: "web-a1".to_string(),
        };
        let mut rig = spawn_monitor(FakeProbe::exited(), Some(snapshot));
        rig.result_rx.recv().await.expect("termination result").expect("clean exit");

        let journal = journal_entries(&rig.lvm.journal);
        let destroy = journal
            .iter()
            .position(|op| op == "destroy")
            .expect("destroy ran");
        let remove = journal
            .iter()
            .position(|op| op == "remove:vg0/web-a1")
            .expect("snapshot removed");
        assert!(destroy < remove, "destroy must precede removal: {journal:?}");
    }
}
