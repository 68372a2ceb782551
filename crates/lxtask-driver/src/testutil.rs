//! Fakes for the capability traits, shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lxtask_common::error::{DriverError, Result};
use lxtask_common::types::{CpuTimes, LogLevel, Verbosity};
use lxtask_lxc::container::{LxcContainer, TemplateOptions};
use lxtask_lxc::lvm::VolumeManager;
use lxtask_lxc::probe::{Liveness, ProcessProbe};
use lxtask_lxc::runtime::LxcRuntime;

/// Shared operation journal used to assert ordering across fakes.
pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

pub(crate) fn new_journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) fn journal_entries(journal: &Journal) -> Vec<String> {
    journal.lock().expect("journal lock").clone()
}

/// Mutable state of a fake container.
#[derive(Debug, Default)]
pub(crate) struct FakeState {
    pub created: bool,
    pub running: bool,
    pub destroyed: bool,
    pub init_pid: i32,
    pub config_items: Vec<(String, String)>,
    pub loaded_config: Option<PathBuf>,
    pub executed_args: Option<Vec<String>>,
    pub memory_limit: Option<u64>,
    pub cgroup_writes: HashMap<String, String>,
}

/// In-memory implementation of [`LxcContainer`].
pub(crate) struct FakeContainer {
    pub name: String,
    pub config_path: PathBuf,
    pub state: Mutex<FakeState>,
    pub journal: Journal,
    /// CPU accounting returned by `cpu_stats`/`cpu_time`; `None` errors.
    pub cpu: Mutex<Option<(CpuTimes, u64)>>,
    pub items: Mutex<HashMap<String, Vec<String>>>,
    fail: Mutex<HashSet<&'static str>>,
}

impl FakeContainer {
    pub fn named(name: &str) -> Self {
        Self::with_journal(name, new_journal())
    }

    pub fn with_journal(name: &str, journal: Journal) -> Self {
        Self::at_path(name, journal, Path::new("/var/lib/lxc"))
    }

    pub fn at_path(name: &str, journal: Journal, config_path: &Path) -> Self {
        Self {
            name: name.to_string(),
            config_path: config_path.to_path_buf(),
            state: Mutex::new(FakeState {
                init_pid: 4242,
                ..FakeState::default()
            }),
            journal,
            cpu: Mutex::new(None),
            items: Mutex::new(HashMap::new()),
            fail: Mutex::new(HashSet::new()),
        }
    }

    /// Makes the named operation return an error.
    pub fn fail_on(&self, op: &'static str) {
        let _ = self.fail.lock().expect("fail lock").insert(op);
    }

    pub fn set_cpu(&self, times: CpuTimes, total_ticks: u64) {
        *self.cpu.lock().expect("cpu lock") = Some((times, total_ticks));
    }

    pub fn set_item(&self, key: &str, lines: &[&str]) {
        let _ = self
            .items
            .lock()
            .expect("items lock")
            .insert(key.to_string(), lines.iter().map(ToString::to_string).collect());
    }

    fn record(&self, op: &str, fail_key: &'static str) -> Result<()> {
        self.journal.lock().expect("journal lock").push(op.to_string());
        if self.fail.lock().expect("fail lock").contains(fail_key) {
            return Err(DriverError::Runtime {
                command: fail_key.into(),
                message: "injected failure".into(),
            });
        }
        Ok(())
    }
}

impl LxcContainer for FakeContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn create(&self, _options: &TemplateOptions) -> Result<()> {
        self.record("create", "create")?;
        self.state.lock().expect("state lock").created = true;
        Ok(())
    }

    fn set_config_item(&self, key: &str, value: &str) -> Result<()> {
        self.record(&format!("set_config_item:{key}"), "set_config_item")?;
        self.state
            .lock()
            .expect("state lock")
            .config_items
            .push((key.to_string(), value.to_string()));
        Ok(())
    }

    fn load_config_file(&self, path: &Path) -> Result<()> {
        self.record("load_config_file", "load_config_file")?;
        self.state.lock().expect("state lock").loaded_config = Some(path.to_path_buf());
        Ok(())
    }

    fn start(&self) -> Result<()> {
        self.record("start", "start")?;
        self.state.lock().expect("state lock").running = true;
        Ok(())
    }

    fn start_execute(&self, args: &[String]) -> Result<()> {
        self.record("start_execute", "start_execute")?;
        let mut state = self.state.lock().expect("state lock");
        state.running = true;
        state.executed_args = Some(args.to_vec());
        Ok(())
    }

    fn shutdown(&self, _timeout: Duration) -> Result<()> {
        self.record("shutdown", "shutdown")?;
        self.state.lock().expect("state lock").running = false;
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.record("stop", "stop")?;
        self.state.lock().expect("state lock").running = false;
        Ok(())
    }

    fn wait_stopped(&self, _timeout: Duration) -> bool {
        self.journal
            .lock()
            .expect("journal lock")
            .push("wait_stopped".to_string());
        !self.state.lock().expect("state lock").running
    }

    fn destroy(&self) -> Result<()> {
        self.record("destroy", "destroy")?;
        self.state.lock().expect("state lock").destroyed = true;
        Ok(())
    }

    fn init_pid(&self) -> i32 {
        let state = self.state.lock().expect("state lock");
        if state.running { state.init_pid } else { -1 }
    }

    fn is_running(&self) -> bool {
        self.state.lock().expect("state lock").running
    }

    fn set_verbosity(&self, _verbosity: Verbosity) {}

    fn set_log_level(&self, _level: LogLevel) {}

    fn set_log_file(&self, _path: &Path) {}

    fn set_memory_limit(&self, bytes: u64) -> Result<()> {
        self.record("set_memory_limit", "set_memory_limit")?;
        self.state.lock().expect("state lock").memory_limit = Some(bytes);
        Ok(())
    }

    fn set_cgroup_item(&self, key: &str, value: &str) -> Result<()> {
        self.record(&format!("set_cgroup_item:{key}"), "set_cgroup_item")?;
        let _ = self
            .state
            .lock()
            .expect("state lock")
            .cgroup_writes
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn cgroup_item(&self, key: &str) -> Vec<String> {
        self.items
            .lock()
            .expect("items lock")
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    fn cpu_stats(&self) -> Result<CpuTimes> {
        self.cpu
            .lock()
            .expect("cpu lock")
            .map(|(times, _)| times)
            .ok_or_else(|| DriverError::Runtime {
                command: "cpuacct.stat".into(),
                message: "no cpu accounting".into(),
            })
    }

    fn cpu_time(&self) -> Result<u64> {
        self.cpu
            .lock()
            .expect("cpu lock")
            .map(|(_, total)| total)
            .ok_or_else(|| DriverError::Runtime {
                command: "cpuacct.usage".into(),
                message: "no cpu accounting".into(),
            })
    }
}

/// In-memory implementation of [`VolumeManager`].
pub(crate) struct FakeLvm {
    pub journal: Journal,
    fail: Mutex<HashSet<&'static str>>,
}

impl FakeLvm {
    pub fn new() -> Self {
        Self::with_journal(new_journal())
    }

    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal,
            fail: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_on(&self, op: &'static str) {
        let _ = self.fail.lock().expect("fail lock").insert(op);
    }
}

impl VolumeManager for FakeLvm {
    fn snapshot(&self, base: &str, name: &str) -> Result<()> {
        self.journal
            .lock()
            .expect("journal lock")
            .push(format!("snapshot:{base}:{name}"));
        if self.fail.lock().expect("fail lock").contains("snapshot") {
            return Err(DriverError::Runtime {
                command: "lvcreate".into(),
                message: "injected failure".into(),
            });
        }
        Ok(())
    }

    fn remove(&self, vg: &str, name: &str) -> Result<()> {
        self.journal
            .lock()
            .expect("journal lock")
            .push(format!("remove:{vg}/{name}"));
        if self.fail.lock().expect("fail lock").contains("remove") {
            return Err(DriverError::Runtime {
                command: "lvremove".into(),
                message: "injected failure".into(),
            });
        }
        Ok(())
    }
}

/// Probe whose answer the test controls.
pub(crate) struct FakeProbe {
    liveness: Mutex<Liveness>,
}

impl FakeProbe {
    pub fn alive() -> Self {
        Self {
            liveness: Mutex::new(Liveness::Alive),
        }
    }

    pub fn exited() -> Self {
        Self {
            liveness: Mutex::new(Liveness::Exited),
        }
    }

    pub fn erroring(message: &str) -> Self {
        Self {
            liveness: Mutex::new(Liveness::Error(message.to_string())),
        }
    }

    pub fn set(&self, liveness: Liveness) {
        *self.liveness.lock().expect("liveness lock") = liveness;
    }
}

impl ProcessProbe for FakeProbe {
    fn check(&self, _pid: i32) -> Liveness {
        self.liveness.lock().expect("liveness lock").clone()
    }
}

/// Runtime returning fakes and remembering every handle it hands out.
pub(crate) struct FakeRuntime {
    pub default_path: PathBuf,
    pub created: Mutex<Vec<Arc<FakeContainer>>>,
    /// Containers reported by `containers()`, for `open` tests.
    pub existing: Mutex<Vec<Arc<FakeContainer>>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            default_path: PathBuf::from("/var/lib/lxc"),
            created: Mutex::new(Vec::new()),
            existing: Mutex::new(Vec::new()),
        }
    }

    pub fn add_existing(&self, container: Arc<FakeContainer>) {
        self.existing.lock().expect("existing lock").push(container);
    }

    pub fn last_created(&self) -> Arc<FakeContainer> {
        self.created
            .lock()
            .expect("created lock")
            .last()
            .cloned()
            .expect("no container created")
    }
}

impl LxcRuntime for FakeRuntime {
    fn default_config_path(&self) -> PathBuf {
        self.default_path.clone()
    }

    fn container(&self, name: &str, config_path: &Path) -> Result<Arc<dyn LxcContainer>> {
        let container = Arc::new(FakeContainer::at_path(name, new_journal(), config_path));
        self.created
            .lock()
            .expect("created lock")
            .push(Arc::clone(&container));
        Ok(container)
    }

    fn containers(&self, _config_path: &Path) -> Result<Vec<Arc<dyn LxcContainer>>> {
        Ok(self
            .existing
            .lock()
            .expect("existing lock")
            .iter()
            .map(|c| Arc::clone(c) as Arc<dyn LxcContainer>)
            .collect())
    }

    fn version(&self) -> Option<String> {
        Some("5.0.0".to_string())
    }

    fn is_available(&self) -> bool {
        true
    }
}
