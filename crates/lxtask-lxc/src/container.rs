//! Container capability interface and the `lxc-*` command-backed
//! implementation.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use lxtask_common::error::{DriverError, Result};
use lxtask_common::types::{CpuTimes, LogLevel, Verbosity};

use crate::command;

/// Options for materializing a root filesystem from an image template.
#[derive(Debug, Clone, Default)]
pub struct TemplateOptions {
    /// Template name (e.g. `download`, `busybox`).
    pub template: String,
    /// Distribution passed to the template.
    pub distro: String,
    /// Release passed to the template.
    pub release: String,
    /// Architecture passed to the template.
    pub arch: String,
    /// Whether to flush the local image cache before building.
    pub flush_cache: bool,
    /// Whether to skip GPG validation of downloaded images.
    pub disable_gpg_validation: bool,
    /// Extra arguments appended verbatim after the template flags.
    pub extra_args: Vec<String>,
}

/// Narrow interface over one container known to the LXC runtime.
///
/// The driver owns no container mechanics itself; every namespace, cgroup,
/// and storage operation goes through this trait so the lifecycle logic can
/// be tested against fakes.
pub trait LxcContainer: Send + Sync {
    /// Returns the container name.
    fn name(&self) -> &str;

    /// Returns the configuration root path this container lives under.
    fn config_path(&self) -> &Path;

    /// Materializes the container's root filesystem from a template.
    ///
    /// # Errors
    ///
    /// Returns an error if the template mechanism fails; nothing is
    /// committed in that case.
    fn create(&self, options: &TemplateOptions) -> Result<()>;

    /// Assigns one configuration item. Assignments are idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be updated.
    fn set_config_item(&self, key: &str, value: &str) -> Result<()>;

    /// Loads a rendered configuration file into this container.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    fn load_config_file(&self, path: &Path) -> Result<()>;

    /// Starts the container's init process.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be started.
    fn start(&self) -> Result<()>;

    /// Launches direct execution of a command as the container's init,
    /// skipping the separate start phase.
    ///
    /// # Errors
    ///
    /// Returns an error if execution cannot be launched.
    fn start_execute(&self, args: &[String]) -> Result<()>;

    /// Requests graceful shutdown, bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the container did not shut down in time.
    fn shutdown(&self, timeout: Duration) -> Result<()>;

    /// Force-stops the container.
    ///
    /// # Errors
    ///
    /// Returns an error if the stop itself fails.
    fn stop(&self) -> Result<()>;

    /// Waits up to `timeout` for the container to reach the stopped state.
    /// Returns whether it got there.
    fn wait_stopped(&self, timeout: Duration) -> bool;

    /// Destroys the container and its storage.
    ///
    /// # Errors
    ///
    /// Returns an error if destruction fails.
    fn destroy(&self) -> Result<()>;

    /// Returns the PID of the container's init process, or -1 when the
    /// container is not running.
    fn init_pid(&self) -> i32;

    /// Returns whether the container is currently running.
    fn is_running(&self) -> bool;

    /// Sets the runtime log verbosity for subsequent operations.
    fn set_verbosity(&self, verbosity: Verbosity);

    /// Sets the runtime log level for subsequent operations.
    fn set_log_level(&self, level: LogLevel);

    /// Sets the runtime log file for subsequent operations.
    fn set_log_file(&self, path: &Path);

    /// Sets the container's hard memory ceiling in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the cgroup write fails.
    fn set_memory_limit(&self, bytes: u64) -> Result<()>;

    /// Writes one cgroup control value for this container.
    ///
    /// # Errors
    ///
    /// Returns an error if the cgroup write fails.
    fn set_cgroup_item(&self, key: &str, value: &str) -> Result<()>;

    /// Reads one cgroup accounting file, returning its non-empty lines.
    /// An unreadable file yields an empty list, not an error.
    fn cgroup_item(&self, key: &str) -> Vec<String>;

    /// Reads the container's CPU time split by execution mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the accounting file cannot be read or parsed.
    fn cpu_stats(&self) -> Result<CpuTimes>;

    /// Reads the container's cumulative CPU time in scheduler ticks.
    ///
    /// # Errors
    ///
    /// Returns an error if the accounting file cannot be read or parsed.
    fn cpu_time(&self) -> Result<u64>;
}

/// Log settings applied to the `lxc-*` invocations for one container.
#[derive(Debug, Default, Clone)]
struct LogSettings {
    verbosity: Option<Verbosity>,
    level: Option<LogLevel>,
    file: Option<PathBuf>,
}

/// Container implementation backed by the `lxc-*` command-line tools and
/// direct cgroupfs reads.
pub struct CliContainer {
    name: String,
    config_path: PathBuf,
    log: Mutex<LogSettings>,
    rcfile: Mutex<Option<PathBuf>>,
}

impl CliContainer {
    /// Creates a handle for the named container under `config_path`.
    ///
    /// The container need not exist yet; `create` or `load_config_file`
    /// bring it into existence.
    #[must_use]
    pub fn new(name: impl Into<String>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            config_path: config_path.into(),
            log: Mutex::new(LogSettings::default()),
            rcfile: Mutex::new(None),
        }
    }

    fn config_file(&self) -> PathBuf {
        self.config_path.join(&self.name).join("config")
    }

    /// Builds the `-n`/`-P` selector plus any configured log flags.
    fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "-n".to_string(),
            self.name.clone(),
            "-P".to_string(),
            self.config_path.display().to_string(),
        ];
        let log = self.log.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if log.verbosity == Some(Verbosity::Quiet) {
            args.push("-q".to_string());
        }
        if let Some(level) = log.level {
            args.push("-l".to_string());
            args.push(level.to_string().to_uppercase());
        }
        if let Some(file) = &log.file {
            args.push("-o".to_string());
            args.push(file.display().to_string());
        }
        args
    }

    fn run(&self, program: &str, extra: &[&str]) -> Result<String> {
        let base = self.base_args();
        let mut args: Vec<&str> = base.iter().map(String::as_str).collect();
        args.extend_from_slice(extra);
        command::run(program, &args)
    }

    fn cgroup_file(&self, key: &str) -> PathBuf {
        let subsystem = key.split('.').next().unwrap_or(key);
        PathBuf::from("/sys/fs/cgroup")
            .join(subsystem)
            .join("lxc")
            .join(&self.name)
            .join(key)
    }
}

impl LxcContainer for CliContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn create(&self, options: &TemplateOptions) -> Result<()> {
        let template_args = template_args(options);
        let mut extra = vec!["-t", options.template.as_str()];
        if !template_args.is_empty() {
            extra.push("--");
            extra.extend(template_args.iter().map(String::as_str));
        }
        let _ = self.run("lxc-create", &extra)?;
        tracing::info!(name = %self.name, template = %options.template, "container created");
        Ok(())
    }

    fn set_config_item(&self, key: &str, value: &str) -> Result<()> {
        use std::io::Write as _;

        let path = self.config_file();
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| DriverError::Io {
                path: path.clone(),
                source: e,
            })?;
        writeln!(file, "{key} = {value}").map_err(|e| DriverError::Io { path, source: e })?;
        Ok(())
    }

    fn load_config_file(&self, path: &Path) -> Result<()> {
        let _ = std::fs::read_to_string(path).map_err(|e| DriverError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        *self.rcfile.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
            Some(path.to_path_buf());
        Ok(())
    }

    fn start(&self) -> Result<()> {
        let _ = self.run("lxc-start", &["-d"])?;
        tracing::info!(name = %self.name, "container started");
        Ok(())
    }

    fn start_execute(&self, args: &[String]) -> Result<()> {
        let rcfile = self
            .rcfile
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        let rcfile_str = rcfile.as_ref().map(|p| p.display().to_string());
        let mut extra: Vec<&str> = vec!["-d"];
        if let Some(rc) = &rcfile_str {
            extra.push("--rcfile");
            extra.push(rc);
        }
        extra.push("--");
        extra.extend(args.iter().map(String::as_str));
        let _ = self.run("lxc-execute", &extra)?;
        tracing::info!(name = %self.name, ?args, "container executing");
        Ok(())
    }

    fn shutdown(&self, timeout: Duration) -> Result<()> {
        let secs = timeout.as_secs().to_string();
        let _ = self.run("lxc-stop", &["-t", &secs])?;
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let _ = self.run("lxc-stop", &["-k"])?;
        Ok(())
    }

    fn wait_stopped(&self, timeout: Duration) -> bool {
        let base = self.base_args();
        let secs = timeout.as_secs().to_string();
        let mut args: Vec<&str> = base.iter().map(String::as_str).collect();
        args.extend_from_slice(&["-s", "STOPPED", "-t", &secs]);
        command::run_check("lxc-wait", &args)
    }

    fn destroy(&self) -> Result<()> {
        let _ = self.run("lxc-destroy", &[])?;
        tracing::info!(name = %self.name, "container destroyed");
        Ok(())
    }

    fn init_pid(&self) -> i32 {
        self.run("lxc-info", &["-p", "-H"])
            .ok()
            .and_then(|out| out.trim().parse().ok())
            .unwrap_or(-1)
    }

    fn is_running(&self) -> bool {
        self.run("lxc-info", &["-s", "-H"])
            .is_ok_and(|out| out.trim() == "RUNNING")
    }

    fn set_verbosity(&self, verbosity: Verbosity) {
        self.log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .verbosity = Some(verbosity);
    }

    fn set_log_level(&self, level: LogLevel) {
        self.log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .level = Some(level);
    }

    fn set_log_file(&self, path: &Path) {
        self.log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .file = Some(path.to_path_buf());
    }

    fn set_memory_limit(&self, bytes: u64) -> Result<()> {
        self.set_cgroup_item("memory.limit_in_bytes", &bytes.to_string())
    }

    fn set_cgroup_item(&self, key: &str, value: &str) -> Result<()> {
        let path = self.cgroup_file(key);
        std::fs::write(&path, value).map_err(|e| DriverError::Io { path, source: e })
    }

    fn cgroup_item(&self, key: &str) -> Vec<String> {
        let path = self.cgroup_file(key);
        match std::fs::read_to_string(&path) {
            Ok(contents) => contents
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(ToString::to_string)
                .collect(),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "cgroup item unreadable");
                Vec::new()
            }
        }
    }

    fn cpu_stats(&self) -> Result<CpuTimes> {
        let path = self.cgroup_file("cpuacct.stat");
        let contents = std::fs::read_to_string(&path).map_err(|e| DriverError::Io {
            path: path.clone(),
            source: e,
        })?;
        parse_cpuacct_stat(&contents).ok_or_else(|| DriverError::Runtime {
            command: "cpuacct.stat".into(),
            message: format!("unexpected contents in {}", path.display()),
        })
    }

    fn cpu_time(&self) -> Result<u64> {
        let path = self.cgroup_file("cpuacct.usage");
        let contents = std::fs::read_to_string(&path).map_err(|e| DriverError::Io {
            path: path.clone(),
            source: e,
        })?;
        let nanos: u64 = contents.trim().parse().map_err(|_| DriverError::Runtime {
            command: "cpuacct.usage".into(),
            message: format!("unexpected contents in {}", path.display()),
        })?;
        // USER_HZ ticks: one tick per 10ms of CPU time.
        Ok(nanos / 10_000_000)
    }
}

/// Maps template options onto the flag set the standard templates accept.
fn template_args(options: &TemplateOptions) -> Vec<String> {
    let mut args = Vec::new();
    if !options.distro.is_empty() {
        args.push("--dist".to_string());
        args.push(options.distro.clone());
    }
    if !options.release.is_empty() {
        args.push("--release".to_string());
        args.push(options.release.clone());
    }
    if !options.arch.is_empty() {
        args.push("--arch".to_string());
        args.push(options.arch.clone());
    }
    if options.flush_cache {
        args.push("--flush-cache".to_string());
    }
    if options.disable_gpg_validation {
        args.push("--no-validate".to_string());
    }
    args.extend(options.extra_args.iter().cloned());
    args
}

/// Parses `cpuacct.stat` contents (`user N` / `system N` lines, USER_HZ).
fn parse_cpuacct_stat(contents: &str) -> Option<CpuTimes> {
    let mut times = CpuTimes::default();
    let mut seen = 0;
    for line in contents.lines() {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("user"), Some(v)) => {
                times.user = v.parse().ok()?;
                seen += 1;
            }
            (Some("system"), Some(v)) => {
                times.system = v.parse().ok()?;
                seen += 1;
            }
            _ => {}
        }
    }
    (seen == 2).then_some(times)
}
