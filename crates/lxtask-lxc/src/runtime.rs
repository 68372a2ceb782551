//! Runtime capability: creating container handles and enumerating the
//! containers known at a configuration root.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lxtask_common::constants::DEFAULT_LXC_PATH;
use lxtask_common::error::Result;

use crate::command;
use crate::container::{CliContainer, LxcContainer};

/// Entry point into the LXC runtime installed on the node.
pub trait LxcRuntime: Send + Sync {
    /// Returns the runtime's default configuration root.
    fn default_config_path(&self) -> PathBuf;

    /// Returns a handle for the named container under `config_path`.
    /// The container need not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if a handle cannot be constructed.
    fn container(&self, name: &str, config_path: &Path) -> Result<Arc<dyn LxcContainer>>;

    /// Enumerates the containers defined under `config_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    fn containers(&self, config_path: &Path) -> Result<Vec<Arc<dyn LxcContainer>>>;

    /// Returns the installed runtime version, if one can be detected.
    fn version(&self) -> Option<String>;

    /// Returns whether the runtime is operational on this node.
    fn is_available(&self) -> bool;
}

/// Runtime implementation backed by the `lxc-*` command-line tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct CliRuntime;

impl LxcRuntime for CliRuntime {
    fn default_config_path(&self) -> PathBuf {
        PathBuf::from(DEFAULT_LXC_PATH)
    }

    fn container(&self, name: &str, config_path: &Path) -> Result<Arc<dyn LxcContainer>> {
        Ok(Arc::new(CliContainer::new(name, config_path)))
    }

    fn containers(&self, config_path: &Path) -> Result<Vec<Arc<dyn LxcContainer>>> {
        let path = config_path.display().to_string();
        let listing = command::run("lxc-ls", &["-P", &path, "-1"])?;
        Ok(listing
            .lines()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| Arc::new(CliContainer::new(name, config_path)) as Arc<dyn LxcContainer>)
            .collect())
    }

    fn version(&self) -> Option<String> {
        let output = command::run("lxc-start", &["--version"]).ok()?;
        let version = output.trim();
        (!version.is_empty()).then(|| version.to_string())
    }

    fn is_available(&self) -> bool {
        which::which("lxc-start").is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_path_is_system_lxc_root() {
        assert_eq!(
            CliRuntime.default_config_path(),
            PathBuf::from("/var/lib/lxc")
        );
    }

    #[test]
    fn container_handle_carries_name_and_path() {
        let c = CliRuntime
            .container("web-alloc1", Path::new("/var/lib/lxc"))
            .expect("container handle");
        assert_eq!(c.name(), "web-alloc1");
        assert_eq!(c.config_path(), Path::new("/var/lib/lxc"));
    }
}
