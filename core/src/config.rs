//! `$RUNPAD_HOME/config.toml` plus command line overrides.

use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::control_block::DEFAULT_BLOCK_SIZE;
use crate::control_block::MIN_BLOCK_SIZE;
use crate::error::Result;
use crate::error::RunpadError;

pub use crate::input_protocol::OverflowPolicy;

pub const CONFIG_TOML_FILE: &str = "config.toml";

/// Upper bound for `control_block_bytes`.
pub const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunpadConfig {
    /// Total size of the per-session control block, header included.
    pub control_block_bytes: usize,
    pub overflow_policy: OverflowPolicy,
    /// Clear the console when a run starts.
    pub clear_on_start: bool,
    /// Echo submitted input lines to the display.
    pub echo_input: bool,
    /// Stack size for worker threads. Platform default when unset.
    pub worker_stack_bytes: Option<usize>,
}

impl Default for RunpadConfig {
    fn default() -> Self {
        Self {
            control_block_bytes: DEFAULT_BLOCK_SIZE,
            overflow_policy: OverflowPolicy::default(),
            clear_on_start: true,
            echo_input: true,
            worker_stack_bytes: None,
        }
    }
}

/// Optional values that take precedence over the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub control_block_bytes: Option<usize>,
    pub overflow_policy: Option<OverflowPolicy>,
    pub clear_on_start: Option<bool>,
    pub echo_input: Option<bool>,
    pub worker_stack_bytes: Option<usize>,
}

impl RunpadConfig {
    /// Loads `config.toml` from `runpad_home`, applies `overrides`, and
    /// validates the result. A missing file yields the defaults.
    pub fn load_from_home(runpad_home: &Path, overrides: ConfigOverrides) -> Result<Self> {
        let path = runpad_home.join(CONFIG_TOML_FILE);
        let base = match std::fs::read_to_string(&path) {
            Ok(contents) => Self::parse(&contents, &path)?,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            Err(err) => return Err(RunpadError::config_io(path, err)),
        };
        base.with_overrides(overrides)
    }

    pub fn load_from_str(contents: &str, overrides: ConfigOverrides) -> Result<Self> {
        Self::parse(contents, Path::new(CONFIG_TOML_FILE))?.with_overrides(overrides)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self> {
        toml::from_str(contents).map_err(|source| RunpadError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    fn with_overrides(mut self, overrides: ConfigOverrides) -> Result<Self> {
        let ConfigOverrides {
            control_block_bytes,
            overflow_policy,
            clear_on_start,
            echo_input,
            worker_stack_bytes,
        } = overrides;
        if let Some(bytes) = control_block_bytes {
            self.control_block_bytes = bytes;
        }
        if let Some(policy) = overflow_policy {
            self.overflow_policy = policy;
        }
        if let Some(clear) = clear_on_start {
            self.clear_on_start = clear;
        }
        if let Some(echo) = echo_input {
            self.echo_input = echo;
        }
        if worker_stack_bytes.is_some() {
            self.worker_stack_bytes = worker_stack_bytes;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.control_block_bytes) {
            return Err(RunpadError::InvalidConfig(format!(
                "control_block_bytes must be between {MIN_BLOCK_SIZE} and {MAX_BLOCK_SIZE}, got {}",
                self.control_block_bytes
            )));
        }
        if self.worker_stack_bytes == Some(0) {
            return Err(RunpadError::InvalidConfig(
                "worker_stack_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Returns the runpad home directory: `$RUNPAD_HOME` when set and non-empty,
/// `~/.runpad` otherwise. The directory is not required to exist.
pub fn find_runpad_home() -> std::io::Result<PathBuf> {
    if let Some(home) = std::env::var_os("RUNPAD_HOME").filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    let mut home = dirs::home_dir().ok_or_else(|| {
        std::io::Error::new(ErrorKind::NotFound, "could not determine home directory")
    })?;
    home.push(".runpad");
    Ok(home)
}
