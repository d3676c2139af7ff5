//! Base-directory resolution, well-known paths, and the user
//! configuration file.
//!
//! Everything lives under one base directory (`~/.config/cmdhist` on
//! Linux), resolvable explicitly so sub-commands thread a
//! [`ConfigStore`] instead of consulting process-wide state:
//!
//! ```text
//! <base>/config.toml           user configuration
//! <base>/daemon.pid            PID of the running daemon
//! <base>/daemon.log            daemon log
//! <base>/data/db.sqlite        indexed store
//! <base>/data/record/command/  raw command records
//! <base>/data/record/init/     raw session-start records
//! <base>/data/record/exit/     raw session-end records
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Daemon log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Critical,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    /// Equivalent `tracing` filter directive. `critical` has no direct
    /// counterpart and maps to `error`.
    #[must_use]
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Critical | Self::Error => "error",
            Self::Warning => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

/// Targets of the `locate` sub-command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LocateTarget {
    Base,
    Config,
    Db,
    #[value(name = "daemon_pid")]
    DaemonPid,
    #[value(name = "daemon_log")]
    DaemonLog,
}

/// Resolved filesystem layout for one cmdhist installation.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    base: PathBuf,
}

impl ConfigStore {
    /// Resolve the base directory: explicit flag, then `CMDHIST_HOME`,
    /// then the platform user-config directory.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(base) = explicit {
            return Ok(Self { base: base.to_path_buf() });
        }
        if let Ok(home) = std::env::var("CMDHIST_HOME") {
            if !home.trim().is_empty() {
                return Ok(Self { base: PathBuf::from(home) });
            }
        }
        directories::ProjectDirs::from("", "", "cmdhist")
            .map(|dirs| Self { base: dirs.config_dir().to_path_buf() })
            .ok_or_else(|| {
                Error::Config("could not determine the user config directory".to_string())
            })
    }

    /// Build a store rooted at an explicit directory (tests).
    #[must_use]
    pub fn at(base: PathBuf) -> Self {
        Self { base }
    }

    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base
    }

    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.base.join("config.toml")
    }

    #[must_use]
    pub fn daemon_pid_path(&self) -> PathBuf {
        self.base.join("daemon.pid")
    }

    #[must_use]
    pub fn daemon_log_path(&self) -> PathBuf {
        self.base.join("daemon.log")
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.base.join("data").join("db.sqlite")
    }

    #[must_use]
    pub fn record_path(&self) -> PathBuf {
        self.base.join("data").join("record")
    }

    /// Path for the `locate` sub-command.
    #[must_use]
    pub fn locate(&self, target: LocateTarget) -> PathBuf {
        match target {
            LocateTarget::Base => self.base.clone(),
            LocateTarget::Config => self.config_path(),
            LocateTarget::Db => self.db_path(),
            LocateTarget::DaemonPid => self.daemon_pid_path(),
            LocateTarget::DaemonLog => self.daemon_log_path(),
        }
    }

    /// Create the record tree (and with it the base directory).
    pub fn ensure_layout(&self) -> Result<()> {
        let record = self.record_path();
        for kind in ["command", "init", "exit"] {
            std::fs::create_dir_all(record.join(kind))?;
        }
        Ok(())
    }

    /// Load `config.toml`; a missing file yields the defaults.
    pub fn load_config(&self) -> Result<Config> {
        Config::load(&self.config_path())
    }
}

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub isearch: IsearchConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    /// Pattern word -> search flag tokens, applied by the query
    /// pre-processor.
    #[serde(default)]
    pub alias: HashMap<String, Vec<String>>,
    #[serde(default = "default_limit")]
    pub default_limit: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            alias: HashMap::new(),
            default_limit: default_limit(),
        }
    }
}

const fn default_limit() -> i64 {
    10
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    pub log_level: Option<LogLevel>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IsearchConfig {
    /// External interactive filter fed with candidate commands.
    #[serde(default = "default_isearch_program")]
    pub program: String,
    #[serde(default)]
    pub program_args: Vec<String>,
    /// Search tokens always passed to the candidate query.
    #[serde(default)]
    pub base_query: Vec<String>,
}

impl Default for IsearchConfig {
    fn default() -> Self {
        Self {
            program: default_isearch_program(),
            program_args: Vec::new(),
            base_query: Vec::new(),
        }
    }
}

fn default_isearch_program() -> String {
    "percol".to_string()
}

impl Config {
    /// Read a config file. Missing file = defaults; malformed file is a
    /// configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => toml::from_str(&text)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}
