//! Configuration primitives for a profilebase workspace.
//!
//! Stored in a machine-readable TOML file located at:
//!   %APPDATA%/ProfileBase/config/config.toml on Windows
//!   $XDG_DATA_HOME/ProfileBase/config/config.toml on Linux
//!   ~/Library/Application Support/ProfileBase/config/config.toml on macOS
//!
//! Besides user-facing knobs the file carries one piece of runtime state: the
//! decision to stop trying the structured record store after it failed to come
//! up in time.

use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::records::DEFAULT_MAX_ATTEMPTS;

/// Environment variable that overrides the workspace root.
pub const HOME_ENV_VAR: &str = "PROFILEBASE_HOME";

/// Standard relative path to the config file.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Root configuration persisted per workspace.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppConfig {
    /// Record store acquisition (timeouts, persisted fallback decision).
    #[serde(default)]
    pub storage: StorageSettings,
    /// Enrichment queue retry policy.
    #[serde(default)]
    pub queue: QueueSettings,
    /// Per page-context runtime toggles.
    #[serde(default)]
    pub pages: PageSettingsTable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageSettings {
    /// How long to wait for the structured backend before falling back.
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,
    /// Set once the structured backend has failed to initialize; later
    /// startups go straight to the fallback until it is reset.
    #[serde(default)]
    pub fallback_locked: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            init_timeout_ms: default_init_timeout_ms(),
            fallback_locked: false,
        }
    }
}

impl StorageSettings {
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms.max(1))
    }
}

const fn default_init_timeout_ms() -> u64 {
    3_000
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueSettings {
    /// Failed enrichment attempts allowed per record.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Sweep the queue again over items that failed, until each hits
    /// `max_attempts`.
    #[serde(default = "default_retry_failed_items")]
    pub retry_failed_items: bool,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_failed_items: default_retry_failed_items(),
        }
    }
}

const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

const fn default_retry_failed_items() -> bool {
    true
}

/// Page context the runtime is operating in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageContext {
    /// A single profile page (enrichment).
    Profile,
    /// A list of accounts (collection of sightings).
    List,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PageSettingsTable {
    #[serde(default)]
    pub profile: PageSettings,
    #[serde(default)]
    pub list: PageSettings,
}

impl PageSettingsTable {
    pub fn for_context(&self, context: PageContext) -> &PageSettings {
        match context {
            PageContext::Profile => &self.profile,
            PageContext::List => &self.list,
        }
    }

    pub fn debug_mode(&self) -> bool {
        self.profile.debug_mode || self.list.debug_mode
    }
}

/// Runtime toggles consumed by the collector and the enrichment driver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageSettings {
    /// Keep stepping the queue after each completed enrichment.
    #[serde(default = "default_true")]
    pub auto_advance: bool,
    /// Write sightings to the store immediately instead of buffering.
    #[serde(default = "default_true")]
    pub auto_save: bool,
    /// Keep recent posts returned by the extractor.
    #[serde(default = "default_true")]
    pub collect_posts: bool,
    #[serde(default = "default_max_posts")]
    pub max_posts: usize,
    /// Raises the default log level to `debug`.
    #[serde(default)]
    pub debug_mode: bool,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            auto_advance: default_true(),
            auto_save: default_true(),
            collect_posts: default_true(),
            max_posts: default_max_posts(),
            debug_mode: false,
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_max_posts() -> usize {
    12
}

impl AppConfig {
    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.pages.debug_mode() {
            "debug"
        } else {
            "warn"
        }
    }
}

/// Returns the root directory where profilebase stores data.
///
/// Order of precedence:
/// 1. `PROFILEBASE_HOME` environment variable.
/// 2. OS-specific data directory via `directories::BaseDirs`.
pub fn workspace_root() -> Result<PathBuf> {
    if let Ok(path) = env::var(HOME_ENV_VAR) {
        return Ok(PathBuf::from(path));
    }
    let base_dirs = BaseDirs::new().context("Unable to determine OS data directory")?;
    Ok(base_dirs.data_dir().join("ProfileBase"))
}

/// Path to the config file under a workspace root.
pub fn config_file_path(root: &Path) -> PathBuf {
    root.join("config").join(CONFIG_FILE_NAME)
}

/// Loads the configuration from disk or returns defaults.
pub fn load_or_default(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let cfg: AppConfig = toml::from_str(&data)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        Ok(cfg)
    } else {
        Ok(AppConfig::default())
    }
}

/// Persists the configuration to disk.
pub fn save(path: &Path, config: &AppConfig) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let data = toml::to_string_pretty(config)?;
    fs::write(path, data).with_context(|| format!("Failed to write config file {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn partial_files_fill_in_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = config_file_path(tmp.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            "[storage]\nfallback_locked = true\n\n[pages.list]\nauto_save = false\n",
        )
        .unwrap();

        let cfg = load_or_default(&path).unwrap();
        assert!(cfg.storage.fallback_locked);
        assert_eq!(cfg.storage.init_timeout_ms, 3_000);
        assert_eq!(cfg.queue.max_attempts, 3);
        assert!(!cfg.pages.list.auto_save);
        assert!(cfg.pages.profile.auto_save);
        assert_eq!(cfg.pages.for_context(PageContext::List).max_posts, 12);
    }

    #[test]
    fn save_then_load_preserves_values() {
        let tmp = TempDir::new().unwrap();
        let path = config_file_path(tmp.path());
        let mut cfg = AppConfig::default();
        cfg.queue.retry_failed_items = false;
        cfg.pages.profile.max_posts = 3;
        save(&path, &cfg).unwrap();
        assert_eq!(load_or_default(&path).unwrap(), cfg);
    }

    #[test]
    fn debug_mode_in_either_context_raises_log_level() {
        let mut cfg = AppConfig::default();
        assert_eq!(cfg.log_filter(), "warn");
        cfg.pages.list.debug_mode = true;
        assert_eq!(cfg.log_filter(), "debug");

        let parsed: AppConfig = toml::from_str("[pages.profile]\ndebug_mode = true\n").unwrap();
        assert!(parsed.pages.debug_mode());
        assert_eq!(parsed.log_filter(), "debug");
    }
}
