//! TOML-based configuration for the embedding engine.
//!
//! Reads and writes `EngineConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\TabHost\config.toml`
//! - Linux:    `~/.config/tabhost/config.toml`
//! - macOS:    `~/Library/Application Support/TabHost/config.toml`
//!
//! The tracked-process ledger lives next to it (see
//! [`EngineConfig::tracker_path`]).
//!
//! # Example file
//!
//! ```toml
//! [engine]
//! log_level = "debug"
//! ignore_window_ms = 120
//!
//! [layout]
//! true_child_classes = ["ConsoleWindowClass"]
//! compensation_y = -1
//!
//! [policy]
//! hide_guests_from_taskbar = true
//! close_behavior = "release_to_desktop"
//! ```
//!
//! Every section and every field is optional; missing values fall back to the
//! `default_*` helpers below, so an empty file is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tabhost_core::CloseBehavior;
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level engine configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub layout: LayoutSection,
    #[serde(default)]
    pub policy: PolicySection,
    #[serde(default)]
    pub suppression: SuppressionSection,
    #[serde(default)]
    pub detection: DetectionSection,
    #[serde(default)]
    pub lifecycle: LifecycleSection,
}

/// General engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSection {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// How long self-induced guest geometry events are ignored after the
    /// engine moves a guest.
    #[serde(default = "default_ignore_window_ms")]
    pub ignore_window_ms: u64,
}

/// Guest placement settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayoutSection {
    /// Window classes hosted as true children of the content window.
    #[serde(default = "default_true_child_classes")]
    pub true_child_classes: Vec<String>,
    /// Vertical offset applied to true-child guests.
    #[serde(default = "default_compensation_y")]
    pub compensation_y: i32,
    /// Extra height added above a true-child guest.
    #[serde(default = "default_compensation_edge")]
    pub compensation_top: i32,
    /// Extra height added below a true-child guest.
    #[serde(default = "default_compensation_edge")]
    pub compensation_bottom: i32,
}

/// User-facing behaviour policies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicySection {
    #[serde(default = "default_true")]
    pub hide_guests_from_taskbar: bool,
    #[serde(default)]
    pub close_behavior: CloseBehavior,
}

/// Candidate suppression after a release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuppressionSection {
    #[serde(default = "default_release_suppression_ms")]
    pub release_suppression_ms: u64,
    /// Number of entries above which every insert triggers a full sweep.
    #[serde(default = "default_sweep_threshold")]
    pub sweep_threshold: usize,
}

/// Filters applied before a new top-level window is offered for embedding.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DetectionSection {
    /// Executable names (case-insensitive), e.g. `"explorer.exe"`.
    #[serde(default)]
    pub excluded_processes: Vec<String>,
    /// Window class names never offered.
    #[serde(default)]
    pub excluded_classes: Vec<String>,
}

/// Guest process lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LifecycleSection {
    /// How long a closing guest may take before it is killed.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// Poll interval while waiting for guests to exit.
    #[serde(default = "default_poll_interval_ms")]
    pub exit_poll_interval_ms: u64,
    /// Attempts made while waiting for a launched program's first window.
    #[serde(default = "default_window_wait_attempts")]
    pub window_wait_attempts: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub window_wait_interval_ms: u64,
    /// Start-time difference beyond which a ledger entry is a reused pid.
    #[serde(default = "default_start_time_tolerance_ms")]
    pub start_time_tolerance_ms: u64,
    /// File name of the tracked-process ledger inside the config directory.
    #[serde(default = "default_tracker_file")]
    pub tracker_file: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_ignore_window_ms() -> u64 {
    120
}
fn default_true_child_classes() -> Vec<String> {
    vec!["ConsoleWindowClass".to_string()]
}
fn default_compensation_y() -> i32 {
    -1
}
fn default_compensation_edge() -> i32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_release_suppression_ms() -> u64 {
    2_000
}
fn default_sweep_threshold() -> usize {
    tabhost_core::domain::suppression::DEFAULT_SWEEP_THRESHOLD
}
fn default_shutdown_timeout_ms() -> u64 {
    5_000
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_window_wait_attempts() -> u32 {
    50
}
fn default_start_time_tolerance_ms() -> u64 {
    1_000
}
fn default_tracker_file() -> String {
    "tracked_processes.json".to_string()
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            ignore_window_ms: default_ignore_window_ms(),
        }
    }
}

impl Default for LayoutSection {
    fn default() -> Self {
        Self {
            true_child_classes: default_true_child_classes(),
            compensation_y: default_compensation_y(),
            compensation_top: default_compensation_edge(),
            compensation_bottom: default_compensation_edge(),
        }
    }
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            hide_guests_from_taskbar: default_true(),
            close_behavior: CloseBehavior::default(),
        }
    }
}

impl Default for SuppressionSection {
    fn default() -> Self {
        Self {
            release_suppression_ms: default_release_suppression_ms(),
            sweep_threshold: default_sweep_threshold(),
        }
    }
}

impl Default for LifecycleSection {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            exit_poll_interval_ms: default_poll_interval_ms(),
            window_wait_attempts: default_window_wait_attempts(),
            window_wait_interval_ms: default_poll_interval_ms(),
            start_time_tolerance_ms: default_start_time_tolerance_ms(),
            tracker_file: default_tracker_file(),
        }
    }
}

impl EngineConfig {
    /// Path of the tracked-process ledger inside `dir`.
    pub fn tracker_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.lifecycle.tracker_file)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `EngineConfig` from the platform config file, returning the defaults
/// if the file does not yet exist.
pub fn load_config() -> Result<EngineConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `EngineConfig` from an explicit path.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<EngineConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(EngineConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to the platform config file.
pub fn save_config(config: &EngineConfig) -> Result<(), ConfigError> {
    save_config_to(&config_file_path()?, config)
}

/// Persists `config` to `path`, creating the parent directory if needed.
pub fn save_config_to(path: &Path, config: &EngineConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config directory including the `TabHost` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("TabHost"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("tabhost"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("TabHost")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
