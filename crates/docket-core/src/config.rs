use crate::paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Engine configuration, loaded from `.docket/config.toml`. Every field has
/// a default so a missing or partial file is fine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub complexity: ComplexityThresholds,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            complexity: ComplexityThresholds::default(),
            lock: LockConfig::default(),
            summary: SummaryConfig::default(),
        }
    }
}

/// Tunable thresholds for the complexity assessor. An item is flagged when
/// any limit is reached: subsystem or dependency counts at-or-above their
/// limit, effort strictly above the day limit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ComplexityThresholds {
    #[serde(default = "default_subsystem_limit")]
    pub subsystem_limit: usize,
    #[serde(default = "default_dependency_limit")]
    pub dependency_limit: usize,
    #[serde(default = "default_effort_limit_days")]
    pub effort_limit_days: u32,
}

impl Default for ComplexityThresholds {
    fn default() -> Self {
        Self {
            subsystem_limit: default_subsystem_limit(),
            dependency_limit: default_dependency_limit(),
            effort_limit_days: default_effort_limit_days(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_lock_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl LockConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    #[serde(default = "default_summary_file")]
    pub file_name: String,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            file_name: default_summary_file(),
        }
    }
}

const fn default_subsystem_limit() -> usize {
    3
}

const fn default_dependency_limit() -> usize {
    5
}

const fn default_effort_limit_days() -> u32 {
    7
}

const fn default_lock_timeout_ms() -> u64 {
    2_000
}

fn default_summary_file() -> String {
    "summary.md".to_string()
}

/// Load the project configuration, falling back to defaults when the file
/// does not exist.
pub fn load_config(root: &Path) -> Result<EngineConfig> {
    let path = paths::config_path(root);
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
}

/// Write the configuration back out as TOML.
pub fn save_config(root: &Path, config: &EngineConfig) -> Result<()> {
    let path = paths::config_path(root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let raw = toml::to_string_pretty(config).context("serialize config")?;
    std::fs::write(&path, raw).with_context(|| format!("write config {}", path.display()))
}
