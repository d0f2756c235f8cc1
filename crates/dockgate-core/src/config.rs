use crate::error::Result;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// RuntimeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Container runtime binary, resolved on PATH.
    #[serde(default = "default_program")]
    pub program: String,
    /// Working directory for runtime calls, relative to the project root.
    #[serde(default = "default_dot")]
    pub workdir: PathBuf,
}

fn default_program() -> String {
    "docker".to_string()
}

fn default_dot() -> PathBuf {
    PathBuf::from(".")
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            workdir: default_dot(),
        }
    }
}

// ---------------------------------------------------------------------------
// TimeoutConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Limit for safe-retry (read-only) actions.
    #[serde(default = "default_read_secs")]
    pub read_secs: u64,
    /// Limit for create and destructive actions.
    #[serde(default = "default_mutating_secs")]
    pub mutating_secs: u64,
}

fn default_read_secs() -> u64 {
    5
}

fn default_mutating_secs() -> u64 {
    30
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_secs: default_read_secs(),
            mutating_secs: default_mutating_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn mutating(&self) -> Duration {
        Duration::from_secs(self.mutating_secs)
    }
}

// ---------------------------------------------------------------------------
// AuditConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_path")]
    pub path: PathBuf,
    /// When false the log lives in memory only.
    #[serde(default = "default_persist")]
    pub persist: bool,
}

fn default_audit_path() -> PathBuf {
    PathBuf::from(paths::AUDIT_FILE)
}

fn default_persist() -> bool {
    true
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: default_audit_path(),
            persist: default_persist(),
        }
    }
}

// ---------------------------------------------------------------------------
// ScaffoldConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaffoldConfig {
    /// Where CreateApp writes files; also the BuildImage context.
    #[serde(default = "default_dot")]
    pub dir: PathBuf,
}

impl Default for ScaffoldConfig {
    fn default() -> Self {
        Self { dir: default_dot() }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub scaffold: ScaffoldConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            runtime: RuntimeConfig::default(),
            timeouts: TimeoutConfig::default(),
            audit: AuditConfig::default(),
            scaffold: ScaffoldConfig::default(),
        }
    }
}

impl Config {
    /// Load `.dockgate/config.yaml`, falling back to defaults when absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn audit_path(&self, root: &Path) -> PathBuf {
        paths::resolve(root, &self.audit.path)
    }

    pub fn scaffold_dir(&self, root: &Path) -> PathBuf {
        paths::resolve(root, &self.scaffold.dir)
    }

    pub fn workdir(&self, root: &Path) -> PathBuf {
        paths::resolve(root, &self.runtime.workdir)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.runtime.program.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "runtime.program is empty".to_string(),
            });
        }

        if self.timeouts.read_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "timeouts.read_secs is 0; every list would time out".to_string(),
            });
        }

        if self.timeouts.mutating_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "timeouts.mutating_secs is 0; every mutating action would time out"
                    .to_string(),
            });
        }

        if self.timeouts.read_secs > self.timeouts.mutating_secs {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "timeouts.read_secs ({}) exceeds timeouts.mutating_secs ({})",
                    self.timeouts.read_secs, self.timeouts.mutating_secs
                ),
            });
        }

        if self.scaffold.dir != self.runtime.workdir {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "scaffold.dir ({}) differs from runtime.workdir ({}); BuildImage will not see CreateApp output",
                    self.scaffold.dir.display(),
                    self.runtime.workdir.display()
                ),
            });
        }

        if !self.audit.persist {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "audit.persist is false; the audit trail is lost on exit".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
