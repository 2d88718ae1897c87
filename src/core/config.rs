use crate::core::error::{ConfigError, GateError, GateResult, ResultExt};
use crate::engine::command::FixReporting;
use crate::engine::diagnostics::DiagnosticFormat;
use crate::engine::session::Incremental;
use crate::quality::EngineKind;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for fixgate
/// Searched in order: fixgate.toml, .fixgate.toml, .config/fixgate.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
  #[serde(default)]
  pub run: RunConfig,
  #[serde(default)]
  pub batch: BatchConfig,
  #[serde(default)]
  pub memory: MemoryConfig,
  #[serde(default)]
  pub engines: Vec<EngineConfig>,
}

/// Run-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
  /// Global run timeout in milliseconds (0 = no timeout)
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,

  /// Stage files modified by fixers (default: true)
  #[serde(default = "default_true")]
  pub auto_stage: bool,

  /// Directory for persisted engine sessions (relative to the workspace root)
  #[serde(default)]
  pub cache_dir: Option<PathBuf>,

  /// Fraction of the remaining budget the fix phase may use (default: 0.6)
  #[serde(default = "default_fix_phase_share")]
  pub fix_phase_share: f64,
}

fn default_timeout_ms() -> u64 {
  10_000
}

fn default_true() -> bool {
  true
}

fn default_fix_phase_share() -> f64 {
  0.6
}

impl Default for RunConfig {
  fn default() -> Self {
    Self {
      timeout_ms: default_timeout_ms(),
      auto_stage: true,
      cache_dir: None,
      fix_phase_share: default_fix_phase_share(),
    }
  }
}

impl RunConfig {
  pub fn timeout(&self) -> Option<Duration> {
    (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
  }
}

/// Check-phase batching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
  /// Files per batch under normal pressure
  #[serde(default = "default_target_size")]
  pub target_size: usize,

  /// Smallest batch under critical pressure
  #[serde(default = "default_min_size")]
  pub min_size: usize,

  /// Upper bound for a single batch in milliseconds (unset = rest of the run budget)
  #[serde(default)]
  pub batch_timeout_ms: Option<u64>,

  /// When this close to the run deadline, shed deferrable files are omitted instead of re-queued
  #[serde(default = "default_imminent_ms")]
  pub imminent_ms: u64,
}

fn default_target_size() -> usize {
  50
}

fn default_min_size() -> usize {
  1
}

fn default_imminent_ms() -> u64 {
  250
}

impl Default for BatchConfig {
  fn default() -> Self {
    Self {
      target_size: default_target_size(),
      min_size: default_min_size(),
      batch_timeout_ms: None,
      imminent_ms: default_imminent_ms(),
    }
  }
}

/// Resource monitor thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
  /// Minimum time between two samples
  #[serde(default = "default_sample_interval_ms")]
  pub sample_interval_ms: u64,

  /// Number of samples in the rolling window
  #[serde(default = "default_window")]
  pub window: usize,

  /// Resident memory (MiB) at which pressure becomes elevated
  #[serde(default = "default_elevated_mb")]
  pub elevated_mb: u64,

  /// Resident memory (MiB) at which pressure becomes critical
  #[serde(default = "default_critical_mb")]
  pub critical_mb: u64,

  /// How far ahead the growth trend is projected
  #[serde(default = "default_horizon_ms")]
  pub horizon_ms: u64,
}

fn default_sample_interval_ms() -> u64 {
  25
}

fn default_window() -> usize {
  8
}

fn default_elevated_mb() -> u64 {
  1024
}

fn default_critical_mb() -> u64 {
  2048
}

fn default_horizon_ms() -> u64 {
  2_000
}

impl Default for MemoryConfig {
  fn default() -> Self {
    Self {
      sample_interval_ms: default_sample_interval_ms(),
      window: default_window(),
      elevated_mb: default_elevated_mb(),
      critical_mb: default_critical_mb(),
      horizon_ms: default_horizon_ms(),
    }
  }
}

/// One external tool wrapped as an engine
///
/// # Example
///
/// ```toml
/// [[engines]]
/// kind = "lint"
/// command = "eslint"
/// args = ["--format", "unix"]
/// fix_args = ["--fix", "--format", "unix"]
/// format = "unix"
/// fix_reporting = "remaining"
/// config_files = [".eslintrc.json"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
  pub kind: EngineKind,

  /// Executable to run (looked up on PATH)
  pub command: String,

  /// Arguments for check mode; file paths are appended
  #[serde(default)]
  pub args: Vec<String>,

  /// Arguments for fix mode; unset = engine cannot fix
  #[serde(default)]
  pub fix_args: Option<Vec<String>>,

  /// Native diagnostic format of the tool's stdout
  #[serde(default)]
  pub format: DiagnosticFormat,

  /// What the fix command reports back
  #[serde(default)]
  pub fix_reporting: FixReporting,

  /// Session reuse strategy (default: whole-program for type checkers, per-file otherwise)
  #[serde(default)]
  pub incremental: Option<Incremental>,

  /// Tool configuration files folded into the fingerprint
  #[serde(default)]
  pub config_files: Vec<PathBuf>,

  #[serde(default = "default_true")]
  pub enabled: bool,
}

impl EngineConfig {
  pub fn incremental(&self) -> Incremental {
    self.incremental.unwrap_or(match self.kind {
      EngineKind::TypeCheck => Incremental::WholeProgram,
      EngineKind::Lint | EngineKind::Format => Incremental::PerFile,
    })
  }

  /// Opaque cache key over this entry and the contents of its tool config files
  pub fn fingerprint(&self, workspace_root: &Path) -> GateResult<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(self)?);

    for file in &self.config_files {
      let path = workspace_root.join(file);
      hasher.update(path.to_string_lossy().as_bytes());
      match fs::read(&path) {
        Ok(bytes) => hasher.update(&bytes),
        Err(_) => hasher.update(b"<missing>"),
      }
    }

    Ok(format!("{:x}", hasher.finalize()))
  }
}

impl GateConfig {
  /// Find config file in search order: fixgate.toml, .fixgate.toml, .config/fixgate.toml
  pub fn find_config_path(path: &Path) -> Option<PathBuf> {
    let candidates = [
      path.join("fixgate.toml"),
      path.join(".fixgate.toml"),
      path.join(".config").join("fixgate.toml"),
    ];

    candidates.into_iter().find(|p| p.exists())
  }

  /// Load config (searches multiple locations)
  pub fn load(path: &Path) -> GateResult<Self> {
    let config_path = Self::find_config_path(path).ok_or_else(|| {
      GateError::Config(ConfigError::NotFound {
        workspace_root: path.to_path_buf(),
      })
    })?;

    let content = fs::read_to_string(&config_path)
      .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
    let config = Self::parse(&content).with_context(|| format!("Invalid config in {}", config_path.display()))?;

    Ok(config)
  }

  /// Parse and validate config text
  pub fn parse(content: &str) -> GateResult<Self> {
    let config: GateConfig = toml_edit::de::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  /// Enabled engines in declaration order
  pub fn enabled_engines(&self) -> impl Iterator<Item = &EngineConfig> {
    self.engines.iter().filter(|e| e.enabled)
  }

  pub fn validate(&self) -> GateResult<()> {
    let mut seen = HashSet::new();
    for engine in self.enabled_engines() {
      if !seen.insert(engine.kind) {
        return Err(GateError::Config(ConfigError::DuplicateEngine {
          kind: engine.kind.to_string(),
        }));
      }
      if engine.command.trim().is_empty() {
        return Err(invalid(format!("engines.{}.command", engine.kind), "must not be empty"));
      }
    }
    if seen.is_empty() {
      return Err(GateError::Config(ConfigError::NoEngines));
    }

    if self.batch.min_size == 0 {
      return Err(invalid("batch.min_size", "must be at least 1"));
    }
    if self.batch.target_size < self.batch.min_size {
      return Err(invalid("batch.target_size", "must not be smaller than batch.min_size"));
    }

    if self.memory.window < 2 {
      return Err(invalid("memory.window", "needs at least 2 samples to estimate a trend"));
    }
    if self.memory.elevated_mb >= self.memory.critical_mb {
      return Err(invalid("memory.elevated_mb", "must be below memory.critical_mb"));
    }

    if !(self.run.fix_phase_share > 0.0 && self.run.fix_phase_share <= 1.0) {
      return Err(invalid("run.fix_phase_share", "must be in (0, 1]"));
    }

    Ok(())
  }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> GateError {
  GateError::Config(ConfigError::InvalidValue {
    field: field.into(),
    reason: reason.into(),
  })
}
