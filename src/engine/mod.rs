//! Engine adapters
//!
//! Every external tool sits behind `EngineAdapter`. The orchestrator is polymorphic
//! over this contract only; it never knows which concrete tool it is talking to and
//! never touches an adapter's incremental session.
//!
//! - **command**: adapter that shells out to a configured tool
//! - **diagnostics**: translation of native tool output into `Issue`s
//! - **session**: engine-owned incremental state keyed by a config fingerprint

pub mod command;
pub mod diagnostics;
pub mod session;

#[cfg(test)]
pub mod testing;

use crate::core::cancel::CancelScope;
use crate::core::config::GateConfig;
use crate::core::error::GateResult;
use crate::quality::{EngineKind, FixRecord, Issue, Severity};
use command::CommandEngine;
use serde::{Deserialize, Serialize};
use session::{Incremental, SessionStore, SessionUse};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Pipeline phase an engine invocation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
  Fix,
  Check,
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Phase::Fix => write!(f, "fix"),
      Phase::Check => write!(f, "check"),
    }
  }
}

/// What an adapter can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
  /// Engine can correct files in place
  pub fix: bool,
  /// Fix output says exactly which issues remain, so no re-check is needed
  pub precise_fix_reporting: bool,
}

impl Capabilities {
  pub fn check_only() -> Self {
    Self {
      fix: false,
      precise_fix_reporting: false,
    }
  }

  pub fn fixer(precise_fix_reporting: bool) -> Self {
    Self {
      fix: true,
      precise_fix_reporting,
    }
  }

  /// Whether the engine needs a check-phase slot after fixing
  pub fn needs_recheck(&self) -> bool {
    !self.fix || !self.precise_fix_reporting
  }
}

/// Output of one engine over one invocation
#[derive(Debug, Clone, Default)]
pub struct EngineResult {
  pub success: bool,
  pub issues: Vec<Issue>,
  pub duration: Duration,
  pub fixable: Option<bool>,
  pub fixed_count: usize,
  /// Files whose contents changed during a fix invocation
  pub modified_files: Vec<PathBuf>,
  /// What the fix invocation corrected
  pub fixed: Vec<FixRecord>,
  /// The invocation observed cancellation and stopped early
  pub partial: bool,
  pub session: SessionUse,
}

impl EngineResult {
  /// Completed result; successful when no error-level issue remains
  pub fn from_issues(issues: Vec<Issue>, duration: Duration) -> Self {
    let success = !issues.iter().any(|i| i.severity == Severity::Error);
    Self {
      success,
      issues,
      duration,
      ..Default::default()
    }
  }

  /// Result of an invocation that stopped at a cancellation checkpoint
  pub fn cancelled(issues: Vec<Issue>, duration: Duration) -> Self {
    Self {
      success: false,
      issues,
      duration,
      partial: true,
      ..Default::default()
    }
  }

  /// Fold a later batch's result for the same engine into this one
  pub fn absorb(&mut self, other: EngineResult) {
    self.success &= other.success;
    self.issues.extend(other.issues);
    self.duration += other.duration;
    self.fixable = match (self.fixable, other.fixable) {
      (Some(a), Some(b)) => Some(a || b),
      (a, b) => a.or(b),
    };
    self.fixed_count += other.fixed_count;
    self.modified_files.extend(other.modified_files);
    self.fixed.extend(other.fixed);
    self.partial |= other.partial;
    self.session = self.session.combine(other.session);
  }
}

/// Why an engine could not produce a result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
  /// The underlying tool is not installed or not runnable
  Unavailable { tool: String, reason: String },
  /// The tool ran but failed for reasons unrelated to missing tooling
  Failed { message: String },
}

impl EngineError {
  pub fn failed(message: impl Into<String>) -> Self {
    EngineError::Failed {
      message: message.into(),
    }
  }

  pub fn is_unavailable(&self) -> bool {
    matches!(self, EngineError::Unavailable { .. })
  }
}

impl fmt::Display for EngineError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EngineError::Unavailable { tool, reason } => write!(f, "{} is unavailable: {}", tool, reason),
      EngineError::Failed { message } => write!(f, "{}", message),
    }
  }
}

impl std::error::Error for EngineError {}

/// Uniform contract over check/fix tools
pub trait EngineAdapter: Send + Sync {
  fn kind(&self) -> EngineKind;

  /// Tool name for display
  fn tool(&self) -> &str;

  fn capabilities(&self) -> Capabilities;

  /// Whole-program engines are checked once over the full file set, never per batch
  fn incremental(&self) -> Incremental {
    Incremental::PerFile
  }

  /// Analyze files without modifying them
  fn check(&self, files: &[PathBuf], cancel: &CancelScope) -> Result<EngineResult, EngineError>;

  /// Correct files in place and report what changed.
  ///
  /// Only called when `capabilities().fix` is true.
  fn fix(&self, _files: &[PathBuf], _cancel: &CancelScope) -> Result<EngineResult, EngineError> {
    Err(EngineError::failed(format!("{} does not support fixing", self.tool())))
  }

  /// Cheap availability probe (used by `fixgate engines`)
  fn probe(&self) -> Result<(), EngineError> {
    Ok(())
  }
}

/// A result tagged with the engine and phase that produced it
#[derive(Debug, Clone)]
pub struct EngineRun {
  pub engine: EngineKind,
  pub phase: Phase,
  pub result: EngineResult,
}

/// Build adapters for every enabled engine in the configuration
pub fn build_engines(config: &GateConfig, workspace_root: &Path) -> GateResult<Vec<Arc<dyn EngineAdapter>>> {
  let store = config
    .run
    .cache_dir
    .as_ref()
    .map(|dir| SessionStore::new(workspace_root.join(dir)));

  let mut engines: Vec<Arc<dyn EngineAdapter>> = Vec::new();
  for engine in config.enabled_engines() {
    let adapter = CommandEngine::from_config(engine, workspace_root, store.clone())?;
    engines.push(Arc::new(adapter));
  }
  Ok(engines)
}
