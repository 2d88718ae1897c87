//! Scripted engine for pipeline tests

use super::session::Incremental;
use super::{Capabilities, EngineAdapter, EngineError, EngineResult, Phase};
use crate::core::cancel::CancelScope;
use crate::quality::{EngineKind, FixRecord, Issue};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared log of `(engine, phase, file count)` across every mock in a test
pub type CallLog = Arc<Mutex<Vec<(EngineKind, Phase, usize)>>>;

pub fn call_log() -> CallLog {
  Arc::new(Mutex::new(Vec::new()))
}

pub struct MockEngine {
  kind: EngineKind,
  capabilities: Capabilities,
  incremental: Incremental,
  log: CallLog,
  check_issues: Vec<Issue>,
  fix_issues: Vec<Issue>,
  fixed: Vec<FixRecord>,
  modified: Vec<PathBuf>,
  delay: Duration,
  error: Option<EngineError>,
}

impl MockEngine {
  pub fn new(kind: EngineKind, log: &CallLog) -> Self {
    Self {
      kind,
      capabilities: Capabilities::check_only(),
      incremental: Incremental::PerFile,
      log: log.clone(),
      check_issues: Vec::new(),
      fix_issues: Vec::new(),
      fixed: Vec::new(),
      modified: Vec::new(),
      delay: Duration::ZERO,
      error: None,
    }
  }

  pub fn fixer(mut self, precise: bool) -> Self {
    self.capabilities = Capabilities::fixer(precise);
    self
  }

  pub fn whole_program(mut self) -> Self {
    self.incremental = Incremental::WholeProgram;
    self
  }

  /// Issues reported by `check`, limited to the files each call receives
  pub fn check_issues(mut self, issues: Vec<Issue>) -> Self {
    self.check_issues = issues;
    self
  }

  /// Issues reported by `fix`, limited to the files it receives
  pub fn fix_issues(mut self, issues: Vec<Issue>) -> Self {
    self.fix_issues = issues;
    self
  }

  pub fn fixes(mut self, fixed: Vec<FixRecord>, modified: Vec<PathBuf>) -> Self {
    self.fixed = fixed;
    self.modified = modified;
    self
  }

  /// Work for this long per call, waking early on cancellation
  pub fn delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  pub fn unavailable(mut self) -> Self {
    self.error = Some(EngineError::Unavailable {
      tool: format!("mock-{}", self.kind),
      reason: "not installed".to_string(),
    });
    self
  }

  pub fn failing(mut self, message: &str) -> Self {
    self.error = Some(EngineError::failed(message));
    self
  }

  pub fn build(self) -> Arc<dyn EngineAdapter> {
    Arc::new(self)
  }

  fn respond(&self, phase: Phase, files: &[PathBuf], cancel: &CancelScope) -> Result<EngineResult, EngineError> {
    self
      .log
      .lock()
      .unwrap()
      .push((self.kind, phase, files.len()));

    if let Some(err) = &self.error {
      return Err(err.clone());
    }

    let source = match phase {
      Phase::Fix => &self.fix_issues,
      Phase::Check => &self.check_issues,
    };
    let issues: Vec<Issue> = source.iter().filter(|i| files.contains(&i.file)).cloned().collect();

    let modified: Vec<PathBuf> = match phase {
      Phase::Fix => self.modified.iter().filter(|f| files.contains(f)).cloned().collect(),
      Phase::Check => Vec::new(),
    };

    if !self.delay.is_zero() && !cancel.sleep(self.delay) {
      // Interrupted fixers may already have rewritten files
      let mut result = EngineResult::cancelled(issues, self.delay);
      result.modified_files = modified;
      return Ok(result);
    }

    let mut result = EngineResult::from_issues(issues, Duration::from_millis(1));
    if phase == Phase::Fix {
      result.fixable = Some(true);
      result.fixed = self.fixed.iter().filter(|f| files.contains(&f.file)).cloned().collect();
      result.modified_files = modified;
      result.fixed_count = result.fixed.len();
    }
    Ok(result)
  }
}

impl EngineAdapter for MockEngine {
  fn kind(&self) -> EngineKind {
    self.kind
  }

  fn tool(&self) -> &str {
    "mock"
  }

  fn capabilities(&self) -> Capabilities {
    self.capabilities
  }

  fn incremental(&self) -> Incremental {
    self.incremental
  }

  fn check(&self, files: &[PathBuf], cancel: &CancelScope) -> Result<EngineResult, EngineError> {
    self.respond(Phase::Check, files, cancel)
  }

  fn fix(&self, files: &[PathBuf], cancel: &CancelScope) -> Result<EngineResult, EngineError> {
    self.respond(Phase::Fix, files, cancel)
  }

  fn probe(&self) -> Result<(), EngineError> {
    match &self.error {
      Some(err) if err.is_unavailable() => Err(err.clone()),
      _ => Ok(()),
    }
  }
}
