//! Issue model shared by every engine
//!
//! An `Issue` is immutable once an adapter produces it. Identity for deduplication is
//! `(engine, file, line, col, rule_id)`; message text and severity do not participate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The closed set of engine kinds the orchestrator knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
  /// Type checker (whole-program analysis)
  TypeCheck,
  /// Style/rule linter
  Lint,
  /// Code formatter
  Format,
}

impl EngineKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      EngineKind::TypeCheck => "type-check",
      EngineKind::Lint => "lint",
      EngineKind::Format => "format",
    }
  }
}

impl fmt::Display for EngineKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Severity level for issues
///
/// Declaration order is the report order: errors first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  /// Error (must fix)
  Error,
  /// Warning (should fix, not blocking)
  Warning,
  /// Informational
  Info,
}

impl Severity {
  /// Parse the severity words tools commonly print
  pub fn parse(word: &str) -> Option<Self> {
    match word.trim().to_ascii_lowercase().as_str() {
      "error" | "fatal" | "err" => Some(Severity::Error),
      "warning" | "warn" => Some(Severity::Warning),
      "info" | "note" | "hint" | "suggestion" => Some(Severity::Info),
      _ => None,
    }
  }
}

impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Severity::Error => "error",
      Severity::Warning => "warning",
      Severity::Info => "info",
    };
    write!(f, "{}", s)
  }
}

/// A single finding from one engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
  pub engine: EngineKind,
  pub severity: Severity,
  /// Absolute path of the file the issue refers to
  pub file: PathBuf,
  pub line: u32,
  pub col: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub end_line: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub end_col: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub rule_id: Option<String>,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub suggestion: Option<String>,
}

/// Deduplication identity of an issue
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IssueKey {
  pub engine: EngineKind,
  pub file: PathBuf,
  pub line: u32,
  pub col: u32,
  pub rule_id: Option<String>,
}

impl Issue {
  pub fn new(
    engine: EngineKind,
    severity: Severity,
    file: impl Into<PathBuf>,
    line: u32,
    col: u32,
    message: impl Into<String>,
  ) -> Self {
    Self {
      engine,
      severity,
      file: file.into(),
      line,
      col,
      end_line: None,
      end_col: None,
      rule_id: None,
      message: message.into(),
      suggestion: None,
    }
  }

  /// Create an error-level issue
  pub fn error(engine: EngineKind, file: impl Into<PathBuf>, line: u32, col: u32, message: impl Into<String>) -> Self {
    Self::new(engine, Severity::Error, file, line, col, message)
  }

  /// Create a warning-level issue
  pub fn warning(engine: EngineKind, file: impl Into<PathBuf>, line: u32, col: u32, message: impl Into<String>) -> Self {
    Self::new(engine, Severity::Warning, file, line, col, message)
  }

  pub fn with_rule(mut self, rule_id: impl Into<String>) -> Self {
    self.rule_id = Some(rule_id.into());
    self
  }

  pub fn with_end(mut self, end_line: u32, end_col: u32) -> Self {
    self.end_line = Some(end_line);
    self.end_col = Some(end_col);
    self
  }

  pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
    self.suggestion = Some(suggestion.into());
    self
  }

  pub fn key(&self) -> IssueKey {
    IssueKey {
      engine: self.engine,
      file: self.file.clone(),
      line: self.line,
      col: self.col,
      rule_id: self.rule_id.clone(),
    }
  }
}

/// Record that an engine's fix run corrected something in a file
///
/// `rule_id: None` means the engine only knows the file changed, and every pre-fix
/// issue of that engine on that file is treated as fixed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixRecord {
  pub engine: EngineKind,
  pub file: PathBuf,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub rule_id: Option<String>,
}

impl FixRecord {
  pub fn rule(engine: EngineKind, file: impl Into<PathBuf>, rule_id: impl Into<String>) -> Self {
    Self {
      engine,
      file: file.into(),
      rule_id: Some(rule_id.into()),
    }
  }

  pub fn whole_file(engine: EngineKind, file: impl Into<PathBuf>) -> Self {
    Self {
      engine,
      file: file.into(),
      rule_id: None,
    }
  }

  /// Whether this record covers the given issue
  pub fn covers(&self, issue: &Issue) -> bool {
    if self.engine != issue.engine || self.file != issue.file {
      return false;
    }
    match &self.rule_id {
      None => true,
      Some(rule) => issue.rule_id.as_deref() == Some(rule.as_str()),
    }
  }
}
