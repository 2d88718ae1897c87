//! Final report of a run
//!
//! `QualityCheckResult` is the only object that leaves the pipeline. Renderers (the
//! CLI's human and JSON output, hooks, editors) consume it and nothing else.

use crate::core::error::GateResult;
use crate::engine::Phase;
use crate::engine::session::SessionUse;
use crate::pipeline::PipelineState;
use crate::pipeline::monitor::PressureLevel;
use crate::pipeline::staging::StagingWarning;
use crate::quality::{EngineKind, Issue, Summary};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

/// Identifier tying a run's report to its log lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
  /// Derive an id from the run's start time, process and inputs
  pub fn for_run(timestamp: DateTime<Utc>, pid: u32, files: &[PathBuf]) -> Self {
    let mut hasher = Sha256::new();
    hasher.update(timestamp.to_rfc3339().as_bytes());
    hasher.update(pid.to_le_bytes());
    for file in files {
      hasher.update(file.to_string_lossy().as_bytes());
      hasher.update([0]);
    }
    let digest = format!("{:x}", hasher.finalize());
    Self(digest[..12].to_string())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CorrelationId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Timing and reuse for one engine in one phase
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineMetrics {
  pub engine: EngineKind,
  pub phase: Phase,
  pub duration_ms: u64,
  pub issue_count: usize,
  pub session: SessionUse,
  pub partial: bool,
}

/// Observability block attached to the report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfMetrics {
  pub timestamp: DateTime<Utc>,
  /// Caller's hint that engine sessions were expected to be warm
  pub warm_run: bool,
  /// Every engine invocation reused its session completely
  pub all_warm: bool,
  pub batches: usize,
  pub peak_pressure: PressureLevel,
  pub engines: Vec<EngineMetrics>,
}

/// An engine that was skipped because its tool is missing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnavailableEngine {
  pub engine: EngineKind,
  pub tool: String,
  pub reason: String,
}

/// An engine that ran and failed; its results were discarded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineFailure {
  pub engine: EngineKind,
  pub phase: Phase,
  pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityCheckResult {
  pub success: bool,
  pub duration_ms: u64,
  /// Post-filter issues in report order
  pub issues: Vec<Issue>,
  pub summary: Summary,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub metrics: Option<PerfMetrics>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub correlation_id: Option<CorrelationId>,
  /// Terminal pipeline state (`done` or `cancelled`)
  pub state: PipelineState,
  /// At least one engine was unavailable and the run continued without it
  pub degraded: bool,
  /// Some engine result stopped early at a deadline
  pub partial: bool,
  pub fixed_count: usize,
  pub unavailable_engines: Vec<UnavailableEngine>,
  pub failed_engines: Vec<EngineFailure>,
  pub staged_files: Vec<PathBuf>,
  pub staging_warnings: Vec<StagingWarning>,
  /// Files dropped under memory pressure with the deadline imminent
  pub omitted_files: Vec<PathBuf>,
}

impl QualityCheckResult {
  pub fn is_cancelled(&self) -> bool {
    self.state == PipelineState::Cancelled
  }

  pub fn to_json(&self) -> GateResult<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }
}
