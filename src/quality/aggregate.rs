//! Result Aggregator
//!
//! Merges phase-tagged engine results into one ordered issue list. The aggregator is
//! pure: the same runs in any order produce the same output.

use crate::engine::{EngineRun, Phase};
use crate::quality::{EngineKind, FixRecord, Issue, IssueKey, Severity};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

/// Counts over the final issue list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
  pub total: usize,
  pub errors: usize,
  pub warnings: usize,
  pub info: usize,
  pub by_engine: BTreeMap<EngineKind, usize>,
  pub by_file: BTreeMap<PathBuf, usize>,
}

impl Summary {
  fn from_issues(issues: &[Issue]) -> Self {
    let mut summary = Summary {
      total: issues.len(),
      ..Default::default()
    };
    for issue in issues {
      match issue.severity {
        Severity::Error => summary.errors += 1,
        Severity::Warning => summary.warnings += 1,
        Severity::Info => summary.info += 1,
      }
      *summary.by_engine.entry(issue.engine).or_default() += 1;
      *summary.by_file.entry(issue.file.clone()).or_default() += 1;
    }
    summary
  }
}

/// Output of one aggregation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
  pub issues: Vec<Issue>,
  pub summary: Summary,
  /// Issues dropped because a fix run corrected them
  pub suppressed: usize,
  /// Issues dropped because they referred to files outside the request
  pub out_of_scope: usize,
}

/// Aggregates engine results for one requested file set
pub struct Aggregator {
  scope: BTreeSet<PathBuf>,
}

impl Aggregator {
  pub fn new(scope: &[PathBuf]) -> Self {
    Self {
      scope: scope.iter().cloned().collect(),
    }
  }

  fn in_scope(&self, file: &Path) -> bool {
    self.scope.contains(file)
  }

  pub fn aggregate(&self, runs: &[EngineRun]) -> Aggregation {
    let fixed: Vec<&FixRecord> = runs
      .iter()
      .filter(|r| r.phase == Phase::Fix)
      .flat_map(|r| &r.result.fixed)
      .collect();

    let mut issues = Vec::new();
    let mut suppressed = 0;
    let mut out_of_scope = 0;

    for run in runs {
      for issue in &run.result.issues {
        if !self.in_scope(&issue.file) {
          out_of_scope += 1;
          continue;
        }
        // Only pre-fix observations can be stale; check-phase output is authoritative
        if run.phase == Phase::Fix && fixed.iter().any(|f| f.covers(issue)) {
          suppressed += 1;
          continue;
        }
        issues.push(issue.clone());
      }
    }

    // Sort before deduping so the surviving duplicate does not depend on completion order
    issues.sort_by(compare);
    let mut seen: HashSet<IssueKey> = HashSet::new();
    issues.retain(|i| seen.insert(i.key()));

    let summary = Summary::from_issues(&issues);
    Aggregation {
      issues,
      summary,
      suppressed,
      out_of_scope,
    }
  }
}

/// Report order: severity, then location, then the remaining fields as tie-breakers
fn compare(a: &Issue, b: &Issue) -> Ordering {
  a.severity
    .cmp(&b.severity)
    .then_with(|| a.file.cmp(&b.file))
    .then_with(|| a.line.cmp(&b.line))
    .then_with(|| a.col.cmp(&b.col))
    .then_with(|| a.engine.cmp(&b.engine))
    .then_with(|| a.rule_id.cmp(&b.rule_id))
    .then_with(|| a.message.cmp(&b.message))
}
