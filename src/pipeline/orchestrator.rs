//! Orchestrator
//!
//! Drives one run through `START → FIX_PHASE → CHECK_PHASE → AGGREGATE → STAGE → DONE`.
//!
//! Every fix-capable engine runs its fix exactly once, over the whole file set, before
//! any check-phase engine sees those files. The check phase then only observes
//! post-fix content. Fixers whose fix output lists what remains are not re-run;
//! fixers that only know which files changed get a check-phase slot instead.
//!
//! Engine problems never escape as errors. Missing tools degrade the run, failing
//! engines are excluded, and a cancelled run still aggregates and stages whatever
//! completed before ending in `CANCELLED`.

use super::batch::{BatchPolicy, BatchProcessor, ProgressReporter};
use super::monitor::ResourceMonitor;
use super::run_parallel;
use super::staging::{StagingAdapter, StagingReport, StagingWarning};
use crate::core::cancel::TimeoutManager;
use crate::core::config::GateConfig;
use crate::core::error::{ConfigError, GateError, GateResult};
use crate::engine::{EngineAdapter, EngineError, EngineRun, Phase};
use crate::engine::session::SessionUse;
use crate::quality::report::{CorrelationId, EngineFailure, EngineMetrics, PerfMetrics, UnavailableEngine};
use crate::quality::{Aggregator, EngineKind, QualityCheckResult};
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn};

/// Where a run is in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineState {
  Start,
  FixPhase,
  CheckPhase,
  Aggregate,
  Stage,
  Done,
  Cancelled,
}

impl PipelineState {
  pub fn is_terminal(self) -> bool {
    matches!(self, PipelineState::Done | PipelineState::Cancelled)
  }

  /// Forward-only transitions; a phase with no work is still passed through
  pub fn can_transition_to(self, next: PipelineState) -> bool {
    use PipelineState::*;
    match (self, next) {
      (Start, FixPhase) | (FixPhase, CheckPhase) | (CheckPhase, Aggregate) | (Aggregate, Stage) | (Stage, Done) => true,
      // Cancellation is recorded after aggregation and staging ran on the partial results
      (Stage, Cancelled) => true,
      _ => false,
    }
  }
}

impl fmt::Display for PipelineState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      PipelineState::Start => "start",
      PipelineState::FixPhase => "fix-phase",
      PipelineState::CheckPhase => "check-phase",
      PipelineState::Aggregate => "aggregate",
      PipelineState::Stage => "stage",
      PipelineState::Done => "done",
      PipelineState::Cancelled => "cancelled",
    };
    write!(f, "{}", s)
  }
}

/// State machine plus the degraded side flag
#[derive(Debug, Clone)]
pub struct PipelineTrace {
  state: PipelineState,
  degraded: bool,
  history: Vec<PipelineState>,
}

impl PipelineTrace {
  fn new() -> Self {
    Self {
      state: PipelineState::Start,
      degraded: false,
      history: vec![PipelineState::Start],
    }
  }

  fn advance(&mut self, next: PipelineState) {
    debug_assert!(
      self.state.can_transition_to(next),
      "invalid pipeline transition {} -> {}",
      self.state,
      next
    );
    debug!(from = %self.state, to = %next, "pipeline transition");
    self.state = next;
    self.history.push(next);
  }

  fn degrade(&mut self) {
    if !self.degraded {
      info!(state = %self.state, "running degraded");
    }
    self.degraded = true;
  }

  pub fn state(&self) -> PipelineState {
    self.state
  }

  pub fn history(&self) -> &[PipelineState] {
    &self.history
  }
}

/// One invocation's inputs
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
  /// Absolute paths, already filtered by the caller
  pub files: Vec<PathBuf>,
  /// Files that must never be shed under memory pressure
  pub critical_files: HashSet<PathBuf>,
  pub timeout: Option<Duration>,
  /// Informational: the caller expects engine sessions to be warm
  pub warm_run: bool,
  pub cancel: Option<CancellationToken>,
  /// Re-stage files the fix phase modified
  pub stage: bool,
}

impl RunRequest {
  pub fn new(files: Vec<PathBuf>) -> Self {
    Self {
      files,
      stage: true,
      ..Default::default()
    }
  }

  pub fn critical(mut self, files: impl IntoIterator<Item = PathBuf>) -> Self {
    self.critical_files.extend(files);
    self
  }

  pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn warm_run(mut self, warm: bool) -> Self {
    self.warm_run = warm;
    self
  }

  pub fn cancel_token(mut self, token: CancellationToken) -> Self {
    self.cancel = Some(token);
    self
  }

  pub fn stage(mut self, stage: bool) -> Self {
    self.stage = stage;
    self
  }
}

/// Engine-level problems collected during a run
#[derive(Default)]
struct Exclusions {
  unavailable: Vec<UnavailableEngine>,
  failed: Vec<EngineFailure>,
  kinds: HashSet<EngineKind>,
}

impl Exclusions {
  fn record(&mut self, engine: &dyn EngineAdapter, phase: Phase, err: EngineError, trace: &mut PipelineTrace) {
    let kind = engine.kind();
    self.kinds.insert(kind);
    match err {
      EngineError::Unavailable { tool, reason } => {
        warn!(engine = %kind, %tool, %reason, "engine unavailable, continuing without it");
        trace.degrade();
        self.unavailable.push(UnavailableEngine {
          engine: kind,
          tool,
          reason,
        });
      }
      EngineError::Failed { message } => {
        warn!(engine = %kind, %phase, error = %message, "engine failed, excluding its results");
        self.failed.push(EngineFailure {
          engine: kind,
          phase,
          message,
        });
      }
    }
  }

  fn contains(&self, kind: EngineKind) -> bool {
    self.kinds.contains(&kind)
  }
}

pub struct Orchestrator {
  engines: Vec<Arc<dyn EngineAdapter>>,
  policy: BatchPolicy,
  monitor: ResourceMonitor,
  fix_phase_share: f64,
  stager: StagingAdapter,
  progress: Option<Arc<dyn ProgressReporter>>,
}

impl Orchestrator {
  /// Build an orchestrator; fails only when the engine set itself is unusable
  pub fn new(engines: Vec<Arc<dyn EngineAdapter>>, config: &GateConfig, stager: StagingAdapter) -> GateResult<Self> {
    if engines.is_empty() {
      return Err(GateError::Config(ConfigError::NoEngines));
    }
    let mut seen = HashSet::new();
    for engine in &engines {
      if !seen.insert(engine.kind()) {
        return Err(GateError::Config(ConfigError::DuplicateEngine {
          kind: engine.kind().to_string(),
        }));
      }
    }

    Ok(Self {
      engines,
      policy: BatchPolicy::from_config(&config.batch),
      monitor: ResourceMonitor::for_process(&config.memory),
      fix_phase_share: config.run.fix_phase_share,
      stager,
      progress: None,
    })
  }

  pub fn with_monitor(mut self, monitor: ResourceMonitor) -> Self {
    self.monitor = monitor;
    self
  }

  pub fn with_policy(mut self, policy: BatchPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
    self.progress = Some(progress);
    self
  }

  pub fn engines(&self) -> &[Arc<dyn EngineAdapter>] {
    &self.engines
  }

  /// Run the fix-first pipeline over `request.files`
  pub fn run(&mut self, request: RunRequest) -> QualityCheckResult {
    let started = Instant::now();
    let timestamp = Utc::now();
    let files = unique(&request.files);
    let correlation = CorrelationId::for_run(timestamp, std::process::id(), &files);
    let span = info_span!("run", id = %correlation);
    let _enter = span.enter();

    let timeouts = TimeoutManager::new(request.timeout, request.cancel.as_ref(), self.fix_phase_share);
    let mut trace = PipelineTrace::new();
    let mut excluded = Exclusions::default();
    let mut runs: Vec<EngineRun> = Vec::new();
    info!(files = files.len(), engines = self.engines.len(), "starting run");

    // FIX_PHASE
    trace.advance(PipelineState::FixPhase);
    let fixers: Vec<Arc<dyn EngineAdapter>> = self
      .engines
      .iter()
      .filter(|e| e.capabilities().fix)
      .cloned()
      .collect();
    if !fixers.is_empty() && !files.is_empty() && !timeouts.is_cancelled() {
      let scope = timeouts.phase_scope(Phase::Fix);
      let cap = self.policy.concurrency_cap(self.monitor.sample(), fixers.len());
      info!(engines = fixers.len(), concurrency = cap, "fix phase");
      for (kind, outcome) in run_parallel(cap, &fixers, |e| e.fix(&files, &scope)) {
        match outcome {
          Ok(result) => runs.push(EngineRun {
            engine: kind,
            phase: Phase::Fix,
            result,
          }),
          Err(err) => {
            if let Some(engine) = fixers.iter().find(|e| e.kind() == kind) {
              excluded.record(engine.as_ref(), Phase::Fix, err, &mut trace);
            }
          }
        }
      }
    }

    // Re-checked fixers are judged on post-fix content only
    let checkers: Vec<Arc<dyn EngineAdapter>> = self
      .engines
      .iter()
      .filter(|e| !excluded.contains(e.kind()) && e.capabilities().needs_recheck())
      .cloned()
      .collect();
    let rechecked: HashSet<EngineKind> = checkers.iter().map(|e| e.kind()).collect();
    for run in runs.iter_mut().filter(|r| rechecked.contains(&r.engine)) {
      run.result.issues.clear();
    }

    // CHECK_PHASE
    trace.advance(PipelineState::CheckPhase);
    let mut omitted = Vec::new();
    let mut batches = 0;
    if !checkers.is_empty() && !files.is_empty() && !timeouts.is_cancelled() {
      let scope = timeouts.phase_scope(Phase::Check);
      info!(engines = checkers.len(), "check phase");
      let outcome = BatchProcessor::new(self.policy.clone(), &mut self.monitor)
        .with_progress(self.progress.as_deref())
        .run(&checkers, &files, &request.critical_files, &scope, &timeouts);

      for (kind, err) in outcome.errors {
        if let Some(engine) = checkers.iter().find(|e| e.kind() == kind) {
          excluded.record(engine.as_ref(), Phase::Check, err, &mut trace);
        }
      }
      runs.extend(outcome.results.into_iter().map(|(engine, result)| EngineRun {
        engine,
        phase: Phase::Check,
        result,
      }));
      omitted = outcome.omitted;
      batches = outcome.batches;
    }

    // Modified files are staged even when the engine was later excluded
    let to_stage: BTreeSet<PathBuf> = runs
      .iter()
      .filter(|r| r.phase == Phase::Fix && !r.result.partial)
      .flat_map(|r| r.result.modified_files.iter().cloned())
      .filter(|f| files.contains(f))
      .collect();
    // Rewritten by a fixer that was cut off; the index keeps the pre-fix content
    let interrupted: BTreeSet<PathBuf> = runs
      .iter()
      .filter(|r| r.phase == Phase::Fix && r.result.partial)
      .flat_map(|r| r.result.modified_files.iter().cloned())
      .filter(|f| files.contains(f) && !to_stage.contains(f))
      .collect();
    let fixed_count: usize = runs
      .iter()
      .filter(|r| r.phase == Phase::Fix && !excluded.contains(r.engine))
      .map(|r| r.result.fixed_count)
      .sum();
    runs.retain(|r| !excluded.contains(r.engine));

    // AGGREGATE
    trace.advance(PipelineState::Aggregate);
    let aggregation = Aggregator::new(&files).aggregate(&runs);
    if aggregation.suppressed > 0 {
      debug!(suppressed = aggregation.suppressed, "dropped issues corrected by the fix phase");
    }

    // STAGE
    trace.advance(PipelineState::Stage);
    let mut staging = if request.stage && !to_stage.is_empty() {
      let files: Vec<PathBuf> = to_stage.into_iter().collect();
      info!(files = files.len(), "staging fixed files");
      self.stager.stage_all(&files)
    } else {
      StagingReport::default()
    };
    if request.stage {
      for file in interrupted {
        warn!(file = %file.display(), "fix was interrupted, leaving file unstaged");
        staging.warnings.push(StagingWarning {
          file,
          reason: "fix interrupted before completion; file left unstaged".to_string(),
        });
      }
    }

    let cancelled = timeouts.is_cancelled();
    trace.advance(if cancelled {
      PipelineState::Cancelled
    } else {
      PipelineState::Done
    });

    let partial = runs.iter().any(|r| r.result.partial);
    let success = !cancelled
      && excluded.failed.is_empty()
      && !partial
      && omitted.is_empty()
      && aggregation.summary.errors == 0;

    let metrics = PerfMetrics {
      timestamp,
      warm_run: request.warm_run,
      all_warm: !runs.is_empty() && runs.iter().all(|r| r.result.session == SessionUse::Warm),
      batches,
      peak_pressure: self.monitor.peak(),
      engines: runs
        .iter()
        .map(|r| EngineMetrics {
          engine: r.engine,
          phase: r.phase,
          duration_ms: r.result.duration.as_millis() as u64,
          issue_count: r.result.issues.len(),
          session: r.result.session,
          partial: r.result.partial,
        })
        .collect(),
    };

    info!(
      state = %trace.state(),
      success,
      issues = aggregation.issues.len(),
      elapsed_ms = started.elapsed().as_millis() as u64,
      "run finished"
    );

    QualityCheckResult {
      success,
      duration_ms: started.elapsed().as_millis() as u64,
      issues: aggregation.issues,
      summary: aggregation.summary,
      metrics: Some(metrics),
      correlation_id: Some(correlation),
      state: trace.state(),
      degraded: trace.degraded,
      partial,
      fixed_count,
      unavailable_engines: excluded.unavailable,
      failed_engines: excluded.failed,
      staged_files: staging.staged,
      staging_warnings: staging.warnings,
      omitted_files: omitted,
    }
  }
}

/// Drop repeated paths, keeping first occurrence order
fn unique(files: &[PathBuf]) -> Vec<PathBuf> {
  let mut seen = HashSet::new();
  files.iter().filter(|f| seen.insert(*f)).cloned().collect()
}
