//! Batch Processor
//!
//! Splits the check phase into batches sized by memory pressure. Between batches the
//! resource monitor is sampled, so a spike shrinks the next batch and the engine
//! concurrency instead of failing the run.
//!
//! | Pressure | Batch size          | Concurrency          |
//! |----------|---------------------|----------------------|
//! | normal   | target              | cores (≤ engines)    |
//! | elevated | target / 2 (≥ min)  | half of the above    |
//! | critical | min, sheds deferrable files | 1            |
//!
//! Whole-program engines are not batched: they check the full file set once, in the
//! slot of the first batch, so their session sees the same file set on every run.

use super::monitor::{PressureLevel, ResourceMonitor};
use super::run_parallel;
use crate::core::cancel::{CancelScope, TimeoutManager};
use crate::core::config::BatchConfig;
use crate::engine::session::Incremental;
use crate::engine::{EngineAdapter, EngineError, EngineResult};
use crate::quality::EngineKind;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Scheduling priority of an input file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilePriority {
  /// Never shed (e.g. staged for commit)
  Critical,
  /// May be pushed back or dropped under critical pressure
  Deferrable,
}

/// A unit of check-phase work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBatch {
  pub files: Vec<PathBuf>,
  /// Highest priority among the batch's files
  pub priority: FilePriority,
  pub timeout: Option<Duration>,
}

/// Sizing rules derived from `[batch]`
#[derive(Debug, Clone)]
pub struct BatchPolicy {
  pub target_size: usize,
  pub min_size: usize,
  pub batch_timeout: Option<Duration>,
  pub imminent: Duration,
  pub cores: usize,
}

impl BatchPolicy {
  pub fn from_config(config: &BatchConfig) -> Self {
    Self {
      target_size: config.target_size.max(1),
      min_size: config.min_size.max(1),
      batch_timeout: config.batch_timeout_ms.map(Duration::from_millis),
      imminent: Duration::from_millis(config.imminent_ms),
      cores: num_cpus::get(),
    }
  }

  pub fn batch_size(&self, level: PressureLevel) -> usize {
    match level {
      PressureLevel::Normal => self.target_size,
      PressureLevel::Elevated => (self.target_size / 2).max(self.min_size),
      PressureLevel::Critical => self.min_size,
    }
  }

  /// Number of engines allowed to run at once
  pub fn concurrency_cap(&self, level: PressureLevel, engines: usize) -> usize {
    let base = self.cores.min(engines).max(1);
    match level {
      PressureLevel::Normal => base,
      PressureLevel::Elevated => (base / 2).max(1),
      PressureLevel::Critical => 1,
    }
  }
}

/// What one dequeue produced
#[derive(Debug, Default)]
pub struct Dequeued {
  pub batch: Option<FileBatch>,
  /// Deferrable files pushed to the back of the queue
  pub shed: Vec<PathBuf>,
  /// Deferrable files dropped because the deadline is imminent
  pub omitted: Vec<PathBuf>,
}

/// Pending files, critical first
#[derive(Debug)]
pub struct BatchQueue {
  pending: VecDeque<(PathBuf, FilePriority)>,
  /// Files already shed once; they are not shed again so the queue always drains
  shed: HashSet<PathBuf>,
}

impl BatchQueue {
  pub fn new(files: &[PathBuf], critical: &HashSet<PathBuf>) -> Self {
    let mut entries: Vec<(PathBuf, FilePriority)> = files
      .iter()
      .map(|f| {
        let priority = if critical.contains(f) {
          FilePriority::Critical
        } else {
          FilePriority::Deferrable
        };
        (f.clone(), priority)
      })
      .collect();
    // Stable: input order is kept within a priority
    entries.sort_by_key(|(_, p)| *p);
    Self {
      pending: entries.into(),
      shed: HashSet::new(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.pending.is_empty()
  }

  pub fn len(&self) -> usize {
    self.pending.len()
  }

  pub fn next(&mut self, size: usize, level: PressureLevel, imminent: bool, timeout: Option<Duration>) -> Dequeued {
    let take = size.max(1).min(self.pending.len());
    let slice: Vec<(PathBuf, FilePriority)> = self.pending.drain(..take).collect();

    let mut out = Dequeued::default();
    let mut files = Vec::with_capacity(slice.len());
    let mut priority = FilePriority::Deferrable;

    for (file, p) in slice {
      if level == PressureLevel::Critical && p == FilePriority::Deferrable {
        if imminent {
          out.omitted.push(file);
          continue;
        }
        if self.shed.insert(file.clone()) {
          self.pending.push_back((file.clone(), p));
          out.shed.push(file);
          continue;
        }
      }
      priority = priority.min(p);
      files.push(file);
    }

    if !files.is_empty() {
      out.batch = Some(FileBatch {
        files,
        priority,
        timeout,
      });
    }
    out
  }

  /// Everything still waiting
  pub fn drain(&mut self) -> Vec<PathBuf> {
    self.pending.drain(..).map(|(f, _)| f).collect()
  }
}

/// Receives check-phase progress
pub trait ProgressReporter: Send + Sync {
  fn advance(&self, files: usize);
}

/// Result of driving the check phase
#[derive(Debug, Default)]
pub struct BatchOutcome {
  /// Merged result per engine over every batch it completed
  pub results: BTreeMap<EngineKind, EngineResult>,
  /// Engines that errored; they were not invoked for later batches
  pub errors: Vec<(EngineKind, EngineError)>,
  pub omitted: Vec<PathBuf>,
  /// Files never reached because the run was cancelled
  pub unprocessed: Vec<PathBuf>,
  pub batches: usize,
}

pub struct BatchProcessor<'a> {
  policy: BatchPolicy,
  monitor: &'a mut ResourceMonitor,
  progress: Option<&'a dyn ProgressReporter>,
}

impl<'a> BatchProcessor<'a> {
  pub fn new(policy: BatchPolicy, monitor: &'a mut ResourceMonitor) -> Self {
    Self {
      policy,
      monitor,
      progress: None,
    }
  }

  pub fn with_progress(mut self, progress: Option<&'a dyn ProgressReporter>) -> Self {
    self.progress = progress;
    self
  }

  /// Check `files` with every engine, batch by batch, until done or cancelled
  pub fn run(
    &mut self,
    engines: &[Arc<dyn EngineAdapter>],
    files: &[PathBuf],
    critical: &HashSet<PathBuf>,
    phase: &CancelScope,
    timeouts: &TimeoutManager,
  ) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    let mut active: Vec<Arc<dyn EngineAdapter>> = engines.to_vec();
    let mut queue = BatchQueue::new(files, critical);

    while !queue.is_empty() && !active.is_empty() {
      if phase.is_cancelled() {
        debug!(remaining = queue.len(), "check phase cancelled with files pending");
        outcome.unprocessed = queue.drain();
        break;
      }

      let level = self.monitor.sample();
      let size = self.policy.batch_size(level);
      let imminent = timeouts.is_imminent(self.policy.imminent);
      let next = queue.next(size, level, imminent, self.policy.batch_timeout);

      if !next.shed.is_empty() {
        debug!(shed = next.shed.len(), "critical pressure, deferring files");
      }
      if !next.omitted.is_empty() {
        warn!(omitted = next.omitted.len(), "critical pressure near deadline, omitting files");
        outcome.omitted.extend(next.omitted);
      }
      let Some(batch) = next.batch else {
        continue;
      };

      let cap = self.policy.concurrency_cap(level, active.len());
      outcome.batches += 1;
      info!(
        batch = outcome.batches,
        files = batch.files.len(),
        pressure = %level,
        concurrency = cap,
        "checking batch"
      );

      let scope = timeouts.batch_scope(phase, batch.timeout);
      // Whole-program engines take their one slot alongside the first batch, over every file
      let results = run_parallel(cap, &active, |engine| match engine.incremental() {
        Incremental::WholeProgram => engine.check(files, phase),
        Incremental::PerFile => engine.check(&batch.files, &scope),
      });

      let mut failed = HashSet::new();
      for (kind, result) in results {
        match result {
          Ok(result) => match outcome.results.get_mut(&kind) {
            Some(existing) => existing.absorb(result),
            None => {
              outcome.results.insert(kind, result);
            }
          },
          Err(err) => {
            warn!(engine = %kind, error = %err, "engine dropped from check phase");
            outcome.results.remove(&kind);
            outcome.errors.push((kind, err));
            failed.insert(kind);
          }
        }
      }
      active.retain(|e| !failed.contains(&e.kind()) && e.incremental() == Incremental::PerFile);

      if let Some(progress) = self.progress {
        progress.advance(batch.files.len());
      }
    }

    // No per-file engine left for the rest of the queue
    if outcome.unprocessed.is_empty()
      && !queue.is_empty()
      && let Some(progress) = self.progress
    {
      progress.advance(queue.len());
    }

    if !outcome.unprocessed.is_empty() {
      for engine in &active {
        outcome
          .results
          .entry(engine.kind())
          .or_insert_with(|| EngineResult::cancelled(Vec::new(), Duration::ZERO))
          .partial = true;
      }
    }
    for result in outcome.results.values_mut() {
      if result.partial {
        result.success = false;
      }
    }

    outcome
  }
}
