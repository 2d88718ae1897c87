//! Fix-first pipeline
//!
//! - **orchestrator**: the run state machine (fix phase, check phase, aggregate, stage)
//! - **batch**: pressure-aware batching of the check phase
//! - **monitor**: memory sampling and pressure classification
//! - **staging**: re-staging files the fix phase rewrote

pub mod batch;
pub mod monitor;
pub mod orchestrator;
pub mod staging;

pub use orchestrator::{Orchestrator, PipelineState, RunRequest};

use crate::engine::{EngineAdapter, EngineError, EngineResult};
use crate::quality::EngineKind;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::warn;

type EngineOutcome = (EngineKind, Result<EngineResult, EngineError>);

/// Invoke `op` for every engine, at most `cap` at a time, and wait for all of them
pub(crate) fn run_parallel<F>(cap: usize, engines: &[Arc<dyn EngineAdapter>], op: F) -> Vec<EngineOutcome>
where
  F: Fn(&Arc<dyn EngineAdapter>) -> Result<EngineResult, EngineError> + Sync,
{
  if engines.is_empty() {
    return Vec::new();
  }

  match rayon::ThreadPoolBuilder::new().num_threads(cap.max(1)).build() {
    Ok(pool) => pool.install(|| engines.par_iter().map(|e| (e.kind(), op(e))).collect()),
    Err(e) => {
      warn!(error = %e, "failed to build engine pool, running engines sequentially");
      engines.iter().map(|e| (e.kind(), op(e))).collect()
    }
  }
}
