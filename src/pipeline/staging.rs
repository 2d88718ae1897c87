//! Git Staging Adapter
//!
//! Re-stages files that fix engines rewrote, so the commit contains the fixed
//! content. Staging is best-effort: a file that cannot be staged becomes a warning in
//! the report and the remaining files are still attempted.

use crate::core::error::GateResult;
use crate::core::vcs::SystemGit;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A file that could not be staged
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingWarning {
  pub file: PathBuf,
  pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingReport {
  pub staged: Vec<PathBuf>,
  pub warnings: Vec<StagingWarning>,
}

/// Something that can add a file to the commit index
pub trait IndexStager: Send + Sync {
  fn stage(&self, file: &Path) -> GateResult<()>;
}

/// Stages through the system `git` binary
pub struct GitStager {
  git: SystemGit,
}

impl GitStager {
  pub fn open(path: &Path) -> GateResult<Self> {
    Ok(Self {
      git: SystemGit::open(path)?,
    })
  }
}

impl IndexStager for GitStager {
  fn stage(&self, file: &Path) -> GateResult<()> {
    self.git.add_path(file)
  }
}

pub struct StagingAdapter {
  stager: Result<Box<dyn IndexStager>, String>,
}

impl StagingAdapter {
  pub fn new(stager: Box<dyn IndexStager>) -> Self {
    Self { stager: Ok(stager) }
  }

  /// Adapter for the repository containing `workspace_root`.
  ///
  /// Opening never fails: without a usable repository every file becomes a warning.
  pub fn for_workspace(workspace_root: &Path) -> Self {
    match GitStager::open(workspace_root) {
      Ok(stager) => Self::new(Box::new(stager)),
      Err(e) => {
        debug!(error = %e, "git unavailable for staging");
        Self { stager: Err(e.to_string()) }
      }
    }
  }

  /// Stage each file in order, one index operation at a time
  pub fn stage_all(&self, files: &[PathBuf]) -> StagingReport {
    let mut report = StagingReport::default();

    for file in files {
      let result = match &self.stager {
        Ok(stager) => stager.stage(file).map_err(|e| e.to_string()),
        Err(reason) => Err(reason.clone()),
      };
      match result {
        Ok(()) => {
          debug!(file = %file.display(), "staged");
          report.staged.push(file.clone());
        }
        Err(reason) => {
          warn!(file = %file.display(), %reason, "failed to stage file");
          report.warnings.push(StagingWarning {
            file: file.clone(),
            reason,
          });
        }
      }
    }

    report
  }
}


#[cfg(test)]
mod tests {
  use super::testing::RecordingStager;
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn test_partial_failure_stages_the_rest() {
    let a = PathBuf::from("/r/a.ts");
    let b = PathBuf::from("/r/b.ts");
    let c = PathBuf::from("/r/c.ts");
    let stager = RecordingStager {
      reject: vec![b.clone()],
      ..Default::default()
    };
    let calls = stager.calls.clone();

    let report = StagingAdapter::new(Box::new(stager)).stage_all(&[a.clone(), b.clone(), c.clone()]);

    assert_eq!(*calls.lock().unwrap(), vec![a.clone(), b.clone(), c.clone()]);
    assert_eq!(report.staged, vec![a, c]);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].file, b);
    assert!(report.warnings[0].reason.contains("index.lock"));
  }

  #[test]
  fn test_no_repository_turns_every_file_into_a_warning() {
    let dir = TempDir::new().unwrap();
    let adapter = StagingAdapter::for_workspace(dir.path());
    let report = adapter.stage_all(&[dir.path().join("a.ts")]);
    assert!(report.staged.is_empty());
    assert_eq!(report.warnings.len(), 1);
  }
}
