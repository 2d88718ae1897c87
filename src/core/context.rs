//! Workspace context - build once, pass everywhere
//!
//! main.rs resolves the workspace root and loads `fixgate.toml` a single time, then
//! hands `&GateContext` to the command that runs.

use crate::core::config::GateConfig;
use crate::core::error::{GateResult, ResultExt};
use crate::core::vcs::SystemGit;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct GateContext {
  /// Workspace root directory (absolute path)
  pub root: PathBuf,

  /// Parsed and validated configuration
  pub config: Arc<GateConfig>,
}

impl GateContext {
  /// Load the configuration found in `start`, falling back to the enclosing git work tree
  pub fn build(start: &Path) -> GateResult<Self> {
    let start = start
      .canonicalize()
      .with_context(|| format!("Failed to resolve {}", start.display()))?;

    let root = if GateConfig::find_config_path(&start).is_some() {
      start
    } else {
      match SystemGit::open(&start) {
        Ok(git) if GateConfig::find_config_path(git.work_tree()).is_some() => git.work_tree().to_path_buf(),
        _ => start,
      }
    };
    debug!(root = %root.display(), "workspace root");

    let config = GateConfig::load(&root)?;
    Ok(Self {
      root,
      config: Arc::new(config),
    })
  }

  pub fn workspace_root(&self) -> &Path {
    &self.root
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::TempDir;

  #[test]
  fn test_build_loads_config_from_start_dir() {
    let dir = TempDir::new().unwrap();
    fs::write(
      dir.path().join("fixgate.toml"),
      "[[engines]]\nkind = \"format\"\ncommand = \"prettier\"\n",
    )
    .unwrap();

    let ctx = GateContext::build(dir.path()).unwrap();
    assert_eq!(ctx.root, dir.path().canonicalize().unwrap());
    assert_eq!(ctx.config.engines.len(), 1);
  }

  #[test]
  fn test_build_without_config_fails() {
    let dir = TempDir::new().unwrap();
    assert!(GateContext::build(dir.path()).is_err());
  }
}
