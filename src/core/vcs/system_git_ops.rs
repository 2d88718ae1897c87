//! Index operations for SystemGit

use super::system_git::SystemGit;
use crate::core::error::{GateResult, ResultExt};
use crate::utils::path_to_git_format;
use std::path::{Path, PathBuf};

impl SystemGit {
  /// Files staged for commit (added, copied, modified or renamed), as absolute paths
  pub fn staged_files(&self) -> GateResult<Vec<PathBuf>> {
    let output = self
      .git_cmd()
      .args(["diff", "--cached", "--name-only", "--diff-filter=ACMR", "-z"])
      .output()
      .context("Failed to run git diff --cached")?;
    let output = Self::check_output("git diff --cached", output)?;

    Ok(
      output
        .stdout
        .split(|b| *b == 0)
        .filter(|s| !s.is_empty())
        .map(|s| self.work_tree.join(String::from_utf8_lossy(s).as_ref()))
        .collect(),
    )
  }

  /// Stage one path in the index
  pub fn add_path(&self, path: &Path) -> GateResult<()> {
    let output = self
      .git_cmd()
      .arg("add")
      .arg("--")
      .arg(path_to_git_format(path))
      .output()
      .context("Failed to run git add")?;
    Self::check_output("git add", output)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use std::process::Command;
  use tempfile::TempDir;

  fn repo() -> (TempDir, SystemGit) {
    let dir = TempDir::new().unwrap();
    let status = Command::new("git").arg("init").arg("-q").arg(dir.path()).status().unwrap();
    assert!(status.success());
    let git = SystemGit::open(dir.path()).unwrap();
    (dir, git)
  }

  #[test]
  fn test_add_then_list_staged() {
    let (_dir, git) = repo();
    let file = git.work_tree().join("a.ts");
    fs::write(&file, "let a = 1;\n").unwrap();

    assert!(git.staged_files().unwrap().is_empty());
    git.add_path(&file).unwrap();
    assert_eq!(git.staged_files().unwrap(), vec![file]);
  }

  #[test]
  fn test_add_missing_path_fails() {
    let (_dir, git) = repo();
    let err = git.add_path(&git.work_tree().join("missing.ts")).unwrap_err();
    assert!(err.to_string().contains("git add"));
  }
}
