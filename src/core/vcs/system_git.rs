//! System git backend
//!
//! Every operation shells out to the `git` binary with an isolated environment, so
//! user configuration cannot change what the pipeline observes or stages.

use crate::core::error::{GateError, GateResult, GitError, ResultExt};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Git backend using system git
pub struct SystemGit {
  /// Directory git was opened from
  pub(crate) repo_path: PathBuf,

  /// Working tree root
  pub(crate) work_tree: PathBuf,
}

impl SystemGit {
  /// Open the repository containing `path`
  ///
  /// This performs ONE subprocess call to get the repository metadata.
  pub fn open(path: &Path) -> GateResult<Self> {
    let output = Command::new("git")
      .arg("-C")
      .arg(path)
      .args(["rev-parse", "--show-toplevel"])
      .output()
      .context("Failed to execute git rev-parse")?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      if stderr.contains("not a git repository") {
        return Err(GateError::Git(GitError::RepoNotFound {
          path: path.to_path_buf(),
        }));
      }
      return Err(GateError::message(format!("Failed to open git repository: {}", stderr)));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(Self {
      repo_path: path.to_path_buf(),
      work_tree: PathBuf::from(stdout.trim()),
    })
  }

  pub fn work_tree(&self) -> &Path {
    &self.work_tree
  }

  /// Create a safe git command with isolated environment
  ///
  /// - Sets working directory to repo path
  /// - Clears environment variables
  /// - Whitelists only PATH and HOME
  /// - Adds safe configuration overrides
  pub(crate) fn git_cmd(&self) -> Command {
    let mut cmd = Command::new("git");

    cmd.arg("-C").arg(&self.repo_path);

    // Isolated environment (don't trust global config)
    cmd.env_clear();
    if let Ok(path) = std::env::var("PATH") {
      cmd.env("PATH", path);
    }
    if let Ok(home) = std::env::var("HOME") {
      cmd.env("HOME", home);
    }

    cmd.arg("-c").arg("core.quotePath=false"); // Don't escape non-ASCII
    cmd.arg("-c").arg("core.hooksPath=/dev/null"); // Never re-enter a hook

    cmd
  }

  /// Turn a failed git invocation into `GitError::CommandFailed`
  pub(crate) fn check_output(command: &str, output: Output) -> GateResult<Output> {
    if output.status.success() {
      return Ok(output);
    }
    Err(GateError::Git(GitError::CommandFailed {
      command: command.to_string(),
      stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }))
  }
}
