//! Test helpers for integration tests

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Linter: flags `var` (fixable) and `: any` (not fixable)
pub const LINT_SCRIPT: &str = r#"#!/bin/sh
for f in "$@"; do
  grep -n 'var ' "$f" | while IFS=: read n rest; do echo "$f:$n:1: error: Unexpected var [no-var]"; done
  grep -n ': any' "$f" | while IFS=: read n rest; do echo "$f:$n:1: error: Unexpected any [no-explicit-any]"; done
done
exit 0
"#;

/// Fixer for the linter above: rewrites `var` to `let`
pub const LINT_FIX_SCRIPT: &str = r#"#!/bin/sh
for f in "$@"; do
  sed 's/var /let /' "$f" > "$f.tmp" && cat "$f.tmp" > "$f" && rm -f "$f.tmp"
done
"#;

/// Lint engine backed by the scripts above, re-checked after fixing
pub const LINT_ENGINE: &str = r#"
[[engines]]
kind = "lint"
command = "sh"
args = ["tools/lint.sh"]
fix_args = ["tools/lint-fix.sh"]
fix_reporting = "none"
"#;

/// A test workspace: a git repository with lint scripts committed
pub struct TestWorkspace {
  _root: TempDir,
  pub path: PathBuf,
}

impl TestWorkspace {
  pub fn new() -> Result<Self> {
    let root = TempDir::new()?;
    let path = root.path().canonicalize()?;

    git(&path, &["init", "--initial-branch=main"])?;
    git(&path, &["config", "user.name", "Test User"])?;
    git(&path, &["config", "user.email", "test@example.com"])?;

    std::fs::create_dir_all(path.join("tools"))?;
    std::fs::write(path.join("tools/lint.sh"), LINT_SCRIPT)?;
    std::fs::write(path.join("tools/lint-fix.sh"), LINT_FIX_SCRIPT)?;
    std::fs::write(path.join("README.md"), "# test\n")?;

    git(&path, &["add", "."])?;
    git(&path, &["commit", "-m", "Initial workspace setup"])?;

    Ok(Self { _root: root, path })
  }

  pub fn write_config(&self, content: &str) -> Result<()> {
    std::fs::write(self.path.join("fixgate.toml"), content)?;
    Ok(())
  }

  pub fn write_file(&self, path: &str, content: &str) -> Result<PathBuf> {
    let file = self.path.join(path);
    if let Some(parent) = file.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&file, content)?;
    Ok(file)
  }

  pub fn read_file(&self, path: &str) -> Result<String> {
    Ok(std::fs::read_to_string(self.path.join(path))?)
  }

  pub fn stage(&self, paths: &[&str]) -> Result<()> {
    let mut args = vec!["add", "--"];
    args.extend_from_slice(paths);
    git(&self.path, &args)?;
    Ok(())
  }

  /// Content of `path` as recorded in the index
  pub fn staged_content(&self, path: &str) -> Result<String> {
    let output = git(&self.path, &["show", &format!(":{}", path)])?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
  }

  /// Paths with unstaged modifications
  pub fn unstaged_files(&self) -> Result<Vec<String>> {
    let output = git(&self.path, &["diff", "--name-only"])?;
    Ok(
      String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(String::from)
        .collect(),
    )
  }
}

/// Run git command in a directory
pub fn git(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = Command::new("git")
    .current_dir(cwd)
    .args(args)
    .output()
    .context("Failed to run git command")?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    anyhow::bail!("Git command failed: git {}\n{}", args.join(" "), stderr);
  }

  Ok(output)
}

/// Run the fixgate binary; non-zero exits are returned, not turned into errors
pub fn run_fixgate(cwd: &Path, args: &[&str]) -> Result<Output> {
  let fixgate_bin = env!("CARGO_BIN_EXE_fixgate");

  Command::new(fixgate_bin)
    .current_dir(cwd)
    .args(args)
    .env_remove("FIXGATE_LOG")
    .output()
    .context("Failed to run fixgate")
}

/// Parse stdout of a `--json` invocation
pub fn json_stdout(output: &Output) -> Result<serde_json::Value> {
  let stdout = String::from_utf8_lossy(&output.stdout);
  serde_json::from_str(&stdout).with_context(|| {
    format!(
      "stdout is not JSON\nstdout: {}\nstderr: {}",
      stdout,
      String::from_utf8_lossy(&output.stderr)
    )
  })
}
