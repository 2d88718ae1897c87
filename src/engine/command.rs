//! Adapter for external check/fix tools
//!
//! The tool is spawned once per invocation with the file paths appended to its
//! arguments. While it runs, the adapter polls the child and the cancel scope; on
//! cancellation the child is killed and a partial result is returned.

use super::diagnostics::{self, DiagnosticFormat};
use super::session::{self, Incremental, SessionSlot, SessionStore, SessionUse};
use super::{Capabilities, EngineAdapter, EngineError, EngineResult};
use crate::core::cancel::CancelScope;
use crate::core::config::EngineConfig;
use crate::core::error::GateResult;
use crate::quality::{EngineKind, FixRecord, Issue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How often a running tool is polled for exit/cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Exit code shells use for "command not found"
const EXIT_COMMAND_NOT_FOUND: i32 = 127;

/// What a tool's fix mode reports back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixReporting {
  /// Fix output lists the issues that remain after fixing
  Remaining,
  /// Fix output carries no diagnostics; only file changes are observable
  #[default]
  None,
}

/// Raw outcome of one tool process
struct ToolRun {
  status: Option<ExitStatus>,
  stdout: String,
  stderr: String,
  cancelled: bool,
}

impl ToolRun {
  fn exit_code(&self) -> Option<i32> {
    self.status.and_then(|s| s.code())
  }
}

/// Engine backed by an external executable
pub struct CommandEngine {
  kind: EngineKind,
  command: String,
  args: Vec<String>,
  fix_args: Option<Vec<String>>,
  format: DiagnosticFormat,
  fix_reporting: FixReporting,
  incremental: Incremental,
  workspace_root: PathBuf,
  session: SessionSlot,
}

impl CommandEngine {
  pub fn from_config(config: &EngineConfig, workspace_root: &Path, store: Option<SessionStore>) -> GateResult<Self> {
    let fingerprint = config.fingerprint(workspace_root)?;
    Ok(Self {
      kind: config.kind,
      command: config.command.clone(),
      args: config.args.clone(),
      fix_args: config.fix_args.clone(),
      format: config.format,
      fix_reporting: config.fix_reporting,
      incremental: config.incremental(),
      workspace_root: workspace_root.to_path_buf(),
      session: SessionSlot::new(config.kind, fingerprint, store),
    })
  }

  /// Re-key the session after the external config loader produced a new fingerprint
  pub fn rebind(&self, fingerprint: impl Into<String>) {
    self.session.rebind(fingerprint);
  }

  fn spawn(&self, args: &[String], files: &[PathBuf]) -> Result<Child, EngineError> {
    Command::new(&self.command)
      .args(args)
      .args(files)
      .current_dir(&self.workspace_root)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(|e| match e.kind() {
        ErrorKind::NotFound => EngineError::Unavailable {
          tool: self.command.clone(),
          reason: "not found on PATH".to_string(),
        },
        ErrorKind::PermissionDenied => EngineError::Unavailable {
          tool: self.command.clone(),
          reason: "not executable".to_string(),
        },
        _ => EngineError::failed(format!("Failed to start {}: {}", self.command, e)),
      })
  }

  /// Run the tool to completion or until the scope is cancelled
  fn run_tool(&self, args: &[String], files: &[PathBuf], cancel: &CancelScope) -> Result<ToolRun, EngineError> {
    let mut child = self.spawn(args, files)?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let mut cancelled = false;
    let status = loop {
      match child.try_wait() {
        Ok(Some(status)) => break Some(status),
        Ok(None) => {}
        Err(e) => return Err(EngineError::failed(format!("Failed to wait for {}: {}", self.command, e))),
      }
      if cancel.is_cancelled() {
        debug!(engine = %self.kind, tool = %self.command, "cancellation observed, killing tool");
        let _ = child.kill();
        let _ = child.wait();
        cancelled = true;
        break None;
      }
      thread::sleep(POLL_INTERVAL);
    };

    // Grandchildren of a killed tool can keep the pipes open; leave the readers detached
    let (stdout, stderr) = if cancelled {
      (String::new(), String::new())
    } else {
      (join_output(stdout), join_output(stderr))
    };
    let run = ToolRun {
      status,
      stdout,
      stderr,
      cancelled,
    };

    if run.exit_code() == Some(EXIT_COMMAND_NOT_FOUND) {
      return Err(EngineError::Unavailable {
        tool: self.command.clone(),
        reason: first_line(&run.stderr).unwrap_or("command not found").to_string(),
      });
    }

    Ok(run)
  }

  fn parse(&self, output: &str) -> Vec<Issue> {
    diagnostics::parse(self.format, self.kind, output, &self.workspace_root)
  }

  /// A non-zero exit with nothing parseable and something on stderr is a tool failure
  fn failure(&self, run: &ToolRun, parsed: &[Issue]) -> Option<EngineError> {
    let failed = run.status.is_some_and(|s| !s.success());
    if failed && parsed.is_empty() && !run.stderr.trim().is_empty() {
      return Some(EngineError::failed(format!(
        "{} exited with {}: {}",
        self.command,
        run.exit_code().map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()),
        run.stderr.trim()
      )));
    }
    None
  }
}

impl EngineAdapter for CommandEngine {
  fn kind(&self) -> EngineKind {
    self.kind
  }

  fn tool(&self) -> &str {
    &self.command
  }

  fn capabilities(&self) -> Capabilities {
    match self.fix_args {
      Some(_) => Capabilities::fixer(self.fix_reporting == FixReporting::Remaining),
      None => Capabilities::check_only(),
    }
  }

  fn incremental(&self) -> Incremental {
    self.incremental
  }

  fn check(&self, files: &[PathBuf], cancel: &CancelScope) -> Result<EngineResult, EngineError> {
    let started = Instant::now();
    if files.is_empty() {
      return Ok(EngineResult::from_issues(Vec::new(), started.elapsed()));
    }
    if cancel.is_cancelled() {
      return Ok(EngineResult::cancelled(Vec::new(), started.elapsed()));
    }

    let digests = session::digest_files(files);
    let (plan, discarded) = self
      .session
      .with(|s, discarded| (s.plan(files, &digests, self.incremental), discarded));
    let reuse = if discarded { SessionUse::Rebuilt } else { plan.reuse };

    if plan.to_run.is_empty() {
      debug!(engine = %self.kind, files = files.len(), "served entirely from session");
      let mut result = EngineResult::from_issues(plan.reused, started.elapsed());
      result.session = reuse;
      result.fixable = Some(self.fix_args.is_some());
      return Ok(result);
    }

    debug!(engine = %self.kind, run = plan.to_run.len(), reused = files.len() - plan.to_run.len(), "running tool");
    let run = self.run_tool(&self.args, &plan.to_run, cancel)?;
    let fresh = self.parse(&run.stdout);

    if run.cancelled {
      let mut issues = plan.reused;
      issues.extend(fresh);
      return Ok(EngineResult::cancelled(issues, started.elapsed()));
    }
    if let Some(err) = self.failure(&run, &fresh) {
      return Err(err);
    }

    let ran: HashSet<&PathBuf> = plan.to_run.iter().collect();
    let fresh: Vec<Issue> = match self.incremental {
      Incremental::WholeProgram => fresh,
      Incremental::PerFile => fresh.into_iter().filter(|i| ran.contains(&i.file)).collect(),
    };

    self
      .session
      .with(|s, _| s.record(&plan.to_run, &digests, &fresh, self.incremental));
    self.session.persist();

    let mut issues = plan.reused;
    issues.extend(fresh);
    let mut result = EngineResult::from_issues(issues, started.elapsed());
    result.session = reuse;
    result.fixable = Some(self.fix_args.is_some());
    Ok(result)
  }

  fn fix(&self, files: &[PathBuf], cancel: &CancelScope) -> Result<EngineResult, EngineError> {
    let started = Instant::now();
    let Some(fix_args) = &self.fix_args else {
      return Err(EngineError::failed(format!("{} has no fix command configured", self.command)));
    };
    if files.is_empty() {
      return Ok(EngineResult::from_issues(Vec::new(), started.elapsed()));
    }
    if cancel.is_cancelled() {
      return Ok(EngineResult::cancelled(Vec::new(), started.elapsed()));
    }

    let before = session::digest_files(files);
    let prior: BTreeMap<PathBuf, Vec<Issue>> = self.session.with(|s, _| {
      before
        .iter()
        .filter_map(|(file, digest)| s.issues_if_current(file, digest).map(|i| (file.clone(), i.to_vec())))
        .collect()
    });

    let run = self.run_tool(fix_args, files, cancel)?;
    let after = session::digest_files(files);
    let modified: Vec<PathBuf> = files
      .iter()
      .filter(|f| before.get(*f) != after.get(*f))
      .cloned()
      .collect();

    if run.cancelled {
      let mut result = EngineResult::cancelled(Vec::new(), started.elapsed());
      result.modified_files = modified;
      return Ok(result);
    }

    let mut result = match self.fix_reporting {
      FixReporting::Remaining => {
        let remaining = self.parse(&run.stdout);
        if let Some(err) = self.failure(&run, &remaining) {
          return Err(err);
        }

        let still_there: HashSet<_> = remaining.iter().map(Issue::key).collect();
        let mut fixed = Vec::new();
        let mut fixed_count = 0;
        for file in &modified {
          match prior.get(file) {
            Some(issues) => {
              for issue in issues.iter().filter(|i| !still_there.contains(&i.key())) {
                fixed_count += 1;
                // A rule that still has remaining instances in the file was only partly fixed
                if let Some(rule) = &issue.rule_id
                  && !remaining
                    .iter()
                    .any(|r| r.file == *file && r.rule_id.as_deref() == Some(rule.as_str()))
                {
                  fixed.push(FixRecord::rule(self.kind, file.clone(), rule.clone()));
                }
              }
            }
            None => fixed_count += 1,
          }
        }
        fixed.sort();
        fixed.dedup();

        // The fix run analyzed every file, so it doubles as a fresh check
        self
          .session
          .with(|s, _| s.record(files, &after, &remaining, self.incremental));
        self.session.persist();

        let mut result = EngineResult::from_issues(remaining, started.elapsed());
        result.fixed = fixed;
        result.fixed_count = fixed_count;
        result
      }
      FixReporting::None => {
        if let Some(err) = self.failure(&run, &[]) {
          return Err(err);
        }
        self.session.with(|s, _| s.invalidate(&modified));

        let mut result = EngineResult::from_issues(Vec::new(), started.elapsed());
        result.fixed = modified
          .iter()
          .map(|f| FixRecord::whole_file(self.kind, f.clone()))
          .collect();
        result.fixed_count = modified.len();
        result
      }
    };

    if !modified.is_empty() {
      debug!(engine = %self.kind, modified = modified.len(), "fix modified files");
    }
    result.fixable = Some(true);
    result.modified_files = modified;
    Ok(result)
  }

  fn probe(&self) -> Result<(), EngineError> {
    match which(&self.command) {
      Some(_) => Ok(()),
      None => {
        warn!(engine = %self.kind, tool = %self.command, "tool not found on PATH");
        Err(EngineError::Unavailable {
          tool: self.command.clone(),
          reason: "not found on PATH".to_string(),
        })
      }
    }
  }
}

/// Read a child pipe to completion on a helper thread so the child never blocks on a full pipe
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
  pipe.map(|mut pipe| {
    thread::spawn(move || {
      let mut buf = Vec::new();
      let _ = pipe.read_to_end(&mut buf);
      String::from_utf8_lossy(&buf).into_owned()
    })
  })
}

fn join_output(handle: Option<JoinHandle<String>>) -> String {
  handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn first_line(text: &str) -> Option<&str> {
  text.lines().map(str::trim).find(|l| !l.is_empty())
}

/// Locate an executable the way the OS would for `Command::new`
fn which(command: &str) -> Option<PathBuf> {
  let candidate = Path::new(command);
  if candidate.components().count() > 1 {
    return candidate.is_file().then(|| candidate.to_path_buf());
  }
  let path = std::env::var_os("PATH")?;
  std::env::split_paths(&path)
    .map(|dir| dir.join(command))
    .find(|p| p.is_file())
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;
  use crate::core::config::GateConfig;
  use std::fs;
  use tempfile::TempDir;

  fn engine(dir: &Path, toml: &str) -> CommandEngine {
    let config = GateConfig::parse(toml).unwrap();
    CommandEngine::from_config(&config.engines[0], dir, None).unwrap()
  }

  /// Lint engine backed by `sh`: reports one issue per line containing "var"
  fn sh_lint(dir: &Path) -> CommandEngine {
    engine(
      dir,
      r#"
[[engines]]
kind = "lint"
command = "sh"
args = ["-c", "for f in \"$@\"; do grep -n 'var' \"$f\" | while IFS=: read n rest; do echo \"$f:$n:1: error: no var [no-var]\"; done; done; exit 0", "lint"]
fix_args = ["-c", "for f in \"$@\"; do sed -i.bak 's/var /let /' \"$f\" && rm -f \"$f.bak\"; done", "fix"]
fix_reporting = "none"
"#,
    )
  }

  #[test]
  fn test_missing_tool_is_unavailable() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.ts"), "x").unwrap();
    let engine = engine(
      dir.path(),
      "[[engines]]\nkind = \"lint\"\ncommand = \"fixgate-definitely-missing-tool\"\n",
    );

    let err = engine
      .check(&[dir.path().join("a.ts")], &CancelScope::new())
      .unwrap_err();
    assert!(err.is_unavailable());
    assert!(engine.probe().unwrap_err().is_unavailable());
  }

  #[test]
  fn test_check_parses_and_reuses_session() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.ts");
    let b = dir.path().join("b.ts");
    fs::write(&a, "var x = 1;\n").unwrap();
    fs::write(&b, "let y = 2;\n").unwrap();
    let engine = sh_lint(dir.path());
    let files = vec![a.clone(), b.clone()];

    let cold = engine.check(&files, &CancelScope::new()).unwrap();
    assert_eq!(cold.session, SessionUse::Cold);
    assert_eq!(cold.issues.len(), 1);
    assert_eq!(cold.issues[0].file, a);
    assert_eq!(cold.issues[0].rule_id.as_deref(), Some("no-var"));
    assert!(!cold.success);

    let warm = engine.check(&files, &CancelScope::new()).unwrap();
    assert_eq!(warm.session, SessionUse::Warm);
    assert_eq!(warm.issues, cold.issues);

    fs::write(&b, "var y = 2;\n").unwrap();
    let incremental = engine.check(&files, &CancelScope::new()).unwrap();
    assert_eq!(incremental.session, SessionUse::Incremental);
    assert_eq!(incremental.issues.len(), 2);
  }

  #[test]
  fn test_fingerprint_change_rebuilds_session() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.ts");
    fs::write(&a, "var x = 1;\n").unwrap();
    let engine = sh_lint(dir.path());

    engine.check(std::slice::from_ref(&a), &CancelScope::new()).unwrap();
    engine.rebind("new-fingerprint");
    let result = engine.check(std::slice::from_ref(&a), &CancelScope::new()).unwrap();
    assert_eq!(result.session, SessionUse::Rebuilt);
  }

  #[test]
  fn test_fix_reports_modified_files() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.ts");
    let b = dir.path().join("b.ts");
    fs::write(&a, "var x = 1;\n").unwrap();
    fs::write(&b, "let y = 2;\n").unwrap();
    let engine = sh_lint(dir.path());
    assert_eq!(engine.capabilities(), Capabilities::fixer(false));

    let result = engine.fix(&[a.clone(), b.clone()], &CancelScope::new()).unwrap();
    assert_eq!(result.modified_files, vec![a.clone()]);
    assert_eq!(result.fixed, vec![FixRecord::whole_file(EngineKind::Lint, a.clone())]);
    assert_eq!(result.fixed_count, 1);
    assert_eq!(fs::read_to_string(&a).unwrap(), "let x = 1;\n");
  }

  #[test]
  fn test_remaining_reporting_derives_rule_records() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.ts");
    fs::write(&a, "var x = 1;\n").unwrap();
    let engine = engine(
      dir.path(),
      r#"
[[engines]]
kind = "lint"
command = "sh"
args = ["-c", "for f in \"$@\"; do echo \"$f:1:1: error: no var [no-var]\"; done", "lint"]
fix_args = ["-c", "for f in \"$@\"; do echo fixed > \"$f\"; done", "fix"]
fix_reporting = "remaining"
"#,
    );
    assert_eq!(engine.capabilities(), Capabilities::fixer(true));

    let before = engine.check(std::slice::from_ref(&a), &CancelScope::new()).unwrap();
    assert_eq!(before.issues.len(), 1);

    let result = engine.fix(std::slice::from_ref(&a), &CancelScope::new()).unwrap();
    assert!(result.issues.is_empty());
    assert_eq!(result.fixed, vec![FixRecord::rule(EngineKind::Lint, a.clone(), "no-var")]);
    assert_eq!(result.fixed_count, 1);
    assert!(result.success);
  }

  #[test]
  fn test_tool_failure_is_not_unavailability() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.ts");
    fs::write(&a, "x").unwrap();
    let engine = engine(
      dir.path(),
      r#"
[[engines]]
kind = "lint"
command = "sh"
args = ["-c", "echo 'Invalid configuration' >&2; exit 2", "lint"]
"#,
    );

    let err = engine.check(&[a], &CancelScope::new()).unwrap_err();
    assert!(!err.is_unavailable());
    assert!(err.to_string().contains("Invalid configuration"));
  }

  #[test]
  fn test_cancellation_kills_tool() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.ts");
    fs::write(&a, "x").unwrap();
    let engine = engine(
      dir.path(),
      r#"
[[engines]]
kind = "type-check"
command = "sh"
args = ["-c", "exec sleep 5", "tc"]
"#,
    );

    let started = Instant::now();
    let scope = CancelScope::with_timeout(Duration::from_millis(50));
    let result = engine.check(&[a], &scope).unwrap();
    assert!(result.partial);
    assert!(!result.success);
    assert!(started.elapsed() < Duration::from_secs(4));
  }
}
