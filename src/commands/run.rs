//! `fixgate run`: the fix-first quality gate
//!
//! Resolves the input files (explicit paths or the git index), runs the pipeline and
//! renders the report. Exits with `ExitCode::Validation` when the gate fails.

use crate::core::context::GateContext;
use crate::core::error::{ExitCode, GateResult};
use crate::core::vcs::SystemGit;
use crate::engine::build_engines;
use crate::pipeline::staging::StagingAdapter;
use crate::pipeline::{Orchestrator, PipelineState, RunRequest};
use crate::quality::{QualityCheckResult, Severity};
use crate::ui::progress::FileProgress;
use crate::utils::{display_relative, normalize_path};
use std::collections::HashSet;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Options for one `fixgate run`
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
  pub files: Vec<PathBuf>,
  pub staged: bool,
  pub json: bool,
  pub timeout_ms: Option<u64>,
  pub no_stage: bool,
  pub warm: bool,
}

pub fn run_gate(ctx: &GateContext, options: RunOptions) -> GateResult<()> {
  let cwd = std::env::current_dir()?;
  let (files, critical) = resolve_files(ctx.workspace_root(), &cwd, &options)?;
  let nothing_to_check = files.is_empty();

  let config = &ctx.config;
  let engines = build_engines(config, ctx.workspace_root())?;
  let mut orchestrator = Orchestrator::new(engines, config, StagingAdapter::for_workspace(ctx.workspace_root()))?;

  if !options.json && !nothing_to_check && std::io::stderr().is_terminal() {
    orchestrator = orchestrator.with_progress(Arc::new(FileProgress::new(files.len(), "Checking")));
  }

  let timeout = match options.timeout_ms {
    Some(0) => None,
    Some(ms) => Some(Duration::from_millis(ms)),
    None => config.run.timeout(),
  };
  let request = RunRequest::new(files)
    .critical(critical)
    .timeout(timeout)
    .warm_run(options.warm)
    .stage(config.run.auto_stage && !options.no_stage);

  let report = orchestrator.run(request);

  if options.json {
    println!("{}", report.to_json()?);
  } else if nothing_to_check {
    println!("ℹ️  No files to check");
  } else {
    print_human_readable(&report, ctx.workspace_root());
  }

  if !report.success {
    std::process::exit(ExitCode::Validation.as_i32());
  }

  Ok(())
}

/// Input files plus the subset that must never be shed
fn resolve_files(root: &Path, cwd: &Path, options: &RunOptions) -> GateResult<(Vec<PathBuf>, HashSet<PathBuf>)> {
  let from_index = options.staged || options.files.is_empty();

  let staged = match SystemGit::open(root).and_then(|git| git.staged_files()) {
    Ok(staged) => staged.into_iter().map(canonical).collect::<Vec<_>>(),
    Err(e) if from_index => return Err(e),
    Err(e) => {
      debug!(error = %e, "no git index, treating every file as deferrable");
      Vec::new()
    }
  };

  let candidates: Vec<PathBuf> = if from_index {
    staged.clone()
  } else {
    options.files.iter().map(|f| normalize_path(cwd, f)).collect()
  };

  let mut seen = HashSet::new();
  let mut files = Vec::new();
  for file in candidates {
    if !file.is_file() {
      warn!(file = %file.display(), "skipping missing file");
      continue;
    }
    let file = canonical(file);
    if seen.insert(file.clone()) {
      files.push(file);
    }
  }

  let critical = staged.into_iter().filter(|f| seen.contains(f)).collect();
  Ok((files, critical))
}

/// Resolve symlinks so index paths and command-line paths compare equal
fn canonical(path: PathBuf) -> PathBuf {
  std::fs::canonicalize(&path).unwrap_or(path)
}

fn print_human_readable(report: &QualityCheckResult, root: &Path) {
  let mut current: Option<&Path> = None;
  for issue in &report.issues {
    if current != Some(issue.file.as_path()) {
      println!("\n📄 {}", display_relative(root, &issue.file));
      current = Some(issue.file.as_path());
    }
    let icon = match issue.severity {
      Severity::Error => "❌",
      Severity::Warning => "⚠️ ",
      Severity::Info => "ℹ️ ",
    };
    let rule = issue.rule_id.as_deref().map(|r| format!(" ({})", r)).unwrap_or_default();
    println!(
      "   {} {}:{} [{}] {}{}",
      icon, issue.line, issue.col, issue.engine, issue.message, rule
    );
    if let Some(suggestion) = &issue.suggestion {
      println!("      💡 {}", suggestion);
    }
  }
  if !report.issues.is_empty() {
    println!();
  }

  for engine in &report.unavailable_engines {
    println!("⏭️  Skipped {} ({}): {}", engine.engine, engine.tool, engine.reason);
  }
  for failure in &report.failed_engines {
    println!("💥 {} failed during {} phase: {}", failure.engine, failure.phase, failure.message);
  }
  if !report.staged_files.is_empty() {
    println!("📦 Re-staged {} fixed file(s)", report.staged_files.len());
  }
  for warning in &report.staging_warnings {
    println!(
      "⚠️  Could not stage {}: {}",
      display_relative(root, &warning.file),
      warning.reason
    );
  }
  if !report.omitted_files.is_empty() {
    println!(
      "⚠️  {} file(s) omitted under memory pressure",
      report.omitted_files.len()
    );
  }

  let summary = &report.summary;
  println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
  println!(
    "Summary: {} errors, {} warnings, {} info ({} fixed, {}ms)",
    summary.errors, summary.warnings, summary.info, report.fixed_count, report.duration_ms
  );

  if report.state == PipelineState::Cancelled {
    println!("\n⏱️  Run cancelled before all engines finished; results are partial.");
  } else if !report.success {
    println!("\n⚠️  Quality gate failed. Please address the issues above.");
  } else if summary.warnings > 0 {
    println!("\n⚠️  Some warnings found. Consider addressing them.");
  } else {
    println!("\n✨ All checks passed!");
  }
}
