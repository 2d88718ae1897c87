//! End-to-end tests for `fixgate run`

use crate::helpers::{LINT_ENGINE, TestWorkspace, json_stdout, run_fixgate};
use anyhow::Result;
use std::time::{Duration, Instant};

#[test]
fn test_fixes_are_restaged_and_remaining_issues_fail_the_gate() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.write_config(LINT_ENGINE)?;
  ws.write_file("src/a.ts", "var x = 1;\n")?;
  ws.write_file("src/b.ts", "let y: any = 2;\n")?;
  ws.stage(&["src/a.ts", "src/b.ts"])?;

  let output = run_fixgate(&ws.path, &["run", "--json"])?;
  assert_eq!(output.status.code(), Some(3), "unfixable error should fail the gate");

  let report = json_stdout(&output)?;
  assert_eq!(report["success"], false);
  assert_eq!(report["state"], "done");

  let issues = report["issues"].as_array().expect("issues array");
  assert_eq!(issues.len(), 1, "only the unfixable issue remains: {:?}", issues);
  assert_eq!(issues[0]["ruleId"], "no-explicit-any");
  assert!(issues[0]["file"].as_str().unwrap().ends_with("src/b.ts"));

  let staged: Vec<&str> = report["stagedFiles"]
    .as_array()
    .expect("stagedFiles array")
    .iter()
    .filter_map(|f| f.as_str())
    .collect();
  assert_eq!(staged.len(), 1);
  assert!(staged[0].ends_with("src/a.ts"));

  assert_eq!(ws.read_file("src/a.ts")?, "let x = 1;\n");
  assert_eq!(ws.staged_content("src/a.ts")?, "let x = 1;\n");
  assert!(!ws.unstaged_files()?.contains(&"src/a.ts".to_string()));

  Ok(())
}

#[test]
fn test_clean_files_pass() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.write_config(LINT_ENGINE)?;
  ws.write_file("src/a.ts", "const x = 1;\n")?;
  ws.stage(&["src/a.ts"])?;

  let output = run_fixgate(&ws.path, &["run"])?;
  assert!(
    output.status.success(),
    "stderr: {}",
    String::from_utf8_lossy(&output.stderr)
  );
  let stdout = String::from_utf8_lossy(&output.stdout);
  assert!(stdout.contains("All checks passed"), "stdout: {}", stdout);

  Ok(())
}

#[test]
fn test_missing_tool_degrades_without_failing() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.write_config(&format!(
    "{}\n[[engines]]\nkind = \"type-check\"\ncommand = \"fixgate-test-missing-tool\"\nformat = \"tsc\"\n",
    LINT_ENGINE
  ))?;
  ws.write_file("src/a.ts", "const x = 1;\n")?;
  ws.stage(&["src/a.ts"])?;

  let output = run_fixgate(&ws.path, &["run", "--json"])?;
  assert!(output.status.success());

  let report = json_stdout(&output)?;
  assert_eq!(report["success"], true);
  assert_eq!(report["degraded"], true);
  let unavailable = report["unavailableEngines"].as_array().expect("unavailableEngines array");
  assert_eq!(unavailable.len(), 1);
  assert_eq!(unavailable[0]["engine"], "type-check");
  assert_eq!(unavailable[0]["tool"], "fixgate-test-missing-tool");

  Ok(())
}

#[test]
fn test_explicit_files_with_no_stage_leave_index_alone() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.write_config(LINT_ENGINE)?;
  ws.write_file("src/a.ts", "var x = 1;\n")?;
  ws.stage(&["src/a.ts"])?;

  let output = run_fixgate(&ws.path, &["run", "--json", "--no-stage", "src/a.ts"])?;
  assert!(output.status.success());

  let report = json_stdout(&output)?;
  assert_eq!(report["stagedFiles"].as_array().map(Vec::len), Some(0));
  assert_eq!(ws.read_file("src/a.ts")?, "let x = 1;\n");
  assert_eq!(ws.staged_content("src/a.ts")?, "var x = 1;\n");
  assert!(ws.unstaged_files()?.contains(&"src/a.ts".to_string()));

  Ok(())
}

#[test]
fn test_timeout_cancels_slow_engine() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.write_config(
    r#"
[[engines]]
kind = "type-check"
command = "sh"
args = ["-c", "exec sleep 5"]
format = "tsc"
"#,
  )?;
  ws.write_file("src/a.ts", "const x = 1;\n")?;
  ws.stage(&["src/a.ts"])?;

  let started = Instant::now();
  let output = run_fixgate(&ws.path, &["run", "--json", "--timeout-ms", "300"])?;
  assert!(started.elapsed() < Duration::from_secs(4), "slow engine was not cancelled");
  assert_eq!(output.status.code(), Some(3));

  let report = json_stdout(&output)?;
  assert_eq!(report["state"], "cancelled");
  assert_eq!(report["success"], false);
  assert_eq!(report["partial"], true);

  Ok(())
}

#[test]
fn test_nothing_staged_is_a_pass() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.write_config(LINT_ENGINE)?;

  let output = run_fixgate(&ws.path, &["run", "--json"])?;
  assert!(output.status.success());

  let report = json_stdout(&output)?;
  assert_eq!(report["success"], true);
  assert_eq!(report["state"], "done");
  assert_eq!(report["issues"].as_array().map(Vec::len), Some(0));
  assert_eq!(report["summary"]["total"], 0);
  assert_eq!(report["stagedFiles"].as_array().map(Vec::len), Some(0));
  assert!(report["correlationId"].is_string());

  Ok(())
}

#[test]
fn test_missing_config_is_an_error() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.write_file("src/a.ts", "var x = 1;\n")?;

  let output = run_fixgate(&ws.path, &["run"])?;
  assert_eq!(output.status.code(), Some(1));
  assert!(!output.stderr.is_empty());
  assert_eq!(ws.read_file("src/a.ts")?, "var x = 1;\n");

  Ok(())
}
