//! Tests for `fixgate engines`

use crate::helpers::{LINT_ENGINE, TestWorkspace, json_stdout, run_fixgate};
use anyhow::Result;

#[test]
fn test_engines_json_reports_availability() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.write_config(&format!(
    "{}\n[[engines]]\nkind = \"format\"\ncommand = \"fixgate-test-missing-tool\"\nformat = \"file-list\"\n",
    LINT_ENGINE
  ))?;

  let output = run_fixgate(&ws.path, &["engines", "--json"])?;
  assert!(output.status.success());

  let engines = json_stdout(&output)?;
  let engines = engines.as_array().expect("engine list");
  assert_eq!(engines.len(), 2);

  assert_eq!(engines[0]["kind"], "lint");
  assert_eq!(engines[0]["available"], true);
  assert_eq!(engines[0]["capabilities"]["fix"], true);
  assert_eq!(engines[0]["fingerprint"].as_str().map(str::len), Some(12));

  assert_eq!(engines[1]["kind"], "format");
  assert_eq!(engines[1]["available"], false);
  assert!(engines[1]["reason"].is_string());

  Ok(())
}

#[test]
fn test_engines_human_output() -> Result<()> {
  let ws = TestWorkspace::new()?;
  ws.write_config(LINT_ENGINE)?;

  let output = run_fixgate(&ws.path, &["engines"])?;
  assert!(output.status.success());
  let stdout = String::from_utf8_lossy(&output.stdout);
  assert!(stdout.contains("lint"));
  assert!(stdout.contains("fix + re-check"));

  Ok(())
}
