//! `fixgate engines`: show configured engines and whether their tools are available

use crate::core::context::GateContext;
use crate::core::error::GateResult;
use crate::engine::command::CommandEngine;
use crate::engine::{Capabilities, EngineAdapter};
use crate::quality::EngineKind;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
  pub kind: EngineKind,
  pub command: String,
  pub enabled: bool,
  pub capabilities: Capabilities,
  pub fingerprint: String,
  pub available: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reason: Option<String>,
}

pub fn run_engines(ctx: &GateContext, json: bool) -> GateResult<()> {
  let mut statuses = Vec::new();
  for engine in &ctx.config.engines {
    let adapter = CommandEngine::from_config(engine, ctx.workspace_root(), None)?;
    let probe = adapter.probe();
    statuses.push(EngineStatus {
      kind: engine.kind,
      command: engine.command.clone(),
      enabled: engine.enabled,
      capabilities: adapter.capabilities(),
      fingerprint: engine.fingerprint(ctx.workspace_root())?[..12].to_string(),
      available: probe.is_ok(),
      reason: probe.err().map(|e| e.to_string()),
    });
  }

  if json {
    println!("{}", serde_json::to_string_pretty(&statuses)?);
    return Ok(());
  }

  println!("🔧 Configured engines:");
  for status in &statuses {
    let icon = match (status.enabled, status.available) {
      (false, _) => "⏸️ ",
      (true, true) => "✅",
      (true, false) => "❌",
    };
    let mode = match (status.capabilities.fix, status.capabilities.precise_fix_reporting) {
      (false, _) => "check",
      (true, true) => "fix (precise)",
      (true, false) => "fix + re-check",
    };
    println!(
      "   {} {} → {} [{}] fingerprint {}",
      icon, status.kind, status.command, mode, status.fingerprint
    );
    if let Some(reason) = &status.reason {
      println!("      {}", reason);
    }
  }

  Ok(())
}
