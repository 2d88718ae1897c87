//! Translation of native tool output into `Issue`s
//!
//! Supported formats:
//!
//! - `unix`: `path:line:col: [severity:] message [rule]`, the compiler-style format most
//!   linters can emit (eslint's `unix` formatter puts `[Severity/rule]` at the end)
//! - `tsc`: `path(line,col): error TS2322: message`, with indented continuation lines
//! - `file-list`: one path per line, meaning "this file needs changes" (formatters in
//!   list-different/check mode)
//!
//! Lines that do not match are ignored; tools print banners and summaries freely.

use crate::quality::{EngineKind, Issue, Severity};
use crate::utils::normalize_path;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticFormat {
  #[default]
  Unix,
  Tsc,
  FileList,
}

/// Parse a tool's stdout into issues attributed to `engine`
pub fn parse(format: DiagnosticFormat, engine: EngineKind, output: &str, workspace_root: &Path) -> Vec<Issue> {
  match format {
    DiagnosticFormat::Unix => parse_unix(engine, output, workspace_root),
    DiagnosticFormat::Tsc => parse_tsc(engine, output, workspace_root),
    DiagnosticFormat::FileList => parse_file_list(engine, output, workspace_root),
  }
}

fn parse_unix(engine: EngineKind, output: &str, root: &Path) -> Vec<Issue> {
  output
    .lines()
    .filter_map(|line| {
      let (path, line_no, col, rest) = split_unix_location(line)?;
      let (severity, rest) = leading_severity(rest);
      let (message, rule, bracket_severity) = trailing_rule(rest);
      let severity = severity.or(bracket_severity).unwrap_or(Severity::Error);

      let mut issue = Issue::new(engine, severity, normalize_path(root, Path::new(path)), line_no, col, message);
      if let Some(rule) = rule {
        issue = issue.with_rule(rule);
      }
      Some(issue)
    })
    .collect()
}

/// Find the first `:<line>:<col>:` after a non-empty path (tolerates `C:\` prefixes)
fn split_unix_location(line: &str) -> Option<(&str, u32, u32, &str)> {
  for (idx, _) in line.match_indices(':') {
    let path = &line[..idx];
    if path.trim().is_empty() {
      continue;
    }
    let mut parts = line[idx + 1..].splitn(3, ':');
    let (Some(l), Some(c), Some(rest)) = (parts.next(), parts.next(), parts.next()) else {
      return None;
    };
    if let (Ok(l), Ok(c)) = (l.trim().parse::<u32>(), c.trim().parse::<u32>()) {
      return Some((path.trim(), l, c, rest.trim()));
    }
  }
  None
}

fn leading_severity(rest: &str) -> (Option<Severity>, &str) {
  if let Some((word, tail)) = rest.split_once(':')
    && let Some(severity) = Severity::parse(word)
  {
    return (Some(severity), tail.trim());
  }
  (None, rest)
}

/// Split `message [Severity/rule]` or `message [rule]`
fn trailing_rule(rest: &str) -> (String, Option<String>, Option<Severity>) {
  let trimmed = rest.trim_end();
  if trimmed.ends_with(']')
    && let Some(open) = trimmed.rfind('[')
  {
    let inner = &trimmed[open + 1..trimmed.len() - 1];
    let message = trimmed[..open].trim().to_string();
    if inner.is_empty() {
      return (message, None, None);
    }
    if let Some((head, rule)) = inner.split_once('/')
      && let Some(severity) = Severity::parse(head)
    {
      return (message, Some(rule.to_string()), Some(severity));
    }
    return (message, Some(inner.to_string()), None);
  }
  (trimmed.to_string(), None, None)
}

fn parse_tsc(engine: EngineKind, output: &str, root: &Path) -> Vec<Issue> {
  let mut issues: Vec<Issue> = Vec::new();

  for line in output.lines() {
    if line.starts_with(char::is_whitespace) {
      if let Some(last) = issues.last_mut()
        && !line.trim().is_empty()
      {
        last.message.push('\n');
        last.message.push_str(line.trim());
      }
      continue;
    }

    let Some((path, line_no, col, rest)) = split_tsc_location(line) else {
      continue;
    };

    // "error TS2322: Type 'string' is not assignable..."
    let (head, message) = rest.split_once(':').unwrap_or(("", rest));
    let mut words = head.split_whitespace();
    let severity = words.next().and_then(Severity::parse).unwrap_or(Severity::Error);
    let code = words.next().map(str::to_string);

    let mut issue = Issue::new(
      engine,
      severity,
      normalize_path(root, Path::new(path)),
      line_no,
      col,
      message.trim(),
    );
    if let Some(code) = code {
      issue = issue.with_rule(code);
    }
    issues.push(issue);
  }

  issues
}

/// Find `(<line>,<col>):` after a non-empty path
fn split_tsc_location(line: &str) -> Option<(&str, u32, u32, &str)> {
  for (idx, _) in line.match_indices('(') {
    let path = &line[..idx];
    if path.is_empty() {
      continue;
    }
    let Some(close) = line[idx..].find("):") else {
      continue;
    };
    let inside = &line[idx + 1..idx + close];
    if let Some((l, c)) = inside.split_once(',')
      && let (Ok(l), Ok(c)) = (l.trim().parse::<u32>(), c.trim().parse::<u32>())
    {
      return Some((path, l, c, line[idx + close + 2..].trim()));
    }
  }
  None
}

fn parse_file_list(engine: EngineKind, output: &str, root: &Path) -> Vec<Issue> {
  output
    .lines()
    .map(str::trim)
    .filter(|l| !l.is_empty())
    .map(|path| {
      Issue::error(engine, normalize_path(root, Path::new(path)), 1, 1, "File is not formatted")
        .with_rule("format")
        .with_suggestion("Run the formatter on this file")
    })
    .collect()
}
