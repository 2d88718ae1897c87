//! Error types for fixgate with contextual messages and exit codes
//!
//! Only start-up problems (bad configuration, no engines, git plumbing used by the
//! CLI) travel as `GateError`. Anything that goes wrong inside one engine or for one
//! file is captured as data in the run report instead.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Exit codes for fixgate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
  /// User error (config, invalid args, missing files)
  User = 1,
  /// System error (git, I/O, thread pool)
  System = 2,
  /// Quality gate failed (unfixable issues, timeout, engine failure)
  Validation = 3,
}

impl ExitCode {
  /// Convert to i32 for process exit
  pub fn as_i32(self) -> i32 {
    self as i32
  }
}

/// Main error type for fixgate
#[derive(Debug)]
pub enum GateError {
  /// Configuration errors
  Config(ConfigError),

  /// Git operation errors
  Git(GitError),

  /// I/O errors
  Io(io::Error),

  /// Generic error with message and optional context
  Message {
    message: String,
    context: Option<String>,
    help: Option<String>,
  },
}

impl GateError {
  /// Create a simple error message
  pub fn message(msg: impl Into<String>) -> Self {
    GateError::Message {
      message: msg.into(),
      context: None,
      help: None,
    }
  }

  /// Create an error with help text
  pub fn with_help(msg: impl Into<String>, help: impl Into<String>) -> Self {
    GateError::Message {
      message: msg.into(),
      context: None,
      help: Some(help.into()),
    }
  }

  /// Add context to an existing error
  pub fn context(self, ctx: impl Into<String>) -> Self {
    let ctx_str = ctx.into();
    match self {
      GateError::Message { message, context, help } => GateError::Message {
        message,
        context: Some(context.map(|c| format!("{}\n{}", ctx_str, c)).unwrap_or(ctx_str)),
        help,
      },
      GateError::Io(err) => GateError::Message {
        message: format!("I/O error: {}", err),
        context: Some(ctx_str),
        help: None,
      },
      _ => self,
    }
  }

  /// Get the appropriate exit code for this error
  pub fn exit_code(&self) -> ExitCode {
    match self {
      GateError::Config(_) => ExitCode::User,
      GateError::Git(_) => ExitCode::System,
      GateError::Io(_) => ExitCode::System,
      GateError::Message { .. } => ExitCode::User,
    }
  }

  /// Get contextual help message for this error
  pub fn help_message(&self) -> Option<String> {
    match self {
      GateError::Config(e) => e.help_message(),
      GateError::Git(e) => e.help_message(),
      GateError::Message { help, .. } => help.clone(),
      GateError::Io(_) => None,
    }
  }
}

impl fmt::Display for GateError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      GateError::Config(e) => write!(f, "{}", e),
      GateError::Git(e) => write!(f, "{}", e),
      GateError::Io(e) => write!(f, "I/O error: {}", e),
      GateError::Message { message, context, .. } => {
        write!(f, "{}", message)?;
        if let Some(ctx) = context {
          write!(f, "\n{}", ctx)?;
        }
        Ok(())
      }
    }
  }
}

impl std::error::Error for GateError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      GateError::Io(e) => Some(e),
      _ => None,
    }
  }
}

impl From<io::Error> for GateError {
  fn from(err: io::Error) -> Self {
    GateError::Io(err)
  }
}

impl From<String> for GateError {
  fn from(msg: String) -> Self {
    GateError::message(msg)
  }
}

impl From<&str> for GateError {
  fn from(msg: &str) -> Self {
    GateError::message(msg)
  }
}

impl From<toml_edit::de::Error> for GateError {
  fn from(err: toml_edit::de::Error) -> Self {
    GateError::message(format!("TOML deserialization error: {}", err))
  }
}

impl From<serde_json::Error> for GateError {
  fn from(err: serde_json::Error) -> Self {
    GateError::message(format!("JSON error: {}", err))
  }
}

/// Configuration-related errors
#[derive(Debug)]
pub enum ConfigError {
  /// fixgate.toml not found
  NotFound { workspace_root: PathBuf },

  /// No enabled engine in the configuration
  NoEngines,

  /// Two engines share the same kind
  DuplicateEngine { kind: String },

  /// A field has a value the orchestrator cannot work with
  InvalidValue { field: String, reason: String },
}

impl ConfigError {
  fn help_message(&self) -> Option<String> {
    match self {
      ConfigError::NotFound { .. } => {
        Some("Create a fixgate.toml with at least one [[engines]] entry.".to_string())
      }
      ConfigError::NoEngines => Some("Add an [[engines]] entry or set `enabled = true` on an existing one.".to_string()),
      ConfigError::DuplicateEngine { kind } => Some(format!(
        "Only one engine per kind is supported. Remove or disable the extra '{}' engine.",
        kind
      )),
      ConfigError::InvalidValue { .. } => None,
    }
  }
}

impl fmt::Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConfigError::NotFound { workspace_root } => {
        write!(
          f,
          "No fixgate configuration found.\nExpected file: {}/fixgate.toml",
          workspace_root.display()
        )
      }
      ConfigError::NoEngines => write!(f, "No engines configured"),
      ConfigError::DuplicateEngine { kind } => write!(f, "Engine kind '{}' is configured more than once", kind),
      ConfigError::InvalidValue { field, reason } => write!(f, "Invalid value for '{}': {}", field, reason),
    }
  }
}

/// Git operation errors
#[derive(Debug)]
pub enum GitError {
  /// Git command failed
  CommandFailed { command: String, stderr: String },

  /// Repository not found
  RepoNotFound { path: PathBuf },
}

impl GitError {
  fn help_message(&self) -> Option<String> {
    match self {
      GitError::RepoNotFound { path } => Some(format!(
        "Run fixgate inside a git repository or pass files explicitly: {}",
        path.display()
      )),
      GitError::CommandFailed { .. } => None,
    }
  }
}

impl fmt::Display for GitError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      GitError::CommandFailed { command, stderr } => {
        write!(f, "Git command failed: {}\n{}", command, stderr)
      }
      GitError::RepoNotFound { path } => {
        write!(f, "Git repository not found at: {}", path.display())
      }
    }
  }
}

/// Result type alias for fixgate
pub type GateResult<T> = Result<T, GateError>;

/// Helper trait to add context to Results
pub trait ResultExt<T> {
  /// Add context to an error result
  fn context(self, ctx: impl Into<String>) -> GateResult<T>;

  /// Add context using a closure (lazy evaluation)
  fn with_context<F>(self, f: F) -> GateResult<T>
  where
    F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
  E: Into<GateError>,
{
  fn context(self, ctx: impl Into<String>) -> GateResult<T> {
    self.map_err(|e| e.into().context(ctx))
  }

  fn with_context<F>(self, f: F) -> GateResult<T>
  where
    F: FnOnce() -> String,
  {
    self.map_err(|e| e.into().context(f()))
  }
}

/// Pretty-print an error to stderr with help text
pub fn print_error(error: &GateError) {
  eprintln!("\n❌ {}\n", error);

  if let Some(help) = error.help_message() {
    eprintln!("💡 Help: {}\n", help);
  }
}
