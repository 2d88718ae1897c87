//! Core building blocks shared by every command
//!
//! - **cancel**: cancellation scopes and run budgets
//! - **config**: `fixgate.toml` parsing and validation
//! - **context**: workspace root and config, loaded once per invocation
//! - **error**: error types with contextual help messages
//! - **vcs**: git operations (SystemGit)

pub mod cancel;
pub mod config;
pub mod context;
pub mod error;
pub mod vcs;
