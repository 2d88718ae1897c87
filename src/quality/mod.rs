//! Quality data model and result handling
//!
//! - **issue**: issues, engine kinds, severities and fix records
//! - **aggregate**: merge, filter, dedupe and sort engine results
//! - **report**: the run's final `QualityCheckResult`

pub mod aggregate;
pub mod issue;
pub mod report;

pub use aggregate::{Aggregator, Summary};
pub use issue::{EngineKind, FixRecord, Issue, IssueKey, Severity};
pub use report::QualityCheckResult;
