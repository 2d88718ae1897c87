//! CLI commands for fixgate
//!
//! - **run**: run the fix-first pipeline over staged or explicit files
//! - **engines**: list configured engines, their capabilities and tool availability
//!
//! All commands accept `&GateContext` to avoid redundant config loads.

pub mod engines;
pub mod run;

pub use engines::run_engines;
pub use run::{RunOptions, run_gate};
