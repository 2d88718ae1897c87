//! Progress indicators for long-running operations
//!
//! Uses `linya` for allocation-free, concurrency-optimized progress bars

use crate::pipeline::batch::ProgressReporter;
use linya::{Bar, Progress};
use std::sync::Mutex;

/// Check-phase progress, advanced once per completed batch
pub struct FileProgress {
  progress: Mutex<Progress>,
  bar: Bar,
}

impl FileProgress {
  /// Create a new progress bar over `total` files
  pub fn new(total: usize, label: impl Into<String>) -> Self {
    let mut progress = Progress::new();
    let bar = progress.bar(total, label.into());
    Self {
      progress: Mutex::new(progress),
      bar,
    }
  }
}

impl ProgressReporter for FileProgress {
  fn advance(&self, files: usize) {
    let mut progress = self.progress.lock().unwrap_or_else(|e| e.into_inner());
    progress.inc_and_draw(&self.bar, files);
  }
}
