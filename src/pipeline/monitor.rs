//! Resource Monitor
//!
//! Samples the process's resident memory at a fixed cadence, keeps a rolling window,
//! and classifies pressure from both the current level and where the growth trend
//! says memory will be within the look-ahead horizon. Acting on the trend lets the
//! batch processor shrink work before a threshold is crossed.

use crate::core::config::MemoryConfig;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::debug;

const MB: u64 = 1024 * 1024;

/// Source of resident-memory readings
pub trait MemoryProbe: Send {
  /// Current resident memory in bytes, or `None` when it cannot be read
  fn resident_bytes(&mut self) -> Option<u64>;
}

/// Reads this process's resident memory through `sysinfo`
pub struct SysinfoProbe {
  system: System,
  pid: Option<Pid>,
}

impl SysinfoProbe {
  pub fn new() -> Self {
    Self {
      system: System::new(),
      pid: sysinfo::get_current_pid().ok(),
    }
  }
}

impl Default for SysinfoProbe {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryProbe for SysinfoProbe {
  fn resident_bytes(&mut self) -> Option<u64> {
    let pid = self.pid?;
    self.system.refresh_processes_specifics(
      ProcessesToUpdate::Some(&[pid]),
      true,
      ProcessRefreshKind::nothing().with_memory(),
    );
    self.system.process(pid).map(|p| p.memory())
  }
}

/// Discrete pressure level driving batch sizing and concurrency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureLevel {
  #[default]
  Normal,
  Elevated,
  Critical,
}

impl fmt::Display for PressureLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PressureLevel::Normal => write!(f, "normal"),
      PressureLevel::Elevated => write!(f, "elevated"),
      PressureLevel::Critical => write!(f, "critical"),
    }
  }
}

/// One memory reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourcePressureSample {
  pub at: Instant,
  pub resident_bytes: u64,
}

pub struct ResourceMonitor {
  probe: Box<dyn MemoryProbe>,
  samples: VecDeque<ResourcePressureSample>,
  window: usize,
  interval: Duration,
  elevated_bytes: u64,
  critical_bytes: u64,
  horizon: Duration,
  level: PressureLevel,
  peak: PressureLevel,
}

impl ResourceMonitor {
  pub fn new(config: &MemoryConfig, probe: Box<dyn MemoryProbe>) -> Self {
    Self {
      probe,
      samples: VecDeque::with_capacity(config.window),
      window: config.window.max(2),
      interval: Duration::from_millis(config.sample_interval_ms),
      elevated_bytes: config.elevated_mb.saturating_mul(MB),
      critical_bytes: config.critical_mb.saturating_mul(MB),
      horizon: Duration::from_millis(config.horizon_ms),
      level: PressureLevel::Normal,
      peak: PressureLevel::Normal,
    }
  }

  /// Monitor backed by this process's real memory usage
  pub fn for_process(config: &MemoryConfig) -> Self {
    Self::new(config, Box::new(SysinfoProbe::new()))
  }

  /// Take a reading if the sampling interval has elapsed, then return the current level
  pub fn sample(&mut self) -> PressureLevel {
    let due = self
      .samples
      .back()
      .is_none_or(|last| last.at.elapsed() >= self.interval);
    if !due {
      return self.level;
    }

    match self.probe.resident_bytes() {
      Some(bytes) => self.observe(ResourcePressureSample {
        at: Instant::now(),
        resident_bytes: bytes,
      }),
      None => {
        debug!("resident memory unavailable, keeping last pressure level");
        self.level
      }
    }
  }

  /// Add a reading to the window and reclassify
  pub fn observe(&mut self, sample: ResourcePressureSample) -> PressureLevel {
    if self.samples.len() == self.window {
      self.samples.pop_front();
    }
    self.samples.push_back(sample);

    let projected = sample.resident_bytes as f64 + self.growth_rate().max(0.0) * self.horizon.as_secs_f64();
    let level = self
      .classify(sample.resident_bytes as f64)
      .max(self.classify(projected));

    if level != self.level {
      debug!(
        from = %self.level,
        to = %level,
        resident_mb = sample.resident_bytes / MB,
        "memory pressure changed"
      );
    }
    self.level = level;
    self.peak = self.peak.max(level);
    level
  }

  /// Growth rate in bytes per second, first to last sample of the window
  pub fn growth_rate(&self) -> f64 {
    let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
      return 0.0;
    };
    let secs = last.at.saturating_duration_since(first.at).as_secs_f64();
    if secs <= f64::EPSILON {
      return 0.0;
    }
    (last.resident_bytes as f64 - first.resident_bytes as f64) / secs
  }

  pub fn level(&self) -> PressureLevel {
    self.level
  }

  /// Highest level seen over the monitor's lifetime
  pub fn peak(&self) -> PressureLevel {
    self.peak
  }

  fn classify(&self, bytes: f64) -> PressureLevel {
    if bytes >= self.critical_bytes as f64 {
      PressureLevel::Critical
    } else if bytes >= self.elevated_bytes as f64 {
      PressureLevel::Elevated
    } else {
      PressureLevel::Normal
    }
  }
}


#[cfg(test)]
mod tests {
  use super::testing::FixedProbe;
  use super::*;

  fn config() -> MemoryConfig {
    MemoryConfig {
      sample_interval_ms: 0,
      window: 4,
      elevated_mb: 100,
      critical_mb: 200,
      horizon_ms: 1000,
    }
  }

  fn at(base: Instant, ms: u64, mb: u64) -> ResourcePressureSample {
    ResourcePressureSample {
      at: base + Duration::from_millis(ms),
      resident_bytes: mb * MB,
    }
  }

  #[test]
  fn test_static_levels() {
    let mut monitor = ResourceMonitor::new(&config(), Box::new(FixedProbe::default()));
    let base = Instant::now();
    assert_eq!(monitor.observe(at(base, 0, 50)), PressureLevel::Normal);

    let mut monitor = ResourceMonitor::new(&config(), Box::new(FixedProbe::default()));
    assert_eq!(monitor.observe(at(base, 0, 150)), PressureLevel::Elevated);

    let mut monitor = ResourceMonitor::new(&config(), Box::new(FixedProbe::default()));
    assert_eq!(monitor.observe(at(base, 0, 250)), PressureLevel::Critical);
  }

  #[test]
  fn test_trend_predicts_pressure_before_threshold() {
    let mut monitor = ResourceMonitor::new(&config(), Box::new(FixedProbe::default()));
    let base = Instant::now();
    monitor.observe(at(base, 0, 10));
    // 80 MB/s growth; 90 MB now projects to 170 MB one second out
    let level = monitor.observe(at(base, 1000, 90));
    assert!((monitor.growth_rate() - 80.0 * MB as f64).abs() < 1.0);
    assert_eq!(level, PressureLevel::Elevated);
  }

  #[test]
  fn test_shrinking_memory_does_not_lower_current_level() {
    let mut monitor = ResourceMonitor::new(&config(), Box::new(FixedProbe::default()));
    let base = Instant::now();
    monitor.observe(at(base, 0, 400));
    let level = monitor.observe(at(base, 1000, 250));
    assert!(monitor.growth_rate() < 0.0);
    assert_eq!(level, PressureLevel::Critical);
    assert_eq!(monitor.peak(), PressureLevel::Critical);
  }

  #[test]
  fn test_window_is_bounded() {
    let mut monitor = ResourceMonitor::new(&config(), Box::new(FixedProbe::default()));
    let base = Instant::now();
    monitor.observe(at(base, 0, 0));
    for i in 1..=4 {
      monitor.observe(at(base, i * 1000, 10));
    }
    // The 0 MB sample has rolled out, so the window is flat
    assert_eq!(monitor.growth_rate(), 0.0);
  }

  #[test]
  fn test_sample_reads_probe() {
    let probe = FixedProbe::bytes(150 * MB);
    let mut monitor = ResourceMonitor::new(&config(), Box::new(probe.clone()));
    assert_eq!(monitor.sample(), PressureLevel::Elevated);

    *probe.0.lock().unwrap() = None;
    assert_eq!(monitor.sample(), PressureLevel::Elevated);
  }

  #[test]
  fn test_sysinfo_probe_reads_own_process() {
    let mut probe = SysinfoProbe::new();
    assert!(probe.resident_bytes().is_some_and(|b| b > 0));
  }
}
