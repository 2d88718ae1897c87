//! Cooperative cancellation and run budgets
//!
//! A `CancelScope` pairs a node of the cancellation tree with an optional wall-clock
//! deadline. Nothing is interrupted preemptively: engines and the batch loop call
//! `is_cancelled()` at their checkpoints, and the first check after a deadline
//! passes trips the token for that scope and all of its children.
//!
//! ```text
//! run scope (global timeout, external signal)
//!   ├── fix phase scope (share of remaining budget)
//!   └── check phase scope (rest of the budget)
//!         ├── batch 1 scope
//!         └── batch 2 scope
//! ```

use crate::engine::Phase;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Granularity of `CancelScope::sleep`
const SLEEP_SLICE: Duration = Duration::from_millis(5);

/// One node of the cancellation tree
#[derive(Debug, Clone)]
pub struct CancelScope {
  token: CancellationToken,
  deadline: Option<Instant>,
}

impl CancelScope {
  /// Root scope without a deadline
  pub fn new() -> Self {
    Self {
      token: CancellationToken::new(),
      deadline: None,
    }
  }

  /// Root scope that expires after `timeout`
  pub fn with_timeout(timeout: Duration) -> Self {
    Self {
      token: CancellationToken::new(),
      deadline: Some(Instant::now() + timeout),
    }
  }

  /// Root scope driven by an external signal (hook/CLI), plus an optional timeout
  pub fn from_token(external: &CancellationToken, timeout: Option<Duration>) -> Self {
    Self {
      token: external.child_token(),
      deadline: timeout.map(|t| Instant::now() + t),
    }
  }

  /// Whether work under this scope should stop
  pub fn is_cancelled(&self) -> bool {
    if self.token.is_cancelled() {
      return true;
    }
    if self.deadline_passed() {
      self.token.cancel();
      return true;
    }
    false
  }

  /// Whether this scope's deadline is behind us
  pub fn deadline_passed(&self) -> bool {
    self.deadline.is_some_and(|d| Instant::now() >= d)
  }

  /// Cancel this scope and every child scope
  pub fn cancel(&self) {
    self.token.cancel();
  }

  /// Derive a child scope; its deadline never exceeds the parent's
  pub fn child(&self, budget: Option<Duration>) -> CancelScope {
    let own = budget.map(|b| Instant::now() + b);
    let deadline = match (self.deadline, own) {
      (Some(parent), Some(own)) => Some(parent.min(own)),
      (parent, own) => parent.or(own),
    };
    CancelScope {
      token: self.token.child_token(),
      deadline,
    }
  }

  pub fn deadline(&self) -> Option<Instant> {
    self.deadline
  }

  /// Time left before the deadline (`None` = unbounded)
  pub fn remaining(&self) -> Option<Duration> {
    self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
  }

  /// Sleep up to `duration`, waking early on cancellation.
  ///
  /// Returns `false` when the scope was cancelled during the wait.
  pub fn sleep(&self, duration: Duration) -> bool {
    let until = Instant::now() + duration;
    loop {
      if self.is_cancelled() {
        return false;
      }
      let now = Instant::now();
      if now >= until {
        return true;
      }
      std::thread::sleep(SLEEP_SLICE.min(until - now));
    }
  }
}

impl Default for CancelScope {
  fn default() -> Self {
    Self::new()
  }
}

/// Converts one run-wide budget into phase and batch deadlines
pub struct TimeoutManager {
  root: CancelScope,
  started: Instant,
  fix_phase_share: f64,
}

impl TimeoutManager {
  pub fn new(timeout: Option<Duration>, external: Option<&CancellationToken>, fix_phase_share: f64) -> Self {
    let root = match external {
      Some(token) => CancelScope::from_token(token, timeout),
      None => match timeout {
        Some(t) => CancelScope::with_timeout(t),
        None => CancelScope::new(),
      },
    };
    Self {
      root,
      started: Instant::now(),
      fix_phase_share: fix_phase_share.clamp(0.05, 1.0),
    }
  }

  pub fn root(&self) -> &CancelScope {
    &self.root
  }

  /// Whether the whole run has been cancelled or has run out of time
  pub fn is_cancelled(&self) -> bool {
    self.root.is_cancelled()
  }

  pub fn elapsed(&self) -> Duration {
    self.started.elapsed()
  }

  /// Scope for one pipeline phase.
  ///
  /// The fix phase gets a share of what is left so a slow fixer cannot starve the
  /// check phase; the check phase gets everything that remains.
  pub fn phase_scope(&self, phase: Phase) -> CancelScope {
    let budget = match phase {
      Phase::Fix => self.root.remaining().map(|r| r.mul_f64(self.fix_phase_share)),
      Phase::Check => None,
    };
    self.root.child(budget)
  }

  /// Scope for one batch under a phase scope, bounded by `max`
  pub fn batch_scope(&self, phase: &CancelScope, max: Option<Duration>) -> CancelScope {
    phase.child(max)
  }

  /// Whether the run deadline is closer than `threshold`
  pub fn is_imminent(&self, threshold: Duration) -> bool {
    self.root.remaining().is_some_and(|r| r <= threshold)
  }
}
