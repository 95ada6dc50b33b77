use std::time::Duration;

/// Tuning knobs of a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DispatcherConfig {
  /// How long a surface may go without any task finishing before waiting on
  /// it fails with [`DrawError::Stalled`](crate::DrawError::Stalled).
  pub stall_timeout_ms: u64,
  /// Longest sleep between polls while nothing signals new work.
  pub idle_poll_ms: u64,
}

impl Default for DispatcherConfig {
  fn default() -> Self {
    Self {
      stall_timeout_ms: 2_000,
      idle_poll_ms: 5,
    }
  }
}

impl DispatcherConfig {
  pub fn stall_timeout(mut self, timeout: Duration) -> Self {
    self.stall_timeout_ms = timeout.as_millis() as u64;
    self
  }

  pub fn idle_poll(mut self, interval: Duration) -> Self {
    self.idle_poll_ms = interval.as_millis().max(1) as u64;
    self
  }

  pub(crate) fn stall_timeout_duration(&self) -> Duration {
    Duration::from_millis(self.stall_timeout_ms)
  }

  pub(crate) fn idle_poll_duration(&self) -> Duration {
    Duration::from_millis(self.idle_poll_ms.max(1))
  }
}
