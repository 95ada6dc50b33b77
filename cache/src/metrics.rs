use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// Lock-free counters updated by a cache as it runs.
#[derive(Debug)]
pub struct Metrics {
  // --- Lookups ---
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,

  // --- Payload lifecycle ---
  pub(crate) creates: CachePadded<AtomicU64>,
  pub(crate) create_failures: CachePadded<AtomicU64>,
  pub(crate) evictions: CachePadded<AtomicU64>,
  pub(crate) drops: CachePadded<AtomicU64>,
  pub(crate) deferred_frees: CachePadded<AtomicU64>,

  // --- Reference counting ---
  pub(crate) still_referenced_skips: CachePadded<AtomicU64>,
  pub(crate) ref_underflows: CachePadded<AtomicU64>,

  pub(crate) current_size: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      creates: CachePadded::new(AtomicU64::new(0)),
      create_failures: CachePadded::new(AtomicU64::new(0)),
      evictions: CachePadded::new(AtomicU64::new(0)),
      drops: CachePadded::new(AtomicU64::new(0)),
      deferred_frees: CachePadded::new(AtomicU64::new(0)),
      still_referenced_skips: CachePadded::new(AtomicU64::new(0)),
      ref_underflows: CachePadded::new(AtomicU64::new(0)),
      current_size: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  #[inline]
  pub(crate) fn set_size(&self, size: usize) {
    self.current_size.store(size as u64, Ordering::Relaxed);
  }

  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    let hits = self.hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let total_lookups = hits + misses;

    MetricsSnapshot {
      hits,
      misses,
      hit_ratio: if total_lookups == 0 {
        0.0
      } else {
        hits as f64 / total_lookups as f64
      },
      creates: self.creates.load(Ordering::Relaxed),
      create_failures: self.create_failures.load(Ordering::Relaxed),
      evictions: self.evictions.load(Ordering::Relaxed),
      drops: self.drops.load(Ordering::Relaxed),
      deferred_frees: self.deferred_frees.load(Ordering::Relaxed),
      still_referenced_skips: self.still_referenced_skips.load(Ordering::Relaxed),
      ref_underflows: self.ref_underflows.load(Ordering::Relaxed),
      current_size: self.current_size.load(Ordering::Relaxed),
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time copy of a cache's [`Metrics`].
#[derive(Clone, Default)]
pub struct MetricsSnapshot {
  /// Lookups that found a resident entry.
  pub hits: u64,
  /// Lookups that found nothing.
  pub misses: u64,
  /// hits / (hits + misses).
  pub hit_ratio: f64,
  /// Payloads built by the create callback.
  pub creates: u64,
  /// Create callbacks that returned nothing, plus index insert failures.
  pub create_failures: u64,
  /// Entries evicted to make room.
  pub evictions: u64,
  /// Entries removed through `drop`/`drop_all`.
  pub drops: u64,
  /// Dropped entries whose free waited for their last release.
  pub deferred_frees: u64,
  /// Times a referenced entry blocked an eviction or a `drop_all`.
  pub still_referenced_skips: u64,
  /// Releases of entries that were not acquired.
  pub ref_underflows: u64,
  /// Resident entries.
  pub current_size: u64,
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("hits", &self.hits)
      .field("misses", &self.misses)
      .field("hit_ratio", &format!("{:.2}%", self.hit_ratio * 100.0))
      .field("creates", &self.creates)
      .field("create_failures", &self.create_failures)
      .field("evictions", &self.evictions)
      .field("drops", &self.drops)
      .field("deferred_frees", &self.deferred_frees)
      .field("still_referenced_skips", &self.still_referenced_skips)
      .field("ref_underflows", &self.ref_underflows)
      .field("current_size", &self.current_size)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
