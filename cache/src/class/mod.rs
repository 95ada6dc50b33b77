pub mod lru_rb;
pub mod sc_da;

mod lru_list;

use crate::entry::CacheEntry;
use crate::error::Result;
use crate::ops::EntryOps;
use crate::rb::Comparator;

use std::sync::Arc;

pub use lru_rb::LruRbClass;
pub use sc_da::SecondChanceClass;

/// Answer of [`CacheClass::reserve_cond`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveCond {
  /// The requested entries fit without evicting anything.
  Ok,
  /// Victims have to be evicted first.
  NeedVictim,
  /// The request can never be satisfied (it exceeds the whole capacity).
  Error,
}

/// Which eviction policy a cache is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CacheKind {
  /// Least recently used, indexed by a red-black tree.
  #[default]
  LruRb,
  /// Second chance (CLOCK) over a contiguous array.
  SecondChance,
}

/// Result of [`CacheClass::drop_key`].
#[derive(Debug)]
pub enum DropOutcome<K, V> {
  /// No entry matched the key.
  Missing,
  /// The entry was detached and freed.
  Freed,
  /// The entry was still referenced: it was detached and marked invalid, and
  /// is freed when the last acquisition is released.
  Deferred(Arc<CacheEntry<K, V>>),
}

/// Counts reported by [`CacheClass::drop_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropAllReport {
  pub freed: usize,
  pub still_referenced: usize,
}

/// The index and eviction policy behind a [`Cache`](crate::Cache).
///
/// Implementations only organize entries; the owning cache holds the lock,
/// the payload callbacks and the capacity bookkeeping. Construction and `Drop`
/// take the place of explicit alloc/init/destroy hooks.
pub trait CacheClass<K, V>: Send {
  fn kind(&self) -> CacheKind;

  /// Number of entries in the index.
  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Looks `key` up and records the access with the policy.
  fn get(&mut self, key: &K) -> Option<Arc<CacheEntry<K, V>>>;

  /// Looks `key` up without touching the policy state.
  fn find(&self, key: &K) -> Option<Arc<CacheEntry<K, V>>>;

  /// Links a freshly built entry into the index. On error the index is
  /// unchanged.
  fn add(&mut self, entry: Arc<CacheEntry<K, V>>, max_size: usize) -> Result<()>;

  /// Unlinks `entry` without freeing its payload. Returns `false` if this
  /// exact entry is not in the index.
  fn remove(&mut self, entry: &Arc<CacheEntry<K, V>>) -> bool;

  /// Called when the owning cache's max size changes.
  fn set_max_size(&mut self, _max_size: usize) {}

  /// Picks the next entry to evict. Referenced entries are never returned.
  fn get_victim(&mut self) -> Option<Arc<CacheEntry<K, V>>>;

  /// Whether `reserved` more entries would fit under `max_size`.
  fn reserve_cond(&self, reserved: usize, max_size: usize) -> ReserveCond {
    if reserved > max_size {
      ReserveCond::Error
    } else if self.len() + reserved > max_size {
      ReserveCond::NeedVictim
    } else {
      ReserveCond::Ok
    }
  }

  /// A snapshot of the resident entries in index order.
  fn entries(&self) -> Vec<Arc<CacheEntry<K, V>>>;

  /// Finds `key`, detaches it and frees it, deferring the free when the entry
  /// is still referenced.
  fn drop_key(&mut self, key: &K, ops: &dyn EntryOps<K, V>) -> DropOutcome<K, V> {
    let Some(entry) = self.find(key) else {
      return DropOutcome::Missing;
    };
    self.remove(&entry);
    if entry.is_referenced() {
      entry.set_invalid();
      return DropOutcome::Deferred(entry);
    }
    if entry.mark_freed() {
      ops.free(entry.key(), entry.value());
    }
    DropOutcome::Freed
  }

  /// Frees every unreferenced entry. Referenced entries stay resident.
  fn drop_all(&mut self, ops: &dyn EntryOps<K, V>) -> DropAllReport {
    let mut report = DropAllReport::default();
    for (index, entry) in self.entries().into_iter().enumerate() {
      let refs = entry.ref_count();
      if refs > 0 {
        tracing::warn!(index, refs, "entry is still referenced");
        report.still_referenced += 1;
        continue;
      }
      self.remove(&entry);
      entry.set_invalid();
      if entry.mark_freed() {
        ops.free(entry.key(), entry.value());
      }
      report.freed += 1;
    }
    if report.still_referenced > 0 {
      tracing::warn!(
        count = report.still_referenced,
        "entries are still referenced"
      );
    }
    report
  }
}

impl CacheKind {
  pub(crate) fn build<K, V>(
    self,
    compare: Comparator<K>,
    node_limit: Option<usize>,
  ) -> Box<dyn CacheClass<K, V>>
  where
    K: Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
  {
    match self {
      CacheKind::LruRb => {
        let class = LruRbClass::new(compare);
        Box::new(match node_limit {
          Some(limit) => class.with_node_limit(limit),
          None => class,
        })
      }
      CacheKind::SecondChance => Box::new(SecondChanceClass::new(compare)),
    }
  }
}
