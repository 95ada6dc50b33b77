use crate::class::{CacheClass, CacheKind, DropAllReport, DropOutcome, ReserveCond};
use crate::entry::{CacheEntry, RefRelease};
use crate::error::{CacheError, Result};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::ops::EntryOps;

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_cache_id() -> u64 {
  NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed)
}

pub(crate) struct CacheState<K, V> {
  pub(crate) class: Box<dyn CacheClass<K, V>>,
  pub(crate) max_size: usize,
}

pub(crate) struct CacheShared<K, V> {
  pub(crate) id: u64,
  pub(crate) name: String,
  pub(crate) state: Mutex<CacheState<K, V>>,
  pub(crate) ops: Arc<dyn EntryOps<K, V>>,
  pub(crate) metrics: Metrics,
}

impl<K, V> Drop for CacheShared<K, V> {
  fn drop(&mut self) {
    let state = self.state.get_mut();
    let report = state.class.drop_all(&*self.ops);
    if report.still_referenced > 0 {
      tracing::warn!(
        cache = %self.name,
        count = report.still_referenced,
        "cache destroyed while entries are still referenced"
      );
    }
  }
}

/// A bounded, reference-counted cache.
///
/// Every index mutation happens under one mutex. The payload constructor runs
/// while that mutex is held, so two threads missing on the same key produce a
/// single payload; the constructor must therefore never call back into the
/// same cache.
///
/// `Cache` is a cheap handle: clones share the same storage.
pub struct Cache<K, V> {
  pub(crate) shared: Arc<CacheShared<K, V>>,
}

impl<K, V> Clone for Cache<K, V> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<K, V> fmt::Debug for Cache<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.shared.state.lock();
    f.debug_struct("Cache")
      .field("name", &self.shared.name)
      .field("kind", &state.class.kind())
      .field("size", &state.class.len())
      .field("max_size", &state.max_size)
      .finish_non_exhaustive()
  }
}

impl<K, V> Cache<K, V>
where
  K: Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
{
  pub fn name(&self) -> &str {
    &self.shared.name
  }

  pub fn kind(&self) -> CacheKind {
    self.shared.state.lock().class.kind()
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.metrics.snapshot()
  }

  pub fn max_size(&self) -> usize {
    self.shared.state.lock().max_size
  }

  /// Number of resident entries.
  pub fn size(&self) -> usize {
    self.shared.state.lock().class.len()
  }

  pub fn free_size(&self) -> usize {
    let state = self.shared.state.lock();
    state.max_size.saturating_sub(state.class.len())
  }

  /// A cache with a `max_size` of zero stores nothing.
  pub fn is_enabled(&self) -> bool {
    self.max_size() > 0
  }

  /// Looks `key` up, recording the access with the eviction policy. The
  /// returned entry is not acquired.
  pub fn get(&self, key: &K) -> Option<Arc<CacheEntry<K, V>>> {
    let mut state = self.shared.state.lock();
    self.lookup_locked(&mut state, key)
  }

  /// Looks `key` up and takes a counted acquisition on a hit.
  pub fn acquire(&self, key: &K) -> Option<EntryGuard<K, V>> {
    let mut state = self.shared.state.lock();
    let entry = self.lookup_locked(&mut state, key)?;
    entry.acquire();
    Some(self.guard(entry))
  }

  /// Returns the entry for `key`, building it with the create callback on a
  /// miss. Victims are evicted first when the cache is full.
  pub fn acquire_or_create(&self, key: &K) -> Result<EntryGuard<K, V>> {
    let mut state = self.shared.state.lock();
    let entry = match self.lookup_locked(&mut state, key) {
      Some(entry) => entry,
      None => self.create_locked(&mut state, key)?,
    };
    entry.acquire();
    Ok(self.guard(entry))
  }

  /// Builds a new entry for `key` without looking it up first. A resident
  /// entry with the same key is dropped and replaced.
  pub fn add(&self, key: &K) -> Result<EntryGuard<K, V>> {
    let mut state = self.shared.state.lock();
    if let Some(old) = state.class.find(key) {
      tracing::debug!(cache = %self.shared.name, "replacing resident entry");
      self.detach_locked(&mut state, &old);
    }
    let entry = self.create_locked(&mut state, key)?;
    entry.acquire();
    Ok(self.guard(entry))
  }

  /// Gives back one acquisition of `entry`.
  ///
  /// A dropped entry whose last acquisition goes away is freed here.
  pub fn release(&self, entry: &Arc<CacheEntry<K, V>>) {
    if entry.cache_id() != self.shared.id {
      tracing::error!(
        cache = %self.shared.name,
        owner = entry.cache_id(),
        "entry released through a cache that does not own it"
      );
      return;
    }
    let _state = self.shared.state.lock();
    match entry.release() {
      RefRelease::Underflow => Metrics::bump(&self.shared.metrics.ref_underflows),
      RefRelease::Released { remaining: 0 } if entry.is_invalid() => {
        if entry.mark_freed() {
          self.shared.ops.free(entry.key(), entry.value());
          Metrics::bump(&self.shared.metrics.deferred_frees);
          tracing::trace!(cache = %self.shared.name, "freed dropped entry on last release");
        }
      }
      RefRelease::Released { .. } => {}
    }
  }

  /// Unlinks `entry` from the index without freeing its payload.
  pub fn remove(&self, entry: &Arc<CacheEntry<K, V>>) -> bool {
    let mut state = self.shared.state.lock();
    let removed = state.class.remove(entry);
    self.shared.metrics.set_size(state.class.len());
    removed
  }

  /// Removes `key` and frees its payload. A referenced entry is marked invalid
  /// and freed by its last [`release`](Self::release).
  pub fn drop(&self, key: &K) -> bool {
    let mut state = self.shared.state.lock();
    let outcome = state.class.drop_key(key, &*self.shared.ops);
    self.shared.metrics.set_size(state.class.len());
    match outcome {
      DropOutcome::Missing => false,
      DropOutcome::Freed => {
        Metrics::bump(&self.shared.metrics.drops);
        true
      }
      DropOutcome::Deferred(entry) => {
        Metrics::bump(&self.shared.metrics.drops);
        tracing::debug!(
          cache = %self.shared.name,
          refs = entry.ref_count(),
          "dropped entry is still referenced, free deferred"
        );
        true
      }
    }
  }

  /// Frees every unreferenced entry. Referenced entries stay resident.
  pub fn drop_all(&self) -> DropAllReport {
    let mut state = self.shared.state.lock();
    let report = state.class.drop_all(&*self.shared.ops);
    let metrics = &self.shared.metrics;
    metrics.drops.fetch_add(report.freed as u64, Ordering::Relaxed);
    metrics
      .still_referenced_skips
      .fetch_add(report.still_referenced as u64, Ordering::Relaxed);
    metrics.set_size(state.class.len());
    report
  }

  /// Whether `n` more entries would fit.
  pub fn reserve_cond(&self, n: usize) -> ReserveCond {
    let state = self.shared.state.lock();
    state.class.reserve_cond(n, state.max_size)
  }

  /// Evicts until `n` more entries fit.
  pub fn reserve(&self, n: usize) -> Result<()> {
    let mut state = self.shared.state.lock();
    loop {
      match state.class.reserve_cond(n, state.max_size) {
        ReserveCond::Ok => return Ok(()),
        ReserveCond::Error => {
          return Err(CacheError::CapacityExceeded {
            size: n,
            max_size: state.max_size,
          })
        }
        ReserveCond::NeedVictim => {
          if !self.evict_locked(&mut state) {
            return Err(CacheError::CapacityExceeded {
              size: state.class.len(),
              max_size: state.max_size,
            });
          }
        }
      }
    }
  }

  /// Evicts the policy's next victim. Returns `false` when nothing is
  /// evictable.
  pub fn evict_one(&self) -> bool {
    let mut state = self.shared.state.lock();
    self.evict_locked(&mut state)
  }

  /// Changes the bound. Shrinking evicts down to the new bound; referenced
  /// entries that are in the way are reported as an error but stay resident.
  pub fn set_max_size(&self, max_size: usize) -> Result<()> {
    let mut state = self.shared.state.lock();
    state.max_size = max_size;
    state.class.set_max_size(max_size);
    while state.class.len() > max_size {
      if !self.evict_locked(&mut state) {
        let count = state.class.len() - max_size;
        tracing::warn!(
          cache = %self.shared.name,
          count,
          max_size,
          "cannot shrink below referenced entries"
        );
        return Err(CacheError::ReferencedEntry { count });
      }
    }
    Ok(())
  }

  /// A snapshot of the resident entries.
  pub fn iter(&self) -> std::vec::IntoIter<Arc<CacheEntry<K, V>>> {
    self.shared.state.lock().class.entries().into_iter()
  }

  fn guard(&self, entry: Arc<CacheEntry<K, V>>) -> EntryGuard<K, V> {
    EntryGuard {
      cache: self.clone(),
      entry,
      armed: true,
    }
  }

  fn lookup_locked(
    &self,
    state: &mut CacheState<K, V>,
    key: &K,
  ) -> Option<Arc<CacheEntry<K, V>>> {
    let found = state.class.get(key);
    let counter = if found.is_some() {
      &self.shared.metrics.hits
    } else {
      &self.shared.metrics.misses
    };
    Metrics::bump(counter);
    found
  }

  fn create_locked(
    &self,
    state: &mut CacheState<K, V>,
    key: &K,
  ) -> Result<Arc<CacheEntry<K, V>>> {
    if state.max_size == 0 {
      return Err(CacheError::Disabled);
    }
    while state.class.len() >= state.max_size {
      if !self.evict_locked(state) {
        tracing::warn!(
          cache = %self.shared.name,
          size = state.class.len(),
          max_size = state.max_size,
          "cache is full and every entry is referenced"
        );
        return Err(CacheError::CapacityExceeded {
          size: state.class.len(),
          max_size: state.max_size,
        });
      }
    }

    let Some(value) = self.shared.ops.create(key) else {
      Metrics::bump(&self.shared.metrics.create_failures);
      tracing::debug!(cache = %self.shared.name, "create callback failed");
      return Err(CacheError::CreateFailed);
    };
    let entry = Arc::new(CacheEntry::new(key.clone(), value, self.shared.id));
    if let Err(err) = state.class.add(entry.clone(), state.max_size) {
      // The payload exists but was never published.
      entry.set_invalid();
      if entry.mark_freed() {
        self.shared.ops.free(entry.key(), entry.value());
      }
      Metrics::bump(&self.shared.metrics.create_failures);
      tracing::error!(cache = %self.shared.name, error = %err, "failed to index new entry");
      return Err(err);
    }
    Metrics::bump(&self.shared.metrics.creates);
    self.shared.metrics.set_size(state.class.len());
    Ok(entry)
  }

  fn evict_locked(&self, state: &mut CacheState<K, V>) -> bool {
    let Some(victim) = state.class.get_victim() else {
      if !state.class.is_empty() {
        Metrics::bump(&self.shared.metrics.still_referenced_skips);
      }
      return false;
    };
    state.class.remove(&victim);
    victim.set_invalid();
    if victim.mark_freed() {
      self.shared.ops.free(victim.key(), victim.value());
    }
    Metrics::bump(&self.shared.metrics.evictions);
    self.shared.metrics.set_size(state.class.len());
    tracing::trace!(cache = %self.shared.name, "evicted entry");
    true
  }

  fn detach_locked(&self, state: &mut CacheState<K, V>, entry: &Arc<CacheEntry<K, V>>) {
    state.class.remove(entry);
    if entry.is_referenced() {
      entry.set_invalid();
    } else if entry.mark_freed() {
      self.shared.ops.free(entry.key(), entry.value());
    }
    Metrics::bump(&self.shared.metrics.drops);
    self.shared.metrics.set_size(state.class.len());
  }
}

/// A counted acquisition of a cache entry, released on drop.
pub struct EntryGuard<K, V>
where
  K: Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
{
  cache: Cache<K, V>,
  entry: Arc<CacheEntry<K, V>>,
  armed: bool,
}

impl<K, V> EntryGuard<K, V>
where
  K: Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
{
  pub fn key(&self) -> &K {
    self.entry.key()
  }

  pub fn value(&self) -> &V {
    self.entry.value()
  }

  pub fn entry(&self) -> &Arc<CacheEntry<K, V>> {
    &self.entry
  }

  /// Keeps the acquisition alive past the guard. The caller becomes
  /// responsible for a matching [`Cache::release`].
  pub fn into_entry(mut self) -> Arc<CacheEntry<K, V>> {
    self.armed = false;
    self.entry.clone()
  }
}

impl<K, V> Deref for EntryGuard<K, V>
where
  K: Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
{
  type Target = V;

  fn deref(&self) -> &V {
    self.entry.value()
  }
}

impl<K, V> fmt::Debug for EntryGuard<K, V>
where
  K: Clone + Send + Sync + fmt::Debug + 'static,
  V: Send + Sync + 'static,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EntryGuard")
      .field("key", self.entry.key())
      .field("refs", &self.entry.ref_count())
      .finish_non_exhaustive()
  }
}

impl<K, V> Drop for EntryGuard<K, V>
where
  K: Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
{
  fn drop(&mut self) {
    if self.armed {
      self.cache.release(&self.entry);
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::class::CacheKind;
  use crate::error::CacheError;
  use crate::CacheBuilder;

  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  #[test]
  fn test_miss_then_hit() {
    let cache = CacheBuilder::<u32, String>::new(4)
      .create_with(|k| Some(format!("img{k}")))
      .build()
      .unwrap();
    assert!(cache.get(&1).is_none());
    {
      let guard = cache.acquire_or_create(&1).unwrap();
      assert_eq!(&*guard, "img1");
      assert_eq!(guard.entry().ref_count(), 1);
    }
    let again = cache.acquire(&1).unwrap();
    assert_eq!(again.value(), "img1");
    let m = cache.metrics();
    assert_eq!((m.creates, m.hits), (1, 1));
    assert_eq!(m.misses, 2);
  }

  #[test]
  fn test_disabled_cache_refuses_entries() {
    let cache = CacheBuilder::<u32, u32>::new(0)
      .create_with(|k| Some(*k))
      .build()
      .unwrap();
    assert!(!cache.is_enabled());
    assert_eq!(cache.acquire_or_create(&1).unwrap_err(), CacheError::Disabled);
  }

  #[test]
  fn test_create_failure_publishes_nothing() {
    let cache = CacheBuilder::<u32, u32>::new(2)
      .create_with(|k| if *k == 13 { None } else { Some(*k) })
      .build()
      .unwrap();
    assert_eq!(cache.acquire_or_create(&13).unwrap_err(), CacheError::CreateFailed);
    assert_eq!(cache.size(), 0);
    assert_eq!(cache.metrics().create_failures, 1);
  }

  #[test]
  fn test_add_replaces_resident_entry() {
    let frees = Arc::new(AtomicUsize::new(0));
    let counter = frees.clone();
    let cache = CacheBuilder::<u32, u32>::new(4)
      .create_with(|k| Some(*k))
      .on_free(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
      })
      .build()
      .unwrap();
    let first = cache.add(&1).unwrap().into_entry();
    let second = cache.add(&1).unwrap();
    assert_eq!(cache.size(), 1);
    assert!(first.is_invalid());
    assert!(!Arc::ptr_eq(&first, second.entry()));
    assert_eq!(frees.load(Ordering::SeqCst), 0);

    cache.release(&first);
    assert_eq!(frees.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_release_through_foreign_cache_is_ignored() {
    let a = CacheBuilder::<u32, u32>::new(2).create_with(|k| Some(*k)).build().unwrap();
    let b = CacheBuilder::<u32, u32>::new(2).create_with(|k| Some(*k)).build().unwrap();
    let entry = a.acquire_or_create(&1).unwrap().into_entry();
    b.release(&entry);
    assert_eq!(entry.ref_count(), 1);
    a.release(&entry);
    assert_eq!(entry.ref_count(), 0);
  }

  #[test]
  fn test_reserve_evicts_until_room() {
    let cache = CacheBuilder::<u32, u32>::new(3)
      .kind(CacheKind::SecondChance)
      .create_with(|k| Some(*k))
      .build()
      .unwrap();
    for k in 0..3 {
      cache.acquire_or_create(&k).unwrap();
    }
    assert_eq!(cache.free_size(), 0);
    cache.reserve(2).unwrap();
    assert_eq!(cache.size(), 1);
    assert!(matches!(
      cache.reserve(4),
      Err(CacheError::CapacityExceeded { size: 4, max_size: 3 })
    ));
  }

  #[test]
  fn test_shrinking_stops_at_referenced_entries() {
    let cache = CacheBuilder::<u32, u32>::new(4)
      .create_with(|k| Some(*k))
      .build()
      .unwrap();
    let held: Vec<_> = (0..3).map(|k| cache.acquire_or_create(&k).unwrap()).collect();
    assert_eq!(
      cache.set_max_size(1),
      Err(CacheError::ReferencedEntry { count: 2 })
    );
    drop(held);
    cache.set_max_size(1).unwrap();
    assert_eq!(cache.size(), 1);
    assert_eq!(cache.max_size(), 1);
  }
}
