use crate::cache::{next_cache_id, Cache, CacheShared, CacheState};
use crate::class::CacheKind;
use crate::config::CacheConfig;
use crate::error::BuildError;
use crate::metrics::Metrics;
use crate::ops::{CreateFn, EntryOps, FnOps, FreeFn};
use crate::rb::Comparator;

use core::fmt;
use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;

/// A builder for [`Cache`] instances.
///
/// ```
/// use lumen_cache::{CacheBuilder, CacheKind};
///
/// let glyphs = CacheBuilder::<char, Vec<u8>>::new(64)
///   .kind(CacheKind::SecondChance)
///   .name("glyphs")
///   .create_with(|c| Some(vec![*c as u8; 16]))
///   .build()
///   .unwrap();
/// assert_eq!(glyphs.acquire_or_create(&'a').unwrap().len(), 16);
/// ```
pub struct CacheBuilder<K, V> {
  max_size: usize,
  kind: CacheKind,
  name: Option<String>,
  node_limit: Option<usize>,
  compare: Comparator<K>,
  ops: Option<Arc<dyn EntryOps<K, V>>>,
  create: Option<CreateFn<K, V>>,
  free: Option<FreeFn<K, V>>,
}

impl<K, V> fmt::Debug for CacheBuilder<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBuilder")
      .field("max_size", &self.max_size)
      .field("kind", &self.kind)
      .field("name", &self.name)
      .field("node_limit", &self.node_limit)
      .field("has_ops", &(self.ops.is_some() || self.create.is_some()))
      .finish_non_exhaustive()
  }
}

impl<K: Ord + 'static, V> CacheBuilder<K, V> {
  /// A builder for a cache of at most `max_size` entries, ordered by `K: Ord`.
  pub fn new(max_size: usize) -> Self {
    Self::with_comparator(max_size, |a: &K, b: &K| a.cmp(b))
  }

  pub fn from_config(config: &CacheConfig) -> Self {
    let mut builder = Self::new(config.max_size).kind(config.kind);
    builder.name = config.name.clone();
    builder.node_limit = config.node_limit;
    builder
  }
}

impl<K, V> CacheBuilder<K, V> {
  /// A builder for keys ordered by a custom comparator.
  pub fn with_comparator<F>(max_size: usize, compare: F) -> Self
  where
    F: Fn(&K, &K) -> Ordering + Send + Sync + 'static,
  {
    Self {
      max_size,
      kind: CacheKind::default(),
      name: None,
      node_limit: None,
      compare: Arc::new(compare),
      ops: None,
      create: None,
      free: None,
    }
  }

  pub fn max_size(mut self, max_size: usize) -> Self {
    self.max_size = max_size;
    self
  }

  /// Selects the eviction policy. Defaults to [`CacheKind::LruRb`].
  pub fn kind(mut self, kind: CacheKind) -> Self {
    self.kind = kind;
    self
  }

  /// Names the cache in log output.
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  /// Bounds the LRU index to `limit` nodes. Ignored by the second-chance
  /// class, whose array is bounded by `max_size` already.
  pub fn node_limit(mut self, limit: usize) -> Self {
    self.node_limit = Some(limit);
    self
  }

  /// Sets the payload callbacks. Replaces anything set with
  /// [`create_with`](Self::create_with).
  pub fn ops<O>(mut self, ops: O) -> Self
  where
    O: EntryOps<K, V> + 'static,
  {
    self.ops = Some(Arc::new(ops));
    self
  }

  pub fn create_with<C>(mut self, create: C) -> Self
  where
    C: Fn(&K) -> Option<V> + Send + Sync + 'static,
  {
    self.ops = None;
    self.create = Some(Box::new(create));
    self
  }

  /// Sets the callback run when a payload leaves the cache. Only used
  /// together with [`create_with`](Self::create_with).
  pub fn on_free<F>(mut self, free: F) -> Self
  where
    F: Fn(&K, &V) + Send + Sync + 'static,
  {
    self.free = Some(Box::new(free));
    self
  }

  /// Builds the cache.
  pub fn build(self) -> Result<Cache<K, V>, BuildError>
  where
    K: Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
  {
    let ops: Arc<dyn EntryOps<K, V>> = match (self.ops, self.create) {
      (Some(ops), _) => ops,
      (None, Some(create)) => Arc::new(FnOps {
        create,
        free: self.free,
      }),
      (None, None) => return Err(BuildError::MissingOps),
    };

    let id = next_cache_id();
    let name = self.name.unwrap_or_else(|| format!("cache#{id}"));
    if self.max_size == 0 {
      tracing::debug!(cache = %name, "built with max_size 0, cache is disabled");
    }
    let class = self.kind.build::<K, V>(self.compare, self.node_limit);

    Ok(Cache {
      shared: Arc::new(CacheShared {
        id,
        name,
        state: Mutex::new(CacheState {
          class,
          max_size: self.max_size,
        }),
        ops,
        metrics: Metrics::new(),
      }),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_missing_ops_is_rejected() {
    let err = CacheBuilder::<u32, u32>::new(4).build().unwrap_err();
    assert_eq!(err, BuildError::MissingOps);
  }

  #[test]
  fn test_defaults() {
    let cache = CacheBuilder::<u32, u32>::new(4)
      .create_with(|k| Some(*k))
      .build()
      .unwrap();
    assert_eq!(cache.kind(), CacheKind::LruRb);
    assert!(cache.name().starts_with("cache#"));
    assert_eq!(cache.max_size(), 4);
    assert!(cache.is_enabled());
  }

  #[test]
  fn test_from_config_carries_every_field() {
    let config = CacheConfig {
      max_size: 8,
      kind: CacheKind::SecondChance,
      name: Some("images".into()),
      node_limit: Some(4),
    };
    let cache = CacheBuilder::<u32, u32>::from_config(&config)
      .create_with(|k| Some(*k))
      .build()
      .unwrap();
    assert_eq!(cache.name(), "images");
    assert_eq!(cache.kind(), CacheKind::SecondChance);
    assert_eq!(cache.max_size(), 8);
  }

  #[test]
  fn test_custom_comparator_orders_entries() {
    let cache = CacheBuilder::<u32, u32>::with_comparator(8, |a: &u32, b: &u32| b.cmp(a))
      .create_with(|k| Some(*k))
      .build()
      .unwrap();
    for k in [1, 5, 3] {
      cache.acquire_or_create(&k).unwrap();
    }
    let keys: Vec<u32> = cache.iter().map(|e| *e.key()).collect();
    assert_eq!(keys, vec![5, 3, 1]);
  }

  #[test]
  fn test_node_limit_surfaces_allocation_failure() {
    let cache = CacheBuilder::<u32, u32>::new(8)
      .node_limit(1)
      .create_with(|k| Some(*k))
      .build()
      .unwrap();
    cache.acquire_or_create(&1).unwrap();
    assert_eq!(
      cache.acquire_or_create(&2).unwrap_err(),
      crate::CacheError::AllocationFailure
    );
    assert_eq!(cache.size(), 1);
  }
}
