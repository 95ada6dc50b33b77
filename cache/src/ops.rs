use std::fmt;

/// Payload lifecycle callbacks supplied by the subsystem that owns a cache.
///
/// `create` performs the expensive work on a miss (decode an image, rasterize
/// a glyph, upload a texture). `free` releases whatever `create` acquired
/// outside of Rust's ownership, e.g. a GPU texture handle. Both run while the
/// cache's lock is held, so neither may call back into the same cache.
pub trait EntryOps<K, V>: Send + Sync {
  /// Builds the payload for `key`. Returning `None` aborts the insert.
  fn create(&self, key: &K) -> Option<V>;

  /// Disposes of a payload that is leaving the cache.
  fn free(&self, _key: &K, _value: &V) {}
}

pub(crate) type CreateFn<K, V> = Box<dyn Fn(&K) -> Option<V> + Send + Sync>;
pub(crate) type FreeFn<K, V> = Box<dyn Fn(&K, &V) + Send + Sync>;

/// [`EntryOps`] built from closures.
pub struct FnOps<K, V> {
  pub(crate) create: CreateFn<K, V>,
  pub(crate) free: Option<FreeFn<K, V>>,
}

impl<K, V> FnOps<K, V> {
  pub fn new<C>(create: C) -> Self
  where
    C: Fn(&K) -> Option<V> + Send + Sync + 'static,
  {
    Self {
      create: Box::new(create),
      free: None,
    }
  }

  /// Sets the callback run when a payload leaves the cache.
  pub fn on_free<F>(mut self, free: F) -> Self
  where
    F: Fn(&K, &V) + Send + Sync + 'static,
  {
    self.free = Some(Box::new(free));
    self
  }
}

impl<K, V> fmt::Debug for FnOps<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FnOps")
      .field("has_free", &self.free.is_some())
      .finish_non_exhaustive()
  }
}

impl<K, V> EntryOps<K, V> for FnOps<K, V> {
  fn create(&self, key: &K) -> Option<V> {
    (self.create)(key)
  }

  fn free(&self, key: &K, value: &V) {
    if let Some(free) = &self.free {
      free(key, value);
    }
  }
}
