use thiserror::Error;

/// Errors returned by cache operations.
///
/// Resource exhaustion is an expected condition on the targets this cache runs
/// on, so every variant is meant to be handled locally by the caller (for
/// example by drawing a placeholder instead of the image that failed to load).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
  /// A node or entry could not be allocated. The index was left untouched.
  #[error("allocation failed while inserting into the cache index")]
  AllocationFailure,

  /// The cache is full and every resident entry is still referenced.
  #[error("cache is full ({size}/{max_size}) and no evictable entry was found")]
  CapacityExceeded { size: usize, max_size: usize },

  /// The payload constructor reported failure. No entry was published.
  #[error("payload constructor failed")]
  CreateFailed,

  /// Entries that had to leave the cache are still referenced, so the request
  /// could only be partly honoured.
  #[error("{count} entries are still referenced")]
  ReferencedEntry { count: usize },

  /// The cache is disabled (`max_size == 0`).
  #[error("cache is disabled")]
  Disabled,
}

/// Errors that can occur when building a cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  /// No payload create/free operations were configured.
  #[error("a cache requires entry operations (create/free callbacks)")]
  MissingOps,
}

/// A specialized `Result` type for cache operations.
pub type Result<T, E = CacheError> = std::result::Result<T, E>;
