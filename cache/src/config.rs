use crate::class::CacheKind;

/// Plain-data description of a cache, for hosts that keep their cache sizes
/// in a configuration file. Turned into a cache with
/// [`CacheBuilder::from_config`](crate::CacheBuilder::from_config).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CacheConfig {
  /// Maximum number of resident entries. Zero disables the cache.
  pub max_size: usize,
  pub kind: CacheKind,
  pub name: Option<String>,
  /// Caps the number of index nodes the LRU class may allocate.
  pub node_limit: Option<usize>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      max_size: 16,
      kind: CacheKind::default(),
      name: None,
      node_limit: None,
    }
  }
}
