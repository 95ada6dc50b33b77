use super::lru_list::RecencyList;
use super::{CacheClass, CacheKind};
use crate::entry::CacheEntry;
use crate::error::Result;
use crate::rb::{Comparator, RbTree};

use std::fmt;
use std::sync::Arc;

use generational_arena::Index;

// What the tree stores per key: the entry itself plus the handle of its node in
// the recency list.
struct Slot<K, V> {
  entry: Arc<CacheEntry<K, V>>,
  node: Index,
}

/// Least-recently-used class. Keys are indexed by a red-black tree ordered by
/// the cache's comparator; recency is tracked by a doubly linked list whose
/// head is the most recently used entry.
///
/// The tree and the list always hold exactly the same entries.
pub struct LruRbClass<K, V> {
  tree: RbTree<K, Slot<K, V>>,
  list: RecencyList<K, V>,
}

impl<K, V> fmt::Debug for LruRbClass<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LruRbClass")
      .field("len", &self.tree.len())
      .finish_non_exhaustive()
  }
}

impl<K, V> LruRbClass<K, V> {
  pub fn new(compare: Comparator<K>) -> Self {
    Self {
      tree: RbTree::with_comparator(compare),
      list: RecencyList::new(),
    }
  }

  /// Bounds the number of tree nodes; inserts beyond it fail with
  /// [`CacheError::AllocationFailure`](crate::CacheError::AllocationFailure).
  pub fn with_node_limit(mut self, limit: usize) -> Self {
    self.tree = self.tree.with_node_limit(limit);
    self
  }

  /// Resident keys from most to least recently used.
  pub fn recency_order(&self) -> Vec<&K> {
    self.list.iter_from_head().map(|e| e.key()).collect()
  }
}

impl<K, V> CacheClass<K, V> for LruRbClass<K, V>
where
  K: Clone + Send + Sync,
  V: Send + Sync,
{
  fn kind(&self) -> CacheKind {
    CacheKind::LruRb
  }

  fn len(&self) -> usize {
    self.tree.len()
  }

  fn get(&mut self, key: &K) -> Option<Arc<CacheEntry<K, V>>> {
    let slot = self.tree.search(key)?;
    let entry = slot.entry.clone();
    let node = slot.node;
    // Hits on the head are common (the same glyph or image drawn repeatedly).
    if self.list.head() != Some(node) {
      self.list.move_to_front(node);
    }
    Some(entry)
  }

  fn find(&self, key: &K) -> Option<Arc<CacheEntry<K, V>>> {
    self.tree.search(key).map(|slot| slot.entry.clone())
  }

  fn add(&mut self, entry: Arc<CacheEntry<K, V>>, _max_size: usize) -> Result<()> {
    debug_assert!(
      !self.tree.contains(entry.key()),
      "key is already resident in the LRU index"
    );
    let key = entry.key().clone();
    let node = self.list.push_front(entry.clone());
    if let Err(err) = self.tree.insert(key, Slot { entry, node }) {
      self.list.remove(node);
      return Err(err);
    }
    Ok(())
  }

  fn remove(&mut self, entry: &Arc<CacheEntry<K, V>>) -> bool {
    let node = match self.tree.search(entry.key()) {
      Some(slot) if Arc::ptr_eq(&slot.entry, entry) => slot.node,
      _ => return false,
    };
    self.tree.delete(entry.key());
    self.list.remove(node);
    true
  }

  fn get_victim(&mut self) -> Option<Arc<CacheEntry<K, V>>> {
    let victim = self.list.iter_from_tail().find(|e| !e.is_referenced()).cloned();
    if victim.is_none() && !self.tree.is_empty() {
      tracing::debug!(len = self.tree.len(), "every LRU entry is referenced");
    }
    victim
  }

  fn entries(&self) -> Vec<Arc<CacheEntry<K, V>>> {
    self.tree.iter().map(|(_, slot)| slot.entry.clone()).collect()
  }
}
