use super::{CacheClass, CacheKind};
use crate::entry::{CacheEntry, EntryFlags};
use crate::error::{CacheError, Result};
use crate::rb::Comparator;

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Second-chance (CLOCK) class over a dynamic array.
///
/// Entries live in a contiguous `Vec` scanned linearly, which suits the small
/// caches (a few dozen glyphs or images) typical of embedded targets. Each
/// entry's [`EntryFlags::CLASS_CUSTOM`] bit is its second chance: set on insert
/// and on every hit, cleared by the victim scan.
pub struct SecondChanceClass<K, V> {
  compare: Comparator<K>,
  entries: Vec<Arc<CacheEntry<K, V>>>,
  // Logical capacity. Doubles when full, never above the cache's max size.
  capacity: usize,
}

impl<K, V> fmt::Debug for SecondChanceClass<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SecondChanceClass")
      .field("len", &self.entries.len())
      .field("capacity", &self.capacity)
      .finish_non_exhaustive()
  }
}

impl<K, V> SecondChanceClass<K, V> {
  pub fn new(compare: Comparator<K>) -> Self {
    Self {
      compare,
      entries: Vec::new(),
      capacity: 0,
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  fn position(&self, key: &K) -> Option<usize> {
    self
      .entries
      .iter()
      .position(|e| (self.compare)(e.key(), key) == Ordering::Equal)
  }

  fn grow(&mut self, max_size: usize) -> Result<()> {
    if self.capacity >= max_size {
      tracing::error!(
        size = self.entries.len(),
        max_size,
        "reached maximum size of cache, unable to allocate a new entry"
      );
      return Err(CacheError::CapacityExceeded {
        size: self.entries.len(),
        max_size,
      });
    }
    let new_capacity = if self.capacity == 0 {
      1
    } else {
      self.capacity * 2
    }
    .min(max_size);
    let additional = new_capacity.saturating_sub(self.entries.len());
    self.entries.try_reserve_exact(additional).map_err(|_| {
      tracing::error!(new_capacity, "failed to grow the second-chance array");
      CacheError::AllocationFailure
    })?;
    self.capacity = new_capacity;
    Ok(())
  }

  // Returns the entry at `index` if it is evictable right now. Otherwise takes
  // away its second chance when it still had one.
  fn possible_victim(&self, index: usize) -> Option<&Arc<CacheEntry<K, V>>> {
    let entry = &self.entries[index];
    let second_chance = entry.has_flag(EntryFlags::CLASS_CUSTOM);
    let refs = entry.ref_count();
    if !second_chance {
      if refs == 0 {
        return Some(entry);
      }
      tracing::trace!(index, refs, "entry should be evicted but is still referenced");
      return None;
    }
    entry.remove_flag(EntryFlags::CLASS_CUSTOM);
    None
  }
}

impl<K, V> CacheClass<K, V> for SecondChanceClass<K, V>
where
  K: Send + Sync,
  V: Send + Sync,
{
  fn kind(&self) -> CacheKind {
    CacheKind::SecondChance
  }

  fn len(&self) -> usize {
    self.entries.len()
  }

  fn get(&mut self, key: &K) -> Option<Arc<CacheEntry<K, V>>> {
    let entry = &self.entries[self.position(key)?];
    entry.set_flag(EntryFlags::CLASS_CUSTOM);
    Some(entry.clone())
  }

  fn find(&self, key: &K) -> Option<Arc<CacheEntry<K, V>>> {
    self.position(key).map(|i| self.entries[i].clone())
  }

  fn add(&mut self, entry: Arc<CacheEntry<K, V>>, max_size: usize) -> Result<()> {
    if self.entries.len() >= self.capacity {
      self.grow(max_size)?;
    }
    // The array owns the slot; entries are never freed individually.
    entry.set_flag(EntryFlags::DISABLE_DELETE | EntryFlags::CLASS_CUSTOM);
    self.entries.push(entry);
    Ok(())
  }

  fn remove(&mut self, entry: &Arc<CacheEntry<K, V>>) -> bool {
    match self.entries.iter().position(|e| Arc::ptr_eq(e, entry)) {
      Some(index) => {
        // The last entry fills the hole, as the array stays dense.
        self.entries.swap_remove(index);
        true
      }
      None => false,
    }
  }

  /// Scans the array twice. The first pass clears second-chance bits and
  /// stops at the first entry without one that is unreferenced; the second
  /// pass finds entries whose bit was cleared by the first.
  fn set_max_size(&mut self, max_size: usize) {
    self.capacity = self.capacity.min(max_size);
    self.entries.shrink_to(self.capacity);
  }

  fn get_victim(&mut self) -> Option<Arc<CacheEntry<K, V>>> {
    for _ in 0..2 {
      for index in 0..self.entries.len() {
        if let Some(victim) = self.possible_victim(index) {
          return Some(victim.clone());
        }
      }
    }
    None
  }

  fn entries(&self) -> Vec<Arc<CacheEntry<K, V>>> {
    self.entries.clone()
  }
}
