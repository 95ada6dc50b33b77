use crate::entry::CacheEntry;

use std::sync::Arc;

use generational_arena::{Arena, Index};

#[derive(Debug)]
pub(super) struct Node<K, V> {
  pub(super) entry: Arc<CacheEntry<K, V>>,
  pub(super) next: Option<Index>,
  pub(super) prev: Option<Index>,
}

// Recency order for the LRU class. Head is the most recently used entry,
// tail the least. Lookup by key lives in the red-black tree, which stores the
// arena index of each entry's node here.
#[derive(Debug)]
pub(super) struct RecencyList<K, V> {
  pub(super) nodes: Arena<Node<K, V>>,
  pub(super) head: Option<Index>,
  pub(super) tail: Option<Index>,
}

impl<K, V> RecencyList<K, V> {
  pub fn new() -> Self {
    Self {
      nodes: Arena::new(),
      head: None,
      tail: None,
    }
  }

  // Detaches a node from its neighbours. The node stays in the arena.
  fn unlink(&mut self, index: Index) {
    let node = &self.nodes[index];
    let prev_node_idx = node.prev;
    let next_node_idx = node.next;

    if let Some(prev_idx) = prev_node_idx {
      self.nodes[prev_idx].next = next_node_idx;
    } else {
      self.head = next_node_idx;
    }

    if let Some(next_idx) = next_node_idx {
      self.nodes[next_idx].prev = prev_node_idx;
    } else {
      self.tail = prev_node_idx;
    }
  }

  fn push_front_node(&mut self, index: Index) {
    let old_head_idx = self.head;
    self.nodes[index].next = old_head_idx;
    self.nodes[index].prev = None;
    self.head = Some(index);

    if let Some(old_head) = old_head_idx {
      self.nodes[old_head].prev = Some(index);
    }

    if self.tail.is_none() {
      self.tail = Some(index);
    }
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  #[inline]
  pub fn head(&self) -> Option<Index> {
    self.head
  }

  pub fn push_front(&mut self, entry: Arc<CacheEntry<K, V>>) -> Index {
    let index = self.nodes.insert(Node {
      entry,
      next: None,
      prev: None,
    });
    self.push_front_node(index);
    index
  }

  pub fn move_to_front(&mut self, index: Index) {
    if self.head != Some(index) && self.nodes.contains(index) {
      self.unlink(index);
      self.push_front_node(index);
    }
  }

  pub fn remove(&mut self, index: Index) -> Option<Arc<CacheEntry<K, V>>> {
    if !self.nodes.contains(index) {
      return None;
    }
    self.unlink(index);
    self.nodes.remove(index).map(|node| node.entry)
  }

  /// Entries from least to most recently used.
  pub fn iter_from_tail(&self) -> impl Iterator<Item = &Arc<CacheEntry<K, V>>> + '_ {
    let mut current = self.tail;
    std::iter::from_fn(move || {
      let index = current?;
      let node = &self.nodes[index];
      current = node.prev;
      Some(&node.entry)
    })
  }

  /// Entries from most to least recently used.
  pub fn iter_from_head(&self) -> impl Iterator<Item = &Arc<CacheEntry<K, V>>> + '_ {
    let mut current = self.head;
    std::iter::from_fn(move || {
      let index = current?;
      let node = &self.nodes[index];
      current = node.next;
      Some(&node.entry)
    })
  }

  pub fn clear(&mut self) {
    self.nodes.clear();
    self.head = None;
    self.tail = None;
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn entry(key: i32) -> Arc<CacheEntry<i32, ()>> {
    Arc::new(CacheEntry::new(key, (), 0))
  }

  fn keys(list: &RecencyList<i32, ()>) -> Vec<i32> {
    list.iter_from_head().map(|e| *e.key()).collect()
  }

  #[test]
  fn test_new_list_is_empty() {
    let list = RecencyList::<i32, ()>::new();
    assert!(keys(&list).is_empty(), "New list keys should be empty");
    assert_eq!(list.len(), 0);
    assert_eq!(list.head(), None);
  }

  #[test]
  fn test_push_front_orders_newest_first() {
    let mut list = RecencyList::new();
    list.push_front(entry(10));
    list.push_front(entry(20));
    assert_eq!(keys(&list), vec![20, 10], "Newest item should be at the front");
    let tail_first: Vec<i32> = list.iter_from_tail().map(|e| *e.key()).collect();
    assert_eq!(tail_first, vec![10, 20]);
  }

  #[test]
  fn test_move_to_front_reorders() {
    let mut list = RecencyList::new();
    let one = list.push_front(entry(1));
    list.push_front(entry(2));
    list.push_front(entry(3));
    assert_eq!(keys(&list), vec![3, 2, 1]);

    list.move_to_front(one);
    assert_eq!(keys(&list), vec![1, 3, 2], "Existing item should move to front");
    assert_eq!(list.len(), 3, "Length should not change");

    // Already at the head: no-op.
    list.move_to_front(one);
    assert_eq!(keys(&list), vec![1, 3, 2]);
  }

  #[test]
  fn test_remove_from_middle_head_and_tail() {
    let mut list = RecencyList::new();
    let one = list.push_front(entry(1));
    let two = list.push_front(entry(2));
    let three = list.push_front(entry(3));

    assert_eq!(list.remove(two).map(|e| *e.key()), Some(2));
    assert_eq!(keys(&list), vec![3, 1]);
    assert_eq!(list.remove(three).map(|e| *e.key()), Some(3));
    assert_eq!(keys(&list), vec![1]);
    assert_eq!(list.remove(one).map(|e| *e.key()), Some(1));
    assert!(keys(&list).is_empty());
    assert_eq!(list.head(), None);
    assert!(list.remove(one).is_none(), "Stale index must be rejected");
  }

  #[test]
  fn test_clear_resets_list() {
    let mut list = RecencyList::new();
    list.push_front(entry(1));
    list.push_front(entry(2));
    list.clear();
    assert!(keys(&list).is_empty());
    assert_eq!(list.len(), 0);
  }
}
