//! An ordered index backed by a red-black tree.
//!
//! Nodes live in a [`generational_arena::Arena`] and link to each other through
//! arena indices, so the tree needs no unsafe pointer juggling and a stale
//! handle can never alias a recycled node. Leaves are represented by `None`
//! (there is no shared sentinel node).

use crate::error::{CacheError, Result};

use core::fmt;
use std::cmp::Ordering;
use std::sync::Arc;

use generational_arena::{Arena, Index};

/// A caller-supplied total order over keys.
pub type Comparator<K> = Arc<dyn Fn(&K, &K) -> Ordering + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
  Red,
  Black,
}

#[derive(Debug)]
struct Node<K, V> {
  key: K,
  data: V,
  color: Color,
  parent: Option<Index>,
  left: Option<Index>,
  right: Option<Index>,
}

/// A red-black tree keyed by an opaque comparator.
///
/// Duplicate keys are not rejected: the insert path walks to a leaf using
/// "less than" only, so an equal key lands to the right of the existing ones.
/// Lookups and deletes then find whichever equal node they reach first.
pub struct RbTree<K, V> {
  nodes: Arena<Node<K, V>>,
  root: Option<Index>,
  compare: Comparator<K>,
  node_limit: Option<usize>,
}

impl<K, V> fmt::Debug for RbTree<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RbTree")
      .field("len", &self.nodes.len())
      .field("node_limit", &self.node_limit)
      .finish_non_exhaustive()
  }
}

impl<K: Ord, V> RbTree<K, V> {
  /// Creates a tree ordered by the key's `Ord` implementation.
  pub fn ordered() -> Self {
    Self::new(|a: &K, b: &K| a.cmp(b))
  }
}

impl<K, V> RbTree<K, V> {
  pub fn new<F>(compare: F) -> Self
  where
    F: Fn(&K, &K) -> Ordering + Send + Sync + 'static,
  {
    Self::with_comparator(Arc::new(compare))
  }

  pub fn with_comparator(compare: Comparator<K>) -> Self {
    Self {
      nodes: Arena::new(),
      root: None,
      compare,
      node_limit: None,
    }
  }

  /// Bounds the number of nodes the tree may allocate. Inserting past the
  /// limit fails with [`CacheError::AllocationFailure`].
  pub fn with_node_limit(mut self, limit: usize) -> Self {
    self.node_limit = Some(limit);
    self
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.root.is_none()
  }

  /// Inserts `key` with `data`.
  ///
  /// On failure nothing has been linked in and the tree is unchanged; the
  /// rejected key and data are dropped.
  pub fn insert(&mut self, key: K, data: V) -> Result<()> {
    if let Some(limit) = self.node_limit {
      if self.nodes.len() >= limit {
        return Err(CacheError::AllocationFailure);
      }
    }

    let mut parent = None;
    let mut current = self.root;
    let mut go_left = false;
    while let Some(idx) = current {
      parent = Some(idx);
      go_left = (self.compare)(&key, &self.nodes[idx].key) == Ordering::Less;
      current = if go_left {
        self.nodes[idx].left
      } else {
        self.nodes[idx].right
      };
    }

    let node = self.nodes.insert(Node {
      key,
      data,
      color: Color::Red,
      parent,
      left: None,
      right: None,
    });

    match parent {
      None => self.root = Some(node),
      Some(p) if go_left => self.nodes[p].left = Some(node),
      Some(p) => self.nodes[p].right = Some(node),
    }

    self.insert_fixup(node);
    Ok(())
  }

  pub fn search(&self, key: &K) -> Option<&V> {
    self.find(key).map(|idx| &self.nodes[idx].data)
  }

  pub fn search_mut(&mut self, key: &K) -> Option<&mut V> {
    let idx = self.find(key)?;
    Some(&mut self.nodes[idx].data)
  }

  pub fn contains(&self, key: &K) -> bool {
    self.find(key).is_some()
  }

  /// Removes the node for `key`, returning its key and data.
  pub fn delete(&mut self, key: &K) -> Option<(K, V)> {
    let idx = self.find(key)?;
    self.delete_node(idx)
  }

  /// The smallest key and its data.
  pub fn minimum(&self) -> Option<(&K, &V)> {
    let idx = self.subtree_min(self.root?);
    let node = &self.nodes[idx];
    Some((&node.key, &node.data))
  }

  /// The largest key and its data.
  pub fn maximum(&self) -> Option<(&K, &V)> {
    let mut idx = self.root?;
    while let Some(right) = self.nodes[idx].right {
      idx = right;
    }
    let node = &self.nodes[idx];
    Some((&node.key, &node.data))
  }

  /// Frees every node.
  pub fn clear(&mut self) {
    self.nodes.clear();
    self.root = None;
  }

  /// In-order iteration over `(key, data)`.
  pub fn iter(&self) -> Iter<'_, K, V> {
    let mut iter = Iter {
      tree: self,
      stack: Vec::new(),
    };
    iter.push_left(self.root);
    iter
  }

  /// Checks the red-black invariants, the parent links and the key order.
  ///
  /// Returns the black height of the tree, or a description of the first
  /// violation found.
  pub fn validate(&self) -> std::result::Result<usize, String> {
    let Some(root) = self.root else {
      return Ok(0);
    };
    if self.nodes[root].color != Color::Black {
      return Err("root is red".to_string());
    }
    if self.nodes[root].parent.is_some() {
      return Err("root has a parent".to_string());
    }
    let height = self.validate_subtree(Some(root))?;
    let reachable = self.iter().count();
    if reachable != self.nodes.len() {
      return Err(format!(
        "{} nodes allocated but {} reachable",
        self.nodes.len(),
        reachable
      ));
    }
    Ok(height)
  }

  fn validate_subtree(&self, node: Option<Index>) -> std::result::Result<usize, String> {
    let Some(idx) = node else {
      return Ok(1);
    };
    let n = &self.nodes[idx];
    for child in [n.left, n.right].into_iter().flatten() {
      if self.nodes[child].parent != Some(idx) {
        return Err("child does not point back at its parent".to_string());
      }
      if n.color == Color::Red && self.nodes[child].color == Color::Red {
        return Err("red node has a red child".to_string());
      }
    }
    if let Some(left) = n.left {
      if (self.compare)(&self.nodes[left].key, &n.key) == Ordering::Greater {
        return Err("left child orders after its parent".to_string());
      }
    }
    if let Some(right) = n.right {
      if (self.compare)(&self.nodes[right].key, &n.key) == Ordering::Less {
        return Err("right child orders before its parent".to_string());
      }
    }
    let left = self.validate_subtree(n.left)?;
    let right = self.validate_subtree(n.right)?;
    if left != right {
      return Err(format!("black height mismatch: {left} vs {right}"));
    }
    Ok(left + usize::from(n.color == Color::Black))
  }

  fn find(&self, key: &K) -> Option<Index> {
    let mut current = self.root;
    while let Some(idx) = current {
      match (self.compare)(key, &self.nodes[idx].key) {
        Ordering::Equal => return Some(idx),
        Ordering::Less => current = self.nodes[idx].left,
        Ordering::Greater => current = self.nodes[idx].right,
      }
    }
    None
  }

  #[inline]
  fn color(&self, node: Option<Index>) -> Color {
    node.map_or(Color::Black, |idx| self.nodes[idx].color)
  }

  fn subtree_min(&self, mut idx: Index) -> Index {
    while let Some(left) = self.nodes[idx].left {
      idx = left;
    }
    idx
  }

  fn rotate_left(&mut self, x: Index) {
    let Some(y) = self.nodes[x].right else {
      return;
    };
    let y_left = self.nodes[y].left;
    self.nodes[x].right = y_left;
    if let Some(b) = y_left {
      self.nodes[b].parent = Some(x);
    }
    let x_parent = self.nodes[x].parent;
    self.nodes[y].parent = x_parent;
    match x_parent {
      None => self.root = Some(y),
      Some(p) if self.nodes[p].left == Some(x) => self.nodes[p].left = Some(y),
      Some(p) => self.nodes[p].right = Some(y),
    }
    self.nodes[y].left = Some(x);
    self.nodes[x].parent = Some(y);
  }

  fn rotate_right(&mut self, x: Index) {
    let Some(y) = self.nodes[x].left else {
      return;
    };
    let y_right = self.nodes[y].right;
    self.nodes[x].left = y_right;
    if let Some(b) = y_right {
      self.nodes[b].parent = Some(x);
    }
    let x_parent = self.nodes[x].parent;
    self.nodes[y].parent = x_parent;
    match x_parent {
      None => self.root = Some(y),
      Some(p) if self.nodes[p].right == Some(x) => self.nodes[p].right = Some(y),
      Some(p) => self.nodes[p].left = Some(y),
    }
    self.nodes[y].right = Some(x);
    self.nodes[x].parent = Some(y);
  }

  fn insert_fixup(&mut self, mut z: Index) {
    while let Some(p) = self.nodes[z].parent {
      if self.nodes[p].color == Color::Black {
        break;
      }
      // A red parent is never the root, so the grandparent exists.
      let Some(g) = self.nodes[p].parent else {
        break;
      };

      if self.nodes[g].left == Some(p) {
        let uncle = self.nodes[g].right;
        if let Some(u) = uncle.filter(|&u| self.nodes[u].color == Color::Red) {
          self.nodes[p].color = Color::Black;
          self.nodes[u].color = Color::Black;
          self.nodes[g].color = Color::Red;
          z = g;
          continue;
        }
        if self.nodes[p].right == Some(z) {
          // Inner grandchild: rotate it to the outside first.
          z = p;
          self.rotate_left(z);
        }
        let Some(p) = self.nodes[z].parent else { break };
        let Some(g) = self.nodes[p].parent else { break };
        self.nodes[p].color = Color::Black;
        self.nodes[g].color = Color::Red;
        self.rotate_right(g);
      } else {
        let uncle = self.nodes[g].left;
        if let Some(u) = uncle.filter(|&u| self.nodes[u].color == Color::Red) {
          self.nodes[p].color = Color::Black;
          self.nodes[u].color = Color::Black;
          self.nodes[g].color = Color::Red;
          z = g;
          continue;
        }
        if self.nodes[p].left == Some(z) {
          z = p;
          self.rotate_right(z);
        }
        let Some(p) = self.nodes[z].parent else { break };
        let Some(g) = self.nodes[p].parent else { break };
        self.nodes[p].color = Color::Black;
        self.nodes[g].color = Color::Red;
        self.rotate_left(g);
      }
    }

    if let Some(root) = self.root {
      self.nodes[root].color = Color::Black;
    }
  }

  /// Replaces the subtree rooted at `u` with the one rooted at `v`.
  fn transplant(&mut self, u: Index, v: Option<Index>) {
    let u_parent = self.nodes[u].parent;
    match u_parent {
      None => self.root = v,
      Some(p) if self.nodes[p].left == Some(u) => self.nodes[p].left = v,
      Some(p) => self.nodes[p].right = v,
    }
    if let Some(v) = v {
      self.nodes[v].parent = u_parent;
    }
  }

  fn delete_node(&mut self, z: Index) -> Option<(K, V)> {
    let removed_color;
    let x;
    let x_parent;

    match (self.nodes[z].left, self.nodes[z].right) {
      (None, right) => {
        removed_color = self.nodes[z].color;
        x = right;
        x_parent = self.nodes[z].parent;
        self.transplant(z, right);
      }
      (left, None) => {
        removed_color = self.nodes[z].color;
        x = left;
        x_parent = self.nodes[z].parent;
        self.transplant(z, left);
      }
      (Some(left), Some(right)) => {
        // Splice out the in-order successor and move it into z's place.
        let y = self.subtree_min(right);
        removed_color = self.nodes[y].color;
        x = self.nodes[y].right;
        if self.nodes[y].parent == Some(z) {
          x_parent = Some(y);
        } else {
          x_parent = self.nodes[y].parent;
          self.transplant(y, x);
          self.nodes[y].right = Some(right);
          self.nodes[right].parent = Some(y);
        }
        self.transplant(z, Some(y));
        self.nodes[y].left = Some(left);
        self.nodes[left].parent = Some(y);
        self.nodes[y].color = self.nodes[z].color;
      }
    }

    let node = self.nodes.remove(z)?;
    if removed_color == Color::Black {
      self.delete_fixup(x, x_parent);
    }
    Some((node.key, node.data))
  }

  fn delete_fixup(&mut self, mut x: Option<Index>, mut parent: Option<Index>) {
    while x != self.root && self.color(x) == Color::Black {
      let Some(p) = parent else {
        break;
      };

      if self.nodes[p].left == x {
        // x carries an extra black, so its sibling cannot be a leaf.
        let Some(mut w) = self.nodes[p].right else {
          break;
        };
        if self.nodes[w].color == Color::Red {
          self.nodes[w].color = Color::Black;
          self.nodes[p].color = Color::Red;
          self.rotate_left(p);
          let Some(next) = self.nodes[p].right else { break };
          w = next;
        }
        if self.color(self.nodes[w].left) == Color::Black
          && self.color(self.nodes[w].right) == Color::Black
        {
          self.nodes[w].color = Color::Red;
          x = Some(p);
          parent = self.nodes[p].parent;
        } else {
          if self.color(self.nodes[w].right) == Color::Black {
            if let Some(wl) = self.nodes[w].left {
              self.nodes[wl].color = Color::Black;
            }
            self.nodes[w].color = Color::Red;
            self.rotate_right(w);
            let Some(next) = self.nodes[p].right else { break };
            w = next;
          }
          self.nodes[w].color = self.nodes[p].color;
          self.nodes[p].color = Color::Black;
          if let Some(wr) = self.nodes[w].right {
            self.nodes[wr].color = Color::Black;
          }
          self.rotate_left(p);
          x = self.root;
          parent = None;
        }
      } else {
        let Some(mut w) = self.nodes[p].left else {
          break;
        };
        if self.nodes[w].color == Color::Red {
          self.nodes[w].color = Color::Black;
          self.nodes[p].color = Color::Red;
          self.rotate_right(p);
          let Some(next) = self.nodes[p].left else { break };
          w = next;
        }
        if self.color(self.nodes[w].left) == Color::Black
          && self.color(self.nodes[w].right) == Color::Black
        {
          self.nodes[w].color = Color::Red;
          x = Some(p);
          parent = self.nodes[p].parent;
        } else {
          if self.color(self.nodes[w].left) == Color::Black {
            if let Some(wr) = self.nodes[w].right {
              self.nodes[wr].color = Color::Black;
            }
            self.nodes[w].color = Color::Red;
            self.rotate_left(w);
            let Some(next) = self.nodes[p].left else { break };
            w = next;
          }
          self.nodes[w].color = self.nodes[p].color;
          self.nodes[p].color = Color::Black;
          if let Some(wl) = self.nodes[w].left {
            self.nodes[wl].color = Color::Black;
          }
          self.rotate_right(p);
          x = self.root;
          parent = None;
        }
      }
    }

    if let Some(x) = x {
      self.nodes[x].color = Color::Black;
    }
  }
}

/// In-order iterator returned by [`RbTree::iter`].
pub struct Iter<'a, K, V> {
  tree: &'a RbTree<K, V>,
  stack: Vec<Index>,
}

impl<K, V> Iter<'_, K, V> {
  fn push_left(&mut self, mut node: Option<Index>) {
    while let Some(idx) = node {
      self.stack.push(idx);
      node = self.tree.nodes[idx].left;
    }
  }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
  type Item = (&'a K, &'a V);

  fn next(&mut self) -> Option<Self::Item> {
    let idx = self.stack.pop()?;
    let tree = self.tree;
    self.push_left(tree.nodes[idx].right);
    let node = &tree.nodes[idx];
    Some((&node.key, &node.data))
  }
}
