use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};

/// Flags stored in an entry's header.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryFlags(u8);

impl EntryFlags {
  pub const NONE: Self = Self(0);
  /// The entry was dropped while still referenced. It is no longer reachable
  /// through its cache and is freed by the last release.
  pub const INVALID: Self = Self(1 << 0);
  /// The entry's storage belongs to its cache class and must not be freed
  /// individually.
  pub const DISABLE_DELETE: Self = Self(1 << 1);
  /// Reserved for the cache class; the second-chance class keeps its
  /// reference bit here.
  pub const CLASS_CUSTOM: Self = Self(1 << 2);

  #[inline]
  pub const fn bits(self) -> u8 {
    self.0
  }

  #[inline]
  pub const fn contains(self, other: Self) -> bool {
    self.0 & other.0 == other.0
  }
}

impl std::ops::BitOr for EntryFlags {
  type Output = Self;
  fn bitor(self, rhs: Self) -> Self {
    Self(self.0 | rhs.0)
  }
}

impl fmt::Debug for EntryFlags {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut names = Vec::new();
    if self.0 & Self::INVALID.0 != 0 {
      names.push("INVALID");
    }
    if self.0 & Self::DISABLE_DELETE.0 != 0 {
      names.push("DISABLE_DELETE");
    }
    if self.0 & Self::CLASS_CUSTOM.0 != 0 {
      names.push("CLASS_CUSTOM");
    }
    write!(f, "EntryFlags({})", names.join(" | "))
  }
}

/// Outcome of a [`CacheEntry::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefRelease {
  /// The count was decremented; `remaining` acquisitions are still live.
  Released { remaining: i32 },
  /// The count was already zero. Nothing changed.
  Underflow,
}

/// Bookkeeping that travels with every cached payload.
#[derive(Debug)]
pub(crate) struct EntryHeader {
  cache_id: u64,
  ref_cnt: AtomicI32,
  node_size: usize,
  flags: AtomicU8,
  freed: AtomicBool,
}

/// A cached payload followed by its reference-counted header.
///
/// The owning cache decides when an entry is freed; callers only ever hold
/// counted acquisitions. While [`ref_count`](Self::ref_count) is above zero the
/// entry is never chosen as a victim and never handed to the free callback.
pub struct CacheEntry<K, V> {
  key: K,
  value: V,
  header: EntryHeader,
}

impl<K, V> fmt::Debug for CacheEntry<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheEntry")
      .field("cache_id", &self.header.cache_id)
      .field("ref_cnt", &self.ref_count())
      .field("node_size", &self.header.node_size)
      .field("flags", &self.flags())
      .finish_non_exhaustive()
  }
}

impl<K, V> CacheEntry<K, V> {
  pub(crate) fn new(key: K, value: V, cache_id: u64) -> Self {
    Self {
      key,
      value,
      header: EntryHeader {
        cache_id,
        ref_cnt: AtomicI32::new(0),
        node_size: mem::size_of::<V>(),
        flags: AtomicU8::new(EntryFlags::NONE.bits()),
        freed: AtomicBool::new(false),
      },
    }
  }

  #[inline]
  pub fn key(&self) -> &K {
    &self.key
  }

  /// The payload, without touching the reference count.
  #[inline]
  pub fn value(&self) -> &V {
    &self.value
  }

  /// Size of the payload this entry's cache was created for.
  #[inline]
  pub fn node_size(&self) -> usize {
    self.header.node_size
  }

  #[inline]
  pub(crate) fn cache_id(&self) -> u64 {
    self.header.cache_id
  }

  // Only the cache acquires, under its lock, so an entry that has left the
  // index can never gain a new reference.
  #[inline]
  pub(crate) fn acquire(&self) -> &V {
    self.header.ref_cnt.fetch_add(1, Ordering::AcqRel);
    &self.value
  }

  /// Gives back one acquisition.
  ///
  /// Releasing an entry whose count is already zero logs a warning and leaves
  /// the count at zero.
  pub fn release(&self) -> RefRelease {
    let mut current = self.header.ref_cnt.load(Ordering::Acquire);
    loop {
      if current <= 0 {
        tracing::warn!(
          cache_id = self.header.cache_id,
          "ref count underflow: entry released more often than acquired"
        );
        return RefRelease::Underflow;
      }
      match self.header.ref_cnt.compare_exchange_weak(
        current,
        current - 1,
        Ordering::AcqRel,
        Ordering::Acquire,
      ) {
        Ok(_) => {
          return RefRelease::Released {
            remaining: current - 1,
          }
        }
        Err(actual) => current = actual,
      }
    }
  }

  #[inline]
  pub fn ref_count(&self) -> i32 {
    self.header.ref_cnt.load(Ordering::Acquire)
  }

  #[inline]
  pub fn is_referenced(&self) -> bool {
    self.ref_count() > 0
  }

  #[inline]
  pub fn flags(&self) -> EntryFlags {
    EntryFlags(self.header.flags.load(Ordering::Acquire))
  }

  #[inline]
  pub fn has_flag(&self, flag: EntryFlags) -> bool {
    self.flags().contains(flag)
  }

  #[inline]
  pub(crate) fn set_flag(&self, flag: EntryFlags) {
    self.header.flags.fetch_or(flag.bits(), Ordering::AcqRel);
  }

  #[inline]
  pub(crate) fn remove_flag(&self, flag: EntryFlags) {
    self.header.flags.fetch_and(!flag.bits(), Ordering::AcqRel);
  }

  #[inline]
  pub fn is_invalid(&self) -> bool {
    self.has_flag(EntryFlags::INVALID)
  }

  #[inline]
  pub fn set_invalid(&self) {
    self.set_flag(EntryFlags::INVALID);
  }

  /// Claims the right to run the free callback. Only the first caller wins.
  #[inline]
  pub(crate) fn mark_freed(&self) -> bool {
    !self.header.freed.swap(true, Ordering::AcqRel)
  }
}
