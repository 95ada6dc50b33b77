//! A reference-counted resource cache for embedded renderers.
//!
//! Decoded images, rasterized glyphs and GPU textures are expensive to
//! produce and are needed again frame after frame. A [`Cache`] memoizes them
//! behind a pluggable eviction policy and keeps every entry alive for exactly
//! as long as somebody holds an acquisition on it.
//!
//! # Features
//! - **Two cache classes**: an LRU indexed by a red-black tree
//!   ([`CacheKind::LruRb`]) and a second-chance array for small caches
//!   ([`CacheKind::SecondChance`]).
//! - **Reference counting**: referenced entries are never evicted; an entry
//!   dropped while in use is freed by its last release.
//! - **At most one payload per key**: the create callback runs under the
//!   cache lock.
//! - **Observability**: `tracing` events and lock-free [`MetricsSnapshot`]s.
//! - **Configuration**: optional `serde` support for [`CacheConfig`].

pub mod builder;
pub mod class;
pub mod config;
pub mod error;
pub mod metrics;
pub mod ops;
pub mod rb;

mod cache;
mod entry;

pub use builder::CacheBuilder;
pub use cache::{Cache, EntryGuard};
pub use class::{CacheClass, CacheKind, DropAllReport, DropOutcome, ReserveCond};
pub use config::CacheConfig;
pub use entry::{CacheEntry, EntryFlags, RefRelease};
pub use error::{BuildError, CacheError};
pub use metrics::MetricsSnapshot;
pub use ops::{EntryOps, FnOps};
pub use rb::RbTree;
