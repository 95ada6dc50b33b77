use std::time::Duration;

use thiserror::Error;

/// Failures of the coprocessor memory allocator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
  /// The append-only backing store cannot fit the block. Coprocessor memory is
  /// only reclaimed by resetting the whole session.
  #[error("coprocessor memory exhausted: {requested} bytes requested, {remaining} left")]
  OutOfSpace { requested: u32, remaining: u32 },

  #[error("alignment {0} is not a power of two")]
  BadAlignment(u32),
}

/// Errors surfaced by the scheduler and the render units.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DrawError {
  /// No task on the surface made progress within the stall timeout.
  #[error("surface `{surface}` stalled with {pending} pending tasks after {waited:?}")]
  Stalled {
    surface: String,
    pending: usize,
    waited: Duration,
  },

  /// A unit's render routine failed on one task.
  #[error("render failed: {0}")]
  Render(String),

  /// The transport to a remote coprocessor failed.
  #[error("coprocessor link error: {0}")]
  Link(String),

  #[error(transparent)]
  Alloc(#[from] AllocError),
}

/// A specialized `Result` type for scheduler operations.
pub type Result<T, E = DrawError> = std::result::Result<T, E>;
