use crate::dispatcher::DispatchSignal;
use crate::surface::Surface;
use crate::task::{DrawTask, UnitId};

use std::sync::Arc;

/// What a unit did with one dispatch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DispatchOutcome {
  /// Nothing to do for this unit on this surface.
  Idle = 0,
  /// One task was claimed (and, for synchronous units, rendered).
  Claimed = 1,
  /// The unit wanted a task but hit a transient resource shortage. The
  /// scheduler retries later.
  Busy = -1,
}

/// Everything a unit needs during one dispatch call.
pub struct DispatchContext<'a> {
  pub(crate) unit: UnitId,
  pub(crate) surface: &'a Arc<Surface>,
  pub(crate) signal: &'a DispatchSignal,
}

impl<'a> DispatchContext<'a> {
  /// The id this unit was registered under.
  #[inline]
  pub fn unit_id(&self) -> UnitId {
    self.unit
  }

  #[inline]
  pub fn surface(&self) -> &'a Arc<Surface> {
    self.surface
  }

  /// Peeks at the task this unit would get, without claiming it.
  pub fn next_available_task(&self) -> Option<Arc<DrawTask>> {
    self.surface.next_available_task(self.unit)
  }

  /// Claims the next task for this unit.
  pub fn claim_next(&self) -> Option<Arc<DrawTask>> {
    self.surface.claim_next(self.unit)
  }

  /// Asks for another dispatch pass. Call after finishing a task: the freed
  /// area may unblock tasks queued behind it.
  pub fn request_dispatch(&self) {
    self.signal.notify();
  }
}

/// A rendering back-end (software rasterizer, GPU, remote coprocessor).
///
/// `dispatch` does bounded work, at most one task, and returns. Dropping the
/// unit is its teardown.
pub trait DrawUnit: Send + Sync {
  fn name(&self) -> &str;

  /// Lets the unit bid on `task` with [`DrawTask::bid`]. Called once per task
  /// before it becomes claimable; must not do anything besides bidding.
  fn evaluate(&self, _unit: UnitId, _task: &DrawTask) {}

  fn dispatch(&self, ctx: &DispatchContext<'_>) -> DispatchOutcome;
}
