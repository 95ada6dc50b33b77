use crate::area::Area;
use crate::surface::Surface;

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

/// Identifies a registered draw unit. Ids start at 1; [`UnitId::ANY`] means
/// "no preference".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub u32);

impl UnitId {
  pub const ANY: UnitId = UnitId(0);
}

impl fmt::Display for UnitId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if *self == Self::ANY {
      f.write_str("any")
    } else {
      write!(f, "#{}", self.0)
    }
  }
}

/// Lifecycle of a draw task.
///
/// `Waiting -> Queued -> InProgress -> Finished -> Ready`. Only the dispatch
/// protocol moves a task to `InProgress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskState {
  /// Added, but possibly blocked on a child surface.
  Waiting = 0,
  /// Evaluated and claimable.
  Queued = 1,
  InProgress = 2,
  /// Fully rendered and released by the scheduler.
  Ready = 3,
  /// Rendered by its unit; the next sweep turns it `Ready`.
  Finished = 4,
}

impl TaskState {
  fn from_u8(raw: u8) -> Self {
    match raw {
      0 => TaskState::Waiting,
      1 => TaskState::Queued,
      2 => TaskState::InProgress,
      3 => TaskState::Ready,
      _ => TaskState::Finished,
    }
  }

  /// Rendering is over (`Finished` or `Ready`).
  #[inline]
  pub fn is_done(self) -> bool {
    matches!(self, TaskState::Finished | TaskState::Ready)
  }
}

/// What a task draws. Units use it to decide whether to bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TaskKind {
  Fill,
  Border,
  BoxShadow,
  Label,
  Image,
  Layer,
  Line,
  Arc,
  Triangle,
  Mask,
  Vector,
}

/// Score of a task nobody has bid on yet.
pub const NO_BID: u32 = u32::MAX;
/// What the software renderer bids. Anything lower is a better fit.
pub const SOFTWARE_SCORE: u32 = 100;

/// Opaque descriptor carried by a task (fill color, glyph handle, image
/// entry). Units downcast it with [`DrawTask::payload`].
pub type Payload = Arc<dyn Any + Send + Sync>;

/// A unit of drawing work queued on a [`Surface`].
pub struct DrawTask {
  id: u64,
  kind: TaskKind,
  area: Area,
  clip_area: Area,
  state: AtomicU8,
  preferred_unit: AtomicU32,
  preference_score: AtomicU32,
  evaluated: AtomicBool,
  payload: Option<Payload>,
  depends_on: Option<Arc<Surface>>,
}

impl fmt::Debug for DrawTask {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DrawTask")
      .field("id", &self.id)
      .field("kind", &self.kind)
      .field("area", &self.area)
      .field("state", &self.state())
      .field("preferred_unit", &self.preferred_unit())
      .field("preference_score", &self.preference_score())
      .finish_non_exhaustive()
  }
}

impl DrawTask {
  pub(crate) fn new(id: u64, desc: TaskDesc) -> Self {
    Self {
      id,
      kind: desc.kind,
      area: desc.area,
      clip_area: desc.clip_area.unwrap_or(desc.area),
      state: AtomicU8::new(TaskState::Waiting as u8),
      preferred_unit: AtomicU32::new(UnitId::ANY.0),
      preference_score: AtomicU32::new(NO_BID),
      evaluated: AtomicBool::new(false),
      payload: desc.payload,
      depends_on: desc.depends_on,
    }
  }

  #[inline]
  pub fn id(&self) -> u64 {
    self.id
  }

  #[inline]
  pub fn kind(&self) -> TaskKind {
    self.kind
  }

  #[inline]
  pub fn area(&self) -> Area {
    self.area
  }

  #[inline]
  pub fn clip_area(&self) -> Area {
    self.clip_area
  }

  /// The part of the task that actually has to be drawn.
  pub fn visible_area(&self) -> Option<Area> {
    self.area.intersect(&self.clip_area)
  }

  #[inline]
  pub fn state(&self) -> TaskState {
    TaskState::from_u8(self.state.load(Ordering::Acquire))
  }

  pub fn payload<T: Any>(&self) -> Option<&T> {
    self.payload.as_ref()?.downcast_ref::<T>()
  }

  /// The child surface this task waits for, if any.
  pub fn depends_on(&self) -> Option<&Arc<Surface>> {
    self.depends_on.as_ref()
  }

  #[inline]
  pub fn preferred_unit(&self) -> UnitId {
    UnitId(self.preferred_unit.load(Ordering::Acquire))
  }

  #[inline]
  pub fn preference_score(&self) -> u32 {
    self.preference_score.load(Ordering::Acquire)
  }

  /// Offers to render this task at `score` (lower is better). The bid only
  /// sticks when it beats every earlier one, so among equal bids the first
  /// unit wins. Returns whether the bid was taken.
  pub fn bid(&self, unit: UnitId, score: u32) -> bool {
    let mut current = self.preference_score.load(Ordering::Acquire);
    loop {
      if score >= current {
        return false;
      }
      match self.preference_score.compare_exchange_weak(
        current,
        score,
        Ordering::AcqRel,
        Ordering::Acquire,
      ) {
        Ok(_) => {
          self.preferred_unit.store(unit.0, Ordering::Release);
          return true;
        }
        Err(actual) => current = actual,
      }
    }
  }

  /// Whether `unit` may take this task.
  #[inline]
  pub fn accepts(&self, unit: UnitId) -> bool {
    let preferred = self.preferred_unit();
    preferred == UnitId::ANY || preferred == unit
  }

  /// Moves a queued task to `InProgress`. Exactly one caller wins.
  pub fn try_claim(&self) -> bool {
    self.transition(TaskState::Queued, TaskState::InProgress)
  }

  /// Marks the render as done. The dispatcher's next sweep retires it.
  pub fn finish(&self) {
    let prev = self.state.swap(TaskState::Finished as u8, Ordering::AcqRel);
    if TaskState::from_u8(prev) != TaskState::InProgress {
      tracing::warn!(task = self.id, prev = ?TaskState::from_u8(prev), "finished a task that was not in progress");
    }
  }

  pub(crate) fn transition(&self, from: TaskState, to: TaskState) -> bool {
    self
      .state
      .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
  }

  // First caller gets `true`; evaluation happens once per task.
  pub(crate) fn mark_evaluated(&self) -> bool {
    !self.evaluated.swap(true, Ordering::AcqRel)
  }
}

/// Describes a task to add with [`Surface::add`].
pub struct TaskDesc {
  kind: TaskKind,
  area: Area,
  clip_area: Option<Area>,
  payload: Option<Payload>,
  depends_on: Option<Arc<Surface>>,
}

impl fmt::Debug for TaskDesc {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TaskDesc")
      .field("kind", &self.kind)
      .field("area", &self.area)
      .field("clip_area", &self.clip_area)
      .field("has_payload", &self.payload.is_some())
      .finish_non_exhaustive()
  }
}

impl TaskDesc {
  pub fn new(kind: TaskKind, area: Area) -> Self {
    Self {
      kind,
      area,
      clip_area: None,
      payload: None,
      depends_on: None,
    }
  }

  /// Clips drawing to `clip`. Defaults to the task's own area.
  pub fn clip(mut self, clip: Area) -> Self {
    self.clip_area = Some(clip);
    self
  }

  pub fn payload<T: Any + Send + Sync>(mut self, payload: T) -> Self {
    self.payload = Some(Arc::new(payload));
    self
  }

  /// Keeps the task `Waiting` until `child` has no tasks left, e.g. when
  /// blending a layer that is still being rendered.
  pub fn depends_on(mut self, child: &Arc<Surface>) -> Self {
    self.depends_on = Some(child.clone());
    self
  }
}
