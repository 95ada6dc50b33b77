//! Draw unit for a remote display coprocessor.
//!
//! The coprocessor renders from its own RAM, so image-like tasks carry a
//! [`CoprocAsset`] that is uploaded on first use and reused for the rest of
//! the session. Memory is handed out by the unit's [`RamAllocator`]. The
//! allocator only grows within a session, so a task whose asset no longer
//! fits is drawn without it (the link shows its placeholder) instead of
//! holding up the surface.

pub mod ram;

pub use ram::{RamAllocator, Reservation, RAM_SIZE};

use crate::error::{AllocError, Result};
use crate::task::{DrawTask, TaskKind, UnitId};
use crate::unit::{DispatchContext, DispatchOutcome, DrawUnit};

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// What the coprocessor unit bids on the task kinds it handles.
pub const COPROC_SCORE: u32 = 50;

/// Transport to the coprocessor (SPI command stream, simulator, ...).
pub trait CoprocLink: Send {
  /// Copies `bytes` into coprocessor RAM at `address`.
  fn upload(&mut self, address: u32, bytes: &[u8]) -> Result<()>;

  /// Emits the commands that draw `task`. `asset` is where its data lives,
  /// if it has any.
  fn render(&mut self, task: &DrawTask, asset: Option<Reservation>) -> Result<()>;
}

/// Payload of a task whose data must live in coprocessor RAM.
#[derive(Debug, Clone)]
pub struct CoprocAsset {
  /// Identity of the source asset. Equal keys share one upload.
  pub key: u64,
  pub bytes: Arc<[u8]>,
  pub align: u32,
}

struct CoprocState {
  ram: RamAllocator,
  link: Box<dyn CoprocLink>,
}

pub struct CoprocUnit {
  name: String,
  kinds: Vec<TaskKind>,
  score: u32,
  state: Mutex<CoprocState>,
}

impl fmt::Debug for CoprocUnit {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("CoprocUnit")
      .field("name", &self.name)
      .field("kinds", &self.kinds)
      .field("score", &self.score)
      .field("ram", &state.ram)
      .finish_non_exhaustive()
  }
}

impl CoprocUnit {
  pub fn new<L>(link: L) -> Self
  where
    L: CoprocLink + 'static,
  {
    Self {
      name: "coproc".to_string(),
      kinds: vec![
        TaskKind::Fill,
        TaskKind::Border,
        TaskKind::Image,
        TaskKind::Label,
      ],
      score: COPROC_SCORE,
      state: Mutex::new(CoprocState {
        ram: RamAllocator::new(),
        link: Box::new(link),
      }),
    }
  }

  pub fn named(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  /// Task kinds this unit bids on.
  pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = TaskKind>) -> Self {
    self.kinds = kinds.into_iter().collect();
    self
  }

  pub fn with_score(mut self, score: u32) -> Self {
    self.score = score;
    self
  }

  pub fn with_ram(self, ram: RamAllocator) -> Self {
    self.state.lock().ram = ram;
    self
  }

  /// Starts a new coprocessor session: every asset is uploaded again.
  pub fn reset_session(&self) {
    self.state.lock().ram.reset();
  }

  /// Inspects the allocator, e.g. for its high-water mark.
  pub fn with_allocator<R>(&self, f: impl FnOnce(&RamAllocator) -> R) -> R {
    f(&self.state.lock().ram)
  }
}

impl DrawUnit for CoprocUnit {
  fn name(&self) -> &str {
    &self.name
  }

  fn evaluate(&self, unit: UnitId, task: &DrawTask) {
    if self.kinds.contains(&task.kind()) {
      task.bid(unit, self.score);
    }
  }

  fn dispatch(&self, ctx: &DispatchContext<'_>) -> DispatchOutcome {
    let Some(task) = ctx.claim_next() else {
      return DispatchOutcome::Idle;
    };

    let mut state = self.state.lock();
    let asset = task.payload::<CoprocAsset>();
    let mut reservation = None;
    if let Some(asset) = asset {
      // Anything past u32::MAX cannot fit and fails as out of space.
      let size = u32::try_from(asset.bytes.len()).unwrap_or(u32::MAX);
      match state.ram.get_or_reserve(asset.key, size, asset.align) {
        Ok(r) => reservation = Some(r),
        Err(AllocError::OutOfSpace { requested, remaining }) => {
          tracing::warn!(unit = %self.name, task = task.id(), requested, remaining, "coprocessor memory full, drawing without asset");
        }
        Err(err) => {
          tracing::error!(unit = %self.name, task = task.id(), error = %err, "cannot place asset");
        }
      }
    }

    let uploaded = match (asset, reservation) {
      (Some(asset), Some(r)) if r.fresh => state.link.upload(r.address, &asset.bytes),
      _ => Ok(()),
    };
    let rendered = uploaded.and_then(|()| state.link.render(&task, reservation));
    if let Err(err) = rendered {
      tracing::error!(unit = %self.name, task = task.id(), error = %err, "coprocessor render failed");
    }

    task.finish();
    ctx.request_dispatch();
    DispatchOutcome::Claimed
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::area::Area;
  use crate::task::{TaskDesc, TaskState};
  use crate::Dispatcher;

  #[derive(Default)]
  struct Recorded {
    uploads: Vec<(u32, usize)>,
    renders: Vec<(u64, Option<u32>)>,
  }

  struct RecordingLink(Arc<Mutex<Recorded>>);

  impl CoprocLink for RecordingLink {
    fn upload(&mut self, address: u32, bytes: &[u8]) -> Result<()> {
      self.0.lock().uploads.push((address, bytes.len()));
      Ok(())
    }

    fn render(&mut self, task: &DrawTask, asset: Option<Reservation>) -> Result<()> {
      self.0.lock().renders.push((task.id(), asset.map(|r| r.address)));
      Ok(())
    }
  }

  fn asset(key: u64, len: usize) -> CoprocAsset {
    CoprocAsset {
      key,
      bytes: vec![0u8; len].into(),
      align: 4,
    }
  }

  #[test]
  fn test_shared_asset_is_uploaded_once() {
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let dispatcher = Dispatcher::default();
    dispatcher.register_unit(CoprocUnit::new(RecordingLink(recorded.clone())));
    let surface = dispatcher.create_surface("screen", Area::new(0, 0, 99, 99));
    surface.add(TaskDesc::new(TaskKind::Image, Area::new(0, 0, 9, 9)).payload(asset(42, 64)));
    surface.add(TaskDesc::new(TaskKind::Image, Area::new(20, 0, 29, 9)).payload(asset(42, 64)));
    surface.add_task(TaskKind::Fill, Area::new(50, 50, 59, 59));

    dispatcher.run_until_idle(&surface).unwrap();
    let recorded = recorded.lock();
    assert_eq!(recorded.uploads, vec![(0, 64)]);
    assert_eq!(recorded.renders.len(), 3);
    assert_eq!(recorded.renders[0].1, Some(0));
    assert_eq!(recorded.renders[1].1, Some(0));
    assert_eq!(recorded.renders[2].1, None);
  }

  #[test]
  fn test_unbid_tasks_stay_open_to_any_unit() {
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let unit = CoprocUnit::new(RecordingLink(recorded)).with_kinds([TaskKind::Image]);
    let dispatcher = Dispatcher::default();
    dispatcher.register_unit(unit);
    let surface = dispatcher.create_surface("screen", Area::new(0, 0, 99, 99));
    let arc = surface.add_task(TaskKind::Arc, Area::new(0, 0, 9, 9));

    dispatcher.dispatch_pass();
    assert_eq!(arc.preferred_unit(), UnitId::ANY);
    // No bid, but the unit may still take unreserved work.
    assert_eq!(arc.state(), TaskState::Ready);
  }

  #[test]
  fn test_full_memory_draws_without_asset() {
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let unit = CoprocUnit::new(RecordingLink(recorded.clone())).with_ram(RamAllocator::with_ram_size(100));
    let dispatcher = Dispatcher::default();
    dispatcher.register_unit(unit);
    let surface = dispatcher.create_surface("screen", Area::new(0, 0, 99, 99));
    let fits = surface.add(TaskDesc::new(TaskKind::Image, Area::new(0, 0, 9, 9)).payload(asset(1, 80)));
    let too_big = surface.add(TaskDesc::new(TaskKind::Image, Area::new(20, 0, 29, 9)).payload(asset(2, 80)));

    let first = dispatcher.dispatch_pass();
    assert_eq!(first.claimed, 1);
    assert_eq!(fits.state(), TaskState::Ready);

    let second = dispatcher.dispatch_pass();
    assert_eq!(second.claimed, 1);
    assert_eq!(second.busy, 0);
    assert_eq!(too_big.state(), TaskState::Ready);
    let recorded = recorded.lock();
    assert_eq!(recorded.uploads.len(), 1);
    assert_eq!(recorded.renders[1], (too_big.id(), None));
  }

  #[test]
  fn test_oversized_asset_does_not_hold_up_later_tasks() {
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let software = Arc::new(Mutex::new(Vec::new()));
    let sink = software.clone();
    let dispatcher = Dispatcher::default();
    dispatcher.register_unit(CoprocUnit::new(RecordingLink(recorded.clone())).with_kinds([TaskKind::Image]));
    dispatcher.register_unit(crate::SoftwareUnit::new(move |task, _| {
      sink.lock().push(task.id());
      Ok(())
    }));
    let surface = dispatcher.create_surface("screen", Area::new(0, 0, 99, 99));
    let image = surface.add(TaskDesc::new(TaskKind::Image, Area::new(0, 0, 49, 49)).payload(asset(7, 2 * RAM_SIZE as usize)));
    let label = surface.add_task(TaskKind::Label, Area::new(10, 10, 40, 20));

    dispatcher.run_until_idle(&surface).unwrap();
    assert_eq!(image.state(), TaskState::Ready);
    assert_eq!(label.state(), TaskState::Ready);
    assert_eq!(*software.lock(), vec![label.id()]);
    let recorded = recorded.lock();
    assert!(recorded.uploads.is_empty());
    assert_eq!(recorded.renders, vec![(image.id(), None)]);
  }
}
