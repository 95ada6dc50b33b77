use crate::area::Area;
use crate::dispatcher::DispatchSignal;
use crate::task::{DrawTask, TaskDesc, TaskKind, TaskState, UnitId};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// A render target (a display buffer or an offscreen layer) and the ordered
/// list of tasks drawing into it.
///
/// Tasks are claimed in list order, which is painter's order: a task only
/// becomes available once no earlier, unfinished task overlaps it.
pub struct Surface {
  name: String,
  area: Area,
  tasks: Mutex<Vec<Arc<DrawTask>>>,
  next_task_id: AtomicU64,
  signal: Arc<DispatchSignal>,
}

impl fmt::Debug for Surface {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Surface")
      .field("name", &self.name)
      .field("area", &self.area)
      .field("pending", &self.pending())
      .finish_non_exhaustive()
  }
}

impl Surface {
  pub(crate) fn new(name: String, area: Area, signal: Arc<DispatchSignal>) -> Self {
    Self {
      name,
      area,
      tasks: Mutex::new(Vec::new()),
      next_task_id: AtomicU64::new(1),
      signal,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn area(&self) -> Area {
    self.area
  }

  /// Appends a task and wakes the units. The task starts out `Waiting`.
  pub fn add(&self, desc: TaskDesc) -> Arc<DrawTask> {
    let id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
    let task = Arc::new(DrawTask::new(id, desc));
    self.tasks.lock().push(task.clone());
    tracing::trace!(surface = %self.name, task = id, kind = ?task.kind(), "task added");
    self.signal.notify();
    task
  }

  /// Shorthand for a task without clip, payload or dependency.
  pub fn add_task(&self, kind: TaskKind, area: Area) -> Arc<DrawTask> {
    self.add(TaskDesc::new(kind, area))
  }

  /// Unlinks `task` if no unit has claimed it yet.
  pub fn remove_task(&self, task: &Arc<DrawTask>) -> bool {
    let mut tasks = self.tasks.lock();
    let Some(index) = tasks.iter().position(|t| Arc::ptr_eq(t, task)) else {
      return false;
    };
    let unclaimed = task.transition(TaskState::Waiting, TaskState::Ready)
      || task.transition(TaskState::Queued, TaskState::Ready);
    if unclaimed {
      tasks.remove(index);
    }
    unclaimed
  }

  /// Tasks still linked into the surface.
  pub fn pending(&self) -> usize {
    self.tasks.lock().len()
  }

  /// No task is left: everything drawn into this surface is complete.
  pub fn is_drained(&self) -> bool {
    self.tasks.lock().is_empty()
  }

  /// Snapshot of the linked tasks in list order.
  pub fn tasks(&self) -> Vec<Arc<DrawTask>> {
    self.tasks.lock().clone()
  }

  /// The first task `unit` may take: queued, not reserved for another unit,
  /// and not overlapping an earlier unfinished task.
  pub fn next_available_task(&self, unit: UnitId) -> Option<Arc<DrawTask>> {
    let tasks = self.tasks.lock();
    Self::find_available(&tasks, unit).map(|i| tasks[i].clone())
  }

  /// Finds and claims the next available task in one step.
  pub fn claim_next(&self, unit: UnitId) -> Option<Arc<DrawTask>> {
    let tasks = self.tasks.lock();
    let index = Self::find_available(&tasks, unit)?;
    let task = &tasks[index];
    // Claims only happen under this lock, so the task is still queued.
    task.try_claim().then(|| task.clone())
  }

  fn find_available(tasks: &[Arc<DrawTask>], unit: UnitId) -> Option<usize> {
    tasks.iter().enumerate().position(|(i, task)| {
      task.state() == TaskState::Queued
        && task.accepts(unit)
        && Self::is_independent(&tasks[..i], task)
    })
  }

  fn is_independent(earlier: &[Arc<DrawTask>], task: &DrawTask) -> bool {
    earlier
      .iter()
      .all(|prev| prev.state().is_done() || !prev.area().overlaps(&task.area()))
  }

  /// Evaluates and queues every waiting task whose dependency is drained.
  /// `evaluate` runs once per task, before the task becomes claimable.
  pub(crate) fn prepare(&self, mut evaluate: impl FnMut(&DrawTask)) -> usize {
    let tasks = self.tasks.lock();
    let mut queued = 0;
    for task in tasks.iter() {
      if task.state() != TaskState::Waiting {
        continue;
      }
      if let Some(child) = task.depends_on() {
        if !child.is_drained() {
          continue;
        }
      }
      if task.mark_evaluated() {
        evaluate(task);
      }
      if task.transition(TaskState::Waiting, TaskState::Queued) {
        queued += 1;
      }
    }
    queued
  }

  /// Retires finished tasks: `Finished` becomes `Ready`, and `Ready` tasks
  /// are unlinked. Returns how many were unlinked.
  pub(crate) fn sweep(&self) -> usize {
    let mut tasks = self.tasks.lock();
    let before = tasks.len();
    tasks.retain(|task| {
      task.transition(TaskState::Finished, TaskState::Ready);
      task.state() != TaskState::Ready
    });
    let retired = before - tasks.len();
    if retired > 0 {
      tracing::trace!(surface = %self.name, retired, pending = tasks.len(), "swept tasks");
    }
    retired
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn surface() -> Surface {
    Surface::new("test".into(), Area::new(0, 0, 99, 99), Arc::new(DispatchSignal::new()))
  }

  #[test]
  fn test_tasks_wait_until_prepared() {
    let s = surface();
    let t = s.add_task(TaskKind::Fill, Area::new(0, 0, 9, 9));
    assert_eq!(t.state(), TaskState::Waiting);
    assert!(s.next_available_task(UnitId(1)).is_none());

    assert_eq!(s.prepare(|_| {}), 1);
    assert_eq!(t.state(), TaskState::Queued);
    assert!(Arc::ptr_eq(&s.next_available_task(UnitId(1)).unwrap(), &t));
  }

  #[test]
  fn test_overlapping_tasks_keep_painter_order() {
    let s = surface();
    let back = s.add_task(TaskKind::Fill, Area::new(0, 0, 49, 49));
    let front = s.add_task(TaskKind::Label, Area::new(10, 10, 20, 20));
    let aside = s.add_task(TaskKind::Fill, Area::new(60, 60, 70, 70));
    s.prepare(|_| {});

    assert!(Arc::ptr_eq(&s.claim_next(UnitId(1)).unwrap(), &back));
    // `front` overlaps the in-progress background; `aside` does not.
    assert!(Arc::ptr_eq(&s.claim_next(UnitId(2)).unwrap(), &aside));
    assert!(s.claim_next(UnitId(2)).is_none());

    back.finish();
    assert!(Arc::ptr_eq(&s.claim_next(UnitId(2)).unwrap(), &front));
  }

  #[test]
  fn test_preferred_unit_reserves_task() {
    let s = surface();
    let t = s.add_task(TaskKind::Image, Area::new(0, 0, 9, 9));
    s.prepare(|task| {
      task.bid(UnitId(2), 10);
    });
    assert_eq!(t.preferred_unit(), UnitId(2));
    assert!(s.claim_next(UnitId(1)).is_none());
    assert!(s.claim_next(UnitId(2)).is_some());
  }

  #[test]
  fn test_dependency_holds_task_waiting() {
    let child = Arc::new(surface());
    let parent = surface();
    let child_task = child.add_task(TaskKind::Fill, Area::new(0, 0, 9, 9));
    let blend = parent.add(TaskDesc::new(TaskKind::Layer, Area::new(0, 0, 9, 9)).depends_on(&child));

    assert_eq!(parent.prepare(|_| {}), 0);
    assert_eq!(blend.state(), TaskState::Waiting);

    child.prepare(|_| {});
    child.claim_next(UnitId(1)).unwrap();
    child_task.finish();
    assert_eq!(child.sweep(), 1);
    assert!(child.is_drained());

    assert_eq!(parent.prepare(|_| {}), 1);
    assert_eq!(blend.state(), TaskState::Queued);
  }

  #[test]
  fn test_sweep_retires_finished_tasks() {
    let s = surface();
    let a = s.add_task(TaskKind::Fill, Area::new(0, 0, 9, 9));
    let b = s.add_task(TaskKind::Fill, Area::new(20, 20, 29, 29));
    s.prepare(|_| {});
    s.claim_next(UnitId(1)).unwrap();
    a.finish();

    assert_eq!(s.sweep(), 1);
    assert_eq!(a.state(), TaskState::Ready);
    assert_eq!(s.pending(), 1);
    assert_eq!(b.state(), TaskState::Queued);
  }

  #[test]
  fn test_only_unclaimed_tasks_can_be_removed() {
    let s = surface();
    let a = s.add_task(TaskKind::Fill, Area::new(0, 0, 9, 9));
    let b = s.add_task(TaskKind::Fill, Area::new(20, 20, 29, 29));
    s.prepare(|_| {});
    s.claim_next(UnitId(1)).unwrap();

    assert!(!s.remove_task(&a), "In-progress tasks run to completion");
    assert!(s.remove_task(&b));
    assert!(!s.remove_task(&b));
    assert_eq!(s.pending(), 1);
  }
}
