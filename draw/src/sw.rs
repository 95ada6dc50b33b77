use crate::error::Result;
use crate::surface::Surface;
use crate::task::{DrawTask, UnitId, SOFTWARE_SCORE};
use crate::unit::{DispatchContext, DispatchOutcome, DrawUnit};

use std::fmt;

type RenderFn = Box<dyn Fn(&DrawTask, &Surface) -> Result<()> + Send + Sync>;

/// The fallback unit: bids [`SOFTWARE_SCORE`] on every task and renders
/// synchronously on the dispatching thread.
pub struct SoftwareUnit {
  name: String,
  render: RenderFn,
}

impl fmt::Debug for SoftwareUnit {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SoftwareUnit").field("name", &self.name).finish_non_exhaustive()
  }
}

impl SoftwareUnit {
  pub fn new<F>(render: F) -> Self
  where
    F: Fn(&DrawTask, &Surface) -> Result<()> + Send + Sync + 'static,
  {
    Self {
      name: "software".to_string(),
      render: Box::new(render),
    }
  }

  pub fn named(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }
}

impl DrawUnit for SoftwareUnit {
  fn name(&self) -> &str {
    &self.name
  }

  fn evaluate(&self, unit: UnitId, task: &DrawTask) {
    task.bid(unit, SOFTWARE_SCORE);
  }

  fn dispatch(&self, ctx: &DispatchContext<'_>) -> DispatchOutcome {
    let Some(task) = ctx.claim_next() else {
      return DispatchOutcome::Idle;
    };
    // A failed render still retires the task so the surface can drain.
    if let Err(err) = (self.render)(&task, ctx.surface()) {
      tracing::error!(unit = %self.name, task = task.id(), kind = ?task.kind(), error = %err, "render failed");
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
  use crate::error::DrawError;
  use crate::task::{TaskKind, TaskState};
  use crate::Dispatcher;

  use std::sync::Arc;

  use parking_lot::Mutex;

  #[test]
  fn test_renders_in_painter_order() {
    let drawn = Arc::new(Mutex::new(Vec::new()));
    let log = drawn.clone();
    let dispatcher = Dispatcher::default();
    dispatcher.register_unit(SoftwareUnit::new(move |task, _| {
      log.lock().push(task.kind());
      Ok(())
    }));
    let surface = dispatcher.create_surface("screen", Area::new(0, 0, 99, 99));
    surface.add_task(TaskKind::Fill, Area::new(0, 0, 99, 99));
    surface.add_task(TaskKind::Border, Area::new(0, 0, 99, 99));
    surface.add_task(TaskKind::Label, Area::new(10, 10, 50, 20));

    dispatcher.run_until_idle(&surface).unwrap();
    assert_eq!(*drawn.lock(), vec![TaskKind::Fill, TaskKind::Border, TaskKind::Label]);
  }

  #[test]
  fn test_failed_render_still_retires_task() {
    let dispatcher = Dispatcher::default();
    dispatcher.register_unit(SoftwareUnit::new(|_, _| Err(DrawError::Render("no font".into()))));
    let surface = dispatcher.create_surface("screen", Area::new(0, 0, 9, 9));
    let task = surface.add_task(TaskKind::Label, Area::new(0, 0, 9, 9));

    dispatcher.run_until_idle(&surface).unwrap();
    assert_eq!(task.state(), TaskState::Ready);
  }
}
