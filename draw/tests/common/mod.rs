#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use lumen_draw::{
  DispatchContext, DispatchOutcome, DispatcherConfig, DrawTask, DrawUnit, TaskKind, UnitId,
};
use parking_lot::Mutex;

static TRACING: Once = Once::new();

/// Routes `tracing` output through the test harness. Set `RUST_LOG` to see it.
pub fn init_tracing() {
  TRACING.call_once(|| {
    let _ = tracing_subscriber::fmt()
      .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
      .with_test_writer()
      .try_init();
  });
}

/// Short timeouts so stalls fail fast.
pub fn test_config() -> DispatcherConfig {
  DispatcherConfig::default()
    .stall_timeout(Duration::from_millis(200))
    .idle_poll(Duration::from_millis(1))
}

/// Log of `(unit name, task id)` in render order.
pub type RenderLog = Arc<Mutex<Vec<(String, u64)>>>;

pub fn render_log() -> RenderLog {
  Arc::new(Mutex::new(Vec::new()))
}

pub fn ids_rendered_by(log: &RenderLog, unit: &str) -> Vec<u64> {
  log.lock().iter().filter(|(name, _)| name == unit).map(|(_, id)| *id).collect()
}

/// A unit that bids `score` on `kinds` (or on nothing) and records every task
/// it renders. It can be told to report busy a number of times first.
pub struct Recorder {
  pub name: String,
  pub kinds: Vec<TaskKind>,
  pub score: u32,
  pub busy_first: AtomicUsize,
  pub log: RenderLog,
}

impl Recorder {
  pub fn new(name: &str, log: &RenderLog) -> Self {
    Self {
      name: name.to_string(),
      kinds: Vec::new(),
      score: 0,
      busy_first: AtomicUsize::new(0),
      log: log.clone(),
    }
  }

  pub fn bidding(mut self, score: u32, kinds: &[TaskKind]) -> Self {
    self.score = score;
    self.kinds = kinds.to_vec();
    self
  }

  pub fn busy_for(self, dispatches: usize) -> Self {
    self.busy_first.store(dispatches, Ordering::SeqCst);
    self
  }
}

impl DrawUnit for Recorder {
  fn name(&self) -> &str {
    &self.name
  }

  fn evaluate(&self, unit: UnitId, task: &DrawTask) {
    if self.kinds.contains(&task.kind()) {
      task.bid(unit, self.score);
    }
  }

  fn dispatch(&self, ctx: &DispatchContext<'_>) -> DispatchOutcome {
    if ctx.next_available_task().is_none() {
      return DispatchOutcome::Idle;
    }
    let still_busy = self
      .busy_first
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if still_busy {
      return DispatchOutcome::Busy;
    }
    let Some(task) = ctx.claim_next() else {
      return DispatchOutcome::Idle;
    };
    self.log.lock().push((self.name.clone(), task.id()));
    task.finish();
    ctx.request_dispatch();
    DispatchOutcome::Claimed
  }
}
