use crate::dispatcher::{Dispatcher, UnitSlot};
use crate::unit::DrawUnit;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_utils::Backoff;

/// Runs every registered unit on its own OS thread.
///
/// Each worker repeatedly offers the dispatcher's surfaces to its unit and
/// sleeps on the [`DispatchSignal`](crate::DispatchSignal) when there is
/// nothing to claim. Units registered after the pool was spawned are not
/// picked up. Dropping the pool stops and joins the workers.
pub struct WorkerPool {
  dispatcher: Arc<Dispatcher>,
  stop_flag: Arc<AtomicBool>,
  handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
  pub fn spawn(dispatcher: &Arc<Dispatcher>) -> io::Result<Self> {
    let mut pool = Self {
      dispatcher: dispatcher.clone(),
      stop_flag: Arc::new(AtomicBool::new(false)),
      handles: Vec::new(),
    };
    dispatcher.workers.fetch_add(1, Ordering::AcqRel);

    for slot in dispatcher.units_snapshot() {
      let context = WorkerContext {
        dispatcher: dispatcher.clone(),
        slot,
        stop_flag: pool.stop_flag.clone(),
      };
      // On error the partially built pool is dropped, which joins what started.
      let handle = thread::Builder::new()
        .name(format!("lumen-{}", context.slot.unit.name()))
        .spawn(move || context.run())?;
      pool.handles.push(handle);
    }
    tracing::debug!(workers = pool.handles.len(), "spawned draw workers");
    Ok(pool)
  }

  pub fn len(&self) -> usize {
    self.handles.len()
  }

  pub fn is_empty(&self) -> bool {
    self.handles.is_empty()
  }

  /// Stops the workers and waits for them to exit.
  pub fn shutdown(self) {
    drop(self);
  }

  fn stop_and_join(&mut self) {
    self.stop_flag.store(true, Ordering::Release);
    self.dispatcher.request_dispatch();
    for handle in self.handles.drain(..) {
      if handle.join().is_err() {
        tracing::error!("draw worker panicked");
      }
    }
    self.dispatcher.workers.fetch_sub(1, Ordering::AcqRel);
  }
}

impl Drop for WorkerPool {
  fn drop(&mut self) {
    self.stop_and_join();
  }
}

struct WorkerContext {
  dispatcher: Arc<Dispatcher>,
  slot: Arc<UnitSlot>,
  stop_flag: Arc<AtomicBool>,
}

impl WorkerContext {
  fn run(self) {
    let signal = self.dispatcher.signal().clone();
    let poll = self.dispatcher.config().idle_poll_duration();
    let backoff = Backoff::new();
    tracing::trace!(unit = %self.slot.id, "draw worker started");

    while !self.stop_flag.load(Ordering::Acquire) {
      let seen = signal.generation();
      let report = self.dispatcher.dispatch_unit_everywhere(&self.slot);
      if report.claimed > 0 {
        backoff.reset();
      } else if report.busy > 0 {
        backoff.snooze();
      } else {
        backoff.reset();
        signal.wait_past(seen, poll);
      }
    }
    tracing::trace!(unit = %self.slot.id, "draw worker stopped");
  }
}
