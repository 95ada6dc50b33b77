use crate::area::Area;
use crate::config::DispatcherConfig;
use crate::error::{DrawError, Result};
use crate::surface::Surface;
use crate::task::UnitId;
use crate::unit::{DispatchContext, DispatchOutcome, DrawUnit};

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_utils::Backoff;
use parking_lot::{Condvar, Mutex, RwLock};

/// The "more work available" notification shared by a dispatcher, its
/// surfaces and its units.
///
/// A generation counter makes wakeups impossible to miss: a waiter records
/// the generation before checking for work and sleeps only while it is
/// unchanged.
#[derive(Debug, Default)]
pub struct DispatchSignal {
  generation: Mutex<u64>,
  cond: Condvar,
}

impl DispatchSignal {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn notify(&self) {
    let mut generation = self.generation.lock();
    *generation = generation.wrapping_add(1);
    self.cond.notify_all();
  }

  pub fn generation(&self) -> u64 {
    *self.generation.lock()
  }

  /// Blocks until the generation moves past `seen` or `timeout` elapses.
  /// Returns whether a notification arrived.
  pub fn wait_past(&self, seen: u64, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let mut generation = self.generation.lock();
    while *generation == seen {
      if self.cond.wait_until(&mut generation, deadline).timed_out() {
        return *generation != seen;
      }
    }
    true
  }
}

pub(crate) struct UnitSlot {
  pub(crate) id: UnitId,
  pub(crate) unit: Box<dyn DrawUnit>,
  // At most one task in flight per unit.
  in_flight: AtomicBool,
}

/// Tally of one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
  /// Tasks moved from `Waiting` to `Queued`.
  pub queued: usize,
  /// Tasks claimed by a unit.
  pub claimed: usize,
  /// Units that reported a transient shortage.
  pub busy: usize,
  /// Finished tasks unlinked from their surface.
  pub retired: usize,
}

impl PassReport {
  pub fn made_progress(&self) -> bool {
    self.queued + self.claimed + self.retired > 0
  }
}

/// Feeds the tasks of every registered surface to the registered draw units.
///
/// A pass queues waiting tasks (letting each unit bid on them first), offers
/// each surface to each idle unit once, then retires finished tasks. Passes
/// are safe to run from several threads: a unit already busy with a task is
/// skipped.
pub struct Dispatcher {
  config: DispatcherConfig,
  units: RwLock<Vec<Arc<UnitSlot>>>,
  surfaces: Mutex<Vec<Arc<Surface>>>,
  signal: Arc<DispatchSignal>,
  next_unit_id: AtomicU32,
  pub(crate) workers: AtomicUsize,
}

impl fmt::Debug for Dispatcher {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let units: Vec<String> = self
      .units
      .read()
      .iter()
      .map(|slot| format!("{}:{}", slot.id, slot.unit.name()))
      .collect();
    f.debug_struct("Dispatcher")
      .field("config", &self.config)
      .field("units", &units)
      .field("surfaces", &self.surfaces.lock().len())
      .finish_non_exhaustive()
  }
}

impl Default for Dispatcher {
  fn default() -> Self {
    Self::new(DispatcherConfig::default())
  }
}

impl Dispatcher {
  pub fn new(config: DispatcherConfig) -> Self {
    Self {
      config,
      units: RwLock::new(Vec::new()),
      surfaces: Mutex::new(Vec::new()),
      signal: Arc::new(DispatchSignal::new()),
      next_unit_id: AtomicU32::new(1),
      workers: AtomicUsize::new(0),
    }
  }

  pub fn config(&self) -> &DispatcherConfig {
    &self.config
  }

  pub fn signal(&self) -> &Arc<DispatchSignal> {
    &self.signal
  }

  /// Adds a unit and returns the id it bids and claims under.
  pub fn register_unit<U>(&self, unit: U) -> UnitId
  where
    U: DrawUnit + 'static,
  {
    let id = UnitId(self.next_unit_id.fetch_add(1, Ordering::Relaxed));
    tracing::debug!(unit = %id, name = unit.name(), "registered draw unit");
    self.units.write().push(Arc::new(UnitSlot {
      id,
      unit: Box::new(unit),
      in_flight: AtomicBool::new(false),
    }));
    self.signal.notify();
    id
  }

  pub fn unit_ids(&self) -> Vec<UnitId> {
    self.units.read().iter().map(|slot| slot.id).collect()
  }

  /// Creates a surface whose tasks this dispatcher schedules.
  pub fn create_surface(&self, name: impl Into<String>, area: Area) -> Arc<Surface> {
    let surface = Arc::new(Surface::new(name.into(), area, self.signal.clone()));
    self.surfaces.lock().push(surface.clone());
    surface
  }

  /// Stops scheduling `surface`. Tasks still on it are left untouched.
  pub fn remove_surface(&self, surface: &Arc<Surface>) -> bool {
    let mut surfaces = self.surfaces.lock();
    let before = surfaces.len();
    surfaces.retain(|s| !Arc::ptr_eq(s, surface));
    surfaces.len() != before
  }

  /// Wakes everything waiting for work.
  pub fn request_dispatch(&self) {
    self.signal.notify();
  }

  pub(crate) fn units_snapshot(&self) -> Vec<Arc<UnitSlot>> {
    self.units.read().clone()
  }

  fn surfaces_snapshot(&self) -> Vec<Arc<Surface>> {
    self.surfaces.lock().clone()
  }

  /// Runs one pass over every surface.
  pub fn dispatch_pass(&self) -> PassReport {
    let units = self.units_snapshot();
    let mut report = PassReport::default();
    for surface in self.surfaces_snapshot() {
      report.queued += self.prepare(&units, &surface);
      for slot in &units {
        match self.dispatch_unit(slot, &surface) {
          DispatchOutcome::Claimed => report.claimed += 1,
          DispatchOutcome::Busy => report.busy += 1,
          DispatchOutcome::Idle => {}
        }
      }
      report.retired += surface.sweep();
    }
    tracing::trace!(?report, "dispatch pass");
    report
  }

  /// Offers each surface to one unit until it claims something or reports
  /// busy. Used by worker threads.
  #[cfg_attr(not(feature = "threads"), allow(dead_code))]
  pub(crate) fn dispatch_unit_everywhere(&self, slot: &UnitSlot) -> PassReport {
    let units = self.units_snapshot();
    let mut report = PassReport::default();
    for surface in self.surfaces_snapshot() {
      report.queued += self.prepare(&units, &surface);
      let outcome = self.dispatch_unit(slot, &surface);
      report.retired += surface.sweep();
      match outcome {
        DispatchOutcome::Idle => continue,
        DispatchOutcome::Claimed => report.claimed += 1,
        DispatchOutcome::Busy => report.busy += 1,
      }
      break;
    }
    report
  }

  fn prepare(&self, units: &[Arc<UnitSlot>], surface: &Surface) -> usize {
    surface.prepare(|task| {
      for slot in units {
        slot.unit.evaluate(slot.id, task);
      }
    })
  }

  fn dispatch_unit(&self, slot: &UnitSlot, surface: &Arc<Surface>) -> DispatchOutcome {
    if slot
      .in_flight
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      return DispatchOutcome::Idle;
    }
    let ctx = DispatchContext {
      unit: slot.id,
      surface,
      signal: &self.signal,
    };
    let outcome = slot.unit.dispatch(&ctx);
    slot.in_flight.store(false, Ordering::Release);
    if outcome == DispatchOutcome::Busy {
      tracing::debug!(unit = %slot.id, name = slot.unit.name(), surface = surface.name(), "unit busy, will retry");
    }
    outcome
  }

  /// Drives dispatch passes on the calling thread until `surface` is drained.
  ///
  /// Fails with [`DrawError::Stalled`] when no pass makes progress for the
  /// configured stall timeout, e.g. when a unit stays busy or no unit accepts
  /// a task.
  pub fn run_until_idle(&self, surface: &Surface) -> Result<()> {
    let stall_timeout = self.config.stall_timeout_duration();
    let poll = self.config.idle_poll_duration();
    let backoff = Backoff::new();
    let mut last_progress = Instant::now();

    loop {
      let seen = self.signal.generation();
      let report = self.dispatch_pass();
      if surface.is_drained() {
        return Ok(());
      }
      if report.made_progress() {
        last_progress = Instant::now();
        backoff.reset();
        continue;
      }
      let waited = last_progress.elapsed();
      if waited >= stall_timeout {
        return Err(self.stalled(surface, waited));
      }
      if report.busy > 0 || !backoff.is_completed() {
        backoff.snooze();
      } else {
        self.signal.wait_past(seen, poll);
      }
    }
  }

  /// Waits until every task on `surface` is done.
  ///
  /// With a [`WorkerPool`](crate::WorkerPool) running, the calling thread only
  /// waits; otherwise it drives the passes itself like
  /// [`run_until_idle`](Self::run_until_idle).
  pub fn wait_for_idle(&self, surface: &Surface) -> Result<()> {
    if self.workers.load(Ordering::Acquire) == 0 {
      return self.run_until_idle(surface);
    }
    let stall_timeout = self.config.stall_timeout_duration();
    let poll = self.config.idle_poll_duration();
    let mut last_progress = Instant::now();

    loop {
      let seen = self.signal.generation();
      if surface.sweep() > 0 {
        last_progress = Instant::now();
      }
      if surface.is_drained() {
        return Ok(());
      }
      let waited = last_progress.elapsed();
      if waited >= stall_timeout {
        return Err(self.stalled(surface, waited));
      }
      if self.signal.wait_past(seen, poll) {
        last_progress = Instant::now();
      }
    }
  }

  fn stalled(&self, surface: &Surface, waited: Duration) -> DrawError {
    let pending = surface.pending();
    tracing::warn!(surface = surface.name(), pending, ?waited, "dispatch stalled");
    DrawError::Stalled {
      surface: surface.name().to_string(),
      pending,
      waited,
    }
  }
}
