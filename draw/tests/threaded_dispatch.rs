mod common;

use common::{init_tracing, render_log, Recorder};
use lumen_draw::{Area, Dispatcher, DispatcherConfig, TaskKind, TaskState, WorkerPool};

use std::sync::Arc;
use std::time::Duration;

fn threaded_config() -> DispatcherConfig {
  DispatcherConfig::default()
    .stall_timeout(Duration::from_secs(5))
    .idle_poll(Duration::from_millis(2))
}

#[test]
fn test_every_task_is_rendered_exactly_once() {
  init_tracing();
  let log = render_log();
  let dispatcher = Arc::new(Dispatcher::new(threaded_config()));
  for name in ["u1", "u2", "u3", "u4"] {
    dispatcher.register_unit(Recorder::new(name, &log));
  }
  let screen = dispatcher.create_surface("screen", Area::from_size(0, 0, 400, 400));
  let pool = WorkerPool::spawn(&dispatcher).unwrap();
  assert_eq!(pool.len(), 4);

  // 20 x 20 grid of disjoint cells, so all units can work at once.
  let mut tasks = Vec::new();
  for row in 0..20 {
    for col in 0..20 {
      tasks.push(screen.add_task(TaskKind::Fill, Area::from_size(col * 20, row * 20, 20, 20)));
    }
  }

  dispatcher.wait_for_idle(&screen).unwrap();
  assert!(tasks.iter().all(|t| t.state() == TaskState::Ready));

  let mut rendered: Vec<u64> = log.lock().iter().map(|(_, id)| *id).collect();
  assert_eq!(rendered.len(), tasks.len());
  rendered.sort_unstable();
  rendered.dedup();
  assert_eq!(rendered.len(), tasks.len(), "A task was rendered twice");
  pool.shutdown();
}

#[test]
fn test_stacked_tasks_keep_painter_order_across_threads() {
  init_tracing();
  let log = render_log();
  let dispatcher = Arc::new(Dispatcher::new(threaded_config()));
  for name in ["u1", "u2", "u3"] {
    dispatcher.register_unit(Recorder::new(name, &log));
  }
  let screen = dispatcher.create_surface("screen", Area::from_size(0, 0, 64, 64));
  let _pool = WorkerPool::spawn(&dispatcher).unwrap();

  let ids: Vec<u64> = (0..50)
    .map(|_| screen.add_task(TaskKind::Fill, Area::from_size(0, 0, 64, 64)).id())
    .collect();

  dispatcher.wait_for_idle(&screen).unwrap();
  let order: Vec<u64> = log.lock().iter().map(|(_, id)| *id).collect();
  assert_eq!(order, ids);
}

#[test]
fn test_shutdown_joins_idle_workers() {
  init_tracing();
  let log = render_log();
  let dispatcher = Arc::new(Dispatcher::new(threaded_config()));
  dispatcher.register_unit(Recorder::new("idle", &log));
  let pool = WorkerPool::spawn(&dispatcher).unwrap();
  std::thread::sleep(Duration::from_millis(10));
  pool.shutdown();

  // Without workers, waiting drives the passes on this thread.
  let screen = dispatcher.create_surface("screen", Area::from_size(0, 0, 8, 8));
  let task = screen.add_task(TaskKind::Fill, Area::from_size(0, 0, 8, 8));
  dispatcher.wait_for_idle(&screen).unwrap();
  assert_eq!(task.state(), TaskState::Ready);
}
