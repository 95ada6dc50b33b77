mod common;

use common::{init_tracing, test_config};
use lumen_cache::{CacheBuilder, EntryGuard};
use lumen_draw::{Area, Dispatcher, DrawError, SoftwareUnit, TaskDesc, TaskKind, TaskState};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type Pixels = EntryGuard<String, Vec<u8>>;

#[test]
fn test_cached_image_lives_as_long_as_its_task() {
  init_tracing();
  let freed = Arc::new(AtomicUsize::new(0));
  let on_free = freed.clone();
  let images = CacheBuilder::new(4)
    .name("decoded images")
    .create_with(|path: &String| Some(vec![0xAB; path.len() * 16]))
    .on_free(move |_: &String, _: &Vec<u8>| {
      on_free.fetch_add(1, Ordering::SeqCst);
    })
    .build()
    .unwrap();

  let drawn = Arc::new(Mutex::new(Vec::new()));
  let sink = drawn.clone();
  let dispatcher = Dispatcher::new(test_config());
  dispatcher.register_unit(SoftwareUnit::new(move |task, _| {
    let pixels = task
      .payload::<Pixels>()
      .ok_or_else(|| DrawError::Render("image task without pixels".into()))?;
    sink.lock().push((pixels.key().clone(), pixels.len()));
    Ok(())
  }));
  let screen = dispatcher.create_surface("screen", Area::from_size(0, 0, 320, 240));

  let logo = images.acquire_or_create(&"logo.png".to_string()).unwrap();
  let entry = logo.entry().clone();
  let task = screen.add(TaskDesc::new(TaskKind::Image, Area::from_size(8, 8, 64, 64)).payload(logo));
  assert_eq!(entry.ref_count(), 1);

  // Evicting the image while the task still needs it only marks it.
  assert!(images.drop(&"logo.png".to_string()));
  assert!(entry.is_invalid());
  assert_eq!(freed.load(Ordering::SeqCst), 0);

  dispatcher.run_until_idle(&screen).unwrap();
  assert_eq!(task.state(), TaskState::Ready);
  assert_eq!(*drawn.lock(), vec![("logo.png".to_string(), 8 * 16)]);

  // The last handle on the task carries the acquisition.
  assert_eq!(entry.ref_count(), 1);
  drop(task);
  assert_eq!(entry.ref_count(), 0);
  assert_eq!(freed.load(Ordering::SeqCst), 1);
  assert_eq!(images.size(), 0);
}

#[test]
fn test_missing_payload_is_reported_not_fatal() {
  init_tracing();
  let dispatcher = Dispatcher::new(test_config());
  dispatcher.register_unit(SoftwareUnit::new(|task, _| {
    task
      .payload::<Pixels>()
      .map(|_| ())
      .ok_or_else(|| DrawError::Render("image task without pixels".into()))
  }));
  let screen = dispatcher.create_surface("screen", Area::from_size(0, 0, 32, 32));
  let task = screen.add_task(TaskKind::Image, Area::from_size(0, 0, 32, 32));

  dispatcher.run_until_idle(&screen).unwrap();
  assert_eq!(task.state(), TaskState::Ready);
}
