#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use lumen_cache::{Cache, CacheBuilder, CacheKind};
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

/// Records what the payload callbacks were asked to do.
#[derive(Default)]
pub struct Ledger {
  pub created: Mutex<Vec<u32>>,
  pub freed: Mutex<Vec<u32>>,
  pub live: AtomicUsize,
}

impl Ledger {
  pub fn created(&self) -> Vec<u32> {
    self.created.lock().clone()
  }

  pub fn freed(&self) -> Vec<u32> {
    self.freed.lock().clone()
  }

  pub fn live(&self) -> usize {
    self.live.load(Ordering::SeqCst)
  }
}

/// A cache of `u32 -> String` whose callbacks are recorded in the returned
/// ledger.
pub fn ledger_cache(kind: CacheKind, max_size: usize) -> (Cache<u32, String>, Arc<Ledger>) {
  init_tracing();
  let ledger = Arc::new(Ledger::default());
  let on_create = ledger.clone();
  let on_free = ledger.clone();
  let cache = CacheBuilder::new(max_size)
    .kind(kind)
    .name(format!("{kind:?}-test"))
    .create_with(move |k: &u32| {
      on_create.created.lock().push(*k);
      on_create.live.fetch_add(1, Ordering::SeqCst);
      Some(format!("payload-{k}"))
    })
    .on_free(move |k: &u32, _v: &String| {
      on_free.freed.lock().push(*k);
      on_free.live.fetch_sub(1, Ordering::SeqCst);
    })
    .build()
    .unwrap();
  (cache, ledger)
}
