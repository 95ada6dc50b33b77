//! A cooperative draw-task scheduler for heterogeneous render units.
//!
//! Higher layers queue [`DrawTask`]s on a [`Surface`]; a [`Dispatcher`] offers
//! them to every registered [`DrawUnit`] (software rasterizer, GPU, remote
//! coprocessor). Units bid on the tasks they render best, claim them one at a
//! time, and never take a task that would paint over unfinished work beneath
//! it.
//!
//! # Features
//! - **Bidding**: the lowest [`DrawTask::bid`] reserves a task for its unit;
//!   [`SoftwareUnit`] is the baseline at [`SOFTWARE_SCORE`].
//! - **Exactly-once claims**: task state is a single atomic and only the
//!   `Queued -> InProgress` compare-and-swap hands out work.
//! - **Layers**: a task can wait for a child surface to drain.
//! - **Coprocessor memory**: [`coproc::RamAllocator`] places uploaded assets
//!   in the coprocessor's 1 MiB RAM.
//! - **Threads** (feature `threads`): a [`WorkerPool`] running one thread per
//!   unit.
//!
//! # Example
//! ```
//! use lumen_draw::{Area, Dispatcher, SoftwareUnit, TaskKind};
//!
//! let dispatcher = Dispatcher::default();
//! dispatcher.register_unit(SoftwareUnit::new(|_task, _surface| Ok(())));
//!
//! let screen = dispatcher.create_surface("screen", Area::from_size(0, 0, 320, 240));
//! let fill = screen.add_task(TaskKind::Fill, Area::from_size(0, 0, 320, 240));
//!
//! dispatcher.run_until_idle(&screen).unwrap();
//! assert!(fill.state().is_done());
//! ```

pub mod area;
pub mod config;
pub mod coproc;
pub mod dispatcher;
pub mod error;
pub mod surface;
pub mod sw;
pub mod task;
pub mod unit;
#[cfg(feature = "threads")]
mod worker;

pub use area::Area;
pub use config::DispatcherConfig;
pub use dispatcher::{DispatchSignal, Dispatcher, PassReport};
pub use error::{AllocError, DrawError, Result};
pub use surface::Surface;
pub use sw::SoftwareUnit;
pub use task::{DrawTask, Payload, TaskDesc, TaskKind, TaskState, UnitId, NO_BID, SOFTWARE_SCORE};
pub use unit::{DispatchContext, DispatchOutcome, DrawUnit};
#[cfg(feature = "threads")]
pub use worker::WorkerPool;
