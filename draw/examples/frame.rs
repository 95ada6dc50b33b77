use lumen_draw::coproc::{CoprocAsset, CoprocLink, CoprocUnit, Reservation};
use lumen_draw::{Area, Dispatcher, DrawTask, SoftwareUnit, TaskDesc, TaskKind};

use std::sync::Arc;

/// Prints the command stream instead of sending it over SPI.
struct PrintLink;

impl CoprocLink for PrintLink {
  fn upload(&mut self, address: u32, bytes: &[u8]) -> lumen_draw::Result<()> {
    println!("  coproc: upload {} bytes to {:#07x}", bytes.len(), address);
    Ok(())
  }

  fn render(&mut self, task: &DrawTask, asset: Option<Reservation>) -> lumen_draw::Result<()> {
    match asset {
      Some(r) => println!("  coproc: draw {:?} #{} from {:#07x}", task.kind(), task.id(), r.address),
      None => println!("  coproc: draw {:?} #{}", task.kind(), task.id()),
    }
    Ok(())
  }
}

fn main() {
  let dispatcher = Dispatcher::default();
  dispatcher.register_unit(SoftwareUnit::new(|task, surface| {
    println!("  software: draw {:?} #{} on {}", task.kind(), task.id(), surface.name());
    Ok(())
  }));
  dispatcher.register_unit(CoprocUnit::new(PrintLink).with_kinds([TaskKind::Image, TaskKind::Fill]));

  let screen = dispatcher.create_surface("screen", Area::from_size(0, 0, 480, 272));
  let icon = CoprocAsset {
    key: 0x1C0,
    bytes: Arc::from(vec![0u8; 32 * 32 * 2]),
    align: 4,
  };

  screen.add_task(TaskKind::Fill, Area::from_size(0, 0, 480, 272));
  for i in 0..3 {
    let area = Area::from_size(16 + i * 48, 16, 32, 32);
    screen.add(TaskDesc::new(TaskKind::Image, area).payload(icon.clone()));
  }
  screen.add_task(TaskKind::Label, Area::from_size(16, 64, 200, 16));

  println!("Rendering frame:");
  dispatcher.run_until_idle(&screen).expect("Frame should complete");
  println!("Done: {:?}", dispatcher);
}
