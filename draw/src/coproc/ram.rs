//! Bump allocator for coprocessor memory.
//!
//! Assets are uploaded once per session and looked up by a 64-bit key. Space
//! is never reclaimed piecemeal; [`RamAllocator::reset`] starts a new session.

use crate::error::AllocError;

use std::mem;

/// Size of the coprocessor's general-purpose RAM.
pub const RAM_SIZE: u32 = 1024 * 1024;

const INITIAL_CAPACITY: usize = 32;

/// Where an asset lives in coprocessor memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
  pub address: u32,
  pub size: u32,
  /// Newly reserved: the asset still has to be uploaded.
  pub fresh: bool,
}

#[derive(Debug, Clone, Copy)]
struct Cell {
  key: u64,
  address: u32,
  size: u32,
}

impl Cell {
  fn reservation(&self, fresh: bool) -> Reservation {
    Reservation {
      address: self.address,
      size: self.size,
      fresh,
    }
  }
}

enum Probe {
  Found(Cell),
  Vacant(usize),
}

#[derive(Debug)]
pub struct RamAllocator {
  cells: Vec<Option<Cell>>,
  len: usize,
  high_water: u32,
  ram_size: u32,
}

impl Default for RamAllocator {
  fn default() -> Self {
    Self::new()
  }
}

impl RamAllocator {
  pub fn new() -> Self {
    Self::with_ram_size(RAM_SIZE)
  }

  pub fn with_ram_size(ram_size: u32) -> Self {
    Self {
      cells: vec![None; INITIAL_CAPACITY],
      len: 0,
      high_water: 0,
      ram_size,
    }
  }

  /// Returns the block for `key`, reserving `size` bytes at the next
  /// `align`-aligned offset if the key is new. An alignment of 0 means 1.
  ///
  /// A known key returns its existing block whatever `size` and `align` say.
  pub fn get_or_reserve(&mut self, key: u64, size: u32, align: u32) -> Result<Reservation, AllocError> {
    let vacant = match self.probe(key) {
      Probe::Found(cell) => return Ok(cell.reservation(false)),
      Probe::Vacant(index) => index,
    };

    let align = match align {
      0 => 1,
      a if a.is_power_of_two() => a,
      a => return Err(AllocError::BadAlignment(a)),
    };
    let address = align_up(u64::from(self.high_water), u64::from(align));
    let end = address + u64::from(size);
    if end > u64::from(self.ram_size) {
      return Err(AllocError::OutOfSpace {
        requested: size,
        remaining: self.remaining(),
      });
    }

    // Both fit in u32: end <= ram_size.
    let address = address as u32;
    self.cells[vacant] = Some(Cell { key, address, size });
    self.len += 1;
    self.high_water = end as u32;
    tracing::trace!(key, address, size, high_water = self.high_water, "reserved coprocessor memory");

    if self.len * 4 > self.cells.len() * 3 {
      self.grow();
    }
    Ok(Cell { key, address, size }.reservation(true))
  }

  pub fn lookup(&self, key: u64) -> Option<Reservation> {
    match self.probe(key) {
      Probe::Found(cell) => Some(cell.reservation(false)),
      Probe::Vacant(_) => None,
    }
  }

  /// Forgets every block. The next session uploads everything again.
  pub fn reset(&mut self) {
    tracing::debug!(assets = self.len, high_water = self.high_water, "reset coprocessor memory");
    self.cells = vec![None; INITIAL_CAPACITY];
    self.len = 0;
    self.high_water = 0;
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// Slots in the lookup table.
  pub fn capacity(&self) -> usize {
    self.cells.len()
  }

  /// First byte past the last reservation.
  pub fn high_water(&self) -> u32 {
    self.high_water
  }

  pub fn remaining(&self) -> u32 {
    self.ram_size - self.high_water
  }

  pub fn ram_size(&self) -> u32 {
    self.ram_size
  }

  // Load factor stays below 3/4, so a vacant slot always exists.
  fn probe(&self, key: u64) -> Probe {
    let capacity = self.cells.len();
    let start = fnv1a32(&key.to_le_bytes()) as usize % capacity;
    for step in 0..capacity {
      let index = (start + step) % capacity;
      match &self.cells[index] {
        None => return Probe::Vacant(index),
        Some(cell) if cell.key == key => return Probe::Found(*cell),
        Some(_) => {}
      }
    }
    Probe::Vacant(start)
  }

  fn grow(&mut self) {
    let capacity = self.cells.len() + self.cells.len() / 2;
    let old = mem::replace(&mut self.cells, vec![None; capacity]);
    for cell in old.into_iter().flatten() {
      if let Probe::Vacant(index) = self.probe(cell.key) {
        self.cells[index] = Some(cell);
      }
    }
    tracing::debug!(capacity, assets = self.len, "grew coprocessor asset table");
  }
}

fn align_up(offset: u64, align: u64) -> u64 {
  (offset + align - 1) & !(align - 1)
}

/// 32-bit FNV-1a.
pub fn fnv1a32(bytes: &[u8]) -> u32 {
  const FNV_OFFSET: u32 = 0x811c_9dc5;
  const FNV_PRIME: u32 = 0x0100_0193;

  bytes.iter().fold(FNV_OFFSET, |hash, &b| (hash ^ u32::from(b)).wrapping_mul(FNV_PRIME))
}
