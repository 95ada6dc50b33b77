/// An axis-aligned rectangle in surface coordinates. Both corners are
/// inclusive, so a single pixel is `Area::new(x, y, x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Area {
  pub x1: i32,
  pub y1: i32,
  pub x2: i32,
  pub y2: i32,
}

impl Area {
  pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  /// An area of `width` x `height` pixels with its top-left corner at `(x, y)`.
  pub const fn from_size(x: i32, y: i32, width: i32, height: i32) -> Self {
    Self::new(x, y, x + width - 1, y + height - 1)
  }

  #[inline]
  pub const fn width(&self) -> i32 {
    self.x2 - self.x1 + 1
  }

  #[inline]
  pub const fn height(&self) -> i32 {
    self.y2 - self.y1 + 1
  }

  #[inline]
  pub const fn is_empty(&self) -> bool {
    self.x2 < self.x1 || self.y2 < self.y1
  }

  pub fn intersect(&self, other: &Area) -> Option<Area> {
    let area = Area::new(
      self.x1.max(other.x1),
      self.y1.max(other.y1),
      self.x2.min(other.x2),
      self.y2.min(other.y2),
    );
    (!area.is_empty()).then_some(area)
  }

  #[inline]
  pub fn overlaps(&self, other: &Area) -> bool {
    self.intersect(other).is_some()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_size_is_inclusive() {
    let a = Area::from_size(10, 20, 4, 3);
    assert_eq!(a, Area::new(10, 20, 13, 22));
    assert_eq!((a.width(), a.height()), (4, 3));
  }

  #[test]
  fn test_touching_edges_overlap() {
    let a = Area::new(0, 0, 9, 9);
    assert!(a.overlaps(&Area::new(9, 9, 20, 20)));
    assert!(!a.overlaps(&Area::new(10, 0, 20, 9)));
    assert_eq!(a.intersect(&Area::new(5, -5, 15, 5)), Some(Area::new(5, 0, 9, 5)));
  }
}
