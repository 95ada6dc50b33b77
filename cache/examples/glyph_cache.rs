use lumen_cache::{CacheBuilder, CacheKind};

// Rasterizing a glyph is the expensive part of drawing text.
fn rasterize(glyph: &char) -> Option<Vec<u8>> {
  println!("  rasterizing '{}'", glyph);
  Some(vec![0xFF; 8 * 12])
}

fn main() {
  let glyphs = CacheBuilder::new(3)
    .kind(CacheKind::SecondChance)
    .name("glyphs")
    .create_with(rasterize)
    .on_free(|glyph: &char, _: &Vec<u8>| println!("  freeing '{}'", glyph))
    .build()
    .expect("Failed to build cache");

  for word in ["abc", "cab", "bad", "dab"] {
    println!("Drawing '{}':", word);
    for glyph in word.chars() {
      let bitmap = glyphs.acquire_or_create(&glyph).expect("Glyph should fit");
      println!("  '{}' -> {} bytes", glyph, bitmap.len());
    }
  }

  // A glyph held by an in-flight draw survives being dropped from the cache.
  let held = glyphs.acquire_or_create(&'a').expect("Glyph should fit");
  glyphs.drop(&'a');
  println!("'a' dropped while held; invalid = {}", held.entry().is_invalid());
  drop(held);

  println!("\nCache metrics: {:#?}", glyphs.metrics());
}
