//! Atomic 16x16 tile dirty-tracking bitmap.
//!
//! Packed into four 64-bit atomic words (256 bits total) rather than a
//! lock-guarded `HashSet`/`Vec<bool>`; a pixel write sets its tile's bit via
//! an atomic OR, and the refresh loop swaps the whole bitmap out with a
//! fetch-and-clear per word. This is the only dirty-tracking path — no
//! lock-based fallback.

use std::sync::atomic::{AtomicU64, Ordering};

const GRID: u32 = 16;
const WORDS: usize = 4;

pub struct DirtyBitmap {
    words: [AtomicU64; WORDS],
}

impl DirtyBitmap {
    pub fn new() -> Self {
        DirtyBitmap {
            words: [
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
            ],
        }
    }

    fn tile_index(x: u32, y: u32, width: u32, height: u32) -> Option<u32> {
        if x >= width || y >= height {
            return None;
        }
        let tile_w = width.div_ceil(GRID);
        let tile_h = height.div_ceil(GRID);
        let tx = (x / tile_w).min(GRID - 1);
        let ty = (y / tile_h).min(GRID - 1);
        Some(ty * GRID + tx)
    }

    /// Marks the tile containing pixel `(x, y)` dirty. Out-of-grid writes
    /// (outside the current mode's bounds) are silently ignored.
    pub fn mark_pixel(&self, x: u32, y: u32, width: u32, height: u32) {
        if let Some(bit) = Self::tile_index(x, y, width, height) {
            self.set_bit(bit);
        }
    }

    fn set_bit(&self, bit: u32) {
        let word = (bit / 64) as usize;
        let mask = 1u64 << (bit % 64);
        self.words[word].fetch_or(mask, Ordering::SeqCst);
    }

    /// Marks every tile dirty; used by direct-mode fullscreen effects.
    pub fn mark_all(&self) {
        for w in &self.words {
            w.store(u64::MAX, Ordering::SeqCst);
        }
    }

    /// Atomically swaps out the full bitmap (fetching each word and
    /// clearing it in one step) and returns the snapshot of tiles that
    /// were dirty since the last swap.
    pub fn swap_and_clear(&self) -> [u64; WORDS] {
        let mut snapshot = [0u64; WORDS];
        for (i, w) in self.words.iter().enumerate() {
            snapshot[i] = w.swap(0, Ordering::SeqCst);
        }
        snapshot
    }

    /// Iterates the set tile indices (0..256) of a snapshot.
    pub fn set_tiles(snapshot: &[u64; WORDS]) -> impl Iterator<Item = u32> + '_ {
        (0..256u32).filter(move |&bit| {
            let word = (bit / 64) as usize;
            let mask = 1u64 << (bit % 64);
            snapshot[word] & mask != 0
        })
    }

    /// Pixel rectangle `(x, y, w, h)` covered by tile index `tile` for a
    /// given mode's dimensions.
    pub fn tile_rect(tile: u32, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let tile_w = width.div_ceil(GRID);
        let tile_h = height.div_ceil(GRID);
        let tx = tile % GRID;
        let ty = tile / GRID;
        let x = tx * tile_w;
        let y = ty * tile_h;
        let w = tile_w.min(width.saturating_sub(x));
        let h = tile_h.min(height.saturating_sub(y));
        (x, y, w, h)
    }
}

impl Default for DirtyBitmap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marking_a_pixel_sets_its_tile_bit() {
        let bm = DirtyBitmap::new();
        bm.mark_pixel(5, 5, 640, 480);
        let snap = bm.swap_and_clear();
        let tiles: Vec<u32> = DirtyBitmap::set_tiles(&snap).collect();
        assert_eq!(tiles.len(), 1);
    }

    #[test]
    fn swap_and_clear_resets_bitmap() {
        let bm = DirtyBitmap::new();
        bm.mark_pixel(0, 0, 640, 480);
        let _ = bm.swap_and_clear();
        let second = bm.swap_and_clear();
        assert!(DirtyBitmap::set_tiles(&second).next().is_none());
    }

    #[test]
    fn out_of_bounds_pixel_is_ignored() {
        let bm = DirtyBitmap::new();
        bm.mark_pixel(10_000, 10_000, 640, 480);
        let snap = bm.swap_and_clear();
        assert!(DirtyBitmap::set_tiles(&snap).next().is_none());
    }
}
