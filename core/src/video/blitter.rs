//! Rectangular memory operations: fill, copy, masked copy, alpha copy, and
//! Bresenham line drawing. Every write goes through the bus's lock-free RAM
//! view directly (not `read32`/`write32`) and marks the affected tiles
//! dirty; per the chosen execution model, a latched operation always runs
//! to completion synchronously inside the register-write handler rather
//! than being deferred to a later tick.

use std::sync::atomic::Ordering;

use crate::bus::Bus;
use crate::regs::{VRAM_END, VRAM_START};
use crate::video::dirty::DirtyBitmap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlitOp {
    Copy,
    Fill,
    Line,
    MaskedCopy,
    AlphaCopy,
}

impl BlitOp {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(BlitOp::Copy),
            1 => Some(BlitOp::Fill),
            2 => Some(BlitOp::Line),
            3 => Some(BlitOp::MaskedCopy),
            4 => Some(BlitOp::AlphaCopy),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BlitterRegs {
    pub src_addr: u32,
    pub dst_addr: u32,
    pub width: u32,
    pub height: u32,
    pub src_stride: u32,
    pub dst_stride: u32,
    pub color: u32,
    pub mask_addr: u32,
    pub op: u32,
    pub line_x0: u32,
    pub line_y0: u32,
    pub line_x1: u32,
    pub line_y1: u32,
}

pub struct Blitter {
    pub regs: BlitterRegs,
}

impl Blitter {
    pub fn new() -> Self {
        Blitter {
            regs: BlitterRegs::default(),
        }
    }

    pub fn reset(&mut self) {
        self.regs = BlitterRegs::default();
    }

    fn read_pixel(bus: &Bus, addr: u32) -> [u8; 4] {
        let mem = bus.get_memory();
        let base = addr as usize;
        let len = mem.len();
        [
            mem[base % len].load(Ordering::Relaxed),
            mem[(base + 1) % len].load(Ordering::Relaxed),
            mem[(base + 2) % len].load(Ordering::Relaxed),
            mem[(base + 3) % len].load(Ordering::Relaxed),
        ]
    }

    fn write_pixel(bus: &Bus, addr: u32, px: [u8; 4]) {
        let mem = bus.get_memory();
        let base = addr as usize;
        let len = mem.len();
        for (i, b) in px.into_iter().enumerate() {
            mem[(base + i) % len].store(b, Ordering::Relaxed);
        }
    }

    /// Marks the tile covering `addr` dirty, translating from an absolute
    /// bus address into screen pixel coordinates. A destination outside the
    /// VRAM window (an off-screen scratch copy) touches no tile.
    fn mark(dirty: &DirtyBitmap, addr: u32, screen_w: u32, screen_h: u32) {
        if addr < VRAM_START || addr >= VRAM_END {
            return;
        }
        let stride = screen_w * 4;
        if stride == 0 {
            return;
        }
        let offset = addr - VRAM_START;
        let y = offset / stride;
        let x = (offset % stride) / 4;
        dirty.mark_pixel(x, y, screen_w, screen_h);
    }

    /// Executes the currently latched operation. Returns `true` if an
    /// error occurred (write outside VRAM or a misaligned offset) — the
    /// operation still runs to completion on remaining pixels.
    pub fn execute(&self, bus: &Bus, dirty: &DirtyBitmap, screen_w: u32, screen_h: u32) -> bool {
        let r = &self.regs;
        let mut error = false;
        match BlitOp::from_u32(r.op) {
            Some(BlitOp::Fill) => {
                let color = r.color.to_le_bytes();
                for y in 0..r.height {
                    for x in 0..r.width {
                        let stride = if r.dst_stride != 0 {
                            r.dst_stride
                        } else {
                            r.width * 4
                        };
                        let addr = r.dst_addr + y * stride + x * 4;
                        if addr % 4 != 0 {
                            error = true;
                            continue;
                        }
                        Self::write_pixel(bus, addr, color);
                        Self::mark(dirty, addr, screen_w, screen_h);
                    }
                }
            }
            Some(BlitOp::Copy) => {
                let src_stride = if r.src_stride != 0 { r.src_stride } else { r.width * 4 };
                let dst_stride = if r.dst_stride != 0 { r.dst_stride } else { r.width * 4 };
                for y in 0..r.height {
                    for x in 0..r.width {
                        let src = r.src_addr + y * src_stride + x * 4;
                        let dst = r.dst_addr + y * dst_stride + x * 4;
                        if dst % 4 != 0 {
                            error = true;
                            continue;
                        }
                        let px = Self::read_pixel(bus, src);
                        Self::write_pixel(bus, dst, px);
                        Self::mark(dirty, dst, screen_w, screen_h);
                    }
                }
            }
            Some(BlitOp::MaskedCopy) => {
                let src_stride = if r.src_stride != 0 { r.src_stride } else { r.width * 4 };
                let dst_stride = if r.dst_stride != 0 { r.dst_stride } else { r.width * 4 };
                let mask_row_bytes = r.width.div_ceil(8);
                for y in 0..r.height {
                    for x in 0..r.width {
                        let mask_byte_addr = r.mask_addr + y * mask_row_bytes + x / 8;
                        let mask_byte = bus.get_memory()
                            [(mask_byte_addr as usize) % bus.get_memory().len()]
                        .load(Ordering::Relaxed);
                        let bit_set = (mask_byte >> (x % 8)) & 1 != 0;
                        if !bit_set {
                            continue;
                        }
                        let src = r.src_addr + y * src_stride + x * 4;
                        let dst = r.dst_addr + y * dst_stride + x * 4;
                        if dst % 4 != 0 {
                            error = true;
                            continue;
                        }
                        let px = Self::read_pixel(bus, src);
                        Self::write_pixel(bus, dst, px);
                        Self::mark(dirty, dst, screen_w, screen_h);
                    }
                }
            }
            Some(BlitOp::AlphaCopy) => {
                let src_stride = if r.src_stride != 0 { r.src_stride } else { r.width * 4 };
                let dst_stride = if r.dst_stride != 0 { r.dst_stride } else { r.width * 4 };
                for y in 0..r.height {
                    for x in 0..r.width {
                        let src = r.src_addr + y * src_stride + x * 4;
                        let px = Self::read_pixel(bus, src);
                        if px[3] == 0 {
                            continue;
                        }
                        let dst = r.dst_addr + y * dst_stride + x * 4;
                        if dst % 4 != 0 {
                            error = true;
                            continue;
                        }
                        Self::write_pixel(bus, dst, px);
                        Self::mark(dirty, dst, screen_w, screen_h);
                    }
                }
            }
            Some(BlitOp::Line) => {
                let color = r.color.to_le_bytes();
                let stride = if r.dst_stride != 0 { r.dst_stride } else { screen_w * 4 };
                let (mut x0, mut y0) = ((r.line_x0 >> 16) as i32, (r.line_y0 >> 16) as i32);
                let (x1, y1) = ((r.line_x1 >> 16) as i32, (r.line_y1 >> 16) as i32);
                let dx = (x1 - x0).abs();
                let dy = -(y1 - y0).abs();
                let sx = if x0 < x1 { 1 } else { -1 };
                let sy = if y0 < y1 { 1 } else { -1 };
                let mut err = dx + dy;
                loop {
                    if x0 >= 0 && y0 >= 0 && (x0 as u32) < screen_w && (y0 as u32) < screen_h {
                        let addr = r.dst_addr + (y0 as u32) * stride + (x0 as u32) * 4;
                        Self::write_pixel(bus, addr, color);
                        Self::mark(dirty, addr, screen_w, screen_h);
                    }
                    if x0 == x1 && y0 == y1 {
                        break;
                    }
                    let e2 = 2 * err;
                    if e2 >= dy {
                        err += dy;
                        x0 += sx;
                    }
                    if e2 <= dx {
                        err += dx;
                        y0 += sy;
                    }
                }
            }
            None => {
                error = true;
            }
        }
        error
    }
}

impl Default for Blitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_writes_solid_color_across_rect() {
        let bus = Bus::new();
        let dirty = DirtyBitmap::new();
        let mut blitter = Blitter::new();
        blitter.regs = BlitterRegs {
            dst_addr: 0x1000,
            width: 4,
            height: 2,
            color: 0xAABBCCDD,
            op: 1,
            ..Default::default()
        };
        let err = blitter.execute(&bus, &dirty, 640, 480);
        assert!(!err);
        let px = Blitter::read_pixel(&bus, 0x1000);
        assert_eq!(u32::from_le_bytes(px), 0xAABBCCDD);
    }

    #[test]
    fn copy_duplicates_source_rect() {
        let bus = Bus::new();
        Blitter::write_pixel(&bus, 0x2000, [1, 2, 3, 4]);
        let dirty = DirtyBitmap::new();
        let mut blitter = Blitter::new();
        blitter.regs = BlitterRegs {
            src_addr: 0x2000,
            dst_addr: 0x3000,
            width: 1,
            height: 1,
            op: 0,
            ..Default::default()
        };
        blitter.execute(&bus, &dirty, 640, 480);
        assert_eq!(Blitter::read_pixel(&bus, 0x3000), [1, 2, 3, 4]);
    }

    #[test]
    fn masked_copy_skips_zero_bits() {
        let bus = Bus::new();
        Blitter::write_pixel(&bus, 0x4000, [9, 9, 9, 9]);
        Blitter::write_pixel(&bus, 0x4004, [9, 9, 9, 9]);
        // mask byte 0b0000_0001: only pixel 0 copies.
        bus.get_memory()[0x5000].store(0b0000_0001, Ordering::Relaxed);
        let dirty = DirtyBitmap::new();
        let mut blitter = Blitter::new();
        blitter.regs = BlitterRegs {
            src_addr: 0x4000,
            dst_addr: 0x6000,
            mask_addr: 0x5000,
            width: 2,
            height: 1,
            op: 3,
            ..Default::default()
        };
        blitter.execute(&bus, &dirty, 640, 480);
        assert_eq!(Blitter::read_pixel(&bus, 0x6000), [9, 9, 9, 9]);
        assert_eq!(Blitter::read_pixel(&bus, 0x6004), [0, 0, 0, 0]);
    }

    #[test]
    fn alpha_copy_skips_transparent_pixels() {
        let bus = Bus::new();
        Blitter::write_pixel(&bus, 0x7000, [1, 2, 3, 0]);
        let dirty = DirtyBitmap::new();
        let mut blitter = Blitter::new();
        blitter.regs = BlitterRegs {
            src_addr: 0x7000,
            dst_addr: 0x8000,
            width: 1,
            height: 1,
            op: 4,
            ..Default::default()
        };
        blitter.execute(&bus, &dirty, 640, 480);
        assert_eq!(Blitter::read_pixel(&bus, 0x8000), [0, 0, 0, 0]);
    }

    #[test]
    fn line_plots_bresenham_diagonal() {
        let bus = Bus::new();
        let dirty = DirtyBitmap::new();
        let mut blitter = Blitter::new();
        blitter.regs = BlitterRegs {
            dst_addr: 0,
            dst_stride: 640 * 4,
            color: 0xFFFFFFFF,
            op: 2,
            line_x0: 0,
            line_y0: 0,
            line_x1: 3 << 16,
            line_y1: 3 << 16,
            ..Default::default()
        };
        blitter.execute(&bus, &dirty, 640, 480);
        for i in 0..=3u32 {
            let addr = i * 640 * 4 + i * 4;
            assert_eq!(Blitter::read_pixel(&bus, addr), [0xFF, 0xFF, 0xFF, 0xFF]);
        }
    }
}
