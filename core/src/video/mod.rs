//! The video chip: a double-buffered RGBA framebuffer driven by the copper
//! and blitter, with atomic dirty-tile tracking and a 60 Hz refresh loop.

pub mod blitter;
pub mod copper;
pub mod dirty;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::bus::Bus;
use crate::regs::*;
use blitter::{Blitter, BlitterRegs};
use copper::Copper;
use dirty::DirtyBitmap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoMode {
    Mode640x480,
    Mode800x600,
    Mode1024x768,
}

impl VideoMode {
    pub fn dims(self) -> (u32, u32) {
        match self {
            VideoMode::Mode640x480 => (640, 480),
            VideoMode::Mode800x600 => (800, 600),
            VideoMode::Mode1024x768 => (1024, 768),
        }
    }

    fn from_u32(v: u32) -> VideoMode {
        match v {
            1 => VideoMode::Mode800x600,
            2 => VideoMode::Mode1024x768,
            _ => VideoMode::Mode640x480,
        }
    }
}

struct Buffers {
    mode: VideoMode,
    front: Vec<u8>,
    back: Vec<u8>,
}

impl Buffers {
    fn new(mode: VideoMode) -> Self {
        let (w, h) = mode.dims();
        let size = (w * h * 4) as usize;
        Buffers {
            mode,
            front: vec![0; size],
            back: vec![0; size],
        }
    }

    fn resize_if_needed(&mut self, mode: VideoMode) {
        if mode == self.mode {
            return;
        }
        *self = Buffers::new(mode);
    }
}

const REFRESH_INTERVAL: Duration = Duration::from_nanos(16_666_667);

pub struct VideoChip {
    bus: Arc<Bus>,
    buffers: Mutex<Buffers>,
    dirty: DirtyBitmap,
    copper: Mutex<Copper>,
    blitter: Mutex<Blitter>,
    enabled: AtomicBool,
    raster_y: AtomicU32,
    raster_height: AtomicU32,
    raster_color: AtomicU32,
    frame_start: Mutex<Instant>,
    frame_counter: AtomicU32,
    compositor_managed: AtomicBool,
}

impl VideoChip {
    pub fn new(bus: Arc<Bus>) -> Arc<Self> {
        let chip = Arc::new(VideoChip {
            bus,
            buffers: Mutex::new(Buffers::new(VideoMode::Mode640x480)),
            dirty: DirtyBitmap::new(),
            copper: Mutex::new(Copper::new()),
            blitter: Mutex::new(Blitter::new()),
            enabled: AtomicBool::new(false),
            raster_y: AtomicU32::new(0),
            raster_height: AtomicU32::new(1),
            raster_color: AtomicU32::new(0),
            frame_start: Mutex::new(Instant::now()),
            frame_counter: AtomicU32::new(0),
            compositor_managed: AtomicBool::new(false),
        });
        chip.install_handlers();
        chip
    }

    fn dims(&self) -> (u32, u32) {
        self.buffers.lock().unwrap().mode.dims()
    }

    /// Internal register write path, already running under no external
    /// lock contention concerns since every field here is independently
    /// synchronised; this is the path the copper's MOVE instructions call
    /// directly instead of recursing into `Bus::write32`.
    fn internal_write(self: &Arc<Self>, addr: u32, value: u32) {
        match addr {
            VIDEO_CTRL => self.enabled.store(value & 1 != 0, Ordering::SeqCst),
            VIDEO_MODE => {
                let mode = VideoMode::from_u32(value);
                self.buffers.lock().unwrap().resize_if_needed(mode);
            }
            VIDEO_RASTER_CTRL => {
                if value & 1 != 0 {
                    self.fill_raster_band();
                }
            }
            VIDEO_RASTER_Y => self.raster_y.store(value, Ordering::SeqCst),
            VIDEO_RASTER_HEIGHT => self.raster_height.store(value.max(1), Ordering::SeqCst),
            VIDEO_RASTER_COLOR => self.raster_color.store(value, Ordering::SeqCst),
            COPPER_PTR => self.copper.lock().unwrap().set_staged_ptr(value),
            COPPER_CTRL => {
                let mut copper = self.copper.lock().unwrap();
                if value & 0b10 != 0 {
                    copper.reset();
                }
                copper.set_running(value & 1 != 0);
            }
            COPPER_ENDIAN => self.copper.lock().unwrap().set_endian(value & 1 != 0),
            BLT_SRC_ADDR => self.blitter.lock().unwrap().regs.src_addr = value,
            BLT_DST_ADDR => self.blitter.lock().unwrap().regs.dst_addr = value,
            BLT_WIDTH => self.blitter.lock().unwrap().regs.width = value,
            BLT_HEIGHT => self.blitter.lock().unwrap().regs.height = value,
            BLT_SRC_STRIDE => self.blitter.lock().unwrap().regs.src_stride = value,
            BLT_DST_STRIDE => self.blitter.lock().unwrap().regs.dst_stride = value,
            BLT_COLOR => self.blitter.lock().unwrap().regs.color = value,
            BLT_MASK_ADDR => self.blitter.lock().unwrap().regs.mask_addr = value,
            BLT_OP => self.blitter.lock().unwrap().regs.op = value,
            BLT_LINE_X0 => self.blitter.lock().unwrap().regs.line_x0 = value,
            BLT_LINE_Y0 => self.blitter.lock().unwrap().regs.line_y0 = value,
            BLT_LINE_X1 => self.blitter.lock().unwrap().regs.line_x1 = value,
            BLT_LINE_Y1 => self.blitter.lock().unwrap().regs.line_y1 = value,
            BLT_CTRL => {
                if value & 1 != 0 {
                    self.run_blitter();
                }
            }
            _ => {}
        }
    }

    fn internal_read(self: &Arc<Self>, addr: u32) -> u32 {
        match addr {
            VIDEO_CTRL => self.enabled.load(Ordering::SeqCst) as u32,
            VIDEO_STATUS => self.status_bits(),
            COPPER_STATUS => {
                let s = self.copper.lock().unwrap().status();
                (s.running as u32) | ((s.waiting as u32) << 1) | ((s.halted as u32) << 2)
            }
            COPPER_PC => self.copper.lock().unwrap().pc(),
            BLT_STATUS => 0,
            _ => 0,
        }
    }

    fn status_bits(&self) -> u32 {
        let has_content = self.frame_counter.load(Ordering::SeqCst) > 0;
        let elapsed = self.frame_start.lock().unwrap().elapsed();
        let in_vblank = elapsed >= REFRESH_INTERVAL / 2;
        (has_content as u32) | ((in_vblank as u32) << 1)
    }

    /// Writes straight into the VRAM window of bus memory (the same store a
    /// guest pixel write or a blitter op lands in), so the fast-fill path
    /// agrees with every other way pixels reach the framebuffer. Fills
    /// `raster_height` consecutive rows starting at `raster_y`, clamped to
    /// the visible screen.
    fn fill_raster_band(&self) {
        let (w, h) = self.dims();
        let y0 = self.raster_y.load(Ordering::SeqCst);
        if y0 >= h {
            return;
        }
        let height = self.raster_height.load(Ordering::SeqCst).max(1);
        let y1 = (y0 + height).min(h);
        let color = self.raster_color.load(Ordering::SeqCst).to_le_bytes();
        let stride = w * 4;
        let mem = self.bus.get_memory();
        let mem_len = mem.len();
        for y in y0..y1 {
            for x in 0..w {
                let addr = VRAM_START as usize + (y * stride + x * 4) as usize;
                for (i, b) in color.into_iter().enumerate() {
                    mem[(addr + i) % mem_len].store(b, Ordering::Relaxed);
                }
                self.dirty.mark_pixel(x, y, w, h);
            }
        }
    }

    fn run_blitter(&self) {
        let (w, h) = self.dims();
        let blitter = self.blitter.lock().unwrap();
        blitter.execute(&self.bus, &self.dirty, w, h);
    }

    fn install_handlers(self: &Arc<Self>) {
        let regs_to_map: &[u32] = &[
            VIDEO_CTRL,
            VIDEO_MODE,
            VIDEO_STATUS,
            VIDEO_RASTER_CTRL,
            VIDEO_RASTER_Y,
            VIDEO_RASTER_HEIGHT,
            VIDEO_RASTER_COLOR,
            COPPER_PTR,
            COPPER_CTRL,
            COPPER_PC,
            COPPER_STATUS,
            COPPER_ENDIAN,
            BLT_SRC_ADDR,
            BLT_DST_ADDR,
            BLT_WIDTH,
            BLT_HEIGHT,
            BLT_SRC_STRIDE,
            BLT_DST_STRIDE,
            BLT_COLOR,
            BLT_MASK_ADDR,
            BLT_OP,
            BLT_CTRL,
            BLT_STATUS,
            BLT_LINE_X0,
            BLT_LINE_Y0,
            BLT_LINE_X1,
            BLT_LINE_Y1,
        ];
        for &addr in regs_to_map {
            let chip_r = self.clone();
            let chip_w = self.clone();
            self.bus.map_io(
                addr,
                addr + 3,
                Some(Arc::new(move |a| chip_r.internal_read(a))),
                Some(Arc::new(move |a, v| chip_w.internal_write(a, v))),
            );
        }

        // A guest write anywhere in the VRAM window is itself the pixel
        // store (the bus always latches the raw bytes); the only thing the
        // chip needs to do here is mark the covering tile dirty, the same
        // as the blitter and the raster-band fill do for their own writes.
        let chip = self.clone();
        self.bus.map_io(
            VRAM_START,
            VRAM_END - 1,
            None,
            Some(Arc::new(move |addr, _value| chip.mark_vram_write(addr))),
        );
    }

    fn mark_vram_write(&self, addr: u32) {
        let (w, h) = self.dims();
        let stride = w * 4;
        if stride == 0 || addr < VRAM_START {
            return;
        }
        let offset = addr - VRAM_START;
        let y = offset / stride;
        let x = (offset % stride) / 4;
        self.dirty.mark_pixel(x, y, w, h);
    }

    /// Marks every tile dirty, bypassing tile-granular tracking. Intended
    /// for fullscreen effects where per-tile bookkeeping is pure overhead.
    pub fn mark_full_screen_dirty(&self) {
        self.dirty.mark_all();
    }

    pub fn set_compositor_managed(&self, managed: bool) {
        self.compositor_managed.store(managed, Ordering::SeqCst);
    }

    /// Returns the current front buffer, or `None` if nothing has been
    /// presented yet.
    pub fn get_frame(&self) -> Option<Vec<u8>> {
        if self.frame_counter.load(Ordering::SeqCst) == 0 {
            return None;
        }
        Some(self.buffers.lock().unwrap().front.clone())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn display_size(&self) -> (u32, u32) {
        self.dims()
    }

    /// One tick of the internal 60 Hz refresh loop: advances the copper
    /// across every scanline (unless compositor-managed), runs any
    /// pending blitter op, then synchronises dirty tiles and swaps
    /// front/back buffers.
    pub fn run_refresh_tick(self: &Arc<Self>) {
        *self.frame_start.lock().unwrap() = Instant::now();
        if !self.is_enabled() {
            return;
        }
        if !self.compositor_managed.load(Ordering::SeqCst) {
            let (_, h) = self.dims();
            self.copper.lock().unwrap().start_frame();
            for y in 0..h {
                let chip = self.clone();
                let video_write = move |addr: u32, value: u32| chip.internal_write(addr, value);
                self.copper.lock().unwrap().tick_scanline(&self.bus, y, &video_write);
            }
        }
        self.swap_buffers();
    }

    /// Compositor-driven alternative to `run_refresh_tick`: call
    /// `start_frame`, then `process_scanline` once per raster line, then
    /// `finish_frame`.
    pub fn start_frame(self: &Arc<Self>) {
        *self.frame_start.lock().unwrap() = Instant::now();
        self.compositor_managed.store(true, Ordering::SeqCst);
        self.copper.lock().unwrap().start_frame();
    }

    pub fn process_scanline(self: &Arc<Self>, y: u32) {
        let chip = self.clone();
        let video_write = move |addr: u32, value: u32| chip.internal_write(addr, value);
        self.copper.lock().unwrap().tick_scanline(&self.bus, y, &video_write);
    }

    pub fn finish_frame(&self) {
        self.swap_buffers();
    }

    /// For each tile touched since the last swap, pulls its pixels straight
    /// out of the VRAM window of bus memory (the authoritative store every
    /// guest write, blitter op, and raster fill lands in) into `back`, then
    /// swaps `front`/`back` so the refreshed tiles become visible. Clean
    /// tiles carry over whatever `back` already held from the last swap.
    fn swap_buffers(&self) {
        let snapshot = self.dirty.swap_and_clear();
        let mut buffers = self.buffers.lock().unwrap();
        let (w, h) = buffers.mode.dims();
        let stride = (w * 4) as usize;
        let mem = self.bus.get_memory();
        let mem_len = mem.len();
        for tile in DirtyBitmap::set_tiles(&snapshot) {
            let (tx, ty, tw, th) = DirtyBitmap::tile_rect(tile, w, h);
            for row in 0..th {
                let y = ty + row;
                let start = y as usize * stride + tx as usize * 4;
                let len = tw as usize * 4;
                let vram_base = VRAM_START as usize + start;
                for i in 0..len {
                    let byte = mem[(vram_base + i) % mem_len].load(Ordering::Relaxed);
                    buffers.back[start + i] = byte;
                }
            }
        }
        std::mem::swap(&mut buffers.front, &mut buffers.back);
        self.frame_counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        let mut buffers = self.buffers.lock().unwrap();
        *buffers = Buffers::new(VideoMode::Mode640x480);
        drop(buffers);
        self.copper.lock().unwrap().reset();
        self.blitter.lock().unwrap().regs = BlitterRegs::default();
        self.enabled.store(false, Ordering::SeqCst);
        self.frame_counter.store(0, Ordering::SeqCst);
    }
}
