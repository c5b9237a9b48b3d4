//! The shared music-player MMIO protocol: point-at-data, start, observe.
//!
//! Every format's player drives the same four-register block
//! (`PLAY_PTR`/`PLAY_LEN`/`PLAY_CTRL`/`PLAY_STATUS`, plus `SUBSONG`) and
//! the same generation-counter cancellation discipline, so that a stop
//! immediately followed by another start can never let a stale parse
//! result clobber newer state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::audio::engine::{AhxEngine, AhxReplayer, ReplayEngine};
use crate::audio::SoundChip;
use crate::bus::Bus;
use crate::error::RetroError;
use crate::format::FormatDecoder;
use crate::regs::*;

struct Staged {
    ptr: u32,
    len: u32,
    subsong: u32,
    force_loop: bool,
}

struct PlayerState {
    staged: Staged,
    rendering: bool,
    error: bool,
}

/// Drives one format's PSG/SID/TED/POKEY player: the shared register
/// protocol plus the asynchronous parse-and-install pipeline.
pub struct PlayerControl {
    format: PlayerFormat,
    bus: Arc<Bus>,
    decoder: Arc<dyn FormatDecoder>,
    engine: Arc<Mutex<ReplayEngine>>,
    chip: Arc<SoundChip>,
    generation: Arc<AtomicU64>,
    state: Mutex<PlayerState>,
}

impl PlayerControl {
    pub fn new(
        format: PlayerFormat,
        bus: Arc<Bus>,
        chip: Arc<SoundChip>,
        decoder: Arc<dyn FormatDecoder>,
    ) -> Arc<Self> {
        let engine = Arc::new(Mutex::new(ReplayEngine::new(chip.clone(), format)));
        let control = Arc::new(PlayerControl {
            format,
            bus,
            decoder,
            engine,
            chip,
            generation: Arc::new(AtomicU64::new(0)),
            state: Mutex::new(PlayerState {
                staged: Staged {
                    ptr: 0,
                    len: 0,
                    subsong: 0,
                    force_loop: false,
                },
                rendering: false,
                error: false,
            }),
        });
        control.install_handlers();
        control
    }

    fn base(&self) -> u32 {
        self.format.base_addr()
    }

    fn start(self: &Arc<Self>) {
        let gen = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (ptr, len, subsong, force_loop) = {
            let mut state = self.state.lock().unwrap();
            state.rendering = true;
            state.error = false;
            (
                state.staged.ptr,
                state.staged.len,
                state.staged.subsong,
                state.staged.force_loop,
            )
        };
        let data = self.bus.copy_out(ptr, len as usize);
        let control = self.clone();
        thread::spawn(move || {
            let result = control.decoder.decode(&data, subsong);
            let mut state = control.state.lock().unwrap();
            // Stale completion: a later start/stop has already moved the
            // generation counter past what this task captured.
            if control.generation.load(Ordering::SeqCst) != gen {
                return;
            }
            state.rendering = false;
            match result {
                Ok(track) => {
                    let mut engine = control.engine.lock().unwrap();
                    engine.load(track.events, track.total_samples, track.loop_point, force_loop);
                    drop(engine);
                    control.chip.set_sample_ticker(Some(control.engine.clone()));
                }
                Err(_) => {
                    state.error = true;
                }
            }
        });
    }

    fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.rendering = false;
        self.engine.lock().unwrap().stop();
    }

    fn status_bits(&self) -> u32 {
        let state = self.state.lock().unwrap();
        let busy = state.rendering || self.engine.lock().unwrap().is_playing();
        (busy as u32) | ((state.error as u32) << 1)
    }

    fn install_handlers(self: &Arc<Self>) {
        let base = self.base();
        let ctrl_r = self.clone();
        let ctrl_w = self.clone();
        self.bus.map_io(
            base,
            base + PLAYER_BLOCK_STRIDE - 1,
            Some(Arc::new(move |addr| ctrl_r.handle_read(addr))),
            Some(Arc::new(move |addr, value| ctrl_w.handle_write(addr, value))),
        );
    }

    fn handle_read(&self, addr: u32) -> u32 {
        let offset = addr - self.base();
        match offset {
            PLAY_CTRL_OFFSET => {
                let state = self.state.lock().unwrap();
                state.staged.force_loop as u32 * PLAY_CTRL_FORCE_LOOP
            }
            PLAY_STATUS_OFFSET => self.status_bits(),
            _ => 0,
        }
    }

    fn handle_write(self: &Arc<Self>, addr: u32, value: u32) {
        let offset = addr - self.base();
        match offset {
            PLAY_PTR_OFFSET => self.state.lock().unwrap().staged.ptr = value,
            PLAY_LEN_OFFSET => self.state.lock().unwrap().staged.len = value,
            PLAY_SUBSONG_OFFSET => self.state.lock().unwrap().staged.subsong = value,
            PLAY_CTRL_OFFSET => {
                self.state.lock().unwrap().staged.force_loop = value & PLAY_CTRL_FORCE_LOOP != 0;
                if value & PLAY_CTRL_STOP != 0 {
                    self.stop();
                }
                if value & PLAY_CTRL_START != 0 {
                    self.start();
                }
            }
            _ => {}
        }
    }

    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.staged = Staged {
            ptr: 0,
            len: 0,
            subsong: 0,
            force_loop: false,
        };
        state.rendering = false;
        state.error = false;
        self.engine.lock().unwrap().stop();
    }
}

/// Builds an [`AhxReplayer`] from a guest-supplied AHX binary. Implemented
/// by the external AHX parser/replayer; unlike [`FormatDecoder`] this
/// produces a live, tickable object rather than a precomputed event list,
/// since AHX is replayed in real time (see the module docs on
/// [`AhxEngine`]).
pub trait AhxReplayerFactory: Send + Sync {
    fn build(&self, data: &[u8], subsong: u32) -> Result<Box<dyn AhxReplayer>, RetroError>;
}

struct AhxPlayerState {
    staged: Staged,
    rendering: bool,
    error: bool,
    active: Option<Arc<Mutex<AhxEngine>>>,
}

/// The AHX player: same register protocol and generation discipline as
/// [`PlayerControl`], but installs a real-time [`AhxEngine`] instead of a
/// precomputed [`ReplayEngine`] event list.
pub struct AhxPlayerControl {
    bus: Arc<Bus>,
    chip: Arc<SoundChip>,
    factory: Arc<dyn AhxReplayerFactory>,
    generation: Arc<AtomicU64>,
    state: Mutex<AhxPlayerState>,
}

impl AhxPlayerControl {
    pub fn new(bus: Arc<Bus>, chip: Arc<SoundChip>, factory: Arc<dyn AhxReplayerFactory>) -> Arc<Self> {
        let control = Arc::new(AhxPlayerControl {
            bus,
            chip,
            factory,
            generation: Arc::new(AtomicU64::new(0)),
            state: Mutex::new(AhxPlayerState {
                staged: Staged {
                    ptr: 0,
                    len: 0,
                    subsong: 0,
                    force_loop: false,
                },
                rendering: false,
                error: false,
                active: None,
            }),
        });
        control.install_handlers();
        control
    }

    fn base(&self) -> u32 {
        PlayerFormat::Ahx.base_addr()
    }

    fn start(self: &Arc<Self>) {
        let gen = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (ptr, len, subsong) = {
            let mut state = self.state.lock().unwrap();
            state.rendering = true;
            state.error = false;
            (state.staged.ptr, state.staged.len, state.staged.subsong)
        };
        let data = self.bus.copy_out(ptr, len as usize);
        let control = self.clone();
        thread::spawn(move || {
            let result = control.factory.build(&data, subsong);
            let mut state = control.state.lock().unwrap();
            if control.generation.load(Ordering::SeqCst) != gen {
                return;
            }
            state.rendering = false;
            match result {
                Ok(replayer) => {
                    let mut engine = AhxEngine::new(control.chip.clone(), replayer, control.chip.sample_rate());
                    engine.start();
                    let engine = Arc::new(Mutex::new(engine));
                    state.active = Some(engine.clone());
                    control.chip.set_sample_ticker(Some(engine));
                }
                Err(_) => state.error = true,
            }
        });
    }

    fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.rendering = false;
        if let Some(engine) = state.active.take() {
            engine.lock().unwrap().stop();
        }
    }

    fn status_bits(&self) -> u32 {
        let state = self.state.lock().unwrap();
        (state.rendering as u32) | ((state.error as u32) << 1)
    }

    fn install_handlers(self: &Arc<Self>) {
        let base = self.base();
        let ctrl_r = self.clone();
        let ctrl_w = self.clone();
        self.bus.map_io(
            base,
            base + PLAYER_BLOCK_STRIDE - 1,
            Some(Arc::new(move |addr| ctrl_r.handle_read(addr))),
            Some(Arc::new(move |addr, value| ctrl_w.handle_write(addr, value))),
        );
    }

    fn handle_read(&self, addr: u32) -> u32 {
        let offset = addr - self.base();
        match offset {
            PLAY_STATUS_OFFSET => self.status_bits(),
            _ => 0,
        }
    }

    fn handle_write(self: &Arc<Self>, addr: u32, value: u32) {
        let offset = addr - self.base();
        match offset {
            PLAY_PTR_OFFSET => self.state.lock().unwrap().staged.ptr = value,
            PLAY_LEN_OFFSET => self.state.lock().unwrap().staged.len = value,
            PLAY_SUBSONG_OFFSET => self.state.lock().unwrap().staged.subsong = value,
            PLAY_CTRL_OFFSET => {
                if value & PLAY_CTRL_STOP != 0 {
                    self.stop();
                }
                if value & PLAY_CTRL_START != 0 {
                    self.start();
                }
            }
            _ => {}
        }
    }

    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if let Some(engine) = state.active.take() {
            engine.lock().unwrap().stop();
        }
        state.rendering = false;
        state.error = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FixedFormatDecoder;
    use std::time::Duration;

    #[test]
    fn start_parses_and_installs_events_then_status_reports_not_busy_when_no_loop() {
        let bus = Arc::new(Bus::new());
        let chip = SoundChip::new(bus.clone(), 44_100.0);
        let decoder: Arc<dyn FormatDecoder> = Arc::new(FixedFormatDecoder { sample_rate: 44_100 });
        let _player = PlayerControl::new(PlayerFormat::Ted, bus.clone(), chip, decoder);

        let mut data = Vec::new();
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&4u32.to_le_bytes());
        data.extend_from_slice(&0x18u32.to_le_bytes());
        bus.load_bytes(0x3000, &data);

        let base = PlayerFormat::Ted.base_addr();
        bus.write32(base + PLAY_PTR_OFFSET, 0x3000);
        bus.write32(base + PLAY_LEN_OFFSET, data.len() as u32);
        bus.write32(base + PLAY_CTRL_OFFSET, PLAY_CTRL_START);

        // Give the parser thread time to complete.
        thread::sleep(Duration::from_millis(50));
        let status = bus.read32(base + PLAY_STATUS_OFFSET);
        assert_eq!(status & PLAY_STATUS_ERROR, 0);
    }

    #[test]
    fn stop_increments_generation_so_late_parse_is_discarded() {
        let bus = Arc::new(Bus::new());
        let chip = SoundChip::new(bus.clone(), 44_100.0);
        let decoder: Arc<dyn FormatDecoder> = Arc::new(FixedFormatDecoder { sample_rate: 44_100 });
        let player = PlayerControl::new(PlayerFormat::Sid, bus.clone(), chip, decoder);

        let base = PlayerFormat::Sid.base_addr();
        bus.write32(base + PLAY_LEN_OFFSET, 0);
        bus.write32(base + PLAY_CTRL_OFFSET, PLAY_CTRL_START);
        bus.write32(base + PLAY_CTRL_OFFSET, PLAY_CTRL_STOP);
        thread::sleep(Duration::from_millis(50));
        assert!(!player.engine.lock().unwrap().is_playing());
    }
}
