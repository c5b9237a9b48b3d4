//! Per-format event-replay engines. Each format (PSG, SID, TED, POKEY)
//! drives the sound chip from a precomputed, timestamped event list; AHX
//! is the one exception, replaying its instruction stream in real time
//! tick by tick instead (see [`AhxEngine`]).

use std::sync::Arc;

use crate::audio::channel::WaveType;
use crate::audio::envelope::AdsrParams;
use crate::audio::filter::FilterMode;
use crate::audio::SampleTicker;
use crate::audio::SoundChip;
use crate::regs::PlayerFormat;

/// `(sample_index, register, value)`. Event lists must be non-decreasing
/// in `sample_index`; at each tick, every event whose `sample_index`
/// equals the current sample is applied before synthesis advances.
pub type MusicEvent = (u64, u32, u32);

/// Event-list replay engine shared by PSG, SID, TED, and POKEY. The
/// `format` tag selects which (virtual register -> chip channel field)
/// mapping `apply_event` uses; the replay/looping state machine itself is
/// identical across formats.
pub struct ReplayEngine {
    chip: Arc<SoundChip>,
    format: PlayerFormat,
    events: Vec<MusicEvent>,
    cursor: usize,
    current_sample: u64,
    total_samples: u64,
    loop_point: u64,
    looping: bool,
    playing: bool,
}

impl ReplayEngine {
    pub fn new(chip: Arc<SoundChip>, format: PlayerFormat) -> Self {
        ReplayEngine {
            chip,
            format,
            events: Vec::new(),
            cursor: 0,
            current_sample: 0,
            total_samples: 0,
            loop_point: 0,
            looping: false,
            playing: false,
        }
    }

    /// Installs a freshly parsed event list and starts playback from
    /// sample 0. Called by the player's asynchronous completion path
    /// after its generation check passes.
    pub fn load(&mut self, events: Vec<MusicEvent>, total_samples: u64, loop_point: Option<u64>, force_loop: bool) {
        self.events = events;
        self.cursor = 0;
        self.current_sample = 0;
        self.total_samples = total_samples;
        self.loop_point = loop_point.unwrap_or(0);
        self.looping = force_loop || loop_point.is_some();
        self.playing = true;
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    fn apply_event(&self, reg: u32, value: u32) {
        match self.format {
            PlayerFormat::Psg => apply_psg_event(&self.chip, reg, value),
            PlayerFormat::Sid => apply_sid_event(&self.chip, reg, value),
            PlayerFormat::Ted => apply_ted_event(&self.chip, reg, value),
            PlayerFormat::Pokey => apply_pokey_event(&self.chip, reg, value),
            PlayerFormat::Ahx => {}
        }
    }

    fn rewind_cursor_to_loop_point(&mut self) {
        self.cursor = self
            .events
            .iter()
            .position(|(idx, _, _)| *idx >= self.loop_point)
            .unwrap_or(self.events.len());
        self.current_sample = self.loop_point;
    }
}

impl SampleTicker for ReplayEngine {
    fn tick_sample(&mut self) {
        if !self.playing {
            return;
        }
        while self.cursor < self.events.len() && self.events[self.cursor].0 == self.current_sample {
            let (_, reg, value) = self.events[self.cursor];
            self.apply_event(reg, value);
            self.cursor += 1;
        }
        self.current_sample += 1;
        if self.current_sample >= self.total_samples {
            if self.looping {
                self.rewind_cursor_to_loop_point();
            } else {
                self.playing = false;
            }
        }
    }
}

// --- PSG (AY-3-8910-style) register mapping -------------------------------
//
// 14 registers: tone period lo/hi for channels A/B/C (0..=5), noise period
// (6), mixer (7), channel levels (8..=10), envelope period lo/hi + shape
// (11..=13).

fn apply_psg_event(chip: &SoundChip, reg: u32, value: u32) {
    match reg {
        0..=5 => {
            // The parser is expected to have already combined each
            // channel's lo/hi period bytes into one 12-bit value before
            // emitting the event (only the hi-byte event carries it);
            // lo-byte events are absorbed here without effect.
            let ch = (reg / 2) as usize;
            let is_hi = reg % 2 == 1;
            if is_hi {
                chip.write_channel(ch, |c| {
                    c.frequency_hz = psg_period_to_hz(value);
                    c.wave_type = WaveType::Square;
                });
            }
        }
        6 => {
            for ch in 0..3 {
                chip.write_channel(ch, |c| {
                    if matches!(c.wave_type, WaveType::Square) {
                        c.duty = 128;
                    }
                });
            }
            let _ = value;
        }
        7 => {
            for ch in 0..3 {
                let enabled = (value >> ch) & 1 == 0;
                chip.write_channel(ch as usize, |c| {
                    c.wave_type = if enabled { WaveType::Square } else { WaveType::Noise };
                });
            }
        }
        8..=10 => {
            let ch = (reg - 8) as usize;
            chip.write_channel(ch, |c| c.volume = ((value & 0xF) * 17) as u8);
        }
        11..=13 => {}
        _ => {}
    }
}

fn psg_period_to_hz(period: u32) -> f32 {
    const PSG_CLOCK: f32 = 1_789_773.0;
    if period == 0 {
        0.0
    } else {
        PSG_CLOCK / (16.0 * period as f32)
    }
}

// --- SID register mapping -------------------------------------------------
//
// Three voices x 7 registers (freq lo/hi, PW lo/hi, control, AD, SR) plus a
// shared filter block (FC lo/hi, RES/FILT, MODE/VOL) at registers 21..=24.

fn apply_sid_event(chip: &SoundChip, reg: u32, value: u32) {
    const VOICE_STRIDE: u32 = 7;
    if reg < 3 * VOICE_STRIDE {
        let voice = (reg / VOICE_STRIDE) as usize;
        let offset = reg % VOICE_STRIDE;
        chip.write_channel(voice, |c| match offset {
            0 | 1 => {
                // freq lo/hi: caller is expected to have pre-combined the
                // 16-bit SID frequency into `value` for the hi write.
                if offset == 1 {
                    c.frequency_hz = sid_freq_to_hz(value);
                }
            }
            2 | 3 => {
                if offset == 3 {
                    c.duty = ((value >> 4) & 0xFF) as u8;
                }
            }
            4 => {
                c.wave_type = match (value >> 4) & 0xF {
                    0x1 => WaveType::Triangle,
                    0x2 => WaveType::Sawtooth,
                    0x4 => WaveType::Square,
                    0x8 => WaveType::Noise,
                    _ => WaveType::Square,
                };
                c.set_gate(value & 1 != 0);
            }
            5 => {
                let bytes = value.to_le_bytes();
                let current = c.adsr();
                c.set_adsr(AdsrParams {
                    attack: bytes[0],
                    decay: bytes[1],
                    sustain: current.sustain,
                    release: current.release,
                });
            }
            6 => {
                let bytes = value.to_le_bytes();
                let current = c.adsr();
                c.set_adsr(AdsrParams {
                    attack: current.attack,
                    decay: current.decay,
                    sustain: bytes[0],
                    release: bytes[1],
                });
            }
            _ => {}
        });
    } else {
        match reg {
            23 => {
                for voice in 0..3 {
                    chip.write_channel(voice, |c| {
                        c.filter_enabled = true;
                        c.filter_mode = FilterMode::LowPass;
                        c.filter_resonance = 1.0 + ((value >> 4) & 0xF) as f32;
                    });
                }
            }
            21 | 22 => {
                for voice in 0..3 {
                    chip.write_channel(voice, |c| {
                        c.filter_cutoff_hz = (value as f32 * 30.0).clamp(20.0, 20_000.0);
                    });
                }
            }
            _ => {}
        }
    }
}

fn sid_freq_to_hz(sid_freq: u32) -> f32 {
    const SID_CLOCK: f32 = 985_248.0;
    (sid_freq as f32) * SID_CLOCK / 16_777_216.0
}

// --- TED register mapping --------------------------------------------------
//
// Two tone channels (freq lo/hi, regs 0..=3) plus a sound-control register
// (4: voice1 on, voice2 on/noise, volume 0..=8).

fn apply_ted_event(chip: &SoundChip, reg: u32, value: u32) {
    match reg {
        0 | 1 => chip.write_channel(0, |c| c.frequency_hz = ted_freq_to_hz(value)),
        2 | 3 => chip.write_channel(1, |c| c.frequency_hz = ted_freq_to_hz(value)),
        4 => {
            let voice1_on = value & 0x10 != 0;
            let voice2_on = value & 0x20 != 0;
            let noise = value & 0x40 != 0;
            let volume = ((value & 0xF) * 28) as u8;
            chip.write_channel(0, |c| {
                c.volume = if voice1_on { volume } else { 0 };
                c.wave_type = WaveType::Square;
            });
            chip.write_channel(1, |c| {
                c.volume = if voice2_on { volume } else { 0 };
                c.wave_type = if noise { WaveType::Noise } else { WaveType::Square };
            });
        }
        _ => {}
    }
}

fn ted_freq_to_hz(period: u32) -> f32 {
    const TED_CLOCK: f32 = 886_724.0;
    if period >= 1023 {
        0.0
    } else {
        TED_CLOCK / (8.0 * (1024 - period) as f32)
    }
}

// --- POKEY register mapping -------------------------------------------------
//
// Four audio channels, each an AUDF/AUDC pair (8 registers), plus a shared
// AUDCTL (register 8) affecting clocking mode (ignored at this
// abstraction level beyond selecting the base divisor).

fn apply_pokey_event(chip: &SoundChip, reg: u32, value: u32) {
    match reg {
        0..=7 => {
            let ch = (reg / 2) as usize;
            let is_audc = reg % 2 == 1;
            chip.write_channel(ch, |c| {
                if is_audc {
                    c.volume = ((value & 0xF) * 17) as u8;
                    c.wave_type = if (value >> 4) & 0x7 == 0 {
                        WaveType::Noise
                    } else {
                        WaveType::Square
                    };
                } else {
                    c.frequency_hz = pokey_period_to_hz(value);
                }
            });
        }
        8 => {}
        _ => {}
    }
}

fn pokey_period_to_hz(period: u32) -> f32 {
    const POKEY_BASE: f32 = 1_789_790.0;
    if period == 0 {
        0.0
    } else {
        POKEY_BASE / (2.0 * (period as f32 + 1.0))
    }
}

// --- AHX: real-time replayer tick instead of a precomputed event list ----

/// One voice's parameters at a given replayer tick, as the AHX replayer
/// (an external black box — see the format module) would report them.
#[derive(Clone, Copy, Debug, Default)]
pub struct AhxVoiceState {
    pub frequency_hz: f32,
    pub volume: u8,
    pub waveform: u32,
    pub filter_cutoff_hz: f32,
    pub duty: u8,
}

/// Implemented by the external AHX replayer. `play_irq` advances the
/// replayer by one tick (the AHX engine calls it at `50 * speed` Hz, not
/// once per sample) and reports the resulting state of all four voices.
pub trait AhxReplayer: Send {
    fn play_irq(&mut self) -> [AhxVoiceState; 4];
}

pub struct AhxEngine {
    chip: Arc<SoundChip>,
    replayer: Box<dyn AhxReplayer>,
    sample_rate: f32,
    speed_multiplier: f32,
    samples_until_tick: f32,
    playing: bool,
}

impl AhxEngine {
    pub fn new(chip: Arc<SoundChip>, replayer: Box<dyn AhxReplayer>, sample_rate: f32) -> Self {
        AhxEngine {
            chip,
            replayer,
            sample_rate,
            speed_multiplier: 1.0,
            samples_until_tick: 0.0,
            playing: false,
        }
    }

    pub fn start(&mut self) {
        self.playing = true;
        self.samples_until_tick = 0.0;
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    fn tick_interval_samples(&self) -> f32 {
        self.sample_rate / (50.0 * self.speed_multiplier.max(0.01))
    }

    fn apply_voice(&self, ch: usize, v: &AhxVoiceState) {
        self.chip.write_channel(ch, |c| {
            c.frequency_hz = v.frequency_hz;
            c.volume = v.volume;
            c.wave_type = WaveType::from_u32(v.waveform);
            c.duty = v.duty;
            c.filter_enabled = v.filter_cutoff_hz > 0.0;
            c.filter_cutoff_hz = v.filter_cutoff_hz.clamp(20.0, 20_000.0);
        });
    }
}

impl SampleTicker for AhxEngine {
    fn tick_sample(&mut self) {
        if !self.playing {
            return;
        }
        self.samples_until_tick -= 1.0;
        if self.samples_until_tick <= 0.0 {
            self.samples_until_tick += self.tick_interval_samples();
            let voices = self.replayer.play_irq();
            for (ch, v) in voices.iter().enumerate() {
                self.apply_voice(ch, v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;
    use std::sync::Arc;

    #[test]
    fn replay_engine_applies_events_in_order_then_stops() {
        let bus = Arc::new(Bus::new());
        let chip = SoundChip::new(bus, 44_100.0);
        let mut engine = ReplayEngine::new(chip, PlayerFormat::Ted);
        engine.load(vec![(0, 4, 0x18)], 2, None, false);
        engine.tick_sample();
        assert!(engine.is_playing());
        engine.tick_sample();
        assert!(!engine.is_playing());
    }

    #[test]
    fn looping_engine_rewinds_to_loop_point() {
        let bus = Arc::new(Bus::new());
        let chip = SoundChip::new(bus, 44_100.0);
        let mut engine = ReplayEngine::new(chip, PlayerFormat::Ted);
        engine.load(vec![(0, 4, 1), (1, 4, 2)], 2, Some(1), true);
        engine.tick_sample();
        engine.tick_sample();
        assert!(engine.is_playing());
    }
}
