//! A single synthesis voice: waveform generator, ADSR envelope, optional
//! sync/ring-mod, per-channel filter and pan.

use crate::audio::envelope::{AdsrParams, Envelope};
use crate::audio::filter::{BiquadFilter, FilterMode};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaveType {
    Square,
    Triangle,
    Sine,
    Noise,
    Sawtooth,
}

impl WaveType {
    pub fn from_u32(v: u32) -> WaveType {
        match v {
            1 => WaveType::Triangle,
            2 => WaveType::Sine,
            3 => WaveType::Noise,
            4 => WaveType::Sawtooth,
            _ => WaveType::Square,
        }
    }
}

pub struct Channel {
    pub wave_type: WaveType,
    pub frequency_hz: f32,
    pub volume: u8,
    pub duty: u8,
    pub pan: i8,
    pub gate: bool,
    pub filter_enabled: bool,
    pub filter_mode: FilterMode,
    pub filter_cutoff_hz: f32,
    pub filter_resonance: f32,
    pub sync_source: Option<usize>,
    pub ring_mod_source: Option<usize>,

    phase: f32,
    prev_phase: f32,
    noise_lfsr: u32,
    noise_output: f32,
    pub envelope: Envelope,
    filter: BiquadFilter,
}

impl Channel {
    pub fn new(sample_rate: f32) -> Self {
        Channel {
            wave_type: WaveType::Square,
            frequency_hz: 440.0,
            volume: 0,
            duty: 128,
            pan: 0,
            gate: false,
            filter_enabled: false,
            filter_mode: FilterMode::LowPass,
            filter_cutoff_hz: 20_000.0,
            filter_resonance: 0.707,
            sync_source: None,
            ring_mod_source: None,
            phase: 0.0,
            prev_phase: 0.0,
            noise_lfsr: 0x1,
            noise_output: 0.0,
            envelope: Envelope::new(sample_rate),
            filter: BiquadFilter::new(sample_rate),
        }
    }

    pub fn set_adsr(&mut self, params: AdsrParams) {
        self.envelope.set_params(params);
    }

    pub fn adsr(&self) -> AdsrParams {
        self.envelope.params()
    }

    pub fn set_gate(&mut self, on: bool) {
        if on != self.gate {
            self.gate = on;
            self.envelope.gate(on);
        }
    }

    fn step_noise_lfsr(&mut self) {
        // 17-bit Fibonacci LFSR, taps at bits 16 and 13 (matching the
        // common SID/PSG-style noise generator shape).
        let bit = ((self.noise_lfsr >> 16) ^ (self.noise_lfsr >> 13)) & 1;
        self.noise_lfsr = ((self.noise_lfsr << 1) | bit) & 0x1_FFFF;
        self.noise_output = if self.noise_lfsr & 1 != 0 { 1.0 } else { -1.0 };
    }

    /// Advances phase by one sample and returns `(raw_wave, wrapped)`.
    /// `wrapped` is true iff the phase crossed `1.0 -> 0.0` this sample,
    /// which is how sync-destination channels detect a reset trigger.
    pub fn advance(&mut self, sample_rate: f32) -> (f32, bool) {
        self.prev_phase = self.phase;
        let step = self.frequency_hz / sample_rate;
        self.phase += step;
        let wrapped = self.phase >= 1.0;
        if wrapped {
            self.phase -= self.phase.floor();
        }

        let raw = match self.wave_type {
            WaveType::Square => {
                let threshold = self.duty as f32 / 255.0;
                if self.phase < threshold {
                    1.0
                } else {
                    -1.0
                }
            }
            WaveType::Triangle => {
                if self.phase < 0.5 {
                    4.0 * self.phase - 1.0
                } else {
                    3.0 - 4.0 * self.phase
                }
            }
            WaveType::Sine => (2.0 * std::f32::consts::PI * self.phase).sin(),
            WaveType::Sawtooth => 2.0 * self.phase - 1.0,
            WaveType::Noise => {
                if wrapped {
                    self.step_noise_lfsr();
                }
                self.noise_output
            }
        };
        (raw, wrapped)
    }

    /// Force phase to zero (sync reset from another channel's wrap).
    pub fn reset_phase(&mut self) {
        self.phase = 0.0;
        self.prev_phase = 0.0;
    }

    /// Applies envelope and per-channel filter to a raw oscillator sample
    /// (already possibly ring-modulated by the caller), returning the
    /// channel's mono contribution in `[-1, 1]`.
    pub fn shape(&mut self, raw: f32) -> f32 {
        let env = self.envelope.tick();
        let vol = self.volume as f32 / 255.0;
        let mut out = raw * env * vol;
        if self.filter_enabled {
            self.filter
                .set_params(self.filter_mode, self.filter_cutoff_hz, self.filter_resonance);
            out = self.filter.process(out);
        }
        out
    }

    /// Pan law: `-128..=127`, 0 = center, applied as a simple linear
    /// crossfade (matching the corpus's channel-pan conventions rather
    /// than an equal-power law, since this chip favours cheap synthesis).
    pub fn pan_gains(&self) -> (f32, f32) {
        let p = (self.pan as f32 / 127.0).clamp(-1.0, 1.0);
        let left = (1.0 - p).min(1.0) * 0.5 + 0.5 * (1.0 - p.max(0.0));
        let right = (1.0 + p).min(1.0) * 0.5 + 0.5 * (1.0 + p.min(0.0));
        (left.clamp(0.0, 1.0), right.clamp(0.0, 1.0))
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.prev_phase = 0.0;
        self.gate = false;
        self.volume = 0;
        self.envelope.reset();
        self.filter.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_wave_respects_duty_cycle() {
        let mut ch = Channel::new(8.0);
        ch.frequency_hz = 1.0;
        ch.duty = 64; // ~25%
        let (raw0, _) = ch.advance(8.0);
        assert_eq!(raw0, 1.0);
    }

    #[test]
    fn phase_wraps_once_per_period() {
        let mut ch = Channel::new(4.0);
        ch.frequency_hz = 1.0;
        let mut wraps = 0;
        for _ in 0..4 {
            let (_, wrapped) = ch.advance(4.0);
            if wrapped {
                wraps += 1;
            }
        }
        assert_eq!(wraps, 1);
    }

    #[test]
    fn silent_channel_contributes_zero() {
        let mut ch = Channel::new(44_100.0);
        ch.volume = 0;
        ch.gate = false;
        let (raw, _) = ch.advance(44_100.0);
        assert_eq!(ch.shape(raw), 0.0);
    }
}
