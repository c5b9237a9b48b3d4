//! ADSR envelope generator, one per channel.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvelopePhase {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AdsrParams {
    /// 0..=255, scaled to a time constant by the owning channel.
    pub attack: u8,
    pub decay: u8,
    pub sustain: u8,
    pub release: u8,
}

pub struct Envelope {
    pub phase: EnvelopePhase,
    pub level: f32,
    params: AdsrParams,
    sample_rate: f32,
}

const MAX_ATTACK_SECONDS: f32 = 2.0;
const MAX_DECAY_SECONDS: f32 = 4.0;
const MAX_RELEASE_SECONDS: f32 = 6.0;

impl Envelope {
    pub fn new(sample_rate: f32) -> Self {
        Envelope {
            phase: EnvelopePhase::Idle,
            level: 0.0,
            params: AdsrParams::default(),
            sample_rate,
        }
    }

    pub fn set_params(&mut self, params: AdsrParams) {
        self.params = params;
    }

    pub fn params(&self) -> AdsrParams {
        self.params
    }

    pub fn gate(&mut self, on: bool) {
        if on {
            self.phase = EnvelopePhase::Attack;
        } else if self.phase != EnvelopePhase::Idle {
            self.phase = EnvelopePhase::Release;
        }
    }

    fn rate(time_const_byte: u8, max_seconds: f32, sample_rate: f32) -> f32 {
        let seconds = (time_const_byte as f32 / 255.0) * max_seconds;
        if seconds <= 0.0 {
            1.0
        } else {
            1.0 / (seconds * sample_rate)
        }
    }

    /// Advances the envelope by one sample and returns the current level
    /// in `[0, 1]`.
    pub fn tick(&mut self) -> f32 {
        let sustain_level = self.params.sustain as f32 / 255.0;
        match self.phase {
            EnvelopePhase::Idle => self.level = 0.0,
            EnvelopePhase::Attack => {
                let rate = Self::rate(self.params.attack, MAX_ATTACK_SECONDS, self.sample_rate);
                self.level += rate;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.phase = EnvelopePhase::Decay;
                }
            }
            EnvelopePhase::Decay => {
                let rate = Self::rate(self.params.decay, MAX_DECAY_SECONDS, self.sample_rate);
                self.level -= rate;
                if self.level <= sustain_level {
                    self.level = sustain_level;
                    self.phase = EnvelopePhase::Sustain;
                }
            }
            EnvelopePhase::Sustain => {
                self.level = sustain_level;
            }
            EnvelopePhase::Release => {
                let rate = Self::rate(self.params.release, MAX_RELEASE_SECONDS, self.sample_rate);
                self.level -= rate;
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.phase = EnvelopePhase::Idle;
                }
            }
        }
        self.level
    }

    pub fn reset(&mut self) {
        self.phase = EnvelopePhase::Idle;
        self.level = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_off_jumps_straight_to_release() {
        let mut env = Envelope::new(44_100.0);
        env.set_params(AdsrParams {
            attack: 0,
            decay: 0,
            sustain: 128,
            release: 128,
        });
        env.gate(true);
        for _ in 0..10 {
            env.tick();
        }
        assert_eq!(env.phase, EnvelopePhase::Sustain);
        env.gate(false);
        assert_eq!(env.phase, EnvelopePhase::Release);
    }

    #[test]
    fn zero_volume_and_idle_gate_contributes_nothing() {
        let mut env = Envelope::new(44_100.0);
        assert_eq!(env.tick(), 0.0);
        assert_eq!(env.phase, EnvelopePhase::Idle);
    }
}
