//! The aggregate root: owns the bus and every chip for one process
//! lifetime. This is the only place a [`Bus`], [`VideoChip`], or
//! [`SoundChip`] is constructed — there is no module-level static or
//! lazily-initialised global chip state anywhere in this crate.

use std::collections::HashMap;
use std::sync::Arc;

use crate::audio::player::{AhxPlayerControl, AhxReplayerFactory, PlayerControl};
use crate::audio::SoundChip;
use crate::bus::Bus;
use crate::format::FormatDecoder;
use crate::regs::PlayerFormat;
use crate::video::VideoChip;

/// Construction inputs that come from outside the emulated machine: the
/// format decoders (themselves external collaborators) and the host's
/// chosen audio sample rate.
pub struct MachineConfig {
    pub sample_rate: f32,
    pub psg_decoder: Arc<dyn FormatDecoder>,
    pub sid_decoder: Arc<dyn FormatDecoder>,
    pub ted_decoder: Arc<dyn FormatDecoder>,
    pub pokey_decoder: Arc<dyn FormatDecoder>,
    pub ahx_factory: Arc<dyn AhxReplayerFactory>,
}

pub struct Machine {
    pub bus: Arc<Bus>,
    pub video: Arc<VideoChip>,
    pub sound: Arc<SoundChip>,
    pub players: HashMap<PlayerFormat, Arc<PlayerControl>>,
    pub ahx_player: Arc<AhxPlayerControl>,
}

impl Machine {
    pub fn new(config: MachineConfig) -> Self {
        let bus = Arc::new(Bus::new());
        let video = VideoChip::new(bus.clone());
        let sound = SoundChip::new(bus.clone(), config.sample_rate);

        let mut players = HashMap::new();
        players.insert(
            PlayerFormat::Psg,
            PlayerControl::new(PlayerFormat::Psg, bus.clone(), sound.clone(), config.psg_decoder),
        );
        players.insert(
            PlayerFormat::Sid,
            PlayerControl::new(PlayerFormat::Sid, bus.clone(), sound.clone(), config.sid_decoder),
        );
        players.insert(
            PlayerFormat::Ted,
            PlayerControl::new(PlayerFormat::Ted, bus.clone(), sound.clone(), config.ted_decoder),
        );
        players.insert(
            PlayerFormat::Pokey,
            PlayerControl::new(PlayerFormat::Pokey, bus.clone(), sound.clone(), config.pokey_decoder),
        );
        let ahx_player = AhxPlayerControl::new(bus.clone(), sound.clone(), config.ahx_factory);

        Machine {
            bus,
            video,
            sound,
            players,
            ahx_player,
        }
    }

    pub fn player(&self, format: PlayerFormat) -> Option<&Arc<PlayerControl>> {
        self.players.get(&format)
    }

    /// One tick of the internal 60 Hz video refresh loop; called by the
    /// frontend's video loop.
    pub fn run_video_refresh_tick(&self) {
        self.video.run_refresh_tick();
    }

    /// One stereo sample; called by the frontend's audio callback.
    pub fn generate_audio_sample(&self) -> (f32, f32) {
        self.sound.generate_sample()
    }

    /// Coordinated reset: stops all in-flight player work, then, under
    /// each component's own lock, zeros its state. No cross-component
    /// locks are acquired in this path.
    pub fn reset(&self) {
        for player in self.players.values() {
            player.reset();
        }
        self.ahx_player.reset();
        self.sound.reset();
        self.video.reset();
        self.bus.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::engine::{AhxReplayer, AhxVoiceState};
    use crate::error::RetroError;
    use crate::format::FixedFormatDecoder;

    struct SilentAhxReplayer;
    impl AhxReplayer for SilentAhxReplayer {
        fn play_irq(&mut self) -> [AhxVoiceState; 4] {
            [AhxVoiceState::default(); 4]
        }
    }

    struct SilentAhxFactory;
    impl AhxReplayerFactory for SilentAhxFactory {
        fn build(&self, _data: &[u8], _subsong: u32) -> Result<Box<dyn AhxReplayer>, RetroError> {
            Ok(Box::new(SilentAhxReplayer))
        }
    }

    fn test_machine() -> Machine {
        let fixed = || Arc::new(FixedFormatDecoder { sample_rate: 44_100 }) as Arc<dyn FormatDecoder>;
        Machine::new(MachineConfig {
            sample_rate: 44_100.0,
            psg_decoder: fixed(),
            sid_decoder: fixed(),
            ted_decoder: fixed(),
            pokey_decoder: fixed(),
            ahx_factory: Arc::new(SilentAhxFactory),
        })
    }

    #[test]
    fn machine_constructs_and_ticks_without_panicking() {
        let machine = test_machine();
        machine.run_video_refresh_tick();
        let _ = machine.generate_audio_sample();
        machine.reset();
    }

    #[test]
    fn every_player_format_is_registered() {
        let machine = test_machine();
        for format in PlayerFormat::ALL {
            if format != PlayerFormat::Ahx {
                assert!(machine.player(format).is_some());
            }
        }
    }
}
