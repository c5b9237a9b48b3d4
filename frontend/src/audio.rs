use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use retrochip_core::prelude::Machine;
use sdl2::audio::{AudioCallback, AudioDevice, AudioSpecDesired};

/// Number of samples over which to fade in/out (~5.8 ms at 44.1 kHz).
const FADE_SAMPLES: u32 = 256;

pub(crate) struct AudioPlayer {
    machine: Arc<Machine>,
    fade_in_pos: u32,
    fading_out: Arc<AtomicBool>,
    fade_out_pos: u32,
}

impl AudioCallback for AudioPlayer {
    type Channel = i16;
    fn callback(&mut self, out: &mut [i16]) {
        for frame in out.chunks_mut(2) {
            let (mut l, mut r) = self.machine.generate_audio_sample();

            if self.fade_in_pos < FADE_SAMPLES {
                // Ramp up from silence at startup.
                let gain = self.fade_in_pos as f32 / FADE_SAMPLES as f32;
                l *= gain;
                r *= gain;
                self.fade_in_pos += 1;
            } else if self.fading_out.load(Ordering::Relaxed) {
                // Ramp down to silence at shutdown.
                if self.fade_out_pos < FADE_SAMPLES {
                    let gain = 1.0 - (self.fade_out_pos as f32 / FADE_SAMPLES as f32);
                    l *= gain;
                    r *= gain;
                    self.fade_out_pos += 1;
                } else {
                    l = 0.0;
                    r = 0.0;
                }
            }

            frame[0] = (l * i16::MAX as f32) as i16;
            if frame.len() > 1 {
                frame[1] = (r * i16::MAX as f32) as i16;
            }
        }
    }
}

/// Handle for signalling the audio callback to fade out before shutdown.
pub type FadeOut = Arc<AtomicBool>;

/// Initialize SDL2 audio playback, pulling stereo samples directly from
/// `machine` one callback buffer at a time.
///
/// Returns the audio device (must be kept alive, starts paused) and a
/// fade-out signal for clean shutdown. If `sample_rate` is 0, returns
/// `None` (machine has no audio).
pub fn init(
    sdl_audio: &sdl2::AudioSubsystem,
    machine: Arc<Machine>,
    sample_rate: u32,
) -> Option<(AudioDevice<AudioPlayer>, FadeOut)> {
    if sample_rate == 0 {
        return None;
    }

    let fade_out: FadeOut = Arc::new(AtomicBool::new(false));

    let desired_spec = AudioSpecDesired {
        freq: Some(sample_rate as i32),
        channels: Some(2),
        samples: Some(512), // ~11.6 ms at 44100 Hz
    };

    let device = sdl_audio
        .open_playback(None, &desired_spec, |_spec| AudioPlayer {
            machine,
            fade_in_pos: 0,
            fading_out: Arc::clone(&fade_out),
            fade_out_pos: 0,
        })
        .expect("Failed to open SDL audio device");

    Some((device, fade_out))
}

/// Duration to sleep after signalling fade-out, allowing the callback
/// to ramp down before the device is paused.
pub fn fade_out_duration() -> std::time::Duration {
    std::time::Duration::from_millis(10)
}
