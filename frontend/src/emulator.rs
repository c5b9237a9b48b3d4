use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use retrochip_core::prelude::Machine;
use sdl2::event::Event;
use sdl2::keyboard::Scancode;

use crate::audio;
use crate::input::KeyMap;
use crate::video::Video;

const FRAME_INTERVAL: Duration = Duration::from_nanos(16_666_667);

/// Frontend-owned input convention: the host latches its key state here as
/// a 32-bit bitmask, one bit per entry in [`crate::input::default_key_map`].
/// This is ordinary RAM as far as the bus is concerned — nothing in
/// `retrochip_core` attaches meaning to this address.
pub const INPUT_STATE_ADDR: u32 = 0x000E_FFFC;

pub fn run(machine: Arc<Machine>, key_map: &KeyMap, scale: u32) {
    let sdl_context = sdl2::init().expect("Failed to initialize SDL2");
    let sdl_video = sdl_context.video().expect("Failed to init SDL video");
    let sdl_audio = sdl_context.audio().expect("Failed to init SDL audio");

    let (width, height) = machine.video.display_size();
    let mut video = Video::new(&sdl_video, "Retrochip", width, height, scale);
    let mut event_pump = sdl_context.event_pump().expect("Failed to get event pump");

    let sample_rate = machine.sound.sample_rate() as u32;
    let audio_device = audio::init(&sdl_audio, machine.clone(), sample_rate);
    if let Some((device, _)) = audio_device.as_ref() {
        device.resume();
    }

    let mut input_bits: u32 = 0;
    let mut frame_size = (width, height);

    'main: loop {
        let frame_start = Instant::now();

        for event in event_pump.poll_iter() {
            match event {
                Event::Quit { .. } => break 'main,

                Event::KeyDown {
                    scancode: Some(Scancode::Escape),
                    ..
                } => break 'main,

                Event::KeyDown {
                    scancode: Some(sc),
                    repeat: false,
                    ..
                } => {
                    if let Some(bit) = key_map.get(sc) {
                        input_bits |= 1 << bit;
                    }
                }

                Event::KeyUp {
                    scancode: Some(sc), ..
                } => {
                    if let Some(bit) = key_map.get(sc) {
                        input_bits &= !(1 << bit);
                    }
                }

                _ => {}
            }
        }
        machine.bus.write32(INPUT_STATE_ADDR, input_bits);

        machine.run_video_refresh_tick();

        let current_size = machine.video.display_size();
        if current_size != frame_size {
            frame_size = current_size;
            video.set_native_size(current_size.0, current_size.1);
        }

        if let Some(frame) = machine.video.get_frame() {
            video.present(&frame);
        }

        let elapsed = frame_start.elapsed();
        if elapsed < FRAME_INTERVAL {
            thread::sleep(FRAME_INTERVAL - elapsed);
        }
    }

    if let Some((device, fade_out)) = audio_device {
        fade_out.store(true, Ordering::Relaxed);
        thread::sleep(audio::fade_out_duration());
        device.pause();
    }
}
