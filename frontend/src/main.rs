use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use retrochip_core::audio::engine::AhxReplayer;
use retrochip_core::audio::player::AhxReplayerFactory;
use retrochip_core::error::RetroError;
use retrochip_core::format::{FixedFormatDecoder, FormatDecoder};
use retrochip_core::prelude::*;
use retrochip_core::regs::RAM_END;

mod audio;
mod config;
mod emulator;
mod input;
mod video;

use config::HostConfig;

/// Host for the virtual retro-microcomputer platform: loads a guest binary
/// straight into RAM and drives the video/audio/player chips against it.
#[derive(Parser)]
#[command(name = "retrochip", version, about)]
struct Cli {
    /// Guest binary to load at address 0 before starting.
    binary: PathBuf,

    /// Window scale factor; overrides the saved config.
    #[arg(long)]
    scale: Option<u32>,

    /// Audio sample rate in Hz; overrides the saved config.
    #[arg(long)]
    sample_rate: Option<u32>,
}

/// No AHX replayer is bundled with this build; `AHX_CTRL` start requests
/// always fail with `PLAY_STATUS_ERROR` set. A real build links an actual
/// AHX replayer implementation here.
struct NoAhxFactory;

impl AhxReplayerFactory for NoAhxFactory {
    fn build(&self, _data: &[u8], _subsong: u32) -> Result<Box<dyn AhxReplayer>, RetroError> {
        Err(RetroError::Decode("no AHX replayer is linked into this build".into()))
    }
}

/// A guest binary must fit below the MMIO window so it can't clobber
/// device registers just by being loaded at address 0.
fn check_binary_size(data: &[u8]) -> Result<(), RetroError> {
    if data.len() > RAM_END as usize {
        return Err(RetroError::BinaryTooLarge {
            len: data.len(),
            max: RAM_END as usize,
        });
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = HostConfig::load_or_default();
    if let Some(scale) = cli.scale {
        config.video_scale = scale;
    }
    if let Some(rate) = cli.sample_rate {
        config.sample_rate = rate;
    }

    let data = std::fs::read(&cli.binary).unwrap_or_else(|e| {
        eprintln!("failed to read {}: {e}", cli.binary.display());
        std::process::exit(1);
    });

    if let Err(e) = check_binary_size(&data) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    let fixed_decoder = || {
        Arc::new(FixedFormatDecoder {
            sample_rate: config.sample_rate,
        }) as Arc<dyn FormatDecoder>
    };

    let machine = Arc::new(Machine::new(MachineConfig {
        sample_rate: config.sample_rate as f32,
        psg_decoder: fixed_decoder(),
        sid_decoder: fixed_decoder(),
        ted_decoder: fixed_decoder(),
        pokey_decoder: fixed_decoder(),
        ahx_factory: Arc::new(NoAhxFactory),
    }));

    machine.bus.load_bytes(0, &data);
    log::info!("loaded {} bytes from {}", data.len(), cli.binary.display());

    let key_map = input::default_key_map(&config.key_bindings);
    emulator::run(machine, &key_map, config.video_scale);

    config.last_binary_path = Some(cli.binary);
    if let Err(e) = config.save() {
        log::warn!("failed to save config: {e}");
    }
}
