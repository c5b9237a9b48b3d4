pub mod audio;
pub mod bus;
pub mod error;
pub mod format;
pub mod guest_cpu;
pub mod machine;
pub mod regs;
pub mod video;

pub mod prelude {
    pub use crate::audio::player::{AhxPlayerControl, AhxReplayerFactory, PlayerControl};
    pub use crate::audio::{SampleTicker, SoundChip};
    pub use crate::bus::Bus;
    pub use crate::error::RetroError;
    pub use crate::format::{DecodedTrack, FormatDecoder};
    pub use crate::guest_cpu::{CpuEffect, GuestCpu};
    pub use crate::machine::{Machine, MachineConfig};
    pub use crate::video::VideoChip;
}
