//! Address map constants for the fantasy machine's memory-mapped I/O window.
//!
//! Main RAM spans `[0, RAM_END)`, VRAM spans `[VRAM_START, VRAM_END)`, and
//! every device register lives in the 64 KiB MMIO window at the top of the
//! 16 MiB address space.

pub const ADDRESS_SPACE_SIZE: usize = 0x0100_0000; // 16 MiB

pub const RAM_END: u32 = 0x000F_0000;
pub const VRAM_START: u32 = 0x0010_0000;
pub const VRAM_END: u32 = 0x0050_0000;

pub const MMIO_START: u32 = 0x000F_0000;
pub const MMIO_END: u32 = 0x000F_FFFF;

/// Page granularity used by the bus's dispatch table: 256 bytes per page,
/// 4096 pages covering the full 16 MiB space (with aliasing outside the
/// registered MMIO window, which is harmless — see DESIGN.md).
pub const PAGE_SHIFT: u32 = 8;
pub const PAGE_COUNT: usize = 0x1000;

// --- VideoChip register block (offsets 0x00-0x58 from VIDEO_REG_BASE) ----

pub const VIDEO_REG_BASE: u32 = 0x000F_0000;
pub const VIDEO_CTRL: u32 = VIDEO_REG_BASE + 0x00;
pub const VIDEO_MODE: u32 = VIDEO_REG_BASE + 0x04;
pub const VIDEO_STATUS: u32 = VIDEO_REG_BASE + 0x08;
pub const COPPER_CTRL: u32 = VIDEO_REG_BASE + 0x0C;
pub const COPPER_PTR: u32 = VIDEO_REG_BASE + 0x10;
pub const COPPER_PC: u32 = VIDEO_REG_BASE + 0x14;
pub const COPPER_STATUS: u32 = VIDEO_REG_BASE + 0x18;

pub const BLT_CTRL: u32 = VIDEO_REG_BASE + 0x1C;
pub const BLT_OP: u32 = VIDEO_REG_BASE + 0x20;
pub const BLT_SRC_ADDR: u32 = VIDEO_REG_BASE + 0x24;
pub const BLT_DST_ADDR: u32 = VIDEO_REG_BASE + 0x28;
pub const BLT_WIDTH: u32 = VIDEO_REG_BASE + 0x2C;
pub const BLT_HEIGHT: u32 = VIDEO_REG_BASE + 0x30;
pub const BLT_SRC_STRIDE: u32 = VIDEO_REG_BASE + 0x34;
pub const BLT_DST_STRIDE: u32 = VIDEO_REG_BASE + 0x38;
pub const BLT_COLOR: u32 = VIDEO_REG_BASE + 0x3C;
pub const BLT_MASK_ADDR: u32 = VIDEO_REG_BASE + 0x40;
pub const BLT_STATUS: u32 = VIDEO_REG_BASE + 0x44;

pub const VIDEO_RASTER_Y: u32 = VIDEO_REG_BASE + 0x48;
pub const VIDEO_RASTER_HEIGHT: u32 = VIDEO_REG_BASE + 0x4C;
pub const VIDEO_RASTER_COLOR: u32 = VIDEO_REG_BASE + 0x50;
pub const VIDEO_RASTER_CTRL: u32 = VIDEO_REG_BASE + 0x54;

pub const VIDEO_REG_WINDOW_END: u32 = VIDEO_REG_BASE + 0x58;

/// Student-only extensions with no slot in the external register table —
/// mapped in the free space right after the official window, well ahead of
/// the next device (terminal/serial, out of core scope, starts at +0x700).
pub const COPPER_ENDIAN: u32 = VIDEO_REG_WINDOW_END;
pub const BLT_LINE_X0: u32 = VIDEO_REG_WINDOW_END + 0x04;
pub const BLT_LINE_Y0: u32 = VIDEO_REG_WINDOW_END + 0x08;
pub const BLT_LINE_X1: u32 = VIDEO_REG_WINDOW_END + 0x0C;
pub const BLT_LINE_Y1: u32 = VIDEO_REG_WINDOW_END + 0x10;

// --- SoundChip register block --------------------------------------------

pub const SOUND_REG_BASE: u32 = 0x000F_0800;
/// Per-channel register stride; see [`crate::audio::NUM_CHANNELS`].
pub const SOUND_CHANNEL_STRIDE: u32 = 0x20;
pub const SOUND_GLOBAL_BASE: u32 = SOUND_REG_BASE + 0x200;

// --- Music player MMIO blocks ---------------------------------------------
//
// Each format gets a register block exposing the common PlayerControl
// layout described in the spec's §4.6. PSG/POKEY/SID/TED sit at their
// specified bases; AHX has no assigned address in the external map, so it
// is placed in the free gap right after TED's block, ahead of the
// out-of-core-scope VGA window (see DESIGN.md).

pub const PSG_PLAYER_BASE: u32 = 0x000F_0C00;
pub const POKEY_PLAYER_BASE: u32 = 0x000F_0D00;
pub const SID_PLAYER_BASE: u32 = 0x000F_0E00;
pub const TED_PLAYER_BASE: u32 = 0x000F_0F00;
pub const AHX_PLAYER_BASE: u32 = 0x000F_0F60;

/// Footprint of one player's PlayerControl block, used only to size its
/// mapped `map_io` range — each format's base above is independent, not
/// derived from this stride.
pub const PLAYER_BLOCK_STRIDE: u32 = 0x20;

pub const PLAY_PTR_OFFSET: u32 = 0x00;
pub const PLAY_LEN_OFFSET: u32 = 0x04;
pub const PLAY_CTRL_OFFSET: u32 = 0x08;
pub const PLAY_STATUS_OFFSET: u32 = 0x0C;
pub const PLAY_SUBSONG_OFFSET: u32 = 0x10;

pub const PLAY_CTRL_START: u32 = 1 << 0;
pub const PLAY_CTRL_STOP: u32 = 1 << 1;
pub const PLAY_CTRL_FORCE_LOOP: u32 = 1 << 2;

pub const PLAY_STATUS_BUSY: u32 = 1 << 0;
pub const PLAY_STATUS_ERROR: u32 = 1 << 1;

/// One of the five playback formats; each has its own fixed register base.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlayerFormat {
    Psg,
    Sid,
    Ahx,
    Ted,
    Pokey,
}

impl PlayerFormat {
    pub const ALL: [PlayerFormat; 5] = [
        PlayerFormat::Psg,
        PlayerFormat::Sid,
        PlayerFormat::Ahx,
        PlayerFormat::Ted,
        PlayerFormat::Pokey,
    ];

    pub fn base_addr(self) -> u32 {
        match self {
            PlayerFormat::Psg => PSG_PLAYER_BASE,
            PlayerFormat::Pokey => POKEY_PLAYER_BASE,
            PlayerFormat::Sid => SID_PLAYER_BASE,
            PlayerFormat::Ted => TED_PLAYER_BASE,
            PlayerFormat::Ahx => AHX_PLAYER_BASE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PlayerFormat::Psg => "psg",
            PlayerFormat::Sid => "sid",
            PlayerFormat::Ahx => "ahx",
            PlayerFormat::Ted => "ted",
            PlayerFormat::Pokey => "pokey",
        }
    }
}
