use std::fmt;

/// Errors crossing the ambient (non-guest-visible) boundary: loading a guest
/// binary, reading a host configuration file, or validating CLI input.
///
/// Nothing inside [`crate::bus::Bus`], [`crate::video::VideoChip`],
/// [`crate::audio::SoundChip`], or a player ever returns this type for a
/// guest-triggered condition — those are surfaced only through status
/// registers (see the player `PLAY_STATUS`/`BLT_STATUS` bits).
#[derive(Debug)]
pub enum RetroError {
    Io(std::io::Error),
    BinaryTooLarge { len: usize, max: usize },
    Config(String),
    Decode(String),
}

impl fmt::Display for RetroError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetroError::Io(e) => write!(f, "i/o error: {e}"),
            RetroError::BinaryTooLarge { len, max } => {
                write!(f, "binary is {len} bytes, exceeds {max}-byte RAM window")
            }
            RetroError::Config(msg) => write!(f, "configuration error: {msg}"),
            RetroError::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

impl std::error::Error for RetroError {}

impl From<std::io::Error> for RetroError {
    fn from(e: std::io::Error) -> Self {
        RetroError::Io(e)
    }
}
