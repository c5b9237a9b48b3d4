//! The external music file-format seam.
//!
//! AHX/SID/YM/SAP/SNDH/PSG/VGM parsing is explicitly out of core scope —
//! real parsers are black-box collaborators. This module only defines the
//! trait they must implement to plug into a [`crate::audio::player::PlayerControl`],
//! plus tiny reference decoders (fixed single-note test tones) sufficient
//! to exercise the end-to-end scenarios in the testable properties.

use crate::audio::engine::MusicEvent;
use crate::error::RetroError;

#[derive(Clone, Debug, Default)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subsong_count: u32,
}

pub struct DecodedTrack {
    pub clock_hz: u32,
    pub events: Vec<MusicEvent>,
    pub total_samples: u64,
    pub loop_point: Option<u64>,
    pub metadata: TrackMetadata,
}

/// Turns a guest-supplied byte slice into a timestamped event stream.
/// Implementations run on a short-lived parser task thread, not the guest
/// CPU thread; they must not touch the bus or any chip directly — only
/// return data for the calling [`crate::audio::player::PlayerControl`] to install.
pub trait FormatDecoder: Send + Sync {
    fn decode(&self, data: &[u8], subsong: u32) -> Result<DecodedTrack, RetroError>;
}

/// A minimal reference decoder: treats the input as a flat list of
/// `(u32 sample_delay, u32 register, u32 value)` triples (12 bytes each,
/// little-endian), running at a fixed sample rate. This is the shape
/// every real parser is expected to reduce its format down to; it exists
/// so the end-to-end scenarios can exercise the player/engine plumbing
/// without a real AHX/SID/etc. parser.
pub struct FixedFormatDecoder {
    pub sample_rate: u32,
}

impl FormatDecoder for FixedFormatDecoder {
    fn decode(&self, data: &[u8], _subsong: u32) -> Result<DecodedTrack, RetroError> {
        if data.len() % 12 != 0 {
            return Err(RetroError::Decode(format!(
                "track data length {} is not a multiple of 12",
                data.len()
            )));
        }
        let mut events = Vec::with_capacity(data.len() / 12);
        let mut sample_idx: u64 = 0;
        for chunk in data.chunks_exact(12) {
            let delay = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let reg = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
            let value = u32::from_le_bytes([chunk[8], chunk[9], chunk[10], chunk[11]]);
            sample_idx += delay as u64;
            events.push((sample_idx, reg, value));
        }
        let total_samples = events.last().map(|(idx, _, _)| idx + 1).unwrap_or(1);
        Ok(DecodedTrack {
            clock_hz: self.sample_rate,
            events,
            total_samples,
            loop_point: None,
            metadata: TrackMetadata::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_decoder_accumulates_sample_index_from_delays() {
        let decoder = FixedFormatDecoder { sample_rate: 44_100 };
        let mut data = Vec::new();
        data.extend_from_slice(&100u32.to_le_bytes());
        data.extend_from_slice(&4u32.to_le_bytes());
        data.extend_from_slice(&200u32.to_le_bytes());
        data.extend_from_slice(&50u32.to_le_bytes());
        data.extend_from_slice(&4u32.to_le_bytes());
        data.extend_from_slice(&210u32.to_le_bytes());
        let track = decoder.decode(&data, 0).unwrap();
        assert_eq!(track.events, vec![(100, 4, 200), (150, 4, 210)]);
    }

    #[test]
    fn misaligned_data_is_a_decode_error() {
        let decoder = FixedFormatDecoder { sample_rate: 44_100 };
        assert!(decoder.decode(&[0, 1, 2], 0).is_err());
    }
}
