//! Playback session state

use super::decoder::TrackInfo;
use super::status::PlayerStatus;
use crate::streaming::StreamFormat;

/// The track being played, owned by the player core.
///
/// Created by `start`, cleared when the decoder thread stops the track.
/// Fade, pause and played-count state live in the mixer, which the
/// streaming thread owns.
#[derive(Debug, Clone, Default)]
pub struct PlaybackSession {
    /// Path passed to `start`
    pub path: Option<String>,
    /// Track index within the file
    pub track: u32,
    /// Registry index of the active decoder
    pub decoder: Option<usize>,
    /// Name of the active decoder
    pub decoder_name: Option<String>,
    /// Merged track information
    pub info: TrackInfo,
}

impl PlaybackSession {
    /// Session for a freshly started track
    pub fn new(
        path: &str,
        track: u32,
        decoder: usize,
        decoder_name: &str,
        info: TrackInfo,
    ) -> Self {
        PlaybackSession {
            path: Some(path.to_string()),
            track,
            decoder: Some(decoder),
            decoder_name: Some(decoder_name.to_string()),
            info,
        }
    }

    /// Drop the decoder and its metadata
    pub fn clear(&mut self) {
        *self = PlaybackSession::default();
    }

    /// Whether a decoder is attached
    pub fn is_active(&self) -> bool {
        self.decoder.is_some()
    }
}

/// Read-only view of the player for callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Decoder thread state
    pub status: PlayerStatus,
    /// Path of the current track
    pub path: Option<String>,
    /// Track index within the file
    pub track: u32,
    /// Name of the active decoder
    pub decoder: Option<String>,
    /// Merged track information
    pub info: TrackInfo,
    /// Format programmed into the hardware
    pub format: StreamFormat,
    /// Linear volume 0-255
    pub volume: u8,
    /// Pause flag
    pub paused: bool,
    /// Fade ramp value
    pub fade_value: i32,
    /// Running fade episode in ms (0 when idle)
    pub fade_ms: i32,
    /// Frames of the current track played
    pub played: u64,
    /// Frames still ahead of the newest queued track
    pub gapless_remaining: usize,
    /// Gapless starts still waiting for their boundary
    pub queued_tracks: usize,
    /// Ring buffer occupancy in frames
    pub buffered: usize,
}

impl SessionSnapshot {
    /// Milliseconds of the current track played
    pub fn playtime_ms(&self) -> u64 {
        self.played * 1000 / self.format.sample_rate.max(1) as u64
    }
}
