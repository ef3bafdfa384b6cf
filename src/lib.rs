//! Streaming audio player for the AICA sound coprocessor
//!
//! Moves decoded PCM from pluggable decoders into a DMA-fed, double-buffered
//! pair of hardware voices without audible glitches. A decoder thread fills a
//! shared ring buffer while a streaming thread drains it into sound RAM,
//! applying fixed-point fades and anti-click decay on the way. Track changes
//! can be gapless: the new track is appended behind the tail of the old one
//! and frequency changes take effect on the exact boundary frame.
//!
//! # Features
//! - Register-level channel programming (log volume, pan codes, exponent/mantissa pitch)
//! - Bounded, lock-scoped ring buffer of explicit stereo frames
//! - DMA double buffering driven by the hardware playback position
//! - 9-bit fractional fade ramps and decaying underrun fill
//! - Decoder state machine with occupancy-driven priority feedback
//! - Simulated coprocessor for host playback and testing
//!
//! # Crate feature flags
//! - `cli` (default): `aica-player` demo binary (adds `clap`, `anyhow`, `tracing-subscriber`)
//!
//! # Quick start
//! ```no_run
//! use aica_player::{DecoderRegistry, Player, PlayerConfig, SimulatedAica};
//! use aica_player::decoders::ToneDecoder;
//!
//! let mut registry = DecoderRegistry::new();
//! registry.register(Box::new(ToneDecoder::new()));
//!
//! let hardware = SimulatedAica::realtime();
//! let config = PlayerConfig::default();
//! let player = Player::init(hardware, SimulatedAica::FIRMWARE, config, registry)?;
//! player.start("tone:440:2000", 0, true)?;
//! # Ok::<(), aica_player::AicaError>(())
//! ```

#![warn(missing_docs)]

pub mod aica; // Coprocessor registers, channel programming, hardware access
pub mod config; // Player configuration
pub mod decoders; // Built-in decoder plugins
pub mod player; // Decoder thread, session and control surface
pub mod streaming; // Ring buffer, fade/mix engine, DMA streaming driver

/// Error types for the streaming player
#[derive(thiserror::Error, Debug)]
pub enum AicaError {
    /// Coprocessor bring-up failed (missing firmware, sound RAM exhausted)
    #[error("Hardware initialization failed: {0}")]
    HardwareInit(String),

    /// No registered decoder accepts the file
    #[error("No decoder found for '{0}'")]
    NoDriverFound(String),

    /// Decoder failure while starting or decoding a track
    #[error("Decoder error: {0}")]
    Decode(#[from] player::DecoderError),

    /// Ring buffer construction error
    #[error("Ring buffer error: {0}")]
    RingBuffer(#[from] streaming::RingBufferError),

    /// A player state transition did not happen in time
    #[error("Timed out after {waited_ms} ms waiting for state {expected} (current: {current})")]
    StateTimeout {
        /// State that was awaited
        expected: player::PlayerStatus,
        /// State observed when the wait gave up
        current: player::PlayerStatus,
        /// How long the wait lasted
        waited_ms: u64,
    },

    /// Player is shut down or was never brought up
    #[error("Player is not running")]
    NotRunning,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error from filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for AicaError {
    /// Converts a String into `AicaError::Other`.
    ///
    /// Prefer the specific variants where the failure class is known.
    fn from(msg: String) -> Self {
        AicaError::Other(msg)
    }
}

impl From<&str> for AicaError {
    fn from(msg: &str) -> Self {
        AicaError::Other(msg.to_string())
    }
}

/// Result type for player operations
pub type Result<T> = std::result::Result<T, AicaError>;

// Public API exports
pub use aica::{CommandPort, SimulatedAica, SoundHardware};
pub use config::{PlayerConfig, SchedulerConfig, StreamConfig};
pub use player::{
    DecodeStatus, Decoder, DecoderRegistry, InfoFields, Player, PlayerStatus, PriorityLevel,
    SessionSnapshot, TrackInfo,
};
pub use streaming::{RingBuffer, StereoFrame};
