//! Decoder thread, playback session and control surface

pub mod controller;
pub mod decoder;
pub mod scheduler;
pub mod session;
pub mod status;

pub use controller::Player;
pub use decoder::{
    default_title, DecodeStatus, Decoder, DecoderError, DecoderRegistry, InfoFields, TrackInfo,
    WILDCARD,
};
pub use scheduler::{PriorityHook, PriorityLevel, PriorityScheduler};
pub use session::{PlaybackSession, SessionSnapshot};
pub use status::PlayerStatus;
