//! AICA sound coprocessor
//!
//! Register layout, the stateless channel programmer, the hardware access
//! trait and a software model of the chip running the streaming firmware.

pub mod backend;
pub mod channel;
pub mod port;
pub mod registers;
pub mod simulated;
pub mod tables;

pub use backend::SoundHardware;
pub use channel::{pan_code, volume_to_log, FrequencyRegister, PanCode, VoiceParams};
pub use port::{CommandPort, STREAM_CHANNEL};
pub use registers::{
    kick_word, ChannelCommand, ChannelRegisters, CommandMailbox, StereoMode,
};
pub use simulated::SimulatedAica;
