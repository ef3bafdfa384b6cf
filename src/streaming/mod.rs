//! Streaming path from the ring buffer to sound RAM
//!
//! The decoder thread writes frames into a [`RingBuffer`]; the streaming
//! thread pulls them through the [`Mixer`] (fades, gapless boundary,
//! underrun decay) and the [`StreamDriver`] DMAs them into the half of the
//! hardware double buffer that is not playing.

pub mod driver;
pub mod fade;
pub mod frame;
pub mod mixer;
pub mod ring_buffer;

pub use driver::{StreamDriver, StreamThread};
pub use fade::FadeEngine;
pub use frame::StereoFrame;
pub use mixer::{Mixer, PullReport, StreamFormat};
pub use ring_buffer::{RingBuffer, RingBufferError};
