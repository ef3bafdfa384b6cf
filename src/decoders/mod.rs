//! Built-in decoder plugins
//!
//! - [`WavDecoder`]: 16-bit PCM `.wav` files (mono or stereo)
//! - [`ToneDecoder`]: wildcard sine generator for `tone:<hz>[:<ms>]` paths

pub mod tone;
pub mod wav;

pub use tone::ToneDecoder;
pub use wav::WavDecoder;

use crate::player::DecoderRegistry;

/// Registry holding every built-in decoder, extension decoders first
pub fn builtin_registry() -> DecoderRegistry {
    DecoderRegistry::new()
        .with(Box::new(WavDecoder::new()))
        .with(Box::new(ToneDecoder::new()))
}
