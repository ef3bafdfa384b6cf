//! Channel programmer
//!
//! Converts logical voice parameters (linear volume, pan position, frequency
//! in Hz) into the encodings the AICA expects in its per-voice registers.
//! Everything here is stateless; the only state touched is the
//! [`ChannelRegisters`] passed in by the caller.

use super::registers::{ChannelRegisters, SampleFormat, StereoMode};
use super::tables::{BASE_RATE, LOG_TABLE, MAX_EXPONENT, MIN_EXPONENT};

/// Linear pan value that maps to the centred code.
pub const PAN_CENTER: u8 = 0x80;

/// Direct-out level used for streaming voices.
pub const STREAM_DIRECT_LEVEL: u8 = 0x0f;

/// Translate a linear volume (0-255) to the chip's total-level attenuation.
///
/// Only the upper half of [`LOG_TABLE`] is used, so even volume 0 keeps a
/// faint signal; 255 maps to no attenuation.
#[inline]
pub fn volume_to_log(volume: u8) -> u8 {
    0xff - LOG_TABLE[128 + (volume as usize / 2)]
}

/// Hardware pan codes. The direct-out path only supports three positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanCode {
    /// Centred
    Center = 0x00,
    /// Hard left
    Left = 0x1f,
    /// Hard right
    Right = 0x0f,
}

impl PanCode {
    /// Raw register value
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

/// Quantize a linear pan position (0 left, 128 centre, 255 right).
#[inline]
pub fn pan_code(pan: u8) -> PanCode {
    match pan {
        PAN_CENTER => PanCode::Center,
        p if p < PAN_CENTER => PanCode::Left,
        _ => PanCode::Right,
    }
}

/// Pitch register contents: `freq = 44100 * 2^exponent * (1 + mantissa / 1024)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyRegister {
    /// Octave, in `[-8, 7]`
    pub exponent: i8,
    /// 10-bit fraction
    pub mantissa: u16,
}

impl FrequencyRegister {
    /// Encode a frequency in Hz.
    ///
    /// The reference starts at `44100 << 7` and is halved, decrementing the
    /// exponent, while it still exceeds the target. Frequencies above the
    /// top of exponent 7 are clamped.
    pub fn encode(frequency: u32) -> Self {
        let mut reference = (BASE_RATE as u64) << MAX_EXPONENT;
        let mut exponent = MAX_EXPONENT;
        let target = (frequency as u64).min(reference * 2 - 1);

        while target < reference && exponent > MIN_EXPONENT {
            reference >>= 1;
            exponent -= 1;
        }

        let mantissa = (((target << 10) / reference) & 1023) as u16;
        FrequencyRegister { exponent, mantissa }
    }

    /// Register word: exponent in bits 11-14, mantissa in bits 0-9.
    pub fn to_word(&self) -> u16 {
        (((self.exponent as u16) & 0xf) << 11) | (self.mantissa & 1023)
    }

    /// Parse a register word
    pub fn from_word(word: u16) -> Self {
        let raw = ((word >> 11) & 0xf) as i8;
        // sign-extend the 4-bit exponent
        let exponent = (raw << 4) >> 4;
        FrequencyRegister {
            exponent,
            mantissa: word & 1023,
        }
    }

    /// Frequency in Hz described by this register
    pub fn to_hz(&self) -> u32 {
        let scaled = BASE_RATE as u64 * (1024 + self.mantissa as u64);
        let hz = if self.exponent >= 0 {
            (scaled << self.exponent) >> 10
        } else {
            scaled >> (10 - self.exponent as i32)
        };
        hz as u32
    }
}

/// Parameters for one streaming voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceParams {
    /// Buffer address in sound RAM
    pub address: u32,
    /// Loop length in samples
    pub length: u32,
    /// Frequency in Hz
    pub frequency: u32,
    /// Linear volume 0-255
    pub volume: u8,
    /// Linear pan 0-255
    pub pan: u8,
}

/// Program a voice to loop over a 16-bit buffer and key it on.
pub fn program_stream_voice(regs: &mut ChannelRegisters, params: &VoiceParams) {
    regs.playing = false;
    regs.sample_address = params.address;
    regs.format = SampleFormat::Pcm16;
    regs.loop_start = 0;
    regs.loop_end = params.length.min(u16::MAX as u32) as u16;
    regs.looping = true;
    regs.pitch = FrequencyRegister::encode(params.frequency).to_word();
    regs.pan = pan_code(params.pan).code();
    regs.direct_level = STREAM_DIRECT_LEVEL;
    regs.total_level = volume_to_log(params.volume);
    regs.envelope = 0x1f;
    regs.playing = true;
}

/// Key a voice off.
pub fn stop_voice(regs: &mut ChannelRegisters) {
    regs.playing = false;
}

/// Change a voice's volume in place.
pub fn set_voice_volume(regs: &mut ChannelRegisters, volume: u8) {
    regs.total_level = volume_to_log(volume);
}

/// Change a voice's pitch in place.
pub fn set_voice_frequency(regs: &mut ChannelRegisters, frequency: u32) {
    regs.pitch = FrequencyRegister::encode(frequency).to_word();
}

/// Change a voice's pan in place.
pub fn set_voice_pan(regs: &mut ChannelRegisters, pan: u8) {
    regs.pan = pan_code(pan).code();
}

/// Linear pan of the (left, right) streaming voices for a routing mode.
pub fn stereo_pans(mode: StereoMode) -> (u8, u8) {
    match mode {
        StereoMode::Mono => (PAN_CENTER, PAN_CENTER),
        StereoMode::Stereo => (0, 255),
        StereoMode::InvertStereo => (255, 0),
    }
}
