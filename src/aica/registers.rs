//! AICA register definitions
//!
//! Per-voice register block layout, the mailbox used to hand commands to the
//! coprocessor firmware, and sound RAM layout constants.

/// Number of hardware voices on the chip.
pub const CHANNEL_COUNT: usize = 64;

/// Total sound RAM in bytes.
pub const SOUND_RAM_SIZE: usize = 2 * 1024 * 1024;

/// First sound RAM byte available after the firmware image.
pub const STREAM_RAM_BASE: u32 = 0x0001_0000;

/// Largest buffer half, in bytes per voice.
///
/// Both halves together must fit the 16-bit loop end register, so a half
/// holds at most 16384 samples.
pub const STREAM_MAX_BYTES: usize = 0x8000;

/// Smallest buffer half, in bytes per voice.
pub const STREAM_MIN_BYTES: usize = 64;

/// DMA transfers must be a multiple of this many bytes.
pub const DMA_ALIGN_BYTES: usize = 32;

/// Bit set in the kick register to make the firmware process the mailbox.
pub const KICK: u32 = 0x8000_0000;

/// Play-control bit: key on (start the voice).
pub const PLAY_KEY_ON: u32 = 0x4000;
/// Play-control bit: key-on execute strobe.
pub const PLAY_KEY_EXECUTE: u32 = 0x8000;
/// Play-control bit: loop forever between loop start and loop end.
pub const PLAY_LOOP: u32 = 0x0200;

/// Sample encoding of a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// Signed 16-bit PCM
    #[default]
    Pcm16 = 0,
}

/// Register state of one hardware voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelRegisters {
    /// Sample start address in sound RAM
    pub sample_address: u32,
    /// Sample encoding
    pub format: SampleFormat,
    /// Loop start offset in samples
    pub loop_start: u16,
    /// Loop end offset in samples
    pub loop_end: u16,
    /// Loop between loop start and end instead of stopping
    pub looping: bool,
    /// Pitch register word (see [`super::FrequencyRegister`])
    pub pitch: u16,
    /// Pan code (see [`super::PanCode`])
    pub pan: u8,
    /// Direct-out send level
    pub direct_level: u8,
    /// Total level: 0 is loudest, 255 is most attenuated
    pub total_level: u8,
    /// Envelope attack/decay word
    pub envelope: u32,
    /// Voice is keyed on
    pub playing: bool,
}

impl ChannelRegisters {
    /// Power-on register state: voice stopped, envelope disabled.
    pub const fn new() -> Self {
        ChannelRegisters {
            sample_address: 0,
            format: SampleFormat::Pcm16,
            loop_start: 0,
            loop_end: 0,
            looping: false,
            pitch: 0,
            pan: 0,
            direct_level: 0,
            total_level: 0,
            envelope: 0x1f,
            playing: false,
        }
    }

    /// Compose the play-control word
    pub fn play_control(&self) -> u32 {
        let key = if self.playing {
            PLAY_KEY_EXECUTE | PLAY_KEY_ON
        } else {
            PLAY_KEY_EXECUTE
        };
        let looping = if self.looping { PLAY_LOOP } else { 0 };
        key | looping | ((self.format as u32) << 7) | (self.sample_address >> 16)
    }
}

impl Default for ChannelRegisters {
    fn default() -> Self {
        Self::new()
    }
}

/// Firmware command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
    /// No operation
    Nop = 0,
    /// Start the streaming voice pair
    Start = 1,
    /// Stop the streaming voice pair
    Stop = 2,
    /// Change volume
    Volume = 3,
    /// Change playback frequency
    Frequency = 4,
    /// Both voices centred
    Mono = 5,
    /// Left voice left, right voice right
    Stereo = 6,
    /// Left and right swapped
    InvertStereo = 7,
}

impl CommandCode {
    /// Convert a raw mailbox word to a command code
    pub fn from_word(word: u32) -> Option<Self> {
        match word {
            0 => Some(CommandCode::Nop),
            1 => Some(CommandCode::Start),
            2 => Some(CommandCode::Stop),
            3 => Some(CommandCode::Volume),
            4 => Some(CommandCode::Frequency),
            5 => Some(CommandCode::Mono),
            6 => Some(CommandCode::Stereo),
            7 => Some(CommandCode::InvertStereo),
            _ => None,
        }
    }
}

/// Routing of the streaming voice pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum StereoMode {
    /// Both voices centred
    Mono,
    /// Left voice hard left, right voice hard right
    #[default]
    Stereo,
    /// Left voice hard right, right voice hard left
    InvertStereo,
}

/// High-level command for the streaming voice pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCommand {
    /// Key on both voices looping over their buffers
    Start {
        /// Playback frequency in Hz
        frequency: u32,
        /// Loop length in samples (both buffer halves)
        length: u32,
        /// Linear volume 0-255
        volume: u8,
        /// Sound RAM address of each voice's buffer
        addresses: [u32; 2],
    },
    /// Key off both voices
    Stop,
    /// Change linear volume 0-255
    Volume(u8),
    /// Change playback frequency in Hz
    Frequency(u32),
    /// Change voice routing
    Stereo(StereoMode),
}

/// Parameter words written before a kick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandMailbox {
    /// Raw [`CommandCode`]
    pub command: u32,
    /// Frequency in Hz
    pub frequency: u32,
    /// Loop length in samples
    pub length: u32,
    /// Linear volume
    pub volume: u32,
    /// Buffer address of each voice
    pub addresses: [u32; 2],
}

impl ChannelCommand {
    /// Serialize into mailbox words
    pub fn encode(&self) -> CommandMailbox {
        match *self {
            ChannelCommand::Start {
                frequency,
                length,
                volume,
                addresses,
            } => CommandMailbox {
                command: CommandCode::Start as u32,
                frequency,
                length,
                volume: volume as u32,
                addresses,
            },
            ChannelCommand::Stop => CommandMailbox {
                command: CommandCode::Stop as u32,
                ..Default::default()
            },
            ChannelCommand::Volume(volume) => CommandMailbox {
                command: CommandCode::Volume as u32,
                volume: volume as u32,
                ..Default::default()
            },
            ChannelCommand::Frequency(frequency) => CommandMailbox {
                command: CommandCode::Frequency as u32,
                frequency,
                ..Default::default()
            },
            ChannelCommand::Stereo(mode) => CommandMailbox {
                command: match mode {
                    StereoMode::Mono => CommandCode::Mono,
                    StereoMode::Stereo => CommandCode::Stereo,
                    StereoMode::InvertStereo => CommandCode::InvertStereo,
                } as u32,
                ..Default::default()
            },
        }
    }

    /// Parse mailbox words back into a command
    pub fn decode(mailbox: &CommandMailbox) -> Option<Self> {
        let cmd = match CommandCode::from_word(mailbox.command)? {
            CommandCode::Nop => return None,
            CommandCode::Start => ChannelCommand::Start {
                frequency: mailbox.frequency,
                length: mailbox.length,
                volume: (mailbox.volume & 0xff) as u8,
                addresses: mailbox.addresses,
            },
            CommandCode::Stop => ChannelCommand::Stop,
            CommandCode::Volume => ChannelCommand::Volume((mailbox.volume & 0xff) as u8),
            CommandCode::Frequency => ChannelCommand::Frequency(mailbox.frequency),
            CommandCode::Mono => ChannelCommand::Stereo(StereoMode::Mono),
            CommandCode::Stereo => ChannelCommand::Stereo(StereoMode::Stereo),
            CommandCode::InvertStereo => ChannelCommand::Stereo(StereoMode::InvertStereo),
        };
        Some(cmd)
    }
}

/// Kick word addressing a voice (`KICK | (channel + 1)`)
pub fn kick_word(channel: usize) -> u32 {
    KICK | (channel as u32 + 1)
}

/// Voice addressed by a kick word, if the kick bit is set
pub fn kicked_channel(word: u32) -> Option<usize> {
    if word & KICK == 0 {
        return None;
    }
    (word & !KICK).checked_sub(1).map(|c| c as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_play_control_word() {
        let regs = ChannelRegisters {
            sample_address: 0x0003_1000,
            looping: true,
            playing: true,
            ..ChannelRegisters::new()
        };
        assert_eq!(regs.play_control(), 0xc000 | 0x0200 | 0x03);

        let stopped = ChannelRegisters::new();
        assert_eq!(stopped.play_control() & PLAY_KEY_ON, 0);
    }

    #[test]
    fn test_kick_word() {
        assert_eq!(kick_word(0), 0x8000_0001);
        assert_eq!(kicked_channel(kick_word(0)), Some(0));
        assert_eq!(kicked_channel(kick_word(5)), Some(5));
        assert_eq!(kicked_channel(0x0000_0001), None);
        assert_eq!(kicked_channel(KICK), None);
    }

    #[test]
    fn test_command_mailbox() {
        let start = ChannelCommand::Start {
            frequency: 44_100,
            length: 2048,
            volume: 200,
            addresses: [STREAM_RAM_BASE, STREAM_RAM_BASE + 0x1000],
        };
        let mailbox = start.encode();
        assert_eq!(mailbox.command, CommandCode::Start as u32);
        assert_eq!(ChannelCommand::decode(&mailbox), Some(start));

        let stereo = ChannelCommand::Stereo(StereoMode::InvertStereo).encode();
        assert_eq!(stereo.command, 7);
        assert_eq!(ChannelCommand::decode(&CommandMailbox::default()), None);
    }
}
