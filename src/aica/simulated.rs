//! Software model of the AICA and its streaming firmware
//!
//! Executes kicked commands the way the ARM-side firmware does (programming
//! the streaming voice pair through the channel programmer) and plays sound
//! RAM back by advancing the voices' positions, either on demand or from the
//! wall clock. Played frames can be captured for inspection.

use super::backend::SoundHardware;
use super::channel::{
    program_stream_voice, set_voice_frequency, set_voice_pan, set_voice_volume, stereo_pans,
    stop_voice, FrequencyRegister, VoiceParams,
};
use super::port::STREAM_CHANNEL;
use super::registers::{
    kicked_channel, ChannelCommand, ChannelRegisters, CommandMailbox, StereoMode, CHANNEL_COUNT,
    SOUND_RAM_SIZE, STREAM_RAM_BASE,
};
use crate::streaming::StereoFrame;
use crate::{AicaError, Result};
use std::time::Instant;

/// How the simulated voices advance
#[derive(Debug, Clone, Copy)]
enum SimClock {
    /// Only [`SimulatedAica::advance`] moves playback
    Manual,
    /// Playback follows elapsed wall time at the programmed pitch
    Realtime { last: Instant, carry: f64 },
}

/// In-memory AICA with the streaming firmware behaviour
pub struct SimulatedAica {
    ram: Vec<u8>,
    firmware_loaded: bool,
    channels: [ChannelRegisters; CHANNEL_COUNT],
    positions: [u32; CHANNEL_COUNT],
    mailbox: CommandMailbox,
    command_log: Vec<ChannelCommand>,
    stereo_mode: StereoMode,
    clock: SimClock,
    capture: Option<Vec<StereoFrame>>,
    capture_limit: usize,
}

impl SimulatedAica {
    /// Stand-in firmware image accepted by the model.
    pub const FIRMWARE: &'static [u8] = b"AICA stream firmware v1\0";

    /// Model whose playback only advances when told to
    pub fn manual() -> Self {
        Self::with_clock(SimClock::Manual)
    }

    /// Model whose playback follows the wall clock
    pub fn realtime() -> Self {
        Self::with_clock(SimClock::Realtime {
            last: Instant::now(),
            carry: 0.0,
        })
    }

    fn with_clock(clock: SimClock) -> Self {
        SimulatedAica {
            ram: vec![0; SOUND_RAM_SIZE],
            firmware_loaded: false,
            channels: [ChannelRegisters::new(); CHANNEL_COUNT],
            positions: [0; CHANNEL_COUNT],
            mailbox: CommandMailbox::default(),
            command_log: Vec::new(),
            stereo_mode: StereoMode::Stereo,
            clock,
            capture: None,
            capture_limit: usize::MAX,
        }
    }

    /// Record every played frame (up to `limit` frames)
    pub fn with_capture(mut self, limit: usize) -> Self {
        self.capture = Some(Vec::new());
        self.capture_limit = limit;
        self
    }

    /// Play `frames` samples on the streaming pair, wrapping at loop end.
    pub fn advance(&mut self, frames: usize) {
        let (left, right) = (self.channels[0], self.channels[1]);
        if !left.playing || left.loop_end == 0 {
            return;
        }
        let loop_end = left.loop_end as u32;
        for _ in 0..frames {
            let pos = self.positions[0];
            if let Some(capture) = self.capture.as_mut() {
                if capture.len() < self.capture_limit {
                    let l = read_sample(&self.ram, left.sample_address, pos);
                    let r = if right.playing {
                        read_sample(&self.ram, right.sample_address, pos)
                    } else {
                        0
                    };
                    capture.push(StereoFrame::new(l, r));
                }
            }
            let next = (pos + 1) % loop_end;
            self.positions[0] = next;
            self.positions[1] = next;
        }
    }

    fn sync_clock(&mut self) {
        if let SimClock::Realtime { last, carry } = self.clock {
            let now = Instant::now();
            let rate = if self.channels[0].playing {
                FrequencyRegister::from_word(self.channels[0].pitch).to_hz() as f64
            } else {
                0.0
            };
            let exact = now.duration_since(last).as_secs_f64() * rate + carry;
            let frames = exact.floor();
            self.clock = SimClock::Realtime {
                last: now,
                carry: exact - frames,
            };
            self.advance(frames as usize);
        }
    }

    fn execute(&mut self, channel: usize, command: ChannelCommand) {
        self.command_log.push(command);
        if channel != STREAM_CHANNEL {
            return;
        }
        match command {
            ChannelCommand::Start {
                frequency,
                length,
                volume,
                addresses,
            } => {
                let (pan_l, pan_r) = stereo_pans(self.stereo_mode);
                for (voice, (&address, pan)) in addresses.iter().zip([pan_l, pan_r]).enumerate() {
                    program_stream_voice(
                        &mut self.channels[voice],
                        &VoiceParams {
                            address,
                            length,
                            frequency,
                            volume,
                            pan,
                        },
                    );
                    self.positions[voice] = 0;
                }
                if let SimClock::Realtime { .. } = self.clock {
                    self.clock = SimClock::Realtime {
                        last: Instant::now(),
                        carry: 0.0,
                    };
                }
            }
            ChannelCommand::Stop => {
                stop_voice(&mut self.channels[0]);
                stop_voice(&mut self.channels[1]);
            }
            ChannelCommand::Volume(volume) => {
                set_voice_volume(&mut self.channels[0], volume);
                set_voice_volume(&mut self.channels[1], volume);
            }
            ChannelCommand::Frequency(frequency) => {
                set_voice_frequency(&mut self.channels[0], frequency);
                set_voice_frequency(&mut self.channels[1], frequency);
            }
            ChannelCommand::Stereo(mode) => {
                self.stereo_mode = mode;
                let (pan_l, pan_r) = stereo_pans(mode);
                set_voice_pan(&mut self.channels[0], pan_l);
                set_voice_pan(&mut self.channels[1], pan_r);
            }
        }
    }

    /// Register state of a voice
    pub fn channel(&self, index: usize) -> &ChannelRegisters {
        &self.channels[index]
    }

    /// Commands executed so far, oldest first
    pub fn command_log(&self) -> &[ChannelCommand] {
        &self.command_log
    }

    /// Frames played so far (empty unless capture is enabled)
    pub fn captured(&self) -> &[StereoFrame] {
        self.capture.as_deref().unwrap_or(&[])
    }

    /// Take the captured frames, leaving capture enabled
    pub fn take_captured(&mut self) -> Vec<StereoFrame> {
        self.capture.as_mut().map(std::mem::take).unwrap_or_default()
    }

    /// Read `count` samples from sound RAM at a byte offset
    pub fn read_ram(&self, offset: u32, count: usize) -> Vec<i16> {
        (0..count as u32)
            .map(|i| read_sample(&self.ram, offset, i))
            .collect()
    }

    /// Whether a firmware image has been uploaded
    pub fn firmware_loaded(&self) -> bool {
        self.firmware_loaded
    }
}

impl Default for SimulatedAica {
    fn default() -> Self {
        Self::manual()
    }
}

fn read_sample(ram: &[u8], base: u32, index: u32) -> i16 {
    let at = base as usize + index as usize * 2;
    match ram.get(at..at + 2) {
        Some(bytes) => i16::from_le_bytes([bytes[0], bytes[1]]),
        None => 0,
    }
}

impl SoundHardware for SimulatedAica {
    fn ram_size(&self) -> usize {
        self.ram.len()
    }

    fn upload_firmware(&mut self, image: &[u8]) -> Result<()> {
        if image.is_empty() {
            return Err(AicaError::HardwareInit("firmware image is empty".into()));
        }
        if image.len() > STREAM_RAM_BASE as usize {
            return Err(AicaError::HardwareInit(format!(
                "firmware image of {} bytes overlaps stream buffers at {STREAM_RAM_BASE:#x}",
                image.len()
            )));
        }
        self.firmware_loaded = false;
        self.ram.fill(0);
        self.ram[..image.len()].copy_from_slice(image);
        self.channels = [ChannelRegisters::new(); CHANNEL_COUNT];
        self.positions = [0; CHANNEL_COUNT];
        self.firmware_loaded = true;
        Ok(())
    }

    fn fifo_ready(&self) -> bool {
        true
    }

    fn write_mailbox(&mut self, mailbox: &CommandMailbox) {
        self.mailbox = *mailbox;
    }

    fn kick(&mut self, word: u32) {
        if !self.firmware_loaded {
            return;
        }
        self.sync_clock();
        let Some(channel) = kicked_channel(word) else {
            return;
        };
        if let Some(command) = ChannelCommand::decode(&self.mailbox) {
            self.execute(channel, command);
        }
    }

    fn position(&mut self, channel: usize) -> u32 {
        self.sync_clock();
        self.positions.get(channel).copied().unwrap_or(0)
    }

    fn dma_write(&mut self, offset: u32, samples: &[i16]) -> Result<()> {
        let start = offset as usize;
        let end = start + samples.len() * 2;
        if end > self.ram.len() {
            return Err(format!(
                "DMA of {} bytes at {offset:#x} runs past end of sound RAM",
                samples.len() * 2
            )
            .into());
        }
        for (chunk, sample) in self.ram[start..end].chunks_exact_mut(2).zip(samples) {
            chunk.copy_from_slice(&sample.to_le_bytes());
        }
        Ok(())
    }
}
