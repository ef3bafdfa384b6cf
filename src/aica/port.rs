//! Serialized command issuance
//!
//! The command mailbox is a single-writer resource: the streaming thread,
//! the decoder thread (format changes) and the control surface (volume,
//! pause) all issue commands, so every access goes through one lock.

use super::backend::SoundHardware;
use super::registers::{kick_word, ChannelCommand};
use crate::Result;
use parking_lot::{Mutex, MutexGuard};

/// Voice index the streaming pair is addressed through
pub const STREAM_CHANNEL: usize = 0;

/// Lock-guarded access to the coprocessor
pub struct CommandPort<H: SoundHardware> {
    hardware: Mutex<H>,
}

impl<H: SoundHardware> CommandPort<H> {
    /// Take ownership of the hardware
    pub fn new(hardware: H) -> Self {
        CommandPort {
            hardware: Mutex::new(hardware),
        }
    }

    /// Issue a command to a voice: wait for the FIFO, write the parameters,
    /// then kick.
    pub fn issue(&self, channel: usize, command: ChannelCommand) {
        let mut hw = self.hardware.lock();
        Self::issue_locked(&mut hw, channel, command);
    }

    fn issue_locked(hw: &mut H, channel: usize, command: ChannelCommand) {
        while !hw.fifo_ready() {
            std::hint::spin_loop();
        }
        hw.write_mailbox(&command.encode());
        while !hw.fifo_ready() {
            std::hint::spin_loop();
        }
        hw.kick(kick_word(channel));
    }

    /// Read a voice's playback position
    pub fn position(&self, channel: usize) -> u32 {
        let mut hw = self.hardware.lock();
        while !hw.fifo_ready() {
            std::hint::spin_loop();
        }
        hw.position(channel)
    }

    /// DMA both voices' samples into sound RAM under one lock hold
    pub fn load_pair(&self, addresses: [u32; 2], left: &[i16], right: &[i16]) -> Result<()> {
        let mut hw = self.hardware.lock();
        hw.dma_write(addresses[0], left)?;
        hw.dma_write(addresses[1], right)
    }

    /// Exclusive access to the hardware for operations not covered above
    pub fn lock(&self) -> MutexGuard<'_, H> {
        self.hardware.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aica::SimulatedAica;

    #[test]
    fn test_issue_reaches_firmware() {
        let port = CommandPort::new(SimulatedAica::manual());
        port.issue(STREAM_CHANNEL, ChannelCommand::Volume(200));
        port.issue(STREAM_CHANNEL, ChannelCommand::Frequency(22_050));

        let hw = port.lock();
        assert_eq!(
            hw.command_log(),
            &[ChannelCommand::Volume(200), ChannelCommand::Frequency(22_050)]
        );
    }

    #[test]
    fn test_load_pair_writes_both_voices() {
        let port = CommandPort::new(SimulatedAica::manual());
        port.load_pair([0x2_0000, 0x3_0000], &[1, 2], &[3, 4]).unwrap();

        let hw = port.lock();
        assert_eq!(hw.read_ram(0x2_0000, 2), vec![1, 2]);
        assert_eq!(hw.read_ram(0x3_0000, 2), vec![3, 4]);
    }
}
