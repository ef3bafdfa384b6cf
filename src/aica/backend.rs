//! Hardware access trait for the sound coprocessor
//!
//! Defines the raw operations the streaming driver needs from the chip. The
//! ARM-side firmware interprets the mailbox, so the host only ever writes
//! parameter words and a kick, reads the playback position of a voice, and
//! moves PCM into sound RAM.

use super::registers::CommandMailbox;
use crate::Result;

/// Raw interface to the AICA and its firmware
///
/// Implementations:
/// - [`super::SimulatedAica`]: software model for hosts and tests
/// - Real G2-bus access on target hardware
///
/// # Example
///
/// ```
/// use aica_player::aica::{kick_word, ChannelCommand};
/// use aica_player::{SimulatedAica, SoundHardware};
///
/// fn stop_stream<H: SoundHardware>(hw: &mut H) {
///     while !hw.fifo_ready() {
///         std::hint::spin_loop();
///     }
///     hw.write_mailbox(&ChannelCommand::Stop.encode());
///     hw.kick(kick_word(0));
/// }
///
/// stop_stream(&mut SimulatedAica::manual());
/// ```
pub trait SoundHardware: Send {
    /// Size of sound RAM in bytes
    fn ram_size(&self) -> usize;

    /// Halt the ARM core, clear sound RAM, load the firmware image at
    /// address 0 and restart the core.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AicaError::HardwareInit`] if the image does not fit.
    fn upload_firmware(&mut self, image: &[u8]) -> Result<()>;

    /// Whether the command FIFO can accept another write
    fn fifo_ready(&self) -> bool;

    /// Write the parameter words of the next command
    fn write_mailbox(&mut self, mailbox: &CommandMailbox);

    /// Write the kick register, making the firmware execute the mailbox
    fn kick(&mut self, word: u32);

    /// Current playback offset of a voice, in samples from its buffer start
    fn position(&mut self, channel: usize) -> u32;

    /// Copy 16-bit samples into sound RAM at a byte offset, waiting for the
    /// transfer to complete
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer would run past the end of sound RAM.
    fn dma_write(&mut self, offset: u32, samples: &[i16]) -> Result<()>;
}
