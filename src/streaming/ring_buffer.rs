//! Ring buffer between the decoder thread and the streaming thread
//!
//! A ring buffer (circular buffer) lets two threads run at their own cadence:
//! - Producer thread: the decoder writes frames as it produces them
//! - Consumer thread: the streaming driver reads one buffer half at a time
//!
//! Memory is fixed at `capacity * size_of::<StereoFrame>()` for the lifetime
//! of the player. One slot is always left free so that equal cursors mean
//! empty, which caps occupancy at `capacity - 1`.

use super::StereoFrame;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Largest accepted capacity in frames (64 MB of stereo frames)
pub const MAX_CAPACITY: usize = 64 * 1024 * 1024 / std::mem::size_of::<StereoFrame>();

/// Error type for ring buffer construction
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RingBufferError {
    /// Zero frames requested
    #[error("Ring buffer capacity must be greater than 0")]
    ZeroCapacity,

    /// Requested capacity above [`MAX_CAPACITY`]
    #[error("Ring buffer capacity {requested} exceeds maximum safe size {max}")]
    TooLarge {
        /// Requested frames
        requested: usize,
        /// Upper bound
        max: usize,
    },
}

/// Ring buffer of stereo frames
///
/// # Thread Safety
/// - One producer thread (decoder)
/// - One consumer thread (streaming driver)
/// - The lock covers the cursor update and the copy in or out; it is never
///   held across hardware transfers
/// - Cursors are mirrored in atomics so occupancy can be read without locking
#[derive(Debug)]
pub struct RingBuffer {
    /// Frame storage
    buffer: Mutex<Vec<StereoFrame>>,
    /// Write cursor (producer), always `< capacity`
    write_pos: AtomicUsize,
    /// Read cursor (consumer), always `< capacity`
    read_pos: AtomicUsize,
    /// Slot count, exactly as requested
    capacity: usize,
}

impl RingBuffer {
    /// Create a ring buffer holding up to `capacity - 1` frames
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Requested capacity is 0
    /// - Requested capacity exceeds [`MAX_CAPACITY`]
    pub fn new(capacity: usize) -> Result<Self, RingBufferError> {
        if capacity == 0 {
            return Err(RingBufferError::ZeroCapacity);
        }
        if capacity > MAX_CAPACITY {
            return Err(RingBufferError::TooLarge {
                requested: capacity,
                max: MAX_CAPACITY,
            });
        }

        Ok(RingBuffer {
            buffer: Mutex::new(vec![StereoFrame::SILENCE; capacity]),
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
            capacity,
        })
    }

    /// Slot count (usable frames are one less)
    pub fn size(&self) -> usize {
        self.capacity
    }

    #[inline]
    fn occupied(&self, write: usize, read: usize) -> usize {
        if write >= read {
            write - read
        } else {
            self.capacity - (read - write)
        }
    }

    /// Frames available to read
    pub fn used(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        self.occupied(write, read)
    }

    /// Frames that can be written without overwriting unread data
    pub fn free(&self) -> usize {
        self.capacity - 1 - self.used()
    }

    /// Whether no frame can be written
    pub fn is_full(&self) -> bool {
        self.free() == 0
    }

    /// Whether no frame can be read
    pub fn is_empty(&self) -> bool {
        self.used() == 0
    }

    /// Write frames (producer)
    ///
    /// Never blocks: writes as many whole frames as fit and returns that
    /// count. A short count is backpressure, not an error.
    pub fn write(&self, frames: &[StereoFrame]) -> usize {
        let mut buf = self.buffer.lock();

        // Space is computed under the lock so a concurrent flush cannot race
        let write_pos = self.write_pos.load(Ordering::Acquire);
        let read_pos = self.read_pos.load(Ordering::Acquire);
        let available = self.capacity - 1 - self.occupied(write_pos, read_pos);

        let to_write = frames.len().min(available);
        if to_write == 0 {
            return 0;
        }

        if write_pos + to_write <= self.capacity {
            buf[write_pos..write_pos + to_write].copy_from_slice(&frames[..to_write]);
        } else {
            let first_part = self.capacity - write_pos;
            buf[write_pos..].copy_from_slice(&frames[..first_part]);
            buf[..to_write - first_part].copy_from_slice(&frames[first_part..to_write]);
        }

        self.write_pos
            .store((write_pos + to_write) % self.capacity, Ordering::Release);

        to_write
    }

    /// Write mono samples, duplicating each onto both lanes
    pub fn write_mono(&self, samples: &[i16]) -> usize {
        let frames: Vec<StereoFrame> = samples.iter().map(|&s| StereoFrame::mono(s)).collect();
        self.write(&frames)
    }

    /// Read frames (consumer)
    ///
    /// Never blocks: returns the number of frames copied, which is less than
    /// `dest.len()` on underrun.
    pub fn read(&self, dest: &mut [StereoFrame]) -> usize {
        let buf = self.buffer.lock();

        let write_pos = self.write_pos.load(Ordering::Acquire);
        let read_pos = self.read_pos.load(Ordering::Acquire);
        let available = self.occupied(write_pos, read_pos);

        let to_read = dest.len().min(available);
        if to_read == 0 {
            return 0;
        }

        if read_pos + to_read <= self.capacity {
            dest[..to_read].copy_from_slice(&buf[read_pos..read_pos + to_read]);
        } else {
            let first_part = self.capacity - read_pos;
            dest[..first_part].copy_from_slice(&buf[read_pos..]);
            dest[first_part..to_read].copy_from_slice(&buf[..to_read - first_part]);
        }

        self.read_pos
            .store((read_pos + to_read) % self.capacity, Ordering::Release);

        to_read
    }

    /// Flush: reset both cursors. Stored frames are not erased.
    pub fn start(&self) {
        let _buf = self.buffer.lock();
        self.write_pos.store(0, Ordering::Release);
        self.read_pos.store(0, Ordering::Release);
    }

    /// Fill level (0.0 to 1.0 of the slot count)
    pub fn fill_percentage(&self) -> f32 {
        (self.used() as f32) / (self.capacity as f32)
    }

    /// Fill level in per mille of the slot count
    pub fn fill_permille(&self) -> usize {
        self.used() * 1000 / self.capacity
    }
}
