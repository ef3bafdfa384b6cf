//! DMA double-buffered streaming driver
//!
//! Each voice of the streaming pair loops over a sound RAM region split in
//! two halves. The hardware plays one half while software refills the other;
//! the half being played is derived from the voice's position register. When
//! the hardware crosses into the other half, the half it just left is
//! refilled from the fade/mix engine and the fill index flips.

use super::mixer::{Mixer, StreamFormat};
use super::{RingBuffer, StereoFrame};
use crate::aica::registers::{DMA_ALIGN_BYTES, STREAM_MAX_BYTES, STREAM_MIN_BYTES, STREAM_RAM_BASE};
use crate::aica::{ChannelCommand, CommandPort, SoundHardware, StereoMode, STREAM_CHANNEL};
use crate::{AicaError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Buffer halves per voice
pub const NUM_BUFFERS: usize = 2;

/// Largest half size in bytes for an init request of `samples`.
///
/// Rounded up to 16 samples, then clamped to the hardware bounds.
pub fn negotiate_max_bytes(samples: usize) -> usize {
    let samples = (samples + 15) & !15;
    (samples * 2).clamp(STREAM_MIN_BYTES, STREAM_MAX_BYTES)
}

/// Half size in bytes for a start request of `samples`.
///
/// Rounded up to the DMA boundary, then clamped to `[64, max_bytes]`.
pub fn negotiate_half_bytes(samples: usize, max_bytes: usize) -> usize {
    let bytes = (samples * 2 + DMA_ALIGN_BYTES - 1) & !(DMA_ALIGN_BYTES - 1);
    bytes.clamp(STREAM_MIN_BYTES, max_bytes.max(STREAM_MIN_BYTES))
}

#[derive(Debug)]
struct DriverState {
    /// Bytes per half per voice; 0 while stopped
    half_bytes: usize,
    /// Half software fills next
    cur_buffer: usize,
    /// Routing used for stereo content
    stereo_mode: StereoMode,
    /// Routing currently programmed
    programmed_mode: StereoMode,
    mix: Vec<StereoFrame>,
    left: Vec<i16>,
    right: Vec<i16>,
}

/// Streaming output driver
pub struct StreamDriver<H: SoundHardware> {
    port: Arc<CommandPort<H>>,
    /// Region base of each voice
    bases: [u32; 2],
    max_bytes: usize,
    state: Mutex<DriverState>,
}

impl<H: SoundHardware> StreamDriver<H> {
    /// Load the firmware and reserve both voices' double buffers.
    ///
    /// # Errors
    ///
    /// Returns [`AicaError::HardwareInit`] if the firmware image is empty or
    /// rejected, or if sound RAM cannot hold both voices' buffers.
    pub fn init(port: Arc<CommandPort<H>>, firmware: &[u8], samples: usize) -> Result<Self> {
        if firmware.is_empty() {
            return Err(AicaError::HardwareInit("no firmware image".into()));
        }
        let max_bytes = negotiate_max_bytes(samples);
        let region = (max_bytes * NUM_BUFFERS) as u32;
        let bases = [STREAM_RAM_BASE, STREAM_RAM_BASE + region];

        {
            let mut hw = port.lock();
            let needed = (bases[1] + region) as usize;
            if firmware.len() > STREAM_RAM_BASE as usize || needed > hw.ram_size() {
                return Err(AicaError::HardwareInit(format!(
                    "sound RAM of {} bytes cannot hold firmware ({} bytes) and buffers up to {:#x}",
                    hw.ram_size(),
                    firmware.len(),
                    needed
                )));
            }
            hw.upload_firmware(firmware)?;
        }
        debug!(max_bytes, "stream buffers reserved (2 x {} bytes per voice)", region);

        let max_samples = max_bytes / 2;
        Ok(StreamDriver {
            port,
            bases,
            max_bytes,
            state: Mutex::new(DriverState {
                half_bytes: 0,
                cur_buffer: 0,
                stereo_mode: StereoMode::Stereo,
                programmed_mode: StereoMode::Stereo,
                mix: vec![StereoFrame::SILENCE; max_samples],
                left: vec![0; max_samples],
                right: vec![0; max_samples],
            }),
        })
    }

    /// Negotiated maximum half size in bytes
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Current half size in bytes (0 while stopped)
    pub fn half_bytes(&self) -> usize {
        self.state.lock().half_bytes
    }

    /// Whether the stream is running
    pub fn is_running(&self) -> bool {
        self.half_bytes() != 0
    }

    /// Sound RAM address of each voice's buffer
    pub fn addresses(&self) -> [u32; 2] {
        self.bases
    }

    /// Start streaming: prefill both halves, then key the voice pair on
    /// looping over them, beginning with half 0.
    ///
    /// # Errors
    ///
    /// Returns an error if a prefill transfer fails.
    pub fn start(
        &self,
        mixer: &Mixer,
        ring: &RingBuffer,
        samples: usize,
        volume: u8,
        stereo_mode: StereoMode,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let half_bytes = negotiate_half_bytes(samples, self.max_bytes);
        state.half_bytes = half_bytes;
        state.stereo_mode = stereo_mode;

        for half in 0..NUM_BUFFERS {
            state.cur_buffer = half;
            self.fill(&mut state, mixer, ring)?;
        }
        state.cur_buffer = 0;

        // prefill may already have switched to a queued format
        let format = mixer.current_format();
        let mode = routing(format, stereo_mode);
        state.programmed_mode = mode;
        drop(state);

        self.port.issue(STREAM_CHANNEL, ChannelCommand::Stereo(mode));
        self.port.issue(
            STREAM_CHANNEL,
            ChannelCommand::Start {
                frequency: format.sample_rate,
                // both halves, in samples
                length: (half_bytes * NUM_BUFFERS / 2) as u32,
                volume,
                addresses: self.bases,
            },
        );
        info!(
            half_samples = half_bytes / 2,
            rate = format.sample_rate,
            stereo = format.stereo,
            "stream started"
        );
        Ok(())
    }

    /// Key the voice pair off.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if state.half_bytes == 0 {
            return;
        }
        state.half_bytes = 0;
        drop(state);
        self.port.issue(STREAM_CHANNEL, ChannelCommand::Stop);
        info!("stream stopped");
    }

    /// Refill the half the hardware has left, if it has moved on.
    ///
    /// Returns the number of frames taken from the ring buffer, or `None`
    /// when no refill was due.
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer into sound RAM fails.
    pub fn poll(&self, mixer: &Mixer, ring: &RingBuffer) -> Result<Option<usize>> {
        let mut state = self.state.lock();
        if state.half_bytes == 0 {
            return Ok(None);
        }

        let half_samples = (state.half_bytes / 2) as u32;
        let position = self.port.position(STREAM_CHANNEL);
        let real_buffer = (position / half_samples) as usize % NUM_BUFFERS;
        if real_buffer == state.cur_buffer {
            return Ok(None);
        }

        let read = self.fill(&mut state, mixer, ring)?;
        state.cur_buffer = (state.cur_buffer + 1) % NUM_BUFFERS;
        Ok(Some(read))
    }

    /// Pull one half from the mixer and DMA it into the current fill half.
    /// Applies any format change the mixer reports before loading.
    fn fill(&self, state: &mut DriverState, mixer: &Mixer, ring: &RingBuffer) -> Result<usize> {
        let samples = state.half_bytes / 2;
        let report = mixer.pull(ring, &mut state.mix[..samples]);
        if let Some(format) = report.format_change {
            self.apply_format(state, format);
        }

        let DriverState {
            mix,
            left,
            right,
            cur_buffer,
            half_bytes,
            ..
        } = state;
        for ((frame, l), r) in mix[..samples]
            .iter()
            .zip(left.iter_mut())
            .zip(right.iter_mut())
        {
            *l = frame.left;
            *r = frame.right;
        }

        let offset = (*half_bytes * *cur_buffer) as u32;
        self.port.load_pair(
            [self.bases[0] + offset, self.bases[1] + offset],
            &left[..samples],
            &right[..samples],
        )?;
        Ok(report.frames_read)
    }

    fn apply_format(&self, state: &mut DriverState, format: StreamFormat) {
        info!(
            rate = format.sample_rate,
            stereo = format.stereo,
            "switching stream format"
        );
        self.port.issue(STREAM_CHANNEL, ChannelCommand::Frequency(format.sample_rate));
        let mode = routing(format, state.stereo_mode);
        if mode != state.programmed_mode {
            state.programmed_mode = mode;
            self.port.issue(STREAM_CHANNEL, ChannelCommand::Stereo(mode));
        }
    }

    /// Change the voice pair's volume (0-255)
    pub fn set_volume(&self, volume: u8) {
        self.port.issue(STREAM_CHANNEL, ChannelCommand::Volume(volume));
    }

    /// Change the voice pair's playback rate
    pub fn set_frequency(&self, frequency: u32) {
        self.port.issue(STREAM_CHANNEL, ChannelCommand::Frequency(frequency));
    }

    /// Change the routing used for stereo content
    pub fn set_stereo_mode(&self, mode: StereoMode) {
        let mut state = self.state.lock();
        state.stereo_mode = mode;
        if state.programmed_mode == StereoMode::Mono && state.half_bytes != 0 {
            // mono content stays centred until the next stereo track
            return;
        }
        state.programmed_mode = mode;
        drop(state);
        self.port.issue(STREAM_CHANNEL, ChannelCommand::Stereo(mode));
    }

    /// Routing currently programmed into the hardware
    pub fn programmed_mode(&self) -> StereoMode {
        self.state.lock().programmed_mode
    }
}

/// Mono content is always centred; stereo content follows `mode`.
fn routing(format: StreamFormat, mode: StereoMode) -> StereoMode {
    if format.stereo {
        mode
    } else {
        StereoMode::Mono
    }
}

/// Streaming thread polling the driver at a fixed cadence
pub struct StreamThread {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StreamThread {
    /// Spawn the polling loop
    ///
    /// # Errors
    ///
    /// Returns [`AicaError::Io`] if the thread cannot be spawned.
    pub fn spawn<H: SoundHardware + 'static>(
        driver: Arc<StreamDriver<H>>,
        mixer: Arc<Mixer>,
        ring: Arc<RingBuffer>,
        interval: Duration,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = std::thread::Builder::new()
            .name("aica-stream".into())
            .spawn(move || {
                debug!("streaming thread running");
                while flag.load(Ordering::Acquire) {
                    if let Err(e) = driver.poll(&mixer, &ring) {
                        error!("stream refill failed: {e}");
                    }
                    std::thread::sleep(interval);
                }
                debug!("streaming thread exiting");
            })?;
        Ok(StreamThread {
            running,
            handle: Some(handle),
        })
    }

    /// Stop polling and join the thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("streaming thread panicked");
            }
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aica::SimulatedAica;
    use crate::config::SchedulerConfig;
    use crate::player::PriorityScheduler;

    const CD: StreamFormat = StreamFormat {
        sample_rate: 44_100,
        stereo: true,
    };

    struct Rig {
        port: Arc<CommandPort<SimulatedAica>>,
        driver: StreamDriver<SimulatedAica>,
        mixer: Mixer,
        ring: RingBuffer,
    }

    fn rig() -> Rig {
        let port = Arc::new(CommandPort::new(SimulatedAica::manual().with_capture(1 << 20)));
        let driver =
            StreamDriver::init(Arc::clone(&port), SimulatedAica::FIRMWARE, 1 << 14).unwrap();
        let scheduler = Arc::new(PriorityScheduler::new(SchedulerConfig::default()));
        let mixer = Mixer::new(CD, scheduler);
        // run a 1 ms fade-in to completion so samples pass through untouched
        let empty = RingBuffer::new(2).unwrap();
        mixer.begin_track(&empty, CD, true);
        mixer.fade(1);
        mixer.pull(&empty, &mut [StereoFrame::SILENCE; 64]);
        assert_eq!(mixer.fade_state().1, 0);
        Rig {
            port,
            driver,
            mixer,
            ring: RingBuffer::new(1 << 16).unwrap(),
        }
    }

    #[test]
    fn test_size_negotiation() {
        assert_eq!(negotiate_max_bytes(1 << 14), 1 << 15);
        assert_eq!(negotiate_max_bytes(1), 64);
        assert_eq!(negotiate_max_bytes(1 << 20), STREAM_MAX_BYTES);
        assert_eq!(negotiate_max_bytes(1000), 2016);

        assert_eq!(negotiate_half_bytes(1200, 1 << 15), 2400);
        assert_eq!(negotiate_half_bytes(1201, 1 << 15), 2432);
        assert_eq!(negotiate_half_bytes(3, 1 << 15), 64);
        assert_eq!(negotiate_half_bytes(1 << 16, 1 << 15), 1 << 15);
    }

    #[test]
    fn test_largest_buffers_play_every_frame() {
        let rig = rig();
        let ramp: Vec<StereoFrame> = (0..65_535u32)
            .map(|i| StereoFrame::new(i as u16 as i16, 0))
            .collect();
        assert_eq!(rig.ring.write(&ramp), ramp.len());
        rig.driver
            .start(&rig.mixer, &rig.ring, 1 << 16, 255, StereoMode::Stereo)
            .unwrap();
        assert_eq!(rig.driver.half_bytes(), STREAM_MAX_BYTES);

        let half_samples = STREAM_MAX_BYTES / 2;
        assert_eq!(
            rig.port.lock().channel(0).loop_end as usize,
            NUM_BUFFERS * half_samples
        );

        for _ in 0..3 {
            rig.port.lock().advance(half_samples);
            assert!(rig.driver.poll(&rig.mixer, &rig.ring).unwrap().is_some());
        }

        let hw = rig.port.lock();
        let played = hw.captured();
        assert_eq!(played.len(), 3 * half_samples);
        let skipped = played
            .iter()
            .enumerate()
            .find(|(i, f)| f.left as u16 as usize != *i);
        assert_eq!(skipped, None);
    }

    #[test]
    fn test_init_rejects_missing_firmware() {
        let port = Arc::new(CommandPort::new(SimulatedAica::manual()));
        let result = StreamDriver::init(port, &[], 1024);
        assert!(matches!(result, Err(AicaError::HardwareInit(_))));
    }

    #[test]
    fn test_start_prefills_and_keys_on() {
        let rig = rig();
        let ramp: Vec<StereoFrame> = (0..128).map(|i| StereoFrame::new(i, -i)).collect();
        rig.ring.write(&ramp);
        rig.driver
            .start(&rig.mixer, &rig.ring, 64, 200, StereoMode::Stereo)
            .unwrap();
        assert!(rig.driver.is_running());

        let hw = rig.port.lock();
        assert_eq!(
            hw.command_log().last(),
            Some(&ChannelCommand::Start {
                frequency: 44_100,
                length: 128,
                volume: 200,
                addresses: rig.driver.addresses(),
            })
        );
        let [left, right] = rig.driver.addresses();
        let prefilled_left = hw.read_ram(left, 128);
        let prefilled_right = hw.read_ram(right, 128);
        assert_eq!(prefilled_left[..], (0..128).collect::<Vec<i16>>()[..]);
        assert_eq!(prefilled_right[127], -127);
    }

    #[test]
    fn test_poll_refills_left_half() {
        let rig = rig();
        rig.driver
            .start(&rig.mixer, &rig.ring, 64, 255, StereoMode::Stereo)
            .unwrap();
        rig.ring.write(&vec![StereoFrame::mono(42); 64]);

        // still on half 0
        rig.port.lock().advance(10);
        assert_eq!(rig.driver.poll(&rig.mixer, &rig.ring).unwrap(), None);

        // crossed into half 1: half 0 is refilled
        rig.port.lock().advance(60);
        assert_eq!(rig.driver.poll(&rig.mixer, &rig.ring).unwrap(), Some(64));
        let left = rig.driver.addresses()[0];
        assert_eq!(rig.port.lock().read_ram(left, 64), vec![42; 64]);
        assert_eq!(rig.driver.poll(&rig.mixer, &rig.ring).unwrap(), None);

        // wrapped back to half 0: half 1 is refilled (underrun, silent)
        rig.port.lock().advance(64);
        assert_eq!(rig.driver.poll(&rig.mixer, &rig.ring).unwrap(), Some(0));
    }

    #[test]
    fn test_commands_and_routing() {
        let rig = rig();
        rig.driver
            .start(&rig.mixer, &rig.ring, 64, 255, StereoMode::InvertStereo)
            .unwrap();
        assert_eq!(rig.driver.programmed_mode(), StereoMode::InvertStereo);
        rig.driver.set_volume(10);
        rig.driver.set_frequency(32_000);
        rig.driver.stop();
        rig.driver.stop();

        let hw = rig.port.lock();
        let log = hw.command_log();
        assert_eq!(
            &log[log.len() - 3..],
            &[
                ChannelCommand::Volume(10),
                ChannelCommand::Frequency(32_000),
                ChannelCommand::Stop
            ]
        );
        assert!(!rig.driver.is_running());
    }

    #[test]
    fn test_mono_format_centres_voices() {
        let rig = rig();
        rig.driver
            .start(&rig.mixer, &rig.ring, 64, 255, StereoMode::Stereo)
            .unwrap();
        rig.mixer.request_format(StreamFormat {
            sample_rate: 22_050,
            stereo: false,
        });
        rig.port.lock().advance(64);
        rig.driver.poll(&rig.mixer, &rig.ring).unwrap();

        assert_eq!(rig.driver.programmed_mode(), StereoMode::Mono);
        let hw = rig.port.lock();
        assert_eq!(hw.channel(0).pan, 0x00);
        assert!(hw
            .command_log()
            .contains(&ChannelCommand::Frequency(22_050)));
    }
}
