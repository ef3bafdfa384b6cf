//! Player controller
//!
//! Owns the decoder thread and exposes the playback control surface. The
//! decoder thread runs a small state machine:
//!
//! ```text
//! INIT -> READY -> STARTING -> PLAYING -> STOPPING -> READY -> ... -> QUIT -> ZOMBIE
//! ```
//!
//! In READY it blocks on a semaphore until `start` (or `shutdown`) posts it.
//! In PLAYING it calls the active decoder whenever the ring buffer has room
//! and rests between calls for as long as the priority scheduler allows.

use super::decoder::{default_title, DecodeStatus, DecoderRegistry, InfoFields, TrackInfo};
use super::scheduler::{PriorityHook, PriorityLevel, PriorityScheduler};
use super::session::{PlaybackSession, SessionSnapshot};
use super::status::PlayerStatus;
use crate::aica::{CommandPort, SoundHardware, StereoMode};
use crate::config::PlayerConfig;
use crate::streaming::{Mixer, RingBuffer, StreamDriver, StreamFormat, StreamThread};
use crate::{AicaError, Result};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Counting semaphore the decoder thread idles on
struct Semaphore {
    count: Mutex<usize>,
    cond: Condvar,
}

impl Semaphore {
    fn new() -> Self {
        Semaphore {
            count: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    fn post(&self) {
        *self.count.lock() += 1;
        self.cond.notify_one();
    }

    fn wait(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.cond.wait(&mut count);
        }
        *count -= 1;
    }
}

struct Core {
    registry: DecoderRegistry,
    session: PlaybackSession,
}

/// State shared with the decoder thread
struct Shared<H: SoundHardware> {
    config: PlayerConfig,
    ring: Arc<RingBuffer>,
    mixer: Arc<Mixer>,
    scheduler: Arc<PriorityScheduler>,
    driver: Arc<StreamDriver<H>>,
    core: Mutex<Core>,
    status: Mutex<PlayerStatus>,
    status_changed: Condvar,
    wake: Semaphore,
    volume: AtomicU8,
    hook: Mutex<Option<Arc<dyn PriorityHook>>>,
}

impl<H: SoundHardware> Shared<H> {
    fn status(&self) -> PlayerStatus {
        *self.status.lock()
    }

    fn set_status(&self, new: PlayerStatus) {
        let mut status = self.status.lock();
        if *status != new {
            debug!("player status {} -> {}", *status, new);
            *status = new;
        }
        self.status_changed.notify_all();
    }

    /// Move from `from` to `to`; does nothing if another thread moved first.
    fn transition(&self, from: PlayerStatus, to: PlayerStatus) -> bool {
        let mut status = self.status.lock();
        if *status != from {
            return false;
        }
        debug!("player status {} -> {}", from, to);
        *status = to;
        self.status_changed.notify_all();
        true
    }

    /// Ask a playing thread to stop. Returns whether a stop is in progress.
    fn request_stop(&self) -> bool {
        let mut status = self.status.lock();
        match *status {
            PlayerStatus::Playing | PlayerStatus::Starting => {
                debug!("player status {} -> STOPPING", *status);
                *status = PlayerStatus::Stopping;
                self.status_changed.notify_all();
                true
            }
            PlayerStatus::Stopping => true,
            _ => false,
        }
    }

    /// Block until the decoder thread reaches `target`.
    fn wait_status(&self, target: PlayerStatus) -> Result<()> {
        let timeout = self.config.state_timeout();
        let log_every = self.config.state_log_interval();
        let begin = Instant::now();
        let mut next_log = log_every;

        let mut status = self.status.lock();
        while *status != target {
            if *status == PlayerStatus::Zombie {
                return Err(AicaError::NotRunning);
            }
            let elapsed = begin.elapsed();
            if elapsed >= timeout {
                return Err(AicaError::StateTimeout {
                    expected: target,
                    current: *status,
                    waited_ms: elapsed.as_millis() as u64,
                });
            }
            if elapsed >= next_log {
                warn!("player [{}] waiting [{}]", *status, target);
                next_log += log_every;
            }
            let slice = (timeout - elapsed).min(next_log.saturating_sub(elapsed));
            self.status_changed.wait_for(&mut status, slice);
        }
        Ok(())
    }
}

/// Streaming player: the control surface over the decoder and streaming
/// threads.
///
/// All methods take `&self`; the player can be shared behind an [`Arc`].
/// Dropping it performs [`Player::shutdown`].
pub struct Player<H: SoundHardware + 'static> {
    shared: Arc<Shared<H>>,
    port: Arc<CommandPort<H>>,
    /// Serializes start/stop/shutdown
    control: Mutex<()>,
    decode_thread: Mutex<Option<JoinHandle<()>>>,
    stream_thread: Mutex<Option<StreamThread>>,
}

impl<H: SoundHardware + 'static> Player<H> {
    /// Bring up the coprocessor, start the stream (silent) and the decoder
    /// thread, and wait until the decoder thread is idle.
    ///
    /// # Errors
    ///
    /// - [`AicaError::Config`] for an invalid configuration
    /// - [`AicaError::HardwareInit`] if the firmware is missing or sound RAM
    ///   is too small; no player exists afterwards
    /// - [`AicaError::StateTimeout`] if the decoder thread never gets ready
    pub fn init(
        hardware: H,
        firmware: &[u8],
        config: PlayerConfig,
        registry: DecoderRegistry,
    ) -> Result<Self> {
        config.validate()?;

        let port = Arc::new(CommandPort::new(hardware));
        let driver = Arc::new(StreamDriver::init(
            Arc::clone(&port),
            firmware,
            config.stream.max_samples,
        )?);
        let ring = Arc::new(RingBuffer::new(config.ring_capacity)?);
        let scheduler = Arc::new(PriorityScheduler::new(config.scheduler));
        let mixer = Arc::new(Mixer::new(
            StreamFormat {
                sample_rate: config.stream.sample_rate,
                stereo: true,
            },
            Arc::clone(&scheduler),
        ));

        driver.start(
            &mixer,
            &ring,
            config.stream.half_samples,
            config.volume,
            config.stream.stereo_mode,
        )?;

        let stream_thread = if config.stream.threaded {
            Some(StreamThread::spawn(
                Arc::clone(&driver),
                Arc::clone(&mixer),
                Arc::clone(&ring),
                config.stream.poll_interval(),
            )?)
        } else {
            None
        };

        let shared = Arc::new(Shared {
            config,
            ring,
            mixer,
            scheduler,
            driver,
            core: Mutex::new(Core {
                registry,
                session: PlaybackSession::default(),
            }),
            status: Mutex::new(PlayerStatus::Init),
            status_changed: Condvar::new(),
            wake: Semaphore::new(),
            volume: AtomicU8::new(config.volume),
            hook: Mutex::new(None),
        });

        let thread_shared = Arc::clone(&shared);
        let decode_thread = std::thread::Builder::new()
            .name("aica-decoder".into())
            .spawn(move || decode_loop(thread_shared))?;

        let player = Player {
            shared,
            port,
            control: Mutex::new(()),
            decode_thread: Mutex::new(Some(decode_thread)),
            stream_thread: Mutex::new(stream_thread),
        };
        // on failure, dropping the player tears the threads down again
        player.shared.wait_status(PlayerStatus::Ready)?;
        info!(
            ring = config.ring_capacity,
            decoders = ?player.shared.core.lock().registry.names(),
            "player ready"
        );
        Ok(player)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shared.status().is_terminal() {
            return Err(AicaError::NotRunning);
        }
        Ok(())
    }

    /// Play `path` (track index `track`).
    ///
    /// With `immediate` the ring buffer is flushed and the track fades in
    /// at once. Otherwise it is queued gaplessly behind the frames of the
    /// previous track still buffered, and its sample rate takes effect when
    /// those frames have played. A paused player always starts immediately.
    ///
    /// # Errors
    ///
    /// - [`AicaError::NoDriverFound`] if no decoder claims the file (nothing
    ///   changes in that case)
    /// - [`AicaError::Decode`] if the decoder cannot start the track
    /// - [`AicaError::NotRunning`] after shutdown
    pub fn start(&self, path: &str, track: u32, immediate: bool) -> Result<()> {
        let _control = self.control.lock();
        self.ensure_running()?;

        if !self.shared.core.lock().registry.has_candidate(path) {
            warn!(path, "no decoder for this file");
            return Err(AicaError::NoDriverFound(path.to_string()));
        }

        let immediate = immediate || self.shared.mixer.is_paused();
        self.stop_locked(immediate)?;

        let mut core = self.shared.core.lock();
        let mut info = TrackInfo::default();
        let index = core.registry.start(path, track, &mut info).map_err(|e| {
            error!(path, "decoder start failed: {e}");
            e
        })?;

        info.update = InfoFields::all();
        if info.title.is_none() {
            info.title = Some(default_title(path));
        }
        let format = info
            .stream_format()
            .unwrap_or_else(|| self.shared.mixer.current_format());
        let name = core.registry.name(index).unwrap_or_default().to_string();
        core.session = PlaybackSession::new(path, track, index, &name, info);
        self.shared
            .mixer
            .begin_track(&self.shared.ring, format, immediate);
        drop(core);

        info!(
            path,
            track,
            decoder = %name,
            rate = format.sample_rate,
            immediate,
            "starting track"
        );
        self.shared.set_status(PlayerStatus::Starting);
        self.shared.wake.post();
        Ok(())
    }

    /// Stop the current track. With `flush` (or while paused) buffered
    /// frames are discarded and the fade ramp drops to silence.
    ///
    /// # Errors
    ///
    /// Returns [`AicaError::StateTimeout`] if the decoder thread does not
    /// return to READY in time, [`AicaError::NotRunning`] after shutdown.
    pub fn stop(&self, flush: bool) -> Result<()> {
        let _control = self.control.lock();
        self.ensure_running()?;
        self.stop_locked(flush)
    }

    fn stop_locked(&self, flush: bool) -> Result<()> {
        if self.shared.request_stop() {
            self.shared.wait_status(PlayerStatus::Ready)?;
        }
        if flush || self.shared.mixer.is_paused() {
            debug!("flushing ring buffer");
            self.shared.ring.start();
            self.shared.mixer.reset();
        }
        Ok(())
    }

    /// Pause (1024 ms fade-out, then no frames consumed) or resume
    /// (1024 ms fade-in). Returns the previous pause flag.
    pub fn pause(&self, paused: bool) -> bool {
        let old = self.shared.mixer.set_paused(paused);
        if old != paused {
            info!(paused, "pause toggled");
        }
        old
    }

    /// Set the linear volume (0-255). Returns the previous volume.
    pub fn volume(&self, volume: u8) -> u8 {
        let old = self.shared.volume.swap(volume, Ordering::AcqRel);
        self.shared.driver.set_volume(volume);
        old
    }

    /// Current linear volume
    pub fn current_volume(&self) -> u8 {
        self.shared.volume.load(Ordering::Acquire)
    }

    /// Start a fade: `ms > 0` fades in, `ms < 0` fades out, 0 only queries.
    /// Returns the duration of the previous episode (0 if none was running).
    pub fn fade(&self, ms: i32) -> i32 {
        let old = self.shared.mixer.fade(ms);
        if ms != 0 {
            debug!(ms, "fade started");
        }
        old
    }

    /// Milliseconds of the current track played so far
    pub fn playtime(&self) -> u64 {
        self.shared.mixer.playtime_ms()
    }

    /// Decoder thread state
    pub fn status(&self) -> PlayerStatus {
        self.shared.status()
    }

    /// Whether a track is playing
    pub fn is_playing(&self) -> bool {
        self.status() == PlayerStatus::Playing
    }

    /// Whether playback is paused
    pub fn is_paused(&self) -> bool {
        self.shared.mixer.is_paused()
    }

    /// Ask a decoder to describe `path`, or the current track when `None`.
    ///
    /// # Errors
    ///
    /// - [`AicaError::NoDriverFound`] if no decoder is active or claims `path`
    /// - [`AicaError::Decode`] if the decoder fails
    pub fn info(&self, path: Option<&str>) -> Result<TrackInfo> {
        let mut core = self.shared.core.lock();
        let core = &mut *core;
        let mut info = TrackInfo::default();
        match path {
            Some(p) => {
                core.registry.describe(p, &mut info)?;
                if info.title.is_none() {
                    info.title = Some(default_title(p));
                }
            }
            None => {
                let decoder = core
                    .session
                    .decoder
                    .and_then(|i| core.registry.get_mut(i))
                    .ok_or_else(|| AicaError::NoDriverFound("<no track>".to_string()))?;
                decoder.info(&mut info, None)?;
                let mut merged = core.session.info.clone();
                merged.merge(&info);
                info = merged;
            }
        }
        Ok(info)
    }

    /// Snapshot of the session and streaming state
    pub fn session(&self) -> SessionSnapshot {
        let status = self.shared.status();
        let core = self.shared.core.lock();
        let mixer = &self.shared.mixer;
        let (fade_value, fade_ms) = mixer.fade_state();
        SessionSnapshot {
            status,
            path: core.session.path.clone(),
            track: core.session.track,
            decoder: core.session.decoder_name.clone(),
            info: core.session.info.clone(),
            format: mixer.current_format(),
            volume: self.current_volume(),
            paused: mixer.is_paused(),
            fade_value,
            fade_ms,
            played: mixer.played(),
            gapless_remaining: mixer.gapless_remaining(),
            queued_tracks: mixer.queued_boundaries(),
            buffered: self.shared.ring.used(),
        }
    }

    /// Route stereo content (mono content stays centred)
    pub fn set_stereo_mode(&self, mode: StereoMode) {
        self.shared.driver.set_stereo_mode(mode);
    }

    /// Install a hook receiving decoder priority changes
    pub fn set_priority_hook(&self, hook: Arc<dyn PriorityHook>) {
        *self.shared.hook.lock() = Some(hook);
    }

    /// Decoder priority currently published by the scheduler
    pub fn priority(&self) -> PriorityLevel {
        self.shared.scheduler.level()
    }

    /// Refill the hardware buffer if due. Only needed when the streaming
    /// thread is disabled (`StreamConfig::threaded == false`).
    ///
    /// # Errors
    ///
    /// Returns an error if the sound RAM transfer fails.
    pub fn poll_stream(&self) -> Result<Option<usize>> {
        self.shared.driver.poll(&self.shared.mixer, &self.shared.ring)
    }

    /// Ring buffer between the decoder and the stream
    pub fn ring(&self) -> &RingBuffer {
        &self.shared.ring
    }

    /// Active configuration
    pub fn config(&self) -> &PlayerConfig {
        &self.shared.config
    }

    /// Exclusive access to the hardware
    pub fn hardware(&self) -> MutexGuard<'_, H> {
        self.port.lock()
    }

    /// Block until the decoder thread reaches `status`, within the
    /// configured state timeout.
    ///
    /// # Errors
    ///
    /// Returns [`AicaError::StateTimeout`] on expiry.
    pub fn wait_for_status(&self, status: PlayerStatus) -> Result<()> {
        self.shared.wait_status(status)
    }

    /// Stop playback, end the decoder thread and the stream.
    ///
    /// Safe to call more than once.
    ///
    /// # Errors
    ///
    /// Returns [`AicaError::StateTimeout`] if the decoder thread does not
    /// exit in time.
    pub fn shutdown(&self) -> Result<()> {
        let _control = self.control.lock();
        let mut decode_thread = self.decode_thread.lock();
        if decode_thread.is_none() {
            return Ok(());
        }
        info!("shutting down player");

        if let Err(e) = self.stop_locked(true) {
            warn!("stop during shutdown failed: {e}");
        }
        self.shared.set_status(PlayerStatus::Quit);
        self.shared.wake.post();
        let result = self.shared.wait_status(PlayerStatus::Zombie);

        match result {
            Ok(()) => {
                if let Some(handle) = decode_thread.take() {
                    if handle.join().is_err() {
                        warn!("decoder thread panicked");
                    }
                }
            }
            Err(ref e) => {
                warn!("decoder thread did not exit: {e}");
                decode_thread.take();
            }
        }

        if let Some(mut thread) = self.stream_thread.lock().take() {
            thread.stop();
        }
        self.shared.driver.stop();
        result
    }
}

impl<H: SoundHardware + 'static> Drop for Player<H> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("player shutdown failed: {e}");
        }
    }
}

fn decode_loop<H: SoundHardware>(shared: Arc<Shared<H>>) {
    debug!("decoder thread running");
    let mut applied_level: Option<PriorityLevel> = None;

    loop {
        match shared.status() {
            PlayerStatus::Init => {
                shared.transition(PlayerStatus::Init, PlayerStatus::Ready);
            }
            PlayerStatus::Ready => shared.wake.wait(),
            PlayerStatus::Starting => {
                shared.transition(PlayerStatus::Starting, PlayerStatus::Playing);
            }
            PlayerStatus::Reinit => {
                shared.transition(PlayerStatus::Reinit, PlayerStatus::Ready);
            }
            PlayerStatus::Playing => decode_step(&shared, &mut applied_level),
            PlayerStatus::Stopping => {
                release_decoder(&shared);
                shared.transition(PlayerStatus::Stopping, PlayerStatus::Ready);
            }
            PlayerStatus::Quit | PlayerStatus::Zombie => break,
        }
    }

    release_decoder(&shared);
    shared.set_status(PlayerStatus::Zombie);
    debug!("decoder thread exiting");
}

fn release_decoder<H: SoundHardware>(shared: &Shared<H>) {
    let mut core = shared.core.lock();
    let core = &mut *core;
    if let Some(decoder) = core.session.decoder.and_then(|i| core.registry.get_mut(i)) {
        decoder.stop();
    }
    core.session.clear();
}

/// One PLAYING iteration
fn decode_step<H: SoundHardware>(shared: &Shared<H>, applied_level: &mut Option<PriorityLevel>) {
    let level = shared.scheduler.level();
    if *applied_level != Some(level) {
        debug!(?level, "decoder priority changed");
        if let Some(hook) = shared.hook.lock().as_ref() {
            hook.apply(level);
        }
        *applied_level = Some(level);
    }

    let mut guard = shared.core.lock();
    let core = &mut *guard;
    let Some(index) = core.session.decoder else {
        drop(guard);
        error!("no decoder attached while playing");
        shared.transition(PlayerStatus::Playing, PlayerStatus::Stopping);
        return;
    };

    let status = if shared.ring.is_full() {
        // backpressure: let the stream drain
        DecodeStatus::empty()
    } else {
        let mut info = TrackInfo::default();
        let status = match core.registry.get_mut(index) {
            Some(decoder) => decoder.decode(&shared.ring, &mut info),
            None => DecodeStatus::ERROR,
        };
        if status.contains(DecodeStatus::INFO_CHANGED) {
            let before = core.session.info.stream_format();
            core.session.info.merge(&info);
            let after = core.session.info.stream_format();
            if let Some(format) = after.filter(|f| Some(*f) != before) {
                info!(
                    rate = format.sample_rate,
                    stereo = format.stereo,
                    "decoder changed stream format"
                );
                shared.mixer.request_format(format);
            }
        }
        status
    };

    if status.contains(DecodeStatus::ERROR) {
        error!(
            decoder = core.session.decoder_name.as_deref().unwrap_or_default(),
            "decoder error, stopping track"
        );
    }
    drop(guard);

    if status.intersects(DecodeStatus::END | DecodeStatus::ERROR) {
        if !status.contains(DecodeStatus::ERROR) {
            debug!("track decoded to the end");
        }
        shared.transition(PlayerStatus::Playing, PlayerStatus::Stopping);
        return;
    }

    if !status.contains(DecodeStatus::CONTINUE) {
        match level.idle_sleep(shared.config.idle_sleep()) {
            Some(rest) => std::thread::sleep(rest),
            None => std::thread::yield_now(),
        }
    }
}
