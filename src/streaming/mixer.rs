//! Fade/mix engine
//!
//! Sits between the ring buffer and the streaming driver. Each pull reads
//! one buffer half from the ring, tracks the gapless boundaries and the
//! played count, fills underruns with a decaying tail and applies the fade
//! ramp.
//!
//! Every non-immediate start queues a boundary at the ring position where
//! the new track's first frame will be read. Several boundaries can be
//! queued at once when starts are chained faster than the tail drains.

use super::fade::{decay_fill, FadeEngine, PAUSE_FADE_MS};
use super::{RingBuffer, StereoFrame};
use crate::player::PriorityScheduler;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Output format of the streaming voice pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    /// Playback rate in Hz
    pub sample_rate: u32,
    /// Distinct left/right content (mono content is centred)
    pub stereo: bool,
}

/// Outcome of one pull
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PullReport {
    /// Frames taken from the ring buffer (the rest was decay fill)
    pub frames_read: usize,
    /// Format the hardware must switch to before this buffer plays
    pub format_change: Option<StreamFormat>,
}

/// Start of a queued track in ring read order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Boundary {
    /// Value of `MixState::consumed` when the track's first frame is read
    at: u64,
    format: StreamFormat,
}

#[derive(Debug)]
struct MixState {
    fade: FadeEngine,
    /// Frames read from the ring since the last flush
    consumed: u64,
    /// Queued track starts, oldest first
    boundaries: VecDeque<Boundary>,
    /// Played count is held at 0 until the next boundary is crossed
    held: bool,
    /// Frames of the current track handed to the hardware
    played: u64,
    current: StreamFormat,
    /// Change for the track already playing, applied on the next pull
    pending: Option<StreamFormat>,
    paused: bool,
    last_frame: StereoFrame,
}

/// Fade/mix engine shared by the streaming thread and the control surface
pub struct Mixer {
    state: Mutex<MixState>,
    scheduler: Arc<PriorityScheduler>,
}

impl Mixer {
    /// Create a silent mixer running at `format`
    pub fn new(format: StreamFormat, scheduler: Arc<PriorityScheduler>) -> Self {
        Mixer {
            state: Mutex::new(MixState {
                fade: FadeEngine::new(),
                consumed: 0,
                boundaries: VecDeque::new(),
                held: false,
                played: 0,
                current: format,
                pending: None,
                paused: false,
                last_frame: StereoFrame::SILENCE,
            }),
            scheduler,
        }
    }

    /// Fill `out` for the hardware.
    ///
    /// Lock order is mixer then ring buffer; no hardware access happens here.
    pub fn pull(&self, ring: &RingBuffer, out: &mut [StereoFrame]) -> PullReport {
        let mut state = self.state.lock();
        let mut report = PullReport::default();

        let n = if state.paused && state.fade.value() == 0 {
            0
        } else {
            self.scheduler.update(ring.used(), ring.size());
            ring.read(out)
        };
        report.frames_read = n;

        let before = state.current;
        if let Some(format) = state.pending.take() {
            state.current = format;
        }
        state.consumed += n as u64;
        let mut crossed = None;
        while let Some(boundary) = state.boundaries.front().copied() {
            if boundary.at > state.consumed {
                break;
            }
            state.boundaries.pop_front();
            state.current = boundary.format;
            crossed = Some(boundary);
        }
        match crossed {
            Some(boundary) => {
                let overshoot = state.consumed - boundary.at;
                debug!(overshoot, rate = boundary.format.sample_rate, "gapless boundary reached");
                state.held = false;
                state.played = overshoot;
            }
            None if !state.held => state.played += n as u64,
            None => {}
        }
        if state.current != before {
            report.format_change = Some(state.current);
        }

        if n > 0 {
            state.last_frame = out[n - 1];
        }
        let last = state.last_frame;
        state.last_frame = decay_fill(&mut out[n..], last);

        let rate = state.current.sample_rate;
        state.fade.apply(out, rate);
        report
    }

    /// Set up a new track.
    ///
    /// Non-immediate starts queue a boundary after the frames still held in
    /// `ring` and defer `format` until it is crossed; the played count stays
    /// 0 until then. Earlier boundaries stay queued. A silent ramp gets a
    /// short fade-in so the track is audible.
    pub fn begin_track(&self, ring: &RingBuffer, format: StreamFormat, immediate: bool) {
        let mut state = self.state.lock();
        let queued = if immediate { 0 } else { ring.used() };
        state.played = 0;
        if queued == 0 {
            state.boundaries.clear();
            state.held = false;
            state.pending = Some(format);
        } else {
            let at = state.consumed + queued as u64;
            state.boundaries.push_back(Boundary { at, format });
            state.held = true;
        }
        if immediate || state.fade.value() == 0 {
            state.fade.prime_fade_in();
        }
        debug!(
            queued,
            boundaries = state.boundaries.len(),
            rate = format.sample_rate,
            immediate,
            "track queued"
        );
    }

    /// Schedule a format change for the newest track: at its gapless
    /// boundary if one is queued, on the next pull otherwise.
    pub fn request_format(&self, format: StreamFormat) {
        let mut state = self.state.lock();
        match state.boundaries.back_mut() {
            Some(boundary) => boundary.format = format,
            None => state.pending = Some(format),
        }
    }

    /// Forget the track: silent ramp, no gapless boundaries or deferred
    /// format, no tail, not paused.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.fade.reset();
        state.paused = false;
        state.consumed = 0;
        state.boundaries.clear();
        state.held = false;
        state.pending = None;
        state.played = 0;
        state.last_frame = StereoFrame::SILENCE;
    }

    /// Pause (fade out) or resume (fade in). Returns the previous flag.
    pub fn set_paused(&self, paused: bool) -> bool {
        let mut state = self.state.lock();
        let old = state.paused;
        if old != paused {
            state.paused = paused;
            state
                .fade
                .set_fade(if paused { -PAUSE_FADE_MS } else { PAUSE_FADE_MS });
        }
        old
    }

    /// Whether playback is paused
    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Start a fade episode (0 queries). Returns the previous duration.
    pub fn fade(&self, ms: i32) -> i32 {
        self.state.lock().fade.set_fade(ms)
    }

    /// Ramp value and running episode duration
    pub fn fade_state(&self) -> (i32, i32) {
        let state = self.state.lock();
        (state.fade.value(), state.fade.ms())
    }

    /// Frames of the current track played so far
    pub fn played(&self) -> u64 {
        self.state.lock().played
    }

    /// Format currently programmed into the hardware
    pub fn current_format(&self) -> StreamFormat {
        self.state.lock().current
    }

    /// Frames still ahead of the newest queued track
    pub fn gapless_remaining(&self) -> usize {
        let state = self.state.lock();
        state
            .boundaries
            .back()
            .map_or(0, |b| b.at.saturating_sub(state.consumed) as usize)
    }

    /// Number of track starts still waiting for their boundary
    pub fn queued_boundaries(&self) -> usize {
        self.state.lock().boundaries.len()
    }

    /// Milliseconds of the current track played so far
    pub fn playtime_ms(&self) -> u64 {
        let state = self.state.lock();
        state.played * 1000 / state.current.sample_rate.max(1) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::streaming::fade::FADE_MAX;

    const CD: StreamFormat = StreamFormat {
        sample_rate: 44_100,
        stereo: true,
    };
    const LOW: StreamFormat = StreamFormat {
        sample_rate: 22_050,
        stereo: false,
    };

    fn mixer() -> Mixer {
        let scheduler = Arc::new(PriorityScheduler::new(SchedulerConfig::default()));
        Mixer::new(CD, scheduler)
    }

    fn open(mixer: &Mixer) {
        mixer.state.lock().fade = FadeEngine::open();
    }

    fn frames(value: i16, count: usize) -> Vec<StereoFrame> {
        vec![StereoFrame::mono(value); count]
    }

    #[test]
    fn test_silent_until_started() {
        let mixer = mixer();
        let ring = RingBuffer::new(64).unwrap();
        ring.write(&frames(1000, 16));

        let mut out = frames(0, 16);
        let report = mixer.pull(&ring, &mut out);
        assert_eq!(report.frames_read, 16);
        assert!(out.iter().all(|f| f.is_silent()));
    }

    #[test]
    fn test_underrun_decays_from_last_frame() {
        let mixer = mixer();
        open(&mixer);
        let ring = RingBuffer::new(256).unwrap();
        ring.write(&frames(8000, 4));

        let mut out = frames(0, 104);
        let report = mixer.pull(&ring, &mut out);
        assert_eq!(report.frames_read, 4);
        assert_eq!(out[3].left, 8000);
        assert_eq!(out[4].left, 7500);
        for pair in out[4..].windows(2) {
            assert!(pair[1].left <= pair[0].left);
        }

        // the tail carries on into the next cycle
        let tail = out[103].left;
        let mut next = frames(0, 8);
        mixer.pull(&ring, &mut next);
        assert!(tail > 0);
        assert_eq!(next[0].left as i32, tail as i32 * 0xf00 / 4096);
    }

    #[test]
    fn test_gapless_boundary() {
        let mixer = mixer();
        open(&mixer);
        let ring = RingBuffer::new(1024).unwrap();
        ring.write(&frames(1, 100));

        mixer.begin_track(&ring, LOW, false);
        assert_eq!(mixer.gapless_remaining(), 100);
        ring.write(&frames(2, 100));

        let mut out = frames(0, 60);
        let first = mixer.pull(&ring, &mut out);
        assert_eq!(first.format_change, None);
        assert_eq!(mixer.played(), 0);
        assert_eq!(mixer.gapless_remaining(), 40);

        let second = mixer.pull(&ring, &mut out);
        assert_eq!(second.format_change, Some(LOW));
        assert_eq!(mixer.played(), 20);
        assert_eq!(out[39].left, 1);
        assert_eq!(out[40].left, 2);
        assert_eq!(mixer.current_format(), LOW);
    }

    #[test]
    fn test_boundary_exactly_at_pull_end() {
        let mixer = mixer();
        open(&mixer);
        let ring = RingBuffer::new(256).unwrap();
        ring.write(&frames(1, 32));
        mixer.begin_track(&ring, LOW, false);

        let mut out = frames(0, 32);
        let report = mixer.pull(&ring, &mut out);
        assert_eq!(report.format_change, Some(LOW));
        assert_eq!(mixer.played(), 0);
    }

    #[test]
    fn test_chained_starts_switch_at_each_boundary() {
        const HIGH: StreamFormat = StreamFormat {
            sample_rate: 32_000,
            stereo: true,
        };
        let mixer = mixer();
        open(&mixer);
        let ring = RingBuffer::new(1024).unwrap();
        ring.write(&frames(1, 100));
        mixer.begin_track(&ring, LOW, false);
        ring.write(&frames(2, 50));
        mixer.begin_track(&ring, HIGH, false);
        ring.write(&frames(3, 100));
        assert_eq!(mixer.queued_boundaries(), 2);
        assert_eq!(mixer.gapless_remaining(), 150);

        let mut out = frames(0, 25);
        let mut changes = Vec::new();
        for pull in 1..=10 {
            let report = mixer.pull(&ring, &mut out);
            if let Some(format) = report.format_change {
                changes.push((pull * 25, format.sample_rate, mixer.played()));
            }
        }
        assert_eq!(changes, vec![(100, 22_050, 0), (150, 32_000, 0)]);
        assert_eq!(mixer.played(), 100);
        assert_eq!(mixer.queued_boundaries(), 0);
        assert_eq!(mixer.current_format(), HIGH);
    }

    #[test]
    fn test_format_request_follows_newest_track() {
        let mixer = mixer();
        open(&mixer);
        let ring = RingBuffer::new(256).unwrap();
        ring.write(&frames(1, 40));
        mixer.begin_track(&ring, CD, false);
        mixer.request_format(LOW);
        ring.write(&frames(2, 40));

        let mut out = frames(0, 30);
        assert_eq!(mixer.pull(&ring, &mut out).format_change, None);
        assert_eq!(mixer.pull(&ring, &mut out).format_change, Some(LOW));
        assert_eq!(mixer.played(), 20);
    }

    #[test]
    fn test_reset_drops_deferred_formats() {
        let mixer = mixer();
        open(&mixer);
        let ring = RingBuffer::new(256).unwrap();
        ring.write(&frames(1, 64));
        mixer.begin_track(&ring, LOW, false);
        mixer.request_format(LOW);

        // stop with flush during the gapless window
        ring.start();
        mixer.reset();
        assert_eq!(mixer.gapless_remaining(), 0);

        ring.write(&frames(1, 64));
        let mut out = frames(0, 64);
        assert_eq!(mixer.pull(&ring, &mut out).format_change, None);
        assert_eq!(mixer.current_format(), CD);

        mixer.request_format(LOW);
        mixer.reset();
        assert_eq!(mixer.pull(&ring, &mut out).format_change, None);
    }

    #[test]
    fn test_immediate_start_fades_in() {
        let mixer = mixer();
        let ring = RingBuffer::new(256).unwrap();
        mixer.begin_track(&ring, CD, true);
        assert_eq!(mixer.fade_state(), (0, 128));

        ring.write(&frames(10_000, 64));
        let mut out = frames(0, 64);
        let report = mixer.pull(&ring, &mut out);
        // same format as before, nothing to reprogram
        assert_eq!(report.format_change, None);
        assert!(out[0].left < out[63].left);
        assert_eq!(mixer.played(), 64);
    }

    #[test]
    fn test_paused_consumes_nothing_once_silent() {
        let mixer = mixer();
        open(&mixer);
        let ring = RingBuffer::new(1 << 16).unwrap();
        ring.write(&frames(100, 60_000));

        assert!(!mixer.set_paused(true));
        assert_eq!(mixer.fade_state().1, -PAUSE_FADE_MS);

        // 1024 ms at 44.1 kHz ≈ 45158 frames of fade-out
        let mut out = frames(0, 50_000);
        mixer.pull(&ring, &mut out);
        assert_eq!(mixer.fade_state().0, 0);
        let used = ring.used();

        let mut out = frames(0, 512);
        assert_eq!(mixer.pull(&ring, &mut out).frames_read, 0);
        assert_eq!(ring.used(), used);
        assert!(out.iter().all(|f| f.is_silent()));

        assert!(mixer.set_paused(false));
        mixer.pull(&ring, &mut out);
        assert!(mixer.fade_state().0 > 0);
        assert!(mixer.fade_state().0 < FADE_MAX);
    }

    #[test]
    fn test_playtime_ms() {
        let mixer = mixer();
        let ring = RingBuffer::new(1 << 16).unwrap();
        ring.write(&frames(0, 44_100));
        let mut out = frames(0, 44_100);
        mixer.pull(&ring, &mut out);
        assert_eq!(mixer.playtime_ms(), 1000);

        mixer.reset();
        assert_eq!(mixer.playtime_ms(), 0);
    }
}
