//! Fixed-point fade ramp and anti-click decay
//!
//! The ramp value carries 16 integer and 9 fractional bits. Its integer part
//! is the per-sample gain (0 to 65535), applied to each lane as
//! `(lane * gain) >> 16`. A fade episode runs until the value saturates at
//! either bound, then ends on that buffer.

use super::StereoFrame;

/// Fractional bits of the ramp value
pub const FADE_FRACTION_BITS: u32 = 9;

/// Fully open ramp value
pub const FADE_MAX: i32 = (1 << (16 + FADE_FRACTION_BITS)) - 1;

/// Anti-click decay factor numerator (over 4096), i.e. 15/16 per frame
pub const DECAY_FACTOR: i32 = 0xf00;

/// Length of the fade-in primed on an immediate start, in ms
pub const START_FADE_MS: i32 = 128;

/// Length of the pause/resume fades, in ms
pub const PAUSE_FADE_MS: i32 = 1024;

/// Fade ramp state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FadeEngine {
    value: i32,
    ms: i32,
}

impl FadeEngine {
    /// Silent ramp, no episode running
    pub const fn new() -> Self {
        FadeEngine { value: 0, ms: 0 }
    }

    /// Fully open ramp, no episode running
    pub const fn open() -> Self {
        FadeEngine {
            value: FADE_MAX,
            ms: 0,
        }
    }

    /// Current ramp value
    pub fn value(&self) -> i32 {
        self.value
    }

    /// Duration of the running episode (0 when idle, negative when fading out)
    pub fn ms(&self) -> i32 {
        self.ms
    }

    /// Per-sample gain derived from the ramp value
    #[inline]
    pub fn gain(&self) -> i32 {
        self.value >> FADE_FRACTION_BITS
    }

    /// Whether an episode is running
    pub fn is_active(&self) -> bool {
        self.ms != 0
    }

    /// Start an episode: `ms > 0` fades in, `ms < 0` fades out, 0 only
    /// queries. Returns the previous duration.
    pub fn set_fade(&mut self, ms: i32) -> i32 {
        let old = self.ms;
        if ms != 0 {
            self.ms = ms;
        }
        old
    }

    /// Silence the ramp and queue a short fade-in.
    pub fn prime_fade_in(&mut self) {
        self.value = 0;
        self.ms = START_FADE_MS;
    }

    /// Return to silence with no episode running.
    pub fn reset(&mut self) {
        *self = FadeEngine::new();
    }

    /// Per-sample step for an episode of `ms` at `rate`, never 0.
    fn step(ms: i32, rate: u32) -> i32 {
        let samples = (rate as i64 * ms.unsigned_abs() as i64 / 1000).max(1);
        let step = (FADE_MAX as i64 / samples).max(1) as i32;
        if ms < 0 {
            -step
        } else {
            step
        }
    }

    /// Apply the ramp to a buffer played at `rate`.
    ///
    /// With no episode running a zero ramp silences the buffer and any other
    /// value leaves it untouched.
    pub fn apply(&mut self, frames: &mut [StereoFrame], rate: u32) {
        if rate == 0 || frames.is_empty() {
            return;
        }

        if self.ms == 0 {
            if self.value == 0 {
                frames.fill(StereoFrame::SILENCE);
            }
            return;
        }

        let mut step = Self::step(self.ms, rate);
        let mut value = self.value;
        for frame in frames.iter_mut() {
            let gain = value >> FADE_FRACTION_BITS;
            frame.left = ((frame.left as i32 * gain) >> 16) as i16;
            frame.right = ((frame.right as i32 * gain) >> 16) as i16;

            value += step;
            if value <= 0 {
                value = 0;
                step = 0;
            } else if value >= FADE_MAX {
                value = FADE_MAX;
                step = 0;
            }
        }
        self.value = value;
        if step == 0 {
            self.ms = 0;
        }
    }
}

/// Fill `frames` with successively decayed copies of `last`.
///
/// Each frame is the previous one scaled by 15/16, truncating toward zero so
/// the tail always reaches silence. Returns the final frame written.
pub fn decay_fill(frames: &mut [StereoFrame], mut last: StereoFrame) -> StereoFrame {
    for frame in frames.iter_mut() {
        if !last.is_silent() {
            last = StereoFrame::new(decay(last.left), decay(last.right));
        }
        *frame = last;
    }
    last
}

#[inline]
fn decay(sample: i16) -> i16 {
    (sample as i32 * DECAY_FACTOR / 4096) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loud(count: usize) -> Vec<StereoFrame> {
        vec![StereoFrame::new(20_000, -20_000); count]
    }

    #[test]
    fn test_idle_ramp() {
        let mut silent = FadeEngine::new();
        let mut frames = loud(4);
        silent.apply(&mut frames, 44_100);
        assert!(frames.iter().all(|f| f.is_silent()));

        let mut open = FadeEngine::open();
        let mut frames = loud(4);
        open.apply(&mut frames, 44_100);
        assert_eq!(frames, loud(4));
    }

    #[test]
    fn test_fade_in_monotonic_and_saturates() {
        let mut fade = FadeEngine::new();
        assert_eq!(fade.set_fade(10), 0);

        // 10 ms at 44.1 kHz is 441 frames
        let mut frames = loud(600);
        fade.apply(&mut frames, 44_100);

        for pair in frames.windows(2) {
            assert!(pair[1].left >= pair[0].left);
            assert!(pair[1].right <= pair[0].right);
        }
        assert_eq!(fade.value(), FADE_MAX);
        assert_eq!(fade.ms(), 0, "episode ends once saturated");
        assert!(frames[599].left > 19_990);
    }

    #[test]
    fn test_fade_out_clamps_at_zero() {
        let mut fade = FadeEngine::open();
        fade.set_fade(-5);
        let mut frames = loud(1000);
        fade.apply(&mut frames, 48_000);

        assert_eq!(fade.value(), 0);
        assert!(!fade.is_active());
        assert!(frames[999].is_silent());

        // next buffer is cleared outright
        let mut next = loud(8);
        fade.apply(&mut next, 48_000);
        assert!(next.iter().all(|f| f.is_silent()));
    }

    #[test]
    fn test_episode_spans_buffers() {
        let mut fade = FadeEngine::new();
        fade.set_fade(1000);
        let mut frames = loud(256);
        fade.apply(&mut frames, 44_100);
        let mid = fade.value();
        assert!(mid > 0 && mid < FADE_MAX);
        assert_eq!(fade.ms(), 1000);

        fade.apply(&mut frames, 44_100);
        assert!(fade.value() > mid);
    }

    #[test]
    fn test_query_does_not_change() {
        let mut fade = FadeEngine::new();
        fade.set_fade(-300);
        assert_eq!(fade.set_fade(0), -300);
        assert_eq!(fade.ms(), -300);
    }

    #[test]
    fn test_decay_reaches_silence_without_jump() {
        let mut frames = vec![StereoFrame::SILENCE; 100];
        let start = StereoFrame::new(16_000, -16_000);
        let last = decay_fill(&mut frames, start);

        assert_eq!(frames[0], StereoFrame::new(15_000, -15_000));
        for pair in frames.windows(2) {
            assert!(pair[1].left.abs() <= pair[0].left.abs());
            assert!(pair[1].right.abs() <= pair[0].right.abs());
        }
        assert_eq!(last, frames[99]);

        let mut long = vec![StereoFrame::SILENCE; 400];
        decay_fill(&mut long, start);
        assert!(long[399].is_silent());
    }
}
