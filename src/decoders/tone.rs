//! Test-tone generator
//!
//! Claims the wildcard extension and accepts paths of the form
//! `tone:<hz>[:<ms>]`. Without a duration the tone plays until stopped.
//! Samples come from a 1024-entry sine table indexed by the top ten bits of
//! a 32-bit phase accumulator.

use crate::player::{DecodeStatus, Decoder, DecoderError, InfoFields, TrackInfo, WILDCARD};
use crate::streaming::RingBuffer;

const TABLE_BITS: u32 = 10;
const TABLE_SIZE: usize = 1 << TABLE_BITS;
const CHUNK_FRAMES: usize = 1024;

/// Output rate of generated tones
pub const TONE_SAMPLE_RATE: u32 = 44_100;

/// Peak amplitude (half of full scale)
pub const TONE_AMPLITUDE: i16 = 16_384;

/// Parsed `tone:` path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToneSpec {
    /// Frequency in Hz
    pub frequency: u32,
    /// Length in milliseconds; `None` plays forever
    pub duration_ms: Option<u64>,
}

impl ToneSpec {
    /// Parse `tone:<hz>[:<ms>]`
    pub fn parse(path: &str) -> Result<Self, DecoderError> {
        let rest = path
            .strip_prefix("tone:")
            .ok_or_else(|| DecoderError::UnsupportedFormat(path.to_string()))?;
        let mut parts = rest.splitn(2, ':');
        let frequency = parts
            .next()
            .and_then(|hz| hz.trim().parse::<u32>().ok())
            .filter(|&hz| hz > 0 && hz < TONE_SAMPLE_RATE / 2)
            .ok_or_else(|| DecoderError::Malformed(format!("bad tone frequency in '{path}'")))?;
        let duration_ms = match parts.next() {
            Some(ms) => Some(
                ms.trim()
                    .parse::<u64>()
                    .map_err(|_| DecoderError::Malformed(format!("bad tone length in '{path}'")))?,
            ),
            None => None,
        };
        Ok(ToneSpec {
            frequency,
            duration_ms,
        })
    }

    fn total_frames(&self) -> Option<u64> {
        self.duration_ms
            .map(|ms| ms * TONE_SAMPLE_RATE as u64 / 1000)
    }

    fn describe(&self, info: &mut TrackInfo) {
        info.bits = 16;
        info.channels = 1;
        info.sample_rate = TONE_SAMPLE_RATE;
        info.bitrate = TONE_SAMPLE_RATE * 16;
        info.bytes = self.total_frames().unwrap_or(0) * 2;
        info.duration_ms = self.duration_ms.unwrap_or(0);
        info.title = Some(format!("{} Hz tone", self.frequency));
        info.format = Some("Sine tone".to_string());
        info.update |= InfoFields::BITS
            | InfoFields::CHANNELS
            | InfoFields::FREQUENCY
            | InfoFields::BITRATE
            | InfoFields::BYTES
            | InfoFields::DURATION
            | InfoFields::TITLE
            | InfoFields::FORMAT;
    }
}

struct ToneState {
    spec: ToneSpec,
    phase: u32,
    step: u32,
    remaining: Option<u64>,
}

/// Wildcard sine-tone decoder
pub struct ToneDecoder {
    table: Box<[i16; TABLE_SIZE]>,
    state: Option<ToneState>,
    scratch: Vec<i16>,
}

impl ToneDecoder {
    /// Decoder with its sine table built
    pub fn new() -> Self {
        let mut table = Box::new([0i16; TABLE_SIZE]);
        for (i, slot) in table.iter_mut().enumerate() {
            let angle = i as f64 * std::f64::consts::TAU / TABLE_SIZE as f64;
            *slot = (angle.sin() * TONE_AMPLITUDE as f64).round() as i16;
        }
        ToneDecoder {
            table,
            state: None,
            scratch: Vec::with_capacity(CHUNK_FRAMES),
        }
    }

    /// Phase increment per sample for a frequency
    pub fn phase_step(frequency: u32) -> u32 {
        (((frequency as u64) << 32) / TONE_SAMPLE_RATE as u64) as u32
    }

    fn sample(&self, phase: u32) -> i16 {
        self.table[(phase >> (32 - TABLE_BITS)) as usize]
    }
}

impl Default for ToneDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ToneDecoder {
    fn name(&self) -> &str {
        "tone"
    }

    fn extensions(&self) -> &[&'static str] {
        &[WILDCARD]
    }

    fn start(&mut self, path: &str, track: u32, info: &mut TrackInfo) -> Result<(), DecoderError> {
        self.stop();
        let spec = ToneSpec::parse(path)?;
        if track != 0 {
            return Err(DecoderError::InvalidTrack { track, count: 1 });
        }
        spec.describe(info);
        self.state = Some(ToneState {
            spec,
            phase: 0,
            step: Self::phase_step(spec.frequency),
            remaining: spec.total_frames(),
        });
        Ok(())
    }

    fn decode(&mut self, ring: &RingBuffer, _info: &mut TrackInfo) -> DecodeStatus {
        let Some(state) = self.state.as_ref() else {
            return DecodeStatus::ERROR;
        };
        if state.remaining == Some(0) {
            return DecodeStatus::END;
        }

        let mut count = ring.free().min(CHUNK_FRAMES);
        if let Some(remaining) = state.remaining {
            count = count.min(remaining as usize);
        }
        if count == 0 {
            return DecodeStatus::empty();
        }

        let (mut phase, step) = (state.phase, state.step);
        self.scratch.clear();
        for _ in 0..count {
            let sample = self.sample(phase);
            self.scratch.push(sample);
            phase = phase.wrapping_add(step);
        }
        let written = ring.write_mono(&self.scratch);

        if let Some(state) = self.state.as_mut() {
            state.phase = phase;
            if let Some(remaining) = state.remaining.as_mut() {
                *remaining -= written as u64;
            }
        }

        if ring.free() > 0 {
            DecodeStatus::CONTINUE
        } else {
            DecodeStatus::empty()
        }
    }

    fn stop(&mut self) {
        self.state = None;
    }

    fn info(&mut self, info: &mut TrackInfo, path: Option<&str>) -> Result<(), DecoderError> {
        match (path, self.state.as_ref()) {
            (Some(path), _) => ToneSpec::parse(path).map(|spec| spec.describe(info)),
            (None, Some(state)) => {
                state.spec.describe(info);
                Ok(())
            }
            (None, None) => Err(DecoderError::NotStarted),
        }
    }
}
