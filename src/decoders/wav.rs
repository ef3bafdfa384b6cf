//! WAV decoder
//!
//! Streams 16-bit integer PCM from RIFF/WAVE files through `hound`. Mono
//! files are widened to stereo frames; the stream format reports them as
//! mono so the driver centres both voices.

use crate::player::{DecodeStatus, Decoder, DecoderError, InfoFields, TrackInfo};
use crate::streaming::{RingBuffer, StereoFrame};
use std::fs::File;
use std::io::BufReader;
use tracing::{debug, warn};

/// Frames decoded per call at most
const CHUNK_FRAMES: usize = 2048;

type Reader = hound::WavReader<BufReader<File>>;

/// Decoder for 16-bit PCM WAV files
pub struct WavDecoder {
    reader: Option<Reader>,
    channels: u16,
    current: TrackInfo,
    scratch: Vec<StereoFrame>,
}

impl WavDecoder {
    /// Idle decoder
    pub fn new() -> Self {
        WavDecoder {
            reader: None,
            channels: 0,
            current: TrackInfo::default(),
            scratch: Vec::with_capacity(CHUNK_FRAMES),
        }
    }
}

impl Default for WavDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn map_hound_error(err: hound::Error) -> DecoderError {
    match err {
        hound::Error::IoError(e) => DecoderError::Io(e),
        hound::Error::Unsupported => {
            DecoderError::UnsupportedFormat("unsupported WAV encoding".into())
        }
        other => DecoderError::Malformed(other.to_string()),
    }
}

fn open(path: &str) -> Result<Reader, DecoderError> {
    let reader = hound::WavReader::open(path).map_err(map_hound_error)?;
    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(DecoderError::UnsupportedFormat(format!(
            "{path}: {}-bit {:?} samples, only 16-bit integer PCM is supported",
            spec.bits_per_sample, spec.sample_format
        )));
    }
    if !(1..=2).contains(&spec.channels) {
        return Err(DecoderError::UnsupportedFormat(format!(
            "{path}: {} channels",
            spec.channels
        )));
    }
    Ok(reader)
}

fn describe(reader: &Reader, path: &str, info: &mut TrackInfo) {
    let spec = reader.spec();
    let frames = reader.duration() as u64;
    let bytes = reader.len() as u64 * 2;

    info.bits = spec.bits_per_sample;
    info.channels = spec.channels;
    info.sample_rate = spec.sample_rate;
    info.bitrate = spec.sample_rate * spec.channels as u32 * spec.bits_per_sample as u32;
    info.bytes = bytes;
    info.duration_ms = if spec.sample_rate > 0 {
        frames * 1000 / spec.sample_rate as u64
    } else {
        0
    };
    info.format = Some("WAV PCM 16-bit".to_string());
    info.update |= InfoFields::BITS
        | InfoFields::CHANNELS
        | InfoFields::FREQUENCY
        | InfoFields::BITRATE
        | InfoFields::BYTES
        | InfoFields::DURATION
        | InfoFields::FORMAT;
    debug!(path, rate = spec.sample_rate, channels = spec.channels, frames, "wav opened");
}

impl Decoder for WavDecoder {
    fn name(&self) -> &str {
        "wav"
    }

    fn extensions(&self) -> &[&'static str] {
        &["wav"]
    }

    fn start(&mut self, path: &str, track: u32, info: &mut TrackInfo) -> Result<(), DecoderError> {
        self.stop();
        if track != 0 {
            return Err(DecoderError::InvalidTrack { track, count: 1 });
        }
        let reader = open(path)?;
        describe(&reader, path, info);
        self.channels = reader.spec().channels;
        self.current = info.clone();
        self.reader = Some(reader);
        Ok(())
    }

    fn decode(&mut self, ring: &RingBuffer, _info: &mut TrackInfo) -> DecodeStatus {
        let Some(reader) = self.reader.as_mut() else {
            return DecodeStatus::ERROR;
        };

        let want = ring.free().min(CHUNK_FRAMES);
        if want == 0 {
            return DecodeStatus::empty();
        }

        self.scratch.clear();
        let mut samples = reader.samples::<i16>();
        if self.channels == 1 {
            for sample in samples.by_ref().take(want) {
                match sample {
                    Ok(s) => self.scratch.push(StereoFrame::mono(s)),
                    Err(err) => {
                        warn!(%err, "wav sample read failed");
                        return DecodeStatus::ERROR;
                    }
                }
            }
        } else {
            while self.scratch.len() < want {
                let (Some(left), Some(right)) = (samples.next(), samples.next()) else {
                    break;
                };
                match (left, right) {
                    (Ok(l), Ok(r)) => self.scratch.push(StereoFrame::new(l, r)),
                    (Err(err), _) | (_, Err(err)) => {
                        warn!(%err, "wav sample read failed");
                        return DecodeStatus::ERROR;
                    }
                }
            }
        }

        let written = ring.write(&self.scratch);
        debug_assert_eq!(written, self.scratch.len());

        if self.scratch.len() < want {
            DecodeStatus::END
        } else if ring.free() > 0 {
            DecodeStatus::CONTINUE
        } else {
            DecodeStatus::empty()
        }
    }

    fn stop(&mut self) {
        self.reader = None;
        self.channels = 0;
        self.current = TrackInfo::default();
    }

    fn info(&mut self, info: &mut TrackInfo, path: Option<&str>) -> Result<(), DecoderError> {
        match path {
            Some(path) => {
                let reader = open(path)?;
                describe(&reader, path, info);
                Ok(())
            }
            None if self.reader.is_some() => {
                info.merge(&self.current);
                Ok(())
            }
            None => Err(DecoderError::NotStarted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_fixture(path: &Path, channels: u16, bits: u16, samples: &[i32]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 22_050,
            bits_per_sample: bits,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            match bits {
                16 => writer.write_sample(s as i16).unwrap(),
                _ => writer.write_sample(s).unwrap(),
            }
        }
        writer.finalize().unwrap();
    }

    fn drain(ring: &RingBuffer) -> Vec<StereoFrame> {
        let mut out = vec![StereoFrame::SILENCE; ring.used()];
        let n = ring.read(&mut out);
        out.truncate(n);
        out
    }

    #[test]
    fn test_stereo_decode_to_end() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stereo.wav");
        write_fixture(&path, 2, 16, &[1, -1, 2, -2, 3, -3]);
        let path = path.to_str().unwrap();

        let mut decoder = WavDecoder::new();
        let mut info = TrackInfo::default();
        decoder.start(path, 0, &mut info).unwrap();
        assert_eq!(info.sample_rate, 22_050);
        assert_eq!(info.channels, 2);
        assert_eq!(info.bits, 16);
        assert_eq!(info.bytes, 12);
        assert_eq!(info.format.as_deref(), Some("WAV PCM 16-bit"));
        assert!(info.update.contains(InfoFields::FREQUENCY | InfoFields::DURATION));

        let ring = RingBuffer::new(64).unwrap();
        let status = decoder.decode(&ring, &mut TrackInfo::default());
        assert_eq!(status, DecodeStatus::END);
        assert_eq!(
            drain(&ring),
            vec![
                StereoFrame::new(1, -1),
                StereoFrame::new(2, -2),
                StereoFrame::new(3, -3)
            ]
        );
    }

    #[test]
    fn test_mono_is_duplicated_and_bounded_by_free_space() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mono.wav");
        write_fixture(&path, 1, 16, &(0..10).collect::<Vec<_>>());
        let path = path.to_str().unwrap();

        let mut decoder = WavDecoder::new();
        let mut info = TrackInfo::default();
        decoder.start(path, 0, &mut info).unwrap();
        assert_eq!(info.stream_format().map(|f| f.stereo), Some(false));

        // 5 usable slots
        let ring = RingBuffer::new(6).unwrap();
        assert_eq!(decoder.decode(&ring, &mut TrackInfo::default()), DecodeStatus::empty());
        let first = drain(&ring);
        assert_eq!(first.len(), 5);
        assert_eq!(first[3], StereoFrame::mono(3));

        assert_eq!(decoder.decode(&ring, &mut TrackInfo::default()), DecodeStatus::empty());
        assert_eq!(drain(&ring)[0], StereoFrame::mono(5));
        assert_eq!(decoder.decode(&ring, &mut TrackInfo::default()), DecodeStatus::END);
    }

    #[test]
    fn test_rejects_other_encodings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wide.wav");
        write_fixture(&path, 1, 24, &[0, 1, 2]);

        let mut decoder = WavDecoder::new();
        let err = decoder
            .start(path.to_str().unwrap(), 0, &mut TrackInfo::default())
            .unwrap_err();
        assert!(matches!(err, DecoderError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_track_and_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("one.wav");
        write_fixture(&path, 2, 16, &[0, 0]);

        let mut decoder = WavDecoder::new();
        let err = decoder
            .start(path.to_str().unwrap(), 1, &mut TrackInfo::default())
            .unwrap_err();
        assert!(matches!(err, DecoderError::InvalidTrack { track: 1, count: 1 }));

        let missing = dir.path().join("missing.wav");
        let err = decoder
            .start(missing.to_str().unwrap(), 0, &mut TrackInfo::default())
            .unwrap_err();
        assert!(matches!(err, DecoderError::Io(_)));
    }

    #[test]
    fn test_info_for_path_and_current_track() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("info.wav");
        write_fixture(&path, 2, 16, &vec![0; 22_050 * 2]);
        let path = path.to_str().unwrap();

        let mut decoder = WavDecoder::new();
        assert!(matches!(
            decoder.info(&mut TrackInfo::default(), None),
            Err(DecoderError::NotStarted)
        ));

        let mut info = TrackInfo::default();
        decoder.info(&mut info, Some(path)).unwrap();
        assert_eq!(info.duration_ms, 1000);
        assert_eq!(info.bitrate, 22_050 * 32);

        decoder.start(path, 0, &mut TrackInfo::default()).unwrap();
        let mut current = TrackInfo::default();
        decoder.info(&mut current, None).unwrap();
        assert_eq!(current.duration_ms, 1000);
    }
}
