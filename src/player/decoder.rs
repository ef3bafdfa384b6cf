//! Decoder plugin contract
//!
//! A decoder turns a file into PCM frames pushed straight into the ring
//! buffer. Decoders are registered with a [`DecoderRegistry`] and selected
//! by file extension; decoders registering the `*` extension are probed in
//! registration order when no extension matches.

use crate::streaming::{RingBuffer, StreamFormat};
use crate::{AicaError, Result};
use bitflags::bitflags;
use std::path::Path;

/// Extension claimed by decoders that accept any file they can open
pub const WILDCARD: &str = "*";

bitflags! {
    /// Outcome of one [`Decoder::decode`] call
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DecodeStatus: u32 {
        /// More data is immediately available; call again without resting
        const CONTINUE = 1 << 0;
        /// Track finished
        const END = 1 << 1;
        /// Decoding failed; the track stops
        const ERROR = 1 << 2;
        /// Track information changed (see the [`TrackInfo`] passed in)
        const INFO_CHANGED = 1 << 3;
    }
}

bitflags! {
    /// Which [`TrackInfo`] fields carry new values
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InfoFields: u32 {
        /// Bits per sample
        const BITS = 1 << 0;
        /// Channel count
        const CHANNELS = 1 << 1;
        /// Sample rate
        const FREQUENCY = 1 << 2;
        /// Bitrate
        const BITRATE = 1 << 3;
        /// Stream size in bytes
        const BYTES = 1 << 4;
        /// Duration
        const DURATION = 1 << 5;
        /// Artist
        const ARTIST = 1 << 6;
        /// Title
        const TITLE = 1 << 7;
        /// Album
        const ALBUM = 1 << 8;
        /// Track number
        const TRACK = 1 << 9;
        /// Genre
        const GENRE = 1 << 10;
        /// Year
        const YEAR = 1 << 11;
        /// Comments
        const COMMENTS = 1 << 12;
        /// Format description
        const FORMAT = 1 << 13;
    }
}

/// Track metadata and stream parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackInfo {
    /// Fields carrying values in this instance
    pub update: InfoFields,
    /// Bits per sample
    pub bits: u16,
    /// Channel count (1 or 2)
    pub channels: u16,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Bitrate in bits per second
    pub bitrate: u32,
    /// Stream size in bytes
    pub bytes: u64,
    /// Duration in milliseconds
    pub duration_ms: u64,
    /// Artist
    pub artist: Option<String>,
    /// Title
    pub title: Option<String>,
    /// Album
    pub album: Option<String>,
    /// Track number or name
    pub track: Option<String>,
    /// Genre
    pub genre: Option<String>,
    /// Year
    pub year: Option<String>,
    /// Free-form comments
    pub comments: Option<String>,
    /// Format description
    pub format: Option<String>,
}

impl TrackInfo {
    /// Copy every field flagged in `other.update` into `self`.
    pub fn merge(&mut self, other: &TrackInfo) {
        let fields = other.update;
        macro_rules! take {
            ($flag:ident, $field:ident) => {
                if fields.contains(InfoFields::$flag) {
                    self.$field = other.$field.clone();
                }
            };
        }
        take!(BITS, bits);
        take!(CHANNELS, channels);
        take!(FREQUENCY, sample_rate);
        take!(BITRATE, bitrate);
        take!(BYTES, bytes);
        take!(DURATION, duration_ms);
        take!(ARTIST, artist);
        take!(TITLE, title);
        take!(ALBUM, album);
        take!(TRACK, track);
        take!(GENRE, genre);
        take!(YEAR, year);
        take!(COMMENTS, comments);
        take!(FORMAT, format);
        self.update |= fields;
    }

    /// Output format described by the stream parameters, if known
    pub fn stream_format(&self) -> Option<StreamFormat> {
        (self.sample_rate > 0).then_some(StreamFormat {
            sample_rate: self.sample_rate,
            stereo: self.channels != 1,
        })
    }
}

/// Title derived from a path: directory and extension stripped, underscores
/// turned into spaces. A trailing `.gz` is stripped along with the extension
/// before it.
pub fn default_title(path: &str) -> String {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let mut stem = strip_extension(name);
    if name.len() - stem.len() == 3 && name[stem.len()..].eq_ignore_ascii_case(".gz") {
        stem = strip_extension(stem);
    }
    stem.replace('_', " ")
}

fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(dot) => &name[..dot],
    }
}

/// Lower-case extension of a path, without the dot
pub fn extension_of(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Decoder failures
#[derive(thiserror::Error, Debug)]
pub enum DecoderError {
    /// The file is not something this decoder can play
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The file is damaged or truncated
    #[error("Malformed data: {0}")]
    Malformed(String),

    /// Requested track does not exist
    #[error("Track {track} out of range (file has {count})")]
    InvalidTrack {
        /// Requested track
        track: u32,
        /// Tracks in the file
        count: u32,
    },

    /// Operation needs a started track
    #[error("No track started")]
    NotStarted,

    /// IO error reading the file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decoder plugin
///
/// Called from the decoder thread only; implementations need no internal
/// locking.
pub trait Decoder: Send {
    /// Decoder name for logs
    fn name(&self) -> &str;

    /// Lower-case extensions handled, without the dot. [`WILDCARD`] probes
    /// any path.
    fn extensions(&self) -> &[&'static str];

    /// Open `path` and prepare `track`, filling `info` with at least the
    /// stream parameters.
    fn start(
        &mut self,
        path: &str,
        track: u32,
        info: &mut TrackInfo,
    ) -> std::result::Result<(), DecoderError>;

    /// Push decoded frames into `ring` (never more than [`RingBuffer::free`]).
    /// Changed metadata goes into `info` with [`DecodeStatus::INFO_CHANGED`].
    fn decode(&mut self, ring: &RingBuffer, info: &mut TrackInfo) -> DecodeStatus;

    /// Release the current track
    fn stop(&mut self);

    /// Describe `path`, or the current track when `None`
    fn info(
        &mut self,
        info: &mut TrackInfo,
        path: Option<&str>,
    ) -> std::result::Result<(), DecoderError>;

    /// Whether the decoder claims every path
    fn is_wildcard(&self) -> bool {
        self.extensions().contains(&WILDCARD)
    }
}

/// Registered decoders in registration order
#[derive(Default)]
pub struct DecoderRegistry {
    decoders: Vec<Box<dyn Decoder>>,
}

impl DecoderRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a decoder; earlier registrations win ties
    pub fn register(&mut self, decoder: Box<dyn Decoder>) {
        self.decoders.push(decoder);
    }

    /// Builder-style [`DecoderRegistry::register`]
    pub fn with(mut self, decoder: Box<dyn Decoder>) -> Self {
        self.register(decoder);
        self
    }

    /// Number of decoders
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    /// Whether no decoder is registered
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }

    /// First decoder claiming the path's extension (case-insensitive)
    pub fn find_by_extension(&self, path: &str) -> Option<usize> {
        let ext = extension_of(path)?;
        self.decoders.iter().position(|d| {
            d.extensions()
                .iter()
                .any(|e| *e != WILDCARD && e.eq_ignore_ascii_case(&ext))
        })
    }

    /// Whether any decoder could be tried for the path
    pub fn has_candidate(&self, path: &str) -> bool {
        self.find_by_extension(path).is_some() || self.decoders.iter().any(|d| d.is_wildcard())
    }

    /// Start the decoder for `path`: the extension match if there is one,
    /// else the first wildcard decoder whose `start` succeeds. Returns its
    /// index.
    ///
    /// # Errors
    ///
    /// - [`AicaError::Decode`] when the extension-matched decoder fails
    /// - [`AicaError::NoDriverFound`] when nothing accepts the path
    pub fn start(&mut self, path: &str, track: u32, info: &mut TrackInfo) -> Result<usize> {
        if let Some(index) = self.find_by_extension(path) {
            self.decoders[index].start(path, track, info)?;
            return Ok(index);
        }

        for (index, decoder) in self.decoders.iter_mut().enumerate() {
            if !decoder.is_wildcard() {
                continue;
            }
            let mut probe = TrackInfo::default();
            if decoder.start(path, track, &mut probe).is_ok() {
                *info = probe;
                return Ok(index);
            }
        }
        Err(AicaError::NoDriverFound(path.to_string()))
    }

    /// Describe `path` without starting it, dispatching like
    /// [`DecoderRegistry::start`]. Returns the index of the decoder used.
    ///
    /// # Errors
    ///
    /// As [`DecoderRegistry::start`].
    pub fn describe(&mut self, path: &str, info: &mut TrackInfo) -> Result<usize> {
        if let Some(index) = self.find_by_extension(path) {
            self.decoders[index].info(info, Some(path))?;
            return Ok(index);
        }

        for (index, decoder) in self.decoders.iter_mut().enumerate() {
            if !decoder.is_wildcard() {
                continue;
            }
            let mut probe = TrackInfo::default();
            if decoder.info(&mut probe, Some(path)).is_ok() {
                *info = probe;
                return Ok(index);
            }
        }
        Err(AicaError::NoDriverFound(path.to_string()))
    }

    /// Decoder at `index`
    pub fn get_mut(&mut self, index: usize) -> Option<&mut (dyn Decoder + 'static)> {
        self.decoders.get_mut(index).map(|d| d.as_mut())
    }

    /// Name of the decoder at `index`
    pub fn name(&self, index: usize) -> Option<&str> {
        self.decoders.get(index).map(|d| d.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub {
        name: &'static str,
        extensions: &'static [&'static str],
        accepts: bool,
    }

    impl Decoder for Stub {
        fn name(&self) -> &str {
            self.name
        }
        fn extensions(&self) -> &[&'static str] {
            self.extensions
        }
        fn start(
            &mut self,
            path: &str,
            _: u32,
            info: &mut TrackInfo,
        ) -> std::result::Result<(), DecoderError> {
            if self.accepts {
                info.sample_rate = 44_100;
                Ok(())
            } else {
                Err(DecoderError::UnsupportedFormat(path.into()))
            }
        }
        fn decode(&mut self, _: &RingBuffer, _: &mut TrackInfo) -> DecodeStatus {
            DecodeStatus::END
        }
        fn stop(&mut self) {}
        fn info(
            &mut self,
            _: &mut TrackInfo,
            _: Option<&str>,
        ) -> std::result::Result<(), DecoderError> {
            Ok(())
        }
    }

    fn stub(
        name: &'static str,
        extensions: &'static [&'static str],
        accepts: bool,
    ) -> Box<dyn Decoder> {
        Box::new(Stub {
            name,
            extensions,
            accepts,
        })
    }

    #[test]
    fn test_default_title() {
        assert_eq!(default_title("/cd/music/my_song.ogg"), "my song");
        assert_eq!(default_title("plain"), "plain");
        assert_eq!(default_title("/a.b/c_d"), "c d");
        assert_eq!(default_title("tune.sc68.GZ"), "tune");
        assert_eq!(default_title(".hidden"), ".hidden");
    }

    #[test]
    fn test_extension_dispatch_is_case_insensitive() {
        let registry = DecoderRegistry::new()
            .with(stub("ogg", &["ogg"], true))
            .with(stub("mp3", &["mp3", "mp2"], true));
        assert_eq!(registry.find_by_extension("/x/Track.MP2"), Some(1));
        assert_eq!(registry.find_by_extension("song.flac"), None);
        assert!(!registry.has_candidate("song.flac"));
    }

    #[test]
    fn test_wildcard_probe_order() {
        let mut registry = DecoderRegistry::new()
            .with(stub("wav", &["wav"], true))
            .with(stub("picky", &[WILDCARD], false))
            .with(stub("any", &[WILDCARD], true));
        let mut info = TrackInfo::default();
        assert_eq!(registry.start("mystery.xyz", 0, &mut info).unwrap(), 2);
        assert_eq!(info.sample_rate, 44_100);
        assert_eq!(registry.names(), vec!["wav", "picky", "any"]);
    }

    #[test]
    fn test_no_driver_found() {
        let mut registry = DecoderRegistry::new().with(stub("wav", &["wav"], true));
        let mut info = TrackInfo::default();
        let err = registry.start("song.mod", 0, &mut info).unwrap_err();
        assert!(matches!(err, AicaError::NoDriverFound(p) if p == "song.mod"));
    }

    #[test]
    fn test_extension_match_failure_is_decode_error() {
        let mut registry = DecoderRegistry::new()
            .with(stub("broken", &["wav"], false))
            .with(stub("any", &[WILDCARD], true));
        let mut info = TrackInfo::default();
        let err = registry.start("a.wav", 0, &mut info).unwrap_err();
        assert!(matches!(err, AicaError::Decode(DecoderError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_merge_respects_mask() {
        let mut session = TrackInfo {
            title: Some("Old".into()),
            sample_rate: 44_100,
            channels: 2,
            ..TrackInfo::default()
        };
        let update = TrackInfo {
            update: InfoFields::FREQUENCY | InfoFields::ARTIST,
            sample_rate: 22_050,
            artist: Some("Someone".into()),
            title: Some("ignored".into()),
            ..TrackInfo::default()
        };
        session.merge(&update);
        assert_eq!(session.sample_rate, 22_050);
        assert_eq!(session.artist.as_deref(), Some("Someone"));
        assert_eq!(session.title.as_deref(), Some("Old"));
        assert_eq!(
            session.stream_format(),
            Some(StreamFormat {
                sample_rate: 22_050,
                stereo: true
            })
        );
    }
}
