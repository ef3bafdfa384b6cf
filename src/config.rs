//! Player configuration
//!
//! Every tunable of the pipeline lives here: ring buffer capacity, stream
//! buffer sizes, the priority scheduler's thresholds and the decoder
//! thread's timing. Configurations can be loaded from JSON; missing fields
//! take their defaults.

use crate::aica::StereoMode;
use crate::player::PriorityLevel;
use crate::streaming::ring_buffer::MAX_CAPACITY;
use crate::{AicaError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default output sample rate (44.1 kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Streaming driver configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Largest buffer half negotiated at init, in samples per voice.
    /// Clamped to 16384 so both halves fit the 16-bit loop end register.
    pub max_samples: usize,

    /// Buffer half requested at stream start, in samples per voice.
    /// Larger halves mean more latency but fewer refills.
    pub half_samples: usize,

    /// Output rate the stream starts at, in Hz
    pub sample_rate: u32,

    /// Voice routing at stream start
    pub stereo_mode: StereoMode,

    /// Position polling period of the streaming thread, in microseconds
    pub poll_interval_us: u64,

    /// Run the streaming thread. When false the host drives refills by
    /// calling `Player::poll_stream` from its own loop.
    pub threaded: bool,
}

impl StreamConfig {
    /// Small halves, fast polling.
    /// Half = 256 samples ≈ 6ms @ 44.1kHz
    pub fn low_latency(sample_rate: u32) -> Self {
        StreamConfig {
            max_samples: 1 << 12,
            half_samples: 256,
            sample_rate,
            stereo_mode: StereoMode::Stereo,
            poll_interval_us: 1_000_000 / 480,
            threaded: true,
        }
    }

    /// Large halves, relaxed polling.
    /// Half = 1200 samples ≈ 27ms @ 44.1kHz
    pub fn stable(sample_rate: u32) -> Self {
        StreamConfig {
            max_samples: 1 << 14,
            half_samples: 1200,
            sample_rate,
            stereo_mode: StereoMode::Stereo,
            poll_interval_us: 1_000_000 / 240,
            threaded: true,
        }
    }

    /// Hardware-side latency of both halves in milliseconds
    pub fn latency_ms(&self) -> f32 {
        ((2 * self.half_samples) as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Position polling period
    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::stable(DEFAULT_SAMPLE_RATE)
    }
}

/// Priority feedback thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Occupancy (per mille) above which the decoder runs at normal priority
    pub relaxed_threshold: usize,

    /// Occupancy (per mille) above which the decoder is boosted; below it
    /// the emergency level applies
    pub boost_threshold: usize,

    /// Time since the ring buffer was last empty before any boost, in ms
    pub min_time_before_boost_ms: u64,

    /// Pin the decoder priority, bypassing feedback
    pub forced_priority: Option<PriorityLevel>,
}

impl SchedulerConfig {
    /// Boost delay as a duration
    pub fn min_time_before_boost(&self) -> Duration {
        Duration::from_millis(self.min_time_before_boost_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            relaxed_threshold: 40,
            boost_threshold: 20,
            min_time_before_boost_ms: 1000,
            forced_priority: None,
        }
    }
}

/// Complete player configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Ring buffer slots in stereo frames
    pub ring_capacity: usize,

    /// Initial linear volume (0-255)
    pub volume: u8,

    /// Streaming driver settings
    pub stream: StreamConfig,

    /// Priority feedback settings
    pub scheduler: SchedulerConfig,

    /// Decoder thread sleep at normal priority when a decoder has no more
    /// immediate work, in microseconds
    pub idle_sleep_us: u64,

    /// Bound on every state-transition wait, in ms
    pub state_timeout_ms: u64,

    /// Period of the "still waiting" diagnostic during state waits, in ms
    pub state_log_interval_ms: u64,
}

impl PlayerConfig {
    /// Small ring buffer and stream halves
    pub fn low_latency() -> Self {
        PlayerConfig {
            ring_capacity: 1 << 14,
            stream: StreamConfig::low_latency(DEFAULT_SAMPLE_RATE),
            idle_sleep_us: 1_000,
            ..Self::default()
        }
    }

    /// Large ring buffer and stream halves
    pub fn stable() -> Self {
        PlayerConfig {
            ring_capacity: 1 << 18,
            volume: 255,
            stream: StreamConfig::stable(DEFAULT_SAMPLE_RATE),
            scheduler: SchedulerConfig::default(),
            idle_sleep_us: 3_333,
            state_timeout_ms: 5_000,
            state_log_interval_ms: 1_000,
        }
    }

    /// Parse a JSON document, filling missing fields with defaults
    ///
    /// # Errors
    ///
    /// Returns [`AicaError::Config`] on malformed JSON or invalid values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PlayerConfig = serde_json::from_str(json)
            .map_err(|e| AicaError::Config(format!("malformed configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    ///
    /// # Errors
    ///
    /// Returns [`AicaError::Io`] if the file cannot be read, otherwise as
    /// [`PlayerConfig::from_json_str`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check ranges and cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns [`AicaError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.ring_capacity < 2 || self.ring_capacity > MAX_CAPACITY {
            return Err(AicaError::Config(format!(
                "ring_capacity must be in 2..={MAX_CAPACITY}, got {}",
                self.ring_capacity
            )));
        }
        if self.stream.max_samples == 0 || self.stream.half_samples == 0 {
            return Err(AicaError::Config(
                "stream buffer sizes must be greater than 0".into(),
            ));
        }
        if self.stream.sample_rate == 0 {
            return Err(AicaError::Config("sample_rate must be greater than 0".into()));
        }
        if self.stream.poll_interval_us == 0 {
            return Err(AicaError::Config(
                "poll_interval_us must be greater than 0".into(),
            ));
        }
        let sched = &self.scheduler;
        if sched.relaxed_threshold > 1000 || sched.boost_threshold > sched.relaxed_threshold {
            return Err(AicaError::Config(format!(
                "scheduler thresholds must satisfy boost ({}) <= relaxed ({}) <= 1000",
                sched.boost_threshold, sched.relaxed_threshold
            )));
        }
        if self.state_timeout_ms == 0 {
            return Err(AicaError::Config(
                "state_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// State wait bound as a duration
    pub fn state_timeout(&self) -> Duration {
        Duration::from_millis(self.state_timeout_ms)
    }

    /// State wait diagnostic period as a duration
    pub fn state_log_interval(&self) -> Duration {
        Duration::from_millis(self.state_log_interval_ms.max(1))
    }

    /// Normal-priority idle sleep as a duration
    pub fn idle_sleep(&self) -> Duration {
        Duration::from_micros(self.idle_sleep_us)
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self::stable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_config_latency() {
        let config = StreamConfig::stable(44_100);
        let latency = config.latency_ms();
        assert!(latency > 54.0 && latency < 55.0, "latency {latency}");
        assert!(StreamConfig::low_latency(44_100).latency_ms() < latency);
    }

    #[test]
    fn test_defaults_validate() {
        PlayerConfig::default().validate().unwrap();
        PlayerConfig::low_latency().validate().unwrap();
        assert_eq!(PlayerConfig::default().scheduler.relaxed_threshold, 40);
        assert_eq!(
            PlayerConfig::default().scheduler.min_time_before_boost(),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_partial_json() {
        let config = PlayerConfig::from_json_str(
            r#"{ "ring_capacity": 4096, "scheduler": { "forced_priority": "Boost" } }"#,
        )
        .unwrap();
        assert_eq!(config.ring_capacity, 4096);
        assert_eq!(config.volume, 255);
        assert_eq!(config.scheduler.forced_priority, Some(PriorityLevel::Boost));
        assert_eq!(config.scheduler.boost_threshold, 20);
    }

    #[test]
    fn test_invalid_config() {
        let err = PlayerConfig::from_json_str(r#"{ "ring_capacity": 0 }"#).unwrap_err();
        assert!(matches!(err, AicaError::Config(_)));

        let err = PlayerConfig::from_json_str("{ not json").unwrap_err();
        assert!(err.to_string().contains("malformed"));

        let mut config = PlayerConfig::default();
        config.scheduler.boost_threshold = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.json");
        let config = PlayerConfig::low_latency();
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
        assert_eq!(PlayerConfig::from_json_file(&path).unwrap(), config);

        let missing = PlayerConfig::from_json_file(dir.path().join("absent.json"));
        assert!(matches!(missing, Err(AicaError::Io(_))));
    }
}
