//! Occupancy-driven decoder priority
//!
//! The streaming thread reports ring buffer occupancy on every pull. When the
//! buffer runs low the decoder thread is boosted; boosting is held off for a
//! while after the buffer was last empty so a track start does not starve
//! everything else.

use crate::config::SchedulerConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// Decoder thread priority level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum PriorityLevel {
    /// Plenty buffered: decode at leisure
    #[default]
    Normal = 0,
    /// Buffer getting low
    Boost = 1,
    /// Buffer nearly drained
    Emergency = 2,
}

impl PriorityLevel {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PriorityLevel::Boost,
            2 => PriorityLevel::Emergency,
            _ => PriorityLevel::Normal,
        }
    }

    /// How long the decoder thread rests between calls that produced no
    /// immediate work. `None` means yield only.
    pub fn idle_sleep(&self, normal: Duration) -> Option<Duration> {
        match self {
            PriorityLevel::Normal => Some(normal),
            PriorityLevel::Boost => Some(normal / 4),
            PriorityLevel::Emergency => None,
        }
    }
}

/// Platform hook receiving priority changes for the decoder thread
pub trait PriorityHook: Send + Sync {
    /// Called from the decoder thread whenever the published level changes
    fn apply(&self, level: PriorityLevel);
}

/// Priority feedback scheduler
pub struct PriorityScheduler {
    config: SchedulerConfig,
    level: AtomicU8,
    /// Last time the ring buffer was seen empty
    empty_since: Mutex<Instant>,
}

impl PriorityScheduler {
    /// Create a scheduler at normal priority
    pub fn new(config: SchedulerConfig) -> Self {
        PriorityScheduler {
            level: AtomicU8::new(config.forced_priority.unwrap_or_default() as u8),
            config,
            empty_since: Mutex::new(Instant::now()),
        }
    }

    /// Published level
    pub fn level(&self) -> PriorityLevel {
        PriorityLevel::from_u8(self.level.load(Ordering::Acquire))
    }

    /// Evaluate occupancy now
    pub fn update(&self, used: usize, size: usize) -> PriorityLevel {
        self.update_at(used, size, Instant::now())
    }

    /// Evaluate occupancy at a given instant
    pub fn update_at(&self, used: usize, size: usize, now: Instant) -> PriorityLevel {
        if let Some(forced) = self.config.forced_priority {
            self.publish(forced);
            return forced;
        }

        let mut empty_since = self.empty_since.lock();
        if used == 0 {
            *empty_since = now;
            self.publish(PriorityLevel::Normal);
            return PriorityLevel::Normal;
        }

        let delay = self.config.min_time_before_boost();
        if now.saturating_duration_since(*empty_since) <= delay {
            return self.level();
        }
        // keep the delay satisfied without the gap growing
        *empty_since = now.checked_sub(delay).unwrap_or(*empty_since);

        let ratio = used * 1000 / size.max(1);
        let level = if ratio > self.config.relaxed_threshold {
            PriorityLevel::Normal
        } else if ratio > self.config.boost_threshold {
            PriorityLevel::Boost
        } else {
            PriorityLevel::Emergency
        };
        self.publish(level);
        level
    }

    fn publish(&self, level: PriorityLevel) {
        self.level.store(level as u8, Ordering::Release);
    }
}
