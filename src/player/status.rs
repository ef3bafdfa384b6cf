//! Decoder thread states

use std::fmt;

/// State of the decoder thread.
///
/// `Init → Ready → Playing → Stopping → Ready → … → Quit → Zombie`.
/// `Starting` and `Reinit` are transient and fall through on the next
/// iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlayerStatus {
    /// Thread spawned, not yet idle
    #[default]
    Init = 0,
    /// Idle, blocked until a track is started
    Ready = 1,
    /// About to play
    Starting = 2,
    /// Decoding into the ring buffer
    Playing = 3,
    /// Releasing the decoder
    Stopping = 4,
    /// Asked to exit
    Quit = 5,
    /// Thread has exited
    Zombie = 6,
    /// Re-initializing, returns to `Ready`
    Reinit = 7,
}

impl PlayerStatus {
    /// Upper-case state name
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerStatus::Init => "INIT",
            PlayerStatus::Ready => "READY",
            PlayerStatus::Starting => "STARTING",
            PlayerStatus::Playing => "PLAYING",
            PlayerStatus::Stopping => "STOPPING",
            PlayerStatus::Quit => "QUIT",
            PlayerStatus::Zombie => "ZOMBIE",
            PlayerStatus::Reinit => "REINIT",
        }
    }

    /// Whether the decoder thread has exited or is about to
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlayerStatus::Quit | PlayerStatus::Zombie)
    }
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_names() {
        assert_eq!(PlayerStatus::Ready.to_string(), "READY");
        assert_eq!(PlayerStatus::Reinit.as_str(), "REINIT");
        assert_eq!(PlayerStatus::default(), PlayerStatus::Init);
        assert!(PlayerStatus::Zombie.is_terminal());
        assert!(!PlayerStatus::Playing.is_terminal());
    }
}
