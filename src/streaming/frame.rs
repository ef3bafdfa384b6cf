//! Stereo sample frame

/// One 16-bit sample per lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StereoFrame {
    /// Left lane
    pub left: i16,
    /// Right lane
    pub right: i16,
}

impl StereoFrame {
    /// Silent frame
    pub const SILENCE: StereoFrame = StereoFrame { left: 0, right: 0 };

    /// Create a frame from two lanes
    #[inline]
    pub const fn new(left: i16, right: i16) -> Self {
        StereoFrame { left, right }
    }

    /// Same sample on both lanes
    #[inline]
    pub const fn mono(sample: i16) -> Self {
        StereoFrame {
            left: sample,
            right: sample,
        }
    }

    /// Whether both lanes are zero
    #[inline]
    pub fn is_silent(self) -> bool {
        self.left == 0 && self.right == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_duplicates() {
        let frame = StereoFrame::mono(-300);
        assert_eq!(frame.left, frame.right);
        assert!(!frame.is_silent());
        assert!(StereoFrame::SILENCE.is_silent());
    }
}
