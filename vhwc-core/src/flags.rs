//! Bitflag sets shared by the layer model and the plane-assignment seam.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Per-frame change facts for one layer. Every bit is independent.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LayerState: u32 {
        const CONTENT_CHANGED    = 1 << 0;
        const DIMENSIONS_CHANGED = 1 << 1;
        const CLEAR_SURFACE      = 1 << 2;
        const INVISIBLE          = 1 << 3;
        const SOURCE_RECT_CHANGED = 1 << 4;
        const NEEDS_REVALIDATION = 1 << 5;
    }
}

impl LayerState {
    /// Every bit that describes a difference from the previous frame.
    /// `INVISIBLE` is a property of the current frame only.
    pub const CHANGE_BITS: Self = Self::CONTENT_CHANGED
        .union(Self::DIMENSIONS_CHANGED)
        .union(Self::CLEAR_SURFACE)
        .union(Self::SOURCE_RECT_CHANGED)
        .union(Self::NEEDS_REVALIDATION);
}

bitflags! {
    /// Which composition paths a layer can take (or took).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LayerComposition: u32 {
        /// Needs a GPU composition pass.
        const GPU     = 1 << 0;
        /// The display engine can scan the buffer out directly.
        const DISPLAY = 1 << 1;
        const ALL = Self::GPU.bits() | Self::DISPLAY.bits();
    }
}

bitflags! {
    /// Surface-local rotation and flip.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Transform: u32 {
        const REFLECT_X  = 1 << 0;
        const REFLECT_Y  = 1 << 1;
        const ROTATE_90  = 1 << 2;
        const ROTATE_180 = 1 << 3;
        const ROTATE_270 = 1 << 4;
    }
}

impl Transform {
    const ROTATIONS: Self = Self::ROTATE_90
        .union(Self::ROTATE_180)
        .union(Self::ROTATE_270);

    /// Clockwise quarter turns encoded in the rotation bits (0..=3).
    pub fn quarter_turns(self) -> u32 {
        let mut turns = 0;
        if self.contains(Self::ROTATE_90) {
            turns += 1;
        }
        if self.contains(Self::ROTATE_180) {
            turns += 2;
        }
        if self.contains(Self::ROTATE_270) {
            turns += 3;
        }
        turns % 4
    }

    /// Replace the rotation bits with a single bit for `turns` quarter turns.
    pub fn with_quarter_turns(self, turns: u32) -> Self {
        let reflections = self.difference(Self::ROTATIONS);
        reflections
            | match turns % 4 {
                1 => Self::ROTATE_90,
                2 => Self::ROTATE_180,
                3 => Self::ROTATE_270,
                _ => Self::empty(),
            }
    }

    /// Rotate this transform further by the display's output rotation.
    pub fn compose(self, display: Rotation) -> Self {
        self.with_quarter_turns(self.quarter_turns() + display.quarter_turns())
    }

    /// True when the plane swaps the buffer's axes.
    pub fn swaps_axes(self) -> bool {
        self.quarter_turns() % 2 == 1
    }

    /// Rotation in degrees, as carried in the remote buffer record.
    pub fn degrees(self) -> i32 {
        self.quarter_turns() as i32 * 90
    }
}

// ── Rotation ─────────────────────────────────────────────────────

/// Output rotation applied by a display to everything it shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    None,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Rotation {
    pub const fn quarter_turns(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Rotate90 => 1,
            Rotation::Rotate180 => 2,
            Rotation::Rotate270 => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_bits_exclude_invisible() {
        assert!(!LayerState::CHANGE_BITS.contains(LayerState::INVISIBLE));
        assert!(LayerState::CHANGE_BITS.contains(LayerState::NEEDS_REVALIDATION));
        assert_eq!(LayerState::CHANGE_BITS.bits().count_ones(), 5);
    }

    #[test]
    fn compose_adds_quarter_turns() {
        let t = Transform::ROTATE_90.compose(Rotation::Rotate270);
        assert_eq!(t, Transform::empty());

        let t = Transform::ROTATE_180.compose(Rotation::Rotate90);
        assert_eq!(t, Transform::ROTATE_270);
        assert!(t.swaps_axes());
        assert_eq!(t.degrees(), 270);
    }

    #[test]
    fn compose_keeps_reflections() {
        let t = (Transform::REFLECT_X | Transform::ROTATE_90).compose(Rotation::Rotate90);
        assert_eq!(t, Transform::REFLECT_X | Transform::ROTATE_180);
    }

    #[test]
    fn identity_under_no_rotation() {
        let t = Transform::REFLECT_Y.compose(Rotation::None);
        assert_eq!(t, Transform::REFLECT_Y);
        assert_eq!(t.quarter_turns(), 0);
    }
}
