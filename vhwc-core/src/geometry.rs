//! Edge-based rectangles for buffer-space and display-space geometry.

/// Coordinate types a [`Rect`] can be built from.
pub trait Coord: Copy + PartialOrd + Default {
    /// Distance from `from` to `to`, for `to > from`.
    fn span(from: Self, to: Self) -> Self;
}

impl Coord for i32 {
    /// Saturates at `i32::MAX` for edges further apart than `i32` can hold.
    fn span(from: Self, to: Self) -> Self {
        to.saturating_sub(from)
    }
}

impl Coord for f32 {
    fn span(from: Self, to: Self) -> Self {
        to - from
    }
}

/// A rectangle stored as its four edges.
///
/// `right`/`bottom` are exclusive. A rectangle whose right edge is not past
/// its left edge (or bottom not past top) is empty.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect<T> {
    pub left: T,
    pub top: T,
    pub right: T,
    pub bottom: T,
}

impl<T: Coord> Rect<T> {
    pub const fn new(left: T, top: T, right: T, bottom: T) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Horizontal extent, never negative.
    pub fn width(&self) -> T {
        if self.right > self.left {
            T::span(self.left, self.right)
        } else {
            T::default()
        }
    }

    /// Vertical extent, never negative.
    pub fn height(&self) -> T {
        if self.bottom > self.top {
            T::span(self.top, self.bottom)
        } else {
            T::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.right > self.left && self.bottom > self.top)
    }
}

impl Rect<i32> {
    /// Clip the bottom edge to `max_height`.
    pub fn clip_to_height(&self, max_height: u32) -> Self {
        let limit = i32::try_from(max_height).unwrap_or(i32::MAX);
        Self {
            bottom: self.bottom.min(limit),
            ..*self
        }
    }
}

impl Rect<f32> {
    /// Size rounded to whole pixels.
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            self.width().round() as u32,
            self.height().round() as u32,
        )
    }
}
