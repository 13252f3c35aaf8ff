//! Caller-supplied surface descriptions.

use crate::buffer::{AcquireFence, NativeHandle};
use crate::flags::Transform;
use crate::geometry::Rect;

/// How a layer's pixels combine with what lies beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Blending {
    #[default]
    None,
    Premultiplied,
    Coverage,
}

/// Classification that steers plane selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LayerType {
    #[default]
    Normal,
    Cursor,
    Video,
}

/// One surface as handed over by the caller for a single refresh.
///
/// A surface without a handle is a clear-to-color layer.
#[derive(Debug, Clone)]
pub struct Surface {
    pub handle: Option<NativeHandle>,
    pub acquire_fence: AcquireFence,
    pub source_crop: Rect<f32>,
    pub display_frame: Rect<i32>,
    /// Region changed since the last frame, in display space.
    pub surface_damage: Rect<i32>,
    pub alpha: u8,
    pub blending: Blending,
    pub transform: Transform,
    pub layer_type: LayerType,
    /// The producer queued new content for this frame.
    pub content_changed: bool,
    /// The surface's visible region is non-empty.
    pub visible: bool,
}

impl Surface {
    /// An opaque, unscaled surface showing all of a `width × height` buffer
    /// at `display_frame`.
    pub fn new(handle: NativeHandle, width: u32, height: u32, display_frame: Rect<i32>) -> Self {
        Self {
            handle: Some(handle),
            acquire_fence: AcquireFence::SIGNALED,
            source_crop: Rect::new(0.0, 0.0, width as f32, height as f32),
            display_frame,
            surface_damage: Rect::default(),
            alpha: 0xff,
            blending: Blending::None,
            transform: Transform::empty(),
            layer_type: LayerType::Normal,
            content_changed: false,
            visible: true,
        }
    }

    /// A layer filled with a solid color; it binds no buffer.
    pub fn solid_color(display_frame: Rect<i32>) -> Self {
        Self {
            handle: None,
            source_crop: Rect::default(),
            ..Self::new(NativeHandle(0), 0, 0, display_frame)
        }
    }

    pub fn with_source_crop(mut self, crop: Rect<f32>) -> Self {
        self.source_crop = crop;
        self
    }

    pub fn with_alpha(mut self, alpha: u8) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_blending(mut self, blending: Blending) -> Self {
        self.blending = blending;
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_layer_type(mut self, layer_type: LayerType) -> Self {
        self.layer_type = layer_type;
        self
    }

    pub fn with_acquire_fence(mut self, fence: AcquireFence) -> Self {
        self.acquire_fence = fence;
        self
    }

    /// Mark new content, optionally limited to `damage`.
    pub fn with_new_content(mut self, damage: Rect<i32>) -> Self {
        self.content_changed = true;
        self.surface_damage = damage;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}
