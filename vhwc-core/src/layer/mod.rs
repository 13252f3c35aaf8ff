//! Per-frame compositing layers.
//!
//! An [`OverlayLayer`] is built fresh every refresh from a caller
//! [`Surface`] and diffed against the layer that occupied the same z-order
//! in the previous frame. The resulting [`LayerState`] tells the
//! plane-assignment side which decisions it can reuse.
//!
//! ## Sub-modules
//!
//! | Module     | Purpose                                                |
//! |----------- |--------------------------------------------------------|
//! | `surface`  | Caller-facing surface description                      |
//! | `validate` | Frame-over-frame diffing and composition eligibility    |
//! | `stack`    | Previous-frame array and z-order assignment            |

use std::sync::Arc;

use tracing::trace;

use crate::buffer::{AcquireFence, OverlayBuffer};
use crate::flags::{LayerComposition, LayerState, Transform};
use crate::geometry::Rect;

pub mod stack;
pub mod surface;
mod validate;

pub use stack::LayerStack;
pub use surface::{Blending, LayerType, Surface};
pub use validate::Placement;

// ── ImportedBuffer ───────────────────────────────────────────────

/// A shared buffer reference paired with the fence guarding it.
#[derive(Debug)]
struct ImportedBuffer {
    buffer: Arc<OverlayBuffer>,
    acquire_fence: AcquireFence,
}

impl ImportedBuffer {
    fn new(buffer: Arc<OverlayBuffer>, acquire_fence: AcquireFence) -> Self {
        Self {
            buffer,
            acquire_fence,
        }
    }
}

impl Drop for ImportedBuffer {
    fn drop(&mut self) {
        if !self.acquire_fence.is_signaled() {
            trace!(
                handle = ?self.buffer.handle(),
                fence = self.acquire_fence.0,
                "abandoning unconsumed acquire fence"
            );
        }
    }
}

// ── OverlayLayer ─────────────────────────────────────────────────

/// One surface's state for a single frame.
#[derive(Debug)]
pub struct OverlayLayer {
    z_order: u32,
    layer_index: u32,
    source_crop: Rect<f32>,
    display_frame: Rect<i32>,
    surface_damage: Rect<i32>,
    source_crop_width: u32,
    source_crop_height: u32,
    display_frame_width: u32,
    display_frame_height: u32,
    alpha: u8,
    blending: Blending,
    transform: Transform,
    plane_transform: Transform,
    layer_type: LayerType,
    display_scaled: bool,
    supported_composition: LayerComposition,
    actual_composition: LayerComposition,
    state: LayerState,
    imported_buffer: Option<ImportedBuffer>,
}

impl Default for OverlayLayer {
    fn default() -> Self {
        Self {
            z_order: 0,
            layer_index: 0,
            source_crop: Rect::default(),
            display_frame: Rect::default(),
            surface_damage: Rect::default(),
            source_crop_width: 0,
            source_crop_height: 0,
            display_frame_width: 0,
            display_frame_height: 0,
            alpha: 0xff,
            blending: Blending::None,
            transform: Transform::empty(),
            plane_transform: Transform::empty(),
            layer_type: LayerType::Normal,
            display_scaled: false,
            supported_composition: LayerComposition::GPU,
            actual_composition: LayerComposition::empty(),
            state: LayerState::CONTENT_CHANGED | LayerState::DIMENSIONS_CHANGED,
            imported_buffer: None,
        }
    }
}

impl OverlayLayer {
    pub fn z_order(&self) -> u32 {
        self.z_order
    }

    /// Index of the caller surface this layer represents.
    pub fn layer_index(&self) -> u32 {
        self.layer_index
    }

    pub fn alpha(&self) -> u8 {
        self.alpha
    }

    pub fn blending(&self) -> Blending {
        self.blending
    }

    pub fn set_blending(&mut self, blending: Blending) {
        self.blending = blending;
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    /// The layer's own transform composed with the display's output rotation.
    pub fn plane_transform(&self) -> Transform {
        self.plane_transform
    }

    pub fn source_crop(&self) -> &Rect<f32> {
        &self.source_crop
    }

    pub fn set_source_crop(&mut self, crop: Rect<f32>) {
        self.source_crop = crop;
        let (width, height) = crop.pixel_size();
        self.source_crop_width = width;
        self.source_crop_height = height;
    }

    pub fn display_frame(&self) -> &Rect<i32> {
        &self.display_frame
    }

    pub fn set_display_frame(&mut self, frame: Rect<i32>) {
        self.display_frame = frame;
        self.display_frame_width = frame.width() as u32;
        self.display_frame_height = frame.height() as u32;
    }

    pub fn surface_damage(&self) -> &Rect<i32> {
        &self.surface_damage
    }

    pub fn source_crop_width(&self) -> u32 {
        self.source_crop_width
    }

    pub fn source_crop_height(&self) -> u32 {
        self.source_crop_height
    }

    pub fn display_frame_width(&self) -> u32 {
        self.display_frame_width
    }

    pub fn display_frame_height(&self) -> u32 {
        self.display_frame_height
    }

    pub fn layer_type(&self) -> LayerType {
        self.layer_type
    }

    pub fn state(&self) -> LayerState {
        self.state
    }

    pub fn buffer(&self) -> Option<&Arc<OverlayBuffer>> {
        self.imported_buffer.as_ref().map(|imported| &imported.buffer)
    }

    pub fn acquire_fence(&self) -> AcquireFence {
        self.imported_buffer
            .as_ref()
            .map_or(AcquireFence::SIGNALED, |imported| imported.acquire_fence)
    }

    /// Hand the acquire fence over to the caller, leaving a signalled one.
    pub fn take_acquire_fence(&mut self) -> AcquireFence {
        match self.imported_buffer.as_mut() {
            Some(imported) => std::mem::take(&mut imported.acquire_fence),
            None => AcquireFence::SIGNALED,
        }
    }

    // ── State queries ────────────────────────────────────────────

    pub fn has_content_changed(&self) -> bool {
        self.state.contains(LayerState::CONTENT_CHANGED)
    }

    pub fn has_dimensions_changed(&self) -> bool {
        self.state.contains(LayerState::DIMENSIONS_CHANGED)
    }

    pub fn has_source_rect_changed(&self) -> bool {
        self.state.contains(LayerState::SOURCE_RECT_CHANGED)
    }

    /// Attributes differ from the last frame; the plane decision for this
    /// z-order must be recomputed.
    pub fn needs_revalidation(&self) -> bool {
        self.state.contains(LayerState::NEEDS_REVALIDATION)
    }

    /// Pixels composited for this slot last frame are stale.
    pub fn needs_to_clear_surface(&self) -> bool {
        self.state.contains(LayerState::CLEAR_SURFACE)
    }

    pub fn is_visible(&self) -> bool {
        !self.state.contains(LayerState::INVISIBLE)
    }

    // ── Composition ──────────────────────────────────────────────

    pub fn supported_composition(&self) -> LayerComposition {
        self.supported_composition
    }

    pub fn actual_composition(&self) -> LayerComposition {
        self.actual_composition
    }

    /// Record which path the plane manager actually used this frame.
    pub fn set_layer_composition(&mut self, value: LayerComposition) {
        self.actual_composition = value;
    }

    pub fn can_scan_out(&self) -> bool {
        self.supported_composition.contains(LayerComposition::DISPLAY)
    }

    pub fn is_gpu_rendered(&self) -> bool {
        self.actual_composition.contains(LayerComposition::GPU)
    }

    pub fn is_cursor_layer(&self) -> bool {
        self.layer_type == LayerType::Cursor
    }

    pub fn is_video_layer(&self) -> bool {
        self.layer_type == LayerType::Video
    }

    pub fn is_using_plane_scalar(&self) -> bool {
        self.display_scaled
    }

    pub fn use_plane_scalar(&mut self, value: bool) {
        self.display_scaled = value;
    }

    /// Media buffers get a plane of their own instead of sharing a
    /// composition pass.
    pub fn prefer_separate_plane(&self) -> bool {
        self.layer_type == LayerType::Video
    }
}
