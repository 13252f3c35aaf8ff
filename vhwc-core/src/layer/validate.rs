//! Frame-over-frame validation for [`OverlayLayer`].

use tracing::warn;

use super::{Blending, ImportedBuffer, LayerType, OverlayLayer, Surface};
use crate::buffer::{AcquireFence, NativeHandle, ResourceManager};
use crate::error::HwcError;
use crate::flags::{LayerComposition, LayerState, Rotation, Transform};
use crate::geometry::Rect;

/// Where a layer sits in the frame and what constrains it.
#[derive(Debug, Clone, Copy)]
pub struct Placement {
    pub z_order: u32,
    pub layer_index: u32,
    pub max_height: u32,
    pub rotation: Rotation,
    /// Clip geometry to `max_height` instead of only testing visibility.
    pub honor_constraints: bool,
}

impl OverlayLayer {
    /// Build this frame's layer for `surface`.
    ///
    /// `previous` is the layer that held the same z-order last frame, if any.
    /// A buffer that fails to import leaves the layer invisible.
    pub fn from_surface(
        surface: &Surface,
        manager: &mut ResourceManager,
        previous: Option<&OverlayLayer>,
        placement: Placement,
    ) -> Self {
        let mut layer = OverlayLayer {
            state: LayerState::empty(),
            ..OverlayLayer::default()
        };
        layer.initialize_from_surface(surface, manager, previous, placement);
        layer
    }

    fn initialize_from_surface(
        &mut self,
        surface: &Surface,
        manager: &mut ResourceManager,
        previous: Option<&OverlayLayer>,
        placement: Placement,
    ) {
        self.z_order = placement.z_order;
        self.layer_index = placement.layer_index;
        self.alpha = surface.alpha;
        self.blending = surface.blending;
        self.layer_type = surface.layer_type;

        let clipped = surface.display_frame.clip_to_height(placement.max_height);
        if placement.honor_constraints && clipped != surface.display_frame {
            self.set_display_frame(clipped);
            self.set_source_crop(trim_crop(
                surface.source_crop,
                &surface.display_frame,
                &clipped,
            ));
        } else {
            self.set_display_frame(surface.display_frame);
            self.set_source_crop(surface.source_crop);
        }

        self.validate_transform(surface.transform, placement.rotation);

        let mut bound = true;
        if let Some(handle) = surface.handle {
            if let Err(e) = self.set_buffer(handle, surface.acquire_fence, manager, true) {
                warn!(z_order = self.z_order, "dropping layer: {e}");
                bound = false;
            }
        }

        if !surface.visible || surface.alpha == 0 || clipped.is_empty() || !bound {
            self.state |= LayerState::INVISIBLE;
        }

        self.validate_for_overlay_usage();
        self.validate_previous_frame_state(previous, surface);
        self.update_surface_damage(surface);
    }

    /// Replace the bound buffer and its fence.
    ///
    /// The previous binding is released; an unconsumed fence on it is
    /// abandoned, so callers wait on or transfer it first.
    pub fn set_buffer(
        &mut self,
        handle: NativeHandle,
        acquire_fence: AcquireFence,
        manager: &mut ResourceManager,
        register_buffer: bool,
    ) -> Result<(), HwcError> {
        self.imported_buffer = None;
        let buffer = manager.acquire(handle, register_buffer)?;
        self.imported_buffer = Some(ImportedBuffer::new(buffer, acquire_fence));
        Ok(())
    }

    /// Compose the surface transform with the display rotation and decide
    /// whether the plane has to scale.
    pub(crate) fn validate_transform(&mut self, transform: Transform, display: Rotation) {
        self.transform = transform;
        self.plane_transform = transform.compose(display);

        let (src_w, src_h) = if self.plane_transform.swaps_axes() {
            (self.source_crop_height, self.source_crop_width)
        } else {
            (self.source_crop_width, self.source_crop_height)
        };
        self.display_scaled =
            src_w != self.display_frame_width || src_h != self.display_frame_height;
    }

    /// Decide which composition paths this layer supports.
    pub(crate) fn validate_for_overlay_usage(&mut self) {
        let Some(buffer) = self.buffer() else {
            self.supported_composition = LayerComposition::GPU;
            return;
        };

        let format_ok = buffer.format().is_scanout_supported();
        // Coverage blending with partial plane alpha has no scanout equivalent.
        let blend_ok = !(self.blending == Blending::Coverage && self.alpha != 0xff);
        let scale_ok = !(self.display_scaled && self.layer_type == LayerType::Cursor);

        self.supported_composition = if format_ok && blend_ok && scale_ok {
            LayerComposition::ALL
        } else {
            LayerComposition::GPU
        };
    }

    /// Diff against the layer at the same z-order in the previous frame.
    pub(crate) fn validate_previous_frame_state(
        &mut self,
        previous: Option<&OverlayLayer>,
        surface: &Surface,
    ) {
        let Some(prev) = previous.filter(|p| p.is_visible()) else {
            self.state |= LayerState::CHANGE_BITS;
            return;
        };

        if surface.content_changed {
            self.state |= LayerState::CONTENT_CHANGED;
        }

        let dims_changed = self.display_frame_width != prev.display_frame_width
            || self.display_frame_height != prev.display_frame_height
            || self.source_crop_width != prev.source_crop_width
            || self.source_crop_height != prev.source_crop_height;
        if dims_changed {
            self.state |= LayerState::DIMENSIONS_CHANGED;
        }

        if self.source_crop != prev.source_crop {
            self.state |= LayerState::SOURCE_RECT_CHANGED;
        }

        let now_scanout = prev.is_gpu_rendered() && !prev.can_scan_out() && self.can_scan_out();
        let lost_scanout = prev
            .actual_composition
            .contains(LayerComposition::DISPLAY)
            && !self.can_scan_out();
        if now_scanout || lost_scanout {
            self.state |= LayerState::CLEAR_SURFACE;
        }

        let attributes_changed = self.display_frame != prev.display_frame
            || self.source_crop != prev.source_crop
            || self.transform != prev.transform
            || self.plane_transform != prev.plane_transform
            || self.blending != prev.blending
            || self.alpha != prev.alpha
            || self.layer_type != prev.layer_type
            || self.display_scaled != prev.display_scaled
            || self.supported_composition != prev.supported_composition;
        if attributes_changed {
            self.state |= LayerState::NEEDS_REVALIDATION;
        }
    }

    fn update_surface_damage(&mut self, surface: &Surface) {
        self.surface_damage = if !self.has_content_changed() {
            Rect::default()
        } else if surface.surface_damage.is_empty() {
            self.display_frame
        } else {
            surface.surface_damage
        };
    }
}

/// Trim the bottom of `crop` by the share of `frame` that `clipped` removed.
fn trim_crop(crop: Rect<f32>, frame: &Rect<i32>, clipped: &Rect<i32>) -> Rect<f32> {
    let full = frame.height();
    if full == 0 {
        return crop;
    }
    let removed = (full - clipped.height()) as f32 / full as f32;
    Rect {
        bottom: crop.bottom - crop.height() * removed,
        ..crop
    }
}
