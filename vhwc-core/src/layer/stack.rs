//! The previous-frame array and z-order assignment.

use std::collections::HashSet;

use crate::buffer::{NativeHandle, ResourceManager};
use crate::flags::Rotation;
use crate::layer::{OverlayLayer, Placement, Surface};

/// Holds last frame's layers so the next frame can be diffed against them.
///
/// One frame at a time: [`build_frame`](Self::build_frame) reads the
/// snapshot, and [`commit`](Self::commit) replaces it once the frame has
/// been consumed.
#[derive(Debug, Default)]
pub struct LayerStack {
    previous: Vec<OverlayLayer>,
    max_height: u32,
    rotation: Rotation,
    honor_constraints: bool,
}

impl LayerStack {
    pub fn new(max_height: u32, rotation: Rotation) -> Self {
        Self {
            previous: Vec::new(),
            max_height,
            rotation,
            honor_constraints: false,
        }
    }

    /// Clip layer geometry to the display height instead of only hiding
    /// layers that fall entirely below it.
    pub fn with_constraints(mut self, honor: bool) -> Self {
        self.honor_constraints = honor;
        self
    }

    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
    }

    /// Wrap `surfaces` into layers in paint order.
    ///
    /// Z-orders are assigned from the caller's order, so they are unique
    /// within the frame.
    pub fn build_frame(
        &self,
        surfaces: &[Surface],
        manager: &mut ResourceManager,
    ) -> Vec<OverlayLayer> {
        surfaces
            .iter()
            .enumerate()
            .map(|(index, surface)| {
                let z_order = index as u32;
                OverlayLayer::from_surface(
                    surface,
                    manager,
                    self.previous_at(z_order),
                    Placement {
                        z_order,
                        layer_index: index as u32,
                        max_height: self.max_height,
                        rotation: self.rotation,
                        honor_constraints: self.honor_constraints,
                    },
                )
            })
            .collect()
    }

    /// Make `layers` the snapshot the next frame is diffed against.
    ///
    /// Buffers pinned in `manager` that no committed layer binds are
    /// released.
    pub fn commit(&mut self, layers: Vec<OverlayLayer>, manager: &mut ResourceManager) {
        let in_use: HashSet<NativeHandle> = layers
            .iter()
            .filter_map(|layer| layer.buffer().map(|b| b.handle()))
            .collect();
        manager.retain(|handle| in_use.contains(&handle));
        self.previous = layers;
    }

    /// Forget the snapshot; every slot of the next frame counts as new.
    pub fn reset(&mut self) {
        self.previous.clear();
    }

    pub fn previous(&self) -> &[OverlayLayer] {
        &self.previous
    }

    fn previous_at(&self, z_order: u32) -> Option<&OverlayLayer> {
        self.previous
            .binary_search_by_key(&z_order, OverlayLayer::z_order)
            .ok()
            .map(|i| &self.previous[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferInfo, DRM_FORMAT_ABGR8888, NativeBufferHandler};
    use crate::error::HwcError;
    use crate::flags::LayerState;
    use crate::geometry::Rect;
    use std::sync::Arc;

    struct FixedHandler;

    impl NativeBufferHandler for FixedHandler {
        fn import(&self, _handle: NativeHandle) -> Result<BufferInfo, HwcError> {
            Ok(BufferInfo {
                width: 100,
                height: 100,
                format: DRM_FORMAT_ABGR8888,
                pitches: [400, 0, 0],
                offsets: [0; 3],
                tiling_mode: 0,
                prime_fd: 3,
            })
        }
    }

    fn surfaces(n: u64) -> Vec<Surface> {
        (1..=n)
            .map(|i| {
                let x = i as i32 * 10;
                Surface::new(NativeHandle(i), 100, 100, Rect::new(x, 0, x + 100, 100))
            })
            .collect()
    }

    #[test]
    fn z_orders_are_unique() {
        let stack = LayerStack::new(1080, Rotation::None);
        let mut manager = ResourceManager::new(Arc::new(FixedHandler));
        let layers = stack.build_frame(&surfaces(5), &mut manager);

        let zs: HashSet<u32> = layers.iter().map(|l| l.z_order()).collect();
        assert_eq!(zs.len(), 5);
        assert_eq!(layers[3].layer_index(), 3);
    }

    #[test]
    fn second_frame_diffs_against_committed_one() {
        let mut stack = LayerStack::new(1080, Rotation::None);
        let mut manager = ResourceManager::new(Arc::new(FixedHandler));

        let first = stack.build_frame(&surfaces(2), &mut manager);
        assert!(first.iter().all(|l| l.state().contains(LayerState::CHANGE_BITS)));
        stack.commit(first, &mut manager);

        let mut next = surfaces(3);
        next[1].display_frame = Rect::new(0, 0, 300, 300);
        let second = stack.build_frame(&next, &mut manager);

        assert_eq!(second[0].state(), LayerState::empty());
        assert!(second[1].has_dimensions_changed());
        assert!(second[2].state().contains(LayerState::CHANGE_BITS));
    }

    #[test]
    fn reset_forces_new_slots() {
        let mut stack = LayerStack::new(1080, Rotation::None);
        let mut manager = ResourceManager::new(Arc::new(FixedHandler));

        let first = stack.build_frame(&surfaces(1), &mut manager);
        stack.commit(first, &mut manager);
        stack.reset();
        assert!(stack.previous().is_empty());

        let again = stack.build_frame(&surfaces(1), &mut manager);
        assert!(again[0].has_content_changed());
    }

    #[test]
    fn commit_releases_buffers_that_left_the_frame() {
        let mut stack = LayerStack::new(1080, Rotation::None);
        let mut manager = ResourceManager::new(Arc::new(FixedHandler));

        let first = stack.build_frame(&surfaces(3), &mut manager);
        stack.commit(first, &mut manager);
        assert_eq!(manager.registered_count(), 3);

        let second = stack.build_frame(&surfaces(1), &mut manager);
        stack.commit(second, &mut manager);
        assert_eq!(manager.registered_count(), 1);

        stack.commit(Vec::new(), &mut manager);
        assert_eq!(manager.registered_count(), 0);
    }
}
