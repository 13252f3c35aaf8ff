//! The display contract shared by every backend.
//!
//! | Backend              | Output                                   |
//! |----------------------|------------------------------------------|
//! | [`NestedDisplay`]    | frame metadata to a remote viewer        |
//! | [`HeadlessDisplay`]  | nothing; validates layers only           |
//!
//! Physical panels implement the same trait outside this crate.
//!
//! [`NestedDisplay`]: crate::nested::NestedDisplay

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::buffer::{NativeBufferHandler, PixelFormat, ResourceManager};
use crate::error::HwcError;
use crate::flags::Rotation;
use crate::layer::{LayerStack, Surface};

// ── Enums ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayType {
    Physical,
    Nested,
    Headless,
}

/// Queryable per-config display attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayAttribute {
    Width,
    Height,
    /// Vsync period source, in Hz.
    RefreshRate,
    DpiX,
    DpiY,
    ConfigGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PowerMode {
    Off,
    Doze,
    DozeSuspend,
    #[default]
    On,
}

// ── Callbacks ────────────────────────────────────────────────────

pub trait VsyncCallback: Send + Sync {
    fn callback(&self, display_id: u32, timestamp: i64);
}

pub trait RefreshCallback: Send + Sync {
    fn callback(&self, display_id: u32);
}

pub trait HotPlugCallback: Send + Sync {
    fn callback(&self, display_id: u32, connected: bool);
}

/// Registered callbacks of one display.
#[derive(Default, Clone)]
pub struct DisplayCallbacks {
    vsync: Option<(Arc<dyn VsyncCallback>, u32)>,
    refresh: Option<(Arc<dyn RefreshCallback>, u32)>,
    hotplug: Option<(Arc<dyn HotPlugCallback>, u32)>,
    vsync_enabled: bool,
}

impl std::fmt::Debug for DisplayCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayCallbacks")
            .field("vsync", &self.vsync.as_ref().map(|(_, id)| id))
            .field("refresh", &self.refresh.as_ref().map(|(_, id)| id))
            .field("hotplug", &self.hotplug.as_ref().map(|(_, id)| id))
            .field("vsync_enabled", &self.vsync_enabled)
            .finish()
    }
}

impl DisplayCallbacks {
    pub fn register_vsync(&mut self, callback: Arc<dyn VsyncCallback>, display_id: u32) {
        self.vsync = Some((callback, display_id));
    }

    pub fn register_refresh(&mut self, callback: Arc<dyn RefreshCallback>, display_id: u32) {
        self.refresh = Some((callback, display_id));
    }

    pub fn register_hotplug(&mut self, callback: Arc<dyn HotPlugCallback>, display_id: u32) {
        self.hotplug = Some((callback, display_id));
    }

    pub fn set_vsync_enabled(&mut self, enabled: bool) {
        self.vsync_enabled = enabled;
    }

    pub fn vsync_enabled(&self) -> bool {
        self.vsync_enabled
    }

    /// Forward a vsync event if vsync delivery is enabled.
    pub fn vsync_update(&self, timestamp: i64) {
        if !self.vsync_enabled {
            return;
        }
        if let Some((callback, id)) = &self.vsync {
            callback.callback(*id, timestamp);
        }
    }

    pub fn refresh_update(&self) {
        if let Some((callback, id)) = &self.refresh {
            callback.callback(*id);
        }
    }

    /// Virtual outputs never unplug, so this always reports connected.
    pub fn hotplug_update(&self) {
        if let Some((callback, id)) = &self.hotplug {
            callback.callback(*id, true);
        }
    }
}

// ── NativeDisplay ────────────────────────────────────────────────

/// One output the compositor presents to.
#[async_trait]
pub trait NativeDisplay: Send {
    fn display_type(&self) -> DisplayType;

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn power_mode(&self) -> PowerMode;

    fn set_power_mode(&mut self, mode: PowerMode) -> Result<(), HwcError>;

    /// Hardware pipe driving the output, if there is one.
    fn display_pipe(&self) -> Option<u32>;

    fn active_config(&self) -> u32;

    fn set_active_config(&mut self, config: u32) -> Result<(), HwcError>;

    fn display_configs(&self) -> Vec<u32>;

    fn display_name(&self) -> &str;

    fn display_attribute(&self, config: u32, attribute: DisplayAttribute)
    -> Result<i32, HwcError>;

    /// Compose and emit one frame.
    async fn present(&mut self, surfaces: &[Surface]) -> Result<(), HwcError>;

    fn register_vsync_callback(&mut self, callback: Arc<dyn VsyncCallback>, display_id: u32);

    fn register_refresh_callback(&mut self, callback: Arc<dyn RefreshCallback>, display_id: u32);

    fn register_hotplug_callback(&mut self, callback: Arc<dyn HotPlugCallback>, display_id: u32);

    fn vsync_control(&mut self, enabled: bool);

    /// Whether the output can scan out buffers of `format` directly.
    fn check_plane_format(&self, format: PixelFormat) -> bool;

    fn is_connected(&self) -> bool;
}

// ── HeadlessDisplay ──────────────────────────────────────────────

/// An output with no sink. Frames are validated and then dropped.
pub struct HeadlessDisplay {
    width: u32,
    height: u32,
    manager: ResourceManager,
    stack: LayerStack,
    callbacks: DisplayCallbacks,
    power_mode: PowerMode,
}

impl HeadlessDisplay {
    pub fn new(width: u32, height: u32, handler: Arc<dyn NativeBufferHandler>) -> Self {
        Self {
            width,
            height,
            manager: ResourceManager::new(handler),
            stack: LayerStack::new(height, Rotation::None),
            callbacks: DisplayCallbacks::default(),
            power_mode: PowerMode::On,
        }
    }
}

#[async_trait]
impl NativeDisplay for HeadlessDisplay {
    fn display_type(&self) -> DisplayType {
        DisplayType::Headless
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn power_mode(&self) -> PowerMode {
        self.power_mode
    }

    fn set_power_mode(&mut self, mode: PowerMode) -> Result<(), HwcError> {
        self.power_mode = mode;
        Ok(())
    }

    fn display_pipe(&self) -> Option<u32> {
        None
    }

    fn active_config(&self) -> u32 {
        0
    }

    fn set_active_config(&mut self, config: u32) -> Result<(), HwcError> {
        match config {
            0 => Ok(()),
            other => Err(HwcError::UnknownConfig(other)),
        }
    }

    fn display_configs(&self) -> Vec<u32> {
        vec![0]
    }

    fn display_name(&self) -> &str {
        "Headless"
    }

    fn display_attribute(&self, config: u32, attribute: DisplayAttribute) -> Result<i32, HwcError> {
        if config != 0 {
            return Err(HwcError::UnknownConfig(config));
        }
        match attribute {
            DisplayAttribute::Width => Ok(self.width as i32),
            DisplayAttribute::Height => Ok(self.height as i32),
            other => Err(HwcError::UnsupportedAttribute(other)),
        }
    }

    async fn present(&mut self, surfaces: &[Surface]) -> Result<(), HwcError> {
        let layers = self.stack.build_frame(surfaces, &mut self.manager);
        trace!(layers = layers.len(), "headless frame dropped");
        self.stack.commit(layers, &mut self.manager);
        Ok(())
    }

    fn register_vsync_callback(&mut self, callback: Arc<dyn VsyncCallback>, display_id: u32) {
        self.callbacks.register_vsync(callback, display_id);
    }

    fn register_refresh_callback(&mut self, callback: Arc<dyn RefreshCallback>, display_id: u32) {
        self.callbacks.register_refresh(callback, display_id);
    }

    fn register_hotplug_callback(&mut self, callback: Arc<dyn HotPlugCallback>, display_id: u32) {
        self.callbacks.register_hotplug(callback, display_id);
    }

    fn vsync_control(&mut self, enabled: bool) {
        self.callbacks.set_vsync_enabled(enabled);
    }

    fn check_plane_format(&self, format: PixelFormat) -> bool {
        format.is_scanout_supported()
    }

    fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferInfo, DRM_FORMAT_XBGR8888, NativeHandle};
    use crate::geometry::Rect;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        vsyncs: Mutex<Vec<(u32, i64)>>,
        refreshes: Mutex<Vec<u32>>,
        hotplugs: Mutex<Vec<(u32, bool)>>,
    }

    impl VsyncCallback for Recorder {
        fn callback(&self, display_id: u32, timestamp: i64) {
            self.vsyncs.lock().unwrap().push((display_id, timestamp));
        }
    }

    impl RefreshCallback for Recorder {
        fn callback(&self, display_id: u32) {
            self.refreshes.lock().unwrap().push(display_id);
        }
    }

    impl HotPlugCallback for Recorder {
        fn callback(&self, display_id: u32, connected: bool) {
            self.hotplugs.lock().unwrap().push((display_id, connected));
        }
    }

    struct Handler;

    impl NativeBufferHandler for Handler {
        fn import(&self, _handle: NativeHandle) -> Result<BufferInfo, HwcError> {
            Ok(BufferInfo {
                width: 64,
                height: 64,
                format: DRM_FORMAT_XBGR8888,
                pitches: [256, 0, 0],
                offsets: [0; 3],
                tiling_mode: 0,
                prime_fd: 3,
            })
        }
    }

    #[test]
    fn vsync_only_fires_when_enabled() {
        let recorder = Arc::new(Recorder::default());
        let mut callbacks = DisplayCallbacks::default();
        callbacks.register_vsync(recorder.clone(), 2);

        callbacks.vsync_update(100);
        assert!(recorder.vsyncs.lock().unwrap().is_empty());

        callbacks.set_vsync_enabled(true);
        callbacks.vsync_update(200);
        assert_eq!(*recorder.vsyncs.lock().unwrap(), vec![(2, 200)]);
    }

    #[test]
    fn refresh_and_hotplug_report_display_id() {
        let recorder = Arc::new(Recorder::default());
        let mut callbacks = DisplayCallbacks::default();
        callbacks.register_refresh(recorder.clone(), 5);
        callbacks.register_hotplug(recorder.clone(), 5);

        callbacks.refresh_update();
        callbacks.hotplug_update();
        assert_eq!(*recorder.refreshes.lock().unwrap(), vec![5]);
        assert_eq!(*recorder.hotplugs.lock().unwrap(), vec![(5, true)]);
    }

    #[test]
    fn unregistered_callbacks_are_silent() {
        let callbacks = DisplayCallbacks::default();
        callbacks.vsync_update(1);
        callbacks.refresh_update();
        callbacks.hotplug_update();
    }

    #[tokio::test]
    async fn headless_accepts_frames() {
        let mut display = HeadlessDisplay::new(800, 600, Arc::new(Handler));
        let surfaces = [Surface::new(NativeHandle(1), 64, 64, Rect::new(0, 0, 64, 64))];
        display.present(&surfaces).await.unwrap();
        display.present(&surfaces).await.unwrap();
        assert_eq!(display.manager.registered_count(), 1);

        display.present(&[]).await.unwrap();
        assert_eq!(display.manager.registered_count(), 0);

        assert_eq!(display.display_type(), DisplayType::Headless);
        assert_eq!(display.display_attribute(0, DisplayAttribute::Width).unwrap(), 800);
        assert!(matches!(
            display.display_attribute(0, DisplayAttribute::DpiX),
            Err(HwcError::UnsupportedAttribute(DisplayAttribute::DpiX))
        ));
        assert!(display.set_active_config(3).is_err());
    }
}
