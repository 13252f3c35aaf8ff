//! The virtual output that mirrors frames to a remote viewer.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::buffer::{NativeBufferHandler, PixelFormat, ResourceManager};
use crate::config::NestedDisplayConfig;
use crate::display::{
    DisplayAttribute, DisplayCallbacks, DisplayType, HotPlugCallback, NativeDisplay, PowerMode,
    RefreshCallback, VsyncCallback,
};
use crate::error::HwcError;
use crate::layer::{LayerStack, Surface};
use crate::nested::registry::{BufferExporter, RemoteBufferRegistry};
use crate::nested::supervisor::{ConnectionPhase, ConnectionSupervisor};
use crate::nested::transport::{FrameReport, FrameTransport};

/// A display without a panel: every presented frame is exported and
/// described to whichever viewer is connected.
pub struct NestedDisplay {
    config: NestedDisplayConfig,
    manager: ResourceManager,
    stack: LayerStack,
    transport: FrameTransport,
    supervisor: Option<ConnectionSupervisor>,
    callbacks: DisplayCallbacks,
    power_mode: PowerMode,
    last_report: Option<FrameReport>,
}

impl NestedDisplay {
    /// Open the export channel and start listening for a viewer.
    ///
    /// An unavailable export channel or listen endpoint leaves the display
    /// usable: frames are still validated, only mirroring is lost.
    pub async fn new(
        config: NestedDisplayConfig,
        handler: Arc<dyn NativeBufferHandler>,
        exporter: Option<Arc<dyn BufferExporter>>,
    ) -> Result<Self, HwcError> {
        config.validate()?;

        let exporter = exporter.and_then(|exporter| {
            match exporter.setup_channel(config.remote_domain) {
                Ok(()) => Some(exporter),
                Err(e) => {
                    error!(domain = config.remote_domain, "remote export unavailable: {e}");
                    None
                }
            }
        });
        let registry =
            RemoteBufferRegistry::new(exporter, config.remote_domain, &config.surface_name);
        let mut transport =
            FrameTransport::new(registry, config.max_buffers, config.width, config.height)
                .with_send_timeout(config.send_timeout());

        let supervisor = match ConnectionSupervisor::bind(config.listen_address.as_str()).await {
            Ok(mut supervisor) => {
                transport.attach(supervisor.link());
                supervisor.start();
                Some(supervisor)
            }
            Err(e) => {
                error!(addr = %config.listen_address, "cannot listen for remote viewer: {e}");
                None
            }
        };

        info!(
            width = config.width,
            height = config.height,
            export = transport.registry().is_available(),
            "nested display ready"
        );

        Ok(Self {
            manager: ResourceManager::new(handler),
            stack: LayerStack::new(config.height, config.rotation)
                .with_constraints(config.honor_constraints),
            transport,
            supervisor,
            callbacks: DisplayCallbacks::default(),
            power_mode: PowerMode::On,
            last_report: None,
            config,
        })
    }

    pub fn config(&self) -> &NestedDisplayConfig {
        &self.config
    }

    pub fn transport(&self) -> &FrameTransport {
        &self.transport
    }

    pub fn resource_manager(&self) -> &ResourceManager {
        &self.manager
    }

    pub fn supervisor(&self) -> Option<&ConnectionSupervisor> {
        self.supervisor.as_ref()
    }

    /// Connection state, or `Closed` when no endpoint could be bound.
    pub fn connection_phase(&self) -> ConnectionPhase {
        self.supervisor
            .as_ref()
            .map_or(ConnectionPhase::Closed, ConnectionSupervisor::phase)
    }

    pub fn last_report(&self) -> Option<FrameReport> {
        self.last_report
    }

    pub fn callbacks(&self) -> &DisplayCallbacks {
        &self.callbacks
    }

    /// Validate `surfaces` against the previous frame and mirror the result.
    ///
    /// The validated layers become the previous frame even when mirroring
    /// fails. Buffers the frame no longer references are unpinned.
    pub async fn present_frame(&mut self, surfaces: &[Surface]) -> Result<FrameReport, HwcError> {
        let layers = self.stack.build_frame(surfaces, &mut self.manager);
        let result = self.transport.build_and_send(&layers).await;
        self.stack.commit(layers, &mut self.manager);

        match &result {
            Ok(report) => {
                debug!(records = report.records, delivered = report.delivered, "frame presented");
                self.last_report = Some(*report);
            }
            Err(e) => warn!("frame not mirrored: {e}"),
        }
        result
    }

    /// Revoke every export, then close the viewer and the listener.
    pub async fn shutdown(&mut self) {
        let delay = self.config.unexport_delay();
        let stuck = self.transport.registry_mut().unexport_all(delay);
        if stuck > 0 {
            warn!(stuck, "some buffers could not be unexported");
        }
        if let Some(supervisor) = self.supervisor.as_mut() {
            supervisor.shutdown().await;
        }
        self.stack.reset();
        self.manager.retain(|_| false);
        info!("nested display shut down");
    }
}

#[async_trait]
impl NativeDisplay for NestedDisplay {
    fn display_type(&self) -> DisplayType {
        DisplayType::Nested
    }

    fn width(&self) -> u32 {
        self.config.width
    }

    fn height(&self) -> u32 {
        self.config.height
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
        "Nested"
    }

    fn display_attribute(&self, config: u32, attribute: DisplayAttribute) -> Result<i32, HwcError> {
        if config != 0 {
            return Err(HwcError::UnknownConfig(config));
        }
        let value = match attribute {
            DisplayAttribute::Width => self.config.width,
            DisplayAttribute::Height => self.config.height,
            DisplayAttribute::RefreshRate => self.config.refresh_rate,
            DisplayAttribute::DpiX | DisplayAttribute::DpiY => self.config.dpi,
            DisplayAttribute::ConfigGroup => {
                return Err(HwcError::UnsupportedAttribute(attribute));
            }
        };
        i32::try_from(value).map_err(|_| HwcError::InvalidConfig(format!("{attribute:?} overflows")))
    }

    async fn present(&mut self, surfaces: &[Surface]) -> Result<(), HwcError> {
        self.present_frame(surfaces).await.map(|_| ())
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

    /// The remote side imports any format, so every format is accepted.
    fn check_plane_format(&self, _format: PixelFormat) -> bool {
        true
    }

    fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferInfo, DRM_FORMAT_ABGR8888, NativeHandle};
    use crate::error::ExportError;
    use crate::geometry::Rect;
    use crate::nested::wire::RemoteBufferId;
    use std::time::Duration;

    struct Handler;

    impl NativeBufferHandler for Handler {
        fn import(&self, _handle: NativeHandle) -> Result<BufferInfo, HwcError> {
            Ok(BufferInfo {
                width: 32,
                height: 32,
                format: DRM_FORMAT_ABGR8888,
                pitches: [128, 0, 0],
                offsets: [0; 3],
                tiling_mode: 0,
                prime_fd: 4,
            })
        }
    }

    struct BrokenChannel;

    impl BufferExporter for BrokenChannel {
        fn setup_channel(&self, _remote_domain: u32) -> Result<(), ExportError> {
            Err(ExportError::Unavailable)
        }

        fn export(&self, _domain: u32, _prime_fd: i32) -> Result<RemoteBufferId, ExportError> {
            Err(ExportError::Unavailable)
        }

        fn unexport(&self, _id: RemoteBufferId, _delay: Duration) -> Result<(), ExportError> {
            Ok(())
        }
    }

    fn local_config() -> NestedDisplayConfig {
        NestedDisplayConfig {
            listen_address: "127.0.0.1:0".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn attributes_come_from_config() {
        let mut display = NestedDisplay::new(local_config(), Arc::new(Handler), None)
            .await
            .unwrap();

        assert_eq!(display.display_attribute(0, DisplayAttribute::Width).unwrap(), 1920);
        assert_eq!(display.display_attribute(0, DisplayAttribute::Height).unwrap(), 1080);
        assert_eq!(display.display_attribute(0, DisplayAttribute::RefreshRate).unwrap(), 60);
        assert_eq!(display.display_attribute(0, DisplayAttribute::DpiY).unwrap(), 1);
        assert!(matches!(
            display.display_attribute(0, DisplayAttribute::ConfigGroup),
            Err(HwcError::UnsupportedAttribute(DisplayAttribute::ConfigGroup))
        ));
        assert_eq!(display.display_name(), "Nested");
        assert_eq!(display.display_configs(), vec![0]);
        assert_eq!(display.display_pipe(), None);
        assert!(display.set_active_config(1).is_err());
        assert!(display.check_plane_format(PixelFormat::Other(0x1234)));

        display.shutdown().await;
        assert_eq!(display.connection_phase(), ConnectionPhase::Closed);
    }

    #[tokio::test]
    async fn broken_export_channel_degrades_to_local_only() {
        let mut display = NestedDisplay::new(
            local_config(),
            Arc::new(Handler),
            Some(Arc::new(BrokenChannel)),
        )
        .await
        .unwrap();
        assert!(!display.transport().registry().is_available());

        let surfaces = [Surface::new(NativeHandle(1), 32, 32, Rect::new(0, 0, 32, 32))];
        let report = display.present_frame(&surfaces).await.unwrap();
        assert_eq!(report.records, 0);
        assert!(!report.delivered);

        display.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let config = NestedDisplayConfig {
            width: 0,
            ..local_config()
        };
        let result = NestedDisplay::new(config, Arc::new(Handler), None).await;
        assert!(matches!(result, Err(HwcError::InvalidConfig(_))));
    }
}
