//! Remote export bookkeeping.
//!
//! Each buffer identity is exported to the remote domain at most once for
//! the registry's lifetime. Later frames that reference the same handle
//! reuse the recorded [`RemoteBufferInfo`] and only refresh its placement.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::buffer::{NativeHandle, PixelFormat};
use crate::error::{ExportError, HwcError};
use crate::layer::OverlayLayer;
use crate::nested::wire::{
    RemoteBufferId, RemoteBufferInfo, SURFACE_NAME_LENGTH, fixed_surface_name,
};

// ── BufferExporter ───────────────────────────────────────────────

/// The cross-domain buffer sharing service.
pub trait BufferExporter: Send + Sync {
    /// Open the transmit channel towards `remote_domain`.
    fn setup_channel(&self, remote_domain: u32) -> Result<(), ExportError>;

    /// Share the buffer behind `prime_fd` with `remote_domain`.
    fn export(&self, remote_domain: u32, prime_fd: i32) -> Result<RemoteBufferId, ExportError>;

    /// Revoke an earlier export once `delay` has passed.
    fn unexport(&self, id: RemoteBufferId, delay: Duration) -> Result<(), ExportError>;
}

// ── TextureClass ─────────────────────────────────────────────────

/// How the consumer imports a buffer as a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureClass {
    Rgb,
    Rgba,
    PlanarTiled,
    Unknown,
}

impl TextureClass {
    /// Value carried in the record's `format` field.
    pub const fn wire_value(self) -> i32 {
        match self {
            TextureClass::Rgb => 0x305D,
            TextureClass::Rgba => 0x305E,
            TextureClass::PlanarTiled => 0x31D8,
            TextureClass::Unknown => 0,
        }
    }
}

impl From<PixelFormat> for TextureClass {
    fn from(format: PixelFormat) -> Self {
        match format {
            PixelFormat::Rgbx8888 | PixelFormat::Rgb888 | PixelFormat::Rgb565 => TextureClass::Rgb,
            PixelFormat::Rgba8888 | PixelFormat::Bgra8888 => TextureClass::Rgba,
            PixelFormat::Nv12 => TextureClass::PlanarTiled,
            PixelFormat::Other(_) => TextureClass::Unknown,
        }
    }
}

// ── RemoteBufferRegistry ─────────────────────────────────────────

/// Map from buffer identity to its exported metadata.
pub struct RemoteBufferRegistry {
    exporter: Option<Arc<dyn BufferExporter>>,
    remote_domain: u32,
    surface_name: [u8; SURFACE_NAME_LENGTH],
    entries: HashMap<NativeHandle, RemoteBufferInfo>,
}

impl RemoteBufferRegistry {
    /// A registry exporting through `exporter`, or a disabled one when
    /// `None`.
    pub fn new(
        exporter: Option<Arc<dyn BufferExporter>>,
        remote_domain: u32,
        surface_name: &str,
    ) -> Self {
        Self {
            exporter,
            remote_domain,
            surface_name: fixed_surface_name(surface_name),
            entries: HashMap::new(),
        }
    }

    /// Whether an export service is attached.
    pub fn is_available(&self) -> bool {
        self.exporter.is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, handle: NativeHandle) -> Option<&RemoteBufferInfo> {
        self.entries.get(&handle)
    }

    /// Whether [`resolve`](Self::resolve) would produce a record for
    /// `layer`, provided its export succeeds.
    pub fn will_record(&self, layer: &OverlayLayer) -> bool {
        let Some(buffer) = layer.buffer() else {
            return false;
        };
        self.exporter.is_some()
            && (self.entries.contains_key(&buffer.handle()) || buffer.info().prime_fd > 0)
    }

    /// Look up, or export and record, the buffer bound to `layer`.
    ///
    /// Returns `Ok(None)` when the layer contributes no record: no buffer,
    /// no export service, or a buffer without an exportable descriptor.
    /// An export failure leaves the registry unchanged for this handle.
    pub fn resolve(&mut self, layer: &OverlayLayer) -> Result<Option<&RemoteBufferInfo>, HwcError> {
        let Some(buffer) = layer.buffer() else {
            return Ok(None);
        };
        let Some(exporter) = self.exporter.as_ref() else {
            return Ok(None);
        };

        let handle = buffer.handle();
        let frame = layer.display_frame();
        let rotation = layer.plane_transform().degrees();

        if self.entries.contains_key(&handle) {
            return Ok(self
                .entries
                .get_mut(&handle)
                .map(|entry| refresh_placement(entry, frame.left, frame.top, rotation)));
        }

        let info = buffer.info();
        if info.prime_fd <= 0 {
            debug!(?handle, "buffer has no exportable descriptor");
            return Ok(None);
        }

        let remote_id = exporter
            .export(self.remote_domain, info.prime_fd)
            .map_err(|source| {
                error!(?handle, "exporting buffer failed: {source}");
                HwcError::Export { handle, source }
            })?;
        info!(?handle, id = remote_id.id, "exported buffer");

        let format = info.pixel_format();
        let entry = RemoteBufferInfo {
            width: info.width as i32,
            height: info.height as i32,
            format: TextureClass::from(format).wire_value(),
            pitch: info.pitches.map(|p| p as i32),
            offset: info.offsets.map(|o| o as i32),
            bpp: format.bits_per_pixel() as i32,
            tile_format: info.tiling_mode as i32,
            rotation,
            status: 0,
            counter: 0,
            remote_id,
            surface_name: self.surface_name,
            surface_id: handle.0,
            bbox: [frame.left, frame.top, info.width as i32, info.height as i32],
        };
        Ok(Some(self.entries.entry(handle).or_insert(entry)))
    }

    /// Revoke every export, waiting `delay` before each is freed remotely.
    ///
    /// Failures are logged and their entries kept; returns how many failed.
    pub fn unexport_all(&mut self, delay: Duration) -> usize {
        let Some(exporter) = self.exporter.as_ref() else {
            return 0;
        };

        self.entries.retain(|handle, entry| {
            match exporter.unexport(entry.remote_id, delay) {
                Ok(()) => {
                    info!(?handle, id = entry.remote_id.id, "unexported buffer");
                    false
                }
                Err(e) => {
                    error!(?handle, id = entry.remote_id.id, "unexport failed: {e}");
                    true
                }
            }
        });
        self.entries.len()
    }
}

/// Follow a known buffer to its current screen position.
fn refresh_placement(
    entry: &mut RemoteBufferInfo,
    left: i32,
    top: i32,
    rotation: i32,
) -> &RemoteBufferInfo {
    if entry.bbox[0] != left || entry.bbox[1] != top || entry.rotation != rotation {
        debug!(surface_id = entry.surface_id, left, top, rotation, "exported buffer moved");
        entry.bbox[0] = left;
        entry.bbox[1] = top;
        entry.rotation = rotation;
    }
    entry
}
