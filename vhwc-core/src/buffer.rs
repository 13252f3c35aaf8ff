//! Native buffer identity, imported metadata and the import seam.
//!
//! The buffer-handle import subsystem is external: it is reached through
//! [`NativeBufferHandler`], which turns an opaque [`NativeHandle`] into
//! [`BufferInfo`]. [`ResourceManager`] caches the resulting
//! [`OverlayBuffer`]s so that a handle seen every frame is imported once.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::error::HwcError;

// ── NativeHandle ─────────────────────────────────────────────────

/// Opaque identity of a native graphics buffer.
///
/// Compared by identity only: two handles are the same buffer iff their
/// values are equal, regardless of buffer contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(pub u64);

// ── PixelFormat ──────────────────────────────────────────────────

const fn fourcc(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) | (b as u32) << 8 | (c as u32) << 16 | (d as u32) << 24
}

pub const DRM_FORMAT_ABGR8888: u32 = fourcc(b'A', b'B', b'2', b'4');
pub const DRM_FORMAT_XBGR8888: u32 = fourcc(b'X', b'B', b'2', b'4');
pub const DRM_FORMAT_ARGB8888: u32 = fourcc(b'A', b'R', b'2', b'4');
pub const DRM_FORMAT_BGR888: u32 = fourcc(b'B', b'G', b'2', b'4');
pub const DRM_FORMAT_RGB565: u32 = fourcc(b'R', b'G', b'1', b'6');
pub const DRM_FORMAT_NV12: u32 = fourcc(b'N', b'V', b'1', b'2');

/// Pixel layout of an imported buffer, named by memory byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8888,
    /// 4 bytes per pixel: Red, Green, Blue, padding.
    Rgbx8888,
    /// 4 bytes per pixel: Blue, Green, Red, Alpha.
    Bgra8888,
    /// 3 bytes per pixel: Red, Green, Blue.
    Rgb888,
    /// 2 bytes per pixel, 5-6-5.
    Rgb565,
    /// Y-tiled two-plane 4:2:0 media layout.
    Nv12,
    /// Anything the nested path does not classify.
    Other(u32),
}

impl PixelFormat {
    pub const fn from_fourcc(code: u32) -> Self {
        match code {
            DRM_FORMAT_ABGR8888 => PixelFormat::Rgba8888,
            DRM_FORMAT_XBGR8888 => PixelFormat::Rgbx8888,
            DRM_FORMAT_ARGB8888 => PixelFormat::Bgra8888,
            DRM_FORMAT_BGR888 => PixelFormat::Rgb888,
            DRM_FORMAT_RGB565 => PixelFormat::Rgb565,
            DRM_FORMAT_NV12 => PixelFormat::Nv12,
            other => PixelFormat::Other(other),
        }
    }

    /// Bits consumed by a single pixel of a packed RGB format; 0 otherwise.
    pub const fn bits_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Rgba8888 | PixelFormat::Rgbx8888 | PixelFormat::Bgra8888 => 32,
            PixelFormat::Rgb888 => 24,
            PixelFormat::Rgb565 => 16,
            PixelFormat::Nv12 | PixelFormat::Other(_) => 0,
        }
    }

    /// Whether the display engine can scan this format out directly.
    pub const fn is_scanout_supported(self) -> bool {
        matches!(
            self,
            PixelFormat::Rgba8888
                | PixelFormat::Rgbx8888
                | PixelFormat::Bgra8888
                | PixelFormat::Rgb565
                | PixelFormat::Nv12
        )
    }
}

// ── BufferInfo ───────────────────────────────────────────────────

/// Metadata the external importer derives from a native handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferInfo {
    pub width: u32,
    pub height: u32,
    /// DRM fourcc code.
    pub format: u32,
    /// Row pitch in bytes, per plane.
    pub pitches: [u32; 3],
    /// Plane offset in bytes, per plane.
    pub offsets: [u32; 3],
    pub tiling_mode: u32,
    /// Exportable descriptor; values `<= 0` are not exportable.
    pub prime_fd: i32,
}

impl BufferInfo {
    pub fn pixel_format(&self) -> PixelFormat {
        PixelFormat::from_fourcc(self.format)
    }
}

/// External collaborator that imports native handles.
pub trait NativeBufferHandler: Send + Sync {
    fn import(&self, handle: NativeHandle) -> Result<BufferInfo, HwcError>;
}

// ── OverlayBuffer ────────────────────────────────────────────────

/// An imported buffer, shared between layers that reference the same handle.
#[derive(Debug)]
pub struct OverlayBuffer {
    handle: NativeHandle,
    info: BufferInfo,
}

impl OverlayBuffer {
    pub fn new(handle: NativeHandle, info: BufferInfo) -> Self {
        Self { handle, info }
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    pub fn info(&self) -> &BufferInfo {
        &self.info
    }

    pub fn format(&self) -> PixelFormat {
        self.info.pixel_format()
    }
}

// ── AcquireFence ─────────────────────────────────────────────────

/// Token the producer signals once it has finished writing a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireFence(pub i32);

impl AcquireFence {
    /// A fence that is already signalled.
    pub const SIGNALED: Self = AcquireFence(-1);

    pub fn is_signaled(self) -> bool {
        self.0 < 0
    }
}

impl Default for AcquireFence {
    fn default() -> Self {
        Self::SIGNALED
    }
}

// ── ResourceManager ──────────────────────────────────────────────

/// Imports buffers through the external handler and pins registered ones.
pub struct ResourceManager {
    handler: Arc<dyn NativeBufferHandler>,
    registered: HashMap<NativeHandle, Arc<OverlayBuffer>>,
}

impl ResourceManager {
    pub fn new(handler: Arc<dyn NativeBufferHandler>) -> Self {
        Self {
            handler,
            registered: HashMap::new(),
        }
    }

    /// Resolve `handle` into an imported buffer.
    ///
    /// A registered handle is returned from the cache. Otherwise it is
    /// imported, and pinned when `register` is set.
    pub fn acquire(
        &mut self,
        handle: NativeHandle,
        register: bool,
    ) -> Result<Arc<OverlayBuffer>, HwcError> {
        if let Some(buffer) = self.registered.get(&handle) {
            return Ok(Arc::clone(buffer));
        }

        let info = self.handler.import(handle)?;
        let buffer = Arc::new(OverlayBuffer::new(handle, info));
        if register {
            trace!(?handle, "registering imported buffer");
            self.registered.insert(handle, Arc::clone(&buffer));
        }
        Ok(buffer)
    }

    /// Drop the pin on `handle`. Layers still holding it keep it alive.
    pub fn release(&mut self, handle: NativeHandle) -> bool {
        self.registered.remove(&handle).is_some()
    }

    /// Drop the pin on every handle `keep` rejects; returns how many went.
    pub fn retain(&mut self, mut keep: impl FnMut(NativeHandle) -> bool) -> usize {
        let before = self.registered.len();
        self.registered.retain(|handle, _| keep(*handle));
        let released = before - self.registered.len();
        if released > 0 {
            trace!(released, "released unreferenced buffers");
        }
        released
    }

    /// Number of pinned buffers.
    pub fn registered_count(&self) -> usize {
        self.registered.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        imports: AtomicUsize,
    }

    impl NativeBufferHandler for CountingHandler {
        fn import(&self, handle: NativeHandle) -> Result<BufferInfo, HwcError> {
            self.imports.fetch_add(1, Ordering::SeqCst);
            if handle.0 == 0 {
                return Err(HwcError::Import(handle, "null handle".into()));
            }
            Ok(BufferInfo {
                width: 64,
                height: 32,
                format: DRM_FORMAT_ABGR8888,
                pitches: [256, 0, 0],
                offsets: [0; 3],
                tiling_mode: 0,
                prime_fd: 9,
            })
        }
    }

    #[test]
    fn fourcc_classification() {
        assert_eq!(PixelFormat::from_fourcc(DRM_FORMAT_ABGR8888), PixelFormat::Rgba8888);
        assert_eq!(PixelFormat::from_fourcc(DRM_FORMAT_BGR888).bits_per_pixel(), 24);
        assert_eq!(PixelFormat::from_fourcc(DRM_FORMAT_RGB565).bits_per_pixel(), 16);
        assert!(matches!(PixelFormat::from_fourcc(0x1234), PixelFormat::Other(0x1234)));
        assert!(!PixelFormat::Rgb888.is_scanout_supported());
        assert!(PixelFormat::Nv12.is_scanout_supported());
    }

    #[test]
    fn registered_buffers_import_once() {
        let handler = Arc::new(CountingHandler {
            imports: AtomicUsize::new(0),
        });
        let mut manager = ResourceManager::new(handler.clone());

        let a = manager.acquire(NativeHandle(5), true).unwrap();
        let b = manager.acquire(NativeHandle(5), true).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(handler.imports.load(Ordering::SeqCst), 1);
        assert_eq!(manager.registered_count(), 1);

        assert!(manager.release(NativeHandle(5)));
        assert_eq!(a.info().width, 64);
    }

    #[test]
    fn unregistered_buffers_import_every_time() {
        let handler = Arc::new(CountingHandler {
            imports: AtomicUsize::new(0),
        });
        let mut manager = ResourceManager::new(handler.clone());

        manager.acquire(NativeHandle(5), false).unwrap();
        manager.acquire(NativeHandle(5), false).unwrap();
        assert_eq!(handler.imports.load(Ordering::SeqCst), 2);
        assert_eq!(manager.registered_count(), 0);
    }

    #[test]
    fn import_failure_propagates() {
        let handler = Arc::new(CountingHandler {
            imports: AtomicUsize::new(0),
        });
        let mut manager = ResourceManager::new(handler);
        assert!(matches!(
            manager.acquire(NativeHandle(0), true),
            Err(HwcError::Import(NativeHandle(0), _))
        ));
    }

    #[test]
    fn fence_default_is_signaled() {
        assert!(AcquireFence::default().is_signaled());
        assert!(!AcquireFence(12).is_signaled());
    }
}
