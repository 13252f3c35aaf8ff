//! # vhwc-core
//!
//! Layer model and remote mirroring for a virtual hardware composer.
//!
//! This crate contains:
//! - **Layers**: `OverlayLayer`, `Surface`, `LayerStack` with frame-over-frame diffing
//! - **Buffers**: `NativeHandle`, `BufferInfo`, `ResourceManager` and the import trait
//! - **Displays**: the `NativeDisplay` contract with nested and headless backends
//! - **Nested transport**: export registry, frame metadata wire format, codec,
//!   and the single-viewer `ConnectionSupervisor`
//! - **Error**: `HwcError`, a `thiserror`-based error hierarchy

pub mod buffer;
pub mod config;
pub mod display;
pub mod error;
pub mod flags;
pub mod geometry;
pub mod layer;
pub mod nested;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use buffer::{
    AcquireFence, BufferInfo, NativeBufferHandler, NativeHandle, OverlayBuffer, PixelFormat,
    ResourceManager,
};
pub use config::NestedDisplayConfig;
pub use display::{
    DisplayAttribute, DisplayCallbacks, DisplayType, HeadlessDisplay, HotPlugCallback,
    NativeDisplay, PowerMode, RefreshCallback, VsyncCallback,
};
pub use error::{ExportError, HwcError};
pub use flags::{LayerComposition, LayerState, Rotation, Transform};
pub use geometry::Rect;
pub use layer::{Blending, LayerStack, LayerType, OverlayLayer, Surface};
pub use nested::{
    BufferExporter, ConnectionPhase, ConnectionSupervisor, FrameMetadata, FrameReport,
    FrameTransport, MetadataCodec, NestedDisplay, RemoteBufferId, RemoteBufferInfo,
    RemoteBufferRegistry, StreamHeader,
};
