//! The nested (virtual) display backend.
//!
//! Frames presented to a [`NestedDisplay`] are not scanned out locally.
//! Each visible buffer is exported once to a remote domain, and a compact
//! metadata message describing the frame is pushed to a single remote
//! viewer over TCP.
//!
//! ## Sub-modules
//!
//! | Module       | Purpose                                              |
//! |--------------|------------------------------------------------------|
//! | `wire`       | Message layout, markers and record encoding          |
//! | `registry`   | Export-once bookkeeping and the export service trait |
//! | `transport`  | Staging, assembly and delivery of one frame          |
//! | `supervisor` | Listener and the one-viewer accept loop              |
//! | `codec`      | Consumer-side decoder with sentinel resync           |
//! | `display`    | [`NativeDisplay`](crate::display::NativeDisplay) impl |

pub mod codec;
pub mod display;
pub mod registry;
pub mod supervisor;
pub mod transport;
pub mod wire;

pub use codec::MetadataCodec;
pub use display::NestedDisplay;
pub use registry::{BufferExporter, RemoteBufferRegistry, TextureClass};
pub use supervisor::{ConnectionPhase, ConnectionSupervisor, PeerLink};
pub use transport::{FrameReport, FrameTransport};
pub use wire::{FrameMetadata, RemoteBufferId, RemoteBufferInfo, StreamHeader, message_size};
