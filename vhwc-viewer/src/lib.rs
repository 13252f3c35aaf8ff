//! # vhwc-viewer: Nested Display Viewer
//!
//! Connects to a nested display's metadata endpoint, decodes each frame
//! description with [`vhwc_core::MetadataCodec`] and logs what the remote
//! side would import. Reconnects when the display goes away.

pub mod client;
pub mod config;
