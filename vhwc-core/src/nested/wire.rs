//! Frame metadata stream layout.
//!
//! ## Wire format
//!
//! All fields little-endian.
//!
//! ```text
//! stream start:   u32  (4)   0xF00D
//! version:        i32  (4)
//! output:         i32  (4)   reserved, 0
//! counter:        i32  (4)   reserved, 0
//! n_buffers:      i32  (4)
//! display width:  i32  (4)
//! display height: i32  (4)
//! records:        n_buffers × RemoteBufferInfo (160 each)
//! stream end:     u32  (4)   0xCAFE
//! ```
//!
//! **Buffer record** (160 bytes):
//! ```text
//! width, height, format:   i32 ×3   (12)
//! pitch:                   i32 ×3   (12)
//! offset:                  i32 ×3   (12)
//! bpp, tile_format:        i32 ×2   (8)
//! rotation:                i32      (4)
//! status, counter:         i32 ×2   (8)
//! remote id, rng key:      i32 ×4   (16)
//! surface name:            u8 ×64   (64)
//! surface id:              u64      (8)
//! bbox:                    i32 ×4   (16)
//! ```

use bytes::{Buf, BufMut};

use crate::error::HwcError;

// ── Constants ────────────────────────────────────────────────────

pub const METADATA_STREAM_START: u32 = 0xF00D;
pub const METADATA_STREAM_END: u32 = 0xCAFE;
pub const PROTOCOL_VERSION: i32 = 2;
pub const SURFACE_NAME_LENGTH: usize = 64;
pub const MARKER_SIZE: usize = 4;

/// Bytes on the wire for a frame carrying `records` buffer records.
pub const fn message_size(records: usize) -> usize {
    2 * MARKER_SIZE + StreamHeader::SIZE + records * RemoteBufferInfo::SIZE
}

// ── StreamHeader ─────────────────────────────────────────────────

/// Per-frame header that follows the start marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub version: i32,
    pub output: i32,
    pub counter: i32,
    pub n_buffers: i32,
    pub display_width: i32,
    pub display_height: i32,
}

impl StreamHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 24;

    pub fn new(n_buffers: usize, display_width: u32, display_height: u32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            output: 0,
            counter: 0,
            n_buffers: n_buffers as i32,
            display_width: display_width as i32,
            display_height: display_height as i32,
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let mut dst = &mut buf[..];
        dst.put_i32_le(self.version);
        dst.put_i32_le(self.output);
        dst.put_i32_le(self.counter);
        dst.put_i32_le(self.n_buffers);
        dst.put_i32_le(self.display_width);
        dst.put_i32_le(self.display_height);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, HwcError> {
        if data.len() < Self::SIZE {
            return Err(HwcError::ProtocolViolation("stream header too short"));
        }
        let mut src = data;
        Ok(Self {
            version: src.get_i32_le(),
            output: src.get_i32_le(),
            counter: src.get_i32_le(),
            n_buffers: src.get_i32_le(),
            display_width: src.get_i32_le(),
            display_height: src.get_i32_le(),
        })
    }
}

// ── RemoteBufferId ───────────────────────────────────────────────

/// Opaque identifier the cross-domain sharing service hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RemoteBufferId {
    pub id: i32,
    pub rng_key: [i32; 3],
}

// ── RemoteBufferInfo ─────────────────────────────────────────────

/// Everything the remote consumer needs to import one exported buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBufferInfo {
    pub width: i32,
    pub height: i32,
    /// Consumer texture class, see [`TextureClass`](super::TextureClass).
    pub format: i32,
    pub pitch: [i32; 3],
    pub offset: [i32; 3],
    pub bpp: i32,
    pub tile_format: i32,
    /// Degrees, clockwise.
    pub rotation: i32,
    /// Reserved for consumer-side double buffering.
    pub status: i32,
    pub counter: i32,
    pub remote_id: RemoteBufferId,
    pub surface_name: [u8; SURFACE_NAME_LENGTH],
    pub surface_id: u64,
    /// Display-frame origin followed by buffer width and height.
    pub bbox: [i32; 4],
}

impl RemoteBufferInfo {
    /// Encoded size on the wire.
    pub const SIZE: usize = 160;

    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_i32_le(self.width);
        dst.put_i32_le(self.height);
        dst.put_i32_le(self.format);
        for pitch in self.pitch {
            dst.put_i32_le(pitch);
        }
        for offset in self.offset {
            dst.put_i32_le(offset);
        }
        dst.put_i32_le(self.bpp);
        dst.put_i32_le(self.tile_format);
        dst.put_i32_le(self.rotation);
        dst.put_i32_le(self.status);
        dst.put_i32_le(self.counter);
        dst.put_i32_le(self.remote_id.id);
        for key in self.remote_id.rng_key {
            dst.put_i32_le(key);
        }
        dst.put_slice(&self.surface_name);
        dst.put_u64_le(self.surface_id);
        for edge in self.bbox {
            dst.put_i32_le(edge);
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, HwcError> {
        if data.len() < Self::SIZE {
            return Err(HwcError::ProtocolViolation("buffer record too short"));
        }
        let mut src = data;
        let width = src.get_i32_le();
        let height = src.get_i32_le();
        let format = src.get_i32_le();
        let pitch = [src.get_i32_le(), src.get_i32_le(), src.get_i32_le()];
        let offset = [src.get_i32_le(), src.get_i32_le(), src.get_i32_le()];
        let bpp = src.get_i32_le();
        let tile_format = src.get_i32_le();
        let rotation = src.get_i32_le();
        let status = src.get_i32_le();
        let counter = src.get_i32_le();
        let remote_id = RemoteBufferId {
            id: src.get_i32_le(),
            rng_key: [src.get_i32_le(), src.get_i32_le(), src.get_i32_le()],
        };
        let mut surface_name = [0u8; SURFACE_NAME_LENGTH];
        src.copy_to_slice(&mut surface_name);
        let surface_id = src.get_u64_le();
        let bbox = [
            src.get_i32_le(),
            src.get_i32_le(),
            src.get_i32_le(),
            src.get_i32_le(),
        ];
        Ok(Self {
            width,
            height,
            format,
            pitch,
            offset,
            bpp,
            tile_format,
            rotation,
            status,
            counter,
            remote_id,
            surface_name,
            surface_id,
            bbox,
        })
    }

    /// The surface name up to its first NUL.
    pub fn surface_name(&self) -> &str {
        let end = self
            .surface_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(SURFACE_NAME_LENGTH);
        std::str::from_utf8(&self.surface_name[..end]).unwrap_or("")
    }
}

/// Copy `name` into a fixed, NUL-padded field. Longer names are cut so the
/// field always ends in NUL.
pub fn fixed_surface_name(name: &str) -> [u8; SURFACE_NAME_LENGTH] {
    let mut field = [0u8; SURFACE_NAME_LENGTH];
    let len = name.len().min(SURFACE_NAME_LENGTH - 1);
    field[..len].copy_from_slice(&name.as_bytes()[..len]);
    field
}

// ── FrameMetadata ────────────────────────────────────────────────

/// One decoded frame as seen by the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMetadata {
    pub header: StreamHeader,
    pub buffers: Vec<RemoteBufferInfo>,
}
