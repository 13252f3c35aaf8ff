//! Per-frame metadata assembly and delivery.

use std::io;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{error, trace, warn};

use crate::error::HwcError;
use crate::layer::OverlayLayer;
use crate::nested::registry::RemoteBufferRegistry;
use crate::nested::supervisor::PeerLink;
use crate::nested::wire::{
    MARKER_SIZE, METADATA_STREAM_END, METADATA_STREAM_START, RemoteBufferInfo, StreamHeader,
    message_size,
};

/// Outcome of one [`FrameTransport::build_and_send`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    /// Records written into the message.
    pub records: usize,
    /// Total message length.
    pub bytes: usize,
    /// Whether a viewer received the whole message.
    pub delivered: bool,
}

/// How long one message may take to reach the viewer by default.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(100);

/// Builds the metadata message for a frame and pushes it to the viewer.
pub struct FrameTransport {
    registry: RemoteBufferRegistry,
    staging: BytesMut,
    capacity: usize,
    max_buffers: usize,
    display_width: u32,
    display_height: u32,
    send_timeout: Duration,
    link: Option<PeerLink>,
}

impl FrameTransport {
    pub fn new(
        registry: RemoteBufferRegistry,
        max_buffers: usize,
        display_width: u32,
        display_height: u32,
    ) -> Self {
        let capacity = message_size(max_buffers);
        Self {
            registry,
            staging: BytesMut::with_capacity(capacity),
            capacity,
            max_buffers,
            display_width,
            display_height,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            link: None,
        }
    }

    /// Drop a viewer that does not take a whole message within `timeout`.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Route messages to the supervisor's current viewer.
    pub fn attach(&mut self, link: PeerLink) {
        self.link = Some(link);
    }

    pub fn registry(&self) -> &RemoteBufferRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut RemoteBufferRegistry {
        &mut self.registry
    }

    /// Largest message the staging buffer holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Assemble the metadata message for `layers` and send it if a viewer
    /// is connected.
    ///
    /// Errors only when a buffer cannot be exported or the frame cannot fit
    /// the staging buffer; nothing is sent in either case. Delivery
    /// problems are reported through [`FrameReport::delivered`] and hand
    /// the viewer back to the supervisor.
    pub async fn build_and_send(
        &mut self,
        layers: &[OverlayLayer],
    ) -> Result<FrameReport, HwcError> {
        let result = match self.build(layers) {
            Ok(records) => {
                let delivered = self.send().await;
                Ok(FrameReport {
                    records,
                    bytes: message_size(records),
                    delivered,
                })
            }
            Err(e) => Err(e),
        };

        self.staging.fill(0);
        self.staging.clear();
        result
    }

    fn build(&mut self, layers: &[OverlayLayer]) -> Result<usize, HwcError> {
        let expected = layers
            .iter()
            .filter(|l| l.is_visible() && self.registry.will_record(l))
            .count();
        if expected > self.max_buffers {
            return Err(self.overflow(expected));
        }

        self.staging.clear();
        self.staging.put_bytes(0, MARKER_SIZE + StreamHeader::SIZE);

        let mut records = 0;
        for layer in layers.iter().filter(|l| l.is_visible()) {
            let Some(info) = self.registry.resolve(layer)? else {
                continue;
            };
            if self.staging.len() + RemoteBufferInfo::SIZE + MARKER_SIZE > self.capacity {
                return Err(self.overflow(records + 1));
            }
            info.encode(&mut self.staging);
            records += 1;
        }

        let header = StreamHeader::new(records, self.display_width, self.display_height);
        self.staging[..MARKER_SIZE].copy_from_slice(&METADATA_STREAM_START.to_le_bytes());
        self.staging[MARKER_SIZE..MARKER_SIZE + StreamHeader::SIZE]
            .copy_from_slice(&header.encode());
        self.staging.put_u32_le(METADATA_STREAM_END);

        trace!(records, bytes = self.staging.len(), "frame metadata built");
        Ok(records)
    }

    fn overflow(&self, records: usize) -> HwcError {
        let needed = message_size(records);
        error!(records, needed, capacity = self.capacity, "staging overflow, dropping frame");
        HwcError::StagingOverflow {
            records,
            needed,
            capacity: self.capacity,
        }
    }

    async fn send(&self) -> bool {
        let Some(link) = self.link.as_ref() else {
            return false;
        };
        let mut slot = link.slot.lock().await;
        let Some(peer) = slot.as_mut() else {
            return false;
        };

        match write_within(&mut peer.stream, &self.staging, self.send_timeout).await {
            Ok(()) => true,
            Err(e) => {
                warn!(addr = %peer.addr, "sending frame metadata failed: {e}");
                link.report_lost(&mut slot);
                false
            }
        }
    }
}

/// [`write_message`] bounded by `timeout`; running out of time is a
/// `TimedOut` error.
pub(crate) async fn write_within<W>(
    writer: &mut W,
    message: &[u8],
    timeout: Duration,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    tokio::time::timeout(timeout, write_message(writer, message))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "viewer stopped reading"))?
}

/// Write all of `message`, continuing after short writes.
pub(crate) async fn write_message<W>(writer: &mut W, message: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while written < message.len() {
        match writer.write(&message[written..]).await {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    writer.flush().await
}
