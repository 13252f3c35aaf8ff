//! Consumer-side framing for the metadata stream.
//!
//! The decoder locks onto the start marker, waits for the advertised
//! message, and checks the end marker. Anything that does not frame up is
//! skipped so a reader that joins mid-stream resynchronises on the next
//! frame instead of failing.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::error::HwcError;
use crate::nested::wire::{
    FrameMetadata, MARKER_SIZE, METADATA_STREAM_END, METADATA_STREAM_START, RemoteBufferInfo,
    StreamHeader, message_size,
};

/// Default cap on records per frame accepted by the decoder.
pub const DEFAULT_MAX_RECORDS: usize = 64;

pub struct MetadataCodec {
    max_records: usize,
}

impl MetadataCodec {
    pub fn new(max_records: usize) -> Self {
        Self { max_records }
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }
}

impl Default for MetadataCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORDS)
    }
}

fn find_start(src: &[u8]) -> Option<usize> {
    let marker = METADATA_STREAM_START.to_le_bytes();
    src.windows(MARKER_SIZE).position(|w| w == marker)
}

impl Decoder for MetadataCodec {
    type Item = FrameMetadata;
    type Error = HwcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match find_start(src) {
                Some(0) => {}
                Some(skip) => {
                    warn!(skip, "discarding bytes before stream start");
                    src.advance(skip);
                }
                None => {
                    // Keep a tail that may hold the first bytes of a marker.
                    let keep = src.len().min(MARKER_SIZE - 1);
                    src.advance(src.len() - keep);
                    return Ok(None);
                }
            }

            if src.len() < MARKER_SIZE + StreamHeader::SIZE {
                return Ok(None);
            }
            let header = StreamHeader::decode(&src[MARKER_SIZE..])?;

            let records = match usize::try_from(header.n_buffers) {
                Ok(n) if n <= self.max_records => n,
                _ => {
                    warn!(n_buffers = header.n_buffers, "implausible record count, resyncing");
                    src.advance(MARKER_SIZE);
                    continue;
                }
            };

            let total = message_size(records);
            if src.len() < total {
                src.reserve(total - src.len());
                return Ok(None);
            }

            let end = &src[total - MARKER_SIZE..total];
            if end != METADATA_STREAM_END.to_le_bytes() {
                warn!("stream end marker missing, resyncing");
                src.advance(MARKER_SIZE);
                continue;
            }

            let frame = src.split_to(total);
            let body = &frame[MARKER_SIZE + StreamHeader::SIZE..total - MARKER_SIZE];
            let buffers = body
                .chunks_exact(RemoteBufferInfo::SIZE)
                .map(RemoteBufferInfo::decode)
                .collect::<Result<Vec<_>, _>>()?;

            return Ok(Some(FrameMetadata { header, buffers }));
        }
    }
}

impl Encoder<&FrameMetadata> for MetadataCodec {
    type Error = HwcError;

    fn encode(&mut self, item: &FrameMetadata, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let records = item.buffers.len();
        if records > self.max_records {
            return Err(HwcError::StagingOverflow {
                records,
                needed: message_size(records),
                capacity: message_size(self.max_records),
            });
        }
        let header = StreamHeader {
            n_buffers: records as i32,
            ..item.header
        };

        dst.reserve(message_size(records));
        dst.put_u32_le(METADATA_STREAM_START);
        dst.put_slice(&header.encode());
        for record in &item.buffers {
            record.encode(dst);
        }
        dst.put_u32_le(METADATA_STREAM_END);
        Ok(())
    }
}
