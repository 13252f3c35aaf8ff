//! Connection to the nested display and the frame receive loop.

use std::io;

use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vhwc_core::{FrameMetadata, HwcError, MetadataCodec};

use crate::config::ViewerConfig;

/// Framed metadata stream from one nested display.
pub type FrameStream = FramedRead<TcpStream, MetadataCodec>;

/// Running totals across sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewerStats {
    pub sessions: u64,
    pub frames: u64,
    pub records: u64,
    /// Buffer count of the most recent frame.
    pub last_buffers: usize,
}

pub struct ViewerClient {
    config: ViewerConfig,
    stats: ViewerStats,
}

impl ViewerClient {
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            stats: ViewerStats::default(),
        }
    }

    pub fn stats(&self) -> ViewerStats {
        self.stats
    }

    /// Connect to the configured display within the configured timeout.
    pub async fn connect(&self) -> Result<FrameStream, HwcError> {
        let addr = self.config.network.address.as_str();
        info!("connecting to nested display at {addr}");
        let stream = tokio::time::timeout(self.config.timeout(), TcpStream::connect(addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        stream.set_nodelay(true)?;
        Ok(FramedRead::new(
            stream,
            MetadataCodec::new(self.config.stream.max_buffers),
        ))
    }

    /// Receive frames until the display closes the stream or `cancel` fires.
    pub async fn receive(&mut self, frames: &mut FrameStream, cancel: &CancellationToken) {
        self.stats.sessions += 1;
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return,
                next = frames.next() => next,
            };
            match next {
                Some(Ok(frame)) => self.record(&frame),
                Some(Err(e)) => {
                    warn!("metadata stream error: {e}");
                    return;
                }
                None => {
                    info!("nested display closed the stream");
                    return;
                }
            }
        }
    }

    /// Connect, receive, and reconnect after a pause, until cancelled.
    pub async fn run(&mut self, cancel: CancellationToken) {
        while !cancel.is_cancelled() {
            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                connected = self.connect() => connected,
            };
            match connected {
                Ok(mut frames) => self.receive(&mut frames, &cancel).await,
                Err(e) => warn!("connect failed: {e}"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay()) => {}
            }
        }
        info!(
            frames = self.stats.frames,
            records = self.stats.records,
            "viewer stopped"
        );
    }

    fn record(&mut self, frame: &FrameMetadata) {
        self.stats.frames += 1;
        self.stats.records += frame.buffers.len() as u64;
        self.stats.last_buffers = frame.buffers.len();

        info!(
            buffers = frame.buffers.len(),
            width = frame.header.display_width,
            height = frame.header.display_height,
            "frame"
        );
        for buffer in &frame.buffers {
            debug!(
                surface = buffer.surface_name(),
                id = buffer.remote_id.id,
                format = buffer.format,
                size = ?(buffer.width, buffer.height),
                bbox = ?buffer.bbox,
                rotation = buffer.rotation,
                "buffer"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio_util::codec::Encoder;
    use vhwc_core::nested::wire::fixed_surface_name;
    use vhwc_core::{RemoteBufferId, RemoteBufferInfo, StreamHeader};

    fn frame(records: usize) -> FrameMetadata {
        let buffer = RemoteBufferInfo {
            width: 640,
            height: 480,
            format: 0x305E,
            pitch: [2560, 0, 0],
            offset: [0; 3],
            bpp: 32,
            tile_format: 0,
            rotation: 0,
            status: 0,
            counter: 0,
            remote_id: RemoteBufferId {
                id: 1,
                rng_key: [0; 3],
            },
            surface_name: fixed_surface_name("Cluster"),
            surface_id: 1,
            bbox: [0, 0, 640, 480],
        };
        FrameMetadata {
            header: StreamHeader::new(records, 1920, 1080),
            buffers: vec![buffer; records],
        }
    }

    async fn serve(frames: Vec<FrameMetadata>) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut out = BytesMut::new();
            for frame in &frames {
                MetadataCodec::default().encode(frame, &mut out).unwrap();
            }
            stream.write_all(&out).await.unwrap();
        });
        addr
    }

    fn client(addr: std::net::SocketAddr) -> ViewerClient {
        let mut config = ViewerConfig::default();
        config.network.address = addr.to_string();
        ViewerClient::new(config)
    }

    #[tokio::test]
    async fn counts_frames_until_stream_ends() {
        let addr = serve(vec![frame(2), frame(0), frame(1)]).await;
        let mut client = client(addr);

        let mut frames = client.connect().await.unwrap();
        client.receive(&mut frames, &CancellationToken::new()).await;

        let stats = client.stats();
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.records, 3);
        assert_eq!(stats.last_buffers, 1);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = client(listener.local_addr().unwrap());
        drop(listener);

        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), client.run(cancel))
            .await
            .expect("run ignored cancellation");
        assert_eq!(client.stats().frames, 0);
    }
}
