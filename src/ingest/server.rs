//! Ingest push listener
//!
//! Handles the TCP accept loop and spawns one task per publisher.
//!
//! Push protocol:
//! ```text
//! +-----------------+-------------------+--------------------------------+
//! | path length     | path (UTF-8)      | IVF stream (header + frames)   |
//! | u16 big-endian  | `length` bytes    | until the publisher disconnects |
//! +-----------------+-------------------+--------------------------------+
//! ```

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use super::config::IngestConfig;
use super::error::IngestError;
use super::frame::IngestFrame;
use super::hub::IngestHub;
use crate::container::ivf::{FRAME_HEADER_SIZE, IVF_HEADER_SIZE};
use crate::container::{ContainerError, FrameHeader, IvfHeader};
use crate::error::Result;
use crate::media::vp8;

/// Used when the pushed header has no usable time base
const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Ingest server accepting pushed streams
pub struct IngestServer {
    config: IngestConfig,
    hub: Arc<IngestHub>,
    next_publisher_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl IngestServer {
    pub fn new(config: IngestConfig) -> Self {
        let hub = Arc::new(IngestHub::with_config(config.clone()));
        Self::with_hub(config, hub)
    }

    /// Create a server publishing into an existing hub
    pub fn with_hub(config: IngestConfig, hub: Arc<IngestHub>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            hub,
            next_publisher_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    pub fn hub(&self) -> &Arc<IngestHub> {
        &self.hub
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Bind and run until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Run on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Ingest server listening");

        let cleanup_handle = self.hub.spawn_cleanup_task();

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
            }
            _ = self.accept_loop(&listener) => {}
        }

        cleanup_handle.abort();
        Ok(())
    }

    async fn accept_loop(&self, listener: &TcpListener) {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let publisher_id = self.next_publisher_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(publisher_id = publisher_id, peer = %peer_addr, "New ingest connection");

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
            }
        }

        let hub = Arc::clone(&self.hub);
        let handshake_timeout = self.config.handshake_timeout;

        tokio::spawn(async move {
            let _permit = permit;
            match handle_publisher(socket, &hub, publisher_id, handshake_timeout).await {
                Ok(frames) => {
                    tracing::debug!(publisher_id = publisher_id, frames = frames, "Ingest connection closed");
                }
                Err(e) => {
                    tracing::warn!(publisher_id = publisher_id, peer = %peer_addr, error = %e, "Ingest connection dropped");
                }
            }
        });
    }
}

/// Serve one publisher connection; returns the number of frames published
pub async fn handle_publisher<S>(
    mut stream: S,
    hub: &IngestHub,
    publisher_id: u64,
    handshake_timeout: Duration,
) -> std::result::Result<u64, IngestError>
where
    S: AsyncRead + Unpin,
{
    let path = tokio::time::timeout(handshake_timeout, read_path(&mut stream))
        .await
        .map_err(|_| IngestError::HandshakeTimeout)??;

    // Rejection drops the connection without touching the existing publisher
    hub.register_publisher(&path, publisher_id).await?;

    let result = pump_stream(&mut stream, hub, &path).await;
    hub.unregister_publisher(&path, publisher_id).await;
    result
}

async fn read_path<S: AsyncRead + Unpin>(stream: &mut S) -> std::result::Result<String, IngestError> {
    let len = stream.read_u16().await? as usize;
    if len == 0 {
        return Err(IngestError::InvalidPath);
    }
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    String::from_utf8(buf).map_err(|_| IngestError::InvalidPath)
}

async fn pump_stream<S: AsyncRead + Unpin>(
    stream: &mut S,
    hub: &IngestHub,
    path: &str,
) -> std::result::Result<u64, IngestError> {
    let mut buf = [0u8; IVF_HEADER_SIZE];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|e| eof_as(e, ContainerError::TruncatedHeader))?;
    let header = IvfHeader::parse(&buf)?;
    let duration = header.frame_interval().unwrap_or(DEFAULT_FRAME_INTERVAL);

    tracing::info!(
        path = %path,
        width = header.width,
        height = header.height,
        interval_ms = duration.as_millis() as u64,
        "Ingest stream started"
    );

    let mut index = 0u64;
    loop {
        let mut frame_buf = [0u8; FRAME_HEADER_SIZE];
        match read_full(stream, &mut frame_buf).await? {
            // Publisher finished between frames
            0 => break,
            FRAME_HEADER_SIZE => {}
            _ => return Err(ContainerError::TruncatedFrameHeader.into()),
        }
        let frame_header = FrameHeader::parse(&frame_buf)?;

        let mut data = BytesMut::zeroed(frame_header.size as usize);
        let n = read_full(stream, &mut data).await?;
        if n < data.len() {
            return Err(ContainerError::TruncatedFrame {
                expected: frame_header.size,
                actual: n,
            }
            .into());
        }

        let data = data.freeze();
        let is_keyframe = vp8::is_keyframe(&data);
        hub.publish(path, IngestFrame::new(index, data, duration, is_keyframe))
            .await;
        index += 1;
    }

    tracing::info!(path = %path, frames = index, "Ingest stream ended");
    Ok(index)
}

/// Read until `buf` is full or the stream ends; returns the bytes read
async fn read_full<S: AsyncRead + Unpin>(stream: &mut S, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

fn eof_as(e: std::io::Error, truncated: ContainerError) -> IngestError {
    if e.kind() == ErrorKind::UnexpectedEof {
        IngestError::Container(truncated)
    } else {
        IngestError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::container::IvfWriter;

    fn push_bytes(path: &str, frames: &[&[u8]]) -> Vec<u8> {
        let mut writer = IvfWriter::new(Cursor::new(Vec::new()), IvfHeader::vp8(320, 240)).unwrap();
        for (i, frame) in frames.iter().enumerate() {
            writer.write_frame(frame, i as u64).unwrap();
        }
        let ivf = writer.close().unwrap().into_inner();

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(path.len() as u16).to_be_bytes());
        bytes.extend_from_slice(path.as_bytes());
        bytes.extend_from_slice(&ivf);
        bytes
    }

    #[tokio::test]
    async fn test_publisher_frames_reach_cursor() {
        let hub = IngestHub::new();
        hub.register_publisher("cam", 99).await.unwrap();
        let mut cursor = hub.latest("cam").await.unwrap();
        hub.unregister_publisher("cam", 99).await;

        let bytes = push_bytes("cam", &[&[0x10, 0xAA][..], &[0x11, 0xBB][..]]);
        let frames = handle_publisher(&bytes[..], &hub, 1, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(frames, 2);

        let first = cursor.recv().await.unwrap();
        assert_eq!(first.index, 0);
        assert!(first.is_keyframe);
        assert_eq!(first.duration, Duration::from_nanos(33_333_333));

        let second = cursor.recv().await.unwrap();
        assert_eq!(&second.data[..], &[0x11, 0xBB]);
        assert!(!second.is_keyframe);

        assert!(!hub.has_publisher("cam").await);
    }

    #[tokio::test]
    async fn test_second_publisher_rejected() {
        let hub = IngestHub::new();
        hub.register_publisher("cam", 1).await.unwrap();

        let bytes = push_bytes("cam", &[&[0x10][..]]);
        let result = handle_publisher(&bytes[..], &hub, 2, Duration::from_secs(1)).await;

        assert!(matches!(result, Err(IngestError::AlreadyPublishing(_))));
        assert!(hub.has_publisher("cam").await);
        assert_eq!(hub.stream_stats("cam").await.unwrap().frames_published, 0);
    }

    #[tokio::test]
    async fn test_push_split_across_reads() {
        let hub = IngestHub::new();
        let bytes = push_bytes("cam", &[&[0x10, 0xAA, 0xBB][..]]);
        let stream = tokio_test::io::Builder::new()
            .read(&bytes[..1])
            .read(&bytes[1..20])
            .read(&bytes[20..])
            .build();

        let frames = handle_publisher(stream, &hub, 1, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(frames, 1);
        assert_eq!(hub.stream_stats("cam").await.unwrap().frames_published, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_publisher_times_out() {
        let hub = IngestHub::new();
        let stream = tokio_test::io::Builder::new()
            .wait(Duration::from_secs(30))
            .build();

        let result = handle_publisher(stream, &hub, 1, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(IngestError::HandshakeTimeout)));
        assert_eq!(hub.stream_count().await, 0);
    }

    #[tokio::test]
    async fn test_empty_path_rejected() {
        let hub = IngestHub::new();
        let bytes = [0u8, 0u8];
        let result = handle_publisher(&bytes[..], &hub, 1, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(IngestError::InvalidPath)));
    }

    #[tokio::test]
    async fn test_truncated_frame_releases_path() {
        let hub = IngestHub::new();
        let mut bytes = push_bytes("cam", &[&[0x10, 1, 2, 3, 4, 5][..]]);
        bytes.truncate(bytes.len() - 3);

        let result = handle_publisher(&bytes[..], &hub, 1, Duration::from_secs(1)).await;
        assert!(matches!(
            result,
            Err(IngestError::Container(ContainerError::TruncatedFrame { .. }))
        ));
        assert!(!hub.has_publisher("cam").await);
    }

    #[tokio::test]
    async fn test_partial_frame_header_is_truncation() {
        let hub = IngestHub::new();
        let mut bytes = push_bytes("cam", &[&[0x10, 1, 2][..]]);
        // First frame intact, then 5 of the next 12 header bytes
        bytes.extend_from_slice(&[9, 0, 0, 0, 1]);

        let result = handle_publisher(&bytes[..], &hub, 1, Duration::from_secs(1)).await;
        assert!(matches!(
            result,
            Err(IngestError::Container(ContainerError::TruncatedFrameHeader))
        ));
        assert_eq!(hub.stream_stats("cam").await.unwrap().frames_published, 1);
        assert!(!hub.has_publisher("cam").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout() {
        let hub = IngestHub::new();
        let (client, server) = tokio::io::duplex(64);

        let result = handle_publisher(server, &hub, 1, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(IngestError::HandshakeTimeout)));
        drop(client);
    }

    #[tokio::test]
    async fn test_server_accepts_push() {
        let server = IngestServer::new(IngestConfig::default());
        let hub = Arc::clone(server.hub());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = stop_rx.await;
                })
                .await
        });

        let mut socket = TcpStream::connect(addr).await.unwrap();
        let bytes = push_bytes("live/cam", &[]);
        socket.write_all(&bytes).await.unwrap();

        while !hub.has_publisher("live/cam").await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let mut cursor = hub.latest("live/cam").await.unwrap();

        let frame = [0x10u8, 0x01, 0x02];
        let mut record = Vec::new();
        record.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        record.extend_from_slice(&0u64.to_le_bytes());
        record.extend_from_slice(&frame);
        socket.write_all(&record).await.unwrap();

        let got = cursor.recv().await.unwrap();
        assert_eq!(&got.data[..], &frame);

        drop(socket);
        let _ = stop_tx.send(());
        task.await.unwrap().unwrap();
    }
}
