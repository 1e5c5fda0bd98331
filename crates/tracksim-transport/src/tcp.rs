//! TCP transport implementation

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tracksim_core::{TrackError, TrackResult};
use tracksim_wire::{FrameHeader, Message, HEADER_SIZE};

/// Connect to a server endpoint, failing after `timeout`
pub async fn connect(addr: &str, timeout: Duration) -> TrackResult<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| TrackError::Connection {
            addr: addr.to_string(),
            reason: format!("timed out after {:?}", timeout),
        })?
        .map_err(|e| TrackError::Connection {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;

    stream
        .set_nodelay(true)
        .map_err(|e| TrackError::TransportError(e.to_string()))?;
    Ok(stream)
}

/// Read one raw frame without decoding its payload. Returns `None` when the
/// peer closed the stream between frames.
pub async fn read_frame<R>(reader: &mut R) -> TrackResult<Option<(FrameHeader, Vec<u8>)>>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(TrackError::TransportError(e.to_string())),
    }

    let header = FrameHeader::parse(&header_buf)?;
    let mut payload = vec![0u8; header.payload_len as usize];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| TrackError::TransportError(e.to_string()))?;

    Ok(Some((header, payload)))
}

/// Read one framed message. Returns `None` when the peer closed the stream
/// between frames.
pub async fn read_message<R>(reader: &mut R) -> TrackResult<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    match read_frame(reader).await? {
        Some((header, payload)) => Message::decode(&header, &payload).map(Some),
        None => Ok(None),
    }
}

/// Write one framed message
pub async fn write_message<W>(writer: &mut W, message: &Message) -> TrackResult<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = message.encode()?;
    writer
        .write_all(&frame)
        .await
        .map_err(|e| TrackError::TransportError(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| TrackError::TransportError(e.to_string()))?;
    Ok(())
}

/// Message receiver channel
pub type MessageReceiver = mpsc::Receiver<Message>;

/// Start a background receive loop. A frame whose payload fails to decode
/// is skipped; the channel closes when the stream ends, framing is lost, or
/// the receiver is dropped.
pub fn start_receive_loop<R>(mut reader: R, buffer_size: usize) -> (MessageReceiver, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer_size);

    let task = tokio::spawn(async move {
        loop {
            let (header, payload) = match read_frame(&mut reader).await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    tracing::debug!("pose stream closed by peer");
                    break;
                }
                Err(e) => {
                    tracing::warn!("pose stream receive error: {}", e);
                    break;
                }
            };

            let message = match Message::decode(&header, &payload) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(
                        kind = ?header.kind,
                        seq = header.seq,
                        "skipping undecodable frame: {}",
                        e
                    );
                    continue;
                }
            };

            if tx.send(message).await.is_err() {
                break; // Receiver dropped
            }
        }
    });

    (rx, task)
}
