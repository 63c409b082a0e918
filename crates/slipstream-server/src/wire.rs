//! Direct frame I/O on a socket.
//!
//! Used where frames bypass the per-client queues: the handshake, admission
//! rejections, and the welcome write that happens before the socket is split
//! between the receiver and broadcaster workers.

use bytes::BytesMut;
use slipstream_proto::{Frame, FrameHeader};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ServerError;

/// Read one frame from the socket.
pub async fn read_frame(socket: &mut (impl AsyncRead + Unpin)) -> Result<Frame, ServerError> {
    let mut header_buf = [0u8; FrameHeader::SIZE];
    socket.read_exact(&mut header_buf).await?;
    let header = *FrameHeader::from_bytes(&header_buf)?;

    let mut payload = vec![0u8; header.payload_size() as usize];
    socket.read_exact(&mut payload).await?;

    Ok(Frame { header, payload: payload.into() })
}

/// Write one frame to the socket.
pub async fn write_frame(
    socket: &mut (impl AsyncWrite + Unpin),
    frame: &Frame,
) -> std::io::Result<()> {
    let mut buf = BytesMut::with_capacity(FrameHeader::SIZE + frame.payload.len());
    frame
        .encode(&mut buf)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    socket.write_all(&buf).await
}
