//! Length-prefixed framing: `[len: u32 big-endian][body: len bytes]`.

use crate::error::ActorSystemError;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Writes one frame and flushes it.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), ActorSystemError>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(body.len())
        .map_err(|_| ActorSystemError::Transport(format!("frame of {} bytes", body.len())))?;
    let mut frame = BytesMut::with_capacity(4 + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(body);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame.
///
/// Returns `Ok(None)` on a clean end of stream between frames. A stream that ends inside a
/// frame, or a frame larger than `max_size`, is an error.
pub async fn read_frame<R>(
    reader: &mut R,
    max_size: usize,
) -> Result<Option<Bytes>, ActorSystemError>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    let mut filled = 0;
    while filled < len_bytes.len() {
        let n = reader.read(&mut len_bytes[filled..]).await?;
        if n == 0 {
            return if filled == 0 {
                Ok(None)
            } else {
                Err(ActorSystemError::Transport("stream ended inside frame header".into()))
            };
        }
        filled += n;
    }

    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > max_size {
        return Err(ActorSystemError::Transport(format!(
            "frame of {len} bytes exceeds maximum {max_size}"
        )));
    }
    let mut body = BytesMut::zeroed(len);
    reader.read_exact(&mut body).await?;
    Ok(Some(body.freeze()))
}
