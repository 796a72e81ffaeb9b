//! Length-prefixed CBOR framing over any async byte stream.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Error, Result};

/// Upper bound on a single frame's payload.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Write one message as a u32 big-endian length prefix plus CBOR payload.
///
/// # Errors
///
/// Returns an error if encoding fails, the message exceeds
/// [`MAX_FRAME_SIZE`], or the underlying write fails.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut payload = Vec::new();
    ciborium::ser::into_writer(message, &mut payload)
        .map_err(|e| Error::Encode(e.to_string()))?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge(payload.len()));
    }
    let len = u32::try_from(payload.len()).map_err(|_| Error::FrameTooLarge(payload.len()))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one message. Returns `Ok(None)` on a clean close at a frame
/// boundary; a close mid-frame is an error.
///
/// # Errors
///
/// Returns an error on I/O failure, an oversized frame, or a payload that
/// does not decode.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    let message =
        ciborium::de::from_reader(payload.as_slice()).map_err(|e| Error::Decode(e.to_string()))?;
    Ok(Some(message))
}
