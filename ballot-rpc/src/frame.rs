//! Length-prefixed bincode framing shared by client and server

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Result, RpcError};

/// Largest frame either side will accept, the same bound as an encoded
/// envelope
pub const MAX_FRAME_LEN: usize = ballot_common::envelope::MAX_ENCODED_SIZE;

/// Read one frame: a big-endian `u32` length followed by that many bytes
pub async fn read_frame<T, S>(stream: &mut S) -> Result<T>
where
    T: DeserializeOwned,
    S: AsyncRead + Unpin + Send,
{
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            RpcError::ConnectionClosed
        } else {
            RpcError::Io(e)
        }
    })?;

    let len = usize::try_from(u32::from_be_bytes(len_buf)).unwrap_or(usize::MAX);
    if len > MAX_FRAME_LEN {
        return Err(RpcError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut bytes = vec![0u8; len];
    stream.read_exact(&mut bytes).await?;

    let (value, _): (T, _) =
        bincode::serde::decode_from_slice(
            bytes.as_slice(),
            bincode::config::legacy().with_limit::<MAX_FRAME_LEN>(),
        )?;
    Ok(value)
}

/// Write one frame and flush
pub async fn write_frame<T, S>(stream: &mut S, value: &T) -> Result<()>
where
    T: Serialize + Sync,
    S: AsyncWrite + Unpin + Send,
{
    let bytes = bincode::serde::encode_to_vec(
        value,
        bincode::config::legacy().with_limit::<MAX_FRAME_LEN>(),
    )?;
    if bytes.len() > MAX_FRAME_LEN {
        return Err(RpcError::FrameTooLarge {
            size: bytes.len(),
            max: MAX_FRAME_LEN,
        });
    }

    let len = u32::try_from(bytes.len())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&bytes).await?;
    stream.flush().await?;

    Ok(())
}
