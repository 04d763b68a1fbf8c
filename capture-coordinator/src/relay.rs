//! Length-prefixed JSON framing for the browser-side relay.
//!
//! Frames are a little-endian u32 byte length followed by a JSON body.
//! The reader treats EOF at a frame boundary as a clean shutdown and
//! rejects frames over [`MAX_FRAME_BYTES`] so a corrupt length prefix
//! cannot trigger an unbounded allocation.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{self, Read, Write};
use thiserror::Error;

/// Upper bound on a single frame body.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("frame of {0} bytes exceeds limit")]
    Oversized(usize),
    #[error("malformed frame body: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Read one frame. `Ok(None)` means the peer closed the stream at a
/// frame boundary.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, RelayError> {
    let mut length_bytes = [0u8; 4];
    match reader.read_exact(&mut length_bytes) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let length = u32::from_le_bytes(length_bytes) as usize;
    if length == 0 {
        return Ok(Some(Vec::new()));
    }
    if length > MAX_FRAME_BYTES {
        return Err(RelayError::Oversized(length));
    }

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body)?;
    Ok(Some(body))
}

/// Write one frame and flush.
pub fn write_frame<W: Write>(writer: &mut W, body: &[u8]) -> Result<(), RelayError> {
    if body.len() > MAX_FRAME_BYTES {
        return Err(RelayError::Oversized(body.len()));
    }
    writer.write_all(&(body.len() as u32).to_le_bytes())?;
    writer.write_all(body)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame and deserialize it.
pub fn read_json<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>, RelayError> {
    match read_frame(reader)? {
        Some(body) => Ok(Some(serde_json::from_slice(&body)?)),
        None => Ok(None),
    }
}

/// Serialize `value` and write it as one frame.
pub fn write_json<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<(), RelayError> {
    let body = serde_json::to_vec(value)?;
    write_frame(writer, &body)
}
