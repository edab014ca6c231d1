//! Length-prefixed framing over a byte stream.
//!
//! Each frame is a 4-byte big-endian unsigned length followed by that many
//! payload bytes. Payloads larger than [`MAX_FRAME_LEN`] are refused in both
//! directions.
use std::io::{self, Read, Write};

use bincode::{
    Decode, Encode,
    config::{BigEndian, Configuration, Fixint, Limit},
};
use log::trace;
use thiserror::Error;

use crate::error::ClientError;

/// Upper bound on a single frame's payload (16 MiB).
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const LENGTH_PREFIX: usize = size_of::<u32>();

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame io error: {0}")]
    Io(#[from] io::Error),

    #[error("frame too large: {len} bytes exceeds max {max}")]
    TooLarge { len: usize, max: usize },

    #[error("invalid frame length {len} (max {max})")]
    InvalidLength { len: u32, max: usize },
}

/// Wire codec shared by every control message. Decoded lengths are capped at
/// [`MAX_FRAME_LEN`] before anything is allocated.
pub(crate) fn codec() -> Configuration<BigEndian, Fixint, Limit<MAX_FRAME_LEN>> {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
        .with_limit::<MAX_FRAME_LEN>()
}

pub fn encode_message<M: Encode>(message: &M) -> Result<Vec<u8>, ClientError> {
    Ok(bincode::encode_to_vec(message, codec())?)
}

pub fn decode_message<M: Decode<()>>(bytes: &[u8]) -> Result<M, ClientError> {
    let (message, read) = bincode::decode_from_slice(bytes, codec())?;
    if read != bytes.len() {
        return Err(ClientError::Protocol(format!(
            "trailing bytes after message: decoded {read} of {}",
            bytes.len()
        )));
    }
    Ok(message)
}

pub struct FrameTransport<T: Read + Write> {
    stream: T,
}

impl<T: Read + Write> FrameTransport<T> {
    pub fn new(stream: T) -> Self {
        Self { stream }
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    pub fn write_frame(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        if payload.len() > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge {
                len: payload.len(),
                max: MAX_FRAME_LEN,
            });
        }

        let len = payload.len() as u32;
        self.stream.write_all(&len.to_be_bytes())?;
        self.stream.write_all(payload)?;
        self.stream.flush()?;
        trace!("wrote frame of {len} bytes");
        Ok(())
    }

    /// Reads the next frame. `Ok(None)` means the peer closed the stream
    /// cleanly before a new length prefix started.
    pub fn read_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let mut prefix = [0u8; LENGTH_PREFIX];
        let mut read = 0usize;
        while read < prefix.len() {
            match self.stream.read(&mut prefix[read..]) {
                Ok(0) if read == 0 => return Ok(None),
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "frame length prefix truncated",
                    )
                    .into());
                }
                Ok(n) => read += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let len = u32::from_be_bytes(prefix);
        if len as usize > MAX_FRAME_LEN {
            return Err(FrameError::InvalidLength {
                len,
                max: MAX_FRAME_LEN,
            });
        }

        let mut payload = vec![0u8; len as usize];
        self.stream.read_exact(&mut payload)?;
        trace!("read frame of {len} bytes");
        Ok(Some(payload))
    }
}
