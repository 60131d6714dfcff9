// src/protocol/frame.rs

//! Connection framing.
//!
//! Wire format of every frame, in both directions:
//!
//! - length: u32 (big-endian), number of bytes that follow
//! - correlation: u64 (big-endian), pairs a response with its request
//! - body: `length - 8` bytes
//!
//! Request bodies begin with the protocol version:
//!
//! - version: u16 (big-endian)
//! - payload: call id, method selector and arguments, as encoded by the
//!   serialization strategy selected for that version
//!
//! Response bodies are the encoded [`Response`](super::Response) only.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{Error, Result};

/// Default upper bound for a single frame (16 MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const LENGTH_LEN: usize = 4;
const CORRELATION_LEN: usize = 8;
const VERSION_LEN: usize = 2;

/// One message on a fastbin connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub correlation: u64,
    pub body: Bytes,
}

impl Frame {
    pub fn new(correlation: u64, body: Bytes) -> Self {
        Self { correlation, body }
    }
}

/// Length-delimited codec for [`Frame`]s with max size enforcement.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::result::Result<Option<Frame>, Self::Error> {
        // ---
        if src.len() < LENGTH_LEN {
            return Ok(None);
        }

        // Peek at the length without consuming
        let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;

        if len < CORRELATION_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("frame too short: {len} bytes"),
            ));
        }

        if len > self.max_frame_size {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "frame too large: {len} bytes (max: {} bytes)",
                    self.max_frame_size
                ),
            ));
        }

        if src.len() < LENGTH_LEN + len {
            src.reserve(LENGTH_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_LEN);
        let correlation = src.get_u64();
        let body = src.split_to(len - CORRELATION_LEN).freeze();

        Ok(Some(Frame { correlation, body }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> std::result::Result<(), Self::Error> {
        // ---
        let len = CORRELATION_LEN + item.body.len();

        if len > self.max_frame_size || len > u32::MAX as usize {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "frame too large: {len} bytes (max: {} bytes)",
                    self.max_frame_size
                ),
            ));
        }

        dst.reserve(LENGTH_LEN + len);
        dst.put_u32(len as u32);
        dst.put_u64(item.correlation);
        dst.put_slice(&item.body);

        Ok(())
    }
}

/// Largest body that fits in a frame of at most `max_frame_size` bytes.
pub(crate) fn max_body_len(max_frame_size: usize) -> usize {
    max_frame_size.min(u32::MAX as usize).saturating_sub(CORRELATION_LEN)
}

/// Write the protocol version header of a request body.
pub(crate) fn write_version(out: &mut BytesMut, version: u16) {
    out.put_u16(version);
}

/// Read the protocol version header of a request body.
pub(crate) fn read_version(input: &mut Bytes) -> Result<u16> {
    // ---
    if input.remaining() < VERSION_LEN {
        return Err(Error::Serialization(format!(
            "request body too short for the version header: {} bytes",
            input.remaining()
        )));
    }
    Ok(input.get_u16())
}
