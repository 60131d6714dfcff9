//! Wire protocol: connection framing and the response envelope.
//!
//! Every message on a fastbin connection is one length-delimited [`Frame`]
//! carrying a correlation id. Request bodies start with the 2-byte protocol
//! version header; everything after it is produced by the negotiated
//! serialization strategy.

mod frame;
mod message;

pub use frame::{Frame, FrameCodec, DEFAULT_MAX_FRAME_SIZE};
pub use message::Response;

pub(crate) use frame::{max_body_len, read_version, write_version};

/// Highest protocol version implemented by this crate.
pub const PROTOCOL_VERSION: u16 = 1;
