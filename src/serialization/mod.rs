// src/serialization/mod.rs

//! Pluggable, versioned payload encoding.
//!
//! The transport frames bytes and routes them; everything inside a request
//! or response body after the version header belongs to a
//! [`SerializationStrategy`]. Strategies are selected per request through
//! [`SerializationStrategy::for_protocol_version`], so a server can keep
//! answering old clients after the encoding evolves.

mod json;
mod msgpack;

pub use json::JsonSerialization;
pub use msgpack::MsgPackSerialization;

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::protocol::{Response, PROTOCOL_VERSION};
use crate::{Fault, Result};

/// Encoding of request and response payloads.
///
/// Implementations are cheap to clone and shared across all connections.
/// The provided methods define the payload layout in terms of
/// [`encode`](Self::encode) and [`decode`](Self::decode):
///
/// - request: call id, method selector, argument tuple
/// - response: one [`Response`] value
pub trait SerializationStrategy: Clone + Send + Sync + 'static {
    // ---

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Protocol version this instance encodes.
    fn protocol_version(&self) -> u16;

    /// Highest protocol version this codec can produce a variant for.
    fn max_protocol_version(&self) -> u16 {
        PROTOCOL_VERSION
    }

    /// Variant of this strategy for `version`.
    ///
    /// Fails with [`Fault::UnsupportedVersion`] when `version` exceeds
    /// [`max_protocol_version`](Self::max_protocol_version).
    fn for_protocol_version(&self, version: u16) -> Result<Self>;

    /// Append one value to `out`.
    fn encode<T: Serialize + ?Sized>(&self, value: &T, out: &mut BytesMut) -> Result<()>;

    /// Consume one value from the front of `input`.
    fn decode<T: DeserializeOwned>(&self, input: &mut Bytes) -> Result<T>;

    fn encode_request<A: Serialize + ?Sized>(
        &self,
        call_id: &str,
        method: &str,
        args: &A,
        out: &mut BytesMut,
    ) -> Result<()> {
        // ---
        self.encode(call_id, out)?;
        self.encode(method, out)?;
        self.encode(args, out)
    }

    /// Decode the call id and method selector of a request.
    fn decode_request_header(&self, input: &mut Bytes) -> Result<(String, String)> {
        // ---
        let call_id: String = self.decode(input)?;
        let method: String = self.decode(input)?;
        Ok((call_id, method))
    }

    fn decode_request_args<A: DeserializeOwned>(&self, input: &mut Bytes) -> Result<A> {
        self.decode(input)
    }

    /// Encode the outcome of a method: its value or its application error.
    fn encode_response<R: Serialize, E: Serialize>(
        &self,
        outcome: &std::result::Result<R, E>,
        out: &mut BytesMut,
    ) -> Result<()> {
        // ---
        self.encode(&Response::from(outcome), out)
    }

    /// Encode a response that carries a fault instead of an outcome.
    fn encode_fault(&self, fault: &Fault, out: &mut BytesMut) -> Result<()> {
        // ---
        self.encode(&Response::<(), ()>::Fault(fault.clone()), out)
    }

    /// Decode a response and hand it to `callback`, exactly once.
    ///
    /// The callback receives `Ok(Ok(value))` on success, `Ok(Err(error))`
    /// for an application error and `Err(..)` for a fault or a payload that
    /// could not be decoded.
    fn decode_response<R, E, F>(&self, input: &mut Bytes, callback: F)
    where
        R: DeserializeOwned,
        E: DeserializeOwned,
        F: FnOnce(Result<std::result::Result<R, E>>),
    {
        // ---
        callback(
            self.decode::<Response<R, E>>(input)
                .and_then(Response::into_result),
        )
    }
}

/// Shared version check for the built-in codecs.
pub(crate) fn check_version(version: u16, supported: u16) -> Result<u16> {
    // ---
    if version > supported {
        return Err(Fault::UnsupportedVersion {
            received: version,
            supported,
        }
        .into());
    }
    Ok(version)
}
