// src/invocation/mod.rs

//! Call disciplines.
//!
//! Both disciplines share one contract on the client side: encode the
//! request into an outbound buffer and hand back a [`ResponseFuture`] that
//! the connection resolves exactly once, with the response body or with a
//! transport error. They differ only in how the caller observes the outcome:
//!
//! - [`BlockingInvocationStrategy`]: the caller parks until the slot is
//!   resolved; refused on dispatch queue threads
//! - [`AsyncInvocationStrategy`]: a callback runs on the connection's
//!   dispatch queue
//!
//! Server side processing is the same for either discipline, see
//! [`service`].

mod async_callback;
mod blocking;

pub(crate) use async_callback::AsyncInvocationStrategy;
pub(crate) use blocking::BlockingInvocationStrategy;

use std::panic::AssertUnwindSafe;

use bytes::{Bytes, BytesMut};
use serde::Serialize;

use crate::dispatch::panic_message;
use crate::protocol::write_version;
use crate::serialization::SerializationStrategy;
use crate::{log_error, log_warn, Error, Fault, Method, Result};

/// Client side slot awaiting the response to one request.
pub(crate) trait ResponseFuture: Send + 'static {
    /// Resolve with a response body.
    fn set(self: Box<Self>, body: Bytes);

    /// Resolve with a transport failure.
    fn fail(self: Box<Self>, error: Error);
}

/// Server side view of one registered service.
pub(crate) trait ServiceEntry<S>: Send + Sync {
    /// Decode the arguments of `method`, run it and encode its outcome.
    ///
    /// Nothing is written to `out` when an error is returned before the
    /// method ran.
    fn invoke(&self, method: &str, serialization: &S, input: &mut Bytes, out: &mut BytesMut)
        -> Result<()>;

    /// Release the service object; called once when unregistered.
    fn release(&self);
}

/// Write the version header and encoded request into `out`.
///
/// Returns the strategy variant for `version`, which is also the one that
/// must decode the response.
fn encode_call<S, A, R, E>(
    serialization: &S,
    call_id: &str,
    method: &Method<A, R, E>,
    args: &A,
    out: &mut BytesMut,
    version: u16,
) -> Result<S>
where
    S: SerializationStrategy,
    A: Serialize,
{
    // ---
    let serialization = serialization.for_protocol_version(version)?;
    let mark = out.len();
    write_version(out, version);
    if let Err(err) = serialization.encode_request(call_id, method.name(), args, out) {
        out.truncate(mark);
        return Err(err);
    }
    Ok(serialization)
}

/// Run one decoded request against its service and produce the response.
///
/// `out` receives the encoded outcome. If the arguments cannot be decoded,
/// the method panics or its outcome cannot be encoded, whatever was written
/// is discarded and a fault is encoded in its place. `on_complete` is called
/// exactly once, with the finished buffer.
pub(crate) fn service<S, F>(
    serialization: &S,
    method: &str,
    target: &dyn ServiceEntry<S>,
    input: &mut Bytes,
    mut out: BytesMut,
    on_complete: F,
) where
    S: SerializationStrategy,
    F: FnOnce(BytesMut),
{
    // ---
    let mark = out.len();

    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
        target.invoke(method, serialization, input, &mut out)
    }));

    let fault = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(Error::Fault(fault))) => Some(fault),
        Ok(Err(err)) => Some(Fault::Remote(err.to_string())),
        Err(panic) => Some(Fault::Remote(format!(
            "method {method} panicked: {}",
            panic_message(&*panic)
        ))),
    };

    if let Some(fault) = fault {
        log_warn!("request for {} failed: {}", method, fault);
        out.truncate(mark);
        if let Err(err) = serialization.encode_fault(&fault, &mut out) {
            log_error!("could not encode fault for {}: {}", method, err);
            out.truncate(mark);
        }
    }

    on_complete(out);
}
