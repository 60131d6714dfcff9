use std::sync::Arc;

use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::oneshot;

use super::Inner;
use crate::invocation::{AsyncInvocationStrategy, BlockingInvocationStrategy, ResponseFuture};
use crate::protocol::max_body_len;
use crate::serialization::{MsgPackSerialization, SerializationStrategy};
use crate::{Address, CallId, Error, Method, Result};

/// Caller side handle of one remote service.
///
/// Every call yields a nested result: the outer `Result` reports transport
/// failures and faults, the inner one is what the remote method returned.
///
/// ```no_run
/// # use fastbin_rpc::{ClientInvoker, Method, RemoteError};
/// # fn demo(client: &ClientInvoker) -> fastbin_rpc::Result<()> {
/// const HELLO: Method<(String,), String> = Method::new("hello");
///
/// let greeter = client.get_proxy("tcp://localhost:9000", "greeter", 1)?;
/// match greeter.invoke(&HELLO, ("Fabric".to_string(),))? {
///     Ok(greeting) => println!("{greeting}"),
///     Err(err) => eprintln!("greeter refused: {err}"),
/// }
/// # Ok(())
/// # }
/// ```
pub struct InvocationHandler<S = MsgPackSerialization> {
    // ---
    client: Arc<Inner<S>>,
    address: Address,
    call_id: CallId,
    protocol_version: u16,
}

impl<S> Clone for InvocationHandler<S> {
    fn clone(&self) -> Self {
        // ---
        Self {
            client: self.client.clone(),
            address: self.address.clone(),
            call_id: self.call_id.clone(),
            protocol_version: self.protocol_version,
        }
    }
}

impl<S> std::fmt::Debug for InvocationHandler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // ---
        f.debug_struct("InvocationHandler")
            .field("address", &self.address)
            .field("call_id", &self.call_id)
            .field("protocol_version", &self.protocol_version)
            .finish_non_exhaustive()
    }
}

impl<S: SerializationStrategy> InvocationHandler<S> {
    // ---

    pub(super) fn new(client: Arc<Inner<S>>, address: Address, call_id: CallId, protocol_version: u16) -> Self {
        // ---
        Self {
            client,
            address,
            call_id,
            protocol_version,
        }
    }

    /// Call `method` and park the calling thread until the response arrives.
    ///
    /// # Errors
    ///
    /// - [`Error::BlockingOnDispatchQueue`] when called from a dispatch
    ///   queue task; use [`invoke_async`](Self::invoke_async) there
    /// - [`Error::BlockingOnRuntime`] when called from a thread driving a
    ///   current-thread tokio runtime
    /// - [`Error::Serialization`] when the request cannot be encoded or does
    ///   not fit in one frame
    /// - [`Error::Fault`] when the server could not run the call
    /// - [`Error::Transport`] / [`Error::ConnectionClosed`] when the
    ///   connection failed
    pub fn invoke<A, R, E>(&self, method: &Method<A, R, E>, args: A) -> Result<std::result::Result<R, E>>
    where
        A: Serialize,
        R: DeserializeOwned + Send + 'static,
        E: DeserializeOwned + Send + 'static,
    {
        // ---
        let mut out = BytesMut::new();
        let (slot, response) = BlockingInvocationStrategy.request(
            &self.client.serialization,
            self.call_id.as_str(),
            method,
            &args,
            &mut out,
            self.protocol_version,
        )?;

        self.send(out, slot);
        response.wait()
    }

    /// Call `method` without waiting; `callback` receives the outcome.
    ///
    /// The callback runs exactly once. Outcomes delivered by the connection
    /// run on its dispatch queue, in response order. Failures detected
    /// before anything is sent run on the calling thread.
    pub fn invoke_async<A, R, E, F>(&self, method: &Method<A, R, E>, args: A, callback: F)
    where
        A: Serialize,
        R: DeserializeOwned + Send + 'static,
        E: DeserializeOwned + Send + 'static,
        F: FnOnce(Result<std::result::Result<R, E>>) + Send + 'static,
    {
        // ---
        let mut out = BytesMut::new();
        let Some(slot) = AsyncInvocationStrategy.request(
            &self.client.serialization,
            self.call_id.as_str(),
            method,
            &args,
            &mut out,
            self.protocol_version,
            callback,
        ) else {
            return;
        };

        self.send(out, slot);
    }

    /// `async` form of [`invoke_async`](Self::invoke_async).
    pub async fn call<A, R, E>(&self, method: &Method<A, R, E>, args: A) -> Result<std::result::Result<R, E>>
    where
        A: Serialize,
        R: DeserializeOwned + Send + 'static,
        E: DeserializeOwned + Send + 'static,
    {
        // ---
        let (tx, rx) = oneshot::channel();
        self.invoke_async(method, args, move |outcome| {
            let _ = tx.send(outcome);
        });
        rx.await.unwrap_or_else(|_| Err(Error::ConnectionClosed))
    }

    fn send(&self, out: BytesMut, slot: Box<dyn ResponseFuture>) {
        // ---
        // Too large for one frame: fail this call only, the connection stays up
        let limit = max_body_len(self.client.max_frame_size);
        if out.len() > limit {
            let err = Error::Serialization(format!(
                "request too large: {} bytes (max: {limit} bytes)",
                out.len()
            ));
            return slot.fail(err);
        }

        match self.client.acquire_connection(&self.address) {
            Ok(connection) => connection.send(out, slot),
            Err(err) => slot.fail(err),
        }
    }

    /// Address of the server hosting the service.
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    /// Protocol version written into every request.
    pub fn protocol_version(&self) -> u16 {
        self.protocol_version
    }
}
