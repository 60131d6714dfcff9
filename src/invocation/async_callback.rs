use std::marker::PhantomData;

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{encode_call, ResponseFuture};
use crate::serialization::SerializationStrategy;
use crate::{Error, Method, Result};

/// Request/response where the outcome is handed to a callback.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AsyncInvocationStrategy;

impl AsyncInvocationStrategy {
    // ---

    /// Encode a request and wrap `callback` into a slot for the connection.
    ///
    /// If encoding fails the callback is run right away, on the calling
    /// thread, with the error, and `None` is returned.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn request<S, A, R, E, F>(
        &self,
        serialization: &S,
        call_id: &str,
        method: &Method<A, R, E>,
        args: &A,
        out: &mut BytesMut,
        version: u16,
        callback: F,
    ) -> Option<Box<dyn ResponseFuture>>
    where
        S: SerializationStrategy,
        A: Serialize,
        R: DeserializeOwned + Send + 'static,
        E: DeserializeOwned + Send + 'static,
        F: FnOnce(Result<std::result::Result<R, E>>) + Send + 'static,
    {
        // ---
        match encode_call(serialization, call_id, method, args, out, version) {
            Ok(serialization) => Some(Box::new(CallbackSlot {
                serialization,
                callback: Some(callback),
                _marker: PhantomData,
            })),
            Err(err) => {
                callback(Err(err));
                None
            }
        }
    }
}

struct CallbackSlot<S, R, E, F>
where
    F: FnOnce(Result<std::result::Result<R, E>>),
{
    serialization: S,
    callback: Option<F>,
    _marker: PhantomData<fn() -> (R, E)>,
}

impl<S, R, E, F> ResponseFuture for CallbackSlot<S, R, E, F>
where
    S: SerializationStrategy,
    R: DeserializeOwned + Send + 'static,
    E: DeserializeOwned + Send + 'static,
    F: FnOnce(Result<std::result::Result<R, E>>) + Send + 'static,
{
    fn set(mut self: Box<Self>, mut body: Bytes) {
        // ---
        if let Some(callback) = self.callback.take() {
            self.serialization.decode_response(&mut body, callback);
        }
    }

    fn fail(mut self: Box<Self>, error: Error) {
        // ---
        if let Some(callback) = self.callback.take() {
            callback(Err(error));
        }
    }
}

impl<S, R, E, F> Drop for CallbackSlot<S, R, E, F>
where
    F: FnOnce(Result<std::result::Result<R, E>>),
{
    fn drop(&mut self) {
        // Slots discarded with their connection still owe the caller an answer
        if let Some(callback) = self.callback.take() {
            callback(Err(Error::ConnectionClosed));
        }
    }
}
