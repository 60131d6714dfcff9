use std::marker::PhantomData;

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::oneshot;

use super::{encode_call, ResponseFuture};
use crate::dispatch::DispatchQueue;
use crate::serialization::SerializationStrategy;
use crate::{Error, Method, Result};

type Outcome<R, E> = Result<std::result::Result<R, E>>;

/// Request/response where the calling thread waits for the outcome.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct BlockingInvocationStrategy;

impl BlockingInvocationStrategy {
    // ---

    /// Encode a request and return the slot to register with the connection
    /// together with the handle the caller waits on.
    ///
    /// # Errors
    ///
    /// - [`Error::BlockingOnDispatchQueue`] when called from a dispatch queue
    ///   task, since parking that thread could deadlock the queue that has to
    ///   deliver the response
    /// - [`Error::BlockingOnRuntime`] when called from a current-thread
    ///   runtime, whose only thread also runs the connection tasks
    /// - encoding errors, with nothing written to `out`
    pub(crate) fn request<S, A, R, E>(
        &self,
        serialization: &S,
        call_id: &str,
        method: &Method<A, R, E>,
        args: &A,
        out: &mut BytesMut,
        version: u16,
    ) -> Result<(Box<dyn ResponseFuture>, BlockingResponse<R, E>)>
    where
        S: SerializationStrategy,
        A: Serialize,
        R: DeserializeOwned + Send + 'static,
        E: DeserializeOwned + Send + 'static,
    {
        // ---
        if let Some(label) = DispatchQueue::current() {
            return Err(Error::BlockingOnDispatchQueue(label.to_string()));
        }
        if on_current_thread_runtime() {
            return Err(Error::BlockingOnRuntime);
        }

        let serialization = encode_call(serialization, call_id, method, args, out, version)?;
        let (tx, rx) = oneshot::channel();

        let slot = BlockingSlot {
            serialization,
            tx,
            _marker: PhantomData,
        };
        Ok((Box::new(slot), BlockingResponse { rx }))
    }
}

struct BlockingSlot<S, R, E> {
    serialization: S,
    tx: oneshot::Sender<Outcome<R, E>>,
    _marker: PhantomData<fn() -> (R, E)>,
}

impl<S, R, E> ResponseFuture for BlockingSlot<S, R, E>
where
    S: SerializationStrategy,
    R: DeserializeOwned + Send + 'static,
    E: DeserializeOwned + Send + 'static,
{
    fn set(self: Box<Self>, mut body: Bytes) {
        // ---
        let BlockingSlot {
            serialization, tx, ..
        } = *self;
        serialization.decode_response(&mut body, |outcome| {
            // The caller may have given up waiting
            let _ = tx.send(outcome);
        });
    }

    fn fail(self: Box<Self>, error: Error) {
        // ---
        let _ = self.tx.send(Err(error));
    }
}

/// Handle a blocking caller parks on.
pub(crate) struct BlockingResponse<R, E> {
    rx: oneshot::Receiver<Outcome<R, E>>,
}

impl<R, E> BlockingResponse<R, E> {
    /// Park the calling thread until the slot is resolved.
    ///
    /// On a multi-thread runtime worker the worker's other tasks are handed
    /// off first. A slot dropped without being resolved (its connection or
    /// runtime went away) reads as [`Error::ConnectionClosed`].
    pub(crate) fn wait(self) -> Outcome<R, E> {
        // ---
        let rx = self.rx;
        let outcome = match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| futures::executor::block_on(rx))
            }
            _ => futures::executor::block_on(rx),
        };
        outcome.unwrap_or_else(|_| Err(Error::ConnectionClosed))
    }
}

fn on_current_thread_runtime() -> bool {
    // ---
    Handle::try_current().is_ok_and(|handle| handle.runtime_flavor() == RuntimeFlavor::CurrentThread)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::serialization::MsgPackSerialization;
    use crate::Dispatcher;

    const ADD: Method<(i32, i32), i32> = Method::new("add");

    #[test]
    fn test_slot_resolves_waiter() {
        // ---
        let codec = MsgPackSerialization::default();
        let mut out = BytesMut::new();
        let (slot, response) = BlockingInvocationStrategy
            .request(&codec, "calc", &ADD, &(1, 2), &mut out, 1)
            .unwrap();
        assert!(!out.is_empty());

        let mut body = BytesMut::new();
        codec
            .encode_response::<i32, crate::RemoteError>(&Ok(3), &mut body)
            .unwrap();
        let waiter = std::thread::spawn(move || response.wait());
        slot.set(body.freeze());

        assert_eq!(waiter.join().unwrap().unwrap(), Ok(3));
    }

    #[test]
    fn test_dropped_slot_reads_as_connection_closed() {
        // ---
        let codec = MsgPackSerialization::default();
        let mut out = BytesMut::new();
        let (slot, response) = BlockingInvocationStrategy
            .request(&codec, "calc", &ADD, &(1, 2), &mut out, 1)
            .unwrap();
        drop(slot);

        assert!(matches!(response.wait(), Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_refused_on_current_thread_runtime() {
        // ---
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let codec = MsgPackSerialization::default();
            let mut out = BytesMut::new();
            let result = BlockingInvocationStrategy.request(&codec, "calc", &ADD, &(1, 2), &mut out, 1);
            assert!(matches!(result, Err(Error::BlockingOnRuntime)));
            assert!(out.is_empty());
        });
    }

    #[test]
    fn test_wait_on_multi_thread_worker() {
        // ---
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .build()
            .unwrap();
        let codec = MsgPackSerialization::default();
        let mut out = BytesMut::new();
        let (slot, response) = BlockingInvocationStrategy
            .request(&codec, "calc", &ADD, &(1, 2), &mut out, 1)
            .unwrap();

        let waiter = runtime.spawn(async move { response.wait() });

        let mut body = BytesMut::new();
        codec
            .encode_response::<i32, crate::RemoteError>(&Ok(3), &mut body)
            .unwrap();
        runtime.spawn(async move { slot.set(body.freeze()) });

        assert_eq!(runtime.block_on(waiter).unwrap().unwrap(), Ok(3));
    }

    #[test]
    fn test_refused_on_dispatch_queue() {
        // ---
        let dispatcher = Dispatcher::new(1).unwrap();
        let queue = dispatcher.create_queue("client");
        let (tx, rx) = std::sync::mpsc::channel();

        queue
            .submit(move || {
                let codec = MsgPackSerialization::default();
                let mut out = BytesMut::new();
                let result = BlockingInvocationStrategy.request(&codec, "calc", &ADD, &(1, 2), &mut out, 1);
                tx.send(result.err().map(|e| e.to_string())).unwrap();
            })
            .unwrap();

        let message = rx.recv().unwrap().unwrap();
        assert!(message.starts_with("blocking invocation attempted on dispatch queue client#"));
    }
}
