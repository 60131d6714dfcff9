// src/client/connection.rs

//! One pooled client connection.
//!
//! A connection is created on first use of an address and lives until its
//! socket fails or the client stops. All response delivery, successful or
//! not, goes through the connection's dispatch queue so callbacks of one
//! connection never run concurrently and observe responses in order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use super::pending::PendingCalls;
use crate::invocation::ResponseFuture;
use crate::protocol::{Frame, FrameCodec};
use crate::{log_debug, log_warn, Address, DispatchQueue, Dispatcher, Error, Result};

pub(crate) struct Connection {
    // ---
    id: u64,
    address: Address,
    queue: DispatchQueue,
    outbound: mpsc::UnboundedSender<Frame>,
    pending: Arc<Mutex<PendingCalls>>,
    next_correlation: AtomicU64,
}

impl Connection {
    // ---

    /// Start connecting to `address` in the background.
    ///
    /// Requests may be sent right away; they are written once the socket is
    /// up. `on_close` runs once the connection is done, before its pending
    /// requests are failed.
    pub(crate) fn open<F>(
        dispatcher: &Dispatcher,
        id: u64,
        address: Address,
        max_frame_size: usize,
        shutdown: CancellationToken,
        on_close: F,
    ) -> Arc<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        // ---
        let queue = dispatcher.create_queue(format!("fastbin-client {address}"));
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(Mutex::new(PendingCalls::new()));

        let task = ConnectionTask {
            address: address.clone(),
            max_frame_size,
            queue: queue.clone(),
            pending: pending.clone(),
        };
        dispatcher.spawn(task.run(outbound_rx, shutdown, on_close));

        Arc::new(Self {
            id,
            address,
            queue,
            outbound,
            pending,
            next_correlation: AtomicU64::new(0),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Queue `body` for sending; `slot` is resolved with the response.
    ///
    /// Registration and enqueueing happen under one lock, so frames go out
    /// in the order their slots were registered.
    pub(crate) fn send(&self, body: BytesMut, slot: Box<dyn ResponseFuture>) {
        // ---
        let correlation = self.next_correlation.fetch_add(1, Ordering::Relaxed);
        let mut pending = lock(&self.pending);

        if let Err(slot) = pending.register(correlation, slot) {
            drop(pending);
            self.fail_on_queue(slot, Error::ConnectionClosed);
            return;
        }

        if self
            .outbound
            .send(Frame::new(correlation, body.freeze()))
            .is_err()
        {
            let slot = pending.take(correlation);
            drop(pending);
            if let Some(slot) = slot {
                self.fail_on_queue(slot, Error::ConnectionClosed);
            }
        }
    }

    /// Whether the connection has failed or been shut down.
    pub(crate) fn is_closed(&self) -> bool {
        lock(&self.pending).is_closed()
    }

    fn fail_on_queue(&self, slot: Box<dyn ResponseFuture>, error: Error) {
        // ---
        // A dropped slot still resolves, so a closed queue loses nothing
        if self.queue.submit(move || slot.fail(error)).is_err() {
            log_debug!("queue of connection to {} is closed", self.address);
        }
    }
}

struct ConnectionTask {
    // ---
    address: Address,
    max_frame_size: usize,
    queue: DispatchQueue,
    pending: Arc<Mutex<PendingCalls>>,
}

impl ConnectionTask {
    // ---

    async fn run<F>(self, outbound: mpsc::UnboundedReceiver<Frame>, shutdown: CancellationToken, on_close: F)
    where
        F: FnOnce(),
    {
        // ---
        let reason = match self.drive(outbound, &shutdown).await {
            Ok(()) | Err(Error::ConnectionClosed) => Error::ConnectionClosed,
            Err(err) => {
                log_warn!("connection to {} failed: {}", self.address, err);
                err
            }
        };

        // Later requests must get a fresh connection, not this one
        on_close();
        self.fail_pending(&reason);

        log_debug!("connection to {} closed", self.address);
    }

    async fn drive(
        &self,
        mut outbound: mpsc::UnboundedReceiver<Frame>,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        // ---
        let stream = tokio::select! {
            biased;

            _ = shutdown.cancelled() => return Ok(()),
            connected = TcpStream::connect((self.address.socket_host(), self.address.port())) => {
                connected.map_err(|e| Error::Transport(format!("cannot connect to {}: {e}", self.address)))?
            }
        };
        stream.set_nodelay(true)?;
        log_debug!("connected to {}", self.address);

        let (mut sink, mut frames) = Framed::new(stream, FrameCodec::new(self.max_frame_size)).split();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => return Ok(()),

                frame = frames.next() => match frame {
                    Some(Ok(frame)) => self.deliver(frame),
                    Some(Err(err)) => {
                        return Err(Error::Transport(format!("read from {} failed: {err}", self.address)));
                    }
                    None => return Err(Error::ConnectionClosed),
                },

                request = outbound.recv() => match request {
                    Some(frame) => sink
                        .send(frame)
                        .await
                        .map_err(|e| Error::Transport(format!("write to {} failed: {e}", self.address)))?,
                    // Every handle to this connection is gone
                    None => return Ok(()),
                },
            }
        }
    }

    fn deliver(&self, frame: Frame) {
        // ---
        let pending = self.pending.clone();
        let address = self.address.clone();

        let submitted = self.queue.submit(move || {
            let slot = lock(&pending).take(frame.correlation);
            match slot {
                Some(slot) => slot.set(frame.body),
                None => log_warn!("response from {} for unknown request {}", address, frame.correlation),
            }
        });

        if submitted.is_err() {
            log_debug!("queue of connection to {} is closed", self.address);
        }
    }

    fn fail_pending(&self, reason: &Error) {
        // ---
        let slots = lock(&self.pending).close();
        if slots.is_empty() {
            return;
        }

        let reason = match reason {
            Error::ConnectionClosed => None,
            Error::Transport(message) => Some(message.clone()),
            other => Some(other.to_string()),
        };

        let _ = self.queue.submit(move || {
            for slot in slots {
                let error = match &reason {
                    None => Error::ConnectionClosed,
                    Some(message) => Error::Transport(message.clone()),
                };
                slot.fail(error);
            }
        });
    }
}

fn lock(pending: &Mutex<PendingCalls>) -> MutexGuard<'_, PendingCalls> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}
