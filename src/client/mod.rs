//! Client side of the transport.
//!
//! A [`ClientInvoker`] pools one connection per server address and hands
//! out [`InvocationHandler`]s bound to one remote service each. Connections
//! are opened lazily on first use and replaced transparently after they
//! fail.

mod connection;
mod pending;
mod proxy;

pub use proxy::InvocationHandler;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::serialization::{MsgPackSerialization, SerializationStrategy};
use crate::{log_debug, log_info, Address, CallId, Dispatcher, Error, FastbinConfig, Result};
use connection::Connection;

/// Issues requests to remote services.
///
/// Lifecycle: created, started with [`start`](Self::start), stopped with
/// [`stop`](Self::stop). Requests are refused before start and after stop.
/// Dropping the client stops it.
pub struct ClientInvoker<S: SerializationStrategy = MsgPackSerialization> {
    inner: Arc<Inner<S>>,
}

struct Inner<S> {
    // ---
    dispatcher: Dispatcher,
    serialization: S,
    max_protocol_version: u16,
    max_frame_size: usize,
    connections: DashMap<Address, Arc<Connection>>,
    next_connection_id: AtomicU64,
    state: Mutex<State>,
    shutdown: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    Started,
    Stopped,
}

impl<S: SerializationStrategy> ClientInvoker<S> {
    // ---

    /// Create a client with default limits.
    pub fn new(dispatcher: Dispatcher, serialization: S) -> Self {
        Self::with_config(dispatcher, &FastbinConfig::default(), serialization)
    }

    /// Create a client using the protocol limits of `config`.
    pub fn with_config(dispatcher: Dispatcher, config: &FastbinConfig, serialization: S) -> Self {
        // ---
        Self {
            inner: Arc::new(Inner {
                dispatcher,
                serialization,
                max_protocol_version: config.max_protocol_version,
                max_frame_size: config.max_frame_size,
                connections: DashMap::new(),
                next_connection_id: AtomicU64::new(0),
                state: Mutex::new(State::Created),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Allow requests to be issued.
    ///
    /// # Errors
    ///
    /// [`Error::Stopped`] if the client was stopped.
    pub fn start(&self) -> Result<()> {
        // ---
        let mut state = self.inner.lock_state();
        match *state {
            State::Stopped => Err(Error::Stopped),
            State::Started => Ok(()),
            State::Created => {
                *state = State::Started;
                log_debug!("fastbin client started ({} codec)", self.inner.serialization.name());
                Ok(())
            }
        }
    }

    /// Close every pooled connection and refuse further requests.
    ///
    /// Requests still waiting for a response fail with
    /// [`Error::ConnectionClosed`].
    pub fn stop(&self) {
        // ---
        let mut state = self.inner.lock_state();
        if *state == State::Stopped {
            return;
        }
        *state = State::Stopped;
        drop(state);

        self.inner.shutdown.cancel();
        let open = self.inner.connections.len();
        self.inner.connections.clear();
        log_info!("fastbin client stopped, closed {} connections", open);
    }

    /// Handle for calling the service `call_id` at `address`.
    ///
    /// `protocol_version` is capped at the client's maximum. No connection
    /// is made until the first request.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidAddress`] if `address` is not `tcp://host:port`.
    pub fn get_proxy(
        &self,
        address: &str,
        call_id: impl Into<CallId>,
        protocol_version: u16,
    ) -> Result<InvocationHandler<S>> {
        // ---
        let address = Address::parse(address)?;
        let version = protocol_version.min(self.inner.max_protocol_version);
        Ok(InvocationHandler::new(self.inner.clone(), address, call_id.into(), version))
    }

    /// Highest protocol version this client requests.
    pub fn max_protocol_version(&self) -> u16 {
        self.inner.max_protocol_version
    }

    /// Number of live pooled connections.
    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }
}

impl<S: SerializationStrategy> Drop for ClientInvoker<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<S> Inner<S> {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: SerializationStrategy> Inner<S> {
    // ---

    /// Pooled connection for `address`, opening one if needed.
    fn acquire_connection(self: &Arc<Self>, address: &Address) -> Result<Arc<Connection>> {
        // ---
        match *self.lock_state() {
            State::Started => {}
            State::Created => return Err(Error::NotStarted),
            State::Stopped => return Err(Error::Stopped),
        }

        let mut entry = self
            .connections
            .entry(address.clone())
            .or_insert_with(|| self.open_connection(address));

        // Failed but not yet evicted
        if entry.is_closed() {
            *entry = self.open_connection(address);
        }

        Ok(Arc::clone(entry.value()))
    }

    fn open_connection(self: &Arc<Self>, address: &Address) -> Arc<Connection> {
        // ---
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let pool = Arc::downgrade(self);
        let key = address.clone();

        log_debug!("opening connection {} to {}", id, address);

        Connection::open(
            &self.dispatcher,
            id,
            address.clone(),
            self.max_frame_size,
            self.shutdown.child_token(),
            move || {
                if let Some(inner) = pool.upgrade() {
                    inner.connections.remove_if(&key, |_, conn| conn.id() == id);
                }
            },
        )
    }
}
