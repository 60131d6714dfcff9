//! Server side of the transport.
//!
//! A [`ServerInvoker`] listens on one TCP address, keeps a registry of
//! services keyed by call id and answers requests on per-connection
//! dispatch queues, so responses on one connection go out in request order.

mod connection;
mod handler;

pub use handler::{ServiceFactory, ServiceInterface, SingletonFactory};

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::{Bytes, BytesMut};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::fastbin_config::{is_wildcard_host, resolve_public_host};
use crate::invocation::{self, ServiceEntry};
use crate::protocol::{max_body_len, read_version};
use crate::serialization::{MsgPackSerialization, SerializationStrategy};
use crate::{
    log_debug, log_error, log_info, log_warn, Address, CallId, Dispatcher, Error, FastbinConfig,
    Fault, Result,
};
use handler::Registration;

/// Accepts connections and routes requests to registered services.
///
/// Lifecycle: created, started with [`start`](Self::start), stopped with
/// [`stop`](Self::stop). A stopped server cannot be started again; build a
/// new one. Dropping the server stops it.
///
/// # Example
///
/// ```no_run
/// use fastbin_rpc::{Dispatcher, Method, MsgPackSerialization, RemoteError, ServerInvoker, ServiceInterface};
/// use std::sync::Arc;
///
/// struct Greeter;
/// const HELLO: Method<(String,), String> = Method::new("hello");
///
/// # fn main() -> fastbin_rpc::Result<()> {
/// let dispatcher = Dispatcher::new(4)?;
/// let server = ServerInvoker::new(dispatcher, "tcp://localhost:0", MsgPackSerialization::default())?;
/// server.start()?;
///
/// let interface = ServiceInterface::new("Greeter")
///     .method(HELLO, |_: &Greeter, (name,): (String,)| Ok::<_, RemoteError>(format!("Hello {name}!")));
/// server.register_service("greeter", Arc::new(Greeter), interface)?;
///
/// println!("serving on {}", server.connect_address());
/// # Ok(())
/// # }
/// ```
pub struct ServerInvoker<S: SerializationStrategy = MsgPackSerialization> {
    inner: Arc<Inner<S>>,
}

struct Inner<S> {
    // ---
    dispatcher: Dispatcher,
    bind_address: Address,
    public_host: Option<String>,
    max_protocol_version: u16,
    max_frame_size: usize,
    serialization: S,
    services: DashMap<String, Arc<dyn ServiceEntry<S>>>,
    state: Mutex<State>,
    shutdown: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    Started(SocketAddr),
    Stopped,
}

impl<S: SerializationStrategy> ServerInvoker<S> {
    // ---

    /// Create a server for `address` (`tcp://host:port`, port 0 picks a
    /// free one) with default limits.
    pub fn new(dispatcher: Dispatcher, address: &str, serialization: S) -> Result<Self> {
        // ---
        let config = FastbinConfig::default();
        Ok(Self::build(dispatcher, Address::parse(address)?, &config, serialization))
    }

    /// Create a server bound to `config.bind_host:config.port`.
    pub fn with_config(dispatcher: Dispatcher, config: &FastbinConfig, serialization: S) -> Self {
        // ---
        Self::build(dispatcher, config.bind_address(), config, serialization)
    }

    fn build(dispatcher: Dispatcher, bind_address: Address, config: &FastbinConfig, serialization: S) -> Self {
        // ---
        Self {
            inner: Arc::new(Inner {
                dispatcher,
                bind_address,
                public_host: config.public_host.clone(),
                max_protocol_version: config.max_protocol_version,
                max_frame_size: config.max_frame_size,
                serialization,
                services: DashMap::new(),
                state: Mutex::new(State::Created),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Bind the listening socket and start accepting connections.
    ///
    /// Starting an already started server is a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::Stopped`] if the server was stopped
    /// - [`Error::Io`] if the address cannot be bound
    pub fn start(&self) -> Result<()> {
        // ---
        let mut state = self.inner.lock_state();
        match *state {
            State::Created => {}
            State::Started(_) => return Ok(()),
            State::Stopped => return Err(Error::Stopped),
        }

        let address = &self.inner.bind_address;
        let listener = std::net::TcpListener::bind((address.socket_host(), address.port()))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let listener = {
            let _runtime = self.inner.dispatcher.handle().enter();
            TcpListener::from_std(listener)?
        };

        self.inner
            .dispatcher
            .spawn(accept_loop(self.inner.clone(), listener));

        *state = State::Started(local_addr);
        log_info!(
            "fastbin server listening on {} ({}, {} codec)",
            local_addr,
            self.connect_address_for(local_addr.port()),
            self.inner.serialization.name()
        );
        Ok(())
    }

    /// Stop accepting connections and close the open ones.
    ///
    /// Requests already handed to a connection queue still get their
    /// responses written if the peer is reading.
    pub fn stop(&self) {
        // ---
        let mut state = self.inner.lock_state();
        if *state == State::Stopped {
            return;
        }
        *state = State::Stopped;
        self.inner.shutdown.cancel();
        log_info!("fastbin server on {} stopped", self.inner.bind_address);
    }

    pub fn is_started(&self) -> bool {
        matches!(*self.inner.lock_state(), State::Started(_))
    }

    /// Register a service under `call_id`.
    ///
    /// The factory's `get` is called once here; its `unget` is called once
    /// by [`unregister_service`](Self::unregister_service), or right away
    /// when the registration is rejected.
    ///
    /// # Errors
    ///
    /// [`Error::ServiceAlreadyRegistered`] if the call id is taken; the
    /// existing registration is left untouched.
    pub fn register_service<T, F, I>(&self, call_id: impl Into<CallId>, factory: F, interface: I) -> Result<()>
    where
        T: Send + Sync + 'static,
        F: ServiceFactory<T>,
        I: Into<Arc<ServiceInterface<T, S>>>,
    {
        // ---
        let call_id = call_id.into();
        let interface = interface.into();
        let name = interface.name().to_string();

        // The factory runs outside the registry lock
        let registration = Registration::new(call_id.clone(), Box::new(factory), interface);

        match self.inner.services.entry(call_id.to_string()) {
            Entry::Occupied(_) => {
                registration.release();
                Err(Error::ServiceAlreadyRegistered(call_id.to_string()))
            }
            Entry::Vacant(slot) => {
                log_debug!("registering {} service under {}", name, call_id);
                slot.insert(Arc::new(registration));
                Ok(())
            }
        }
    }

    /// Remove the service registered under `call_id`.
    ///
    /// Returns `false` if nothing was registered there.
    pub fn unregister_service(&self, call_id: &str) -> bool {
        // ---
        match self.inner.services.remove(call_id) {
            Some((_, registration)) => {
                registration.release();
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, call_id: &str) -> bool {
        self.inner.services.contains_key(call_id)
    }

    /// Address clients should use to reach this server.
    ///
    /// Uses the configured public host, else the bind host, else (for a
    /// wildcard bind) the local host name. The port is the bound port once
    /// started.
    pub fn connect_address(&self) -> String {
        // ---
        let port = self
            .local_addr()
            .map_or(self.inner.bind_address.port(), |addr| addr.port());
        self.connect_address_for(port)
    }

    /// Socket address actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        // ---
        match *self.inner.lock_state() {
            State::Started(addr) => Some(addr),
            _ => None,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    fn connect_address_for(&self, port: u16) -> String {
        // ---
        let bind_host = self.inner.bind_address.host();
        let host = match &self.inner.public_host {
            Some(host) => host.clone(),
            None if is_wildcard_host(bind_host) => resolve_public_host(),
            None => bind_host.to_string(),
        };
        Address::new(host, port).to_string()
    }
}

impl<S: SerializationStrategy> Drop for ServerInvoker<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<S> Inner<S> {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: SerializationStrategy> Inner<S> {
    // ---

    /// Process one request body; runs on the connection's queue.
    fn handle_request<F>(&self, mut body: Bytes, on_complete: F)
    where
        F: FnOnce(BytesMut),
    {
        // ---
        let limit = max_body_len(self.max_frame_size);
        let on_complete = |out: BytesMut| {
            if out.len() <= limit {
                return on_complete(out);
            }
            let fault = Fault::Remote(format!("response too large: {} bytes (max: {limit} bytes)", out.len()));
            log_warn!("{}", fault);
            self.reply_fault(fault, BytesMut::new(), on_complete);
        };
        let out = BytesMut::new();

        let version = match read_version(&mut body) {
            Ok(version) => version,
            Err(err) => return self.reply_fault(Fault::Remote(err.to_string()), out, on_complete),
        };

        // Reject before touching the payload; its layout is unknown
        if version > self.max_protocol_version {
            let fault = Fault::UnsupportedVersion {
                received: version,
                supported: self.max_protocol_version,
            };
            log_warn!("{}", fault);
            return self.reply_fault(fault, out, on_complete);
        }

        let serialization = match self.serialization.for_protocol_version(version) {
            Ok(serialization) => serialization,
            Err(err) => return self.reply_fault(into_fault(err), out, on_complete),
        };

        let (call_id, method) = match serialization.decode_request_header(&mut body) {
            Ok(header) => header,
            Err(err) => return self.reply_fault(into_fault(err), out, on_complete),
        };

        let service = match self.services.get(&call_id) {
            Some(entry) => entry.value().clone(),
            None => return self.reply_fault(Fault::ServiceNotFound(call_id), out, on_complete),
        };

        invocation::service(&serialization, &method, service.as_ref(), &mut body, out, on_complete);
    }

    fn reply_fault<F>(&self, fault: Fault, mut out: BytesMut, on_complete: F)
    where
        F: FnOnce(BytesMut),
    {
        // ---
        if let Err(err) = self.serialization.encode_fault(&fault, &mut out) {
            log_error!("could not encode fault {:?}: {}", fault, err);
            out.clear();
        }
        on_complete(out);
    }
}

fn into_fault(err: Error) -> Fault {
    // ---
    match err {
        Error::Fault(fault) => fault,
        other => Fault::Remote(other.to_string()),
    }
}

async fn accept_loop<S: SerializationStrategy>(inner: Arc<Inner<S>>, listener: TcpListener) {
    // ---
    loop {
        tokio::select! {
            biased;

            _ = inner.shutdown.cancelled() => break,

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    log_debug!("accepted connection from {}", peer);
                    if let Err(err) = stream.set_nodelay(true) {
                        log_warn!("set_nodelay failed for {}: {}", peer, err);
                    }
                    inner
                        .dispatcher
                        .spawn(connection::serve(inner.clone(), stream, peer));
                }
                Err(err) => {
                    log_warn!("accept failed on {}: {}", inner.bind_address, err);
                }
            },
        }
    }

    log_debug!("listener on {} closed", inner.bind_address);
}
