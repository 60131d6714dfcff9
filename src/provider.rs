// src/provider.rs

//! Export and import of services as fastbin endpoints.
//!
//! [`FastbinProvider`] bundles what a process needs to take part in remote
//! service calls: one dispatcher, one started server, one started client.
//! Exporting registers a service with the server and describes it as an
//! [`EndpointDescription`]; importing turns such a description back into an
//! [`InvocationHandler`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::endpoint::{CONFIG_TYPE, ENDPOINT_ADDRESS_PROPERTY};
use crate::serialization::{MsgPackSerialization, SerializationStrategy};
use crate::{
    log_debug, log_info, CallId, ClientInvoker, Dispatcher, EndpointDescription, FastbinConfig,
    InvocationHandler, Result, ServerInvoker, ServiceFactory, ServiceInterface,
};

/// Server, client and dispatcher of one process.
pub struct FastbinProvider<S: SerializationStrategy = MsgPackSerialization> {
    // ---
    config: FastbinConfig,
    server: Arc<ServerInvoker<S>>,
    client: ClientInvoker<S>,
}

impl<S: SerializationStrategy + Default> FastbinProvider<S> {
    /// Start a provider on its own dispatcher sized by `config.worker_threads`.
    pub fn new(config: FastbinConfig) -> Result<Self> {
        // ---
        let dispatcher = Dispatcher::new(config.worker_threads)?;
        Self::with_dispatcher(config, dispatcher, S::default())
    }
}

impl<S: SerializationStrategy> FastbinProvider<S> {
    // ---

    /// Start a provider on an existing dispatcher.
    ///
    /// # Errors
    ///
    /// Fails if the server cannot bind its address.
    pub fn with_dispatcher(config: FastbinConfig, dispatcher: Dispatcher, serialization: S) -> Result<Self> {
        // ---
        let server = ServerInvoker::with_config(dispatcher.clone(), &config, serialization.clone());
        server.start()?;

        let client = ClientInvoker::with_config(dispatcher, &config, serialization);
        client.start()?;

        log_info!("fastbin provider ready at {}", server.connect_address());

        Ok(Self {
            config,
            server: Arc::new(server),
            client,
        })
    }

    /// Configuration types this provider can export and import.
    pub fn supported_types(&self) -> &'static [&'static str] {
        &[CONFIG_TYPE]
    }

    /// Export a service.
    ///
    /// The call id is taken from the `fastbin.endpoint.address` property
    /// when present, otherwise generated. The returned registration holds
    /// the endpoint description to advertise.
    ///
    /// # Errors
    ///
    /// [`Error::ServiceAlreadyRegistered`](crate::Error::ServiceAlreadyRegistered)
    /// if the explicit endpoint id is already exported.
    pub fn export<T, F, I>(&self, interface: I, factory: F, properties: &HashMap<String, String>) -> Result<ExportRegistration<S>>
    where
        T: Send + Sync + 'static,
        F: ServiceFactory<T>,
        I: Into<Arc<ServiceInterface<T, S>>>,
    {
        // ---
        let call_id = properties
            .get(ENDPOINT_ADDRESS_PROPERTY)
            .filter(|id| !id.is_empty())
            .map(|id| CallId::from(id.as_str()))
            .unwrap_or_else(CallId::generate);

        let interface = interface.into();
        let endpoint = EndpointDescription::new(
            call_id.clone(),
            self.server.connect_address(),
            self.config.max_protocol_version,
            interface.name(),
            properties,
        );

        self.server.register_service(call_id, factory, interface)?;
        log_debug!("exported {} as {}", endpoint.interface(), endpoint.endpoint_id());

        Ok(ExportRegistration {
            endpoint,
            server: Arc::downgrade(&self.server),
            closed: AtomicBool::new(false),
        })
    }

    /// Proxy for an exported endpoint.
    ///
    /// Speaks the highest protocol version both sides support.
    pub fn import(&self, endpoint: &EndpointDescription) -> Result<InvocationHandler<S>> {
        // ---
        self.client.get_proxy(
            endpoint.address(),
            endpoint.endpoint_id().clone(),
            endpoint.protocol_version(),
        )
    }

    pub fn connect_address(&self) -> String {
        self.server.connect_address()
    }

    pub fn server(&self) -> &ServerInvoker<S> {
        &self.server
    }

    pub fn client(&self) -> &ClientInvoker<S> {
        &self.client
    }

    pub fn config(&self) -> &FastbinConfig {
        &self.config
    }

    /// Stop the server and the client.
    pub fn shutdown(&self) {
        // ---
        self.server.stop();
        self.client.stop();
    }
}

/// Handle of one exported service.
#[must_use = "the service stays exported until close() is called"]
pub struct ExportRegistration<S: SerializationStrategy = MsgPackSerialization> {
    // ---
    endpoint: EndpointDescription,
    server: Weak<ServerInvoker<S>>,
    closed: AtomicBool,
}

impl<S: SerializationStrategy> ExportRegistration<S> {
    // ---

    pub fn endpoint(&self) -> &EndpointDescription {
        &self.endpoint
    }

    /// Unexport the service. Returns `false` if it already was.
    pub fn close(&self) -> bool {
        // ---
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.server
            .upgrade()
            .is_some_and(|server| server.unregister_service(self.endpoint.endpoint_id().as_str()))
    }
}
