// src/server/handler.rs

//! Service dispatch tables and registrations.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::invocation::ServiceEntry;
use crate::serialization::{MsgPackSerialization, SerializationStrategy};
use crate::{log_debug, log_warn, CallId, Fault, Method, Result};

/// Type-erased method: decode arguments, call, encode outcome.
type BoxedMethod<T, S> =
    Box<dyn Fn(&T, &S, &mut Bytes, &mut BytesMut) -> Result<()> + Send + Sync>;

/// Dispatch table of a service type: method selector to implementation.
///
/// Built once per service type and shared by every registration of it.
///
/// ```
/// use fastbin_rpc::{Method, RemoteError, ServiceInterface};
///
/// struct Greeter;
///
/// const HELLO: Method<(String,), String> = Method::new("hello");
///
/// let interface = ServiceInterface::<Greeter>::new("Greeter")
///     .method(HELLO, |_svc: &Greeter, (name,): (String,)| {
///         Ok::<_, RemoteError>(format!("Hello {name}!"))
///     });
/// assert!(interface.has_method("hello"));
/// ```
pub struct ServiceInterface<T, S = MsgPackSerialization> {
    // ---
    name: String,
    methods: HashMap<&'static str, BoxedMethod<T, S>>,
}

impl<T, S> ServiceInterface<T, S>
where
    T: Send + Sync + 'static,
    S: SerializationStrategy,
{
    // ---

    /// Start an empty table; `name` identifies the interface in endpoint
    /// descriptions and logs.
    pub fn new(name: impl Into<String>) -> Self {
        // ---
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// Add a method implementation.
    ///
    /// Registering a selector twice replaces the earlier implementation.
    pub fn method<A, R, E, F>(mut self, method: Method<A, R, E>, handler: F) -> Self
    where
        A: DeserializeOwned + 'static,
        R: Serialize + 'static,
        E: Serialize + 'static,
        F: Fn(&T, A) -> std::result::Result<R, E> + Send + Sync + 'static,
    {
        // ---
        let name = method.name();
        if self.methods.insert(name, wrap_method(handler)).is_some() {
            log_warn!("{}: method {} registered twice, keeping the last one", self.name, name);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Selectors of all methods, in no particular order.
    pub fn method_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.methods.keys().copied()
    }
}

fn wrap_method<T, S, A, R, E, F>(handler: F) -> BoxedMethod<T, S>
where
    T: 'static,
    S: SerializationStrategy,
    A: DeserializeOwned + 'static,
    R: Serialize + 'static,
    E: Serialize + 'static,
    F: Fn(&T, A) -> std::result::Result<R, E> + Send + Sync + 'static,
{
    // ---
    Box::new(move |target: &T, serialization: &S, input: &mut Bytes, out: &mut BytesMut| {
        let args: A = serialization.decode_request_args(input)?;
        let outcome = handler(target, args);
        serialization.encode_response(&outcome, out)
    })
}

/// Source of the object a registration invokes.
///
/// [`get`](Self::get) is called exactly once when the service is
/// registered, [`unget`](Self::unget) exactly once when it is unregistered.
pub trait ServiceFactory<T>: Send + Sync + 'static {
    fn get(&self) -> Arc<T>;

    fn unget(&self) {}
}

/// Factory handing out one pre-built service object.
pub struct SingletonFactory<T> {
    service: Arc<T>,
}

impl<T> SingletonFactory<T> {
    pub fn new(service: Arc<T>) -> Self {
        Self { service }
    }
}

impl<T: Send + Sync + 'static> ServiceFactory<T> for SingletonFactory<T> {
    fn get(&self) -> Arc<T> {
        self.service.clone()
    }
}

impl<T: Send + Sync + 'static> ServiceFactory<T> for Arc<T> {
    fn get(&self) -> Arc<T> {
        self.clone()
    }
}

/// A service object bound to its dispatch table under one call id.
pub(super) struct Registration<T, S> {
    // ---
    call_id: CallId,
    target: Arc<T>,
    interface: Arc<ServiceInterface<T, S>>,
    factory: Box<dyn ServiceFactory<T>>,
}

impl<T, S> Registration<T, S>
where
    T: Send + Sync + 'static,
    S: SerializationStrategy,
{
    pub(super) fn new(
        call_id: CallId,
        factory: Box<dyn ServiceFactory<T>>,
        interface: Arc<ServiceInterface<T, S>>,
    ) -> Self {
        // ---
        let target = factory.get();
        Self {
            call_id,
            target,
            interface,
            factory,
        }
    }
}

impl<T, S> ServiceEntry<S> for Registration<T, S>
where
    T: Send + Sync + 'static,
    S: SerializationStrategy,
{
    fn invoke(
        &self,
        method: &str,
        serialization: &S,
        input: &mut Bytes,
        out: &mut BytesMut,
    ) -> Result<()> {
        // ---
        let handler = self
            .interface
            .methods
            .get(method)
            .ok_or_else(|| Fault::MethodNotFound {
                call_id: self.call_id.to_string(),
                method: method.to_string(),
            })?;

        handler(&self.target, serialization, input, out)
    }

    fn release(&self) {
        // ---
        log_debug!("releasing {} service {}", self.interface.name, self.call_id);
        self.factory.unget();
    }
}

#[cfg(test)]
mod tests {
    // ---
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{Error, RemoteError};

    struct Counter {
        hits: AtomicUsize,
    }

    const BUMP: Method<(usize,), usize> = Method::new("bump");

    fn interface() -> Arc<ServiceInterface<Counter>> {
        // ---
        Arc::new(ServiceInterface::new("Counter").method(
            BUMP,
            |svc: &Counter, (by,): (usize,)| -> std::result::Result<usize, RemoteError> {
                Ok(svc.hits.fetch_add(by, Ordering::SeqCst) + by)
            },
        ))
    }

    struct CountingFactory {
        gets: Arc<AtomicUsize>,
        ungets: Arc<AtomicUsize>,
    }

    impl ServiceFactory<Counter> for CountingFactory {
        fn get(&self) -> Arc<Counter> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            Arc::new(Counter {
                hits: AtomicUsize::new(0),
            })
        }

        fn unget(&self) {
            self.ungets.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_registration_dispatches_by_selector() {
        // ---
        let codec = MsgPackSerialization::default();
        let registration = Registration::new(
            CallId::from("counter"),
            Box::new(SingletonFactory::new(Arc::new(Counter {
                hits: AtomicUsize::new(10),
            }))),
            interface(),
        );

        let mut args = BytesMut::new();
        codec.encode(&(5usize,), &mut args).unwrap();
        let mut out = BytesMut::new();
        registration
            .invoke("bump", &codec, &mut args.freeze(), &mut out)
            .unwrap();

        let mut outcome = None;
        codec.decode_response::<usize, RemoteError, _>(&mut out.freeze(), |r| outcome = Some(r));
        assert_eq!(outcome.unwrap().unwrap(), Ok(15));
    }

    #[test]
    fn test_unknown_selector_is_method_not_found() {
        // ---
        let codec = MsgPackSerialization::default();
        let registration = Registration::new(
            CallId::from("counter"),
            Box::new(Arc::new(Counter {
                hits: AtomicUsize::new(0),
            })),
            interface(),
        );

        let mut out = BytesMut::new();
        let err = registration
            .invoke("reset", &codec, &mut Bytes::new(), &mut out)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Fault(Fault::MethodNotFound { call_id, method }) if call_id == "counter" && method == "reset"
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn test_factory_get_and_unget_called_once() {
        // ---
        let gets = Arc::new(AtomicUsize::new(0));
        let ungets = Arc::new(AtomicUsize::new(0));
        let registration = Registration::new(
            CallId::from("counter"),
            Box::new(CountingFactory {
                gets: gets.clone(),
                ungets: ungets.clone(),
            }),
            interface(),
        );
        assert_eq!(gets.load(Ordering::SeqCst), 1);

        registration.release();
        assert_eq!(ungets.load(Ordering::SeqCst), 1);
        assert_eq!(gets.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_method_names() {
        // ---
        let names: Vec<_> = interface().method_names().collect();
        assert_eq!(names, vec!["bump"]);
    }
}
