// Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};

use fastbin_rpc::{
    //
    ClientInvoker,
    Dispatcher,
    FastbinConfig,
    Method,
    MsgPackSerialization,
    SerializationStrategy,
    ServerInvoker,
    ServiceInterface,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexObject {
    pub name: String,
    pub value: i64,
    pub tags: Vec<String>,
    pub weights: BTreeMap<String, f64>,
    pub child: Option<Box<ComplexObject>>,
}

impl ComplexObject {
    /// Chain of `depth` objects, outermost first.
    pub fn nested(depth: u32) -> Self {
        // ---
        let child = (depth > 1).then(|| Box::new(Self::nested(depth - 1)));
        Self {
            name: format!("level-{depth}"),
            value: i64::from(depth) * 1_000,
            tags: (0..depth).map(|i| format!("tag-{i}")).collect(),
            weights: [("depth".to_string(), f64::from(depth) / 2.0)].into(),
            child,
        }
    }

    pub fn depth(&self) -> u32 {
        1 + self.child.as_ref().map_or(0, |c| c.depth())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum TestError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("illegal argument: {0}")]
    IllegalArgument(String),
}

/// Serializes to an error, to exercise the server's fallback path.
#[derive(Debug, Deserialize)]
pub struct Unencodable;

impl Serialize for Unencodable {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom("refusing to serialize"))
    }
}

pub struct TestService {
    pub calls: AtomicUsize,
}

impl TestService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

pub const HELLO: Method<(String,), String, TestError> = Method::new("hello");
pub const CREATE: Method<(u32,), ComplexObject, TestError> = Method::new("create");
pub const ECHO_COMPLEX: Method<(ComplexObject,), ComplexObject, TestError> = Method::new("echo_complex");
pub const FAIL_IO: Method<(String,), (), TestError> = Method::new("fail_io");
pub const SLEEP_THEN_ECHO: Method<(u64, u32), u32, TestError> = Method::new("sleep_then_echo");
pub const UNENCODABLE: Method<(), Unencodable, TestError> = Method::new("unencodable");
pub const PANICS: Method<(), (), TestError> = Method::new("panics");
pub const NOT_EXPORTED: Method<(), (), TestError> = Method::new("not_exported");

pub fn test_interface<S: SerializationStrategy>() -> ServiceInterface<TestService, S> {
    // ---
    ServiceInterface::new("TestService")
        .method(HELLO, |svc: &TestService, (name,): (String,)| {
            svc.calls.fetch_add(1, Ordering::SeqCst);
            if name.is_empty() {
                return Err(TestError::IllegalArgument("name must not be empty".into()));
            }
            Ok(format!("Hello {name}!"))
        })
        .method(CREATE, |_: &TestService, (depth,): (u32,)| Ok(ComplexObject::nested(depth)))
        .method(ECHO_COMPLEX, |_: &TestService, (object,): (ComplexObject,)| Ok(object))
        .method(FAIL_IO, |_: &TestService, (message,): (String,)| Err(TestError::Io(message)))
        .method(SLEEP_THEN_ECHO, |_: &TestService, (millis, n): (u64, u32)| {
            std::thread::sleep(Duration::from_millis(millis));
            Ok(n)
        })
        .method(UNENCODABLE, |_: &TestService, (): ()| Ok(Unencodable))
        .method(PANICS, |_: &TestService, (): ()| -> Result<(), TestError> {
            panic!("service state corrupted")
        })
}

/// A started server with `TestService` registered under `"svc"` and a
/// started client, sharing one dispatcher.
pub struct Pair<S: SerializationStrategy = MsgPackSerialization> {
    pub server: ServerInvoker<S>,
    pub client: ClientInvoker<S>,
    pub service: Arc<TestService>,
}

impl<S: SerializationStrategy> Pair<S> {
    pub fn start(dispatcher: Dispatcher, server_config: &FastbinConfig, client_config: &FastbinConfig, serialization: S) -> Self {
        // ---
        let server = ServerInvoker::with_config(dispatcher.clone(), server_config, serialization.clone());
        server.start().unwrap();

        let service = TestService::new();
        server
            .register_service("svc", service.clone(), test_interface::<S>())
            .unwrap();

        let client = ClientInvoker::with_config(dispatcher, client_config, serialization);
        client.start().unwrap();

        Self { server, client, service }
    }
}

impl Pair {
    pub fn msgpack(dispatcher: Dispatcher) -> Self {
        let config = FastbinConfig::loopback(0);
        Self::start(dispatcher, &config, &config, MsgPackSerialization::default())
    }
}

/// Run `f` on a helper thread and fail the test if it takes longer than
/// `limit`.
pub fn within<T: Send + 'static>(limit: Duration, f: impl FnOnce() -> T + Send + 'static) -> T {
    // ---
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(f());
    });
    rx.recv_timeout(limit).expect("operation did not finish in time")
}

#[cfg(feature = "logging")]
mod imp {
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn init() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }
}

#[cfg(not(feature = "logging"))]
mod imp {
    #[inline]
    pub fn init() {}
}

pub fn init_logging() {
    imp::init();
}
