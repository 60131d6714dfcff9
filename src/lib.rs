//! Binary RPC transport over TCP with versioned, pluggable serialization.
//!
//! A [`ServerInvoker`] exposes services under opaque call ids; a
//! [`ClientInvoker`] hands out [`InvocationHandler`]s that invoke methods on
//! them either blocking or with a completion callback. Both run on a
//! [`Dispatcher`], whose serial [`DispatchQueue`]s keep per-connection
//! processing in order.
//!
//! Payload encoding is delegated to a [`SerializationStrategy`]
//! (MessagePack by default, JSON available) selected per request from the
//! protocol version in the request header.
//!

// Macros first so every module below can use them
mod macros;
pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

mod client;
mod dispatch;
mod domain;
mod endpoint;
mod error;
mod fastbin_config;
mod invocation;
mod protocol;
mod provider;
mod serialization;
mod server;

// --- public re-exports
pub use client::{ClientInvoker, InvocationHandler};
pub use dispatch::{DispatchQueue, Dispatcher};
pub use domain::{
    //
    Address,
    CallId,
    Method,
    RemoteError,
};
pub use endpoint::{
    //
    EndpointDescription,
    CONFIG_TYPE,
    ENDPOINT_ADDRESS_PROPERTY,
    ENDPOINT_ID_PROPERTY,
    IMPORTED_CONFIGS_PROPERTY,
    OBJECT_CLASS_PROPERTY,
};
pub use error::{Error, Fault, Result};
pub use fastbin_config::{
    //
    resolve_public_host,
    FastbinConfig,
    DEFAULT_PORT,
    PORT_PROPERTY,
    PROTOCOL_VERSION_PROPERTY,
    SERVER_ADDRESS_PROPERTY,
};
pub use protocol::{Frame, FrameCodec, Response, DEFAULT_MAX_FRAME_SIZE, PROTOCOL_VERSION};
pub use provider::{ExportRegistration, FastbinProvider};
pub use serialization::{JsonSerialization, MsgPackSerialization, SerializationStrategy};
pub use server::{ServerInvoker, ServiceFactory, ServiceInterface, SingletonFactory};
