use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the transport itself.
///
/// Application errors returned by a remote service method never show up
/// here; they are delivered as the inner `Err` of a call result.
#[derive(Error, Debug)]
pub enum Error {
    /// Connect, read or write failure on a connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// Socket level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection carrying the call was torn down before a response arrived.
    #[error("connection closed")]
    ConnectionClosed,

    /// The remote side could not process the request.
    #[error(transparent)]
    Fault(#[from] Fault),

    /// Local encoding or decoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A service is already registered under the call id.
    #[error("a service is already registered under call id {0}")]
    ServiceAlreadyRegistered(String),

    /// Malformed `tcp://host:port` address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Malformed configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A blocking call was issued from a dispatch queue task.
    #[error("blocking invocation attempted on dispatch queue {0}")]
    BlockingOnDispatchQueue(String),

    /// A blocking call was issued from a thread driving a current-thread
    /// runtime, which could then never deliver the response.
    #[error("blocking invocation attempted on a current-thread runtime")]
    BlockingOnRuntime,

    /// The dispatch queue no longer accepts tasks.
    #[error("dispatch queue {0} is closed")]
    QueueClosed(String),

    /// The invoker was stopped; create a new one.
    #[error("invoker has been stopped")]
    Stopped,

    /// The invoker has not been started yet.
    #[error("invoker has not been started")]
    NotStarted,

    /// The async runtime backing the dispatcher could not be built.
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Failure reported by the remote end in place of a result.
///
/// Faults travel inside response frames, so they are serializable and
/// survive the round trip unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fault {
    /// The request header declared a version above the receiver's maximum.
    #[error(
        "Incorrect fastbin protocol {received} version. \
         Only protocol versions up to {supported} are supported."
    )]
    UnsupportedVersion { received: u16, supported: u16 },

    /// No service is registered under the requested call id.
    #[error("no service registered under call id {0}")]
    ServiceNotFound(String),

    /// The service does not expose the requested method.
    #[error("service {call_id} has no method {method}")]
    MethodNotFound { call_id: String, method: String },

    /// Generic remote failure, e.g. the response could not be encoded.
    #[error("remote error: {0}")]
    Remote(String),
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(err: rmp_serde::encode::Error) -> Self {
        // ---
        Error::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(err: rmp_serde::decode::Error) -> Self {
        // ---
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        // ---
        Error::Serialization(err.to_string())
    }
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_version_fault_names_both_versions() {
        // ---
        let fault = Fault::UnsupportedVersion {
            received: 300,
            supported: 1,
        };
        assert_eq!(
            fault.to_string(),
            "Incorrect fastbin protocol 300 version. Only protocol versions up to 1 are supported."
        );
    }

    #[test]
    fn test_fault_is_transparent_in_error() {
        // ---
        let err = Error::from(Fault::ServiceNotFound("svc".into()));
        assert_eq!(err.to_string(), "no service registered under call id svc");
    }
}
