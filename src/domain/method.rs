// src/domain/method.rs

//! Typed method descriptors.
//!
//! The wire format is not self-describing: both ends must agree on the
//! argument, return and error types of every method. A [`Method`] captures
//! that agreement once, as a constant shared by the client and the server:
//!
//! ```
//! use fastbin_rpc::{Method, RemoteError};
//!
//! const GREET: Method<(String,), String> = Method::new("greet");
//! const DIVIDE: Method<(i64, i64), i64, RemoteError> = Method::new("divide");
//! assert_eq!(GREET.name(), "greet");
//! ```
//!
//! The name is the method selector carried in every request; the type
//! parameters drive encoding and decoding on both sides.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Descriptor of one remotely invocable method.
///
/// - `A`: argument list, usually a tuple
/// - `R`: return type
/// - `E`: application error type the method may fail with
pub struct Method<A, R, E = RemoteError> {
    // ---
    name: &'static str,
    _marker: PhantomData<fn(A) -> Result<R, E>>,
}

impl<A, R, E> Method<A, R, E> {
    // ---

    /// Describe a method by its selector.
    pub const fn new(name: &'static str) -> Self {
        // ---
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// The selector sent on the wire.
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<A, R, E> Clone for Method<A, R, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A, R, E> Copy for Method<A, R, E> {}

impl<A, R, E> fmt::Debug for Method<A, R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Method").field(&self.name).finish()
    }
}

/// General purpose application error.
///
/// Methods that do not need a dedicated error enum can fail with a
/// `RemoteError`, which keeps the kind of the original error next to its
/// message so the caller can tell failures apart.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    // ---
    kind: String,
    message: String,
}

impl RemoteError {
    // ---
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        // ---
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for RemoteError {
    fn from(err: std::io::Error) -> Self {
        // ---
        Self::new("std::io::Error", err.to_string())
    }
}
