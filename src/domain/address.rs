// src/domain/address.rs

//! Endpoint addresses.
//!
//! Every fastbin endpoint is named by a `tcp://<host>:<port>` string. The same
//! representation is used as the server's bind target, as the connect address
//! handed out to clients, and as the key of the client connection pool.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::{Error, Result};

const SCHEME: &str = "tcp://";

/// A parsed `tcp://host:port` endpoint address.
///
/// Cheap to clone; two addresses are equal when host and port match exactly.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Address {
    // ---
    host: Arc<str>,
    port: u16,
}

impl Address {
    // ---

    /// Build an address from its parts.
    pub fn new(host: impl Into<Arc<str>>, port: u16) -> Self {
        // ---
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a `tcp://host:port` string.
    ///
    /// IPv6 hosts must be bracketed (`tcp://[::1]:9000`).
    pub fn parse(value: &str) -> Result<Self> {
        // ---
        let rest = value
            .strip_prefix(SCHEME)
            .ok_or_else(|| Error::InvalidAddress(format!("{value}: expected tcp:// scheme")))?;

        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidAddress(format!("{value}: missing port")))?;

        if host.is_empty() {
            return Err(Error::InvalidAddress(format!("{value}: missing host")));
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| Error::InvalidAddress(format!("{value}: bad port {port:?}")))?;

        Ok(Self::new(host, port))
    }

    /// Host part, brackets included for IPv6 literals.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Host in the form accepted by socket APIs.
    pub(crate) fn socket_host(&self) -> &str {
        // ---
        self.host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(&self.host)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        write!(f, "{SCHEME}{}:{}", self.host, self.port)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for Address {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}
