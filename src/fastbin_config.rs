//! Process level transport configuration.
//!
//! Holds only what a fastbin process needs to run a server and a client:
//! where to listen, what to advertise and the protocol limits. Export
//! specific settings travel as export properties instead (see
//! [`FastbinProvider::export`](crate::FastbinProvider::export)).

use std::collections::HashMap;
use std::net::ToSocketAddrs;

use crate::protocol::{DEFAULT_MAX_FRAME_SIZE, PROTOCOL_VERSION};
use crate::{log_info, log_warn, Address, Error, Result};

/// Default server port.
pub const DEFAULT_PORT: u16 = 9000;

/// Property key for the server port.
pub const PORT_PROPERTY: &str = "fastbin.port";

/// Property key for the host advertised to clients.
pub const SERVER_ADDRESS_PROPERTY: &str = "fastbin.address";

/// Property key for the highest protocol version spoken.
pub const PROTOCOL_VERSION_PROPERTY: &str = "fastbin.protocol.version";

/// Transport configuration.
///
/// # Example
///
/// ```
/// use fastbin_rpc::FastbinConfig;
///
/// let config = FastbinConfig::default()
///     .with_port(0)
///     .with_bind_host("127.0.0.1")
///     .with_public_host("localhost");
/// assert_eq!(config.bind_address().to_string(), "tcp://127.0.0.1:0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastbinConfig {
    // ---
    /// Port the server binds to; 0 picks a free port. Default 9000.
    pub port: u16,

    /// Interface the server binds to. Default `0.0.0.0`.
    pub bind_host: String,

    /// Host name advertised in connect addresses.
    ///
    /// When `None`, the bind host is advertised, or the local host name if
    /// the bind host is a wildcard.
    pub public_host: Option<String>,

    /// Highest protocol version accepted by the server and requested by the
    /// client.
    pub max_protocol_version: u16,

    /// Worker threads of a dispatcher built from this config.
    pub worker_threads: usize,

    /// Largest frame accepted or sent, in bytes.
    pub max_frame_size: usize,
}

impl Default for FastbinConfig {
    fn default() -> Self {
        // ---
        Self {
            port: DEFAULT_PORT,
            bind_host: "0.0.0.0".to_string(),
            public_host: None,
            max_protocol_version: PROTOCOL_VERSION,
            worker_threads: std::thread::available_parallelism().map_or(4, |n| n.get()),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl FastbinConfig {
    // ---

    /// Config for a server reachable only through the loopback interface.
    pub fn loopback(port: u16) -> Self {
        // ---
        Self::default()
            .with_port(port)
            .with_bind_host("localhost")
            .with_public_host("localhost")
    }

    /// Build a config from string properties.
    ///
    /// Recognized keys: `fastbin.port`, `fastbin.address` and
    /// `fastbin.protocol.version`. Other keys are ignored, missing ones keep
    /// their defaults.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] when a numeric value does not parse.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self> {
        // ---
        let mut config = Self::default();

        if let Some(port) = properties.get(PORT_PROPERTY) {
            config.port = parse_number(PORT_PROPERTY, port)?;
        }

        if let Some(version) = properties.get(PROTOCOL_VERSION_PROPERTY) {
            config.max_protocol_version = parse_number(PROTOCOL_VERSION_PROPERTY, version)?;
        }

        match properties.get(SERVER_ADDRESS_PROPERTY) {
            Some(host) if !host.trim().is_empty() => {
                config.public_host = Some(host.trim().to_string());
            }
            _ => {
                log_info!("public server address ({}) not set, advertising the local host name", SERVER_ADDRESS_PROPERTY);
            }
        }

        Ok(config)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = host.into();
        self
    }

    pub fn with_public_host(mut self, host: impl Into<String>) -> Self {
        self.public_host = Some(host.into());
        self
    }

    pub fn with_max_protocol_version(mut self, version: u16) -> Self {
        self.max_protocol_version = version;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    pub fn with_max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = bytes;
        self
    }

    /// `tcp://bind_host:port`, with IPv6 literals bracketed.
    pub fn bind_address(&self) -> Address {
        // ---
        let host = if self.bind_host.contains(':') && !self.bind_host.starts_with('[') {
            format!("[{}]", self.bind_host)
        } else {
            self.bind_host.clone()
        };
        Address::new(host, self.port)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    // ---
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("{key}: not a valid number: {value:?}")))
}

/// Whether `host` means "every interface".
pub(crate) fn is_wildcard_host(host: &str) -> bool {
    matches!(host, "0.0.0.0" | "::" | "[::]" | "")
}

/// Name of the local host, as advertised to remote clients.
///
/// Falls back to `localhost` when the host name is unknown or does not
/// resolve.
pub fn resolve_public_host() -> String {
    // ---
    let candidate = local_hostname().filter(|name| match (name.as_str(), 0).to_socket_addrs() {
        Ok(mut addrs) => addrs.next().is_some(),
        Err(_) => false,
    });

    match candidate {
        Some(name) => name,
        None => {
            log_warn!("could not resolve the local host name, advertising localhost");
            "localhost".to_string()
        }
    }
}

fn local_hostname() -> Option<String> {
    // ---
    let from_kernel = std::fs::read_to_string("/proc/sys/kernel/hostname").ok();
    let from_env = || {
        std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .ok()
    };

    from_kernel
        .or_else(from_env)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        // ---
        let config = FastbinConfig::default();
        assert_eq!(config.port, 9000);
        assert_eq!(config.bind_host, "0.0.0.0");
        assert_eq!(config.public_host, None);
        assert_eq!(config.max_protocol_version, PROTOCOL_VERSION);
        assert_eq!(config.max_frame_size, 16 * 1024 * 1024);
        assert!(config.worker_threads >= 1);
    }

    #[test]
    fn test_from_properties() {
        // ---
        let config = FastbinConfig::from_properties(&props(&[
            ("fastbin.port", "9123"),
            ("fastbin.address", "node-1.example.net"),
            ("fastbin.protocol.version", "0"),
            ("unrelated", "x"),
        ]))
        .unwrap();

        assert_eq!(config.port, 9123);
        assert_eq!(config.public_host.as_deref(), Some("node-1.example.net"));
        assert_eq!(config.max_protocol_version, 0);
    }

    #[test]
    fn test_from_properties_rejects_bad_numbers() {
        // ---
        let err = FastbinConfig::from_properties(&props(&[("fastbin.port", "ninety")])).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(msg) if msg.contains("fastbin.port")));

        let err = FastbinConfig::from_properties(&props(&[("fastbin.port", "70000")])).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_bind_address_brackets_ipv6() {
        // ---
        let config = FastbinConfig::default().with_bind_host("::1").with_port(1);
        assert_eq!(config.bind_address().to_string(), "tcp://[::1]:1");
        assert_eq!(config.bind_address().socket_host(), "::1");
    }

    #[test]
    fn test_public_host_is_never_empty() {
        // ---
        assert!(!resolve_public_host().is_empty());
        assert!(is_wildcard_host("0.0.0.0"));
        assert!(!is_wildcard_host("localhost"));
    }
}
