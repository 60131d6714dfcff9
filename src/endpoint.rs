// src/endpoint.rs

//! Endpoint descriptions exchanged between exporter and importer.
//!
//! An exported service is advertised as a flat string property map so that
//! any discovery mechanism can carry it. [`EndpointDescription`] is the typed
//! view of that map.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::fastbin_config::{PROTOCOL_VERSION_PROPERTY, SERVER_ADDRESS_PROPERTY};
use crate::protocol::PROTOCOL_VERSION;
use crate::{Address, CallId, Error, Result};

/// Configuration type name handled by this transport.
pub const CONFIG_TYPE: &str = "fastbin";

/// Export property holding an explicit endpoint id (used as call id).
pub const ENDPOINT_ADDRESS_PROPERTY: &str = "fastbin.endpoint.address";

pub const ENDPOINT_ID_PROPERTY: &str = "endpoint.id";
pub const OBJECT_CLASS_PROPERTY: &str = "objectClass";
pub const IMPORTED_CONFIGS_PROPERTY: &str = "service.imported.configs";

const RESERVED: [&str; 5] = [
    ENDPOINT_ID_PROPERTY,
    SERVER_ADDRESS_PROPERTY,
    PROTOCOL_VERSION_PROPERTY,
    OBJECT_CLASS_PROPERTY,
    IMPORTED_CONFIGS_PROPERTY,
];

/// Everything an importer needs to call an exported service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescription {
    // ---
    endpoint_id: CallId,
    address: String,
    protocol_version: u16,
    interface: String,
    properties: HashMap<String, String>,
}

impl EndpointDescription {
    // ---

    /// Describe an endpoint; user `properties` whose key starts with `.`
    /// are private to the exporter and dropped.
    pub fn new(
        endpoint_id: CallId,
        address: impl Into<String>,
        protocol_version: u16,
        interface: impl Into<String>,
        properties: &HashMap<String, String>,
    ) -> Self {
        // ---
        let properties = properties
            .iter()
            .filter(|(key, _)| !key.starts_with('.') && !RESERVED.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            endpoint_id,
            address: address.into(),
            protocol_version,
            interface: interface.into(),
            properties,
        }
    }

    /// Endpoint id; doubles as the call id on the server.
    pub fn endpoint_id(&self) -> &CallId {
        &self.endpoint_id
    }

    /// `tcp://host:port` of the hosting server.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Highest protocol version the exporter speaks.
    pub fn protocol_version(&self) -> u16 {
        self.protocol_version
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Copied user properties.
    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    /// Flatten into the advertised property map.
    pub fn to_properties(&self) -> HashMap<String, String> {
        // ---
        let mut props = self.properties.clone();
        props.insert(ENDPOINT_ID_PROPERTY.to_string(), self.endpoint_id.to_string());
        props.insert(SERVER_ADDRESS_PROPERTY.to_string(), self.address.clone());
        props.insert(PROTOCOL_VERSION_PROPERTY.to_string(), self.protocol_version.to_string());
        props.insert(OBJECT_CLASS_PROPERTY.to_string(), self.interface.clone());
        props.insert(IMPORTED_CONFIGS_PROPERTY.to_string(), CONFIG_TYPE.to_string());
        props
    }

    /// Parse an advertised property map.
    ///
    /// A missing protocol version means the exporter predates versioning
    /// and is read as the current version.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] for a missing endpoint id or address, a bad
    /// version number or an address that is not `tcp://host:port`.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        // ---
        let required = |key: &str| {
            props
                .get(key)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| Error::InvalidConfig(format!("endpoint property {key} is missing")))
        };

        let endpoint_id = CallId::from(required(ENDPOINT_ID_PROPERTY)?.as_str());
        let address = required(SERVER_ADDRESS_PROPERTY)?;
        Address::parse(address).map_err(|e| Error::InvalidConfig(e.to_string()))?;

        let protocol_version = match props.get(PROTOCOL_VERSION_PROPERTY) {
            Some(version) => version.trim().parse().map_err(|_| {
                Error::InvalidConfig(format!("{PROTOCOL_VERSION_PROPERTY}: not a valid version: {version:?}"))
            })?,
            None => PROTOCOL_VERSION,
        };

        let interface = props.get(OBJECT_CLASS_PROPERTY).cloned().unwrap_or_default();

        Ok(Self::new(endpoint_id, address.clone(), protocol_version, interface, props))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn user_props() -> HashMap<String, String> {
        // ---
        [("team", "billing"), (".secret", "hidden"), ("endpoint.id", "spoofed")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_private_and_reserved_properties_are_not_copied() {
        // ---
        let endpoint = EndpointDescription::new(
            CallId::from("abc"),
            "tcp://node:9000",
            1,
            "Greeter",
            &user_props(),
        );

        assert_eq!(endpoint.properties().len(), 1);
        assert_eq!(endpoint.properties()["team"], "billing");

        let props = endpoint.to_properties();
        assert_eq!(props["endpoint.id"], "abc");
        assert_eq!(props["fastbin.address"], "tcp://node:9000");
        assert_eq!(props["fastbin.protocol.version"], "1");
        assert_eq!(props["objectClass"], "Greeter");
        assert_eq!(props["service.imported.configs"], "fastbin");
        assert!(!props.contains_key(".secret"));
    }

    #[test]
    fn test_from_properties_restores_description() {
        // ---
        let endpoint = EndpointDescription::new(
            CallId::from("abc"),
            "tcp://node:9000",
            1,
            "Greeter",
            &user_props(),
        );

        let parsed = EndpointDescription::from_properties(&endpoint.to_properties()).unwrap();
        assert_eq!(parsed, endpoint);
    }

    #[test]
    fn test_missing_version_reads_as_current() {
        // ---
        let props: HashMap<String, String> = [("endpoint.id", "x"), ("fastbin.address", "tcp://h:1")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let parsed = EndpointDescription::from_properties(&props).unwrap();
        assert_eq!(parsed.protocol_version(), PROTOCOL_VERSION);
        assert_eq!(parsed.interface(), "");
    }

    #[test]
    fn test_invalid_descriptions_are_rejected() {
        // ---
        let mut props = HashMap::new();
        assert!(EndpointDescription::from_properties(&props).is_err());

        props.insert("endpoint.id".to_string(), "x".to_string());
        props.insert("fastbin.address".to_string(), "h:1".to_string());
        assert!(matches!(
            EndpointDescription::from_properties(&props),
            Err(Error::InvalidConfig(_))
        ));

        props.insert("fastbin.address".to_string(), "tcp://h:1".to_string());
        props.insert("fastbin.protocol.version".to_string(), "one".to_string());
        assert!(EndpointDescription::from_properties(&props).is_err());
    }
}
