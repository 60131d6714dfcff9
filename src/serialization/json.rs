use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{check_version, SerializationStrategy};
use crate::protocol::PROTOCOL_VERSION;
use crate::{Error, Result};

/// JSON payloads via `serde_json`.
///
/// Each value is prefixed with its byte length (u32, big-endian). Slower and
/// larger than MessagePack but readable in a packet capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonSerialization {
    version: u16,
}

impl JsonSerialization {
    pub fn new() -> Self {
        Self {
            version: PROTOCOL_VERSION,
        }
    }
}

impl Default for JsonSerialization {
    fn default() -> Self {
        Self::new()
    }
}

impl SerializationStrategy for JsonSerialization {
    // ---

    fn name(&self) -> &'static str {
        "json"
    }

    fn protocol_version(&self) -> u16 {
        self.version
    }

    fn for_protocol_version(&self, version: u16) -> Result<Self> {
        let version = check_version(version, self.max_protocol_version())?;
        Ok(Self { version })
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T, out: &mut BytesMut) -> Result<()> {
        // ---
        let encoded = serde_json::to_vec(value)?;
        let len = u32::try_from(encoded.len())
            .map_err(|_| Error::Serialization(format!("value too large: {} bytes", encoded.len())))?;
        out.put_u32(len);
        out.put_slice(&encoded);
        Ok(())
    }

    fn decode<T: DeserializeOwned>(&self, input: &mut Bytes) -> Result<T> {
        // ---
        if input.remaining() < 4 {
            return Err(Error::Serialization("truncated value length".into()));
        }
        let len = input.get_u32() as usize;
        if input.remaining() < len {
            return Err(Error::Serialization(format!(
                "truncated value: expected {len} bytes, have {}",
                input.remaining()
            )));
        }
        let value = serde_json::from_slice(&input.split_to(len))?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_values_are_length_prefixed_json() {
        // ---
        let codec = JsonSerialization::default();
        let mut out = BytesMut::new();
        codec.encode(&("a", 1), &mut out).unwrap();

        assert_eq!(&out[..4], &[0, 0, 0, 7]);
        assert_eq!(&out[4..], b"[\"a\",1]");
    }

    #[test]
    fn test_truncated_value_is_an_error() {
        // ---
        let codec = JsonSerialization::default();
        let mut input = Bytes::from_static(&[0, 0, 0, 9, b'1']);
        assert!(codec.decode::<u32>(&mut input).is_err());
    }
}
