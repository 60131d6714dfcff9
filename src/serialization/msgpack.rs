use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{check_version, SerializationStrategy};
use crate::protocol::PROTOCOL_VERSION;
use crate::Result;

/// MessagePack payloads via `rmp_serde`; the default codec.
///
/// Values are written back to back with no extra framing since MessagePack
/// is self-delimiting. Structs are encoded as arrays, so field order is part
/// of the contract between both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgPackSerialization {
    version: u16,
}

impl MsgPackSerialization {
    pub fn new() -> Self {
        Self {
            version: PROTOCOL_VERSION,
        }
    }
}

impl Default for MsgPackSerialization {
    fn default() -> Self {
        Self::new()
    }
}

impl SerializationStrategy for MsgPackSerialization {
    // ---

    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn protocol_version(&self) -> u16 {
        self.version
    }

    fn for_protocol_version(&self, version: u16) -> Result<Self> {
        // Versions 0 and 1 share one encoding
        let version = check_version(version, self.max_protocol_version())?;
        Ok(Self { version })
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T, out: &mut BytesMut) -> Result<()> {
        // ---
        rmp_serde::encode::write(&mut (&mut *out).writer(), value)?;
        Ok(())
    }

    fn decode<T: DeserializeOwned>(&self, input: &mut Bytes) -> Result<T> {
        // ---
        let value = rmp_serde::from_read((&mut *input).reader())?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_values_are_consumed_one_at_a_time() {
        // ---
        let codec = MsgPackSerialization::default();
        let mut out = BytesMut::new();
        codec.encode(&1u8, &mut out).unwrap();
        codec.encode("two", &mut out).unwrap();

        let mut input = out.freeze();
        assert_eq!(codec.decode::<u8>(&mut input).unwrap(), 1);
        assert_eq!(codec.decode::<String>(&mut input).unwrap(), "two");
        assert!(input.is_empty());
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        // ---
        let codec = MsgPackSerialization::default();
        let mut out = BytesMut::new();
        codec.encode("text", &mut out).unwrap();
        assert!(codec.decode::<u64>(&mut out.freeze()).is_err());
    }
}
