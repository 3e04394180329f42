//! Message Codecs
//!
//! Converts between structured bus messages and the byte payloads carried
//! over MQTT. A bridge resolves its codec binding exactly once at
//! construction: either from a textual name looked up in the static codec
//! registry, or from an instance supplied directly by an embedding caller.
//!
//! The registry is a closed strategy table. Unknown names fail with a
//! [`ResolutionError`] at startup, before any bridge is activated.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::bus::BusMessage;

/// Per-message codec failure. Recoverable: the message is dropped and the
/// bridge stays alive.
#[derive(Debug)]
pub enum CodecError {
    /// Structured message could not be serialized
    Serialize(String),
    /// Byte payload could not be deserialized
    Deserialize(String),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Serialize(e) => write!(f, "serialization error: {}", e),
            CodecError::Deserialize(e) => write!(f, "deserialization error: {}", e),
        }
    }
}

impl std::error::Error for CodecError {}

/// A codec reference could not be resolved. Fatal at startup.
#[derive(Debug)]
pub enum ResolutionError {
    /// No codec registered under this name
    UnknownCodec(String),
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionError::UnknownCodec(name) => {
                write!(f, "unknown codec: '{}' (known: json, msgpack)", name)
            }
        }
    }
}

impl std::error::Error for ResolutionError {}

/// A structured-message serializer/deserializer pair.
pub trait Codec: Send + Sync {
    /// Registry name of this codec
    fn name(&self) -> &'static str;

    /// Encode a structured message into a byte payload
    fn serialize(&self, message: &BusMessage) -> Result<Bytes, CodecError>;

    /// Decode a byte payload into a structured message
    fn deserialize(&self, payload: &[u8]) -> Result<BusMessage, CodecError>;
}

/// JSON interchange codec, the shared default.
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn serialize(&self, message: &BusMessage) -> Result<Bytes, CodecError> {
        serde_json::to_vec(message)
            .map(Bytes::from)
            .map_err(|e| CodecError::Serialize(e.to_string()))
    }

    fn deserialize(&self, payload: &[u8]) -> Result<BusMessage, CodecError> {
        serde_json::from_slice(payload).map_err(|e| CodecError::Deserialize(e.to_string()))
    }
}

/// MessagePack codec for bandwidth-constrained links.
pub struct MsgpackCodec;

impl Codec for MsgpackCodec {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn serialize(&self, message: &BusMessage) -> Result<Bytes, CodecError> {
        rmp_serde::to_vec(message)
            .map(Bytes::from)
            .map_err(|e| CodecError::Serialize(e.to_string()))
    }

    fn deserialize(&self, payload: &[u8]) -> Result<BusMessage, CodecError> {
        rmp_serde::from_slice(payload).map_err(|e| CodecError::Deserialize(e.to_string()))
    }
}

/// Look up a codec by registry name.
pub fn lookup(name: &str) -> Result<Arc<dyn Codec>, ResolutionError> {
    match name {
        "json" => Ok(Arc::new(JsonCodec)),
        "msgpack" => Ok(Arc::new(MsgpackCodec)),
        other => Err(ResolutionError::UnknownCodec(other.to_string())),
    }
}

/// Reference to a codec: a registry name from configuration, or an
/// instance supplied directly by an embedding caller.
#[derive(Clone)]
pub enum CodecRef {
    /// Registry name, resolved via [`lookup`]
    Name(String),
    /// Pre-built codec instance
    Instance(Arc<dyn Codec>),
}

impl CodecRef {
    pub fn resolve(&self) -> Result<Arc<dyn Codec>, ResolutionError> {
        match self {
            CodecRef::Name(name) => lookup(name),
            CodecRef::Instance(codec) => Ok(codec.clone()),
        }
    }
}

impl From<&str> for CodecRef {
    fn from(name: &str) -> Self {
        CodecRef::Name(name.to_string())
    }
}

impl fmt::Debug for CodecRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecRef::Name(name) => write!(f, "CodecRef::Name({:?})", name),
            CodecRef::Instance(codec) => write!(f, "CodecRef::Instance({})", codec.name()),
        }
    }
}

/// The resolved serializer/deserializer pair held by a bridge.
///
/// Serializer and deserializer are configured independently, so a binding
/// may pair codecs of different formats.
#[derive(Clone)]
pub struct CodecBinding {
    serializer: Arc<dyn Codec>,
    deserializer: Arc<dyn Codec>,
}

impl CodecBinding {
    pub fn new(serializer: Arc<dyn Codec>, deserializer: Arc<dyn Codec>) -> Self {
        Self {
            serializer,
            deserializer,
        }
    }

    /// Resolve a binding from two codec references. Fails fast on the
    /// first unknown name.
    pub fn resolve(serializer: &CodecRef, deserializer: &CodecRef) -> Result<Self, ResolutionError> {
        Ok(Self {
            serializer: serializer.resolve()?,
            deserializer: deserializer.resolve()?,
        })
    }

    pub fn serialize(&self, message: &BusMessage) -> Result<Bytes, CodecError> {
        self.serializer.serialize(message)
    }

    pub fn deserialize(&self, payload: &[u8]) -> Result<BusMessage, CodecError> {
        self.deserializer.deserialize(payload)
    }

    pub fn serializer_name(&self) -> &'static str {
        self.serializer.name()
    }

    pub fn deserializer_name(&self) -> &'static str {
        self.deserializer.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_case::test_case;

    #[test_case("json")]
    #[test_case("msgpack")]
    fn test_round_trip(name: &str) {
        let codec = lookup(name).unwrap();
        let message = json!({"pose": {"x": 1.5, "y": -2.0}, "seq": 42});

        let payload = codec.serialize(&message).unwrap();
        let decoded = codec.deserialize(&payload).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_lookup_unknown_name() {
        let err = match lookup("protobuf") {
            Err(e) => e,
            Ok(_) => panic!("lookup must fail for unknown names"),
        };
        assert!(matches!(err, ResolutionError::UnknownCodec(ref n) if n == "protobuf"));
    }

    #[test]
    fn test_json_rejects_malformed_payload() {
        let err = JsonCodec.deserialize(b"{not json").unwrap_err();
        assert!(matches!(err, CodecError::Deserialize(_)));
    }

    #[test]
    fn test_msgpack_rejects_truncated_payload() {
        let codec = MsgpackCodec;
        let payload = codec.serialize(&json!({"a": [1, 2, 3]})).unwrap();
        let err = codec.deserialize(&payload[..payload.len() - 1]).unwrap_err();
        assert!(matches!(err, CodecError::Deserialize(_)));
    }

    #[test]
    fn test_binding_resolves_from_names() {
        let binding =
            CodecBinding::resolve(&CodecRef::from("json"), &CodecRef::from("json")).unwrap();
        assert_eq!(binding.serializer_name(), "json");

        let message = json!(["a", 1, null]);
        let payload = binding.serialize(&message).unwrap();
        assert_eq!(binding.deserialize(&payload).unwrap(), message);
    }

    #[test]
    fn test_binding_unknown_name_fails() {
        let result = CodecBinding::resolve(&CodecRef::from("json"), &CodecRef::from("nope"));
        assert!(result.is_err());
    }

    #[test]
    fn test_binding_from_instance() {
        let codec: Arc<dyn Codec> = Arc::new(MsgpackCodec);
        let binding = CodecBinding::resolve(
            &CodecRef::Instance(codec.clone()),
            &CodecRef::Instance(codec),
        )
        .unwrap();
        assert_eq!(binding.serializer_name(), "msgpack");
    }
}
