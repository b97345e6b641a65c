//! The codec capability and the built-in codecs.

use bytes::Bytes;
use mime::Mime;
use serde_json::Value;

use crate::error::CodecError;

/// Encoder/decoder pair for one content type.
///
/// Codecs work on [`serde_json::Value`] as the neutral structured shape;
/// typed payloads go through `serde` on top of it (see
/// [`CodecRegistry::decode_as`](crate::CodecRegistry::decode_as)).
pub trait Codec: std::fmt::Debug + Send + Sync + 'static {
    /// The media type this codec produces and consumes.
    fn media_type(&self) -> &Mime;

    /// Encodes a structured value.
    fn encode(&self, value: &Value) -> Result<Bytes, CodecError>;

    /// Decodes a non-empty body.
    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError>;
}

/// `application/json`.
#[derive(Debug, Clone)]
pub struct JsonCodec {
    media_type: Mime,
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self {
            media_type: mime::APPLICATION_JSON,
        }
    }
}

impl JsonCodec {
    /// Creates the JSON codec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Codec for JsonCodec {
    fn media_type(&self) -> &Mime {
        &self.media_type
    }

    fn encode(&self, value: &Value) -> Result<Bytes, CodecError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| CodecError::encode(self.media_type.essence_str(), e))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        serde_json::from_slice(bytes)
            .map_err(|e| CodecError::malformed(self.media_type.essence_str(), e))
    }
}

/// `application/toml`.
///
/// TOML documents are always tables, so only objects can be encoded. TOML
/// has no `null`: null table entries are omitted, and a null inside an
/// array cannot be encoded.
#[derive(Debug, Clone)]
pub struct TomlCodec {
    media_type: Mime,
}

impl Default for TomlCodec {
    fn default() -> Self {
        Self {
            // Static, well-formed media type literal.
            media_type: "application/toml"
                .parse()
                .unwrap_or(mime::APPLICATION_OCTET_STREAM),
        }
    }
}

impl TomlCodec {
    /// Creates the TOML codec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Codec for TomlCodec {
    fn media_type(&self) -> &Mime {
        &self.media_type
    }

    fn encode(&self, value: &Value) -> Result<Bytes, CodecError> {
        let media_type = self.media_type.essence_str();
        if !value.is_object() {
            return Err(CodecError::unrepresentable(media_type, "top-level value must be a table"));
        }
        let value = without_nulls(value).map_err(|reason| CodecError::unrepresentable(media_type, reason))?;
        toml::to_string(&value)
            .map(Bytes::from)
            .map_err(|e| CodecError::unrepresentable(media_type, e))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| CodecError::malformed(self.media_type.essence_str(), e))?;
        toml::from_str(text).map_err(|e| CodecError::malformed(self.media_type.essence_str(), e))
    }
}

fn without_nulls(value: &Value) -> Result<Value, &'static str> {
    match value {
        Value::Object(fields) => fields
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| Ok::<_, &'static str>((k.clone(), without_nulls(v)?)))
            .collect::<Result<_, _>>()
            .map(Value::Object),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                if item.is_null() {
                    Err("arrays cannot hold null")
                } else {
                    without_nulls(item)
                }
            })
            .collect::<Result<_, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}
