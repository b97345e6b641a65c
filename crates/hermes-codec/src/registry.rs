//! Codec registry and content negotiation.
//!
//! The registry is built once at startup and only read afterwards, so it is
//! shared behind an `Arc` without any locking.

use std::sync::Arc;

use bytes::Bytes;
use mime::Mime;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::codec::{Codec, JsonCodec};
use crate::error::CodecError;

/// A registered codec, shareable across requests.
pub type SharedCodec = Arc<dyn Codec>;

/// Registered codecs plus the default one.
///
/// # Example
///
/// ```rust
/// use hermes_codec::{CodecRegistry, JsonCodec, TomlCodec};
///
/// let registry = CodecRegistry::builder()
///     .register(JsonCodec::new())
///     .register(TomlCodec::new())
///     .build()
///     .unwrap();
///
/// let codec = registry.negotiate(Some("application/toml, application/json;q=0.5")).unwrap();
/// assert_eq!(codec.media_type().essence_str(), "application/toml");
///
/// assert!(registry.negotiate(Some("application/xml")).is_err());
/// ```
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: Vec<SharedCodec>,
    default: usize,
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field(
                "codecs",
                &self
                    .codecs
                    .iter()
                    .map(|c| c.media_type().essence_str().to_string())
                    .collect::<Vec<_>>(),
            )
            .field("default", &self.default)
            .finish()
    }
}

impl Default for CodecRegistry {
    /// A registry holding only [`JsonCodec`].
    fn default() -> Self {
        Self {
            codecs: vec![Arc::new(JsonCodec::new())],
            default: 0,
        }
    }
}

impl CodecRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> CodecRegistryBuilder {
        CodecRegistryBuilder::default()
    }

    /// Returns the default codec.
    #[must_use]
    pub fn default_codec(&self) -> &SharedCodec {
        &self.codecs[self.default]
    }

    /// Iterates over codecs in registration order.
    pub fn codecs(&self) -> impl Iterator<Item = &SharedCodec> {
        self.codecs.iter()
    }

    /// Selects the response codec for an `Accept` header.
    ///
    /// An absent or blank header, or one whose best range is `*/*`, selects
    /// the default codec. Ranges are tried in descending q-value order (ties
    /// keep header order) and ranges with `q=0` are ignored. Fails with
    /// [`CodecError::NotAcceptable`] when no range is served.
    pub fn negotiate(&self, accept: Option<&str>) -> Result<SharedCodec, CodecError> {
        let Some(accept) = accept.map(str::trim).filter(|a| !a.is_empty()) else {
            return Ok(Arc::clone(self.default_codec()));
        };

        for range in parse_accept(accept) {
            if let Some(codec) = self.match_range(&range) {
                return Ok(Arc::clone(codec));
            }
        }

        tracing::debug!(accept, "no codec satisfies Accept header");
        Err(CodecError::NotAcceptable {
            accept: accept.to_string(),
        })
    }

    /// Finds the codec for a request `Content-Type`.
    ///
    /// An absent header selects the default codec. Parameters such as
    /// `charset` are ignored and structured suffixes (`+json`) map to the
    /// codec for the suffix.
    pub fn for_content_type(&self, content_type: Option<&str>) -> Result<SharedCodec, CodecError> {
        let Some(raw) = content_type.map(str::trim).filter(|c| !c.is_empty()) else {
            return Ok(Arc::clone(self.default_codec()));
        };

        let unsupported = || CodecError::UnsupportedMediaType {
            media_type: raw.to_string(),
        };
        let media: Mime = raw.parse().map_err(|_| unsupported())?;
        if media.type_() == mime::STAR || media.subtype() == mime::STAR {
            return Err(unsupported());
        }
        self.match_range(&media)
            .map(Arc::clone)
            .ok_or_else(unsupported)
    }

    /// Decodes a body according to its `Content-Type`.
    ///
    /// An empty body decodes to `null` whatever the content type, so an
    /// absent payload surfaces as missing fields during validation.
    pub fn decode(&self, bytes: &[u8], content_type: Option<&str>) -> Result<Value, CodecError> {
        let codec = self.for_content_type(content_type)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        codec.decode(bytes)
    }

    /// Decodes a body into a typed shape.
    ///
    /// A body that parses but does not fit `T` is reported as
    /// [`CodecError::MalformedBody`].
    pub fn decode_as<T: DeserializeOwned>(
        &self,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> Result<T, CodecError> {
        let value = self.decode(bytes, content_type)?;
        serde_json::from_value(value).map_err(|e| {
            CodecError::malformed(content_type.unwrap_or("default codec").to_string(), e)
        })
    }

    /// Encodes a value for a content type chosen by [`negotiate`](Self::negotiate).
    pub fn encode(&self, value: &Value, content_type: &str) -> Result<Bytes, CodecError> {
        let media: Mime = content_type
            .parse()
            .map_err(|_| CodecError::UnsupportedMediaType {
                media_type: content_type.to_string(),
            })?;
        let codec = self
            .match_range(&media)
            .ok_or_else(|| CodecError::UnsupportedMediaType {
                media_type: content_type.to_string(),
            })?;
        codec.encode(value)
    }

    fn match_range(&self, range: &Mime) -> Option<&SharedCodec> {
        if range.type_() == mime::STAR {
            return Some(self.default_codec());
        }

        let same_type = |codec: &&SharedCodec| codec.media_type().type_() == range.type_();

        if range.subtype() == mime::STAR {
            if self.default_codec().media_type().type_() == range.type_() {
                return Some(self.default_codec());
            }
            return self.codecs.iter().find(same_type);
        }

        self.codecs
            .iter()
            .filter(same_type)
            .find(|codec| codec.media_type().subtype() == range.subtype())
            .or_else(|| {
                let suffix = range.suffix()?;
                self.codecs
                    .iter()
                    .filter(same_type)
                    .find(|codec| codec.media_type().subtype() == suffix)
            })
    }
}

/// Parses an `Accept` header into ranges ordered by preference.
fn parse_accept(accept: &str) -> Vec<Mime> {
    let mut ranges: Vec<(f32, Mime)> = accept
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .filter_map(|r| r.parse::<Mime>().ok())
        .map(|m| {
            let q = m
                .get_param("q")
                .and_then(|q| q.as_str().parse::<f32>().ok())
                .unwrap_or(1.0);
            (q, m)
        })
        .filter(|(q, _)| *q > 0.0)
        .collect();

    // Stable, so equal weights keep header order.
    ranges.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    ranges.into_iter().map(|(_, m)| m).collect()
}

/// Builds a [`CodecRegistry`].
#[derive(Default)]
pub struct CodecRegistryBuilder {
    codecs: Vec<SharedCodec>,
    default: Option<String>,
}

impl CodecRegistryBuilder {
    /// Adds a codec. Registration order is the tiebreak for `type/*` ranges.
    #[must_use]
    pub fn register(mut self, codec: impl Codec) -> Self {
        self.codecs.push(Arc::new(codec));
        self
    }

    /// Adds an already shared codec.
    #[must_use]
    pub fn register_shared(mut self, codec: SharedCodec) -> Self {
        self.codecs.push(codec);
        self
    }

    /// Sets the default codec by media type. Defaults to the first registered.
    #[must_use]
    pub fn default_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.default = Some(media_type.into());
        self
    }

    /// Freezes the registry.
    pub fn build(self) -> Result<CodecRegistry, CodecError> {
        if self.codecs.is_empty() {
            return Err(CodecError::MissingCodec);
        }

        let default = match self.default {
            None => 0,
            Some(media_type) => self
                .codecs
                .iter()
                .position(|c| c.media_type().essence_str() == media_type)
                .ok_or(CodecError::UnknownDefault { media_type })?,
        };

        Ok(CodecRegistry {
            codecs: self.codecs,
            default,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TomlCodec;
    use serde::Deserialize;
    use serde_json::json;

    fn json_only() -> CodecRegistry {
        CodecRegistry::builder().register(JsonCodec::new()).build().unwrap()
    }

    fn json_and_toml() -> CodecRegistry {
        CodecRegistry::builder()
            .register(JsonCodec::new())
            .register(TomlCodec::new())
            .build()
            .unwrap()
    }

    fn negotiated(registry: &CodecRegistry, accept: Option<&str>) -> String {
        registry
            .negotiate(accept)
            .unwrap()
            .media_type()
            .essence_str()
            .to_string()
    }

    #[test]
    fn test_missing_accept_uses_default() {
        let registry = json_and_toml();
        assert_eq!(negotiated(&registry, None), "application/json");
        assert_eq!(negotiated(&registry, Some("  ")), "application/json");
        assert_eq!(negotiated(&registry, Some("*/*")), "application/json");
    }

    #[test]
    fn test_unknown_accept_is_not_acceptable() {
        let err = json_only().negotiate(Some("application/xml")).unwrap_err();
        assert_eq!(
            err,
            CodecError::NotAcceptable {
                accept: "application/xml".into()
            }
        );
    }

    #[test]
    fn test_accept_order_and_quality() {
        let registry = json_and_toml();
        assert_eq!(
            negotiated(&registry, Some("application/xml, application/toml")),
            "application/toml"
        );
        assert_eq!(
            negotiated(&registry, Some("application/json;q=0.4, application/toml;q=0.9")),
            "application/toml"
        );
        assert_eq!(
            negotiated(&registry, Some("application/toml;q=0, application/*")),
            "application/json"
        );
    }

    #[test]
    fn test_wildcard_ranges() {
        let registry = json_and_toml();
        assert_eq!(negotiated(&registry, Some("text/html, */*;q=0.1")), "application/json");
        assert!(registry.negotiate(Some("text/*")).is_err());
    }

    #[test]
    fn test_content_type_lookup() {
        let registry = json_and_toml();
        assert!(registry.for_content_type(Some("application/json; charset=utf-8")).is_ok());
        assert!(registry.for_content_type(Some("application/problem+json")).is_ok());
        assert!(registry.for_content_type(None).is_ok());

        let err = registry.for_content_type(Some("text/plain")).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedMediaType { .. }));
        let err = registry.for_content_type(Some("not a media type")).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedMediaType { .. }));
    }

    #[test]
    fn test_decode_empty_body_is_null() {
        let registry = json_only();
        assert_eq!(registry.decode(b"", None).unwrap(), Value::Null);
        assert_eq!(
            registry.decode(b"{\"a\":1}", Some("application/json")).unwrap(),
            json!({"a": 1})
        );
    }

    #[test]
    fn test_decode_as_shape_mismatch() {
        #[derive(Debug, Deserialize)]
        struct Node {
            #[allow(dead_code)]
            name: String,
        }

        let registry = json_only();
        let err = registry
            .decode_as::<Node>(br#"{"name": 5}"#, Some("application/json"))
            .unwrap_err();
        assert!(matches!(err, CodecError::MalformedBody { .. }));
    }

    #[test]
    fn test_build_errors() {
        assert_eq!(
            CodecRegistry::builder().build().unwrap_err(),
            CodecError::MissingCodec
        );
        let err = CodecRegistry::builder()
            .register(JsonCodec::new())
            .default_media_type("application/toml")
            .build()
            .unwrap_err();
        assert!(matches!(err, CodecError::UnknownDefault { .. }));
    }

    #[test]
    fn test_explicit_default() {
        let registry = CodecRegistry::builder()
            .register(JsonCodec::new())
            .register(TomlCodec::new())
            .default_media_type("application/toml")
            .build()
            .unwrap();
        assert_eq!(negotiated(&registry, None), "application/toml");
        assert_eq!(negotiated(&registry, Some("application/*")), "application/toml");
    }
}
