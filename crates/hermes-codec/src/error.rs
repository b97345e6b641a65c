//! Codec errors.

use thiserror::Error;

/// Failures raised while negotiating, decoding or encoding bodies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// No registered codec handles the request's content type.
    #[error("unsupported media type: {media_type}")]
    UnsupportedMediaType {
        /// The content type the client sent.
        media_type: String,
    },

    /// The body is not syntactically valid for its content type.
    #[error("malformed {media_type} body: {reason}")]
    MalformedBody {
        /// Content type used for decoding.
        media_type: String,
        /// Parser message.
        reason: String,
    },

    /// None of the client's `Accept` ranges is served by a registered codec.
    #[error("none of the accepted media types is available: {accept}")]
    NotAcceptable {
        /// The raw `Accept` header.
        accept: String,
    },

    /// The value cannot be represented in the target format.
    #[error("cannot encode value as {media_type}: {reason}")]
    Encode {
        /// Target content type.
        media_type: String,
        /// Serializer message.
        reason: String,
    },

    /// The negotiated format has no representation for the value, such as a
    /// TOML document that is not a table.
    #[error("value cannot be represented as {media_type}: {reason}")]
    Unrepresentable {
        /// Negotiated content type.
        media_type: String,
        /// What could not be represented.
        reason: String,
    },

    /// A registry was built without any codec.
    #[error("no codec registered")]
    MissingCodec,

    /// The configured default codec is not registered.
    #[error("default codec {media_type} is not registered")]
    UnknownDefault {
        /// The configured default.
        media_type: String,
    },
}

impl CodecError {
    /// Creates a malformed-body error.
    #[must_use]
    pub fn malformed(media_type: impl Into<String>, reason: impl ToString) -> Self {
        Self::MalformedBody {
            media_type: media_type.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates an unrepresentable-value error.
    #[must_use]
    pub fn unrepresentable(media_type: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unrepresentable {
            media_type: media_type.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates an encode error.
    #[must_use]
    pub fn encode(media_type: impl Into<String>, reason: impl ToString) -> Self {
        Self::Encode {
            media_type: media_type.into(),
            reason: reason.to_string(),
        }
    }
}
