//! # Hermes Codec
//!
//! Wire codecs and content negotiation for the Hermes request pipeline.
//!
//! A [`Codec`] converts between bytes and a structured
//! [`serde_json::Value`]. A [`CodecRegistry`] holds the registered codecs,
//! picks the response codec from `Accept` and the request codec from
//! `Content-Type`.
//!
//! ## Negotiation rules
//!
//! | Situation | Result |
//! |---|---|
//! | no `Accept`, blank `Accept`, `*/*` | default codec |
//! | `type/subtype` registered | that codec |
//! | `type/*` | default codec if it has that type, else first registered |
//! | nothing matches | [`CodecError::NotAcceptable`] |
//! | unknown `Content-Type` | [`CodecError::UnsupportedMediaType`] |
//! | body does not parse | [`CodecError::MalformedBody`] |

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod codec;
mod error;
mod registry;

pub use codec::{Codec, JsonCodec, TomlCodec};
pub use error::CodecError;
pub use registry::{CodecRegistry, CodecRegistryBuilder, SharedCodec};

/// Re-exported so callers can name media types without another dependency.
pub use mime::Mime;
