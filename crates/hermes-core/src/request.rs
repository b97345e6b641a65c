//! The request model seen by pipeline stages and handlers.

use std::sync::Arc;

use bytes::Bytes;
use hermes_codec::{CodecRegistry, SharedCodec};
use hermes_router::Params;
use http::{header, Extensions, HeaderMap, Method, Uri, Version};
use http_body::Body;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::body::{BoxError, RequestBody};
use crate::context::{ConnectionInfo, RequestId};
use crate::error::PipelineError;
use crate::identity::Identity;

/// Default request body limit: 5 MiB.
pub const DEFAULT_BODY_LIMIT: usize = 5 * 1024 * 1024;

/// Query parameters: name to values in order of appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    inner: IndexMap<String, Vec<String>>,
}

impl QueryParams {
    /// Parses a raw query string.
    ///
    /// Each `&`-separated pair is decoded on its own, so a malformed pair
    /// never costs the others. Percent-escapes that are not UTF-8 decode
    /// lossily; a pair that still fails to decode is dropped.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut inner: IndexMap<String, Vec<String>> = IndexMap::new();
        for pair in raw.split('&').filter(|p| !p.is_empty()) {
            match serde_urlencoded::from_str::<Vec<(String, String)>>(pair) {
                Ok(decoded) => {
                    for (name, value) in decoded {
                        inner.entry(name).or_default().push(value);
                    }
                }
                Err(e) => tracing::debug!(pair, error = %e, "dropping undecodable query pair"),
            }
        }
        Self { inner }
    }

    /// First value for `name`.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.inner
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// All values for `name`.
    #[must_use]
    pub fn all(&self, name: &str) -> &[String] {
        self.inner.get(name).map_or(&[], Vec::as_slice)
    }

    /// Iterates over names and their values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Returns true if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Set-once request state was written twice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestStateError {
    /// Path parameters are bound once, at route match.
    #[error("path parameters are already bound")]
    ParamsAlreadyBound,
    /// An identity is attached at most once.
    #[error("an identity is already attached for {principal}")]
    IdentityAlreadyAttached {
        /// Principal of the identity that stays attached.
        principal: String,
    },
}

/// An inbound request, owned by exactly one pipeline execution.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use hermes_core::Request;
/// use http_body_util::Full;
///
/// # tokio_test::block_on(async {
/// let http = http::Request::builder()
///     .method("POST")
///     .uri("/nodes?label=a&label=b")
///     .header("content-type", "application/json")
///     .body(Full::new(Bytes::from_static(br#"{"name":"n1"}"#)))
///     .unwrap();
///
/// let mut request = Request::from_http(http, 1024);
/// assert_eq!(request.query().all("label"), ["a", "b"]);
/// assert_eq!(request.body_value().await.unwrap()["name"], "n1");
/// # });
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    query: QueryParams,
    path_params: Params,
    params_bound: bool,
    body: RequestBody,
    decoded: Option<Value>,
    identity: Option<Identity>,
    attributes: Extensions,
    request_id: RequestId,
    connection: ConnectionInfo,
    codecs: Arc<CodecRegistry>,
    response_codec: Option<SharedCodec>,
}

impl Request {
    /// Converts an `http` request, limiting the body to `body_limit` bytes.
    pub fn from_http<B>(request: http::Request<B>, body_limit: usize) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = request.into_parts();
        Self::from_parts(parts, RequestBody::streaming(body, body_limit))
    }

    /// Builds a request from `http` parts and a body.
    #[must_use]
    pub fn from_parts(parts: http::request::Parts, body: RequestBody) -> Self {
        let query = parts.uri.query().map(QueryParams::parse).unwrap_or_default();
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            query,
            path_params: Params::new(),
            params_bound: false,
            body,
            decoded: None,
            identity: None,
            attributes: parts.extensions,
            request_id: RequestId::new(),
            connection: ConnectionInfo::default(),
            codecs: Arc::new(CodecRegistry::default()),
            response_codec: None,
        }
    }

    /// Sets where the request came from.
    #[must_use]
    pub fn with_connection(mut self, connection: ConnectionInfo) -> Self {
        self.connection = connection;
        self
    }

    /// Request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Request path, without the query.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// HTTP version.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A header value as text, if present and valid.
    #[must_use]
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Query parameters.
    #[must_use]
    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    /// Path parameters; empty until the request is routed.
    #[must_use]
    pub fn path_params(&self) -> &Params {
        &self.path_params
    }

    /// A single path parameter.
    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name)
    }

    /// Binds path parameters. Only the router stage calls this, once.
    pub fn bind_path_params(&mut self, params: Params) -> Result<(), RequestStateError> {
        if self.params_bound {
            tracing::warn!(path = %self.uri.path(), "path parameters bound twice");
            return Err(RequestStateError::ParamsAlreadyBound);
        }
        self.path_params = params;
        self.params_bound = true;
        Ok(())
    }

    /// The authenticated identity, if any.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Attaches the authenticated identity. Never overwrites.
    pub fn attach_identity(&mut self, identity: Identity) -> Result<(), RequestStateError> {
        if let Some(existing) = &self.identity {
            tracing::warn!(
                principal = %existing.principal(),
                rejected = %identity.principal(),
                "identity attached twice"
            );
            return Err(RequestStateError::IdentityAlreadyAttached {
                principal: existing.principal().to_string(),
            });
        }
        self.identity = Some(identity);
        Ok(())
    }

    /// Typed attribute bag shared between stages and handlers.
    #[must_use]
    pub fn attributes(&self) -> &Extensions {
        &self.attributes
    }

    /// Mutable attribute bag.
    pub fn attributes_mut(&mut self) -> &mut Extensions {
        &mut self.attributes
    }

    /// Request id.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Replaces the request id, e.g. with one propagated by a client.
    pub fn set_request_id(&mut self, id: RequestId) {
        self.request_id = id;
    }

    /// Connection info.
    #[must_use]
    pub fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }

    /// Uses `codecs` to decode the body.
    pub fn attach_codecs(&mut self, codecs: Arc<CodecRegistry>) {
        self.codecs = codecs;
    }

    /// The codec negotiated for the response.
    #[must_use]
    pub fn response_codec(&self) -> Option<&SharedCodec> {
        self.response_codec.as_ref()
    }

    /// Records the codec negotiated for the response.
    pub fn set_response_codec(&mut self, codec: SharedCodec) {
        self.response_codec = Some(codec);
    }

    /// Raw body bytes, read on first access.
    pub async fn body_bytes(&mut self) -> Result<Bytes, PipelineError> {
        self.body.bytes().await
    }

    /// The body decoded by the codec for its `Content-Type`.
    ///
    /// Decoded once and cached. An empty body is `null`.
    pub async fn body_value(&mut self) -> Result<&Value, PipelineError> {
        if self.decoded.is_none() {
            let bytes = self.body.bytes().await?;
            let content_type = self
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let value = self.codecs.decode(&bytes, content_type)?;
            self.decoded = Some(value);
        }
        Ok(self.decoded.get_or_insert(Value::Null))
    }

    /// The body decoded into `T`.
    pub async fn body_as<T: DeserializeOwned>(&mut self) -> Result<T, PipelineError> {
        let value = self.body_value().await?.clone();
        serde_json::from_value(value).map_err(|e| {
            hermes_codec::CodecError::malformed("request body", e).into()
        })
    }
}
