//! Cross-origin resource sharing.
//!
//! Preflight requests (`OPTIONS` with `Origin` and
//! `Access-Control-Request-Method`) are answered in the decode stage
//! without routing. Other responses to an allowed origin get
//! `Access-Control-Allow-Origin` and friends added after encoding.

use std::time::Duration;

use hermes_core::{PipelineError, Request, Response};
use http::header::{self, HeaderMap, HeaderValue};
use http::{Method, StatusCode};

/// CORS header names.
pub mod headers {
    /// `Access-Control-Allow-Origin`.
    pub const ALLOW_ORIGIN: &str = "access-control-allow-origin";
    /// `Access-Control-Allow-Methods`.
    pub const ALLOW_METHODS: &str = "access-control-allow-methods";
    /// `Access-Control-Allow-Headers`.
    pub const ALLOW_HEADERS: &str = "access-control-allow-headers";
    /// `Access-Control-Allow-Credentials`.
    pub const ALLOW_CREDENTIALS: &str = "access-control-allow-credentials";
    /// `Access-Control-Max-Age`.
    pub const MAX_AGE: &str = "access-control-max-age";
    /// `Access-Control-Expose-Headers`.
    pub const EXPOSE_HEADERS: &str = "access-control-expose-headers";
    /// `Access-Control-Request-Method`.
    pub const REQUEST_METHOD: &str = "access-control-request-method";
    /// `Access-Control-Request-Headers`.
    pub const REQUEST_HEADERS: &str = "access-control-request-headers";
}

/// Which origins may call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    /// Any origin (`*`).
    Any,
    /// Exactly these origins.
    List(Vec<String>),
}

impl AllowedOrigins {
    /// Returns true if `origin` may call.
    #[must_use]
    pub fn is_allowed(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List(origins) => origins.iter().any(|o| o == origin),
        }
    }
}

/// A CORS policy.
///
/// # Example
///
/// ```
/// use hermes_pipeline::CorsPolicy;
/// use http::Method;
/// use std::time::Duration;
///
/// let cors = CorsPolicy::new()
///     .allow_origin("https://console.example.com")
///     .allow_methods([Method::GET, Method::POST])
///     .allow_headers(["content-type", "authorization"])
///     .max_age(Duration::from_secs(600));
/// assert!(cors.origins().is_allowed("https://console.example.com"));
/// ```
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    origins: AllowedOrigins,
    methods: Vec<Method>,
    headers: Vec<String>,
    expose_headers: Vec<String>,
    allow_credentials: bool,
    max_age: Option<Duration>,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            origins: AllowedOrigins::List(Vec::new()),
            methods: vec![
                Method::GET,
                Method::HEAD,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::PATCH,
            ],
            headers: vec![
                "content-type".to_string(),
                "authorization".to_string(),
                "x-request-id".to_string(),
                "x-ticket".to_string(),
            ],
            expose_headers: vec!["x-request-id".to_string()],
            allow_credentials: false,
            max_age: Some(Duration::from_secs(86400)),
        }
    }
}

impl CorsPolicy {
    /// No origins allowed, common methods and headers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows any origin.
    #[must_use]
    pub fn allow_any_origin(mut self) -> Self {
        self.origins = AllowedOrigins::Any;
        self
    }

    /// Adds an allowed origin. `*` allows any origin.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        let origin = origin.into();
        if origin == "*" {
            self.origins = AllowedOrigins::Any;
        } else if let AllowedOrigins::List(origins) = &mut self.origins {
            origins.push(origin);
        }
        self
    }

    /// Replaces the allowed methods.
    #[must_use]
    pub fn allow_methods<I: IntoIterator<Item = Method>>(mut self, methods: I) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    /// Replaces the allowed request headers. `*` allows any header.
    #[must_use]
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = headers.into_iter().map(|h| h.into().to_lowercase()).collect();
        self
    }

    /// Replaces the headers exposed to scripts.
    #[must_use]
    pub fn expose_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expose_headers = headers.into_iter().map(|h| h.into().to_lowercase()).collect();
        self
    }

    /// Allows cookies and authorization headers.
    #[must_use]
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    /// How long browsers may cache a preflight answer.
    #[must_use]
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Allowed origins.
    #[must_use]
    pub fn origins(&self) -> &AllowedOrigins {
        &self.origins
    }

    /// Returns true if `request` is a preflight request.
    #[must_use]
    pub fn is_preflight(request: &Request) -> bool {
        request.method() == Method::OPTIONS
            && request.headers().contains_key(header::ORIGIN)
            && request.headers().contains_key(headers::REQUEST_METHOD)
    }

    /// Answers a preflight request.
    pub fn preflight(&self, request: &Request) -> Result<Response, PipelineError> {
        let origin = request.header(header::ORIGIN).unwrap_or_default();
        if !self.origins.is_allowed(origin) {
            return Err(PipelineError::forbidden(format!("origin {origin} is not allowed")));
        }

        if let Some(method) = request.header(headers::REQUEST_METHOD) {
            let allowed = method
                .parse::<Method>()
                .is_ok_and(|m| self.methods.contains(&m));
            if !allowed {
                return Err(PipelineError::forbidden(format!(
                    "method {method} is not allowed"
                )));
            }
        }

        if let Some(requested) = request.header(headers::REQUEST_HEADERS) {
            let any = self.headers.iter().any(|h| h == "*");
            for name in requested.split(',').map(|h| h.trim().to_lowercase()) {
                if !name.is_empty() && !any && !self.headers.contains(&name) {
                    return Err(PipelineError::forbidden(format!(
                        "header {name} is not allowed"
                    )));
                }
            }
        }

        let mut response = Response::new(StatusCode::NO_CONTENT);
        let headers = response.headers_mut();
        self.allow_origin_headers(headers, origin);

        let methods: Vec<&str> = self.methods.iter().map(Method::as_str).collect();
        insert(headers, headers::ALLOW_METHODS, &methods.join(", "));
        if !self.headers.is_empty() {
            insert(headers, headers::ALLOW_HEADERS, &self.headers.join(", "));
        }
        if let Some(max_age) = self.max_age {
            insert(headers, headers::MAX_AGE, &max_age.as_secs().to_string());
        }
        headers.insert(
            header::VARY,
            HeaderValue::from_static("Origin, Access-Control-Request-Method, Access-Control-Request-Headers"),
        );
        Ok(response)
    }

    /// Adds CORS headers to an actual response for `origin`.
    pub fn decorate(&self, headers: &mut HeaderMap, origin: Option<&str>) {
        let Some(origin) = origin else {
            return;
        };
        if !self.origins.is_allowed(origin) {
            return;
        }
        self.allow_origin_headers(headers, origin);
        if !self.expose_headers.is_empty() {
            insert(headers, headers::EXPOSE_HEADERS, &self.expose_headers.join(", "));
        }
        headers.append(header::VARY, HeaderValue::from_static("Origin"));
    }

    fn allow_origin_headers(&self, headers: &mut HeaderMap, origin: &str) {
        // Credentials cannot be combined with the `*` wildcard, so echo the
        // origin in that case.
        let value = match (&self.origins, self.allow_credentials) {
            (AllowedOrigins::Any, false) => "*",
            _ => origin,
        };
        insert(headers, headers::ALLOW_ORIGIN, value);
        if self.allow_credentials {
            headers.insert(headers::ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
    }
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
