//! The pipeline executor.
//!
//! [`Pipeline::execute`] drives one request through the stages in
//! [`crate::stage`]. Each stage either continues, answers early with
//! [`Flow::Respond`], or fails; whatever happens the response is encoded
//! and returned together with the stages visited.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use hermes_auth::{authenticate_with, SharedAuthProvider};
use hermes_codec::CodecRegistry;
use hermes_core::{BoxBody, PipelineError, PipelineResult, Request, Response, ResponseBody};
use hermes_router::Router;
use hermes_telemetry::metrics::{self, UNMATCHED_ROUTE};
use hermes_telemetry::InFlightGuard;
use hermes_validation::{validate, Input};
use http::header::{self, HeaderValue};
use http::StatusCode;
use http_body_util::{BodyExt, Empty, Full};
use serde_json::Value;
use tracing::Instrument;

use crate::cors::CorsPolicy;
use crate::request_id::{RequestIdPolicy, REQUEST_ID_HEADER};
use crate::route::{AuthPolicy, Route};
use crate::stage::{Failure, Flow, Outcome, Stage};

const JSON: &str = "application/json";
const PROBLEM_JSON: &str = "application/problem+json";

/// A route with its auth providers resolved.
pub(crate) struct Endpoint {
    pub(crate) route: Route,
    pub(crate) providers: Vec<SharedAuthProvider>,
}

struct Inner {
    router: Router<usize>,
    endpoints: Vec<Endpoint>,
    fallback: Option<Endpoint>,
    codecs: Arc<CodecRegistry>,
    cors: Option<CorsPolicy>,
    request_ids: RequestIdPolicy,
}

/// The assembled request pipeline.
///
/// Immutable and cheap to clone; one instance serves every connection.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("routes", &self.inner.endpoints.len())
            .field("fallback", &self.inner.fallback.is_some())
            .field("cors", &self.inner.cors.is_some())
            .finish_non_exhaustive()
    }
}

struct StageFailure {
    stage: Stage,
    error: PipelineError,
}

struct Trace {
    stages: Vec<Stage>,
    route: Option<String>,
}

impl Trace {
    fn step<T>(&mut self, stage: Stage, result: PipelineResult<Flow<T>>) -> Result<Flow<T>, StageFailure> {
        match result {
            Ok(flow) => {
                self.stages.push(stage);
                Ok(flow)
            }
            Err(error) => Err(StageFailure { stage, error }),
        }
    }
}

macro_rules! proceed {
    ($trace:expr, $stage:expr, $result:expr) => {{
        let result = $result;
        match $trace.step($stage, result)? {
            Flow::Continue(value) => value,
            Flow::Respond(response) => return Ok(response),
        }
    }};
}

impl Pipeline {
    pub(crate) fn new(
        router: Router<usize>,
        endpoints: Vec<Endpoint>,
        fallback: Option<Endpoint>,
        codecs: Arc<CodecRegistry>,
        cors: Option<CorsPolicy>,
        request_ids: RequestIdPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                router,
                endpoints,
                fallback,
                codecs,
                cors,
                request_ids,
            }),
        }
    }

    /// Number of registered routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.inner.endpoints.len()
    }

    /// The codec registry.
    #[must_use]
    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.inner.codecs
    }

    /// Runs `request` through every stage and returns exactly one response.
    ///
    /// Dropping the future abandons the remaining stages; side effects of
    /// stages already run (a redeemed ticket) stay.
    pub async fn execute(&self, mut request: Request) -> Outcome {
        let _in_flight = InFlightGuard::new();
        let started = Instant::now();

        let request_id = self.inner.request_ids.assign(&mut request);
        request.attach_codecs(Arc::clone(&self.inner.codecs));

        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            method = %request.method(),
            path = %request.path(),
            route = tracing::field::Empty,
            status = tracing::field::Empty,
        );
        self.run(request, started).instrument(span).await
    }

    async fn run(&self, mut request: Request, started: Instant) -> Outcome {
        let mut trace = Trace {
            stages: vec![Stage::Received],
            route: None,
        };

        let (response, failure) = match self.stages(&mut request, &mut trace).await {
            Ok(response) => (response, None),
            Err(StageFailure { stage, error }) => {
                let route = trace.route.as_deref().unwrap_or(UNMATCHED_ROUTE);
                report(stage, &error, route);
                let response = Response::from_request_error(&error, &request);
                (response, Some(Failure { stage, kind: error.kind() }))
            }
        };

        let (response, failure) = match self.encode(&request, response) {
            Ok(response) => {
                trace.stages.push(Stage::Encoded);
                (response, failure)
            }
            Err(error) => {
                tracing::error!(error = %error, "response encoding failed");
                let kind = error.kind();
                let fallback = Response::from_request_error(&error, &request);
                let response = encode_with(fallback, self.inner.codecs.default_codec())
                    .unwrap_or_else(|_| plain_internal_error());
                (response, Some(Failure { stage: Stage::Encoded, kind }))
            }
        };

        let response = self.finish(&request, response);
        let status = response.status();
        tracing::Span::current().record("status", status.as_u16());

        let kind = failure.as_ref().map_or("ok", |f| f.kind.as_str());
        metrics::record_request(
            request.method().as_str(),
            trace.route.as_deref().unwrap_or(UNMATCHED_ROUTE),
            status.as_u16(),
            kind,
            started.elapsed(),
        );
        tracing::debug!(status = status.as_u16(), kind, elapsed = ?started.elapsed(), "request completed");

        Outcome {
            response,
            stages: trace.stages,
            failure,
            route: trace.route,
        }
    }

    async fn stages(&self, request: &mut Request, trace: &mut Trace) -> Result<Response, StageFailure> {
        proceed!(trace, Stage::Decoded, self.decode(request));

        let endpoint = proceed!(trace, Stage::Routed, self.route(request, trace));
        proceed!(trace, Stage::Authenticated, authenticate(endpoint, request).await);
        proceed!(trace, Stage::Validated, check(endpoint, request).await);

        let response = handle(&endpoint.route, request)
            .await
            .map_err(|error| StageFailure {
                stage: Stage::Handled,
                error,
            })?;
        trace.stages.push(Stage::Handled);
        Ok(response)
    }

    fn decode(&self, request: &mut Request) -> PipelineResult<Flow<()>> {
        if let Some(cors) = &self.inner.cors {
            if CorsPolicy::is_preflight(request) {
                return cors.preflight(request).map(Flow::Respond);
            }
        }

        let codec = self.inner.codecs.negotiate(request.header(header::ACCEPT))?;
        request.set_response_codec(codec);
        Ok(Flow::Continue(()))
    }

    fn route(&self, request: &mut Request, trace: &mut Trace) -> PipelineResult<Flow<&Endpoint>> {
        let Some(matched) = self.inner.router.match_route(request.method(), request.path()) else {
            return match &self.inner.fallback {
                Some(fallback) => Ok(Flow::Continue(fallback)),
                None => Err(PipelineError::NoMatch {
                    method: request.method().clone(),
                    path: request.path().to_string(),
                }),
            };
        };

        let endpoint = &self.inner.endpoints[*matched.value];
        let pattern = matched.pattern.as_str();
        tracing::Span::current().record("route", pattern);
        trace.route = Some(pattern.to_string());

        request
            .bind_path_params(matched.params)
            .map_err(|e| PipelineError::internal(e.to_string()))?;
        Ok(Flow::Continue(endpoint))
    }

    fn encode(&self, request: &Request, response: Response) -> PipelineResult<http::Response<BoxBody>> {
        let codec = request
            .response_codec()
            .unwrap_or_else(|| self.inner.codecs.default_codec());
        encode_with(response, codec)
    }

    fn finish(&self, request: &Request, mut response: http::Response<BoxBody>) -> http::Response<BoxBody> {
        let headers = response.headers_mut();
        if let Some(value) = RequestIdPolicy::header_value(request.request_id()) {
            headers.insert(REQUEST_ID_HEADER, value);
        }
        if let Some(cors) = &self.inner.cors {
            if !headers.contains_key(crate::cors::headers::ALLOW_ORIGIN) {
                cors.decorate(headers, request.header(header::ORIGIN));
            }
        }
        response
    }
}

fn encode_with(
    response: Response,
    codec: &hermes_codec::SharedCodec,
) -> PipelineResult<http::Response<BoxBody>> {
    let problem = response.is_problem();
    let (status, mut headers, body) = response.into_parts();

    let body = match body {
        ResponseBody::Empty => empty(),
        ResponseBody::Structured(value) => {
            let bytes = codec.encode(&value)?;
            let media_type = codec.media_type();
            let content_type = if problem && media_type.essence_str() == JSON {
                HeaderValue::from_static(PROBLEM_JSON)
            } else {
                HeaderValue::from_str(media_type.as_ref())
                    .map_err(|e| PipelineError::internal(e.to_string()))?
            };
            headers.insert(header::CONTENT_TYPE, content_type);
            full(bytes)
        }
        ResponseBody::Bytes { data, content_type } => {
            if let Some(content_type) = content_type {
                headers.insert(header::CONTENT_TYPE, content_type);
            }
            full(data)
        }
        ResponseBody::Stream { body, content_type } => {
            if let Some(content_type) = content_type {
                headers.insert(header::CONTENT_TYPE, content_type);
            }
            body
        }
    };

    let mut encoded = http::Response::new(body);
    *encoded.status_mut() = status;
    *encoded.headers_mut() = headers;
    Ok(encoded)
}

async fn authenticate(endpoint: &Endpoint, request: &mut Request) -> PipelineResult<Flow<()>> {
    let AuthPolicy::Required { scopes, .. } = endpoint.route.auth() else {
        return Ok(Flow::Continue(()));
    };

    let identity = authenticate_with(&endpoint.providers, request).await?;
    if !identity.has_any_scope(scopes) {
        return Err(PipelineError::forbidden(format!(
            "{} lacks one of the scopes [{}]",
            identity.principal(),
            scopes.join(", ")
        )));
    }

    tracing::debug!(identity = %identity.log_id(), "authenticated");
    request
        .attach_identity(identity)
        .map_err(|e| PipelineError::internal(e.to_string()))?;
    Ok(Flow::Continue(()))
}

async fn check(endpoint: &Endpoint, request: &mut Request) -> PipelineResult<Flow<()>> {
    let Some(constraints) = endpoint.route.constraints() else {
        return Ok(Flow::Continue(()));
    };

    let body = if constraints.reads_body() {
        request.body_value().await?.clone()
    } else {
        Value::Null
    };
    let input = Input {
        body: &body,
        path: request.path_params(),
        query: request.query(),
    };
    let payload =
        validate(input, constraints).map_err(|violations| PipelineError::ValidationFailed { violations })?;
    request.attributes_mut().insert(payload);
    Ok(Flow::Continue(()))
}

async fn handle(route: &Route, request: &mut Request) -> PipelineResult<Response> {
    for interceptor in route.before_chain() {
        if let Flow::Respond(response) = interceptor.before(request).await? {
            tracing::debug!(interceptor = interceptor.name(), "interceptor answered");
            return Ok(response);
        }
    }

    let mut response = route.handler().handle(request).await?;

    for interceptor in route.after_chain() {
        interceptor.after(request, &mut response).await?;
    }
    Ok(response)
}

fn report(stage: Stage, error: &PipelineError, route: &str) {
    match stage {
        Stage::Authenticated => metrics::record_auth_failure(route),
        Stage::Validated => metrics::record_validation_failure(route),
        _ => {}
    }

    if error.status().is_server_error() {
        tracing::warn!(stage = %stage, kind = %error.kind(), error = %error, "request failed");
    } else {
        tracing::debug!(stage = %stage, kind = %error.kind(), error = %error, "request failed");
    }
}

fn full(bytes: Bytes) -> BoxBody {
    Full::new(bytes).map_err(|never| match never {}).boxed_unsync()
}

fn empty() -> BoxBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync()
}

fn plain_internal_error() -> http::Response<BoxBody> {
    let mut response = http::Response::new(full(Bytes::from_static(b"internal server error")));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PipelineBuilder;
    use crate::handler::{handler_fn, Interceptor};
    use async_trait::async_trait;
    use hermes_auth::{AuthOutcome, AuthProvider};
    use hermes_core::{ErrorKind, Identity};
    use hermes_validation::{ConstraintSet, Field, ValidPayload};
    use http::Method;
    use serde_json::json;

    struct Static;

    #[async_trait]
    impl AuthProvider for Static {
        fn name(&self) -> &str {
            "static"
        }

        async fn authenticate(&self, request: &Request) -> AuthOutcome {
            match request.header("x-user") {
                Some(user) => AuthOutcome::Authenticated(
                    Identity::new(user, "static").with_scopes(["nodes:read"]),
                ),
                None => AuthOutcome::Absent,
            }
        }
    }

    struct Teapot;

    #[async_trait]
    impl Interceptor for Teapot {
        fn name(&self) -> &str {
            "teapot"
        }

        async fn before(&self, request: &mut Request) -> PipelineResult<Flow<()>> {
            if request.header("x-teapot").is_some() {
                return Ok(Flow::Respond(Response::new(StatusCode::IM_A_TEAPOT)));
            }
            Ok(Flow::Continue(()))
        }
    }

    struct Stamp;

    #[async_trait]
    impl Interceptor for Stamp {
        fn name(&self) -> &str {
            "stamp"
        }

        async fn after(&self, _request: &Request, response: &mut Response) -> PipelineResult<()> {
            response
                .headers_mut()
                .insert("x-stamp", HeaderValue::from_static("1"));
            Ok(())
        }
    }

    fn pipeline() -> Pipeline {
        let mut builder = PipelineBuilder::new();
        builder.provider(Static).unwrap();
        builder
            .register(
                Route::get(
                    "/nodes/{id}",
                    handler_fn(|request| {
                        Box::pin(async move {
                            let who = request
                                .identity()
                                .map(|i| i.principal().to_string())
                                .unwrap_or_default();
                            let id = request.path_param("id").unwrap_or_default().to_string();
                            Ok::<_, PipelineError>(Response::ok(json!({ "id": id, "by": who })))
                        })
                    }),
                )
                .before(Teapot)
                .after(Stamp),
            )
            .unwrap();
        builder
            .register(
                Route::get(
                    "/nodes/{id}/labels",
                    handler_fn(|request| {
                        Box::pin(async move {
                            let limit = request
                                .attributes()
                                .get::<ValidPayload>()
                                .and_then(|p| p.query_param("limit").cloned())
                                .unwrap_or(Value::Null);
                            Ok::<_, PipelineError>(Response::ok(json!({ "limit": limit })))
                        })
                    }),
                )
                .public()
                .validate(ConstraintSet::new().field(Field::query("limit").integer().range(Some(1.0), Some(100.0)))),
            )
            .unwrap();
        builder
            .register(
                Route::delete(
                    "/nodes/{id}",
                    handler_fn(|_request| {
                        Box::pin(async { Ok::<_, PipelineError>(Response::no_content()) })
                    }),
                )
                .scopes(["nodes:admin"]),
            )
            .unwrap();
        builder.build().unwrap()
    }

    fn get(uri: &str) -> http::request::Builder {
        http::Request::builder().method(Method::GET).uri(uri)
    }

    fn request(builder: http::request::Builder) -> Request {
        Request::from_http(builder.body(Empty::<Bytes>::new()).unwrap(), 1024)
    }

    async fn body(outcome: Outcome) -> Value {
        let bytes = outcome.response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_full_walk() {
        let outcome = pipeline()
            .execute(request(get("/nodes/n1").header("x-user", "ops")))
            .await;
        assert_eq!(outcome.status(), StatusCode::OK);
        assert_eq!(
            outcome.stages,
            vec![
                Stage::Received,
                Stage::Decoded,
                Stage::Routed,
                Stage::Authenticated,
                Stage::Validated,
                Stage::Handled,
                Stage::Encoded,
            ]
        );
        assert!(outcome.failure.is_none());
        assert_eq!(outcome.route.as_deref(), Some("/nodes/{id}"));
        assert_eq!(outcome.response.headers()["x-stamp"], "1");
        assert_eq!(outcome.response.headers()[header::CONTENT_TYPE], "application/json");
        assert!(outcome.response.headers().contains_key(REQUEST_ID_HEADER));
        assert_eq!(body(outcome).await, json!({ "id": "n1", "by": "ops" }));
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let outcome = pipeline().execute(request(get("/nodes/n1"))).await;
        assert_eq!(outcome.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            outcome.failure,
            Some(Failure {
                stage: Stage::Authenticated,
                kind: ErrorKind::Unauthenticated,
            })
        );
        assert!(!outcome.reached(Stage::Handled));
        assert!(outcome.reached(Stage::Encoded));
        assert_eq!(outcome.response.headers()[header::CONTENT_TYPE], PROBLEM_JSON);
        let problem = body(outcome).await;
        assert_eq!(problem["kind"], "unauthenticated");
        assert_eq!(problem["instance"], "/nodes/n1");
    }

    #[tokio::test]
    async fn test_missing_scope() {
        let outcome = pipeline()
            .execute(request(
                http::Request::builder()
                    .method(Method::DELETE)
                    .uri("/nodes/n1")
                    .header("x-user", "ops"),
            ))
            .await;
        assert_eq!(outcome.status(), StatusCode::FORBIDDEN);
        assert_eq!(outcome.failure.map(|f| f.kind), Some(ErrorKind::Forbidden));
    }

    #[tokio::test]
    async fn test_no_match() {
        let outcome = pipeline().execute(request(get("/clusters"))).await;
        assert_eq!(outcome.status(), StatusCode::NOT_FOUND);
        assert_eq!(outcome.stages, vec![Stage::Received, Stage::Decoded, Stage::Encoded]);
        assert!(outcome.route.is_none());
    }

    #[tokio::test]
    async fn test_not_acceptable_skips_routing() {
        let outcome = pipeline()
            .execute(request(get("/nodes/n1").header(header::ACCEPT, "application/xml")))
            .await;
        assert_eq!(outcome.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(outcome.stages, vec![Stage::Received, Stage::Encoded]);
        assert_eq!(
            outcome.failure,
            Some(Failure {
                stage: Stage::Decoded,
                kind: ErrorKind::NotAcceptable,
            })
        );
    }

    #[tokio::test]
    async fn test_interceptor_answers_early() {
        let outcome = pipeline()
            .execute(request(
                get("/nodes/n1").header("x-user", "ops").header("x-teapot", "yes"),
            ))
            .await;
        assert_eq!(outcome.status(), StatusCode::IM_A_TEAPOT);
        assert!(!outcome.response.headers().contains_key("x-stamp"));
        assert!(outcome.reached(Stage::Handled));
    }

    #[tokio::test]
    async fn test_public_route_with_coerced_query() {
        let outcome = pipeline()
            .execute(request(get("/nodes/n1/labels?limit=25")))
            .await;
        assert_eq!(outcome.status(), StatusCode::OK);
        assert!(outcome.reached(Stage::Authenticated));
        assert_eq!(body(outcome).await, json!({ "limit": 25 }));
    }

    #[tokio::test]
    async fn test_query_violation() {
        let outcome = pipeline()
            .execute(request(get("/nodes/n1/labels?limit=500")))
            .await;
        assert_eq!(outcome.status(), StatusCode::BAD_REQUEST);
        let problem = body(outcome).await;
        assert_eq!(problem["violations"][0]["field"], "query.limit");
        assert_eq!(problem["violations"][0]["constraint"], "range");
    }

    #[tokio::test]
    async fn test_fallback() {
        let pipeline = PipelineBuilder::new()
            .fallback(handler_fn(|request| {
                Box::pin(async move {
                    Ok::<_, PipelineError>(Response::ok(json!({ "spa": request.path() })))
                })
            }))
            .build()
            .unwrap();
        let outcome = pipeline.execute(request(get("/ui/settings"))).await;
        assert_eq!(outcome.status(), StatusCode::OK);
        assert!(outcome.route.is_none());
        assert_eq!(body(outcome).await, json!({ "spa": "/ui/settings" }));
    }

    #[tokio::test]
    async fn test_cors_preflight_and_decoration() {
        let pipeline = PipelineBuilder::new()
            .cors(CorsPolicy::new().allow_origin("https://console.example.com"))
            .fallback(handler_fn(|_request| {
                Box::pin(async { Ok::<_, PipelineError>(Response::no_content()) })
            }))
            .build()
            .unwrap();

        let preflight = pipeline
            .execute(request(
                http::Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/nodes")
                    .header(header::ORIGIN, "https://console.example.com")
                    .header("access-control-request-method", "POST"),
            ))
            .await;
        assert_eq!(preflight.status(), StatusCode::NO_CONTENT);
        assert!(!preflight.reached(Stage::Routed));
        assert!(preflight.reached(Stage::Decoded));

        let actual = pipeline
            .execute(request(get("/nodes").header(header::ORIGIN, "https://console.example.com")))
            .await;
        assert_eq!(
            actual.response.headers()["access-control-allow-origin"],
            "https://console.example.com"
        );
    }
}
