//! A service assembled from a configuration file and served over TCP.

use std::net::SocketAddr;

use bytes::Bytes;
use chrono::{Duration, Utc};
use hermes::prelude::*;
use hermes::Hermes;
use http::{header, Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const CONFIG: &str = r#"
[server]
http_addr = "127.0.0.1:0"
shutdown_timeout_secs = 1

[auth.bearer]
issuer = "nodes-api"
secret = "0123456789abcdef0123456789abcdef"
access_ttl_secs = 60
refresh_ttl_secs = 3600

[auth.basic]
realm = "nodes-api"

[[auth.basic.users]]
username = "operator"
password = "correct horse"
scopes = ["nodes:read"]

[auth.ticket]
ttl_secs = 30

[cors]
enabled = true
allowed_origins = ["https://console.example.com"]

[logging]
enabled = false
"#;

fn app() -> Hermes {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hermes.toml");
    std::fs::write(&path, CONFIG).unwrap();

    let config = ConfigLoader::new().with_file(&path).unwrap().load().unwrap();
    Hermes::from_config(config).unwrap()
}

fn pipeline(app: &Hermes) -> Pipeline {
    let mut builder = app.pipeline_builder().unwrap();
    builder
        .register(
            Route::get(
                "/nodes/{id}",
                handler_fn(|request| {
                    Box::pin(async move {
                        let id = request.path_param("id").unwrap_or_default().to_string();
                        Ok::<_, PipelineError>(Response::ok(json!({ "id": id })))
                    })
                }),
            )
            .providers(["bearer", "basic"])
            .scopes(["nodes:read"]),
        )
        .unwrap()
        .register(
            Route::get(
                "/events",
                handler_fn(|request| {
                    Box::pin(async move {
                        let principal = request
                            .identity()
                            .map(|i| i.principal().to_string())
                            .unwrap_or_default();
                        Ok::<_, PipelineError>(Response::ok(json!({ "subscriber": principal })))
                    })
                }),
            )
            .providers(["ticket"]),
        )
        .unwrap();
    builder.build().unwrap()
}

async fn start(app: &Hermes) -> (SocketAddr, ShutdownSignal, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = app.server(pipeline(app)).unwrap();
    let shutdown = ShutdownSignal::new();
    let signal = shutdown.clone();
    let handle = tokio::spawn(async move {
        server.serve(listener, signal).await.unwrap();
    });
    (addr, shutdown, handle)
}

async fn send(addr: SocketAddr, request: http::Request<Full<Bytes>>) -> (StatusCode, http::HeaderMap, Value) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut sender, conn) = http1::handshake(TokioIo::new(stream)).await.unwrap();
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let response = sender.send_request(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, headers, value)
}

fn get(path: &str, headers: &[(&str, &str)]) -> http::Request<Full<Bytes>> {
    let mut builder = http::Request::get(path).header(header::HOST, "api.test");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Full::new(Bytes::new())).unwrap()
}

#[tokio::test]
async fn bearer_token_from_configured_provider() {
    let app = app();
    let bearer = app.providers().bearer().unwrap().clone();
    let (addr, shutdown, handle) = start(&app).await;

    let token = bearer.issue("alice", &["nodes:read"]).unwrap();
    let auth = format!("Bearer {token}");
    let (status, headers, body) = send(addr, get("/nodes/n1", &[("authorization", &auth)])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "id": "n1" }));
    assert!(headers.contains_key("x-request-id"));

    let expired = bearer
        .issue_at("alice", &["nodes:read"], Utc::now() - Duration::seconds(120))
        .unwrap();
    let auth = format!("Bearer {expired}");
    let (status, headers, body) = send(addr, get("/nodes/n1", &[("authorization", &auth)])).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(headers[header::CONTENT_TYPE], "application/problem+json");
    assert_eq!(body["status"], 401);

    let narrow = bearer.issue("bob", &["nodes:write"]).unwrap();
    let auth = format!("Bearer {narrow}");
    let (status, _, _) = send(addr, get("/nodes/n1", &[("authorization", &auth)])).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn refresh_token_renews_but_never_authenticates() {
    let app = app();
    let bearer = app.providers().bearer().unwrap().clone();
    let (addr, shutdown, handle) = start(&app).await;

    let pair = bearer.issue_pair("alice", &["nodes:read"]).unwrap();
    assert_eq!(pair.refresh_expires_in, 3600);

    let auth = format!("Bearer {}", pair.refresh_token);
    let (status, _, body) = send(addr, get("/nodes/n1", &[("authorization", &auth)])).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "unauthenticated");

    let renewed = bearer.refresh(&pair.refresh_token).unwrap();
    let auth = format!("Bearer {}", renewed.access_token);
    let (status, _, body) = send(addr, get("/nodes/n1", &[("authorization", &auth)])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "id": "n1" }));

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn basic_credentials_from_configured_users() {
    let app = app();
    assert!(app.providers().credentials().unwrap().contains("operator"));
    let (addr, shutdown, handle) = start(&app).await;

    // base64("operator:correct horse")
    let good = "Basic b3BlcmF0b3I6Y29ycmVjdCBob3JzZQ==";
    let (status, _, body) = send(addr, get("/nodes/n1", &[("authorization", good)])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "id": "n1" }));

    // base64("operator:wrong")
    let bad = "Basic b3BlcmF0b3I6d3Jvbmc=";
    let (status, headers, _) = send(addr, get("/nodes/n1", &[("authorization", bad)])).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(headers.contains_key(header::WWW_AUTHENTICATE));

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn ticket_redeems_once() {
    let app = app();
    let store = app.providers().tickets().unwrap().clone();
    let (addr, shutdown, handle) = start(&app).await;

    let ticket = store.issue("carol", &[]).await.unwrap();
    let path = format!("/events?ticket={}", ticket.id);

    let (status, _, body) = send(addr, get(&path, &[])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subscriber"], "carol");

    let (status, _, _) = send(addr, get(&path, &[])).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn configured_cors_preflight() {
    let app = app();
    let (addr, shutdown, handle) = start(&app).await;

    let preflight = http::Request::builder()
        .method(Method::OPTIONS)
        .uri("/nodes/n1")
        .header(header::HOST, "api.test")
        .header(header::ORIGIN, "https://console.example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let (status, headers, _) = send(addr, preflight).await;
    assert!(status.is_success());
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://console.example.com"
    );

    let foreign = http::Request::builder()
        .method(Method::OPTIONS)
        .uri("/nodes/n1")
        .header(header::HOST, "api.test")
        .header(header::ORIGIN, "https://evil.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let (status, _, _) = send(addr, foreign).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    shutdown.trigger();
    handle.await.unwrap();
}
