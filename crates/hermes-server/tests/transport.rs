//! Transport tests over in-memory duplex streams and a real TCP listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hermes_core::{PipelineError, Response};
use hermes_pipeline::{handler_fn, PipelineBuilder, Route};
use hermes_server::{
    ProxyError, ProxyProtocolMode, Server, ServerConfig, ServerError, ServerResult, ShutdownSignal,
};
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

const PEER: &str = "10.0.0.2:40000";

struct Gate {
    entered: Notify,
    release: Notify,
}

fn server(config: ServerConfig, gate: Arc<Gate>) -> Server {
    let mut builder = PipelineBuilder::new();
    builder
        .register(
            Route::get(
                "/whoami",
                handler_fn(|request| {
                    Box::pin(async move {
                        let connection = request.connection();
                        Ok::<_, PipelineError>(Response::ok(json!({
                            "peer": connection.peer_addr.map(|a| a.to_string()),
                            "client": connection.client_addr.map(|a| a.to_string()),
                            "scheme": connection.scheme,
                            "host": connection.host,
                        })))
                    })
                }),
            )
            .public(),
        )
        .unwrap()
        .register(
            Route::post(
                "/echo",
                handler_fn(|request| {
                    Box::pin(async move {
                        let body = request.body_value().await?.clone();
                        Ok::<_, PipelineError>(Response::ok(body))
                    })
                }),
            )
            .public(),
        )
        .unwrap()
        .register(
            Route::get(
                "/slow",
                handler_fn(move |_request| {
                    let gate = Arc::clone(&gate);
                    Box::pin(async move {
                        gate.entered.notify_one();
                        gate.release.notified().await;
                        Ok::<_, PipelineError>(Response::no_content())
                    })
                }),
            )
            .public(),
        )
        .unwrap();
    Server::new(config, builder.build().unwrap())
}

fn gate() -> Arc<Gate> {
    Arc::new(Gate {
        entered: Notify::new(),
        release: Notify::new(),
    })
}

fn accept(server: &Server) -> (tokio::io::DuplexStream, JoinHandle<ServerResult<()>>) {
    let (client, io) = tokio::io::duplex(64 * 1024);
    let server = server.clone();
    let peer: SocketAddr = PEER.parse().unwrap();
    let handle =
        tokio::spawn(async move { server.serve_connection(io, peer, ShutdownSignal::new()).await });
    (client, handle)
}

async fn handshake<IO>(io: IO) -> SendRequest<Full<Bytes>>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sender, conn) = http1::handshake(TokioIo::new(io)).await.unwrap();
    tokio::spawn(async move {
        let _ = conn.await;
    });
    sender
}

async fn open(server: &Server, preface: &[u8]) -> (SendRequest<Full<Bytes>>, JoinHandle<ServerResult<()>>) {
    let (mut client, handle) = accept(server);
    client.write_all(preface).await.unwrap();
    (handshake(client).await, handle)
}

fn get(path: &str, headers: &[(&str, &str)]) -> http::Request<Full<Bytes>> {
    let mut builder = http::Request::get(path).header("host", "api.internal");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Full::new(Bytes::new())).unwrap()
}

async fn json_body(response: http::Response<hyper::body::Incoming>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn v2_header(client: [u8; 4], port: u16) -> Vec<u8> {
    let mut out = b"\r\n\r\n\0\r\nQUIT\n".to_vec();
    out.extend_from_slice(&[0x21, 0x11, 0x00, 0x0C]);
    out.extend_from_slice(&client);
    out.extend_from_slice(&[10, 0, 0, 1]);
    out.extend_from_slice(&port.to_be_bytes());
    out.extend_from_slice(&8080u16.to_be_bytes());
    out
}

#[tokio::test]
async fn plain_request_reports_socket_peer() {
    let server = server(ServerConfig::default(), gate());
    let (mut sender, _handle) = open(&server, b"").await;

    let response = sender.send_request(get("/whoami", &[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = json_body(response).await;
    assert_eq!(body["peer"], PEER);
    assert_eq!(body["client"], PEER);
    assert_eq!(body["scheme"], "http");
    assert_eq!(body["host"], "api.internal");
}

#[tokio::test]
async fn proxy_v1_header_names_the_client() {
    let config = ServerConfig::builder()
        .proxy_protocol(ProxyProtocolMode::Enabled)
        .build();
    let server = server(config, gate());
    let (mut sender, _handle) =
        open(&server, b"PROXY TCP4 192.0.2.10 10.0.0.1 51000 8080\r\n").await;

    let body = json_body(sender.send_request(get("/whoami", &[])).await.unwrap()).await;
    assert_eq!(body["peer"], PEER);
    assert_eq!(body["client"], "192.0.2.10:51000");

    // Later requests on the same connection keep the proxied client.
    let body = json_body(sender.send_request(get("/whoami", &[])).await.unwrap()).await;
    assert_eq!(body["client"], "192.0.2.10:51000");
}

#[tokio::test]
async fn proxy_v2_detected_in_auto_mode() {
    let config = ServerConfig::builder()
        .proxy_protocol(ProxyProtocolMode::Auto)
        .build();
    let server = server(config, gate());
    let (mut sender, _handle) = open(&server, &v2_header([203, 0, 113, 7], 6000)).await;

    let body = json_body(sender.send_request(get("/whoami", &[])).await.unwrap()).await;
    assert_eq!(body["client"], "203.0.113.7:6000");
}

#[tokio::test]
async fn auto_mode_accepts_plain_http() {
    let config = ServerConfig::builder()
        .proxy_protocol(ProxyProtocolMode::Auto)
        .build();
    let server = server(config, gate());
    let (mut sender, _handle) = open(&server, b"").await;

    let body = json_body(sender.send_request(get("/whoami", &[])).await.unwrap()).await;
    assert_eq!(body["client"], PEER);
}

#[tokio::test]
async fn enabled_mode_drops_connections_without_header() {
    let config = ServerConfig::builder()
        .proxy_protocol(ProxyProtocolMode::Enabled)
        .build();
    let server = server(config, gate());
    let (mut client, handle) = accept(&server);

    client
        .write_all(b"GET /whoami HTTP/1.1\r\nhost: x\r\n\r\n")
        .await
        .unwrap();
    let result = handle.await.unwrap();
    assert!(matches!(result, Err(ServerError::Proxy(ProxyError::Missing))));
}

#[tokio::test]
async fn forwarded_headers_from_trusted_peer() {
    let config = ServerConfig::builder()
        .trusted_proxy("10.0.0.0/8".parse().unwrap())
        .build();
    let server = server(config, gate());
    let (mut sender, _handle) = open(&server, b"").await;

    let request = get(
        "/whoami",
        &[
            ("x-forwarded-for", "198.51.100.20"),
            ("x-forwarded-proto", "https"),
            ("x-forwarded-host", "api.example.com"),
        ],
    );
    let body = json_body(sender.send_request(request).await.unwrap()).await;
    assert_eq!(body["client"], "198.51.100.20:0");
    assert_eq!(body["scheme"], "https");
    assert_eq!(body["host"], "api.example.com");
}

#[tokio::test]
async fn forwarded_headers_from_untrusted_peer_ignored() {
    let server = server(ServerConfig::default(), gate());
    let (mut sender, _handle) = open(&server, b"").await;

    let request = get("/whoami", &[("x-forwarded-for", "198.51.100.20")]);
    let body = json_body(sender.send_request(request).await.unwrap()).await;
    assert_eq!(body["client"], PEER);
}

#[tokio::test]
async fn oversized_body_gets_413_and_close() {
    let config = ServerConfig::builder().max_content_length(16).build();
    let server = server(config, gate());
    let (mut sender, handle) = open(&server, b"").await;

    let body = json!({ "padding": "x".repeat(64) }).to_string();
    let request = http::Request::post("/echo")
        .header("host", "api.internal")
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap();
    let response = sender.send_request(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.headers()["connection"], "close");
    assert_eq!(response.headers()["content-type"], "application/problem+json");
    let problem = json_body(response).await;
    assert_eq!(problem["kind"], "payload_too_large");

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("connection should close")
        .unwrap()
        .ok();
}

#[tokio::test]
async fn body_within_limit_reaches_handler() {
    let config = ServerConfig::builder().max_content_length(1024).build();
    let server = server(config, gate());
    let (mut sender, _handle) = open(&server, b"").await;

    let request = http::Request::post("/echo")
        .header("host", "api.internal")
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from_static(br#"{"name":"n1"}"#)))
        .unwrap();
    let response = sender.send_request(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["name"], "n1");
}

#[tokio::test]
async fn excess_in_flight_requests_get_503() {
    let gate = gate();
    let config = ServerConfig::builder().max_in_flight(Some(1)).build();
    let server = server(config, Arc::clone(&gate));

    let (mut slow, _slow_handle) = open(&server, b"").await;
    let pending = tokio::spawn(async move { slow.send_request(get("/slow", &[])).await });
    gate.entered.notified().await;

    let (mut fast, _fast_handle) = open(&server, b"").await;
    let response = fast.send_request(get("/whoami", &[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["kind"], "service_unavailable");

    gate.release.notify_one();
    let response = pending.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // The slot is free again.
    let response = fast.send_request(get("/whoami", &[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn idle_connection_closed() {
    let config = ServerConfig::builder()
        .idle_timeout(Duration::from_millis(100))
        .build();
    let server = server(config, gate());
    let (mut sender, handle) = open(&server, b"").await;

    let response = sender.send_request(get("/whoami", &[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("idle connection should close")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn keep_alive_disabled_closes_after_one_exchange() {
    let config = ServerConfig::builder().keep_alive(false).build();
    let server = server(config, gate());
    let (mut sender, handle) = open(&server, b"").await;

    let response = sender.send_request(get("/whoami", &[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let _ = json_body(response).await;

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("connection should close")
        .unwrap()
        .ok();
}

#[tokio::test]
async fn listener_serves_until_shutdown() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ServerConfig::builder()
        .shutdown_timeout(Duration::from_secs(1))
        .build();
    let server = server(config, gate());

    let shutdown = ShutdownSignal::new();
    let running = tokio::spawn(server.serve(listener, shutdown.clone()));

    let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let mut sender = handshake(stream).await;
    let body = json_body(sender.send_request(get("/whoami", &[])).await.unwrap()).await;
    assert_eq!(body["peer"], body["client"]);

    shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("server should stop")
        .unwrap();
    assert!(result.is_ok());
}
