//! End-to-end request cycles over an in-memory connection.

mod common;

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::io::AsyncReadExt;

use ajp13_server::config::AjpConfig;
use ajp13_server::cycle::{CycleContext, Exchange, Handler, HandlerError};
use ajp13_server::net::ConnectionError;
use ajp13_server::protocol::{
    attr, prefix, PacketBuilder, ProtocolError, INBOUND_MAGIC, MAX_BODY_CHUNK_SIZE, MAX_SEND_BODY_CHUNK_SIZE,
};
use ajp13_server::session::{LongRunningKey, LongRunningRegistry};

use common::{body_chunk, body_of, context, control, read_reply, read_response, send, spawn_cycle, ForwardRequest, Reply};

/// Writes a fixed body.
struct Fixed(Vec<u8>);

impl Handler for Fixed {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange<'_>) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            exchange.set_header("Content-Type", "text/plain");
            exchange.write(&self.0).await?;
            Ok(())
        })
    }
}

/// Answers with the request body, plus its parameters as headers.
struct Mirror;

impl Handler for Mirror {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange<'_>) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            let body = exchange.read_to_end().await?;
            let params: Vec<_> = exchange.request().parameters.clone();
            for (name, value) in params {
                exchange.add_header(format!("X-Param-{}", name), value);
            }
            if let Some(session) = exchange.session_id().map(str::to_string) {
                exchange.set_header("X-Session", session);
            }
            exchange.write(&body).await?;
            Ok(())
        })
    }
}

/// Reports whether the request was admitted as long-running.
struct LongRunning;

impl Handler for LongRunning {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange<'_>) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            let admitted = exchange.register_long_running();
            exchange.set_header("X-Admitted", admitted.to_string());
            Ok(())
        })
    }
}

fn status_of(reply: &Reply) -> u16 {
    match reply {
        Reply::Headers { status, .. } => *status,
        other => panic!("expected SEND_HEADERS, got {:?}", other),
    }
}

#[tokio::test]
async fn get_request_round_trip() {
    let ctx = context(&AjpConfig::default(), Fixed(b"0123456789".to_vec()));
    let mut peer = spawn_cycle(ctx);

    let request = ForwardRequest::get("/app/foo?x=1").header("Host", "h").encode();
    send(&mut peer.stream, &request).await;

    let replies = read_response(&mut peer.stream).await;
    assert_eq!(replies.len(), 3);
    assert_eq!(status_of(&replies[0]), 200);
    assert_eq!(replies[0].header("Content-Type"), Some("text/plain"));
    assert_eq!(replies[1], Reply::Body(b"0123456789".to_vec()));
    assert_eq!(replies[2], Reply::End { reuse: true });

    // The connection is reusable.
    send(&mut peer.stream, &control(prefix::CPING)).await;
    assert_eq!(read_reply(&mut peer.stream).await, Reply::CPong);
}

#[tokio::test]
async fn form_post_parameters_are_merged() {
    let ctx = context(&AjpConfig::default(), Mirror);
    let mut peer = spawn_cycle(ctx);

    let request = ForwardRequest::post("/submit?x=1")
        .header("Content-Type", "application/x-www-form-urlencoded")
        .header("Content-Length", "7")
        .encode();
    send(&mut peer.stream, &request).await;
    send(&mut peer.stream, &body_chunk(b"a=1&b=2")).await;

    let replies = read_response(&mut peer.stream).await;
    assert_eq!(status_of(&replies[0]), 200);
    assert_eq!(replies[0].header("X-Param-x"), Some("1"));
    assert_eq!(replies[0].header("X-Param-a"), Some("1"));
    assert_eq!(replies[0].header("X-Param-b"), Some("2"));
    assert_eq!(body_of(&replies), b"a=1&b=2");
    assert_eq!(replies.last(), Some(&Reply::End { reuse: true }));
}

#[tokio::test]
async fn body_beyond_first_chunk_is_requested() {
    let ctx = context(&AjpConfig::default(), Mirror);
    let mut peer = spawn_cycle(ctx);

    let request = ForwardRequest::post("/upload")
        .header("Content-Type", "application/octet-stream")
        .header("Content-Length", "10")
        .encode();
    send(&mut peer.stream, &request).await;
    send(&mut peer.stream, &body_chunk(b"hello")).await;

    assert_eq!(read_reply(&mut peer.stream).await, Reply::GetBody(5));
    send(&mut peer.stream, &body_chunk(b"world")).await;

    let replies = read_response(&mut peer.stream).await;
    assert_eq!(body_of(&replies), b"helloworld");
    assert_eq!(replies.last(), Some(&Reply::End { reuse: true }));
}

#[tokio::test]
async fn chunked_body_ends_at_empty_chunk() {
    let ctx = context(&AjpConfig::default(), Mirror);
    let mut peer = spawn_cycle(ctx);

    let request = ForwardRequest::post("/stream")
        .header("Transfer-Encoding", "chunked")
        .encode();
    send(&mut peer.stream, &request).await;
    send(&mut peer.stream, &body_chunk(b"hello")).await;

    assert_eq!(read_reply(&mut peer.stream).await, Reply::GetBody(MAX_BODY_CHUNK_SIZE as u16));
    send(&mut peer.stream, &body_chunk(b"world")).await;
    assert_eq!(read_reply(&mut peer.stream).await, Reply::GetBody(MAX_BODY_CHUNK_SIZE as u16));
    send(&mut peer.stream, &body_chunk(b"")).await;

    let replies = read_response(&mut peer.stream).await;
    assert_eq!(body_of(&replies), b"helloworld");
    assert_eq!(replies.last(), Some(&Reply::End { reuse: true }));
}

#[tokio::test]
async fn session_from_other_route_is_replaced() {
    let mut config = AjpConfig::default();
    config.session.jvm_route = Some("node1".to_string());
    let ctx = context(&config, Mirror);
    let mut peer = spawn_cycle(ctx);

    let request = ForwardRequest::get("/app")
        .header("Cookie", "JSESSIONID=abc.node2")
        .encode();
    send(&mut peer.stream, &request).await;

    let replies = read_response(&mut peer.stream).await;
    let cookies = replies[0].header_values("Set-Cookie");
    assert_eq!(cookies.len(), 2);
    assert!(cookies[0].starts_with("JSESSIONID=abc.node2;"));
    assert!(cookies[0].contains("Max-Age=0"));
    assert!(cookies[1].starts_with("JSESSIONID="));
    assert!(!cookies[1].contains("Max-Age=0"));

    let session = replies[0].header("X-Session").unwrap();
    assert!(session.ends_with(".node1"));
    assert!(cookies[1].contains(session));
}

#[tokio::test]
async fn session_on_own_route_is_kept() {
    let mut config = AjpConfig::default();
    config.session.jvm_route = Some("node1".to_string());
    let ctx = context(&config, Mirror);
    let mut peer = spawn_cycle(ctx);

    let request = ForwardRequest::get("/app")
        .header("Cookie", "JSESSIONID=abc.node1")
        .encode();
    send(&mut peer.stream, &request).await;

    let replies = read_response(&mut peer.stream).await;
    assert!(replies[0].header_values("Set-Cookie").is_empty());
    assert_eq!(replies[0].header("X-Session"), Some("abc.node1"));
}

#[tokio::test]
async fn long_running_requests_are_deduplicated() {
    let registry = LongRunningRegistry::new();
    let key = LongRunningKey::new("alice", "127.0.0.1", 4000);
    assert!(registry.register(key.clone()));

    let ctx = context(&AjpConfig::default(), LongRunning).with_registry(registry.clone());
    let mut peer = spawn_cycle(ctx);
    let request = ForwardRequest::get("/report")
        .attribute(attr::REMOTE_USER, "alice")
        .req_attribute("AJP_REMOTE_PORT", "4000")
        .encode();

    send(&mut peer.stream, &request).await;
    let replies = read_response(&mut peer.stream).await;
    assert_eq!(replies[0].header("X-Admitted"), Some("false"));

    assert!(registry.deregister(&key));
    send(&mut peer.stream, &request).await;
    let replies = read_response(&mut peer.stream).await;
    assert_eq!(replies[0].header("X-Admitted"), Some("true"));

    // Released when the cycle resets, which precedes the next CPong.
    send(&mut peer.stream, &control(prefix::CPING)).await;
    assert_eq!(read_reply(&mut peer.stream).await, Reply::CPong);
    assert_eq!(registry.in_flight(), 0);
}

#[tokio::test]
async fn echo_header_is_copied_to_response() {
    let mut config = AjpConfig::default();
    config.request.echo_header = Some("X-Trace-Id".to_string());
    let ctx = context(&config, Fixed(Vec::new()));
    let mut peer = spawn_cycle(ctx);

    let request = ForwardRequest::get("/").header("X-Trace-Id", "t-42").encode();
    send(&mut peer.stream, &request).await;

    let replies = read_response(&mut peer.stream).await;
    assert_eq!(replies[0].header("X-Trace-Id"), Some("t-42"));
    assert_eq!(replies.len(), 2);
}

#[tokio::test]
async fn large_response_is_split_into_full_chunks() {
    let body: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
    let ctx = context(&AjpConfig::default(), Fixed(body.clone()));
    let mut peer = spawn_cycle(ctx);

    send(&mut peer.stream, &ForwardRequest::get("/big").encode()).await;
    let replies = read_response(&mut peer.stream).await;

    let sizes: Vec<usize> = replies
        .iter()
        .filter_map(|r| match r {
            Reply::Body(data) => Some(data.len()),
            _ => None,
        })
        .collect();
    assert_eq!(
        sizes,
        [MAX_SEND_BODY_CHUNK_SIZE, MAX_SEND_BODY_CHUNK_SIZE, 20_000 - 2 * MAX_SEND_BODY_CHUNK_SIZE]
    );
    assert_eq!(body_of(&replies), body);
}

#[tokio::test]
async fn oversized_form_closes_connection() {
    let mut config = AjpConfig::default();
    config.request.max_form_size = MAX_BODY_CHUNK_SIZE;
    let ctx = context(&config, Mirror);
    let mut peer = spawn_cycle(ctx);

    let request = ForwardRequest::post("/submit")
        .header("Content-Type", "application/x-www-form-urlencoded")
        .header("Content-Length", "100000")
        .encode();
    send(&mut peer.stream, &request).await;
    send(&mut peer.stream, &body_chunk(&[b'a'; 100])).await;

    let result = peer.task.await.unwrap();
    assert!(matches!(
        result,
        Err(ConnectionError::Protocol(ProtocolError::FormTooLarge { .. }))
    ));
}

#[tokio::test]
async fn truncated_forward_request_breaks_cycle() {
    let ctx = context(&AjpConfig::default(), Fixed(Vec::new()));
    let mut peer = spawn_cycle(ctx);

    // Prefix and method only.
    let mut builder = PacketBuilder::with_magic(INBOUND_MAGIC);
    builder.put_byte(prefix::FORWARD_REQUEST).put_byte(2);
    send(&mut peer.stream, &builder.finish()).await;

    let result = peer.task.await.unwrap();
    assert!(matches!(result, Err(ref e) if e.is_broken_cycle()));

    let mut rest = Vec::new();
    peer.stream.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn shared_registry_spans_connections() {
    let registry = LongRunningRegistry::new();
    let handler: Arc<dyn Handler> = Arc::new(LongRunning);
    let make = || {
        CycleContext::new(&AjpConfig::default(), Arc::clone(&handler))
            .with_registry(registry.clone())
    };
    let mut first = spawn_cycle(make());
    let mut second = spawn_cycle(make());
    let request = ForwardRequest::get("/report")
        .attribute(attr::REMOTE_USER, "bob")
        .req_attribute("AJP_REMOTE_PORT", "5000")
        .encode();

    send(&mut first.stream, &request).await;
    let replies = read_response(&mut first.stream).await;
    assert_eq!(replies[0].header("X-Admitted"), Some("true"));

    send(&mut first.stream, &control(prefix::CPING)).await;
    assert_eq!(read_reply(&mut first.stream).await, Reply::CPong);

    // The first request has completed, so its slot is free again.
    send(&mut second.stream, &request).await;
    let replies = read_response(&mut second.stream).await;
    assert_eq!(replies[0].header("X-Admitted"), Some("true"));
}
