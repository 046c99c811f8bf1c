mod common;

use std::fs;
use std::sync::Arc;

use lantern::acl::{AccessControl, Acl};
use lantern::config::{Config, HostConfig};
use lantern::context::ServerContext;
use lantern::http::connection::{Processed, SendOutcome};
use lantern::http::error::ConnectionError;
use lantern::http::state::{ClientInfo, Mode};

use common::{
    MockTransport, ReadStep, config_for, connection, context, dechunk, exchange, gunzip, header,
    owner_of, split_response, status_code,
};

fn request(ctx: Arc<ServerContext>, raw: &[u8]) -> (SendOutcome, String, Vec<u8>) {
    let mut conn = connection(ctx);
    let mut io = MockTransport::new();
    io.push_read(raw);
    let outcome = exchange(&mut conn, &mut io);
    let (head, body) = split_response(&io.written);
    (outcome, head, body)
}

fn text(body: &[u8]) -> String {
    String::from_utf8(body.to_vec()).unwrap()
}

fn default_context() -> (tempfile::TempDir, Arc<ServerContext>) {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("index.html"), "<html>hi</html>").unwrap();
    let ctx = context(config_for(dir.path()));
    (dir, ctx)
}

fn with_hosts() -> (tempfile::TempDir, Arc<ServerContext>) {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config_for(dir.path());
    cfg.server.hostname = "parent".to_string();
    cfg.server.guid = "parent-guid".to_string();
    cfg.hosts.push(HostConfig {
        hostname: "child".to_string(),
        guid: "child-guid".to_string(),
        update_every: 2,
    });
    (dir, context(cfg))
}

struct Only(&'static [Acl]);

impl AccessControl for Only {
    fn allows(&self, acl: Acl, _client: &ClientInfo) -> bool {
        self.0.contains(&acl)
    }
}

#[test]
fn test_keep_alive_serves_sequential_requests() {
    let (_dir, ctx) = default_context();
    let mut conn = connection(ctx);
    let mut io = MockTransport::new();

    io.push_read(
        b"GET /api/v1/info HTTP/1.1\r\nConnection: keep-alive\r\nAccept-Encoding: gzip\r\n\r\n",
    );
    assert_eq!(exchange(&mut conn, &mut io), SendOutcome::Completed);

    let state = conn.state();
    assert_eq!(state.mode, Mode::Normal);
    assert!(state.url.is_none());
    assert!(state.gzip.is_none());
    assert!(state.inbound.is_empty());
    assert!(state.last_url.is_empty());
    assert!(state.response.data.is_empty());
    assert_eq!(state.sent, 0);
    assert!(state.wait_receive);
    assert!(!state.wait_send);

    let (head, body) = split_response(&io.take_written());
    assert_eq!(header(&head, "Content-Encoding"), Some("gzip"));
    let (compressed, _) = dechunk(&body);
    let first = text(&gunzip(&compressed));
    assert!(first.contains("\"hostname\":\"localhost\""));

    io.push_read(b"GET /index.html HTTP/1.1\r\nConnection: keep-alive\r\n\r\n");
    assert_eq!(exchange(&mut conn, &mut io), SendOutcome::Completed);
    let (head, body) = split_response(&io.take_written());
    assert_eq!(status_code(&head), 200);
    assert_eq!(header(&head, "Content-Encoding"), None);
    assert_eq!(header(&head, "Content-Length"), Some("15"));
    assert_eq!(body, b"<html>hi</html>");
    assert_eq!(conn.mode(), Mode::Normal);
}

#[test]
fn test_connection_close_ends_connection() {
    let (_dir, ctx) = default_context();
    let (outcome, head, _) = request(ctx, b"GET /index.html HTTP/1.1\r\n\r\n");

    assert_eq!(outcome, SendOutcome::Closed);
    assert_eq!(header(&head, "Connection"), Some("close"));
}

#[test]
fn test_request_split_over_reads() {
    let (_dir, ctx) = default_context();
    let mut conn = connection(ctx);
    let mut io = MockTransport::new();
    io.push_read(b"GET /index");
    io.push_read(b".html HTTP/1.1\r\nHo");
    io.push_read(b"st: a\r\n\r\n");

    assert_eq!(exchange(&mut conn, &mut io), SendOutcome::Closed);
    let (head, body) = split_response(&io.written);
    assert_eq!(status_code(&head), 200);
    assert_eq!(body, b"<html>hi</html>");
}

#[test]
fn test_host_switch_by_name_and_guid() {
    let (_dir, ctx) = with_hosts();

    for url in ["/host/child/api/v1/info", "/host/child-guid/api/v1/info"] {
        let raw = format!("GET {url} HTTP/1.1\r\n\r\n");
        let (_, head, body) = request(Arc::clone(&ctx), raw.as_bytes());
        assert_eq!(status_code(&head), 200, "{url}");
        let body = text(&body);
        assert!(body.contains("\"hostname\":\"child\""), "{body}");
        assert!(body.contains("\"update_every\":2"), "{body}");
    }

    let (_, _, body) = request(ctx, b"GET /api/v1/info HTTP/1.1\r\n\r\n");
    assert!(text(&body).contains("\"hostname\":\"parent\""));
}

#[test]
fn test_host_switch_with_query() {
    let (_dir, ctx) = with_hosts();
    let (_, head, body) = request(ctx, b"GET /host/child/api/v1/charts?all=1 HTTP/1.1\r\n\r\n");

    assert_eq!(status_code(&head), 200);
    assert!(text(&body).contains("\"hostname\":\"child\""));
}

#[test]
fn test_unknown_host() {
    let (_dir, ctx) = with_hosts();
    let (_, head, body) = request(ctx, b"GET /host/<nope>/api/v1/info HTTP/1.1\r\n\r\n");

    assert_eq!(status_code(&head), 404);
    assert_eq!(
        text(&body),
        "This server does not maintain a database for host: &lt;nope&gt;"
    );
}

#[test]
fn test_nested_host_switch_refused() {
    let (_dir, ctx) = with_hosts();
    let (_, head, body) = request(
        ctx,
        b"GET /host/child/host/parent/api/v1/info HTTP/1.1\r\n\r\n",
    );

    assert_eq!(status_code(&head), 400);
    assert_eq!(text(&body), "Nesting of hosts is not allowed.");
}

#[test]
fn test_api_version_checks() {
    let (_dir, ctx) = default_context();

    let (_, head, body) = request(Arc::clone(&ctx), b"GET /api HTTP/1.1\r\n\r\n");
    assert_eq!(status_code(&head), 400);
    assert_eq!(text(&body), "Which API version?");

    let (_, head, body) = request(Arc::clone(&ctx), b"GET /api/v2/info HTTP/1.1\r\n\r\n");
    assert_eq!(status_code(&head), 404);
    assert_eq!(text(&body), "Unsupported API version: v2");

    let (_, head, body) = request(Arc::clone(&ctx), b"GET /api/v1/data HTTP/1.1\r\n\r\n");
    assert_eq!(status_code(&head), 400);
    assert_eq!(text(&body), "Which API command?");

    let (_, head, _) = request(ctx, b"GET /api/v1/alarms?all HTTP/1.1\r\n\r\n");
    assert_eq!(status_code(&head), 404);
}

#[test]
fn test_api_info_payload() {
    let (_dir, ctx) = default_context();
    let (_, head, body) = request(ctx, b"GET /api/v1/info HTTP/1.1\r\n\r\n");

    assert_eq!(header(&head, "Content-Type"), Some("application/json; charset=utf-8"));
    assert_eq!(header(&head, "Cache-Control"), Some("no-cache"));
    let info: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(info["hostname"], "localhost");
    assert_eq!(info["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_api_requires_dashboard_or_management() {
    let dir = tempfile::tempdir().unwrap();
    let owner = owner_of(dir.path());
    let ctx = Arc::new(
        ServerContext::new(config_for(dir.path()))
            .with_owner(owner)
            .with_access(Only(&[Acl::Registry])),
    );

    let (_, head, body) = request(ctx, b"GET /api/v1/info HTTP/1.1\r\n\r\n");
    assert_eq!(status_code(&head), 403);
    assert_eq!(text(&body), "You are not allowed to access this resource.");
}

#[test]
fn test_management_access_is_enough_for_api() {
    let dir = tempfile::tempdir().unwrap();
    let owner = owner_of(dir.path());
    let ctx = Arc::new(
        ServerContext::new(config_for(dir.path()))
            .with_owner(owner)
            .with_access(Only(&[Acl::Management])),
    );

    let (_, head, _) = request(ctx, b"GET /api/v1/info HTTP/1.1\r\n\r\n");
    assert_eq!(status_code(&head), 200);
}

#[test]
fn test_no_web_access_at_all() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Arc::new(ServerContext::new(config_for(dir.path())).with_access(Only(&[Acl::Stream])));

    let (_, head, body) = request(Arc::clone(&ctx), b"GET /index.html HTTP/1.1\r\n\r\n");
    assert_eq!(status_code(&head), 403);
    assert_eq!(text(&body), "You are not allowed to access this resource.");

    let (_, head, _) = request(ctx, b"OPTIONS / HTTP/1.1\r\n\r\n");
    assert_eq!(status_code(&head), 403);
}

#[test]
fn test_options_preflight() {
    let (_dir, ctx) = default_context();
    let (_, head, body) = request(
        ctx,
        b"OPTIONS /api/v1/data HTTP/1.1\r\nOrigin: https://app.example.org\r\n\r\n",
    );

    assert_eq!(status_code(&head), 200);
    assert_eq!(body, b"OK");
    assert_eq!(header(&head, "Access-Control-Allow-Origin"), Some("https://app.example.org"));
    assert_eq!(header(&head, "Access-Control-Allow-Methods"), Some("GET, OPTIONS"));
    assert_eq!(header(&head, "Cache-Control"), None);
}

#[test]
fn test_stream_is_handed_off() {
    let (_dir, ctx) = default_context();
    let mut conn = connection(ctx);
    let mut io = MockTransport::new();
    io.push_read(b"STREAM /stream?key=k&hostname=child HTTP/1.1\r\nUser-Agent: child/1.0\r\n\r\n");

    conn.receive(&mut io).unwrap();
    match conn.process_request().unwrap() {
        Processed::HandOff(request) => {
            assert_eq!(request.url, "/stream?key=k&hostname=child");
            assert_eq!(request.user_agent.as_deref(), Some("child/1.0"));
            assert_eq!(request.param("hostname"), Some("child"));
            assert_eq!(request.client, common::client());
        }
        other => panic!("expected hand-off, got {other:?}"),
    }
    assert!(io.written.is_empty());
}

#[test]
fn test_stream_requires_stream_access() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config_for(dir.path());
    cfg.access.stream = false;
    let (_, head, body) = request(context(cfg), b"STREAM /stream?key=k HTTP/1.1\r\n\r\n");

    assert_eq!(status_code(&head), 403);
    assert_eq!(text(&body), "You are not allowed to access this resource.");
}

#[test]
fn test_plain_text_stream_torn_down_when_encryption_forced() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config_for(dir.path());
    cfg.tls.force_stream = true;
    let mut conn = connection(context(cfg));
    let mut io = MockTransport::new();
    io.push_read(b"STREAM /stream?key=k HTTP/1.1\r\n\r\n");

    conn.receive(&mut io).unwrap();
    assert!(matches!(
        conn.process_request(),
        Err(ConnectionError::EncryptionRequired)
    ));
}

#[test]
fn test_https_redirect() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config_for(dir.path());
    cfg.tls.force_http = true;
    let (_, head, body) = request(
        context(cfg),
        b"GET /index.html?x=1 HTTP/1.1\r\nHost: dash.example.org\r\n\r\n",
    );

    assert_eq!(status_code(&head), 301);
    assert_eq!(
        header(&head, "Location"),
        Some("https://dash.example.org/index.html?x=1")
    );
    assert_eq!(header(&head, "Content-Type"), Some("text/html; charset=utf-8"));
    assert!(text(&body).starts_with("<!DOCTYPE html>"));
}

#[test]
fn test_config_dump() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_for(dir.path());
    let (_, head, _) = request(context(cfg.clone()), b"GET /lantern.conf HTTP/1.1\r\n\r\n");
    assert_eq!(status_code(&head), 403);

    let mut cfg = cfg;
    cfg.access.config = true;
    let (_, head, body) = request(context(cfg), b"GET /lantern.conf HTTP/1.1\r\n\r\n");
    assert_eq!(status_code(&head), 200);
    assert_eq!(header(&head, "Content-Type"), Some("text/plain; charset=utf-8"));

    let dumped = Config::from_yaml(&text(&body)).unwrap();
    assert!(dumped.access.config);
    assert_eq!(dumped.server.web_dir, dir.path());
}

#[test]
fn test_malformed_request() {
    let (_dir, ctx) = default_context();
    let (outcome, head, body) = request(ctx, b"DELETE / HTTP/1.1\r\nConnection: keep-alive\r\n\r\n");

    assert_eq!(outcome, SendOutcome::Closed);
    assert_eq!(status_code(&head), 400);
    assert_eq!(text(&body), "I don't understand you...\r\n");
}

#[test]
fn test_oversize_request() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config_for(dir.path());
    cfg.server.max_request_size = 100;
    let mut raw = b"GET /".to_vec();
    raw.extend(std::iter::repeat_n(b'x', 200));

    let (outcome, head, body) = request(context(cfg), &raw);
    assert_eq!(outcome, SendOutcome::Closed);
    assert_eq!(status_code(&head), 400);
    assert_eq!(text(&body), "Received request is too big (205 bytes).\r\n");
}

#[test]
fn test_peer_close_is_reported() {
    let (_dir, ctx) = default_context();
    let mut conn = connection(ctx);
    let mut io = MockTransport::new();
    io.reads.push_back(ReadStep::Eof);

    let err = conn.receive(&mut io).unwrap_err();
    assert!(matches!(err, ConnectionError::PeerClosed));
    assert!(err.is_disconnect());
}

#[test]
fn test_missing_static_file() {
    let (_dir, ctx) = default_context();
    let (_, head, body) = request(ctx, b"GET /missing.css HTTP/1.1\r\n\r\n");

    assert_eq!(status_code(&head), 404);
    assert_eq!(header(&head, "Cache-Control"), Some("no-cache"));
    assert!(text(&body).starts_with("File does not exist, or is not accessible: "));
}

#[test]
fn test_non_ascii_path_is_refused_not_fatal() {
    let (_dir, ctx) = default_context();

    let (_, head, body) = request(Arc::clone(&ctx), b"GET /a/%C3%A9/x HTTP/1.1\r\n\r\n");
    assert_eq!(status_code(&head), 400);
    assert!(text(&body).starts_with("Filename contains invalid characters: "));

    let (_, head, _) = request(ctx, b"GET /host/%C3%A9/api/v1/info HTTP/1.1\r\n\r\n");
    assert_eq!(status_code(&head), 404);
}

#[test]
fn test_echoed_headers_carry_no_bare_carriage_return() {
    let (_dir, ctx) = default_context();
    let (_, head, _) = request(
        ctx,
        b"GET /index.html HTTP/1.1\r\nOrigin: x\rInjected: y\r\nHost: h\rX: 1\r\n\r\n",
    );

    assert_eq!(header(&head, "Access-Control-Allow-Origin"), Some("x Injected: y"));
    assert_eq!(header(&head, "Injected"), None);
    let bytes = head.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\r' {
            assert_eq!(bytes.get(i + 1), Some(&b'\n'), "bare CR at {i}");
        }
    }
}
