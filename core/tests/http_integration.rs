/*
 * http_integration.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * Integration tests for the HTTP client against scripted loopback servers:
 * wire serialization, body framing, keep-alive pooling, redirect chains,
 * and error surfacing. One real-network TLS test is kept behind --ignored.
 *
 * Run with:
 *   cargo test -p corriere_core --test http_integration
 */

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use corriere_core::http::{HttpClient, HttpClientConfig, PoolStats, Request};
use corriere_core::HttpError;

/// Read one request head (through CRLFCRLF); any body bytes sent in the same
/// segments are included in the returned buffer.
async fn read_head(sock: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    loop {
        let n = sock.read(&mut tmp).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    buf
}

fn head_text(head: &[u8]) -> String {
    String::from_utf8_lossy(head).into_owned()
}

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

#[tokio::test]
async fn get_roundtrip() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let head = head_text(&read_head(&mut sock).await);
        assert!(head.starts_with("GET /api/users?page=1 HTTP/1.1\r\n"), "{head}");
        assert!(head.contains(&format!("Host: 127.0.0.1:{}\r\n", sock.local_addr().unwrap().port())));
        assert!(head.contains("User-Agent: x/1.0\r\n"));
        sock.write_all(
            b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 12\r\n\r\n{\"ok\": true}",
        )
        .await
        .unwrap();
    });

    let mut client = HttpClient::new();
    let mut req = Request::get(&format!("http://127.0.0.1:{}/api/users?page=1", addr.port())).unwrap();
    req.header("User-Agent", "x/1.0");
    let resp = client.send(&req).await.unwrap();

    assert_eq!(resp.status_code, 200);
    assert!(resp.is_success());
    assert_eq!(resp.get_header("content-type"), Some("application/json"));
    assert_eq!(resp.content_length(), Some(12));
    assert_eq!(resp.body.as_deref(), Some(&b"{\"ok\": true}"[..]));

    #[derive(serde::Deserialize)]
    struct Flag {
        ok: bool,
    }
    let flag: Flag = resp.json().unwrap();
    assert!(flag.ok);
    server.await.unwrap();
}

#[tokio::test]
async fn keep_alive_reuses_one_connection() {
    let (listener, addr) = bind().await;
    let accepted = Arc::new(AtomicUsize::new(0));
    let server_accepted = accepted.clone();
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        server_accepted.fetch_add(1, Ordering::SeqCst);
        for _ in 0..2 {
            let head = read_head(&mut sock).await;
            assert!(!head.is_empty());
            sock.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                .await
                .unwrap();
        }
    });

    let mut client = HttpClient::new();
    let url = format!("http://127.0.0.1:{}/", addr.port());

    client.get(&url).await.unwrap();
    assert_eq!(client.pool_stats(), PoolStats { idle: 1, active: 0, pools: 1 });

    client.get(&url).await.unwrap();
    assert_eq!(client.pool_stats(), PoolStats { idle: 1, active: 0, pools: 1 });

    server.await.unwrap();
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn connection_close_forces_fresh_dial() {
    let (listener, addr) = bind().await;
    let accepted = Arc::new(AtomicUsize::new(0));
    let server_accepted = accepted.clone();
    let server = tokio::spawn(async move {
        for reply in [
            &b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 2\r\n\r\nok"[..],
            &b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok"[..],
        ] {
            let (mut sock, _) = listener.accept().await.unwrap();
            server_accepted.fetch_add(1, Ordering::SeqCst);
            read_head(&mut sock).await;
            sock.write_all(reply).await.unwrap();
        }
    });

    let mut client = HttpClient::new();
    let url = format!("http://127.0.0.1:{}/", addr.port());

    client.get(&url).await.unwrap();
    assert_eq!(client.pool_stats(), PoolStats { idle: 0, active: 0, pools: 1 });

    client.get(&url).await.unwrap();
    assert_eq!(client.pool_stats(), PoolStats { idle: 1, active: 0, pools: 1 });

    server.await.unwrap();
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn head_response_has_no_body() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let head = head_text(&read_head(&mut sock).await);
        assert!(head.starts_with("HEAD / HTTP/1.1\r\n"), "{head}");
        sock.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n")
            .await
            .unwrap();
    });

    let mut client = HttpClient::new();
    let req = Request::head(&format!("http://127.0.0.1:{}/", addr.port())).unwrap();
    let resp = client.send(&req).await.unwrap();
    assert_eq!(resp.status_code, 200);
    assert_eq!(resp.content_length(), Some(5));
    assert!(resp.body.is_none());
    server.await.unwrap();
}

#[tokio::test]
async fn chunked_body_assembled() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        read_head(&mut sock).await;
        sock.write_all(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nHello\r\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        sock.write_all(b"6\r\n World\r\n0\r\n\r\n").await.unwrap();
    });

    let mut client = HttpClient::new();
    let resp = client
        .get(&format!("http://127.0.0.1:{}/", addr.port()))
        .await
        .unwrap();
    assert_eq!(resp.body.as_deref(), Some(&b"Hello World"[..]));
    server.await.unwrap();
}

#[tokio::test]
async fn read_until_close_body() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        read_head(&mut sock).await;
        sock.write_all(b"HTTP/1.1 200 OK\r\n\r\nunframed body").await.unwrap();
        // closing the socket terminates the body
    });

    let mut client = HttpClient::new();
    let resp = client
        .get(&format!("http://127.0.0.1:{}/", addr.port()))
        .await
        .unwrap();
    assert_eq!(resp.body.as_deref(), Some(&b"unframed body"[..]));
    // A connection drained to EOF is dead; it must not be pooled as idle.
    assert_eq!(client.pool_stats(), PoolStats { idle: 0, active: 0, pools: 1 });
    server.await.unwrap();
}

#[tokio::test]
async fn cross_origin_redirect_rewrites_method_and_strips_credentials() {
    let (listener_b, addr_b) = bind().await;
    let server_b = tokio::spawn(async move {
        let (mut sock, _) = listener_b.accept().await.unwrap();
        let head = head_text(&read_head(&mut sock).await);
        assert!(head.starts_with("GET /y HTTP/1.1\r\n"), "{head}");
        assert!(!head.to_ascii_lowercase().contains("authorization"), "{head}");
        assert!(head.contains(&format!("Host: 127.0.0.1:{}\r\n", sock.local_addr().unwrap().port())));
        // the body was dropped with the 303 rewrite
        assert!(!head.contains("payload"), "{head}");
        sock.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\ndone")
            .await
            .unwrap();
    });

    let (listener_a, addr_a) = bind().await;
    let b_port = addr_b.port();
    let server_a = tokio::spawn(async move {
        let (mut sock, _) = listener_a.accept().await.unwrap();
        let head = head_text(&read_head(&mut sock).await);
        assert!(head.starts_with("POST /x HTTP/1.1\r\n"), "{head}");
        let reply = format!(
            "HTTP/1.1 303 See Other\r\nLocation: http://127.0.0.1:{}/y\r\nContent-Length: 0\r\n\r\n",
            b_port
        );
        sock.write_all(reply.as_bytes()).await.unwrap();
    });

    let mut client = HttpClient::new();
    let mut req = Request::post(&format!("http://127.0.0.1:{}/x", addr_a.port())).unwrap();
    req.header("Authorization", "Bearer t").body(b"payload");
    let resp = client.send(&req).await.unwrap();

    assert_eq!(resp.status_code, 200);
    assert_eq!(resp.body.as_deref(), Some(&b"done"[..]));
    server_a.await.unwrap();
    server_b.await.unwrap();
}

#[tokio::test]
async fn same_origin_relative_redirect_keeps_credentials() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let head = head_text(&read_head(&mut sock).await);
        assert!(head.starts_with("GET /old HTTP/1.1\r\n"), "{head}");
        sock.write_all(b"HTTP/1.1 302 Found\r\nLocation: /new\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
        let head = head_text(&read_head(&mut sock).await);
        assert!(head.starts_with("GET /new HTTP/1.1\r\n"), "{head}");
        assert!(head.contains("Authorization: Bearer t\r\n"), "{head}");
        sock.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
            .await
            .unwrap();
    });

    let mut client = HttpClient::new();
    let mut req = Request::get(&format!("http://127.0.0.1:{}/old", addr.port())).unwrap();
    req.header("Authorization", "Bearer t");
    let resp = client.send(&req).await.unwrap();
    assert_eq!(resp.status_code, 200);
    server.await.unwrap();
}

#[tokio::test]
async fn redirect_loop_is_bounded() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        for _ in 0..8 {
            let head = read_head(&mut sock).await;
            if head.is_empty() {
                return;
            }
            sock.write_all(b"HTTP/1.1 302 Found\r\nLocation: /loop\r\nContent-Length: 0\r\n\r\n")
                .await
                .unwrap();
        }
    });

    let mut config = HttpClientConfig::default();
    config.max_redirects = 3;
    let mut client = HttpClient::with_config(config);
    let err = client.get(&format!("http://127.0.0.1:{}/", addr.port())).await;
    assert!(matches!(err, Err(HttpError::TooManyRedirects(3))));
    drop(client);
    server.abort();
}

#[tokio::test]
async fn per_request_redirect_opt_out() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        read_head(&mut sock).await;
        sock.write_all(b"HTTP/1.1 302 Found\r\nLocation: /elsewhere\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
    });

    let mut client = HttpClient::new();
    let mut req = Request::get(&format!("http://127.0.0.1:{}/", addr.port())).unwrap();
    req.follow_redirects(false);
    let resp = client.send(&req).await.unwrap();
    assert_eq!(resp.status_code, 302);
    assert_eq!(resp.location(), Some("/elsewhere"));
    server.await.unwrap();
}

#[tokio::test]
async fn direct_mode_skips_the_pool() {
    let (listener, addr) = bind().await;
    let accepted = Arc::new(AtomicUsize::new(0));
    let server_accepted = accepted.clone();
    let server = tokio::spawn(async move {
        for _ in 0..2 {
            let (mut sock, _) = listener.accept().await.unwrap();
            server_accepted.fetch_add(1, Ordering::SeqCst);
            read_head(&mut sock).await;
            sock.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                .await
                .unwrap();
        }
    });

    let mut client = HttpClient::new();
    client.set_use_connection_pool(false);
    let url = format!("http://127.0.0.1:{}/", addr.port());
    client.get(&url).await.unwrap();
    client.get(&url).await.unwrap();
    assert_eq!(client.pool_stats(), PoolStats { idle: 0, active: 0, pools: 0 });
    server.await.unwrap();
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn oversized_headers_rejected() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        read_head(&mut sock).await;
        sock.write_all(b"HTTP/1.1 200 OK\r\n").await.unwrap();
        let filler = b"X-Filler: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\n".repeat(2048);
        let _ = sock.write_all(&filler).await;
    });

    let mut client = HttpClient::new();
    let err = client.get(&format!("http://127.0.0.1:{}/", addr.port())).await;
    assert!(matches!(err, Err(HttpError::HeadersTooLarge(_))));
    server.abort();
}

#[tokio::test]
async fn declared_length_underflow_is_an_error() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        read_head(&mut sock).await;
        sock.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nfour")
            .await
            .unwrap();
    });

    let mut client = HttpClient::new();
    let err = client.get(&format!("http://127.0.0.1:{}/", addr.port())).await;
    assert!(matches!(err, Err(HttpError::UnexpectedEndOfStream)));
    // The broken connection was discarded, not pooled.
    assert_eq!(client.pool_stats(), PoolStats { idle: 0, active: 0, pools: 1 });
    server.await.unwrap();
}

#[tokio::test]
async fn immediate_close_is_empty_response() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        read_head(&mut sock).await;
        drop(sock);
    });

    let mut client = HttpClient::new();
    let err = client.get(&format!("http://127.0.0.1:{}/", addr.port())).await;
    assert!(matches!(err, Err(HttpError::EmptyResponse)));
    server.await.unwrap();
}

#[tokio::test]
async fn post_json_roundtrip() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = read_head(&mut sock).await;
        while !buf.ends_with(b"{\"name\":\"it\"}") {
            let mut tmp = [0u8; 256];
            let n = sock.read(&mut tmp).await.unwrap();
            assert!(n > 0, "request body never arrived");
            buf.extend_from_slice(&tmp[..n]);
        }
        let head = head_text(&buf);
        assert!(head.starts_with("POST /api HTTP/1.1\r\n"), "{head}");
        assert!(head.contains("Content-Type: application/json\r\n"), "{head}");
        assert!(head.contains("Content-Length: 13\r\n"), "{head}");
        sock.write_all(b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
    });

    #[derive(serde::Serialize)]
    struct Payload<'a> {
        name: &'a str,
    }
    let mut client = HttpClient::new();
    let resp = client
        .post_json(&format!("http://127.0.0.1:{}/api", addr.port()), &Payload { name: "it" })
        .await
        .unwrap();
    assert_eq!(resp.status_code, 201);
    server.await.unwrap();
}

#[tokio::test]
#[ignore] // requires network; run with: cargo test --test http_integration -- --ignored --nocapture
async fn get_over_tls() {
    let mut client = HttpClient::new();
    let resp = client.get("https://example.com/").await.expect("TLS GET failed");
    println!("status: {}", resp.status_code);
    assert!(resp.is_success());
    assert!(resp.body.map(|b| !b.is_empty()).unwrap_or(false));
}
