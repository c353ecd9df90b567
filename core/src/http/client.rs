/*
 * client.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Corriere, an asynchronous HTTP/1.1 client.
 *
 * Corriere is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Corriere is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Corriere.  If not, see <http://www.gnu.org/licenses/>.
 */

//! The client orchestrator: request serialization, connection acquisition
//! (pooled or direct), incremental header read, body framing, redirect
//! following, and the streaming entry points. A complete `Response` comes
//! back or an error does; partial responses are never surfaced.

use std::future::Future;
use std::time::Duration;

use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{HttpError, Result};
use crate::http::chunked::ChunkedDecoder;
use crate::http::connection::Connection;
use crate::http::headers::HeaderMap;
use crate::http::pool::{ConnectionPool, PoolStats};
use crate::http::redirect;
use crate::http::request::{Method, Request};
use crate::http::response::{find_double_crlf, Response, TransferMode};
use crate::http::sse::SseMessage;
use crate::http::streaming::{StreamConfig, StreamingResponse};
use crate::url::PortPolicy;

/// Response heads larger than this abort the exchange.
const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Client-wide defaults and policy knobs.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub default_timeout: Duration,
    /// Merged into each request where the request has no such header.
    pub default_headers: HeaderMap,
    pub follow_redirects: bool,
    pub max_redirects: u32,
    pub use_connection_pool: bool,
    pub max_connections_per_host: usize,
    pub max_idle_time: Duration,
    pub max_keepalive_requests: u32,
    pub stream: StreamConfig,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(30_000),
            default_headers: HeaderMap::new(),
            follow_redirects: true,
            max_redirects: 10,
            use_connection_pool: true,
            max_connections_per_host: 10,
            max_idle_time: Duration::from_millis(60_000),
            max_keepalive_requests: 100,
            stream: StreamConfig::default(),
        }
    }
}

/// HTTP/1.1 client over a per-host connection pool.
pub struct HttpClient {
    config: HttpClientConfig,
    pool: ConnectionPool,
}

impl HttpClient {
    pub fn new() -> Self {
        Self::with_config(HttpClientConfig::default())
    }

    pub fn with_config(config: HttpClientConfig) -> Self {
        let pool = ConnectionPool::with_limits(
            config.max_connections_per_host,
            config.max_idle_time,
            config.max_keepalive_requests,
        );
        Self { config, pool }
    }

    pub fn set_default_timeout(&mut self, timeout: Duration) {
        self.config.default_timeout = timeout;
    }

    /// Header applied to every request that does not set it itself.
    pub fn set_default_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.config.default_headers.set(name, value);
    }

    pub fn set_follow_redirects(&mut self, follow: bool) {
        self.config.follow_redirects = follow;
    }

    pub fn set_max_redirects(&mut self, max: u32) {
        self.config.max_redirects = max;
    }

    pub fn set_use_connection_pool(&mut self, use_pool: bool) {
        self.config.use_connection_pool = use_pool;
    }

    pub fn set_max_connections_per_host(&mut self, max: usize) {
        self.config.max_connections_per_host = max;
        self.pool.set_max_per_host(max);
    }

    pub fn set_max_idle_time(&mut self, max_idle: Duration) {
        self.config.max_idle_time = max_idle;
        self.pool.set_max_idle(max_idle);
    }

    pub fn set_max_keepalive_requests(&mut self, max: u32) {
        self.config.max_keepalive_requests = max;
        self.pool.set_max_keepalive_requests(max);
    }

    /// Evict idle pooled connections past the idle threshold.
    pub fn cleanup_idle_connections(&mut self) {
        self.pool.cleanup_idle();
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Send a request, following redirects per configuration, and return the
    /// complete response.
    pub async fn send(&mut self, request: &Request<'_>) -> Result<Response> {
        let mut current = request.clone();
        self.merge_default_headers(&mut current);
        let follow = current
            .follow_redirects
            .unwrap_or(self.config.follow_redirects);
        let mut hops = 0u32;
        loop {
            let response = self.send_once(&current).await?;
            if follow && response.is_redirect() {
                if hops >= self.config.max_redirects {
                    return Err(HttpError::TooManyRedirects(self.config.max_redirects));
                }
                hops += 1;
                let target = redirect::redirect_target(&current.url, &response)?;
                tracing::debug!(status = response.status_code, target = %target, hop = hops, "following redirect");
                current = redirect::redirect_request(&current, response.status_code, target);
                continue;
            }
            return Ok(response);
        }
    }

    /// GET a URL with default options.
    pub async fn get(&mut self, url: &str) -> Result<Response> {
        let request = Request::get(url)?;
        self.send(&request).await
    }

    /// GET a URL and deserialize the body via the JSON collaborator.
    pub async fn get_json<T: DeserializeOwned>(&mut self, url: &str) -> Result<T> {
        self.get(url).await?.json()
    }

    /// POST `value` as a JSON body.
    pub async fn post_json<T: Serialize>(&mut self, url: &str, value: &T) -> Result<Response> {
        let mut request = Request::post(url)?;
        request.json(value)?;
        self.send(&request).await
    }

    /// Open a streaming response: direct (never pooled) connection, header
    /// phase only; body consumption moves to the returned stream. Redirects
    /// are never followed here; a 3xx comes back as-is for the caller to
    /// decide.
    pub async fn send_streaming(&mut self, request: &Request<'_>) -> Result<StreamingResponse> {
        let mut req = request.clone();
        self.merge_default_headers(&mut req);
        let timeout = req.timeout.unwrap_or(self.config.default_timeout);
        let (host, port, tls) = request_endpoint(&req)?;

        let mut conn = Connection::new(host.as_str(), port, tls);
        conn.connect(timeout).await?;
        conn.note_acquired();
        match Self::header_phase(&mut conn, &req, timeout).await {
            Ok((response, leftover)) => {
                let mut stream_config = self.config.stream.clone();
                stream_config.timeout = timeout;
                Ok(StreamingResponse::new(conn, response, leftover, stream_config))
            }
            Err(e) => {
                conn.close();
                Err(e)
            }
        }
    }

    /// Streaming entry for pull consumption (`next_chunk` /
    /// `next_sse_message`). Same contract as `send_streaming`.
    pub async fn send_streaming_iter(&mut self, request: &Request<'_>) -> Result<StreamingResponse> {
        self.send_streaming(request).await
    }

    /// Open a streaming response and deliver parsed SSE events to `cb` until
    /// the peer closes or the callback returns an error.
    pub async fn send_streaming_sse<F>(&mut self, request: &Request<'_>, cb: F) -> Result<()>
    where
        F: FnMut(&SseMessage) -> Result<()>,
    {
        let stream = self.send_streaming(request).await?;
        stream.stream_sse(cb).await
    }

    fn merge_default_headers(&self, request: &mut Request<'_>) {
        for (name, value) in self.config.default_headers.iter() {
            if !request.headers.contains(name) {
                request.headers.set(name, value);
            }
        }
    }

    /// One request/response exchange on one connection, without redirect
    /// handling. A failed exchange discards the connection; a completed one
    /// returns it to the pool unless the peer asked to close.
    async fn send_once(&mut self, request: &Request<'_>) -> Result<Response> {
        let timeout = request.timeout.unwrap_or(self.config.default_timeout);
        let (host, port, tls) = request_endpoint(request)?;
        let pooled = self.config.use_connection_pool;

        let mut conn = if pooled {
            self.pool.get_connection(&host, port, tls, timeout).await?
        } else {
            let mut conn = Connection::new(host.as_str(), port, tls);
            conn.connect(timeout).await?;
            conn.note_acquired();
            conn
        };

        match Self::exchange(&mut conn, request, timeout).await {
            Ok(response) => {
                if pooled {
                    self.pool
                        .return_connection(conn, peer_requested_close(&response));
                } else {
                    conn.close();
                }
                Ok(response)
            }
            Err(e) => {
                if pooled {
                    self.pool.discard(conn);
                } else {
                    conn.close();
                }
                Err(e)
            }
        }
    }

    /// Serialize and send the request, then read incrementally until the
    /// CRLFCRLF header terminator and parse. Returns the response plus any
    /// body bytes that arrived with the headers.
    async fn header_phase(
        conn: &mut Connection,
        request: &Request<'_>,
        timeout: Duration,
    ) -> Result<(Response, BytesMut)> {
        let mut wire = BytesMut::new();
        request.write_to(&mut wire);
        io_timeout(timeout, conn.send_all(&wire)).await?;

        let mut buf = BytesMut::with_capacity(8192);
        let header_end = loop {
            if let Some(pos) = find_double_crlf(&buf) {
                break pos + 4;
            }
            if buf.len() > MAX_HEADER_BYTES {
                return Err(HttpError::HeadersTooLarge(MAX_HEADER_BYTES));
            }
            let mut tmp = [0u8; 8192];
            let n = io_timeout(timeout, conn.recv_some(&mut tmp)).await?;
            if n == 0 {
                return Err(if buf.is_empty() {
                    HttpError::EmptyResponse
                } else {
                    HttpError::UnexpectedEof
                });
            }
            buf.extend_from_slice(&tmp[..n]);
        };

        let mut response = Response::new();
        response.parse_headers(&buf[..header_end])?;
        let leftover = buf.split_off(header_end);
        Ok((response, leftover))
    }

    /// Full exchange: headers, then the body per its framing. HEAD responses
    /// never carry a body regardless of declared framing.
    async fn exchange(
        conn: &mut Connection,
        request: &Request<'_>,
        timeout: Duration,
    ) -> Result<Response> {
        let (mut response, mut leftover) = Self::header_phase(conn, request, timeout).await?;
        if request.method == Method::Head {
            return Ok(response);
        }
        match response.transfer_mode {
            TransferMode::Chunked => {
                let mut decoder = ChunkedDecoder::new();
                let mut body = BytesMut::new();
                decoder.parse(&leftover, &mut body)?;
                let mut tmp = [0u8; 8192];
                while !decoder.is_complete() {
                    let n = io_timeout(timeout, conn.recv_some(&mut tmp)).await?;
                    if n == 0 {
                        return Err(HttpError::UnexpectedEndOfStream);
                    }
                    decoder.parse(&tmp[..n], &mut body)?;
                }
                response.parse_body(&body);
            }
            TransferMode::FixedLength(len) => {
                let len = len as usize;
                leftover.truncate(len);
                let mut body = leftover;
                let mut tmp = [0u8; 8192];
                while body.len() < len {
                    let n = io_timeout(timeout, conn.recv_some(&mut tmp)).await?;
                    if n == 0 {
                        return Err(HttpError::UnexpectedEndOfStream);
                    }
                    let want = len - body.len();
                    body.extend_from_slice(&tmp[..n.min(want)]);
                }
                response.parse_body(&body);
            }
            TransferMode::Sse | TransferMode::ReadUntilClose => {
                let mut body = leftover;
                let mut tmp = [0u8; 8192];
                loop {
                    let n = io_timeout(timeout, conn.recv_some(&mut tmp)).await?;
                    if n == 0 {
                        break;
                    }
                    body.extend_from_slice(&tmp[..n]);
                }
                response.parse_body(&body);
            }
        }
        Ok(response)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// `(host, port, tls)` for the request URL, with scheme-default ports.
fn request_endpoint(request: &Request<'_>) -> Result<(String, u16, bool)> {
    let host = request.url.decoded_host().into_owned();
    let port = request.url.port(PortPolicy::DefaultForKnownSchemes)?;
    Ok((host, port, request.url.is_secure()))
}

/// True when the peer sent `Connection: close` (token list, any case).
fn peer_requested_close(response: &Response) -> bool {
    response
        .get_header("Connection")
        .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("close")))
        .unwrap_or(false)
}

async fn io_timeout<T, F>(timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(outcome) => outcome,
        Err(_) => Err(HttpError::Timeout),
    }
}
