/*
 * connection.rs
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

//! One HTTP connection: a plain TCP or TLS stream plus its lifecycle state.
//! States move disconnected → connecting → connected ↔ active ↔ idle →
//! closed; I/O is legal only in connected/active. The plain and TLS variants
//! share all surrounding logic.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{lookup_host, TcpStream};
use tokio_rustls::client::TlsStream as TokioTlsStream;
use tokio_rustls::rustls::pki_types::ServerName;

use crate::error::{HttpError, Result};
use crate::http::pool::PoolKey;
use crate::net::tls_connector;

/// Unified stream: plain TCP or TLS. Implements AsyncRead + AsyncWrite.
pub enum HttpStream {
    Plain(TcpStream),
    Tls(TokioTlsStream<TcpStream>),
}

impl AsyncRead for HttpStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            HttpStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for HttpStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            HttpStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_flush(cx),
            HttpStream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            HttpStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Active,
    Idle,
    Closing,
    Closed,
}

/// A single client connection to `(host, port, tls)`.
pub struct Connection {
    host: String,
    port: u16,
    tls: bool,
    stream: Option<HttpStream>,
    state: ConnectionState,
    last_used: Instant,
    keepalive_count: u32,
}

impl Connection {
    /// Record the endpoint; performs no I/O.
    pub fn new(host: impl Into<String>, port: u16, tls: bool) -> Self {
        Self {
            host: host.into(),
            port,
            tls,
            stream: None,
            state: ConnectionState::Disconnected,
            last_used: Instant::now(),
            keepalive_count: 0,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_tls(&self) -> bool {
        self.tls
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn keepalive_count(&self) -> u32 {
        self.keepalive_count
    }

    pub fn pool_key(&self) -> PoolKey {
        PoolKey {
            host: self.host.clone(),
            port: self.port,
            tls: self.tls,
        }
    }

    /// Time since the last successful I/O (or acquisition).
    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    pub fn is_alive(&self) -> bool {
        self.stream.is_some()
            && matches!(
                self.state,
                ConnectionState::Connected | ConnectionState::Active | ConnectionState::Idle
            )
    }

    /// Resolve the host (IP literals skip DNS; otherwise first resolved
    /// address), open the TCP socket, and handshake TLS when the endpoint is
    /// secure.
    pub async fn connect(&mut self, timeout: Duration) -> Result<()> {
        if self.is_alive() {
            return Err(HttpError::AlreadyConnected);
        }
        self.state = ConnectionState::Connecting;
        let addr = self.resolve().await?;
        tracing::debug!(host = %self.host, port = self.port, tls = self.tls, "connecting");
        let tcp = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                self.state = ConnectionState::Closed;
                HttpError::Timeout
            })?
            .map_err(|e| {
                self.state = ConnectionState::Closed;
                HttpError::Io(e)
            })?;
        let stream = if self.tls {
            let server_name = ServerName::try_from(self.host.clone())
                .map_err(|_| HttpError::TlsHandshake(format!("invalid server name {}", self.host)))?;
            let tls = tokio::time::timeout(timeout, tls_connector().connect(server_name, tcp))
                .await
                .map_err(|_| {
                    self.state = ConnectionState::Closed;
                    HttpError::Timeout
                })?
                .map_err(|e| {
                    self.state = ConnectionState::Closed;
                    HttpError::TlsHandshake(e.to_string())
                })?;
            HttpStream::Tls(tls)
        } else {
            HttpStream::Plain(tcp)
        };
        self.stream = Some(stream);
        self.state = ConnectionState::Connected;
        self.last_used = Instant::now();
        Ok(())
    }

    async fn resolve(&self) -> Result<SocketAddr> {
        if let Ok(ip) = self.host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }
        let mut addrs = lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|_| HttpError::NoAddressFound(self.host.clone()))?;
        addrs
            .next()
            .ok_or_else(|| HttpError::NoAddressFound(self.host.clone()))
    }

    fn io_stream(&mut self) -> Result<&mut HttpStream> {
        if !matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Active
        ) {
            return Err(HttpError::NotConnected);
        }
        self.stream.as_mut().ok_or(HttpError::NotConnected)
    }

    /// Write all of `data`, then flush.
    pub async fn send_all(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.io_stream()?;
        let outcome: io::Result<()> = async {
            stream.write_all(data).await?;
            stream.flush().await
        }
        .await;
        match outcome {
            Ok(()) => {
                self.last_used = Instant::now();
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Closed;
                self.stream = None;
                if e.kind() == io::ErrorKind::WriteZero {
                    Err(HttpError::ConnectionClosed)
                } else {
                    Err(HttpError::Io(e))
                }
            }
        }
    }

    /// One read. Returns 0 at orderly end-of-stream (the connection then
    /// counts as closed); errors close the connection.
    pub async fn recv_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream = self.io_stream()?;
        match stream.read(buf).await {
            Ok(0) => {
                self.state = ConnectionState::Closed;
                self.stream = None;
                Ok(0)
            }
            Ok(n) => {
                self.last_used = Instant::now();
                Ok(n)
            }
            Err(e) => {
                self.state = ConnectionState::Closed;
                self.stream = None;
                Err(HttpError::Io(e))
            }
        }
    }

    /// Like `recv_some`, but a zero-read is a `ConnectionClosed` error. Used
    /// where the protocol still owes us bytes.
    pub async fn recv_all(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.recv_some(buf).await? {
            0 => Err(HttpError::ConnectionClosed),
            n => Ok(n),
        }
    }

    /// Acquisition for one exchange: bumps the keep-alive count and flips to
    /// active. Called by the pool on every hand-out (first use included).
    pub fn note_acquired(&mut self) {
        self.keepalive_count += 1;
        if self.is_alive() {
            self.state = ConnectionState::Active;
        }
    }

    /// Active → idle, stamping `last_used`. Called by the pool on return.
    pub fn mark_idle(&mut self) {
        if self.is_alive() {
            self.state = ConnectionState::Idle;
            self.last_used = Instant::now();
        }
    }

    /// Idempotent close; dropping the stream closes the socket, so this is
    /// safe on every path including drop.
    pub fn close(&mut self) {
        if self.stream.is_some() {
            self.state = ConnectionState::Closing;
            self.stream = None;
            tracing::trace!(host = %self.host, port = self.port, "connection closed");
        }
        self.state = ConnectionState::Closed;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("state", &self.state)
            .field("keepalive_count", &self.keepalive_count)
            .finish()
    }
}
