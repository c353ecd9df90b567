/*
 * error.rs
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

//! Error taxonomy for the whole client: input, framing, transport, and policy
//! errors. Framing errors are fatal to the current exchange; transport errors
//! are fatal to the connection; policy errors leave connections untouched.

use std::io;

/// Any error raised by the client stack.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    // -- input --
    #[error("malformed URL: {0}")]
    MalformedUrl(String),
    #[error("URL has no host")]
    NoHostInUrl,
    #[error("no default port for scheme {0:?}")]
    UnknownSchemeNoDefault(String),
    #[error("URL has no port and policy requires one")]
    PortMissing,
    #[error("Location header exceeds {0} bytes")]
    LocationTooLong(usize),
    #[error("redirect response has no Location header")]
    MissingLocationHeader,

    // -- framing --
    #[error("malformed response: {0}")]
    MalformedResponse(&'static str),
    #[error("HTTP version not supported: {0}")]
    HttpVersionNotSupported(String),
    #[error("invalid chunk size line")]
    InvalidChunkSize,
    #[error("malformed chunk framing")]
    MalformedChunk,
    #[error("response headers exceed {0} bytes")]
    HeadersTooLarge(usize),
    #[error("connection closed before headers were complete")]
    UnexpectedEof,
    #[error("connection closed before the declared body was complete")]
    UnexpectedEndOfStream,
    #[error("empty response")]
    EmptyResponse,

    // -- transport --
    #[error("connection is not connected")]
    NotConnected,
    #[error("connection is already connected")]
    AlreadyConnected,
    #[error("no address found for {0}")]
    NoAddressFound(String),
    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error("operation timed out")]
    Timeout,
    #[error(transparent)]
    Io(#[from] io::Error),

    // -- policy --
    #[error("too many redirects (limit {0})")]
    TooManyRedirects(u32),
    #[error("connection pool exhausted for {0}")]
    ConnectionPoolExhausted(String),
    #[error("SSE event exceeds {0} bytes")]
    EventTooLarge(usize),
    #[error("stream closed by consumer")]
    StreamClosed,
    #[error("response is not an SSE stream")]
    NotSseResponse,

    // -- JSON collaborator --
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HttpError>;
