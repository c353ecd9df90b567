/*
 * mod.rs
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

//! HTTP/1.1 client stack.
//!
//! Design:
//! - Buffers: `bytes` crate (`BytesMut` for parse buffers, `Bytes` for payload slices).
//! - The chunked decoder and SSE tokenizer are pure state machines fed by the
//!   streamer; they never read from the socket. Both callback and iterator
//!   consumption share that core.
//! - Plain and TLS sockets are one closed sum type (`HttpStream`); all
//!   surrounding logic is shared.
//! - The pool is owned by the client: per-host idle/active lists, LIFO reuse,
//!   keep-alive budgets, stale eviction, no blocking on exhaustion.

pub mod chunked;
pub mod connection;
pub mod headers;
pub mod request;
pub mod response;
pub mod sse;

pub mod pool;
pub mod redirect;
pub mod streaming;

pub mod client;

pub use chunked::ChunkedDecoder;
pub use client::{HttpClient, HttpClientConfig};
pub use connection::{Connection, ConnectionState, HttpStream};
pub use headers::HeaderMap;
pub use pool::{ConnectionPool, PoolKey, PoolStats};
pub use request::{Method, Request};
pub use response::{HttpVersion, Response, TransferMode};
pub use sse::{SseMessage, SseOverflowPolicy, SseParser};
pub use streaming::{StreamConfig, StreamingResponse};
