/*
 * streaming.rs
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

//! Streaming consumption of a response body. A `StreamingResponse` owns its
//! connection outright and destroys it on completion or drop; it never
//! returns to the pool, because keep-alive boundaries cannot be inferred
//! from an open chunked or SSE stream. Bytes read past the headers are
//! replayed through the same decode path before the first socket read.
//!
//! Two consumption shapes over one decode core: callbacks (`stream_chunks`,
//! `stream_sse`) and pull iteration (`next_chunk`, `next_sse_message`).

use std::collections::VecDeque;
use std::time::Duration;

use bytes::{Bytes, BytesMut};

use crate::error::{HttpError, Result};
use crate::http::chunked::ChunkedDecoder;
use crate::http::connection::Connection;
use crate::http::response::{Response, TransferMode};
use crate::http::sse::{SseMessage, SseOverflowPolicy, SseParser};

/// Streaming knobs; see the client configuration surface.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub chunk_buffer_size: usize,
    pub timeout: Duration,
    pub parse_sse: bool,
    pub overflow_policy: SseOverflowPolicy,
    pub max_event_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_buffer_size: 8192,
            timeout: Duration::from_millis(30_000),
            parse_sse: true,
            overflow_policy: SseOverflowPolicy::ReturnError,
            max_event_size: 1024 * 1024,
        }
    }
}

/// A response whose body is consumed incrementally off its own connection.
pub struct StreamingResponse {
    connection: Connection,
    response: Response,
    config: StreamConfig,
    /// Body bytes that arrived with the headers; drained first.
    leftover: Option<BytesMut>,
    decoder: Option<ChunkedDecoder>,
    remaining: Option<u64>,
    sse: Option<SseParser>,
    sse_queue: VecDeque<SseMessage>,
    eof: bool,
}

impl StreamingResponse {
    pub fn new(
        connection: Connection,
        response: Response,
        leftover: BytesMut,
        config: StreamConfig,
    ) -> Self {
        let mut stream = Self {
            connection,
            response,
            config,
            leftover: if leftover.is_empty() { None } else { Some(leftover) },
            decoder: None,
            remaining: None,
            sse: None,
            sse_queue: VecDeque::new(),
            eof: false,
        };
        match stream.response.transfer_mode {
            TransferMode::Chunked => stream.decoder = Some(ChunkedDecoder::new()),
            TransferMode::FixedLength(n) => {
                stream.remaining = Some(n);
                if n == 0 {
                    stream.eof = true;
                }
            }
            TransferMode::Sse | TransferMode::ReadUntilClose => {}
        }
        stream
    }

    /// The header-phase response (status, headers, transfer mode). The body
    /// is never materialized here.
    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn status_code(&self) -> u16 {
        self.response.status_code
    }

    /// Next decoded slice of body. `Some` with an empty slice means the
    /// decoder consumed input without producing output yet; `None` is a
    /// clean end-of-stream.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.eof {
            return Ok(None);
        }
        let input = match self.leftover.take() {
            Some(bytes) => bytes,
            None => {
                let mut buf = vec![0u8; self.config.chunk_buffer_size];
                let outcome =
                    tokio::time::timeout(self.config.timeout, self.connection.recv_some(&mut buf))
                        .await;
                let n = match outcome {
                    Ok(read) => read?,
                    Err(_) => {
                        self.connection.close();
                        return Err(HttpError::Timeout);
                    }
                };
                if n == 0 {
                    return self.finish_at_peer_close();
                }
                BytesMut::from(&buf[..n])
            }
        };
        match self.response.transfer_mode {
            TransferMode::Chunked => {
                let decoder = self.decoder.get_or_insert_with(ChunkedDecoder::new);
                let mut out = BytesMut::new();
                decoder.parse(&input, &mut out)?;
                if decoder.is_complete() {
                    self.eof = true;
                    self.connection.close();
                    tracing::debug!("chunked stream complete");
                    if out.is_empty() {
                        return Ok(None);
                    }
                }
                Ok(Some(out.freeze()))
            }
            TransferMode::FixedLength(_) => {
                let remaining = self.remaining.get_or_insert(0);
                let take = (*remaining).min(input.len() as u64) as usize;
                let bytes = Bytes::copy_from_slice(&input[..take]);
                *remaining -= take as u64;
                if *remaining == 0 {
                    self.eof = true;
                    self.connection.close();
                }
                Ok(Some(bytes))
            }
            TransferMode::Sse | TransferMode::ReadUntilClose => Ok(Some(input.freeze())),
        }
    }

    /// Zero-read handling per transfer mode: an error where bytes are still
    /// owed, a clean end otherwise.
    fn finish_at_peer_close(&mut self) -> Result<Option<Bytes>> {
        match self.response.transfer_mode {
            TransferMode::Chunked
                if !self.decoder.as_ref().map(ChunkedDecoder::is_complete).unwrap_or(false) =>
            {
                Err(HttpError::UnexpectedEndOfStream)
            }
            TransferMode::FixedLength(_) if self.remaining.unwrap_or(0) > 0 => {
                Err(HttpError::UnexpectedEndOfStream)
            }
            _ => {
                self.eof = true;
                tracing::debug!("stream ended at peer close");
                Ok(None)
            }
        }
    }

    /// Deliver decoded body bytes to `cb` until end-of-stream. An error from
    /// the callback halts and destroys the stream.
    pub async fn stream_chunks<F>(mut self, mut cb: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        loop {
            match self.next_chunk().await? {
                None => return Ok(()),
                Some(bytes) if bytes.is_empty() => continue,
                Some(bytes) => cb(&bytes)?,
            }
        }
    }

    fn ensure_sse(&self) -> Result<()> {
        if !self.config.parse_sse {
            return Err(HttpError::NotSseResponse);
        }
        let event_stream = self
            .response
            .get_header("Content-Type")
            .map(|ct| {
                ct.trim_start()
                    .get(..17)
                    .is_some_and(|p| p.eq_ignore_ascii_case("text/event-stream"))
            })
            .unwrap_or(false);
        if event_stream {
            Ok(())
        } else {
            Err(HttpError::NotSseResponse)
        }
    }

    /// Deliver parsed SSE events to `cb` until the peer closes. The message
    /// handed to the callback borrows storage reused for the next event;
    /// copy inside the callback to retain it. Returning an error from the
    /// callback halts the stream. Works over raw and chunked transports.
    pub async fn stream_sse<F>(mut self, mut cb: F) -> Result<()>
    where
        F: FnMut(&SseMessage) -> Result<()>,
    {
        self.ensure_sse()?;
        let mut parser =
            SseParser::with_policy(self.config.overflow_policy, self.config.max_event_size);
        loop {
            match self.next_chunk().await? {
                None => return Ok(()),
                Some(bytes) => parser.parse_chunk(&bytes, &mut cb)?,
            }
        }
    }

    /// Pull the next fully parsed SSE event as an owned copy, or `None` at
    /// end-of-stream.
    pub async fn next_sse_message(&mut self) -> Result<Option<SseMessage>> {
        self.ensure_sse()?;
        loop {
            if let Some(message) = self.sse_queue.pop_front() {
                return Ok(Some(message));
            }
            let Some(bytes) = self.next_chunk().await? else {
                return Ok(None);
            };
            let Self { sse, sse_queue, config, .. } = self;
            let parser = sse.get_or_insert_with(|| {
                SseParser::with_policy(config.overflow_policy, config.max_event_size)
            });
            parser.parse_chunk(&bytes, &mut |m| {
                sse_queue.push_back(m.clone());
                Ok(())
            })?;
        }
    }
}

impl Drop for StreamingResponse {
    fn drop(&mut self) {
        // The connection dies with the stream; it never rejoins a pool.
        self.connection.close();
    }
}
