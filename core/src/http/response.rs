/*
 * response.rs
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

//! HTTP response: status line and header parsing, body framing selection,
//! and body materialization. HTTP/2 and HTTP/3 status lines are tolerated
//! but recorded as 1.1 for framing purposes; HTTP/0.9 is rejected.

use bytes::BytesMut;
use serde::de::DeserializeOwned;

use crate::error::{HttpError, Result};
use crate::http::chunked::ChunkedDecoder;
use crate::http::headers::HeaderMap;

/// Semantic HTTP version used for framing decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
}

/// How the response body is framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    FixedLength(u64),
    Chunked,
    Sse,
    ReadUntilClose,
}

/// A parsed response. The body, when materialized, is owned.
#[derive(Debug)]
pub struct Response {
    pub status_code: u16,
    pub version: HttpVersion,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    pub transfer_mode: TransferMode,
}

impl Response {
    pub fn new() -> Self {
        Self {
            status_code: 0,
            version: HttpVersion::Http11,
            headers: HeaderMap::new(),
            body: None,
            transfer_mode: TransferMode::ReadUntilClose,
        }
    }

    /// Parse the status line and headers from `bytes`, which must contain
    /// the CRLFCRLF terminator. Returns the offset just past it. Header
    /// names and values are trimmed and stored as owned copies; the transfer
    /// mode is derived once the headers are in.
    pub fn parse_headers(&mut self, bytes: &[u8]) -> Result<usize> {
        if bytes.is_empty() {
            return Err(HttpError::EmptyResponse);
        }
        let end = find_double_crlf(bytes).ok_or(HttpError::MalformedResponse("truncated headers"))?;
        let head = std::str::from_utf8(&bytes[..end])
            .map_err(|_| HttpError::MalformedResponse("headers are not valid UTF-8"))?;
        let mut lines = head.split("\r\n");

        let status_line = lines
            .next()
            .ok_or(HttpError::MalformedResponse("missing status line"))?;
        let mut parts = status_line.splitn(3, ' ');
        let proto = parts
            .next()
            .ok_or(HttpError::MalformedResponse("missing status line"))?;
        let version = proto
            .strip_prefix("HTTP/")
            .ok_or(HttpError::MalformedResponse("status line is not HTTP"))?;
        self.version = match version {
            "1.1" => HttpVersion::Http11,
            "1.0" => HttpVersion::Http10,
            // Tolerated on the status line; framing stays HTTP/1.1.
            "2" | "2.0" | "3" | "3.0" => HttpVersion::Http11,
            other => return Err(HttpError::HttpVersionNotSupported(other.to_string())),
        };
        let code = parts
            .next()
            .ok_or(HttpError::MalformedResponse("missing status code"))?;
        if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(HttpError::MalformedResponse("status code is not three digits"));
        }
        self.status_code = code.parse::<u16>().unwrap_or(0);
        // The reason phrase, if any, is not retained.

        for line in lines {
            let Some(colon) = line.find(':') else {
                continue;
            };
            let name = line[..colon].trim();
            let value = line[colon + 1..].trim();
            if !name.is_empty() {
                self.headers.set(name, value);
            }
        }

        self.transfer_mode = self.derive_transfer_mode();
        Ok(end + 4)
    }

    fn derive_transfer_mode(&self) -> TransferMode {
        if let Some(te) = self.headers.get("Transfer-Encoding") {
            if te.split(',').any(|t| t.trim().eq_ignore_ascii_case("chunked")) {
                return TransferMode::Chunked;
            }
        }
        if let Some(ct) = self.headers.get("Content-Type") {
            if ct
                .trim_start()
                .get(..17)
                .is_some_and(|p| p.eq_ignore_ascii_case("text/event-stream"))
            {
                return TransferMode::Sse;
            }
        }
        if let Some(n) = self.content_length() {
            return TransferMode::FixedLength(n);
        }
        TransferMode::ReadUntilClose
    }

    /// Case-insensitive header lookup.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Parsed `Content-Length`, when present and numeric.
    pub fn content_length(&self) -> Option<u64> {
        self.headers.get("Content-Length")?.trim().parse().ok()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status_code)
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get("Location")
    }

    /// Install `bytes` as the owned body, replacing any previous body.
    pub fn parse_body(&mut self, bytes: &[u8]) {
        self.body = Some(bytes.to_vec());
    }

    /// Decode a complete chunked payload and install the output as the body.
    pub fn parse_chunked_body(&mut self, raw: &[u8]) -> Result<()> {
        let mut decoder = ChunkedDecoder::new();
        let mut out = BytesMut::new();
        decoder.parse(raw, &mut out)?;
        if !decoder.is_complete() {
            return Err(HttpError::UnexpectedEndOfStream);
        }
        self.body = Some(out.to_vec());
        Ok(())
    }

    /// Deserialize the materialized body via the JSON collaborator.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let body = self.body.as_deref().ok_or(HttpError::EmptyResponse)?;
        Ok(serde_json::from_slice(body)?)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

/// Offset of the first CRLFCRLF, or None.
pub(crate) fn find_double_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
