/*
 * request.rs
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

//! HTTP request: method, parsed URL, ordered headers, optional body, and the
//! wire serializer. `Host` is synthesized at construction from the URL;
//! `Content-Length` is synthesized at serialization when a body is set and
//! the caller did not provide one.

use std::borrow::Cow;
use std::time::Duration;

use bytes::BytesMut;
use serde::Serialize;

use crate::error::Result;
use crate::http::headers::HeaderMap;
use crate::url::{TargetForm, Url};

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Trace,
    Connect,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
        }
    }
}

/// A request under construction. The body is borrowed from the caller and
/// must outlive the send; JSON bodies are serialized into owned storage.
#[derive(Debug, Clone)]
pub struct Request<'a> {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Cow<'a, [u8]>>,
    pub timeout: Option<Duration>,
    pub follow_redirects: Option<bool>,
}

impl<'a> Request<'a> {
    /// Parse the URL and synthesize the `Host` header (port omitted when it
    /// is the scheme default).
    pub fn new(method: Method, url: &str) -> Result<Self> {
        Ok(Self::from_url(method, Url::parse(url)?))
    }

    /// Build from an already-parsed URL. Used by the redirect controller.
    pub fn from_url(method: Method, url: Url) -> Self {
        let mut headers = HeaderMap::new();
        headers.set("Host", url.host_header_value());
        Self {
            method,
            url,
            headers,
            body: None,
            timeout: None,
            follow_redirects: None,
        }
    }

    pub fn get(url: &str) -> Result<Self> {
        Self::new(Method::Get, url)
    }

    pub fn head(url: &str) -> Result<Self> {
        Self::new(Method::Head, url)
    }

    pub fn post(url: &str) -> Result<Self> {
        Self::new(Method::Post, url)
    }

    pub fn put(url: &str) -> Result<Self> {
        Self::new(Method::Put, url)
    }

    pub fn patch(url: &str) -> Result<Self> {
        Self::new(Method::Patch, url)
    }

    pub fn delete(url: &str) -> Result<Self> {
        Self::new(Method::Delete, url)
    }

    /// Add or replace a header (case-insensitive name).
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.set(name, value);
        self
    }

    /// Borrow the request body; the slice must outlive the send.
    pub fn body(&mut self, data: &'a [u8]) -> &mut Self {
        self.body = Some(Cow::Borrowed(data));
        self
    }

    /// Serialize `value` as the request body (owned) and force
    /// `Content-Type: application/json`.
    pub fn json<T: Serialize>(&mut self, value: &T) -> Result<&mut Self> {
        let bytes = serde_json::to_vec(value)?;
        self.headers.set("Content-Type", "application/json");
        self.body = Some(Cow::Owned(bytes));
        Ok(self)
    }

    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn follow_redirects(&mut self, follow: bool) -> &mut Self {
        self.follow_redirects = Some(follow);
        self
    }

    /// Serialize onto the wire: request line with the origin-form target,
    /// headers in insertion order, synthesized `Content-Length` when needed,
    /// blank line, body. A caller-set `Content-Length` is emitted verbatim.
    pub fn write_to(&self, out: &mut BytesMut) {
        let mut head = format!(
            "{} {} HTTP/1.1\r\n",
            self.method.as_str(),
            self.url.request_target(TargetForm::Origin)
        );
        for (name, value) in self.headers.iter() {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        if let Some(body) = &self.body {
            if !self.headers.contains("Content-Length") {
                head.push_str(&format!("Content-Length: {}\r\n", body.len()));
            }
        }
        head.push_str("\r\n");
        out.extend_from_slice(head.as_bytes());
        if let Some(body) = &self.body {
            out.extend_from_slice(body);
        }
    }
}
