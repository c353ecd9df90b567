/*
 * redirect.rs
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

//! Redirect rewriting. 303 always becomes GET without body; 301/302 become
//! GET without body when the original method was POST (the pragmatic RFC 7231
//! reading); 307/308 preserve method and body. When the target origin
//! differs, `Authorization` and `Cookie` are not carried over. `Host` is
//! never copied; the new request synthesizes its own.

use crate::error::{HttpError, Result};
use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::url::Url;

/// `Location` values longer than this are refused.
const MAX_LOCATION: usize = 8 * 1024;

/// Resolve a `Location` header against the URL the response came from.
/// Absolute http(s) URIs parse directly; anything else is a relative
/// reference.
pub fn resolve_location(current: &Url, location: &str) -> Result<Url> {
    if location.len() > MAX_LOCATION {
        return Err(HttpError::LocationTooLong(MAX_LOCATION));
    }
    if has_prefix_ignore_case(location, "http://") || has_prefix_ignore_case(location, "https://") {
        Url::parse(location)
    } else {
        current.join(location)
    }
}

fn has_prefix_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Extract and resolve the redirect target from a 3xx response.
pub fn redirect_target(current: &Url, response: &Response) -> Result<Url> {
    let location = response.location().ok_or(HttpError::MissingLocationHeader)?;
    resolve_location(current, location)
}

/// True when scheme, host (byte-exact), or port (missing compared as 0)
/// differ between the two URLs.
pub fn is_cross_origin(from: &Url, to: &Url) -> bool {
    !from.scheme().eq_ignore_ascii_case(to.scheme())
        || from.host() != to.host()
        || from.explicit_port().unwrap_or(0) != to.explicit_port().unwrap_or(0)
}

fn rewritten_method(status: u16, original: Method) -> (Method, bool) {
    match status {
        303 => (Method::Get, false),
        301 | 302 if original == Method::Post => (Method::Get, false),
        _ => (original, true),
    }
}

/// Build the next request of a redirect chain: rewritten method, headers
/// copied minus `Host` (regenerated) and, cross-origin, minus the sensitive
/// set; body reattached only when the method rewrite keeps it.
pub fn redirect_request<'a>(original: &Request<'a>, status: u16, target: Url) -> Request<'a> {
    let (method, keep_body) = rewritten_method(status, original.method);
    let cross_origin = is_cross_origin(&original.url, &target);

    let mut next = Request::from_url(method, target);
    for (name, value) in original.headers.iter() {
        if name.eq_ignore_ascii_case("Host") {
            continue;
        }
        if !keep_body && name.eq_ignore_ascii_case("Content-Length") {
            continue;
        }
        if cross_origin
            && (name.eq_ignore_ascii_case("Authorization") || name.eq_ignore_ascii_case("Cookie"))
        {
            continue;
        }
        next.headers.set(name, value);
    }
    if keep_body {
        next.body = original.body.clone();
    }
    next.timeout = original.timeout;
    next.follow_redirects = original.follow_redirects;
    next
}
