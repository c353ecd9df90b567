/*
 * pool.rs
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

//! Per-host connection pool with keep-alive. Connections are keyed by
//! `(host, port, tls)`; distinct schemes never share a socket. Each key
//! holds an idle list (available for reuse, most recent last) and a count of
//! active hand-outs; a connection is in at most one of the two. The pool is
//! owned by the client and reached through `&mut self`, the cooperative
//! single-ownership model; a multithreaded embedding must add its own lock.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{HttpError, Result};
use crate::http::connection::Connection;

/// Identity of interchangeable connections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl std::fmt::Display for PoolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.host, self.port, self.tls)
    }
}

/// Pool observability counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub active: usize,
    pub pools: usize,
}

#[derive(Default)]
struct ConnectionList {
    /// Available for reuse; most recently used at the back (LIFO pop).
    idle: Vec<Connection>,
    /// Connections currently handed out for an in-flight exchange.
    active: usize,
}

/// Keyed store of per-host connection lists plus the reuse policy limits.
pub struct ConnectionPool {
    lists: HashMap<PoolKey, ConnectionList>,
    max_per_host: usize,
    max_idle: Duration,
    max_keepalive_requests: u32,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::with_limits(10, Duration::from_secs(60), 100)
    }

    pub fn with_limits(max_per_host: usize, max_idle: Duration, max_keepalive_requests: u32) -> Self {
        Self {
            lists: HashMap::new(),
            max_per_host,
            max_idle,
            max_keepalive_requests,
        }
    }

    pub fn set_max_per_host(&mut self, max: usize) {
        self.max_per_host = max;
    }

    pub fn set_max_idle(&mut self, max_idle: Duration) {
        self.max_idle = max_idle;
    }

    pub fn set_max_keepalive_requests(&mut self, max: u32) {
        self.max_keepalive_requests = max;
    }

    /// Obtain a connection for `(host, port, tls)`: reuse the most recently
    /// idle one when it is alive and below the keep-alive cap, otherwise
    /// dial a new one. At the per-host cap all idle connections are evicted
    /// first; if the cap is still filled by active hand-outs the caller gets
    /// `ConnectionPoolExhausted` rather than blocking.
    pub async fn get_connection(
        &mut self,
        host: &str,
        port: u16,
        tls: bool,
        connect_timeout: Duration,
    ) -> Result<Connection> {
        let key = PoolKey {
            host: host.to_string(),
            port,
            tls,
        };
        let max_keepalive = self.max_keepalive_requests;
        let max_per_host = self.max_per_host;
        {
            let list = self.lists.entry(key.clone()).or_default();
            while let Some(mut conn) = list.idle.pop() {
                if conn.is_alive() && conn.keepalive_count() < max_keepalive {
                    conn.note_acquired();
                    list.active += 1;
                    tracing::trace!(key = %key, keepalive = conn.keepalive_count(), "reusing pooled connection");
                    return Ok(conn);
                }
                tracing::trace!(key = %key, "discarding stale idle connection");
                conn.close();
            }
            if list.active + list.idle.len() >= max_per_host {
                for mut conn in list.idle.drain(..) {
                    conn.close();
                }
                if list.active >= max_per_host {
                    return Err(HttpError::ConnectionPoolExhausted(key.to_string()));
                }
            }
        }

        let mut conn = Connection::new(host, port, tls);
        conn.connect(connect_timeout).await?;
        conn.note_acquired();
        self.lists.entry(key).or_default().active += 1;
        Ok(conn)
    }

    /// Give a connection back after an exchange. It returns to the idle list
    /// unless the peer asked to close, the socket died, or the keep-alive
    /// budget is spent.
    pub fn return_connection(&mut self, mut conn: Connection, peer_requested_close: bool) {
        let key = conn.pool_key();
        let max_keepalive = self.max_keepalive_requests;
        let Some(list) = self.lists.get_mut(&key) else {
            conn.close();
            return;
        };
        list.active = list.active.saturating_sub(1);
        if peer_requested_close || !conn.is_alive() || conn.keepalive_count() >= max_keepalive {
            tracing::debug!(key = %key, peer_requested_close, "destroying connection");
            conn.close();
        } else {
            conn.mark_idle();
            list.idle.push(conn);
        }
    }

    /// Drop a connection that failed mid-exchange; it never rejoins a list.
    pub fn discard(&mut self, mut conn: Connection) {
        let key = conn.pool_key();
        if let Some(list) = self.lists.get_mut(&key) {
            list.active = list.active.saturating_sub(1);
        }
        conn.close();
    }

    /// Evict idle connections that are dead or older than `max_idle`.
    pub fn cleanup_idle(&mut self) {
        let threshold = self.max_idle;
        self.cleanup_idle_with(threshold);
    }

    fn cleanup_idle_with(&mut self, threshold: Duration) {
        for (key, list) in &mut self.lists {
            list.idle.retain_mut(|conn| {
                let keep = conn.is_alive() && conn.idle_for() <= threshold;
                if !keep {
                    tracing::debug!(key = %key, "evicting idle connection");
                    conn.close();
                }
                keep
            });
        }
    }

    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats {
            idle: 0,
            active: 0,
            pools: self.lists.len(),
        };
        for list in self.lists.values() {
            stats.idle += list.idle.len();
            stats.active += list.active;
        }
        stats
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}
