/*
 * sse.rs
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

//! Incremental Server-Sent Events tokenizer (W3C EventSource algorithm).
//! Pure state machine: bytes in, events out, never touches the socket. Input
//! may be partitioned arbitrarily; the emitted event sequence is the same for
//! every partition.
//!
//! The `SseMessage` handed to the sink borrows storage that is reused for the
//! next event. It is valid only for the duration of the callback; a consumer
//! that wants to retain a message must copy it inside the callback (the
//! iterator form in `streaming` does exactly that).

use std::mem;

use crate::error::{HttpError, Result};

/// What to do when an event outgrows `max_event_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseOverflowPolicy {
    /// Fail the stream with `EventTooLarge`.
    ReturnError,
    /// Let the buffers grow on the heap.
    HeapFallback,
}

/// One dispatched SSE event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseMessage {
    pub id: Option<String>,
    pub event: Option<String>,
    /// Multiline `data` fields joined with `\n`; the trailing `\n` is
    /// stripped on emission.
    pub data: String,
    pub retry: Option<u64>,
}

/// Incremental SSE parser. Feed bytes with `parse_chunk`; the sink is called
/// once per dispatched event.
#[derive(Debug)]
pub struct SseParser {
    /// Partial line carried across calls.
    line_buf: Vec<u8>,
    data: String,
    has_data: bool,
    id: Option<String>,
    event: Option<String>,
    retry: Option<u64>,
    last_event_id: Option<String>,
    /// Reused between dispatches; callback-visible strings live here.
    scratch: SseMessage,
    max_event_size: usize,
    overflow: SseOverflowPolicy,
}

impl SseParser {
    pub fn new() -> Self {
        Self::with_policy(SseOverflowPolicy::ReturnError, 1024 * 1024)
    }

    pub fn with_policy(overflow: SseOverflowPolicy, max_event_size: usize) -> Self {
        Self {
            line_buf: Vec::new(),
            data: String::new(),
            has_data: false,
            id: None,
            event: None,
            retry: None,
            last_event_id: None,
            scratch: SseMessage::default(),
            max_event_size,
            overflow,
        }
    }

    /// Last dispatched event id, per the EventSource `Last-Event-ID` rules.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Consume `input`, dispatching zero or more events into `sink`. An error
    /// from the sink aborts parsing and is propagated.
    pub fn parse_chunk<F>(&mut self, input: &[u8], sink: &mut F) -> Result<()>
    where
        F: FnMut(&SseMessage) -> Result<()>,
    {
        let mut rest = input;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let mut line = mem::take(&mut self.line_buf);
            line.extend_from_slice(&rest[..pos]);
            rest = &rest[pos + 1..];
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            self.process_line(&line, sink)?;
            line.clear();
            self.line_buf = line;
        }
        self.check_capacity(rest.len())?;
        self.line_buf.extend_from_slice(rest);
        Ok(())
    }

    fn check_capacity(&self, incoming: usize) -> Result<()> {
        if self.overflow == SseOverflowPolicy::ReturnError
            && self.data.len() + self.line_buf.len() + incoming > self.max_event_size
        {
            return Err(HttpError::EventTooLarge(self.max_event_size));
        }
        Ok(())
    }

    fn process_line<F>(&mut self, line: &[u8], sink: &mut F) -> Result<()>
    where
        F: FnMut(&SseMessage) -> Result<()>,
    {
        if line.is_empty() {
            return self.dispatch(sink);
        }
        if line[0] == b':' {
            return Ok(()); // comment
        }
        let (field, value) = match line.iter().position(|&b| b == b':') {
            Some(colon) => {
                let mut value = &line[colon + 1..];
                if value.first() == Some(&b' ') {
                    value = &value[1..];
                }
                (&line[..colon], value)
            }
            None => (line, &[][..]),
        };
        match field {
            b"data" => {
                self.check_capacity(value.len() + 1)?;
                self.data.push_str(&String::from_utf8_lossy(value));
                self.data.push('\n');
                self.has_data = true;
            }
            b"id" => {
                self.id = Some(String::from_utf8_lossy(value).into_owned());
            }
            b"event" => {
                self.event = Some(String::from_utf8_lossy(value).into_owned());
            }
            b"retry" => {
                if let Ok(text) = std::str::from_utf8(value) {
                    if let Ok(ms) = text.parse::<u64>() {
                        self.retry = Some(ms);
                    }
                }
            }
            _ => {} // unknown fields are ignored
        }
        Ok(())
    }

    /// Empty line: emit iff at least one `data` field was seen, record the
    /// event id into `last_event_id`, reset the builder.
    fn dispatch<F>(&mut self, sink: &mut F) -> Result<()>
    where
        F: FnMut(&SseMessage) -> Result<()>,
    {
        if let Some(id) = &self.id {
            self.last_event_id = Some(id.clone());
        }
        if !self.has_data {
            self.id = None;
            self.event = None;
            self.retry = None;
            return Ok(());
        }
        if self.data.ends_with('\n') {
            self.data.pop();
        }
        self.scratch.data = mem::take(&mut self.data);
        self.scratch.id = self.id.take();
        self.scratch.event = self.event.take();
        self.scratch.retry = self.retry.take();
        self.has_data = false;
        let outcome = sink(&self.scratch);
        // Reclaim the data buffer's capacity for the next event.
        self.data = mem::take(&mut self.scratch.data);
        self.data.clear();
        self.scratch = SseMessage::default();
        outcome
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}
