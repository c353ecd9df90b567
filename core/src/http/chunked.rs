/*
 * chunked.rs
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

//! Incremental chunked-transfer decoder (RFC 7230 §4.1). Pure state machine:
//! bytes in, bytes out, never touches the socket. Input may be partitioned
//! arbitrarily across calls; the decoded output is the same for every
//! partition. Chunk extensions are ignored; trailer headers are consumed and
//! discarded.

use bytes::BytesMut;

use crate::error::{HttpError, Result};

/// Partial size/trailer lines are buffered up to this many bytes.
const MAX_LINE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    WaitingSize,
    ReadingData,
    ReadingDataTrailer,
    ReadingTrailers,
    Complete,
}

/// Streaming chunked decoder. Drive with repeated `parse` calls; check
/// `is_complete` after each.
#[derive(Debug)]
pub struct ChunkedDecoder {
    state: State,
    /// Partial size or trailer line carried across calls.
    line_buf: Vec<u8>,
    expected: u64,
    received: u64,
    /// CR of the post-chunk CRLF already consumed.
    seen_cr: bool,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self {
            state: State::WaitingSize,
            line_buf: Vec::new(),
            expected: 0,
            received: 0,
            seen_cr: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    /// Consume `input`, appending decoded chunk data to `out`. Returns the
    /// number of bytes appended. Once complete, further calls are no-ops.
    pub fn parse(&mut self, input: &[u8], out: &mut BytesMut) -> Result<usize> {
        let mut rest = input;
        let mut appended = 0usize;
        loop {
            match self.state {
                State::WaitingSize => {
                    let line = match self.take_line(&mut rest)? {
                        Some(line) => line,
                        None => return Ok(appended),
                    };
                    let text = std::str::from_utf8(&line).map_err(|_| HttpError::InvalidChunkSize)?;
                    let hex = text.split(';').next().unwrap_or(text).trim();
                    let size = u64::from_str_radix(hex, 16).map_err(|_| HttpError::InvalidChunkSize)?;
                    if size == 0 {
                        self.state = State::ReadingTrailers;
                    } else {
                        self.expected = size;
                        self.received = 0;
                        self.state = State::ReadingData;
                    }
                }
                State::ReadingData => {
                    let want = (self.expected - self.received) as usize;
                    let take = want.min(rest.len());
                    out.extend_from_slice(&rest[..take]);
                    appended += take;
                    self.received += take as u64;
                    rest = &rest[take..];
                    if self.received == self.expected {
                        self.seen_cr = false;
                        self.state = State::ReadingDataTrailer;
                    } else {
                        return Ok(appended);
                    }
                }
                State::ReadingDataTrailer => {
                    // Exactly CRLF, possibly split across calls.
                    while self.state == State::ReadingDataTrailer {
                        let Some((&b, tail)) = rest.split_first() else {
                            return Ok(appended);
                        };
                        rest = tail;
                        if !self.seen_cr {
                            if b != b'\r' {
                                return Err(HttpError::MalformedChunk);
                            }
                            self.seen_cr = true;
                        } else {
                            if b != b'\n' {
                                return Err(HttpError::MalformedChunk);
                            }
                            self.seen_cr = false;
                            self.state = State::WaitingSize;
                        }
                    }
                }
                State::ReadingTrailers => {
                    let line = match self.take_line(&mut rest)? {
                        Some(line) => line,
                        None => return Ok(appended),
                    };
                    if line.is_empty() {
                        self.state = State::Complete;
                    }
                    // Trailer header contents are not surfaced.
                }
                State::Complete => return Ok(appended),
            }
        }
    }

    /// Pull one `\n`-terminated line out of `rest`, combining with the
    /// carried partial line. A trailing `\r` is trimmed. Returns None when
    /// no full line is available yet.
    fn take_line(&mut self, rest: &mut &[u8]) -> Result<Option<Vec<u8>>> {
        match rest.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let mut line = std::mem::take(&mut self.line_buf);
                line.extend_from_slice(&rest[..pos]);
                *rest = &rest[pos + 1..];
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                Ok(Some(line))
            }
            None => {
                if self.line_buf.len() + rest.len() > MAX_LINE {
                    return Err(HttpError::InvalidChunkSize);
                }
                self.line_buf.extend_from_slice(rest);
                *rest = &[];
                Ok(None)
            }
        }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}
