//! Response framing over an unframed byte stream.
//!
//! LW3 responses carry no length prefix. The reader accumulates chunks until
//! a terminator predicate holds, bounded by a fixed number of reads so a
//! stalled or misbehaving device cannot keep a session reading forever.
//!
//! # Termination
//!
//! - [`Terminator::Line`]: single values and node listings end with `\r\n`.
//! - [`Terminator::Block`]: bulk property blocks end with `}\r\n`.
//!
//! An empty chunk (peer closed) always frames the response. The
//! [`RawResponse`] remembers it, so parsers can tell a cut-off last line
//! from a complete one.
//!
//! [`Termination::LatestChunk`] only looks at the most recent chunk. When a
//! terminator is split across two reads the response is not recognized as
//! complete and the read bound ends the exchange with
//! [`ProtocolError::Framing`]. [`Termination::BufferTail`] inspects the tail
//! of the whole buffer instead and has no such failure mode.
use std::borrow::Cow;

use log::debug;

use super::{Connection, DeviceStream, ProtocolError, ProtocolResult, Request};

/// Reads allowed per response before giving up.
pub const MAX_READS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    Line,
    Block,
}

impl Terminator {
    pub fn for_request(request: &Request) -> Self {
        match request {
            Request::Get { .. } => Terminator::Line,
            Request::GetAll { .. } => Terminator::Block,
        }
    }

    fn sequence(self) -> &'static [u8] {
        match self {
            Terminator::Line => b"\r\n",
            Terminator::Block => b"}\r\n",
        }
    }
}

/// Which bytes the terminator predicate inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Termination {
    #[default]
    LatestChunk,
    BufferTail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    Reading,
    Framed,
    BoundExceeded,
}

/// Bytes of one framed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    bytes: Vec<u8>,
    reads: usize,
    closed_by_peer: bool,
}

impl RawResponse {
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of chunks it took to frame the response.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// The device hung up instead of finishing the response with a
    /// terminator.
    pub fn closed_by_peer(&self) -> bool {
        self.closed_by_peer
    }
}

#[derive(Debug)]
pub struct StreamReader {
    terminator: Terminator,
    termination: Termination,
    max_reads: usize,
    state: ReadState,
    buffer: Vec<u8>,
    reads: usize,
    closed_by_peer: bool,
}

impl StreamReader {
    pub fn new(terminator: Terminator, termination: Termination, max_reads: usize) -> Self {
        Self {
            terminator,
            termination,
            max_reads: max_reads.max(1),
            state: ReadState::Reading,
            buffer: Vec::new(),
            reads: 0,
            closed_by_peer: false,
        }
    }

    pub fn state(&self) -> ReadState {
        self.state
    }

    /// Append one chunk and advance the state machine. Chunks fed after the
    /// reader left [`ReadState::Reading`] are ignored.
    pub fn feed(&mut self, chunk: &[u8]) -> ReadState {
        if self.state != ReadState::Reading {
            return self.state;
        }

        self.reads += 1;
        self.buffer.extend_from_slice(chunk);
        self.closed_by_peer = chunk.is_empty();

        self.state = if self.is_terminated(chunk) {
            ReadState::Framed
        } else if self.reads >= self.max_reads {
            ReadState::BoundExceeded
        } else {
            ReadState::Reading
        };
        self.state
    }

    /// Drive the reader from `conn` until the response is framed.
    pub fn read_from<S: DeviceStream>(
        mut self,
        conn: &mut Connection<S>,
    ) -> ProtocolResult<RawResponse> {
        loop {
            match self.state {
                ReadState::Reading => {
                    let chunk = conn.read_chunk()?;
                    self.feed(&chunk);
                }
                ReadState::Framed => {
                    debug!(
                        "{} framed {} bytes in {} reads",
                        conn.peer(),
                        self.buffer.len(),
                        self.reads
                    );
                    return Ok(RawResponse {
                        bytes: self.buffer,
                        reads: self.reads,
                        closed_by_peer: self.closed_by_peer,
                    });
                }
                ReadState::BoundExceeded => {
                    return Err(ProtocolError::Framing {
                        reads: self.reads,
                        buffered: self.buffer.len(),
                    });
                }
            }
        }
    }

    fn is_terminated(&self, chunk: &[u8]) -> bool {
        if chunk.is_empty() {
            return true;
        }

        let sequence = self.terminator.sequence();
        match self.termination {
            Termination::LatestChunk => chunk.ends_with(sequence),
            Termination::BufferTail => self.buffer.ends_with(sequence),
        }
    }
}
