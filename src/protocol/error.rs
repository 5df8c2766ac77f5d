use std::{io, time::Duration};

use thiserror::Error;

/// Failures surfaced by a single LW3 session.
///
/// None of these are retried internally; the caller decides whether to
/// reopen the session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("no data from device within {after:?}")]
    Timeout { after: Duration },

    #[error("response not framed after {reads} reads ({buffered} bytes buffered)")]
    Framing { reads: usize, buffered: usize },

    #[error("unexpected response for '{path}': {response:?}")]
    UnexpectedResponse { path: String, response: String },

    #[error("device closed the connection before answering '{path}'")]
    PeerClosed { path: String },

    #[error("device rejected '{path}': {message}")]
    Device { path: String, message: String },

    #[error("connection IO error: {0}")]
    Io(#[from] io::Error),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
