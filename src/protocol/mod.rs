//! LW3 client protocol.
//!
//! This module implements the read-only half of the LW3 protocol spoken by
//! Lightware matrix switchers: a persistent TCP session over which the client
//! sends line-terminated `GET` commands and reads back text responses that
//! carry no length prefix.
//!
//! # Overview
//!
//! A query flows strictly downward through the layers:
//!
//! 1. [`Request`] builds the command text.
//! 2. [`Connection`] writes it to the device socket.
//! 3. [`StreamReader`] accumulates chunks until the response is framed.
//! 4. One of the parsers in [`response`] extracts the payload.
//!
//! [`Lw3Client`] composes those steps behind three operations:
//! [`get`](Lw3Client::get), [`get_nodes`](Lw3Client::get_nodes) and
//! [`get_properties`](Lw3Client::get_properties).
//!
//! # Wire Format
//!
//! Commands are ASCII lines terminated by `\r\n`:
//!
//! - `GET <path>` for a single property or the child nodes of a node.
//! - `<sig>#GET <path>.*` for all properties of a node, where `<sig>` is four
//!   random hex characters identifying the response block.
//!
//! Responses echo the queried path on every line. Bulk responses are wrapped
//! in a block:
//!
//! ```text
//! 1a2b#{
//! pr /SYS/HSMB/FANCONTROL.Fan1Pwm=50
//! pr /SYS/HSMB/FANCONTROL.Fan2Pwm=
//! }
//! ```
//!
//! # Sessions
//!
//! A session is strictly sequential: a command is only sent once the previous
//! response was framed or failed. Querying several devices means one
//! [`Lw3Client`] per device; see [`SessionPool`] for running them side by side.
//! The socket is shut down when the client is closed or dropped, including on
//! error paths.
//!
//! # Example
//! ```no_run
//! use lw3probe::protocol::{ClientConfig, Lw3Client, DEFAULT_PORT};
//!
//! let config = ClientConfig::default();
//! let mut client = Lw3Client::connect("10.0.0.20", DEFAULT_PORT, config).unwrap();
//! let fans = client.get_properties("/SYS/HSMB/FANCONTROL").unwrap();
//! println!("{:?}", fans.value.value("MaximalCurrentTemperature"));
//! ```
mod client;
mod error;
mod reader;
mod request;
pub mod response;
#[cfg(test)]
pub(crate) mod testing;
mod thread;
mod transport;

pub use client::{ClientConfig, Lw3Client};
pub use error::{ProtocolError, ProtocolResult};
pub use reader::{MAX_READS, RawResponse, ReadState, StreamReader, Termination, Terminator};
pub use request::{Request, Signature};
pub use response::{LineFault, MalformedLine, NodeList, Parsed, PropertyMap};
pub use thread::SessionPool;
pub use transport::{CHUNK_SIZE, Connection, DEFAULT_PORT, DEFAULT_TIMEOUT, DeviceStream};
