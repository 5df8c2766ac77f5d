//! Textual query commands.
//!
//! This module defines the [`Command`] enum, the user-facing form of the three
//! read-only LW3 queries, together with parsing from a command string and
//! rendering of query results.
//!
//! # Overview
//! The supported commands are:
//!
//! - `get <path>`: value of one property. `get <path>.*` is read as `props <path>`.
//! - `nodes <path>` (or `ls <path>`): child nodes of a node.
//! - `props <path>`: every property of a node.
//! - `.exit`: end the session.
//!
//! Keywords are case-insensitive; paths are passed to the device verbatim.
//!
//! # Example
//! ```rust
//! use lw3probe::Command;
//!
//! let cmd: Command = "props /SYS/HSMB/FANCONTROL".try_into().unwrap();
//! assert_eq!(cmd, Command::Properties("/SYS/HSMB/FANCONTROL".to_string()));
//! ```
use std::fmt;

use thiserror::Error;

use crate::protocol::{
    DeviceStream, Lw3Client, NodeList, Parsed, PropertyMap, ProtocolResult,
};

/// List of possible errors when parsing a command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),

    #[error("'{command}' requires a node path. Example: {command} /MEDIA/PORTS/VIDEO")]
    MissingPath { command: String },

    #[error("invalid path '{0}'; node paths start with '/'")]
    InvalidPath(String),

    #[error("no command provided")]
    Empty,
}

/// Read-only query a user can issue against a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Close the session.
    Exit,
    /// Single property value.
    Get(String),
    /// Child node listing.
    Nodes(String),
    /// All properties of one node.
    Properties(String),
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut parts = value.split_whitespace();
        let Some(keyword) = parts.next() else {
            return Err(CommandError::Empty);
        };
        let keyword = keyword.to_lowercase();

        if keyword == ".exit" {
            return Ok(Command::Exit);
        }
        if !matches!(keyword.as_str(), "get" | "nodes" | "ls" | "props") {
            return Err(CommandError::UnrecognizedCommand(value.trim().to_string()));
        }

        let path = parts
            .next()
            .ok_or_else(|| CommandError::MissingPath {
                command: keyword.clone(),
            })?
            .to_string();
        if !path.starts_with('/') {
            return Err(CommandError::InvalidPath(path));
        }

        Ok(match keyword.as_str() {
            "get" => match path.strip_suffix(".*") {
                Some(node) => Command::Properties(node.to_string()),
                None => Command::Get(path),
            },
            "nodes" | "ls" => Command::Nodes(path),
            _ => Command::Properties(path),
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Exit => write!(f, ".exit"),
            Command::Get(path) => write!(f, "get {path}"),
            Command::Nodes(path) => write!(f, "nodes {path}"),
            Command::Properties(path) => write!(f, "props {path}"),
        }
    }
}

impl Command {
    pub fn path(&self) -> Option<&str> {
        match self {
            Command::Exit => None,
            Command::Get(path) | Command::Nodes(path) | Command::Properties(path) => Some(path),
        }
    }

    /// Run the query on `client`. `Exit` yields `None`.
    pub fn execute<S: DeviceStream>(
        &self,
        client: &mut Lw3Client<S>,
    ) -> ProtocolResult<Option<Outcome>> {
        let outcome = match self {
            Command::Exit => return Ok(None),
            Command::Get(path) => Outcome::Value(client.get(path)?),
            Command::Nodes(path) => Outcome::Nodes(client.get_nodes(path)?),
            Command::Properties(path) => Outcome::Properties(client.get_properties(path)?),
        };
        Ok(Some(outcome))
    }
}

/// Result of one executed [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Value(String),
    Nodes(Parsed<NodeList>),
    Properties(Parsed<PropertyMap>),
}

impl Outcome {
    /// One output line per value, node or property. Empty property values
    /// render as `key=`.
    pub fn lines(&self) -> Vec<String> {
        match self {
            Outcome::Value(value) => vec![value.clone()],
            Outcome::Nodes(nodes) => nodes.value.clone(),
            Outcome::Properties(props) => props
                .value
                .iter()
                .map(|(key, value)| format!("{key}={}", value.unwrap_or_default()))
                .collect(),
        }
    }

    pub fn skipped_count(&self) -> usize {
        match self {
            Outcome::Value(_) => 0,
            Outcome::Nodes(nodes) => nodes.skipped_count(),
            Outcome::Properties(props) => props.skipped_count(),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lines().join("\n"))?;
        match self.skipped_count() {
            0 => Ok(()),
            n => write!(f, "\n({n} malformed lines skipped)"),
        }
    }
}
