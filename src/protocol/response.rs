//! Parsers for the three LW3 response shapes.
//!
//! Every response line echoes the queried path. A line is tokenized once:
//! the method code before the path, one delimiter character after it, and
//! the payload that follows.
//!
//! ```text
//! pr /MEDIA/XP/VIDEO.DestinationConnectionStatus=I1;0;   value
//! n- /MEDIA/PORTS/VIDEO/I1                                node
//! pr /SYS/HSMB/FANCONTROL.Fan1Pwm=50                      property (inside a bulk block)
//! pE /SYS/NOPE %E001:Not exists                           device error
//! ```
//!
//! Lines that cannot be tokenized are skipped and reported through
//! [`Parsed::skipped`]; device error lines fail the whole response. A last
//! line without `\r\n` was cut off by the device hanging up and is never
//! taken as payload.
use std::collections::HashMap;

use log::warn;
use thiserror::Error;

use super::{ProtocolError, ProtocolResult, Signature, request::TERMINATOR};

pub type NodeList = Vec<String>;

/// Why a response line was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFault {
    /// The queried path does not appear in the line.
    MissingPath,
    /// Nothing follows the path, or a property has no `=`.
    MissingSeparator,
    /// A node or property name is empty.
    EmptyName,
    /// The device closed the connection partway through the line.
    Truncated,
}

impl std::fmt::Display for LineFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            LineFault::MissingPath => "path not found",
            LineFault::MissingSeparator => "missing separator",
            LineFault::EmptyName => "empty name",
            LineFault::Truncated => "truncated",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("skipped line {line:?}: {fault}")]
pub struct MalformedLine {
    pub line: String,
    pub fault: LineFault,
}

/// Parser output together with the lines that had to be skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed<T> {
    pub value: T,
    pub skipped: Vec<MalformedLine>,
}

impl<T> Parsed<T> {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// True when no line was skipped.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Properties of one node in response order. A `None` value means the
/// device sent an empty value.
///
/// Entries stay in a `Vec` for ordering; `index` maps each key to its slot so
/// inserts and lookups do not scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyMap {
    entries: Vec<(String, Option<String>)>,
    index: HashMap<String, usize>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a property, keeping its original position when it
    /// already exists.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: Option<String>,
    ) -> Option<Option<String>> {
        let key = key.into();
        match self.index.get(&key) {
            Some(&slot) => Some(std::mem::replace(&mut self.entries[slot].1, value)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    /// `None` if the key is absent, `Some(None)` if its value was empty.
    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.index
            .get(key)
            .map(|&slot| self.entries[slot].1.as_deref())
    }

    /// Non-empty value of `key`.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.get(key).flatten()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

impl IntoIterator for PropertyMap {
    type Item = (String, Option<String>);
    type IntoIter = std::vec::IntoIter<(String, Option<String>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

enum Token<'a> {
    Payload(&'a str),
    Echo,
    DeviceError(&'a str),
    Fault(LineFault),
}

fn tokenize<'a>(line: &'a str, path: &str) -> Token<'a> {
    let Some(at) = line.find(path) else {
        return Token::Fault(LineFault::MissingPath);
    };
    let method = line[..at].trim();
    let after = &line[at + path.len()..];

    if method == "GET" || method.ends_with("#GET") {
        return Token::Echo;
    }

    let mut chars = after.chars();
    if chars.next().is_none() {
        return Token::Fault(LineFault::MissingSeparator);
    }
    let payload = chars.as_str();

    if method.len() == 2 && method.ends_with('E') {
        Token::DeviceError(payload.trim())
    } else {
        Token::Payload(payload)
    }
}

/// Split `text` into its `\r\n`-terminated part and a trailing partial line.
fn terminated(text: &str) -> (&str, Option<&str>) {
    let end = text
        .rfind(TERMINATOR)
        .map_or(0, |at| at + TERMINATOR.len());
    let (complete, rest) = text.split_at(end);
    (complete, Some(rest).filter(|rest| !rest.trim().is_empty()))
}

fn lines(text: &str) -> impl Iterator<Item = &str> {
    text.split(TERMINATOR)
        .map(|line| line.trim_matches(['\r', '\n']))
        .filter(|line| !line.trim().is_empty())
}

fn device_error(path: &str, message: &str) -> ProtocolError {
    ProtocolError::Device {
        path: path.to_string(),
        message: message.to_string(),
    }
}

fn skip(skipped: &mut Vec<MalformedLine>, path: &str, line: &str, fault: LineFault) {
    let malformed = MalformedLine {
        line: line.to_string(),
        fault,
    };
    warn!("{path}: {malformed}");
    skipped.push(malformed);
}

/// Value of a single-property response.
pub fn parse_value(text: &str, path: &str) -> ProtocolResult<String> {
    let (complete, _) = terminated(text);
    for line in lines(complete) {
        match tokenize(line, path) {
            Token::Payload(value) => return Ok(value.trim_end().to_string()),
            Token::DeviceError(message) => return Err(device_error(path, message)),
            Token::Echo | Token::Fault(_) => continue,
        }
    }

    Err(ProtocolError::UnexpectedResponse {
        path: path.to_string(),
        response: text.to_string(),
    })
}

/// Child node names, in the order the device listed them. A response with
/// no node line at all is an [`ProtocolError::UnexpectedResponse`].
pub fn parse_nodes(text: &str, path: &str) -> ProtocolResult<Parsed<NodeList>> {
    let mut nodes = NodeList::new();
    let mut skipped = Vec::new();
    let (complete, partial) = terminated(text);

    for line in lines(complete) {
        match tokenize(line, path) {
            Token::Payload(name) => match name.trim_end() {
                "" => skip(&mut skipped, path, line, LineFault::EmptyName),
                name => nodes.push(name.to_string()),
            },
            Token::Echo => {}
            Token::DeviceError(message) => return Err(device_error(path, message)),
            Token::Fault(fault) => skip(&mut skipped, path, line, fault),
        }
    }
    if let Some(line) = partial {
        skip(&mut skipped, path, line, LineFault::Truncated);
    }

    if nodes.is_empty() && skipped.is_empty() {
        return Err(ProtocolError::UnexpectedResponse {
            path: path.to_string(),
            response: text.to_string(),
        });
    }

    Ok(Parsed {
        value: nodes,
        skipped,
    })
}

/// Properties from a `<sig>#{ ... }` bulk block.
pub fn parse_properties(
    text: &str,
    path: &str,
    signature: Signature,
) -> ProtocolResult<Parsed<PropertyMap>> {
    let unexpected = || ProtocolError::UnexpectedResponse {
        path: path.to_string(),
        response: text.to_string(),
    };

    let header = format!("{signature}#{{");
    let start = text.find(&header).ok_or_else(unexpected)? + header.len();
    let block = &text[start..];
    let block = &block[..block.rfind('}').ok_or_else(unexpected)?];

    let mut properties = PropertyMap::new();
    let mut skipped = Vec::new();

    for line in lines(block) {
        let payload = match tokenize(line, path) {
            Token::Payload(payload) => payload,
            Token::Echo => continue,
            Token::DeviceError(message) => return Err(device_error(path, message)),
            Token::Fault(fault) => {
                skip(&mut skipped, path, line, fault);
                continue;
            }
        };

        match payload.split_once('=') {
            Some(("", _)) => skip(&mut skipped, path, line, LineFault::EmptyName),
            Some((key, value)) => {
                let value = (!value.is_empty()).then(|| value.to_string());
                properties.insert(key, value);
            }
            None => skip(&mut skipped, path, line, LineFault::MissingSeparator),
        }
    }

    Ok(Parsed {
        value: properties,
        skipped,
    })
}
