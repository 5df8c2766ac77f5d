use std::fmt;

use rand::Rng;

/// Line terminator for every command and response line.
pub const TERMINATOR: &str = "\r\n";

/// Short random token prefixed to bulk queries so the matching response
/// block can be located in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 2]);

impl Signature {
    pub fn random() -> Self {
        let mut bytes = [0u8; 2];
        rand::thread_rng().fill(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{:02x}", self.0[0], self.0[1])
    }
}

/// Read-only LW3 queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `GET <path>`: a single property value, or the child nodes of a node.
    Get { path: String },
    /// `<sig>#GET <path>.*`: every property of one node.
    GetAll { path: String, signature: Signature },
}

impl Request {
    pub fn get(path: impl Into<String>) -> Self {
        Request::Get { path: path.into() }
    }

    /// Bulk query tagged with a fresh signature.
    pub fn get_all(path: impl Into<String>) -> Self {
        Request::GetAll {
            path: path.into(),
            signature: Signature::random(),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Request::Get { path } | Request::GetAll { path, .. } => path,
        }
    }

    pub fn signature(&self) -> Option<Signature> {
        match self {
            Request::Get { .. } => None,
            Request::GetAll { signature, .. } => Some(*signature),
        }
    }

    /// Wire form, terminator included.
    pub fn encode(&self) -> Vec<u8> {
        format!("{self}{TERMINATOR}").into_bytes()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Get { path } => write!(f, "GET {path}"),
            Request::GetAll { path, signature } => write!(f, "{signature}#GET {path}.*"),
        }
    }
}
