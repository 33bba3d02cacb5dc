//! Error taxonomy for the IPS client.
//!
//! Every public operation returns [`Error`], which is exactly one of four kinds:
//! a local cryptographic failure, a transport failure, a contract mismatch with
//! the server, or a rejection reported by the server.

use std::fmt;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Rejected(#[from] RemoteRejection),
}

/// Discriminant of [`Error`], for callers that only need to branch on the kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Crypto,
    Transport,
    Protocol,
    Rejected,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Crypto(_) => ErrorKind::Crypto,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Rejected(_) => ErrorKind::Rejected,
        }
    }

    /// The server rejection, if this error is one.
    pub fn as_rejection(&self) -> Option<&RemoteRejection> {
        match self {
            Self::Rejected(r) => Some(r),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Crypto => write!(f, "crypto"),
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::Protocol => write!(f, "protocol"),
            ErrorKind::Rejected => write!(f, "rejected"),
        }
    }
}

// ---------------------------------------------------------------------------
// Crypto
// ---------------------------------------------------------------------------

/// Signing, encryption, decryption and credential failures. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),
    #[error("invalid private key: {0}")]
    InvalidKey(String),
    #[error("private key does not match certificate public key")]
    KeyMismatch,
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("signature verification failed: {0}")]
    Verification(String),
    #[error("encryption failed: {0}")]
    Encryption(String),
    #[error("decryption failed: {0}")]
    Decryption(String),
    #[error("no recipient info")]
    NoRecipientInfo,
    #[error("unsupported CMS structure: {0}")]
    Unsupported(String),
    #[error("malformed CMS structure: {0}")]
    Malformed(String),
}

impl From<der::Error> for CryptoError {
    fn from(e: der::Error) -> Self {
        CryptoError::Malformed(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Network or I/O failure during a round-trip. Surfaced verbatim, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("http transport error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else {
            TransportError::Http(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

/// The server answered, but not in the shape this client expects.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The link map was fetched but has no entry for this relation.
    #[error("relation not found in link map: {0}")]
    RelationNotFound(String),
    #[error("link discovery response has no links")]
    MissingLinks,
    #[error("failed to parse {what}: {source}")]
    Json {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("message content is not valid base64: {0}")]
    InvalidContent(String),
    #[error("message has no content")]
    MissingContent,
    #[error("decrypted content is not valid UTF-8")]
    NonUtf8Content,
    #[error("invalid header value for {name}")]
    InvalidHeader { name: String },
}

// ---------------------------------------------------------------------------
// Remote rejection
// ---------------------------------------------------------------------------

/// A non-2xx answer. The client never infers server state from it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("server rejected request with status {status}{}", reason_suffix(.reason))]
pub struct RemoteRejection {
    pub status: u16,
    /// Reason reported by the server, when the body carried one.
    pub reason: Option<String>,
    /// Raw response body (lossily decoded).
    pub body: String,
}

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(r) => format!(": {}", r),
        None => String::new(),
    }
}

impl RemoteRejection {
    /// Build from a status and raw body, pulling a reason out of a JSON body
    /// when one of the usual fields is present.
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let text = String::from_utf8_lossy(body).into_owned();
        let reason = serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                ["message", "error", "reason", "stateDescrip"]
                    .iter()
                    .find_map(|k| v.get(*k).and_then(|r| r.as_str()).map(str::to_owned))
            })
            .or_else(|| {
                let trimmed = text.trim();
                (!trimmed.is_empty() && !trimmed.starts_with('{')).then(|| trimmed.to_owned())
            });
        Self {
            status,
            reason,
            body: text,
        }
    }

    /// 409 is what the network answers for a duplicate `ref` or a transition
    /// out of a terminal state.
    pub fn is_conflict(&self) -> bool {
        self.status == 409
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Raised while assembling configuration from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}
