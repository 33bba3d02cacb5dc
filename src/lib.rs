//! # IPS client
//!
//! Client for an interbank instant-payment messaging network. Every request
//! is signed with a detached CMS signature over a canonical rendering of the
//! request; message payloads travel as CMS enveloped data encrypted for the
//! receiving participant.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ips_client::{ApiClient, ClientConfig, Credentials, OutgoingPayment};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let creds = Credentials::from_files(Path::new("key.pem"), Path::new("cert.pem"))?;
//! let client = ApiClient::connect(ClientConfig::new("https://ips.example.com", "BANKLV22"), creds)?;
//!
//! let inbox = client.browse_inbox(false)?;
//! for message in &inbox.items {
//!     println!("{}", client.decrypt(message)?);
//!     if let Some(id) = message.id {
//!         client.complete(id)?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Wire algorithms
//!
//! - **Signatures**: SHA-1 with RSA PKCS#1 v1.5, no signed attributes, detached
//! - **Payloads**: DES-EDE3-CBC content key, RSA PKCS#1 v1.5 key transport
//! - **Authorization**: `IPSAuth <participant>:<base64 signature>`
//!
//! These are fixed by the network, not choices of this crate.

#![deny(unsafe_code)]

// ---------------------------------------------------------------------------
// Modules
// ---------------------------------------------------------------------------

pub mod auth;
pub mod canonical;
pub mod client;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod links;
pub mod message;
pub mod transport;

// DER layout helpers; exposed for the fuzz targets and interop tooling.
#[doc(hidden)]
pub mod wire;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use auth::{authorization_value, verify_request, Authorization, RequestSigner, AUTH_SCHEME};
pub use canonical::{canonicalize, QueryCanonicalization};
pub use client::ApiClient;
pub use config::{ClientConfig, CredentialPaths};
pub use credentials::{load_certificate, load_private_key, Credentials};
pub use engine::{public_key_of, CmsEngine};
pub use error::{
    ConfigError, CryptoError, Error, ErrorKind, ProtocolError, RemoteRejection, Result,
    TransportError,
};
pub use links::{LinkMap, LinkResolver};
pub use message::{
    Amount, Message, MessageCollection, MessageState, OutgoingPayment, StateChange,
};
pub use transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport};

// Types appearing in the public API.
pub use rsa::RsaPrivateKey;
pub use x509_cert::Certificate;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
