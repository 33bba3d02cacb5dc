//! `IPSAuth` request authentication: canonicalize, CMS-sign, attach header.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use x509_cert::Certificate;

use crate::canonical::{canonicalize, QueryCanonicalization};
use crate::credentials::Credentials;
use crate::engine::CmsEngine;
use crate::error::{CryptoError, ProtocolError, Result};
use crate::transport::ApiRequest;

/// Authorization scheme name.
pub const AUTH_SCHEME: &str = "IPSAuth";

/// Signs outgoing requests on behalf of one participant.
#[derive(Clone, Debug)]
pub struct RequestSigner {
    participant_id: String,
    credentials: Arc<Credentials>,
    engine: CmsEngine,
    query: QueryCanonicalization,
}

impl RequestSigner {
    pub fn new(
        participant_id: impl Into<String>,
        credentials: Arc<Credentials>,
        engine: CmsEngine,
        query: QueryCanonicalization,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            credentials,
            engine,
            query,
        }
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    /// Sign `request` in place and return the canonical string that was signed.
    pub fn sign(&self, request: &mut ApiRequest) -> Result<String> {
        let canonical = canonicalize(request, self.query);
        tracing::trace!(canonical = %canonical, "signing request");

        let signature = self.engine.sign(
            canonical.as_bytes(),
            self.credentials.private_key(),
            self.credentials.certificate(),
        )?;

        let value = authorization_value(&self.participant_id, &signature);
        let header = HeaderValue::from_str(&value).map_err(|_| ProtocolError::InvalidHeader {
            name: AUTHORIZATION.as_str().to_owned(),
        })?;
        request.headers.insert(AUTHORIZATION, header);
        Ok(canonical)
    }
}

/// `IPSAuth <participant>:<base64 signature>`
pub fn authorization_value(participant_id: &str, signature: &[u8]) -> String {
    format!("{} {}:{}", AUTH_SCHEME, participant_id, STANDARD.encode(signature))
}

/// Parsed `Authorization` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Authorization {
    pub participant_id: String,
    pub signature: Vec<u8>,
}

impl Authorization {
    pub fn parse(value: &str) -> std::result::Result<Self, CryptoError> {
        let rest = value
            .strip_prefix(AUTH_SCHEME)
            .and_then(|r| r.strip_prefix(' '))
            .ok_or_else(|| CryptoError::Verification(format!("not an {} header", AUTH_SCHEME)))?;
        let (participant_id, sig_b64) = rest
            .split_once(':')
            .ok_or_else(|| CryptoError::Verification("missing participant separator".into()))?;
        let signature = STANDARD
            .decode(sig_b64.trim())
            .map_err(|e| CryptoError::Verification(format!("signature base64: {}", e)))?;
        Ok(Self {
            participant_id: participant_id.to_owned(),
            signature,
        })
    }
}

/// Check a signed request the way the server does. Returns the participant id.
pub fn verify_request(
    engine: &CmsEngine,
    request: &ApiRequest,
    signer_cert: &Certificate,
    query: QueryCanonicalization,
) -> std::result::Result<String, CryptoError> {
    let header = request
        .header(AUTHORIZATION.as_str())
        .ok_or_else(|| CryptoError::Verification("missing Authorization header".into()))?;
    let auth = Authorization::parse(&header)?;
    let canonical = canonicalize(request, query);
    engine.verify(&auth.signature, canonical.as_bytes(), signer_cert)?;
    Ok(auth.participant_id)
}
