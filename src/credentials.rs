//! Participant credentials: RSA private key + X.509 certificate.
//!
//! Loading accepts PEM or DER, PKCS#8 or PKCS#1 keys. Self-signed generation
//! exists for test networks and for the `keygen` command.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use der::asn1::BitString;
use der::pem::LineEnding;
use der::{Decode, DecodePem, Encode, EncodePem};
use rand_core::{OsRng, RngCore};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey};
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha2::{Digest, Sha256};
use spki::SubjectPublicKeyInfoOwned;
use x509_cert::certificate::{TbsCertificate, Version};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Validity;
use x509_cert::Certificate;
use zeroize::Zeroizing;

use crate::engine::public_key_of;
use crate::error::CryptoError;
use crate::wire::{algorithm_with_null, SHA256_WITH_RSA};

/// Default validity of generated certificates.
pub const SELF_SIGNED_VALIDITY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A private key together with the certificate that publishes its public half.
pub struct Credentials {
    private_key: RsaPrivateKey,
    certificate: Certificate,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("subject", &self.certificate.tbs_certificate.subject.to_string())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Pair a key with a certificate, refusing mismatched halves.
    pub fn new(private_key: RsaPrivateKey, certificate: Certificate) -> Result<Self, CryptoError> {
        if private_key.to_public_key() != public_key_of(&certificate)? {
            return Err(CryptoError::KeyMismatch);
        }
        Ok(Self {
            private_key,
            certificate,
        })
    }

    /// Load from a key file and a certificate file.
    pub fn from_files(key_path: &Path, cert_path: &Path) -> Result<Self, CryptoError> {
        let key_bytes = Zeroizing::new(std::fs::read(key_path).map_err(|e| {
            CryptoError::InvalidKey(format!("read {}: {}", key_path.display(), e))
        })?);
        let cert_bytes = std::fs::read(cert_path).map_err(|e| {
            CryptoError::InvalidCertificate(format!("read {}: {}", cert_path.display(), e))
        })?;
        Self::new(load_private_key(&key_bytes)?, load_certificate(&cert_bytes)?)
    }

    /// Fresh RSA key and a self-signed certificate with subject `CN=<common_name>`.
    pub fn generate_self_signed(common_name: &str, bits: usize) -> Result<Self, CryptoError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::InvalidKey(format!("keygen: {}", e)))?;

        let spki_doc = private_key
            .to_public_key()
            .to_public_key_der()
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let subject_public_key_info = SubjectPublicKeyInfoOwned::from_der(spki_doc.as_bytes())?;

        let name = Name::from_str(&format!("CN={}", common_name))?;

        // Positive, non-zero 16-byte serial.
        let mut serial = [0u8; 16];
        OsRng.fill_bytes(&mut serial);
        serial[0] = (serial[0] & 0x7F) | 0x01;

        let tbs_certificate = TbsCertificate {
            version: Version::V3,
            serial_number: SerialNumber::new(&serial)?,
            signature: algorithm_with_null(SHA256_WITH_RSA),
            issuer: name.clone(),
            validity: Validity::from_now(SELF_SIGNED_VALIDITY)?,
            subject: name,
            subject_public_key_info,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: None,
        };

        let digest = Sha256::digest(tbs_certificate.to_der()?);
        let signature = private_key
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map_err(|e| CryptoError::Signing(e.to_string()))?;

        let certificate = Certificate {
            tbs_certificate,
            signature_algorithm: algorithm_with_null(SHA256_WITH_RSA),
            signature: BitString::from_bytes(&signature)?,
        };

        Ok(Self {
            private_key,
            certificate,
        })
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// PKCS#8 PEM of the private key.
    pub fn private_key_pem(&self) -> Result<Zeroizing<String>, CryptoError> {
        self.private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    pub fn certificate_pem(&self) -> Result<String, CryptoError> {
        Ok(self.certificate.to_pem(LineEnding::LF)?)
    }
}

/// Parse an RSA private key (PKCS#8 or PKCS#1, PEM or DER).
pub fn load_private_key(bytes: &[u8]) -> Result<RsaPrivateKey, CryptoError> {
    let parsed = match pem_text(bytes) {
        Some(text) => RsaPrivateKey::from_pkcs8_pem(text)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(text))
            .map_err(|e| e.to_string()),
        None => RsaPrivateKey::from_pkcs8_der(bytes)
            .or_else(|_| RsaPrivateKey::from_pkcs1_der(bytes))
            .map_err(|e| e.to_string()),
    };
    parsed.map_err(CryptoError::InvalidKey)
}

/// Parse an X.509 certificate (PEM or DER).
pub fn load_certificate(bytes: &[u8]) -> Result<Certificate, CryptoError> {
    let parsed = match pem_text(bytes) {
        Some(text) => Certificate::from_pem(text.as_bytes()),
        None => Certificate::from_der(bytes),
    };
    parsed.map_err(|e| CryptoError::InvalidCertificate(e.to_string()))
}

fn pem_text(bytes: &[u8]) -> Option<&str> {
    std::str::from_utf8(bytes)
        .ok()
        .map(str::trim)
        .filter(|t| t.starts_with("-----BEGIN"))
}

/// Shared credentials for unit tests; RSA keygen is slow in debug builds.
#[cfg(test)]
pub(crate) fn test_credentials() -> &'static Credentials {
    use std::sync::OnceLock;
    static CREDS: OnceLock<Credentials> = OnceLock::new();
    CREDS.get_or_init(|| Credentials::generate_self_signed("BANKTEST", 1024).unwrap())
}
