//! CMS wire format (RFC 5652) as spoken by the IPS network.
//!
//! Signature (detached, direct):
//!   ContentInfo { id-signedData, SignedData v1 {
//!     digestAlgorithms = { sha1 }, eContentType = id-data, eContent absent,
//!     signerInfos = { v1, issuerAndSerialNumber, sha1, no signedAttrs,
//!                     rsaEncryption, RSASSA-PKCS1-v1_5(SHA-1(content)) } } }
//!
//! Envelope:
//!   ContentInfo { id-envelopedData, EnvelopedData v0 {
//!     recipientInfos = { ktri v0, issuerAndSerialNumber, rsaEncryption,
//!                        RSAES-PKCS1-v1_5(cek) },
//!     encryptedContentInfo = { id-data, des-ede3-cbc(iv), ciphertext } } }

use cms::cert::IssuerAndSerialNumber;
use cms::content_info::ContentInfo;
use cms::enveloped_data::EnvelopedData;
use cms::signed_data::SignedData;
use const_oid::ObjectIdentifier;
use der::asn1::OctetString;
use der::{Any, Decode, Encode};
use spki::AlgorithmIdentifierOwned;
use x509_cert::Certificate;

use crate::error::CryptoError;

// ---------------------------------------------------------------------------
// Object identifiers
// ---------------------------------------------------------------------------

/// id-data (1.2.840.113549.1.7.1)
pub const ID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");

/// id-signedData (1.2.840.113549.1.7.2)
pub const ID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");

/// id-envelopedData (1.2.840.113549.1.7.3)
pub const ID_ENVELOPED_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.3");

/// id-sha1 (1.3.14.3.2.26)
pub const ID_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");

/// rsaEncryption (1.2.840.113549.1.1.1). Used both as the CMS signature
/// algorithm and as the key-transport algorithm.
pub const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

/// sha1WithRSAEncryption (1.2.840.113549.1.1.5). Accepted on verify.
pub const SHA1_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");

/// sha256WithRSAEncryption (1.2.840.113549.1.1.11). Self-signed certificates only.
pub const SHA256_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");

/// des-ede3-cbc (1.2.840.113549.3.7)
pub const DES_EDE3_CBC: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.3.7");

// ---------------------------------------------------------------------------
// Component sizes
// ---------------------------------------------------------------------------

/// Triple-DES key: three 8-byte DES keys.
pub const DES_EDE3_KEY_BYTES: usize = 24;

/// DES block size, also the CBC IV size.
pub const DES_BLOCK_BYTES: usize = 8;

/// SHA-1 digest size.
pub const SHA1_DIGEST_BYTES: usize = 20;

// ---------------------------------------------------------------------------
// Algorithm identifiers
// ---------------------------------------------------------------------------

/// `AlgorithmIdentifier` with explicit NULL parameters.
pub fn algorithm_with_null(oid: ObjectIdentifier) -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid,
        parameters: Some(Any::null()),
    }
}

/// `des-ede3-cbc` identifier carrying the IV as an OCTET STRING parameter.
pub fn des_ede3_cbc(iv: &[u8; DES_BLOCK_BYTES]) -> Result<AlgorithmIdentifierOwned, CryptoError> {
    let iv = OctetString::new(iv.to_vec())?;
    Ok(AlgorithmIdentifierOwned {
        oid: DES_EDE3_CBC,
        parameters: Some(Any::encode_from(&iv)?),
    })
}

/// Pull the IV back out of a `des-ede3-cbc` identifier.
pub fn des_ede3_cbc_iv(alg: &AlgorithmIdentifierOwned) -> Result<[u8; DES_BLOCK_BYTES], CryptoError> {
    if alg.oid != DES_EDE3_CBC {
        return Err(CryptoError::Unsupported(format!(
            "content encryption algorithm {}",
            alg.oid
        )));
    }
    let params = alg
        .parameters
        .as_ref()
        .ok_or_else(|| CryptoError::Malformed("des-ede3-cbc without IV".into()))?;
    let iv = params.decode_as::<OctetString>()?;
    iv.as_bytes()
        .try_into()
        .map_err(|_| CryptoError::Malformed(format!("IV length {}", iv.as_bytes().len())))
}

/// Issuer and serial number of a certificate, the CMS way of naming it.
pub fn issuer_and_serial(cert: &Certificate) -> IssuerAndSerialNumber {
    IssuerAndSerialNumber {
        issuer: cert.tbs_certificate.issuer.clone(),
        serial_number: cert.tbs_certificate.serial_number.clone(),
    }
}

// ---------------------------------------------------------------------------
// ContentInfo framing
// ---------------------------------------------------------------------------

pub fn encode_signed_data(sd: &SignedData) -> Result<Vec<u8>, CryptoError> {
    let ci = ContentInfo {
        content_type: ID_SIGNED_DATA,
        content: Any::encode_from(sd)?,
    };
    Ok(ci.to_der()?)
}

pub fn encode_enveloped_data(ed: &EnvelopedData) -> Result<Vec<u8>, CryptoError> {
    let ci = ContentInfo {
        content_type: ID_ENVELOPED_DATA,
        content: Any::encode_from(ed)?,
    };
    Ok(ci.to_der()?)
}

pub fn decode_signed_data(data: &[u8]) -> Result<SignedData, CryptoError> {
    let ci = ContentInfo::from_der(data)?;
    if ci.content_type != ID_SIGNED_DATA {
        return Err(CryptoError::Unsupported(format!(
            "expected signed data, got {}",
            ci.content_type
        )));
    }
    Ok(ci.content.decode_as::<SignedData>()?)
}

pub fn decode_enveloped_data(data: &[u8]) -> Result<EnvelopedData, CryptoError> {
    let ci = ContentInfo::from_der(data)?;
    if ci.content_type != ID_ENVELOPED_DATA {
        return Err(CryptoError::Unsupported(format!(
            "expected enveloped data, got {}",
            ci.content_type
        )));
    }
    Ok(ci.content.decode_as::<EnvelopedData>()?)
}
