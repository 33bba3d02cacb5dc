//! CMS crypto engine: detached signing, enveloped encryption and decryption.
//!
//! Algorithms are fixed by the network and are legacy choices:
//! SHA-1 with RSA PKCS#1 v1.5 for signatures, DES-EDE3-CBC for content
//! encryption, RSA PKCS#1 v1.5 for key transport. Do not change them without a
//! protocol revision on the server side.

use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cms::content_info::CmsVersion;
use cms::enveloped_data::{
    EncryptedContentInfo, EnvelopedData, KeyTransRecipientInfo, RecipientIdentifier,
    RecipientInfo, RecipientInfos,
};
use cms::signed_data::{
    EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo, SignerInfos,
};
use der::asn1::{OctetString, SetOfVec};
use des::TdesEde3;
use rand_core::{OsRng, RngCore};
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};
use x509_cert::Certificate;
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::wire::{
    self, DES_BLOCK_BYTES, DES_EDE3_KEY_BYTES, ID_DATA, ID_SHA1, RSA_ENCRYPTION, SHA1_WITH_RSA,
};

type TdesCbcEnc = cbc::Encryptor<TdesEde3>;
type TdesCbcDec = cbc::Decryptor<TdesEde3>;

/// RSA public key carried by a certificate.
pub fn public_key_of(cert: &Certificate) -> Result<RsaPublicKey, CryptoError> {
    let spki = der::Encode::to_der(&cert.tbs_certificate.subject_public_key_info)?;
    RsaPublicKey::from_public_key_der(&spki)
        .map_err(|e| CryptoError::InvalidCertificate(format!("not an RSA key: {}", e)))
}

/// Handle for the CMS primitives.
///
/// Holds no secrets and no global state; create one per client (or per test)
/// and pass it where signing or encryption happens.
#[derive(Clone, Debug, Default)]
pub struct CmsEngine {
    _private: (),
}

impl CmsEngine {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Detached direct signature over `content`.
    ///
    /// The content is not embedded and no signed attributes are produced: the
    /// RSA signature covers SHA-1(content) directly. Returns the DER
    /// `ContentInfo`.
    pub fn sign(
        &self,
        content: &[u8],
        key: &RsaPrivateKey,
        cert: &Certificate,
    ) -> Result<Vec<u8>, CryptoError> {
        if key.to_public_key() != public_key_of(cert)? {
            return Err(CryptoError::KeyMismatch);
        }

        let digest = Sha1::digest(content);
        let signature = key
            .sign(Pkcs1v15Sign::new::<Sha1>(), &digest)
            .map_err(|e| CryptoError::Signing(e.to_string()))?;

        let signer_info = SignerInfo {
            version: CmsVersion::V1,
            sid: SignerIdentifier::IssuerAndSerialNumber(wire::issuer_and_serial(cert)),
            digest_alg: wire::algorithm_with_null(ID_SHA1),
            signed_attrs: None,
            signature_algorithm: wire::algorithm_with_null(RSA_ENCRYPTION),
            signature: OctetString::new(signature)?,
            unsigned_attrs: None,
        };

        let signed_data = SignedData {
            version: CmsVersion::V1,
            digest_algorithms: SetOfVec::try_from(vec![wire::algorithm_with_null(ID_SHA1)])?,
            encap_content_info: EncapsulatedContentInfo {
                econtent_type: ID_DATA,
                econtent: None,
            },
            certificates: None,
            crls: None,
            signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info])?),
        };

        wire::encode_signed_data(&signed_data)
    }

    /// Verify a detached direct signature produced by [`CmsEngine::sign`]
    /// (or by any peer using the same profile) against `content`.
    pub fn verify(
        &self,
        signature: &[u8],
        content: &[u8],
        cert: &Certificate,
    ) -> Result<(), CryptoError> {
        let signed_data = wire::decode_signed_data(signature)?;
        if signed_data.encap_content_info.econtent.is_some() {
            return Err(CryptoError::Unsupported("attached content".into()));
        }

        let signer = signed_data
            .signer_infos
            .0
            .iter()
            .next()
            .ok_or_else(|| CryptoError::Verification("no signer info".into()))?;

        match &signer.sid {
            SignerIdentifier::IssuerAndSerialNumber(ias) if *ias == wire::issuer_and_serial(cert) => {}
            _ => {
                return Err(CryptoError::Verification(
                    "signer does not match certificate".into(),
                ))
            }
        }
        if signer.digest_alg.oid != ID_SHA1 {
            return Err(CryptoError::Unsupported(format!(
                "digest algorithm {}",
                signer.digest_alg.oid
            )));
        }
        if signer.signed_attrs.is_some() {
            return Err(CryptoError::Unsupported("signed attributes".into()));
        }
        let sig_alg = signer.signature_algorithm.oid;
        if sig_alg != RSA_ENCRYPTION && sig_alg != SHA1_WITH_RSA {
            return Err(CryptoError::Unsupported(format!("signature algorithm {}", sig_alg)));
        }

        let digest = Sha1::digest(content);
        public_key_of(cert)?
            .verify(Pkcs1v15Sign::new::<Sha1>(), &digest, signer.signature.as_bytes())
            .map_err(|_| CryptoError::Verification("signature mismatch".into()))
    }

    /// Envelope `content` for the holder of `recipient`'s private key.
    pub fn encrypt(&self, content: &[u8], recipient: &Certificate) -> Result<Vec<u8>, CryptoError> {
        let recipient_key = public_key_of(recipient)?;

        let mut cek = Zeroizing::new([0u8; DES_EDE3_KEY_BYTES]);
        OsRng.fill_bytes(&mut *cek);
        set_odd_parity(&mut *cek);

        let mut iv = [0u8; DES_BLOCK_BYTES];
        getrandom::getrandom(&mut iv).map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let ciphertext = TdesCbcEnc::new_from_slices(&*cek, &iv)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?
            .encrypt_padded_vec_mut::<Pkcs7>(content);

        let wrapped_key = recipient_key
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, &*cek)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let recipient_info = RecipientInfo::Ktri(KeyTransRecipientInfo {
            version: CmsVersion::V0,
            rid: RecipientIdentifier::IssuerAndSerialNumber(wire::issuer_and_serial(recipient)),
            key_enc_alg: wire::algorithm_with_null(RSA_ENCRYPTION),
            enc_key: OctetString::new(wrapped_key)?,
        });

        let enveloped = EnvelopedData {
            version: CmsVersion::V0,
            originator_info: None,
            recip_infos: RecipientInfos(SetOfVec::try_from(vec![recipient_info])?),
            encrypted_content: EncryptedContentInfo {
                content_type: ID_DATA,
                content_enc_alg: wire::des_ede3_cbc(&iv)?,
                encrypted_content: Some(OctetString::new(ciphertext)?),
            },
            unprotected_attrs: None,
        };

        wire::encode_enveloped_data(&enveloped)
    }

    /// Open an envelope with `key`. Uses the first recipient entry.
    pub fn decrypt(&self, enveloped: &[u8], key: &RsaPrivateKey) -> Result<Vec<u8>, CryptoError> {
        let enveloped = wire::decode_enveloped_data(enveloped)?;

        let recipient = enveloped
            .recip_infos
            .0
            .iter()
            .next()
            .ok_or(CryptoError::NoRecipientInfo)?;
        let ktri = match recipient {
            RecipientInfo::Ktri(ktri) => ktri,
            _ => return Err(CryptoError::Unsupported("non key-transport recipient".into())),
        };
        if ktri.key_enc_alg.oid != RSA_ENCRYPTION {
            return Err(CryptoError::Unsupported(format!(
                "key transport algorithm {}",
                ktri.key_enc_alg.oid
            )));
        }

        let cek = Zeroizing::new(
            key.decrypt(Pkcs1v15Encrypt, ktri.enc_key.as_bytes())
                .map_err(|e| CryptoError::Decryption(format!("key unwrap: {}", e)))?,
        );

        let content_info = &enveloped.encrypted_content;
        let iv = wire::des_ede3_cbc_iv(&content_info.content_enc_alg)?;
        let ciphertext = content_info
            .encrypted_content
            .as_ref()
            .ok_or_else(|| CryptoError::Unsupported("detached encrypted content".into()))?;

        TdesCbcDec::new_from_slices(&cek, &iv)
            .map_err(|_| CryptoError::Decryption(format!("content key length {}", cek.len())))?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext.as_bytes())
            .map_err(|_| CryptoError::Decryption("bad padding".into()))
    }
}

/// DES keys carry a parity bit in the low bit of every byte.
fn set_odd_parity(key: &mut [u8]) {
    for b in key.iter_mut() {
        let high = *b & 0xFE;
        *b = if high.count_ones() % 2 == 0 { high | 1 } else { high };
    }
}
