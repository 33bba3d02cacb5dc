//! Known-answer tests: canonical signing strings and CMS wire structure.

mod common;

use cms::content_info::CmsVersion;
use cms::enveloped_data::RecipientInfo;
use cms::signed_data::SignerIdentifier;
use der::Encode;
use proptest::prelude::*;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Method, Url};

use ips_client::wire::{
    self, DES_BLOCK_BYTES, DES_EDE3_CBC, DES_EDE3_KEY_BYTES, ID_DATA, ID_SHA1, RSA_ENCRYPTION,
    SHA1_DIGEST_BYTES,
};
use ips_client::{
    authorization_value, canonicalize, load_certificate, load_private_key, ApiRequest, CmsEngine,
    QueryCanonicalization,
};

use common::{participant, receiver};

const SORTED: QueryCanonicalization = QueryCanonicalization::Sorted;

fn request(method: Method, url: &str) -> ApiRequest {
    ApiRequest::new(method, Url::parse(url).unwrap())
}

fn with_header(mut req: ApiRequest, name: &str, value: &str) -> ApiRequest {
    req.headers.append(
        HeaderName::from_bytes(name.as_bytes()).unwrap(),
        HeaderValue::from_str(value).unwrap(),
    );
    req
}

#[test]
fn test_wire_constants() {
    assert_eq!(DES_EDE3_KEY_BYTES, 24);
    assert_eq!(DES_BLOCK_BYTES, 8);
    assert_eq!(SHA1_DIGEST_BYTES, 20);
    assert_eq!(ID_DATA.to_string(), "1.2.840.113549.1.7.1");
    assert_eq!(DES_EDE3_CBC.to_string(), "1.2.840.113549.3.7");
}

#[test]
fn test_algorithm_identifier_encodings() {
    let der = |alg: spki::AlgorithmIdentifierOwned| hex::encode(alg.to_der().unwrap());
    assert_eq!(der(wire::algorithm_with_null(ID_SHA1)), "300906052b0e03021a0500");
    assert_eq!(
        der(wire::algorithm_with_null(RSA_ENCRYPTION)),
        "300d06092a864886f70d0101010500"
    );
    assert_eq!(
        der(wire::des_ede3_cbc(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap()),
        "301406082a864886f70d030704080102030405060708"
    );
}

// ---------------------------------------------------------------------------
// Canonicalization vectors
// ---------------------------------------------------------------------------

#[test]
fn test_canonical_browse() {
    let req = request(Method::GET, "https://ips.example/api/BANKLV22/inbox");
    assert_eq!(canonicalize(&req, SORTED), "GET\n/api/BANKLV22/inbox");
}

#[test]
fn test_canonical_discovery() {
    let req = request(Method::GET, "https://ips.example/api/BANKLV22?fields=links");
    assert_eq!(canonicalize(&req, SORTED), "GET\n/api/BANKLV22\nfields:links");
    assert_eq!(
        canonicalize(&req, QueryCanonicalization::Omitted),
        "GET\n/api/BANKLV22"
    );
}

#[test]
fn test_canonical_state_change() {
    let req = with_header(
        request(Method::POST, "https://ips.example/api/BANKLV22/outbox/PAY-001"),
        "X-HTTP-Method-Override",
        "PATCH",
    )
    .with_json(br#"{"state":"Cancelled","stateDescrip":"duplicate"}"#.to_vec());
    assert_eq!(
        canonicalize(&req, SORTED),
        "PATCH\n/api/BANKLV22/outbox/PAY-001\n{\"state\":\"Cancelled\",\"stateDescrip\":\"duplicate\"}"
    );
}

#[test]
fn test_canonical_protocol_headers() {
    let req = request(Method::PUT, "https://ips.example/api/B/outbox/R");
    let req = with_header(req, "X-IPS-Trace", "t1");
    let req = with_header(req, "x-ips-batch", "b1");
    let req = with_header(req, "x-ips-batch", "b2");
    let req = with_header(req, "Accept", "application/json");
    let req = req.with_json(b"{}".to_vec());
    assert_eq!(
        canonicalize(&req, SORTED),
        "PUT\nx-ips-batch:b1,b2\nx-ips-trace:t1\n/api/B/outbox/R\n{}"
    );
}

#[test]
fn test_canonical_query_sorted_and_decoded() {
    let req = request(
        Method::GET,
        "https://ips.example/api/B/outbox/state?since=2024-01-01T00%3A00%3A00Z&fields=items",
    );
    assert_eq!(
        canonicalize(&req, SORTED),
        "GET\n/api/B/outbox/state\nfields:items\nsince:2024-01-01T00:00:00Z"
    );
}

#[test]
fn test_authorization_header_value() {
    assert_eq!(
        authorization_value("BANKLV22", b"\x01\x02\x03"),
        "IPSAuth BANKLV22:AQID"
    );
}

// ---------------------------------------------------------------------------
// Sensitivity
// ---------------------------------------------------------------------------

#[test]
fn test_canonical_sensitivity() {
    let base = request(Method::POST, "https://ips.example/api/B/inbox/1").with_json(b"{\"a\":1}".to_vec());
    let reference = canonicalize(&base, SORTED);

    let mut body = base.clone();
    body.body = b"{\"a\":2}".to_vec();

    let path = request(Method::POST, "https://ips.example/api/B/inbox/2").with_json(b"{\"a\":1}".to_vec());
    let header = with_header(base.clone(), "x-ips-nonce", "1");
    let overridden = with_header(base.clone(), "x-http-method-override", "PATCH");
    let query = request(Method::POST, "https://ips.example/api/B/inbox/1?v=1").with_json(b"{\"a\":1}".to_vec());

    for changed in [&body, &path, &header, &overridden, &query] {
        assert_ne!(canonicalize(changed, SORTED), reference);
    }

    // Non-protocol headers are not covered.
    let other = with_header(base.clone(), "user-agent", "x");
    assert_eq!(canonicalize(&other, SORTED), reference);
}

proptest! {
    #[test]
    fn prop_header_insertion_order_irrelevant(
        names in prop::collection::btree_set("[a-z]{1,8}", 1..6),
        seed in any::<u64>(),
    ) {
        let headers: Vec<(String, String)> = names
            .iter()
            .map(|n| (format!("x-ips-{n}"), format!("v-{n}")))
            .collect();

        let mut forward = request(Method::GET, "https://ips.example/p");
        for (n, v) in &headers {
            forward = with_header(forward, n, v);
        }

        let mut shuffled = headers.clone();
        let len = shuffled.len();
        shuffled.rotate_left((seed as usize) % len);
        shuffled.reverse();
        let mut backward = request(Method::GET, "https://ips.example/p");
        for (n, v) in &shuffled {
            backward = with_header(backward, &n.to_uppercase(), v);
        }

        prop_assert_eq!(canonicalize(&forward, SORTED), canonicalize(&backward, SORTED));
    }

    #[test]
    fn prop_canonicalization_deterministic(
        path in "/[a-zA-Z0-9/_-]{0,32}",
        body in "[ -~]{0,64}",
    ) {
        let url = format!("https://ips.example{path}");
        let req = request(Method::PUT, &url).with_json(body.clone().into_bytes());
        let first = canonicalize(&req, SORTED);
        prop_assert_eq!(&first, &canonicalize(&req.clone(), SORTED));
        prop_assert!(first.starts_with("PUT\n/"));
        if !body.is_empty() {
            let suffix = format!("\n{}", body);
            prop_assert!(first.ends_with(&suffix));
        }
    }
}

// ---------------------------------------------------------------------------
// CMS wire structure
// ---------------------------------------------------------------------------

#[test]
fn test_signature_structure() {
    let me = participant();
    let sig = CmsEngine::new()
        .sign(b"GET\n/api/B/inbox", me.private_key(), me.certificate())
        .unwrap();

    let sd = wire::decode_signed_data(&sig).unwrap();
    assert_eq!(sd.version, CmsVersion::V1);
    assert_eq!(sd.encap_content_info.econtent_type, ID_DATA);
    assert!(sd.encap_content_info.econtent.is_none(), "content must be detached");
    assert!(sd.certificates.is_none());
    assert_eq!(sd.digest_algorithms.len(), 1);

    let signers: Vec<_> = sd.signer_infos.0.iter().collect();
    assert_eq!(signers.len(), 1);
    let signer = signers[0];
    assert_eq!(signer.version, CmsVersion::V1);
    assert_eq!(signer.digest_alg.oid, ID_SHA1);
    assert_eq!(signer.signature_algorithm.oid, RSA_ENCRYPTION);
    assert!(signer.signed_attrs.is_none(), "direct signature");
    match &signer.sid {
        SignerIdentifier::IssuerAndSerialNumber(ias) => {
            assert_eq!(ias, &wire::issuer_and_serial(me.certificate()));
        }
        other => panic!("unexpected signer identifier: {other:?}"),
    }
    // 1024-bit test key.
    assert_eq!(signer.signature.as_bytes().len(), 128);
}

#[test]
fn test_envelope_structure() {
    let to = receiver();
    let content = b"twenty bytes exactly";
    let env = CmsEngine::new().encrypt(content, to.certificate()).unwrap();

    let ed = wire::decode_enveloped_data(&env).unwrap();
    assert_eq!(ed.version, CmsVersion::V0);
    assert!(ed.originator_info.is_none());

    let recipients: Vec<_> = ed.recip_infos.0.iter().collect();
    assert_eq!(recipients.len(), 1);
    match recipients[0] {
        RecipientInfo::Ktri(ktri) => {
            assert_eq!(ktri.version, CmsVersion::V0);
            assert_eq!(ktri.key_enc_alg.oid, RSA_ENCRYPTION);
            assert_eq!(ktri.enc_key.as_bytes().len(), 128);
        }
        _ => panic!("expected key transport recipient"),
    }

    let eci = &ed.encrypted_content;
    assert_eq!(eci.content_type, ID_DATA);
    assert_eq!(eci.content_enc_alg.oid, DES_EDE3_CBC);
    assert_eq!(wire::des_ede3_cbc_iv(&eci.content_enc_alg).unwrap().len(), DES_BLOCK_BYTES);

    // PKCS#7 padding always adds at least one byte.
    let ciphertext = eci.encrypted_content.as_ref().unwrap().as_bytes();
    assert_eq!(ciphertext.len(), 24);
}

// ---------------------------------------------------------------------------
// Interop vectors produced by OpenSSL
// ---------------------------------------------------------------------------
//
// tests/data was generated with:
//   openssl req -x509 -newkey rsa:2048 -nodes -keyout bank.key -out bank.crt \
//       -subj "/CN=BANKEE2X" -set_serial 4242
//   openssl cms -encrypt -des3 -binary -in payload.txt -outform DER \
//       -out envelope.der bank.crt
//   openssl cms -sign -binary -noattr -nocerts -md sha1 -in signed.txt \
//       -signer bank.crt -inkey bank.key -outform DER -out signature.der

const INTEROP_KEY: &[u8] = include_bytes!("data/bank.key");
const INTEROP_CERT: &[u8] = include_bytes!("data/bank.crt");
const INTEROP_ENVELOPE: &[u8] = include_bytes!("data/envelope.der");
const INTEROP_PAYLOAD: &[u8] = include_bytes!("data/payload.txt");
const INTEROP_SIGNATURE: &[u8] = include_bytes!("data/signature.der");
const INTEROP_SIGNED: &[u8] = include_bytes!("data/signed.txt");

fn interop_credentials() -> ips_client::Credentials {
    ips_client::Credentials::new(
        load_private_key(INTEROP_KEY).unwrap(),
        load_certificate(INTEROP_CERT).unwrap(),
    )
    .unwrap()
}

#[test]
fn test_decrypt_openssl_envelope() {
    let bank = interop_credentials();
    let plain = CmsEngine::new()
        .decrypt(INTEROP_ENVELOPE, bank.private_key())
        .unwrap();
    assert_eq!(plain, INTEROP_PAYLOAD);
}

#[test]
fn test_openssl_envelope_needs_matching_key() {
    let err = CmsEngine::new()
        .decrypt(INTEROP_ENVELOPE, participant().private_key())
        .unwrap_err();
    assert!(matches!(err, ips_client::CryptoError::Decryption(_)), "{err:?}");
}

#[test]
fn test_verify_openssl_signature() {
    let bank = interop_credentials();
    let engine = CmsEngine::new();
    engine
        .verify(INTEROP_SIGNATURE, INTEROP_SIGNED, bank.certificate())
        .unwrap();

    let mut tampered = INTEROP_SIGNED.to_vec();
    tampered[0] ^= 0x20;
    assert!(engine
        .verify(INTEROP_SIGNATURE, &tampered, bank.certificate())
        .is_err());
}

#[test]
fn test_signature_value_matches_openssl() {
    // PKCS#1 v1.5 is deterministic, so the raw signature values must agree.
    let bank = interop_credentials();
    let ours = CmsEngine::new()
        .sign(INTEROP_SIGNED, bank.private_key(), bank.certificate())
        .unwrap();

    let signature_of = |der: &[u8]| {
        let sd = wire::decode_signed_data(der).unwrap();
        let signer = sd.signer_infos.0.iter().next().unwrap().clone();
        signer.signature.as_bytes().to_vec()
    };
    assert_eq!(signature_of(&ours), signature_of(INTEROP_SIGNATURE));
    assert_eq!(signature_of(&ours).len(), 256);
}
