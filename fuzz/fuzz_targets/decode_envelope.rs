#![no_main]

use libfuzzer_sys::fuzz_target;
use once_cell::sync::Lazy;

use ips_client::{CmsEngine, Credentials};

static CREDS: Lazy<Credentials> =
    Lazy::new(|| Credentials::generate_self_signed("FUZZ", 1024).unwrap());

fuzz_target!(|data: &[u8]| {
    let _ = ips_client::wire::decode_enveloped_data(data);
    let _ = CmsEngine::new().decrypt(data, CREDS.private_key());
});
