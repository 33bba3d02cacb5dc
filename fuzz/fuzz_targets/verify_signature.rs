#![no_main]

use libfuzzer_sys::fuzz_target;
use once_cell::sync::Lazy;

use ips_client::{CmsEngine, Credentials};

static CREDS: Lazy<Credentials> =
    Lazy::new(|| Credentials::generate_self_signed("FUZZ", 1024).unwrap());

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // First byte picks the split between signature and signed content.
    let split = (data[0] as usize) % data.len();
    let (signature, content) = data[1..].split_at(split.min(data.len() - 1));

    let _ = CmsEngine::new().verify(signature, content, CREDS.certificate());
});
